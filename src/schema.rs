//! Canonical field lists: the schema a form variant is reconciled against.
//!
//! Three merchant-application layouts are built in. They are not
//! interchangeable: a field that exists in `full` (e.g. "MID") has no
//! counterpart in `basic`, and some labels differ in spelling between
//! variants ("Banker Name and Branch" vs "Banker Name & Branch"). Field names
//! are kept exactly as they appear on the paper forms, misspellings included,
//! because the OCR prompt asks the model to echo them verbatim.

use crate::error::FormExtractError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Fields of the original single-page layout.
pub const BASIC_FIELDS: &[&str] = &[
    "Date",
    "Merchant Name Commercial",
    "Merchant Name legal",
    "Business Address Commercial",
    "City",
    "Telephone",
    "Anual Sales Volume",
    "Average Transaction size",
    "Legal Structure",
    "First Name",
    "Last Name",
    "NIC New",
    "Payment Mode",
    "Banker Name and Branch",
    "Account",
];

/// Fields of the two-page layout with outlet and ownership sections.
pub const EXTENDED_FIELDS: &[&str] = &[
    "Date",
    "New Outlet",
    "Chain Outlet",
    "Merchant Name Commercial",
    "Merchant Name legal",
    "Established Since",
    "Business Address Commercial",
    "City",
    "Telephone / Cell",
    "Contact Person Name",
    "Business Address Legal",
    "Type of Business/Type of Merchandise/Service Sold",
    "Annual Sales Volume",
    "Average Transaction size",
    "Expected Volume",
    "Legal Structure",
    "First Name",
    "Last Name",
    "NIC (Old)",
    "NIC New",
    "Residence Address",
    "Payment Mode",
    "Banker Name and Branch",
    "Account",
    "Merchant Cheaque Beneficiary Name",
];

/// Fields of the complete layout, including signatories and relationship history.
pub const FULL_FIELDS: &[&str] = &[
    "Date",
    "MID",
    "TID",
    "New Outlet",
    "Chain Outlet",
    "Merchant Name Commercial",
    "Merchant Name legal",
    "Established Since",
    "Business Address Commercial",
    "City",
    "Telephone / Cell",
    "Email/Web",
    "Contact Person Name",
    "Business Address Legal",
    "Number of Outlets",
    "Location of Branches",
    "Type of Business/Type of Merchandise/Service Sold",
    "Annual Sales Volume",
    "Average Transaction size",
    "Expected Volume",
    "Legal Structure",
    "First Name",
    "Last Name",
    "NIC (Old)",
    "NIC New",
    "Residence Address",
    "Authorized Signatory First Name",
    "Authorized Signatory Last Name",
    "Authorized Signatory NIC(Old)",
    "Authorized Signatory NIC(New)",
    "Payment Mode",
    "Banker Name & Branch",
    "Account/IBAN",
    "Merchant Cheaque Beneficiary Name",
    "Merchant Cheaque Beneficiary Address",
    "Do You want Direct Credit Facility with UBL",
    "If any previous Credit Card acceptance relationship",
    "If yes, with",
    "Current Status of Relationship",
    "If active, what equipment is already in place",
    "If Terminated Reason of Termination",
    "Discount Rates Offered",
];

/// Built-in form layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormVariant {
    /// 15 fields, no form-type gating.
    Basic,
    /// 25 fields, no form-type gating.
    Extended,
    /// 42 fields; the prompt asks the model to reject non-merchant forms. (default)
    #[default]
    Full,
}

impl FormVariant {
    /// Canonical field names for this layout, in priority order.
    pub fn field_names(self) -> &'static [&'static str] {
        match self {
            FormVariant::Basic => BASIC_FIELDS,
            FormVariant::Extended => EXTENDED_FIELDS,
            FormVariant::Full => FULL_FIELDS,
        }
    }

    /// Owned canonical list for this layout.
    pub fn fields(self) -> CanonicalFieldList {
        CanonicalFieldList {
            fields: self.field_names().iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Whether the OCR prompt should reject images that are not merchant forms.
    pub fn gates_form_type(self) -> bool {
        matches!(self, FormVariant::Full)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FormVariant::Basic => "basic",
            FormVariant::Extended => "extended",
            FormVariant::Full => "full",
        }
    }
}

impl fmt::Display for FormVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormVariant {
    type Err = FormExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(FormVariant::Basic),
            "extended" => Ok(FormVariant::Extended),
            "full" => Ok(FormVariant::Full),
            other => Err(FormExtractError::InvalidConfig(format!(
                "unknown form variant '{other}' (expected basic, extended or full)"
            ))),
        }
    }
}

/// An ordered, duplicate-free list of expected field names.
///
/// List order is the tie-break priority during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CanonicalFieldList {
    fields: Vec<String>,
}

impl CanonicalFieldList {
    /// Build a custom list. Rejects empty lists, blank names and duplicates.
    pub fn new<I, S>(fields: I) -> Result<Self, FormExtractError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(FormExtractError::InvalidSchema(
                "field list must not be empty".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if field.trim().is_empty() {
                return Err(FormExtractError::InvalidSchema(
                    "field names must not be blank".into(),
                ));
            }
            if !seen.insert(field.as_str()) {
                return Err(FormExtractError::InvalidSchema(format!(
                    "duplicate field '{field}'"
                )));
            }
        }

        Ok(Self { fields })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.fields
    }
}

impl TryFrom<Vec<String>> for CanonicalFieldList {
    type Error = FormExtractError;

    fn try_from(fields: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(fields)
    }
}

impl From<CanonicalFieldList> for Vec<String> {
    fn from(list: CanonicalFieldList) -> Self {
        list.fields
    }
}

impl<'a> IntoIterator for &'a CanonicalFieldList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_field_counts() {
        assert_eq!(FormVariant::Basic.fields().len(), 15);
        assert_eq!(FormVariant::Extended.fields().len(), 25);
        assert_eq!(FormVariant::Full.fields().len(), 42);
    }

    #[test]
    fn builtin_lists_are_valid() {
        for variant in [FormVariant::Basic, FormVariant::Extended, FormVariant::Full] {
            CanonicalFieldList::new(variant.field_names().iter().copied())
                .unwrap_or_else(|e| panic!("{variant}: {e}"));
        }
    }

    // Earlier revisions of the extended and full lists lost the separator
    // between "Residence Address" and the following entry, producing one
    // unmatchable field. Both names must stand on their own.
    #[test]
    fn residence_address_is_not_concatenated() {
        for variant in [FormVariant::Extended, FormVariant::Full] {
            let fields = variant.fields();
            assert!(fields.contains("Residence Address"), "{variant}");
            assert!(fields.contains("Payment Mode"), "{variant}");
            assert!(
                fields.iter().all(|f| !f.starts_with("Residence Address") || f == "Residence Address"),
                "{variant} has a concatenated Residence Address entry"
            );
        }
    }

    #[test]
    fn only_full_variant_gates() {
        assert!(FormVariant::Full.gates_form_type());
        assert!(!FormVariant::Basic.gates_form_type());
        assert!(!FormVariant::Extended.gates_form_type());
    }

    #[test]
    fn variant_from_str() {
        assert_eq!("Basic".parse::<FormVariant>().unwrap(), FormVariant::Basic);
        assert_eq!(" full ".parse::<FormVariant>().unwrap(), FormVariant::Full);
        assert!("tier3".parse::<FormVariant>().is_err());
    }

    #[test]
    fn custom_list_rejects_duplicates_and_blanks() {
        assert!(CanonicalFieldList::new(Vec::<String>::new()).is_err());
        assert!(CanonicalFieldList::new(["City", "City"]).is_err());
        assert!(CanonicalFieldList::new(["City", "  "]).is_err());
        let list = CanonicalFieldList::new(["Date", "City"]).unwrap();
        assert_eq!(list.iter().collect::<Vec<_>>(), vec!["Date", "City"]);
    }

    #[test]
    fn custom_list_deserialises_from_json_array() {
        let list: CanonicalFieldList = serde_json::from_str(r#"["MID", "TID"]"#).unwrap();
        assert_eq!(list.len(), 2);
        assert!(serde_json::from_str::<CanonicalFieldList>("[]").is_err());
    }
}
