// 🔢 Transaction Code Table - Three-digit ledger codes to human meanings
// Read-only lookup, loaded from JSON or the built-in table.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Code used for the "no tax return filed" marker line
pub const NO_RETURN_CODE: &str = "n/a";

/// Codes that mean a return is on file for the period
pub const RETURN_FILED_CODES: [&str; 2] = ["150", "976"];

/// Meaning reported for codes the table does not know
pub const UNKNOWN_MEANING: &str = "Unrecognized transaction code";

const STANDARD_CODES: &[(&str, &str)] = &[
    (NO_RETURN_CODE, "No tax return filed"),
    ("150", "Tax return filed and tax assessed"),
    ("166", "Penalty for filing tax return after the due date"),
    ("170", "Penalty for not pre-paying tax"),
    ("176", "Penalty for not pre-paying tax"),
    ("180", "Deposit penalty"),
    ("196", "Interest charged for late payment"),
    ("276", "Penalty for late payment of tax"),
    ("290", "Additional tax assessed"),
    ("291", "Abatement of prior tax assessment"),
    ("300", "Additional tax or deficiency assessment by examination"),
    ("301", "Abatement of tax by examination"),
    ("336", "Interest assessed"),
    ("360", "Fees and collection costs"),
    ("420", "Examination of tax return"),
    ("421", "Closed examination of tax return"),
    ("424", "Examination request indicator"),
    ("430", "Estimated tax declaration"),
    ("460", "Extension of time to file"),
    ("480", "Offer in compromise pending"),
    ("481", "Offer in compromise rejected"),
    ("482", "Offer in compromise withdrawn"),
    ("520", "Bankruptcy or other legal action filed"),
    ("521", "Removal of bankruptcy or other legal action"),
    ("530", "Balance due account currently not collectible"),
    ("570", "Additional account action pending"),
    ("571", "Resolved additional account action"),
    ("582", "Lien placed on assets due to balance owed"),
    ("599", "Tax return secured"),
    ("610", "Payment with return"),
    ("670", "Payment"),
    ("706", "Overpayment transferred from another tax period"),
    ("710", "Overpayment credit applied from prior tax period"),
    ("766", "Credit to your account"),
    ("768", "Earned income credit"),
    ("776", "Interest credited to your account"),
    ("780", "Master file account compromised"),
    ("806", "Credit for withheld taxes"),
    ("810", "Refund freeze"),
    ("811", "Removed refund freeze"),
    ("826", "Overpayment transferred to another account"),
    ("846", "Refund issued"),
    ("898", "Overpayment applied to non-IRS debt"),
    ("922", "Review of unreported income"),
    ("971", "Notice issued"),
    ("972", "Reversal of notice"),
    ("976", "Duplicate or amended return filed"),
    ("977", "Amended tax return filed"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeTable {
    codes: BTreeMap<String, String>,
}

impl CodeTable {
    pub fn new() -> Self {
        CodeTable {
            codes: BTreeMap::new(),
        }
    }

    /// The built-in table of common account-transcript codes
    pub fn standard() -> Self {
        CodeTable {
            codes: STANDARD_CODES
                .iter()
                .map(|(code, meaning)| (code.to_string(), meaning.to_string()))
                .collect(),
        }
    }

    /// Load a `{"150": "Tax return filed", ...}` JSON object
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read code table: {:?}", path))?;

        let table: CodeTable = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse code table JSON: {:?}", path))?;

        tracing::info!(codes = table.len(), "Loaded transaction code table from {:?}", path);
        Ok(table)
    }

    /// Builder: add or replace one code
    pub fn with_code(mut self, code: &str, meaning: &str) -> Self {
        self.codes.insert(code.to_string(), meaning.to_string());
        self
    }

    pub fn lookup(&self, code: &str) -> Option<&str> {
        self.codes.get(code.trim()).map(String::as_str)
    }

    /// Meaning of a code, or the generic label when unknown
    pub fn interpret(&self, code: &str) -> String {
        self.lookup(code).unwrap_or(UNKNOWN_MEANING).to_string()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

pub fn is_return_filed_code(code: &str) -> bool {
    RETURN_FILED_CODES.contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_standard_lookup() {
        let table = CodeTable::standard();
        assert_eq!(table.interpret("150"), "Tax return filed and tax assessed");
        assert_eq!(table.interpret(NO_RETURN_CODE), "No tax return filed");
        assert_eq!(table.interpret("999"), UNKNOWN_MEANING);
    }

    #[test]
    fn test_from_file_and_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"150": "Return filed", "806": "W-2 or 1099 withholding"}}"#).unwrap();

        let table = CodeTable::from_file(file.path()).unwrap().with_code("846", "Refund issued");
        assert_eq!(table.len(), 3);
        assert_eq!(table.lookup("806"), Some("W-2 or 1099 withholding"));
        assert_eq!(table.lookup("670"), None);
    }

    #[test]
    fn test_return_filed_codes() {
        assert!(is_return_filed_code("150"));
        assert!(is_return_filed_code("976"));
        assert!(!is_return_filed_code("977"));
    }
}
