// 📋 Filing Status - The five federal filing statuses

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FilingStatus {
    Single,
    MarriedFilingJointly,
    MarriedFilingSeparately,
    HeadOfHousehold,
    QualifyingWidow,
}

impl FilingStatus {
    pub const ALL: [FilingStatus; 5] = [
        FilingStatus::Single,
        FilingStatus::MarriedFilingJointly,
        FilingStatus::MarriedFilingSeparately,
        FilingStatus::HeadOfHousehold,
        FilingStatus::QualifyingWidow,
    ];

    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            FilingStatus::Single => "Single",
            FilingStatus::MarriedFilingJointly => "Married Filing Jointly",
            FilingStatus::MarriedFilingSeparately => "Married Filing Separately",
            FilingStatus::HeadOfHousehold => "Head of Household",
            FilingStatus::QualifyingWidow => "Qualifying Widow(er)",
        }
    }

    /// Short code for internal use
    pub fn code(&self) -> &str {
        match self {
            FilingStatus::Single => "S",
            FilingStatus::MarriedFilingJointly => "MFJ",
            FilingStatus::MarriedFilingSeparately => "MFS",
            FilingStatus::HeadOfHousehold => "HOH",
            FilingStatus::QualifyingWidow => "QW",
        }
    }

    pub fn is_married(&self) -> bool {
        matches!(
            self,
            FilingStatus::MarriedFilingJointly | FilingStatus::MarriedFilingSeparately
        )
    }

    /// Parse a status as printed on a transcript or typed on the command line.
    ///
    /// Accepts full names ("Married Filing Joint"), codes ("MFJ") and the
    /// single-letter forms some ledgers use.
    pub fn from_label(label: &str) -> Option<FilingStatus> {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
            .collect();
        let words: Vec<&str> = normalized.split_whitespace().collect();
        let joined = words.join(" ");

        match joined.as_str() {
            "s" | "single" | "1" => return Some(FilingStatus::Single),
            "mfj" | "2" => return Some(FilingStatus::MarriedFilingJointly),
            "mfs" | "3" => return Some(FilingStatus::MarriedFilingSeparately),
            "hoh" | "4" => return Some(FilingStatus::HeadOfHousehold),
            "qw" | "qss" | "5" => return Some(FilingStatus::QualifyingWidow),
            _ => {}
        }

        if joined.starts_with("married") {
            if joined.contains("joint") {
                return Some(FilingStatus::MarriedFilingJointly);
            }
            if joined.contains("separate") {
                return Some(FilingStatus::MarriedFilingSeparately);
            }
        }
        if joined.starts_with("head of household") {
            return Some(FilingStatus::HeadOfHousehold);
        }
        if joined.starts_with("qualifying") {
            return Some(FilingStatus::QualifyingWidow);
        }
        if joined.starts_with("single") {
            return Some(FilingStatus::Single);
        }
        None
    }
}

impl Default for FilingStatus {
    fn default() -> Self {
        FilingStatus::Single
    }
}

impl fmt::Display for FilingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label_variants() {
        assert_eq!(FilingStatus::from_label("Single"), Some(FilingStatus::Single));
        assert_eq!(
            FilingStatus::from_label("Married Filing Joint"),
            Some(FilingStatus::MarriedFilingJointly)
        );
        assert_eq!(
            FilingStatus::from_label("married-filing-separately"),
            Some(FilingStatus::MarriedFilingSeparately)
        );
        assert_eq!(FilingStatus::from_label("HOH"), Some(FilingStatus::HeadOfHousehold));
        assert_eq!(
            FilingStatus::from_label("Qualifying Widow(er)"),
            Some(FilingStatus::QualifyingWidow)
        );
        assert_eq!(FilingStatus::from_label("unknown"), None);
    }

    #[test]
    fn test_married_statuses() {
        assert!(FilingStatus::MarriedFilingJointly.is_married());
        assert!(FilingStatus::MarriedFilingSeparately.is_married());
        assert!(!FilingStatus::HeadOfHousehold.is_married());
    }
}
