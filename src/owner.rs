// 👥 Owner Classification - Taxpayer / spouse / joint from a document file name
//
// Heuristic and best-effort: transcript files are named by the people who
// pull them ("WI 21 S.pdf", "AT_2020_TP.pdf", "WI 19 COMBINED.pdf"). When no
// marker is found the owner defaults to Taxpayer and the result says so.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Owner {
    Taxpayer,
    Spouse,
    Joint,
}

impl Owner {
    pub fn name(&self) -> &str {
        match self {
            Owner::Taxpayer => "Taxpayer",
            Owner::Spouse => "Spouse",
            Owner::Joint => "Joint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerClassification {
    pub owner: Owner,
    /// True when no marker matched and `owner` is the default
    pub fallback: bool,
}

const SPOUSE_MARKERS: &[&str] = &["S", "SPOUSE"];
const TAXPAYER_MARKERS: &[&str] = &["TP", "TAXPAYER"];
const JOINT_MARKERS: &[&str] = &["COMBINED", "JOINT"];

/// Classify a document file name. Spouse markers win over taxpayer markers,
/// which win over joint markers.
///
/// Markers are whole tokens of the stem split on whitespace, `_`, `-` and
/// `.`; "JOHN'S" is one token and carries no marker.
pub fn classify_owner(file_name: &str) -> OwnerClassification {
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name)
        .to_uppercase();

    let tokens: Vec<&str> = stem
        .split(|c: char| c.is_whitespace() || matches!(c, '_' | '-' | '.'))
        .filter(|t| !t.is_empty())
        .collect();
    let has = |markers: &[&'static str]| tokens.iter().any(|t| markers.iter().any(|m| m == t));

    let owner = if has(SPOUSE_MARKERS) {
        Some(Owner::Spouse)
    } else if has(TAXPAYER_MARKERS) {
        Some(Owner::Taxpayer)
    } else if has(JOINT_MARKERS) {
        Some(Owner::Joint)
    } else {
        None
    };

    match owner {
        Some(owner) => OwnerClassification { owner, fallback: false },
        None => OwnerClassification {
            owner: Owner::Taxpayer,
            fallback: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers() {
        assert_eq!(classify_owner("WI 21 S.pdf").owner, Owner::Spouse);
        assert_eq!(classify_owner("wi_21_spouse.pdf").owner, Owner::Spouse);
        assert_eq!(classify_owner("AT-2020-TP.pdf").owner, Owner::Taxpayer);
        assert_eq!(classify_owner("WI 19 COMBINED.pdf").owner, Owner::Joint);
        assert!(!classify_owner("WI 19 COMBINED.pdf").fallback);
    }

    #[test]
    fn test_marker_must_be_a_whole_word() {
        // "SMITH" contains S but is not a spouse marker
        let result = classify_owner("WI 2021 SMITH.pdf");
        assert_eq!(result.owner, Owner::Taxpayer);
        assert!(result.fallback);
    }

    #[test]
    fn test_possessive_is_not_a_spouse_marker() {
        let result = classify_owner("JOHN'S WI 21 TP.pdf");
        assert_eq!(result.owner, Owner::Taxpayer);
        assert!(!result.fallback);

        let result = classify_owner("Mary's transcript.pdf");
        assert!(result.fallback);
    }

    #[test]
    fn test_extension_is_ignored() {
        // The ".S" suffix of an extension-like tail is not a marker
        let result = classify_owner("transcript.s");
        assert!(result.fallback);
    }
}
