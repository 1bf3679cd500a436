// 🚨 Transaction Alerts - Ledger codes that need a practitioner's attention

use serde::{Deserialize, Serialize};

use crate::diagnostics::Severity;
use crate::ledger::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertCategory {
    Audit,
    Collection,
    AdditionalAssessment,
    PaymentIssue,
    AccountHold,
    RefundIssue,
    AmendedReturn,
    ResolutionProgram,
    Bankruptcy,
    Extension,
    SubstituteReturn,
    LitigationFreeze,
}

impl AlertCategory {
    pub fn name(&self) -> &str {
        match self {
            AlertCategory::Audit => "Audit Alerts",
            AlertCategory::Collection => "Collection Alerts",
            AlertCategory::AdditionalAssessment => "Additional Tax Assessments",
            AlertCategory::PaymentIssue => "Payment Issues",
            AlertCategory::AccountHold => "Account Holds",
            AlertCategory::RefundIssue => "Refund Issues",
            AlertCategory::AmendedReturn => "Amended Returns",
            AlertCategory::ResolutionProgram => "Resolution Programs",
            AlertCategory::Bankruptcy => "Bankruptcy",
            AlertCategory::Extension => "Extensions",
            AlertCategory::SubstituteReturn => "Substitute Returns",
            AlertCategory::LitigationFreeze => "Litigation/Freezes",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AlertCategory::Audit
            | AlertCategory::Collection
            | AlertCategory::AdditionalAssessment
            | AlertCategory::Bankruptcy => Severity::Critical,
            AlertCategory::PaymentIssue
            | AlertCategory::AccountHold
            | AlertCategory::RefundIssue
            | AlertCategory::SubstituteReturn
            | AlertCategory::LitigationFreeze => Severity::Warning,
            AlertCategory::AmendedReturn
            | AlertCategory::ResolutionProgram
            | AlertCategory::Extension => Severity::Info,
        }
    }

    pub fn codes(&self) -> &'static [&'static str] {
        match self {
            AlertCategory::Audit => &["420", "424", "430"],
            AlertCategory::Collection => &["520", "530", "780"],
            AlertCategory::AdditionalAssessment => &["290", "300"],
            AlertCategory::PaymentIssue => &["706", "898"],
            AlertCategory::AccountHold => &["570", "810"],
            AlertCategory::RefundIssue => &["846", "811"],
            AlertCategory::AmendedReturn => &["320"],
            AlertCategory::ResolutionProgram => &["480", "482"],
            AlertCategory::Bankruptcy => &["780"],
            AlertCategory::Extension => &["460"],
            AlertCategory::SubstituteReturn => &["599"],
            AlertCategory::LitigationFreeze => &["520", "571"],
        }
    }

    pub const ALL: [AlertCategory; 12] = [
        AlertCategory::Audit,
        AlertCategory::Collection,
        AlertCategory::AdditionalAssessment,
        AlertCategory::PaymentIssue,
        AlertCategory::AccountHold,
        AlertCategory::RefundIssue,
        AlertCategory::AmendedReturn,
        AlertCategory::ResolutionProgram,
        AlertCategory::Bankruptcy,
        AlertCategory::Extension,
        AlertCategory::SubstituteReturn,
        AlertCategory::LitigationFreeze,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAlert {
    pub category: AlertCategory,
    pub severity: Severity,
    pub code: String,
    pub meaning: String,
    pub description: String,
    pub date: String,
    pub amount: f64,
    pub tax_year: Option<i32>,
}

/// One alert per (transaction, matching category), most severe first, then
/// by category name. A code listed in two categories raises two alerts.
pub fn transaction_alerts(transactions: &[Transaction]) -> Vec<TransactionAlert> {
    let mut alerts: Vec<TransactionAlert> = transactions
        .iter()
        .flat_map(|t| {
            AlertCategory::ALL
                .iter()
                .filter(|category| category.codes().contains(&t.code.as_str()))
                .map(move |category| TransactionAlert {
                    category: *category,
                    severity: category.severity(),
                    code: t.code.clone(),
                    meaning: t.meaning.clone(),
                    description: t.description.clone(),
                    date: t.date.clone(),
                    amount: t.amount,
                    tax_year: t.tax_year,
                })
        })
        .collect();

    alerts.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.category.name().cmp(b.category.name()))
    });
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(code: &str) -> Transaction {
        Transaction {
            code: code.to_string(),
            meaning: String::new(),
            description: String::new(),
            date: "2023-05-01".to_string(),
            cycle_date: None,
            amount: 0.0,
            tax_year: Some(2022),
        }
    }

    #[test]
    fn test_alerts_sorted_by_severity_then_name() {
        let alerts = transaction_alerts(&[tx("460"), tx("150"), tx("846"), tx("420")]);
        let names: Vec<&str> = alerts.iter().map(|a| a.category.name()).collect();
        assert_eq!(names, vec!["Audit Alerts", "Refund Issues", "Extensions"]);
    }

    #[test]
    fn test_code_in_two_categories() {
        let alerts = transaction_alerts(&[tx("780")]);
        let names: Vec<&str> = alerts.iter().map(|a| a.category.name()).collect();
        // Both are critical; ordered by name
        assert_eq!(names, vec!["Bankruptcy", "Collection Alerts"]);
    }

    #[test]
    fn test_no_alerts_for_routine_codes() {
        assert!(transaction_alerts(&[tx("150"), tx("806")]).is_empty());
    }
}
