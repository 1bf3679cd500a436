// 📊 Year Aggregates - Everything known about one tax year of a case
// Forms from every wage & income document plus the ledger of the account
// transcript, with category and owner totals kept in step.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::FormCategory;
use crate::codes::is_return_filed_code;
use crate::extraction::ExtractedForm;
use crate::ledger::{AccountTranscript, LedgerSummary, Transaction};
use crate::owner::Owner;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub income: f64,
    pub withholding: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnerTotals {
    pub income: f64,
    pub withholding: f64,
    /// W-2 wages only
    pub wage_income: f64,
    pub se_income: f64,
}

impl OwnerTotals {
    fn add(&mut self, other: &OwnerTotals) {
        self.income += other.income;
        self.withholding += other.withholding;
        self.wage_income += other.wage_income;
        self.se_income += other.se_income;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearAggregate {
    pub tax_year: i32,
    pub category_totals: BTreeMap<FormCategory, CategoryTotals>,
    pub owner_totals: BTreeMap<Owner, OwnerTotals>,
    pub forms: Vec<ExtractedForm>,
    pub transactions: Vec<Transaction>,
    pub ledger_summary: Option<LedgerSummary>,
}

pub type YearAggregates = BTreeMap<i32, YearAggregate>;

impl YearAggregate {
    pub fn new(tax_year: i32) -> Self {
        YearAggregate {
            tax_year,
            category_totals: FormCategory::ALL
                .iter()
                .map(|c| (*c, CategoryTotals::default()))
                .collect(),
            owner_totals: BTreeMap::new(),
            forms: Vec::new(),
            transactions: Vec::new(),
            ledger_summary: None,
        }
    }

    /// Add one extracted form (copied in; totals updated)
    pub fn add_form(&mut self, form: ExtractedForm) {
        let totals = self.category_totals.entry(form.category).or_default();
        totals.income += form.income;
        totals.withholding += form.withholding;

        let owner = self.owner_totals.entry(form.owner).or_default();
        owner.income += form.income;
        owner.withholding += form.withholding;
        if form.form_name == "W-2" {
            owner.wage_income += form.income;
        }
        if form.category == FormCategory::SelfEmployment {
            owner.se_income += form.income;
        }

        self.forms.push(form);
    }

    /// Add an account transcript. The first summary seen for the year is kept;
    /// transactions from every transcript are appended.
    pub fn add_account_transcript(&mut self, transcript: AccountTranscript) {
        if self.ledger_summary.is_none() {
            self.ledger_summary = Some(transcript.summary);
        } else {
            tracing::debug!(
                year = self.tax_year,
                "Second account transcript for the year; keeping the first summary"
            );
        }
        self.transactions.extend(transcript.transactions);
    }

    pub fn category(&self, category: FormCategory) -> CategoryTotals {
        self.category_totals.get(&category).copied().unwrap_or_default()
    }

    pub fn se_income(&self) -> f64 {
        self.category(FormCategory::SelfEmployment).income
    }

    pub fn non_se_income(&self) -> f64 {
        self.category(FormCategory::NonSelfEmployment).income
    }

    pub fn other_income(&self) -> f64 {
        self.category(FormCategory::Neither).income
    }

    /// SE + Non-SE income; "Neither" forms are left out
    pub fn wage_income_total(&self) -> f64 {
        self.se_income() + self.non_se_income()
    }

    /// SE + Non-SE withholding
    pub fn total_withholding(&self) -> f64 {
        self.category(FormCategory::SelfEmployment).withholding
            + self.category(FormCategory::NonSelfEmployment).withholding
    }

    /// All owners summed
    pub fn combined_owner_totals(&self) -> OwnerTotals {
        let mut combined = OwnerTotals::default();
        for totals in self.owner_totals.values() {
            combined.add(totals);
        }
        combined
    }

    pub fn owner(&self, owner: Owner) -> OwnerTotals {
        self.owner_totals.get(&owner).copied().unwrap_or_default()
    }

    pub fn has_return_filed(&self) -> bool {
        self.transactions.iter().any(|t| is_return_filed_code(&t.code))
    }

    pub fn ledger_agi(&self) -> f64 {
        self.ledger_summary
            .as_ref()
            .map(|s| s.adjusted_gross_income)
            .unwrap_or(0.0)
    }

    pub fn summary(&self) -> YearSummary {
        let se = self.category(FormCategory::SelfEmployment);
        let non_se = self.category(FormCategory::NonSelfEmployment);
        let other = self.category(FormCategory::Neither);
        YearSummary {
            tax_year: self.tax_year,
            form_count: self.forms.len(),
            transaction_count: self.transactions.len(),
            se_income: se.income,
            se_withholding: se.withholding,
            non_se_income: non_se.income,
            non_se_withholding: non_se.withholding,
            other_income: other.income,
            other_withholding: other.withholding,
            total_income: se.income + non_se.income + other.income,
            total_withholding: se.withholding + non_se.withholding + other.withholding,
        }
    }
}

/// One flat row per year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearSummary {
    pub tax_year: i32,
    pub form_count: usize,
    pub transaction_count: usize,
    pub se_income: f64,
    pub se_withholding: f64,
    pub non_se_income: f64,
    pub non_se_withholding: f64,
    pub other_income: f64,
    pub other_withholding: f64,
    pub total_income: f64,
    pub total_withholding: f64,
}

/// Get or create the aggregate for a year
pub fn year_entry(aggregates: &mut YearAggregates, tax_year: i32) -> &mut YearAggregate {
    aggregates
        .entry(tax_year)
        .or_insert_with(|| YearAggregate::new(tax_year))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::catalog::{CalculationKind, FieldMap};

    pub fn form(name: &str, category: FormCategory, owner: Owner, income: f64, withholding: f64) -> ExtractedForm {
        ExtractedForm {
            form_name: name.to_string(),
            occurrence_index: 0,
            tax_year: 2023,
            unique_id: None,
            label: None,
            payer_blurb: None,
            fields: FieldMap::new(),
            income,
            withholding,
            category,
            calculation: CalculationKind::Simple,
            owner,
            source_document: None,
        }
    }

    pub fn transaction(code: &str) -> Transaction {
        Transaction {
            code: code.to_string(),
            meaning: String::new(),
            description: String::new(),
            date: String::new(),
            cycle_date: None,
            amount: 0.0,
            tax_year: Some(2023),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{form, transaction};
    use super::*;

    #[test]
    fn test_totals_by_category_and_owner() {
        let mut year = YearAggregate::new(2023);
        year.add_form(form("W-2", FormCategory::NonSelfEmployment, Owner::Taxpayer, 40_000.0, 4_000.0));
        year.add_form(form("1099-NEC", FormCategory::SelfEmployment, Owner::Spouse, 12_000.0, 0.0));
        year.add_form(form("SSA-1099", FormCategory::Neither, Owner::Taxpayer, 5_000.0, 500.0));

        assert_eq!(year.se_income(), 12_000.0);
        assert_eq!(year.non_se_income(), 40_000.0);
        assert_eq!(year.other_income(), 5_000.0);
        assert_eq!(year.wage_income_total(), 52_000.0);
        assert_eq!(year.total_withholding(), 4_000.0);

        assert_eq!(year.owner(Owner::Taxpayer).wage_income, 40_000.0);
        assert_eq!(year.owner(Owner::Spouse).se_income, 12_000.0);
        assert_eq!(year.combined_owner_totals().income, 57_000.0);

        let summary = year.summary();
        assert_eq!(summary.form_count, 3);
        assert_eq!(summary.total_income, 57_000.0);
        assert_eq!(summary.total_withholding, 4_500.0);
    }

    #[test]
    fn test_return_filed_and_first_summary_kept() {
        let mut year = YearAggregate::new(2022);
        assert!(!year.has_return_filed());

        let first = AccountTranscript {
            summary: LedgerSummary {
                adjusted_gross_income: 45_000.0,
                ..Default::default()
            },
            transactions: vec![transaction("150")],
            ..Default::default()
        };
        let second = AccountTranscript {
            summary: LedgerSummary {
                adjusted_gross_income: 1.0,
                ..Default::default()
            },
            transactions: vec![transaction("846")],
            ..Default::default()
        };
        year.add_account_transcript(first);
        year.add_account_transcript(second);

        assert!(year.has_return_filed());
        assert_eq!(year.ledger_agi(), 45_000.0);
        assert_eq!(year.transactions.len(), 2);
    }
}
