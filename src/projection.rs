// 🧮 Tax Projection Engine - Substitute-for-return liability per year
//
// SE tax, standard deduction, a marginal bracket walk, then failure-to-file,
// failure-to-pay and interest on a positive balance. Non-positive balances
// are reported signed with no penalties.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aggregate::{YearAggregate, YearAggregates};
use crate::filing::FilingStatus;

// ============================================================================
// BRACKET TABLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub lower: f64,
    /// None for the open top bracket
    pub upper: Option<f64>,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketSchedule {
    pub standard_deduction: f64,
    pub brackets: Vec<Bracket>,
}

impl BracketSchedule {
    /// Build from ascending upper edges; the last rate applies above the last edge
    pub fn from_edges(standard_deduction: f64, edges: &[f64], rates: &[f64]) -> Self {
        let mut brackets = Vec::with_capacity(rates.len());
        let mut lower = 0.0;
        for (i, rate) in rates.iter().enumerate() {
            let upper = edges.get(i).copied();
            brackets.push(Bracket {
                lower,
                upper,
                rate: *rate,
            });
            if let Some(upper) = upper {
                lower = upper;
            }
        }
        BracketSchedule {
            standard_deduction,
            brackets,
        }
    }

    pub fn tax(&self, taxable_income: f64) -> f64 {
        bracket_tax(&self.brackets, taxable_income)
    }

    /// Tax on gross income after the standard deduction
    pub fn tax_on_income(&self, income: f64) -> f64 {
        self.tax((income - self.standard_deduction).max(0.0))
    }
}

/// Walk ordered brackets, stopping at the first lower bound not exceeded
pub fn bracket_tax(brackets: &[Bracket], taxable_income: f64) -> f64 {
    let mut tax = 0.0;
    for bracket in brackets {
        if taxable_income <= bracket.lower {
            break;
        }
        let top = match bracket.upper {
            Some(upper) => taxable_income.min(upper),
            None => taxable_income,
        };
        tax += (top - bracket.lower) * bracket.rate;
    }
    tax
}

const RATES: [f64; 7] = [0.10, 0.12, 0.22, 0.24, 0.32, 0.35, 0.37];

/// A named set of schedules. Statuses without a schedule use `fallback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxTable {
    pub name: String,
    pub schedules: BTreeMap<FilingStatus, BracketSchedule>,
    #[serde(default)]
    pub fallback: FilingStatus,
}

impl TaxTable {
    /// Schedules used for substitute-for-return assessments
    pub fn sfr_2023() -> Self {
        let single = BracketSchedule::from_edges(
            13_850.0,
            &[11_000.0, 44_725.0, 95_375.0, 182_100.0, 231_250.0, 578_125.0],
            &RATES,
        );
        let joint = BracketSchedule::from_edges(
            27_700.0,
            &[22_000.0, 89_450.0, 190_750.0, 364_200.0, 462_500.0, 693_750.0],
            &RATES,
        );
        let separate = BracketSchedule::from_edges(
            13_850.0,
            &[11_000.0, 44_725.0, 95_375.0, 182_100.0, 231_250.0, 346_875.0],
            &RATES,
        );
        let head = BracketSchedule::from_edges(
            20_800.0,
            &[15_700.0, 59_850.0, 95_350.0, 182_100.0, 231_250.0, 578_100.0],
            &RATES,
        );

        let mut schedules = BTreeMap::new();
        schedules.insert(FilingStatus::Single, single);
        schedules.insert(FilingStatus::MarriedFilingJointly, joint.clone());
        schedules.insert(FilingStatus::MarriedFilingSeparately, separate);
        schedules.insert(FilingStatus::HeadOfHousehold, head);
        schedules.insert(FilingStatus::QualifyingWidow, joint);

        TaxTable {
            name: "SFR 2023".to_string(),
            schedules,
            fallback: FilingStatus::Single,
        }
    }

    /// Simplified single/joint schedules for estimating an unfiled year
    pub fn unfiled_2024() -> Self {
        let single = BracketSchedule::from_edges(
            14_600.0,
            &[11_600.0, 47_150.0, 100_525.0, 191_950.0, 243_725.0, 609_350.0],
            &RATES,
        );
        let joint = BracketSchedule::from_edges(
            29_200.0,
            &[23_200.0, 94_300.0, 201_050.0, 383_900.0, 487_450.0, 731_200.0],
            &RATES,
        );

        let mut schedules = BTreeMap::new();
        schedules.insert(FilingStatus::Single, single);
        schedules.insert(FilingStatus::MarriedFilingJointly, joint);

        TaxTable {
            name: "Unfiled estimate 2024".to_string(),
            schedules,
            fallback: FilingStatus::Single,
        }
    }

    pub fn schedule(&self, status: FilingStatus) -> Option<&BracketSchedule> {
        self.schedules
            .get(&status)
            .or_else(|| self.schedules.get(&self.fallback))
    }
}

// ============================================================================
// RATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyRates {
    pub social_security_wage_base: f64,
    pub social_security_rate: f64,
    pub medicare_rate: f64,
    /// Failure to file, per month late
    pub failure_to_file_monthly: f64,
    /// Failure to file cap, as a fraction of the base
    pub failure_to_file_cap: f64,
    /// Failure to pay, per month late
    pub failure_to_pay_monthly: f64,
    pub annual_interest_rate: f64,
}

impl Default for PenaltyRates {
    fn default() -> Self {
        PenaltyRates {
            social_security_wage_base: 160_200.0,
            social_security_rate: 0.124,
            medicare_rate: 0.029,
            failure_to_file_monthly: 0.05,
            failure_to_file_cap: 0.25,
            failure_to_pay_monthly: 0.005,
            annual_interest_rate: 0.08,
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Derived view; recomputed from a YearAggregate on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionResult {
    pub tax_year: i32,
    pub filing_status: FilingStatus,
    pub months_late: u32,

    pub se_income: f64,
    pub non_se_income: f64,
    pub total_withholding: f64,
    pub standard_deduction: f64,
    pub taxable_income: f64,
    pub se_tax: f64,
    pub federal_tax: f64,

    pub base_tax_owed: f64,
    pub failure_to_file_penalty: f64,
    pub failure_to_pay_penalty: f64,
    pub interest: f64,
    /// Signed; equals `base_tax_owed` when that is not positive
    pub total_owed: f64,
}

impl ProjectionResult {
    pub fn is_refund_position(&self) -> bool {
        self.total_owed < 0.0
    }
}

pub struct TaxProjectionEngine {
    table: TaxTable,
    rates: PenaltyRates,
    as_of_year: i32,
}

impl TaxProjectionEngine {
    pub fn new(table: TaxTable, rates: PenaltyRates, as_of_year: i32) -> Self {
        TaxProjectionEngine {
            table,
            rates,
            as_of_year,
        }
    }

    pub fn table(&self) -> &TaxTable {
        &self.table
    }

    pub fn self_employment_tax(&self, se_income: f64) -> f64 {
        let se_income = se_income.max(0.0);
        se_income.min(self.rates.social_security_wage_base) * self.rates.social_security_rate
            + se_income * self.rates.medicare_rate
    }

    pub fn project(
        &self,
        year: &YearAggregate,
        filing_status: FilingStatus,
        months_late: u32,
    ) -> ProjectionResult {
        let se_income = year.se_income();
        let non_se_income = year.non_se_income();
        let total_withholding = year.total_withholding();

        let (standard_deduction, brackets) = match self.table.schedule(filing_status) {
            Some(schedule) => (schedule.standard_deduction, schedule.brackets.as_slice()),
            None => {
                tracing::warn!(table = %self.table.name, status = %filing_status, "No bracket schedule");
                (0.0, &[][..])
            }
        };

        let se_tax = self.self_employment_tax(se_income);
        let taxable_income = (se_income + non_se_income - standard_deduction).max(0.0);
        let federal_tax = bracket_tax(brackets, taxable_income);
        let base_tax_owed = se_tax + federal_tax - total_withholding;

        let months = months_late as f64;
        let (ftf, ftp, interest, total_owed) = if base_tax_owed > 0.0 {
            let r = &self.rates;
            let ftf = (base_tax_owed * r.failure_to_file_monthly * months)
                .min(base_tax_owed * r.failure_to_file_cap);
            let ftp = base_tax_owed * r.failure_to_pay_monthly * months;
            let years_since_due = (self.as_of_year - year.tax_year).max(0) as f64;
            let interest = base_tax_owed * r.annual_interest_rate * (years_since_due + months / 12.0);
            (ftf, ftp, interest, base_tax_owed + ftf + ftp + interest)
        } else {
            (0.0, 0.0, 0.0, base_tax_owed)
        };

        ProjectionResult {
            tax_year: year.tax_year,
            filing_status,
            months_late,
            se_income,
            non_se_income,
            total_withholding,
            standard_deduction,
            taxable_income,
            se_tax,
            federal_tax,
            base_tax_owed,
            failure_to_file_penalty: ftf,
            failure_to_pay_penalty: ftp,
            interest,
            total_owed,
        }
    }

    pub fn project_all(
        &self,
        years: &YearAggregates,
        filing_status: FilingStatus,
        months_late: u32,
    ) -> BTreeMap<i32, ProjectionResult> {
        years
            .iter()
            .map(|(year, aggregate)| (*year, self.project(aggregate, filing_status, months_late)))
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
