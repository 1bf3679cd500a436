// ⚖️ Discrepancy Analyzer - Wage & income forms vs. the account transcript
//
// Per year: how far reported form income is from the ledger AGI, whether a
// return was filed, what an unfiled year would owe, how urgent it is, and
// which owner's forms look absent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aggregate::{YearAggregate, YearAggregates};
use crate::filing::FilingStatus;
use crate::money::format_currency;
use crate::owner::Owner;
use crate::projection::TaxTable;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnStatus {
    Filed,
    NotFiled,
}

impl ReturnStatus {
    pub fn name(&self) -> &str {
        match self {
            ReturnStatus::Filed => "Filed",
            ReturnStatus::NotFiled => "Not Filed",
        }
    }
}

/// How an unfiled year's liability treats withholding in excess of the tax
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnfiledLiabilityMode {
    /// max(0, tax - withholding)
    #[default]
    Floored,
    /// tax - withholding; negative means a refund position
    Signed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerThresholds {
    /// |discrepancy| above this on a filed year calls for an amendment
    pub amendment: f64,
    /// Priority 2 above this
    pub high: f64,
    /// Priority 1 above this
    pub urgent: f64,
}

impl Default for AnalyzerThresholds {
    fn default() -> Self {
        AnalyzerThresholds {
            amendment: 1_000.0,
            high: 5_000.0,
            urgent: 10_000.0,
        }
    }
}

impl AnalyzerThresholds {
    /// 1 = urgent, 2 = high, 3 = medium
    pub fn priority(&self, amount: f64) -> u8 {
        if amount > self.urgent {
            1
        } else if amount > self.high {
            2
        } else {
            3
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerAnalysis {
    pub filing_status: FilingStatus,
    pub taxpayer_has_income: bool,
    pub spouse_has_income: bool,
    pub missing_taxpayer_data: bool,
    pub missing_spouse_data: bool,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyFinding {
    pub tax_year: i32,
    /// SE + Non-SE form income
    pub wage_income_total: f64,
    pub total_withholding: f64,
    pub ledger_agi: f64,
    /// Form income minus ledger AGI (AGI is 0 when there is no ledger for the year)
    pub income_discrepancy: f64,
    pub return_status: ReturnStatus,
    pub needs_amendment: bool,
    pub unfiled_liability: f64,
    pub priority_level: u8,
    pub recommendations: Vec<String>,
    pub owner_analysis: OwnerAnalysis,
}

// ============================================================================
// UNFILED LIABILITY
// ============================================================================

/// Tax on income after the standard deduction, less withholding, never negative
pub fn unfiled_liability_floored(
    table: &TaxTable,
    income: f64,
    withholding: f64,
    status: FilingStatus,
) -> f64 {
    unfiled_liability_signed(table, income, withholding, status).max(0.0)
}

/// Tax on income after the standard deduction, less withholding
pub fn unfiled_liability_signed(
    table: &TaxTable,
    income: f64,
    withholding: f64,
    status: FilingStatus,
) -> f64 {
    let tax = table
        .schedule(status)
        .map(|schedule| schedule.tax_on_income(income))
        .unwrap_or(0.0);
    tax - withholding
}

// ============================================================================
// OWNER ANALYSIS
// ============================================================================

/// Joint forms count for neither side
pub fn analyze_owners(year: &YearAggregate, status: FilingStatus) -> OwnerAnalysis {
    let taxpayer_has_income = year.owner(Owner::Taxpayer).income > 0.0;
    let spouse_has_income = year.owner(Owner::Spouse).income > 0.0;

    let mut analysis = OwnerAnalysis {
        filing_status: status,
        taxpayer_has_income,
        spouse_has_income,
        missing_taxpayer_data: false,
        missing_spouse_data: false,
        recommendations: Vec::new(),
    };

    if status.is_married() {
        match (taxpayer_has_income, spouse_has_income) {
            (true, false) => {
                analysis.missing_spouse_data = true;
                analysis
                    .recommendations
                    .push("Spouse income data appears to be missing".to_string());
            }
            (false, true) => {
                analysis.missing_taxpayer_data = true;
                analysis
                    .recommendations
                    .push("Taxpayer income data appears to be missing".to_string());
            }
            (false, false) => {
                analysis
                    .recommendations
                    .push("No income data found for either taxpayer or spouse".to_string());
            }
            (true, true) => {}
        }
    } else if !taxpayer_has_income {
        analysis.missing_taxpayer_data = true;
        analysis
            .recommendations
            .push("No taxpayer income data found".to_string());
    }

    analysis
}

// ============================================================================
// ANALYZER
// ============================================================================

pub struct DiscrepancyAnalyzer {
    unfiled_table: TaxTable,
    thresholds: AnalyzerThresholds,
    mode: UnfiledLiabilityMode,
}

impl DiscrepancyAnalyzer {
    pub fn new() -> Self {
        DiscrepancyAnalyzer {
            unfiled_table: TaxTable::unfiled_2024(),
            thresholds: AnalyzerThresholds::default(),
            mode: UnfiledLiabilityMode::default(),
        }
    }

    pub fn with_table(mut self, table: TaxTable) -> Self {
        self.unfiled_table = table;
        self
    }

    pub fn with_thresholds(mut self, thresholds: AnalyzerThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_mode(mut self, mode: UnfiledLiabilityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn thresholds(&self) -> &AnalyzerThresholds {
        &self.thresholds
    }

    /// One finding per year present in the aggregates
    pub fn analyze(&self, years: &YearAggregates) -> BTreeMap<i32, DiscrepancyFinding> {
        years
            .iter()
            .map(|(tax_year, year)| (*tax_year, self.analyze_year(year)))
            .collect()
    }

    pub fn analyze_year(&self, year: &YearAggregate) -> DiscrepancyFinding {
        let wage_income_total = year.wage_income_total();
        let total_withholding = year.total_withholding();
        let ledger_agi = year.ledger_agi();
        // ledger_agi is 0 when the year has no account transcript
        let income_discrepancy = wage_income_total - ledger_agi;

        let return_status = if year.has_return_filed() {
            ReturnStatus::Filed
        } else {
            ReturnStatus::NotFiled
        };

        let filing_status = year
            .ledger_summary
            .as_ref()
            .and_then(|s| s.parsed_filing_status())
            .unwrap_or_default();

        let needs_amendment = return_status == ReturnStatus::Filed
            && income_discrepancy.abs() > self.thresholds.amendment;

        let unfiled_liability = if return_status == ReturnStatus::NotFiled && wage_income_total > 0.0 {
            self.unfiled_liability(wage_income_total, total_withholding, filing_status)
        } else {
            0.0
        };

        let priority_level = match return_status {
            ReturnStatus::NotFiled => self.thresholds.priority(unfiled_liability),
            ReturnStatus::Filed => self.thresholds.priority(income_discrepancy.abs()),
        };

        let mut recommendations = self.recommendations(
            return_status,
            income_discrepancy,
            needs_amendment,
            unfiled_liability,
        );
        let owner_analysis = analyze_owners(year, filing_status);
        recommendations.extend(owner_analysis.recommendations.iter().cloned());

        tracing::debug!(
            year = year.tax_year,
            status = return_status.name(),
            discrepancy = income_discrepancy,
            priority = priority_level,
            "Year analyzed"
        );

        DiscrepancyFinding {
            tax_year: year.tax_year,
            wage_income_total,
            total_withholding,
            ledger_agi,
            income_discrepancy,
            return_status,
            needs_amendment,
            unfiled_liability,
            priority_level,
            recommendations,
            owner_analysis,
        }
    }

    fn unfiled_liability(&self, income: f64, withholding: f64, status: FilingStatus) -> f64 {
        match self.mode {
            UnfiledLiabilityMode::Floored => {
                unfiled_liability_floored(&self.unfiled_table, income, withholding, status)
            }
            UnfiledLiabilityMode::Signed => {
                unfiled_liability_signed(&self.unfiled_table, income, withholding, status)
            }
        }
    }

    fn recommendations(
        &self,
        status: ReturnStatus,
        discrepancy: f64,
        needs_amendment: bool,
        liability: f64,
    ) -> Vec<String> {
        let t = &self.thresholds;
        let mut out = Vec::new();

        match status {
            ReturnStatus::NotFiled => {
                let amount = format_currency(liability);
                if liability > t.urgent {
                    out.push(format!(
                        "URGENT: Unfiled return with estimated liability of {}",
                        amount
                    ));
                    out.push("Consider filing immediately to stop penalty accumulation".to_string());
                } else if liability > t.high {
                    out.push(format!(
                        "High priority: Unfiled return with estimated liability of {}",
                        amount
                    ));
                    out.push("File return to minimize penalties and interest".to_string());
                } else if liability > 0.0 {
                    out.push(format!("File return to address {} estimated liability", amount));
                } else {
                    out.push(
                        "Return appears to have no tax liability - consider filing for refund"
                            .to_string(),
                    );
                }
            }
            ReturnStatus::Filed => {
                if needs_amendment && discrepancy > 0.0 {
                    let amount = format_currency(discrepancy);
                    if discrepancy > t.urgent {
                        out.push(format!(
                            "URGENT: Consider amended return for unreported income of {}",
                            amount
                        ));
                    } else if discrepancy > t.high {
                        out.push(format!("Review potential unreported income of {}", amount));
                        out.push(
                            "Consider amended return if income was legitimately excluded".to_string(),
                        );
                    } else {
                        out.push(format!("Minor discrepancy of {} - review for accuracy", amount));
                    }
                } else if discrepancy < 0.0 {
                    out.push(format!(
                        "AT shows {} more income than WI forms",
                        format_currency(discrepancy.abs())
                    ));
                    out.push("Verify if additional income sources were properly reported".to_string());
                }
            }
        }

        if out.is_empty() {
            out.push("No significant issues detected - review for completeness".to_string());
        }
        out
    }
}

impl Default for DiscrepancyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::test_support::{form, transaction};
    use crate::catalog::FormCategory;
    use crate::ledger::{AccountTranscript, LedgerSummary};
    use pretty_assertions::assert_eq;

    fn transcript(agi: f64, codes: &[&str], status: Option<&str>) -> AccountTranscript {
        AccountTranscript {
            summary: LedgerSummary {
                adjusted_gross_income: agi,
                filing_status: status.map(str::to_string),
                ..Default::default()
            },
            transactions: codes.iter().map(|c| transaction(c)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_filed_year_with_unreported_income() {
        let mut year = YearAggregate::new(2022);
        year.add_form(form("W-2", FormCategory::NonSelfEmployment, Owner::Taxpayer, 60_000.0, 6_000.0));
        year.add_form(form("SSA-1099", FormCategory::Neither, Owner::Taxpayer, 9_000.0, 0.0));
        year.add_account_transcript(transcript(45_000.0, &["150", "806"], Some("Single")));

        let mut years = YearAggregates::new();
        years.insert(2022, year);
        let findings = DiscrepancyAnalyzer::new().analyze(&years);
        let finding = &findings[&2022];

        assert_eq!(finding.wage_income_total, 60_000.0);
        assert_eq!(finding.income_discrepancy, 15_000.0);
        assert_eq!(finding.return_status, ReturnStatus::Filed);
        assert!(finding.needs_amendment);
        assert_eq!(finding.unfiled_liability, 0.0);
        assert_eq!(finding.priority_level, 1);
        assert_eq!(
            finding.recommendations,
            vec!["URGENT: Consider amended return for unreported income of $15,000.00".to_string()]
        );
    }

    #[test]
    fn test_small_discrepancy_does_not_need_amendment() {
        let mut year = YearAggregate::new(2022);
        year.add_form(form("W-2", FormCategory::NonSelfEmployment, Owner::Taxpayer, 45_800.0, 0.0));
        year.add_account_transcript(transcript(45_000.0, &["150"], None));
        let finding = DiscrepancyAnalyzer::new().analyze_year(&year);

        assert!(!finding.needs_amendment);
        assert_eq!(finding.priority_level, 3);
        assert_eq!(
            finding.recommendations,
            vec!["No significant issues detected - review for completeness".to_string()]
        );
    }

    #[test]
    fn test_ledger_shows_more_income() {
        let mut year = YearAggregate::new(2021);
        year.add_form(form("W-2", FormCategory::NonSelfEmployment, Owner::Taxpayer, 30_000.0, 0.0));
        year.add_account_transcript(transcript(36_000.0, &["976"], None));
        let finding = DiscrepancyAnalyzer::new().analyze_year(&year);

        assert_eq!(finding.income_discrepancy, -6_000.0);
        assert!(finding.needs_amendment);
        assert_eq!(finding.priority_level, 2);
        assert_eq!(
            finding.recommendations[0],
            "AT shows $6,000.00 more income than WI forms"
        );
    }

    #[test]
    fn test_forms_without_account_transcript() {
        let mut year = YearAggregate::new(2022);
        year.add_form(form("W-2", FormCategory::NonSelfEmployment, Owner::Taxpayer, 60_000.0, 6_000.0));
        let finding = DiscrepancyAnalyzer::new().analyze_year(&year);

        // No ledger means AGI 0, so all form income is unaccounted for
        assert_eq!(finding.ledger_agi, 0.0);
        assert_eq!(finding.income_discrepancy, 60_000.0);
        assert_eq!(finding.return_status, ReturnStatus::NotFiled);
        assert!(!finding.needs_amendment);
        // 45,400 taxable => 5,216 tax, covered by 6,000 withheld
        assert_eq!(finding.unfiled_liability, 0.0);
        assert_eq!(finding.priority_level, 3);
    }

    #[test]
    fn test_unfiled_year_liability_and_priority() {
        let mut year = YearAggregate::new(2023);
        year.add_form(form("1099-NEC", FormCategory::SelfEmployment, Owner::Taxpayer, 80_000.0, 0.0));
        year.add_account_transcript(transcript(0.0, &[], Some("Single")));
        let finding = DiscrepancyAnalyzer::new().analyze_year(&year);

        // 65,400 taxable on the unfiled single schedule
        let expected = 1_160.0 + 4_266.0 + (65_400.0 - 47_150.0) * 0.22;
        assert_eq!(finding.return_status, ReturnStatus::NotFiled);
        assert!(!finding.needs_amendment);
        assert!((finding.unfiled_liability - expected).abs() < 1e-6);
        assert_eq!(finding.priority_level, 2);
        assert!(finding.recommendations[0].starts_with("High priority: Unfiled return"));
    }

    #[test]
    fn test_unfiled_flooring_modes() {
        let table = TaxTable::unfiled_2024();
        // 20,000 - 14,600 = 5,400 taxable => 540 tax
        let floored = unfiled_liability_floored(&table, 20_000.0, 2_000.0, FilingStatus::Single);
        let signed = unfiled_liability_signed(&table, 20_000.0, 2_000.0, FilingStatus::Single);
        assert_eq!(floored, 0.0);
        assert!((signed - (540.0 - 2_000.0)).abs() < 1e-6);

        let mut year = YearAggregate::new(2023);
        year.add_form(form("W-2", FormCategory::NonSelfEmployment, Owner::Taxpayer, 20_000.0, 2_000.0));
        let finding = DiscrepancyAnalyzer::new()
            .with_mode(UnfiledLiabilityMode::Signed)
            .analyze_year(&year);
        assert!(finding.unfiled_liability < 0.0);
        assert_eq!(finding.priority_level, 3);
        assert_eq!(
            finding.recommendations[0],
            "Return appears to have no tax liability - consider filing for refund"
        );
    }

    #[test]
    fn test_missing_spouse_on_joint_return() {
        let mut year = YearAggregate::new(2023);
        year.add_form(form("W-2", FormCategory::NonSelfEmployment, Owner::Taxpayer, 50_000.0, 9_000.0));
        year.add_account_transcript(transcript(50_000.0, &["150"], Some("Married Filing Joint")));
        let finding = DiscrepancyAnalyzer::new().analyze_year(&year);

        assert_eq!(finding.owner_analysis.filing_status, FilingStatus::MarriedFilingJointly);
        assert!(finding.owner_analysis.missing_spouse_data);
        assert!(finding
            .recommendations
            .contains(&"Spouse income data appears to be missing".to_string()));
    }

    #[test]
    fn test_single_without_taxpayer_income() {
        let mut year = YearAggregate::new(2023);
        year.add_form(form("W-2", FormCategory::NonSelfEmployment, Owner::Joint, 10_000.0, 0.0));
        let analysis = analyze_owners(&year, FilingStatus::Single);
        assert!(analysis.missing_taxpayer_data);
        assert_eq!(analysis.recommendations, vec!["No taxpayer income data found".to_string()]);
    }
}
