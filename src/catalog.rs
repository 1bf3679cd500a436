// 📚 Form Catalog - Form patterns as data
// Ordered form definitions (body regex, field regexes, identifier rules,
// income/withholding rules, category), loaded from JSON or the built-in set.

use anyhow::{Context as AnyhowContext, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::filing::FilingStatus;

// ============================================================================
// CATEGORY & FIELD VALUES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FormCategory {
    #[serde(rename = "SE")]
    SelfEmployment,
    #[serde(rename = "Non-SE")]
    NonSelfEmployment,
    Neither,
}

impl FormCategory {
    pub const ALL: [FormCategory; 3] = [
        FormCategory::SelfEmployment,
        FormCategory::NonSelfEmployment,
        FormCategory::Neither,
    ];

    pub fn label(&self) -> &str {
        match self {
            FormCategory::SelfEmployment => "SE",
            FormCategory::NonSelfEmployment => "Non-SE",
            FormCategory::Neither => "Neither",
        }
    }
}

/// A parsed field: first match for single-valued fields, every match for
/// multi-valued ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(f64),
    Multi(Vec<f64>),
}

impl FieldValue {
    pub fn total(&self) -> f64 {
        match self {
            FieldValue::Single(v) => *v,
            FieldValue::Multi(values) => values.iter().sum(),
        }
    }
}

pub type FieldMap = BTreeMap<String, FieldValue>;

// ============================================================================
// CALCULATION RULES
// ============================================================================

/// Which inputs beyond the form's own fields a rule consumes.
///
/// `CombinedIncomeDependent` rules are evaluated in a second pass, after
/// every other form of the same year has been summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalculationKind {
    Simple,
    FilingStatusDependent,
    CombinedIncomeDependent,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalculationError {
    #[error("field '{0}' holds a non-finite value")]
    NonFiniteField(String),

    #[error("no exclusion configured for filing status {0}")]
    MissingExclusion(FilingStatus),

    #[error("rule produced a non-finite result")]
    NonFiniteResult,
}

/// Inputs a rule may consume. Simple rules ignore everything here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleInputs {
    pub tax_year: i32,
    pub filing_status: FilingStatus,
    pub combined_income: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum IncomeRule {
    /// Sum of the named fields
    Sum { fields: Vec<String> },

    /// The form never contributes income (informational forms)
    Zero,

    /// Sum of the named fields less a per-status exclusion, floored at 0.
    /// When `years` is non-empty the exclusion only applies in those years.
    SumLessExclusion {
        fields: Vec<String>,
        exclusions: BTreeMap<FilingStatus, f64>,
        #[serde(default)]
        years: Vec<i32>,
    },

    /// Taxable portion of social-security benefits (provisional-income worksheet)
    BenefitsWorksheet { benefits_field: String },
}

impl IncomeRule {
    pub fn kind(&self) -> CalculationKind {
        match self {
            IncomeRule::Sum { .. } | IncomeRule::Zero => CalculationKind::Simple,
            IncomeRule::SumLessExclusion { .. } => CalculationKind::FilingStatusDependent,
            IncomeRule::BenefitsWorksheet { .. } => CalculationKind::CombinedIncomeDependent,
        }
    }

    pub fn evaluate(&self, fields: &FieldMap, inputs: &RuleInputs) -> Result<f64, CalculationError> {
        let value = match self {
            IncomeRule::Sum { fields: names } => sum_fields(fields, names)?,
            IncomeRule::Zero => 0.0,
            IncomeRule::SumLessExclusion {
                fields: names,
                exclusions,
                years,
            } => {
                let gross = sum_fields(fields, names)?;
                let exclusion = if years.is_empty() || years.contains(&inputs.tax_year) {
                    *exclusions
                        .get(&inputs.filing_status)
                        .ok_or(CalculationError::MissingExclusion(inputs.filing_status))?
                } else {
                    0.0
                };
                (gross - exclusion).max(0.0)
            }
            IncomeRule::BenefitsWorksheet { benefits_field } => {
                let benefits = sum_fields(fields, std::slice::from_ref(benefits_field))?;
                taxable_benefits(benefits, inputs.combined_income, inputs.filing_status)
            }
        };

        if value.is_finite() {
            Ok(value)
        } else {
            Err(CalculationError::NonFiniteResult)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WithholdingRule {
    #[default]
    None,
    Sum { fields: Vec<String> },
}

impl WithholdingRule {
    pub fn evaluate(&self, fields: &FieldMap) -> Result<f64, CalculationError> {
        match self {
            WithholdingRule::None => Ok(0.0),
            WithholdingRule::Sum { fields: names } => sum_fields(fields, names),
        }
    }
}

/// Sum the named fields; absent fields count as 0.
fn sum_fields(fields: &FieldMap, names: &[String]) -> Result<f64, CalculationError> {
    let mut total = 0.0;
    for name in names {
        if let Some(value) = fields.get(name) {
            let v = value.total();
            if !v.is_finite() {
                return Err(CalculationError::NonFiniteField(name.clone()));
            }
            total += v;
        }
    }
    Ok(total)
}

/// Base and adjusted-base provisional-income thresholds per filing status.
pub fn benefit_thresholds(status: FilingStatus) -> (f64, f64) {
    match status {
        FilingStatus::MarriedFilingJointly => (32_000.0, 44_000.0),
        FilingStatus::MarriedFilingSeparately => (0.0, 0.0),
        FilingStatus::Single | FilingStatus::HeadOfHousehold | FilingStatus::QualifyingWidow => {
            (25_000.0, 34_000.0)
        }
    }
}

/// Taxable social-security benefits.
///
/// Provisional income is the combined income of the year plus half the
/// benefits. At most 50% of benefits are taxable between the two thresholds
/// and at most 85% above the adjusted threshold.
pub fn taxable_benefits(benefits: f64, combined_income: f64, status: FilingStatus) -> f64 {
    if benefits <= 0.0 {
        return 0.0;
    }
    let provisional = combined_income + 0.5 * benefits;
    let (base, adjusted) = benefit_thresholds(status);

    if provisional <= base {
        return 0.0;
    }
    if status == FilingStatus::MarriedFilingSeparately {
        return (0.85 * benefits).min(0.85 * provisional);
    }
    if provisional <= adjusted {
        return (0.5 * benefits).min(0.5 * (provisional - base));
    }
    let lower_tier = (0.5 * benefits).min(0.5 * (adjusted - base));
    (0.85 * benefits).min(0.85 * (provisional - adjusted) + lower_tier)
}

// ============================================================================
// PATTERN DEFINITIONS (serde form)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,

    /// Regex with one capture group holding the value; applied case-insensitively
    pub regex: String,

    /// Collect every match instead of the first one
    #[serde(default)]
    pub multi_valued: bool,
}

impl FieldSpec {
    pub fn single(name: &str, regex: &str) -> Self {
        FieldSpec {
            name: name.to_string(),
            regex: regex.to_string(),
            multi_valued: false,
        }
    }

    pub fn multi(name: &str, regex: &str) -> Self {
        FieldSpec {
            name: name.to_string(),
            regex: regex.to_string(),
            multi_valued: true,
        }
    }
}

/// How to pull an identifier/label pair out of one occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierRule {
    /// Identification number (EIN / FIN)
    #[serde(default)]
    pub id_regex: Option<String>,

    /// Employer or payer name
    #[serde(default)]
    pub label_regex: Option<String>,

    /// Report "UNKNOWN" instead of null when a regex does not match
    #[serde(default)]
    pub placeholder_when_missing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormPattern {
    pub name: String,

    /// Locates each occurrence; compiled multi-line, case-sensitive
    pub body_regex: String,

    pub field_regexes: Vec<FieldSpec>,

    pub category: FormCategory,

    #[serde(default)]
    pub identifier: Option<IdentifierRule>,

    pub income_rule: IncomeRule,

    #[serde(default)]
    pub withholding_rule: WithholdingRule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default = "default_version")]
    version: String,
    patterns: Vec<FormPattern>,
}

fn default_version() -> String {
    "unversioned".to_string()
}

// ============================================================================
// COMPILED CATALOG
// ============================================================================

#[derive(Debug, Clone)]
pub struct CompiledField {
    pub name: String,
    pub regex: Regex,
    pub multi_valued: bool,
}

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub definition: FormPattern,
    pub body: Regex,
    pub fields: Vec<CompiledField>,
    pub id_regex: Option<Regex>,
    pub label_regex: Option<Regex>,
}

impl CompiledPattern {
    fn compile(definition: FormPattern) -> Result<Self> {
        let body = RegexBuilder::new(&definition.body_regex)
            .multi_line(true)
            .build()
            .with_context(|| format!("Invalid body regex for form {}", definition.name))?;

        let mut fields = Vec::with_capacity(definition.field_regexes.len());
        for spec in &definition.field_regexes {
            let regex = RegexBuilder::new(&spec.regex)
                .case_insensitive(true)
                .build()
                .with_context(|| {
                    format!("Invalid regex for field '{}' of form {}", spec.name, definition.name)
                })?;
            fields.push(CompiledField {
                name: spec.name.clone(),
                regex,
                multi_valued: spec.multi_valued,
            });
        }

        let (id_regex, label_regex) = match &definition.identifier {
            Some(rule) => (
                compile_optional(rule.id_regex.as_deref(), &definition.name)?,
                compile_optional(rule.label_regex.as_deref(), &definition.name)?,
            ),
            None => (None, None),
        };

        Ok(CompiledPattern {
            definition,
            body,
            fields,
            id_regex,
            label_regex,
        })
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn category(&self) -> FormCategory {
        self.definition.category
    }

    pub fn calculation_kind(&self) -> CalculationKind {
        self.definition.income_rule.kind()
    }
}

fn compile_optional(pattern: Option<&str>, form: &str) -> Result<Option<Regex>> {
    pattern
        .map(|p| {
            Regex::new(p).with_context(|| format!("Invalid identifier regex for form {}", form))
        })
        .transpose()
}

/// Ordered, compiled collection of form patterns. Read-only once built.
#[derive(Debug, Clone)]
pub struct FormCatalog {
    version: String,
    patterns: Vec<CompiledPattern>,
}

impl FormCatalog {
    /// Compile patterns in the given order
    pub fn from_patterns(version: &str, patterns: Vec<FormPattern>) -> Result<Self> {
        let compiled = patterns
            .into_iter()
            .map(CompiledPattern::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(FormCatalog {
            version: version.to_string(),
            patterns: compiled,
        })
    }

    /// Load a catalog from a JSON file: `{"version": "...", "patterns": [...]}`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read form catalog: {:?}", path))?;

        let file: CatalogFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse form catalog JSON: {:?}", path))?;

        let catalog = Self::from_patterns(&file.version, file.patterns)?;
        tracing::info!(
            version = %catalog.version,
            patterns = catalog.len(),
            "Loaded form catalog from {:?}",
            path
        );
        Ok(catalog)
    }

    /// The built-in catalog of wage & income forms
    pub fn standard() -> Result<Self> {
        Self::from_patterns("standard", standard_patterns())
    }

    /// Serialize the definitions back to catalog JSON
    pub fn to_json(&self) -> Result<String> {
        let file = CatalogFile {
            version: self.version.clone(),
            patterns: self.patterns.iter().map(|p| p.definition.clone()).collect(),
        };
        serde_json::to_string_pretty(&file).context("Failed to serialize form catalog")
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    pub fn get(&self, name: &str) -> Option<&CompiledPattern> {
        self.patterns.iter().find(|p| p.name() == name)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

// ============================================================================
// BUILT-IN PATTERNS
// ============================================================================

const FIN_REGEX: &str = r"Payer's Federal Identification Number \(FIN\):\s*([\d\-]+)";
const PAYER_REGEX: &str = r"Payer:\s*([A-Z0-9 &.,\-]+)";

/// `<label>: $1,234.56` with optional colon and dollar sign
fn money_field(name: &str, label: &str) -> FieldSpec {
    FieldSpec::single(name, &format!(r"(?:{})[:\s]*\$?\s*([\d,.]+)", label))
}

fn names(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|s| s.to_string()).collect()
}

fn sum(fields: &[&str]) -> IncomeRule {
    IncomeRule::Sum { fields: names(fields) }
}

fn withheld(fields: &[&str]) -> WithholdingRule {
    WithholdingRule::Sum { fields: names(fields) }
}

fn payer_only() -> Option<IdentifierRule> {
    Some(IdentifierRule {
        id_regex: None,
        label_regex: Some(PAYER_REGEX.to_string()),
        placeholder_when_missing: false,
    })
}

pub fn standard_patterns() -> Vec<FormPattern> {
    vec![
        FormPattern {
            name: "W-2".to_string(),
            body_regex: r"Form W-2\b".to_string(),
            field_regexes: vec![
                money_field("Wages", r"Wages, tips,? (?:and )?other compensation"),
                money_field("Federal Withholding", r"Federal income tax withheld"),
                money_field("Social Security Wages", r"Social security wages"),
                money_field("Social Security Tax", r"Social security tax withheld"),
                money_field("Medicare Wages", r"Medicare wages and tips"),
                money_field("Medicare Tax", r"Medicare tax withheld"),
            ],
            category: FormCategory::NonSelfEmployment,
            identifier: Some(IdentifierRule {
                id_regex: Some(r"Employer Identification Number \(EIN\):\s*([\d\-]+)".to_string()),
                label_regex: Some(r"Employer:\s*([A-Z0-9 &.,\-]+)".to_string()),
                placeholder_when_missing: true,
            }),
            income_rule: sum(&["Wages"]),
            withholding_rule: withheld(&["Federal Withholding"]),
        },
        FormPattern {
            name: "1099-INT".to_string(),
            body_regex: r"Form 1099-INT\b".to_string(),
            field_regexes: vec![
                money_field("Interest Income", r"Interest income"),
                money_field("Federal Withholding", r"Federal income tax withheld"),
            ],
            category: FormCategory::NonSelfEmployment,
            identifier: Some(IdentifierRule {
                id_regex: Some(FIN_REGEX.to_string()),
                label_regex: Some(PAYER_REGEX.to_string()),
                placeholder_when_missing: true,
            }),
            income_rule: sum(&["Interest Income"]),
            withholding_rule: withheld(&["Federal Withholding"]),
        },
        FormPattern {
            name: "1099-DIV".to_string(),
            body_regex: r"Form 1099-DIV\b".to_string(),
            field_regexes: vec![
                money_field("Total Ordinary Dividends", r"Total ordinary dividends"),
                money_field("Qualified Dividends", r"Qualified dividends"),
                money_field("Federal Withholding", r"Federal income tax withheld"),
            ],
            category: FormCategory::NonSelfEmployment,
            identifier: payer_only(),
            income_rule: sum(&["Total Ordinary Dividends"]),
            withholding_rule: withheld(&["Federal Withholding"]),
        },
        FormPattern {
            name: "1099-MISC".to_string(),
            body_regex: r"Form 1099-MISC\b".to_string(),
            field_regexes: vec![
                money_field("Non-Employee Compensation", r"Non[- ]?Employee[- ]?Compensation"),
                money_field("Medical Payments", r"Medical[- ]?Payments"),
                money_field("Fishing Income", r"Fishing[- ]?Income"),
                money_field("Rents", r"Rents"),
                money_field("Royalties", r"Royalties"),
                money_field("Attorney Fees", r"Attorney[- ]?Fees"),
                money_field("Other Income", r"Other[- ]?Income"),
                money_field(
                    "Substitute for Dividends",
                    r"Substitute[- ]?Payments[- ]?for[- ]?Dividends",
                ),
                money_field("Crop Insurance", r"Crop[- ]?Insurance"),
                money_field("Federal Withholding", r"Federal[\s,]*income[\s,]*tax[\s,]*withheld"),
            ],
            category: FormCategory::SelfEmployment,
            identifier: payer_only(),
            income_rule: sum(&[
                "Non-Employee Compensation",
                "Medical Payments",
                "Fishing Income",
                "Rents",
                "Royalties",
                "Attorney Fees",
                "Other Income",
                "Substitute for Dividends",
            ]),
            withholding_rule: withheld(&["Federal Withholding"]),
        },
        FormPattern {
            name: "1099-NEC".to_string(),
            body_regex: r"Form 1099-NEC\b".to_string(),
            field_regexes: vec![
                money_field("Non-Employee Compensation", r"Non[- ]?Employee[- ]?Compensation"),
                money_field("Federal Withholding", r"Federal[\s,]*income[\s,]*tax[\s,]*withheld"),
            ],
            category: FormCategory::SelfEmployment,
            identifier: payer_only(),
            income_rule: sum(&["Non-Employee Compensation"]),
            withholding_rule: withheld(&["Federal Withholding"]),
        },
        FormPattern {
            name: "1099-K".to_string(),
            body_regex: r"Form 1099-K\b".to_string(),
            field_regexes: vec![
                money_field(
                    "Gross Amount",
                    r"Gross amount of payment card/third party (?:network )?transactions",
                ),
                money_field("Federal Withholding", r"Federal income tax withheld"),
            ],
            category: FormCategory::SelfEmployment,
            identifier: payer_only(),
            income_rule: sum(&["Gross Amount"]),
            withholding_rule: withheld(&["Federal Withholding"]),
        },
        FormPattern {
            name: "1099-PATR".to_string(),
            body_regex: r"Form 1099-PATR\b".to_string(),
            field_regexes: vec![
                money_field("Patronage Dividends", r"Patronage dividends"),
                money_field("Non-Patronage Distribution", r"Non-patronage distribution"),
                money_field("Retained Allocations", r"Retained allocations"),
                money_field("Redemption Amount", r"Redemption amount"),
                money_field("Federal Withholding", r"Tax withheld"),
            ],
            category: FormCategory::SelfEmployment,
            identifier: payer_only(),
            income_rule: sum(&[
                "Patronage Dividends",
                "Non-Patronage Distribution",
                "Retained Allocations",
                "Redemption Amount",
            ]),
            withholding_rule: withheld(&["Federal Withholding"]),
        },
        FormPattern {
            name: "1099-G".to_string(),
            body_regex: r"Form 1099-G\b".to_string(),
            field_regexes: vec![
                money_field("Unemployment Compensation", r"Unemployment compensation"),
                money_field("Federal Withholding", r"Federal income tax withheld"),
            ],
            category: FormCategory::NonSelfEmployment,
            identifier: payer_only(),
            income_rule: IncomeRule::SumLessExclusion {
                fields: names(&["Unemployment Compensation"]),
                exclusions: FilingStatus::ALL
                    .iter()
                    .map(|status| {
                        let amount = if *status == FilingStatus::MarriedFilingJointly {
                            20_400.0
                        } else {
                            10_200.0
                        };
                        (*status, amount)
                    })
                    .collect(),
                years: vec![2020],
            },
            withholding_rule: withheld(&["Federal Withholding"]),
        },
        FormPattern {
            name: "1042-S".to_string(),
            body_regex: r"Form 1042-S\b".to_string(),
            field_regexes: vec![
                money_field("Gross Income", r"Gross income"),
                money_field("Federal Withholding", r"U\.S\. federal tax withheld"),
            ],
            category: FormCategory::Neither,
            identifier: None,
            income_rule: sum(&["Gross Income"]),
            withholding_rule: withheld(&["Federal Withholding"]),
        },
        FormPattern {
            name: "K-1 (Form 1065)".to_string(),
            body_regex: r"Schedule K-1 \(Form 1065\)".to_string(),
            field_regexes: vec![
                money_field("Royalties", r"Royalties"),
                money_field("Ordinary Income K-1", r"Ordinary income"),
                money_field("Real Estate", r"Real estate"),
                money_field("Other Rental", r"Other rental"),
                money_field("Guaranteed Payments", r"Guaranteed payments"),
                money_field("Section 179 Expenses", r"Section 179 expenses"),
            ],
            category: FormCategory::SelfEmployment,
            identifier: None,
            income_rule: sum(&[
                "Royalties",
                "Ordinary Income K-1",
                "Real Estate",
                "Other Rental",
                "Guaranteed Payments",
            ]),
            withholding_rule: WithholdingRule::None,
        },
        FormPattern {
            name: "K-1 (Form 1041)".to_string(),
            body_regex: r"Schedule K-1 \(Form 1041\)".to_string(),
            field_regexes: vec![
                money_field("Net Rental Real Estate Income", r"Net rental real estate income"),
                money_field("Other Rental Income", r"Other rental income"),
            ],
            category: FormCategory::Neither,
            identifier: None,
            income_rule: sum(&["Net Rental Real Estate Income", "Other Rental Income"]),
            withholding_rule: WithholdingRule::None,
        },
        FormPattern {
            name: "1098-T".to_string(),
            body_regex: r"Form 1098-T\b".to_string(),
            field_regexes: vec![
                FieldSpec::multi("TY Payments", r"Payments received for qualified tuition[:\s]*\$?\s*([\d,.]+)"),
                money_field("Scholarships", r"Scholarships or grants"),
            ],
            category: FormCategory::Neither,
            identifier: payer_only(),
            income_rule: IncomeRule::Zero,
            withholding_rule: WithholdingRule::None,
        },
        FormPattern {
            name: "SSA-1099".to_string(),
            body_regex: r"Form SSA-1099\b".to_string(),
            field_regexes: vec![
                money_field("Net Benefits", r"Net benefits"),
                money_field("Federal Withholding", r"Voluntary federal income tax withheld|Federal income tax withheld"),
            ],
            category: FormCategory::Neither,
            identifier: None,
            income_rule: IncomeRule::BenefitsWorksheet {
                benefits_field: "Net Benefits".to_string(),
            },
            withholding_rule: withheld(&["Federal Withholding"]),
        },
    ]
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn inputs(status: FilingStatus, combined: f64) -> RuleInputs {
        RuleInputs {
            tax_year: 2023,
            filing_status: status,
            combined_income: combined,
        }
    }

    fn fields(pairs: &[(&str, f64)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Single(*v)))
            .collect()
    }

    #[test]
    fn test_standard_catalog_compiles_in_order() {
        let catalog = FormCatalog::standard().unwrap();
        assert_eq!(catalog.patterns()[0].name(), "W-2");
        assert!(catalog.get("1099-INT").is_some());
        assert_eq!(
            catalog.get("SSA-1099").unwrap().calculation_kind(),
            CalculationKind::CombinedIncomeDependent
        );
        assert_eq!(
            catalog.get("1099-G").unwrap().calculation_kind(),
            CalculationKind::FilingStatusDependent
        );
        println!("✅ Standard catalog: {} patterns", catalog.len());
    }

    #[test]
    fn test_sum_rule_ignores_absent_fields() {
        let rule = IncomeRule::Sum {
            fields: vec!["Rents".to_string(), "Royalties".to_string()],
        };
        let value = rule
            .evaluate(&fields(&[("Rents", 1200.0)]), &inputs(FilingStatus::Single, 0.0))
            .unwrap();
        assert_eq!(value, 1200.0);
    }

    #[test]
    fn test_multi_valued_fields_are_summed() {
        let mut map = FieldMap::new();
        map.insert("TY Payments".to_string(), FieldValue::Multi(vec![100.0, 250.5]));
        let rule = WithholdingRule::Sum {
            fields: vec!["TY Payments".to_string()],
        };
        assert_eq!(rule.evaluate(&map).unwrap(), 350.5);
    }

    #[test]
    fn test_sum_less_exclusion_respects_years_and_floor() {
        let catalog = FormCatalog::standard().unwrap();
        let rule = &catalog.get("1099-G").unwrap().definition.income_rule;
        let map = fields(&[("Unemployment Compensation", 15_000.0)]);

        let mut year_2020 = inputs(FilingStatus::Single, 0.0);
        year_2020.tax_year = 2020;
        assert_eq!(rule.evaluate(&map, &year_2020).unwrap(), 4_800.0);

        year_2020.filing_status = FilingStatus::MarriedFilingJointly;
        assert_eq!(rule.evaluate(&map, &year_2020).unwrap(), 0.0);

        let year_2021 = inputs(FilingStatus::Single, 0.0);
        assert_eq!(rule.evaluate(&map, &year_2021).unwrap(), 15_000.0);
    }

    #[test]
    fn test_missing_exclusion_is_an_error() {
        let rule = IncomeRule::SumLessExclusion {
            fields: vec!["X".to_string()],
            exclusions: BTreeMap::new(),
            years: vec![],
        };
        let err = rule
            .evaluate(&fields(&[("X", 10.0)]), &inputs(FilingStatus::Single, 0.0))
            .unwrap_err();
        assert_eq!(err, CalculationError::MissingExclusion(FilingStatus::Single));
    }

    #[test]
    fn test_non_finite_field_is_an_error() {
        let rule = IncomeRule::Sum {
            fields: vec!["X".to_string()],
        };
        let result = rule.evaluate(&fields(&[("X", f64::NAN)]), &inputs(FilingStatus::Single, 0.0));
        assert!(matches!(result, Err(CalculationError::NonFiniteField(_))));
    }

    #[test]
    fn test_benefits_worksheet_tiers() {
        // Below base: nothing taxable
        assert_eq!(taxable_benefits(20_000.0, 10_000.0, FilingStatus::Single), 0.0);
        // Between thresholds: provisional 32,000
        assert_eq!(taxable_benefits(24_000.0, 20_000.0, FilingStatus::Single), 3_500.0);
        // Above adjusted base, capped at 85% of benefits
        assert_eq!(taxable_benefits(20_000.0, 40_000.0, FilingStatus::Single), 17_000.0);
        // Above adjusted base, uncapped: provisional 42,000 => 0.85*8,000 + 4,500
        assert_eq!(taxable_benefits(20_000.0, 32_000.0, FilingStatus::Single), 11_300.0);
        // MFS has no base amount
        assert_eq!(
            taxable_benefits(10_000.0, 1_000.0, FilingStatus::MarriedFilingSeparately),
            5_100.0
        );
    }

    #[test]
    fn test_catalog_json_round_trip_through_file() {
        let catalog = FormCatalog::standard().unwrap();
        let json = catalog.to_json().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = FormCatalog::from_file(file.path()).unwrap();
        assert_eq!(loaded.version(), "standard");
        let names: Vec<&str> = loaded.patterns().iter().map(|p| p.name()).collect();
        let expected: Vec<&str> = catalog.patterns().iter().map(|p| p.name()).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let mut patterns = standard_patterns();
        patterns[0].body_regex = "Form (W-2".to_string();
        let err = FormCatalog::from_patterns("broken", patterns).unwrap_err();
        assert!(err.to_string().contains("W-2"));
    }
}
