// 🧾 Form Extraction Engine - Catalog patterns over recovered text
//
// Each body-regex match starts an occurrence that runs to the next match of
// the same pattern (or end of text). Fields are read inside that span, the
// income and withholding rules are applied, and the occurrence becomes one
// ExtractedForm. Combined-income-dependent forms run in a second pass.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::catalog::{
    CalculationKind, CompiledPattern, FieldMap, FieldValue, FormCatalog, FormCategory, RuleInputs,
};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::filing::FilingStatus;
use crate::money::parse_money;
use crate::owner::{classify_owner, Owner, OwnerClassification};

/// Reported for W-2 / 1099-INT identifiers that could not be read
pub const UNKNOWN_IDENTIFIER: &str = "UNKNOWN";

// ============================================================================
// CORE TYPES
// ============================================================================

/// One matched occurrence of a form pattern. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedForm {
    pub form_name: String,

    /// 0-based index among this pattern's occurrences in the document
    pub occurrence_index: usize,

    pub tax_year: i32,

    /// Employer/payer identification number
    pub unique_id: Option<String>,

    /// Employer/payer name
    pub label: Option<String>,

    /// Payer identification line plus up to three address lines
    pub payer_blurb: Option<String>,

    pub fields: FieldMap,
    pub income: f64,
    pub withholding: f64,
    pub category: FormCategory,
    pub calculation: CalculationKind,
    pub owner: Owner,
    pub source_document: Option<String>,
}

/// A "Form <code>" header no catalog pattern accounts for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedForm {
    pub label: String,
    pub position: usize,
    pub snippet: String,
}

/// Per-document extraction output. Always well-typed, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub forms_by_year: BTreeMap<i32, Vec<ExtractedForm>>,
    pub unmatched: Vec<UnmatchedForm>,
    pub diagnostics: Diagnostics,
}

impl DocumentExtraction {
    pub fn forms(&self) -> impl Iterator<Item = &ExtractedForm> {
        self.forms_by_year.values().flatten()
    }

    pub fn form_count(&self) -> usize {
        self.forms_by_year.values().map(Vec::len).sum()
    }

    pub fn total_income(&self) -> f64 {
        self.forms().map(|f| f.income).sum()
    }

    /// Append another result (forms keep their order within each year)
    pub fn merge(&mut self, other: DocumentExtraction) {
        for (year, forms) in other.forms_by_year {
            self.forms_by_year.entry(year).or_default().extend(forms);
        }
        self.unmatched.extend(other.unmatched);
        self.diagnostics.absorb(other.diagnostics, None);
    }
}

/// Inputs that do not come from the text itself
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionContext {
    pub tax_year: i32,
    pub filing_status: FilingStatus,
    pub combined_income: f64,
    pub source_document: Option<String>,
    pub owner: OwnerClassification,
}

impl ExtractionContext {
    pub fn new(tax_year: i32) -> Self {
        ExtractionContext {
            tax_year,
            filing_status: FilingStatus::Single,
            combined_income: 0.0,
            source_document: None,
            owner: OwnerClassification {
                owner: Owner::Taxpayer,
                fallback: true,
            },
        }
    }

    /// Builder: set the filing status used by status-dependent rules
    pub fn with_filing_status(mut self, status: FilingStatus) -> Self {
        self.filing_status = status;
        self
    }

    /// Builder: set the income already known for the year
    pub fn with_combined_income(mut self, combined_income: f64) -> Self {
        self.combined_income = combined_income;
        self
    }

    /// Builder: set the source file name; the owner is classified from it
    pub fn with_source(mut self, file_name: &str) -> Self {
        self.source_document = Some(file_name.to_string());
        self.owner = classify_owner(file_name);
        self
    }

    fn rule_inputs(&self) -> RuleInputs {
        RuleInputs {
            tax_year: self.tax_year,
            filing_status: self.filing_status,
            combined_income: self.combined_income,
        }
    }
}

/// Which patterns an extraction pass covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPass {
    /// Every pattern whose income does not depend on the year's other forms
    Independent,
    /// Combined-income-dependent patterns only
    Dependent,
}

impl ExtractionPass {
    fn covers(&self, kind: CalculationKind) -> bool {
        match self {
            ExtractionPass::Independent => kind != CalculationKind::CombinedIncomeDependent,
            ExtractionPass::Dependent => kind == CalculationKind::CombinedIncomeDependent,
        }
    }
}

// ============================================================================
// HEADER INFO
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxPeriod {
    pub month: String,
    pub year: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderInfo {
    pub ssn: Option<String>,
    pub tax_periods: Vec<TaxPeriod>,
    /// Year of the first requested tax period
    pub tax_year: Option<i32>,
}

fn ssn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)SSN\s+Provided:\s*([\d\-Xx]{9,})").expect("ssn regex"))
}

fn tax_period_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Tax\s+Period\s+Requested:\s*([A-Za-z]+),\s*(\d{4})")
            .expect("tax period regex")
    })
}

/// Read the wage & income transcript header
pub fn extract_header_info(text: &str) -> HeaderInfo {
    let ssn = ssn_re().captures(text).map(|c| c[1].to_string());

    let tax_periods: Vec<TaxPeriod> = tax_period_re()
        .captures_iter(text)
        .filter_map(|c| {
            let year = c[2].parse().ok()?;
            Some(TaxPeriod {
                month: c[1].to_string(),
                year,
            })
        })
        .collect();

    let tax_year = tax_periods.first().map(|p| p.year);
    HeaderInfo {
        ssn,
        tax_periods,
        tax_year,
    }
}

// ============================================================================
// UNMATCHED FORM DETECTION
// ============================================================================

fn form_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*(Form [A-Z0-9\-]+)\b").expect("form header regex"))
}

fn boilerplate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)check box|applicable|transactions that do not flow|indicator")
            .expect("boilerplate regex")
    })
}

/// Largest char boundary <= index
fn floor_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn snippet(text: &str, start: usize, end: usize) -> String {
    let from = floor_boundary(text, start.saturating_sub(30));
    let to = floor_boundary(text, end.saturating_add(70));
    text[from..to].replace('\n', " ").trim().to_string()
}

fn line_around(text: &str, start: usize, end: usize) -> &str {
    let line_start = text[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = text[end..].find('\n').map(|i| end + i).unwrap_or(text.len());
    &text[line_start..line_end]
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct FormExtractionEngine {
    catalog: FormCatalog,
}

impl FormExtractionEngine {
    pub fn new(catalog: FormCatalog) -> Self {
        FormExtractionEngine { catalog }
    }

    pub fn catalog(&self) -> &FormCatalog {
        &self.catalog
    }

    /// Full extraction of one document: independent forms, then dependent
    /// forms seeing `ctx.combined_income` plus the independent total, then
    /// the unmatched-form audit.
    pub fn extract(&self, text: &str, ctx: &ExtractionContext) -> DocumentExtraction {
        let mut result = self.extract_pass(text, ctx, ExtractionPass::Independent);

        let dependent_ctx = ctx
            .clone()
            .with_combined_income(ctx.combined_income + result.total_income());
        let dependent = self.extract_pass(text, &dependent_ctx, ExtractionPass::Dependent);
        result.merge(dependent);

        self.audit_unmatched(text, &mut result);

        if let Some(document) = &ctx.source_document {
            let mut tagged = Diagnostics::new();
            tagged.absorb(std::mem::take(&mut result.diagnostics), Some(document));
            result.diagnostics = tagged;
        }
        result
    }

    /// Store unmatched form headers on the result, one diagnostic each
    pub fn audit_unmatched(&self, text: &str, result: &mut DocumentExtraction) {
        let unmatched = self.detect_unmatched(text);
        for form in &unmatched {
            result.diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnmatchedForm,
                format!(
                    "Potential form '{}' at position {} matched no pattern: {}",
                    form.label, form.position, form.snippet
                ),
            ));
        }
        result.unmatched = unmatched;
    }

    /// Run the patterns one pass covers. `ctx.combined_income` is used as-is.
    pub fn extract_pass(
        &self,
        text: &str,
        ctx: &ExtractionContext,
        pass: ExtractionPass,
    ) -> DocumentExtraction {
        let mut result = DocumentExtraction::default();
        let mut forms = Vec::new();

        if pass == ExtractionPass::Independent && ctx.owner.fallback {
            if let Some(document) = &ctx.source_document {
                result.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::OwnerFallback,
                    format!("No owner marker in '{}', assuming Taxpayer", document),
                ));
            }
        }

        for pattern in self.catalog.patterns() {
            if !pass.covers(pattern.calculation_kind()) {
                continue;
            }

            let starts: Vec<usize> = pattern.body.find_iter(text).map(|m| m.start()).collect();
            if starts.is_empty() {
                result.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::PatternMismatch,
                        format!("Form {}: no pattern match found", pattern.name()),
                    )
                    .with_form(pattern.name(), 0),
                );
                continue;
            }

            for (index, &start) in starts.iter().enumerate() {
                let end = starts.get(index + 1).copied().unwrap_or(text.len());
                let span = &text[start..end];
                if let Some(form) =
                    self.extract_occurrence(pattern, span, index, ctx, &mut result.diagnostics)
                {
                    forms.push(form);
                }
            }
        }

        tracing::debug!(
            pass = ?pass,
            forms = forms.len(),
            document = ctx.source_document.as_deref().unwrap_or("-"),
            "Extraction pass complete"
        );

        if !forms.is_empty() {
            result.forms_by_year.insert(ctx.tax_year, forms);
        }
        result
    }

    fn extract_occurrence(
        &self,
        pattern: &CompiledPattern,
        span: &str,
        index: usize,
        ctx: &ExtractionContext,
        diagnostics: &mut Diagnostics,
    ) -> Option<ExtractedForm> {
        let name = pattern.name();
        let occurrence = index + 1;

        // Fields
        let mut fields = FieldMap::new();
        for field in &pattern.fields {
            let value = if field.multi_valued {
                let values: Vec<f64> = field
                    .regex
                    .captures_iter(span)
                    .filter_map(|c| c.get(1).map(|m| parse_money(m.as_str())))
                    .collect();
                (!values.is_empty()).then_some(FieldValue::Multi(values))
            } else {
                field
                    .regex
                    .captures(span)
                    .and_then(|c| c.get(1))
                    .map(|m| FieldValue::Single(parse_money(m.as_str())))
            };

            match value {
                Some(value) => {
                    fields.insert(field.name.clone(), value);
                }
                None => diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::FieldMissing,
                        format!("Form {} #{}: field {} not found", name, occurrence, field.name),
                    )
                    .with_form(name, occurrence)
                    .with_field(&field.name),
                ),
            }
        }

        if fields.is_empty() {
            let attempted: Vec<&str> = pattern.fields.iter().map(|f| f.name.as_str()).collect();
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::EmptyFormExtraction,
                    format!(
                        "Form {} #{} matched but no fields were captured (attempted: {})",
                        name,
                        occurrence,
                        attempted.join(", ")
                    ),
                )
                .with_form(name, occurrence),
            );
            return None;
        }

        // Calculations
        let definition = &pattern.definition;
        let income = definition
            .income_rule
            .evaluate(&fields, &ctx.rule_inputs())
            .unwrap_or_else(|e| {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::CalculationFailure,
                        format!("Income calculation for {} #{} failed: {}", name, occurrence, e),
                    )
                    .with_form(name, occurrence),
                );
                0.0
            });

        let withholding = definition.withholding_rule.evaluate(&fields).unwrap_or_else(|e| {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::CalculationFailure,
                    format!("Withholding calculation for {} #{} failed: {}", name, occurrence, e),
                )
                .with_form(name, occurrence),
            );
            0.0
        });

        let (unique_id, label) = identifiers(pattern, span);

        Some(ExtractedForm {
            form_name: name.to_string(),
            occurrence_index: index,
            tax_year: ctx.tax_year,
            unique_id,
            label,
            payer_blurb: payer_blurb(span),
            fields,
            income,
            withholding,
            category: pattern.category(),
            calculation: pattern.calculation_kind(),
            owner: ctx.owner.owner,
            source_document: ctx.source_document.clone(),
        })
    }

    /// "Form <code>" headers outside every catalog body match, boilerplate
    /// lines excluded
    pub fn detect_unmatched(&self, text: &str) -> Vec<UnmatchedForm> {
        let matched_spans: Vec<(usize, usize)> = self
            .catalog
            .patterns()
            .iter()
            .flat_map(|p| p.body.find_iter(text).map(|m| (m.start(), m.end())))
            .collect();

        form_header_re()
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .filter(|m| !boilerplate_re().is_match(line_around(text, m.start(), m.end())))
            .filter(|m| {
                !matched_spans
                    .iter()
                    .any(|&(ms, me)| ms <= m.start() && m.start() < me)
            })
            .map(|m| UnmatchedForm {
                label: m.as_str().to_string(),
                position: m.start(),
                snippet: snippet(text, m.start(), m.end()),
            })
            .collect()
    }
}

fn identifiers(pattern: &CompiledPattern, span: &str) -> (Option<String>, Option<String>) {
    let Some(rule) = &pattern.definition.identifier else {
        return (None, None);
    };

    let capture = |regex: &Option<Regex>| -> Option<String> {
        regex
            .as_ref()?
            .captures(span)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let placeholder = |value: Option<String>, declared: bool| -> Option<String> {
        match value {
            Some(v) => Some(v),
            None if declared && rule.placeholder_when_missing => {
                Some(UNKNOWN_IDENTIFIER.to_string())
            }
            None => None,
        }
    };

    (
        placeholder(capture(&pattern.id_regex), pattern.id_regex.is_some()),
        placeholder(capture(&pattern.label_regex), pattern.label_regex.is_some()),
    )
}

const FIN_MARKER: &str = "Payer's Federal Identification Number (FIN):";

/// The FIN line (or the first "Payer:" line) plus up to three following
/// lines, stopping at a blank line or the recipient block
fn payer_blurb(span: &str) -> Option<String> {
    let lines: Vec<&str> = span.lines().collect();
    let anchor = lines
        .iter()
        .position(|l| l.contains(FIN_MARKER))
        .or_else(|| lines.iter().position(|l| l.contains("Payer:")))?;

    let mut blurb = vec![lines[anchor].trim()];
    for line in lines.iter().skip(anchor + 1).take(3) {
        let line = line.trim();
        if line.is_empty() || line.starts_with("Recipient:") {
            break;
        }
        blurb.push(line);
    }
    let joined = blurb.join("\n");
    (!joined.is_empty()).then_some(joined)
}

// ============================================================================
// TESTS
// ============================================================================
