// 🩺 Diagnostics - Structured failure records collected at the point of failure
//
// Every pipeline call returns its own Diagnostics value. Nothing is global:
// the case processor merges per-document collectors into one stream, and
// every record is mirrored to `tracing` as it is pushed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// SEVERITY & KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical, // A whole document produced nothing usable
    Warning,  // A unit (form occurrence, line, strategy) was dropped or defaulted
    Info,     // Expected misses, recorded for audit
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// One text-recovery strategy raised
    StrategyFailed,
    /// One strategy produced text that failed the readability gate
    UnreadableText,
    /// Every strategy failed; the document yields empty text
    RecoveryFailure,
    /// A catalog pattern had no occurrence in the text
    PatternMismatch,
    /// A field regex had no match inside a matched form span
    FieldMissing,
    /// A form header matched but zero fields were captured
    EmptyFormExtraction,
    /// An income or withholding rule failed; the value defaulted to 0
    CalculationFailure,
    /// A ledger amount or date token did not parse
    TransactionParseFailure,
    /// A "Form <code>" header no catalog pattern accounts for
    UnmatchedForm,
    /// Owner classification fell back to the default
    OwnerFallback,
    /// No TRANSACTIONS anchor in an account transcript
    LedgerSectionMissing,
    /// The document source could not supply bytes
    DocumentUnavailable,
    /// No tax year could be read from a document header
    TaxYearMissing,
}

impl DiagnosticKind {
    pub fn default_severity(&self) -> Severity {
        match self {
            DiagnosticKind::RecoveryFailure | DiagnosticKind::DocumentUnavailable => {
                Severity::Critical
            }
            DiagnosticKind::PatternMismatch
            | DiagnosticKind::FieldMissing
            | DiagnosticKind::OwnerFallback => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

// ============================================================================
// DIAGNOSTIC RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,

    /// 1-based occurrence number within the document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            document: None,
            form: None,
            occurrence: None,
            field: None,
        }
    }

    /// Builder: attach the source document
    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    /// Builder: attach the form name and occurrence number
    pub fn with_form(mut self, form: impl Into<String>, occurrence: usize) -> Self {
        self.form = Some(form.into());
        self.occurrence = Some(occurrence);
        self
    }

    /// Builder: attach the field name
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Builder: override the default severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

// ============================================================================
// COLLECTOR
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics { records: Vec::new() }
    }

    /// Record a diagnostic and mirror it to the tracing stream
    pub fn push(&mut self, diagnostic: Diagnostic) {
        let document = diagnostic.document.as_deref().unwrap_or("-");
        match diagnostic.severity {
            Severity::Critical => tracing::error!(
                kind = ?diagnostic.kind,
                document,
                "{}",
                diagnostic.message
            ),
            Severity::Warning => tracing::warn!(
                kind = ?diagnostic.kind,
                document,
                "{}",
                diagnostic.message
            ),
            Severity::Info => tracing::debug!(
                kind = ?diagnostic.kind,
                document,
                "{}",
                diagnostic.message
            ),
        }
        self.records.push(diagnostic);
    }

    /// Shorthand for `push(Diagnostic::new(kind, message))`
    pub fn record(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.push(Diagnostic::new(kind, message));
    }

    /// Merge another collector, tagging untagged records with `document`
    pub fn absorb(&mut self, other: Diagnostics, document: Option<&str>) {
        for mut d in other.records {
            if d.document.is_none() {
                d.document = document.map(str::to_string);
            }
            self.records.push(d);
        }
    }

    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(move |d| d.kind == kind)
    }

    pub fn count_by_kind(&self) -> BTreeMap<DiagnosticKind, usize> {
        let mut counts = BTreeMap::new();
        for d in &self.records {
            *counts.entry(d.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn has_critical(&self) -> bool {
        self.records.iter().any(|d| d.severity == Severity::Critical)
    }

    pub fn summary(&self) -> String {
        let critical = self
            .records
            .iter()
            .filter(|d| d.severity == Severity::Critical)
            .count();
        let warnings = self
            .records
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count();
        format!(
            "{} diagnostics ({} critical, {} warnings, {} info)",
            self.records.len(),
            critical,
            warnings,
            self.records.len() - critical - warnings
        )
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        for d in iter {
            self.push(d);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_severity_by_kind() {
        assert_eq!(DiagnosticKind::RecoveryFailure.default_severity(), Severity::Critical);
        assert_eq!(DiagnosticKind::FieldMissing.default_severity(), Severity::Info);
        assert_eq!(DiagnosticKind::EmptyFormExtraction.default_severity(), Severity::Warning);
    }

    #[test]
    fn test_builder_attaches_context() {
        let d = Diagnostic::new(DiagnosticKind::FieldMissing, "Wages: no match")
            .with_document("WI 19 TP.pdf")
            .with_form("W-2", 2)
            .with_field("Wages");

        assert_eq!(d.document.as_deref(), Some("WI 19 TP.pdf"));
        assert_eq!(d.form.as_deref(), Some("W-2"));
        assert_eq!(d.occurrence, Some(2));
        assert_eq!(d.field.as_deref(), Some("Wages"));
    }

    #[test]
    fn test_absorb_tags_untagged_records_only() {
        let mut inner = Diagnostics::new();
        inner.record(DiagnosticKind::PatternMismatch, "no W-2");
        inner.push(
            Diagnostic::new(DiagnosticKind::FieldMissing, "x").with_document("other.pdf"),
        );

        let mut outer = Diagnostics::new();
        outer.absorb(inner, Some("WI 20.pdf"));

        assert_eq!(outer.len(), 2);
        assert_eq!(outer.records()[0].document.as_deref(), Some("WI 20.pdf"));
        assert_eq!(outer.records()[1].document.as_deref(), Some("other.pdf"));
    }

    #[test]
    fn test_summary_and_counts() {
        let mut diags = Diagnostics::new();
        diags.record(DiagnosticKind::RecoveryFailure, "nothing readable");
        diags.record(DiagnosticKind::FieldMissing, "a");
        diags.record(DiagnosticKind::FieldMissing, "b");

        assert!(diags.has_critical());
        assert_eq!(diags.count_by_kind()[&DiagnosticKind::FieldMissing], 2);
        assert_eq!(diags.of_kind(DiagnosticKind::FieldMissing).count(), 2);
        assert_eq!(diags.summary(), "3 diagnostics (1 critical, 0 warnings, 2 info)");
    }
}
