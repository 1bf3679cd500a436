// 🗂️ Case Processor - Every transcript of one taxpayer, merged by year
//
// Account transcripts go first so each year's filing status is known. Wage &
// income transcripts then run the independent extraction pass; only when
// every document has been read are combined-income-dependent forms computed
// against the year's full pass-one total.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::aggregate::{year_entry, YearAggregates, YearSummary};
use crate::alerts::{transaction_alerts, TransactionAlert};
use crate::catalog::FormCatalog;
use crate::codes::CodeTable;
use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::discrepancy::{DiscrepancyAnalyzer, DiscrepancyFinding};
use crate::extraction::{
    extract_header_info, DocumentExtraction, ExtractionContext, ExtractionPass,
    FormExtractionEngine, HeaderInfo, UnmatchedForm,
};
use crate::filing::FilingStatus;
use crate::ledger::TransactionLedgerParser;
use crate::owner::Owner;
use crate::projection::{ProjectionResult, TaxProjectionEngine};
use crate::text_recovery::{RecoveryMethod, TextRecoveryPipeline};

// ============================================================================
// DOCUMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    WageIncome,
    AccountTranscript,
}

impl DocumentKind {
    pub fn name(&self) -> &str {
        match self {
            DocumentKind::WageIncome => "Wage & Income",
            DocumentKind::AccountTranscript => "Account Transcript",
        }
    }
}

/// A document the caller knows how to fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    /// Carries the owner marker ("WI 22 S.pdf")
    pub file_name: String,
    pub kind: DocumentKind,
    /// Used when the text itself names no tax year
    pub tax_year: Option<i32>,
}

impl DocumentRef {
    pub fn new(id: &str, file_name: &str, kind: DocumentKind) -> Self {
        DocumentRef {
            id: id.to_string(),
            file_name: file_name.to_string(),
            kind,
            tax_year: None,
        }
    }

    pub fn with_tax_year(mut self, tax_year: i32) -> Self {
        self.tax_year = Some(tax_year);
        self
    }
}

/// DocumentSource - retrieval of raw document bytes
///
/// Authentication, caching and retries belong to the implementation. An
/// error here marks the one document unavailable; the case continues.
pub trait DocumentSource: Send + Sync {
    fn fetch_document_bytes(&self, document: &DocumentRef) -> anyhow::Result<Vec<u8>>;
}

/// What happened to one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub file_name: String,
    pub kind: DocumentKind,
    /// SHA-256 of the fetched bytes
    pub fingerprint: Option<String>,
    pub byte_len: usize,
    pub recovery_method: Option<RecoveryMethod>,
    pub attempted_strategies: Vec<String>,
    pub tax_year: Option<i32>,
    pub owner: Option<Owner>,
    pub header: Option<HeaderInfo>,
    pub form_count: usize,
    pub transaction_count: usize,
    pub unmatched: Vec<UnmatchedForm>,
}

impl DocumentRecord {
    fn new(document: &DocumentRef) -> Self {
        DocumentRecord {
            id: document.id.clone(),
            file_name: document.file_name.clone(),
            kind: document.kind,
            fingerprint: None,
            byte_len: 0,
            recovery_method: None,
            attempted_strategies: Vec::new(),
            tax_year: None,
            owner: None,
            header: None,
            form_count: 0,
            transaction_count: 0,
            unmatched: Vec::new(),
        }
    }
}

pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// PROGRESS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub document: String,
    pub kind: DocumentKind,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

pub type ProgressCallback = Box<dyn Fn(&Progress) + Send + Sync>;

// ============================================================================
// REPORT
// ============================================================================

/// Everything the case produced. Projections and findings are derived on
/// demand so they always reflect the aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub years: YearAggregates,
    pub documents: Vec<DocumentRecord>,
    pub diagnostics: Diagnostics,
}

impl CaseReport {
    /// The filing status the year's account transcript reports, else `fallback`
    pub fn filing_status_for(&self, year: i32, fallback: FilingStatus) -> FilingStatus {
        self.years
            .get(&year)
            .and_then(|y| y.ledger_summary.as_ref())
            .and_then(|s| s.parsed_filing_status())
            .unwrap_or(fallback)
    }

    /// Each year is projected under its own ledger filing status; years
    /// without one use `fallback`
    pub fn projections(
        &self,
        engine: &TaxProjectionEngine,
        fallback: FilingStatus,
        months_late: u32,
    ) -> BTreeMap<i32, ProjectionResult> {
        self.years
            .iter()
            .map(|(year, aggregate)| {
                let status = self.filing_status_for(*year, fallback);
                (*year, engine.project(aggregate, status, months_late))
            })
            .collect()
    }

    pub fn findings(&self, analyzer: &DiscrepancyAnalyzer) -> BTreeMap<i32, DiscrepancyFinding> {
        analyzer.analyze(&self.years)
    }

    /// Alerts per year, years without alerts left out
    pub fn alerts(&self) -> BTreeMap<i32, Vec<TransactionAlert>> {
        self.years
            .iter()
            .map(|(year, aggregate)| (*year, transaction_alerts(&aggregate.transactions)))
            .filter(|(_, alerts)| !alerts.is_empty())
            .collect()
    }

    pub fn summaries(&self) -> Vec<YearSummary> {
        self.years.values().map(|y| y.summary()).collect()
    }

    pub fn document(&self, id: &str) -> Option<&DocumentRecord> {
        self.documents.iter().find(|d| d.id == id)
    }
}

// ============================================================================
// PROCESSOR
// ============================================================================

/// Wage & income text that made it through pass one
struct PendingExtraction {
    record_index: usize,
    text: String,
    context: ExtractionContext,
    result: DocumentExtraction,
}

pub struct CaseProcessor {
    pipeline: TextRecoveryPipeline,
    engine: FormExtractionEngine,
    ledger: TransactionLedgerParser,
    filing_status: Option<FilingStatus>,
    progress: Option<ProgressCallback>,
}

impl CaseProcessor {
    pub fn new(catalog: FormCatalog, codes: CodeTable, config: &EngineConfig) -> Self {
        CaseProcessor {
            pipeline: TextRecoveryPipeline::new().with_gate(config.gate.clone()),
            engine: FormExtractionEngine::new(catalog),
            ledger: TransactionLedgerParser::new(codes),
            filing_status: None,
            progress: None,
        }
    }

    /// Builder: replace the text recovery chain
    pub fn with_pipeline(mut self, pipeline: TextRecoveryPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Builder: force one filing status for status-dependent rules instead of
    /// the one each year's account transcript reports
    pub fn with_filing_status(mut self, status: FilingStatus) -> Self {
        self.filing_status = Some(status);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn process(
        &self,
        source: &dyn DocumentSource,
        wage_income: &[DocumentRef],
        account_transcripts: &[DocumentRef],
    ) -> CaseReport {
        let mut report = CaseReport::default();
        let total = wage_income.len() + account_transcripts.len();
        let mut completed = 0;

        tracing::info!(
            wage_income = wage_income.len(),
            account_transcripts = account_transcripts.len(),
            "Processing case"
        );

        for document in account_transcripts {
            self.process_account_transcript(source, document, &mut report);
            completed += 1;
            self.report_progress(completed, total, document);
        }

        let mut pending = Vec::new();
        for document in wage_income {
            if let Some(extraction) = self.read_wage_income(source, document, &mut report) {
                pending.push(extraction);
            }
            completed += 1;
            self.report_progress(completed, total, document);
        }

        // Combined income per year across every wage & income document
        let mut combined: BTreeMap<i32, f64> = BTreeMap::new();
        for extraction in &pending {
            *combined.entry(extraction.context.tax_year).or_default() +=
                extraction.result.total_income();
        }

        for extraction in pending {
            self.finish_wage_income(extraction, &combined, &mut report);
        }

        tracing::info!(
            years = report.years.len(),
            documents = report.documents.len(),
            diagnostics = %report.diagnostics.summary(),
            "Case processed"
        );
        report
    }

    fn report_progress(&self, completed: usize, total: usize, document: &DocumentRef) {
        if let Some(callback) = &self.progress {
            callback(&Progress {
                completed,
                total,
                document: document.file_name.clone(),
                kind: document.kind,
            });
        }
    }

    /// Fetch and recover text. None when nothing usable came back; the
    /// record and diagnostics say why.
    fn read_text(
        &self,
        source: &dyn DocumentSource,
        document: &DocumentRef,
        record: &mut DocumentRecord,
        diagnostics: &mut Diagnostics,
    ) -> Option<String> {
        let bytes = match source.fetch_document_bytes(document) {
            Ok(bytes) => bytes,
            Err(e) => {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::DocumentUnavailable,
                        format!("Could not fetch {}: {:#}", document.file_name, e),
                    )
                    .with_document(&document.file_name),
                );
                return None;
            }
        };

        record.fingerprint = Some(fingerprint(&bytes));
        record.byte_len = bytes.len();

        let recovery = self.pipeline.recover_text(&bytes);
        record.recovery_method = recovery.method;
        record.attempted_strategies = recovery
            .attempted_strategies()
            .into_iter()
            .map(str::to_string)
            .collect();
        let succeeded = recovery.succeeded();
        diagnostics.absorb(recovery.diagnostics, Some(document.file_name.as_str()));

        succeeded.then_some(recovery.text)
    }

    fn process_account_transcript(
        &self,
        source: &dyn DocumentSource,
        document: &DocumentRef,
        report: &mut CaseReport,
    ) {
        let mut record = DocumentRecord::new(document);
        let Some(text) = self.read_text(source, document, &mut record, &mut report.diagnostics)
        else {
            report.documents.push(record);
            return;
        };

        let mut transcript = self.ledger.parse(&text);
        let tax_year = transcript.summary.tax_year.or(document.tax_year);
        report
            .diagnostics
            .absorb(std::mem::take(&mut transcript.diagnostics), Some(document.file_name.as_str()));

        record.tax_year = tax_year;
        record.transaction_count = transcript.transactions.len();

        match tax_year {
            Some(year) => {
                transcript.summary.tax_year = Some(year);
                for transaction in &mut transcript.transactions {
                    transaction.tax_year = Some(year);
                }
                year_entry(&mut report.years, year).add_account_transcript(transcript);
            }
            None => {
                tracing::warn!(document = %document.file_name, "Account transcript has no tax year");
            }
        }
        report.documents.push(record);
    }

    /// Filing status for a year's status-dependent rules
    fn filing_status_for(&self, years: &YearAggregates, year: i32) -> FilingStatus {
        self.filing_status
            .or_else(|| {
                years
                    .get(&year)?
                    .ledger_summary
                    .as_ref()?
                    .parsed_filing_status()
            })
            .unwrap_or_default()
    }

    fn read_wage_income(
        &self,
        source: &dyn DocumentSource,
        document: &DocumentRef,
        report: &mut CaseReport,
    ) -> Option<PendingExtraction> {
        let mut record = DocumentRecord::new(document);
        let text = self.read_text(source, document, &mut record, &mut report.diagnostics);
        let record_index = report.documents.len();

        let Some(text) = text else {
            report.documents.push(record);
            return None;
        };

        let header = extract_header_info(&text);
        let tax_year = header.tax_year.or(document.tax_year);
        record.header = Some(header);
        record.tax_year = tax_year;

        let Some(tax_year) = tax_year else {
            report.diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::TaxYearMissing,
                    format!("No tax period in {}; forms not extracted", document.file_name),
                )
                .with_document(&document.file_name),
            );
            report.documents.push(record);
            return None;
        };

        let context = ExtractionContext::new(tax_year)
            .with_source(&document.file_name)
            .with_filing_status(self.filing_status_for(&report.years, tax_year));
        record.owner = Some(context.owner.owner);

        let result = self
            .engine
            .extract_pass(&text, &context, ExtractionPass::Independent);

        report.documents.push(record);
        Some(PendingExtraction {
            record_index,
            text,
            context,
            result,
        })
    }

    fn finish_wage_income(
        &self,
        pending: PendingExtraction,
        combined: &BTreeMap<i32, f64>,
        report: &mut CaseReport,
    ) {
        let PendingExtraction {
            record_index,
            text,
            context,
            mut result,
        } = pending;

        let year_income = combined.get(&context.tax_year).copied().unwrap_or(0.0);
        let dependent_context = context.clone().with_combined_income(year_income);
        let dependent = self
            .engine
            .extract_pass(&text, &dependent_context, ExtractionPass::Dependent);
        result.merge(dependent);
        self.engine.audit_unmatched(&text, &mut result);

        let document = context.source_document.as_deref();
        report.diagnostics.absorb(result.diagnostics, document);

        if let Some(record) = report.documents.get_mut(record_index) {
            record.form_count = result.forms_by_year.values().map(Vec::len).sum();
            record.unmatched = result.unmatched;
        }

        for (year, forms) in result.forms_by_year {
            let aggregate = year_entry(&mut report.years, year);
            for form in forms {
                aggregate.add_form(form);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MapSource(BTreeMap<String, String>);

    impl DocumentSource for MapSource {
        fn fetch_document_bytes(&self, document: &DocumentRef) -> anyhow::Result<Vec<u8>> {
            self.0
                .get(&document.id)
                .map(|text| text.as_bytes().to_vec())
                .ok_or_else(|| anyhow::anyhow!("document {} not found", document.id))
        }
    }

    const WAGES: &str = "\
Wage and Income Transcript for the requested period
Tax Period Requested: December, 2023

Form W-2 Wage and Tax Statement
Employer: ACME WIDGETS INC
Wages, tips, other compensation: $30,000.00
Federal income tax withheld: $2,000.00
";

    const BENEFITS: &str = "\
Wage and Income Transcript for the requested period
Tax Period Requested: December, 2023

Form SSA-1099 Social Security Benefit Statement
Net benefits: $20,000.00
";

    fn processor() -> CaseProcessor {
        CaseProcessor::new(
            FormCatalog::standard().unwrap(),
            CodeTable::standard(),
            &EngineConfig::default(),
        )
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_dependent_form_uses_income_from_other_documents() {
        let mut docs = BTreeMap::new();
        docs.insert("w2".to_string(), WAGES.to_string());
        docs.insert("ssa".to_string(), BENEFITS.to_string());
        let source = MapSource(docs);

        let wi = vec![
            DocumentRef::new("ssa", "WI 23 TP ssa.txt", DocumentKind::WageIncome),
            DocumentRef::new("w2", "WI 23 TP w2.txt", DocumentKind::WageIncome),
        ];
        let report = processor().process(&source, &wi, &[]);
        let year = &report.years[&2023];

        let ssa = year.forms.iter().find(|f| f.form_name == "SSA-1099").unwrap();
        // provisional 30,000 + 10,000 = 40,000 over the 34,000 adjusted base
        let expected = (0.85 * 6_000.0 + 4_500.0_f64).min(0.85 * 20_000.0);
        assert!((ssa.income - expected).abs() < 1e-6, "ssa income {}", ssa.income);
        assert_eq!(year.forms.len(), 2);
    }

    #[test]
    fn test_unavailable_document_is_isolated() {
        let mut docs = BTreeMap::new();
        docs.insert("w2".to_string(), WAGES.to_string());
        let source = MapSource(docs);

        let wi = vec![
            DocumentRef::new("missing", "WI 23 S.pdf", DocumentKind::WageIncome),
            DocumentRef::new("w2", "WI 23 TP.txt", DocumentKind::WageIncome),
        ];

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let report = processor()
            .with_progress(Box::new(move |p: &Progress| {
                counter.store(p.completed, Ordering::SeqCst);
            }))
            .process(&source, &wi, &[]);

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.documents[0].fingerprint, None);
        assert!(report.documents[1].fingerprint.is_some());
        assert_eq!(
            report
                .diagnostics
                .of_kind(DiagnosticKind::DocumentUnavailable)
                .count(),
            1
        );
        assert!(report.diagnostics.has_critical());
        assert_eq!(report.years[&2023].non_se_income(), 30_000.0);
    }

    #[test]
    fn test_year_from_document_ref_when_text_has_none() {
        let text = WAGES.replace("Tax Period Requested: December, 2023\n", "");
        let mut docs = BTreeMap::new();
        docs.insert("w2".to_string(), text);
        let source = MapSource(docs);

        let wi = vec![DocumentRef::new("w2", "WI TP.txt", DocumentKind::WageIncome).with_tax_year(2021)];
        let report = processor().process(&source, &wi, &[]);
        assert_eq!(report.years[&2021].forms.len(), 1);
        assert_eq!(report.documents[0].tax_year, Some(2021));
    }

    #[test]
    fn test_projection_uses_each_year_ledger_status() {
        let account = "\
Account Transcript
Report for Tax Period Ending: 12-31-2023
ADJUSTED GROSS INCOME: $30,000.00
FILING STATUS: Married Filing Joint

TRANSACTIONS
150 Tax return filed 20241505 05-01-2024 $0.00
";
        let mut docs = BTreeMap::new();
        docs.insert("w2".to_string(), WAGES.to_string());
        docs.insert(
            "w2-21".to_string(),
            WAGES.replace("Tax Period Requested: December, 2023\n", ""),
        );
        docs.insert("at".to_string(), account.to_string());
        let source = MapSource(docs);

        let wi = vec![
            DocumentRef::new("w2", "WI 23 TP.txt", DocumentKind::WageIncome),
            DocumentRef::new("w2-21", "WI TP.txt", DocumentKind::WageIncome).with_tax_year(2021),
        ];
        let at = vec![DocumentRef::new("at", "AT 23.txt", DocumentKind::AccountTranscript)];
        let report = processor().process(&source, &wi, &at);

        let engine = EngineConfig::default().projection_engine();
        let projections = report.projections(&engine, FilingStatus::HeadOfHousehold, 0);

        assert_eq!(projections[&2023].filing_status, FilingStatus::MarriedFilingJointly);
        assert_eq!(projections[&2021].filing_status, FilingStatus::HeadOfHousehold);
        assert_eq!(
            report.filing_status_for(2023, FilingStatus::Single),
            FilingStatus::MarriedFilingJointly
        );
    }
}
