// Tax Transcript Core - Library
// Text recovery, form extraction, ledger parsing, projections and discrepancy
// analysis for wage & income and account transcripts. Used by the CLI and tests.

pub mod diagnostics;    // Diagnostics collector (value, not global state)
pub mod money;          // Locale-tolerant money parsing
pub mod filing;         // Filing statuses
pub mod owner;          // Taxpayer / spouse / joint from file names
pub mod text_recovery;  // Ordered text strategies + readability gate
pub mod catalog;        // Form patterns, income & withholding rules
pub mod codes;          // Transaction code table
pub mod extraction;     // Form extraction engine (two-pass)
pub mod ledger;         // Account transcript ledger parser
pub mod alerts;         // Transaction code alerts
pub mod aggregate;      // Year aggregates
pub mod projection;     // SFR tax projection
pub mod discrepancy;    // Forms vs. ledger analysis
pub mod config;         // Engine configuration
pub mod case;           // Case processor over a document source
pub mod export;         // JSON / CSV output

// Re-export commonly used types
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use money::{format_currency, parse_money, try_parse_money};
pub use filing::FilingStatus;
pub use owner::{classify_owner, Owner, OwnerClassification};
pub use text_recovery::{
    PageRecognizer, ReadabilityGate, RecoveryError, RecoveryMethod, TextExtractor, TextRecovery,
    TextRecoveryPipeline,
};
pub use catalog::{
    CalculationError, CalculationKind, FieldValue, FormCatalog, FormCategory, FormPattern,
    IncomeRule, WithholdingRule,
};
pub use codes::CodeTable;
pub use extraction::{
    extract_header_info, DocumentExtraction, ExtractedForm, ExtractionContext,
    FormExtractionEngine, HeaderInfo, UnmatchedForm,
};
pub use ledger::{
    parse_ledger_summary, AccountTranscript, LedgerSummary, Transaction, TransactionLedgerParser,
};
pub use alerts::{transaction_alerts, AlertCategory, TransactionAlert};
pub use aggregate::{YearAggregate, YearAggregates, YearSummary};
pub use projection::{PenaltyRates, ProjectionResult, TaxProjectionEngine, TaxTable};
pub use discrepancy::{
    DiscrepancyAnalyzer, DiscrepancyFinding, ReturnStatus, UnfiledLiabilityMode,
};
pub use config::EngineConfig;
pub use case::{
    CaseProcessor, CaseReport, DocumentKind, DocumentRecord, DocumentRef, DocumentSource, Progress,
};
pub use export::{write_summaries_csv, CaseExport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
