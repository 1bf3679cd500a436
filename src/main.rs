use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tax_transcript_core::{
    case::{DocumentKind, DocumentRef, DocumentSource, Progress},
    export::write_summaries_csv_file,
    format_currency, CaseExport, CaseProcessor, CodeTable, EngineConfig, FilingStatus, FormCatalog,
};

#[derive(Parser)]
#[command(name = "tax-transcript", version, about = "Analyze wage & income and account transcripts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, project and analyze a set of transcripts
    Analyze(AnalyzeArgs),
    /// Print the built-in form catalog as JSON
    Catalog,
    /// Print the default engine config as JSON
    Config,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Wage & income transcripts (PDF or text)
    #[arg(long = "wi", num_args = 1..)]
    wage_income: Vec<PathBuf>,

    /// Account transcripts (PDF or text)
    #[arg(long = "at", num_args = 1..)]
    account: Vec<PathBuf>,

    /// Form catalog JSON (built-in catalog when absent)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Transaction code table JSON
    #[arg(long)]
    codes: Option<PathBuf>,

    /// Engine config JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Filing status for status-dependent rules, and for projections of years
    /// whose account transcript reports none (e.g. MFJ)
    #[arg(long)]
    filing_status: Option<String>,

    /// Months past the due date, for penalties and interest
    #[arg(long, default_value_t = 0)]
    months_late: u32,

    /// Write the full case as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write per-year summaries as CSV
    #[arg(long)]
    csv: Option<PathBuf>,
}

/// Reads documents from the local filesystem; the id is the path
struct FileSource;

impl DocumentSource for FileSource {
    fn fetch_document_bytes(&self, document: &DocumentRef) -> Result<Vec<u8>> {
        fs::read(&document.id).with_context(|| format!("Failed to read document: {}", document.id))
    }
}

fn document_refs(paths: &[PathBuf], kind: DocumentKind) -> Vec<DocumentRef> {
    paths
        .iter()
        .map(|path| {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            DocumentRef::new(&path.display().to_string(), &file_name, kind)
        })
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Catalog => {
            println!("{}", FormCatalog::standard()?.to_json()?);
            Ok(())
        }
        Command::Config => {
            println!("{}", EngineConfig::default().to_json()?);
            Ok(())
        }
    }
}

fn load_or<T>(path: Option<&Path>, load: impl Fn(&Path) -> Result<T>, default: impl Fn() -> Result<T>) -> Result<T> {
    match path {
        Some(path) => load(path),
        None => default(),
    }
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    if args.wage_income.is_empty() && args.account.is_empty() {
        bail!("Nothing to analyze: pass --wi and/or --at files");
    }

    println!("🧾 Tax Transcript Analysis");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = load_or(args.config.as_deref(), |p| EngineConfig::from_file(p), || Ok(EngineConfig::default()))?;
    let catalog = load_or(args.catalog.as_deref(), |p| FormCatalog::from_file(p), FormCatalog::standard)?;
    let codes = load_or(args.codes.as_deref(), |p| CodeTable::from_file(p), || Ok(CodeTable::standard()))?;
    println!("✓ Catalog {} ({} patterns), {} transaction codes", catalog.version(), catalog.len(), codes.len());

    let forced_status = match args.filing_status.as_deref() {
        Some(label) => Some(
            FilingStatus::from_label(label)
                .with_context(|| format!("Unknown filing status: {}", label))?,
        ),
        None => None,
    };

    let mut processor = CaseProcessor::new(catalog, codes, &config).with_progress(Box::new(|p: &Progress| {
        println!("  [{}/{}] {} ({})", p.completed, p.total, p.document, p.kind.name());
    }));
    if let Some(status) = forced_status {
        processor = processor.with_filing_status(status);
    }

    println!("\n📂 Processing documents...");
    let wi = document_refs(&args.wage_income, DocumentKind::WageIncome);
    let at = document_refs(&args.account, DocumentKind::AccountTranscript);
    let report = processor.process(&FileSource, &wi, &at);

    // Years without a ledger filing status fall back to the flag, then Single
    let fallback_status = forced_status.unwrap_or_default();
    let engine = config.projection_engine();
    let analyzer = config.discrepancy_analyzer();
    let export = CaseExport::build(&report, &engine, &analyzer, fallback_status, args.months_late);

    println!("\n📊 Years");
    for summary in &export.summaries {
        println!(
            "  {}: {} forms, {} transactions, SE {} / Non-SE {} / Other {}, withheld {}",
            summary.tax_year,
            summary.form_count,
            summary.transaction_count,
            format_currency(summary.se_income),
            format_currency(summary.non_se_income),
            format_currency(summary.other_income),
            format_currency(summary.total_withholding),
        );
    }

    println!("\n🧮 Projections ({} months late)", args.months_late);
    for projection in export.projections.values() {
        println!(
            "  {} ({}): base {}, total owed {}",
            projection.tax_year,
            projection.filing_status,
            format_currency(projection.base_tax_owed),
            format_currency(projection.total_owed),
        );
    }

    println!("\n⚖️  Findings");
    for finding in export.findings.values() {
        println!(
            "  {} [{}] priority {}: discrepancy {}",
            finding.tax_year,
            finding.return_status.name(),
            finding.priority_level,
            format_currency(finding.income_discrepancy),
        );
        for recommendation in &finding.recommendations {
            println!("    • {}", recommendation);
        }
    }

    if !export.alerts.is_empty() {
        println!("\n🚨 Alerts");
        for (year, alerts) in &export.alerts {
            for alert in alerts {
                println!("  {} {} {} - {}", year, alert.code, alert.category.name(), alert.meaning);
            }
        }
    }

    if let Some(path) = &args.json {
        export.write_json(path)?;
        println!("\n✓ JSON written to {}", path.display());
    }
    if let Some(path) = &args.csv {
        write_summaries_csv_file(path, &export.summaries)?;
        println!("✓ CSV written to {}", path.display());
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if report.diagnostics.has_critical() {
        println!("⚠️  {}", report.diagnostics.summary());
    } else {
        println!("✅ {}", report.diagnostics.summary());
    }

    Ok(())
}
