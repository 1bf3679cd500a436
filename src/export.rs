// 📤 Export - JSON case output and per-year CSV summaries

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::aggregate::{YearAggregates, YearSummary};
use crate::alerts::TransactionAlert;
use crate::case::{CaseReport, DocumentRecord};
use crate::diagnostics::Diagnostics;
use crate::discrepancy::{DiscrepancyAnalyzer, DiscrepancyFinding};
use crate::filing::FilingStatus;
use crate::projection::{ProjectionResult, TaxProjectionEngine};

/// The serialized output contract: year-keyed records, projections and
/// findings, plus the diagnostics stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseExport {
    pub generated_at: String,
    /// Used for years whose account transcript reports no filing status
    pub filing_status: FilingStatus,
    pub months_late: u32,
    pub years: YearAggregates,
    pub summaries: Vec<YearSummary>,
    pub projections: BTreeMap<i32, ProjectionResult>,
    pub findings: BTreeMap<i32, DiscrepancyFinding>,
    pub alerts: BTreeMap<i32, Vec<TransactionAlert>>,
    pub documents: Vec<DocumentRecord>,
    pub diagnostics: Diagnostics,
}

impl CaseExport {
    pub fn build(
        report: &CaseReport,
        engine: &TaxProjectionEngine,
        analyzer: &DiscrepancyAnalyzer,
        filing_status: FilingStatus,
        months_late: u32,
    ) -> Self {
        CaseExport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            filing_status,
            months_late,
            years: report.years.clone(),
            summaries: report.summaries(),
            projections: report.projections(engine, filing_status, months_late),
            findings: report.findings(analyzer),
            alerts: report.alerts(),
            documents: report.documents.clone(),
            diagnostics: report.diagnostics.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize case export")
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write JSON output: {:?}", path))
    }
}

/// One CSV row per year summary, header included
pub fn write_summaries_csv<W: Write>(writer: W, summaries: &[YearSummary]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for summary in summaries {
        csv.serialize(summary)
            .with_context(|| format!("Failed to write CSV row for {}", summary.tax_year))?;
    }
    csv.flush().context("Failed to flush CSV output")?;
    Ok(())
}

pub fn write_summaries_csv_file<P: AsRef<Path>>(path: P, summaries: &[YearSummary]) -> Result<()> {
    let path = path.as_ref();
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create CSV file: {:?}", path))?;
    write_summaries_csv(file, summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::test_support::form;
    use crate::aggregate::YearAggregate;
    use crate::catalog::FormCategory;
    use crate::owner::Owner;
    use crate::projection::{PenaltyRates, TaxTable};

    fn report() -> CaseReport {
        let mut year = YearAggregate::new(2023);
        year.add_form(form("W-2", FormCategory::NonSelfEmployment, Owner::Taxpayer, 40_000.0, 3_000.0));
        year.add_form(form("1099-NEC", FormCategory::SelfEmployment, Owner::Taxpayer, 5_000.0, 0.0));
        let mut report = CaseReport::default();
        report.years.insert(2023, year);
        report
    }

    #[test]
    fn test_csv_has_header_and_one_row_per_year() {
        let mut out = Vec::new();
        write_summaries_csv(&mut out, &report().summaries()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("tax_year,form_count,transaction_count,se_income"));
        assert!(lines[1].starts_with("2023,2,0,5000.0,0.0,40000.0,3000.0"));
    }

    #[test]
    fn test_json_export_contains_every_section() {
        let engine = TaxProjectionEngine::new(TaxTable::sfr_2023(), PenaltyRates::default(), 2024);
        let export = CaseExport::build(
            &report(),
            &engine,
            &DiscrepancyAnalyzer::new(),
            FilingStatus::Single,
            6,
        );
        let json: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();

        for key in ["years", "summaries", "projections", "findings", "alerts", "documents", "diagnostics"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["projections"]["2023"]["months_late"], 6);
        assert_eq!(json["findings"]["2023"]["return_status"], "NotFiled");
    }
}
