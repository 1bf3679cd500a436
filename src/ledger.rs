// 📒 Transaction Ledger Parser - Account transcript text to typed transactions
//
// The transactions section starts at the first "TRANSACTIONS" anchor. Lines
// are read with a compact single-line grammar; when that finds nothing the
// spaced multi-line grammar is tried. "No tax return filed" lines become
// code-less marker transactions.

use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::codes::{CodeTable, NO_RETURN_CODE};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::filing::FilingStatus;
use crate::money::try_parse_money;

const SECTION_ANCHOR: &str = "TRANSACTIONS";

// ============================================================================
// CORE TYPES
// ============================================================================

/// One ledger line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Three-digit code, or "n/a" for the no-return marker
    pub code: String,

    /// Meaning from the code table
    pub meaning: String,

    /// Narrative as printed on the transcript
    pub description: String,

    /// Posting date, ISO when it parsed, raw otherwise
    pub date: String,

    /// Cycle token rendered as YYYY-MM-DD (compact layout only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_date: Option<String>,

    /// Signed amount; a printed "-" is 0.0
    pub amount: f64,

    pub tax_year: Option<i32>,
}

impl Transaction {
    pub fn is_no_return_marker(&self) -> bool {
        self.code == NO_RETURN_CODE
    }
}

/// Figures printed above the transactions section. Missing numbers are 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub tax_year: Option<i32>,
    pub taxpayer_id: Option<String>,
    pub account_balance: f64,
    pub accrued_interest: f64,
    pub accrued_penalty: f64,
    pub total_balance: f64,
    pub adjusted_gross_income: f64,
    pub taxable_income: f64,
    pub tax_per_return: f64,
    pub se_taxable_income_taxpayer: f64,
    pub se_taxable_income_spouse: f64,
    pub total_se_tax: f64,
    /// As printed ("Married Filing Joint")
    pub filing_status: Option<String>,
    pub processing_date: Option<String>,
}

impl LedgerSummary {
    pub fn parsed_filing_status(&self) -> Option<FilingStatus> {
        self.filing_status.as_deref().and_then(FilingStatus::from_label)
    }
}

/// A fully parsed account transcript
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountTranscript {
    pub summary: LedgerSummary,
    pub transactions: Vec<Transaction>,
    pub diagnostics: Diagnostics,
}

// ============================================================================
// GRAMMARS
// ============================================================================

fn compact_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^(\d{3}|n/a)([^\n]+?)(\d{8})\s+(\d{2}-\d{2}-\d{4})\s+(-?\$?[\d,]+\.\d{2}|-)",
        )
        .expect("compact ledger regex")
    })
}

fn spaced_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^(\d{3}|n/a)\s*([^\n]+)\n(?:[\w\s]*)?(\d{2}-\d{2}-\d{4})\s*\n(-?\$?[\d,]+\.\d{2}|-)",
        )
            .expect("spaced ledger regex")
    })
}

fn no_return_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)no tax return filed").expect("no return regex"))
}

struct RawLine<'t> {
    offset: usize,
    end: usize,
    code: &'t str,
    description: &'t str,
    cycle: Option<&'t str>,
    posted: &'t str,
    amount: &'t str,
}

fn compact_lines(section: &str) -> Vec<RawLine<'_>> {
    compact_re()
        .captures_iter(section)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some(RawLine {
                offset: whole.start(),
                end: whole.end(),
                code: c.get(1)?.as_str(),
                description: c.get(2)?.as_str(),
                cycle: c.get(3).map(|m| m.as_str()),
                posted: c.get(4)?.as_str(),
                amount: c.get(5)?.as_str(),
            })
        })
        .collect()
}

fn spaced_lines(section: &str) -> Vec<RawLine<'_>> {
    spaced_re()
        .captures_iter(section)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some(RawLine {
                offset: whole.start(),
                end: whole.end(),
                code: c.get(1)?.as_str(),
                description: c.get(2)?.as_str(),
                cycle: None,
                posted: c.get(3)?.as_str(),
                amount: c.get(4)?.as_str(),
            })
        })
        .collect()
}

/// "20231405" -> "2023-14-05" shape check only; the token is an internal
/// processing cycle, not a calendar date
fn format_cycle(token: &str) -> Option<String> {
    (token.len() == 8 && token.chars().all(|c| c.is_ascii_digit()))
        .then(|| format!("{}-{}-{}", &token[..4], &token[4..6], &token[6..]))
}

// ============================================================================
// SUMMARY
// ============================================================================

fn summary_amount_re(labels: &str) -> Regex {
    RegexBuilder::new(&format!(r"(?:{})[:\s]*([\-\$\d,.]+)", labels))
        .case_insensitive(true)
        .build()
        .expect("summary amount regex")
}

struct SummaryPatterns {
    account_balance: Regex,
    accrued_interest: Regex,
    accrued_penalty: Regex,
    total_balance: Regex,
    adjusted_gross_income: Regex,
    taxable_income: Regex,
    tax_per_return: Regex,
    se_taxpayer: Regex,
    se_spouse: Regex,
    total_se_tax: Regex,
    filing_status: Regex,
    processing_date: Regex,
    taxpayer_id: Regex,
    period_ending: Regex,
    period_december: Regex,
    period_any: Regex,
    any_year: Regex,
}

fn summary_patterns() -> &'static SummaryPatterns {
    static PATTERNS: OnceLock<SummaryPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| SummaryPatterns {
        account_balance: summary_amount_re("ACCOUNT BALANCE"),
        accrued_interest: summary_amount_re("ACCRUED INTEREST"),
        accrued_penalty: summary_amount_re("ACCRUED PENALTY"),
        total_balance: Regex::new(r"(?i)ACCOUNT BALANCE PLUS ACCRUALS.*?:\s*([\-\$\d,.]+)")
            .expect("total balance regex"),
        adjusted_gross_income: summary_amount_re("ADJUSTED GROSS INCOME"),
        // Not the tail of "SE TAXABLE INCOME"
        taxable_income: Regex::new(r"(?im)(?:^|[^A-Z ])[ \t]*TAXABLE INCOME[:\s]*([\-\$\d,.]+)")
            .expect("taxable income regex"),
        tax_per_return: summary_amount_re("TAX PER RETURN"),
        se_taxpayer: summary_amount_re("SE TAXABLE INCOME TAXPAYER"),
        se_spouse: summary_amount_re("SE TAXABLE INCOME SPOUSE"),
        total_se_tax: summary_amount_re("TOTAL SELF EMPLOYMENT TAX"),
        filing_status: Regex::new(r"(?i)FILING STATUS[:\s]*([^,\n]+)").expect("filing status regex"),
        processing_date: Regex::new(
            r"(?i)PROCESSING DATE[:\s]*([A-Za-z]+\.?\s+\d{1,2},?\s*\d{4})",
        )
        .expect("processing date regex"),
        taxpayer_id: Regex::new(r"(?i)TAXPAYER IDENTIFICATION NUMBER[:\s]*([\dXx\-]{9,})")
            .expect("taxpayer id regex"),
        period_ending: Regex::new(r"Report for Tax Period Ending:\s*\d{2}-\d{2}-(\d{4})")
            .expect("period ending regex"),
        period_december: Regex::new(r"(?i)TAX PERIOD:\s*Dec\.\s*31,\s*(\d{4})")
            .expect("december period regex"),
        period_any: Regex::new(r"(?i)TAX PERIOD:\s*[A-Za-z]+\.?\s*\d{1,2},?\s*(\d{4})")
            .expect("tax period regex"),
        any_year: Regex::new(r"\b((?:19|20)\d{2})\b").expect("year regex"),
    })
}

fn capture_year(regex: &Regex, text: &str) -> Option<i32> {
    regex.captures(text).and_then(|c| c[1].parse().ok())
}

fn capture_amount(regex: &Regex, text: &str, field: &str, diagnostics: &mut Diagnostics) -> f64 {
    let Some(raw) = regex.captures(text).and_then(|c| c.get(1)) else {
        tracing::debug!(field, "No ledger summary match");
        return 0.0;
    };
    match try_parse_money(raw.as_str()) {
        Some(value) => value,
        None => {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::TransactionParseFailure,
                    format!("Could not parse amount for {}: {:?}", field, raw.as_str()),
                )
                .with_field(field),
            );
            0.0
        }
    }
}

/// Read the summary block of an account transcript
pub fn parse_ledger_summary(text: &str) -> (LedgerSummary, Diagnostics) {
    let p = summary_patterns();
    let mut diagnostics = Diagnostics::new();

    let tax_year = capture_year(&p.period_ending, text)
        .or_else(|| capture_year(&p.period_december, text))
        .or_else(|| capture_year(&p.period_any, text))
        .or_else(|| {
            let guess = capture_year(&p.any_year, text)?;
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::TaxYearMissing,
                format!("No tax period header; guessed {} from the first year in the text", guess),
            ));
            Some(guess)
        });
    if tax_year.is_none() {
        diagnostics.record(DiagnosticKind::TaxYearMissing, "No tax year found in account transcript");
    }

    let mut amount = |regex: &Regex, field: &str| capture_amount(regex, text, field, &mut diagnostics);
    let account_balance = amount(&p.account_balance, "account_balance");
    let accrued_interest = amount(&p.accrued_interest, "accrued_interest");
    let accrued_penalty = amount(&p.accrued_penalty, "accrued_penalty");
    let total_balance = amount(&p.total_balance, "total_balance");
    let adjusted_gross_income = amount(&p.adjusted_gross_income, "adjusted_gross_income");
    let taxable_income = amount(&p.taxable_income, "taxable_income");
    let tax_per_return = amount(&p.tax_per_return, "tax_per_return");
    let se_taxable_income_taxpayer = amount(&p.se_taxpayer, "se_taxable_income_taxpayer");
    let se_taxable_income_spouse = amount(&p.se_spouse, "se_taxable_income_spouse");
    let total_se_tax = amount(&p.total_se_tax, "total_se_tax");

    let summary = LedgerSummary {
        tax_year,
        taxpayer_id: p.taxpayer_id.captures(text).map(|c| c[1].to_string()),
        account_balance,
        accrued_interest,
        accrued_penalty,
        total_balance,
        adjusted_gross_income,
        taxable_income,
        tax_per_return,
        se_taxable_income_taxpayer,
        se_taxable_income_spouse,
        total_se_tax,
        filing_status: p
            .filing_status
            .captures(text)
            .map(|c| c[1].trim().to_string())
            .filter(|s| !s.is_empty()),
        processing_date: p.processing_date.captures(text).map(|c| c[1].to_string()),
    };
    (summary, diagnostics)
}

// ============================================================================
// PARSER
// ============================================================================

pub struct TransactionLedgerParser {
    codes: CodeTable,
}

impl TransactionLedgerParser {
    pub fn new(codes: CodeTable) -> Self {
        TransactionLedgerParser { codes }
    }

    pub fn codes(&self) -> &CodeTable {
        &self.codes
    }

    /// Summary plus transactions, each transaction tagged with the summary's year
    pub fn parse(&self, text: &str) -> AccountTranscript {
        let (summary, mut diagnostics) = parse_ledger_summary(text);
        let (mut transactions, tx_diagnostics) = self.parse_transactions(text);
        diagnostics.absorb(tx_diagnostics, None);

        for transaction in &mut transactions {
            transaction.tax_year = summary.tax_year;
        }

        AccountTranscript {
            summary,
            transactions,
            diagnostics,
        }
    }

    /// Transactions in document order. Lines no grammar matches are dropped.
    pub fn parse_transactions(&self, text: &str) -> (Vec<Transaction>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();

        let Some(anchor) = text.find(SECTION_ANCHOR) else {
            diagnostics.record(
                DiagnosticKind::LedgerSectionMissing,
                format!("No {} section found", SECTION_ANCHOR),
            );
            return (Vec::new(), diagnostics);
        };
        let section = &text[anchor..];

        let mut lines = compact_lines(section);
        if lines.is_empty() {
            tracing::debug!("Compact ledger grammar found nothing, trying spaced layout");
            lines = spaced_lines(section);
        }

        let mut entries: Vec<(usize, Transaction)> = lines
            .iter()
            .map(|line| (line.offset, self.build(line, &mut diagnostics)))
            .collect();

        // Marker lines not already inside a grammar match
        for m in no_return_re().find_iter(section) {
            let covered = lines
                .iter()
                .any(|l| l.offset <= m.start() && m.start() < l.end);
            if !covered {
                entries.push((m.start(), self.no_return_marker(m.as_str())));
            }
        }

        entries.sort_by_key(|(offset, _)| *offset);
        let transactions = entries.into_iter().map(|(_, t)| t).collect();
        (transactions, diagnostics)
    }

    fn build(&self, line: &RawLine<'_>, diagnostics: &mut Diagnostics) -> Transaction {
        let code = line.code.trim();

        let date = match NaiveDate::parse_from_str(line.posted, "%m-%d-%Y") {
            Ok(date) => date.format("%Y-%m-%d").to_string(),
            Err(_) => {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::TransactionParseFailure,
                        format!("Code {}: unparsable posting date {:?}", code, line.posted),
                    )
                    .with_field("date"),
                );
                line.posted.to_string()
            }
        };

        let amount = match try_parse_money(line.amount) {
            Some(value) => value,
            None => {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::TransactionParseFailure,
                        format!("Code {}: unparsable amount {:?}", code, line.amount),
                    )
                    .with_field("amount"),
                );
                0.0
            }
        };

        Transaction {
            code: code.to_string(),
            meaning: self.codes.interpret(code),
            description: line.description.trim().to_string(),
            date,
            cycle_date: line.cycle.and_then(format_cycle),
            amount,
            tax_year: None,
        }
    }

    fn no_return_marker(&self, printed: &str) -> Transaction {
        Transaction {
            code: NO_RETURN_CODE.to_string(),
            meaning: self.codes.interpret(NO_RETURN_CODE),
            description: printed.to_string(),
            date: String::new(),
            cycle_date: None,
            amount: 0.0,
            tax_year: None,
        }
    }
}

impl Default for TransactionLedgerParser {
    fn default() -> Self {
        Self::new(CodeTable::standard())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::UNKNOWN_MEANING;
    use pretty_assertions::assert_eq;

    const COMPACT: &str = "\
Account Transcript
Report for Tax Period Ending: 12-31-2022
TAXPAYER IDENTIFICATION NUMBER: XXX-XX-1234
ACCOUNT BALANCE: $1,234.56
ACCRUED INTEREST: $45.10
ACCRUED PENALTY: $0.00
ACCOUNT BALANCE PLUS ACCRUALS (this is not a payoff amount): $1,279.66
ADJUSTED GROSS INCOME: $45,000.00
TAXABLE INCOME: $31,150.00
TAX PER RETURN: $3,500.00
SE TAXABLE INCOME TAXPAYER: $12,000.00
SE TAXABLE INCOME SPOUSE: $0.00
TOTAL SELF EMPLOYMENT TAX: $1,695.00
FILING STATUS: Married Filing Joint
PROCESSING DATE: Apr. 17, 2023

TRANSACTIONS
CODE EXPLANATION OF TRANSACTION CYCLE DATE AMOUNT
150 Tax return filed 20231505 05-01-2023 $3,500.00
806 W-2 or 1099 withholding 20231505 04-15-2023 -$2,000.00
971 Notice issued 20231505 05-01-2023 -
999 Something new 20231505 13-45-2023 $10.00
";

    const SPACED: &str = "\
TAX PERIOD: Dec. 31, 2019
ADJUSTED GROSS INCOME: $0.00
TRANSACTIONS
No tax return filed
150 Tax return filed
Cycle
06-10-2020
$1,200.00
";

    #[test]
    fn test_compact_layout() {
        let parser = TransactionLedgerParser::default();
        let transcript = parser.parse(COMPACT);
        let tx = &transcript.transactions;

        assert_eq!(tx.len(), 4);
        assert_eq!(tx[0].code, "150");
        assert_eq!(tx[0].meaning, "Tax return filed and tax assessed");
        assert_eq!(tx[0].description, "Tax return filed");
        assert_eq!(tx[0].date, "2023-05-01");
        assert_eq!(tx[0].cycle_date.as_deref(), Some("2023-15-05"));
        assert_eq!(tx[0].amount, 3_500.0);
        assert_eq!(tx[0].tax_year, Some(2022));
        assert_eq!(tx[1].amount, -2_000.0);
        println!("✅ Parsed {} compact transactions", tx.len());
    }

    #[test]
    fn test_dash_amount_is_kept_as_zero() {
        let (tx, _) = TransactionLedgerParser::default().parse_transactions(COMPACT);
        let notice = tx.iter().find(|t| t.code == "971").unwrap();
        assert_eq!(notice.amount, 0.0);
    }

    #[test]
    fn test_unknown_code_and_bad_date_degrade() {
        let (tx, diagnostics) = TransactionLedgerParser::default().parse_transactions(COMPACT);
        let unknown = tx.iter().find(|t| t.code == "999").unwrap();
        assert_eq!(unknown.meaning, UNKNOWN_MEANING);
        assert_eq!(unknown.date, "13-45-2023");
        assert_eq!(
            diagnostics
                .of_kind(DiagnosticKind::TransactionParseFailure)
                .count(),
            1
        );
    }

    #[test]
    fn test_summary_fields() {
        let (summary, diagnostics) = parse_ledger_summary(COMPACT);
        assert_eq!(summary.tax_year, Some(2022));
        assert_eq!(summary.taxpayer_id.as_deref(), Some("XXX-XX-1234"));
        assert_eq!(summary.account_balance, 1_234.56);
        assert_eq!(summary.total_balance, 1_279.66);
        assert_eq!(summary.adjusted_gross_income, 45_000.0);
        assert_eq!(summary.taxable_income, 31_150.0);
        assert_eq!(summary.se_taxable_income_taxpayer, 12_000.0);
        assert_eq!(summary.total_se_tax, 1_695.0);
        assert_eq!(summary.filing_status.as_deref(), Some("Married Filing Joint"));
        assert_eq!(
            summary.parsed_filing_status(),
            Some(FilingStatus::MarriedFilingJointly)
        );
        assert_eq!(summary.processing_date.as_deref(), Some("Apr. 17, 2023"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_taxable_income_does_not_read_se_line() {
        let text = "SE TAXABLE INCOME TAXPAYER: $9,000.00\nTAXABLE INCOME: $20,000.00\n";
        let (summary, _) = parse_ledger_summary(text);
        assert_eq!(summary.taxable_income, 20_000.0);
        assert_eq!(summary.se_taxable_income_taxpayer, 9_000.0);
    }

    #[test]
    fn test_spaced_layout_with_marker() {
        let transcript = TransactionLedgerParser::default().parse(SPACED);
        let tx = &transcript.transactions;

        assert_eq!(transcript.summary.tax_year, Some(2019));
        assert_eq!(tx.len(), 2);
        assert!(tx[0].is_no_return_marker());
        assert_eq!(tx[0].meaning, "No tax return filed");
        assert_eq!(tx[1].code, "150");
        assert_eq!(tx[1].date, "2020-06-10");
        assert_eq!(tx[1].amount, 1_200.0);
        assert_eq!(tx[1].cycle_date, None);
    }

    #[test]
    fn test_spaced_layout_negative_amount() {
        let text = "TRANSACTIONS\n806 W-2 or 1099 withholding\nCycle\n06-10-2020\n-$2,000.00\n";
        let (tx, diagnostics) = TransactionLedgerParser::default().parse_transactions(text);

        assert_eq!(tx.len(), 1);
        assert_eq!(tx[0].code, "806");
        assert_eq!(tx[0].amount, -2_000.0);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_missing_section() {
        let (tx, diagnostics) =
            TransactionLedgerParser::default().parse_transactions("ACCOUNT BALANCE: $0.00");
        assert!(tx.is_empty());
        assert_eq!(
            diagnostics.of_kind(DiagnosticKind::LedgerSectionMissing).count(),
            1
        );
    }

    #[test]
    fn test_year_fallback_is_flagged() {
        let (summary, diagnostics) = parse_ledger_summary("Printed 2021 copy\nACCOUNT BALANCE: $0.00");
        assert_eq!(summary.tax_year, Some(2021));
        assert_eq!(diagnostics.of_kind(DiagnosticKind::TaxYearMissing).count(), 1);
    }
}
