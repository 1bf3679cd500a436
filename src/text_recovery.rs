// 📄 Text Recovery Pipeline - Document bytes to usable text
//
// Strategies run in a fixed order (text layer, second text layer, OCR) and the
// first output that passes the readability gate wins. A failing strategy is
// recorded and the pipeline moves on; it never aborts the document.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};

// ============================================================================
// ERRORS
// ============================================================================

/// One strategy could not produce text
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecoveryError {
    #[error("input is not a document this strategy understands")]
    Unsupported,

    #[error("failed to parse document: {0}")]
    Parse(String),

    #[error("extractor panicked: {0}")]
    Panicked(String),

    #[error("page recognition failed: {0}")]
    Recognition(String),
}

/// Why the readability gate rejected a text
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum GateRejection {
    #[error("text is empty")]
    Empty,

    #[error("text too short ({length} chars)")]
    TooShort { length: usize },

    #[error("{count} unresolved glyph placeholders")]
    GlyphPlaceholders { count: usize },

    #[error("printable ratio {ratio:.3} too low")]
    LowPrintableRatio { ratio: f64 },

    #[error("alphabetic ratio {ratio:.3} too low")]
    LowAlphabeticRatio { ratio: f64 },

    #[error("space ratio {ratio:.4} too low")]
    LowSpaceRatio { ratio: f64 },
}

// ============================================================================
// READABILITY GATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadabilityGate {
    pub min_length: usize,
    /// More than this many "(cid:NN)" tokens means the font map was lost
    pub max_glyph_placeholders: usize,
    pub min_printable_ratio: f64,
    pub min_alphabetic_ratio: f64,
    pub min_space_ratio: f64,
}

impl Default for ReadabilityGate {
    fn default() -> Self {
        ReadabilityGate {
            min_length: 100,
            max_glyph_placeholders: 10,
            min_printable_ratio: 0.7,
            min_alphabetic_ratio: 0.2,
            min_space_ratio: 0.01,
        }
    }
}

fn glyph_placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(cid:\d+\)").expect("glyph placeholder regex"))
}

impl ReadabilityGate {
    /// Accept or reject a recovered text. Ratios are over the character count.
    pub fn evaluate(&self, text: &str) -> Result<(), GateRejection> {
        if text.is_empty() {
            return Err(GateRejection::Empty);
        }

        let length = text.chars().count();
        if length < self.min_length {
            return Err(GateRejection::TooShort { length });
        }

        let placeholders = glyph_placeholder_re().find_iter(text).count();
        if placeholders > self.max_glyph_placeholders {
            return Err(GateRejection::GlyphPlaceholders {
                count: placeholders,
            });
        }

        let total = length as f64;
        let printable = text.chars().filter(|c| (' '..='~').contains(c)).count() as f64;
        let printable_ratio = printable / total;
        if printable_ratio < self.min_printable_ratio {
            return Err(GateRejection::LowPrintableRatio {
                ratio: printable_ratio,
            });
        }

        let alphabetic_ratio = text.chars().filter(|c| c.is_alphabetic()).count() as f64 / total;
        if alphabetic_ratio <= self.min_alphabetic_ratio {
            return Err(GateRejection::LowAlphabeticRatio {
                ratio: alphabetic_ratio,
            });
        }

        let space_ratio = text.chars().filter(|c| *c == ' ').count() as f64 / total;
        if space_ratio <= self.min_space_ratio {
            return Err(GateRejection::LowSpaceRatio { ratio: space_ratio });
        }

        Ok(())
    }

    pub fn is_readable(&self, text: &str) -> bool {
        self.evaluate(text).is_ok()
    }
}

// ============================================================================
// STRATEGIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecoveryMethod {
    /// Direct text-layer extraction
    TextLayer,
    /// Independent second text-layer extractor
    SecondaryTextLayer,
    /// Rasterize and recognize
    Ocr,
    /// The input already is text
    PlainText,
}

/// TextExtractor - one way of turning document bytes into text
pub trait TextExtractor: Send + Sync {
    fn method(&self) -> RecoveryMethod;

    fn name(&self) -> &str;

    /// Cheap check on the raw bytes; strategies that cannot handle the input
    /// are skipped without counting as a failure
    fn can_handle(&self, bytes: &[u8]) -> bool {
        is_pdf(bytes)
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, RecoveryError>;
}

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.len() > 4 && &bytes[0..4] == b"%PDF"
}

/// Direct text layer via pdf-extract
#[cfg(feature = "pdf")]
pub struct PdfTextLayer;

#[cfg(feature = "pdf")]
impl TextExtractor for PdfTextLayer {
    fn method(&self) -> RecoveryMethod {
        RecoveryMethod::TextLayer
    }

    fn name(&self) -> &str {
        "pdf-extract"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, RecoveryError> {
        // pdf-extract panics on some malformed content streams
        let outcome = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));
        match outcome {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(RecoveryError::Parse(e.to_string())),
            Err(payload) => Err(RecoveryError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

/// Second, independent text layer via lopdf, page by page
#[cfg(feature = "pdf")]
pub struct LopdfTextLayer;

#[cfg(feature = "pdf")]
impl TextExtractor for LopdfTextLayer {
    fn method(&self) -> RecoveryMethod {
        RecoveryMethod::SecondaryTextLayer
    }

    fn name(&self) -> &str {
        "lopdf"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, RecoveryError> {
        let outcome = std::panic::catch_unwind(|| -> Result<String, RecoveryError> {
            let document = lopdf::Document::load_mem(bytes)
                .map_err(|e| RecoveryError::Parse(format!("failed to parse PDF: {e}")))?;

            let mut pages = Vec::new();
            for page_number in document.get_pages().keys() {
                // A page without a usable content stream reads as empty
                let text = document.extract_text(&[*page_number]).unwrap_or_default();
                pages.push(text);
            }
            Ok(pages.join("\n"))
        });

        match outcome {
            Ok(result) => result,
            Err(payload) => Err(RecoveryError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

/// PageRecognizer - pluggable OCR backend (none is bundled)
pub trait PageRecognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Rasterize the document and return the recognized text of all pages
    fn recognize(&self, bytes: &[u8]) -> Result<String, RecoveryError>;
}

/// Last-resort OCR strategy around a PageRecognizer
pub struct OcrStrategy {
    recognizer: Box<dyn PageRecognizer>,
}

impl OcrStrategy {
    pub fn new(recognizer: Box<dyn PageRecognizer>) -> Self {
        OcrStrategy { recognizer }
    }
}

impl TextExtractor for OcrStrategy {
    fn method(&self) -> RecoveryMethod {
        RecoveryMethod::Ocr
    }

    fn name(&self) -> &str {
        self.recognizer.name()
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, RecoveryError> {
        self.recognizer.recognize(bytes)
    }
}

/// Input that is already UTF-8 text (saved transcript pages, test fixtures)
pub struct PlainTextStrategy;

impl TextExtractor for PlainTextStrategy {
    fn method(&self) -> RecoveryMethod {
        RecoveryMethod::PlainText
    }

    fn name(&self) -> &str {
        "plain-text"
    }

    fn can_handle(&self, bytes: &[u8]) -> bool {
        !is_pdf(bytes)
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, RecoveryError> {
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| RecoveryError::Parse(format!("not UTF-8 text: {e}")))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Accepted,
    Rejected(GateRejection),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: String,
    pub method: RecoveryMethod,
    pub outcome: AttemptOutcome,
}

/// Output of one recovery run. `text` is empty when every strategy failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextRecovery {
    pub text: String,
    pub method: Option<RecoveryMethod>,
    pub attempts: Vec<StrategyAttempt>,
    pub diagnostics: Diagnostics,
}

impl TextRecovery {
    pub fn succeeded(&self) -> bool {
        self.method.is_some()
    }

    pub fn attempted_strategies(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.strategy.as_str()).collect()
    }
}

pub struct TextRecoveryPipeline {
    strategies: Vec<Box<dyn TextExtractor>>,
    gate: ReadabilityGate,
}

impl TextRecoveryPipeline {
    /// Default chain: both PDF text layers (with the `pdf` feature), then
    /// plain text for non-PDF input
    pub fn new() -> Self {
        #[allow(unused_mut)]
        let mut strategies: Vec<Box<dyn TextExtractor>> = Vec::new();
        #[cfg(feature = "pdf")]
        {
            strategies.push(Box::new(PdfTextLayer));
            strategies.push(Box::new(LopdfTextLayer));
        }
        strategies.push(Box::new(PlainTextStrategy));

        TextRecoveryPipeline {
            strategies,
            gate: ReadabilityGate::default(),
        }
    }

    /// Replace the whole chain
    pub fn with_strategies(strategies: Vec<Box<dyn TextExtractor>>) -> Self {
        TextRecoveryPipeline {
            strategies,
            gate: ReadabilityGate::default(),
        }
    }

    /// Builder: insert an OCR strategy after the text-layer strategies
    pub fn with_recognizer(mut self, recognizer: Box<dyn PageRecognizer>) -> Self {
        let position = self
            .strategies
            .iter()
            .position(|s| s.method() == RecoveryMethod::PlainText)
            .unwrap_or(self.strategies.len());
        self.strategies
            .insert(position, Box::new(OcrStrategy::new(recognizer)));
        self
    }

    /// Builder: replace the readability gate
    pub fn with_gate(mut self, gate: ReadabilityGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &ReadabilityGate {
        &self.gate
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the chain. Never fails: an unreadable document yields empty text,
    /// the list of attempts and a RecoveryFailure diagnostic.
    pub fn recover_text(&self, bytes: &[u8]) -> TextRecovery {
        let mut recovery = TextRecovery::default();

        for strategy in &self.strategies {
            if !strategy.can_handle(bytes) {
                tracing::debug!(strategy = strategy.name(), "Strategy skipped for this input");
                continue;
            }

            let outcome = match strategy.extract(bytes) {
                Ok(text) => match self.gate.evaluate(&text) {
                    Ok(()) => {
                        tracing::info!(
                            strategy = strategy.name(),
                            chars = text.len(),
                            "Recovered readable text"
                        );
                        recovery.text = text;
                        recovery.method = Some(strategy.method());
                        AttemptOutcome::Accepted
                    }
                    Err(rejection) => {
                        recovery.diagnostics.push(Diagnostic::new(
                            DiagnosticKind::UnreadableText,
                            format!("{}: {}", strategy.name(), rejection),
                        ));
                        AttemptOutcome::Rejected(rejection)
                    }
                },
                Err(e) => {
                    recovery.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::StrategyFailed,
                        format!("{}: {}", strategy.name(), e),
                    ));
                    AttemptOutcome::Failed(e.to_string())
                }
            };

            let accepted = outcome == AttemptOutcome::Accepted;
            recovery.attempts.push(StrategyAttempt {
                strategy: strategy.name().to_string(),
                method: strategy.method(),
                outcome,
            });
            if accepted {
                return recovery;
            }
        }

        let attempted = recovery.attempted_strategies().join(", ");
        recovery.diagnostics.push(Diagnostic::new(
            DiagnosticKind::RecoveryFailure,
            format!(
                "No strategy produced readable text (attempted: {})",
                if attempted.is_empty() { "none" } else { &attempted }
            ),
        ));
        recovery
    }
}

impl Default for TextRecoveryPipeline {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
