// 💵 Money Parsing - Locale-tolerant dollar strings to f64
// Transcripts print amounts as "$1,234.56", "-$12.00", "1.234,56" or a lone "-".

/// Parse a money string, returning `None` when nothing numeric is left.
///
/// A lone dash or an empty string is a printed zero, not a failure.
pub fn try_parse_money(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return Some(0.0);
    }

    let negative = trimmed.starts_with('-')
        || trimmed.ends_with('-')
        || (trimmed.starts_with('(') && trimmed.ends_with(')'));

    let digits: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    // "$1,000.00." at the end of a sentence
    let digits = digits.trim_end_matches(['.', ',']);

    if !digits.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = normalize_separators(digits);
    let value: f64 = normalized.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    Some(if negative { -value } else { value })
}

/// Parse a money string; unparsable input degrades to 0.0.
pub fn parse_money(raw: &str) -> f64 {
    try_parse_money(raw).unwrap_or(0.0)
}

/// Decide which of `.`/`,` is the decimal mark and drop the other.
///
/// The last separator followed by exactly one or two digits is the decimal
/// mark. Everything else is a thousands separator.
fn normalize_separators(digits: &str) -> String {
    let last_sep = digits.rfind(|c| c == '.' || c == ',');

    let decimal_at = last_sep.filter(|&pos| {
        let tail = &digits[pos + 1..];
        (1..=2).contains(&tail.len()) && tail.chars().all(|c| c.is_ascii_digit())
    });

    digits
        .char_indices()
        .filter_map(|(i, c)| match c {
            '.' | ',' if Some(i) == decimal_at => Some('.'),
            '.' | ',' => None,
            _ => Some(c),
        })
        .collect()
}

/// "$12,345.68" style rendering for recommendations and status lines
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_encodings() {
        assert_eq!(parse_money("1,234.56"), 1234.56);
        assert_eq!(parse_money("$52,000.00"), 52000.0);
        assert_eq!(parse_money("-$125.00"), -125.0);
        assert_eq!(parse_money("$0.00"), 0.0);
        assert_eq!(parse_money("1.234,56"), 1234.56);
        assert_eq!(parse_money("1,234"), 1234.0);
        assert_eq!(parse_money("1,000.00."), 1000.0);
    }

    #[test]
    fn test_dash_and_empty_are_zero() {
        assert_eq!(try_parse_money("-"), Some(0.0));
        assert_eq!(try_parse_money(""), Some(0.0));
        assert_eq!(parse_money("  "), 0.0);
    }

    #[test]
    fn test_garbage_degrades_to_zero() {
        assert_eq!(try_parse_money("abc"), None);
        assert_eq!(parse_money("abc"), 0.0);
        assert_eq!(parse_money("$"), 0.0);
    }

    #[test]
    fn test_always_finite() {
        let huge = "9".repeat(400);
        for raw in ["1,234.56", "-", "", "abc", huge.as_str(), "..,,"] {
            assert!(parse_money(raw).is_finite(), "not finite for {:?}", raw);
        }
    }

    #[test]
    fn test_parenthesized_and_trailing_minus() {
        assert_eq!(parse_money("(45.10)"), -45.1);
        assert_eq!(parse_money("45.10-"), -45.1);
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(15_000.0), "$15,000.00");
        assert_eq!(format_currency(1_234_567.891), "$1,234,567.89");
        assert_eq!(format_currency(999.5), "$999.50");
        assert_eq!(format_currency(-4_385.0), "-$4,385.00");
        assert_eq!(format_currency(0.0), "$0.00");
    }
}
