//! Human-friendly time spans for authored cue content.

use std::sync::OnceLock;

use regex::Regex;

static UNIT_PATTERN: OnceLock<Regex> = OnceLock::new();

fn unit_pattern() -> &'static Regex {
    UNIT_PATTERN.get_or_init(|| {
        Regex::new(r"(\d+\.?\d*)\s*([smh]?)").expect("static timespan pattern is valid")
    })
}

/// Parses a time span into milliseconds.
///
/// Accepts clock notation (`"1:30"` is minutes:seconds, `"1:02:03"` is
/// hours:minutes:seconds) and unit notation (`"90s"`, `"1m 30s"`, `"2h"`).
/// A bare number without a unit counts as minutes. Unparseable input is 0.
pub fn parse_timespan(span: &str) -> u64 {
    let cleaned: String = span
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_digit() || matches!(c, '.' | 's' | 'm' | 'h' | ':') {
                c
            } else {
                ' '
            }
        })
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return 0;
    }

    let colon_parts: Vec<&str> = cleaned.split(':').map(str::trim).collect();
    if colon_parts.len() > 1 {
        let numbers: Option<Vec<f64>> = colon_parts.iter().map(|p| p.parse().ok()).collect();
        if let Some(numbers) = numbers {
            let seconds = match numbers.as_slice() {
                [m, s] => m * 60.0 + s,
                [h, m, s] => h * 3600.0 + m * 60.0 + s,
                _ => 0.0,
            };
            return (seconds * 1000.0).round() as u64;
        }
    }

    let mut total_ms = 0.0;
    for caps in unit_pattern().captures_iter(cleaned) {
        let Ok(value) = caps[1].parse::<f64>() else {
            continue;
        };
        let unit_ms = match &caps[2] {
            "s" => 1_000.0,
            "h" => 3_600_000.0,
            _ => 60_000.0,
        };
        total_ms += value * unit_ms;
    }

    total_ms.round() as u64
}
