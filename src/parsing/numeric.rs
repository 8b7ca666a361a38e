//! Locale-aware coercion of text cells to numbers.

use crate::parsing::schema::DecimalSeparator;

/// A cell after numeric coercion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Value(f64),
    Missing,
    Unparsable,
}

impl Cell {
    pub fn value(self) -> Option<f64> {
        match self {
            Cell::Value(v) => Some(v),
            Cell::Missing | Cell::Unparsable => None,
        }
    }
}

/// Parses a number written with the given decimal separator.
pub fn parse_locale_f64(raw: &str, separator: DecimalSeparator) -> Option<f64> {
    let trimmed = raw.trim();
    let parsed = match separator {
        DecimalSeparator::Point => trimmed.parse::<f64>(),
        DecimalSeparator::Comma => return parse_comma_decimal(trimmed),
        DecimalSeparator::Auto if trimmed.contains('.') => trimmed.parse(),
        DecimalSeparator::Auto => trimmed.replace(',', ".").parse(),
    };
    parsed.ok()
}

/// Reads a comma-decimal number. A point is only accepted as thousands
/// separator between groups of three digits, so "3.2" is not a number here.
fn parse_comma_decimal(trimmed: &str) -> Option<f64> {
    let (integer, fraction) = match trimmed.split_once(',') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (trimmed, None),
    };
    if fraction.is_some_and(|f| f.contains('.')) {
        return None;
    }
    let integer = if integer.contains('.') {
        let mut groups = integer.trim_start_matches(['+', '-']).split('.');
        let head = groups.next()?;
        let digits = |g: &str| g.bytes().all(|b| b.is_ascii_digit());
        if !(1..=3).contains(&head.len()) || !digits(head) {
            return None;
        }
        if !groups.all(|g| g.len() == 3 && digits(g)) {
            return None;
        }
        integer.replace('.', "")
    } else {
        integer.to_string()
    };
    let normalized = match fraction {
        Some(fraction) => format!("{integer}.{fraction}"),
        None => integer,
    };
    normalized.parse().ok()
}

/// Missing-value sentinels, matched textually and numerically.
#[derive(Debug, Clone, Default)]
pub struct Sentinels {
    texts: Vec<String>,
    numbers: Vec<f64>,
}

impl Sentinels {
    pub fn new<S: AsRef<str>>(sentinels: &[S], separator: DecimalSeparator) -> Self {
        let texts: Vec<String> = sentinels
            .iter()
            .map(|s| s.as_ref().trim().to_string())
            .collect();
        let numbers = texts
            .iter()
            .filter_map(|s| parse_locale_f64(s, separator))
            .collect();
        Self { texts, numbers }
    }

    pub fn matches(&self, trimmed: &str, number: Option<f64>) -> bool {
        self.texts.iter().any(|t| t == trimmed)
            || number.is_some_and(|n| self.numbers.contains(&n))
    }
}

/// Coerces one text cell. Empty cells, sentinels and non-finite numbers are
/// missing; anything else that is not a number is unparsable.
pub fn coerce(raw: Option<&str>, sentinels: &Sentinels, separator: DecimalSeparator) -> Cell {
    let Some(trimmed) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Cell::Missing;
    };
    let number = parse_locale_f64(trimmed, separator);
    if sentinels.matches(trimmed, number) {
        return Cell::Missing;
    }
    match number {
        Some(n) if n.is_finite() => Cell::Value(n),
        Some(_) => Cell::Missing,
        None => Cell::Unparsable,
    }
}
