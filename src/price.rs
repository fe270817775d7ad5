//! Locale-aware conversion of displayed numbers ("29,18 €", "1.299,00",
//! "4,7 von 5 Sternen", "12.345 Sternebewertungen") into `f64`.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NUMBER_RE: Regex = Regex::new("\\d+(?:[.,\u{a0}\u{202f}]\\d+)*").unwrap();
    static ref DECIMAL_COMMA_RE: Regex = Regex::new(r"(\d),(\d)").unwrap();
}

const CURRENCY_MARKERS: [&str; 9] = ["EUR", "USD", "GBP", "€", "$", "£", "¥", "₹", "%"];

/// Parses the first number found in `text`.
///
/// Currency symbols and units are ignored. When both `.` and `,` appear the
/// later one is the decimal separator; a lone separator followed by exactly
/// three digits is read as a thousands separator.
pub fn parse_number(text: &str) -> Option<f64> {
    let mut cleaned = text.to_string();
    for marker in CURRENCY_MARKERS {
        cleaned = cleaned.replace(marker, " ");
    }

    let token = NUMBER_RE.find(&cleaned)?.as_str();
    let token: String = token
        .chars()
        .filter(|c| !matches!(c, '\u{a0}' | '\u{202f}'))
        .collect();

    normalize_separators(&token).parse::<f64>().ok()
}

fn normalize_separators(token: &str) -> String {
    let last_comma = token.rfind(',');
    let last_dot = token.rfind('.');

    match (last_comma, last_dot) {
        (Some(c), Some(d)) => {
            if c > d {
                token.replace('.', "").replace(',', ".")
            } else {
                token.replace(',', "")
            }
        }
        (Some(_), None) => single_separator(token, ','),
        (None, Some(_)) => single_separator(token, '.'),
        (None, None) => token.to_string(),
    }
}

fn single_separator(token: &str, sep: char) -> String {
    let count = token.matches(sep).count();
    let trailing = token.rsplit(sep).next().map(str::len).unwrap_or(0);
    if count > 1 || trailing == 3 {
        token.replace(sep, "")
    } else {
        token.replace(sep, ".")
    }
}

/// Rewrites decimal commas between digits ("17,8 x 7,3 cm") as points.
pub fn decimal_commas_to_points(text: &str) -> String {
    DECIMAL_COMMA_RE.replace_all(text, "$1.$2").to_string()
}

/// Rounds to whole cents.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_german_prices() {
        assert_eq!(parse_number("29,18 €"), Some(29.18));
        assert_eq!(parse_number("€59,99"), Some(59.99));
        assert_eq!(parse_number("1.299,00 €"), Some(1299.0));
        assert_eq!(parse_number("1\u{a0}299,00 €"), Some(1299.0));
    }

    #[test]
    fn parses_english_prices() {
        assert_eq!(parse_number("$1,299.99"), Some(1299.99));
        assert_eq!(parse_number("EUR 112.99"), Some(112.99));
    }

    #[test]
    fn parses_counts_and_scores() {
        assert_eq!(parse_number("12.345 Sternebewertungen"), Some(12345.0));
        assert_eq!(parse_number("4,7 von 5 Sternen"), Some(4.7));
        assert_eq!(parse_number("-51 %"), Some(51.0));
        assert_eq!(parse_number("Du sparst: 30,81 € (51 %)"), Some(30.81));
    }

    #[test]
    fn unparsable_text_is_absent() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("Derzeit nicht verfügbar."), None);
    }

    #[test]
    fn rewrites_dimension_commas() {
        assert_eq!(
            decimal_commas_to_points("17,8 x 7,3 x 17,7 cm; 0,48 Gramm"),
            "17.8 x 7.3 x 17.7 cm; 0.48 Gramm"
        );
    }

    #[test]
    fn rounds_to_cents() {
        assert_eq!(round_cents(59.99 - 29.18), 30.81);
        assert_eq!(round_cents(112.99 - 99.0), 13.99);
    }
}
