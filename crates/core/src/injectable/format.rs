//! Display formats for times and numbers.
//!
//! Injectors advertise the formats they support through [`Formats`]; a
//! template node may pick one of them per code. Time patterns use the
//! familiar `DD/MM/YYYY HH:mm` token style and are translated to chrono
//! specifiers. Number patterns are `0`, `0.00`, `#,##0.00` and similar.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Format used for times when neither the injector nor the template picks one.
pub const DEFAULT_TIME_FORMAT: &str = "YYYY-MM-DD HH:mm";

/// Declared formats of an injector: a default plus allowed alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formats {
    pub default: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl Formats {
    pub fn new(default: impl Into<String>, options: &[&str]) -> Self {
        Self {
            default: default.into(),
            options: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether `format` is the default or one of the declared alternatives.
    pub fn allows(&self, format: &str) -> bool {
        self.default == format || self.options.iter().any(|o| o == format)
    }

    /// Pick the effective format for a requested one.
    ///
    /// Unknown or absent requests fall back to the default.
    pub fn select<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested {
            Some(f) if self.allows(f) => f,
            Some(f) => {
                tracing::debug!(
                    requested = f,
                    default = %self.default,
                    "Unrecognized format, using default"
                );
                &self.default
            }
            None => &self.default,
        }
    }
}

// ---------------------------------------------------------------------------
// Time patterns
// ---------------------------------------------------------------------------

/// Tokens ordered longest first so `MMMM` wins over `MM`.
const TIME_TOKENS: &[(&str, &str)] = &[
    ("YYYY", "%Y"),
    ("MMMM", "%B"),
    ("MMM", "%b"),
    ("YY", "%y"),
    ("MM", "%m"),
    ("DD", "%d"),
    ("HH", "%H"),
    ("hh", "%I"),
    ("mm", "%M"),
    ("ss", "%S"),
    ("M", "%-m"),
    ("D", "%-d"),
    ("A", "%p"),
];

/// Translate a token pattern into a chrono format string.
///
/// Characters that are not part of a token are copied literally (with `%`
/// escaped), so the result is always a valid chrono pattern.
pub fn to_chrono_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for (token, spec) in TIME_TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = tail;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
        }
        rest = chars.as_str();
    }
    out
}

/// Format a timestamp with a token pattern.
pub fn format_time(t: &Timestamp, pattern: &str) -> String {
    t.format(&to_chrono_pattern(pattern)).to_string()
}

// ---------------------------------------------------------------------------
// Number patterns
// ---------------------------------------------------------------------------

/// Format a number.
///
/// Without a pattern, whole numbers print without a fractional part and
/// everything else uses the shortest representation. With a pattern, the
/// digits after `.` fix the decimal places and a `,` enables thousands
/// grouping.
pub fn format_number(n: f64, pattern: Option<&str>) -> String {
    let Some(pattern) = pattern else {
        if n.fract() == 0.0 && n.abs() < 1e15 {
            return format!("{}", n as i64);
        }
        return n.to_string();
    };

    let decimals = pattern
        .split_once('.')
        .map(|(_, frac)| frac.chars().filter(|c| *c == '0' || *c == '#').count())
        .unwrap_or(0);
    let fixed = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (fixed, None),
    };

    let int_part = if pattern.contains(',') {
        group_thousands(&int_part)
    } else {
        int_part
    };

    let sign = if n < 0.0 && fixed_is_nonzero(&int_part, frac_part.as_deref()) {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(f) => format!("{sign}{int_part}.{f}"),
        None => format!("{sign}{int_part}"),
    }
}

fn fixed_is_nonzero(int_part: &str, frac_part: Option<&str>) -> bool {
    int_part.chars().any(|c| c.is_ascii_digit() && c != '0')
        || frac_part.is_some_and(|f| f.chars().any(|c| c != '0'))
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn translates_common_patterns() {
        assert_eq!(to_chrono_pattern("DD/MM/YYYY"), "%d/%m/%Y");
        assert_eq!(to_chrono_pattern("HH:mm:ss"), "%H:%M:%S");
        assert_eq!(to_chrono_pattern("D MMMM YYYY"), "%-d %B %Y");
    }

    #[test]
    fn escapes_percent() {
        assert_eq!(to_chrono_pattern("100% DD"), "100%% %d");
    }

    #[test]
    fn formats_times() {
        assert_eq!(format_time(&sample(), "DD/MM/YYYY"), "09/03/2024");
        assert_eq!(format_time(&sample(), "D MMMM YYYY"), "9 March 2024");
        assert_eq!(format_time(&sample(), "hh:mm A"), "02:05 PM");
    }

    #[test]
    fn select_falls_back_to_default() {
        let formats = Formats::new("DD/MM/YYYY", &["YYYY-MM-DD"]);
        assert_eq!(formats.select(Some("YYYY-MM-DD")), "YYYY-MM-DD");
        assert_eq!(formats.select(Some("nonsense")), "DD/MM/YYYY");
        assert_eq!(formats.select(None), "DD/MM/YYYY");
    }

    #[test]
    fn numbers_without_pattern() {
        assert_eq!(format_number(42.0, None), "42");
        assert_eq!(format_number(2.5, None), "2.5");
        assert_eq!(format_number(-3.0, None), "-3");
    }

    #[test]
    fn numbers_with_pattern() {
        assert_eq!(format_number(1234567.891, Some("#,##0.00")), "1,234,567.89");
        assert_eq!(format_number(3.14159, Some("0.000")), "3.142");
        assert_eq!(format_number(-1500.0, Some("#,##0")), "-1,500");
        assert_eq!(format_number(-0.001, Some("0.00")), "0.00");
    }
}
