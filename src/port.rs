//! Port selection: the well-known preset and the textual port expression
//! (`22`, `1-1024`, `22,80-90`).

use std::{collections::BTreeSet, num::IntErrorKind};

use once_cell::sync::Lazy;

use crate::error::ScanError;

const MIN_PORT: i64 = 1;
const MAX_PORT: i64 = 65535;

const COMMON_PORTS: [u16; 41] = [
    20, 21, 22, 23, 25, 53, 67, 68, 69, 80, 88, 110, 123, 135, 139, 143, 161, 162, 389, 443, 445,
    465, 514, 587, 631, 636, 993, 995, 1080, 1194, 1433, 1521, 1723, 2049, 3306, 3389, 5900, 6379,
    8000, 8080, 8443,
];

/// Commonly probed ports, sorted and without duplicates.
pub static WELL_KNOWN: Lazy<Vec<u16>> = Lazy::new(|| {
    let mut ports = COMMON_PORTS.to_vec();
    ports.sort_unstable();
    ports.dedup();
    ports
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortsToScan {
    WellKnown,
    Selected(String),
}

impl PortsToScan {
    /// Returns the ports in ascending order. The result may be empty when
    /// every value falls outside `1..=65535`; deciding whether that is fatal
    /// is up to the caller.
    pub fn ports(&self) -> Result<Vec<u16>, ScanError> {
        match self {
            PortsToScan::WellKnown => Ok(WELL_KNOWN.clone()),
            PortsToScan::Selected(expr) => parse(expr),
        }
    }
}

// Single underscores are accepted between digits (`1_000`); anywhere else
// they leave the token malformed.
fn strip_separators(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let misplaced = bytes.iter().enumerate().any(|(i, &b)| {
        b == b'_'
            && !(i > 0
                && bytes[i - 1].is_ascii_digit()
                && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
    });

    (!misplaced).then(|| raw.replace('_', ""))
}

// Out-of-range magnitudes are still integers, so they saturate instead of
// failing and get dropped by the bounds filter.
fn number(raw: &str, token: &str) -> Result<i64, ScanError> {
    let invalid = || ScanError::InvalidPort(token.into());

    let digits = strip_separators(raw.trim()).ok_or_else(invalid)?;
    match digits.parse::<i64>() {
        Ok(n) => Ok(n),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(i64::MAX),
            IntErrorKind::NegOverflow => Ok(i64::MIN),
            _ => Err(invalid()),
        },
    }
}

/// Parses a comma separated list of ports and inclusive ranges.
///
/// A single malformed token fails the whole expression. Ranges whose start
/// is greater than their end contribute nothing. Empty tokens left by
/// repeated commas are ignored.
pub fn parse(expr: &str) -> Result<Vec<u16>, ScanError> {
    let mut ports = BTreeSet::new();

    for token in expr.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (start, end) = match token.split_once('-') {
            Some((a, b)) => (number(a, token)?, number(b, token)?),
            None => {
                let port = number(token, token)?;
                (port, port)
            }
        };

        let (start, end) = (start.max(MIN_PORT), end.min(MAX_PORT));
        if start <= end {
            ports.extend((start..=end).filter_map(|p| u16::try_from(p).ok()));
        }
    }

    log::debug!("Port expression `{}` selected {} ports", expr, ports.len());

    Ok(ports.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixes_ranges_and_single_ports() {
        assert_eq!(parse("22,80-82,80").unwrap(), vec![22, 80, 81, 82]);
    }

    #[test]
    fn trims_whitespace_around_tokens_and_bounds() {
        assert_eq!(parse(" 443 , 20 - 21 ").unwrap(), vec![20, 21, 443]);
    }

    #[test]
    fn out_of_bounds_values_are_dropped() {
        assert!(parse("70000").unwrap().is_empty());
        assert!(parse("0").unwrap().is_empty());
        assert!(parse("99999999999999999999999").unwrap().is_empty());
        assert_eq!(parse("65530-70000").unwrap(), (65530..=65535).collect::<Vec<u16>>());
        assert_eq!(parse("0-2").unwrap(), vec![1, 2]);
    }

    #[test]
    fn reversed_range_is_empty() {
        assert!(parse("90-80").unwrap().is_empty());
        assert_eq!(parse("90-80,7").unwrap(), vec![7]);
    }

    #[test]
    fn malformed_token_fails_whole_expression() {
        assert!(matches!(parse("22,,abc"), Err(ScanError::InvalidPort(t)) if t == "abc"));
        assert!(matches!(parse("1-2-3"), Err(ScanError::InvalidPort(_))));
        assert!(matches!(parse("-5"), Err(ScanError::InvalidPort(_))));
        assert!(matches!(parse("80-"), Err(ScanError::InvalidPort(_))));
        assert!(matches!(parse("22,http"), Err(ScanError::InvalidPort(_))));
    }

    #[test]
    fn underscores_between_digits_are_separators() {
        assert_eq!(parse("1_000").unwrap(), vec![1000]);
        assert_eq!(parse("8_0-8_2").unwrap(), vec![80, 81, 82]);
        assert_eq!(parse("+2_2").unwrap(), vec![22]);
    }

    #[test]
    fn misplaced_underscores_are_malformed() {
        for expr in ["_80", "80_", "1__000", "+_22", "22,4_4_"] {
            assert!(matches!(parse(expr), Err(ScanError::InvalidPort(_))), "{expr}");
        }
    }

    #[test]
    fn empty_tokens_are_skipped() {
        assert_eq!(parse("22,,23,").unwrap(), vec![22, 23]);
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn output_is_sorted_unique_and_bounded() {
        for expr in ["5,4,3,2,1", "100-110,105-120,1", "65535,1,65535", "10-1,3000-2990"] {
            let ports = parse(expr).unwrap();
            assert!(ports.windows(2).all(|w| w[0] < w[1]), "{expr}");
            assert!(ports.iter().all(|&p| p >= 1), "{expr}");
        }
    }

    #[test]
    fn reparsing_canonical_output_is_stable() {
        let first = parse("443,22,80-85,81,8080").unwrap();
        let canonical = first
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",");

        assert_eq!(parse(&canonical).unwrap(), first);
    }

    #[test]
    fn well_known_preset_is_sorted_and_unique() {
        let ports = PortsToScan::WellKnown.ports().unwrap();

        assert_eq!(ports.len(), COMMON_PORTS.len());
        assert!(ports.windows(2).all(|w| w[0] < w[1]));
        assert!(ports.contains(&22) && ports.contains(&8443));
    }

    #[test]
    fn selected_delegates_to_parser() {
        let selected = PortsToScan::Selected("1-3".into());

        assert_eq!(selected.ports().unwrap(), vec![1, 2, 3]);
    }
}
