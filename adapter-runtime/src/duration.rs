//! A narrow ISO-8601 duration parser for the `PT<n>[HMS]` frequency
//! strings used in schedule configuration (spec.md §4.7/§6).
//!
//! No crate in this retrieval pack does only this: `chrono` parses
//! calendar dates and times, not durations, and pulling in a
//! general-purpose duration crate for one string shape would be the
//! kind of needless dependency the rest of this workspace avoids.
//! Thirty lines with unit tests is the idiomatic choice here.

use adapter_api::{Error, Result};

/// Parses `PT<n>H`, `PT<n>M`, `PT<n>S`, or any concatenation of those
/// three components (`PT1H30M`), into whole seconds. Fractional
/// component values are not supported; EdgeX-style schedule strings
/// never need them.
pub fn parse_iso8601(s: &str) -> Result<u64> {
    let rest = s
        .strip_prefix("PT")
        .ok_or_else(|| Error::BadConfig(format!("duration '{}' must start with 'PT'", s)))?;

    if rest.is_empty() {
        return Err(Error::BadConfig(format!("duration '{}' has no components", s)));
    }

    let mut seconds: u64 = 0;
    let mut digits = String::new();
    let mut saw_component = false;

    for c in rest.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let value: u64 = digits
            .parse()
            .map_err(|_| Error::BadConfig(format!("duration '{}' has a malformed number", s)))?;
        digits.clear();

        let multiplier = match c {
            'H' => 3600,
            'M' => 60,
            'S' => 1,
            other => {
                return Err(Error::BadConfig(format!(
                    "duration '{}' has unsupported unit '{}'",
                    s, other
                )))
            }
        };

        seconds += value * multiplier;
        saw_component = true;
    }

    if !digits.is_empty() || !saw_component {
        return Err(Error::BadConfig(format!("duration '{}' is incomplete", s)));
    }

    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_component() {
        assert_eq!(parse_iso8601("PT2S").unwrap(), 2);
        assert_eq!(parse_iso8601("PT10M").unwrap(), 600);
        assert_eq!(parse_iso8601("PT1H").unwrap(), 3600);
    }

    #[test]
    fn parses_combined_components() {
        assert_eq!(parse_iso8601("PT1H30M").unwrap(), 5400);
        assert_eq!(parse_iso8601("PT1H2M3S").unwrap(), 3723);
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(parse_iso8601("2S").is_err());
    }

    #[test]
    fn rejects_unsupported_unit() {
        assert!(parse_iso8601("PT2D").is_err());
    }

    #[test]
    fn rejects_trailing_digits_without_unit() {
        assert!(parse_iso8601("PT2S5").is_err());
    }

    #[test]
    fn rejects_empty_body() {
        assert!(parse_iso8601("PT").is_err());
    }
}
