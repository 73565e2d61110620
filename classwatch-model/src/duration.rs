//! Video length normalization.
//!
//! Classroom posts carry durations in whatever shape the author's tooling
//! produced: `MM:SS`, `HH:MM:SS`, or a bare number of seconds. Everything is
//! normalized to whole seconds before it reaches the tracking backend.

use crate::error::{ModelError, Result};

/// Raw duration as it appears on a video post.
///
/// JSON numbers may be fractional; they are rounded to the nearest second.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum DurationInput {
    Seconds(u64),
    Fractional(f64),
    Text(String),
}

impl DurationInput {
    /// Whole seconds, or `InvalidDuration` for text that does not parse and
    /// numbers that are negative or out of range.
    pub fn to_secs(&self) -> Result<u64> {
        match self {
            DurationInput::Seconds(secs) => Ok(*secs),
            DurationInput::Fractional(secs) => {
                let rounded = secs.round();
                if rounded.is_finite() && rounded >= 0.0 && rounded < u64::MAX as f64 {
                    Ok(rounded as u64)
                } else {
                    Err(ModelError::InvalidDuration(secs.to_string()))
                }
            }
            DurationInput::Text(raw) => parse_duration_secs(raw),
        }
    }
}

impl From<u64> for DurationInput {
    fn from(value: u64) -> Self {
        DurationInput::Seconds(value)
    }
}

impl From<&str> for DurationInput {
    fn from(value: &str) -> Self {
        DurationInput::Text(value.to_string())
    }
}

/// Parse `MM:SS`, `HH:MM:SS` or a bare integer into seconds.
///
/// Minutes in `MM:SS` may exceed 59 (`75:00` is a valid 75 minute video);
/// every trailing component must stay below 60.
pub fn parse_duration_secs(raw: &str) -> Result<u64> {
    let trimmed = raw.trim();
    let invalid = || ModelError::InvalidDuration(raw.to_string());

    if trimmed.is_empty() {
        return Err(invalid());
    }

    let parts = trimmed
        .split(':')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<u64>().map_err(|_| invalid())
        })
        .collect::<Result<Vec<u64>>>()?;

    match parts.as_slice() {
        [secs] => Ok(*secs),
        [mins, secs] if *secs < 60 => mins
            .checked_mul(60)
            .and_then(|total| total.checked_add(*secs))
            .ok_or_else(invalid),
        [hours, mins, secs] if *mins < 60 && *secs < 60 => hours
            .checked_mul(3600)
            .and_then(|total| total.checked_add(mins * 60 + secs))
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_supported_shapes() {
        assert_eq!(parse_duration_secs("600").unwrap(), 600);
        assert_eq!(parse_duration_secs("10:00").unwrap(), 600);
        assert_eq!(parse_duration_secs("4:05").unwrap(), 245);
        assert_eq!(parse_duration_secs("01:02:03").unwrap(), 3723);
        assert_eq!(parse_duration_secs(" 75:00 ").unwrap(), 4500);
    }

    #[test]
    fn rejects_malformed_input() {
        for raw in [
            "",
            "abc",
            "1:60",
            "1:60:00",
            "1::2",
            "-5",
            "1:2:3:4",
            "3.5",
            "307445734561825861:00",
            "18446744073709551615:59",
            "5124095576030432:00:00",
            "99999999999999999999",
        ] {
            assert!(
                parse_duration_secs(raw).is_err(),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn input_variants_normalize() {
        assert_eq!(DurationInput::from(90).to_secs().unwrap(), 90);
        assert_eq!(DurationInput::from("1:30").to_secs().unwrap(), 90);
        assert_eq!(DurationInput::Fractional(90.5).to_secs().unwrap(), 91);
        assert!(DurationInput::Fractional(-3.0).to_secs().is_err());
        assert!(DurationInput::Fractional(f64::NAN).to_secs().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_numbers_and_text_deserialize() {
        let parsed: Vec<DurationInput> =
            serde_json::from_str(r#"[212, 90.5, "3:32"]"#).unwrap();
        let secs: Vec<u64> =
            parsed.iter().map(|d| d.to_secs().unwrap()).collect();
        assert_eq!(secs, [212, 91, 212]);
    }
}
