//! Zipcode-derived simulation rules.
//!
//! The zipcode stands in for a customer profile: its first digit decides how
//! much of the catalog is visible and its last digit selects a purchase
//! history. Anything that is not an 8-digit code falls back to the full catalog
//! with no history.

use serde::{Deserialize, Serialize};

pub const ZIPCODE_LENGTH: usize = 8;

/// Last digits at or below this value carry a purchase history.
pub const LAST_HISTORY_DIGIT: u8 = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zipcode(String);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogVisibility {
    Hidden,
    Narrowed,
    Full,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryBand {
    Entry(usize),
    NoHistory,
}

impl Zipcode {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let well_formed = trimmed.len() == ZIPCODE_LENGTH
            && trimmed.chars().all(|character| character.is_ascii_digit());
        well_formed.then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn first_digit(&self) -> u8 {
        digit_at(&self.0, 0)
    }

    pub fn last_digit(&self) -> u8 {
        digit_at(&self.0, ZIPCODE_LENGTH - 1)
    }

    pub fn visibility(&self) -> CatalogVisibility {
        match self.first_digit() {
            0 => CatalogVisibility::Hidden,
            9 => CatalogVisibility::Narrowed,
            _ => CatalogVisibility::Full,
        }
    }

    pub fn history_band(&self) -> HistoryBand {
        let last = self.last_digit();
        if last <= LAST_HISTORY_DIGIT {
            HistoryBand::Entry(usize::from(last))
        } else {
            HistoryBand::NoHistory
        }
    }
}

impl std::fmt::Display for Zipcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn visibility_for(raw: &str) -> CatalogVisibility {
    Zipcode::parse(raw).map(|zipcode| zipcode.visibility()).unwrap_or(CatalogVisibility::Full)
}

pub fn history_band_for(raw: &str) -> HistoryBand {
    Zipcode::parse(raw).map(|zipcode| zipcode.history_band()).unwrap_or(HistoryBand::NoHistory)
}

fn digit_at(digits: &str, index: usize) -> u8 {
    digits.as_bytes().get(index).map(|byte| byte - b'0').unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{history_band_for, visibility_for, CatalogVisibility, HistoryBand, Zipcode};

    #[test]
    fn first_digit_controls_catalog_visibility() {
        assert_eq!(visibility_for("01234567"), CatalogVisibility::Hidden);
        assert_eq!(visibility_for("91234567"), CatalogVisibility::Narrowed);
        assert_eq!(visibility_for("12345678"), CatalogVisibility::Full);
    }

    #[test]
    fn last_digit_selects_history_band() {
        assert_eq!(history_band_for("12345670"), HistoryBand::Entry(0));
        assert_eq!(history_band_for("12345673"), HistoryBand::Entry(3));
        assert_eq!(history_band_for("12345674"), HistoryBand::NoHistory);
        assert_eq!(history_band_for("12345679"), HistoryBand::NoHistory);
    }

    #[test]
    fn malformed_zipcodes_fall_back_to_safe_defaults() {
        for raw in ["", "1234", "12a45670", "123456701", "0123 567"] {
            assert!(Zipcode::parse(raw).is_none(), "{raw:?} should be malformed");
            assert_eq!(visibility_for(raw), CatalogVisibility::Full);
            assert_eq!(history_band_for(raw), HistoryBand::NoHistory);
        }
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let zipcode = Zipcode::parse(" 12345671 ").expect("trimmed zipcode parses");
        assert_eq!(zipcode.as_str(), "12345671");
        assert_eq!(zipcode.last_digit(), 1);
    }
}
