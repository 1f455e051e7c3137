//! Proposal number allocation.
//!
//! Numbers look like `HI<YYYY><MM><NNNN>` (e.g. `HI2024070001`), where the
//! four-digit sequence restarts every calendar month (UTC). When the sequenced
//! path fails the allocator falls back to `HI<YYYY>` followed by the last six
//! digits of the current epoch milliseconds, and marks the result degraded so
//! it can be told apart from a sequenced number of the same shape.

use crate::errors::AppError;
use crate::store::ProposalStore;
use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use std::sync::OnceLock;

pub const NUMBER_PREFIX: &str = "HI";
pub const MAX_SEQUENCE: u32 = 9999;

/// An allocated proposal number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalNumber {
    pub value: String,
    /// True when produced by the timestamp fallback.
    pub degraded: bool,
}

/// `HI` + year + zero-padded month, the shared prefix of a month's numbers.
pub fn month_prefix(now: DateTime<Utc>) -> String {
    format!("{}{}{:02}", NUMBER_PREFIX, now.year(), now.month())
}

pub fn format_sequenced(now: DateTime<Utc>, sequence: u32) -> Result<String, AppError> {
    if sequence == 0 || sequence > MAX_SEQUENCE {
        return Err(AppError::AllocationFailure(format!(
            "sequence {} outside 1..={} for {}",
            sequence,
            MAX_SEQUENCE,
            month_prefix(now)
        )));
    }
    Ok(format!("{}{:04}", month_prefix(now), sequence))
}

pub fn format_fallback(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().rem_euclid(1_000_000);
    format!("{}{}{:06}", NUMBER_PREFIX, now.year(), millis)
}

/// Trailing sequence of a number carrying `prefix`, if it is well formed.
pub fn parse_sequence(number: &str, prefix: &str) -> Option<u32> {
    let tail = number.strip_prefix(prefix)?;
    if tail.len() != 4 || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    tail.parse().ok()
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^HI\d{4}(\d{2}\d{4}|\d{6})$").expect("proposal number pattern is valid")
    })
}

pub fn is_well_formed(number: &str) -> bool {
    number_pattern().is_match(number)
}

/// Assigns proposal numbers against a [`ProposalStore`].
pub struct ProposalNumberAllocator<'a> {
    store: &'a dyn ProposalStore,
}

impl<'a> ProposalNumberAllocator<'a> {
    pub fn new(store: &'a dyn ProposalStore) -> Self {
        Self { store }
    }

    /// Allocates the next number for the month containing `now`.
    ///
    /// Never fails: any error on the sequenced path degrades to the
    /// timestamp form. Uniqueness is finally enforced by the store on insert.
    pub async fn allocate(&self, now: DateTime<Utc>) -> ProposalNumber {
        match self.sequenced(now).await {
            Ok(value) => {
                tracing::debug!("Generated proposal number: {}", value);
                ProposalNumber {
                    value,
                    degraded: false,
                }
            }
            Err(e) => {
                let value = format_fallback(now);
                tracing::warn!(
                    "Sequenced proposal number unavailable ({}), using fallback {}",
                    e,
                    value
                );
                ProposalNumber {
                    value,
                    degraded: true,
                }
            }
        }
    }

    async fn sequenced(&self, now: DateTime<Utc>) -> Result<String, AppError> {
        let prefix = month_prefix(now);
        let sequence = self.store.next_sequence(&prefix).await?;
        format_sequenced(now, sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn july_2024() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_month_prefix_is_zero_padded() {
        assert_eq!(month_prefix(july_2024()), "HI202407");
        let december = Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(month_prefix(december), "HI202512");
    }

    #[test]
    fn test_format_sequenced() {
        assert_eq!(format_sequenced(july_2024(), 1).unwrap(), "HI2024070001");
        assert_eq!(format_sequenced(july_2024(), 8).unwrap(), "HI2024070008");
        assert_eq!(format_sequenced(july_2024(), 9999).unwrap(), "HI2024079999");
    }

    #[test]
    fn test_format_sequenced_rejects_out_of_range() {
        assert!(matches!(
            format_sequenced(july_2024(), 0),
            Err(AppError::AllocationFailure(_))
        ));
        assert!(matches!(
            format_sequenced(july_2024(), 10_000),
            Err(AppError::AllocationFailure(_))
        ));
    }

    #[test]
    fn test_fallback_uses_last_six_epoch_digits() {
        let now = Utc.timestamp_millis_opt(1_720_000_482_913).unwrap();
        assert_eq!(format_fallback(now), "HI2024482913");

        // Leading zeros of the six-digit tail are kept.
        let now = Utc.timestamp_millis_opt(1_720_000_000_042).unwrap();
        assert_eq!(format_fallback(now), "HI2024000042");
    }

    #[test]
    fn test_parse_sequence() {
        assert_eq!(parse_sequence("HI2024070007", "HI202407"), Some(7));
        assert_eq!(parse_sequence("HI2024079999", "HI202407"), Some(9999));
        assert_eq!(parse_sequence("HI2024080007", "HI202407"), None);
        assert_eq!(parse_sequence("HI20240700x7", "HI202407"), None);
        assert_eq!(parse_sequence("HI20240700071", "HI202407"), None);
    }

    #[test]
    fn test_well_formed() {
        assert!(is_well_formed("HI2024070001"));
        assert!(is_well_formed("HI2024482913"));
        assert!(!is_well_formed("HI202407001"));
        assert!(!is_well_formed("XX2024070001"));
        assert!(!is_well_formed("HI2024070001 "));
    }
}
