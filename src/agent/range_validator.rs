// QueryCut Range Validator
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Checks each candidate range against the probed source duration. Ranges are
// judged one at a time; a bad range never takes the rest of the batch down.

use serde::Serialize;
use tracing::{info, warn};

use crate::agent::segment_resolver::ConversationRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    NonFinite,
    NegativeStart,
    PastEnd,
    EmptyOrInverted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RejectedRange {
    pub range: ConversationRange,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Survivors, in the resolver's order
    pub accepted: Vec<ConversationRange>,
    pub rejected: Vec<RejectedRange>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    /// Total length of what will be rendered
    pub fn accepted_duration(&self) -> f64 {
        self.accepted.iter().map(ConversationRange::duration).sum()
    }
}

/// `0 <= start`, `end <= video_duration`, `start < end`
pub fn check_range(range: &ConversationRange, video_duration: f64) -> Result<(), RejectReason> {
    if !range.start.is_finite() || !range.end.is_finite() {
        return Err(RejectReason::NonFinite);
    }
    if range.start < 0.0 {
        return Err(RejectReason::NegativeStart);
    }
    if range.end > video_duration {
        return Err(RejectReason::PastEnd);
    }
    if range.start >= range.end {
        return Err(RejectReason::EmptyOrInverted);
    }
    Ok(())
}

pub fn validate(ranges: &[ConversationRange], video_duration: f64) -> ValidationReport {
    let mut report = ValidationReport::default();

    for range in ranges {
        match check_range(range, video_duration) {
            Ok(()) => report.accepted.push(*range),
            Err(reason) => {
                warn!(
                    "[VALIDATOR] Rejected {:.2}s-{:.2}s: {:?} (duration {:.2}s)",
                    range.start, range.end, reason, video_duration
                );
                report.rejected.push(RejectedRange {
                    range: *range,
                    reason,
                });
            }
        }
    }

    info!(
        "[VALIDATOR] {}/{} ranges valid ({:.2}s total)",
        report.accepted.len(),
        ranges.len(),
        report.accepted_duration()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: f64, end: f64) -> ConversationRange {
        ConversationRange::new(start, end)
    }

    #[test]
    fn test_each_rule() {
        assert_eq!(check_range(&r(5.0, 12.0), 15.0), Ok(()));
        assert_eq!(check_range(&r(0.0, 15.0), 15.0), Ok(()));
        assert_eq!(check_range(&r(-0.1, 3.0), 15.0), Err(RejectReason::NegativeStart));
        assert_eq!(check_range(&r(20.0, 25.0), 15.0), Err(RejectReason::PastEnd));
        assert_eq!(check_range(&r(8.0, 8.0), 15.0), Err(RejectReason::EmptyOrInverted));
        assert_eq!(check_range(&r(9.0, 4.0), 15.0), Err(RejectReason::EmptyOrInverted));
        assert_eq!(check_range(&r(f64::NAN, 4.0), 15.0), Err(RejectReason::NonFinite));
    }

    #[test]
    fn test_rejection_is_independent() {
        let ranges = vec![
            r(1.0, 3.0),
            r(-2.0, 4.0),
            r(4.0, 6.0),
            r(14.0, 16.0),
            r(7.0, 7.0),
            r(10.0, 12.0),
        ];
        let report = validate(&ranges, 15.0);

        assert_eq!(report.accepted, vec![r(1.0, 3.0), r(4.0, 6.0), r(10.0, 12.0)]);
        assert_eq!(report.rejected_count(), 3);
        assert!((report.accepted_duration() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_order_is_preserved_not_sorted() {
        let ranges = vec![r(10.0, 12.0), r(1.0, 3.0), r(5.0, 6.0)];
        let report = validate(&ranges, 15.0);
        assert_eq!(report.accepted, ranges);
    }

    #[test]
    fn test_all_rejected_is_empty_report() {
        let report = validate(&[r(20.0, 25.0)], 15.0);
        assert!(report.is_empty());
        assert_eq!(report.rejected[0].reason, RejectReason::PastEnd);
    }
}
