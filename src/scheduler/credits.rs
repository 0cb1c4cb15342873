//! Credit math shared with the ledger.
//!
//! A full play consumes one credit unit per started 5-second block. The
//! ledger charges with the same formula; the two must never drift.

/// Credit units consumed by a full play of the given duration.
///
/// `ceil(duration_secs / 5)`: a 1-5s track costs 1 unit, 6-10s costs 2,
/// and exactly divisible durations round down to the quotient (180s -> 36).
pub fn credits_required(duration_secs: u64) -> u64 {
    duration_secs.div_ceil(5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_durations() {
        assert_eq!(credits_required(1), 1);
        assert_eq!(credits_required(4), 1);
        assert_eq!(credits_required(5), 1);
        assert_eq!(credits_required(6), 2);
        assert_eq!(credits_required(10), 2);
        assert_eq!(credits_required(11), 3);
        assert_eq!(credits_required(180), 36);
        assert_eq!(credits_required(181), 37);
    }

    #[test]
    fn test_matches_ceiling_formula() {
        for d in 1..1000u64 {
            let expected = (d as f64 / 5.0).ceil() as u64;
            assert_eq!(credits_required(d), expected, "duration {}", d);
        }
    }
}
