use crate::error::{Result, SweepError};

pub(crate) fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Input power levels for a compression sweep, in dBm.
///
/// Produces `ceil((stop - start) / step)` levels starting at `start`, each
/// computed as `start + i * step` and rounded to hundredths so no error
/// accumulates across the sweep. The sweep ends early at the first level that
/// would reach `max_dbm`, which protects the device input.
pub fn power_sweep_range(start_dbm: f64, stop_dbm: f64, step_db: f64, max_dbm: f64) -> Result<Vec<f64>> {
    if !step_db.is_finite() || step_db <= 0.0 {
        return Err(SweepError::invalid(format!(
            "power step must be positive, got {}",
            step_db
        )));
    }
    if !start_dbm.is_finite() || !stop_dbm.is_finite() || max_dbm.is_nan() {
        return Err(SweepError::invalid(format!(
            "power sweep bounds must be finite, got start {} stop {} max {}",
            start_dbm, stop_dbm, max_dbm
        )));
    }

    let steps = ((stop_dbm - start_dbm) / step_db).ceil();
    if steps <= 0.0 {
        return Ok(Vec::new());
    }

    let levels = (0u64..)
        .map(|i| i as f64)
        .take_while(|&i| i < steps)
        .map(|i| start_dbm + i * step_db)
        .take_while(|&level| level < max_dbm)
        .map(round_hundredths)
        .collect();
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_span_below_max() {
        let levels = power_sweep_range(-15.0, 15.0, 1.0, 18.0).unwrap();
        assert_eq!(levels.len(), 30);
        assert_eq!(levels.first(), Some(&-15.0));
        assert_eq!(levels.last(), Some(&14.0));
    }

    #[test]
    fn truncated_by_max() {
        let levels = power_sweep_range(-15.0, 15.0, 1.0, 10.0).unwrap();
        assert_eq!(levels.len(), 25);
        assert_eq!(levels.last(), Some(&9.0));
    }

    #[test]
    fn distant_stop_is_bounded_by_max() {
        let levels = power_sweep_range(-15.0, 1.0e18, 1.0, 18.0).unwrap();
        assert_eq!(levels.len(), 33);
        assert_eq!(levels.last(), Some(&17.0));

        let fine = power_sweep_range(0.0, 10.0, 1.0e-9, 0.0).unwrap();
        assert!(fine.is_empty());
    }

    #[test]
    fn max_is_exclusive() {
        let levels = power_sweep_range(0.0, 10.0, 1.0, 5.0).unwrap();
        assert_eq!(levels, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn start_equal_to_stop_is_empty() {
        assert!(power_sweep_range(5.0, 5.0, 1.0, 18.0).unwrap().is_empty());
    }

    #[test]
    fn start_at_or_above_max_is_empty() {
        assert!(power_sweep_range(18.0, 30.0, 1.0, 18.0).unwrap().is_empty());
        assert!(power_sweep_range(20.0, 30.0, 1.0, 18.0).unwrap().is_empty());
    }

    #[test]
    fn descending_bounds_are_empty() {
        assert!(power_sweep_range(10.0, 0.0, 1.0, 18.0).unwrap().is_empty());
    }

    #[test]
    fn fractional_step_has_no_drift() {
        let levels = power_sweep_range(-1.0, 0.0, 0.1, 18.0).unwrap();
        assert_eq!(levels.len(), 10);
        assert_eq!(levels[3], -0.7);
        assert_eq!(levels[9], -0.1);
    }

    #[test]
    fn partial_step_rounds_count_up() {
        // 2.5 dB span at 1 dB steps takes three levels
        let levels = power_sweep_range(0.0, 2.5, 1.0, 18.0).unwrap();
        assert_eq!(levels, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn non_positive_step_is_rejected() {
        for step in [0.0, -1.0, f64::NAN] {
            let err = power_sweep_range(-15.0, 15.0, step, 18.0).unwrap_err();
            assert!(matches!(err, SweepError::InvalidArgument(_)));
        }
    }

    #[test]
    fn repeatable() {
        assert_eq!(
            power_sweep_range(-20.0, 10.0, 1.0, 18.0).unwrap(),
            power_sweep_range(-20.0, 10.0, 1.0, 18.0).unwrap()
        );
    }
}
