use std::fmt;

use crate::error::{Result, SweepError};

/// Gain compression, in dB, that defines the compression point.
pub const COMPRESSION_DB: f64 = 1.0;

/// The last sample of a power sweep before gain fell by more than 1 dB.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompressionPoint {
    pub index: usize,
    pub input_power: f64,  // dBm, IP1dB
    pub output_power: f64, // dBm, OP1dB as read, before loss correction
}

impl CompressionPoint {
    /// Output power referred to the device port.
    pub fn compensated(&self, loss_db: f64) -> f64 {
        self.output_power + loss_db
    }
}

impl fmt::Display for CompressionPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "CompressionPoint {{ index: {}, IP1dB: {:.2} dBm, OP1dB: {:.2} dBm }}",
            self.index, self.input_power, self.output_power
        )
    }
}

/// Locates the 1 dB compression point of a power sweep.
///
/// The linear reference starts at the first output reading and rises by
/// exactly 1 dB per later sample, i.e. unity small-signal slope for a 1 dB
/// input step. The first sample that falls more than [`COMPRESSION_DB`]
/// below the reference marks compression and the sample just before it is
/// reported.
///
/// Returns `Ok(None)` when the sweep never compresses, which is distinct from
/// compression found at index 0.
pub fn find_p1db(input_dbm: &[f64], output_dbm: &[f64]) -> Result<Option<CompressionPoint>> {
    if input_dbm.len() != output_dbm.len() {
        return Err(SweepError::invalid(format!(
            "input and output sweeps differ in length: {} vs {}",
            input_dbm.len(),
            output_dbm.len()
        )));
    }

    let Some(&first) = output_dbm.first() else {
        return Ok(None);
    };

    let mut linear_reference = first;
    for (i, &measured) in output_dbm.iter().enumerate().skip(1) {
        linear_reference += 1.0;
        if linear_reference - measured > COMPRESSION_DB {
            return Ok(Some(CompressionPoint {
                index: i - 1,
                input_power: input_dbm[i - 1],
                output_power: output_dbm[i - 1],
            }));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_sample_before_compression() {
        let input = [-10.0, -9.0, -8.0, -7.0, -6.0];
        let output = [0.0, 1.0, 2.0, 2.5, 2.6];

        let point = find_p1db(&input, &output).unwrap().unwrap();
        assert_eq!(point.index, 3);
        assert_eq!(point.input_power, -7.0);
        assert_eq!(point.output_power, 2.5);
    }

    #[test]
    fn linear_sweep_has_no_compression() {
        let input = [-10.0, -9.0, -8.0, -7.0];
        let output = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(find_p1db(&input, &output).unwrap(), None);
    }

    #[test]
    fn exactly_one_db_is_not_compressed() {
        let input = [0.0, 1.0, 2.0];
        let output = [10.0, 11.0, 11.0];
        assert_eq!(find_p1db(&input, &output).unwrap(), None);
    }

    #[test]
    fn compression_at_first_sample() {
        // second sample already 1.5 dB below the reference
        let input = [0.0, 1.0, 2.0];
        let output = [10.0, 9.5, 9.0];

        let point = find_p1db(&input, &output).unwrap().unwrap();
        assert_eq!(point.index, 0);
        assert_eq!(point.input_power, 0.0);
        assert_eq!(point.output_power, 10.0);
    }

    #[test]
    fn empty_and_single_sample() {
        assert_eq!(find_p1db(&[], &[]).unwrap(), None);
        assert_eq!(find_p1db(&[0.0], &[-3.0]).unwrap(), None);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = find_p1db(&[0.0, 1.0], &[0.0]).unwrap_err();
        assert!(matches!(err, SweepError::InvalidArgument(_)));
    }

    #[test]
    fn compensated_output() {
        let point = CompressionPoint {
            index: 4,
            input_power: -3.0,
            output_power: 7.5,
        };
        assert_eq!(point.compensated(1.0), 8.5);
    }
}
