use serde::Deserialize;

use crate::error::{Result, SweepError};

/// Cable or path attenuation in dB, added to raw readings to refer them to
/// the device ports.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LossCorrection {
    /// Same loss at every frequency point
    Scalar(f64),
    /// One loss per point of the frequency axis it belongs to
    PerPoint(Vec<f64>),
}

impl Default for LossCorrection {
    fn default() -> Self {
        LossCorrection::Scalar(0.0)
    }
}

impl From<f64> for LossCorrection {
    fn from(loss_db: f64) -> Self {
        LossCorrection::Scalar(loss_db)
    }
}

impl From<Vec<f64>> for LossCorrection {
    fn from(loss_db: Vec<f64>) -> Self {
        LossCorrection::PerPoint(loss_db)
    }
}

impl LossCorrection {
    pub fn at(&self, index: usize) -> Result<f64> {
        match self {
            LossCorrection::Scalar(loss) => Ok(*loss),
            LossCorrection::PerPoint(losses) => losses.get(index).copied().ok_or_else(|| {
                SweepError::invalid(format!(
                    "no loss correction for frequency point {} ({} values given)",
                    index,
                    losses.len()
                ))
            }),
        }
    }

    /// Raw reading referred to the device port.
    pub fn apply(&self, raw_dbm: f64, index: usize) -> Result<f64> {
        Ok(raw_dbm + self.at(index)?)
    }

    /// Checks that a per-point list covers an axis of `len` points.
    pub fn check_covers(&self, len: usize, name: &str) -> Result<()> {
        if let LossCorrection::PerPoint(losses) = self {
            if losses.len() < len {
                return Err(SweepError::invalid(format!(
                    "{} loss has {} values but the axis has {} points",
                    name,
                    losses.len(),
                    len
                )));
            }
        }
        Ok(())
    }

    /// Adds a fixed loss, e.g. board traces on top of a cable.
    pub fn offset(&self, extra_db: f64) -> LossCorrection {
        match self {
            LossCorrection::Scalar(loss) => LossCorrection::Scalar(loss + extra_db),
            LossCorrection::PerPoint(losses) => {
                LossCorrection::PerPoint(losses.iter().map(|loss| loss + extra_db).collect())
            }
        }
    }
}

/// Loss corrections for every port touched by one test.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathLosses {
    /// Stimulus generator to device input, indexed by the stimulus axis
    pub stimulus: LossCorrection,
    /// Second tone generator to device input, two-tone tests only
    pub stimulus_second: LossCorrection,
    /// LO generator to device LO port
    pub lo: f64,
    /// Device output to analyzer, indexed by the measured axis
    pub measured: LossCorrection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_applies_everywhere() {
        let loss = LossCorrection::Scalar(3.0);
        assert_eq!(loss.at(0).unwrap(), 3.0);
        assert_eq!(loss.at(1000).unwrap(), 3.0);
        assert_eq!(loss.apply(-20.0, 7).unwrap(), -17.0);
        assert!(loss.check_covers(1000, "LO").is_ok());
    }

    #[test]
    fn per_point_is_indexed() {
        let loss = LossCorrection::from(vec![2.01, 2.18, 2.29]);
        assert_eq!(loss.at(1).unwrap(), 2.18);
        assert!(loss.check_covers(3, "RF").is_ok());
        assert!(loss.check_covers(2, "RF").is_ok());
    }

    #[test]
    fn short_per_point_list_is_rejected() {
        let loss = LossCorrection::PerPoint(vec![0.64, 0.58]);
        assert!(matches!(loss.at(2), Err(SweepError::InvalidArgument(_))));
        assert!(matches!(loss.check_covers(3, "IF"), Err(SweepError::InvalidArgument(_))));
    }

    #[test]
    fn offset_adds_to_every_point() {
        assert_eq!(LossCorrection::Scalar(0.7).offset(0.5), LossCorrection::Scalar(1.2));
        assert_eq!(
            LossCorrection::PerPoint(vec![1.0, 2.0]).offset(1.0),
            LossCorrection::PerPoint(vec![2.0, 3.0])
        );
    }

    #[test]
    fn deserializes_scalar_or_list() {
        #[derive(Deserialize)]
        struct Losses {
            lo_db: LossCorrection,
            rf_db: LossCorrection,
        }
        let losses: Losses = toml::from_str("lo_db = 3\nrf_db = [2.01, 2.18]\n").unwrap();
        assert_eq!(losses.lo_db, LossCorrection::Scalar(3.0));
        assert_eq!(losses.rf_db, LossCorrection::PerPoint(vec![2.01, 2.18]));
    }
}
