use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Result, SweepError};

pub const HZ_PER_GHZ: f64 = 1.0e9;
pub const HZ_PER_MHZ: f64 = 1.0e6;

/// Which mixing product carries the signal of interest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sideband {
    /// LO = RF - IF
    Upper,
    /// LO = RF + IF
    Lower,
}

impl Sideband {
    pub fn lo_frequency(&self, if_ghz: f64, rf_ghz: f64) -> f64 {
        match self {
            Sideband::Upper => rf_ghz - if_ghz,
            Sideband::Lower => rf_ghz + if_ghz,
        }
    }
}

impl FromStr for Sideband {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upper" => Ok(Sideband::Upper),
            "lower" => Ok(Sideband::Lower),
            other => Err(SweepError::invalid(format!(
                "sideband must be \"upper\" or \"lower\", got {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for Sideband {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Sideband::Upper => write!(f, "upper"),
            Sideband::Lower => write!(f, "lower"),
        }
    }
}

/// LO frequency for every (IF, RF) pair, IF-major and RF-minor.
pub fn lo_frequencies(if_ghz: &[f64], rf_ghz: &[f64], sideband: Sideband) -> Vec<f64> {
    let mut lo_ghz = Vec::with_capacity(if_ghz.len() * rf_ghz.len());
    for &intermediate in if_ghz {
        for &radio in rf_ghz {
            lo_ghz.push(sideband.lo_frequency(intermediate, radio));
        }
    }
    lo_ghz
}

pub fn validate_axis(name: &str, axis_ghz: &[f64]) -> Result<()> {
    if axis_ghz.is_empty() {
        return Err(SweepError::invalid(format!("{} axis is empty", name)));
    }
    if let Some(bad) = axis_ghz.iter().find(|f| !f.is_finite() || **f <= 0.0) {
        return Err(SweepError::invalid(format!(
            "{} axis values must be positive GHz, got {}",
            name, bad
        )));
    }
    Ok(())
}

/// One (IF, RF) combination together with the LO derived for it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrequencyPoint {
    pub if_index: usize,
    pub rf_index: usize,
    pub if_ghz: f64,
    pub rf_ghz: f64,
    pub lo_ghz: f64,
}

impl FrequencyPoint {
    /// Frequency to program into the LO synthesizer ahead of a multiplier chain.
    pub fn synthesizer_hz(&self, lo_multiplier: f64) -> f64 {
        self.lo_ghz * HZ_PER_GHZ / lo_multiplier
    }
}

impl fmt::Display for FrequencyPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "IF {}GHz, LO {}GHz, RF {}GHz",
            self.if_ghz, self.lo_ghz, self.rf_ghz
        )
    }
}

/// Validated IF and RF axes with the LO derived for every pair.
#[derive(Clone, Debug)]
pub struct FrequencyPlan {
    if_ghz: Vec<f64>,
    rf_ghz: Vec<f64>,
    sideband: Sideband,
    lo_multiplier: f64,
    points: Vec<FrequencyPoint>,
}

impl FrequencyPlan {
    pub fn new(if_ghz: Vec<f64>, rf_ghz: Vec<f64>, sideband: Sideband) -> Result<FrequencyPlan> {
        validate_axis("IF", &if_ghz)?;
        validate_axis("RF", &rf_ghz)?;

        let lo_ghz = lo_frequencies(&if_ghz, &rf_ghz, sideband);
        let mut points = Vec::with_capacity(lo_ghz.len());
        for (i, &intermediate) in if_ghz.iter().enumerate() {
            for (j, &radio) in rf_ghz.iter().enumerate() {
                points.push(FrequencyPoint {
                    if_index: i,
                    rf_index: j,
                    if_ghz: intermediate,
                    rf_ghz: radio,
                    lo_ghz: lo_ghz[i * rf_ghz.len() + j],
                });
            }
        }

        if let Some(bad) = points.iter().find(|p| p.lo_ghz <= 0.0) {
            return Err(SweepError::invalid(format!(
                "{} sideband gives a non-positive LO for {}",
                sideband, bad
            )));
        }

        Ok(FrequencyPlan {
            if_ghz,
            rf_ghz,
            sideband,
            lo_multiplier: 1.0,
            points,
        })
    }

    pub fn with_lo_multiplier(mut self, lo_multiplier: f64) -> Result<FrequencyPlan> {
        if !lo_multiplier.is_finite() || lo_multiplier <= 0.0 {
            return Err(SweepError::invalid(format!(
                "LO multiplier must be positive, got {}",
                lo_multiplier
            )));
        }
        self.lo_multiplier = lo_multiplier;
        Ok(self)
    }

    pub fn if_ghz(&self) -> &[f64] {
        &self.if_ghz
    }

    pub fn rf_ghz(&self) -> &[f64] {
        &self.rf_ghz
    }

    pub fn sideband(&self) -> Sideband {
        self.sideband
    }

    pub fn lo_multiplier(&self) -> f64 {
        self.lo_multiplier
    }

    /// All points, IF-major and RF-minor.
    pub fn points(&self) -> &[FrequencyPoint] {
        &self.points
    }

    pub fn point(&self, if_index: usize, rf_index: usize) -> &FrequencyPoint {
        &self.points[if_index * self.rf_ghz.len() + rf_index]
    }

    pub fn lo_ghz(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.lo_ghz).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_sideband_adds_if() {
        let lo = lo_frequencies(&[5.25, 5.5], &[18.0, 19.0], Sideband::Lower);
        assert_eq!(lo, vec![23.25, 24.25, 23.5, 24.5]);
    }

    #[test]
    fn upper_sideband_subtracts_if() {
        let lo = lo_frequencies(&[5.0, 6.0], &[18.0, 20.0, 22.0], Sideband::Upper);
        assert_eq!(lo, vec![13.0, 15.0, 17.0, 12.0, 14.0, 16.0]);
    }

    #[test]
    fn sideband_parsing() {
        assert_eq!("upper".parse::<Sideband>().unwrap(), Sideband::Upper);
        assert_eq!("lower".parse::<Sideband>().unwrap(), Sideband::Lower);

        for bad in ["Lower", "LSB", "", "lower "] {
            let err = bad.parse::<Sideband>().unwrap_err();
            assert!(matches!(err, SweepError::InvalidArgument(_)), "{:?}", bad);
        }
    }

    #[test]
    fn plan_orders_if_major() {
        let plan = FrequencyPlan::new(vec![1.0, 2.0], vec![10.0, 20.0, 30.0], Sideband::Lower).unwrap();
        let order: Vec<(usize, usize)> = plan.points().iter().map(|p| (p.if_index, p.rf_index)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);

        let point = plan.point(1, 2);
        assert_eq!(point.if_ghz, 2.0);
        assert_eq!(point.rf_ghz, 30.0);
        assert_eq!(point.lo_ghz, 32.0);
        assert_eq!(plan.lo_ghz(), lo_frequencies(&[1.0, 2.0], &[10.0, 20.0, 30.0], Sideband::Lower));
    }

    #[test]
    fn plan_is_repeatable() {
        let a = FrequencyPlan::new(vec![5.25, 5.57], vec![18.0, 46.0], Sideband::Upper).unwrap();
        let b = FrequencyPlan::new(vec![5.25, 5.57], vec![18.0, 46.0], Sideband::Upper).unwrap();
        assert_eq!(a.points(), b.points());
    }

    #[test]
    fn plan_rejects_bad_axes() {
        assert!(FrequencyPlan::new(vec![], vec![18.0], Sideband::Lower).is_err());
        assert!(FrequencyPlan::new(vec![5.0], vec![-18.0], Sideband::Lower).is_err());
        assert!(FrequencyPlan::new(vec![f64::NAN], vec![18.0], Sideband::Lower).is_err());
        // upper sideband with IF above RF leaves no LO
        assert!(FrequencyPlan::new(vec![20.0], vec![18.0], Sideband::Upper).is_err());
    }

    #[test]
    fn synthesizer_frequency_divides_by_multiplier() {
        let plan = FrequencyPlan::new(vec![5.0], vec![35.0], Sideband::Lower)
            .unwrap()
            .with_lo_multiplier(4.0)
            .unwrap();
        let point = plan.point(0, 0);
        assert_eq!(point.lo_ghz, 40.0);
        assert_eq!(point.synthesizer_hz(plan.lo_multiplier()), 10.0e9);

        assert!(FrequencyPlan::new(vec![5.0], vec![35.0], Sideband::Lower)
            .unwrap()
            .with_lo_multiplier(0.0)
            .is_err());
    }
}
