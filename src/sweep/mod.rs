//! Sweep orchestration: nested frequency/power loops driving the bench.
//!
//! Every instrument state change is followed by its settle barrier before the
//! next read. Orchestrators only measure; laying the rows out in a workbook is
//! the job of [`crate::report`].

mod conversion;
mod oip3;
mod p1db;

pub use conversion::{conversion_gain_sweep, ConversionRow, ConversionSetup};
pub use oip3::{oip3_sweep, Oip3Row, Oip3Setup};
pub use p1db::{p1db_sweep, P1dbSetup, P1dbTrace};

use std::fmt;

use crate::error::{Result, SweepError};
use crate::frequency::{FrequencyPlan, FrequencyPoint, HZ_PER_GHZ};
use crate::instrument::{SettleReason, Settler, SignalAnalyzer, SignalGenerator, MEASUREMENT_MARKER};
use crate::loss::PathLosses;

/// Which way the device converts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Up-conversion: IF in, RF out
    Transmit,
    /// Down-conversion: RF in, IF out
    Receive,
}

impl Direction {
    pub fn stimulus_ghz(&self, point: &FrequencyPoint) -> f64 {
        match self {
            Direction::Transmit => point.if_ghz,
            Direction::Receive => point.rf_ghz,
        }
    }

    pub fn stimulus_index(&self, point: &FrequencyPoint) -> usize {
        match self {
            Direction::Transmit => point.if_index,
            Direction::Receive => point.rf_index,
        }
    }

    pub fn measured_ghz(&self, point: &FrequencyPoint) -> f64 {
        match self {
            Direction::Transmit => point.rf_ghz,
            Direction::Receive => point.if_ghz,
        }
    }

    pub fn measured_index(&self, point: &FrequencyPoint) -> usize {
        match self {
            Direction::Transmit => point.rf_index,
            Direction::Receive => point.if_index,
        }
    }

    pub fn stimulus_port(&self) -> &'static str {
        match self {
            Direction::Transmit => "IF",
            Direction::Receive => "RF",
        }
    }

    pub fn measured_port(&self) -> &'static str {
        match self {
            Direction::Transmit => "RF",
            Direction::Receive => "IF",
        }
    }

    fn axis_lengths(&self, plan: &FrequencyPlan) -> (usize, usize) {
        let (if_len, rf_len) = (plan.if_ghz().len(), plan.rf_ghz().len());
        match self {
            Direction::Transmit => (if_len, rf_len),
            Direction::Receive => (rf_len, if_len),
        }
    }

    /// Checks that per-point loss lists cover the axes this direction indexes.
    pub fn check_losses(&self, plan: &FrequencyPlan, losses: &PathLosses, two_tone: bool) -> Result<()> {
        let (stimulus_len, measured_len) = self.axis_lengths(plan);
        losses.stimulus.check_covers(stimulus_len, self.stimulus_port())?;
        if two_tone {
            losses
                .stimulus_second
                .check_covers(stimulus_len, self.stimulus_port())?;
        }
        losses.measured.check_covers(measured_len, self.measured_port())
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Transmit => write!(f, "TX"),
            Direction::Receive => write!(f, "RX"),
        }
    }
}

/// Explicit handles to the instruments taking part in one test.
pub struct Bench<'a> {
    pub stimulus: &'a mut dyn SignalGenerator,
    /// Only two-tone tests use a second stimulus generator
    pub second_tone: Option<&'a mut dyn SignalGenerator>,
    pub lo: &'a mut dyn SignalGenerator,
    pub analyzer: &'a mut dyn SignalAnalyzer,
    pub settler: Settler<'a>,
}

impl<'a> Bench<'a> {
    fn tune_stimulus(&mut self, hz: f64, amplitude_dbm: f64) -> Result<()> {
        self.stimulus.set_frequency(hz)?;
        self.settler.wait(SettleReason::Frequency);
        self.stimulus.set_amplitude(amplitude_dbm)?;
        self.settler.wait(SettleReason::Amplitude);
        Ok(())
    }

    fn set_lo_amplitude(&mut self, dbm: f64) -> Result<()> {
        self.lo.set_amplitude(dbm)?;
        self.settler.wait(SettleReason::Amplitude);
        Ok(())
    }

    fn tune_lo(&mut self, point: &FrequencyPoint, lo_multiplier: f64, settle: SettleReason) -> Result<()> {
        self.lo.set_frequency(point.synthesizer_hz(lo_multiplier))?;
        self.settler.wait(settle);
        Ok(())
    }

    fn center_analyzer(&mut self, hz: f64) -> Result<()> {
        self.analyzer.set_frequency(hz)?;
        self.settler.wait(SettleReason::Frequency);
        Ok(())
    }

    fn place_marker(&mut self, hz: f64) -> Result<()> {
        self.analyzer.set_marker(MEASUREMENT_MARKER, hz)?;
        self.settler.wait(SettleReason::Marker);
        Ok(())
    }

    fn read_marker(&mut self) -> Result<f64> {
        self.analyzer.get_power(MEASUREMENT_MARKER)
    }

    fn measure_at(&mut self, hz: f64) -> Result<f64> {
        self.place_marker(hz)?;
        self.read_marker()
    }

    fn second_tone(&mut self) -> Result<&mut (dyn SignalGenerator + 'a)> {
        self.second_tone
            .as_deref_mut()
            .ok_or_else(|| SweepError::invalid("two-tone test needs a second stimulus generator"))
    }
}

fn ghz_to_hz(ghz: f64) -> f64 {
    ghz * HZ_PER_GHZ
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::Sideband;
    use crate::loss::LossCorrection;

    #[test]
    fn direction_selects_ports() {
        let point = FrequencyPoint {
            if_index: 1,
            rf_index: 3,
            if_ghz: 5.25,
            rf_ghz: 18.0,
            lo_ghz: 23.25,
        };
        assert_eq!(Direction::Transmit.stimulus_ghz(&point), 5.25);
        assert_eq!(Direction::Transmit.measured_index(&point), 3);
        assert_eq!(Direction::Receive.stimulus_ghz(&point), 18.0);
        assert_eq!(Direction::Receive.measured_index(&point), 1);
        assert_eq!(Direction::Receive.measured_port(), "IF");
    }

    #[test]
    fn loss_lists_checked_against_direction() {
        let plan = FrequencyPlan::new(vec![5.0, 6.0], vec![18.0, 19.0, 20.0], Sideband::Lower).unwrap();
        let losses = PathLosses {
            stimulus: LossCorrection::PerPoint(vec![0.5, 0.6]),
            measured: LossCorrection::PerPoint(vec![2.0, 2.1, 2.2]),
            ..PathLosses::default()
        };
        assert!(Direction::Transmit.check_losses(&plan, &losses, false).is_ok());
        // receive stimulates RF with only two IF-length values
        assert!(Direction::Receive.check_losses(&plan, &losses, false).is_err());

        let two_tone = PathLosses {
            stimulus_second: LossCorrection::PerPoint(vec![0.5]),
            ..losses
        };
        assert!(Direction::Transmit.check_losses(&plan, &two_tone, true).is_err());
    }
}
