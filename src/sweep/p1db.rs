use tracing::{debug, info, warn};

use super::{ghz_to_hz, Bench, Direction};
use crate::compression::{find_p1db, CompressionPoint};
use crate::error::{Result, SweepError};
use crate::frequency::{FrequencyPlan, FrequencyPoint};
use crate::instrument::SettleReason;
use crate::loss::PathLosses;

/// Drive levels for a compression sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct P1dbSetup {
    pub direction: Direction,
    pub input_dbm: Vec<f64>, // from power::power_sweep_range
    pub lo_dbm: f64,
}

/// The power sweep taken at one frequency combination.
#[derive(Clone, Debug, PartialEq)]
pub struct P1dbTrace {
    pub point: FrequencyPoint,
    pub input_dbm: Vec<f64>,
    pub raw_dbm: Vec<f64>,
    pub output_loss_db: f64,
    pub compression: Option<CompressionPoint>,
}

impl P1dbTrace {
    /// Readings referred to the device output port.
    pub fn compensated_dbm(&self) -> Vec<f64> {
        self.raw_dbm.iter().map(|p| p + self.output_loss_db).collect()
    }

    pub fn input_p1db(&self) -> Option<f64> {
        self.compression.map(|c| c.input_power)
    }

    pub fn output_p1db(&self) -> Option<f64> {
        self.compression.map(|c| c.compensated(self.output_loss_db))
    }

    pub fn raw_output_p1db(&self) -> Option<f64> {
        self.compression.map(|c| c.output_power)
    }
}

/// Sweeps the stimulus power at every IF and RF combination and locates the
/// 1 dB compression point of each sweep.
pub fn p1db_sweep(
    bench: &mut Bench<'_>,
    plan: &FrequencyPlan,
    setup: &P1dbSetup,
    losses: &PathLosses,
) -> Result<Vec<P1dbTrace>> {
    let direction = setup.direction;
    let Some(&first_dbm) = setup.input_dbm.first() else {
        return Err(SweepError::invalid("compression sweep has no input power levels"));
    };
    direction.check_losses(plan, losses, false)?;

    info!(
        %direction,
        points = plan.points().len(),
        levels = setup.input_dbm.len(),
        "starting P1dB sweep"
    );

    let first_point = plan.points()[0];
    bench
        .stimulus
        .set_amplitude(first_dbm + losses.stimulus.at(direction.stimulus_index(&first_point))?)?;
    bench.settler.wait(SettleReason::Amplitude);
    bench.set_lo_amplitude(setup.lo_dbm + losses.lo)?;
    bench.stimulus.turn_on()?;
    bench.lo.turn_on()?;

    let mut traces = Vec::with_capacity(plan.points().len());
    for point in plan.points() {
        let point = *point;
        let stimulus_loss = losses.stimulus.at(direction.stimulus_index(&point))?;
        let output_loss_db = losses.measured.at(direction.measured_index(&point))?;
        let measured_hz = ghz_to_hz(direction.measured_ghz(&point));

        bench.stimulus.set_frequency(ghz_to_hz(direction.stimulus_ghz(&point)))?;
        bench.settler.wait(SettleReason::Frequency);
        bench.tune_lo(&point, plan.lo_multiplier(), SettleReason::Frequency)?;
        bench.center_analyzer(measured_hz)?;
        bench.place_marker(measured_hz)?;

        let mut raw_dbm = Vec::with_capacity(setup.input_dbm.len());
        for &input_dbm in &setup.input_dbm {
            bench.stimulus.set_amplitude(input_dbm + stimulus_loss)?;
            bench.settler.wait(SettleReason::PowerStep);
            let reading = bench.read_marker()?;
            debug!(%point, input_dbm, raw_dbm = reading, "compression sample");
            raw_dbm.push(reading);
        }

        let compression = find_p1db(&setup.input_dbm, &raw_dbm)?;
        match compression {
            Some(found) => info!(%point, %found, "compression point"),
            None => warn!(%point, "no compression within the power sweep"),
        }

        traces.push(P1dbTrace {
            point,
            input_dbm: setup.input_dbm.clone(),
            raw_dbm,
            output_loss_db,
            compression,
        });
    }

    bench.stimulus.turn_off()?;
    bench.lo.turn_off()?;

    info!(%direction, traces = traces.len(), "P1dB sweep complete");
    Ok(traces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::Sideband;
    use crate::loss::LossCorrection;
    use crate::power::power_sweep_range;
    use crate::simulation::MixerModel;
    use crate::sweep::testing::Rig;

    fn model() -> MixerModel {
        MixerModel {
            conversion_gain_db: -8.0,
            output_p1db_dbm: Some(2.0),
            output_loss_db: 1.0,
            ..MixerModel::default()
        }
    }

    #[test]
    fn finds_compression_of_clipping_mixer() {
        let mut rig = Rig::new(model());
        let plan = FrequencyPlan::new(vec![5.25], vec![18.0, 30.0], Sideband::Lower).unwrap();
        let setup = P1dbSetup {
            direction: Direction::Transmit,
            input_dbm: power_sweep_range(-15.0, 15.0, 1.0, 18.0).unwrap(),
            lo_dbm: 15.0,
        };
        let losses = PathLosses {
            lo: 3.0,
            measured: LossCorrection::Scalar(1.0),
            ..PathLosses::default()
        };

        let traces = p1db_sweep(&mut rig.handles(false), &plan, &setup, &losses).unwrap();
        assert_eq!(traces.len(), 2);

        for trace in &traces {
            // output holds at 3 dBm from 11 dBm input; exactly 1 dB behind
            // the reference at 12 dBm, 2 dB behind at 13 dBm
            let compression = trace.compression.unwrap();
            assert_eq!(compression.input_power, 12.0);
            assert_eq!(trace.input_p1db(), Some(12.0));
            let op1db = trace.output_p1db().unwrap();
            assert!((op1db - 3.0).abs() < 1e-9, "OP1dB {}", op1db);
            let raw = trace.raw_output_p1db().unwrap();
            assert!((raw - 2.0).abs() < 1e-9, "raw OP1dB {}", raw);
            assert_eq!(trace.raw_dbm.len(), 30);
            assert_eq!(trace.compensated_dbm()[0], trace.raw_dbm[0] + 1.0);
        }
    }

    #[test]
    fn linear_device_reports_no_compression() {
        let linear = MixerModel {
            output_p1db_dbm: None,
            ..MixerModel::default()
        };
        let mut rig = Rig::new(linear);
        let plan = FrequencyPlan::new(vec![5.25], vec![18.0], Sideband::Lower).unwrap();
        let setup = P1dbSetup {
            direction: Direction::Receive,
            input_dbm: power_sweep_range(-20.0, 10.0, 1.0, 18.0).unwrap(),
            lo_dbm: 15.0,
        };

        let traces = p1db_sweep(&mut rig.handles(false), &plan, &setup, &PathLosses::default()).unwrap();
        assert_eq!(traces[0].compression, None);
        assert_eq!(traces[0].output_p1db(), None);
    }

    #[test]
    fn waits_after_every_power_step() {
        let mut rig = Rig::new(model());
        let plan = FrequencyPlan::new(vec![5.25], vec![18.0], Sideband::Lower).unwrap();
        let setup = P1dbSetup {
            direction: Direction::Transmit,
            input_dbm: vec![-10.0, -9.0, -8.0],
            lo_dbm: 15.0,
        };
        p1db_sweep(&mut rig.handles(false), &plan, &setup, &PathLosses::default()).unwrap();

        let journal = rig.bench.journal();
        let reads: Vec<usize> = journal
            .iter()
            .enumerate()
            .filter(|(_, e)| e.contains(": read"))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(reads.len(), 3);
        for i in reads {
            assert_eq!(journal[i - 1], "settle PowerStep 1000ms");
            assert!(journal[i - 2].starts_with("mxg1: amplitude"));
        }
    }

    #[test]
    fn empty_power_sweep_is_rejected() {
        let mut rig = Rig::new(model());
        let plan = FrequencyPlan::new(vec![5.25], vec![18.0], Sideband::Lower).unwrap();
        let setup = P1dbSetup {
            direction: Direction::Transmit,
            input_dbm: vec![],
            lo_dbm: 15.0,
        };
        let err = p1db_sweep(&mut rig.handles(false), &plan, &setup, &PathLosses::default()).unwrap_err();
        assert!(matches!(err, SweepError::InvalidArgument(_)));
    }
}
