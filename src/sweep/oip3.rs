use tracing::{debug, info};

use super::{ghz_to_hz, Bench, Direction};
use crate::error::{Result, SweepError};
use crate::frequency::{FrequencyPlan, FrequencyPoint, HZ_PER_MHZ};
use crate::instrument::SettleReason;
use crate::loss::PathLosses;
use crate::metrics::{Oip3Result, TwoToneReading};

/// Analyzer span as a multiple of the tone separation.
const SPAN_PER_SEPARATION: f64 = 6.0;

/// Drive levels for a two-tone intercept sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct Oip3Setup {
    pub direction: Direction,
    pub input_dbm: f64, // per tone, at the device input
    pub lo_dbm: f64,
    pub tone_separation_mhz: Vec<f64>,
}

/// One two-tone measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Oip3Row {
    pub point: FrequencyPoint,
    pub tone_separation_mhz: f64,
    pub input_dbm: f64,
    pub raw: TwoToneReading,
    pub output_loss_db: f64,
    pub result: Oip3Result,
}

impl Oip3Row {
    pub fn compensated(&self) -> TwoToneReading {
        self.raw.compensated(self.output_loss_db)
    }
}

// Marker offsets from the measured frequency, in tone separations: lower
// IM3, lower tone, upper tone, upper IM3.
const MARKER_OFFSETS: [f64; 4] = [-1.5, -0.5, 0.5, 1.5];

/// Measures the output third-order intercept at every IF, tone separation and
/// RF combination.
///
/// Both stimulus tones sit half a separation either side of the stimulus
/// frequency. The third-order products then land one and a half separations
/// either side of the measured frequency.
pub fn oip3_sweep(
    bench: &mut Bench<'_>,
    plan: &FrequencyPlan,
    setup: &Oip3Setup,
    losses: &PathLosses,
) -> Result<Vec<Oip3Row>> {
    let direction = setup.direction;
    if setup.tone_separation_mhz.is_empty() {
        return Err(SweepError::invalid("two-tone sweep needs at least one tone separation"));
    }
    if let Some(bad) = setup
        .tone_separation_mhz
        .iter()
        .find(|sep| !sep.is_finite() || **sep <= 0.0)
    {
        return Err(SweepError::invalid(format!(
            "tone separation must be positive, got {} MHz",
            bad
        )));
    }
    direction.check_losses(plan, losses, true)?;
    bench.second_tone()?;

    info!(
        %direction,
        points = plan.points().len(),
        separations = setup.tone_separation_mhz.len(),
        "starting OIP3 sweep"
    );

    let first_point = plan.points()[0];
    let first_index = direction.stimulus_index(&first_point);
    bench
        .stimulus
        .set_amplitude(setup.input_dbm + losses.stimulus.at(first_index)?)?;
    bench.settler.wait(SettleReason::Amplitude);
    bench
        .second_tone()?
        .set_amplitude(setup.input_dbm + losses.stimulus_second.at(first_index)?)?;
    bench.settler.wait(SettleReason::Amplitude);
    bench.set_lo_amplitude(setup.lo_dbm + losses.lo)?;

    bench.stimulus.turn_on()?;
    bench.second_tone()?.turn_on()?;
    bench.lo.turn_on()?;

    let mut rows = Vec::with_capacity(plan.points().len() * setup.tone_separation_mhz.len());
    for if_index in 0..plan.if_ghz().len() {
        for &separation_mhz in &setup.tone_separation_mhz {
            let separation_hz = separation_mhz * HZ_PER_MHZ;
            bench.analyzer.set_span(SPAN_PER_SEPARATION * separation_hz)?;
            bench.settler.wait(SettleReason::Frequency);

            for rf_index in 0..plan.rf_ghz().len() {
                let point = *plan.point(if_index, rf_index);
                let stimulus_index = direction.stimulus_index(&point);
                let output_loss_db = losses.measured.at(direction.measured_index(&point))?;
                let stimulus_hz = ghz_to_hz(direction.stimulus_ghz(&point));
                let measured_hz = ghz_to_hz(direction.measured_ghz(&point));

                bench
                    .stimulus
                    .set_amplitude(setup.input_dbm + losses.stimulus.at(stimulus_index)?)?;
                bench.stimulus.set_frequency(stimulus_hz - separation_hz / 2.0)?;
                bench.settler.wait(SettleReason::Frequency);
                let second_dbm = setup.input_dbm + losses.stimulus_second.at(stimulus_index)?;
                let second = bench.second_tone()?;
                second.set_amplitude(second_dbm)?;
                second.set_frequency(stimulus_hz + separation_hz / 2.0)?;
                bench.settler.wait(SettleReason::Frequency);

                bench.tune_lo(&point, plan.lo_multiplier(), SettleReason::LoLock)?;
                bench.center_analyzer(measured_hz)?;
                bench.settler.wait(SettleReason::AnalyzerSweep);

                let mut readings = [0.0; 4];
                for (reading, offset) in readings.iter_mut().zip(MARKER_OFFSETS) {
                    *reading = bench.measure_at(measured_hz + offset * separation_hz)?;
                }
                let [im_low, tone_low, tone_high, im_high] = readings;
                let raw = TwoToneReading {
                    im_low,
                    tone_low,
                    tone_high,
                    im_high,
                };
                let result = raw.intercept(output_loss_db, setup.input_dbm);
                debug!(
                    %point,
                    separation_mhz,
                    oip3_dbm = result.average_oip3,
                    "two-tone sample"
                );

                rows.push(Oip3Row {
                    point,
                    tone_separation_mhz: separation_mhz,
                    input_dbm: setup.input_dbm,
                    raw,
                    output_loss_db,
                    result,
                });
            }
        }
    }

    bench.stimulus.turn_off()?;
    bench.second_tone()?.turn_off()?;
    bench.lo.turn_off()?;

    info!(%direction, samples = rows.len(), "OIP3 sweep complete");
    Ok(rows)
}
