use tracing::{debug, info};

use super::{ghz_to_hz, Bench, Direction};
use crate::error::{Result, SweepError};
use crate::frequency::{FrequencyPlan, FrequencyPoint};
use crate::instrument::SettleReason;
use crate::loss::PathLosses;
use crate::metrics::conversion_gain;

/// Drive levels for a conversion-gain sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversionSetup {
    pub direction: Direction,
    pub input_dbm: f64,   // at the device stimulus port
    pub lo_dbm: Vec<f64>, // at the device LO port, swept
}

/// One conversion-gain reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConversionRow {
    pub point: FrequencyPoint,
    pub input_dbm: f64,
    pub lo_dbm: f64,
    pub raw_dbm: f64,    // as read by the analyzer
    pub output_dbm: f64, // referred to the device output port
    pub gain_db: f64,
}

/// Measures conversion gain at every IF, LO drive and RF combination.
///
/// Loop order is IF, then LO drive, then RF. The stimulus amplitude is
/// raised by its path loss so the device sees `input_dbm`; the reading is
/// raised by the measured-port loss before the gain is taken.
pub fn conversion_gain_sweep(
    bench: &mut Bench<'_>,
    plan: &FrequencyPlan,
    setup: &ConversionSetup,
    losses: &PathLosses,
) -> Result<Vec<ConversionRow>> {
    let direction = setup.direction;
    if setup.lo_dbm.is_empty() {
        return Err(SweepError::invalid("conversion sweep needs at least one LO drive level"));
    }
    direction.check_losses(plan, losses, false)?;

    info!(
        %direction,
        points = plan.points().len(),
        lo_levels = setup.lo_dbm.len(),
        "starting conversion gain sweep"
    );

    bench.stimulus.turn_on()?;
    bench.lo.turn_on()?;

    let mut rows = Vec::with_capacity(plan.points().len() * setup.lo_dbm.len());
    for if_index in 0..plan.if_ghz().len() {
        for &lo_dbm in &setup.lo_dbm {
            bench.set_lo_amplitude(lo_dbm + losses.lo)?;

            for rf_index in 0..plan.rf_ghz().len() {
                let point = *plan.point(if_index, rf_index);
                let stimulus_loss = losses.stimulus.at(direction.stimulus_index(&point))?;
                let measured_loss = losses.measured.at(direction.measured_index(&point))?;
                let measured_hz = ghz_to_hz(direction.measured_ghz(&point));

                bench.tune_stimulus(
                    ghz_to_hz(direction.stimulus_ghz(&point)),
                    setup.input_dbm + stimulus_loss,
                )?;
                bench.tune_lo(&point, plan.lo_multiplier(), SettleReason::Frequency)?;
                bench.center_analyzer(measured_hz)?;
                let raw_dbm = bench.measure_at(measured_hz)?;

                let row = ConversionRow {
                    point,
                    input_dbm: setup.input_dbm,
                    lo_dbm,
                    raw_dbm,
                    output_dbm: raw_dbm + measured_loss,
                    gain_db: conversion_gain(raw_dbm, measured_loss, setup.input_dbm),
                };
                debug!(%point, lo_dbm, raw_dbm, gain_db = row.gain_db, "conversion sample");
                rows.push(row);
            }
        }
    }

    bench.stimulus.turn_off()?;
    bench.lo.turn_off()?;

    info!(%direction, samples = rows.len(), "conversion gain sweep complete");
    Ok(rows)
}
