//! A simulated bench: signal generators and a spectrum analyzer wired to a
//! mixer model, so sweeps can run without hardware.
//!
//! All handles share one bench state. The analyzer computes what it would
//! see at a marker from the generators that are on: each stimulus tone mixes
//! with the LO into `|f - LO|` and `f + LO`, compresses hard above the output
//! P1dB, and two tones add third-order products at `2f1 - f2` and `2f2 - f1`.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::error::{Result, SweepError};
use crate::instrument::{Settle, SettleReason, SignalAnalyzer, SignalGenerator};

const MARKER_COUNT: u8 = 4;
const MAX_GENERATOR_DBM: f64 = 25.0;
const PRESET_CENTER_HZ: f64 = 13.25e9;
const PRESET_SPAN_HZ: f64 = 26.5e9;
const PRESET_RBW_HZ: f64 = 1.0e6;

/// Behaviour of the simulated device under test and its cabling.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct MixerModel {
    pub conversion_gain_db: f64,
    pub output_p1db_dbm: Option<f64>,
    pub output_ip3_dbm: Option<f64>,
    pub lo_multiplier: f64,
    pub input_loss_db: f64,  // every stimulus cable
    pub output_loss_db: f64, // device output to analyzer
    pub noise_floor_dbm: f64,
    pub jitter_db: f64,
    pub seed: u64,
}

impl Default for MixerModel {
    fn default() -> Self {
        Self {
            conversion_gain_db: -8.0,
            output_p1db_dbm: Some(10.0),
            output_ip3_dbm: Some(20.0),
            lo_multiplier: 1.0,
            input_loss_db: 0.0,
            output_loss_db: 0.0,
            noise_floor_dbm: -100.0,
            jitter_db: 0.0,
            seed: 0,
        }
    }
}

impl MixerModel {
    /// Output power of one tone, clamped one dB above the output P1dB.
    pub fn output_power(&self, input_dbm: f64) -> f64 {
        let linear = input_dbm + self.conversion_gain_db;
        match self.output_p1db_dbm {
            Some(op1db) if linear > op1db + 1.0 => op1db + 1.0,
            _ => linear,
        }
    }
}

#[derive(Clone, Debug)]
struct GeneratorState {
    is_lo: bool,
    frequency_hz: f64,
    amplitude_dbm: f64,
    on: bool,
}

#[derive(Clone, Debug)]
struct AnalyzerState {
    center_hz: f64,
    span_hz: f64,
    rbw_hz: f64,
    markers: [(bool, f64); MARKER_COUNT as usize],
}

impl AnalyzerState {
    fn preset() -> AnalyzerState {
        AnalyzerState {
            center_hz: PRESET_CENTER_HZ,
            span_hz: PRESET_SPAN_HZ,
            rbw_hz: PRESET_RBW_HZ,
            markers: [(false, PRESET_CENTER_HZ); MARKER_COUNT as usize],
        }
    }
}

struct BenchState {
    model: MixerModel,
    generators: Vec<GeneratorState>,
    analyzer: AnalyzerState,
    journal: Vec<String>,
    rng: StdRng,
    reads: usize,
    fail_on_read: Option<usize>,
}

impl BenchState {
    fn log(&mut self, entry: String) {
        self.journal.push(entry);
    }

    // (frequency, power at the device output) of every product present
    fn output_products(&self) -> Vec<(f64, f64)> {
        let lo_hz = self
            .generators
            .iter()
            .find(|g| g.is_lo && g.on)
            .map(|g| g.frequency_hz * self.model.lo_multiplier);
        let Some(lo_hz) = lo_hz else {
            return Vec::new();
        };

        // (input frequency, output power) before conversion
        let tones: Vec<(f64, f64)> = self
            .generators
            .iter()
            .filter(|g| !g.is_lo && g.on)
            .map(|g| {
                let input_dbm = g.amplitude_dbm - self.model.input_loss_db;
                (g.frequency_hz, self.model.output_power(input_dbm))
            })
            .collect();

        let mut baseband = tones.clone();
        if let ([(f1, p1), (f2, p2)], Some(oip3)) = (tones.as_slice(), self.model.output_ip3_dbm) {
            baseband.push((2.0 * f1 - f2, 2.0 * p1 + p2 - 2.0 * oip3));
            baseband.push((2.0 * f2 - f1, 2.0 * p2 + p1 - 2.0 * oip3));
        }

        let mut products = Vec::with_capacity(baseband.len() * 2);
        for (frequency_hz, power_dbm) in baseband {
            if frequency_hz <= 0.0 {
                continue;
            }
            products.push(((frequency_hz - lo_hz).abs(), power_dbm));
            products.push((frequency_hz + lo_hz, power_dbm));
        }
        products
    }

    fn power_at(&self, marker_hz: f64) -> f64 {
        let analyzer = &self.analyzer;
        if (marker_hz - analyzer.center_hz).abs() > analyzer.span_hz / 2.0 {
            return self.model.noise_floor_dbm;
        }

        let window_hz = (analyzer.rbw_hz / 2.0).max(1.0);
        let in_window: Vec<f64> = self
            .output_products()
            .into_iter()
            .filter(|(frequency_hz, _)| (frequency_hz - marker_hz).abs() <= window_hz)
            .map(|(_, power_dbm)| power_dbm)
            .collect();

        let at_device = match in_window.as_slice() {
            [] => return self.model.noise_floor_dbm,
            [single] => *single,
            many => {
                let total_mw: f64 = many
                    .iter()
                    .map(|p| rfconversions::power::db_to_linear(*p))
                    .sum();
                rfconversions::power::watts_to_dbm(total_mw / 1000.0)
            }
        };
        (at_device - self.model.output_loss_db).max(self.model.noise_floor_dbm)
    }
}

/// Owner of the shared bench state; hands out instrument handles.
#[derive(Clone)]
pub struct SimulatedBench {
    state: Rc<RefCell<BenchState>>,
}

impl SimulatedBench {
    pub fn new(model: MixerModel) -> SimulatedBench {
        let rng = StdRng::seed_from_u64(model.seed);
        SimulatedBench {
            state: Rc::new(RefCell::new(BenchState {
                model,
                generators: Vec::new(),
                analyzer: AnalyzerState::preset(),
                journal: Vec::new(),
                rng,
                reads: 0,
                fail_on_read: None,
            })),
        }
    }

    fn add_generator(&self, name: &str, is_lo: bool) -> SimulatedGenerator {
        let mut state = self.state.borrow_mut();
        state.generators.push(GeneratorState {
            is_lo,
            frequency_hz: 1.0e9,
            amplitude_dbm: -135.0,
            on: false,
        });
        SimulatedGenerator {
            name: name.to_string(),
            slot: state.generators.len() - 1,
            state: Rc::clone(&self.state),
        }
    }

    /// A generator feeding a device input (IF or RF).
    pub fn stimulus_generator(&self, name: &str) -> SimulatedGenerator {
        self.add_generator(name, false)
    }

    /// The generator driving the LO port.
    pub fn lo_generator(&self, name: &str) -> SimulatedGenerator {
        self.add_generator(name, true)
    }

    pub fn analyzer(&self, name: &str) -> SimulatedAnalyzer {
        SimulatedAnalyzer {
            name: name.to_string(),
            state: Rc::clone(&self.state),
        }
    }

    /// A settle barrier that records instead of sleeping.
    pub fn settle(&self) -> JournalSettle {
        JournalSettle {
            state: Rc::clone(&self.state),
        }
    }

    /// Makes the `read`-th marker read (1-based, counted from now) fail.
    pub fn fail_on_read(&self, read: usize) {
        let mut state = self.state.borrow_mut();
        state.fail_on_read = Some(state.reads + read);
    }

    pub fn journal(&self) -> Vec<String> {
        self.state.borrow().journal.clone()
    }

    pub fn reads(&self) -> usize {
        self.state.borrow().reads
    }

    pub fn generators_on(&self) -> usize {
        self.state.borrow().generators.iter().filter(|g| g.on).count()
    }
}

pub struct SimulatedGenerator {
    name: String,
    slot: usize,
    state: Rc<RefCell<BenchState>>,
}

impl SimulatedGenerator {
    fn update(&mut self, entry: String, apply: impl FnOnce(&mut GeneratorState)) {
        let mut state = self.state.borrow_mut();
        apply(&mut state.generators[self.slot]);
        state.log(entry);
    }
}

impl SignalGenerator for SimulatedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_amplitude(&mut self, dbm: f64) -> Result<()> {
        if !dbm.is_finite() || dbm > MAX_GENERATOR_DBM {
            return Err(SweepError::instrument(
                &self.name,
                format!("amplitude {} dBm outside the generator range", dbm),
            ));
        }
        let entry = format!("{}: amplitude {}", self.name, dbm);
        self.update(entry, |g| g.amplitude_dbm = dbm);
        Ok(())
    }

    fn set_frequency(&mut self, hz: f64) -> Result<()> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(SweepError::instrument(
                &self.name,
                format!("frequency {} Hz outside the generator range", hz),
            ));
        }
        let entry = format!("{}: frequency {}", self.name, hz);
        self.update(entry, |g| g.frequency_hz = hz);
        Ok(())
    }

    fn turn_on(&mut self) -> Result<()> {
        let entry = format!("{}: on", self.name);
        self.update(entry, |g| g.on = true);
        Ok(())
    }

    fn turn_off(&mut self) -> Result<()> {
        let entry = format!("{}: off", self.name);
        self.update(entry, |g| g.on = false);
        Ok(())
    }
}

pub struct SimulatedAnalyzer {
    name: String,
    state: Rc<RefCell<BenchState>>,
}

impl SimulatedAnalyzer {
    fn marker_slot(&self, index: u8) -> Result<usize> {
        if index == 0 || index > MARKER_COUNT {
            return Err(SweepError::instrument(
                &self.name,
                format!("no marker {}", index),
            ));
        }
        Ok((index - 1) as usize)
    }
}

impl SignalAnalyzer for SimulatedAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn preset(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.analyzer = AnalyzerState::preset();
        state.log(format!("{}: preset", self.name));
        Ok(())
    }

    fn set_frequency(&mut self, hz: f64) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.analyzer.center_hz = hz;
        state.log(format!("{}: center {}", self.name, hz));
        Ok(())
    }

    fn set_span(&mut self, hz: f64) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.analyzer.span_hz = hz;
        state.log(format!("{}: span {}", self.name, hz));
        Ok(())
    }

    fn set_resolution_bandwidth(&mut self, hz: f64) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.analyzer.rbw_hz = hz;
        state.log(format!("{}: rbw {}", self.name, hz));
        Ok(())
    }

    fn set_marker(&mut self, index: u8, hz: f64) -> Result<()> {
        let slot = self.marker_slot(index)?;
        let mut state = self.state.borrow_mut();
        state.analyzer.markers[slot].1 = hz;
        state.log(format!("{}: marker {} {}", self.name, index, hz));
        Ok(())
    }

    fn set_marker_state(&mut self, index: u8, on: bool) -> Result<()> {
        let slot = self.marker_slot(index)?;
        let mut state = self.state.borrow_mut();
        state.analyzer.markers[slot].0 = on;
        let label = if on { "on" } else { "off" };
        state.log(format!("{}: marker {} {}", self.name, index, label));
        Ok(())
    }

    fn get_power(&mut self, marker: u8) -> Result<f64> {
        let slot = self.marker_slot(marker)?;
        let mut state = self.state.borrow_mut();

        state.reads += 1;
        if state.fail_on_read == Some(state.reads) {
            return Err(SweepError::instrument(&self.name, "connection lost"));
        }

        let (enabled, marker_hz) = state.analyzer.markers[slot];
        if !enabled {
            return Err(SweepError::instrument(
                &self.name,
                format!("marker {} is off", marker),
            ));
        }

        let mut power = state.power_at(marker_hz);
        let jitter = state.model.jitter_db;
        if jitter > 0.0 {
            power += state.rng.gen_range(-jitter..=jitter);
        }
        state.log(format!("{}: read {} {}", self.name, marker, power));
        Ok(power)
    }
}

/// Records settle barriers in the bench journal without sleeping.
pub struct JournalSettle {
    state: Rc<RefCell<BenchState>>,
}

impl Settle for JournalSettle {
    fn settle(&mut self, reason: SettleReason, duration: Duration) {
        self.state
            .borrow_mut()
            .log(format!("settle {:?} {}ms", reason, duration.as_millis()));
    }
}
