use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::Result;

/// A CW source: IF/RF stimulus or LO drive.
pub trait SignalGenerator {
    fn name(&self) -> &str;
    fn set_amplitude(&mut self, dbm: f64) -> Result<()>;
    fn set_frequency(&mut self, hz: f64) -> Result<()>;
    fn turn_on(&mut self) -> Result<()>;
    fn turn_off(&mut self) -> Result<()>;
}

/// A swept spectrum analyzer read through its markers.
pub trait SignalAnalyzer {
    fn name(&self) -> &str;
    fn preset(&mut self) -> Result<()>;
    fn set_frequency(&mut self, hz: f64) -> Result<()>;
    fn set_span(&mut self, hz: f64) -> Result<()>;
    fn set_resolution_bandwidth(&mut self, hz: f64) -> Result<()>;
    fn set_marker(&mut self, index: u8, hz: f64) -> Result<()>;
    fn set_marker_state(&mut self, index: u8, on: bool) -> Result<()>;
    fn get_power(&mut self, marker: u8) -> Result<f64>;
}

/// The marker every sweep reads.
pub const MEASUREMENT_MARKER: u8 = 1;

/// Analyzer state applied before any test runs.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyzerSetup {
    pub span_hz: f64,
    pub resolution_bandwidth_hz: f64,
}

impl Default for AnalyzerSetup {
    fn default() -> Self {
        Self {
            span_hz: 0.1e9,
            resolution_bandwidth_hz: 1.0e3,
        }
    }
}

pub fn prepare_analyzer<A: SignalAnalyzer + ?Sized>(analyzer: &mut A, setup: &AnalyzerSetup) -> Result<()> {
    debug!(analyzer = analyzer.name(), ?setup, "preparing analyzer");
    analyzer.preset()?;
    analyzer.set_marker_state(MEASUREMENT_MARKER, true)?;
    analyzer.set_span(setup.span_hz)?;
    analyzer.set_resolution_bandwidth(setup.resolution_bandwidth_hz)?;
    Ok(())
}

/// Why a sweep is waiting; each reason has its own settling time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettleReason {
    Frequency,
    Amplitude,
    Marker,
    PowerStep,
    LoLock,
    AnalyzerSweep,
}

/// Hardware settling times, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SettleTimes {
    pub frequency_ms: u64,
    pub amplitude_ms: u64,
    pub marker_ms: u64,
    pub power_step_ms: u64, // after each amplitude step of a compression sweep
    pub lo_lock_ms: u64,    // after retuning the LO for two-tone tests
    pub analyzer_sweep_ms: u64,
}

impl Default for SettleTimes {
    fn default() -> Self {
        Self {
            frequency_ms: 500,
            amplitude_ms: 500,
            marker_ms: 500,
            power_step_ms: 1000,
            lo_lock_ms: 1000,
            analyzer_sweep_ms: 1000,
        }
    }
}

impl SettleTimes {
    /// No waiting at all, for simulated benches.
    pub fn none() -> SettleTimes {
        SettleTimes {
            frequency_ms: 0,
            amplitude_ms: 0,
            marker_ms: 0,
            power_step_ms: 0,
            lo_lock_ms: 0,
            analyzer_sweep_ms: 0,
        }
    }

    pub fn duration(&self, reason: SettleReason) -> Duration {
        let ms = match reason {
            SettleReason::Frequency => self.frequency_ms,
            SettleReason::Amplitude => self.amplitude_ms,
            SettleReason::Marker => self.marker_ms,
            SettleReason::PowerStep => self.power_step_ms,
            SettleReason::LoLock => self.lo_lock_ms,
            SettleReason::AnalyzerSweep => self.analyzer_sweep_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Ordering barrier between an instrument state change and the next read.
pub trait Settle {
    fn settle(&mut self, reason: SettleReason, duration: Duration);
}

/// Blocks the calling thread for the full settling time.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleep;

impl Settle for ThreadSleep {
    fn settle(&mut self, reason: SettleReason, duration: Duration) {
        trace!(?reason, ?duration, "settling");
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Settling times paired with the barrier that enforces them.
pub struct Settler<'a> {
    times: SettleTimes,
    barrier: &'a mut dyn Settle,
}

impl<'a> Settler<'a> {
    pub fn new(times: SettleTimes, barrier: &'a mut dyn Settle) -> Self {
        Self { times, barrier }
    }

    pub fn wait(&mut self, reason: SettleReason) {
        let duration = self.times.duration(reason);
        self.barrier.settle(reason, duration);
    }
}
