use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::cli::Command;
use crate::error::{Result, SweepError};
use crate::frequency::{FrequencyPlan, Sideband};
use crate::instrument::{AnalyzerSetup, SettleTimes};
use crate::loss::{LossCorrection, PathLosses};
use crate::power::power_sweep_range;
use crate::simulation::MixerModel;
use crate::sweep::{ConversionSetup, Direction, Oip3Setup, P1dbSetup};

/// Everything needed to run one characterization session.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TestPlan {
    pub device: String,
    #[serde(default)]
    pub notes: String,
    /// Report file stem, written next to the plan
    pub report: String,
    pub sideband: Sideband,
    #[serde(default = "unity")]
    pub lo_multiplier: f64,
    pub frequencies: Frequencies,
    pub power: PowerLevels,
    #[serde(default)]
    pub p1db: CompressionSweep,
    #[serde(default)]
    pub oip3: TwoTone,
    #[serde(default)]
    pub losses: Losses,
    #[serde(default)]
    pub analyzer: AnalyzerSetup,
    #[serde(default)]
    pub settle: SettleTimes,
    #[serde(default)]
    pub simulation: MixerModel,
}

fn unity() -> f64 {
    1.0
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Frequencies {
    pub if_ghz: Vec<f64>,
    pub rf_ghz: Vec<f64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PowerLevels {
    /// LO drive levels swept by the conversion tests
    pub lo_dbm: Vec<f64>,
    #[serde(default)]
    pub upconvert_if_dbm: f64,
    #[serde(default)]
    pub downconvert_rf_dbm: f64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CompressionSweep {
    pub tx_start_dbm: f64,
    pub rx_start_dbm: f64,
    pub span_db: f64,
    pub step_db: f64,
    pub tx_max_dbm: f64,
    pub rx_max_dbm: f64,
    pub lo_dbm: f64,
}

impl Default for CompressionSweep {
    fn default() -> Self {
        Self {
            tx_start_dbm: -15.0,
            rx_start_dbm: -20.0,
            span_db: 30.0,
            step_db: 1.0,
            tx_max_dbm: 18.0,
            rx_max_dbm: 18.0,
            lo_dbm: 15.0,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TwoTone {
    pub tone_separation_mhz: Vec<f64>,
    pub lo_dbm: f64,
}

impl Default for TwoTone {
    fn default() -> Self {
        Self {
            tone_separation_mhz: vec![20.0, 80.0, 160.0, 200.0],
            lo_dbm: 15.0,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Losses {
    pub cable: CableLosses,
    pub pcb: PcbLosses,
    pub two_tone: TwoToneLosses,
}

/// Cables used by the conversion-gain tests.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CableLosses {
    pub if_db: LossCorrection, // per IF point
    pub lo_db: f64,
    pub rf_db: LossCorrection, // per RF point
}

/// Evaluation board traces between the connectors and the device.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct PcbLosses {
    pub if_upconvert_db: f64,
    pub if_downconvert_db: f64,
    pub lo_db: f64,
    pub rf_db: f64,
}

/// Combiner paths and output cables of the two-tone setup, also used for
/// the compression tests.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TwoToneLosses {
    pub path1_if_db: LossCorrection,
    pub path2_if_db: LossCorrection,
    pub path1_rf_db: LossCorrection,
    pub path2_rf_db: LossCorrection,
    pub output_if_db: LossCorrection,
    pub output_rf_db: LossCorrection,
}

impl Default for TwoToneLosses {
    fn default() -> Self {
        Self {
            path1_if_db: 0.7.into(),
            path2_if_db: 0.7.into(),
            path1_rf_db: 0.7.into(),
            path2_rf_db: 0.7.into(),
            output_if_db: 1.0.into(),
            output_rf_db: 1.0.into(),
        }
    }
}

pub fn load_plan(path: impl AsRef<Path>) -> Result<TestPlan> {
    let path = path.as_ref();
    info!(path = %path.display(), "loading test plan");
    let content = fs::read_to_string(path)?;
    let plan: TestPlan = toml::from_str(&content)?;
    debug!(?plan, "test plan");
    Ok(plan)
}

impl TestPlan {
    pub fn frequency_plan(&self) -> Result<FrequencyPlan> {
        FrequencyPlan::new(
            self.frequencies.if_ghz.clone(),
            self.frequencies.rf_ghz.clone(),
            self.sideband,
        )?
        .with_lo_multiplier(self.lo_multiplier)
    }

    /// Path losses for the cabling each test uses.
    ///
    /// Conversion tests use the plain cables. Compression tests reuse the
    /// first combiner path and the output cable of the two-tone setup; the
    /// two-tone tests add the board traces on top.
    pub fn path_losses(&self, command: Command) -> PathLosses {
        let cable = &self.losses.cable;
        let pcb = &self.losses.pcb;
        let two_tone = &self.losses.two_tone;
        match command {
            Command::Upconvert => PathLosses {
                stimulus: cable.if_db.clone(),
                stimulus_second: LossCorrection::default(),
                lo: cable.lo_db,
                measured: cable.rf_db.clone(),
            },
            Command::Downconvert => PathLosses {
                stimulus: cable.rf_db.clone(),
                stimulus_second: LossCorrection::default(),
                lo: cable.lo_db,
                measured: cable.if_db.clone(),
            },
            Command::TxP1db => PathLosses {
                stimulus: two_tone.path1_if_db.clone(),
                stimulus_second: LossCorrection::default(),
                lo: cable.lo_db,
                measured: two_tone.output_rf_db.clone(),
            },
            Command::RxP1db => PathLosses {
                stimulus: two_tone.path1_rf_db.clone(),
                stimulus_second: LossCorrection::default(),
                lo: cable.lo_db,
                measured: two_tone.output_if_db.clone(),
            },
            Command::TxOip3 => PathLosses {
                stimulus: two_tone.path1_if_db.offset(pcb.if_upconvert_db),
                stimulus_second: two_tone.path2_if_db.offset(pcb.if_upconvert_db),
                lo: cable.lo_db + pcb.lo_db,
                measured: two_tone.output_rf_db.offset(pcb.rf_db),
            },
            Command::RxOip3 => PathLosses {
                stimulus: two_tone.path1_rf_db.offset(pcb.rf_db),
                stimulus_second: two_tone.path2_rf_db.offset(pcb.rf_db),
                lo: cable.lo_db + pcb.lo_db,
                measured: two_tone.output_if_db.offset(pcb.if_downconvert_db),
            },
        }
    }

    fn stimulus_dbm(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Transmit => self.power.upconvert_if_dbm,
            Direction::Receive => self.power.downconvert_rf_dbm,
        }
    }

    pub fn conversion_setup(&self, direction: Direction) -> ConversionSetup {
        ConversionSetup {
            direction,
            input_dbm: self.stimulus_dbm(direction),
            lo_dbm: self.power.lo_dbm.clone(),
        }
    }

    pub fn p1db_setup(&self, direction: Direction) -> Result<P1dbSetup> {
        let sweep = &self.p1db;
        let (start, max) = match direction {
            Direction::Transmit => (sweep.tx_start_dbm, sweep.tx_max_dbm),
            Direction::Receive => (sweep.rx_start_dbm, sweep.rx_max_dbm),
        };
        let input_dbm = power_sweep_range(start, start + sweep.span_db, sweep.step_db, max)?;
        if input_dbm.is_empty() {
            return Err(SweepError::Config(format!(
                "{} compression sweep from {} dBm is empty below the {} dBm limit",
                direction, start, max
            )));
        }
        Ok(P1dbSetup {
            direction,
            input_dbm,
            lo_dbm: sweep.lo_dbm,
        })
    }

    pub fn oip3_setup(&self, direction: Direction) -> Oip3Setup {
        Oip3Setup {
            direction,
            input_dbm: self.stimulus_dbm(direction),
            lo_dbm: self.oip3.lo_dbm,
            tone_separation_mhz: self.oip3.tone_separation_mhz.clone(),
        }
    }
}
