//! Conversion gain, compression point and two-tone intercept sweeps for
//! frequency-converting devices (mixers, up/down converters).
//!
//! Instruments are driven through the [`instrument`] traits; the
//! [`simulation`] module provides a bench that needs no hardware.

pub mod cli;
pub mod compression;
pub mod config;
pub mod error;
pub mod frequency;
pub mod instrument;
pub mod loss;
pub mod metrics;
pub mod power;
pub mod report;
pub mod simulation;
pub mod sweep;

pub use compression::{find_p1db, CompressionPoint};
pub use config::{load_plan, TestPlan};
pub use error::{Result, SweepError};
pub use frequency::{FrequencyPlan, FrequencyPoint, Sideband};
pub use loss::{LossCorrection, PathLosses};
pub use power::power_sweep_range;
pub use sweep::Direction;
