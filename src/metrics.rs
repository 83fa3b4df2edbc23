/// Conversion gain in dB.
///
/// `raw_output_dbm` is the analyzer reading, `loss_db` the output path loss
/// that refers it back to the device port, and `reference_input_dbm` the
/// power delivered to the device input.
pub fn conversion_gain(raw_output_dbm: f64, loss_db: f64, reference_input_dbm: f64) -> f64 {
    raw_output_dbm + loss_db - reference_input_dbm
}

/// Output third-order intercept point of one tone, in dBm.
///
/// IM3 products rise 3 dB per dB of drive while the main tone rises 1 dB,
/// so the intercept sits half the tone-to-IM3 spacing above the tone.
pub fn oip3(main_tone_raw_dbm: f64, im3_raw_dbm: f64, loss_db: f64) -> f64 {
    (main_tone_raw_dbm + loss_db) + (main_tone_raw_dbm - im3_raw_dbm) / 2.0
}

/// Raw marker readings of one two-tone measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TwoToneReading {
    pub im_low: f64,
    pub tone_low: f64,
    pub tone_high: f64,
    pub im_high: f64,
}

/// Intercept and gain figures derived from a [`TwoToneReading`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Oip3Result {
    pub low_oip3: f64,
    pub high_oip3: f64,
    pub average_oip3: f64,
    pub low_tone_gain: f64,
    pub high_tone_gain: f64,
}

impl TwoToneReading {
    pub fn compensated(&self, loss_db: f64) -> TwoToneReading {
        TwoToneReading {
            im_low: self.im_low + loss_db,
            tone_low: self.tone_low + loss_db,
            tone_high: self.tone_high + loss_db,
            im_high: self.im_high + loss_db,
        }
    }

    pub fn intercept(&self, loss_db: f64, input_dbm: f64) -> Oip3Result {
        let low_oip3 = oip3(self.tone_low, self.im_low, loss_db);
        let high_oip3 = oip3(self.tone_high, self.im_high, loss_db);
        Oip3Result {
            low_oip3,
            high_oip3,
            average_oip3: (low_oip3 + high_oip3) / 2.0,
            low_tone_gain: conversion_gain(self.tone_low, loss_db, input_dbm),
            high_tone_gain: conversion_gain(self.tone_high, loss_db, input_dbm),
        }
    }
}
