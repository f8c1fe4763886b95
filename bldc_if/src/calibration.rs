//! # Motor Calibration Profile
//!
//! Each controller stores the calibration measured for its motor as a JSON object. The profile is
//! read once at startup and written back into the controller's working registers.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum number of entries in an encoder angle compensation table.
pub const EAC_TABLE_MAX_LEN: usize = 257;

/// The only encoder angle compensation table type the controller accepts.
const EAC_TYPE_INT8: &str = "int8";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Calibration of one motor, as stored on its controller.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "StoredCalibration", into = "StoredCalibration")]
pub struct CalibrationProfile {
    /// Encoder angle at electrical zero.
    pub zero_angle: f32,

    /// Whether the motor phases are wired inverted.
    pub invert_phases: bool,

    /// Electrical revolutions per mechanical revolution (pole pairs).
    pub erevs_per_mrev: u8,

    /// Torque constant.
    ///
    /// Units: N.m/A
    pub torque_constant: f32,

    /// Offset between the encoder zero and the output zero.
    ///
    /// Units: radians
    pub position_offset: f32,

    /// Optional encoder angle compensation, `None` if the motor was not characterised for it.
    pub encoder_compensation: Option<EncoderCompensation>,
}

/// Encoder angle compensation lookup: `correction = table[i] * scale + offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderCompensation {
    pub scale: f32,
    pub offset: f32,
    pub table: Vec<i8>,
}

/// The on-controller JSON layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct StoredCalibration {
    angle: f32,
    inv: u8,
    epm: u8,
    torque: f32,
    zero: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    eac_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    eac_scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    eac_offset: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    eac_table: Option<Vec<i8>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("Cannot parse the stored calibration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Encoder angle compensation table has {0} entries, at most {max} are supported", max = EAC_TABLE_MAX_LEN)]
    EacTableTooLong(usize),

    #[error("Encoder angle compensation of type int8 is missing its `{0}` field")]
    EacFieldMissing(&'static str),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CalibrationProfile {
    /// Parse a profile from the controller's stored JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CalibrationError> {
        let stored: StoredCalibration = serde_json::from_slice(bytes)?;
        Self::try_from(stored)
    }

    /// Serialise the profile into the controller's stored JSON layout.
    pub fn to_json(&self) -> Result<Vec<u8>, CalibrationError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl TryFrom<StoredCalibration> for CalibrationProfile {
    type Error = CalibrationError;

    fn try_from(s: StoredCalibration) -> Result<Self, Self::Error> {
        // Only int8 tables can be loaded into the controller, anything else is left out
        let encoder_compensation = match s.eac_type.as_deref() {
            Some(EAC_TYPE_INT8) => {
                let table = s.eac_table
                    .ok_or(CalibrationError::EacFieldMissing("eac_table"))?;
                if table.len() > EAC_TABLE_MAX_LEN {
                    return Err(CalibrationError::EacTableTooLong(table.len()));
                }

                Some(EncoderCompensation {
                    scale: s.eac_scale.ok_or(CalibrationError::EacFieldMissing("eac_scale"))?,
                    offset: s.eac_offset.ok_or(CalibrationError::EacFieldMissing("eac_offset"))?,
                    table,
                })
            },
            Some(other) => {
                log::debug!("Ignoring encoder angle compensation of type {:?}", other);
                None
            },
            None => None,
        };

        Ok(Self {
            zero_angle: s.angle,
            invert_phases: s.inv != 0,
            erevs_per_mrev: s.epm,
            torque_constant: s.torque,
            position_offset: s.zero,
            encoder_compensation,
        })
    }
}

impl From<CalibrationProfile> for StoredCalibration {
    fn from(p: CalibrationProfile) -> Self {
        let (eac_type, eac_scale, eac_offset, eac_table) = match p.encoder_compensation {
            Some(eac) => (
                Some(EAC_TYPE_INT8.to_string()),
                Some(eac.scale),
                Some(eac.offset),
                Some(eac.table),
            ),
            None => (None, None, None, None),
        };

        Self {
            angle: p.zero_angle,
            inv: p.invert_phases as u8,
            epm: p.erevs_per_mrev,
            torque: p.torque_constant,
            zero: p.position_offset,
            eac_type,
            eac_scale,
            eac_offset,
            eac_table,
        }
    }
}
