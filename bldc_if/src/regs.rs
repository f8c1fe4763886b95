//! # Controller Register Map
//!
//! All multi-byte register values are little-endian.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{LittleEndian, WriteBytesExt};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Bus address of one motor controller.
pub type Address = u8;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Encoder zero angle (f32)
pub const ZERO_ANGLE: u16 = 0x1000;

/// Electrical revolutions per mechanical revolution (u8)
pub const EREVS_PER_MREV: u16 = 0x1001;

/// Phase inversion flag (u8, 0 or 1)
pub const INVERT_PHASES: u16 = 0x1002;

/// Motor torque constant (f32)
pub const TORQUE_CONSTANT: u16 = 0x1022;

/// Output position offset (f32)
pub const POSITION_OFFSET: u16 = 0x1050;

/// Control loop rate (u16, Hz)
pub const CONTROL_LOOP_RATE: u16 = 0x1030;

/// Encoder angle compensation scale (f32)
pub const EAC_SCALE: u16 = 0x1100;

/// Encoder angle compensation offset (f32)
pub const EAC_OFFSET: u16 = 0x1101;

/// First register of the encoder angle compensation table (i8 per register)
pub const EAC_TABLE_BASE: u16 = 0x1200;

/// Number of table entries written per register write.
pub const EAC_CHUNK_LEN: usize = 64;

/// Control mode selection (u8, see [`ControlMode`])
pub const CONTROL_MODE: u16 = 0x2000;

/// Torque command setpoint (f32)
pub const TORQUE_COMMAND: u16 = 0x2006;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Values of the [`CONTROL_MODE`] register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlMode {
    /// Direct Id/Iq current control
    Current = 1,

    /// Torque control, setpoints written to [`TORQUE_COMMAND`]
    Torque = 2,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One register write: `count` consecutive registers starting at `register` on the controller at
/// `address`, filled from `payload`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterWrite {
    pub address: Address,
    pub register: u16,
    pub count: u8,
    pub payload: Vec<u8>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RegisterWrite {
    /// Write a single f32 register.
    pub fn f32(address: Address, register: u16, value: f32) -> Self {
        let mut payload = Vec::with_capacity(4);
        // Writing into a Vec cannot fail
        payload.write_f32::<LittleEndian>(value).ok();

        Self { address, register, count: 1, payload }
    }

    /// Write a single u16 register.
    pub fn u16(address: Address, register: u16, value: u16) -> Self {
        let mut payload = Vec::with_capacity(2);
        payload.write_u16::<LittleEndian>(value).ok();

        Self { address, register, count: 1, payload }
    }

    /// Write a single u8 register.
    pub fn u8(address: Address, register: u16, value: u8) -> Self {
        Self { address, register, count: 1, payload: vec![value] }
    }

    /// Write a run of i8 registers, one table entry per register.
    ///
    /// `values` must not be longer than 255 entries.
    pub fn i8_table(address: Address, register: u16, values: &[i8]) -> Self {
        Self {
            address,
            register,
            count: values.len() as u8,
            payload: values.iter().map(|v| *v as u8).collect(),
        }
    }

    /// Select a control mode.
    pub fn control_mode(address: Address, mode: ControlMode) -> Self {
        Self::u8(address, CONTROL_MODE, mode as u8)
    }

    /// Command a torque setpoint.
    pub fn torque_command(address: Address, value: f32) -> Self {
        Self::f32(address, TORQUE_COMMAND, value)
    }

    /// Interpret the payload as a single little-endian f32, if it is one.
    pub fn as_f32(&self) -> Option<f32> {
        if self.count != 1 || self.payload.len() != 4 {
            return None;
        }

        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.payload);
        Some(f32::from_le_bytes(bytes))
    }
}
