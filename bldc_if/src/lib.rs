//! # BLDC controller interface crate.
//!
//! Provides the interfaces to the two pieces of bench equipment: the brushless
//! motor controller, driven over a register oriented request/response link, and
//! the strain gauge digitizer, which streams one text line per sample.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Controller register map and register write payloads
pub mod regs;

/// Persisted per-motor calibration
pub mod calibration;

/// Register transport trait and its errors
pub mod transport;

/// Packet framing for the serial register client
pub mod packet;

/// Serial port opening and the byte link abstraction
pub mod link;

/// Register transport over a serial link
pub mod client;

/// Line oriented sensor channel
pub mod sensor;

/// Simulated bench equipment
pub mod sim;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use calibration::{CalibrationError, CalibrationProfile, EncoderCompensation};
pub use client::SerialRegisterClient;
pub use link::SerialLink;
pub use regs::{Address, ControlMode, RegisterWrite};
pub use sensor::{LineChannel, SerialLineChannel};
pub use transport::{ProtocolError, RegisterTransport, TransportError};
