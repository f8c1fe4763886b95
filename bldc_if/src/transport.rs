//! # Register Transport
//!
//! The request/response interface to the motor controllers. Implementations own the link to the
//! controllers, so there is exactly one writer per bus.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::{
    calibration::{CalibrationError, CalibrationProfile},
    regs::{Address, RegisterWrite},
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Unified API for talking to the controllers on one bus.
pub trait RegisterTransport {
    /// Perform the given register writes in order, stopping at the first failure.
    fn write_registers(&mut self, writes: &[RegisterWrite]) -> Result<(), TransportError>;

    /// Read `count` consecutive registers starting at `register`.
    fn read_registers(
        &mut self,
        address: Address,
        register: u16,
        count: u8,
    ) -> Result<Vec<u8>, TransportError>;

    /// Read the calibration persisted on the controller.
    fn read_calibration(&mut self, address: Address) -> Result<CalibrationProfile, TransportError>;

    /// Tell the controller to jump from its bootloader into the firmware.
    fn leave_bootloader(&mut self, address: Address) -> Result<(), TransportError>;

    /// Discard any bytes already received but not yet read.
    fn reset_input_buffer(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Perform a single register write.
    fn write_register(&mut self, write: RegisterWrite) -> Result<(), TransportError> {
        self.write_registers(std::slice::from_ref(&write))
    }
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised by a [`RegisterTransport`].
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("I/O error on the controller link: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot open the controller link: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Invalid calibration stored on the controller: {0}")]
    Calibration(#[from] CalibrationError),
}

/// Errors in the request/response exchange with a controller.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("Controller {address} does not support register {register:#06x}")]
    Unsupported { address: Address, register: u16 },

    #[error("Checksum mismatch (expected {expected:#06x}, got {actual:#06x})")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Controller {0} did not respond")]
    NoResponse(Address),

    #[error("Expected a response from controller {expected}, got one from {actual}")]
    AddressMismatch { expected: Address, actual: Address },

    #[error("Controller {address} rejected the request (status {status:#04x})")]
    Rejected { address: Address, status: u8 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TransportError {
    /// True if the controller reported that it does not implement the requested feature, which
    /// is the case for older firmware.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, TransportError::Protocol(ProtocolError::Unsupported { .. }))
    }
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for Box<T> {
    fn write_registers(&mut self, writes: &[RegisterWrite]) -> Result<(), TransportError> {
        (**self).write_registers(writes)
    }

    fn read_registers(
        &mut self,
        address: Address,
        register: u16,
        count: u8,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).read_registers(address, register, count)
    }

    fn read_calibration(&mut self, address: Address) -> Result<CalibrationProfile, TransportError> {
        (**self).read_calibration(address)
    }

    fn leave_bootloader(&mut self, address: Address) -> Result<(), TransportError> {
        (**self).leave_bootloader(address)
    }

    fn reset_input_buffer(&mut self) -> Result<(), TransportError> {
        (**self).reset_input_buffer()
    }
}
