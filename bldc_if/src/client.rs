//! # Serial Register Client
//!
//! [`RegisterTransport`] over a serial link: every request is answered by exactly one response
//! frame before the next request is sent, except for bootloader exit which the controller does
//! not acknowledge.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use serialport::SerialPort;
use std::io::ErrorKind;
use std::time::Duration;

use crate::{
    calibration::CalibrationProfile,
    link::{self, SerialLink},
    packet::{Request, Response},
    regs::{Address, RegisterWrite},
    transport::{ProtocolError, RegisterTransport, TransportError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Register client talking to every controller on one serial bus.
pub struct SerialRegisterClient<L> {
    link: L,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SerialRegisterClient<Box<dyn SerialPort>> {
    /// Open the controller bus.
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self::new(link::open_port(path, baud_rate, timeout)?))
    }
}

impl<L: SerialLink> SerialRegisterClient<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    /// Release the underlying link.
    pub fn into_inner(self) -> L {
        self.link
    }

    /// Send a request and wait for its response body.
    fn transact(&mut self, request: Request) -> Result<Vec<u8>, TransportError> {
        request.send_to(&mut self.link)?;

        let response = match Response::read_from(&mut self.link) {
            Ok(r) => r,
            // Nothing (or only part of a frame) arrived within the link timeout
            Err(TransportError::Io(e))
                if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::UnexpectedEof) =>
            {
                return Err(ProtocolError::NoResponse(request.address).into())
            }
            Err(e) => return Err(e),
        };

        Ok(response.check(&request)?)
    }
}

impl<L: SerialLink> RegisterTransport for SerialRegisterClient<L> {
    fn write_registers(&mut self, writes: &[RegisterWrite]) -> Result<(), TransportError> {
        for w in writes {
            self.transact(Request::write_registers(w))?;
        }
        Ok(())
    }

    fn read_registers(
        &mut self,
        address: Address,
        register: u16,
        count: u8,
    ) -> Result<Vec<u8>, TransportError> {
        self.transact(Request::read_registers(address, register, count))
    }

    fn read_calibration(&mut self, address: Address) -> Result<CalibrationProfile, TransportError> {
        let body = self.transact(Request::read_calibration(address))?;
        trace!("Controller {} stored calibration is {} bytes", address, body.len());

        Ok(CalibrationProfile::from_json(&body)?)
    }

    fn leave_bootloader(&mut self, address: Address) -> Result<(), TransportError> {
        trace!("Sending bootloader exit to controller {}", address);
        Request::leave_bootloader(address).send_to(&mut self.link)?;
        Ok(())
    }

    fn reset_input_buffer(&mut self) -> Result<(), TransportError> {
        self.link.clear_input()?;
        Ok(())
    }
}
