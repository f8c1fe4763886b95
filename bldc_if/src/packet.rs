//! Packet framing for the serial register link
//!
//! Request frame:
//!
//! ```text
//! SYNC(0xFF) VERSION(0x02) ADDR FUNC LEN(u16 le) BODY[LEN] SUM(u16 be)
//! ```
//!
//! Response frame:
//!
//! ```text
//! SYNC(0xFF) VERSION(0x02) ADDR FUNC STATUS LEN(u16 le) BODY[LEN] SUM(u16 be)
//! ```
//!
//! `SUM` covers every byte between `VERSION` and `SUM`, exclusive.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::regs::{Address, RegisterWrite};
use crate::transport::{ProtocolError, TransportError};

/// First byte of every frame
pub const SYNC_BYTE: u8 = 0xFF;

/// Protocol version carried in every frame
pub const PROTOCOL_VERSION: u8 = 0x02;

/// Request header length (sync, version, address, function, length)
const REQUEST_HEADER_LEN: usize = 6;

/// Response header length (sync, version, address, function, status, length)
const RESPONSE_HEADER_LEN: usize = 7;

/// Function codes
pub mod function {
    pub const READ_REGISTERS: u8 = 0x00;
    pub const WRITE_REGISTERS: u8 = 0x01;
    pub const READ_CALIBRATION: u8 = 0x10;
    pub const LEAVE_BOOTLOADER: u8 = 0x11;
}

/// Response status codes
pub mod status {
    pub const OK: u8 = 0x00;
    pub const UNSUPPORTED: u8 = 0x01;
}

/// A request to one controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub address: Address,
    pub function: u8,
    pub body: Vec<u8>,
}

/// A controller's response to a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub address: Address,
    pub function: u8,
    pub status: u8,
    pub body: Vec<u8>,
}

impl Request {
    /// Write registers: body is `REG(u16 le) COUNT PAYLOAD`.
    pub fn write_registers(write: &RegisterWrite) -> Self {
        let mut body = Vec::with_capacity(3 + write.payload.len());
        body.write_u16::<LittleEndian>(write.register).ok();
        body.push(write.count);
        body.extend_from_slice(&write.payload);

        Self {
            address: write.address,
            function: function::WRITE_REGISTERS,
            body,
        }
    }

    /// Read registers: body is `REG(u16 le) COUNT`.
    pub fn read_registers(address: Address, register: u16, count: u8) -> Self {
        let mut body = Vec::with_capacity(3);
        body.write_u16::<LittleEndian>(register).ok();
        body.push(count);

        Self {
            address,
            function: function::READ_REGISTERS,
            body,
        }
    }

    pub fn read_calibration(address: Address) -> Self {
        Self {
            address,
            function: function::READ_CALIBRATION,
            body: Vec::new(),
        }
    }

    pub fn leave_bootloader(address: Address) -> Self {
        Self {
            address,
            function: function::LEAVE_BOOTLOADER,
            body: Vec::new(),
        }
    }

    /// The register the request targets, if it has one.
    pub fn register(&self) -> Option<u16> {
        match self.function {
            function::READ_REGISTERS | function::WRITE_REGISTERS if self.body.len() >= 2 => {
                Some(u16::from_le_bytes([self.body[0], self.body[1]]))
            }
            _ => None,
        }
    }

    /// Encode the request into a frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(REQUEST_HEADER_LEN + self.body.len() + 2);
        frame.push(SYNC_BYTE);
        frame.push(PROTOCOL_VERSION);
        frame.push(self.address);
        frame.push(self.function);
        frame.write_u16::<LittleEndian>(self.body.len() as u16).ok();
        frame.extend_from_slice(&self.body);

        let sum = checksum(&frame[2..]);
        frame.extend_from_slice(&sum.to_be_bytes());
        frame
    }

    /// Send the request to any writer (serial port, etc.)
    pub fn send_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.encode())?;
        writer.flush()
    }

    /// Read and validate one request frame.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, TransportError> {
        let mut header = [0u8; REQUEST_HEADER_LEN];
        reader.read_exact(&mut header)?;
        check_preamble(&header)?;

        let len = u16::from_le_bytes([header[4], header[5]]) as usize;
        let body = read_body_and_check(reader, &header, len)?;

        Ok(Self {
            address: header[2],
            function: header[3],
            body,
        })
    }
}

impl Response {
    /// A successful response carrying `body`.
    pub fn ok(address: Address, function: u8, body: Vec<u8>) -> Self {
        Self { address, function, status: status::OK, body }
    }

    /// Encode the response into a frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(RESPONSE_HEADER_LEN + self.body.len() + 2);
        frame.push(SYNC_BYTE);
        frame.push(PROTOCOL_VERSION);
        frame.push(self.address);
        frame.push(self.function);
        frame.push(self.status);
        frame.write_u16::<LittleEndian>(self.body.len() as u16).ok();
        frame.extend_from_slice(&self.body);

        let sum = checksum(&frame[2..]);
        frame.extend_from_slice(&sum.to_be_bytes());
        frame
    }

    /// Read and validate one response frame.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, TransportError> {
        let mut header = [0u8; RESPONSE_HEADER_LEN];
        reader.read_exact(&mut header)?;
        check_preamble(&header)?;

        let len = u16::from_le_bytes([header[5], header[6]]) as usize;
        let body = read_body_and_check(reader, &header, len)?;

        Ok(Self {
            address: header[2],
            function: header[3],
            status: header[4],
            body,
        })
    }

    /// Check the response answers `request` and convert a non-OK status into an error.
    pub fn check(self, request: &Request) -> Result<Vec<u8>, ProtocolError> {
        if self.address != request.address {
            return Err(ProtocolError::AddressMismatch {
                expected: request.address,
                actual: self.address,
            });
        }

        if self.function != request.function {
            return Err(ProtocolError::Malformed(format!(
                "response to function {:#04x} for a request of function {:#04x}",
                self.function, request.function
            )));
        }

        match self.status {
            status::OK => Ok(self.body),
            status::UNSUPPORTED => Err(ProtocolError::Unsupported {
                address: self.address,
                register: request.register().unwrap_or_default(),
            }),
            s => Err(ProtocolError::Rejected { address: self.address, status: s }),
        }
    }
}

/// 16 bit checksum: sum of big-endian words, a trailing odd byte is XORed in.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u16 = 0;
    let mut words = data.chunks_exact(2);
    for w in &mut words {
        sum = sum.wrapping_add(u16::from_be_bytes([w[0], w[1]]));
    }
    if let [last] = words.remainder() {
        sum ^= *last as u16;
    }
    sum
}

fn check_preamble(header: &[u8]) -> Result<(), ProtocolError> {
    if header[0] != SYNC_BYTE || header[1] != PROTOCOL_VERSION {
        return Err(ProtocolError::Malformed(format!(
            "bad frame preamble {:02X?}",
            &header[..2]
        )));
    }
    Ok(())
}

fn read_body_and_check<R: Read>(
    reader: &mut R,
    header: &[u8],
    len: usize,
) -> Result<Vec<u8>, TransportError> {
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;

    let mut sum_bytes = [0u8; 2];
    reader.read_exact(&mut sum_bytes)?;
    let actual = u16::from_be_bytes(sum_bytes);

    let mut covered = header[2..].to_vec();
    covered.extend_from_slice(&body);
    let expected = checksum(&covered);

    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual }.into());
    }

    Ok(body)
}
