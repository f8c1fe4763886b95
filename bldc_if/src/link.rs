//! Serial port opening and the byte link abstraction

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// A bidirectional byte link whose unread input can be discarded.
pub trait SerialLink: Read + Write {
    /// Drop any received bytes which have not been read yet.
    fn clear_input(&mut self) -> io::Result<()>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Open a serial port as 8N1 without flow control.
///
/// # Arguments
/// * `path` - Serial port path (e.g., "/dev/ttyUSB0")
/// * `baud_rate` - Baud rate (e.g., 1000000)
/// * `timeout` - Bound on every blocking read or write
pub fn open_port(
    path: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, serialport::Error> {
    let port = serialport::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(timeout)
        .open()?;

    log::info!("Opened serial port: {} at {} baud", path, baud_rate);

    Ok(port)
}
