//! # Sensor Channel
//!
//! The strain gauge digitizer streams one text line per sample. A read returns whatever arrived
//! before the link timeout, which may be an empty or partial line.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serialport::SerialPort;
use std::io::{self, BufRead, BufReader, ErrorKind};
use std::time::Duration;

use crate::link::{self, SerialLink};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A channel delivering newline terminated lines.
pub trait LineChannel {
    /// Read one line including its line ending bytes.
    ///
    /// An empty vector means nothing arrived before the timeout.
    fn read_line(&mut self) -> io::Result<Vec<u8>>;

    /// Drop any received bytes which have not been read yet.
    fn reset_input_buffer(&mut self) -> io::Result<()>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Line channel over a serial link.
pub struct SerialLineChannel<L: SerialLink> {
    reader: BufReader<L>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SerialLineChannel<Box<dyn SerialPort>> {
    /// Open the sensor's serial port.
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self, serialport::Error> {
        Ok(Self::new(link::open_port(path, baud_rate, timeout)?))
    }
}

impl<L: SerialLink> SerialLineChannel<L> {
    pub fn new(link: L) -> Self {
        Self {
            reader: BufReader::new(link),
        }
    }
}

impl<L: SerialLink> LineChannel for SerialLineChannel<L> {
    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();

        match self.reader.read_until(b'\n', &mut line) {
            Ok(_) => Ok(line),
            // Whatever arrived before the timeout is returned as is
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(line),
            Err(e) => Err(e),
        }
    }

    fn reset_input_buffer(&mut self) -> io::Result<()> {
        let buffered = self.reader.buffer().len();
        self.reader.consume(buffered);
        self.reader.get_mut().clear_input()
    }
}

impl<T: LineChannel + ?Sized> LineChannel for Box<T> {
    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        (**self).read_line()
    }

    fn reset_input_buffer(&mut self) -> io::Result<()> {
        (**self).reset_input_buffer()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Read, Write};

    /// Link serving `data` then timing out.
    struct TimeoutLink {
        data: io::Cursor<Vec<u8>>,
    }

    impl Read for TimeoutLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(ErrorKind::TimedOut, "timed out")),
                n => Ok(n),
            }
        }
    }

    impl Write for TimeoutLink {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialLink for TimeoutLink {
        fn clear_input(&mut self) -> io::Result<()> {
            let end = self.data.get_ref().len() as u64;
            self.data.set_position(end);
            Ok(())
        }
    }

    fn channel(data: &[u8]) -> SerialLineChannel<TimeoutLink> {
        SerialLineChannel::new(TimeoutLink {
            data: io::Cursor::new(data.to_vec()),
        })
    }

    #[test]
    fn test_read_lines_then_timeout() {
        let mut ch = channel(b"1.0,2.0\r\n3.5,-4.0\r\n5.0,");

        assert_eq!(ch.read_line().unwrap(), b"1.0,2.0\r\n".to_vec());
        assert_eq!(ch.read_line().unwrap(), b"3.5,-4.0\r\n".to_vec());
        assert_eq!(ch.read_line().unwrap(), b"5.0,".to_vec());
        assert!(ch.read_line().unwrap().is_empty());
    }

    #[test]
    fn test_reset_input_buffer() {
        let mut ch = channel(b"1.0,2.0\r\n3.5,-4.0\r\n");

        assert_eq!(ch.read_line().unwrap(), b"1.0,2.0\r\n".to_vec());
        ch.reset_input_buffer().unwrap();
        assert!(ch.read_line().unwrap().is_empty());
    }
}
