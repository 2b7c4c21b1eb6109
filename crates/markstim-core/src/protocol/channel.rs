//! Channel abstraction
//!
//! The protocol only depends on this contract, so it can run over a real
//! serial port or over [`crate::simulator::SimulatedDevice`].

use serialport::SerialPort;
use std::io::{self, Read, Write};

/// Byte-stream duplex connection to the device
pub trait CommunicationChannel: Read + Write + Send {
    /// Get number of bytes available to read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Discard anything received but not yet read
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Discard anything written but not yet transmitted
    fn clear_output_buffer(&mut self) -> io::Result<()>;

    /// Flush and release the underlying connection.
    ///
    /// Calling it on an already closed channel is a no-op.
    fn close(&mut self) -> io::Result<()>;

    /// Whether [`CommunicationChannel::close`] has been called
    fn is_open(&self) -> bool;

    /// Read up to and including the next `\n`.
    ///
    /// A read timeout or end of stream ends the line early, so the result may
    /// lack the terminator or be empty.
    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Err(ref e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    break
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(line)
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "serial port is closed")
}

/// Serial port wrapper implementing CommunicationChannel
pub struct SerialChannel {
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl SerialChannel {
    /// Wrap an opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        let name = port.name().unwrap_or_default();
        Self {
            port: Some(port),
            name,
        }
    }

    /// Port identifier the channel was opened with
    pub fn name(&self) -> &str {
        &self.name
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or_else(closed)
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port()?.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port()?.flush()
    }
}

impl CommunicationChannel for SerialChannel {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port()?.bytes_to_read().map_err(io::Error::other)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port()?
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        self.port()?
            .clear(serialport::ClearBuffer::Output)
            .map_err(io::Error::other)
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the handle closes the file descriptor
        match self.port.take() {
            Some(mut port) => port.flush(),
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Minimal in-memory channel exercising the default read_line
    struct Scripted {
        rx: VecDeque<io::Result<u8>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.rx.pop_front() {
                Some(Ok(b)) => {
                    buf[0] = b;
                    Ok(1)
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CommunicationChannel for Scripted {
        fn bytes_to_read(&mut self) -> io::Result<u32> {
            Ok(self.rx.len() as u32)
        }
        fn clear_input_buffer(&mut self) -> io::Result<()> {
            self.rx.clear();
            Ok(())
        }
        fn clear_output_buffer(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn is_open(&self) -> bool {
            true
        }
    }

    fn scripted(bytes: &[u8]) -> Scripted {
        Scripted {
            rx: bytes.iter().map(|&b| Ok(b)).collect(),
        }
    }

    #[test]
    fn test_read_line_stops_at_newline() {
        let mut ch = scripted(b"Teensy ready\r\nrest");
        assert_eq!(ch.read_line().unwrap(), b"Teensy ready\r\n".to_vec());
        assert_eq!(ch.read_line().unwrap(), b"rest".to_vec());
        assert!(ch.read_line().unwrap().is_empty());
    }

    #[test]
    fn test_read_line_ends_on_timeout() {
        let mut ch = scripted(b"Ard");
        ch.rx
            .push_back(Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")));
        ch.rx.push_back(Ok(b'x'));
        assert_eq!(ch.read_line().unwrap(), b"Ard".to_vec());
    }

    #[test]
    fn test_read_line_propagates_hard_errors() {
        let mut ch = scripted(b"");
        ch.rx
            .push_back(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
        assert_eq!(
            ch.read_line().unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }
}
