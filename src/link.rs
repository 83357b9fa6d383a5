// Serial byte-stream transport shared by commands and telemetry

use std::io::{self, Read, Write};
use std::thread::sleep;
use std::time::{Duration, Instant};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::config::BAUD_RATE;

// How often bytes_to_read is polled while waiting for data
const AVAILABILITY_POLL: Duration = Duration::from_millis(5);

// Read timeout once data is known to be available
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Error types for opening the link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Blocking byte-stream operations used by the dispatcher and the telemetry poller
pub trait Link: Send {
    /// Block until at least one byte is buffered or `timeout` elapses
    fn wait_for_data(&mut self, timeout: Duration) -> io::Result<bool>;

    fn read_byte(&mut self) -> io::Result<u8>;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Push out anything still buffered for transmission
    fn flush(&mut self) -> io::Result<()>;
}

/// UART link configured as 8N1 without flow control
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    pub fn open(port_name: &str) -> Result<Self, LinkError> {
        Self::open_with_baudrate(port_name, BAUD_RATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self, LinkError> {
        info!("Opening serial link on {} at {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;
        Ok(Self { port })
    }
}

impl Link for SerialLink {
    fn wait_for_data(&mut self, timeout: Duration) -> io::Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.port.bytes_to_read()? > 0 {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            sleep(AVAILABILITY_POLL.min(deadline - now));
        }
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        self.port.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        debug!("Link write {:?}", String::from_utf8_lossy(bytes));
        self.port.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}
