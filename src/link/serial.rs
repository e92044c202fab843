//! Serial port transport built on the `serialport` crate.

use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info, warn};

use super::{SensorTransport, READ_COMMAND};
use crate::decoder::RESPONSE_LEN;
use crate::error::LinkError;

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
/// Time the amplifier needs after the port opens before it answers reads
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

/// Connection parameters for [`SerialLink::open`]
///
/// Framing (8 data bits, no parity, 1 stop bit) is fixed by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub port: String,
    pub baud_rate: u32,
    pub timeout: Duration,
    pub settle: Duration,
}

impl LinkConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
            settle: DEFAULT_SETTLE,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

/// Exclusive owner of a serial connection to the load cell
pub struct SerialLink {
    name: String,
    port: Option<Box<dyn SerialPort>>,
    timeout: Duration,
}

impl SerialLink {
    /// Open and configure the port
    ///
    /// # Errors
    /// `LinkError::OpenFailed` if the device cannot be opened or configured.
    pub fn open(config: &LinkConfig) -> Result<Self, LinkError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.timeout)
            .open()
            .map_err(|e| LinkError::OpenFailed {
                port: config.port.clone(),
                reason: e.to_string(),
            })?;

        info!(
            "[SerialLink] Opened {} at {} baud (timeout {:?})",
            config.port, config.baud_rate, config.timeout
        );

        if !config.settle.is_zero() {
            thread::sleep(config.settle);
        }

        Ok(Self::from_port(config.port.clone(), port, config.timeout))
    }

    /// Wrap an already-configured port
    pub fn from_port(name: impl Into<String>, port: Box<dyn SerialPort>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            port: Some(port),
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Drop whatever is left in the input buffer after a short read so a late
/// response cannot shift the framing of the next request.
fn timed_out(port: &mut dyn SerialPort, received: usize) -> LinkError {
    if let Err(err) = port.clear(ClearBuffer::Input) {
        warn!("[SerialLink] Failed to clear input after timeout: {}", err);
    }
    LinkError::Timeout { received }
}

/// Outcome of one read attempt on the port
#[derive(Debug, PartialEq, Eq)]
enum Chunk {
    Data(usize),
    TimedOut,
}

/// Read whatever is available, retrying on `Interrupted`
///
/// End of stream means the device is gone and maps to `LinkError::Closed`.
fn read_chunk<R: Read + ?Sized>(port: &mut R, buf: &mut [u8]) -> Result<Chunk, LinkError> {
    loop {
        match port.read(buf) {
            Ok(0) => return Err(LinkError::Closed),
            Ok(n) => return Ok(Chunk::Data(n)),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(Chunk::TimedOut),
            Err(e) => return Err(e.into()),
        }
    }
}

impl SensorTransport for SerialLink {
    fn request_raw_reading(&mut self) -> Result<[u8; RESPONSE_LEN], LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::Closed)?;

        port.write_all(&[READ_COMMAND])?;
        port.flush()?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; RESPONSE_LEN];
        let mut received = 0;

        while received < RESPONSE_LEN {
            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out(port.as_mut(), received));
            }
            port.set_timeout(deadline - now)
                .map_err(|e| LinkError::Io {
                    details: e.to_string(),
                })?;

            match read_chunk(port.as_mut(), &mut buf[received..])? {
                Chunk::Data(n) => received += n,
                Chunk::TimedOut => return Err(timed_out(port.as_mut(), received)),
            }
        }

        debug!("[SerialLink] Response bytes {:02X?}", buf);
        Ok(buf)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("[SerialLink] Closed {}", self.name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn describe(&self) -> String {
        format!("serial:{}", self.name)
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Names of serial ports visible to the OS
pub fn available_ports() -> Result<Vec<String>, LinkError> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .map_err(|e| LinkError::Io {
            details: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_config_defaults() {
        let config = LinkConfig::new("COM5");
        assert_eq!(config.port, "COM5");
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.settle, Duration::from_millis(100));

        let config = config
            .with_baud_rate(9600)
            .with_timeout(Duration::from_millis(250))
            .with_settle(Duration::ZERO);
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert!(config.settle.is_zero());
    }

    struct FlakyReader {
        results: Vec<std::io::Result<usize>>,
    }

    impl Read for FlakyReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.results.remove(0) {
                Ok(n) => {
                    buf[..n].fill(0xAB);
                    Ok(n)
                }
                Err(e) => Err(e),
            }
        }
    }

    #[test]
    fn test_read_chunk_end_of_stream_is_closed() {
        let mut gone = std::io::empty();
        let mut buf = [0u8; RESPONSE_LEN];
        assert_eq!(read_chunk(&mut gone, &mut buf), Err(LinkError::Closed));
    }

    #[test]
    fn test_read_chunk_data_timeout_and_interrupt() {
        let mut buf = [0u8; RESPONSE_LEN];
        let mut partial: &[u8] = &[0x01, 0x86];
        assert_eq!(read_chunk(&mut partial, &mut buf), Ok(Chunk::Data(2)));
        assert_eq!(&buf[..2], &[0x01, 0x86]);

        let mut reader = FlakyReader {
            results: vec![
                Err(ErrorKind::Interrupted.into()),
                Ok(1),
                Err(ErrorKind::TimedOut.into()),
                Err(ErrorKind::BrokenPipe.into()),
            ],
        };
        assert_eq!(read_chunk(&mut reader, &mut buf), Ok(Chunk::Data(1)));
        assert_eq!(read_chunk(&mut reader, &mut buf), Ok(Chunk::TimedOut));
        assert_eq!(read_chunk(&mut reader, &mut buf), Err(LinkError::Closed));
    }

    #[test]
    fn test_open_missing_device_fails() {
        let config = LinkConfig::new("/dev/loadcell-does-not-exist").with_settle(Duration::ZERO);
        match SerialLink::open(&config) {
            Err(LinkError::OpenFailed { port, .. }) => {
                assert_eq!(port, "/dev/loadcell-does-not-exist");
            }
            Err(other) => panic!("Expected OpenFailed, got {:?}", other),
            Ok(_) => panic!("Opening a missing device should fail"),
        }
    }

    #[cfg(unix)]
    mod pty {
        use super::*;
        use serialport::{SerialPort, TTYPort};
        use std::io::{Read, Write};

        fn link_pair(timeout: Duration) -> (SerialLink, TTYPort) {
            let (mut device, link_side) = TTYPort::pair().expect("pty pair");
            device
                .set_timeout(Duration::from_secs(2))
                .expect("device timeout");
            let link = SerialLink::from_port("pty", Box::new(link_side), timeout);
            (link, device)
        }

        #[test]
        fn test_request_reads_three_bytes() {
            let (mut link, mut device) = link_pair(Duration::from_secs(2));

            let responder = thread::spawn(move || {
                let mut cmd = [0u8; 1];
                device.read_exact(&mut cmd).expect("command byte");
                assert_eq!(cmd[0], READ_COMMAND);
                device.write_all(&[0x01, 0x86]).unwrap();
                device.flush().unwrap();
                thread::sleep(Duration::from_millis(20));
                device.write_all(&[0xA0]).unwrap();
                device.flush().unwrap();
                device
            });

            let bytes = link.request_raw_reading().expect("reading");
            assert_eq!(bytes, [0x01, 0x86, 0xA0]);
            responder.join().unwrap();
        }

        #[test]
        fn test_short_response_times_out() {
            let (mut link, mut device) = link_pair(Duration::from_millis(200));

            let responder = thread::spawn(move || {
                let mut cmd = [0u8; 1];
                device.read_exact(&mut cmd).expect("command byte");
                device.write_all(&[0x00, 0x10]).unwrap();
                device.flush().unwrap();
                device
            });

            let err = link.request_raw_reading().unwrap_err();
            assert_eq!(err, LinkError::Timeout { received: 2 });
            let _device = responder.join().unwrap();
        }

        #[test]
        fn test_closed_link_reports_closed() {
            let (mut link, _device) = link_pair(Duration::from_millis(100));
            assert!(link.is_open());
            link.close();
            link.close();
            assert!(!link.is_open());
            assert_eq!(link.request_raw_reading().unwrap_err(), LinkError::Closed);
        }
    }
}
