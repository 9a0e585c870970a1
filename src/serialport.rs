use crate::error::Result;
use crate::protocol::MINIMUM_DELAY;
use crate::transport::Transport;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// Synchronous RS485 link based on the `serialport` crate.
#[derive(Debug)]
pub struct SerialTransport {
    serial: Box<dyn serialport::SerialPort>,
    last_execution: Instant,
    delay: Duration,
}

/// Silent interval of 3.5 characters (11 bits each) at the given baud rate.
pub fn frame_delay(baud_rate: u32) -> Duration {
    let nanos = 38_500_000_000u64 / u64::from(baud_rate.max(1));
    Duration::max(Duration::from_nanos(nanos), MINIMUM_DELAY)
}

impl SerialTransport {
    /// Opens `port` with 8 data bits, no parity, one stop bit and no flow control.
    pub fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let serial = serialport::new(port, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|err| {
                log::warn!("Cannot open serial port '{}': {}", port, err);
                io::Error::from(err)
            })?;
        Ok(Self::from_port(serial, frame_delay(baud_rate)))
    }

    /// Wraps an already configured port.
    pub fn from_port(serial: Box<dyn serialport::SerialPort>, delay: Duration) -> Self {
        Self {
            serial,
            last_execution: Instant::now(),
            delay: Duration::max(delay, MINIMUM_DELAY),
        }
    }

    /// Sets the minimum silent interval between frames.
    ///
    /// Some USB to RS485 dongles need several milliseconds to switch
    /// between TX and RX.
    pub fn set_delay(&mut self, delay: Duration) {
        if delay < MINIMUM_DELAY {
            log::warn!("delay {delay:?} lower minimum {MINIMUM_DELAY:?}, use minimum");
            self.delay = MINIMUM_DELAY;
        } else {
            self.delay = delay;
        }
        log::trace!("set delay to {:?}", self.delay);
    }

    fn serial_await_delay(&self) {
        let last_exec_diff = Instant::now().duration_since(self.last_execution);
        if let Some(time_until_delay_reached) = self.delay.checked_sub(last_exec_diff) {
            std::thread::sleep(time_until_delay_reached);
        }
    }

    // A late answer to an earlier request must not be taken for the next one.
    fn discard_pending(&mut self) -> Result<()> {
        loop {
            let pending = self.serial.bytes_to_read().map_err(io::Error::from)?;
            if pending == 0 {
                return Ok(());
            }
            log::trace!("Got {} pending bytes", pending);
            let mut buf: Vec<u8> = vec![0; 64];
            let received = self.serial.read(buf.as_mut_slice())?;
            log::trace!("Read {} pending bytes", received);
        }
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.discard_pending()?;
        self.serial_await_delay();
        self.serial.write_all(frame)?;
        // The silent interval starts once the frame has left the UART, which
        // matters for broadcasts that are never followed by a receive.
        self.serial.flush()?;
        self.last_execution = Instant::now();
        Ok(())
    }

    fn receive(&mut self, expected_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut rx_buffer = vec![0; expected_len];
        let mut received = 0;

        while received < expected_len {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => break,
            };
            self.serial
                .set_timeout(remaining)
                .map_err(io::Error::from)?;
            match self.serial.read(&mut rx_buffer[received..]) {
                Ok(0) => break,
                Ok(n) => received += n,
                Err(err) if err.kind() == io::ErrorKind::TimedOut => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        rx_buffer.truncate(received);
        self.last_execution = Instant::now();
        Ok(rx_buffer)
    }
}
