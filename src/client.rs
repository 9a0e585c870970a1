//! Request/response orchestration for one servo controller on the bus.
//!
//! A [`Servo`] only knows the device address and a default timeout. The
//! transport is borrowed per call, so one process can drive several links
//! and several devices on the same link.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "serialport")]
//! # fn main() -> Result<(), mksservo_lib::Error> {
//! use mksservo_lib::{client::Servo, protocol::Address, serialport::SerialTransport};
//!
//! let mut link = SerialTransport::open("/dev/ttyUSB0", 38400)?;
//! let servo = Servo::new(Address::try_from(1)?);
//!
//! let io = servo.read_io(&mut link)?;
//! println!("{io}");
//! servo.write_single(&mut link, 0x80, 1)?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "serialport"))]
//! # fn main() {}
//! ```

use crate::error::{Error, Result};
use crate::protocol::*;
use crate::transport::Transport;
use std::time::Duration;

/// Response timeout used when the caller does not pass one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    AwaitingResponse,
    Done,
    Failed,
}

/// Tracks a single exchange from encoding to the decoded answer.
struct Exchange {
    address: Address,
    state: State,
}

impl Exchange {
    fn new(address: Address) -> Self {
        Self {
            address,
            state: State::Idle,
        }
    }

    fn transition(&mut self, next: State) {
        log::trace!("{}: {:?} -> {:?}", self.address, self.state, next);
        self.state = next;
    }

    fn run<T, O>(&mut self, transport: &mut T, op: &O, timeout: Duration) -> Result<O::Output>
    where
        T: Transport + ?Sized,
        O: Operation,
    {
        let tx_buffer = op.request(self.address)?;
        self.transition(State::AwaitingResponse);

        log::trace!("write bytes: {tx_buffer:02X?}");
        transport.send(&tx_buffer)?;

        let reply_size = op.reply_size();
        log::trace!("read {reply_size} bytes");
        let rx_buffer = transport.receive(reply_size, timeout)?;
        log::trace!("receive_bytes: {rx_buffer:02X?}");
        if rx_buffer.is_empty() {
            return Err(Error::Timeout(timeout));
        }
        op.decode(self.address, &rx_buffer)
    }

    fn finish<R>(&mut self, result: &Result<R>) {
        match result {
            Ok(_) => self.transition(State::Done),
            Err(err) => {
                log::debug!("{}: request failed ({err})", self.address);
                self.transition(State::Failed);
            }
        }
    }
}

/// A servo controller reachable at one Modbus address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Servo {
    address: Address,
    timeout: Duration,
}

impl Servo {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        log::trace!("set timeout to {timeout:?}");
        self.timeout = timeout;
    }

    /// Runs one complete exchange: encode, send, receive, validate.
    ///
    /// Broadcast requests are rejected, they never get an answer.
    pub fn execute<T, O>(&self, transport: &mut T, op: &O, timeout: Duration) -> Result<O::Output>
    where
        T: Transport + ?Sized,
        O: Operation,
    {
        if self.address.is_broadcast() {
            return Err(Error::invalid_parameter(
                "broadcast address cannot be used for requests expecting a response",
            ));
        }
        let mut exchange = Exchange::new(self.address);
        let result = exchange.run(transport, op, timeout);
        exchange.finish(&result);
        result
    }

    fn write<T, O>(&self, transport: &mut T, op: &O, timeout: Duration) -> Result<()>
    where
        T: Transport + ?Sized,
        O: Operation<Output = ()>,
    {
        if !self.address.is_broadcast() {
            return self.execute(transport, op, timeout);
        }
        let tx_buffer = op.request(self.address)?;
        log::trace!("broadcast bytes: {tx_buffer:02X?}");
        transport.send(&tx_buffer)
    }

    /// Reads `count` input registers starting at `register`.
    pub fn read<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        register: u16,
        count: u16,
    ) -> Result<Vec<Word>> {
        self.read_with_timeout(transport, register, count, self.timeout)
    }

    pub fn read_with_timeout<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        register: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<Word>> {
        self.execute(transport, &ReadRegisters::input(register, count), timeout)
    }

    /// Reads `count` holding registers starting at `register`.
    pub fn read_holding<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        register: u16,
        count: u16,
    ) -> Result<Vec<Word>> {
        self.execute(
            transport,
            &ReadRegisters::holding(register, count),
            self.timeout,
        )
    }

    pub fn write_single<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        register: u16,
        value: Word,
    ) -> Result<()> {
        self.write_single_with_timeout(transport, register, value, self.timeout)
    }

    pub fn write_single_with_timeout<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        register: u16,
        value: Word,
        timeout: Duration,
    ) -> Result<()> {
        self.write(
            transport,
            &WriteSingleRegister { register, value },
            timeout,
        )
    }

    pub fn write_multiple<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        register: u16,
        values: &[Word],
    ) -> Result<()> {
        self.write_multiple_with_timeout(transport, register, values, self.timeout)
    }

    pub fn write_multiple_with_timeout<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        register: u16,
        values: &[Word],
        timeout: Duration,
    ) -> Result<()> {
        self.write(
            transport,
            &WriteMultipleRegisters::from_words(register, values),
            timeout,
        )
    }

    /// Write multiple registers from byte sized fields, sent in the given order.
    pub fn write_fields<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        register: u16,
        fields: &[u8],
    ) -> Result<()> {
        self.write(
            transport,
            &WriteMultipleRegisters::from_fields(register, fields.to_vec()),
            self.timeout,
        )
    }

    pub fn read_io<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<IoStatus> {
        let words = self.execute(transport, &IoStatus::request(), self.timeout)?;
        IoStatus::decode_from_input_registers(&words)
    }

    pub fn write_io<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        outputs: &IoOutputs,
    ) -> Result<()> {
        self.write(transport, &outputs.request()?, self.timeout)
    }

    pub fn move_absolute<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        movement: &AbsoluteMove,
    ) -> Result<()> {
        self.write(transport, &movement.request(), self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Loopback {
        sent: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
    }

    impl Transport for Loopback {
        fn send(&mut self, frame: &[u8]) -> Result<()> {
            self.sent.push(frame.to_vec());
            Ok(())
        }

        fn receive(&mut self, expected_len: usize, _timeout: Duration) -> Result<Vec<u8>> {
            let mut reply = self.replies.pop_front().unwrap_or_default();
            reply.truncate(expected_len);
            Ok(reply)
        }
    }

    #[test]
    fn exchange_states() {
        let address = Address::default();
        let mut transport = Loopback::default();

        let mut exchange = Exchange::new(address);
        assert_eq!(exchange.state, State::Idle);
        let op = WriteSingleRegister {
            register: 0x80,
            value: 1,
        };
        transport.replies.push_back(op.request(address).unwrap());
        let result = exchange.run(&mut transport, &op, DEFAULT_TIMEOUT);
        assert_eq!(exchange.state, State::AwaitingResponse);
        exchange.finish(&result);
        assert_eq!(exchange.state, State::Done);

        // Encoding failures never leave Idle and never touch the transport.
        let mut exchange = Exchange::new(address);
        let result = exchange.run(
            &mut transport,
            &ReadRegisters::input(0x34, 0),
            DEFAULT_TIMEOUT,
        );
        assert_eq!(exchange.state, State::Idle);
        assert_eq!(transport.sent.len(), 1);
        exchange.finish(&result);
        assert_eq!(exchange.state, State::Failed);
    }

    #[test]
    fn silence_is_a_timeout() {
        let mut transport = Loopback::default();
        let servo = Servo::new(Address::default()).with_timeout(Duration::from_millis(20));
        assert!(matches!(
            servo.read(&mut transport, 0x34, 1),
            Err(Error::Timeout(timeout)) if timeout == Duration::from_millis(20)
        ));
    }

    #[test]
    fn broadcast_rules() {
        let mut transport = Loopback::default();
        let servo = Servo::new(Address::BROADCAST);

        assert!(matches!(
            servo.read(&mut transport, 0x34, 1),
            Err(Error::InvalidParameter(..))
        ));
        assert!(transport.sent.is_empty());

        servo.write_single(&mut transport, 0x80, 1).unwrap();
        assert_eq!(
            transport.sent,
            [vec![0x00, 0x06, 0x00, 0x80, 0x00, 0x01, 0x48, 0x33]]
        );
    }
}
