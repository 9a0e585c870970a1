use crate::error::Result;
use std::time::Duration;

/// A raw byte pipe to the bus. It knows nothing about framing.
///
/// The caller owns the transport; the codec only borrows it for the
/// duration of one request/response exchange.
pub trait Transport {
    /// Writes a complete frame. No retry.
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Blocks until `expected_len` bytes arrived or `timeout` elapsed and
    /// returns what was read, which may be short or empty.
    fn receive(&mut self, expected_len: usize, timeout: Duration) -> Result<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        (**self).send(frame)
    }

    fn receive(&mut self, expected_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        (**self).receive(expected_len, timeout)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        (**self).send(frame)
    }

    fn receive(&mut self, expected_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        (**self).receive(expected_len, timeout)
    }
}
