//! Byte transports the turntable controller talks through.

mod error;
mod serial;
mod sim;

pub use error::TransportError;
pub use serial::{available_ports, SerialTransport};
pub use sim::SimulatedTurntable;

pub type Result<T> = std::result::Result<T, TransportError>;

/// A half-duplex byte pipe to the turntable firmware.
pub trait Transport: Send {
    /// Read whatever bytes are pending into `buffer`. A read timeout is not an
    /// error and returns `Ok(0)`.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Write the whole frame and flush it.
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < frame.len() {
            match self.write(&frame[written..])? {
                0 => return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into()),
                n => written += n,
            }
        }
        self.flush()
    }
}
