//! Sample buffers used by the software graph's delay lines.

pub mod delay;
pub mod ring;

pub use delay::DelayLine;
pub use ring::RingBuffer;
