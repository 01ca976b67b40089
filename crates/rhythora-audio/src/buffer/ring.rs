//! Fixed-capacity ring buffer of samples.
//!
//! The graph renders under a single lock, so unlike a cross-thread SPSC queue
//! this buffer takes `&mut self` and needs no atomics.

/// Single-owner ring buffer of `f32` samples.
///
/// Capacity is rounded up to a power of 2 so wrapping is a mask.
pub struct RingBuffer {
    buffer: Box<[f32]>,
    read_pos: usize,
    write_pos: usize,
    capacity: usize,
    mask: usize,
}

impl RingBuffer {
    /// Create a new ring buffer holding at least `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self {
            buffer: vec![0.0f32; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            capacity,
            mask: capacity - 1,
        }
    }

    /// Number of samples available for reading.
    pub const fn available(&self) -> usize {
        self.write_pos.wrapping_sub(self.read_pos)
    }

    /// Number of free slots for writing.
    pub const fn free(&self) -> usize {
        self.capacity - self.available()
    }

    pub const fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Write samples, returning how many fit.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let to_write = samples.len().min(self.free());
        for &sample in &samples[..to_write] {
            self.buffer[self.write_pos & self.mask] = sample;
            self.write_pos = self.write_pos.wrapping_add(1);
        }
        to_write
    }

    /// Append `count` zero samples, returning how many fit.
    pub fn write_silence(&mut self, count: usize) -> usize {
        let to_write = count.min(self.free());
        for _ in 0..to_write {
            self.buffer[self.write_pos & self.mask] = 0.0;
            self.write_pos = self.write_pos.wrapping_add(1);
        }
        to_write
    }

    /// Read samples into `output`, returning how many were read.
    pub fn read(&mut self, output: &mut [f32]) -> usize {
        let to_read = output.len().min(self.available());
        for slot in &mut output[..to_read] {
            *slot = self.buffer[self.read_pos & self.mask];
            self.read_pos = self.read_pos.wrapping_add(1);
        }
        to_read
    }

    /// Drop up to `count` samples without reading them.
    pub fn skip(&mut self, count: usize) -> usize {
        let to_skip = count.min(self.available());
        self.read_pos = self.read_pos.wrapping_add(to_skip);
        to_skip
    }
}
