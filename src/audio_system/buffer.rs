/// Double-buffered PCM storage
///
/// One buffer is being read by the hardware while the other is filled by the
/// decoder. `swap` flips the roles; the freshly swapped-in buffer is the one
/// to decode into and then submit.

#[derive(Debug)]
pub struct PingPongBuffer {
    buffers: [Vec<u8>; 2],
    active: usize,
}

impl PingPongBuffer {
    /// Two zeroed buffers of `size` bytes each
    pub fn new(size: usize) -> Self {
        Self {
            buffers: [vec![0; size], vec![0; size]],
            active: 0,
        }
    }

    /// Make the inactive buffer active
    pub fn swap(&mut self) {
        self.active ^= 1;
    }

    pub fn active(&self) -> &[u8] {
        &self.buffers[self.active]
    }

    pub fn active_mut(&mut self) -> &mut [u8] {
        &mut self.buffers[self.active]
    }
}
