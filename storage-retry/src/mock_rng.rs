//! Mock RNG for internal tests.

use rand::RngCore;

/// Always yields the same word, which pins `random::<f64>()` and therefore the jitter factor.
/// `MockRng::new(0)` gives a factor of exactly 0.8.
pub(crate) struct MockRng {
    value: u64,
}

impl MockRng {
    pub fn new(value: u64) -> Self {
        Self { value }
    }
}

impl RngCore for MockRng {
    fn next_u32(&mut self) -> u32 {
        self.value as u32
    }
    fn next_u64(&mut self) -> u64 {
        self.value
    }
    fn fill_bytes(&mut self, dst: &mut [u8]) {
        dst.fill(self.value as u8);
    }
}
