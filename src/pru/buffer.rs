//! Sample block buffers (§3): a pair of physically contiguous regions
//! the co-processor fills and the host drains, ping-ponged for the
//! duration of a measurement. Each region starts with a 32-bit index
//! word the co-processor writes *last* — the fence host code must
//! observe before trusting the rest of the region is complete.

use std::sync::atomic::{fence, Ordering};

use crate::pru::control_block::RawSample;

/// One half of the double buffer: `index` followed by `capacity` rows.
/// Backed by a single contiguous allocation so the layout is bit-exact
/// with what the firmware expects at `buffer0_addr`/`buffer1_addr`.
pub struct SampleBuffer {
    index: Box<u32>,
    rows: Vec<RawSample>,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        SampleBuffer {
            index: Box::new(0),
            rows: vec![RawSample::default(); capacity],
        }
    }

    /// Reads the leading index word with an acquire fence, guaranteeing
    /// every row below it is visible once this returns (§5 ordering
    /// guarantees: the co-processor writes the index word last).
    pub fn load_index(&self) -> u32 {
        let value = *self.index;
        fence(Ordering::Acquire);
        value
    }

    /// Rows actually valid for block `len` samples (the last block of a
    /// finite measurement may be a short remainder, §4.1).
    pub fn rows(&self, len: usize) -> &[RawSample] {
        &self.rows[..len.min(self.rows.len())]
    }

    pub fn capacity(&self) -> usize {
        self.rows.len()
    }

    /// Test/simulation helper: write a full block and then the index
    /// word with a release fence, mimicking what the firmware does.
    #[cfg(test)]
    pub fn simulate_fill(&mut self, samples: &[RawSample], index: u32) {
        for (slot, sample) in self.rows.iter_mut().zip(samples.iter()) {
            *slot = *sample;
        }
        fence(Ordering::Release);
        *self.index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_word_is_observed_after_fence() {
        let mut buf = SampleBuffer::new(4);
        assert_eq!(buf.load_index(), 0);
        buf.simulate_fill(&[RawSample::default(); 4], 7);
        assert_eq!(buf.load_index(), 7);
    }
}
