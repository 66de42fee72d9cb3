//! Live-view shared segment (§3, §4.5, §4.6): the producer-owned record
//! the sampler publishes into and ephemeral reader processes poll,
//! coordinated through [`crate::ipc::semaphore::SemaphoreSet`].

use std::time::Duration;

use log::warn;

use crate::error::Result;
use crate::pipeline::webview::WebRow;

use super::ring_buffer::RingBuffer;
use super::semaphore::{SemaphoreSet, SEM_INDEX_DATA, SEM_INDEX_WAIT, TIMEOUT_READ, TIMEOUT_WRITE};
use super::shm::{Shm, DATA_KEY};

#[repr(C)]
#[derive(Clone, Copy)]
pub struct LiveViewRecord {
    pub newest_timestamp_ms: i64,
    pub web_channel_count: u32,
    pub buffers: [RingBuffer; 3],
}

impl Default for LiveViewRecord {
    fn default() -> Self {
        LiveViewRecord {
            newest_timestamp_ms: 0,
            web_channel_count: 0,
            buffers: [RingBuffer::default(), RingBuffer::default(), RingBuffer::default()],
        }
    }
}

/// Producer-side handle: owned by the sampler for the duration of a
/// measurement (§3 lifecycle table). `web_enable=false` or a semaphore
/// timeout degrades `publish` to a no-op rather than a measurement
/// failure (§7).
pub struct LiveViewProducer {
    shm: Shm<LiveViewRecord>,
    semaphores: SemaphoreSet,
    disabled: bool,
}

impl LiveViewProducer {
    pub fn create(web_channel_count: u32) -> Result<Self> {
        let mut shm = Shm::<LiveViewRecord>::create(DATA_KEY)?;
        unsafe {
            let record = shm.get_mut();
            record.web_channel_count = web_channel_count;
            for buffer in record.buffers.iter_mut() {
                buffer.reset(web_channel_count);
            }
        }
        let semaphores = SemaphoreSet::create()?;
        Ok(LiveViewProducer { shm, semaphores, disabled: false })
    }

    /// `publish` (§4.2 steps 6-7): for each tier that closed this block,
    /// push its row and bump the timestamp, then release every reader
    /// currently blocked on the wait semaphore. A data-semaphore
    /// timeout disables web publishing for the rest of the measurement
    /// (§7) without failing the caller.
    pub fn publish(&mut self, timestamp_ms: i64, tier_rows: &[Vec<WebRow>; 3]) {
        if self.disabled {
            return;
        }
        if let Err(e) = self.semaphores.wait(SEM_INDEX_DATA, TIMEOUT_WRITE) {
            warn!("live-view data semaphore timed out, disabling web publishing: {}", e);
            self.disabled = true;
            return;
        }

        unsafe {
            let record = self.shm.get_mut();
            record.newest_timestamp_ms = timestamp_ms;
            for (buffer, rows) in record.buffers.iter_mut().zip(tier_rows.iter()) {
                for row in rows {
                    buffer.add(&row.values);
                }
            }
        }

        let _ = self.semaphores.set(SEM_INDEX_DATA, 1);
        if let Err(e) = self.semaphores.release_waiters() {
            warn!("failed releasing live-view readers: {}", e);
        }
    }
}

/// Reader-side handle (§4.6): attaches the existing segment, never
/// creates or removes it.
pub struct LiveViewReader {
    shm: Shm<LiveViewRecord>,
    semaphores: SemaphoreSet,
}

impl LiveViewReader {
    pub fn attach() -> Result<Self> {
        Ok(LiveViewReader { shm: Shm::attach(DATA_KEY)?, semaphores: SemaphoreSet::open()? })
    }

    /// Newest timestamp and channel count, read under the data
    /// semaphore (§4.6).
    pub fn peek(&self) -> Result<(i64, u32)> {
        self.semaphores.wait(SEM_INDEX_DATA, TIMEOUT_READ)?;
        let result = unsafe {
            let record = self.shm.get();
            (record.newest_timestamp_ms, record.web_channel_count)
        };
        let _ = self.semaphores.set(SEM_INDEX_DATA, 1);
        Ok(result)
    }

    /// Snapshots the newest `count` rows of `tier` (0 = 1s/div ... 2 =
    /// 100s/div), oldest first, under the data semaphore.
    pub fn snapshot(&self, tier: usize, count: u32) -> Result<Vec<Vec<i64>>> {
        self.semaphores.wait(SEM_INDEX_DATA, TIMEOUT_READ)?;
        let rows = unsafe {
            let buffer = &self.shm.get().buffers[tier];
            let n = count.min(buffer.filled());
            (0..n).rev().map(|i| buffer.get(i).to_vec()).collect()
        };
        let _ = self.semaphores.set(SEM_INDEX_DATA, 1);
        Ok(rows)
    }

    /// Blocks on the wait semaphore until the producer's next publish,
    /// or the read timeout elapses (§4.5/§4.6).
    pub fn wait_for_update(&self) -> Result<()> {
        self.semaphores.wait(SEM_INDEX_WAIT, TIMEOUT_READ)
    }
}

pub const READ_TIMEOUT: Duration = TIMEOUT_READ;
