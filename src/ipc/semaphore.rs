//! SysV semaphore pair (§4.5, §6): a data semaphore (binary, mutual
//! exclusion over the shared segment) and a wait semaphore (counting,
//! a hand-rolled condition variable for readers). Mirrors the original
//! instrument's `sem.c` operation-for-operation.

use std::time::Duration;

use crate::error::{Error, Result};

pub const SEM_KEY: libc::key_t = 0x8AE;
pub const SEM_COUNT: i32 = 2;
pub const SEM_INDEX_DATA: usize = 0;
pub const SEM_INDEX_WAIT: usize = 1;

pub const TIMEOUT_READ: Duration = Duration::from_secs(3);
pub const TIMEOUT_WRITE: Duration = Duration::from_secs(1);

/// Handle to the two-semaphore set used to coordinate the live-view
/// shared segment between the sampler and ephemeral reader processes.
pub struct SemaphoreSet {
    id: libc::c_int,
    owns: bool,
}

impl SemaphoreSet {
    /// Creates a fresh set at [`SEM_KEY`], permission 0700. Only the
    /// sampler does this, at the start of a measurement (§3).
    pub fn create() -> Result<Self> {
        let id = unsafe { libc::semget(SEM_KEY, SEM_COUNT, libc::IPC_CREAT | 0o700) };
        if id < 0 {
            return Err(Error::errno("failed to create semaphore set"));
        }
        let set = SemaphoreSet { id, owns: true };
        set.set(SEM_INDEX_DATA, 1)?;
        set.set(SEM_INDEX_WAIT, 0)?;
        Ok(set)
    }

    /// Opens the existing set. Used by ephemeral reader processes
    /// (§4.6), which never remove it.
    pub fn open() -> Result<Self> {
        let id = unsafe { libc::semget(SEM_KEY, SEM_COUNT, 0o700) };
        if id < 0 {
            return Err(Error::errno("failed to open semaphore set"));
        }
        Ok(SemaphoreSet { id, owns: false })
    }

    /// Decrements `index` by one, blocking up to `timeout`.
    pub fn wait(&self, index: usize, timeout: Duration) -> Result<()> {
        self.op(index, -1, timeout)
    }

    /// Adds `value` to `index` in one atomic operation; used by the
    /// producer to release exactly the currently-blocked reader count
    /// (§4.2 step 7).
    pub fn set(&self, index: usize, value: i32) -> Result<()> {
        if value == 0 {
            return Ok(());
        }
        self.op(index, value as i16, TIMEOUT_WRITE)
    }

    fn op(&self, index: usize, delta: i16, timeout: Duration) -> Result<()> {
        let mut sem_op = libc::sembuf { sem_num: index as u16, sem_op: delta, sem_flg: 0 };
        let ts = libc::timespec { tv_sec: timeout.as_secs() as libc::time_t, tv_nsec: 0 };

        let ret = unsafe { libc::semtimedop(self.id, &mut sem_op, 1, &ts) };
        if ret < 0 {
            let errno = unsafe { *libc::__errno_location() };
            if errno == libc::EAGAIN {
                return Err(Error::hardware("timed out waiting on live-view semaphore"));
            }
            return Err(Error::errno("semaphore operation failed"));
        }
        Ok(())
    }

    /// `GETNCNT`: number of processes currently blocked waiting for
    /// `index` to increase (§4.2 step 7's "waiter count").
    pub fn waiter_count(&self, index: usize) -> Result<i32> {
        let ret = unsafe { libc::semctl(self.id, index as libc::c_int, libc::GETNCNT) };
        if ret < 0 {
            return Err(Error::errno("failed reading semaphore waiter count"));
        }
        Ok(ret)
    }

    /// Releases every reader currently blocked on the wait semaphore in
    /// one atomic step (§4.2 step 7).
    pub fn release_waiters(&self) -> Result<()> {
        let waiting = self.waiter_count(SEM_INDEX_WAIT)?;
        self.set(SEM_INDEX_WAIT, waiting)
    }

    pub fn remove(self) -> Result<()> {
        let ret = unsafe { libc::semctl(self.id, 0, libc::IPC_RMID) };
        if ret < 0 {
            return Err(Error::errno("failed to remove semaphore set"));
        }
        Ok(())
    }
}

impl Drop for SemaphoreSet {
    fn drop(&mut self) {
        if self.owns {
            unsafe {
                libc::semctl(self.id, 0, libc::IPC_RMID);
            }
        }
    }
}
