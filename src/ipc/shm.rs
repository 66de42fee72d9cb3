//! SysV shared memory segment (§3, §6): a fixed-key region sized for
//! exactly one `T`, created by its owning process and attached
//! read/write by every peer. Mirrors the teacher's mmap-based
//! [`crate::pru::buffer::SampleBuffer`] but over a named segment rather
//! than an anonymous mapping.

use std::marker::PhantomData;
use std::mem::size_of;

use crate::error::{Error, Result};

pub const STATUS_KEY: libc::key_t = 0x457;
pub const DATA_KEY: libc::key_t = 0x115B;

/// A shared-memory-backed `T`. `attach` does not itself serialize
/// access — callers hold the semaphore set in [`crate::ipc::semaphore`]
/// around any read or write (§4.5).
pub struct Shm<T> {
    id: libc::c_int,
    ptr: *mut T,
    _marker: PhantomData<T>,
}

impl<T> Shm<T> {
    /// Creates the segment at `key` if absent, permission 0666,
    /// zero-initialized. Idempotent like the original's `IPC_CREAT`
    /// calls: whichever process gets there first creates it, later
    /// calls attach the same segment (§4.7).
    pub fn create(key: libc::key_t) -> Result<Self>
    where
        T: Default,
    {
        let size = size_of::<T>();
        let id = unsafe { libc::shmget(key, size, libc::IPC_CREAT | 0o666) };
        if id < 0 {
            return Err(Error::errno("failed to create shared memory segment"));
        }
        let ptr = unsafe { libc::shmat(id, std::ptr::null(), 0) };
        if ptr as isize == -1 {
            return Err(Error::errno("failed to attach shared memory segment"));
        }
        let typed = ptr as *mut T;
        unsafe {
            std::ptr::write(typed, T::default());
        }
        Ok(Shm { id, ptr: typed, _marker: PhantomData })
    }

    /// Attaches an existing segment. Used by the CLI, live-view reader,
    /// and sampler reading the daemon-owned status segment.
    pub fn attach(key: libc::key_t) -> Result<Self> {
        let size = size_of::<T>();
        let id = unsafe { libc::shmget(key, size, 0o666) };
        if id < 0 {
            return Err(Error::errno("failed to find shared memory segment"));
        }
        let ptr = unsafe { libc::shmat(id, std::ptr::null(), 0) };
        if ptr as isize == -1 {
            return Err(Error::errno("failed to attach shared memory segment"));
        }
        Ok(Shm { id, ptr: ptr as *mut T, _marker: PhantomData })
    }

    /// # Safety
    /// The caller must hold the data semaphore (§4.5) around any use of
    /// the returned reference that must not race a concurrent writer.
    pub unsafe fn get(&self) -> &T {
        &*self.ptr
    }

    /// # Safety
    /// The caller must hold the data semaphore and be the segment's
    /// sole writer (§3: "single writer, many readers").
    pub unsafe fn get_mut(&mut self) -> &mut T {
        &mut *self.ptr
    }

    /// Explicitly destroys the segment. Callers must opt in; dropping a
    /// handle only detaches (§3: status and live-view segments persist
    /// across measurements, matching the original's `write_status`/
    /// `web_init`, which create with `IPC_CREAT` but never call
    /// `shmctl(IPC_RMID)` on either).
    pub fn remove(self) -> Result<()> {
        let ret = unsafe { libc::shmctl(self.id, libc::IPC_RMID, std::ptr::null_mut()) };
        if ret < 0 {
            return Err(Error::errno("failed to remove shared memory segment"));
        }
        Ok(())
    }
}

impl<T> Drop for Shm<T> {
    fn drop(&mut self) {
        unsafe {
            libc::shmdt(self.ptr as *const libc::c_void);
        }
    }
}

// Shared memory is explicitly meant to cross process boundaries; `T`
// values placed in it must already be `Copy`/`#[repr(C)]` plain data
// (`Status`, live-view records), so sending the handle itself across
// threads is safe under the same discipline the semaphore set enforces
// for cross-process access.
unsafe impl<T: Send> Send for Shm<T> {}
