//! Shared-memory and semaphore IPC (§3, §4.5, §4.6): the status
//! segment, the live-view segment and its ring buffers, and the
//! semaphore pair that coordinates them.

pub mod live_view;
pub mod ring_buffer;
pub mod semaphore;
pub mod shm;

pub use shm::Shm;
