//! Host-side measurement daemon for the RocketLogger instrument.
//!
//! The co-processor ([`pru`]) hands the host one decoded block at a
//! time; [`pipeline`] calibrates, aggregates, and packs it into file
//! ([`file`]) and live-view ([`ipc::live_view`]) rows; [`lifecycle`]
//! ties the whole thing into one measurement run and the button
//! daemon that starts/stops it.

#[macro_use]
extern crate failure_derive;

pub mod ambient;
pub mod binformat;
pub mod calibration;
pub mod channel;
pub mod config;
pub mod error;
pub mod file;
pub mod ipc;
pub mod lifecycle;
pub mod logging;
pub mod pipeline;
pub mod pru;
pub mod status;

pub use calibration::Calibration;
pub use config::Config;
pub use error::{Error, Result};
pub use status::Status;
