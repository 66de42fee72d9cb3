//! Crate-wide error taxonomy (§7 of the design: configuration, resource,
//! hardware, and I/O failures each get their own variant so callers can
//! match on what actually went wrong instead of a string).

use std::io;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "invalid configuration: {}", message)]
    Configuration { message: String },

    #[fail(display = "failed to acquire resource {}: {}", resource, inner)]
    Resource { resource: &'static str, inner: io::Error },

    #[fail(display = "hardware error: {}", message)]
    Hardware { message: String },

    /// Buffer-index gap (§4.1, §7): always logged at the point it's
    /// constructed, never propagated as a measurement failure.
    #[fail(display = "lost {} blocks to a buffer-index gap", lost)]
    DataLoss { lost: u64 },

    #[fail(display = "i/o error: {}", inner)]
    Io { inner: io::Error },

    #[fail(display = "posix error: {}", inner)]
    Nix { inner: ::nix::Error },

    #[fail(display = "errno {}: {}", errno, message)]
    Errno { errno: i32, message: String },
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Error {
        Error::Configuration { message: message.into() }
    }

    pub fn hardware(message: impl Into<String>) -> Error {
        Error::Hardware { message: message.into() }
    }

    pub fn data_loss(lost: u64) -> Error {
        Error::DataLoss { lost }
    }

    pub fn resource(resource: &'static str, inner: io::Error) -> Error {
        Error::Resource { resource, inner }
    }

    pub fn errno(message: impl Into<String>) -> Error {
        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
        Error::Errno { errno, message: message.into() }
    }
}

impl From<io::Error> for Error {
    fn from(inner: io::Error) -> Self {
        Error::Io { inner }
    }
}

impl From<::nix::Error> for Error {
    fn from(inner: ::nix::Error) -> Self {
        Error::Nix { inner }
    }
}
