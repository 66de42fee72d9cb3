//! Fixed-path, size-capped log output (§6, §10): every binary installs
//! this instead of calling `env_logger` at the default stderr target,
//! so `log::{error,warn,info,debug,trace}!` call sites across the
//! crate land in the same rotated file the original's `rl_log` wrote
//! to, while keeping `env_logger`'s `RUST_LOG` filter syntax and
//! message formatting.

use std::fs::OpenOptions;
use std::io::{self, Write};

use crate::error::{Error, Result};

pub const LOG_PATH: &str = "/var/log/rocketlogger.log";
const LOG_SIZE_CAP: u64 = 1_000_000;

/// A `Write` sink over the fixed log file that truncates itself back to
/// empty whenever it would otherwise cross [`LOG_SIZE_CAP`], the same
/// "reset on overflow" discipline the original kept instead of
/// rotating to numbered backups.
struct CappedLogFile {
    file: std::fs::File,
    written: u64,
}

impl CappedLogFile {
    fn open(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::resource("log file", e))?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(CappedLogFile { file, written })
    }
}

impl Write for CappedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > LOG_SIZE_CAP {
            self.file.set_len(0)?;
            self.written = 0;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Installs the crate-wide logger. Call once from each binary's
/// `main()` before anything else logs.
pub fn init() -> Result<()> {
    let sink = CappedLogFile::open(LOG_PATH)?;
    let _ = env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(sink)))
        .try_init();
    Ok(())
}
