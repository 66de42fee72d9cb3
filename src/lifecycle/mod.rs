//! Measurement lifecycle (§4.7): configuration validation, shared
//! status, signal-driven cooperative shutdown, and the orchestration
//! that ties the co-processor driver, sample pipeline, file writers,
//! and live view together for one measurement run.

pub mod daemon;
pub mod hardware;

use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};

use crate::ambient::{self, file::AmbientFile, sensor::I2cBus};
use crate::calibration::Calibration;
use crate::config::{Config, FileFormat};
use crate::error::{Error, Result};
use crate::file::{binary::BinaryFile, csv::CsvFile};
use crate::ipc::live_view::LiveViewProducer;
use crate::ipc::shm::{Shm, STATUS_KEY};
use crate::pipeline::Pipeline;
use crate::pru::{Driver, InterruptSource};
use crate::status::Status;

use hardware::HardwareControl;

pub const PID_PATH: &str = "/var/run/rocketlogger.pid";

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Signal-to-flag pattern (§9): the handler only sets an atomic flag,
/// all real work happens on the sample loop's next iteration.
extern "C" fn handle_shutdown_signal(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

pub fn install_signal_handlers() -> Result<()> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    let action = SigAction::new(SigHandler::Handler(handle_shutdown_signal), SaFlags::empty(), SigSet::empty());
    unsafe {
        sigaction(Signal::SIGINT, &action).map_err(Error::from)?;
        sigaction(Signal::SIGQUIT, &action).map_err(Error::from)?;
    }
    Ok(())
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

pub fn reset_shutdown_flag() {
    SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
}

pub fn write_pid_file(path: &str) -> Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))
        .map_err(|e| Error::resource("PID file", e))
}

pub fn remove_pid_file(path: &str) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("failed to remove PID file {}: {}", path, e);
    }
}

/// Mirrors `kinds` into the status segment's fixed-size sensor index
/// list, padding the remainder with `-1` (§3 `available_sensors`).
fn write_sensor_index(status: &mut Status, kinds: &[i32]) {
    for (slot, &kind) in status.sensor_index.iter_mut().zip(kinds.iter()) {
        *slot = kind;
    }
    for slot in status.sensor_index.iter_mut().skip(kinds.len()) {
        *slot = -1;
    }
}

enum FileSink {
    Binary(BinaryFile),
    Csv(CsvFile),
    None,
}

impl FileSink {
    fn open(config: &Config) -> Result<Self> {
        if !config.file_enable {
            return Ok(FileSink::None);
        }
        match config.file_format {
            FileFormat::Rld => Ok(FileSink::Binary(BinaryFile::create(&config.file_name, config)?)),
            FileFormat::Csv => Ok(FileSink::Csv(CsvFile::create(&config.file_name, config)?)),
        }
    }

    fn add_data_block(
        &mut self,
        timestamps: &crate::pru::Timestamps,
        rows: &[crate::pipeline::OutputRow],
    ) -> Result<()> {
        match self {
            FileSink::Binary(f) => f.add_data_block(timestamps, rows),
            FileSink::Csv(f) => f.add_data_block(timestamps, rows),
            FileSink::None => Ok(()),
        }
    }

    fn sync(&mut self) -> Result<()> {
        match self {
            FileSink::Binary(f) => f.sync(),
            FileSink::Csv(f) => f.sync(),
            FileSink::None => Ok(()),
        }
    }
}

/// Orchestrates one measurement end to end (§4.7). Generic over the
/// driver's interrupt source so tests can run the full lifecycle
/// against a scripted co-processor.
pub struct Measurement<I: InterruptSource> {
    config: Config,
    calibration: Calibration,
    driver: Driver<I>,
    hardware: Box<dyn HardwareControl>,
    bus: Box<dyn I2cBus>,
    status: Shm<Status>,
}

impl<I: InterruptSource> Measurement<I> {
    pub fn new(
        config: Config,
        calibration: Calibration,
        driver: Driver<I>,
        hardware: Box<dyn HardwareControl>,
        bus: Box<dyn I2cBus>,
        status: Shm<Status>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Measurement { config, calibration, driver, hardware, bus, status })
    }

    /// Runs start -> sample loop -> stop, honoring `SIGINT`/`SIGQUIT`
    /// cooperative shutdown (§4.7, §5, §8 invariant 8).
    pub fn run(&mut self) -> Result<()> {
        write_pid_file(PID_PATH)?;
        install_signal_handlers()?;
        reset_shutdown_flag();

        let result = self.run_inner();

        remove_pid_file(PID_PATH);
        result
    }

    fn run_inner(&mut self) -> Result<()> {
        self.hardware.start_clocks()?;
        for (port, &forced) in self.config.channel_force_range.iter().enumerate() {
            self.hardware.set_force_high(port, forced)?;
        }
        self.hardware.set_status_led(true)?;

        let mut ambient_registry = if self.config.ambient_enable {
            ambient::Registry::discover(self.bus.as_ref())
        } else {
            ambient::Registry::empty()
        };

        let mut ambient_file = if self.config.ambient_enable && !ambient_registry.is_empty() {
            let sensor_names: Vec<&str> = ambient_registry.names().collect();
            let path = ambient::file::ambient_path(&self.config.file_name);
            match AmbientFile::create(&path, &sensor_names) {
                Ok(f) => Some(f),
                Err(e) => {
                    error!("failed opening ambient file {}: {}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        let mut file_sink = FileSink::open(&self.config)?;
        let mut pipeline = Pipeline::new(&self.config, self.calibration);
        let web_channel_count = self.config.web_channel_count();
        let mut live_view = if self.config.web_enable {
            LiveViewProducer::create(web_channel_count).ok()
        } else {
            None
        };

        unsafe {
            let status = self.status.get_mut();
            status.sampling = true;
            status.error = false;
            status.config = (&self.config).into();
            status.sensor_count = ambient_registry.len() as u16;
            write_sensor_index(status, &ambient_registry.kind_indices());
        }

        let start_result = self.driver.start(&self.config);
        if let Err(e) = start_result {
            error!("co-processor failed to start: {}", e);
            self.hardware.set_error_led(true)?;
            unsafe {
                self.status.get_mut().error = true;
                self.status.get_mut().sampling = false;
            }
            return Err(e);
        }

        let mut block_index: u64 = 0;
        let config = self.config.clone();
        let status = &mut self.status;
        let bus = self.bus.as_ref();

        // A file write error is terminal (§4.3, §7): it must stop the
        // loop and flow into the error branch below, not just be
        // logged while sampling carries on. `should_continue` can't see
        // the error directly, so it's stashed here and checked there.
        let write_failure: std::cell::RefCell<Option<Error>> = std::cell::RefCell::new(None);

        let loop_result = self.driver.sample_loop(
            &config,
            || !shutdown_requested() && write_failure.borrow().is_none(),
            |block| {
                let processed = pipeline.process_block(block.rows);

                if let Err(e) = file_sink.add_data_block(&block.timestamps, &processed.rows) {
                    error!("write error, terminating measurement: {}", e);
                    *write_failure.borrow_mut() = Some(e);
                    return;
                }

                if let Some(producer) = live_view.as_mut() {
                    let timestamp_ms = block.timestamps.realtime.0 * 1000
                        + block.timestamps.realtime.1 / 1_000_000;
                    producer.publish(timestamp_ms, &processed.web_rows);
                }

                if let Some(values) = ambient::poll(&mut ambient_registry, bus, block_index, config.update_rate) {
                    if !values.is_empty() {
                        info!("ambient tick at block {}: {} sensors", block_index, values.len());
                        if let Some(ambient_file) = ambient_file.as_mut() {
                            let timestamp_ms = block.timestamps.realtime.0 * 1000
                                + block.timestamps.realtime.1 / 1_000_000;
                            if let Err(e) = ambient_file.append(timestamp_ms, &values) {
                                warn!("ambient file write failed: {}", e);
                            }
                        }
                    }
                }

                unsafe {
                    let s = status.get_mut();
                    s.sample_count += processed.sample_count;
                    s.buffer_count += 1;
                    s.sensor_count = ambient_registry.len() as u16;
                    write_sensor_index(s, &ambient_registry.kind_indices());
                }

                block_index += 1;
            },
        );

        let loop_result = match loop_result {
            Ok(()) => match write_failure.into_inner() {
                Some(e) => Err(e),
                None => Ok(()),
            },
            Err(e) => Err(e),
        };

        let _ = file_sink.sync();
        if let Some(ambient_file) = ambient_file.as_mut() {
            let _ = ambient_file.sync();
        }
        self.driver.stop()?;
        self.hardware.stop_clocks()?;
        self.hardware.set_status_led(false)?;

        match loop_result {
            Ok(()) => {
                unsafe {
                    self.status.get_mut().sampling = false;
                }
                Ok(())
            }
            Err(e) => {
                error!("measurement terminated with error: {}", e);
                self.hardware.set_error_led(true)?;
                unsafe {
                    let s = self.status.get_mut();
                    s.sampling = false;
                    s.error = true;
                }
                Err(e)
            }
        }
    }
}

pub fn open_status_shm() -> Result<Shm<Status>> {
    Shm::attach(STATUS_KEY)
}

pub fn create_status_shm() -> Result<Shm<Status>> {
    Shm::create(STATUS_KEY)
}
