//! `rld-buttond` (§4.7): long-running daemon owning the cape's
//! power-enable line and dispatching button presses into
//! `rocketlogger start`/`stop`, a daemon shutdown, or a reboot.

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{info, warn};

use rocketlogger::error::Result;
use rocketlogger::lifecycle::daemon::{self, ButtonAction};
use rocketlogger::lifecycle::hardware::{HardwareControl, NullHardware};
use rocketlogger::lifecycle::{self as lifecycle_mod};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigterm(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

fn install_sigterm_handler() -> Result<()> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    let action = SigAction::new(SigHandler::Handler(handle_sigterm), SaFlags::empty(), SigSet::empty());
    unsafe {
        sigaction(Signal::SIGTERM, &action).map_err(rocketlogger::error::Error::from)?;
    }
    Ok(())
}

/// Blocks until the status segment reports no measurement running, or
/// until it cannot be read at all (nothing to wait for then). Shutdown
/// and reboot are deferred this way rather than cutting power out from
/// under an in-progress sample loop (§4.7).
fn wait_for_measurement_stopped() {
    while lifecycle_mod::open_status_shm()
        .map(|shm| unsafe { (*shm.get()).sampling })
        .unwrap_or(false)
    {
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn run() -> Result<()> {
    install_sigterm_handler()?;

    // GPIO wiring is an external collaborator (§1); a real deployment
    // links a board-specific implementation in its place.
    let mut hardware: Box<dyn HardwareControl> = Box::new(NullHardware::default());
    hardware.set_power_enable(true)?;
    info!("button daemon started, cape power enabled");

    while !SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
        match daemon::watch_once(hardware.as_ref(), POLL_INTERVAL) {
            Ok(ButtonAction::ToggleMeasurement) => {
                let sampling = lifecycle_mod::open_status_shm()
                    .map(|shm| unsafe { (*shm.get()).sampling })
                    .unwrap_or(false);
                if let Err(e) = daemon::dispatch_toggle(sampling) {
                    warn!("button dispatch failed: {}", e);
                }
            }
            Ok(ButtonAction::ShutdownDaemon) => {
                info!("button daemon shutdown requested, waiting for any running measurement");
                wait_for_measurement_stopped();
                break;
            }
            Ok(ButtonAction::Reboot) => {
                info!("reboot requested, waiting for any running measurement");
                wait_for_measurement_stopped();
                daemon::request_reboot();
                break;
            }
            Err(e) => {
                warn!("button watch failed, retrying: {}", e);
            }
        }
    }

    hardware.set_power_enable(false)?;
    Ok(())
}

fn main() {
    let _ = rocketlogger::logging::init();

    if let Err(e) = run() {
        log::error!("{}", e);
        eprintln!("rld-buttond: {}", e);
        process::exit(1);
    }
}
