//! Background daemonization and the button daemon (§4.7): the CLI's
//! `daemon(1, 1)`-equivalent backgrounding, and the long-running
//! process that turns button presses into `start`/`stop`/shutdown.

use std::process::Command;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::error::{Error, Result};

use super::hardware::HardwareControl;

/// Equivalent of POSIX `daemon(1, 1)`: fork, detach from the
/// controlling terminal, keep the working directory and stdio as-is
/// (both `nochdir` and `noclose` arguments are `1`). Called between the
/// co-processor's first successful interrupt and entering the sample
/// loop, so the parent only returns once the measurement is confirmed
/// running (§4.7).
pub fn daemonize() -> Result<()> {
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(Error::errno("fork failed while backgrounding"));
    }
    if pid > 0 {
        std::process::exit(0);
    }
    if unsafe { libc::setsid() } < 0 {
        return Err(Error::errno("setsid failed while backgrounding"));
    }
    Ok(())
}

/// A single press-and-release, in button-GPIO-debounced time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ButtonAction {
    ToggleMeasurement,
    ShutdownDaemon,
    Reboot,
}

const SHORT_PRESS_MAX: Duration = Duration::from_secs(3);
const LONG_PRESS_MAX: Duration = Duration::from_secs(10);

/// Duration-keyed dispatch (§4.7): release within 3s toggles the
/// measurement, 3-10s requests a daemon shutdown, beyond 10s a reboot
/// — both deferred until any running measurement stops.
pub fn classify_press(held_for: Duration) -> ButtonAction {
    if held_for <= SHORT_PRESS_MAX {
        ButtonAction::ToggleMeasurement
    } else if held_for <= LONG_PRESS_MAX {
        ButtonAction::ShutdownDaemon
    } else {
        ButtonAction::Reboot
    }
}

/// Runs `rocketlogger start` or `stop` depending on the status
/// segment's current `sampling` flag.
pub fn dispatch_toggle(sampling: bool) -> Result<()> {
    let command = if sampling { "stop" } else { "start" };
    info!("button press: dispatching `rocketlogger {}`", command);
    Command::new("rocketlogger")
        .arg(command)
        .status()
        .map_err(|e| Error::resource("rocketlogger subprocess", e))?;
    Ok(())
}

/// One iteration of the button watcher's main loop: waits (blocking,
/// uninterruptible except by `SIGTERM`, per §4.7) for a press, times
/// the hold, and dispatches the corresponding action once released.
pub fn watch_once(hardware: &dyn HardwareControl, poll_interval: Duration) -> Result<ButtonAction> {
    while !hardware.read_button()? {
        std::thread::sleep(poll_interval);
    }
    let pressed_at = Instant::now();
    while hardware.read_button()? {
        std::thread::sleep(poll_interval);
    }
    Ok(classify_press(pressed_at.elapsed()))
}

/// Requests the button daemon exit after any currently running
/// measurement has stopped (§4.7). `SIGTERM` is the only other way to
/// stop it.
pub fn request_reboot() {
    warn!("button daemon requested system reboot");
    if let Err(e) = Command::new("reboot").status() {
        warn!("failed to invoke reboot: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_press_durations() {
        assert_eq!(classify_press(Duration::from_secs(1)), ButtonAction::ToggleMeasurement);
        assert_eq!(classify_press(Duration::from_secs(5)), ButtonAction::ShutdownDaemon);
        assert_eq!(classify_press(Duration::from_secs(15)), ButtonAction::Reboot);
    }

    #[test]
    fn boundary_durations_fall_in_the_lower_bucket() {
        assert_eq!(classify_press(SHORT_PRESS_MAX), ButtonAction::ToggleMeasurement);
        assert_eq!(classify_press(LONG_PRESS_MAX), ButtonAction::ShutdownDaemon);
    }
}
