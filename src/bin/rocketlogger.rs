//! `rocketlogger` CLI (§4.7, §6): thin front for `start`/`stop`/`status`/
//! `config`, translating command-line flags into a validated [`Config`]
//! and driving one [`Measurement`] end to end.

use std::path::{Path, PathBuf};
use std::process;

use log::error;

use rocketlogger::ambient::i2c_dev::LinuxI2cBus;
use rocketlogger::ambient::sensor::{I2cBus, NullI2cBus};
use rocketlogger::ambient::AMBIENT_I2C_PATH;
use rocketlogger::calibration::Calibration;
use rocketlogger::channel::{AnalogChannel, ANALOG_CHANNEL_COUNT};
use rocketlogger::config::{AggregationMode, Config, FileFormat, SamplingMode};
use rocketlogger::error::{Error, Result};
use rocketlogger::lifecycle::hardware::{HardwareControl, NullHardware};
use rocketlogger::lifecycle::{self, Measurement};
use rocketlogger::pru::{Driver, UioInterrupt, PRU_UIO_PATH};

const CONFIG_SYSTEM_PATH: &str = "/etc/rocketlogger/settings.dat";
const CALIBRATION_PATH: &str = "/etc/rocketlogger/calibration.dat";

fn config_user_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => Path::new(&home).join(".config/rocketlogger/settings.dat"),
        None => PathBuf::from(CONFIG_SYSTEM_PATH),
    }
}

/// Parses a byte count with an optional SI suffix k/M/G/T (§6), e.g.
/// `"100M"` -> 100_000_000.
fn parse_size(text: &str) -> Result<u64> {
    let (digits, multiplier) = match text.chars().last() {
        Some('k') | Some('K') => (&text[..text.len() - 1], 1_000),
        Some('M') => (&text[..text.len() - 1], 1_000_000),
        Some('G') => (&text[..text.len() - 1], 1_000_000_000),
        Some('T') => (&text[..text.len() - 1], 1_000_000_000_000),
        _ => (text, 1),
    };
    digits
        .parse::<u64>()
        .map(|n| n * multiplier)
        .map_err(|_| Error::configuration(format!("invalid size '{}'", text)))
}

fn parse_channel_list(text: &str, enable: &mut [bool; ANALOG_CHANNEL_COUNT]) -> Result<()> {
    if text.eq_ignore_ascii_case("all") {
        *enable = [true; ANALOG_CHANNEL_COUNT];
        return Ok(());
    }
    *enable = [false; ANALOG_CHANNEL_COUNT];
    for name in text.split(',') {
        let channel = match name.trim().to_ascii_uppercase().as_str() {
            "V1" => AnalogChannel::V1,
            "V2" => AnalogChannel::V2,
            "V3" => AnalogChannel::V3,
            "V4" => AnalogChannel::V4,
            "I1L" => AnalogChannel::I1L,
            "I1H" => AnalogChannel::I1H,
            "I2L" => AnalogChannel::I2L,
            "I2H" => AnalogChannel::I2H,
            other => return Err(Error::configuration(format!("unknown channel '{}'", other))),
        };
        enable[channel.index()] = true;
    }
    Ok(())
}

/// Parses the shared option set used by `start` and `config` (§6).
fn apply_options(config: &mut Config, args: &[String]) -> Result<bool> {
    let mut background = false;
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        let mut next = || {
            i += 1;
            args.get(i).cloned().ok_or_else(|| Error::configuration(format!("{} requires a value", arg)))
        };
        match arg {
            "--rate" | "-r" => {
                config.sample_rate = next()?
                    .parse()
                    .map_err(|_| Error::configuration("invalid --rate"))?;
            }
            "--update-rate" | "-u" => {
                config.update_rate = next()?
                    .parse()
                    .map_err(|_| Error::configuration("invalid --update-rate"))?;
            }
            "--channel" | "-ch" => {
                parse_channel_list(&next()?, &mut config.channel_enable)?;
            }
            "--force-high" => {
                for name in next()?.split(',') {
                    match name.trim().to_ascii_uppercase().as_str() {
                        "I1" => config.channel_force_range[0] = true,
                        "I2" => config.channel_force_range[1] = true,
                        other => return Err(Error::configuration(format!("unknown port '{}'", other))),
                    }
                }
            }
            "--aggregation" => {
                config.aggregation_mode = match next()?.as_str() {
                    "average" => AggregationMode::Average,
                    "downsample" => AggregationMode::Downsample,
                    other => return Err(Error::configuration(format!("unknown aggregation mode '{}'", other))),
                };
            }
            "--digital" => config.digital_enable = true,
            "--no-digital" => config.digital_enable = false,
            "--web" => config.web_enable = true,
            "--no-web" => config.web_enable = false,
            "--ambient" => config.ambient_enable = true,
            "--no-ambient" => config.ambient_enable = false,
            "--calibration-ignore" => config.calibration_ignore = true,
            "--file" | "-f" => config.file_name = PathBuf::from(next()?),
            "--no-file" => config.file_enable = false,
            "--format" => {
                config.file_format = match next()?.as_str() {
                    "binary" | "rld" => FileFormat::Rld,
                    "csv" => FileFormat::Csv,
                    other => return Err(Error::configuration(format!("unknown file format '{}'", other))),
                };
            }
            "--size" => config.file_size = parse_size(&next()?)?,
            "--comment" => config.comment = next()?,
            "--samples" => {
                config.sample_limit = next()?
                    .parse()
                    .map_err(|_| Error::configuration("invalid --samples"))?;
                config.sampling_mode = SamplingMode::Finite;
            }
            "--continuous" => {
                config.sample_limit = 0;
                config.sampling_mode = SamplingMode::Continuous;
            }
            "--meter" => config.sampling_mode = SamplingMode::Meter,
            "--background" => background = true,
            other => return Err(Error::configuration(format!("unrecognized option '{}'", other))),
        }
        i += 1;
    }
    Ok(background)
}

fn base_config() -> Config {
    Config::read_default(&config_user_path(), Path::new(CONFIG_SYSTEM_PATH)).unwrap_or_default()
}

fn build_ambient_bus(config: &Config) -> Box<dyn I2cBus> {
    if config.ambient_enable {
        match LinuxI2cBus::open(Path::new(AMBIENT_I2C_PATH)) {
            Ok(bus) => Box::new(bus),
            Err(e) => {
                error!("failed opening ambient I2C bus {}: {}", AMBIENT_I2C_PATH, e);
                Box::new(NullI2cBus)
            }
        }
    } else {
        Box::new(NullI2cBus)
    }
}

fn cmd_start(args: &[String]) -> Result<()> {
    let mut config = base_config();
    let background = apply_options(&mut config, args)?;
    config.validate()?;

    if background {
        lifecycle::daemon::daemonize()?;
    }

    let calibration = Calibration::load_or_identity(Path::new(CALIBRATION_PATH), config.calibration_ignore);
    let interrupts = UioInterrupt::open(Path::new(PRU_UIO_PATH))?;
    let driver = Driver::new(interrupts, config.native_samples_per_block() as usize);
    // GPIO/PWM wiring is an external collaborator (§1): no concrete
    // implementation ships with this crate, only the interface.
    let hardware: Box<dyn HardwareControl> = Box::new(NullHardware::default());
    let bus = build_ambient_bus(&config);
    let status = lifecycle::create_status_shm()?;

    let mut measurement = Measurement::new(config, calibration, driver, hardware, bus, status)?;
    measurement.run()
}

fn cmd_stop() -> Result<()> {
    let pid_text = std::fs::read_to_string(lifecycle::PID_PATH).map_err(Error::from)?;
    let pid: libc::pid_t = pid_text
        .trim()
        .parse()
        .map_err(|_| Error::configuration("malformed PID file"))?;
    if unsafe { libc::kill(pid, libc::SIGINT) } != 0 {
        return Err(Error::errno("failed signaling running measurement"));
    }
    Ok(())
}

fn cmd_status(json: bool) -> Result<()> {
    let shm = lifecycle::open_status_shm()?;
    let status = unsafe { *shm.get() };
    if json {
        println!("{}", status.to_json());
    } else {
        println!(
            "sampling={} error={} samples={} buffers={} sensors={}",
            status.sampling, status.error, status.sample_count, status.buffer_count, status.sensor_count
        );
    }
    Ok(())
}

fn cmd_config(args: &[String], json: bool) -> Result<()> {
    let mut config = base_config();
    apply_options(&mut config, args)?;
    config.validate()?;
    config.write_default(&config_user_path())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config).unwrap_or_default());
    } else {
        println!("{:#?}", config);
    }
    Ok(())
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, rest) = args.split_first().ok_or_else(|| {
        Error::configuration("usage: rocketlogger <start|stop|status|config> [options]")
    })?;

    match command.as_str() {
        "start" => cmd_start(rest),
        "stop" => cmd_stop(),
        "status" => cmd_status(rest.iter().any(|a| a == "--json")),
        "config" => cmd_config(rest, rest.iter().any(|a| a == "--json")),
        other => Err(Error::configuration(format!("unknown command '{}'", other))),
    }
}

fn main() {
    let _ = rocketlogger::logging::init();

    if let Err(e) = run() {
        error!("{}", e);
        eprintln!("rocketlogger: {}", e);
        let code = match &e {
            Error::Errno { errno, .. } => *errno,
            _ => 1,
        };
        process::exit(code);
    }
}
