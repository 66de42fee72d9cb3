//! The measurement status record (§3): lives in a process-wide shared
//! memory segment owned by the button daemon, read by the CLI and the
//! sampler, written only by the sampler (through [`crate::ipc::Shm`]).

use crate::config::Config;

pub const MAX_SENSORS: usize = 128;

/// Fixed-size, `Copy`-able snapshot of the instrument's current state.
/// No pointers, no `Vec` — this type is placed directly into a shared
/// memory segment and must be safe to `memcpy`.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Status {
    pub sampling: bool,
    pub error: bool,
    pub sample_count: u64,
    pub buffer_count: u32,
    pub calibration_time: u64,
    pub disk_free_bytes: u64,
    pub disk_free_permille: u16,
    /// Estimated bytes/second the current configuration will consume.
    pub disk_use_rate: u32,
    pub sensor_count: u16,
    pub sensor_index: [i32; MAX_SENSORS],
    pub config: ConfigSnapshot,
}

/// A `Copy`-friendly subset of [`Config`] embedded in the status record;
/// the full `Config` carries a `PathBuf`/`String` which cannot live
/// directly in shared memory, so only the scalar fields are mirrored.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct ConfigSnapshot {
    pub sample_rate: u32,
    pub update_rate: u32,
    pub channel_enable: [bool; crate::channel::ANALOG_CHANNEL_COUNT],
    pub digital_enable: bool,
    pub web_enable: bool,
    pub ambient_enable: bool,
}

impl From<&Config> for ConfigSnapshot {
    fn from(config: &Config) -> Self {
        ConfigSnapshot {
            sample_rate: config.sample_rate,
            update_rate: config.update_rate,
            channel_enable: config.channel_enable,
            digital_enable: config.digital_enable,
            web_enable: config.web_enable,
            ambient_enable: config.ambient_enable,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status {
            sampling: false,
            error: false,
            sample_count: 0,
            buffer_count: 0,
            calibration_time: 0,
            disk_free_bytes: 0,
            disk_free_permille: 0,
            disk_use_rate: 0,
            sensor_count: 0,
            sensor_index: [-1; MAX_SENSORS],
            config: ConfigSnapshot {
                sample_rate: 0,
                update_rate: 0,
                channel_enable: [false; crate::channel::ANALOG_CHANNEL_COUNT],
                digital_enable: false,
                web_enable: false,
                ambient_enable: false,
            },
        }
    }
}

impl Status {
    pub fn reset(&mut self) {
        *self = Status::default();
    }

    /// Renders the status the way the CLI's `status` command does.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "sampling": self.sampling,
            "error": self.error,
            "sample_count": self.sample_count,
            "buffer_count": self.buffer_count,
            "calibration_time": self.calibration_time,
            "disk_free_bytes": self.disk_free_bytes,
            "disk_free_permille": self.disk_free_permille,
            "disk_use_rate": self.disk_use_rate,
            "sensor_count": self.sensor_count,
        })
    }
}
