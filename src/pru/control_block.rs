//! Co-processor control block (§3): the fixed layout at the start of the
//! PRU's data RAM. Host writes it once before start and may flip `state`
//! back to `Off` to request a stop; the co-processor polls `state` on
//! its own schedule. Layout is bit-exact — both sides agree on it
//! without a shared header, so every field is a fixed-width integer.

/// Maximum ADC front-end commands the control block can carry: reset,
/// SDATAC, one WREG per gain register, one gain write per analog
/// channel, and RDATAC to resume continuous conversion.
pub const MAX_ADC_COMMANDS: usize = 16;

/// Sampling resolution the ADC front end is programmed for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Precision {
    Bits16 = 16,
    Bits24 = 24,
}

/// PRU-visible sampling state. Values match the firmware's register
/// protocol exactly (including the gap at 2, reserved by the firmware
/// for a half-started transitional state this driver never writes).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum PruState {
    Off = 0,
    SampleFinite = 1,
    SampleContinuous = 3,
}

/// The fixed-layout region the host writes at the start of co-processor
/// data RAM before starting the firmware (§3). `#[repr(C)]` because its
/// byte layout is part of the host/co-processor contract.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PruControlBlock {
    pub state: u32,
    pub precision: u32,
    pub buffer0_addr: u32,
    pub buffer1_addr: u32,
    /// Samples per block (i.e. per buffer half).
    pub buffer_length: u32,
    pub sample_limit: u64,
    pub adc_command_count: u32,
    pub adc_commands: [u32; MAX_ADC_COMMANDS],
}

impl PruControlBlock {
    pub fn zeroed() -> Self {
        PruControlBlock {
            state: PruState::Off as u32,
            precision: Precision::Bits24 as u32,
            buffer0_addr: 0,
            buffer1_addr: 0,
            buffer_length: 0,
            sample_limit: 0,
            adc_command_count: 0,
            adc_commands: [0; MAX_ADC_COMMANDS],
        }
    }

    pub fn set_state(&mut self, state: PruState) {
        self.state = state as u32;
    }
}

/// One row of raw ADC output as the co-processor writes it: a 32-bit
/// digital word followed by 8 signed 32-bit analog words. Bit-exact
/// with the firmware's sample shape (§3).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct RawSample {
    pub digital: u32,
    pub analog: [i32; crate::channel::ANALOG_CHANNEL_COUNT],
}
