//! Sample pipeline (§4.2): turns one raw co-processor block into file
//! rows and live-view rows. Pure, synchronous, single-threaded by
//! design — called directly from the driver's `sample_loop` (§5).

pub mod aggregate;
pub mod webview;

use crate::calibration::Calibration;
use crate::channel::{AnalogChannel, DIGITAL_CHANNEL_COUNT};
use crate::config::Config;
use crate::pru::control_block::RawSample;

use aggregate::Accumulator;
use webview::{WebRow, WebViewAggregator};

/// Raw digital input bits occupy bits 0..5 of the co-processor's word.
const DIGITAL_INPUT_MASK: u32 = 0x3F;
/// The co-processor reports range validity active-low on these two
/// bits; bit 6 is I1L's companion, bit 7 is I2L's (§4.2 step 2).
const RAW_VALID_BIT_I1L: u32 = 1 << 6;
const RAW_VALID_BIT_I2L: u32 = 1 << 7;

/// One emitted output row: the packed digital word (absent unless
/// digital reporting or a range-valid bit is active) and one calibrated
/// value per enabled analog channel, in channel order.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputRow {
    pub digital: Option<u32>,
    pub analog: Vec<i32>,
}

/// Everything produced from one raw block: output-rate rows for the
/// file writer, and live-view rows for each ring-buffer tier.
pub struct ProcessedBlock {
    pub rows: Vec<OutputRow>,
    pub web_rows: [Vec<WebRow>; 3],
    /// Blocks lost to a buffer-index mismatch are reported separately by
    /// the driver; this field only reflects §4.2's own bookkeeping.
    pub sample_count: u64,
}

/// Packs the digital output word per §4.2 step 2: DI1..DI6 in bits 0..5
/// (present iff digital reporting is enabled), then the I1L/I2L
/// range-valid bits immediately above (present iff that low-range
/// channel is enabled). The raw valid signal is active-low, so the
/// stored bit is its logical complement.
fn pack_digital_word(raw: &RawSample, digital_enable: bool, low_range_enabled: [bool; 2]) -> u32 {
    let mut bit = 0u32;
    let mut word = 0u32;

    if digital_enable {
        word |= raw.digital & DIGITAL_INPUT_MASK;
        bit = DIGITAL_CHANNEL_COUNT as u32;
    }
    if low_range_enabled[0] {
        let valid = (raw.digital & RAW_VALID_BIT_I1L) == 0;
        word |= (valid as u32) << bit;
        bit += 1;
    }
    if low_range_enabled[1] {
        let valid = (raw.digital & RAW_VALID_BIT_I2L) == 0;
        word |= (valid as u32) << bit;
    }
    word
}

pub struct Pipeline {
    calibration: Calibration,
    enabled: Vec<AnalogChannel>,
    digital_enable: bool,
    low_range_enabled: [bool; 2],
    accumulator: Accumulator,
    webview: WebViewAggregator,
    web_enable: bool,
}

impl Pipeline {
    pub fn new(config: &Config, calibration: Calibration) -> Self {
        let enabled: Vec<AnalogChannel> = config.enabled_analog_channels().collect();
        Pipeline {
            calibration,
            low_range_enabled: [
                config.channel_enable[AnalogChannel::I1L.index()],
                config.channel_enable[AnalogChannel::I2L.index()],
            ],
            digital_enable: config.digital_enable,
            accumulator: Accumulator::new(
                config.aggregation_factor(),
                config.aggregation_mode,
                enabled.len(),
            ),
            webview: WebViewAggregator::new(config),
            web_enable: config.web_enable,
            enabled,
        }
    }

    /// Runs §4.2 steps 2-5 over one raw block's rows.
    pub fn process_block(&mut self, raw_rows: &[RawSample]) -> ProcessedBlock {
        let mut rows = Vec::new();
        let mut web_rows: [Vec<WebRow>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        let has_digital_word = self.digital_enable || self.low_range_enabled.iter().any(|&e| e);

        for raw in raw_rows {
            let digital = pack_digital_word(raw, self.digital_enable, self.low_range_enabled);
            let analog: Vec<i32> = self
                .enabled
                .iter()
                .map(|ch| self.calibration.apply(ch.index(), raw.analog[ch.index()]))
                .collect();

            if let Some((agg_digital, agg_analog)) = self.accumulator.push(digital, &analog) {
                if self.web_enable {
                    for (tier, tier_rows) in self.webview.push(agg_digital, &agg_analog).into_iter().zip(
                        web_rows.iter_mut(),
                    ) {
                        tier_rows.push(tier);
                    }
                }
                rows.push(OutputRow {
                    digital: if has_digital_word { Some(agg_digital) } else { None },
                    analog: agg_analog,
                });
            }
        }

        let sample_count = rows.len() as u64;
        ProcessedBlock { rows, web_rows, sample_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregationMode;

    fn raw(analog: [i32; 8], digital: u32) -> RawSample {
        RawSample { digital, analog }
    }

    #[test]
    fn full_rate_block_emits_one_row_per_sample() {
        let mut cfg = Config::default();
        cfg.sample_rate = 1000;
        cfg.update_rate = 1;
        cfg.digital_enable = false;
        cfg.channel_enable = [true; 8];

        let mut pipeline = Pipeline::new(&cfg, Calibration::default());
        let rows: Vec<RawSample> = (0..1000).map(|_| raw([1; 8], 0)).collect();
        let processed = pipeline.process_block(&rows);
        assert_eq!(processed.sample_count, 1000);
    }

    #[test]
    fn sub_native_rate_aggregates_down() {
        let mut cfg = Config::default();
        cfg.sample_rate = 100;
        cfg.update_rate = 1;
        cfg.aggregation_mode = AggregationMode::Average;
        cfg.digital_enable = false;
        cfg.channel_enable = [true, false, false, false, false, false, false, false];

        let mut pipeline = Pipeline::new(&cfg, Calibration::default());
        let rows: Vec<RawSample> = (0..100).map(|_| raw([0x1000, 0, 0, 0, 0, 0, 0, 0], 0)).collect();
        let processed = pipeline.process_block(&rows);
        assert_eq!(processed.sample_count, 10);
        assert_eq!(processed.rows[0].analog, vec![0x1000]);
    }

    #[test]
    fn digital_word_absent_when_nothing_selects_it() {
        let mut cfg = Config::default();
        cfg.digital_enable = false;
        cfg.channel_enable = [true, false, false, false, false, false, false, false];
        let mut pipeline = Pipeline::new(&cfg, Calibration::default());
        let processed = pipeline.process_block(&[raw([0; 8], 0)]);
        assert_eq!(processed.rows[0].digital, None);
    }
}
