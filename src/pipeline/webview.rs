//! Live-view aggregation (§4.2 step 5): three cascaded mean-downsample
//! windows (100-sample, 10-sample, 1-sample) feeding one another, each
//! closing into a dual-range-merged row for its ring buffer tier.

use crate::channel::AnalogChannel;
use crate::config::Config;

/// Window sizes for the three ring-buffer tiers, outermost first: the
/// 1s/div tier closes every 100 native output samples, the 10s/div
/// tier every 10 closes of the first, the 100s/div tier every 10
/// closes of the second.
pub const TIER_WINDOWS: [u32; 3] = [100, 10, 10];

struct MeanWindow {
    size: u32,
    count: u32,
    analog_sum: Vec<i64>,
    digital_and: u32,
}

impl MeanWindow {
    fn new(size: u32, channel_count: usize) -> Self {
        MeanWindow { size, count: 0, analog_sum: vec![0; channel_count], digital_and: !0 }
    }

    /// Returns the window's mean row once `size` inputs have closed it.
    fn push(&mut self, digital: u32, analog: &[i64]) -> Option<(u32, Vec<i64>)> {
        self.digital_and &= digital;
        for (sum, &value) in self.analog_sum.iter_mut().zip(analog) {
            *sum += value;
        }
        self.count += 1;
        if self.count < self.size {
            return None;
        }
        let digital_out = self.digital_and;
        let analog_out: Vec<i64> =
            self.analog_sum.iter().map(|&sum| sum / self.size as i64).collect();
        self.count = 0;
        self.digital_and = !0;
        for slot in self.analog_sum.iter_mut() {
            *slot = 0;
        }
        Some((digital_out, analog_out))
    }
}

/// One closed window's merged output, ready for a ring buffer row.
#[derive(Clone, Debug, PartialEq)]
pub struct WebRow {
    pub values: Vec<i64>,
}

/// Cascades native-rate rows through the three window tiers and merges
/// dual-range currents at each tier boundary (§4.2 step 5).
pub struct WebViewAggregator {
    windows: [MeanWindow; 3],
    enabled: Vec<AnalogChannel>,
    digital_enable: bool,
}

impl WebViewAggregator {
    pub fn new(config: &Config) -> Self {
        let enabled: Vec<AnalogChannel> = config.enabled_analog_channels().collect();
        let channel_count = enabled.len();
        WebViewAggregator {
            windows: [
                MeanWindow::new(TIER_WINDOWS[0], channel_count),
                MeanWindow::new(TIER_WINDOWS[1], channel_count),
                MeanWindow::new(TIER_WINDOWS[2], channel_count),
            ],
            enabled,
            digital_enable: config.digital_enable,
        }
    }

    /// Feeds one output-rate sample (after §4.2 steps 2-3). Returns one
    /// merged row per tier that closed on this push, outermost first.
    pub fn push(&mut self, digital: u32, analog: &[i32]) -> Vec<WebRow> {
        let mut rows = Vec::new();
        let mut current: Option<(u32, Vec<i64>)> =
            Some((digital, analog.iter().map(|&v| v as i64).collect()));

        for window in self.windows.iter_mut() {
            let (d, a) = match current {
                Some(pair) => pair,
                None => break,
            };
            match window.push(d, &a) {
                Some((closed_digital, closed_analog)) => {
                    rows.push(WebRow { values: self.merge(closed_digital, &closed_analog) });
                    current = Some((closed_digital, closed_analog));
                }
                None => current = None,
            }
        }
        rows
    }

    /// Range-merge (§4.2 step 5) plus digital passthrough, producing the
    /// fixed-width row a ring buffer element holds.
    fn merge(&self, digital: u32, analog: &[i64]) -> Vec<i64> {
        let mut out = Vec::new();

        for &ch in &self.enabled {
            if ch.unit() == crate::channel::Unit::Volt {
                let idx = self.enabled.iter().position(|&c| c == ch).unwrap();
                out.push(analog[idx]);
            }
        }

        // Valid bits sit immediately above the digital inputs only when
        // those are actually packed into the word, otherwise starting at
        // bit 0; each one advances the cursor only if its own low-range
        // channel is enabled — this must track `pack_digital_word`'s
        // shifting offset exactly, bit for bit.
        let mut valid_bit = if self.digital_enable { crate::channel::DIGITAL_CHANNEL_COUNT as u32 } else { 0 };

        for (low, high) in [(AnalogChannel::I1L, AnalogChannel::I1H), (AnalogChannel::I2L, AnalogChannel::I2H)] {
            let low_enabled = self.enabled.contains(&low);
            let high_enabled = self.enabled.contains(&high);
            if !low_enabled && !high_enabled {
                continue;
            }
            let low_value = low_enabled
                .then(|| analog[self.enabled.iter().position(|&c| c == low).unwrap()]);
            let high_value = high_enabled
                .then(|| analog[self.enabled.iter().position(|&c| c == high).unwrap()]);

            let merged = match (low_value, high_value) {
                (Some(lv), Some(hv)) => {
                    let valid = (digital >> valid_bit) & 1 != 0;
                    if valid { lv } else { hv * 100 }
                }
                (Some(lv), None) => lv,
                (None, Some(hv)) => hv * 100,
                (None, None) => unreachable!("checked above"),
            };
            out.push(merged);
            if low_enabled {
                valid_bit += 1;
            }
        }

        if self.digital_enable {
            for bit in 0..crate::channel::DIGITAL_CHANNEL_COUNT {
                out.push(((digital >> bit) & 1) as i64);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config_with(channels: &[AnalogChannel]) -> Config {
        let mut cfg = Config::default();
        cfg.channel_enable = [false; crate::channel::ANALOG_CHANNEL_COUNT];
        for &ch in channels {
            cfg.channel_enable[ch.index()] = true;
        }
        cfg.digital_enable = false;
        cfg
    }

    #[test]
    fn merges_to_low_range_when_valid_bit_set_for_whole_window() {
        let cfg = config_with(&[AnalogChannel::I1H, AnalogChannel::I1L]);
        let mut agg = WebViewAggregator::new(&cfg);

        // `enabled` follows fixed channel order (I1L, I1H) regardless of
        // the order passed to `config_with`; with digital disabled the
        // I1L valid bit sits at bit 0, set for every sample.
        let mut rows = Vec::new();
        for _ in 0..100 {
            rows.extend(agg.push(0b01, &[400, 500]));
        }
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values, vec![400]);
    }

    #[test]
    fn falls_back_to_scaled_high_range_when_valid_bit_drops() {
        let cfg = config_with(&[AnalogChannel::I1H, AnalogChannel::I1L]);
        let mut agg = WebViewAggregator::new(&cfg);

        let mut rows = Vec::new();
        for i in 0..100 {
            let digital = if i < 99 { 0b01 } else { 0 };
            rows.extend(agg.push(digital, &[400, 500]));
        }
        assert_eq!(rows[0].values, vec![50_000]);
    }

    #[test]
    fn voltage_channels_pass_through_unmerged() {
        let cfg = config_with(&[AnalogChannel::V1]);
        let mut agg = WebViewAggregator::new(&cfg);
        let mut rows = Vec::new();
        for _ in 0..100 {
            rows.extend(agg.push(0, &[1234]));
        }
        assert_eq!(rows[0].values, vec![1234]);
    }
}
