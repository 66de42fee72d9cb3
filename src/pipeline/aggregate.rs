//! Sub-native-rate aggregation (§4.2 step 3): folds `factor` consecutive
//! 1 kHz native samples into one output sample when the configured
//! sample rate is below the ADC's native rate.

use crate::config::AggregationMode;

/// Accumulates native samples into one output row per window. The
/// digital word is AND-reduced (a bit survives only if set in every
/// sample of the window) regardless of aggregation mode, matching the
/// conservative valid-bit semantics range-merge depends on (§4.2 step 5).
pub struct Accumulator {
    factor: u32,
    mode: AggregationMode,
    count: u32,
    analog_sum: Vec<i64>,
    digital_and: u32,
    channel_count: usize,
}

impl Accumulator {
    pub fn new(factor: u32, mode: AggregationMode, channel_count: usize) -> Self {
        Accumulator {
            factor,
            mode,
            count: 0,
            analog_sum: vec![0; channel_count],
            digital_and: !0,
            channel_count,
        }
    }

    /// Feeds one native sample. Returns the window's output row once
    /// `factor` samples have been folded in.
    pub fn push(&mut self, digital: u32, analog: &[i32]) -> Option<(u32, Vec<i32>)> {
        debug_assert_eq!(analog.len(), self.channel_count);

        self.digital_and &= digital;
        match self.mode {
            AggregationMode::Average => {
                for (sum, &value) in self.analog_sum.iter_mut().zip(analog) {
                    *sum += value as i64;
                }
            }
            AggregationMode::Downsample => {
                if self.count == 0 {
                    // First sample of the window is the one kept: file
                    // index k must equal native input index k * factor.
                    self.analog_sum.copy_from_slice(
                        &analog.iter().map(|&v| v as i64).collect::<Vec<_>>(),
                    );
                }
            }
        }
        self.count += 1;

        if self.count < self.factor {
            return None;
        }

        let digital_out = self.digital_and;
        let analog_out: Vec<i32> = match self.mode {
            AggregationMode::Average => self
                .analog_sum
                .iter()
                .map(|&sum| (sum / self.factor as i64) as i32)
                .collect(),
            AggregationMode::Downsample => {
                self.analog_sum.iter().map(|&v| v as i32).collect()
            }
        };

        self.count = 0;
        self.digital_and = !0;
        for slot in self.analog_sum.iter_mut() {
            *slot = 0;
        }

        Some((digital_out, analog_out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_truncates_toward_zero() {
        let mut acc = Accumulator::new(10, AggregationMode::Average, 1);
        let mut last = None;
        for _ in 0..10 {
            last = acc.push(0xFF, &[0x1000]);
        }
        assert_eq!(last, Some((0xFF, vec![0x1000])));
    }

    #[test]
    fn average_divides_with_truncation() {
        let mut acc = Accumulator::new(3, AggregationMode::Average, 1);
        acc.push(0, &[1]);
        acc.push(0, &[1]);
        let out = acc.push(0, &[2]).unwrap();
        // (1 + 1 + 2) / 3 = 1 (truncated, not rounded to 1.33 -> 1 anyway)
        assert_eq!(out.1, vec![1]);
    }

    #[test]
    fn digital_and_reduce_drops_bit_not_set_throughout() {
        let mut acc = Accumulator::new(2, AggregationMode::Average, 1);
        acc.push(0b11, &[0]);
        let (digital, _) = acc.push(0b01, &[0]).unwrap();
        assert_eq!(digital, 0b01);
    }

    #[test]
    fn downsample_keeps_first_sample_of_window() {
        let mut acc = Accumulator::new(4, AggregationMode::Downsample, 1);
        acc.push(0, &[10]);
        acc.push(0, &[20]);
        acc.push(0, &[30]);
        let (_, analog) = acc.push(0, &[40]).unwrap();
        assert_eq!(analog, vec![10]);
    }

    #[test]
    fn downsample_property_matches_first_native_sample() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let factor = 8;
        for _ in 0..50 {
            let mut acc = Accumulator::new(factor, AggregationMode::Downsample, 1);
            let samples: Vec<i32> = (0..factor).map(|_| rng.gen_range(-1_000_000, 1_000_000)).collect();
            let mut out = None;
            for &s in &samples {
                out = acc.push(0, &[s]);
            }
            assert_eq!(out.unwrap().1, vec![*samples.first().unwrap()]);
        }
    }

    #[test]
    fn average_property_matches_truncated_mean() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let factor = 7;
        for _ in 0..50 {
            let mut acc = Accumulator::new(factor, AggregationMode::Average, 1);
            let samples: Vec<i32> = (0..factor).map(|_| rng.gen_range(-1_000_000, 1_000_000)).collect();
            let mut out = None;
            for &s in &samples {
                out = acc.push(0, &[s]);
            }
            let sum: i64 = samples.iter().map(|&v| v as i64).sum();
            let expected = (sum / factor as i64) as i32;
            assert_eq!(out.unwrap().1, vec![expected]);
        }
    }
}
