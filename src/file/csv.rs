//! CSV file sibling (§4.3, §6): a human-readable rendering of the same
//! logical stream. Not expected to round-trip numerically — the binary
//! file is the authoritative stream (§9).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::file::build_channel_descriptors;
use crate::pipeline::OutputRow;
use crate::pru::Timestamps;

pub struct CsvFile {
    file: File,
    has_digital_column: bool,
}

impl CsvFile {
    pub fn create(path: &Path, config: &Config) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::resource("csv file", e))?;

        let descriptors = build_channel_descriptors(config);
        let has_digital_column = descriptors.iter().any(|d| d.data_size == 0);

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        writeln!(
            file,
            "# RocketLogger CSV, version {}, block_size={}, sample_rate={}, start_time={}.{:09}",
            crate::file::FILE_VERSION,
            config.native_samples_per_block() / config.aggregation_factor().max(1),
            config.sample_rate,
            now.as_secs(),
            now.subsec_nanos()
        )
        .map_err(|e| Error::resource("csv file", e))?;
        writeln!(file, "# {}", config.comment).map_err(|e| Error::resource("csv file", e))?;

        let header: Vec<String> = descriptors
            .iter()
            .map(|d| format!("{}[{:?}]", d.name, d.unit))
            .collect();
        let mut columns = vec!["time".to_owned()];
        columns.extend(header);
        writeln!(file, "{}", columns.join(",")).map_err(|e| Error::resource("csv file", e))?;

        Ok(CsvFile { file, has_digital_column })
    }

    pub fn add_data_block(&mut self, timestamps: &Timestamps, rows: &[OutputRow]) -> Result<()> {
        let base = timestamps.realtime.0 as f64 + timestamps.realtime.1 as f64 / 1e9;
        for (i, row) in rows.iter().enumerate() {
            let t = base + i as f64 / rows.len().max(1) as f64;
            let mut fields = vec![format!("{:.9}", t)];
            if self.has_digital_column {
                fields.push(format!("{}", row.digital.unwrap_or(0)));
            }
            for &value in &row.analog {
                fields.push(value.to_string());
            }
            writeln!(self.file, "{}", fields.join(","))
                .map_err(|e| Error::resource("csv file", e))?;
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.flush().map_err(|e| Error::resource("csv file", e))?;
        Ok(())
    }
}

pub fn csv_path(rld_path: &Path) -> PathBuf {
    rld_path.with_extension("csv")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_one_row_per_sample() {
        let mut cfg = Config::default();
        cfg.channel_enable = [true, false, false, false, false, false, false, false];
        cfg.digital_enable = false;

        let path = std::env::temp_dir().join(format!("rocketlogger-csv-{}.csv", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let mut csv = CsvFile::create(&path, &cfg).unwrap();
        let ts = Timestamps { realtime: (1000, 0), monotonic: (1000, 0) };
        csv.add_data_block(&ts, &[OutputRow { digital: None, analog: vec![42] }]).unwrap();
        csv.sync().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.lines().count() >= 4);
        assert!(contents.contains("42"));

        let _ = std::fs::remove_file(&path);
    }
}
