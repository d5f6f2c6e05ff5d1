use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};

use super::error::TelemetryLogError;
use super::AzEl;

/// Append-only CSV of every position `get_position` reports.
pub struct TelemetryLog {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl TelemetryLog {
    pub fn create(path: impl AsRef<Path>, allow_clobber: bool) -> Result<Self, TelemetryLogError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() && !allow_clobber {
            return Err(TelemetryLogError::AlreadyExists(path));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_writer(File::create(&path)?);
        writer.write_record(["timestamp", "azimuth", "elevation"])?;
        writer.flush()?;
        log::info!("logging telemetry to {}", path.display());
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, position: AzEl) -> Result<(), TelemetryLogError> {
        self.append_at(Utc::now(), position)
    }

    pub fn append_at(
        &mut self,
        timestamp: DateTime<Utc>,
        position: AzEl,
    ) -> Result<(), TelemetryLogError> {
        self.writer.write_record(&[
            timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            format!("{:.3}", position.azimuth),
            format!("{:.3}", position.elevation),
        ])?;
        // rows must survive the process dying mid-sweep
        self.writer.flush()?;
        Ok(())
    }
}
