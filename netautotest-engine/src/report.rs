//! Report hand-off.
//!
//! Renderers turn a finished [`CampaignRun`] into files. Rendering errors are
//! logged by the orchestrator and never change the verdict.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use netautotest_config::ReportingConfig;

use crate::campaign::CampaignRun;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub trait ReportRenderer: Send + Sync {
    /// Renders `run` and returns the paths written.
    fn render(&self, run: &CampaignRun) -> Result<Vec<PathBuf>, ReportError>;
}

/// Writes the full run as pretty JSON to `<output_dir>/campaign_<id>.json`.
pub struct JsonReportRenderer {
    output_dir: PathBuf,
    enabled: bool,
}

impl JsonReportRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            enabled: true,
        }
    }

    pub fn from_config(config: &ReportingConfig) -> Self {
        let mut enabled = false;
        for format in &config.formats {
            match format.to_lowercase().as_str() {
                "json" => enabled = true,
                other => warn!(format = other, "Report format not rendered by this build, skipped"),
            }
        }
        Self {
            output_dir: config.output_dir.clone(),
            enabled,
        }
    }

    pub fn path_for(&self, run: &CampaignRun) -> PathBuf {
        self.output_dir.join(format!("campaign_{}.json", run.id()))
    }
}

impl ReportRenderer for JsonReportRenderer {
    fn render(&self, run: &CampaignRun) -> Result<Vec<PathBuf>, ReportError> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        fs::create_dir_all(&self.output_dir)?;
        let path = self.path_for(run);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, run)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(vec![path])
    }
}
