//! Report hand-off parameters.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ReportingConfig {
    /// Requested formats (`json`, `html`).
    #[validate(custom(function = validation::validate_formats))]
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_formats() -> Vec<String> {
    vec!["json".into(), "html".into()]
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            output_dir: default_output_dir(),
        }
    }
}
