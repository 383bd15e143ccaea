// netautotest-config/src/validation.rs
//! Custom validation functions for configuration.
//!
//! Provides cross-field and list checks that the derive attributes cannot
//! express on their own.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

use netautotest_core::Protocol;

use crate::campaign::CampaignSettings;
use crate::provisioner::ProvisionerBackend;

static LOG_LEVEL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new("^(?i)(trace|debug|info|warn|error|off)$").ok());

/// Validate that each protocol appears at most once.
pub fn validate_protocols(protocols: &[Protocol]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    if protocols.iter().all(|p| seen.insert(*p)) {
        Ok(())
    } else {
        Err(ValidationError::new("duplicate_protocol"))
    }
}

/// Validate report formats against the renderers known to the system.
pub fn validate_formats(formats: &[String]) -> Result<(), ValidationError> {
    let valid = formats
        .iter()
        .all(|f| ["json", "html"].contains(&f.to_lowercase().as_str()));
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("unknown_report_format"))
    }
}

/// Validate log level names accepted by the tracing filter.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match LOG_LEVEL.as_ref() {
        Some(re) if re.is_match(level) => Ok(()),
        Some(_) => Err(ValidationError::new("invalid_log_level")),
        None => Err(ValidationError::new("invalid_regex")),
    }
}

/// Validate that external provisioner commands are present.
pub fn validate_backend(backend: &ProvisionerBackend) -> Result<(), ValidationError> {
    match backend {
        ProvisionerBackend::Loopback => Ok(()),
        ProvisionerBackend::Command { up, down } => {
            if up.is_empty() || down.is_empty() {
                Err(ValidationError::new("empty_provisioner_command"))
            } else {
                Ok(())
            }
        }
    }
}

/// Cross-field checks on the campaign settings.
pub fn validate_campaign(settings: &CampaignSettings) -> Result<(), ValidationError> {
    if settings.session_duration() < settings.probe.interval() {
        let mut err = ValidationError::new("duration_shorter_than_probe_interval");
        err.message = Some("duration_seconds must cover at least one probe interval".into());
        return Err(err);
    }

    let ports = [
        settings.ports.tcp,
        settings.ports.udp,
        settings.ports.latency,
    ];
    let mut seen = HashSet::new();
    if !ports.iter().all(|p| seen.insert(*p)) {
        let mut err = ValidationError::new("duplicate_port");
        err.message = Some("tcp, udp and latency ports must differ".into());
        return Err(err);
    }

    Ok(())
}
