//! ## netautotest-core::stats
//! **Statistics over probe sessions and iterations**
//!
//! Every function here is pure. Values are milliseconds unless noted.

use crate::error::CoreError;

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1). Zero with fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let Some(avg) = mean(values) else {
        return 0.0;
    };
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Mean absolute difference between RTTs of consecutive probes, in send
/// order. `None` entries are lost probes and break the pair they belong to.
pub fn jitter(rtts: &[Option<f64>]) -> Option<f64> {
    let deltas: Vec<f64> = rtts
        .windows(2)
        .filter_map(|pair| match (pair[0], pair[1]) {
            (Some(a), Some(b)) => Some((b - a).abs()),
            _ => None,
        })
        .collect();
    mean(&deltas)
}

/// `100 × (sent − received) / sent`. A session that sent nothing is a
/// configuration error, never a silent zero.
pub fn loss_percent(sent: u64, received: u64) -> Result<f64, CoreError> {
    if sent == 0 {
        return Err(CoreError::InvalidSessionConfig(
            "packet loss is undefined for a session without probes".into(),
        ));
    }
    if received > sent {
        return Err(CoreError::InvalidSessionConfig(format!(
            "received {received} echoes for {sent} probes"
        )));
    }
    Ok((sent - received) as f64 * 100.0 / sent as f64)
}
