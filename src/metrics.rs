//! Upstream fetch metrics
//!
//! Tracks latency percentiles and success rates per upstream surface
//! (listing, detail, history, exchange rate). A "request" here is one
//! logical fetch including its retries.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for percentile calculation
const MAX_SAMPLES: usize = 100;

/// Snapshot of one surface's metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMetrics {
    /// Surface name, e.g. `top_coins`
    pub surface: String,
    /// Provider serving the surface
    pub provider_name: String,
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    pub total_requests: u64,
    pub failed_requests: u64,
}

#[derive(Debug, Default)]
struct Samples {
    latencies: VecDeque<(f64, bool)>,
    total: u64,
    failed: u64,
}

/// Collects request outcomes for one surface
pub struct MetricsCollector {
    surface: &'static str,
    provider_name: &'static str,
    samples: RwLock<Samples>,
}

impl MetricsCollector {
    pub fn new(surface: &'static str, provider_name: &'static str) -> Self {
        Self {
            surface,
            provider_name,
            samples: RwLock::new(Samples::default()),
        }
    }

    /// Records a request with its duration and success status
    pub async fn record_request(&self, duration: Duration, success: bool) {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let mut samples = self.samples.write().await;

        samples.total += 1;
        if !success {
            samples.failed += 1;
        }
        if samples.latencies.len() >= MAX_SAMPLES {
            samples.latencies.pop_front();
        }
        samples.latencies.push_back((duration_ms, success));
    }

    /// Computes current metrics from collected samples
    pub async fn get_metrics(&self) -> ProviderMetrics {
        let samples = self.samples.read().await;

        // percentiles only over successful requests
        let mut latencies: Vec<f64> = samples
            .latencies
            .iter()
            .filter(|(_, success)| *success)
            .map(|(ms, _)| *ms)
            .collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let success_rate = if samples.total > 0 {
            (samples.total - samples.failed) as f64 / samples.total as f64
        } else {
            1.0
        };

        ProviderMetrics {
            surface: self.surface.to_string(),
            provider_name: self.provider_name.to_string(),
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            success_rate,
            total_requests: samples.total,
            failed_requests: samples.failed,
        }
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}
