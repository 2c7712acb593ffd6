//! Delivery statistics
//!
//! Pure aggregation over delivery results, computed fresh per call. The
//! latency average counts only successful deliveries that reported one;
//! failed attempts may carry a latency but stay out of the average.

use crate::types::{DeliveryResult, DispatchStats};
use std::collections::HashMap;

/// Summarize a batch of delivery results.
pub fn summarize(results: &[DeliveryResult]) -> DispatchStats {
    let total = results.len();
    if total == 0 {
        return DispatchStats::default();
    }

    let successful = results.iter().filter(|r| r.success).count();
    let failed = total - successful;

    let latencies: Vec<u64> = results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.response_time_ms)
        .collect();
    let avg_response_time_ms = if latencies.is_empty() {
        0.0
    } else {
        round2(latencies.iter().sum::<u64>() as f64 / latencies.len() as f64)
    };

    let mut errors: HashMap<String, usize> = HashMap::new();
    for result in results.iter().filter(|r| !r.success) {
        let key = result
            .error
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        *errors.entry(key).or_insert(0) += 1;
    }

    DispatchStats {
        total,
        successful,
        failed,
        success_rate: round2(successful as f64 * 100.0 / total as f64),
        avg_response_time_ms,
        errors,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
