use super::MetricsSink;
use std::collections::HashMap;
use std::sync::Mutex;

/// Keeps metrics in process memory.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<String, u64>>,
    histograms: Mutex<HashMap<String, Vec<f64>>>,
    gauges: Mutex<HashMap<String, f64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, 0 when never incremented.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .map(|counters| counters.get(name).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn histogram_samples(&self, name: &str) -> Vec<f64> {
        self.histograms
            .lock()
            .map(|histograms| histograms.get(name).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges
            .lock()
            .ok()
            .and_then(|gauges| gauges.get(name).copied())
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment_counter(&self, name: &str, value: u64) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(name.to_string()).or_insert(0) += value;
        }
    }

    fn record_histogram(&self, name: &str, value: f64) {
        if let Ok(mut histograms) = self.histograms.lock() {
            histograms.entry(name.to_string()).or_default().push(value);
        }
    }

    fn set_gauge(&self, name: &str, value: f64) {
        if let Ok(mut gauges) = self.gauges.lock() {
            gauges.insert(name.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_counters() {
        let metrics = InMemoryMetrics::new();
        metrics.increment_counter("a", 2);
        metrics.increment_counter("a", 3);
        metrics.record_histogram("h", 1.5);
        metrics.set_gauge("g", 4.0);

        assert_eq!(metrics.counter("a"), 5);
        assert_eq!(metrics.counter("missing"), 0);
        assert_eq!(metrics.histogram_samples("h"), vec![1.5]);
        assert_eq!(metrics.gauge("g"), Some(4.0));
    }
}
