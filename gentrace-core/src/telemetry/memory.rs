//! In-memory [`MetricsRecorder`] for tests and local inspection.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use opentelemetry::KeyValue;

use super::metrics::MetricsRecorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    OperationDuration,
    TokenUsage,
    Requests,
    Errors,
    Latency,
}

/// One captured emission with its attributes stringified.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub instrument: Instrument,
    pub value: f64,
    pub attributes: BTreeMap<String, String>,
}

impl Emission {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Captures every emission in order. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecorder {
    emissions: Arc<Mutex<Vec<Emission>>>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Emission>> {
        self.emissions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, instrument: Instrument, value: f64, attributes: &[KeyValue]) {
        let attributes = attributes
            .iter()
            .map(|kv| (kv.key.as_str().to_string(), kv.value.as_str().into_owned()))
            .collect();
        self.lock().push(Emission {
            instrument,
            value,
            attributes,
        });
    }

    pub fn emissions(&self) -> Vec<Emission> {
        self.lock().clone()
    }

    /// All emissions into `instrument`, in recording order.
    pub fn of(&self, instrument: Instrument) -> Vec<Emission> {
        self.lock()
            .iter()
            .filter(|e| e.instrument == instrument)
            .cloned()
            .collect()
    }

    pub fn count(&self, instrument: Instrument) -> usize {
        self.lock().iter().filter(|e| e.instrument == instrument).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl MetricsRecorder for InMemoryRecorder {
    fn record_duration(&self, seconds: f64, attributes: &[KeyValue]) {
        self.push(Instrument::OperationDuration, seconds, attributes);
    }

    fn record_latency(&self, millis: f64, attributes: &[KeyValue]) {
        self.push(Instrument::Latency, millis, attributes);
    }

    fn add_request(&self, attributes: &[KeyValue]) {
        self.push(Instrument::Requests, 1.0, attributes);
    }

    fn record_token_usage(&self, tokens: u64, attributes: &[KeyValue]) {
        self.push(Instrument::TokenUsage, tokens as f64, attributes);
    }

    fn add_error(&self, attributes: &[KeyValue]) {
        self.push(Instrument::Errors, 1.0, attributes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_and_filters() {
        let rec = InMemoryRecorder::new();
        let attrs = [KeyValue::new("gen_ai.model", "m")];
        rec.add_request(&attrs);
        rec.record_token_usage(7, &attrs);
        rec.add_request(&attrs);

        assert_eq!(rec.count(Instrument::Requests), 2);
        let usage = rec.of(Instrument::TokenUsage);
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].value, 7.0);
        assert_eq!(usage[0].attr("gen_ai.model"), Some("m"));

        let shared = rec.clone();
        shared.clear();
        assert!(rec.emissions().is_empty());
    }
}
