//! Process-wide latency-measurement registry (C1).
//!
//! [`Registry`] maps a tracker name to a [`Tracker`], a small histogram that
//! folds `(start, end)` deltas into running aggregates and, optionally, a
//! bounded sample buffer for percentile queries. A single registry lock
//! serializes tracker *registration*; per-tracker operations take only that
//! tracker's own lock, so concurrent `start`/`end` calls on different
//! trackers never contend with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Aggregated statistics for one tracker.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    pub count: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub sum_ns: u64,
}

impl Aggregates {
    pub fn avg_ns(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_ns as f64 / self.count as f64
        }
    }

    fn fold(&mut self, delta_ns: u64) {
        self.count += 1;
        self.sum_ns += delta_ns;
        self.min_ns = if self.count == 1 {
            delta_ns
        } else {
            self.min_ns.min(delta_ns)
        };
        self.max_ns = self.max_ns.max(delta_ns);
    }
}

struct TrackerState {
    aggregates: Aggregates,
    samples: Option<Vec<u64>>,
    max_samples: usize,
}

/// A named latency histogram.
///
/// Cloning a `Tracker` is cheap — it's a handle around an `Arc<Mutex<..>>> —
/// so handing one out to multiple call sites never requires the registry
/// lock again.
#[derive(Clone)]
pub struct Tracker {
    name: String,
    state: Arc<Mutex<TrackerState>>,
}

/// An RAII timing token returned by [`Tracker::start`].
///
/// Dropping the guard — via [`LatencyGuard::stop`], falling out of scope on
/// a normal return, an early `?`, or a panic unwind — folds the elapsed
/// delta into the tracker's aggregates exactly once.
#[must_use = "dropping this immediately records a near-zero duration"]
pub struct LatencyGuard {
    tracker: Tracker,
    start: Instant,
    stopped: bool,
}

impl LatencyGuard {
    /// Explicitly stop the timer now, rather than waiting for drop.
    pub fn stop(mut self) {
        self.record();
        self.stopped = true;
    }

    fn record(&mut self) {
        if self.stopped {
            return;
        }
        let delta_ns = self.start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
        let mut state = self.tracker.state.lock().unwrap();
        state.aggregates.fold(delta_ns);
        let max_samples = state.max_samples;
        if let Some(samples) = state.samples.as_mut() {
            if samples.len() < max_samples {
                samples.push(delta_ns);
            }
        }
    }
}

impl Drop for LatencyGuard {
    fn drop(&mut self) {
        if !self.stopped {
            self.record();
            self.stopped = true;
        }
    }
}

impl Tracker {
    fn new(name: String, store_samples: bool, max_samples: usize) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(TrackerState {
                aggregates: Aggregates::default(),
                samples: store_samples.then(Vec::new),
                max_samples,
            })),
        }
    }

    /// Begins a scoped measurement. The returned guard folds its elapsed
    /// duration into this tracker on drop (or on an explicit `stop()`).
    pub fn start(&self) -> LatencyGuard {
        LatencyGuard {
            tracker: self.clone(),
            start: Instant::now(),
            stopped: false,
        }
    }

    /// The name this tracker was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A snapshot of this tracker's current aggregates.
    pub fn aggregates(&self) -> Aggregates {
        self.state.lock().unwrap().aggregates.clone()
    }

    /// Linear-interpolated percentile (0.0..=100.0) over the sample buffer.
    /// Returns `0` if sample storage is disabled or the buffer is empty.
    pub fn percentile(&self, p: f64) -> u64 {
        let state = self.state.lock().unwrap();
        let Some(samples) = state.samples.as_ref() else {
            return 0;
        };
        if samples.is_empty() {
            return 0;
        }
        let mut sorted = samples.clone();
        sorted.sort_unstable();
        let rank = (p / 100.0) * (sorted.len() - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        if lower == upper {
            sorted[lower]
        } else {
            let frac = rank - lower as f64;
            let a = sorted[lower] as f64;
            let b = sorted[upper] as f64;
            (a + (b - a) * frac).round() as u64
        }
    }

    /// Whether this tracker stores individual samples (needed for percentiles).
    pub fn stores_samples(&self) -> bool {
        self.state.lock().unwrap().samples.is_some()
    }

    /// Zeros aggregates and clears samples, but keeps the tracker registered.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.aggregates = Aggregates::default();
        if let Some(samples) = state.samples.as_mut() {
            samples.clear();
        }
    }
}

/// Process-wide registry of named latency trackers.
#[derive(Clone, Default)]
pub struct Registry {
    trackers: Arc<Mutex<HashMap<String, Tracker>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing tracker for `name`, or atomically creates one.
    pub fn get_tracker(&self, name: &str, store_samples: bool, max_samples: usize) -> Tracker {
        let mut trackers = self.trackers.lock().unwrap();
        trackers
            .entry(name.to_owned())
            .or_insert_with(|| Tracker::new(name.to_owned(), store_samples, max_samples))
            .clone()
    }

    /// Exports one CSV row per registered tracker: name, count, min_ns,
    /// max_ns, avg_ns, avg_µs, avg_ms, p50_ns, p90_ns, p99_ns (or "N/A" when
    /// sample storage is disabled for that tracker).
    pub fn export_csv(&self) -> String {
        let trackers = self.trackers.lock().unwrap();
        let mut names: Vec<&String> = trackers.keys().collect();
        names.sort();

        let mut out = String::from(
            "name,count,min_ns,max_ns,avg_ns,avg_us,avg_ms,p50_ns,p90_ns,p99_ns\n",
        );
        for name in names {
            let tracker = &trackers[name];
            let agg = tracker.aggregates();
            let avg_ns = agg.avg_ns();
            if tracker.stores_samples() {
                out.push_str(&format!(
                    "{},{},{},{},{:.2},{:.2},{:.2},{},{},{}\n",
                    tracker.name(),
                    agg.count,
                    agg.min_ns,
                    agg.max_ns,
                    avg_ns,
                    avg_ns / 1_000.0,
                    avg_ns / 1_000_000.0,
                    tracker.percentile(50.0),
                    tracker.percentile(90.0),
                    tracker.percentile(99.0),
                ));
            } else {
                out.push_str(&format!(
                    "{},{},{},{},{:.2},{:.2},{:.2},N/A,N/A,N/A\n",
                    tracker.name(),
                    agg.count,
                    agg.min_ns,
                    agg.max_ns,
                    avg_ns,
                    avg_ns / 1_000.0,
                    avg_ns / 1_000_000.0,
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn tracker_folds_aggregates_monotonically() {
        let registry = Registry::new();
        let tracker = registry.get_tracker("rtt", true, 8);
        for _ in 0..3 {
            let guard = tracker.start();
            thread::sleep(std::time::Duration::from_micros(50));
            guard.stop();
        }
        let agg = tracker.aggregates();
        assert_eq!(agg.count, 3);
        assert!(agg.min_ns <= (agg.sum_ns / agg.count) && (agg.sum_ns / agg.count) <= agg.max_ns);
    }

    #[test]
    fn same_name_returns_same_tracker() {
        let registry = Registry::new();
        let a = registry.get_tracker("x", false, 0);
        a.start().stop();
        let b = registry.get_tracker("x", false, 0);
        assert_eq!(b.aggregates().count, 1);
    }

    #[test]
    fn percentile_without_samples_is_zero() {
        let registry = Registry::new();
        let tracker = registry.get_tracker("no-samples", false, 0);
        tracker.start().stop();
        assert_eq!(tracker.percentile(99.0), 0);
    }

    #[test]
    fn reset_zeros_aggregates_but_keeps_registration() {
        let registry = Registry::new();
        let tracker = registry.get_tracker("resettable", true, 8);
        tracker.start().stop();
        tracker.reset();
        assert_eq!(tracker.aggregates().count, 0);
        assert_eq!(registry.get_tracker("resettable", true, 8).aggregates().count, 0);
    }

    #[test]
    fn drop_without_explicit_stop_still_records() {
        let registry = Registry::new();
        let tracker = registry.get_tracker("drop-path", false, 0);
        {
            let _guard = tracker.start();
        }
        assert_eq!(tracker.aggregates().count, 1);
    }
}
