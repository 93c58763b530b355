//! Thread-safe publisher metrics
//!
//! Atomic counters for the publisher loop plus a bounded window of publish
//! enqueue times. One collector is owned per loop and shared through an `Arc`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of enqueue-time samples kept for percentiles
const MAX_TIMING_SAMPLES: usize = 1000;

/// Counters updated by the publisher loop
pub struct PublisherMetrics {
    ticks: AtomicU64,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
    last_sequence: AtomicU64,
    started_at: AtomicU64,

    // microseconds spent handing a message to the transport
    enqueue_times: Mutex<Vec<u64>>,
}

impl PublisherMetrics {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            last_sequence: AtomicU64::new(0),
            started_at: AtomicU64::new(current_timestamp()),
            enqueue_times: Mutex::new(Vec::new()),
        }
    }

    /// A tick built a message with this sequence number
    pub fn tick_started(&self, sequence: u64) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.last_sequence.store(sequence, Ordering::Relaxed);
    }

    pub fn message_published(&self, enqueue_time: Duration) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.record_enqueue_time(enqueue_time);
    }

    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    fn record_enqueue_time(&self, duration: Duration) {
        if let Ok(mut times) = self.enqueue_times.lock() {
            times.push(duration.as_micros() as u64);

            if times.len() > MAX_TIMING_SAMPLES {
                times.remove(0);
            }
        }
    }

    /// Average, p50 and p99 of the recorded enqueue times
    fn calculate_enqueue_statistics(&self) -> (f64, f64, f64) {
        let Ok(times) = self.enqueue_times.lock() else {
            return (0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();

        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 99.0),
        )
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let ticks = self.ticks();
        let (enqueue_time_avg_us, enqueue_time_p50_us, enqueue_time_p99_us) =
            self.calculate_enqueue_statistics();

        MetricsSnapshot {
            timestamp: now,
            uptime_seconds: now.saturating_sub(self.started_at.load(Ordering::Relaxed)),
            ticks,
            messages_published: self.messages_published(),
            publish_failures: self.publish_failures(),
            last_sequence: (ticks > 0).then(|| self.last_sequence.load(Ordering::Relaxed)),
            enqueue_time_avg_us,
            enqueue_time_p50_us,
            enqueue_time_p99_us,
        }
    }
}

impl Default for PublisherMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of [`PublisherMetrics`], logged as JSON at exit
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: u64,
    pub uptime_seconds: u64,
    pub ticks: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub last_sequence: Option<u64>,
    pub enqueue_time_avg_us: f64,
    pub enqueue_time_p50_us: f64,
    pub enqueue_time_p99_us: f64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_value = sorted_data[index.floor() as usize] as f64;
        let upper_value = sorted_data[index.ceil() as usize] as f64;

        lower_value + (upper_value - lower_value) * index.fract()
    }
}
