//! Meter registry seam.
//!
//! The dispatcher records its meters through a [`MeterRegistry`]. Storage
//! and aggregation belong to the registry; the dispatcher only reports
//! increments and durations. Registries are shared by every concurrent
//! interaction and must be safe to call from any thread.
//!
//! Two registries ship with the crate:
//! - [`NoopMeterRegistry`]: discards everything (the default)
//! - [`SimpleMeterRegistry`]: keeps counters and timers in memory and can
//!   produce a serializable snapshot

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

/// Counter: interactions subscribed to.
pub const INVOCATIONS: &str = "rsocket.rpc.server.invocations";
/// Counter: interactions that terminated with an error.
pub const ERRORS: &str = "rsocket.rpc.server.errors";
/// Counter: interactions cancelled before a terminal signal.
pub const CANCELLATIONS: &str = "rsocket.rpc.server.cancellations";
/// Counter: values emitted to the requester.
pub const ITEMS: &str = "rsocket.rpc.server.items";
/// Timer: subscription to terminal signal or cancellation.
pub const DURATION: &str = "rsocket.rpc.server.duration";

/// Identity of a meter: its name and tags.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MeterId {
    pub name: &'static str,
    pub tags: Vec<(&'static str, String)>,
}

impl MeterId {
    /// Create a meter id with no tags.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            tags: Vec::new(),
        }
    }

    /// Add a tag.
    pub fn tag(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.tags.push((key, value.into()));
        self
    }

    /// A server-side meter tagged `{service, role=server, method}`.
    pub fn server(name: &'static str, service: &str, method: &str) -> Self {
        Self::new(name)
            .tag("service", service)
            .tag("role", "server")
            .tag("method", method)
    }
}

/// Receives meter updates from the dispatcher.
pub trait MeterRegistry: Send + Sync + 'static {
    /// Add `value` to the counter `id`.
    fn increment(&self, id: &MeterId, value: u64);

    /// Record one sample on the timer `id`.
    fn record(&self, id: &MeterId, elapsed: Duration);
}

/// A registry that discards every update.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMeterRegistry;

impl MeterRegistry for NoopMeterRegistry {
    fn increment(&self, _id: &MeterId, _value: u64) {}

    fn record(&self, _id: &MeterId, _elapsed: Duration) {}
}

/// The current value of a meter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeterValue {
    Counter {
        count: u64,
    },
    Timer {
        count: u64,
        total: Duration,
        max: Duration,
    },
}

/// A meter and its value, as returned by [`SimpleMeterRegistry::snapshot`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Meter {
    pub id: MeterId,
    pub value: MeterValue,
}

/// An in-memory registry.
///
/// Meters are created on first update. A counter and a timer may not share
/// an id; an update of the other kind replaces the meter.
#[derive(Debug, Default)]
pub struct SimpleMeterRegistry {
    meters: Mutex<BTreeMap<MeterId, MeterValue>>,
}

impl SimpleMeterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// All meters, ordered by id.
    pub fn snapshot(&self) -> Vec<Meter> {
        self.lock()
            .iter()
            .map(|(id, value)| Meter {
                id: id.clone(),
                value: *value,
            })
            .collect()
    }

    /// The value of counter `id`, or 0 if it was never incremented.
    pub fn counter(&self, id: &MeterId) -> u64 {
        match self.lock().get(id) {
            Some(MeterValue::Counter { count }) => *count,
            _ => 0,
        }
    }

    /// The number of samples recorded on timer `id`.
    pub fn timer_count(&self, id: &MeterId) -> u64 {
        match self.lock().get(id) {
            Some(MeterValue::Timer { count, .. }) => *count,
            _ => 0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<MeterId, MeterValue>> {
        self.meters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MeterRegistry for SimpleMeterRegistry {
    fn increment(&self, id: &MeterId, value: u64) {
        let mut meters = self.lock();
        match meters.get_mut(id) {
            Some(MeterValue::Counter { count }) => *count += value,
            _ => {
                meters.insert(id.clone(), MeterValue::Counter { count: value });
            }
        }
    }

    fn record(&self, id: &MeterId, elapsed: Duration) {
        let mut meters = self.lock();
        match meters.get_mut(id) {
            Some(MeterValue::Timer { count, total, max }) => {
                *count += 1;
                *total += elapsed;
                *max = (*max).max(elapsed);
            }
            _ => {
                meters.insert(
                    id.clone(),
                    MeterValue::Timer {
                        count: 1,
                        total: elapsed,
                        max: elapsed,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_tags() {
        let id = MeterId::server(INVOCATIONS, "Echo", "say");
        assert_eq!(
            id.tags,
            vec![
                ("service", "Echo".to_string()),
                ("role", "server".to_string()),
                ("method", "say".to_string()),
            ]
        );
    }

    #[test]
    fn test_counter_accumulates_per_id() {
        let registry = SimpleMeterRegistry::new();
        let say = MeterId::server(INVOCATIONS, "Echo", "say");
        let shout = MeterId::server(INVOCATIONS, "Echo", "shout");

        registry.increment(&say, 1);
        registry.increment(&say, 2);
        registry.increment(&shout, 1);

        assert_eq!(registry.counter(&say), 3);
        assert_eq!(registry.counter(&shout), 1);
        assert_eq!(registry.counter(&MeterId::new(ERRORS)), 0);
    }

    #[test]
    fn test_timer_tracks_total_and_max() {
        let registry = SimpleMeterRegistry::new();
        let id = MeterId::server(DURATION, "Echo", "say");

        registry.record(&id, Duration::from_millis(5));
        registry.record(&id, Duration::from_millis(20));

        assert_eq!(registry.timer_count(&id), 2);
        assert_eq!(
            registry.snapshot(),
            vec![Meter {
                id,
                value: MeterValue::Timer {
                    count: 2,
                    total: Duration::from_millis(25),
                    max: Duration::from_millis(20),
                },
            }]
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let registry = SimpleMeterRegistry::new();
        registry.increment(&MeterId::new(ITEMS).tag("method", "say"), 4);

        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(json[0]["id"]["name"], "rsocket.rpc.server.items");
        assert_eq!(json[0]["value"]["type"], "counter");
        assert_eq!(json[0]["value"]["count"], 4);
    }

    #[test]
    fn test_registry_is_shareable_across_threads() {
        let registry = std::sync::Arc::new(SimpleMeterRegistry::new());
        let id = MeterId::new(INVOCATIONS);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.increment(&id, 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.counter(&id), 400);
    }
}
