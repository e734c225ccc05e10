//! Semantic event types, ring buffer, and category counters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

use crate::descriptor::TargetDescriptor;

/// Fixed capacity of the semantic event ring buffer.
pub const EVENT_BUFFER_CAPACITY: usize = 100;

/// Category of a semantic event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Clicks, drags, clipboard, form actions, selections
    Interaction,
    /// URL/history changes
    Navigation,
    /// Coalesced typing and validation
    Input,
    /// Hover enter/dwell/leave
    Hover,
    /// Coalesced scrolling
    Scroll,
    /// Focus in/out
    Focus,
    /// Batched DOM mutations
    Mutation,
    /// Console output and network failures
    Console,
    /// Recording lifecycle
    Recording,
}

impl EventCategory {
    /// All categories.
    pub const ALL: &'static [Self] = &[
        Self::Interaction,
        Self::Navigation,
        Self::Input,
        Self::Hover,
        Self::Scroll,
        Self::Focus,
        Self::Mutation,
        Self::Console,
        Self::Recording,
    ];
}

/// A classified, debounced, human-meaningful event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticEvent {
    /// Event type, e.g. `input:typed` or `scroll:stop`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event category
    pub category: EventCategory,
    /// Engine-clock timestamp in milliseconds
    pub timestamp: u64,
    /// Descriptor of the element involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetDescriptor>,
    /// Event-specific payload
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub payload: serde_json::Map<String, Value>,
}

impl SemanticEvent {
    /// Create an event with an empty payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>, category: EventCategory, timestamp: u64) -> Self {
        Self {
            event_type: event_type.into(),
            category,
            timestamp,
            target: None,
            payload: serde_json::Map::new(),
        }
    }

    /// Attach a target descriptor.
    #[must_use]
    pub fn with_target(mut self, target: TargetDescriptor) -> Self {
        self.target = Some(target);
        self
    }

    /// Attach a payload entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

/// Fixed-capacity FIFO event store; oldest entry evicted when full.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<SemanticEvent>,
    capacity: usize,
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(EVENT_BUFFER_CAPACITY)
    }
}

impl EventBuffer {
    /// Create a buffer with a given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an event, evicting the oldest when at capacity.
    pub fn push(&mut self, event: SemanticEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Buffer capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest surviving event.
    #[must_use]
    pub fn oldest(&self) -> Option<&SemanticEvent> {
        self.events.front()
    }

    /// Snapshot of buffered events, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SemanticEvent> {
        self.events.iter().cloned().collect()
    }

    /// Drop all buffered events.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// Always-incrementing counters behind the noise-reduction statistic.
///
/// Category counters increment for every classified event regardless of the
/// active subscription; only buffer retention and forwarding are filtered.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CategoryCounters {
    /// Raw platform signals seen
    pub raw: u64,
    /// Semantic events classified
    pub semantic: u64,
    /// Per-category classified counts
    pub per_category: BTreeMap<EventCategory, u64>,
}

impl CategoryCounters {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a raw signal.
    pub fn count_raw(&mut self) {
        self.raw += 1;
    }

    /// Record a classified event.
    pub fn count_semantic(&mut self, category: EventCategory) {
        self.semantic += 1;
        *self.per_category.entry(category).or_insert(0) += 1;
    }

    /// Classified count for one category.
    #[must_use]
    pub fn category(&self, category: EventCategory) -> u64 {
        self.per_category.get(&category).copied().unwrap_or(0)
    }

    /// Noise reduction ratio `1 - semantic/raw`, zero when no raw signals.
    #[must_use]
    pub fn noise_reduction(&self) -> f64 {
        if self.raw == 0 {
            0.0
        } else {
            1.0 - (self.semantic as f64 / self.raw as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn event(n: u64) -> SemanticEvent {
        SemanticEvent::new("interaction:click", EventCategory::Interaction, n)
    }

    #[test]
    fn buffer_evicts_oldest_first() {
        let mut buf = EventBuffer::new(3);
        for i in 0..5 {
            buf.push(event(i));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.oldest().unwrap().timestamp, 2);
    }

    #[test]
    fn buffer_default_capacity_is_100() {
        assert_eq!(EventBuffer::default().capacity(), EVENT_BUFFER_CAPACITY);
    }

    #[test]
    fn counters_track_noise_reduction() {
        let mut c = CategoryCounters::new();
        for _ in 0..10 {
            c.count_raw();
        }
        c.count_semantic(EventCategory::Input);
        c.count_semantic(EventCategory::Scroll);
        assert_eq!(c.category(EventCategory::Input), 1);
        assert!((c.noise_reduction() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn noise_reduction_zero_without_raw() {
        assert_eq!(CategoryCounters::new().noise_reduction(), 0.0);
    }

    #[test]
    fn event_serializes_type_field() {
        let e = event(7).with("key", serde_json::json!("a"));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "interaction:click");
        assert_eq!(json["category"], "interaction");
        assert_eq!(json["payload"]["key"], "a");
    }

    proptest! {
        /// After N > capacity pushes, length is exactly capacity and the
        /// oldest survivor is event #(N - capacity + 1) in 1-based terms.
        #[test]
        fn fifo_eviction_holds(n in 1usize..400) {
            let mut buf = EventBuffer::default();
            for i in 0..n {
                buf.push(event(i as u64));
            }
            let expected_len = n.min(EVENT_BUFFER_CAPACITY);
            prop_assert_eq!(buf.len(), expected_len);
            let expected_oldest = n.saturating_sub(EVENT_BUFFER_CAPACITY) as u64;
            prop_assert_eq!(buf.oldest().unwrap().timestamp, expected_oldest);
        }
    }
}
