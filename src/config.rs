//! Tunables for a decode session

use std::time::Duration;

/// Default wait for a free input or completed output slot (10 ms)
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(10);

/// Default number of frame events buffered between worker and host
pub const DEFAULT_EVENT_CAPACITY: usize = 4;

#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Bounded wait for each input/output dequeue, also the granularity at
    /// which the worker notices teardown
    pub dequeue_timeout: Duration,
    /// Capacity of the event channel; the worker blocks once it is full
    pub event_capacity: usize,
    pub thread_name: String,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout: DEFAULT_DEQUEUE_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            thread_name: "decode-pump".to_string(),
        }
    }
}

impl PumpConfig {
    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    /// A zero capacity turns the channel into a rendezvous, which is allowed
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
