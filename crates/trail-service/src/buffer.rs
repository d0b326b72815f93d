//! Bounded, asynchronously flushed decorator over any event sink.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use trail_events::{
    AuditError, BufferingConfig, Event, EventSink, QueryFilter, QueryHandler, QuerySummary,
};

/// Wraps a sink so `publish` enqueues and returns immediately, with a
/// single background flusher draining the queue by size or time trigger.
///
/// At most one flush is in flight. Within a batch, events reach the
/// downstream in enqueue order. A failing batch is dropped without
/// poisoning the queue.
pub struct BufferedSink {
    inner: Arc<dyn EventSink>,
    config: BufferingConfig,
    shared: Arc<BufferShared>,
}

struct BufferShared {
    queue: Mutex<VecDeque<(String, Event)>>,
    flush_in_flight: AtomicBool,
    timer_armed: AtomicBool,
    accepting: AtomicBool,
}

impl BufferedSink {
    pub fn new(inner: Arc<dyn EventSink>, config: BufferingConfig) -> Self {
        Self {
            inner,
            config,
            shared: Arc::new(BufferShared {
                queue: Mutex::new(VecDeque::new()),
                flush_in_flight: AtomicBool::new(false),
                timer_armed: AtomicBool::new(false),
                accepting: AtomicBool::new(true),
            }),
        }
    }

    fn spawn_flush(&self) {
        let inner = self.inner.clone();
        let shared = self.shared.clone();
        tokio::spawn(async move {
            flush_backlog(&inner, &shared).await;
        });
    }

    fn arm_timer(&self) {
        let max_time = self.config.max_time();
        if max_time.is_zero() {
            return;
        }
        if self.shared.timer_armed.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self.inner.clone();
        let shared = self.shared.clone();
        tokio::spawn(async move {
            tokio::time::sleep(max_time).await;
            shared.timer_armed.store(false, Ordering::SeqCst);
            flush_backlog(&inner, &shared).await;
        });
    }
}

/// Drains the queue to the downstream, batch by batch, while holding the
/// single flush slot. Re-checks the queue after releasing the slot so an
/// event enqueued during the hand-off is never stranded.
async fn flush_backlog(inner: &Arc<dyn EventSink>, shared: &Arc<BufferShared>) {
    loop {
        if shared
            .flush_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        loop {
            let batch: Vec<(String, Event)> = {
                let mut queue = shared.queue.lock();
                queue.drain(..).collect()
            };
            if batch.is_empty() {
                break;
            }
            let total = batch.len();
            for (index, (topic, event)) in batch.into_iter().enumerate() {
                if let Err(err) = inner.publish(&topic, &event).await {
                    warn!(
                        sink = inner.name(),
                        error = %err,
                        dropped = total - index,
                        "buffered batch failed, dropping its remainder"
                    );
                    break;
                }
            }
            debug!(sink = inner.name(), batch = total, "buffered batch flushed");
        }

        shared.flush_in_flight.store(false, Ordering::SeqCst);
        if shared.queue.lock().is_empty() {
            return;
        }
    }
}

#[async_trait]
impl EventSink for BufferedSink {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn startup(&self) -> Result<(), AuditError> {
        self.inner.startup().await
    }

    /// Stops accepting, drains the backlog synchronously, then shuts the
    /// downstream.
    async fn shutdown(&self) -> Result<(), AuditError> {
        self.shared.accepting.store(false, Ordering::SeqCst);
        if self.config.enabled {
            // wait out any background flush holding the slot
            loop {
                flush_backlog(&self.inner, &self.shared).await;
                if !self.shared.flush_in_flight.load(Ordering::SeqCst)
                    && self.shared.queue.lock().is_empty()
                {
                    break;
                }
                tokio::task::yield_now().await;
            }
        }
        self.inner.shutdown().await
    }

    async fn publish(&self, topic: &str, event: &Event) -> Result<(), AuditError> {
        if !self.config.enabled {
            return self.inner.publish(topic, event).await;
        }
        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("buffering sink is shut down"));
        }

        let queued = {
            let mut queue = self.shared.queue.lock();
            queue.push_back((topic.to_owned(), event.clone()));
            queue.len()
        };

        if !self.config.autoflush {
            flush_backlog(&self.inner, &self.shared).await;
            return Ok(());
        }

        if queued >= self.config.max_size {
            self.spawn_flush();
        } else {
            self.arm_timer();
        }
        Ok(())
    }

    async fn read(&self, topic: &str, id: &str) -> Result<Event, AuditError> {
        self.inner.read(topic, id).await
    }

    async fn query(
        &self,
        topic: &str,
        filter: &QueryFilter,
        handler: &mut QueryHandler<'_>,
    ) -> Result<QuerySummary, AuditError> {
        self.inner.query(topic, filter, handler).await
    }
}
