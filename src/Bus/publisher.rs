use std::sync::Arc;
use std::time::Duration;

use super::transport::Transport;
use crate::error::Result;
use crate::Core::concurrent::{InlineExecutor, SerialWorkQueue, StopPolicy, WorkExecutor};
use crate::RMP::BackpressureAction;
use crate::TP::{AsyncWriter, BackpressureHandler, TopicMessage};

/// What a publisher does when a subscriber lags a full buffer behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Sleep, then check again. A subscriber that made no progress during
    /// the sleep is overwritten on the next attempt.
    RetryAfter(Duration),
    /// Never wait; lagging subscribers expire.
    Overwrite,
}

impl BackpressurePolicy {
    fn into_handler(self) -> BackpressureHandler {
        match self {
            BackpressurePolicy::RetryAfter(delay) => Arc::new(move |_, _| {
                std::thread::sleep(delay);
                BackpressureAction::Retry
            }),
            BackpressurePolicy::Overwrite => Arc::new(|_, _| BackpressureAction::Overwrite),
        }
    }
}

/// Publishes topic messages onto a bus.
///
/// With a dedicated writer thread, `publish` only queues; otherwise the
/// calling thread writes whatever is queued before returning.
pub struct Publisher {
    worker: Option<Arc<SerialWorkQueue>>,
    writer: Arc<AsyncWriter>,
    transport: Arc<Transport>,
}

impl Publisher {
    pub fn new(
        transport: Arc<Transport>,
        policy: BackpressurePolicy,
        dedicated_thread: bool,
    ) -> Result<Self> {
        let worker = if dedicated_thread {
            Some(Arc::new(SerialWorkQueue::start("dmxp-bus-writer")?))
        } else {
            None
        };
        let executor: Arc<dyn WorkExecutor> = match &worker {
            Some(worker) => worker.clone(),
            None => Arc::new(InlineExecutor),
        };
        let writer = AsyncWriter::create(
            transport.ring().clone(),
            transport.reader_info().clone(),
            executor,
            policy.into_handler(),
            transport.notifier().clone(),
        );
        Ok(Self {
            worker,
            writer,
            transport,
        })
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Largest framed topic message accepted.
    pub fn max_message_size(&self) -> usize {
        self.writer.max_message_size()
    }

    pub fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.publish_ex(topic, payload, false)
    }

    /// `post_to_descendants` also delivers to subscribers of every topic that
    /// has `topic` as a prefix.
    pub fn publish_ex(&self, topic: &str, payload: &[u8], post_to_descendants: bool) -> Result<()> {
        let msg = self.writer.create_message(topic, payload, post_to_descendants)?;
        self.writer.post(msg);
        Ok(())
    }

    pub fn create_message(
        &self,
        topic: &str,
        payload: &[u8],
        post_to_descendants: bool,
    ) -> Result<TopicMessage> {
        self.writer.create_message(topic, payload, post_to_descendants)
    }

    /// Queue an already framed message. The same message can be posted many
    /// times.
    pub fn post(&self, msg: TopicMessage) {
        self.writer.post(msg)
    }

    /// Wait until everything published so far, by any thread sharing this
    /// publisher, has been written to the ring buffer or dropped with an
    /// error. With the inline writer this can wait on another thread's drain.
    pub fn flush(&self) {
        self.writer.flush();
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.stop(StopPolicy::IfEmpty);
        }
    }
}
