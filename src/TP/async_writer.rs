use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_utils::Backoff;

use super::reader_info::TopicReaderInfo;
use super::topic_msg::{framed_size, serialize, TopicMessage};
use crate::error::{BusError, Result};
use crate::Core::concurrent::{MpscMessageQueue, WorkExecutor};
use crate::Core::notify::Notifier;
use crate::RMP::{BackpressureAction, RingBuffer, Writer};

/// Decides what to do when a reader is in the way: `(reader_pos, free_pos)`.
pub type BackpressureHandler = Arc<dyn Fn(u64, u64) -> BackpressureAction + Send + Sync>;

/// Topic writer that batches posts and writes them from one drainer at a time.
///
/// Posting only appends to a queue. The post that finds the queue idle
/// schedules a drain on the executor; that drain writes everything queued,
/// including posts that arrive while it runs, then notifies readers.
pub struct AsyncWriter {
    writer: Writer,
    info: TopicReaderInfo,
    queue: MpscMessageQueue<TopicMessage>,
    executor: Arc<dyn WorkExecutor>,
    on_backpressure: BackpressureHandler,
    notifier: Arc<dyn Notifier>,
    posted: AtomicU64,
    /// Posts written, rejected, or lost to an aborted drain.
    settled: AtomicU64,
}

impl AsyncWriter {
    pub fn create(
        ring: RingBuffer,
        info: TopicReaderInfo,
        executor: Arc<dyn WorkExecutor>,
        on_backpressure: BackpressureHandler,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let writer = Writer::new(ring, info.slots().clone());
        Arc::new(Self {
            writer,
            info,
            queue: MpscMessageQueue::new(),
            executor,
            on_backpressure,
            notifier,
            posted: AtomicU64::new(0),
            settled: AtomicU64::new(0),
        })
    }

    pub fn max_message_size(&self) -> usize {
        self.writer.max_message_size()
    }

    /// Frame `payload` for `topic` with the current reader generation.
    pub fn create_message(
        &self,
        topic: &str,
        payload: &[u8],
        post_to_descendants: bool,
    ) -> Result<TopicMessage> {
        let size = framed_size(topic, payload.len());
        let max = self.max_message_size();
        if size > max {
            return Err(BusError::MessageTooLarge { size, max });
        }
        let bytes = serialize(self.info.reader_gen(), post_to_descendants, topic, payload)?;
        Ok(TopicMessage::from(bytes))
    }

    pub fn post(self: &Arc<Self>, msg: TopicMessage) {
        self.posted.fetch_add(1, SeqCst);
        if self.queue.enqueue(msg) {
            self.schedule_drain();
        }
    }

    /// Block until every message posted before this call, from any thread,
    /// has been handled by a drain.
    pub fn flush(self: &Arc<Self>) {
        let target = self.posted.load(SeqCst);
        let backoff = Backoff::new();
        while self.settled.load(SeqCst) < target {
            // posts left behind by an aborted drain have no drainer yet
            if self.queue.claim_drainer() {
                self.schedule_drain();
            }
            if backoff.is_completed() {
                std::thread::sleep(Duration::from_millis(1));
            } else {
                backoff.snooze();
            }
        }
    }

    fn schedule_drain(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.executor.execute(Box::new(move || this.drain_and_write()));
    }

    /// Messages posted but not yet picked up by a drain.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn drain_and_write(&self) {
        let mut role = DrainerRole {
            queue: &self.queue,
            settled: &self.settled,
            in_flight: 0,
        };
        loop {
            let batch = self.queue.drain();
            if batch.is_empty() {
                self.notify();
                break;
            }
            tracing::trace!(messages = batch.len(), "writing batch");
            role.in_flight = batch.len() as u64;
            for msg in batch {
                let result = self.writer.write_ex(&msg, |reader_pos, free_pos| {
                    // wake the slow reader before deciding to wait on it
                    self.notify();
                    (self.on_backpressure)(reader_pos, free_pos)
                });
                if let Err(e) = result {
                    tracing::error!(error = %e, "dropping topic message");
                }
                role.in_flight -= 1;
                self.settled.fetch_add(1, SeqCst);
            }
        }
    }

    fn notify(&self) {
        self.writer.ring().inc_notification_count();
        self.notifier.notify_all();
    }
}

/// Releases the drainer role if a drain unwinds, so later posts still get
/// written. The rest of the batch being written is lost.
struct DrainerRole<'a> {
    queue: &'a MpscMessageQueue<TopicMessage>,
    settled: &'a AtomicU64,
    in_flight: u64,
}

impl Drop for DrainerRole<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!(
                lost = self.in_flight,
                queued = self.queue.len(),
                "topic write aborted; next post restarts the drain"
            );
            self.settled.fetch_add(self.in_flight, SeqCst);
            self.queue.release_drainer();
        }
    }
}
