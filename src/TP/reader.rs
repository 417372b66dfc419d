use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::Arc;

use parking_lot::Mutex;

use super::channel_reader::ChannelReader;
use super::reader_info::TopicReaderInfo;
use super::topic_msg::deserialize_and_filter;
use crate::error::{BusError, Result};
use crate::Core::concurrent::WorkExecutor;
use crate::RMP::{CopyConfirm, ReadResult, ReaderWithBackpressure, RingBuffer};

/// Lifecycle notifications of a topic reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelReaderEvent {
    /// The first channel was added; the reader started consuming.
    FirstChannelReaderCreated,
    /// The last channel was closed; the reader stopped holding back writers.
    LastChannelReaderClosed,
    /// The reader fell a full buffer behind. Messages were lost for every
    /// channel; reading continues from the current end.
    AllChannelReadersExpired,
}

pub type EventHandler = Arc<dyn Fn(ChannelReaderEvent) + Send + Sync>;

/// Demultiplexes one ring buffer reader onto many topic channels.
///
/// Channel bookkeeping runs on the `serial` executor; ring reads run on the
/// `rmp_read` executor with a snapshot of the channels taken on `serial`.
/// Channel handlers may call back into the reader. A `run` requested while a
/// pass is in progress is folded into that pass.
pub struct Reader {
    info: TopicReaderInfo,
    rmp: ReaderWithBackpressure,
    reading: AtomicBool,
    rerun: AtomicBool,
    serial: Arc<dyn WorkExecutor>,
    rmp_read: Arc<dyn WorkExecutor>,
    channels: Mutex<Vec<Arc<ChannelReader>>>,
    on_event: EventHandler,
}

impl Reader {
    /// Claims a reader slot; fails with `AllocationExhausted` if none is free.
    /// The slot is released when the reader is dropped.
    pub fn create(
        ring: RingBuffer,
        info: TopicReaderInfo,
        serial: Arc<dyn WorkExecutor>,
        rmp_read: Arc<dyn WorkExecutor>,
        on_event: EventHandler,
    ) -> Result<Arc<Self>> {
        let rmp = ReaderWithBackpressure::new(ring, info.slots().clone())?;
        Ok(Arc::new(Self {
            info,
            rmp,
            reading: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            serial,
            rmp_read,
            channels: Mutex::new(Vec::new()),
            on_event,
        }))
    }

    /// Subscribe `handler` to `topic`. Registration completes on the serial
    /// executor; messages framed before this call are not delivered.
    pub fn create_channel_reader<F>(
        self: &Arc<Self>,
        topic: &str,
        handle_descendants: bool,
        handler: F,
    ) -> Result<Arc<ChannelReader>>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        if topic.as_bytes().contains(&0) {
            return Err(BusError::InvalidTopic);
        }
        let channel = Arc::new(ChannelReader::new(
            topic.to_string(),
            handle_descendants,
            self.info.reader_gen(),
            Box::new(handler),
        ));
        let this = Arc::clone(self);
        let added = Arc::clone(&channel);
        self.serial
            .execute(Box::new(move || this.add_channel_reader(added)));
        Ok(channel)
    }

    pub fn close_channel_reader(self: &Arc<Self>, channel: &Arc<ChannelReader>) {
        let this = Arc::clone(self);
        let closed = Arc::clone(channel);
        self.serial
            .execute(Box::new(move || this.remove_channel_reader(&closed)));
    }

    /// Schedule one pass over the ring for the channels registered so far.
    pub fn run(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.serial.execute(Box::new(move || {
            let channels = this.channels.lock().clone();
            let reader = Arc::clone(&this);
            this.rmp_read
                .execute(Box::new(move || reader.read_rmp(channels)));
        }));
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_active(&self) -> bool {
        self.rmp.is_active()
    }

    /// Slot backing this reader in the slot table.
    pub fn slot(&self) -> crate::RMP::SlotId {
        self.rmp.slot()
    }

    fn add_channel_reader(&self, channel: Arc<ChannelReader>) {
        let first = {
            let mut channels = self.channels.lock();
            channels.push(channel);
            channels.len() == 1
        };
        if first {
            self.rmp.activate();
            tracing::debug!("first channel reader created");
            (self.on_event)(ChannelReaderEvent::FirstChannelReaderCreated);
        }
    }

    fn remove_channel_reader(&self, channel: &Arc<ChannelReader>) {
        let last = {
            let mut channels = self.channels.lock();
            let before = channels.len();
            channels.retain(|c| !Arc::ptr_eq(c, channel));
            before != channels.len() && channels.is_empty()
        };
        if last {
            self.rmp.deactivate();
            tracing::debug!("last channel reader closed");
            (self.on_event)(ChannelReaderEvent::LastChannelReaderClosed);
        }
    }

    fn read_rmp(&self, channels: Vec<Arc<ChannelReader>>) {
        let mut snapshot = Some(channels);
        self.rerun.store(true, SeqCst);
        loop {
            if self.reading.swap(true, SeqCst) {
                // the pass in progress sees `rerun` and goes around again
                return;
            }
            {
                let _pass = ReadPass(&self.reading);
                while self.rerun.swap(false, SeqCst) {
                    let channels = snapshot
                        .take()
                        .unwrap_or_else(|| self.channels.lock().clone());
                    self.read_once(&channels);
                }
            }
            if !self.rerun.load(SeqCst) {
                return;
            }
        }
    }

    fn read_once(&self, channels: &[Arc<ChannelReader>]) {
        if !self.rmp.is_active() {
            return;
        }
        let mut dispatch = ChannelDispatch {
            channels,
            buffer: Vec::new(),
        };
        match self.rmp.read_ex(&mut dispatch) {
            Ok(ReadResult::Success(_)) => {}
            Ok(ReadResult::Expired(pos)) => {
                tracing::warn!(pos, "all channel readers expired");
                (self.on_event)(ChannelReaderEvent::AllChannelReadersExpired);
            }
            // the last channel closed while this pass was queued
            Err(BusError::ReaderInactive) => {}
            Err(e) => tracing::error!(error = %e, "topic reader failed"),
        }
    }
}

/// Clears the in-progress flag, also when a handler unwinds.
struct ReadPass<'a>(&'a AtomicBool);

impl Drop for ReadPass<'_> {
    fn drop(&mut self) {
        self.0.store(false, SeqCst);
    }
}

/// Copies each record once and hands its payload to every matching channel.
struct ChannelDispatch<'a> {
    channels: &'a [Arc<ChannelReader>],
    buffer: Vec<u8>,
}

impl ChannelDispatch<'_> {
    fn matches<'b>(&self, channel: &ChannelReader, data: &'b [u8]) -> Option<&'b [u8]> {
        deserialize_and_filter(
            data,
            channel.reader_gen(),
            channel.topic(),
            channel.handle_descendants(),
        )
    }
}

impl CopyConfirm for ChannelDispatch<'_> {
    fn copy(&mut self, ring: &RingBuffer, pos: u64, len: usize) -> bool {
        self.buffer.resize(len, 0);
        ring.read_at(pos, &mut self.buffer);
        self.channels
            .iter()
            .any(|c| self.matches(c, &self.buffer).is_some())
    }

    fn confirm(&mut self) {
        for channel in self.channels {
            if let Some(payload) = self.matches(channel, &self.buffer) {
                channel.deliver(payload);
            }
        }
    }
}
