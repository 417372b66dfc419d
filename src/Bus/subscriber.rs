use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::transport::Transport;
use crate::error::Result;
use crate::Core::concurrent::{SerialWorkQueue, StopPolicy};
use crate::Core::notify::Notifier;
use crate::TP::{ChannelReader, ChannelReaderEvent, Reader};

struct Listener {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Receives topic messages from a bus.
///
/// Owns one reader slot for its lifetime; the slot is released on drop.
pub struct Subscriber {
    listener: Option<Listener>,
    serial: Arc<SerialWorkQueue>,
    rmp_read: Arc<SerialWorkQueue>,
    reader: Arc<Reader>,
    transport: Arc<Transport>,
}

impl Subscriber {
    pub fn new<F>(transport: Arc<Transport>, on_event: F) -> Result<Self>
    where
        F: Fn(ChannelReaderEvent) + Send + Sync + 'static,
    {
        let serial = Arc::new(SerialWorkQueue::start("dmxp-bus-reader")?);
        let rmp_read = Arc::new(SerialWorkQueue::start("dmxp-bus-rmp-read")?);
        let reader = Reader::create(
            transport.ring().clone(),
            transport.reader_info().clone(),
            serial.clone(),
            rmp_read.clone(),
            Arc::new(on_event),
        )?;
        Ok(Self {
            listener: None,
            serial,
            rmp_read,
            reader,
            transport,
        })
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn reader(&self) -> &Arc<Reader> {
        &self.reader
    }

    pub fn subscribe<F>(&self, topic: &str, handle_descendants: bool, handler: F) -> Result<Arc<ChannelReader>>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.reader
            .create_channel_reader(topic, handle_descendants, handler)
    }

    pub fn unsubscribe(&self, channel: &Arc<ChannelReader>) {
        self.reader.close_channel_reader(channel)
    }

    /// Schedule one read pass.
    pub fn run(&self) {
        self.reader.run()
    }

    /// Wait until all work scheduled so far, including reads, has finished.
    pub fn sync(&self) {
        let (tx, rx) = mpsc::channel::<()>();
        let rmp_read = Arc::clone(&self.rmp_read);
        self.serial.enqueue(Box::new(move || {
            rmp_read.enqueue(Box::new(move || {
                let _ = tx.send(());
            }));
        }));
        let _ = rx.recv();
    }

    /// Read once and wait for the handlers to run.
    pub fn poll(&self) {
        self.run();
        self.sync();
    }

    /// Start a thread that reads whenever a publisher sends a wake-up, and at
    /// least every `interval` in case a wake-up was lost.
    pub fn start_listening(&mut self, interval: Duration) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let reader = Arc::clone(&self.reader);
        let notifier = Arc::clone(self.transport.notifier());
        let handle = thread::Builder::new()
            .name("dmxp-bus-listener".into())
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    notifier.wait_for_notification(Some(interval));
                    reader.run();
                }
            })?;
        self.listener = Some(Listener { running, handle });
        Ok(())
    }

    pub fn stop_listening(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.running.store(false, Ordering::Release);
            if listener.handle.join().is_err() {
                tracing::error!("listener thread panicked");
            }
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.stop_listening();
        self.serial.stop(StopPolicy::Always);
        self.rmp_read.stop(StopPolicy::Always);
    }
}
