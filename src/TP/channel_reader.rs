use std::fmt;

/// Receives payloads for one topic subscription.
pub type ChannelHandler = Box<dyn Fn(&[u8]) + Send + Sync>;

/// A subscription registered with a topic [`Reader`](super::Reader).
///
/// Only messages framed with a generation at least `reader_gen` are
/// delivered, so a new channel never sees messages from an older epoch.
pub struct ChannelReader {
    topic: String,
    handle_descendants: bool,
    reader_gen: u64,
    handler: ChannelHandler,
}

impl ChannelReader {
    pub(crate) fn new(
        topic: String,
        handle_descendants: bool,
        reader_gen: u64,
        handler: ChannelHandler,
    ) -> Self {
        Self {
            topic,
            handle_descendants,
            reader_gen,
            handler,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn handle_descendants(&self) -> bool {
        self.handle_descendants
    }

    pub fn reader_gen(&self) -> u64 {
        self.reader_gen
    }

    pub(crate) fn deliver(&self, payload: &[u8]) {
        (self.handler)(payload)
    }
}

impl fmt::Debug for ChannelReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelReader")
            .field("topic", &self.topic)
            .field("handle_descendants", &self.handle_descendants)
            .field("reader_gen", &self.reader_gen)
            .finish_non_exhaustive()
    }
}
