// Topic framing: `readerGeneration:u64 LE | postToDescendants:u8 | topic\0 | payload`.

use std::sync::Arc;

use crate::error::{BusError, Result};

const GEN_SIZE: usize = 8;
const FLAG_SIZE: usize = 1;

/// A framed topic message, shareable between the publish queue and callers.
pub type TopicMessage = Arc<[u8]>;

/// Framed size of a message for `topic` carrying `payload_len` bytes.
pub fn framed_size(topic: &str, payload_len: usize) -> usize {
    GEN_SIZE + FLAG_SIZE + topic.len() + 1 + payload_len
}

pub fn serialize(
    reader_gen: u64,
    post_to_descendants: bool,
    topic: &str,
    payload: &[u8],
) -> Result<Vec<u8>> {
    if topic.as_bytes().contains(&0) {
        return Err(BusError::InvalidTopic);
    }
    let mut buf = Vec::with_capacity(framed_size(topic, payload.len()));
    buf.extend_from_slice(&reader_gen.to_le_bytes());
    buf.push(post_to_descendants as u8);
    buf.extend_from_slice(topic.as_bytes());
    buf.push(0);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Borrowed view of a framed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicMessageView<'a> {
    pub reader_gen: u64,
    pub post_to_descendants: bool,
    pub topic: &'a [u8],
    pub payload: &'a [u8],
}

/// `None` for truncated input or a topic without terminator.
pub fn deserialize(data: &[u8]) -> Option<TopicMessageView<'_>> {
    if data.len() < GEN_SIZE + FLAG_SIZE + 1 {
        return None;
    }
    let (gen, rest) = data.split_at(GEN_SIZE);
    let reader_gen = u64::from_le_bytes(gen.try_into().ok()?);
    let post_to_descendants = rest[0] != 0;
    let rest = &rest[FLAG_SIZE..];
    let nul = rest.iter().position(|&b| b == 0)?;
    Some(TopicMessageView {
        reader_gen,
        post_to_descendants,
        topic: &rest[..nul],
        payload: &rest[nul + 1..],
    })
}

/// Payload of `data` if a channel reader with this generation, topic and
/// descendant flag should receive it.
pub fn deserialize_and_filter<'a>(
    data: &'a [u8],
    reader_gen: u64,
    reader_topic: &str,
    handle_descendants: bool,
) -> Option<&'a [u8]> {
    let msg = deserialize(data)?;
    if msg.reader_gen < reader_gen {
        return None;
    }
    topic_matches(
        reader_topic.as_bytes(),
        handle_descendants,
        msg.topic,
        msg.post_to_descendants,
    )
    .then_some(msg.payload)
}

/// Plain string-prefix matching: a reader on `/a` handling descendants also
/// receives `/ab`.
pub fn topic_matches(
    reader_topic: &[u8],
    handle_descendants: bool,
    writer_topic: &[u8],
    post_to_descendants: bool,
) -> bool {
    let common = reader_topic
        .iter()
        .zip(writer_topic)
        .take_while(|(r, w)| r == w)
        .count();
    let reader_end = common == reader_topic.len();
    let writer_end = common == writer_topic.len();

    (reader_end && writer_end)
        || (post_to_descendants && writer_end)
        || (handle_descendants && reader_end)
}
