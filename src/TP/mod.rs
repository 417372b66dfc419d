// TP: topic framing and channel dispatch on top of RMP.

pub mod async_writer;
pub mod channel_reader;
pub mod reader;
pub mod reader_info;
pub mod topic_msg;

pub use async_writer::{AsyncWriter, BackpressureHandler};
pub use channel_reader::{ChannelHandler, ChannelReader};
pub use reader::{ChannelReaderEvent, EventHandler, Reader};
pub use reader_info::{TopicInfoHeader, TopicReaderInfo};
pub use topic_msg::{
    deserialize, deserialize_and_filter, framed_size, serialize, topic_matches, TopicMessage,
    TopicMessageView,
};
