pub mod endpoint;
pub mod file;
pub mod listener;

pub use endpoint::{ChannelListener, PeerStream};
pub use file::{FileSourceError, FileSourceReader, file_stamp};
pub use listener::{
    DEFAULT_RECONNECT_BACKOFF, DrainSummary, ListenerError, ListenerHandle, ListenerState,
    LiveSourceListener,
};
