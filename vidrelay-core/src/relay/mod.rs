//! Stream relay: moves the selected encoding's bytes to a consumer.
//!
//! The relay is a single ordered copy loop with a bounded transfer window.
//! It opens its source lazily, declares the content type before the first
//! byte, and reacts to consumer disconnection, cancellation and an
//! optional deadline. Once bytes have been written the only way to report
//! a failure is to cut the stream short.

pub mod copy;
pub mod http;
pub mod sinks;
pub mod traits;

pub use copy::{RelayOptions, RelayReport, relay};
pub use http::{HttpByteSource, HttpSourceOpener};
pub use sinks::{BodyChunk, ChannelReceiver, ChannelSink, WriterSink, channel_sink};
pub use traits::{ByteSink, ByteSource, RelayError, SinkError, SourceOpener};
