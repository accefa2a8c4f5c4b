//! Shared protocol pieces for stagewire: the line-delimited [`StreamEvent`]
//! wire format, its encoder and incremental decoder, and the schema model
//! used to validate full and in-progress stage output.

/// Line encoder and incremental line decoder.
pub mod codec;
/// Stage ids, tool names and output schemas of the counselor pipeline.
pub mod counselor;
/// Protocol and schema error types.
pub mod errors;
/// Wire event type.
pub mod event;
/// Process-wide logging setup.
pub mod observability;
/// Full and deep-partial structural validation.
pub mod schema;

pub use codec::{LineDecoder, NDJSON_CONTENT_TYPE, encode_line};
pub use errors::{ProtocolError, SchemaError};
pub use event::StreamEvent;
pub use observability::{LogSink, ObservabilityConfig, Role, init_observability};
pub use schema::{Field, Mode, Schema};
