//! Server half of stagewire: runs a pipeline engine per request and streams
//! its demultiplexed events as newline-delimited JSON.

pub mod config;
pub mod context;
/// Internal feed to wire event translation.
pub mod demux;
pub mod errors;
/// HTTP router and listener.
pub mod http;
/// Engine contract and internal feed types.
pub mod pipeline;
/// Replay engine backed by JSON-lines scripts.
pub mod scripted;

pub use config::ServerConfig;
pub use context::{AppContext, AppContextBuilder};
pub use demux::{DemuxConfig, Demultiplexer, ToolRoute};
pub use errors::{PipelineError, ServerError};
pub use http::{router, serve, serve_on};
pub use pipeline::{
    AbortHandle, AbortSignal, GenerationChunk, PipelineEngine, PipelineEvent, PipelineOutcome,
    PipelineRequest, PipelineRun,
};
pub use scripted::{Script, ScriptStep, ScriptedEngine};
