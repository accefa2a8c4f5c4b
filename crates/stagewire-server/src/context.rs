use std::sync::Arc;

use stagewire_core::StreamEvent;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::demux::{DemuxConfig, Demultiplexer};
use crate::errors::ServerError;
use crate::pipeline::{PipelineEngine, PipelineRequest};

/// Runtime dependencies shared by every request.
///
/// Built once at startup and handed to the router as state; cloning is cheap.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<AppContextInner>,
}

struct AppContextInner {
    engine: Arc<dyn PipelineEngine>,
    demux: Arc<Demultiplexer>,
    config: ServerConfig,
}

impl AppContext {
    pub fn builder() -> AppContextBuilder {
        AppContextBuilder::default()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn engine_name(&self) -> &str {
        self.inner.engine.name()
    }

    /// Starts a pipeline run for `message` and returns its wire events.
    ///
    /// Start failures are reported in-band as a single error event so the
    /// caller always gets a stream.
    pub async fn open_stream(&self, message: String) -> mpsc::Receiver<StreamEvent> {
        let request = PipelineRequest::new(message, self.inner.config.max_steps);
        let request_id = request.request_id;
        match self.inner.engine.start(request).await {
            Ok(run) => {
                info!(
                    event = "http.pipeline_stream_opened",
                    domain = "http",
                    engine = self.inner.engine.name(),
                    request_id = %request_id,
                    run_id = %run.run_id,
                    "streaming pipeline run"
                );
                self.inner
                    .demux
                    .spawn(run, self.inner.config.stream_buffer_capacity)
            }
            Err(err) => {
                error!(
                    event = "http.pipeline_start_failed",
                    domain = "http",
                    request_id = %request_id,
                    error = %err,
                    "pipeline did not start"
                );
                single_event(StreamEvent::error(err.to_string()))
            }
        }
    }
}

pub(crate) fn single_event(event: StreamEvent) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(1);
    let _ = tx.try_send(event);
    rx
}

#[derive(Default)]
pub struct AppContextBuilder {
    engine: Option<Arc<dyn PipelineEngine>>,
    demux: Option<DemuxConfig>,
    config: Option<ServerConfig>,
}

impl AppContextBuilder {
    pub fn engine(mut self, engine: impl PipelineEngine) -> Self {
        self.engine = Some(Arc::new(engine));
        self
    }

    pub fn shared_engine(mut self, engine: Arc<dyn PipelineEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn demux_config(mut self, config: DemuxConfig) -> Self {
        self.demux = Some(config);
        self
    }

    pub fn server_config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<AppContext, ServerError> {
        let engine = self
            .engine
            .ok_or_else(|| ServerError::Config("no pipeline engine configured".into()))?;
        let config = self.config.unwrap_or_default().validated()?;
        let demux = Arc::new(Demultiplexer::new(self.demux.unwrap_or_default()));
        Ok(AppContext {
            inner: Arc::new(AppContextInner {
                engine,
                demux,
                config,
            }),
        })
    }
}
