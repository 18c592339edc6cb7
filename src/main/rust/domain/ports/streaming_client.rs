use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::errors::{ConnectError, PublishError, Result};
use crate::domain::value_objects::{EndpointConfig, MediaFrame, StreamKey};

/// Port for the streaming protocol client (RTMP or equivalent)
#[async_trait]
pub trait StreamingClient: Send + Sync {
    /// Establish a connection to the endpoint. Timeouts are the client's concern.
    async fn connect(
        &self,
        endpoint: &EndpointConfig,
    ) -> std::result::Result<Box<dyn StreamConnection>, ConnectError>;
}

/// An established connection, not yet or already publishing
#[async_trait]
pub trait StreamConnection: Send + Sync {
    /// Announce the outbound stream and return the sink accepting media
    async fn publish(
        &mut self,
        stream_key: &StreamKey,
    ) -> std::result::Result<Arc<dyn MediaSink>, PublishError>;

    /// Tear the connection down; errors are reported but never acted upon
    async fn close(&mut self) -> Result<()>;

    /// Becomes `Some(reason)` when the connection is lost asynchronously
    fn loss_signal(&self) -> watch::Receiver<Option<String>>;
}

/// Accepts timestamped media for the published stream
pub trait MediaSink: Send + Sync {
    fn write(&self, frame: MediaFrame) -> Result<()>;
}
