use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::errors::{ConnectError, PublishError, Result};
use crate::domain::ports::{MediaSink, StreamConnection, StreamingClient};
use crate::domain::value_objects::{EndpointConfig, MediaFrame, PublishState, StreamKey};

/// Handle to a published stream; frames forwarded through it reach the sink
/// only while the owning session is still publishing
#[derive(Clone)]
pub struct PublishHandle {
    id: Uuid,
    sink: Arc<dyn MediaSink>,
    publishing: Arc<AtomicBool>,
}

impl PublishHandle {
    pub fn new(sink: Arc<dyn MediaSink>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sink,
            publishing: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_publishing(&self) -> bool {
        self.publishing.load(Ordering::Acquire)
    }

    /// `Ok(false)` when the session stopped publishing; that is not an error
    pub fn forward(&self, frame: MediaFrame) -> Result<bool> {
        if !self.is_publishing() {
            return Ok(false);
        }
        self.sink.write(frame)?;
        Ok(true)
    }

    pub(crate) fn revoke(&self) {
        self.publishing.store(false, Ordering::Release);
    }
}

impl fmt::Debug for PublishHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishHandle")
            .field("id", &self.id)
            .field("publishing", &self.is_publishing())
            .finish()
    }
}

struct PublishInner {
    state: PublishState,
    connection: Option<Box<dyn StreamConnection>>,
    handle: Option<PublishHandle>,
    // Bumped by close(); an in-flight connect/publish that observes a
    // different value on completion was aborted.
    generation: u64,
}

/// Owns the network connection and publish handle to the streaming endpoint
pub struct PublishSession {
    client: Arc<dyn StreamingClient>,
    inner: Mutex<PublishInner>,
}

impl PublishSession {
    pub fn new(client: Arc<dyn StreamingClient>) -> Self {
        Self {
            client,
            inner: Mutex::new(PublishInner {
                state: PublishState::Disconnected,
                connection: None,
                handle: None,
                generation: 0,
            }),
        }
    }

    pub fn state(&self) -> PublishState {
        self.inner.lock().state
    }

    pub fn handle(&self) -> Option<PublishHandle> {
        self.inner.lock().handle.clone()
    }

    /// Loss notifications for the current connection, if any
    pub fn loss_signal(&self) -> Option<watch::Receiver<Option<String>>> {
        self.inner
            .lock()
            .connection
            .as_ref()
            .map(|connection| connection.loss_signal())
    }

    /// Disconnected -> Connecting -> ConnectedUnpublished
    pub async fn connect(&self, endpoint: &EndpointConfig) -> std::result::Result<(), ConnectError> {
        let generation = {
            let mut inner = self.inner.lock();
            if !inner.state.can_connect() {
                return Err(ConnectError::AlreadyConnected);
            }
            inner.state = PublishState::Connecting;
            inner.generation
        };

        tracing::info!(endpoint = %endpoint.url(), "Connecting to streaming endpoint");
        let result = self.client.connect(endpoint).await;

        let stale = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                result.ok()
            } else {
                match result {
                    Ok(connection) => {
                        inner.connection = Some(connection);
                        inner.state = PublishState::ConnectedUnpublished;
                        tracing::info!(endpoint = %endpoint.url(), "Connected");
                        return Ok(());
                    }
                    Err(e) => {
                        inner.state = PublishState::Disconnected;
                        tracing::warn!(endpoint = %endpoint.url(), "Connect failed: {}", e);
                        return Err(e);
                    }
                }
            }
        };

        tracing::info!("Connect completed after close; discarding connection");
        if let Some(connection) = stale {
            Self::close_quietly(connection).await;
        }
        Err(ConnectError::Aborted)
    }

    /// ConnectedUnpublished -> Publishing
    pub async fn publish(&self, stream_key: &StreamKey) -> std::result::Result<PublishHandle, PublishError> {
        let (mut connection, generation) = {
            let mut inner = self.inner.lock();
            if !inner.state.can_publish() {
                return Err(PublishError::NotConnected);
            }
            let connection = inner.connection.take().ok_or(PublishError::NotConnected)?;
            (connection, inner.generation)
        };

        tracing::info!(stream_key = %stream_key, "Publishing stream");
        let result = connection.publish(stream_key).await;

        {
            let mut inner = self.inner.lock();
            if inner.generation == generation {
                inner.connection = Some(connection);
                return match result {
                    Ok(sink) => {
                        let handle = PublishHandle::new(sink);
                        inner.handle = Some(handle.clone());
                        inner.state = PublishState::Publishing;
                        tracing::info!(publish_id = %handle.id(), "Publishing");
                        Ok(handle)
                    }
                    Err(e) => {
                        tracing::warn!(stream_key = %stream_key, "Publish failed: {}", e);
                        Err(e)
                    }
                };
            }
        }

        tracing::info!("Publish completed after close; discarding connection");
        Self::close_quietly(connection).await;
        Err(PublishError::Aborted)
    }

    /// Tear down from any state. Idempotent; teardown errors are logged only.
    pub async fn close(&self) {
        let (connection, handle, previous) = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            let previous = std::mem::replace(&mut inner.state, PublishState::Disconnected);
            (inner.connection.take(), inner.handle.take(), previous)
        };

        if let Some(handle) = handle {
            handle.revoke();
        }
        if let Some(connection) = connection {
            Self::close_quietly(connection).await;
        }
        if previous != PublishState::Disconnected {
            tracing::info!(from = %previous, "Publish session closed");
        }
    }

    async fn close_quietly(mut connection: Box<dyn StreamConnection>) {
        if let Err(e) = connection.close().await {
            tracing::warn!("Error during publish teardown (ignored): {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::test_support::ScriptedClient;
    use crate::domain::value_objects::VideoFrame;

    fn endpoint() -> EndpointConfig {
        EndpointConfig::new("rtmp://localhost/live".to_string()).unwrap()
    }

    fn key() -> StreamKey {
        StreamKey::new("key1").unwrap()
    }

    #[tokio::test]
    async fn test_connect_then_publish() {
        let client = ScriptedClient::new();
        let session = PublishSession::new(Arc::new(client.clone()));

        session.connect(&endpoint()).await.unwrap();
        assert_eq!(session.state(), PublishState::ConnectedUnpublished);

        let handle = session.publish(&key()).await.unwrap();
        assert_eq!(session.state(), PublishState::Publishing);
        assert!(handle.forward(VideoFrame::new(0, vec![1]).into()).unwrap());
        assert_eq!(client.sink().count(), 1);
    }

    #[tokio::test]
    async fn test_publish_requires_connection() {
        let session = PublishSession::new(Arc::new(ScriptedClient::new()));
        let result = session.publish(&key()).await;
        assert_eq!(result.unwrap_err(), PublishError::NotConnected);
        assert_eq!(session.state(), PublishState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_failure_returns_to_disconnected() {
        let client = ScriptedClient::new().fail_connect(ConnectError::Timeout);
        let session = PublishSession::new(Arc::new(client));

        let result = session.connect(&endpoint()).await;
        assert_eq!(result, Err(ConnectError::Timeout));
        assert_eq!(session.state(), PublishState::Disconnected);
    }

    #[tokio::test]
    async fn test_publish_failure_stays_connected_until_close() {
        let client = ScriptedClient::new()
            .fail_publish(PublishError::ServerRejected("bad key".to_string()));
        let session = PublishSession::new(Arc::new(client.clone()));

        session.connect(&endpoint()).await.unwrap();
        assert!(session.publish(&key()).await.is_err());
        assert_eq!(session.state(), PublishState::ConnectedUnpublished);

        session.close().await;
        assert_eq!(session.state(), PublishState::Disconnected);
        assert_eq!(client.closes(), 1);
    }

    #[tokio::test]
    async fn test_close_revokes_handle_and_is_idempotent() {
        let client = ScriptedClient::new();
        let session = PublishSession::new(Arc::new(client.clone()));
        session.connect(&endpoint()).await.unwrap();
        let handle = session.publish(&key()).await.unwrap();

        session.close().await;
        session.close().await;

        assert!(!handle.is_publishing());
        assert!(!handle.forward(VideoFrame::new(0, vec![1]).into()).unwrap());
        assert_eq!(client.sink().count(), 0);
        assert_eq!(client.closes(), 1);
    }

    #[tokio::test]
    async fn test_teardown_errors_are_swallowed() {
        let client = ScriptedClient::new().fail_close();
        let session = PublishSession::new(Arc::new(client.clone()));
        session.connect(&endpoint()).await.unwrap();

        session.close().await;
        assert_eq!(session.state(), PublishState::Disconnected);
    }

    #[tokio::test]
    async fn test_close_during_connect_aborts() {
        let client = ScriptedClient::new().gate_connect();
        let session = Arc::new(PublishSession::new(Arc::new(client.clone())));

        let connecting = {
            let session = session.clone();
            tokio::spawn(async move { session.connect(&endpoint()).await })
        };
        client.wait_connect_started().await;

        session.close().await;
        client.release_connect();

        assert_eq!(connecting.await.unwrap(), Err(ConnectError::Aborted));
        assert_eq!(session.state(), PublishState::Disconnected);
        assert_eq!(client.closes(), 1);
    }

    #[tokio::test]
    async fn test_second_connect_is_rejected() {
        let session = PublishSession::new(Arc::new(ScriptedClient::new()));
        session.connect(&endpoint()).await.unwrap();
        assert_eq!(
            session.connect(&endpoint()).await,
            Err(ConnectError::AlreadyConnected)
        );
    }
}
