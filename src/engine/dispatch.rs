use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::core::error::{EngineError, ProviderError};
use crate::core::message::Turn;
use crate::core::provider::ChatProvider;
use crate::engine::event::{DispatchEvent, DispatchEventKind, SendId};

const NETWORK_THREAD_NAME: &str = "aurora-net";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The single execution context all network I/O runs on.
///
/// Backed by a one-worker tokio runtime on its own thread, so nothing here
/// ever blocks the presentation context.
pub struct NetworkContext {
    runtime: Option<Runtime>,
}

impl NetworkContext {
    pub fn start() -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(NETWORK_THREAD_NAME)
            .enable_all()
            .build()
            .map_err(|e| EngineError::Runtime(e.to_string()))?;
        tracing::debug!("network context started");
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn spawn<F>(&self, future: F) -> Result<JoinHandle<F::Output>, EngineError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime
            .as_ref()
            .map(|rt| rt.spawn(future))
            .ok_or_else(|| EngineError::Runtime("network context is stopped".into()))
    }

    /// Runs `future` on the network context and waits for it. Must not be
    /// called from inside an async task.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, EngineError> {
        self.runtime
            .as_ref()
            .map(|rt| rt.block_on(future))
            .ok_or_else(|| EngineError::Runtime("network context is stopped".into()))
    }

    pub fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
            tracing::debug!("network context stopped");
        }
    }
}

impl Drop for NetworkContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Drives one send on the network context.
///
/// Emits `Opened`, then each fragment in receipt order, then exactly one of
/// `Completed` or `Failed`. On cancellation the stream is dropped (releasing
/// the response) and nothing further is emitted.
pub(crate) async fn run_send(
    provider: Arc<dyn ChatProvider>,
    send_id: SendId,
    history: Vec<Turn>,
    tx: mpsc::Sender<DispatchEvent>,
    cancel: CancellationToken,
) {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        r = forward_stream(&provider, send_id, &history, &tx) => r,
    };

    let kind = match result {
        Ok(()) => DispatchEventKind::Completed,
        Err(ProviderError::Cancelled) => {
            tracing::debug!(%send_id, "send cancelled");
            return;
        }
        Err(error) => DispatchEventKind::Failed { error },
    };

    let _ = tx.send(DispatchEvent::new(send_id, kind)).await;
}

async fn forward_stream(
    provider: &Arc<dyn ChatProvider>,
    send_id: SendId,
    history: &[Turn],
    tx: &mpsc::Sender<DispatchEvent>,
) -> Result<(), ProviderError> {
    let mut stream = provider.stream(history).await?;

    tx.send(DispatchEvent::new(send_id, DispatchEventKind::Opened))
        .await
        .map_err(|_| ProviderError::Cancelled)?;

    while let Some(item) = stream.next().await {
        let text = item?;
        tx.send(DispatchEvent::new(send_id, DispatchEventKind::Fragment { text }))
            .await
            .map_err(|_| ProviderError::Cancelled)?;
    }

    Ok(())
}
