use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::core::error::{error_marker, EngineError, ProviderError};
use crate::core::message::Turn;
use crate::core::provider::ChatProvider;
use crate::core::session::{SessionId, SessionRegistry};
use crate::engine::dispatch::{run_send, NetworkContext};
use crate::engine::event::{DispatchEvent, DispatchEventKind, SendId};
use crate::engine::sink::PresentationSink;
use crate::engine::state::SendState;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-send bookkeeping, alive from submit until the stream terminates.
struct SendContext {
    session_id: SessionId,
    state: SendState,
    /// Everything forwarded to the sink so far; committed verbatim on success.
    transcript: String,
    cancel: CancellationToken,
}

/// Owns the session registry on the presentation context and bridges sends
/// to the network context.
///
/// All session mutation happens in methods of this type, which must only be
/// called from the presentation context. Network tasks report back through
/// a channel drained by [`pump`](Self::pump) or
/// [`run_until_idle`](Self::run_until_idle).
pub struct ChatController<S: PresentationSink> {
    registry: SessionRegistry,
    sink: S,
    provider: Arc<dyn ChatProvider>,
    network: NetworkContext,
    events_tx: mpsc::Sender<DispatchEvent>,
    events_rx: mpsc::Receiver<DispatchEvent>,
    in_flight: HashMap<SendId, SendContext>,
    next_send_id: u64,
}

impl<S: PresentationSink> ChatController<S> {
    pub fn new(provider: Arc<dyn ChatProvider>, network: NetworkContext, sink: S) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut controller = Self {
            registry: SessionRegistry::new(),
            sink,
            provider,
            network,
            events_tx,
            events_rx,
            in_flight: HashMap::new(),
            next_send_id: 0,
        };
        controller.notify_session_list();
        controller
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    pub fn create_session(&mut self) -> SessionId {
        let id = self.registry.create_session();
        self.notify_session_list();
        id
    }

    /// Out-of-range indices are a no-op. In-flight sends keep running and
    /// still commit to the session they were started on.
    pub fn select_session(&mut self, index: usize) -> bool {
        let selected = self.registry.select_session(index);
        if selected {
            self.notify_session_list();
        }
        selected
    }

    /// Submits `text` to the active session.
    pub fn submit(&mut self, text: &str) -> Result<SendId, EngineError> {
        let session_id = self.registry.active_id();
        self.submit_to(session_id, text)
    }

    pub fn submit_to(&mut self, session_id: SessionId, text: &str) -> Result<SendId, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        if self.registry.get(session_id).is_none() {
            return Err(EngineError::SessionNotFound(session_id));
        }

        let mut state = SendState::Idle;
        state.advance(SendState::Sending);

        // Nothing is committed until the send is actually running.
        let user_turn = Turn::user(text);
        let mut history = self
            .registry
            .get(session_id)
            .map(|s| s.turns().to_vec())
            .unwrap_or_default();
        history.push(user_turn.clone());

        let send_id = SendId(self.next_send_id);
        let cancel = CancellationToken::new();

        self.network.spawn(run_send(
            Arc::clone(&self.provider),
            send_id,
            history,
            self.events_tx.clone(),
            cancel.clone(),
        ))?;
        self.next_send_id += 1;

        self.registry.append_turn(session_id, user_turn.clone());
        self.sink.on_turn_committed(session_id, &user_turn);
        self.registry.derive_title_if_needed(session_id);
        self.notify_session_list();

        tracing::debug!(%send_id, session = %session_id, "send started");
        self.in_flight.insert(
            send_id,
            SendContext {
                session_id,
                state,
                transcript: String::new(),
                cancel,
            },
        );
        Ok(send_id)
    }

    /// Abandons a send: the network task is cancelled, its connection
    /// released, and no further fragment or turn for it reaches the sink.
    pub fn cancel(&mut self, send_id: SendId) -> bool {
        match self.in_flight.remove(&send_id) {
            Some(ctx) => {
                ctx.cancel.cancel();
                tracing::debug!(%send_id, session = %ctx.session_id, "send abandoned");
                true
            }
            None => false,
        }
    }

    pub fn cancel_session(&mut self, session_id: SessionId) -> usize {
        let ids: Vec<SendId> = self
            .in_flight
            .iter()
            .filter(|(_, ctx)| ctx.session_id == session_id)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    pub fn cancel_all(&mut self) -> usize {
        let ids: Vec<SendId> = self.in_flight.keys().copied().collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    pub fn send_state(&self, send_id: SendId) -> Option<SendState> {
        self.in_flight.get(&send_id).map(|ctx| ctx.state)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_sending(&self, session_id: SessionId) -> bool {
        self.in_flight.values().any(|ctx| ctx.session_id == session_id)
    }

    /// Handles every event already queued without blocking. Returns the
    /// number of events handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Blocks until one event arrives and handles it. Returns false without
    /// blocking when no send is in flight.
    pub fn wait_event(&mut self) -> bool {
        if self.in_flight.is_empty() {
            return false;
        }
        match self.events_rx.blocking_recv() {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Blocks until every in-flight send has completed or failed.
    pub fn run_until_idle(&mut self) {
        while self.wait_event() {}
    }

    /// Like [`run_until_idle`](Self::run_until_idle), but a notification on
    /// `interrupt` abandons every in-flight send. Returns true if interrupted.
    pub fn run_until_idle_or(&mut self, interrupt: &Notify) -> bool {
        while !self.in_flight.is_empty() {
            let rx = &mut self.events_rx;
            let next = self.network.block_on(async {
                tokio::select! {
                    biased;
                    _ = interrupt.notified() => None,
                    event = rx.recv() => event.map(Some),
                }
            });
            match next {
                Ok(Some(Some(event))) => self.handle_event(event),
                Ok(Some(None)) => return false,
                Ok(None) => {
                    let abandoned = self.cancel_all();
                    tracing::debug!(abandoned, "sends interrupted");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cannot wait for events");
                    return false;
                }
            }
        }
        false
    }

    /// Cancels outstanding sends, releases the API connection and stops the
    /// network context.
    pub fn shutdown(&mut self) {
        self.cancel_all();
        if self.network.is_running() {
            let provider = Arc::clone(&self.provider);
            let released = self
                .network
                .spawn(async move { provider.shutdown().await })
                .and_then(|handle| self.network.block_on(handle));
            match released {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "API connection release task failed"),
                Err(e) => tracing::warn!(error = %e, "failed to release API connection"),
            }
        }
        self.network.shutdown();
    }

    fn handle_event(&mut self, event: DispatchEvent) {
        let send_id = event.send_id;
        let Some(ctx) = self.in_flight.get_mut(&send_id) else {
            tracing::trace!(%send_id, "discarding event for abandoned send");
            return;
        };

        match event.kind {
            DispatchEventKind::Opened => {
                ctx.state.advance(SendState::Streaming);
            }
            DispatchEventKind::Fragment { text } => {
                ctx.state.advance(SendState::Streaming);
                ctx.transcript.push_str(&text);
                let session_id = ctx.session_id;
                self.sink.on_append_text(session_id, &text);
            }
            DispatchEventKind::Completed => {
                if let Some(mut ctx) = self.in_flight.remove(&send_id) {
                    ctx.state.advance(SendState::Completed);
                    self.commit(ctx.session_id, Turn::assistant(ctx.transcript));
                }
            }
            DispatchEventKind::Failed { error } => {
                if let Some(mut ctx) = self.in_flight.remove(&send_id) {
                    ctx.state.advance(SendState::Failed);
                    self.fail(send_id, ctx.session_id, &error);
                }
            }
        }
    }

    fn fail(&mut self, send_id: SendId, session_id: SessionId, error: &ProviderError) {
        tracing::warn!(%send_id, error = %error, "send failed");
        let marker = error_marker(error);
        self.sink.on_append_text(session_id, &marker);
        self.commit(session_id, Turn::assistant(marker));
    }

    fn commit(&mut self, session_id: SessionId, turn: Turn) {
        if self.registry.append_turn(session_id, turn.clone()) {
            self.sink.on_turn_committed(session_id, &turn);
        }
    }

    fn notify_session_list(&mut self) {
        self.sink
            .on_session_list_changed(self.registry.sessions(), self.registry.active_index());
    }
}

impl<S: PresentationSink> Drop for ChatController<S> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
