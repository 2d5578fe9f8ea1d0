/// Lifecycle of a single send.
///
/// `Idle -> Sending -> Streaming -> Completed | Failed`. `Sending` may fail
/// directly when the request is rejected before any stream opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
}

impl SendState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SendState::Completed | SendState::Failed)
    }

    pub fn can_transition_to(self, next: SendState) -> bool {
        use SendState::*;
        matches!(
            (self, next),
            (Idle, Sending)
                | (Sending, Streaming)
                | (Sending, Failed)
                | (Sending, Completed)
                | (Streaming, Streaming)
                | (Streaming, Completed)
                | (Streaming, Failed)
        )
    }

    /// Moves to `next` if allowed, otherwise stays put. Returns the resulting state.
    pub fn advance(&mut self, next: SendState) -> SendState {
        if self.can_transition_to(next) {
            if *self != next {
                tracing::debug!(from = ?*self, to = ?next, "send state");
            }
            *self = next;
        } else {
            tracing::warn!(from = ?*self, to = ?next, "ignoring invalid send transition");
        }
        *self
    }
}
