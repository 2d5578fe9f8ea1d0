use crate::core::error::ProviderError;

/// Identifies one submit call and its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SendId(pub u64);

impl std::fmt::Display for SendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "send-{}", self.0)
    }
}

/// Message sent from the network context back to the presentation context.
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    pub send_id: SendId,
    pub kind: DispatchEventKind,
}

#[derive(Debug, Clone)]
pub enum DispatchEventKind {
    /// The API accepted the request and the reply stream is open.
    Opened,
    Fragment { text: String },
    Completed,
    Failed { error: ProviderError },
}

impl DispatchEvent {
    pub fn new(send_id: SendId, kind: DispatchEventKind) -> Self {
        Self { send_id, kind }
    }
}
