use async_trait::async_trait;
use std::pin::Pin;

use crate::core::error::ProviderError;
use crate::core::message::Turn;

/// One-shot, ordered sequence of assistant text fragments.
///
/// The sequence ends with `None` on normal completion or after yielding a
/// single `Err`. Dropping it early releases the underlying response.
pub type FragmentStream =
    Pin<Box<dyn futures_core::Stream<Item = Result<String, ProviderError>> + Send>>;

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Issues one chat-completion request for `history` and returns the reply
    /// as a fragment stream. Non-success responses fail here, before any
    /// fragment is produced. There is no retry.
    async fn stream(&self, history: &[Turn]) -> Result<FragmentStream, ProviderError>;

    /// Releases the persistent connection. Safe to call repeatedly.
    async fn shutdown(&self);

    fn model_id(&self) -> &str;
}
