use crate::core::message::Turn;
use crate::core::session::{Session, SessionId};

/// Consumer of engine notifications.
///
/// Every method is called from the presentation context only, never from
/// the network context, so implementations need not be `Send`.
pub trait PresentationSink {
    /// After a session is created or selected, or a title is derived.
    fn on_session_list_changed(&mut self, sessions: &[Session], active_index: usize);

    /// One streamed fragment, or the error text of a failed send.
    fn on_append_text(&mut self, session: SessionId, fragment: &str);

    /// A turn has been appended to `session`'s history.
    fn on_turn_committed(&mut self, _session: SessionId, _turn: &Turn) {}
}
