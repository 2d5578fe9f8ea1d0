pub mod controller;
pub mod dispatch;
pub mod event;
pub mod sink;
pub mod state;

pub use controller::ChatController;
pub use dispatch::NetworkContext;
pub use event::{DispatchEvent, DispatchEventKind, SendId};
pub use sink::PresentationSink;
pub use state::SendState;
