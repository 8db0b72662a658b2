//! Conversation state and ask-exchange orchestration.

pub mod ask;
pub mod context;
pub mod router;

pub use ask::{AskCallbacks, AskHandle, AskOptions, AskSession};
pub use context::{ConversationContext, Role, Turn};
pub use router::{EventRouter, RouteOutcome};
