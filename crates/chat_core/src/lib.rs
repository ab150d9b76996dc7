//! Chat turn handling: conversation state, the turn controller, and the
//! worker thread that runs turns off the caller's thread.

pub mod controller;
pub mod conversation;
pub mod worker;

pub use controller::{TurnController, TurnError, TurnResult};
pub use conversation::Conversation;
pub use worker::{ChatWorker, TurnEvent};
