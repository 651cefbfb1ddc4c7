//! Change event consumer.
//!
//! A [`ConsumerLoop`] polls one topic through a [`crate::broker::MessageSource`]
//! and hands each message to a [`MessageHandler`]. Domain events go through
//! [`ChangeEventHandler`], which classifies the payload and dispatches it to
//! its reconciliation routine.

pub mod classify;
mod handler;
mod stream;

pub use classify::{classify, Classified, ClassifiedBy};
pub use handler::{CdcHandler, ChangeEventHandler, Disposition, MessageHandler};
pub use stream::{ConsumerLoop, ConsumerState, StreamConfig, StreamStats};
