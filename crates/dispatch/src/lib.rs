//! Modality-ordered deferred action queue.
//!
//! Actions are submitted from any thread tagged with a [`ModalityContext`] and
//! run later on a single UI thread, but only while the modal stack admits
//! their context. Entering and leaving modal state is reported to
//! [`ModalityListener`]s in strict LIFO order.
//!
//! * [`Dispatcher`]: the thread-bound core (stack, listeners, queue).
//! * [`UiThread`] / [`UiHandle`]: a dedicated thread owning one dispatcher.
//! * [`harness::UiScript`]: scripted driver for tests.

use std::any::Any;

/// Deferred actions and the cross-thread submission port.
pub mod action;
/// Dispatcher configuration.
pub mod config;
/// Modal owners and modality contexts.
pub mod context;
/// The thread-bound dispatcher core.
pub mod dispatcher;
/// Error types.
pub mod error;
pub mod harness;
/// Modality listeners.
pub mod listener;
/// Disposal scopes for listener lifetimes.
pub mod scope;
/// LIFO modal owner stack.
pub mod stack;
/// Dedicated UI thread owning a dispatcher.
pub mod ui_thread;

#[cfg(test)]
mod panic_tests;

pub use action::Submitter;
pub use config::DispatcherConfig;
pub use context::{ModalOwner, ModalityContext, OwnerId, ProjectId};
pub use dispatcher::{Dispatcher, FlushReport};
pub use error::{ConfigError, DispatchError, Result};
pub use listener::{ListenerId, ModalityListener};
pub use scope::DisposalScope;
pub use stack::ModalityStack;
pub use ui_thread::{UiHandle, UiThread};

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return (*msg).to_string();
	}
	if let Some(msg) = payload.downcast_ref::<String>() {
		return msg.clone();
	}
	"non-string panic payload".to_string()
}
