//! Error types for dispatching and configuration.

use std::path::PathBuf;
use std::thread::ThreadId;

use thiserror::Error;

use crate::context::ModalOwner;
use crate::listener::ListenerId;

/// Errors raised by modal stack operations and the UI thread.
///
/// Variants reported by [`DispatchError::is_precondition`] are programming
/// errors; the dispatcher leaves its state untouched when returning one.
#[derive(Debug, Error)]
pub enum DispatchError {
	/// A dispatcher was touched from a thread other than the one owning it.
	#[error("dispatcher is bound to thread {owner:?} but was called from {caller:?}")]
	WrongThread {
		/// Thread the dispatcher was created on.
		owner: ThreadId,
		/// Thread that made the call.
		caller: ThreadId,
	},

	/// The owner is already part of the modal stack.
	#[error("{0} is already modal")]
	AlreadyModal(ModalOwner),

	/// The owner is not part of the modal stack.
	#[error("{0} is not modal")]
	NotModal(ModalOwner),

	/// The owner is modal but other owners entered after it are still open.
	#[error("cannot leave {owner}: {top} entered later and is still modal")]
	UnbalancedLeave {
		/// Owner whose leave was requested.
		owner: ModalOwner,
		/// Current top of the stack.
		top: ModalOwner,
	},

	/// The UI thread tried to wait for work queued on itself.
	#[error("UI thread cannot block on its own command queue")]
	Reentrant,

	/// A modality listener returned an error during delivery.
	#[error("modality listener {listener} failed (entering={entering}): {message}")]
	Listener {
		/// Listener that failed.
		listener: ListenerId,
		/// Event being delivered.
		entering: bool,
		/// Error reported by the listener.
		message: String,
	},

	/// A closure passed to [`UiHandle::call`](crate::UiHandle::call) panicked.
	/// The UI thread keeps running.
	#[error("call panicked on the UI thread: {0}")]
	CallPanicked(String),

	/// The UI thread has exited, or dropped a call without answering it.
	#[error("UI thread stopped or abandoned the call")]
	UiThreadGone,

	/// The UI thread could not be started.
	#[error("failed to start UI thread: {0}")]
	Spawn(#[from] std::io::Error),
}

impl DispatchError {
	/// Returns true for broken preconditions (as opposed to runtime failures).
	pub const fn is_precondition(&self) -> bool {
		matches!(
			self,
			Self::WrongThread { .. }
				| Self::Reentrant
				| Self::AlreadyModal(_)
				| Self::NotModal(_)
				| Self::UnbalancedLeave { .. }
		)
	}
}

/// Result type for dispatcher operations.
pub type Result<T, E = DispatchError> = std::result::Result<T, E>;

/// Errors that can occur when loading dispatcher configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or field types.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A field holds a value outside its allowed range.
	#[error("invalid value for '{field}': {reason}")]
	Invalid {
		field: &'static str,
		reason: &'static str,
	},
}
