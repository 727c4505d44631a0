//! Modality listeners and their registry.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{DispatchError, Result};
use crate::scope::{DisposalScope, Release, ScopeWatch};

/// Observer of modal stack transitions.
///
/// Called once with `entering = true` for every enter and once with
/// `entering = false` for every matching leave. Returning `Err` aborts the
/// delivery of that event and surfaces as [`DispatchError::Listener`].
pub trait ModalityListener: Send {
	fn modality_changed(&self, entering: bool) -> std::result::Result<(), String>;
}

impl<F> ModalityListener for F
where
	F: Fn(bool) -> std::result::Result<(), String> + Send,
{
	fn modality_changed(&self, entering: bool) -> std::result::Result<(), String> {
		self(entering)
	}
}

/// Registration handle returned by
/// [`Dispatcher::add_modality_listener`](crate::Dispatcher::add_modality_listener).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
	#[inline]
	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for ListenerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Holds the listener so scope release can drop it from any thread.
struct Slot(Mutex<Option<Box<dyn ModalityListener>>>);

impl Release for Slot {
	fn release(&self) {
		// A slot locked mid-delivery is emptied by the next prune instead.
		if let Ok(mut listener) = self.0.try_lock() {
			listener.take();
		}
	}
}

struct Registration {
	id: ListenerId,
	scope: ScopeWatch,
	slot: Arc<Slot>,
}

/// Listeners in registration order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
	next_id: u64,
	entries: Vec<Registration>,
}

impl ListenerRegistry {
	/// Registers `listener`. The listener is dropped as soon as `scope` is
	/// released, even without a later delivery.
	pub fn add(&mut self, listener: Box<dyn ModalityListener>, scope: &DisposalScope) -> ListenerId {
		self.prune();
		self.next_id = self.next_id.wrapping_add(1);
		let id = ListenerId(self.next_id);
		let slot = Arc::new(Slot(Mutex::new(Some(listener))));
		let hook: Arc<dyn Release> = slot.clone();
		scope.on_release(&hook);
		self.entries.push(Registration {
			id,
			scope: scope.watch(),
			slot,
		});
		id
	}

	/// Removes one registration. Unknown IDs are ignored.
	pub fn remove(&mut self, id: ListenerId) -> bool {
		let before = self.entries.len();
		self.entries.retain(|entry| entry.id != id);
		before != self.entries.len()
	}

	/// Drops registrations whose scope was released.
	pub fn prune(&mut self) -> usize {
		let before = self.entries.len();
		self.entries.retain(|entry| {
			let released = entry.scope.is_released();
			if released {
				tracing::trace!(listener = entry.id.0, "modality.listener.disposed");
			}
			!released
		});
		before - self.entries.len()
	}

	/// Delivers one event to every live listener, in registration order.
	///
	/// Stops at the first listener error.
	pub fn deliver(&mut self, entering: bool) -> Result<()> {
		self.prune();
		for entry in &self.entries {
			// Scopes can be released by a listener earlier in this delivery.
			if entry.scope.is_released() {
				continue;
			}
			let slot = entry.slot.0.lock().unwrap_or_else(PoisonError::into_inner);
			let Some(listener) = slot.as_ref() else {
				continue;
			};
			if let Err(message) = listener.modality_changed(entering) {
				tracing::warn!(listener = entry.id.0, entering, %message, "modality.listener.failed");
				return Err(DispatchError::Listener {
					listener: entry.id,
					entering,
					message,
				});
			}
		}
		Ok(())
	}

	pub fn len(&mut self) -> usize {
		self.prune();
		self.entries.len()
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}
}
