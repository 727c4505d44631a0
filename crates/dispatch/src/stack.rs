//! LIFO stack of modal owners.
//!
//! # Invariants
//!
//! - An owner appears at most once.
//! - Only the top owner can leave; leaving anything else is rejected and
//!   leaves the stack untouched.
//! - [`ModalityStack::current`] always equals the context built from the
//!   owners in entry order.

use crate::context::{ModalOwner, ModalityContext};
use crate::error::{DispatchError, Result};

#[derive(Debug, Default)]
pub struct ModalityStack {
	owners: Vec<ModalOwner>,
	current: ModalityContext,
}

impl ModalityStack {
	pub fn new() -> Self {
		Self::default()
	}

	/// Enters modal state for `owner` and returns the new current context.
	pub fn push(&mut self, owner: ModalOwner) -> Result<&ModalityContext> {
		if self.owners.contains(&owner) {
			return Err(DispatchError::AlreadyModal(owner));
		}
		self.owners.push(owner);
		self.current = ModalityContext::from_owners(&self.owners);
		Ok(&self.current)
	}

	/// Leaves modal state for `owner`, which must be the top of the stack.
	///
	/// Returns the context that was current before leaving.
	pub fn pop(&mut self, owner: ModalOwner) -> Result<ModalityContext> {
		match self.owners.last() {
			Some(top) if *top == owner => {}
			Some(top) if self.owners.contains(&owner) => {
				return Err(DispatchError::UnbalancedLeave { owner, top: *top });
			}
			_ => return Err(DispatchError::NotModal(owner)),
		}
		self.owners.pop();
		let left = std::mem::replace(&mut self.current, ModalityContext::from_owners(&self.owners));
		Ok(left)
	}

	pub fn top(&self) -> Option<ModalOwner> {
		self.owners.last().copied()
	}

	pub fn current(&self) -> &ModalityContext {
		&self.current
	}

	/// Owners in entry order (bottom first).
	pub fn owners(&self) -> &[ModalOwner] {
		&self.owners
	}

	pub fn depth(&self) -> usize {
		self.owners.len()
	}

	pub fn is_empty(&self) -> bool {
		self.owners.is_empty()
	}

	pub fn contains(&self, owner: ModalOwner) -> bool {
		self.owners.contains(&owner)
	}

	/// Drops every owner without any ordering checks.
	pub fn clear(&mut self) {
		self.owners.clear();
		self.current = ModalityContext::non_modal();
	}
}
