//! Modality-ordered deferred action queue.
//!
//! The [`Dispatcher`] owns the modal stack, the listener registry and the
//! queue of deferred actions. It is bound to the thread that created it:
//! every mutating call from another thread fails with
//! [`DispatchError::WrongThread`]. Producers on other threads submit through
//! a [`Submitter`].
//!
//! # Eligibility
//!
//! An action tagged with context `C` may run while `current` is the current
//! context iff `C` is `ANY` or `current` does not dominate `C`. Actions
//! tagged `NON_MODAL` therefore wait until every modal owner has left, while
//! actions tagged with a nested context run as long as no owner outside that
//! context is modal.
//!
//! # Ordering
//!
//! - Eligible actions run in submission order.
//! - Blocked actions keep their relative order and never delay eligible
//!   actions queued behind them.
//! - Listener deliveries happen synchronously inside
//!   [`Dispatcher::enter_modal`] / [`Dispatcher::leave_modal`], so no action
//!   can observe a stack transition before every listener has.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use tokio::sync::Notify;

use crate::action::{self, DeferredAction, Ingress, Submitter};
use crate::config::DispatcherConfig;
use crate::context::{ModalOwner, ModalityContext};
use crate::error::{DispatchError, Result};
use crate::listener::{ListenerId, ListenerRegistry, ModalityListener};
use crate::panic_message;
use crate::scope::DisposalScope;
use crate::stack::ModalityStack;


/// Outcome of one [`Dispatcher::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
	/// Actions that ran to completion.
	pub ran: usize,
	/// Eligible actions discarded because their expiry predicate fired.
	pub expired: usize,
	/// Actions whose job or expiry check panicked (only counted when panics
	/// are caught).
	pub panicked: usize,
	/// Actions still queued after the flush.
	pub pending: usize,
	/// Passes made over the queue.
	pub passes: usize,
	/// The flush stopped because it reached the configured pass limit.
	pub pass_limit_hit: bool,
}

impl FlushReport {
	/// Returns true when nothing was run, discarded or attempted.
	pub const fn is_idle(&self) -> bool {
		self.ran == 0 && self.expired == 0 && self.panicked == 0
	}
}

enum Outcome {
	Ran,
	Expired,
	Panicked,
}

/// Modal stack plus the deferred action queue gated by it.
pub struct Dispatcher {
	config: DispatcherConfig,
	owner_thread: ThreadId,
	stack: ModalityStack,
	listeners: ListenerRegistry,
	pending: VecDeque<DeferredAction>,
	ingress: Ingress,
	submitter: Submitter,
}

impl Default for Dispatcher {
	fn default() -> Self {
		Self::new(DispatcherConfig::default())
	}
}

impl Dispatcher {
	/// Creates a dispatcher bound to the calling thread.
	pub fn new(config: DispatcherConfig) -> Self {
		let (submitter, ingress) = action::channel();
		Self::with_channel(config, submitter, ingress)
	}

	/// Builds a dispatcher around a submission channel created elsewhere, so
	/// producers can hold a [`Submitter`] before the owning thread starts.
	pub(crate) fn with_channel(config: DispatcherConfig, submitter: Submitter, ingress: Ingress) -> Self {
		let owner_thread = thread::current().id();
		tracing::debug!(thread = ?owner_thread, "dispatch.new");
		Self {
			config,
			owner_thread,
			stack: ModalityStack::new(),
			listeners: ListenerRegistry::default(),
			pending: VecDeque::new(),
			ingress,
			submitter,
		}
	}

	pub fn config(&self) -> &DispatcherConfig {
		&self.config
	}

	/// Thread this dispatcher is bound to.
	pub fn owner_thread(&self) -> ThreadId {
		self.owner_thread
	}

	/// Returns a handle for submitting actions from any thread.
	pub fn submitter(&self) -> Submitter {
		self.submitter.clone()
	}

	pub(crate) fn wake_signal(&self) -> Arc<Notify> {
		self.ingress.wake()
	}

	/// Queues `action` tagged with `context`. Never runs it inline.
	pub fn submit<F>(&self, context: ModalityContext, action: F)
	where
		F: FnOnce() + Send + 'static,
	{
		self.submitter.submit(context, action);
	}

	/// Queues `action` tagged with the current context.
	pub fn submit_current<F>(&self, action: F)
	where
		F: FnOnce() + Send + 'static,
	{
		self.submitter.submit(self.current_context().clone(), action);
	}

	/// Context new actions should be tagged with to run in the current state.
	pub fn current_context(&self) -> &ModalityContext {
		self.stack.current()
	}

	pub fn is_in_modal_context(&self) -> bool {
		!self.stack.is_empty()
	}

	/// Modal owners in entry order (bottom first).
	pub fn modal_owners(&self) -> &[ModalOwner] {
		self.stack.owners()
	}

	/// Number of queued actions, eligible or not.
	pub fn pending_len(&mut self) -> usize {
		self.ingress.drain_into(&mut self.pending);
		self.pending.len()
	}

	/// Number of live listeners.
	pub fn listener_count(&mut self) -> usize {
		self.listeners.len()
	}

	/// Enters modal state for `owner`, then notifies listeners with
	/// `entering = true`.
	///
	/// The stack change is kept even if a listener fails; the failure is
	/// returned to the caller.
	pub fn enter_modal(&mut self, owner: ModalOwner) -> Result<()> {
		self.ensure_ui_thread()?;
		let depth = match self.stack.push(owner) {
			Ok(current) => current.depth(),
			Err(err) => return Err(precondition(err)),
		};
		tracing::debug!(%owner, depth, "modality.enter");
		self.listeners.deliver(true)
	}

	/// Leaves modal state for `owner`, which must be the most recently entered
	/// owner still modal, then notifies listeners with `entering = false`.
	pub fn leave_modal(&mut self, owner: ModalOwner) -> Result<()> {
		self.ensure_ui_thread()?;
		if let Err(err) = self.stack.pop(owner) {
			return Err(precondition(err));
		}
		tracing::debug!(%owner, depth = self.stack.depth(), "modality.leave");
		self.listeners.deliver(false)
	}

	/// Leaves every modal owner top-down, one listener delivery per owner.
	///
	/// Returns the number of owners left.
	pub fn leave_all_modals(&mut self) -> Result<usize> {
		self.ensure_ui_thread()?;
		let mut left = 0;
		while let Some(top) = self.stack.top() {
			self.leave_modal(top)?;
			left += 1;
		}
		Ok(left)
	}

	/// Registers `listener` until `scope` is released or the listener is
	/// removed explicitly.
	pub fn add_modality_listener<L>(&mut self, listener: L, scope: &DisposalScope) -> Result<ListenerId>
	where
		L: ModalityListener + 'static,
	{
		self.ensure_ui_thread()?;
		let id = self.listeners.add(Box::new(listener), scope);
		tracing::trace!(listener = id.get(), "modality.listener.add");
		Ok(id)
	}

	/// Removes a listener. Returns false if it was already gone.
	pub fn remove_modality_listener(&mut self, id: ListenerId) -> Result<bool> {
		self.ensure_ui_thread()?;
		let removed = self.listeners.remove(id);
		tracing::trace!(listener = id.get(), removed, "modality.listener.remove");
		Ok(removed)
	}

	/// Runs every currently eligible action, in submission order.
	///
	/// Actions submitted while flushing are picked up by later passes, up to
	/// the configured pass limit. Blocked actions stay queued.
	pub fn flush(&mut self) -> Result<FlushReport> {
		self.ensure_ui_thread()?;
		let mut report = FlushReport::default();

		while report.passes < self.config.flush_pass_limit {
			self.ingress.drain_into(&mut self.pending);
			if self.pending.is_empty() {
				break;
			}
			report.passes += 1;
			if !self.run_pass(&mut report) {
				break;
			}
		}

		self.ingress.drain_into(&mut self.pending);
		report.pending = self.pending.len();
		if report.passes == self.config.flush_pass_limit && self.has_eligible() {
			report.pass_limit_hit = true;
			tracing::warn!(passes = report.passes, pending = report.pending, "dispatch.flush.pass_limit");
		}
		if !report.is_idle() {
			tracing::trace!(
				ran = report.ran,
				expired = report.expired,
				panicked = report.panicked,
				pending = report.pending,
				"dispatch.flush"
			);
		}
		Ok(report)
	}

	/// Drops the modal stack, queued actions and listeners without any
	/// deliveries.
	pub fn reset(&mut self) -> Result<()> {
		self.ensure_ui_thread()?;
		self.ingress.drain_into(&mut self.pending);
		tracing::debug!(
			depth = self.stack.depth(),
			pending = self.pending.len(),
			"dispatch.reset"
		);
		self.stack.clear();
		self.pending.clear();
		self.listeners.clear();
		Ok(())
	}

	/// One scan over the queue. Returns true if any action was consumed.
	fn run_pass(&mut self, report: &mut FlushReport) -> bool {
		// Actions cannot reach the stack, so `current` is fixed for the pass.
		let current = self.stack.current().clone();
		let mut consumed = false;
		let mut idx = 0;
		while idx < self.pending.len() {
			if !current.admits(&self.pending[idx].context) {
				idx += 1;
				continue;
			}
			let Some(action) = self.pending.remove(idx) else {
				break;
			};
			consumed = true;
			match self.run_action(action) {
				Outcome::Ran => report.ran += 1,
				Outcome::Expired => report.expired += 1,
				Outcome::Panicked => report.panicked += 1,
			}
		}
		consumed
	}

	/// Runs one action, checking its expiry first. Both the expiry check and
	/// the job run under the panic guard when panics are caught.
	fn run_action(&self, action: DeferredAction) -> Outcome {
		let seq = action.seq;
		let run = move || {
			if action.is_expired() {
				tracing::trace!(seq, "dispatch.action.expired");
				return Outcome::Expired;
			}
			tracing::trace!(seq, "dispatch.action.run");
			(action.into_job())();
			Outcome::Ran
		};
		if !self.config.catch_action_panics {
			return run();
		}
		match catch_unwind(AssertUnwindSafe(run)) {
			Ok(outcome) => outcome,
			Err(payload) => {
				tracing::error!(seq, panic = %panic_message(payload.as_ref()), "dispatch.action.panicked");
				Outcome::Panicked
			}
		}
	}

	fn has_eligible(&self) -> bool {
		let current = self.stack.current();
		self.pending.iter().any(|action| current.admits(&action.context))
	}

	fn ensure_ui_thread(&self) -> Result<()> {
		let caller = thread::current().id();
		if caller == self.owner_thread {
			return Ok(());
		}
		Err(precondition(DispatchError::WrongThread {
			owner: self.owner_thread,
			caller,
		}))
	}
}

fn precondition(err: DispatchError) -> DispatchError {
	tracing::error!(%err, "modality.precondition");
	err
}

impl std::fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dispatcher")
			.field("owner_thread", &self.owner_thread)
			.field("context", self.stack.current())
			.field("pending", &self.pending.len())
			.finish_non_exhaustive()
	}
}
