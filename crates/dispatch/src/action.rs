//! Deferred actions and the thread-safe submission port.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Notify, mpsc};

use crate::context::ModalityContext;

type Job = Box<dyn FnOnce() + Send>;
type ExpiryCheck = Box<dyn Fn() -> bool + Send>;

/// Unit of work waiting for its modality context to become eligible.
pub(crate) struct DeferredAction {
	pub seq: u64,
	pub context: ModalityContext,
	job: Job,
	expired: Option<ExpiryCheck>,
}

impl DeferredAction {
	pub fn is_expired(&self) -> bool {
		self.expired.as_ref().is_some_and(|expired| expired())
	}

	pub fn into_job(self) -> Job {
		self.job
	}
}

impl fmt::Debug for DeferredAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DeferredAction")
			.field("seq", &self.seq)
			.field("context", &self.context)
			.field("has_expiry", &self.expired.is_some())
			.finish_non_exhaustive()
	}
}

/// Cloneable handle for queueing actions from any thread.
///
/// Submission never blocks and never runs the action inline. Actions sent
/// after the owning dispatcher is gone are dropped.
#[derive(Clone)]
pub struct Submitter {
	tx: mpsc::UnboundedSender<DeferredAction>,
	seq: Arc<AtomicU64>,
	wake: Arc<Notify>,
}

impl Submitter {
	/// Queues `action` tagged with `context`.
	pub fn submit<F>(&self, context: ModalityContext, action: F)
	where
		F: FnOnce() + Send + 'static,
	{
		self.enqueue(context, Box::new(action), None);
	}

	/// Queues `action`, discarding it unrun if `expired` returns true when the
	/// action becomes eligible.
	pub fn submit_with_expiry<F, E>(&self, context: ModalityContext, action: F, expired: E)
	where
		F: FnOnce() + Send + 'static,
		E: Fn() -> bool + Send + 'static,
	{
		self.enqueue(context, Box::new(action), Some(Box::new(expired)));
	}

	/// Returns true once the receiving dispatcher has been dropped.
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}

	fn enqueue(&self, context: ModalityContext, job: Job, expired: Option<ExpiryCheck>) {
		let seq = self.seq.fetch_add(1, Ordering::Relaxed);
		tracing::trace!(seq, depth = context.depth(), any = context.is_any(), "dispatch.submit");
		let action = DeferredAction { seq, context, job, expired };
		if self.tx.send(action).is_err() {
			tracing::debug!(seq, "dispatch.submit.closed");
			return;
		}
		self.wake.notify_one();
	}
}

impl fmt::Debug for Submitter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Submitter").field("closed", &self.tx.is_closed()).finish()
	}
}

/// Receiving side of the submission channel, owned by the dispatcher.
pub(crate) struct Ingress {
	rx: mpsc::UnboundedReceiver<DeferredAction>,
	wake: Arc<Notify>,
}

impl Ingress {
	/// Moves every submitted action into `pending`, preserving arrival order.
	pub fn drain_into(&mut self, pending: &mut VecDeque<DeferredAction>) -> usize {
		let mut moved = 0;
		while let Ok(action) = self.rx.try_recv() {
			pending.push_back(action);
			moved += 1;
		}
		moved
	}

	/// Signal raised on every successful submission.
	pub fn wake(&self) -> Arc<Notify> {
		Arc::clone(&self.wake)
	}
}

pub(crate) fn channel() -> (Submitter, Ingress) {
	let (tx, rx) = mpsc::unbounded_channel();
	let wake = Arc::new(Notify::new());
	let submitter = Submitter {
		tx,
		seq: Arc::new(AtomicU64::new(0)),
		wake: Arc::clone(&wake),
	};
	(submitter, Ingress { rx, wake })
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicBool;

	use super::*;

	#[test]
	fn drain_preserves_submission_order() {
		let (submitter, mut ingress) = channel();
		for _ in 0..3 {
			submitter.submit(ModalityContext::non_modal(), || {});
		}
		let mut pending = VecDeque::new();
		assert_eq!(ingress.drain_into(&mut pending), 3);
		let seqs: Vec<_> = pending.iter().map(|action| action.seq).collect();
		assert_eq!(seqs, vec![0, 1, 2]);
	}

	#[test]
	fn submission_from_other_threads_is_collected() {
		let (submitter, mut ingress) = channel();
		let handles: Vec<_> = (0..4)
			.map(|_| {
				let submitter = submitter.clone();
				std::thread::spawn(move || {
					for _ in 0..25 {
						submitter.submit(ModalityContext::non_modal(), || {});
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}
		let mut pending = VecDeque::new();
		assert_eq!(ingress.drain_into(&mut pending), 100);
	}

	#[test]
	fn expiry_predicate_is_evaluated_lazily() {
		let (submitter, mut ingress) = channel();
		let flag = Arc::new(AtomicBool::new(false));
		let check = Arc::clone(&flag);
		submitter.submit_with_expiry(ModalityContext::any(), || {}, move || check.load(Ordering::SeqCst));

		let mut pending = VecDeque::new();
		ingress.drain_into(&mut pending);
		let action = pending.pop_front().unwrap();
		assert!(!action.is_expired());
		flag.store(true, Ordering::SeqCst);
		assert!(action.is_expired());
	}

	#[test]
	fn submit_after_receiver_drop_is_silent() {
		let (submitter, ingress) = channel();
		drop(ingress);
		assert!(submitter.is_closed());
		submitter.submit(ModalityContext::non_modal(), || panic!("must never run"));
	}
}
