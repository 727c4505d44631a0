use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio_util::sync::CancellationToken;

/// State dropped eagerly when the scope it is attached to is released.
pub(crate) trait Release: Send + Sync {
	fn release(&self);
}

/// Release hooks attached to one scope. Hooks are held weakly, so removing a
/// registration never needs to touch its scope.
#[derive(Default)]
struct Hooks(Mutex<Vec<Weak<dyn Release>>>);

impl Hooks {
	fn push(&self, hook: Weak<dyn Release>) {
		let mut hooks = self.0.lock().unwrap_or_else(PoisonError::into_inner);
		hooks.retain(|hook| hook.strong_count() > 0);
		hooks.push(hook);
	}

	fn len(&self) -> usize {
		self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
	}
}

impl Release for Hooks {
	fn release(&self) {
		let hooks = std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner));
		for hook in hooks.iter().filter_map(Weak::upgrade) {
			hook.release();
		}
	}
}

/// Lifetime handle for listener registrations.
///
/// Registrations tied to a scope are dropped once the scope is released,
/// either by [`DisposalScope::dispose`] or when the scope value is dropped.
/// Releasing a scope also releases every child created from it.
#[derive(Default)]
pub struct DisposalScope {
	token: CancellationToken,
	hooks: Arc<Hooks>,
}

impl DisposalScope {
	/// Creates a new live scope.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a child scope released together with this one.
	pub fn child(&self) -> Self {
		let child = Self {
			token: self.token.child_token(),
			hooks: Arc::default(),
		};
		let hook: Arc<dyn Release> = child.hooks.clone();
		self.on_release(&hook);
		child
	}

	/// Releases the scope.
	pub fn dispose(&self) {
		if !self.token.is_cancelled() {
			tracing::trace!("scope.dispose");
		}
		self.release();
	}

	/// Returns true once the scope or one of its ancestors was released.
	pub fn is_disposed(&self) -> bool {
		self.token.is_cancelled()
	}

	/// Future resolving when the scope is released.
	pub async fn disposed(&self) {
		self.token.cancelled().await;
	}

	pub(crate) fn watch(&self) -> ScopeWatch {
		ScopeWatch {
			token: self.token.clone(),
		}
	}

	/// Runs `hook` once this scope is released, or right away if it already
	/// was. The scope keeps only a weak reference to `hook`.
	pub(crate) fn on_release(&self, hook: &Arc<dyn Release>) {
		self.hooks.push(Arc::downgrade(hook));
		// Cancel happens before the hooks are drained, so a hook pushed
		// concurrently with a release is either drained or caught here.
		if self.token.is_cancelled() {
			self.hooks.release();
		}
	}

	fn release(&self) {
		self.token.cancel();
		self.hooks.release();
	}
}

impl Drop for DisposalScope {
	fn drop(&mut self) {
		self.release();
	}
}

impl fmt::Debug for DisposalScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DisposalScope")
			.field("disposed", &self.is_disposed())
			.field("hooks", &self.hooks.len())
			.finish()
	}
}

/// Read-only view of a scope kept by registries.
#[derive(Debug, Clone)]
pub(crate) struct ScopeWatch {
	token: CancellationToken,
}

impl ScopeWatch {
	pub fn is_released(&self) -> bool {
		self.token.is_cancelled()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	use super::*;

	#[derive(Default)]
	struct Counter(AtomicUsize);

	impl Release for Counter {
		fn release(&self) {
			self.0.fetch_add(1, Ordering::SeqCst);
		}
	}

	fn counter() -> (Arc<Counter>, Arc<dyn Release>) {
		let counter = Arc::new(Counter::default());
		let hook: Arc<dyn Release> = counter.clone();
		(counter, hook)
	}

	#[test]
	fn hooks_run_once_on_dispose() {
		let scope = DisposalScope::new();
		let (count, hook) = counter();
		scope.on_release(&hook);
		assert_eq!(count.0.load(Ordering::SeqCst), 0);
		scope.dispose();
		scope.dispose();
		drop(scope);
		assert_eq!(count.0.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn hook_added_after_release_runs_immediately() {
		let scope = DisposalScope::new();
		scope.dispose();
		let (count, hook) = counter();
		scope.on_release(&hook);
		assert_eq!(count.0.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn parent_release_runs_child_hooks() {
		let parent = DisposalScope::new();
		let child = parent.child();
		let grandchild = child.child();
		let (count, hook) = counter();
		grandchild.on_release(&hook);
		parent.dispose();
		assert_eq!(count.0.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn dead_hooks_do_not_accumulate() {
		let scope = DisposalScope::new();
		for _ in 0..50 {
			let (_, hook) = counter();
			scope.on_release(&hook);
		}
		assert_eq!(scope.hooks.len(), 1);
	}

	#[test]
	fn dispose_is_visible_through_watch() {
		let scope = DisposalScope::new();
		let watch = scope.watch();
		assert!(!watch.is_released());
		scope.dispose();
		assert!(scope.is_disposed());
		assert!(watch.is_released());
		scope.dispose();
	}

	#[test]
	fn drop_releases_scope() {
		let scope = DisposalScope::new();
		let watch = scope.watch();
		drop(scope);
		assert!(watch.is_released());
	}

	#[test]
	fn parent_release_cascades_to_children() {
		let parent = DisposalScope::new();
		let child = parent.child();
		let grandchild = child.child();
		parent.dispose();
		assert!(child.is_disposed());
		assert!(grandchild.is_disposed());
	}

	#[test]
	fn child_release_leaves_parent_alive() {
		let parent = DisposalScope::new();
		drop(parent.child());
		assert!(!parent.is_disposed());
	}

	#[tokio::test]
	async fn disposed_future_resolves() {
		let scope = DisposalScope::new();
		let watch = scope.watch();
		let waiter = tokio::spawn(async move {
			scope.disposed().await;
			scope
		});
		tokio::time::sleep(Duration::from_millis(5)).await;
		assert!(!watch.is_released());
		// The spawned task owns the scope, so release it through a clone of its token.
		watch.token.cancel();
		let scope = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
		assert!(scope.is_disposed());
	}
}
