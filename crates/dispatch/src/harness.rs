//! Scripted driver for exercising a [`UiThread`](crate::UiThread) step by step.
//!
//! Each step runs on the UI thread and is awaited before the next one starts.
//! Step errors are collected instead of aborting the script, so a scenario
//! always runs to the end and reports everything that went wrong.
//!
//! ```ignore
//! let failures = UiScript::new(&ui)
//!     .suspend()
//!     .execute(move |d| { d.submit(ModalityContext::non_modal(), job); Ok(()) })
//!     .flush()
//!     .execute(move |d| d.enter_modal(dialog))
//!     .resume()
//!     .finish();
//! ```

use std::fmt;

use crate::dispatcher::{Dispatcher, FlushReport};
use crate::error::{DispatchError, Result};
use crate::ui_thread::UiHandle;

/// One failed script step.
#[derive(Debug)]
pub struct StepFailure {
	/// Zero-based index of the step.
	pub step: usize,
	pub error: DispatchError,
}

impl fmt::Display for StepFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "step {}: {}", self.step, self.error)
	}
}

/// Fluent builder running steps against a UI thread.
#[derive(Debug)]
pub struct UiScript<'a> {
	ui: &'a UiHandle,
	steps: usize,
	flushes: Vec<FlushReport>,
	failures: Vec<StepFailure>,
}

impl<'a> UiScript<'a> {
	pub fn new(ui: &'a UiHandle) -> Self {
		Self {
			ui,
			steps: 0,
			flushes: Vec::new(),
			failures: Vec::new(),
		}
	}

	/// Stops the UI thread from flushing on its own.
	pub fn suspend(self) -> Self {
		let result = self.ui.suspend();
		self.record(result)
	}

	/// Lets the UI thread flush on its own again.
	pub fn resume(self) -> Self {
		let result = self.ui.resume();
		self.record(result)
	}

	/// Runs `f` on the UI thread.
	pub fn execute<F>(self, f: F) -> Self
	where
		F: FnOnce(&mut Dispatcher) -> Result<()> + Send + 'static,
	{
		let result = self.ui.call(f).and_then(|inner| inner);
		self.record(result)
	}

	/// Flushes eligible actions on the UI thread.
	pub fn flush(mut self) -> Self {
		let result = self.ui.flush().map(|report| self.flushes.push(report));
		self.record(result)
	}

	/// Reports of every successful [`UiScript::flush`] step, in order.
	pub fn flush_reports(&self) -> &[FlushReport] {
		&self.flushes
	}

	pub fn failures(&self) -> &[StepFailure] {
		&self.failures
	}

	/// Ends the script and returns the collected failures.
	pub fn finish(self) -> Vec<StepFailure> {
		self.failures
	}

	/// Ends the script, handing failures to `handler` if there are any.
	pub fn if_failures(self, handler: impl FnOnce(&[StepFailure])) {
		if !self.failures.is_empty() {
			handler(&self.failures);
		}
	}

	fn record(mut self, result: Result<()>) -> Self {
		let step = self.steps;
		self.steps += 1;
		if let Err(error) = result {
			tracing::debug!(step, %error, "harness.step.failed");
			self.failures.push(StepFailure { step, error });
		}
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::DispatcherConfig;
	use crate::context::{ModalOwner, ModalityContext};
	use crate::ui_thread::UiThread;

	#[test]
	fn collects_failures_and_keeps_going() {
		let ui = UiThread::spawn(DispatcherConfig::default()).unwrap();
		let dialog = ModalOwner::application();
		let failures = UiScript::new(&ui)
			.execute(move |d| d.leave_modal(dialog))
			.execute(move |d| d.enter_modal(dialog))
			.execute(move |d| d.enter_modal(dialog))
			.execute(move |d| d.leave_modal(dialog))
			.finish();

		let steps: Vec<_> = failures.iter().map(|failure| failure.step).collect();
		assert_eq!(steps, vec![0, 2]);
		assert!(matches!(failures[0].error, DispatchError::NotModal(_)));
		assert!(matches!(failures[1].error, DispatchError::AlreadyModal(_)));
		assert!(failures[1].to_string().starts_with("step 2: "));
	}

	#[test]
	fn flush_steps_keep_their_reports() {
		let ui = UiThread::spawn(DispatcherConfig::default()).unwrap();
		let script = UiScript::new(&ui)
			.suspend()
			.execute(|d| {
				d.submit(ModalityContext::non_modal(), || {});
				Ok(())
			})
			.flush()
			.flush();
		let ran: Vec<_> = script.flush_reports().iter().map(|report| report.ran).collect();
		assert_eq!(ran, vec![1, 0]);
		assert!(script.failures().is_empty());
	}

	#[test]
	fn handler_is_skipped_when_clean() {
		let ui = UiThread::spawn(DispatcherConfig::default()).unwrap();
		UiScript::new(&ui)
			.flush()
			.if_failures(|failures| panic!("unexpected failures: {failures:?}"));
	}
}
