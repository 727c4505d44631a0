use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::{mpsc, oneshot};

use crate::action::{self, Ingress, Submitter};
use crate::config::DispatcherConfig;
use crate::context::ModalityContext;
use crate::dispatcher::{Dispatcher, FlushReport};
use crate::error::{DispatchError, Result};
use crate::panic_message;

type Call = Box<dyn FnOnce(&mut Dispatcher) + Send>;

enum UiCommand {
	Run(Call),
	SetSuspended(bool),
	Shutdown,
}

/// Dedicated thread owning one [`Dispatcher`].
///
/// Every stack mutation, listener delivery and action runs on this thread.
/// After each command or submission the thread flushes eligible actions,
/// unless the pump is suspended. Dropping the `UiThread` stops the loop and
/// joins the thread.
pub struct UiThread {
	handle: UiHandle,
	join: Option<JoinHandle<()>>,
}

impl UiThread {
	/// Starts the UI thread.
	pub fn spawn(config: DispatcherConfig) -> Result<Self> {
		let (commands_tx, commands_rx) = mpsc::unbounded_channel();
		let (submitter, ingress) = action::channel();
		let name = config.thread_name.clone();
		let loop_submitter = submitter.clone();

		tracing::debug!(thread_name = %name, suspended = config.start_suspended, "ui_thread.spawn");
		let join = thread::Builder::new()
			.name(name)
			.spawn(move || run_loop(config, loop_submitter, ingress, commands_rx))?;
		let thread = join.thread().id();

		Ok(Self {
			handle: UiHandle {
				commands: commands_tx,
				submitter,
				thread,
			},
			join: Some(join),
		})
	}

	/// Returns a cloneable handle to the UI thread.
	pub fn handle(&self) -> UiHandle {
		self.handle.clone()
	}

	/// Stops the loop and waits for the thread to exit.
	///
	/// Actions still queued are dropped unrun.
	pub fn shutdown(mut self) -> Result<()> {
		self.stop()
	}

	fn stop(&mut self) -> Result<()> {
		if thread::current().id() == self.handle.thread {
			return Err(DispatchError::Reentrant);
		}
		let Some(join) = self.join.take() else {
			return Ok(());
		};
		let _ = self.handle.commands.send(UiCommand::Shutdown);
		if join.join().is_err() {
			tracing::error!("ui_thread.join.panicked");
			return Err(DispatchError::UiThreadGone);
		}
		tracing::debug!("ui_thread.stopped");
		Ok(())
	}
}

impl Drop for UiThread {
	fn drop(&mut self) {
		let _ = self.stop();
	}
}

impl std::ops::Deref for UiThread {
	type Target = UiHandle;

	fn deref(&self) -> &UiHandle {
		&self.handle
	}
}

/// Cloneable handle for driving a [`UiThread`] from other threads.
#[derive(Clone)]
pub struct UiHandle {
	commands: mpsc::UnboundedSender<UiCommand>,
	submitter: Submitter,
	thread: ThreadId,
}

impl UiHandle {
	/// ID of the UI thread.
	pub fn thread_id(&self) -> ThreadId {
		self.thread
	}

	/// Returns false once the UI thread loop has exited.
	pub fn is_running(&self) -> bool {
		!self.commands.is_closed()
	}

	pub fn submitter(&self) -> Submitter {
		self.submitter.clone()
	}

	/// Queues `action` tagged with `context`.
	pub fn submit<F>(&self, context: ModalityContext, action: F)
	where
		F: FnOnce() + Send + 'static,
	{
		self.submitter.submit(context, action);
	}

	/// Runs `f` on the UI thread and blocks until it returns.
	///
	/// Must not be called from inside an async runtime; use
	/// [`UiHandle::call_async`] there. Calling it from the UI thread itself
	/// fails with [`DispatchError::Reentrant`]. A panic in `f` is returned as
	/// [`DispatchError::CallPanicked`].
	pub fn call<F, R>(&self, f: F) -> Result<R>
	where
		F: FnOnce(&mut Dispatcher) -> R + Send + 'static,
		R: Send + 'static,
	{
		if thread::current().id() == self.thread {
			return Err(DispatchError::Reentrant);
		}
		let rx = self.post(f)?;
		rx.blocking_recv().map_err(|_| DispatchError::UiThreadGone)?
	}

	/// Runs `f` on the UI thread and resolves with its result.
	pub async fn call_async<F, R>(&self, f: F) -> Result<R>
	where
		F: FnOnce(&mut Dispatcher) -> R + Send + 'static,
		R: Send + 'static,
	{
		let rx = self.post(f)?;
		rx.await.map_err(|_| DispatchError::UiThreadGone)?
	}

	/// Flushes eligible actions on the UI thread and waits for the report.
	pub fn flush(&self) -> Result<FlushReport> {
		self.call(Dispatcher::flush)?
	}

	/// Stops the automatic flush after each command or submission. Actions
	/// then run only on explicit [`UiHandle::flush`].
	pub fn suspend(&self) -> Result<()> {
		self.send(UiCommand::SetSuspended(true))
	}

	/// Restarts the automatic flush and flushes once.
	pub fn resume(&self) -> Result<()> {
		self.send(UiCommand::SetSuspended(false))
	}

	fn post<F, R>(&self, f: F) -> Result<oneshot::Receiver<Result<R>>>
	where
		F: FnOnce(&mut Dispatcher) -> R + Send + 'static,
		R: Send + 'static,
	{
		let (tx, rx) = oneshot::channel();
		self.send(UiCommand::Run(Box::new(move |dispatcher| {
			let outcome = catch_unwind(AssertUnwindSafe(|| f(dispatcher))).map_err(|payload| {
				let message = panic_message(payload.as_ref());
				tracing::error!(panic = %message, "ui_thread.call.panicked");
				DispatchError::CallPanicked(message)
			});
			let _ = tx.send(outcome);
		})))?;
		Ok(rx)
	}

	fn send(&self, command: UiCommand) -> Result<()> {
		self.commands.send(command).map_err(|_| DispatchError::UiThreadGone)
	}
}

impl std::fmt::Debug for UiHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("UiHandle")
			.field("thread", &self.thread)
			.field("running", &self.is_running())
			.finish()
	}
}

fn run_loop(
	config: DispatcherConfig,
	submitter: Submitter,
	ingress: Ingress,
	mut commands: mpsc::UnboundedReceiver<UiCommand>,
) {
	let runtime = match tokio::runtime::Builder::new_current_thread().build() {
		Ok(runtime) => runtime,
		Err(err) => {
			tracing::error!(%err, "ui_thread.runtime.failed");
			return;
		}
	};
	let mut suspended = config.start_suspended;
	let mut dispatcher = Dispatcher::with_channel(config, submitter, ingress);
	let wake = dispatcher.wake_signal();

	runtime.block_on(async {
		loop {
			tokio::select! {
				command = commands.recv() => match command {
					Some(UiCommand::Run(call)) => guarded("call", || call(&mut dispatcher)),
					Some(UiCommand::SetSuspended(flag)) => {
						tracing::debug!(suspended = flag, "ui_thread.pump");
						suspended = flag;
					}
					Some(UiCommand::Shutdown) | None => break,
				},
				() = wake.notified() => {}
			}
			if !suspended {
				guarded("flush", || {
					if let Err(err) = dispatcher.flush() {
						tracing::error!(%err, "ui_thread.flush.failed");
					}
				});
			}
		}
	});

	let dropped = dispatcher.pending_len();
	tracing::debug!(dropped, "ui_thread.exit");
}

/// Keeps the loop alive when user code panics on the UI thread.
fn guarded(what: &'static str, f: impl FnOnce()) {
	if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
		tracing::error!(what, panic = %panic_message(payload.as_ref()), "ui_thread.panicked");
	}
}
