//! Progress for long-running server operations.
//!
//! Each `tether/slowTask` request gets its own progress indicator with an elapsed-time label that
//! ticks once per second. The request is answered exactly once: either when the user cancels the
//! indicator, or when the server cancels the request after finishing the work.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::host::{Host, ProgressReporter};
use crate::protocol::SlowTaskParams;

/// Format elapsed seconds as `"{m}m{s}s"`, dropping the zero component.
///
/// Under a minute only seconds are shown, so zero renders as `"0s"`.
pub fn format_elapsed(seconds: u64) -> String {
	let (minutes, seconds) = (seconds / 60, seconds % 60);
	match (minutes, seconds) {
		(0, s) => format!("{s}s"),
		(m, 0) => format!("{m}m"),
		(m, s) => format!("{m}m{s}s"),
	}
}

/// How a slow task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlowTaskOutcome {
	/// The user dismissed the indicator; the server is told to cancel.
	UserCancelled,
	/// The server cancelled the request, meaning the work is over.
	ServerCancelled,
}

/// Identifier of a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlowTaskId(u64);

/// Running slow tasks of one session.
pub struct SlowTaskTracker {
	host: Arc<dyn Host>,
	completion_delay: Duration,
	next_id: AtomicU64,
	active: Mutex<HashMap<SlowTaskId, String>>,
}

impl std::fmt::Debug for SlowTaskTracker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SlowTaskTracker")
			.field("completion_delay", &self.completion_delay)
			.field("active", &self.active.lock().len())
			.finish_non_exhaustive()
	}
}

impl SlowTaskTracker {
	/// Create a tracker that keeps the "Done" state visible for `completion_delay`.
	pub fn new(host: Arc<dyn Host>, completion_delay: Duration) -> Self {
		Self {
			host,
			completion_delay,
			next_id: AtomicU64::new(0),
			active: Mutex::new(HashMap::new()),
		}
	}

	/// Number of tasks currently shown.
	pub fn active_count(&self) -> usize {
		self.active.lock().len()
	}

	/// Messages of the tasks currently shown, in start order.
	pub fn active_messages(&self) -> Vec<String> {
		let active = self.active.lock();
		let mut tasks: Vec<_> = active.iter().collect();
		tasks.sort_by_key(|(id, _)| **id);
		tasks.into_iter().map(|(_, message)| message.clone()).collect()
	}

	/// Track one task until either side cancels it.
	///
	/// `server_cancel` fires when the server withdraws the request. The ticker stops on the first
	/// cancellation observed; the other path is ignored from then on.
	pub async fn run(&self, params: SlowTaskParams, server_cancel: CancellationToken) -> SlowTaskOutcome {
		let id = SlowTaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
		let user_cancel = CancellationToken::new();
		let progress = self.host.begin_progress(&params.message, Some(user_cancel.clone()));
		let task = ActiveGuard::register(&self.active, id, params.message.clone(), progress);
		let progress = &task.progress;
		let mut elapsed = params.seconds_elapsed_so_far.unwrap_or(0);
		progress.report(&format_elapsed(elapsed));
		debug!(target: "tether::slow_task", task = id.0, message = %params.message, elapsed, "Slow task started");

		let period = Duration::from_secs(1);
		let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let outcome = loop {
			tokio::select! {
				biased;
				_ = server_cancel.cancelled() => break SlowTaskOutcome::ServerCancelled,
				_ = user_cancel.cancelled() => break SlowTaskOutcome::UserCancelled,
				_ = ticker.tick() => {
					elapsed += 1;
					progress.report(&format_elapsed(elapsed));
				}
			}
		};
		drop(ticker);

		debug!(target: "tether::slow_task", task = id.0, ?outcome, elapsed, "Slow task finished");
		if outcome == SlowTaskOutcome::ServerCancelled {
			progress.report("Done");
			tokio::time::sleep(self.completion_delay).await;
		}
		outcome
	}
}

/// Removes a task from the active set and finishes its indicator on every exit path, including
/// when the request future is dropped with its session.
struct ActiveGuard<'a> {
	active: &'a Mutex<HashMap<SlowTaskId, String>>,
	id: SlowTaskId,
	progress: Box<dyn ProgressReporter>,
}

impl<'a> ActiveGuard<'a> {
	fn register(
		active: &'a Mutex<HashMap<SlowTaskId, String>>,
		id: SlowTaskId,
		message: String,
		progress: Box<dyn ProgressReporter>,
	) -> Self {
		active.lock().insert(id, message);
		Self { active, id, progress }
	}
}

impl Drop for ActiveGuard<'_> {
	fn drop(&mut self) {
		self.active.lock().remove(&self.id);
		self.progress.finish();
	}
}
