//! Optional instrumentation hooks.
//!
//! The tree never depends on these for correctness. A timer, if installed,
//! is handed the elapsed time of every lookup and insert; an access monitor,
//! if installed, is told the identity of every element a lookup resolves.
//! Aggregation, per-CPU summation and reporting belong to the implementor.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tree operations reported to an [`OpTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
	Lookup,
	Insert,
}

impl Operation {
	/// Counter name for this operation.
	pub fn name(self) -> &'static str {
		match self {
			Operation::Lookup => "lookup",
			Operation::Insert => "insert",
		}
	}
}

/// Receives the duration of each timed operation.
pub trait OpTimer: Send + Sync {
	fn record(&self, op: Operation, elapsed: Duration);
}

/// Receives the identity (value word) of each element a lookup finds.
pub trait AccessMonitor: Send + Sync {
	fn visited(&self, element: NonZeroUsize);
}

/// The set of hooks installed on a tree.
#[derive(Clone, Default)]
pub struct Hooks {
	pub timer: Option<Arc<dyn OpTimer>>,
	pub monitor: Option<Arc<dyn AccessMonitor>>,
}

impl Hooks {
	pub fn with_timer(mut self, timer: Arc<dyn OpTimer>) -> Self {
		self.timer = Some(timer);
		self
	}

	pub fn with_monitor(mut self, monitor: Arc<dyn AccessMonitor>) -> Self {
		self.monitor = Some(monitor);
		self
	}

	/// Marks the start of a timed operation; free when no timer is set.
	#[inline]
	pub(crate) fn start(&self) -> Option<Instant> {
		self.timer.as_ref().map(|_| Instant::now())
	}

	#[inline]
	pub(crate) fn finish(&self, op: Operation, started: Option<Instant>) {
		if let (Some(timer), Some(started)) = (&self.timer, started) {
			timer.record(op, started.elapsed());
		}
	}

	#[inline]
	pub(crate) fn visited(&self, element: NonZeroUsize) {
		if let Some(monitor) = &self.monitor {
			monitor.visited(element);
		}
	}
}

impl fmt::Debug for Hooks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Hooks")
			.field("timer", &self.timer.is_some())
			.field("monitor", &self.monitor.is_some())
			.finish()
	}
}
