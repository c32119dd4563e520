//! Periodic background jobs.
//!
//! Every registered job gets its own driver task with its own interval and its own overlap
//! guard. A tick that finds the previous run of the same job still in progress is dropped, not
//! queued; the number of dropped ticks is logged when the long run finishes.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::payments::SyncEngine;
use crate::payments::sync::repositories::AddressSource;
use crate::ton::AddressCodec;
use crate::utils::cancellable;

/// A unit of periodic work
#[async_trait::async_trait]
pub trait ScheduledJob: Send + Sync {
	fn name(&self) -> &'static str;

	/// Runs once. Failures are handled and logged by the job itself.
	async fn run(&self, cancel: &CancellationToken);
}

pub struct Scheduler {
	jobs: Vec<(Arc<dyn ScheduledJob>, Duration)>,
}

impl Scheduler {
	pub fn new() -> Self {
		Self { jobs: Vec::new() }
	}

	pub fn register(&mut self, job: Arc<dyn ScheduledJob>, every: Duration) {
		self.jobs.push((job, every));
	}

	/// Drives all jobs until `cancel` fires, then waits for in-flight runs to finish.
	pub async fn run(self, cancel: CancellationToken) {
		let mut drivers = JoinSet::new();
		for (job, every) in self.jobs {
			drivers.spawn(drive(job, every, cancel.clone()));
		}
		while let Some(result) = drivers.join_next().await {
			if let Err(e) = result {
				error!("Scheduler driver failed: {}", e);
			}
		}
		info!("Scheduler stopped");
	}
}

impl Default for Scheduler {
	fn default() -> Self {
		Self::new()
	}
}

async fn drive(job: Arc<dyn ScheduledJob>, every: Duration, cancel: CancellationToken) {
	let guard = Arc::new(Mutex::new(()));
	let skipped = Arc::new(AtomicU64::new(0));
	let mut timer = tokio::time::interval(every);
	timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

	info!("Scheduling {} every {:?}", job.name(), every);

	loop {
		tokio::select! {
			_ = cancel.cancelled() => break,
			_ = timer.tick() => {
				let Ok(lock) = guard.clone().try_lock_owned() else {
					let count = skipped.fetch_add(1, Ordering::Relaxed) + 1;
					debug!(job = job.name(), skipped = count, "Previous run still in progress, skipping tick");
					continue;
				};

				let job = job.clone();
				let skipped = skipped.clone();
				let cancel = cancel.clone();
				tokio::spawn(async move {
					let _lock = lock;
					let started = Instant::now();
					job.run(&cancel).await;
					let skipped = skipped.swap(0, Ordering::Relaxed);
					if skipped > 0 {
						info!(
							job = job.name(),
							skipped,
							"Run finished in {:?}, ticks were skipped while it ran",
							started.elapsed()
						);
					} else {
						debug!(job = job.name(), "Run finished in {:?}", started.elapsed());
					}
				});
			}
		}
	}

	// wait for the in-flight run, if any
	let _idle = guard.lock().await;
	info!("{} stopped", job.name());
}

/// Syncs every receiving address, one after the other.
pub struct PaymentSyncJob {
	engine: Arc<SyncEngine>,
	sources: Vec<Arc<dyn AddressSource>>,
	codec: AddressCodec,
}

impl PaymentSyncJob {
	pub fn new(
		engine: Arc<SyncEngine>,
		sources: Vec<Arc<dyn AddressSource>>,
		codec: AddressCodec,
	) -> Self {
		Self {
			engine,
			sources,
			codec,
		}
	}

	/// Collects addresses from all sources, deduplicated by canonical form.
	async fn addresses(&self, cancel: &CancellationToken) -> Vec<String> {
		let mut seen = HashSet::new();
		let mut addresses = Vec::new();
		for source in &self.sources {
			let listed = match cancellable(cancel, source.receiving_addresses()).await {
				Ok(listed) => listed,
				Err(e) => {
					error!("Failed to load receiving addresses: {}", e);
					continue;
				}
			};
			for raw in listed {
				match self.codec.parse(&raw) {
					Ok(address) => {
						if seen.insert(address) {
							addresses.push(address.to_string());
						}
					}
					Err(e) => warn!(address = %raw, "Ignoring invalid receiving address: {}", e),
				}
			}
		}
		addresses
	}
}

#[async_trait::async_trait]
impl ScheduledJob for PaymentSyncJob {
	fn name(&self) -> &'static str {
		"jetton payment sync"
	}

	async fn run(&self, cancel: &CancellationToken) {
		let addresses = self.addresses(cancel).await;
		debug!("Syncing {} receiving addresses", addresses.len());

		for address in addresses {
			if cancel.is_cancelled() {
				break;
			}
			match self.engine.sync_address(&address, cancel).await {
				Ok(report) => debug!(
					address = %report.address,
					source = %report.source,
					visited = report.visited,
					candidates = report.candidates,
					applied = report.applied,
					"Address synced"
				),
				Err(e) if e.is_cancelled() => {
					info!(address = %address, "Sync interrupted by shutdown");
					break;
				}
				Err(e) => error!(address = %address, "Failed to sync address: {}", e),
			}
		}
	}
}
