//! Timer-driven time-signal broadcast.
//!
//! One scheduled task per service instance, cancelled through the
//! instance's shutdown token. Ticks are hour-aligned and fixed-rate: the
//! schedule is measured from the start of the hour the service started in,
//! so a delayed tick runs promptly without shifting later ticks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Timelike};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::AddressRegistry;
use crate::sender::{OutboundMessage, PacketSender};

const SIGNAL_SUBJECT: &str = "Time signal";
const SIGNAL_PREFIX: &str = "* Time signal: ";
const SECONDS_PER_MINUTE: u64 = 60;

/// Periodic fan-out of a timestamped message to every registered
/// correspondent, pruning the unreachable ones.
pub struct TimeSignalBroadcaster<S: PacketSender> {
    registry: Arc<AddressRegistry>,
    sender: Arc<S>,
    period: Duration,
}

impl<S: PacketSender> TimeSignalBroadcaster<S> {
    /// Create a broadcaster firing every `interval_minutes`.
    pub fn new(registry: Arc<AddressRegistry>, sender: Arc<S>, interval_minutes: u64) -> Self {
        Self {
            registry,
            sender,
            period: Duration::from_secs(interval_minutes.max(1).saturating_mul(SECONDS_PER_MINUTE)),
        }
    }

    /// Spawn the broadcast schedule, stopped by cancelling `shutdown`.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) {
        let now = Local::now();
        let aligned = start_of_hour(now);
        let delay = initial_delay(now, aligned, self.period);
        info!(
            interval_minutes = self.period.as_secs() / SECONDS_PER_MINUTE,
            start = %aligned.format("%c"),
            "Starting time signal schedule"
        );

        let mut ticker = time::interval_at(Instant::now() + delay, self.period);
        // Fixed-rate phase is kept by interval_at; a late tick fires
        // promptly and the one after stays on the original grid.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The hour-aligned first fire is already in the past at startup;
        // run it promptly once.
        self.broadcast_once().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Time signal schedule stopped");
                    break;
                }
                _ = ticker.tick() => self.broadcast_once().await,
            }
        }
    }

    /// Run one tick: snapshot, fan out, then prune the failures.
    pub async fn broadcast_once(&self) {
        let body = signal_body(Local::now());
        let snapshot = self.registry.snapshot();

        let mut failed = Vec::new();
        for info in snapshot {
            let message = OutboundMessage {
                from: info.reply_from.clone(),
                to: info.client.clone(),
                subject: Some(SIGNAL_SUBJECT.to_string()),
                body: body.clone(),
                thread: info.thread.clone(),
            };
            if !self.sender.send(message).await.is_delivered() {
                warn!(to = %info.client, "Failed to send a time signal");
                failed.push(info.client);
            }
        }

        // Removal is deferred until the pass completes so the registry is
        // never mutated mid-scan.
        for client in failed {
            self.registry.remove(&client);
        }
    }
}

/// Truncate a timestamp to the start of its hour.
fn start_of_hour(now: DateTime<Local>) -> DateTime<Local> {
    now.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

/// Delay until the next tick on the fixed-rate grid anchored at `aligned`.
fn initial_delay(now: DateTime<Local>, aligned: DateTime<Local>, period: Duration) -> Duration {
    let elapsed = (now - aligned).num_seconds().max(0) as u64;
    let period_secs = period.as_secs().max(1);
    let ticks_past = elapsed / period_secs + 1;
    Duration::from_secs(ticks_past * period_secs - elapsed)
}

/// Format the time-signal body for a given instant.
fn signal_body(now: DateTime<Local>) -> String {
    format!("{}{}", SIGNAL_PREFIX, now.format("%c"))
}
