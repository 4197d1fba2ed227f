//! Client-side confirmation polling.
//!
//! Every open checkout owns one poll task: a cancellable loop that asks the
//! network whether any transaction referencing the intent's correlation key
//! has landed and paid the merchant at least the expected amount. The first
//! affirmative answer is proposed to the ledger; whether it applies or the
//! webhook path got there first, the loop stops.
//!
//! Transient lookup failures are logged and retried on the next tick; they
//! never terminate the loop and never surface to the user.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use paytill::correlation::CorrelationKey;
use paytill::intent::PaymentStatus;
use paytill::ledger::PaymentLedger;
use paytill::time;

use crate::rpc::{NetworkQuery, TransferExpectation};

/// Default time between network checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Why a poll loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// This loop observed settlement and its confirmation applied.
    Confirmed,
    /// The record was settled or failed by another path first.
    Superseded,
    /// The owning context tore the loop down.
    Cancelled,
}

/// Spawns per-checkout confirmation poll loops.
#[derive(Clone)]
pub struct ConfirmationPoller {
    ledger: Arc<PaymentLedger>,
    network: Arc<dyn NetworkQuery>,
    interval: Duration,
}

impl std::fmt::Debug for ConfirmationPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationPoller")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl ConfirmationPoller {
    /// Creates a poller with the default interval.
    #[must_use]
    pub fn new(ledger: Arc<PaymentLedger>, network: Arc<dyn NetworkQuery>) -> Self {
        Self {
            ledger,
            network,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the poll interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Starts watching one correlation key.
    ///
    /// The task stops cleanly when `cancel` fires, when another path
    /// settles the record, or once its own confirmation applies. It never
    /// reports a false confirmation and never double-reports.
    pub fn watch(
        &self,
        key: CorrelationKey,
        expectation: TransferExpectation,
        cancel: CancellationToken,
    ) -> JoinHandle<PollOutcome> {
        let ledger = Arc::clone(&self.ledger);
        let network = Arc::clone(&self.network);
        let interval = self.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!(correlation = %key, "Poll loop cancelled");
                        return PollOutcome::Cancelled;
                    }
                    _ = ticker.tick() => {}
                }

                // The webhook path may have settled (or a broadcast error
                // failed) the intent between ticks.
                if let Some(record) = ledger.find_by_correlation(&key) {
                    if record.status != PaymentStatus::Pending {
                        tracing::debug!(
                            correlation = %key,
                            status = ?record.status,
                            "Stopping poll loop, record no longer pending"
                        );
                        return PollOutcome::Superseded;
                    }
                }

                let sighting = match network.find_reference(key.pubkey()).await {
                    Ok(Some(sighting)) => sighting,
                    Ok(None) => continue,
                    Err(err) => {
                        tracing::debug!(correlation = %key, error = %err, "Reference lookup failed, will retry");
                        continue;
                    }
                };

                match network.validate_transfer(&sighting.signature, &expectation).await {
                    Ok(true) => {
                        #[allow(clippy::cast_sign_loss)]
                        let confirmed_at = sighting
                            .block_time
                            .filter(|t| *t >= 0)
                            .map_or_else(time::epoch_secs, |t| t as u64);
                        let outcome =
                            ledger.try_confirm_by_key(&key, &sighting.signature, confirmed_at);
                        return match outcome {
                            Some(confirmation) if confirmation.applied => PollOutcome::Confirmed,
                            _ => PollOutcome::Superseded,
                        };
                    }
                    Ok(false) => {
                        tracing::debug!(
                            correlation = %key,
                            signature = %sighting.signature,
                            "Referencing transaction does not satisfy the expectation"
                        );
                    }
                    Err(err) => {
                        tracing::debug!(correlation = %key, error = %err, "Transfer validation failed, will retry");
                    }
                }
            }
        })
    }
}
