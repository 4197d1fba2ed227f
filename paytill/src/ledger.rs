//! The authoritative payment-intent ledger.
//!
//! Every mutation of payment state funnels through [`PaymentLedger`]. The
//! two confirmation paths (client-side poller, webhook ingester) race freely
//! and both call [`PaymentLedger::try_confirm_by_key`] /
//! [`PaymentLedger::try_confirm_intent`]; the transition is applied under
//! the record's own map-shard lock, so racing calls on one key serialize and
//! only the first wins. Calls on different keys proceed independently.
//!
//! No guard is ever held while another one is acquired, and the ledger API
//! is fully synchronous, so no lock can be held across a network call.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use solana_pubkey::Pubkey;

use crate::correlation::CorrelationKey;
use crate::intent::{IntentId, PaymentIntent, PaymentRecord, PaymentStatus};
use crate::time;

/// An intent with this id or correlation key already exists.
///
/// Correlation keys are single-use; hitting this in normal operation means
/// the caller reused one, which is a programming error.
#[derive(Debug, thiserror::Error)]
#[error("payment intent already exists: {0}")]
pub struct DuplicateIntentError(pub String);

/// Outcome of a proposed confirmation.
///
/// `applied` is `true` only for the call that actually performed the
/// `Pending → Confirmed` transition; every later proposal for the same
/// record gets `false` together with the untouched record.
#[derive(Debug, Clone)]
pub struct Confirmation {
    /// Whether this call performed the transition.
    pub applied: bool,
    /// The record as stored after the call.
    pub record: PaymentRecord,
}

/// In-process store of payment records with per-key atomic transitions.
#[derive(Debug, Default)]
pub struct PaymentLedger {
    records: DashMap<IntentId, PaymentRecord>,
    by_correlation: DashMap<CorrelationKey, IntentId>,
    by_signature: DashMap<String, IntentId>,
    watched: DashMap<Pubkey, Vec<IntentId>>,
}

impl PaymentLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new record in the `Pending` state and indexes its
    /// correlation key and watched merchant account.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateIntentError`] if the id or the correlation key is
    /// already present.
    pub fn create(&self, intent: PaymentIntent) -> Result<PaymentRecord, DuplicateIntentError> {
        // The correlation key is the uniqueness anchor; claim it first.
        match self.by_correlation.entry(intent.correlation) {
            Entry::Occupied(_) => {
                return Err(DuplicateIntentError(intent.correlation.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(intent.id.clone());
            }
        }

        let record = PaymentRecord::pending(intent, time::epoch_secs());
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(_) => {
                self.by_correlation.remove(&record.correlation);
                return Err(DuplicateIntentError(record.id.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
        }

        self.watched
            .entry(record.merchant)
            .or_default()
            .push(record.id.clone());

        tracing::info!(
            intent = %record.id,
            storefront = %record.storefront,
            merchant = %record.merchant,
            "Created pending payment intent"
        );
        Ok(record)
    }

    /// Proposes a confirmation for the record behind a correlation key.
    ///
    /// Returns `None` when neither the key nor the signature is known to the
    /// ledger; the caller treats that as an ignorable event.
    pub fn try_confirm_by_key(
        &self,
        key: &CorrelationKey,
        signature: &str,
        confirmed_at: u64,
    ) -> Option<Confirmation> {
        if let Some(existing) = self.replay_of(signature) {
            return Some(existing);
        }
        let id = self.by_correlation.get(key)?.clone();
        self.confirm_record(&id, signature, confirmed_at)
    }

    /// Proposes a confirmation for a record by its id.
    ///
    /// Returns `None` for an unknown id.
    pub fn try_confirm_intent(
        &self,
        id: &IntentId,
        signature: &str,
        confirmed_at: u64,
    ) -> Option<Confirmation> {
        if let Some(existing) = self.replay_of(signature) {
            return Some(existing);
        }
        self.confirm_record(id, signature, confirmed_at)
    }

    /// Transitions `Pending → Failed` with a reason.
    ///
    /// A record that is already `Confirmed` or `Failed` is left untouched;
    /// the call is a no-op, not an error. Returns `None` for an unknown id.
    pub fn mark_failed(&self, id: &IntentId, reason: &str) -> Option<PaymentRecord> {
        let snapshot = {
            let mut entry = self.records.get_mut(id)?;
            let record = entry.value_mut();
            if record.status == PaymentStatus::Pending {
                record.status = PaymentStatus::Failed;
                record.failure = Some(reason.to_owned());
            }
            record.clone()
        };
        if snapshot.status == PaymentStatus::Failed {
            self.unwatch(&snapshot);
            tracing::info!(intent = %snapshot.id, reason, "Payment intent failed");
        }
        Some(snapshot)
    }

    /// All `Pending` records whose merchant receiving account is `address`.
    ///
    /// This is the watched-account read path the webhook ingester uses to
    /// narrow an inbound event to candidate intents without scanning the
    /// whole ledger.
    #[must_use]
    pub fn pending_for_account(&self, address: &Pubkey) -> Vec<PaymentRecord> {
        let ids = self
            .watched
            .get(address)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        ids.iter()
            .filter_map(|id| self.records.get(id).map(|r| r.value().clone()))
            .filter(|record| record.status == PaymentStatus::Pending)
            .collect()
    }

    /// Looks up a record by id.
    #[must_use]
    pub fn get(&self, id: &IntentId) -> Option<PaymentRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    /// Looks up a record by its correlation key.
    #[must_use]
    pub fn find_by_correlation(&self, key: &CorrelationKey) -> Option<PaymentRecord> {
        let id = self.by_correlation.get(key)?.clone();
        self.get(&id)
    }

    /// Whether a settling signature has already been recorded.
    #[must_use]
    pub fn is_signature_recorded(&self, signature: &str) -> bool {
        self.by_signature.contains_key(signature)
    }

    /// Looks up the record a signature settled.
    #[must_use]
    pub fn find_by_signature(&self, signature: &str) -> Option<PaymentRecord> {
        let id = self.by_signature.get(signature)?.clone();
        self.get(&id)
    }

    /// Number of records in the ledger.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the idempotent outcome for a signature that already settled
    /// some record, if any.
    fn replay_of(&self, signature: &str) -> Option<Confirmation> {
        let record = self.find_by_signature(signature)?;
        Some(Confirmation {
            applied: false,
            record,
        })
    }

    /// Applies `Pending → Confirmed` under the record's shard lock.
    fn confirm_record(
        &self,
        id: &IntentId,
        signature: &str,
        confirmed_at: u64,
    ) -> Option<Confirmation> {
        let (applied, snapshot) = {
            let mut entry = self.records.get_mut(id)?;
            let record = entry.value_mut();
            if record.status == PaymentStatus::Pending {
                record.status = PaymentStatus::Confirmed;
                record.signature = Some(signature.to_owned());
                record.confirmed_at = Some(confirmed_at);
                (true, record.clone())
            } else {
                (false, record.clone())
            }
        };

        if applied {
            self.by_signature.insert(signature.to_owned(), id.clone());
            self.unwatch(&snapshot);
            tracing::info!(
                intent = %snapshot.id,
                signature,
                "Payment confirmed"
            );
        } else {
            tracing::debug!(intent = %snapshot.id, "Confirmation proposal was a no-op");
        }
        Some(Confirmation {
            applied,
            record: snapshot,
        })
    }

    /// Drops a settled or failed record from the watched-account index.
    fn unwatch(&self, record: &PaymentRecord) {
        if let Some(mut entry) = self.watched.get_mut(&record.merchant) {
            entry.value_mut().retain(|id| id != &record.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::AssetKind;
    use rust_decimal::Decimal;
    use std::sync::Barrier;

    fn intent_for(merchant: Pubkey) -> PaymentIntent {
        let correlation = CorrelationKey::generate();
        PaymentIntent {
            id: IntentId::from_correlation(&correlation),
            storefront: "demo".into(),
            product: "sku-1".into(),
            amount: Decimal::from(10),
            asset: AssetKind::Sol,
            correlation,
            merchant,
            payer: Pubkey::new_unique(),
        }
    }

    #[test]
    fn create_rejects_duplicate_correlation_keys() {
        let ledger = PaymentLedger::new();
        let merchant = Pubkey::new_unique();
        let intent = intent_for(merchant);
        let mut twin = intent_for(merchant);
        twin.correlation = intent.correlation;

        ledger.create(intent).unwrap();
        assert!(ledger.create(twin).is_err());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn confirmation_is_idempotent() {
        let ledger = PaymentLedger::new();
        let intent = intent_for(Pubkey::new_unique());
        let key = intent.correlation;
        ledger.create(intent).unwrap();

        let first = ledger.try_confirm_by_key(&key, "sig-1", 100).unwrap();
        assert!(first.applied);
        assert_eq!(first.record.signature.as_deref(), Some("sig-1"));
        assert_eq!(first.record.confirmed_at, Some(100));

        let second = ledger.try_confirm_by_key(&key, "sig-2", 200).unwrap();
        assert!(!second.applied);
        assert_eq!(second.record.signature.as_deref(), Some("sig-1"));
        assert_eq!(second.record.confirmed_at, Some(100));
    }

    #[test]
    fn racing_confirmations_apply_exactly_once() {
        let ledger = PaymentLedger::new();
        let intent = intent_for(Pubkey::new_unique());
        let key = intent.correlation;
        ledger.create(intent).unwrap();

        let threads = 8;
        let barrier = Barrier::new(threads);
        let applied: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|n| {
                    let ledger = &ledger;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        let outcome = ledger
                            .try_confirm_by_key(&key, &format!("sig-{n}"), 100 + n as u64)
                            .unwrap();
                        usize::from(outcome.applied)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(applied, 1);
        let record = ledger.find_by_correlation(&key).unwrap();
        assert_eq!(record.status, PaymentStatus::Confirmed);
    }

    #[test]
    fn duplicate_signature_replays_without_touching_the_record() {
        let ledger = PaymentLedger::new();
        let intent = intent_for(Pubkey::new_unique());
        let key = intent.correlation;
        let id = intent.id.clone();
        ledger.create(intent).unwrap();

        // Poller wins with signature S; a later webhook delivery for the
        // same underlying signature proposes against the intent id.
        assert!(ledger.try_confirm_by_key(&key, "sig-s", 50).unwrap().applied);
        let replay = ledger.try_confirm_intent(&id, "sig-s", 999).unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.record.confirmed_at, Some(50));
        assert!(ledger.is_signature_recorded("sig-s"));
    }

    #[test]
    fn mark_failed_only_applies_to_pending_records() {
        let ledger = PaymentLedger::new();
        let intent = intent_for(Pubkey::new_unique());
        let key = intent.correlation;
        let id = intent.id.clone();
        ledger.create(intent).unwrap();

        assert!(ledger.try_confirm_by_key(&key, "sig-1", 100).unwrap().applied);
        let record = ledger.mark_failed(&id, "blockhash expired").unwrap();
        assert_eq!(record.status, PaymentStatus::Confirmed);
        assert!(record.failure.is_none());

        let other = intent_for(Pubkey::new_unique());
        let other_id = other.id.clone();
        ledger.create(other).unwrap();
        let failed = ledger.mark_failed(&other_id, "broadcast error").unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(failed.failure.as_deref(), Some("broadcast error"));
    }

    #[test]
    fn watched_index_only_serves_pending_intents() {
        let ledger = PaymentLedger::new();
        let merchant = Pubkey::new_unique();
        let first = intent_for(merchant);
        let second = intent_for(merchant);
        let first_key = first.correlation;
        ledger.create(first).unwrap();
        ledger.create(second).unwrap();

        assert_eq!(ledger.pending_for_account(&merchant).len(), 2);
        assert!(
            ledger
                .try_confirm_by_key(&first_key, "sig-1", 100)
                .unwrap()
                .applied
        );
        assert_eq!(ledger.pending_for_account(&merchant).len(), 1);
        assert!(ledger.pending_for_account(&Pubkey::new_unique()).is_empty());
    }
}
