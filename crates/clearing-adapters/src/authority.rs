use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clearing_core::collaborators::{ClearingAuthority, ObligationLookup};
use clearing_core::error::CollaboratorError;
use clearing_core::types::{
    ClearedTransfer, ClearingRequest, ClearingResult, IntentId, ObligationSnapshot, TransferId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// One cleared transfer in the authority journal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalEntry {
    pub index: u64,
    pub intent_id: IntentId,
    pub transfer_id: TransferId,
    pub cleared_at: DateTime<Utc>,
    pub request: ClearingRequest,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

#[derive(Debug, Default)]
struct Journal {
    entries: Vec<JournalEntry>,
    by_intent: HashMap<String, usize>,
    by_transfer: HashMap<String, usize>,
}

/// In-process system of record with an append-only, hash-chained journal.
///
/// Idempotent per intent id: a retry returns the transfer id recorded the first time.
/// Rejections are not journaled. There is no API to amend or remove an entry.
#[derive(Debug, Default)]
pub struct InMemoryClearingAuthority {
    journal: Mutex<Journal>,
    rejected_accounts: BTreeSet<String>,
    unavailable: AtomicBool,
}

impl InMemoryClearingAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every obligation that debits or credits `account`.
    pub fn with_rejected_account(mut self, account: impl Into<String>) -> Self {
        self.rejected_accounts.insert(account.into());
        self
    }

    /// Simulate a transport outage. Calls fail with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Result<Vec<JournalEntry>, CollaboratorError> {
        Ok(self.lock()?.entries.clone())
    }

    pub fn transfer_count(&self) -> Result<usize, CollaboratorError> {
        Ok(self.lock()?.entries.len())
    }

    pub fn cleared_transfers(&self) -> Result<Vec<ClearedTransfer>, CollaboratorError> {
        Ok(self
            .lock()?
            .entries
            .iter()
            .map(|entry| ClearedTransfer {
                transfer_id: entry.transfer_id.clone(),
                intent_id: entry.intent_id.clone(),
                amount_minor: entry.request.amount_minor,
                currency: entry.request.currency.clone(),
            })
            .collect())
    }

    pub fn verify_chain(&self) -> Result<bool, CollaboratorError> {
        Ok(verify_entries(&self.lock()?.entries))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Journal>, CollaboratorError> {
        self.journal
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("authority journal lock poisoned".into()))
    }
}

#[async_trait]
impl ClearingAuthority for InMemoryClearingAuthority {
    async fn clear(&self, request: &ClearingRequest) -> Result<ClearingResult, CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable(
                "clearing authority offline".into(),
            ));
        }

        let mut journal = self.lock()?;

        if let Some(&position) = journal.by_intent.get(request.intent_id.as_str()) {
            let existing = &journal.entries[position];
            if !same_obligation(&existing.request, request) {
                return Ok(ClearingResult::rejected(format!(
                    "intent id '{}' was already used for a different obligation",
                    request.intent_id
                )));
            }
            debug!(
                intent_id = %request.intent_id,
                transfer_id = %existing.transfer_id,
                "retry of cleared intent, returning original transfer"
            );
            return Ok(ClearingResult::cleared(existing.transfer_id.clone()));
        }

        for account in [&request.debit_account, &request.credit_account] {
            if self.rejected_accounts.contains(account.as_str()) {
                return Ok(ClearingResult::rejected(format!(
                    "account '{account}' is not accepted for clearing"
                )));
            }
        }

        let transfer_id = derive_transfer_id(&request.intent_id)?;
        let entry = build_entry(&journal.entries, request, transfer_id.clone())?;
        let position = journal.entries.len();
        journal
            .by_intent
            .insert(request.intent_id.to_string(), position);
        journal.by_transfer.insert(transfer_id.to_string(), position);
        journal.entries.push(entry);

        debug!(
            intent_id = %request.intent_id,
            transfer_id = %transfer_id,
            index = position,
            "transfer journaled"
        );
        Ok(ClearingResult::cleared(transfer_id))
    }
}

#[async_trait]
impl ObligationLookup for InMemoryClearingAuthority {
    async fn resolve(
        &self,
        reference: &str,
    ) -> Result<Option<ObligationSnapshot>, CollaboratorError> {
        let journal = self.lock()?;
        let position = journal
            .by_transfer
            .get(reference)
            .or_else(|| journal.by_intent.get(reference))
            .copied();

        Ok(position.map(|position| {
            let entry = &journal.entries[position];
            ObligationSnapshot {
                intent_id: entry.intent_id.clone(),
                transfer_id: entry.transfer_id.clone(),
                debit_account: entry.request.debit_account.clone(),
                credit_account: entry.request.credit_account.clone(),
                amount_minor: entry.request.amount_minor,
                currency: entry.request.currency.clone(),
                purpose: entry.request.purpose,
                cleared_at: entry.cleared_at,
            }
        }))
    }
}

fn same_obligation(a: &ClearingRequest, b: &ClearingRequest) -> bool {
    a.debit_account == b.debit_account
        && a.credit_account == b.credit_account
        && a.amount_minor == b.amount_minor
        && a.currency == b.currency
        && a.purpose == b.purpose
}

/// Deterministic per intent id, so a replayed journal yields the same ids.
fn derive_transfer_id(intent_id: &IntentId) -> Result<TransferId, CollaboratorError> {
    let digest = blake3::hash(intent_id.as_str().as_bytes()).to_hex();
    TransferId::new(format!("tr-{}", &digest.as_str()[..16]))
        .map_err(|e| CollaboratorError::Rejected(e.to_string()))
}

fn build_entry(
    entries: &[JournalEntry],
    request: &ClearingRequest,
    transfer_id: TransferId,
) -> Result<JournalEntry, CollaboratorError> {
    let index = entries.len() as u64;
    let cleared_at = Utc::now();
    let previous_hash = entries.last().map(|entry| entry.entry_hash.clone());
    let payload = serde_json::to_value(request)
        .map_err(|e| CollaboratorError::Rejected(format!("unserializable request: {e}")))?;
    let entry_hash = compute_entry_hash(
        index,
        &transfer_id,
        cleared_at,
        &payload,
        previous_hash.as_deref(),
    );

    Ok(JournalEntry {
        index,
        intent_id: request.intent_id.clone(),
        transfer_id,
        cleared_at,
        request: request.clone(),
        previous_hash,
        entry_hash,
    })
}

fn verify_entries(entries: &[JournalEntry]) -> bool {
    let mut previous_hash: Option<String> = None;
    for (position, entry) in entries.iter().enumerate() {
        if entry.index != position as u64 || entry.previous_hash != previous_hash {
            return false;
        }
        let Ok(payload) = serde_json::to_value(&entry.request) else {
            return false;
        };
        let expected = compute_entry_hash(
            entry.index,
            &entry.transfer_id,
            entry.cleared_at,
            &payload,
            previous_hash.as_deref(),
        );
        if entry.entry_hash != expected {
            return false;
        }
        previous_hash = Some(entry.entry_hash.clone());
    }
    true
}

fn compute_entry_hash(
    index: u64,
    transfer_id: &TransferId,
    cleared_at: DateTime<Utc>,
    payload: &Value,
    previous_hash: Option<&str>,
) -> String {
    let material = serde_json::json!({
        "index": index,
        "transfer_id": transfer_id,
        "cleared_at": cleared_at,
        "payload": payload,
        "previous_hash": previous_hash,
    });

    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}
