//! Collaborator doubles shared by the unit tests.
#![allow(dead_code)]

use crate::collaborators::{
    ClearingAuthority, FeeCalculator, HonoringAdapter, NarrativeMirror, ObligationLookup,
};
use crate::config::ClearingEngineConfig;
use crate::error::CollaboratorError;
use crate::narrative::NarrativeRecord;
use crate::submission::ObligationSubmissionService;
use crate::types::*;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn payroll_intent() -> ObligationIntent {
    ObligationIntent::new(
        "CASH",
        "OBLIGATIONS",
        500_000,
        "Payroll Nov 1-15",
        ObligationMetadata::Salary {
            employee_id: "emp-042".into(),
            pay_period_start: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
            pay_period_end: NaiveDate::from_ymd_opt(2024, 11, 15).unwrap(),
        },
    )
    .unwrap()
}

pub fn service_with(
    authority: Arc<StubAuthority>,
    honoring: Arc<StubHonoring>,
    mirror: Arc<dyn NarrativeMirror>,
) -> ObligationSubmissionService {
    ObligationSubmissionService::new(
        ClearingEngineConfig::default(),
        authority,
        Arc::new(FlatFees::default()),
    )
    .with_honoring(honoring)
    .with_mirror(mirror)
}

enum AuthorityMode {
    Fixed(String),
    Rejecting(String),
    Unavailable,
    Hanging,
    Deduplicating,
    Delayed(String, Duration),
    /// Rejects every request whose amount equals the given value.
    RejectAmount(u64),
    PanicOnAmount(u64),
}

pub struct StubAuthority {
    mode: AuthorityMode,
    pub calls: AtomicUsize,
    seen: Mutex<Vec<IntentId>>,
    transfers: Mutex<HashMap<IntentId, TransferId>>,
}

impl StubAuthority {
    fn with_mode(mode: AuthorityMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            transfers: Mutex::new(HashMap::new()),
        })
    }

    pub fn fixed(transfer_id: &str) -> Arc<Self> {
        Self::with_mode(AuthorityMode::Fixed(transfer_id.to_string()))
    }

    pub fn rejecting(reason: &str) -> Arc<Self> {
        Self::with_mode(AuthorityMode::Rejecting(reason.to_string()))
    }

    pub fn unavailable() -> Arc<Self> {
        Self::with_mode(AuthorityMode::Unavailable)
    }

    pub fn hanging() -> Arc<Self> {
        Self::with_mode(AuthorityMode::Hanging)
    }

    pub fn deduplicating() -> Arc<Self> {
        Self::with_mode(AuthorityMode::Deduplicating)
    }

    pub fn delayed(transfer_id: &str, delay: Duration) -> Arc<Self> {
        Self::with_mode(AuthorityMode::Delayed(transfer_id.to_string(), delay))
    }

    pub fn rejecting_amount(amount_minor: u64) -> Arc<Self> {
        Self::with_mode(AuthorityMode::RejectAmount(amount_minor))
    }

    pub fn panicking_on_amount(amount_minor: u64) -> Arc<Self> {
        Self::with_mode(AuthorityMode::PanicOnAmount(amount_minor))
    }

    pub fn seen_intents(&self) -> Vec<IntentId> {
        self.seen.lock().unwrap().clone()
    }

    pub fn effective_transfers(&self) -> usize {
        self.transfers.lock().unwrap().len()
    }

    fn remember(&self, request: &ClearingRequest) -> TransferId {
        let mut transfers = self.transfers.lock().unwrap();
        let next = transfers.len() + 1;
        transfers
            .entry(request.intent_id.clone())
            .or_insert_with(|| TransferId::new(format!("tr-{next}")).unwrap())
            .clone()
    }
}

#[async_trait]
impl ClearingAuthority for StubAuthority {
    async fn clear(&self, request: &ClearingRequest) -> Result<ClearingResult, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.intent_id.clone());

        match &self.mode {
            AuthorityMode::Fixed(id) => Ok(ClearingResult::cleared(TransferId::new(id.clone()).unwrap())),
            AuthorityMode::Rejecting(reason) => Ok(ClearingResult::rejected(reason.clone())),
            AuthorityMode::Unavailable => Err(CollaboratorError::Unavailable("authority".into())),
            AuthorityMode::Hanging => {
                futures::future::pending::<()>().await;
                Ok(ClearingResult::rejected("unreachable"))
            }
            AuthorityMode::Deduplicating => Ok(ClearingResult::cleared(self.remember(request))),
            AuthorityMode::Delayed(id, delay) => {
                tokio::time::sleep(*delay).await;
                Ok(ClearingResult::cleared(TransferId::new(id.clone()).unwrap()))
            }
            AuthorityMode::RejectAmount(amount) if request.amount_minor == *amount => {
                Ok(ClearingResult::rejected("insufficient funds"))
            }
            AuthorityMode::PanicOnAmount(amount) if request.amount_minor == *amount => {
                panic!("authority client bug")
            }
            AuthorityMode::RejectAmount(_) | AuthorityMode::PanicOnAmount(_) => {
                Ok(ClearingResult::cleared(self.remember(request)))
            }
        }
    }
}

#[async_trait]
impl ObligationLookup for StubAuthority {
    async fn resolve(&self, reference: &str) -> Result<Option<ObligationSnapshot>, CollaboratorError> {
        let transfers = self.transfers.lock().unwrap();
        Ok(transfers
            .iter()
            .find(|(intent, transfer)| intent.as_str() == reference || transfer.as_str() == reference)
            .map(|(intent, transfer)| ObligationSnapshot {
                intent_id: intent.clone(),
                transfer_id: transfer.clone(),
                debit_account: "CASH".into(),
                credit_account: "OBLIGATIONS".into(),
                amount_minor: 500_000,
                currency: DEFAULT_CURRENCY.into(),
                purpose: ObligationPurpose::Salary,
                cleared_at: Utc::now(),
            }))
    }
}

enum HonoringMode {
    Ok,
    Failing(String),
    Ineligible(String),
    HangingEligibility,
    Panicking,
    Hanging,
    Delayed(Duration),
}

pub struct StubHonoring {
    mode: HonoringMode,
    pub eligibility_checks: AtomicUsize,
    pub attempts: AtomicUsize,
    last_request: Mutex<Option<HonoringRequest>>,
}

impl StubHonoring {
    fn with_mode(mode: HonoringMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            eligibility_checks: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::with_mode(HonoringMode::Ok)
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Self::with_mode(HonoringMode::Failing(reason.to_string()))
    }

    pub fn ineligible(reason: &str) -> Arc<Self> {
        Self::with_mode(HonoringMode::Ineligible(reason.to_string()))
    }

    pub fn hanging_eligibility() -> Arc<Self> {
        Self::with_mode(HonoringMode::HangingEligibility)
    }

    pub fn panicking() -> Arc<Self> {
        Self::with_mode(HonoringMode::Panicking)
    }

    pub fn hanging() -> Arc<Self> {
        Self::with_mode(HonoringMode::Hanging)
    }

    pub fn delayed(delay: Duration) -> Arc<Self> {
        Self::with_mode(HonoringMode::Delayed(delay))
    }

    pub fn last_request(&self) -> Option<HonoringRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl HonoringAdapter for StubHonoring {
    fn adapter_id(&self) -> &'static str {
        "stub"
    }

    async fn check_eligibility(&self, request: &HonoringRequest) -> Result<(), CollaboratorError> {
        self.eligibility_checks.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        match &self.mode {
            HonoringMode::Ineligible(reason) => Err(CollaboratorError::Ineligible(reason.clone())),
            HonoringMode::HangingEligibility => {
                futures::future::pending::<()>().await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn attempt(&self, _request: &HonoringRequest) -> Result<HonoringReceipt, CollaboratorError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.mode {
            HonoringMode::Failing(reason) => Err(CollaboratorError::Rejected(reason.clone())),
            HonoringMode::Panicking => panic!("honoring adapter exploded"),
            HonoringMode::Hanging => {
                futures::future::pending::<()>().await;
                Err(CollaboratorError::Unavailable("unreachable".into()))
            }
            HonoringMode::Delayed(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(receipt(n))
            }
            HonoringMode::Ok | HonoringMode::Ineligible(_) | HonoringMode::HangingEligibility => {
                Ok(receipt(n))
            }
        }
    }
}

fn receipt(n: usize) -> HonoringReceipt {
    HonoringReceipt {
        receipt_id: format!("rcpt-{n}"),
        adapter: "stub".into(),
        honored_at: Utc::now(),
        metadata: BTreeMap::new(),
    }
}

#[derive(Default)]
pub struct FlatFees {
    pub calls: AtomicUsize,
}

impl FeeCalculator for FlatFees {
    fn calculate(&self, _request: &FeeRequest) -> Result<FeeBreakdown, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FeeBreakdown::new("test-v1", 10, 5))
    }
}

pub struct FailingFees;

impl FeeCalculator for FailingFees {
    fn calculate(&self, _request: &FeeRequest) -> Result<FeeBreakdown, CollaboratorError> {
        Err(CollaboratorError::Unavailable("fee schedule".into()))
    }
}

#[derive(Default)]
pub struct RecordingMirror {
    records: Mutex<Vec<NarrativeRecord>>,
}

impl RecordingMirror {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn records(&self) -> Vec<NarrativeRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Poll until at least `count` detached writes have landed.
    pub async fn wait_for(&self, count: usize) -> Vec<NarrativeRecord> {
        for _ in 0..200 {
            if self.len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.records()
    }
}

#[async_trait]
impl NarrativeMirror for RecordingMirror {
    async fn record(&self, record: NarrativeRecord) -> Result<(), CollaboratorError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

pub struct FailingMirror;

impl FailingMirror {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl NarrativeMirror for FailingMirror {
    async fn record(&self, _record: NarrativeRecord) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::Unavailable("mirror store".into()))
    }
}

pub struct HangingMirror;

impl HangingMirror {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl NarrativeMirror for HangingMirror {
    async fn record(&self, _record: NarrativeRecord) -> Result<(), CollaboratorError> {
        futures::future::pending::<()>().await;
        Ok(())
    }
}
