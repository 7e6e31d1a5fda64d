use crate::error::CollaboratorError;
use crate::narrative::NarrativeRecord;
use crate::types::{
    ClearingRequest, ClearingResult, FeeBreakdown, FeeRequest, HonoringReceipt, HonoringRecord,
    HonoringRequest, ObligationSnapshot,
};
use async_trait::async_trait;

/// The system of record. Sole authority on whether an obligation cleared.
///
/// Implementations must be idempotent per `intent_id`: a retry carrying the same key
/// returns the original outcome instead of clearing twice.
#[async_trait]
pub trait ClearingAuthority: Send + Sync {
    async fn clear(&self, request: &ClearingRequest) -> Result<ClearingResult, CollaboratorError>;
}

/// Best-effort physical fulfillment of an already-cleared obligation.
#[async_trait]
pub trait HonoringAdapter: Send + Sync {
    fn adapter_id(&self) -> &'static str;

    async fn check_eligibility(&self, _request: &HonoringRequest) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn attempt(&self, request: &HonoringRequest)
        -> Result<HonoringReceipt, CollaboratorError>;

    /// Adapter-side fulfillment records, for reconciliation.
    async fn list_records(&self) -> Result<Vec<HonoringRecord>, CollaboratorError> {
        Ok(Vec::new())
    }
}

/// Observational record store. Never consulted for correctness.
#[async_trait]
pub trait NarrativeMirror: Send + Sync {
    async fn record(&self, record: NarrativeRecord) -> Result<(), CollaboratorError>;
}

/// Pure fee computation consulted before clearing.
pub trait FeeCalculator: Send + Sync {
    fn calculate(&self, request: &FeeRequest) -> Result<FeeBreakdown, CollaboratorError>;
}

/// Read-only resolution of a prior obligation by transfer id or intent id.
#[async_trait]
pub trait ObligationLookup: Send + Sync {
    async fn resolve(&self, reference: &str)
        -> Result<Option<ObligationSnapshot>, CollaboratorError>;
}
