//! Obligation clearing core.
//!
//! Submits financial obligations to an authoritative clearing authority and treats its
//! answer as final. Honoring is best-effort and runs only after clearing; narrative
//! mirror writes are detached and never awaited. Corrections are new obligations,
//! never mutations of the original.

#![deny(unsafe_code)]

pub mod batch;
pub mod collaborators;
pub mod config;
pub mod correction;
pub mod error;
pub mod flow;
pub mod mirror;
pub mod narrative;
pub mod reconciliation;
pub mod submission;
pub mod types;

#[cfg(test)]
mod test_support;

pub use batch::BatchOrchestrator;
pub use collaborators::{
    ClearingAuthority, FeeCalculator, HonoringAdapter, NarrativeMirror, ObligationLookup,
};
pub use config::ClearingEngineConfig;
pub use correction::CorrectionService;
pub use error::{CollaboratorError, FailureClass, ObligationError};
pub use flow::{
    ClearingGate, FailedFlow, HonoredFlow, HonoringPermit, SubmissionFlow, SubmissionStage,
};
pub use mirror::MirrorDispatcher;
pub use narrative::{
    BatchNarrative, CorrectionNarrative, NarrativeBody, NarrativeRecord, ObligationNarrative,
};
pub use reconciliation::{
    AmountMismatch, ReconciledTransfer, Reconciler, ReconciliationReport, UnknownTransfer,
};
pub use submission::ObligationSubmissionService;
pub use types::{
    BatchItemFailure, BatchResult, ClearedTransfer, ClearingRequest, ClearingResult,
    ClearingStatus, CorrectionIntent, CorrectionReceipt, CorrectionType, FeeBreakdown,
    FeeRequest, HonoringOutcome, HonoringReceipt, HonoringRecord, HonoringRequest, IntentId,
    ObligationIntent, ObligationMetadata, ObligationPurpose, ObligationResult,
    ObligationSnapshot, TransferId, DEFAULT_CURRENCY, INTENT_ID_METADATA_KEY,
    TRANSFER_ID_METADATA_KEY,
};
