use crate::collaborators::{ClearingAuthority, FeeCalculator, HonoringAdapter, NarrativeMirror};
use crate::config::ClearingEngineConfig;
use crate::error::{CollaboratorError, FailureClass, ObligationError};
use crate::flow::{HonoringPermit, SubmissionFlow};
use crate::mirror::MirrorDispatcher;
use crate::narrative::NarrativeRecord;
use crate::types::{
    ClearingRequest, ClearingResult, FeeBreakdown, FeeRequest, HonoringOutcome, HonoringRequest,
    IntentId, ObligationIntent, ObligationResult, INTENT_ID_METADATA_KEY,
    TRANSFER_ID_METADATA_KEY,
};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Submits one obligation: fee, clearing (finality point), honoring, mirror.
///
/// The returned result reflects only the authoritative clearing outcome. Honoring
/// degradations are attached as metadata and mirror writes are never awaited.
pub struct ObligationSubmissionService {
    config: ClearingEngineConfig,
    authority: Arc<dyn ClearingAuthority>,
    fees: Arc<dyn FeeCalculator>,
    honoring: Option<Arc<dyn HonoringAdapter>>,
    mirror: MirrorDispatcher,
}

impl ObligationSubmissionService {
    pub fn new(
        config: ClearingEngineConfig,
        authority: Arc<dyn ClearingAuthority>,
        fees: Arc<dyn FeeCalculator>,
    ) -> Self {
        Self {
            config,
            authority,
            fees,
            honoring: None,
            mirror: MirrorDispatcher::disabled(),
        }
    }

    pub fn with_honoring(mut self, adapter: Arc<dyn HonoringAdapter>) -> Self {
        self.honoring = Some(adapter);
        self
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn NarrativeMirror>) -> Self {
        self.mirror = MirrorDispatcher::new(mirror, self.config.mirror_timeout);
        self
    }

    pub fn config(&self) -> &ClearingEngineConfig {
        &self.config
    }

    pub(crate) fn mirror(&self) -> &MirrorDispatcher {
        &self.mirror
    }

    /// Submit one obligation.
    ///
    /// Always returns a result object; validation failures are folded into a failed
    /// result with `failure_class = validation`. A panic inside
    /// [`ClearingAuthority::clear`] is not caught here and unwinds to the caller;
    /// [`BatchOrchestrator`](crate::BatchOrchestrator) contains it per item.
    pub async fn submit(&self, intent: ObligationIntent) -> ObligationResult {
        let intent_id = resolve_intent_id(&intent);

        match self.submit_with_id(intent, intent_id.clone()).await {
            Ok(result) => result,
            Err(err) => {
                warn!(intent_id = %intent_id, error = %err, "obligation rejected before clearing");
                ObligationResult::failed(intent_id, None, err.class(), err.to_string())
            }
        }
    }

    /// Like [`submit`](Self::submit) but surfaces pre-clearing failures as errors.
    ///
    /// A clearing rejection is still an `Ok` result with `success == false`.
    pub async fn try_submit(
        &self,
        intent: ObligationIntent,
    ) -> Result<ObligationResult, ObligationError> {
        let intent_id = resolve_intent_id(&intent);
        self.submit_with_id(intent, intent_id).await
    }

    async fn submit_with_id(
        &self,
        mut intent: ObligationIntent,
        intent_id: IntentId,
    ) -> Result<ObligationResult, ObligationError> {
        intent.intent_id = Some(intent_id.clone());
        let mut flow = SubmissionFlow::new(intent_id.clone());

        intent.validate()?;
        flow.mark_validated()?;

        let fee = self.assess_fee(&intent, &intent_id)?;
        let gate = flow.mark_fee_assessed()?;
        debug!(intent_id = %intent_id, total_fee_minor = fee.total_fee_minor, "fee assessed");

        // Finality point. Nothing below this line may return an error.
        let request = ClearingRequest::from_intent(&intent, intent_id.clone(), fee.clone());
        let permit = match self.clear(&request).await {
            ClearingResult::Cleared { transfer_id } => gate.finalize(transfer_id),
            ClearingResult::Rejected { error } => {
                let failed = gate.fail();
                warn!(intent_id = %intent_id, error = %error, "clearing rejected");
                let result = ObligationResult::failed(
                    intent_id,
                    Some(fee),
                    FailureClass::Clearing,
                    error,
                );
                self.mirror
                    .dispatch(NarrativeRecord::obligation(&intent, &result));
                debug!(
                    intent_id = %result.intent_id,
                    stage = failed.mark_mirrored().name(),
                    "submission complete"
                );
                return Ok(result);
            }
        };

        info!(
            intent_id = %intent_id,
            transfer_id = %permit.transfer_id(),
            amount_minor = intent.amount_minor,
            purpose = intent.purpose.name(),
            "obligation cleared"
        );

        let honoring_outcome = match &self.honoring {
            Some(adapter) => Some(self.honor(adapter.as_ref(), &intent, &permit).await),
            None => None,
        };

        let honored = permit.mark_honored();

        let result = ObligationResult::finalized(
            intent_id,
            honored.transfer_id().clone(),
            honoring_outcome,
            fee,
        );
        self.mirror
            .dispatch(NarrativeRecord::obligation(&intent, &result));
        debug!(
            intent_id = %result.intent_id,
            stage = honored.mark_mirrored().name(),
            "submission complete"
        );
        Ok(result)
    }

    fn assess_fee(
        &self,
        intent: &ObligationIntent,
        intent_id: &IntentId,
    ) -> Result<FeeBreakdown, ObligationError> {
        let request = FeeRequest {
            intent_id: intent_id.clone(),
            amount_minor: intent.amount_minor,
            currency: intent.currency.clone(),
            purpose: intent.purpose,
        };
        self.fees
            .calculate(&request)
            .map_err(|e| ObligationError::FeeCalculation(e.to_string()))
    }

    /// Single bounded clearing call. Transport errors and timeouts are `Rejected`.
    async fn clear(&self, request: &ClearingRequest) -> ClearingResult {
        let timeout = self.config.clearing_timeout;
        match tokio::time::timeout(timeout, self.authority.clear(request)).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => ClearingResult::rejected(err.to_string()),
            Err(_) => ClearingResult::rejected(CollaboratorError::Timeout(timeout).to_string()),
        }
    }

    /// Best-effort honoring: eligibility pre-check, then the attempt, under one timeout.
    ///
    /// Every error, timeout and panic from either step becomes a failed outcome.
    async fn honor(
        &self,
        adapter: &dyn HonoringAdapter,
        intent: &ObligationIntent,
        permit: &HonoringPermit,
    ) -> HonoringOutcome {
        let request = honoring_request(intent, permit);
        let timeout = self.config.honoring_timeout;

        let attempt = async {
            if let Err(e) = adapter.check_eligibility(&request).await {
                return Err(e);
            }
            adapter.attempt(&request).await
        };

        let outcome = match AssertUnwindSafe(tokio::time::timeout(timeout, attempt))
            .catch_unwind()
            .await
        {
            Ok(Ok(Ok(receipt))) => HonoringOutcome::honored(receipt.receipt_id),
            Ok(Ok(Err(e))) => HonoringOutcome::failed(e.to_string()),
            Ok(Err(_)) => HonoringOutcome::failed(CollaboratorError::Timeout(timeout).to_string()),
            Err(panic) => HonoringOutcome::failed(format!(
                "honoring adapter panicked: {}",
                panic_message(panic.as_ref())
            )),
        };

        if outcome.succeeded {
            debug!(
                intent_id = %permit.intent_id(),
                adapter = adapter.adapter_id(),
                receipt_id = outcome.receipt_id.as_deref().unwrap_or_default(),
                "obligation honored"
            );
        } else {
            let degradation = ObligationError::Honoring(outcome.error.clone().unwrap_or_default());
            warn!(
                intent_id = %permit.intent_id(),
                transfer_id = %permit.transfer_id(),
                adapter = adapter.adapter_id(),
                failure_class = degradation.class().name(),
                error = %degradation,
                "honoring failed, clearing remains final"
            );
        }

        outcome
    }
}

fn resolve_intent_id(intent: &ObligationIntent) -> IntentId {
    intent.intent_id.clone().unwrap_or_else(IntentId::generate)
}

fn honoring_request(intent: &ObligationIntent, permit: &HonoringPermit) -> HonoringRequest {
    let mut metadata = intent.metadata.labels();
    metadata.insert(
        TRANSFER_ID_METADATA_KEY.to_string(),
        permit.transfer_id().to_string(),
    );
    metadata.insert(
        INTENT_ID_METADATA_KEY.to_string(),
        permit.intent_id().to_string(),
    );

    HonoringRequest {
        intent_id: permit.intent_id().clone(),
        transfer_id: permit.transfer_id().clone(),
        recipient: intent.recipient().to_string(),
        amount_minor: intent.amount_minor,
        currency: intent.currency.clone(),
        metadata,
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
