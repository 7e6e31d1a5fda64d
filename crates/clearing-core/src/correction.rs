use crate::collaborators::ObligationLookup;
use crate::error::{FailureClass, ObligationError};
use crate::narrative::{CorrectionNarrative, NarrativeRecord};
use crate::submission::ObligationSubmissionService;
use crate::types::{
    CorrectionIntent, CorrectionReceipt, CorrectionType, IntentId, ObligationIntent,
    ObligationMetadata, ObligationResult, ObligationSnapshot,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Amendments to prior obligations, expressed as brand-new obligations.
///
/// The original is read through [`ObligationLookup`] for context and never written.
/// There is no reversal, void or refund path.
pub struct CorrectionService {
    submissions: Arc<ObligationSubmissionService>,
    lookup: Arc<dyn ObligationLookup>,
}

impl CorrectionService {
    pub fn new(
        submissions: Arc<ObligationSubmissionService>,
        lookup: Arc<dyn ObligationLookup>,
    ) -> Self {
        Self {
            submissions,
            lookup,
        }
    }

    pub async fn submit_correction(
        &self,
        correction: CorrectionIntent,
    ) -> Result<CorrectionReceipt, ObligationError> {
        validate_correction(&correction)?;
        let original = self.resolve_original(&correction.original_ref).await?;

        let correction_id = IntentId::generate();
        let intent = derive_intent(&correction, &original, correction_id.clone())?;
        let result = self.submissions.submit(intent).await;

        self.submissions
            .mirror()
            .dispatch(NarrativeRecord::correction(CorrectionNarrative {
                correction_id: correction_id.clone(),
                original_ref: correction.original_ref.clone(),
                correction_type: correction.correction_type,
                amount_minor: correction.amount_minor,
                reason: correction.reason.clone(),
                clearing_status: result.clearing_status,
                transfer_id: result.transfer_id.clone(),
                error: result.error.clone(),
            }));

        let new_clearing_id = match (&result.transfer_id, result.success) {
            (Some(transfer_id), true) => transfer_id.clone(),
            _ => return Err(correction_failure(&result)),
        };

        info!(
            correction_id = %correction_id,
            original_transfer_id = %original.transfer_id,
            new_transfer_id = %new_clearing_id,
            correction_type = correction.correction_type.purpose().name(),
            "correction cleared"
        );

        Ok(CorrectionReceipt {
            correction_id,
            original_ref: correction.original_ref,
            new_clearing_id,
            fee_amount_minor: result.total_fee_minor(),
            result,
        })
    }

    async fn resolve_original(
        &self,
        original_ref: &str,
    ) -> Result<ObligationSnapshot, ObligationError> {
        match self.lookup.resolve(original_ref).await {
            Ok(Some(snapshot)) => Ok(snapshot),
            Ok(None) => Err(ObligationError::OriginalNotFound(original_ref.to_string())),
            Err(e) => {
                warn!(original_ref, error = %e, "original obligation lookup failed");
                Err(ObligationError::OriginalNotFound(original_ref.to_string()))
            }
        }
    }
}

fn validate_correction(correction: &CorrectionIntent) -> Result<(), ObligationError> {
    if correction.amount_minor == 0 {
        return Err(ObligationError::validation(
            "correction amount_minor must be greater than zero",
        ));
    }
    if correction.original_ref.trim().is_empty() {
        return Err(ObligationError::validation(
            "correction original_ref must not be empty",
        ));
    }
    if correction.reason.trim().is_empty() {
        return Err(ObligationError::validation(
            "correction reason must not be empty",
        ));
    }
    Ok(())
}

fn derive_intent(
    correction: &CorrectionIntent,
    original: &ObligationSnapshot,
    correction_id: IntentId,
) -> Result<ObligationIntent, ObligationError> {
    let original_ref = original.transfer_id.to_string();
    let reason = correction.reason.clone();
    let recipient = correction.recipient.clone();
    let metadata = match correction.correction_type {
        CorrectionType::Correction => ObligationMetadata::Correction {
            original_ref,
            reason,
            recipient,
        },
        CorrectionType::Supplement => ObligationMetadata::Supplement {
            original_ref,
            reason,
            recipient,
        },
    };

    let description = format!(
        "{} of {}: {}",
        correction.correction_type.purpose(),
        original.transfer_id,
        correction.reason
    );
    let debit_account = correction
        .debit_account
        .clone()
        .unwrap_or_else(|| original.debit_account.clone());
    let credit_account = correction
        .credit_account
        .clone()
        .unwrap_or_else(|| original.credit_account.clone());
    let currency = correction
        .currency
        .clone()
        .unwrap_or_else(|| original.currency.clone());

    Ok(ObligationIntent::new(
        debit_account,
        credit_account,
        correction.amount_minor,
        description,
        metadata,
    )?
    .with_intent_id(correction_id)
    .with_currency(currency)
    .with_scheduled_date(correction.effective_date))
}

fn correction_failure(result: &ObligationResult) -> ObligationError {
    let message = result
        .error
        .clone()
        .unwrap_or_else(|| "correction did not clear".to_string());
    match result.failure_class {
        Some(FailureClass::Validation) => ObligationError::Validation(message),
        _ => ObligationError::Clearing(message),
    }
}
