use crate::error::ObligationError;
use crate::types::{IntentId, TransferId};

/// Stages one submission passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Received,
    Validated,
    FeeAssessed,
    Finalized,
    Failed,
    Honored,
    Mirrored,
}

impl SubmissionStage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::FeeAssessed => "fee_assessed",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
            Self::Honored => "honored",
            Self::Mirrored => "mirrored",
        }
    }
}

/// Enforces received->validated->fee_assessed ordering before clearing.
///
/// Once the fee is assessed the flow is consumed into a [`ClearingGate`]; from there
/// the only transitions are infallible, so nothing after the clearing call can error.
/// A gate ends either as [`FailedFlow`] or as [`HonoringPermit`] -> [`HonoredFlow`],
/// and both end in [`SubmissionStage::Mirrored`].
#[derive(Debug, Clone)]
pub struct SubmissionFlow {
    intent_id: IntentId,
    stage: SubmissionStage,
}

impl SubmissionFlow {
    pub fn new(intent_id: IntentId) -> Self {
        Self {
            intent_id,
            stage: SubmissionStage::Received,
        }
    }

    pub fn intent_id(&self) -> &IntentId {
        &self.intent_id
    }

    pub fn stage(&self) -> SubmissionStage {
        self.stage
    }

    pub fn mark_validated(&mut self) -> Result<(), ObligationError> {
        self.advance(SubmissionStage::Received, SubmissionStage::Validated)
    }

    pub fn mark_fee_assessed(mut self) -> Result<ClearingGate, ObligationError> {
        self.advance(SubmissionStage::Validated, SubmissionStage::FeeAssessed)?;
        Ok(ClearingGate {
            intent_id: self.intent_id,
        })
    }

    fn advance(
        &mut self,
        expected_current: SubmissionStage,
        next: SubmissionStage,
    ) -> Result<(), ObligationError> {
        if self.stage != expected_current {
            return Err(ObligationError::stage_violation(
                expected_current.name(),
                self.stage.name(),
            ));
        }
        self.stage = next;
        Ok(())
    }
}

/// A submission that is ready for, or waiting on, its single clearing call.
#[derive(Debug)]
pub struct ClearingGate {
    intent_id: IntentId,
}

impl ClearingGate {
    pub fn intent_id(&self) -> &IntentId {
        &self.intent_id
    }

    pub fn finalize(self, transfer_id: TransferId) -> HonoringPermit {
        HonoringPermit {
            intent_id: self.intent_id,
            transfer_id,
        }
    }

    pub fn fail(self) -> FailedFlow {
        FailedFlow {
            intent_id: self.intent_id,
        }
    }
}

/// A submission the authority refused. Its only remaining step is the mirror write.
#[derive(Debug)]
pub struct FailedFlow {
    intent_id: IntentId,
}

impl FailedFlow {
    pub fn intent_id(&self) -> &IntentId {
        &self.intent_id
    }

    pub fn stage(&self) -> SubmissionStage {
        SubmissionStage::Failed
    }

    /// Marks the narrative record as dispatched. The write itself is never awaited.
    pub fn mark_mirrored(self) -> SubmissionStage {
        SubmissionStage::Mirrored
    }
}

/// Proof that the authority cleared the obligation.
///
/// Only [`ClearingGate::finalize`] can build one, and honoring requires it, so an
/// honoring attempt for an uncleared obligation cannot be expressed.
#[derive(Debug, Clone)]
pub struct HonoringPermit {
    intent_id: IntentId,
    transfer_id: TransferId,
}

impl HonoringPermit {
    pub fn intent_id(&self) -> &IntentId {
        &self.intent_id
    }

    pub fn transfer_id(&self) -> &TransferId {
        &self.transfer_id
    }

    pub fn stage(&self) -> SubmissionStage {
        SubmissionStage::Finalized
    }

    /// Closes the honoring step, whatever its outcome, or when no adapter is wired.
    pub fn mark_honored(self) -> HonoredFlow {
        HonoredFlow {
            intent_id: self.intent_id,
            transfer_id: self.transfer_id,
        }
    }
}

/// A cleared submission whose honoring step is done.
#[derive(Debug)]
pub struct HonoredFlow {
    intent_id: IntentId,
    transfer_id: TransferId,
}

impl HonoredFlow {
    pub fn intent_id(&self) -> &IntentId {
        &self.intent_id
    }

    pub fn transfer_id(&self) -> &TransferId {
        &self.transfer_id
    }

    pub fn stage(&self) -> SubmissionStage {
        SubmissionStage::Honored
    }

    /// Marks the narrative record as dispatched. The write itself is never awaited.
    pub fn mark_mirrored(self) -> SubmissionStage {
        SubmissionStage::Mirrored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforces_stage_order() {
        let mut flow = SubmissionFlow::new(IntentId::new("intent-a").unwrap());
        assert!(flow.mark_validated().is_ok());
        let gate = flow.mark_fee_assessed().unwrap();
        let permit = gate.finalize(TransferId::new("T1").unwrap());
        assert_eq!(permit.transfer_id().as_str(), "T1");
        assert_eq!(permit.stage(), SubmissionStage::Finalized);

        let honored = permit.mark_honored();
        assert_eq!(honored.stage(), SubmissionStage::Honored);
        assert_eq!(honored.transfer_id().as_str(), "T1");
        assert_eq!(honored.intent_id().as_str(), "intent-a");
        assert_eq!(honored.mark_mirrored(), SubmissionStage::Mirrored);
    }

    #[test]
    fn refused_clearing_skips_honoring_and_still_mirrors() {
        let mut flow = SubmissionFlow::new(IntentId::new("intent-d").unwrap());
        flow.mark_validated().unwrap();
        let failed = flow.mark_fee_assessed().unwrap().fail();
        assert_eq!(failed.stage(), SubmissionStage::Failed);
        assert_eq!(failed.intent_id().as_str(), "intent-d");
        assert_eq!(failed.mark_mirrored().name(), "mirrored");
    }

    #[test]
    fn rejects_fee_assessment_before_validation() {
        let flow = SubmissionFlow::new(IntentId::new("intent-b").unwrap());
        let err = flow.mark_fee_assessed().unwrap_err();
        assert!(err
            .to_string()
            .contains("expected 'validated', got 'received'"));
    }

    #[test]
    fn rejects_double_validation() {
        let mut flow = SubmissionFlow::new(IntentId::new("intent-c").unwrap());
        flow.mark_validated().unwrap();
        assert!(flow.mark_validated().is_err());
        assert_eq!(flow.stage(), SubmissionStage::Validated);
    }
}
