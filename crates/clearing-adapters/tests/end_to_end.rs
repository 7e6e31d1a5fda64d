use chrono::NaiveDate;
use clearing_adapters::{
    AlwaysFailHonoringAdapter, FeeSchedule, InMemoryClearingAuthority, InMemoryNarrativeMirror,
    MockAchHonoringAdapter,
};
use clearing_core::{
    BatchOrchestrator, ClearingEngineConfig, ClearingStatus, CorrectionIntent, CorrectionService,
    CorrectionType, HonoringAdapter, IntentId, NarrativeBody, ObligationIntent,
    ObligationMetadata, ObligationSubmissionService, Reconciler,
};
use std::sync::Arc;
use std::time::Duration;

fn salary(employee: &str, amount_minor: u64) -> ObligationIntent {
    ObligationIntent::new(
        "CASH",
        "OBLIGATIONS",
        amount_minor,
        "Payroll Nov 1-15",
        ObligationMetadata::Salary {
            employee_id: employee.into(),
            pay_period_start: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
            pay_period_end: NaiveDate::from_ymd_opt(2024, 11, 15).unwrap(),
        },
    )
    .unwrap()
}

async fn wait_for_records(mirror: &InMemoryNarrativeMirror, count: usize) {
    for _ in 0..200 {
        if mirror.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn payroll_clears_even_when_honoring_fails() {
    let authority = Arc::new(InMemoryClearingAuthority::new());
    let service = ObligationSubmissionService::new(
        ClearingEngineConfig::default(),
        authority.clone(),
        Arc::new(FeeSchedule::default()),
    )
    .with_honoring(Arc::new(AlwaysFailHonoringAdapter::new(
        "ach",
        "recipient not eligible",
    )));

    let result = service.submit(salary("emp-042", 500_000)).await;

    assert!(result.success);
    assert_eq!(result.clearing_status, ClearingStatus::Finalized);
    let outcome = result.honoring_outcome.clone().unwrap();
    assert!(outcome.attempted);
    assert!(!outcome.succeeded);
    assert_eq!(outcome.error.as_deref(), Some("recipient not eligible"));

    let cleared = authority.cleared_transfers().unwrap();
    assert_eq!(cleared.len(), 1);
    assert_eq!(Some(&cleared[0].transfer_id), result.transfer_id.as_ref());
    assert_eq!(result.fee_breakdown.unwrap().total_fee_minor, 1_250 + 30);
}

#[tokio::test]
async fn retry_with_same_intent_id_clears_once() {
    let authority = Arc::new(InMemoryClearingAuthority::new());
    let service = ObligationSubmissionService::new(
        ClearingEngineConfig::default(),
        authority.clone(),
        Arc::new(FeeSchedule::default()),
    );

    let key = IntentId::new("payroll-2024-11-emp-042").unwrap();
    let first = service
        .submit(salary("emp-042", 500_000).with_intent_id(key.clone()))
        .await;
    let retry = service
        .submit(salary("emp-042", 500_000).with_intent_id(key))
        .await;

    assert_eq!(first.transfer_id, retry.transfer_id);
    assert_eq!(authority.transfer_count().unwrap(), 1);
}

#[tokio::test]
async fn batch_correction_and_reconciliation_flow() {
    let authority = Arc::new(InMemoryClearingAuthority::new().with_rejected_account("FROZEN"));
    let ach = Arc::new(MockAchHonoringAdapter::new().with_ineligible_recipient("emp-999"));
    let mirror = Arc::new(InMemoryNarrativeMirror::new());
    let service = Arc::new(
        ObligationSubmissionService::new(
            ClearingEngineConfig::default(),
            authority.clone(),
            Arc::new(FeeSchedule::default()),
        )
        .with_honoring(ach.clone())
        .with_mirror(mirror.clone()),
    );

    let mut frozen = salary("emp-003", 300_000);
    frozen.debit_account = "FROZEN".into();
    let items = vec![
        salary("emp-001", 100_000),
        salary("emp-002", 200_000),
        frozen,
        salary("emp-999", 400_000),
    ];

    let batch = BatchOrchestrator::new(service.clone())
        .submit_batch_default(items)
        .await
        .unwrap();

    assert_eq!(batch.success_count, 3);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].index, 2);
    assert_eq!(batch.total_amount_minor, 700_000);
    let ineligible = batch.items[3].honoring_outcome.clone().unwrap();
    assert!(ineligible.attempted && !ineligible.succeeded);
    assert!(ineligible.error.unwrap().contains("not eligible"));

    let original = batch.items[0].clone();
    let corrections = CorrectionService::new(service.clone(), authority.clone());
    let receipt = corrections
        .submit_correction(
            CorrectionIntent::new(
                original.transfer_id.clone().unwrap().as_str(),
                CorrectionType::Correction,
                5_000,
                "overtime omitted",
                NaiveDate::from_ymd_opt(2024, 11, 20).unwrap(),
            )
            .with_recipient("emp-001"),
        )
        .await
        .unwrap();

    assert_ne!(Some(&receipt.new_clearing_id), original.transfer_id.as_ref());
    assert_eq!(receipt.fee_amount_minor, 0);
    assert_eq!(batch.items[0], original);
    assert!(authority.verify_chain().unwrap());

    let report = Reconciler::reconcile_adapter(
        ach.as_ref() as &dyn HonoringAdapter,
        &authority.cleared_transfers().unwrap(),
    )
    .await
    .unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.matched.len(), 3);
    assert_eq!(report.unhonored_transfers.len(), 1);
    assert_eq!(report.skipped, 0);

    // 4 obligations + 1 batch summary + 1 correction obligation + 1 correction narrative.
    wait_for_records(&mirror, 7).await;
    let records = mirror.records().unwrap();
    assert_eq!(records.len(), 7);
    assert!(records.iter().all(|record| record.verify_digest()));
    assert_eq!(
        records
            .iter()
            .filter(|record| matches!(record.body, NarrativeBody::BatchSummary(_)))
            .count(),
        1
    );
}
