mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use common::{doc_ids, ScriptedService, Step};
use supply_chain_pipeline::error::PipelineError;
use supply_chain_pipeline::infrastructure::DocumentRegistry;
use supply_chain_pipeline::models::{Document, DocumentId, ExceptionKind, PipelineStage, RemoteState};
use supply_chain_pipeline::orchestrator::{BatchPollCoordinator, DriveOptions, StageController};
use supply_chain_pipeline::services::StatusPoller;

fn controller(
    service: &Arc<ScriptedService>,
    n: usize,
    max_attempts: u32,
) -> (Arc<StageController>, Arc<DocumentRegistry>) {
    let ids = doc_ids(n);
    let registry = Arc::new(DocumentRegistry::new());
    for id in &ids {
        registry.insert(Document::uploaded(id.clone(), format!("{id}.pdf"), 10));
    }
    let coordinator =
        BatchPollCoordinator::new(StatusPoller::new(service.clone()), registry.clone());
    let controller = StageController::new(
        7,
        ids,
        coordinator,
        DriveOptions::new(Duration::from_secs(1), max_attempts),
    );
    (Arc::new(controller), registry)
}

#[tokio::test(start_paused = true)]
async fn test_happy_path_reaches_terminal_stage() {
    let service = Arc::new(ScriptedService::new());
    let (controller, registry) = controller(&service, 3, 5);
    let cancel = CancellationToken::new();

    assert_eq!(controller.batch_id(), 7);
    assert_eq!(controller.current_stage(), PipelineStage::Intake);

    for target in [
        PipelineStage::Parsing,
        PipelineStage::Review,
        PipelineStage::Matching,
        PipelineStage::Complete,
    ] {
        let report = assert_ok!(controller.advance(target, &cancel).await);
        assert_eq!(report.to, target);
        assert!(report.is_clean());
    }

    assert!(controller.is_complete());
    assert!(controller.exceptions().is_empty());
    assert_eq!(service.total_calls(), 3);
    assert!(registry.all().iter().all(|doc| doc.status.is_terminal()));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_advance_is_idempotent() {
    let service = Arc::new(ScriptedService::new());
    let (controller, _registry) = controller(&service, 2, 5);
    let cancel = CancellationToken::new();

    let first = assert_ok!(controller.advance(PipelineStage::Parsing, &cancel).await);
    assert!(first.polled());
    let calls = service.total_calls();

    let repeat = assert_ok!(controller.advance(PipelineStage::Parsing, &cancel).await);
    assert_eq!(repeat.from, PipelineStage::Parsing);
    assert_eq!(repeat.to, PipelineStage::Parsing);
    assert!(!repeat.polled());
    assert_eq!(controller.current_stage(), PipelineStage::Parsing);
    assert_eq!(service.total_calls(), calls);

    // 回退后再前进，不会重复轮询
    assert_ok!(controller.rewind(PipelineStage::Intake));
    assert!(controller.is_processed(PipelineStage::Intake));
    let again = assert_ok!(controller.advance(PipelineStage::Parsing, &cancel).await);
    assert!(!again.polled());
    assert_eq!(controller.current_stage(), PipelineStage::Parsing);
    assert_eq!(service.total_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_stages_cannot_be_skipped() {
    let service = Arc::new(ScriptedService::new());
    let (controller, _registry) = controller(&service, 1, 5);
    let cancel = CancellationToken::new();

    for _ in 0..3 {
        let current = controller.current_stage();
        let skip = PipelineStage::from_number(current.number() + 2).unwrap();
        let err = assert_err!(controller.advance(skip, &cancel).await);
        assert!(matches!(
            err,
            PipelineError::InvalidTransition { from, to } if from == current.number() && to == skip.number()
        ));
        assert_eq!(controller.current_stage(), current);

        assert_ok!(controller.advance(current.next().unwrap(), &cancel).await);
    }

    let backwards = assert_err!(controller.advance(PipelineStage::Parsing, &cancel).await);
    assert!(matches!(backwards, PipelineError::InvalidTransition { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_document_goes_to_exception_bucket() {
    let service = Arc::new(ScriptedService::new());
    for i in 1..=4 {
        service.script(
            &format!("doc-{i}"),
            [Step::State(RemoteState::Parsing), Step::State(RemoteState::Completed)],
        );
    }
    service.script("doc-5", [Step::State(RemoteState::Parsing)]);
    let (controller, _registry) = controller(&service, 5, 3);
    let cancel = CancellationToken::new();

    let report = assert_ok!(controller.advance(PipelineStage::Parsing, &cancel).await);
    assert_eq!(controller.current_stage(), PipelineStage::Parsing);
    assert_eq!(report.partial_failures.len(), 1);
    let entry = &report.partial_failures[0];
    assert_eq!(entry.id, DocumentId::from("doc-5"));
    assert_eq!(entry.stage, PipelineStage::Intake);
    assert_eq!(entry.kind, ExceptionKind::TimedOut);

    // 异常桶中的文档不再参与后续阶段
    let polls_for_stuck = service.calls("doc-5");
    assert_ok!(controller.advance(PipelineStage::Review, &cancel).await);
    assert_eq!(service.calls("doc-5"), polls_for_stuck);

    // 远端恢复后重试
    service.script("doc-5", [Step::State(RemoteState::Completed)]);
    let retry = assert_ok!(controller.retry_exceptions(&cancel).await);
    assert_eq!(retry.retried, 1);
    assert_eq!(retry.recovered, vec![DocumentId::from("doc-5")]);
    assert!(retry.still_failing.is_empty());
    assert!(controller.exceptions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_error_documents_are_recorded_not_retried() {
    let service = Arc::new(ScriptedService::new());
    service.script("doc-2", [Step::Failed("PO number missing")]);
    let (controller, _registry) = controller(&service, 2, 3);
    let cancel = CancellationToken::new();

    let report = assert_ok!(controller.advance(PipelineStage::Parsing, &cancel).await);
    assert_eq!(report.partial_failures.len(), 1);
    assert_eq!(
        report.partial_failures[0].kind,
        ExceptionKind::Errored("PO number missing".to_string())
    );

    let retry = assert_ok!(controller.retry_exceptions(&cancel).await);
    assert_eq!(retry.retried, 0);
    assert_eq!(retry.still_failing.len(), 1);

    assert!(controller.clear_exception(&"doc-2".into()));
    assert!(controller.exceptions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_advance_leaves_stage_unchanged() {
    let service = Arc::new(ScriptedService::new().with_delay(Duration::from_secs(5)));
    let (controller, _registry) = controller(&service, 4, 3);
    let cancel = CancellationToken::new();

    let task = {
        let controller = controller.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { controller.advance(PipelineStage::Parsing, &cancel).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(controller.is_busy());
    cancel.cancel();

    let err = assert_err!(task.await.unwrap());
    assert!(matches!(
        err,
        PipelineError::Cancelled {
            stage: PipelineStage::Intake
        }
    ));
    assert_eq!(controller.current_stage(), PipelineStage::Intake);
    assert!(!controller.is_processed(PipelineStage::Intake));
    assert!(!controller.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_advance_is_rejected() {
    let service = Arc::new(ScriptedService::new().with_delay(Duration::from_secs(5)));
    let (controller, _registry) = controller(&service, 2, 3);
    let cancel = CancellationToken::new();

    let task = {
        let controller = controller.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { controller.advance(PipelineStage::Parsing, &cancel).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    let err = assert_err!(controller.advance(PipelineStage::Parsing, &cancel).await);
    assert!(matches!(err, PipelineError::AdvanceInProgress { .. }));
    assert!(matches!(
        controller.rewind(PipelineStage::Intake),
        Err(PipelineError::AdvanceInProgress { .. })
    ));

    assert_ok!(task.await.unwrap());
    assert_eq!(controller.current_stage(), PipelineStage::Parsing);
}

#[tokio::test(start_paused = true)]
async fn test_document_stage_is_capped_by_controller() {
    let service = Arc::new(ScriptedService::new());
    service.script("doc-1", [Step::State(RemoteState::Matching)]);
    let (controller, registry) = controller(&service, 1, 0);
    let cancel = CancellationToken::new();

    assert_eq!(registry.stage_ceiling(), 2);
    assert_ok!(controller.advance(PipelineStage::Parsing, &cancel).await);

    let doc = registry.get(&"doc-1".into()).unwrap();
    assert_eq!(doc.stage, 2);
    assert_eq!(registry.stage_ceiling(), 3);
}
