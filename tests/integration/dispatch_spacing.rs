//! Launch spacing and dispatcher lifecycle, checked against a recording pacer.

use std::sync::Arc;
use std::time::Duration;

use folio::cost::CostModel;
use folio::document::MemorySink;
use folio::error::PipelineError;
use folio::pacer::RecordingPacer;
use folio::rate::RateBudget;
use folio::scheduler::{Dispatcher, Executor, RetryPolicy};
use folio::{Pipeline, PipelineOptions, Submission};
use tokio::sync::mpsc;

use super::support::{budget, client, template, unit_set, ScriptedClient};

#[tokio::test]
async fn one_slot_per_small_request() {
    let pacer = RecordingPacer::new();
    let (_stub, service) = client(ScriptedClient::new());
    let summary = Pipeline::new(
        PipelineOptions::new(budget(), template()),
        service,
        Arc::new(MemorySink::new()),
    )
    .with_pacer(Arc::new(pacer.clone()))
    .run(&unit_set(&["a", "b", "c"]))
    .await
    .unwrap();

    assert_eq!(pacer.pauses(), vec![Duration::from_secs(4); 3]);
    assert_eq!(summary.paced, Duration::from_secs(12));
}

#[tokio::test]
async fn large_requests_pay_for_extra_slots() {
    // ~150_000 tokens of a 1_000_000 ceiling split 15 ways is 3 slots
    let big = "y".repeat(600_000);
    let pacer = RecordingPacer::new();
    let (_stub, service) = client(ScriptedClient::new());
    Pipeline::new(
        PipelineOptions::new(budget(), template()),
        service,
        Arc::new(MemorySink::new()),
    )
    .with_pacer(Arc::new(pacer.clone()))
    .run(&unit_set(&["small", big.as_str()]))
    .await
    .unwrap();

    assert_eq!(
        pacer.pauses(),
        vec![Duration::from_secs(4), Duration::from_secs(12)]
    );
}

#[tokio::test]
async fn oversized_rejection_is_not_paced() {
    let huge = "z".repeat(4_800_000);
    let pacer = RecordingPacer::new();
    let (_stub, service) = client(ScriptedClient::new());
    let summary = Pipeline::new(
        PipelineOptions::new(budget(), template()).with_retry(RetryPolicy::immediate(1)),
        service,
        Arc::new(MemorySink::new()),
    )
    .with_pacer(Arc::new(pacer.clone()))
    .run(&unit_set(&[huge.as_str(), "small"]))
    .await
    .unwrap();

    assert_eq!(pacer.pauses(), vec![Duration::from_secs(4)]);
    assert_eq!(summary.dispatch_attempts, 2);
    assert_eq!(summary.failed.len(), 1);
}

#[tokio::test]
async fn retry_backoff_uses_policy_delay() {
    let pacer = RecordingPacer::new();
    let (_stub, service) = client(ScriptedClient::new().failing("a", 2));
    Pipeline::new(
        PipelineOptions::new(budget(), template()).with_retry(RetryPolicy::default()),
        service,
        Arc::new(MemorySink::new()),
    )
    .with_pacer(Arc::new(pacer.clone()))
    .run(&unit_set(&["a"]))
    .await
    .unwrap();

    let pauses = pacer.pauses();
    let launches = pauses
        .iter()
        .filter(|d| **d == Duration::from_secs(4))
        .count();
    assert_eq!(launches, 3);
    // 2s * 0.75, then 4s * 0.90
    assert!(pauses.contains(&Duration::from_millis(1500)));
    assert!(pauses.contains(&Duration::from_millis(3600)));
}

#[tokio::test]
async fn dispatcher_drains_before_closing_output() {
    let (input_tx, input_rx) = mpsc::channel(8);
    let (output_tx, mut output_rx) = mpsc::channel(8);
    let (_stub, service) =
        client(ScriptedClient::new().with_delay(Duration::from_millis(20)));
    let pacer = RecordingPacer::new();

    let dispatcher = Dispatcher::new(
        input_rx,
        output_tx,
        Executor::new(service),
        CostModel::with_default_estimator(RateBudget::new(Duration::from_secs(2), 1_000_000)),
        template(),
        Arc::new(pacer.clone()),
    );
    let stats = dispatcher.stats_handle();

    let units = unit_set(&["one", "two", "three"]);
    for unit in units.iter() {
        input_tx
            .send(Submission::first(unit.clone(), ""))
            .await
            .unwrap();
    }
    drop(input_tx);

    let finished = dispatcher.run().await.unwrap();
    assert_eq!(finished.launched, 3);
    assert_eq!(finished.rejected, 0);
    assert_eq!(finished.paced, Duration::from_secs(6));
    assert_eq!(stats.read().launched, 3);

    let mut received = Vec::new();
    while let Some(result) = output_rx.recv().await {
        assert!(result.is_success());
        received.push(result.id().to_string());
    }
    received.sort();
    assert_eq!(
        received,
        vec!["chapter1.xhtml", "chapter2.xhtml", "chapter3.xhtml"]
    );
}

#[tokio::test]
async fn dispatcher_fails_when_results_unread() {
    let (input_tx, input_rx) = mpsc::channel(2);
    let (output_tx, output_rx) = mpsc::channel(1);
    drop(output_rx);
    let (_stub, service) = client(ScriptedClient::new());

    let dispatcher = Dispatcher::new(
        input_rx,
        output_tx,
        Executor::new(service),
        CostModel::with_default_estimator(RateBudget::new(Duration::from_secs(1), 10)),
        template(),
        Arc::new(RecordingPacer::new()),
    );

    let units = unit_set(&["this content is far beyond a ten token ceiling"]);
    input_tx
        .send(Submission::first(units.get(0).unwrap().clone(), ""))
        .await
        .unwrap();
    drop(input_tx);

    let err = dispatcher.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Dispatch(_)));
}
