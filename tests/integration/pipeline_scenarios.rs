//! End-to-end scheduling scenarios against a scripted service.

use std::sync::Arc;

use folio::context::CONTEXT_HEADER;
use folio::document::{MemorySink, UnitSink};
use folio::error::PipelineError;
use folio::pacer::RecordingPacer;
use folio::report::{CollectingReporter, ProgressEvent};
use folio::scheduler::RetryPolicy;
use folio::{Pipeline, PipelineOptions, SourceEntry, UnitSet};

use super::support::{budget, client, content_of, template, unit_set, ScriptedClient};

fn pipeline(
    service: Arc<dyn folio::provider::GenerationClient>,
    sink: Arc<dyn UnitSink>,
    options: PipelineOptions,
) -> Pipeline {
    Pipeline::new(options, service, sink).with_pacer(Arc::new(RecordingPacer::new()))
}

#[tokio::test]
async fn three_units_one_transient_failure() {
    let (stub, service) = client(ScriptedClient::new().failing("two", 1));
    let sink = Arc::new(MemorySink::new());
    let options = PipelineOptions::new(budget(), template()).with_retry(RetryPolicy::immediate(5));

    let summary = pipeline(service, sink.clone(), options)
        .run(&unit_set(&["one", "two", "three"]))
        .await
        .unwrap();

    assert_eq!(stub.call_count(), 4);
    assert_eq!(summary.dispatch_attempts, 4);
    assert_eq!(summary.succeeded.len(), 3);
    assert!(summary.is_complete());
    assert_eq!(sink.get("chapter2.xhtml").as_deref(), Some("done:two:2"));
    assert_eq!(sink.get("chapter1.xhtml").as_deref(), Some("done:one:1"));
    assert_eq!(summary.attempts.get("chapter2.xhtml"), Some(&2));
}

#[tokio::test]
async fn oversized_unit_is_never_sent() {
    let huge = "x".repeat(4_800_000);
    let (stub, service) = client(ScriptedClient::new());
    let sink = Arc::new(MemorySink::new());
    let reporter = Arc::new(CollectingReporter::new());
    let options = PipelineOptions::new(budget(), template()).with_retry(RetryPolicy::immediate(3));

    let summary = pipeline(service, sink.clone(), options)
        .with_reporter(reporter.clone())
        .run(&unit_set(&["small", huge.as_str()]))
        .await
        .unwrap();

    assert_eq!(stub.calls_for(&huge), 0);
    assert_eq!(stub.call_count(), 1);
    assert_eq!(summary.dispatch_attempts, 4);
    assert_eq!(summary.succeeded, vec!["chapter1.xhtml".to_string()]);
    assert!(sink.get("chapter2.xhtml").is_none());

    let (id, err) = &summary.failed[0];
    assert_eq!(id, "chapter2.xhtml");
    assert!(matches!(err, PipelineError::RetriesExhausted { attempts: 3, .. }));

    let first_failure = reporter
        .events()
        .into_iter()
        .find(|e| matches!(e, ProgressEvent::Failed { .. }))
        .unwrap();
    match first_failure {
        ProgressEvent::Failed { id, attempt, error } => {
            assert_eq!(id, "chapter2.xhtml");
            assert_eq!(attempt, 1);
            assert!(error.contains("exceeds token ceiling"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    assert!(matches!(
        summary.ensure_complete(),
        Err(PipelineError::Incomplete(ids)) if ids == vec!["chapter2.xhtml".to_string()]
    ));
}

#[tokio::test]
async fn context_window_at_first_unit() {
    let (stub, service) = client(ScriptedClient::new());
    let sink = Arc::new(MemorySink::new());
    let options = PipelineOptions::new(budget(), template()).with_context(2, 1);

    pipeline(service, sink, options)
        .run(&unit_set(&["u0", "u1", "u2", "u3", "u4"]))
        .await
        .unwrap();

    let request = stub
        .calls()
        .into_iter()
        .find(|r| content_of(r) == "u0")
        .unwrap();
    assert_eq!(
        request.text,
        format!(
            "PROMPT\nu0\n{}\nChapters Before:\n\nChapters After:\nu1\n",
            CONTEXT_HEADER
        )
    );
    assert_eq!(&*request.instruction, "INSTRUCTION");
}

#[tokio::test]
async fn every_unit_eventually_succeeds() {
    let contents: Vec<String> = (0..12).map(|i| format!("unit-{}", i)).collect();
    let refs: Vec<&str> = contents.iter().map(String::as_str).collect();

    let mut scripted = ScriptedClient::new();
    for (i, content) in contents.iter().enumerate() {
        scripted = scripted.failing(content, (i % 4) as u32);
    }
    let (stub, service) = client(scripted);
    let sink = Arc::new(MemorySink::new());
    let options = PipelineOptions::new(budget(), template())
        .with_context(1, 1)
        .with_retry(RetryPolicy::immediate(4));

    let summary = pipeline(service, sink.clone(), options)
        .run(&unit_set(&refs))
        .await
        .unwrap();

    assert_eq!(summary.succeeded.len(), 12);
    assert!(summary.failed.is_empty());
    // 3 units each at 0, 1, 2 and 3 failures
    assert_eq!(stub.call_count(), 12 + 3 * (1 + 2 + 3));
    for (i, content) in contents.iter().enumerate() {
        let id = format!("chapter{}.xhtml", i + 1);
        let expected = format!("done:{}:{}", content, i % 4 + 1);
        assert_eq!(sink.get(&id), Some(expected));
    }
}

#[tokio::test]
async fn processed_units_are_context_only() {
    let units = UnitSet::from_entries(vec![
        SourceEntry::processed("chapter1.xhtml", "translated one"),
        SourceEntry::new("chapter2.xhtml", "two"),
    ])
    .unwrap();
    let (stub, service) = client(ScriptedClient::new());
    let sink = Arc::new(MemorySink::new());
    let options = PipelineOptions::new(budget(), template()).with_context(1, 0);

    let summary = pipeline(service, sink.clone(), options)
        .run(&units)
        .await
        .unwrap();

    assert_eq!(summary.skipped, vec!["chapter1.xhtml".to_string()]);
    assert_eq!(stub.call_count(), 1);
    assert!(stub.calls()[0].text.contains("translated one"));
    assert_eq!(sink.written().len(), 1);
}

#[tokio::test]
async fn nothing_pending_is_a_complete_run() {
    let units = UnitSet::from_entries(vec![SourceEntry::processed("chapter1.xhtml", "done")])
        .unwrap();
    let (stub, service) = client(ScriptedClient::new());
    let summary = pipeline(
        service,
        Arc::new(MemorySink::new()),
        PipelineOptions::new(budget(), template()),
    )
    .run(&units)
    .await
    .unwrap();

    assert_eq!(stub.call_count(), 0);
    assert_eq!(summary.total, 1);
    assert!(summary.ensure_complete().is_ok());
}

struct BrokenSink;

impl UnitSink for BrokenSink {
    fn persist(&self, id: &str, _text: &str) -> Result<(), PipelineError> {
        Err(PipelineError::Persistence {
            id: id.to_string(),
            message: "read-only filesystem".to_string(),
        })
    }
}

#[tokio::test]
async fn persistence_failure_aborts_run() {
    let (_stub, service) = client(ScriptedClient::new());
    let err = pipeline(
        service,
        Arc::new(BrokenSink),
        PipelineOptions::new(budget(), template()),
    )
    .run(&unit_set(&["one", "two"]))
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::Persistence { .. }));
}

#[tokio::test]
async fn concurrent_results_all_persisted() {
    let (stub, service) = client(
        ScriptedClient::new().with_delay(std::time::Duration::from_millis(5)),
    );
    let sink = Arc::new(MemorySink::new());
    let summary = Pipeline::new(
        PipelineOptions::new(budget(), template()),
        service,
        sink.clone(),
    )
    .with_pacer(Arc::new(RecordingPacer::new()))
    .run(&unit_set(&["a", "b", "c", "d"]))
    .await
    .unwrap();

    assert_eq!(stub.call_count(), 4);
    let mut done = summary.succeeded.clone();
    done.sort();
    assert_eq!(
        done,
        vec![
            "chapter1.xhtml",
            "chapter2.xhtml",
            "chapter3.xhtml",
            "chapter4.xhtml"
        ]
    );
}
