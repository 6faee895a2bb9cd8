//! Failure paths: every run that cannot finish ends FAILED with a user-facing error,
//! an `analysis-failed` event and no snapshot left behind

mod support;

use repoaudit::llm::{BackendError, MockLLMClient, MockResponse};
use repoaudit::pipeline::{AnalysisRequest, DocType, JobStatus, PipelineError};
use repoaudit::source::SourceError;
use repoaudit::store::Store;
use std::sync::Arc;
use support::{happy_client, happy_response, stage_of, widget_service, FakeSource, Harness, REPO_ID};

fn request(id: &str, files: &[&str]) -> AnalysisRequest {
    AnalysisRequest::new(id, support::OWNER_ID, files.iter().map(|f| f.to_string()).collect())
}

async fn assert_failed(harness: &Harness, id: &str) -> String {
    let job = harness.store.get_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.logs.iter().any(|l| l.contains("Analysis failed")));

    let (_, event, payload) = harness.channel.events().last().cloned().unwrap();
    assert_eq!(event, "analysis-failed");
    assert_eq!(payload["status"], "FAILED");
    assert_eq!(payload["analysisId"], id);

    assert_eq!(harness.leftover_snapshots(), 0);
    job.error.unwrap()
}

#[tokio::test]
async fn test_escaping_paths_fail_with_no_valid_files() {
    let harness = Harness::new(widget_service(), happy_client());
    harness.seed("a-1").await;

    let req = request("a-1", &["../../etc/passwd", "/etc/hosts", "src/../../outside.rs"]);
    let err = harness.orchestrator().run(&req).await.unwrap_err();

    assert!(matches!(err, PipelineError::NoValidFiles { requested: 3 }));
    let error = assert_failed(&harness, "a-1").await;
    assert!(error.contains("None of the 3 selected files"));
}

#[tokio::test]
async fn test_only_binary_files_fail_with_no_valid_files() {
    let source = FakeSource::new().with_file("logo.png", vec![0x89, b'P', b'N', b'G', 0x00, 0x00]);
    let harness = Harness::new(source, happy_client());
    harness.seed("a-1").await;

    let err = harness
        .orchestrator()
        .run(&request("a-1", &["logo.png", "missing.rs"]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::NoValidFiles { requested: 2 }));
    assert_failed(&harness, "a-1").await;
}

#[tokio::test]
async fn test_empty_selection_is_rejected() {
    let client = happy_client();
    let harness = Harness::new(widget_service(), client.clone());
    harness.seed("a-1").await;

    let err = harness.orchestrator().run(&request("a-1", &[])).await.unwrap_err();

    assert!(matches!(err, PipelineError::InvalidInput(_)));
    assert!(!err.is_retryable());
    assert_eq!(harness.source.clones(), 0);
    assert_eq!(client.call_count(), 0);
    assert_failed(&harness, "a-1").await;
}

#[tokio::test]
async fn test_missing_repository_reports_source_error() {
    let source = widget_service().with_clone_error(SourceError::NotFound("acme/widgets@main".into()));
    let harness = Harness::new(source, happy_client());
    harness.seed("a-1").await;

    let err = harness
        .orchestrator()
        .run(&request("a-1", &["src/lib.rs"]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Source(SourceError::NotFound(_))));
    let error = assert_failed(&harness, "a-1").await;
    assert!(error.contains("not found"));
}

#[tokio::test]
async fn test_expired_token_has_its_own_message() {
    let source = widget_service();
    source.fail_resolve_once(SourceError::Unauthorized("bad credentials".into()));
    let harness = Harness::new(source, happy_client());
    harness.seed("a-1").await;

    harness
        .orchestrator()
        .run(&request("a-1", &["src/lib.rs"]))
        .await
        .unwrap_err();

    let error = assert_failed(&harness, "a-1").await;
    assert!(error.contains("token may have expired"));
}

#[tokio::test]
async fn test_exhausted_analysis_chain_fails_the_job() {
    let client = Arc::new(MockLLMClient::with_responder("scripted", |request| {
        if stage_of(request) == "analyze" {
            MockResponse::text("{ \"executiveSummary\": \"\" }")
        } else {
            happy_response(request)
        }
    }));
    let harness = Harness::new(widget_service(), client);
    harness.seed("a-1").await;

    let req = request("a-1", &["src/lib.rs"]).with_doc_types(vec![DocType::Readme]);
    let err = harness.orchestrator().run(&req).await.unwrap_err();

    match err {
        PipelineError::ModelExhausted(ref e) => {
            assert_eq!(e.stage, "analyze");
            assert!(!e.attempts.is_empty());
        }
        ref other => panic!("Expected ModelExhausted, got {:?}", other),
    }
    let error = assert_failed(&harness, "a-1").await;
    assert!(error.contains("analyze stage failed"));
    assert!(harness.store.documents(REPO_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mapper_outage_fails_before_analysis() {
    let client = Arc::new(MockLLMClient::with_responder("scripted", |request| {
        if stage_of(request) == "map" {
            MockResponse::error(BackendError::AuthenticationError {
                message: "invalid api key".into(),
            })
        } else {
            happy_response(request)
        }
    }));
    let harness = Harness::new(widget_service(), client.clone());
    harness.seed("a-1").await;

    let err = harness
        .orchestrator()
        .run(&request("a-1", &["src/lib.rs"]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ModelExhausted(_)));
    assert!(client.requests().iter().all(|r| stage_of(r) != "analyze"));

    let job = harness.store.get_job("a-1").await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.progress < 55);
}

#[tokio::test]
async fn test_completed_job_is_not_rerun() {
    let client = happy_client();
    let harness = Harness::new(widget_service(), client.clone());
    harness.seed("a-1").await;

    let req = request("a-1", &["src/lib.rs"]);
    harness.orchestrator().run(&req).await.unwrap();
    let calls = client.call_count();

    let err = harness.orchestrator().run(&req).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
    assert_eq!(client.call_count(), calls);

    let job = harness.store.get_job("a-1").await.unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.progress, 100);
}
