//! End-to-end sync scenarios against stub endpoints and an in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sheetlens_core::llm::GenerationRequest;
use sheetlens_core::{
    Config, Database, Error, ModelBackend, Result, SessionStore, SheetFetcher, SyncController,
    SyncOutcome, SyncPhase,
};
use tokio_util::sync::CancellationToken;

const ANALYSIS: &str = r#"{"summary":"Positive demo","insights":["wants pilot"],"metrics":{"conversionProbability":80,"customerSentiment":90,"dealSizeEstimate":12000,"churnRisk":5}}"#;
const META: &str = r#"{"topFeatures":[{"title":"Pilot","description":"Customers ask for pilots","impactScore":70}],"executiveNarrative":"Demand is strong"}"#;

struct FixedSheet(String);

#[async_trait]
impl SheetFetcher for FixedSheet {
    async fn fetch(&self, _source_id: &str, _sheet_name: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Records every prompt it receives
#[derive(Default)]
struct RecordingBackend {
    analyses: AtomicUsize,
    syntheses: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ModelBackend for RecordingBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if request.prompt.starts_with("Analyze this") {
            self.analyses.fetch_add(1, Ordering::SeqCst);
            Ok(ANALYSIS.to_string())
        } else {
            self.syntheses.fetch_add(1, Ordering::SeqCst);
            Ok(META.to_string())
        }
    }
}

struct Harness {
    controller: SyncController,
    backend: Arc<RecordingBackend>,
    store: Arc<Database>,
}

fn harness(body: &str) -> Harness {
    sheetlens_core::logging::init_test();
    let store = Database::open_in_memory().unwrap();
    store.migrate().unwrap();
    let store = Arc::new(store);
    let backend = Arc::new(RecordingBackend::default());
    let mut controller = SyncController::new(
        &Config::default(),
        Arc::new(FixedSheet(body.to_string())),
        backend.clone(),
        store.clone(),
    )
    .unwrap();
    controller.connect("1AbCdEf", None).unwrap();
    Harness {
        controller,
        backend,
        store,
    }
}

#[tokio::test]
async fn great_demo_envelope_yields_one_attempt() {
    let body = r#"google.visualization.Query.setResponse({"table":{"cols":[{"label":"Transcript"},{"label":"Type"}],"rows":[{"c":[{"v":"Great demo"},{"v":"Sales Call"}]}]}});"#;
    let mut h = harness(body);

    let report = h.controller.sync(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert_eq!(report.rows, 1);
    assert_eq!(report.attempted, 1);
    assert_eq!(h.backend.analyses.load(Ordering::SeqCst), 1);

    let prompts = h.backend.prompts.lock().unwrap().clone();
    assert!(prompts[0].starts_with("Analyze this Sales Call record"));
    assert!(prompts[0].ends_with("Great demo"));

    let reports = h.store.load_reports().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].category.as_str(), "Sales Call");
    assert_eq!(reports[0].raw_text, "Great demo");
    assert_eq!(reports[0].metrics.deal_size_estimate, Some(12000.0));
}

#[tokio::test]
async fn header_only_table_fails_in_parsing() {
    let body = r#"/*O_o*/
google.visualization.Query.setResponse({"version":"0.6","status":"ok","table":{"cols":[{"id":"A","label":"Transcript","type":"string"}],"rows":[]}});"#;
    let mut h = harness(body);

    let err = h.controller.sync(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, Error::EmptyResult));
    assert!(err.remediation().is_some());
    assert_eq!(h.controller.phase(), SyncPhase::Failed);
    assert_eq!(h.backend.prompts.lock().unwrap().len(), 0);
    assert!(h.store.load_sync_config().unwrap().last_sync_time.is_none());
}

#[tokio::test]
async fn empty_transcripts_are_never_sent() {
    let body = r#"/*O_o*/
google.visualization.Query.setResponse({"version":"0.6","status":"ok","table":{"cols":[{"id":"A","label":"Date","type":"string"},{"id":"B","label":"Transcript","type":"string"}],"rows":[{"c":[{"v":"Mon"},{"v":"first call"}]},{"c":[{"v":"Tue"},{"v":""}]},{"c":[{"v":"Wed"},{"v":"third call"}]},{"c":[{"v":"Thu"},null]},{"c":[{"v":"Fri"},{"v":"fifth call"}]}]}});"#;
    let mut h = harness(body);

    let report = h.controller.sync(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.rows, 5);
    assert_eq!(report.attempted, 3);
    assert_eq!(report.skipped, 2);
    assert_eq!(h.backend.analyses.load(Ordering::SeqCst), 3);

    let mut labels: Vec<String> = h
        .controller
        .reports()
        .iter()
        .map(|r| r.label.clone())
        .collect();
    labels.sort();
    assert_eq!(labels, vec!["Fri", "Mon", "Wed"]);
}

#[tokio::test]
async fn remote_error_names_the_sheet_problem() {
    let body = r#"/*O_o*/
google.visualization.Query.setResponse({"version":"0.6","status":"error","errors":[{"reason":"invalid_query","message":"INVALID_QUERY","detailed_message":"Invalid sheet name: Calls"}]});"#;
    let mut h = harness(body);

    let err = h.controller.sync(&CancellationToken::new()).await.unwrap_err();

    match &err {
        Error::RemoteError { message, kind } => {
            assert!(message.contains("Invalid sheet name"));
            assert_eq!(*kind, sheetlens_core::RemoteErrorKind::SheetNotFound);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.remediation().unwrap().contains("sheet name"));
}

#[tokio::test]
async fn prompt_edit_reruns_meta_over_stored_reports() {
    let body = r#"google.visualization.Query.setResponse({"table":{"cols":[{"label":"Transcript"}],"rows":[{"c":[{"v":"Great demo"}]}]}});"#;
    let mut h = harness(body);
    h.controller.sync(&CancellationToken::new()).await.unwrap();
    assert_eq!(h.backend.syntheses.load(Ordering::SeqCst), 1);

    let meta = h
        .controller
        .set_analysis_prompt("Which features drive conversion?")
        .await
        .unwrap();

    assert_eq!(meta.executive_narrative, "Demand is strong");
    assert_eq!(h.backend.syntheses.load(Ordering::SeqCst), 2);
    let prompts = h.backend.prompts.lock().unwrap().clone();
    let last = prompts.last().unwrap();
    assert!(last.starts_with("Which features drive conversion?"));
    assert!(last.contains("Summary: Positive demo"));

    // Setting the same prompt again is a cache hit
    h.controller
        .set_analysis_prompt("Which features drive conversion?")
        .await
        .unwrap();
    assert_eq!(h.backend.syntheses.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn column_summary_uses_live_sheet() {
    let body = r#"google.visualization.Query.setResponse({"table":{"cols":[{"label":"Customer"},{"label":"Notes"}],"rows":[{"c":[{"v":"Acme"},{"v":"needs SSO"}]}]}});"#;
    let store = Database::open_in_memory().unwrap();
    store.migrate().unwrap();
    let backend = Arc::new(ColumnBackend::default());
    let mut controller = SyncController::new(
        &Config::default(),
        Arc::new(FixedSheet(body.to_string())),
        backend.clone(),
        Arc::new(store),
    )
    .unwrap();
    controller.connect("1AbCdEf", Some("Feedback")).unwrap();

    let summary = controller.column_summary(&[1]).await.unwrap();

    assert_eq!(summary.key_themes, vec!["identity"]);
    let prompt = backend.prompt.lock().unwrap().clone();
    assert!(prompt.contains("Row 1:\nNotes: needs SSO"));
    assert!(!prompt.contains("Acme"));
}

#[derive(Default)]
struct ColumnBackend {
    prompt: Mutex<String>,
}

#[async_trait]
impl ModelBackend for ColumnBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        *self.prompt.lock().unwrap() = request.prompt.clone();
        Ok(r#"{"keyThemes":["identity"],"summary":"SSO demand","insights":["prioritize SSO"]}"#.to_string())
    }
}
