use std::sync::{Arc, Mutex};
use std::time::Duration;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use cyex_upload::modules::layouts::{LayoutConfig, LayoutSelectorList};
use cyex_upload::modules::session::{Session, SessionId};
use cyex_upload::modules::types::Form;
use cyex_upload::modules::upload::{SubmissionState, UploadAssembler, UPLOAD_FAILED};
use cyex_upload::modules::uploader::{HttpUploader, Uploader};
use tokio::runtime::Runtime;
use url::Url;

#[derive(Clone, Default)]
struct Captured {
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

async fn accept_upload(State(captured): State<Captured>, headers: HeaderMap, body: String) -> String {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    captured.requests.lock().unwrap().push((content_type, body));
    "<a style=\"color:green;\">SUCCESS: Network saved as project demo</a>".to_string()
}

async fn reject_upload() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn status() -> &'static str {
    "CyEx is installed and running..."
}

fn serve(router: Router) -> (Runtime, Url) {
    let rt = Runtime::new().unwrap();
    let listener = rt
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();
    rt.spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (rt, Url::parse(&format!("http://{addr}")).unwrap())
}

fn session() -> Session {
    Session::with_uid(SessionId::from("0123456789"), Some("job123".to_string()))
}

#[test]
fn upload_posts_multipart_and_returns_body_verbatim() {
    let captured = Captured::default();
    let router = Router::new()
        .route("/CyEx/vrnetz_upload", post(accept_upload))
        .route("/CyEx/status", get(status))
        .with_state(captured.clone());
    let (_rt, base) = serve(router);

    let uploader = HttpUploader::new(&base, Duration::from_secs(10)).unwrap();
    assert_eq!(uploader.status().unwrap(), "CyEx is installed and running...");

    let mut layouts = LayoutSelectorList::new();
    layouts.push(Some(LayoutConfig::new("first", "spring")));
    layouts.push(None);
    layouts.push(Some(LayoutConfig::new("third", "kamada_kawai")));

    let form = Form::new()
        .text("CyEx_project_name", "demo")
        .text("overwrite", "on")
        .file("cyEx_vrnetz", "net.VRNetz", b"{\"nodes\":[]}".to_vec());
    let mut assembler = UploadAssembler::new(uploader, session());
    let message = assembler
        .on_submit(&form, layouts.selectors(), true)
        .unwrap()
        .to_string();

    assert_eq!(message, "<a style=\"color:green;\">SUCCESS: Network saved as project demo</a>");
    assert_eq!(assembler.state(), SubmissionState::Succeeded);

    let requests = captured.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (content_type, body) = &requests[0];
    assert!(content_type.starts_with("multipart/form-data"));
    assert!(body.contains("name=\"CyEx_project_name\""));
    assert!(body.contains("filename=\"net.VRNetz\""));
    assert!(body.contains("name=\"job\""));
    assert!(body.contains("job123"));
    assert!(body.contains("name=\"layout_1_name\""));
    assert!(body.contains("name=\"layout_2_algo\""));
    assert!(body.contains("kamada_kawai"));
    assert!(!body.contains("name=\"layout_3_"));
    assert_eq!(body.matches("name=\"overwrite\"").count(), 1);
    assert!(body.contains("name=\"overwrite\"\r\n\r\ntrue\r\n"));
}

#[test]
fn server_error_renders_fixed_failure_message() {
    let router = Router::new().route("/CyEx/vrnetz_upload", post(reject_upload));
    let (_rt, base) = serve(router);

    let uploader = HttpUploader::new(&base, Duration::from_secs(10)).unwrap();
    let mut assembler = UploadAssembler::new(uploader, session());
    let message = assembler
        .on_submit(&Form::new(), LayoutSelectorList::new().selectors(), false)
        .unwrap()
        .to_string();

    assert_eq!(message, UPLOAD_FAILED);
    assert_eq!(assembler.state(), SubmissionState::Failed);
}

#[test]
fn unreachable_server_is_a_transport_error() {
    let base = Url::parse("http://127.0.0.1:1").unwrap();
    let uploader = HttpUploader::new(&base, Duration::from_secs(2)).unwrap();
    let payload = cyex_upload::modules::upload::assemble_payload(
        &Form::new(),
        &session(),
        LayoutSelectorList::new().selectors(),
        false,
    );
    assert!(uploader.upload(&payload).is_err());
}
