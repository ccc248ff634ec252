//! Tests for the pagination module

use super::*;
use crate::auth::{ClientCredentials, TokenManager};
use crate::error::Error;
use crate::http::{RecordingSleeper, RetryingTransport, TransportConfig};
use crate::output::{read_documents, ErrorLog};
use crate::query::{comment_query, Mode, VideoQueryBuilder, COMMENT_FIELDS, VIDEO_FIELDS};
use crate::types::{JsonObject, JsonValue, ManualClock};
use chrono::TimeZone;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use test_case::test_case;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const VIDEO_PATH: &str = "/v2/research/video/query/";
const COMMENT_PATH: &str = "/v2/research/video/comment/list/";

struct Harness {
    server: MockServer,
    tokens: TokenManager,
    transport: RetryingTransport,
    sleeper: RecordingSleeper,
    dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        Self::with_transport(TransportConfig::default()).await
    }

    async fn with_transport(config: TransportConfig) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})),
            )
            .mount(&server)
            .await;

        let tokens = TokenManager::new(
            ClientCredentials::new("key", "secret"),
            format!("{}/v2/oauth/token/", server.uri()),
        );
        let sleeper = RecordingSleeper::new();
        let transport = RetryingTransport::new(config)
            .unwrap()
            .with_sleeper(Arc::new(sleeper.clone()));

        Self {
            server,
            tokens,
            transport,
            sleeper,
            dir: TempDir::new().unwrap(),
        }
    }

    fn paginator(&self) -> Paginator<'_> {
        Paginator::new(&self.tokens, &self.transport)
    }

    fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join("video_data").join(name)
    }

    fn video_request(&self, ceiling: Option<usize>) -> FetchRequest {
        FetchRequest {
            endpoint: Endpoint::new(
                format!("{}{VIDEO_PATH}", self.server.uri()),
                VIDEO_FIELDS,
                "videos",
            ),
            entity: "nasa".to_string(),
            query: VideoQueryBuilder::new(Mode::Username, ["nasa"], "20240101", "20240131")
                .result_ceiling(ceiling)
                .build()
                .unwrap(),
            output_path: self.output("nasa_20240101_20240131_videos.json"),
        }
    }

    fn comment_request(&self, video_id: &str) -> FetchRequest {
        FetchRequest {
            endpoint: Endpoint::new(
                format!("{}{COMMENT_PATH}", self.server.uri()),
                COMMENT_FIELDS,
                "comments",
            ),
            entity: video_id.to_string(),
            query: comment_query(video_id).unwrap(),
            output_path: self
                .dir
                .path()
                .join("comments_data")
                .join(format!("{video_id}_comments.json")),
        }
    }
}

fn videos(ids: std::ops::Range<u64>) -> Vec<JsonValue> {
    ids.map(|id| json!({"id": id, "username": "nasa"})).collect()
}

fn page(key: &str, items: Vec<JsonValue>, has_more: bool, cursor: u64, search_id: &str) -> JsonValue {
    let mut data = JsonObject::new();
    data.insert(key.to_string(), JsonValue::Array(items));
    data.insert("has_more".to_string(), json!(has_more));
    data.insert("cursor".to_string(), json!(cursor));
    data.insert("search_id".to_string(), json!(search_id));
    json!({"data": data, "error": {"code": "ok", "message": ""}})
}

/// Always reports more data, one item per page, moving the cursor by `step`
struct AdvancingCursor {
    key: &'static str,
    step: u64,
}

impl Respond for AdvancingCursor {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: JsonValue = serde_json::from_slice(&request.body).unwrap_or_default();
        let cursor = body["cursor"].as_u64().unwrap_or(0);
        ResponseTemplate::new(200).set_body_json(page(
            self.key,
            vec![json!({"id": cursor})],
            true,
            cursor + self.step,
            "session",
        ))
    }
}

fn sent_cursors(requests: &[Request], request_path: &str) -> Vec<u64> {
    requests
        .iter()
        .filter(|r| r.url.path() == request_path)
        .map(|r| {
            let body: JsonValue = serde_json::from_slice(&r.body).unwrap();
            body["cursor"].as_u64().unwrap()
        })
        .collect()
}

// ============================================================================
// PageQuery Tests
// ============================================================================

#[test]
fn test_page_query_advance_reports_progress() {
    let mut query = comment_query("1").unwrap();
    assert!(query.advance(100, "s1"));
    assert_eq!(query.cursor, 100);
    assert_eq!(query.search_id, "s1");

    assert!(!query.advance(100, "s1"));
    assert!(query.advance(100, "s2"));
}

#[test]
fn test_page_query_cursor_ceiling() {
    let mut query = comment_query("1").unwrap();
    assert!(!query.cursor_exhausted());
    query.advance(999, "");
    assert!(!query.cursor_exhausted());
    query.advance(1000, "");
    assert!(query.cursor_exhausted());
}

#[test]
fn test_page_query_result_ceiling() {
    let query = VideoQueryBuilder::new(Mode::Username, ["a"], "20240101", "20240102")
        .result_ceiling(Some(50))
        .build()
        .unwrap();
    assert!(!query.ceiling_reached(49));
    assert!(query.ceiling_reached(50));
    assert!(query.ceiling_reached(60));

    let unbounded = comment_query("1").unwrap();
    assert!(!unbounded.ceiling_reached(usize::MAX));
}

// ============================================================================
// Envelope Tests
// ============================================================================

#[test]
fn test_envelope_parses_page() {
    let body = page("videos", videos(0..2), true, 2, "abc").to_string();
    let envelope = Envelope::parse(200, &body, "videos").unwrap();

    assert_eq!(
        envelope,
        Envelope::Page(PageResponse {
            items: videos(0..2),
            has_more: true,
            cursor: 2,
            search_id: "abc".to_string(),
        })
    );
}

#[test]
fn test_envelope_defaults_missing_continuation_fields() {
    let envelope = Envelope::parse(200, r#"{"data":{"comments":[]}}"#, "comments").unwrap();
    assert_eq!(
        envelope,
        Envelope::Page(PageResponse {
            items: vec![],
            has_more: false,
            cursor: 0,
            search_id: String::new(),
        })
    );
}

#[test]
fn test_envelope_accepts_numeric_search_id() {
    let body = r#"{"data":{"videos":[],"has_more":true,"cursor":100,"search_id":7301234567890123456}}"#;
    match Envelope::parse(200, body, "videos").unwrap() {
        Envelope::Page(page) => assert_eq!(page.search_id, "7301234567890123456"),
        other => panic!("Expected page, got {other:?}"),
    }
}

#[test_case(r#"{"error":{"code":"invalid_params"}}"#, "data" ; "no data")]
#[test_case(r#"{"data":null}"#, "data" ; "null data")]
#[test_case(r#"{"data":{"has_more":false}}"#, "videos" ; "no result key")]
fn test_envelope_soft_stop(body: &str, key: &str) {
    assert_eq!(
        Envelope::parse(200, body, "videos").unwrap(),
        Envelope::Missing {
            key: key.to_string()
        }
    );
}

#[test_case("not json" ; "not json")]
#[test_case("[1,2,3]" ; "top level array")]
#[test_case(r#"{"data":[]}"# ; "data not an object")]
#[test_case(r#"{"data":{"videos":{}}}"# ; "result key not an array")]
#[test_case(r#"{"data":{"videos":[],"has_more":"yes"}}"# ; "has_more not a bool")]
#[test_case(r#"{"data":{"videos":[],"cursor":-1}}"# ; "negative cursor")]
#[test_case(r#"{"data":{"videos":[],"cursor":"10"}}"# ; "string cursor")]
#[test_case(r#"{"data":{"videos":[],"search_id":[]}}"# ; "search id not a string")]
fn test_envelope_hard_failure(body: &str) {
    let err = Envelope::parse(502, body, "videos").unwrap_err();
    match err {
        Error::ResponseParse { status, .. } => assert_eq!(status, 502),
        other => panic!("Expected ResponseParse, got {other:?}"),
    }
}

#[test]
fn test_api_error_extraction() {
    let body = r#"{"error":{"code":"invalid_params","message":"bad date"}}"#;
    let error = api_error(body).unwrap();
    assert_eq!(error["code"], "invalid_params");
    assert!(api_error("nope").is_none());
}

// ============================================================================
// Fetch Tests
// ============================================================================

#[tokio::test]
async fn test_fetch_follows_cursor_and_search_id() {
    let h = Harness::start().await;

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .and(query_param("fields", VIDEO_FIELDS))
        .and(header("Authorization", "Bearer tok"))
        .and(body_partial_json(json!({"cursor": 0, "search_id": ""})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            "videos",
            videos(0..2),
            true,
            2,
            "abc",
        )))
        .expect(1)
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .and(body_partial_json(json!({"cursor": 2, "search_id": "abc"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            "videos",
            videos(2..3),
            false,
            3,
            "abc",
        )))
        .expect(1)
        .mount(&h.server)
        .await;

    let outcome = h.paginator().fetch(h.video_request(None)).await.unwrap();

    assert_eq!(outcome.status, FetchStatus::Exhausted);
    assert_eq!(outcome.pages, 2);
    assert_eq!(outcome.items, videos(0..3));
    assert!(!outcome.is_aborted());

    let written = outcome.output_path.clone().unwrap();
    assert_eq!(read_documents(&written).await.unwrap(), videos(0..3));
    assert!(h.sleeper.calls().is_empty());
}

#[tokio::test]
async fn test_result_ceiling_stops_without_truncating() {
    let h = Harness::start().await;

    for (cursor, next) in [(0u64, 30u64), (30, 60)] {
        Mock::given(method("POST"))
            .and(path(VIDEO_PATH))
            .and(body_partial_json(json!({"cursor": cursor})))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                "videos",
                videos(cursor..next),
                true,
                next,
                "s",
            )))
            .expect(1)
            .mount(&h.server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .and(body_partial_json(json!({"cursor": 60})))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    let outcome = h.paginator().fetch(h.video_request(Some(50))).await.unwrap();

    assert_eq!(outcome.status, FetchStatus::CeilingReached);
    assert_eq!(outcome.pages, 2);
    assert_eq!(outcome.len(), 60);

    let written = read_documents(outcome.output_path.as_ref().unwrap())
        .await
        .unwrap();
    assert_eq!(written.len(), 60);
}

#[tokio::test]
async fn test_empty_result_writes_no_file() {
    let h = Harness::start().await;

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            "videos",
            vec![],
            false,
            0,
            "s",
        )))
        .expect(1)
        .mount(&h.server)
        .await;

    let request = h.video_request(None);
    let target = request.output_path.clone();
    let outcome = h.paginator().fetch(request).await.unwrap();

    assert!(outcome.is_empty());
    assert_eq!(outcome.pages, 1);
    assert_eq!(outcome.status, FetchStatus::Exhausted);
    assert!(outcome.output_path.is_none());
    assert!(!target.exists());
}

#[tokio::test]
async fn test_malformed_page_keeps_earlier_pages() {
    let h = Harness::start().await;
    let log = ErrorLog::new(h.dir.path().join("error_log_entities.txt"));

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .and(body_partial_json(json!({"cursor": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            "videos",
            videos(0..100),
            true,
            100,
            "s",
        )))
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .and(body_partial_json(json!({"cursor": 100})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            "videos",
            videos(100..200),
            true,
            200,
            "s",
        )))
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .and(body_partial_json(json!({"cursor": 200})))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway hiccup</html>"))
        .expect(1)
        .mount(&h.server)
        .await;

    let outcome = h
        .paginator()
        .with_error_log(&log)
        .fetch(h.video_request(None))
        .await
        .unwrap();

    match &outcome.status {
        FetchStatus::Aborted(AbortReason::ResponseParse { status, body }) => {
            assert_eq!(*status, 200);
            assert!(body.contains("gateway hiccup"));
        }
        other => panic!("Expected parse abort, got {other:?}"),
    }
    assert!(outcome.is_aborted());
    assert_eq!(outcome.pages, 2);

    let written = read_documents(outcome.output_path.as_ref().unwrap())
        .await
        .unwrap();
    assert_eq!(written, videos(0..200));
    assert_eq!(log.entries().await.unwrap(), vec!["nasa".to_string()]);
}

#[tokio::test]
async fn test_stalled_cursor_terminates() {
    let h = Harness::start().await;

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            "videos",
            videos(0..1),
            true,
            5,
            "same",
        )))
        .expect(2)
        .mount(&h.server)
        .await;

    let outcome = h.paginator().fetch(h.video_request(None)).await.unwrap();

    assert_eq!(outcome.status, FetchStatus::Stalled);
    assert_eq!(outcome.pages, 2);
    assert_eq!(outcome.len(), 2);
}

#[tokio::test]
async fn test_round_limit_terminates_endless_pagination() {
    let h = Harness::start().await;

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .respond_with(AdvancingCursor {
            key: "videos",
            step: 1,
        })
        .expect(5)
        .mount(&h.server)
        .await;

    let outcome = h
        .paginator()
        .with_config(PaginatorConfig { max_rounds: 5 })
        .fetch(h.video_request(None))
        .await
        .unwrap();

    assert_eq!(outcome.status, FetchStatus::RoundLimit);
    assert_eq!(outcome.pages, 5);
    assert!(outcome.output_path.is_some());
}

#[tokio::test]
async fn test_comments_never_request_cursor_past_ceiling() {
    let h = Harness::start().await;

    Mock::given(method("POST"))
        .and(path(COMMENT_PATH))
        .and(query_param("fields", COMMENT_FIELDS))
        .and(body_partial_json(json!({"video_id": "7300"})))
        .respond_with(AdvancingCursor {
            key: "comments",
            step: 100,
        })
        .expect(10)
        .mount(&h.server)
        .await;

    let outcome = h.paginator().fetch(h.comment_request("7300")).await.unwrap();

    assert_eq!(outcome.status, FetchStatus::CursorLimit);
    assert_eq!(outcome.pages, 10);

    let cursors = sent_cursors(&h.server.received_requests().await.unwrap(), COMMENT_PATH);
    assert_eq!(cursors, (0..10).map(|i| i * 100).collect::<Vec<u64>>());
    assert!(cursors.iter().all(|c| *c < 1000));
}

#[tokio::test]
async fn test_transport_exhaustion_keeps_earlier_pages() {
    let config = TransportConfig::builder().max_attempts(3).build();
    let h = Harness::with_transport(config).await;

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .and(body_partial_json(json!({"cursor": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            "videos",
            videos(0..3),
            true,
            3,
            "s",
        )))
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .and(body_partial_json(json!({"cursor": 3})))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&h.server)
        .await;

    let outcome = h.paginator().fetch(h.video_request(None)).await.unwrap();

    match &outcome.status {
        FetchStatus::Aborted(AbortReason::TransportExhausted { attempts, message }) => {
            assert_eq!(*attempts, 3);
            assert!(message.contains("503"));
        }
        other => panic!("Expected transport abort, got {other:?}"),
    }
    assert_eq!(
        read_documents(outcome.output_path.as_ref().unwrap())
            .await
            .unwrap(),
        videos(0..3)
    );
    assert_eq!(
        h.sleeper.calls(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn test_soft_stop_after_first_page() {
    let h = Harness::start().await;

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .and(body_partial_json(json!({"cursor": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            "videos",
            videos(0..4),
            true,
            4,
            "s",
        )))
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .and(body_partial_json(json!({"cursor": 4})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": "internal_error", "message": "Something went wrong"}
        })))
        .mount(&h.server)
        .await;

    let log = ErrorLog::new(h.dir.path().join("errors.txt"));
    let outcome = h
        .paginator()
        .with_error_log(&log)
        .fetch(h.video_request(None))
        .await
        .unwrap();

    assert_eq!(outcome.status, FetchStatus::SoftStop);
    assert_eq!(outcome.len(), 4);
    assert!(outcome.output_path.is_some());
    assert!(log.entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_soft_stop_on_first_page_writes_nothing() {
    let h = Harness::start().await;

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .mount(&h.server)
        .await;

    let outcome = h.paginator().fetch(h.video_request(None)).await.unwrap();
    assert_eq!(outcome.status, FetchStatus::SoftStop);
    assert_eq!(outcome.pages, 0);
    assert!(outcome.output_path.is_none());
}

#[tokio::test]
async fn test_rerun_overwrites_previous_document() {
    let h = Harness::start().await;

    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            "videos",
            videos(0..2),
            false,
            2,
            "s",
        )))
        .mount(&h.server)
        .await;

    let request = h.video_request(None);
    std::fs::create_dir_all(request.output_path.parent().unwrap()).unwrap();
    std::fs::write(&request.output_path, r#"[{"id": 999}, {"id": 998}, {"id": 997}]"#).unwrap();

    let first = h.paginator().fetch(request.clone()).await.unwrap();
    let second = h.paginator().fetch(request.clone()).await.unwrap();

    assert_eq!(first.output_path, second.output_path);
    assert_eq!(
        read_documents(&request.output_path).await.unwrap(),
        videos(0..2)
    );
}

#[tokio::test]
async fn test_auth_failure_is_returned_before_any_page_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/oauth/token/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let tokens = TokenManager::new(
        ClientCredentials::new("key", "secret"),
        format!("{}/v2/oauth/token/", server.uri()),
    );
    let transport = RetryingTransport::new(TransportConfig::default()).unwrap();
    let dir = TempDir::new().unwrap();

    let request = FetchRequest {
        endpoint: Endpoint::new(format!("{}{VIDEO_PATH}", server.uri()), VIDEO_FIELDS, "videos"),
        entity: "nasa".to_string(),
        query: VideoQueryBuilder::new(Mode::Username, ["nasa"], "20240101", "20240131")
            .build()
            .unwrap(),
        output_path: dir.path().join("out.json"),
    };

    let err = Paginator::new(&tokens, &transport)
        .fetch(request)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth { .. }));
}

/// Serves one page with more to come and expires the token while doing so
struct PageThenExpire {
    clock: Arc<ManualClock>,
}

impl Respond for PageThenExpire {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.clock.advance(chrono::Duration::hours(2));
        ResponseTemplate::new(200).set_body_json(page("videos", videos(0..30), true, 30, "s"))
    }
}

#[tokio::test]
async fn test_refresh_failure_mid_fetch_keeps_earlier_pages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/oauth/token/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/oauth/token/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new(
        chrono::Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
    ));
    Mock::given(method("POST"))
        .and(path(VIDEO_PATH))
        .respond_with(PageThenExpire {
            clock: clock.clone(),
        })
        .expect(1)
        .mount(&server)
        .await;

    let tokens = TokenManager::new(
        ClientCredentials::new("key", "secret"),
        format!("{}/v2/oauth/token/", server.uri()),
    )
    .with_clock(clock);
    let transport = RetryingTransport::new(TransportConfig::default()).unwrap();
    let dir = TempDir::new().unwrap();
    let output_path = dir.path().join("video_data").join("nasa_videos.json");

    let request = FetchRequest {
        endpoint: Endpoint::new(format!("{}{VIDEO_PATH}", server.uri()), VIDEO_FIELDS, "videos"),
        entity: "nasa".to_string(),
        query: VideoQueryBuilder::new(Mode::Username, ["nasa"], "20240101", "20240131")
            .build()
            .unwrap(),
        output_path: output_path.clone(),
    };

    let outcome = Paginator::new(&tokens, &transport)
        .fetch(request)
        .await
        .unwrap();

    match &outcome.status {
        FetchStatus::Aborted(AbortReason::Auth { message }) => {
            assert!(message.contains("500"));
        }
        other => panic!("Expected auth abort, got {other:?}"),
    }
    assert!(outcome.status.is_auth_failure());
    assert_eq!(outcome.pages, 1);
    assert_eq!(outcome.output_path.as_deref(), Some(output_path.as_path()));
    assert_eq!(read_documents(&output_path).await.unwrap(), videos(0..30));
}
