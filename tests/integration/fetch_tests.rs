//! Integration tests for the HTTP fetcher
//!
//! These tests use wiremock to stand in for the remote API and check the
//! request shape, response classification and retry behavior of a single
//! fetch.

use range_harvester::config::{
    ApiConfig, BackoffConfig, Config, HarvestConfig, IdentityConfig, OutputConfig,
};
use range_harvester::harvest::{HttpFetcher, ItemFetcher, MAX_RETRIES_REASON};
use range_harvester::FetchResult;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fetcher configuration with millisecond backoffs
fn create_test_config(endpoint: &str) -> Config {
    Config {
        api: ApiConfig {
            endpoint: endpoint.to_string(),
            id_param: "id".to_string(),
            name_field: "name".to_string(),
            request_timeout_ms: 2_000,
            connect_timeout_ms: 500,
            accept_invalid_certs: false,
        },
        identity: IdentityConfig {
            user_agents: vec!["TestAgent/1.0".to_string()],
            referer: Some("https://example.com/videos".to_string()),
            origin: Some("https://example.com".to_string()),
        },
        harvest: HarvestConfig {
            jitter_min_ms: 0,
            jitter_max_ms: 1,
            ..HarvestConfig::default()
        },
        backoff: BackoffConfig {
            initial_ms: 5,
            factor: 2.0,
            transient_factor: 1.5,
            max_ms: 20,
            transient_pause_cap_ms: 5,
            max_attempts: 4,
            max_elapsed_secs: 30,
        },
        output: OutputConfig {
            dataset_path: "./videos.json".into(),
            progress_path: "./progress.json".into(),
            log_path: None,
        },
    }
}

fn fetcher_for(server: &MockServer) -> HttpFetcher {
    let endpoint = format!("{}/api", server.uri());
    HttpFetcher::from_config(&create_test_config(&endpoint)).unwrap()
}

fn success_body(name: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"isError": false, "name": name}))
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

#[tokio::test]
async fn test_request_carries_form_body_and_identity() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api"))
        .and(body_string("id=7"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(header("user-agent", "TestAgent/1.0"))
        .and(header("x-requested-with", "XMLHttpRequest"))
        .and(header("referer", "https://example.com/videos"))
        .and(header("origin", "https://example.com"))
        .respond_with(success_body("Seven"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = fetcher_for(&mock_server).fetch(7).await;

    assert_eq!(
        result,
        FetchResult::Success {
            id: 7,
            name: "Seven".to_string(),
        }
    );
}

#[tokio::test]
async fn test_http_429_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(success_body("Eventually"))
        .mount(&mock_server)
        .await;

    let result = fetcher_for(&mock_server).fetch(1).await;

    assert!(result.is_success());
    assert_eq!(request_count(&mock_server).await, 3);
}

#[tokio::test]
async fn test_rate_limit_message_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"isError": true, "message": "Rate limit reached"})),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(success_body("After throttle"))
        .mount(&mock_server)
        .await;

    let result = fetcher_for(&mock_server).fetch(2).await;

    assert_eq!(
        result,
        FetchResult::Success {
            id: 2,
            name: "After throttle".to_string(),
        }
    );
    assert_eq!(request_count(&mock_server).await, 2);
}

#[tokio::test]
async fn test_sustained_rate_limit_hits_retry_ceiling() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let result = fetcher_for(&mock_server).fetch(3).await;

    assert_eq!(
        result,
        FetchResult::Failure {
            id: 3,
            reason: MAX_RETRIES_REASON.to_string(),
        }
    );
    assert_eq!(request_count(&mock_server).await, 4);
}

#[tokio::test]
async fn test_application_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"isError": true, "message": "Video not found"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = fetcher_for(&mock_server).fetch(8).await;

    assert_eq!(
        result,
        FetchResult::Failure {
            id: 8,
            reason: "Video not found".to_string(),
        }
    );
}

#[tokio::test]
async fn test_error_status_is_terminal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = fetcher_for(&mock_server).fetch(10).await;

    assert_eq!(
        result,
        FetchResult::Failure {
            id: 10,
            reason: "HTTP 404".to_string(),
        }
    );
}

#[tokio::test]
async fn test_malformed_body_is_terminal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    match fetcher_for(&mock_server).fetch(5).await {
        FetchResult::Failure { id, reason } => {
            assert_eq!(id, 5);
            assert!(reason.starts_with("Malformed response"), "got {}", reason);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(success_body("Too slow").set_delay(Duration::from_millis(1_500)))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(success_body("On time"))
        .mount(&mock_server)
        .await;

    let endpoint = format!("{}/api", mock_server.uri());
    let mut config = create_test_config(&endpoint);
    config.api.request_timeout_ms = 200;
    let fetcher = HttpFetcher::from_config(&config).unwrap();

    let result = fetcher.fetch(6).await;

    assert_eq!(
        result,
        FetchResult::Success {
            id: 6,
            name: "On time".to_string(),
        }
    );
}

#[tokio::test]
async fn test_connection_refused_hits_retry_ceiling() {
    let fetcher = HttpFetcher::from_config(&create_test_config("http://127.0.0.1:1/api")).unwrap();

    let result = fetcher.fetch(9).await;

    assert_eq!(
        result,
        FetchResult::Failure {
            id: 9,
            reason: MAX_RETRIES_REASON.to_string(),
        }
    );
}
