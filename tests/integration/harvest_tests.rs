//! Integration tests for the harvest pipeline
//!
//! These tests run whole harvests, either against a wiremock API or with a
//! scripted fetcher, and check what ends up in the checkpoint files.

use async_trait::async_trait;
use range_harvester::config::{
    ApiConfig, BackoffConfig, Config, HarvestConfig, IdentityConfig, OutputConfig,
};
use range_harvester::harvest::ItemFetcher;
use range_harvester::state::Dataset;
use range_harvester::storage::{CheckpointStore, DocumentStatus, JsonCheckpointStore};
use range_harvester::{FetchResult, Harvester};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration over `[1, total_ids]` with millisecond timings
fn create_test_config(endpoint: &str, dir: &Path, total_ids: u32) -> Config {
    Config {
        api: ApiConfig {
            endpoint: endpoint.to_string(),
            id_param: "id".to_string(),
            name_field: "name".to_string(),
            request_timeout_ms: 2_000,
            connect_timeout_ms: 1_000,
            accept_invalid_certs: false,
        },
        identity: IdentityConfig::default(),
        harvest: HarvestConfig {
            first_id: 1,
            total_ids,
            max_concurrent_requests: 2,
            save_every: 2,
            min_delay_ms: 0,
            max_delay_ms: 2,
            jitter_min_ms: 0,
            jitter_max_ms: 2,
            worker_recovery_ms: 5,
            shuffle: true,
            cooldown_threshold_secs: 0,
            cooldown_min_ms: 0,
            cooldown_max_ms: 0,
        },
        backoff: BackoffConfig {
            initial_ms: 5,
            factor: 2.0,
            transient_factor: 1.5,
            max_ms: 20,
            transient_pause_cap_ms: 5,
            max_attempts: 5,
            max_elapsed_secs: 30,
        },
        output: OutputConfig {
            dataset_path: dir.join("videos.json"),
            progress_path: dir.join("progress.json"),
            log_path: None,
        },
    }
}

fn read_json_map(path: &Path) -> BTreeMap<u32, String> {
    let content = std::fs::read_to_string(path).expect("Failed to read output file");
    serde_json::from_str(&content).expect("Output file is not a JSON map")
}

/// Mounts the ten-id scenario: odd ids succeed, 4 is throttled once then
/// succeeds, 8 is an application error, 2, 6 and 10 are missing
async fn mount_scenario(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api"))
        .and(body_string("id=4"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(server)
        .await;

    for id in 1..=10u32 {
        let response = match id {
            8 => ResponseTemplate::new(200)
                .set_body_json(json!({"isError": true, "message": "Video not found"})),
            2 | 6 | 10 => ResponseTemplate::new(404),
            _ => ResponseTemplate::new(200)
                .set_body_json(json!({"isError": false, "name": format!("video-{}", id)})),
        };

        Mock::given(method("POST"))
            .and(path("/api"))
            .and(body_string(format!("id={}", id)))
            .respond_with(response)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_ten_id_scenario() {
    let mock_server = MockServer::start().await;
    mount_scenario(&mock_server).await;

    let dir = TempDir::new().unwrap();
    let endpoint = format!("{}/api", mock_server.uri());
    let config = create_test_config(&endpoint, dir.path(), 10);

    let report = Harvester::new(config).unwrap().run().await.unwrap();

    assert!(!report.interrupted);
    assert_eq!(report.succeeded, 6);
    assert_eq!(report.failed, 4);
    assert_eq!(report.processed, 10);

    let dataset = read_json_map(&dir.path().join("videos.json"));
    assert_eq!(
        dataset.keys().copied().collect::<Vec<_>>(),
        vec![1, 3, 4, 5, 7, 9]
    );
    assert_eq!(dataset.get(&4).map(String::as_str), Some("video-4"));

    let failed = read_json_map(&dir.path().join("videos_failed.json"));
    let expected: BTreeMap<u32, String> = [
        (2, "HTTP 404"),
        (6, "HTTP 404"),
        (8, "Video not found"),
        (10, "HTTP 404"),
    ]
    .into_iter()
    .map(|(id, reason)| (id, reason.to_string()))
    .collect();
    assert_eq!(failed, expected);
    assert_eq!(report.failed_export, Some(dir.path().join("videos_failed.json")));

    // Id 4 was asked twice, everything else once
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 11);

    let store = JsonCheckpointStore::new(
        dir.path().join("progress.json"),
        dir.path().join("videos.json"),
    );
    let loaded = store.load().unwrap();
    assert_eq!(loaded.progress_status, DocumentStatus::Loaded);
    assert_eq!(loaded.progress.completed, dataset);
    assert_eq!(loaded.progress.failed, expected);
    assert!(loaded.progress.last_run.is_some());
}

#[tokio::test]
async fn test_second_run_only_retries_failures() {
    let mock_server = MockServer::start().await;
    mount_scenario(&mock_server).await;

    let dir = TempDir::new().unwrap();
    let endpoint = format!("{}/api", mock_server.uri());

    let first = Harvester::new(create_test_config(&endpoint, dir.path(), 10))
        .unwrap()
        .run()
        .await
        .unwrap();
    let completed_after_first = read_json_map(&dir.path().join("videos.json"));

    let second = Harvester::new(create_test_config(&endpoint, dir.path(), 10))
        .unwrap()
        .run()
        .await
        .unwrap();
    let completed_after_second = read_json_map(&dir.path().join("videos.json"));

    assert_eq!(first.succeeded, second.succeeded);
    assert_eq!(second.processed, 4);
    assert!(completed_after_first
        .iter()
        .all(|(id, name)| completed_after_second.get(id) == Some(name)));

    // 11 requests in the first run, then only 2, 6, 8 and 10 again
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 15);

    let second_run_bodies: HashSet<String> = requests[11..]
        .iter()
        .map(|r| String::from_utf8_lossy(&r.body).to_string())
        .collect();
    let expected: HashSet<String> = ["id=2", "id=6", "id=8", "id=10"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(second_run_bodies, expected);
}

/// Fetcher driven by a fixed script
///
/// Ids in `fail` come back as failures, everything else succeeds. With
/// `hang_after` set, calls past that count never complete.
struct ScriptedFetcher {
    calls: Mutex<Vec<u32>>,
    fail: HashSet<u32>,
    hang_after: Option<usize>,
    hanging: Notify,
}

impl ScriptedFetcher {
    fn new(fail: &[u32]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: fail.iter().copied().collect(),
            hang_after: None,
            hanging: Notify::new(),
        }
    }

    fn hanging_after(mut self, calls: usize) -> Self {
        self.hang_after = Some(calls);
        self
    }

    fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemFetcher for ScriptedFetcher {
    async fn fetch(&self, id: u32) -> FetchResult {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(id);
            calls.len()
        };

        if self.hang_after.is_some_and(|limit| call > limit) {
            self.hanging.notify_one();
            std::future::pending::<()>().await;
        }

        if self.fail.contains(&id) {
            FetchResult::Failure {
                id,
                reason: "API returned error".to_string(),
            }
        } else {
            FetchResult::Success {
                id,
                name: format!("item-{}", id),
            }
        }
    }
}

/// Hands a typed fetcher to the harvester while the test keeps its own handle
fn shared<F: ItemFetcher + 'static>(fetcher: &Arc<F>) -> Arc<dyn ItemFetcher> {
    let fetcher: Arc<F> = Arc::clone(fetcher);
    fetcher
}

fn json_store(dir: &Path) -> Arc<JsonCheckpointStore> {
    Arc::new(JsonCheckpointStore::new(
        dir.join("progress.json"),
        dir.join("videos.json"),
    ))
}

#[tokio::test]
async fn test_failure_is_superseded_by_later_success() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("http://127.0.0.1:1/api", dir.path(), 5);

    let failing = Arc::new(ScriptedFetcher::new(&[3]));
    let report = Harvester::with_parts(config.clone(), json_store(dir.path()), failing)
        .run()
        .await
        .unwrap();
    assert_eq!(report.failed, 1);

    let loaded = json_store(dir.path()).load().unwrap();
    assert!(loaded.progress.failed.contains_key(&3));
    assert!(!loaded.progress.completed.contains_key(&3));

    let healthy = Arc::new(ScriptedFetcher::new(&[]));
    let report = Harvester::with_parts(config, json_store(dir.path()), shared(&healthy))
        .run()
        .await
        .unwrap();

    assert_eq!(healthy.calls(), vec![3]);
    assert_eq!(report.succeeded, 5);
    assert_eq!(report.failed, 0);
    assert_eq!(report.failed_export, None);

    let loaded = json_store(dir.path()).load().unwrap();
    assert!(loaded.progress.failed.is_empty());
    assert_eq!(
        loaded.progress.completed.get(&3).map(String::as_str),
        Some("item-3")
    );
}

#[tokio::test]
async fn test_checkpoint_survives_abort() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config("http://127.0.0.1:1/api", dir.path(), 10);
    config.harvest.max_concurrent_requests = 1;
    config.harvest.save_every = 2;

    let fetcher = Arc::new(ScriptedFetcher::new(&[]).hanging_after(2));
    let harvester = Harvester::with_parts(config, json_store(dir.path()), shared(&fetcher));
    let run = tokio::spawn(async move { harvester.run().await });

    // The third fetch only starts after the second success was flushed
    tokio::time::timeout(Duration::from_secs(10), fetcher.hanging.notified())
        .await
        .expect("fetcher never reached the third call");
    run.abort();
    let _ = run.await;

    let calls = fetcher.calls();
    let loaded = json_store(dir.path()).load().unwrap();
    assert_eq!(loaded.progress.completed.len(), 2);
    for id in &calls[..2] {
        assert!(loaded.progress.completed.contains_key(id));
        assert!(loaded.dataset.contains_key(id));
    }
}

#[tokio::test]
async fn test_interrupted_run_saves_progress() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config("http://127.0.0.1:1/api", dir.path(), 10);
    config.harvest.max_concurrent_requests = 1;
    config.harvest.save_every = 100;
    config.harvest.shuffle = false;

    let fetcher = Arc::new(ScriptedFetcher::new(&[]).hanging_after(1));
    let harvester = Harvester::with_parts(config, json_store(dir.path()), shared(&fetcher));
    let cancel = harvester.cancellation_token();
    let run = tokio::spawn(async move { harvester.run().await });

    tokio::time::timeout(Duration::from_secs(10), fetcher.hanging.notified())
        .await
        .expect("fetcher never reached the second call");
    cancel.cancel();

    let report = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("run did not stop after cancellation")
        .unwrap()
        .unwrap();

    assert!(report.interrupted);
    assert_eq!(report.succeeded, 1);
    assert_eq!(fetcher.calls(), vec![1, 2]);

    // The abandoned id is not recorded anywhere and will be fetched next time
    let loaded = json_store(dir.path()).load().unwrap();
    assert_eq!(loaded.progress.completed.keys().copied().collect::<Vec<_>>(), vec![1]);
    assert!(loaded.progress.failed.is_empty());
    assert!(loaded.progress.last_run.is_some());
}

#[tokio::test]
async fn test_corrupt_progress_file_starts_fresh() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("progress.json"), "{\"completed\": {\"1\": ").unwrap();
    let config = create_test_config("http://127.0.0.1:1/api", dir.path(), 3);

    let fetcher = Arc::new(ScriptedFetcher::new(&[]));
    let report = Harvester::with_parts(config, json_store(dir.path()), shared(&fetcher))
        .run()
        .await
        .unwrap();

    assert_eq!(report.succeeded, 3);
    let mut calls = fetcher.calls();
    calls.sort_unstable();
    assert_eq!(calls, vec![1, 2, 3]);

    let loaded = json_store(dir.path()).load().unwrap();
    assert_eq!(loaded.progress_status, DocumentStatus::Loaded);
    assert_eq!(loaded.progress.completed.len(), 3);
}

#[tokio::test]
async fn test_dataset_entries_are_not_refetched() {
    let dir = TempDir::new().unwrap();
    let dataset: Dataset = [(1, "kept".to_string()), (2, "kept-too".to_string())]
        .into_iter()
        .collect();
    std::fs::write(
        dir.path().join("videos.json"),
        serde_json::to_string(&dataset).unwrap(),
    )
    .unwrap();
    let config = create_test_config("http://127.0.0.1:1/api", dir.path(), 4);

    let fetcher = Arc::new(ScriptedFetcher::new(&[]));
    Harvester::with_parts(config, json_store(dir.path()), shared(&fetcher))
        .run()
        .await
        .unwrap();

    let mut calls = fetcher.calls();
    calls.sort_unstable();
    assert_eq!(calls, vec![3, 4]);

    let saved = read_json_map(&dir.path().join("videos.json"));
    assert_eq!(saved.get(&1).map(String::as_str), Some("kept"));
    assert_eq!(saved.len(), 4);
}

#[tokio::test]
async fn test_recent_run_triggers_interruptible_cooldown() {
    let dir = TempDir::new().unwrap();
    let progress = json!({
        "completed": {},
        "failed": {},
        "lastId": 0,
        "lastRun": chrono::Utc::now().to_rfc3339(),
    });
    std::fs::write(dir.path().join("progress.json"), progress.to_string()).unwrap();

    let mut config = create_test_config("http://127.0.0.1:1/api", dir.path(), 3);
    config.harvest.cooldown_threshold_secs = 300;
    config.harvest.cooldown_min_ms = 30_000;
    config.harvest.cooldown_max_ms = 60_000;

    let fetcher = Arc::new(ScriptedFetcher::new(&[]));
    let harvester = Harvester::with_parts(config, json_store(dir.path()), shared(&fetcher));
    let cancel = harvester.cancellation_token();
    let run = tokio::spawn(async move { harvester.run().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("cooldown was not interrupted")
        .unwrap()
        .unwrap();

    assert!(report.interrupted);
    assert!(fetcher.calls().is_empty());
}

/// Succeeds everywhere except the given ids, where it panics
struct PanicsOn(HashSet<u32>);

#[async_trait]
impl ItemFetcher for PanicsOn {
    async fn fetch(&self, id: u32) -> FetchResult {
        if self.0.contains(&id) {
            panic!("fetcher crashed on id {}", id);
        }
        FetchResult::Success {
            id,
            name: format!("item-{}", id),
        }
    }
}

#[tokio::test]
async fn test_panicking_fetcher_does_not_stall_the_pool() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("http://127.0.0.1:1/api", dir.path(), 10);
    let fetcher = Arc::new(PanicsOn([1, 2].into_iter().collect()));

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        Harvester::with_parts(config, json_store(dir.path()), fetcher).run(),
    )
    .await
    .expect("run stalled after worker panics")
    .unwrap();

    assert!(!report.interrupted);
    assert_eq!(report.succeeded, 8);
    assert_eq!(report.failed, 0);

    // Ids that crashed stay unrecorded and are queued again next run
    let loaded = json_store(dir.path()).load().unwrap();
    assert_eq!(
        loaded.progress.completed.keys().copied().collect::<Vec<_>>(),
        (3..=10).collect::<Vec<_>>()
    );
    assert!(loaded.progress.failed.is_empty());
}
