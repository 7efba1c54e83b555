//! Integration tests for the durable penalty store: file roundtrip,
//! restart survival, clamping, and degraded persistence.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use mirrorfetch::penalty::{JsonFilePenaltyBackend, PenaltyBackend, PenaltyStore};
use mirrorfetch::{
    MirrorBackend, MirrorFetch, MirrorFetchError, PenaltyPolicy, RequestClass, ResourceId, Result,
};

/// Fails every request to `bad`, answers everything else.
struct OneBadMirror {
    bad: &'static str,
}

#[async_trait]
impl MirrorBackend for OneBadMirror {
    fn name(&self) -> &str {
        "one-bad"
    }

    async fn resolve_id(&self, url: &str) -> Result<ResourceId> {
        if url.starts_with(self.bad) {
            return Err(MirrorFetchError::Http("connection refused".into()));
        }
        Ok(ResourceId::from(1))
    }

    async fn fetch_media(&self, _url: &str) -> Result<Bytes> {
        Err(MirrorFetchError::Status { status: 404 })
    }
}

#[tokio::test]
async fn penalties_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("penalties.json");

    let build = || {
        MirrorFetch::builder()
            .api_endpoints(["https://bad.test", "https://good.test"])
            .max_requests_per_second(0.0)
            .penalty_file(&path)
            .backend(Arc::new(OneBadMirror {
                bad: "https://bad.test",
            }))
            .build()
            .unwrap()
    };

    let first = build();
    assert!(first.resolve_id("k").await.is_some());
    first.shutdown();
    drop(first);

    // on-disk format: url -> { api, media }
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["https://bad.test"]["api"], 2);
    assert_eq!(raw["https://bad.test"]["media"], 0);

    let second = build();
    let order: Vec<String> = second
        .ordered_endpoints(RequestClass::Api)
        .into_iter()
        .map(|e| e.url)
        .collect();
    assert_eq!(order, ["https://good.test", "https://bad.test"]);
}

#[test]
fn penalties_are_clamped_to_policy_bounds() {
    let store = PenaltyStore::in_memory();
    for _ in 0..40 {
        store.record_failure(RequestClass::Media, "https://m");
    }
    assert_eq!(store.penalty(RequestClass::Media, "https://m"), 50);

    for _ in 0..60 {
        store.record_success(RequestClass::Media, "https://m");
    }
    assert_eq!(store.penalty(RequestClass::Media, "https://m"), 0);
}

#[test]
fn custom_policy_applies() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(JsonFilePenaltyBackend::new(dir.path().join("p.json")));
    let store = PenaltyStore::new(backend, PenaltyPolicy::new().max(5).failure_delta(3));

    assert_eq!(store.record_failure(RequestClass::Api, "https://a"), 3);
    assert_eq!(store.record_failure(RequestClass::Api, "https://a"), 5);
    assert_eq!(store.record_success(RequestClass::Api, "https://a"), 4);
}

#[test]
fn corrupt_file_means_neutral_penalties() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("penalties.json");
    std::fs::write(&path, "{ not json").unwrap();

    let backend = Arc::new(JsonFilePenaltyBackend::new(&path));
    assert!(matches!(
        backend.load(),
        Err(MirrorFetchError::Persistence(_))
    ));

    let store = PenaltyStore::new(backend, PenaltyPolicy::default());
    assert!(store.penalties(RequestClass::Api).is_empty());

    // the next adjustment rewrites a valid table
    assert_eq!(store.record_failure(RequestClass::Api, "https://a"), 2);
    assert_eq!(store.penalty(RequestClass::Api, "https://a"), 2);
}

#[tokio::test]
async fn unwritable_store_does_not_break_resolution() {
    let dir = tempfile::tempdir().unwrap();
    // a directory where the file should be: reads and writes both fail
    let path = dir.path().join("penalties.json");
    std::fs::create_dir(&path).unwrap();

    let relay = MirrorFetch::builder()
        .api_endpoints(["https://bad.test", "https://good.test"])
        .max_requests_per_second(0.0)
        .penalty_file(&path)
        .backend(Arc::new(OneBadMirror {
            bad: "https://bad.test",
        }))
        .build()
        .unwrap();

    assert_eq!(relay.resolve_id("k").await, Some(ResourceId::from(1)));
    assert!(relay.penalties().table().is_err());
}

#[test]
fn reset_forgets_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("penalties.json");
    let store = PenaltyStore::new(
        Arc::new(JsonFilePenaltyBackend::new(&path)),
        PenaltyPolicy::default(),
    );
    store.record_failure(RequestClass::Api, "https://a");
    store.reset().unwrap();

    assert!(store.table().unwrap().is_empty());
    assert_eq!(store.penalty(RequestClass::Api, "https://a"), 0);
}
