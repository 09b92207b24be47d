use std::fs;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use manifests_core::FilterConfig;
use manifests_daemon::{router, spawn_processor, AppState, SyncSettings};
use manifests_sync::{MemorySource, RemoteEntry, RemoteSource, RemoteTree, SyncError, SyncRequest};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::{broadcast, RwLock};
use tower::ServiceExt;

struct Harness {
    state: AppState,
    shutdown: broadcast::Sender<()>,
    processor: tokio::task::JoinHandle<Result<(), manifests_daemon::DaemonError>>,
}

/// Remote whose read of `slow_path` outlasts the sync timeout.
struct SlowReadSource {
    inner: MemorySource,
    slow_path: &'static str,
}

struct SlowReadTree {
    inner: Box<dyn RemoteTree>,
    slow_path: &'static str,
}

impl RemoteSource for SlowReadSource {
    fn location(&self) -> &str {
        "slow-read"
    }

    fn checkout_head(&self) -> Result<Box<dyn RemoteTree>, SyncError> {
        Ok(Box::new(SlowReadTree {
            inner: self.inner.checkout_head()?,
            slow_path: self.slow_path,
        }))
    }
}

impl RemoteTree for SlowReadTree {
    fn revision(&self) -> &str {
        self.inner.revision()
    }

    fn entries(&self) -> Result<Vec<RemoteEntry>, SyncError> {
        self.inner.entries()
    }

    fn read(&self, entry: &RemoteEntry) -> Result<Vec<u8>, SyncError> {
        if entry.path == self.slow_path {
            std::thread::sleep(Duration::from_millis(300));
        }
        self.inner.read(entry)
    }
}

fn harness(source: Arc<dyn RemoteSource>, root: &TempDir) -> Harness {
    harness_with_timeout(source, root, Duration::from_secs(10))
}

fn harness_with_timeout(
    source: Arc<dyn RemoteSource>,
    root: &TempDir,
    timeout: Duration,
) -> Harness {
    let settings = SyncSettings {
        source,
        request: SyncRequest {
            root: root.path().to_path_buf(),
            filter: FilterConfig::k3s_defaults(),
            dry_run: false,
        },
        timeout,
    };
    let (shutdown, _) = broadcast::channel(4);
    let last_sync = Arc::new(RwLock::new(None));
    let (sync, processor) = spawn_processor(settings, last_sync.clone(), &shutdown);
    Harness {
        state: AppState { sync, last_sync },
        shutdown,
        processor,
    }
}

async fn call(state: &AppState, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = router(state.clone())
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn post_update_syncs_and_returns_summary() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("stale.yaml"), "old").unwrap();
    fs::write(root.path().join("coredns.yaml"), "bundled").unwrap();
    let source = Arc::new(
        MemorySource::new("abc123")
            .with_file("apps/web.yaml", "kind: Deployment\n")
            .with_file("README.md", "docs"),
    );
    let h = harness(source, &root);

    let (status, body) = call(&h.state, Method::POST, "/api/v1/update").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revision"], "abc123");
    assert_eq!(body["created"], 1);
    assert_eq!(body["deleted"], 1);
    assert_eq!(body["failed"], 0);
    assert!(root.path().join("apps").join("web.yaml").exists());
    assert!(!root.path().join("README.md").exists());
    assert!(!root.path().join("stale.yaml").exists());
    assert_eq!(
        fs::read_to_string(root.path().join("coredns.yaml")).unwrap(),
        "bundled"
    );

    let (status, body) = call(&h.state, Method::GET, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["revision"], "abc123");
}

#[tokio::test]
async fn trailing_slash_is_accepted() {
    let root = TempDir::new().unwrap();
    let h = harness(Arc::new(MemorySource::new("r1")), &root);

    let (status, body) = call(&h.state, Method::POST, "/api/v1/update/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revision"], "r1");
}

#[tokio::test]
async fn unreachable_remote_returns_server_error() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("keep.yaml"), "deployed").unwrap();
    let h = harness(Arc::new(MemorySource::new("r1").unavailable()), &root);

    let (status, body) = call(&h.state, Method::POST, "/api/v1/update").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("memory"));
    assert!(root.path().join("keep.yaml").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timed_out_pass_returns_gateway_timeout_with_summary() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(SlowReadSource {
        inner: MemorySource::new("r1")
            .with_file("a.yaml", "x")
            .with_file("z.yaml", "y"),
        slow_path: "z.yaml",
    });
    let h = harness_with_timeout(source, &root, Duration::from_millis(50));

    let (status, body) = call(&h.state, Method::POST, "/api/v1/update").await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["timed_out"], true);
    assert_eq!(body["cancelled"], true);
    assert_eq!(body["revision"], "r1");

    let (_, body) = call(&h.state, Method::GET, "/api/v1/status").await;
    assert_eq!(body["summary"]["timed_out"], true);
}

#[tokio::test]
async fn update_after_shutdown_is_unavailable() {
    let root = TempDir::new().unwrap();
    let h = harness(Arc::new(MemorySource::new("r1")), &root);
    h.shutdown.send(()).unwrap();
    h.processor.await.unwrap().unwrap();

    let (status, _) = call(&h.state, Method::POST, "/api/v1/update").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn get_on_update_route_is_rejected_and_health_is_ok() {
    let root = TempDir::new().unwrap();
    let h = harness(Arc::new(MemorySource::new("r1")), &root);

    let (status, _) = call(&h.state, Method::GET, "/api/v1/update").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let response = router(h.state.clone())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}
