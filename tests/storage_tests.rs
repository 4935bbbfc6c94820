use std::sync::Arc;

use chunkstore::config::{AccountConfig, CloudConfig};
use chunkstore::model::{Destination, Provider};
use chunkstore::storage::{
    BackendError, BackendFactory, BackendRegistry, BackendSpec, ChunkBackend, FolderBackend, LocalChunkDir,
    MemoryBackend,
};
use tempfile::TempDir;

/// Test utilities for storage backend testing
struct StorageTestUtils;

impl StorageTestUtils {
    fn create_test_chunk(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i % 256) as u8).collect()
    }

    /// Exercise the three backend calls the orchestrator relies on.
    async fn test_backend_basic_operations(backend: &dyn ChunkBackend) {
        let data = Self::create_test_chunk(1024);
        let remote_path = Provider::GoogleDrive.remote_path("0123456789abcdef");

        let remote_id = backend.upload(&data, &remote_path).await.unwrap();
        assert_eq!(backend.download(&remote_id).await.unwrap(), data);

        let found = backend.find_by_name("0123456789abcdef.chunk").await.unwrap();
        assert_eq!(backend.download(&found).await.unwrap(), data);

        let missing = backend.download("does-not-exist").await.unwrap_err();
        assert!(matches!(missing, BackendError::NotFound(_)), "unexpected error: {missing}");
        assert!(!missing.is_retryable());

        let missing = backend.find_by_name("nothing.chunk").await.unwrap_err();
        assert!(matches!(missing, BackendError::NotFound(_)));
    }
}

#[tokio::test]
async fn test_memory_backend() {
    let backend = MemoryBackend::new();
    assert!(backend.is_empty().await);
    StorageTestUtils::test_backend_basic_operations(&backend).await;
    assert_eq!(backend.len().await, 1);
}

#[tokio::test]
async fn test_memory_backend_find_returns_newest_upload() {
    let backend = MemoryBackend::new();
    backend.upload(b"old", "chunks/a.chunk").await.unwrap();
    let newer = backend.upload(b"new", "other/a.chunk").await.unwrap();

    assert_eq!(backend.find_by_name("a.chunk").await.unwrap(), newer);
}

#[tokio::test]
async fn test_folder_backend() {
    let temp_dir = TempDir::new().unwrap();
    let backend = FolderBackend::new(temp_dir.path().join("store"), true).await.unwrap();
    StorageTestUtils::test_backend_basic_operations(&backend).await;

    let stored = temp_dir
        .path()
        .join("store")
        .join("distributed-chunks")
        .join("0123456789abcdef.chunk");
    assert!(stored.is_file());
}

#[tokio::test]
async fn test_folder_backend_remote_id_is_relative_path() {
    let temp_dir = TempDir::new().unwrap();
    let backend = FolderBackend::new(temp_dir.path(), false).await.unwrap();

    let id = backend.upload(b"payload", "/Apps/DistributedChunks/x.chunk").await.unwrap();
    assert_eq!(id, "Apps/DistributedChunks/x.chunk");
    assert_eq!(backend.find_by_name("x.chunk").await.unwrap(), id);
}

#[tokio::test]
async fn test_folder_backend_rejects_escaping_paths() {
    let temp_dir = TempDir::new().unwrap();
    let backend = FolderBackend::new(temp_dir.path().join("store"), true).await.unwrap();

    for path in ["../outside.chunk", "chunks/../../outside.chunk", ""] {
        let err = backend.upload(b"x", path).await.unwrap_err();
        assert!(matches!(err, BackendError::Permanent(_)), "{path:?} accepted: {err}");
    }
    assert!(!temp_dir.path().join("outside.chunk").exists());
}

#[tokio::test]
async fn test_folder_backend_requires_existing_root() {
    let temp_dir = TempDir::new().unwrap();
    let result = FolderBackend::new(temp_dir.path().join("missing"), false).await;
    assert!(matches!(result, Err(BackendError::Permanent(_))));
}

#[test]
fn test_backend_error_retry_classification() {
    assert!(BackendError::Transient("429".to_string()).is_retryable());
    assert!(!BackendError::Permanent("403".to_string()).is_retryable());
    assert!(BackendError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_retryable());
    assert!(!BackendError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied)).is_retryable());
}

#[tokio::test]
async fn test_factory_builds_backends() {
    let temp_dir = TempDir::new().unwrap();
    let spec = BackendSpec::Folder {
        path: temp_dir.path().join("f").to_string_lossy().into_owned(),
        create_dirs: None,
    };
    let backend = BackendFactory::create_backend(&spec).await.unwrap();
    let id = backend.upload(b"abc", "chunks/abc.chunk").await.unwrap();
    assert_eq!(backend.download(&id).await.unwrap(), b"abc");

    let missing = BackendSpec::Folder {
        path: temp_dir.path().join("nope").to_string_lossy().into_owned(),
        create_dirs: Some(false),
    };
    assert!(BackendFactory::create_backend(&missing).await.is_err());
}

#[tokio::test]
async fn test_registry_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let account = |name: &str, provider: Provider, enabled: bool, backend: Option<BackendSpec>| AccountConfig {
        name: name.to_string(),
        provider,
        enabled,
        description: String::new(),
        backend,
    };
    let cloud = CloudConfig {
        providers: vec![Provider::Folder, Provider::Memory, Provider::GoogleDrive],
        accounts: vec![
            account(
                "disk",
                Provider::Folder,
                true,
                Some(BackendSpec::Folder {
                    path: temp_dir.path().to_string_lossy().into_owned(),
                    create_dirs: None,
                }),
            ),
            account("ram", Provider::Memory, true, Some(BackendSpec::Memory)),
            account("spare", Provider::Memory, false, Some(BackendSpec::Memory)),
            account("personal", Provider::GoogleDrive, true, None),
        ],
        ..CloudConfig::default()
    };

    let mut registry = BackendRegistry::from_config(&cloud).await.unwrap();
    assert_eq!(
        registry.destinations(),
        &[
            Destination::new(Provider::Folder, "disk"),
            Destination::new(Provider::Memory, "ram"),
        ]
    );
    assert!(registry.get(&Destination::new(Provider::Memory, "spare")).is_none());

    // Vendor clouds are registered by the caller.
    let gdrive = Destination::new(Provider::GoogleDrive, "personal");
    registry.register(gdrive.clone(), Arc::new(MemoryBackend::new()));
    assert_eq!(registry.len(), 3);
    assert!(registry.get(&gdrive).is_some());

    assert!(registry.remove(&gdrive).is_some());
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_local_chunk_dir() {
    let temp_dir = TempDir::new().unwrap();
    let chunks = LocalChunkDir::create(temp_dir.path().join("chunks")).unwrap();

    chunks.write_chunk("aaaa", b"one").unwrap();
    chunks.store_async("bbbb", b"two").await.unwrap();
    assert!(chunks.contains("aaaa"));
    assert_eq!(chunks.load("bbbb").unwrap(), b"two");
    assert_eq!(chunks.load_async("aaaa").await.unwrap(), b"one");
    assert_eq!(chunks.chunk_path("aaaa"), temp_dir.path().join("chunks").join("aaaa.chunk"));

    std::fs::write(temp_dir.path().join("chunks").join("keep.json"), b"{}").unwrap();
    assert_eq!(chunks.cleanup().unwrap(), 2);
    assert!(!chunks.contains("aaaa"));
    assert!(temp_dir.path().join("chunks").join("keep.json").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_to_same_chunk_all_succeed() {
    let dir = TempDir::new().unwrap();
    let local = LocalChunkDir::create(dir.path().join("chunks")).unwrap();
    let folder = FolderBackend::new(dir.path().join("remote"), true).await.unwrap();
    let payload = vec![7u8; 4096];

    let stores = (0..32).map(|_| local.store_async("cd00e292c5970d3c", &payload));
    for result in futures::future::join_all(stores).await {
        result.unwrap();
    }
    let uploads = (0..32).map(|_| folder.upload(&payload, "chunks/cd00e292c5970d3c.chunk"));
    for result in futures::future::join_all(uploads).await {
        assert_eq!(result.unwrap(), "chunks/cd00e292c5970d3c.chunk");
    }

    assert_eq!(local.load("cd00e292c5970d3c").unwrap(), payload);
    assert_eq!(folder.download("chunks/cd00e292c5970d3c.chunk").await.unwrap(), payload);
    let names: Vec<_> = std::fs::read_dir(local.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["cd00e292c5970d3c.chunk".to_string()]);
}
