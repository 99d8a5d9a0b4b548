//! Inventory Reload Integration Tests
//!
//! Snapshot publication, failed reloads, shared vs isolated handles and
//! readers running while reloads happen.

use std::{
    io::Write,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Once,
    },
    thread,
};

use homelab_inventory::{
    capability::DOCKER, CacheMode, FileSource, InventoryCache, InventoryConfig, InventoryError,
    InventoryHandle, InventoryResult, InventorySource, MemorySource, ResolveOptions, Snapshot,
};
use tracing::info;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

static INIT: Once = Once::new();

fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .with(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .try_init();
    });
}

const V1: &str = r#"
docker_hosts:
  vars:
    docker_api_port: 2375
  hosts:
    alpha:
"#;

const V2: &str = r#"
docker_hosts:
  vars:
    docker_api_port: 2376
  hosts:
    alpha:
    beta:
"#;

const CYCLIC: &str = r#"
a:
  children: [b]
b:
  children: [a]
"#;

fn write_inventory(path: &Path, yaml: &str) {
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.sync_all().unwrap();
}

/// Each published snapshot must be entirely V1 or entirely V2.
fn assert_consistent(snap: &Snapshot) {
    match snap.merged_config("alpha").unwrap()["docker_api_port"].as_str() {
        "2375" => {
            assert_eq!(snap.host_count(), 1);
            assert!(snap.host("beta").is_err());
        }
        "2376" => {
            assert_eq!(snap.host_count(), 2);
            assert_eq!(snap.hosts_with_capability(DOCKER), &["alpha", "beta"]);
        }
        other => panic!("unexpected port {}", other),
    }
}

/// Source counting how often it was read.
struct CountingSource {
    name: String,
    reads: AtomicUsize,
}

impl InventorySource for CountingSource {
    fn read(&self) -> InventoryResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        thread::sleep(std::time::Duration::from_millis(20));
        Ok(V1.as_bytes().to_vec())
    }

    fn describe(&self) -> String {
        format!("counting:{}", self.name)
    }
}

#[test]
fn test_failed_reload_keeps_previous_snapshot() {
    init_test_logging();
    let source = Arc::new(MemorySource::new("reload-keeps-previous", V1));
    let cache = InventoryCache::load(source.clone(), ResolveOptions::default()).unwrap();
    let first = cache.current();
    assert_eq!(first.generation(), 1);

    source.set(CYCLIC);
    let err = cache.reload().unwrap_err();
    assert!(matches!(err, InventoryError::CycleError { .. }));
    assert!(Arc::ptr_eq(&cache.current(), &first));

    source.set("docker_hosts: [not, a, mapping]");
    assert!(matches!(
        cache.reload(),
        Err(InventoryError::MalformedDocument(_))
    ));
    source.clear();
    assert!(matches!(
        cache.reload(),
        Err(InventoryError::SourceNotFound { .. })
    ));
    assert_eq!(cache.current().merged_config("alpha").unwrap()["docker_api_port"], "2375");

    source.set(V2);
    let fresh = cache.reload().unwrap();
    assert!(fresh.generation() > first.generation());
    assert_eq!(cache.current().merged_config("alpha").unwrap()["docker_api_port"], "2376");
    // readers holding the old snapshot still see it unchanged
    assert_eq!(first.host_count(), 1);
}

#[test]
fn test_first_load_failure_serves_empty_snapshot() {
    init_test_logging();
    let source = Arc::new(MemorySource::empty("reload-first-failure"));
    let cache = InventoryCache::new(source.clone(), ResolveOptions::default());
    assert!(cache.ensure_loaded().is_err());
    assert!(!cache.is_loaded());
    assert!(cache.current().is_empty());

    source.set(V1);
    let snap = cache.ensure_loaded().unwrap();
    assert_eq!(snap.host_count(), 1);
    assert!(cache.is_loaded());
}

#[test]
fn test_shared_handles_see_each_others_reload() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts.yml");
    write_inventory(&path, V1);

    let a = InventoryHandle::load(
        CacheMode::Shared,
        Arc::new(FileSource::new(&path)),
        ResolveOptions::default(),
    )
    .unwrap();
    let b = InventoryHandle::load(
        CacheMode::Shared,
        Arc::new(FileSource::new(&path)),
        ResolveOptions::default(),
    )
    .unwrap();
    assert!(a.shares_cache_with(&b));
    assert_eq!(a.current().generation(), b.current().generation());

    write_inventory(&path, V2);
    a.reload().unwrap();
    assert_eq!(b.current().host_count(), 2);
    assert!(Arc::ptr_eq(&a.current(), &b.current()));
}

#[test]
fn test_isolated_handles_do_not_share() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts.yml");
    write_inventory(&path, V1);

    let a = InventoryHandle::load(
        CacheMode::Isolated,
        Arc::new(FileSource::new(&path)),
        ResolveOptions::default(),
    )
    .unwrap();
    let b = InventoryHandle::load(
        CacheMode::Isolated,
        Arc::new(FileSource::new(&path)),
        ResolveOptions::default(),
    )
    .unwrap();
    assert!(!a.shares_cache_with(&b));
    assert_eq!(a.mode(), CacheMode::Isolated);

    write_inventory(&path, V2);
    a.reload().unwrap();
    assert_eq!(a.current().host_count(), 2);
    assert_eq!(b.current().host_count(), 1);

    b.reload().unwrap();
    assert_eq!(b.current().host_count(), 2);
}

#[test]
fn test_removed_file_keeps_serving() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts.yml");
    write_inventory(&path, V2);

    let handle = InventoryHandle::load(
        CacheMode::Isolated,
        Arc::new(FileSource::new(&path)),
        ResolveOptions::default(),
    )
    .unwrap();
    std::fs::remove_file(&path).unwrap();

    let err = handle.reload().unwrap_err();
    assert!(matches!(err, InventoryError::SourceNotFound { .. }));
    assert_eq!(handle.current().host_count(), 2);
}

#[test]
fn test_config_open_from_env_lookup() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inventory.yml");
    write_inventory(&path, "containers:\n  hosts:\n    gamma:\n");
    let path_str = path.to_string_lossy().to_string();

    let config = InventoryConfig::default().with_overrides_from(|key| match key {
        "ANSIBLE_INVENTORY_PATH" => Some(path_str.clone()),
        "INVENTORY_CACHE_MODE" => Some("isolated".to_string()),
        "DOCKER_ANSIBLE_GROUP" => Some("containers".to_string()),
        _ => None,
    });
    let handle = config.open().unwrap();
    assert_eq!(handle.mode(), CacheMode::Isolated);
    assert!(!handle.cache().is_loaded());

    let snap = handle.ensure_loaded().unwrap();
    assert_eq!(snap.hosts_with_capability(DOCKER), &["gamma"]);
}

#[test]
fn test_concurrent_first_load_reads_once() {
    init_test_logging();
    let source = Arc::new(CountingSource {
        name: "reload-first-load-once".to_string(),
        reads: AtomicUsize::new(0),
    });

    let handles: Vec<InventoryHandle> = (0..8)
        .map(|_| {
            InventoryHandle::open(CacheMode::Shared, source.clone(), ResolveOptions::default())
        })
        .collect();

    thread::scope(|s| {
        for handle in &handles {
            s.spawn(move || {
                let snap = handle.ensure_loaded().unwrap();
                assert_eq!(snap.generation(), 1);
            });
        }
    });

    assert_eq!(source.reads.load(Ordering::SeqCst), 1);
    assert!(handles.iter().all(|h| h.shares_cache_with(&handles[0])));
}

#[test]
fn test_readers_during_reloads_see_whole_snapshots() {
    init_test_logging();
    let source = Arc::new(MemorySource::new("reload-threads", V1));
    let cache = Arc::new(InventoryCache::load(source.clone(), ResolveOptions::default()).unwrap());

    thread::scope(|s| {
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            s.spawn(move || {
                let mut last_generation = 0;
                for _ in 0..500 {
                    let snap = cache.current();
                    assert!(snap.generation() >= last_generation);
                    last_generation = snap.generation();
                    assert_consistent(&snap);
                }
            });
        }

        let cache = Arc::clone(&cache);
        let source = Arc::clone(&source);
        s.spawn(move || {
            for i in 0..50 {
                source.set(if i % 2 == 0 { V2 } else { V1 });
                cache.reload().unwrap();
            }
        });
    });

    info!(generation = cache.current().generation(), "Reload loop finished");
    assert_eq!(cache.current().generation(), 51);
}

#[test]
fn test_racing_reloads_publish_highest_generation() {
    init_test_logging();
    let source = Arc::new(MemorySource::new("reload-racing", V2));
    let cache = Arc::new(InventoryCache::new(source, ResolveOptions::default()));

    thread::scope(|s| {
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            s.spawn(move || {
                for _ in 0..10 {
                    cache.reload().unwrap();
                }
            });
        }
    });

    assert_eq!(cache.current().generation(), 80);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_readers_during_reloads() {
    init_test_logging();
    let source = Arc::new(MemorySource::new("reload-async", V1));
    let handle =
        InventoryHandle::load(CacheMode::Shared, source.clone(), ResolveOptions::default())
            .unwrap();

    let mut readers = Vec::new();
    for _ in 0..8 {
        let handle = handle.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..200 {
                assert_consistent(&handle.current());
                tokio::task::yield_now().await;
            }
        }));
    }

    let writer = {
        let handle = handle.clone();
        tokio::task::spawn_blocking(move || {
            for i in 0..20 {
                source.set(if i % 2 == 0 { V2 } else { V1 });
                handle.reload().unwrap();
            }
        })
    };

    for reader in readers {
        reader.await.unwrap();
    }
    writer.await.unwrap();
    assert_eq!(handle.current().generation(), 21);
    assert_eq!(handle.current().merged_config("alpha").unwrap()["docker_api_port"], "2375");
}
