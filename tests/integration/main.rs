//! Integration tests for vmprobe

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn vmprobe() -> Command {
        let mut cmd = cargo_bin_cmd!("vmprobe");
        cmd.env_remove("VMPROBE_CONFIG");
        cmd
    }

    #[test]
    fn help_displays() {
        vmprobe()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("VM snapshot guest inspection"));
    }

    #[test]
    fn version_displays() {
        vmprobe()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("vmprobe"));
    }

    #[test]
    fn config_path_honours_flag() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");

        vmprobe()
            .arg("--config")
            .arg(&path)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let temp = TempDir::new().unwrap();

        vmprobe()
            .arg("--config")
            .arg(temp.path().join("missing.toml"))
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[inspector]"))
            .stdout(predicate::str::contains("per-disk"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        vmprobe()
            .arg("--config")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success();

        assert!(path.exists());
    }

    #[test]
    fn invalid_config_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[session]\nmode = \"both\"\n").unwrap();

        vmprobe()
            .arg("--config")
            .arg(&path)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn inspect_without_vcenter_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[store]\nenabled = false\n").unwrap();

        vmprobe()
            .arg("--config")
            .arg(&path)
            .args(["inspect", "--vm", "vm1", "--snapshot", "snap1", "--disk", "[ds] vm1/vm1.vmdk"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Missing required value: vCenter URL"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn inspect_rejects_unknown_tool() {
        vmprobe()
            .args(["inspect", "--vm", "vm1", "--snapshot", "snap1", "--tool", "guestfish"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("guestfish"));
    }
}

mod inspector_tests {
    use async_trait::async_trait;
    use std::net::TcpListener;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use vmprobe::cache::CacheKey;
    use vmprobe::error::Stage;
    use vmprobe::inspection::{InspectionTool, ToolKind};
    use vmprobe::session::{
        ConnectionContext, Credentials, DiskDescriptor, DiskExporter, LaunchSpec, NbdEndpoint,
        Orchestrator, SessionMode, SnapshotDiskInfo,
    };
    use vmprobe::store::{DurableStore, FileStore};
    use vmprobe::{InspectError, InspectResult, InspectionTarget, Inspector};

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct OsInfo {
        distro: String,
        disks: usize,
    }

    /// Counts runs; optionally slow, failing, or blocking until cancelled
    struct FakeTool {
        runs: Arc<AtomicUsize>,
        delay: Duration,
        fail: bool,
        block: bool,
    }

    impl FakeTool {
        fn new() -> Self {
            Self {
                runs: Arc::new(AtomicUsize::new(0)),
                delay: Duration::ZERO,
                fail: false,
                block: false,
            }
        }
    }

    #[async_trait]
    impl InspectionTool for FakeTool {
        type Output = OsInfo;

        fn kind(&self) -> ToolKind {
            ToolKind::VirtInspector
        }

        async fn run(
            &self,
            endpoints: &[NbdEndpoint],
            _deadline: Duration,
            cancel: &CancellationToken,
        ) -> InspectResult<OsInfo> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.block {
                cancel.cancelled().await;
                return Err(InspectError::Cancelled);
            }
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(InspectError::ToolFailed {
                    tool: "virt-inspector".to_string(),
                    code: Some(1),
                    output: "libguestfs: error: no operating system".to_string(),
                });
            }
            Ok(OsInfo {
                distro: "rhel".to_string(),
                disks: endpoints.len(),
            })
        }
    }

    /// Runs `sleep` for each disk behind a local listener. Disks named
    /// `missing` fail to spawn. Every session gets a marker artifact.
    struct LocalExporter {
        listener: TcpListener,
        artifacts: Mutex<Vec<PathBuf>>,
    }

    impl LocalExporter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                listener: TcpListener::bind("127.0.0.1:0").unwrap(),
                artifacts: Mutex::new(vec![]),
            })
        }

        fn artifacts(&self) -> Vec<PathBuf> {
            self.artifacts.lock().unwrap().clone()
        }
    }

    impl DiskExporter for LocalExporter {
        fn name(&self) -> &str {
            "sleep"
        }

        fn prepare(&self, disk: &DiskDescriptor, _conn: &ConnectionContext) -> InspectResult<LaunchSpec> {
            let DiskDescriptor::Disk { path, .. } = disk else {
                return Err(InspectError::InvalidTarget("expected a disk".to_string()));
            };
            let marker = tempfile::NamedTempFile::new().unwrap().into_temp_path();
            self.artifacts.lock().unwrap().push(marker.to_path_buf());

            let program = if path == "missing" {
                "/nonexistent/nbdkit"
            } else {
                "sleep"
            };
            Ok(LaunchSpec {
                program: PathBuf::from(program),
                args: vec!["30".to_string()],
                env: vec![],
                endpoint: NbdEndpoint::new("127.0.0.1", self.listener.local_addr().unwrap().port()),
                artifacts: vec![marker],
            })
        }
    }

    /// Durable store whose operations always fail
    struct BrokenStore {
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl DurableStore<OsInfo> for BrokenStore {
        async fn get(&self, _tool: ToolKind, _key: &CacheKey) -> InspectResult<Option<OsInfo>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(InspectError::Store("database unavailable".to_string()))
        }

        async fn set(&self, _tool: ToolKind, _key: &CacheKey, _value: &OsInfo) -> InspectResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(InspectError::Store("database unavailable".to_string()))
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            vcenter_url: "https://vcenter.example.com/sdk".to_string(),
            username: "administrator@vsphere.local".to_string(),
            password: "secret".to_string(),
        }
    }

    fn inspector(
        tool: FakeTool,
        exporter: Arc<LocalExporter>,
        durable: Option<Arc<dyn DurableStore<OsInfo>>>,
    ) -> Inspector<FakeTool> {
        let orchestrator = Orchestrator::new(
            SessionMode::PerDisk,
            exporter,
            Duration::from_secs(5),
            Duration::from_millis(500),
        );
        Inspector::new(tool, orchestrator, credentials(), Duration::from_secs(30), durable)
    }

    fn target(disks: &[&str]) -> InspectionTarget {
        InspectionTarget {
            datacenter: "dc1".to_string(),
            disks: SnapshotDiskInfo {
                vm_moref: "vm-42".to_string(),
                snapshot_moref: "snapshot-7".to_string(),
                disk_paths: vec![],
                base_disk_paths: disks.iter().map(|d| d.to_string()).collect(),
                compute_resource_path: "/dc1/host/cluster1".to_string(),
            },
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_share_one_inspection() {
        let mut tool = FakeTool::new();
        tool.delay = Duration::from_millis(300);
        let runs = Arc::clone(&tool.runs);
        let inspector = Arc::new(inspector(tool, LocalExporter::new(), None));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let inspector = Arc::clone(&inspector);
                tokio::spawn(async move {
                    inspector
                        .inspect(
                            &CacheKey::new("vm1", "snap1"),
                            &target(&["d0", "d1"]),
                            &CancellationToken::new(),
                        )
                        .await
                })
            })
            .collect();

        let mut reports = vec![];
        for task in tasks {
            reports.push(task.await.unwrap().unwrap());
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(reports.iter().all(|r| Arc::ptr_eq(r, &reports[0])));
        assert_eq!(reports[0].disks, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_share_one_failure() {
        let mut tool = FakeTool::new();
        tool.delay = Duration::from_millis(300);
        tool.fail = true;
        let runs = Arc::clone(&tool.runs);
        let inspector = Arc::new(inspector(tool, LocalExporter::new(), None));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let inspector = Arc::clone(&inspector);
                tokio::spawn(async move {
                    inspector
                        .inspect(
                            &CacheKey::new("vm1", "snap1"),
                            &target(&["d0"]),
                            &CancellationToken::new(),
                        )
                        .await
                })
            })
            .collect();

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(matches!(err, InspectError::ToolFailed { code: Some(1), .. }));
            assert_eq!(err.stage(), Stage::Tool);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(inspector.cache().volatile_len(), 0);
    }

    #[tokio::test]
    async fn first_call_populates_both_tiers() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(temp.path()).await.unwrap());
        let tool = FakeTool::new();
        let runs = Arc::clone(&tool.runs);
        let exporter = LocalExporter::new();
        let inspector = inspector(
            tool,
            Arc::clone(&exporter),
            Some(store.clone() as Arc<dyn DurableStore<OsInfo>>),
        );
        let key = CacheKey::new("vm1", "snap1");
        let cancel = CancellationToken::new();

        let first = inspector.inspect(&key, &target(&["d0"]), &cancel).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let persisted = DurableStore::<OsInfo>::get(&*store, ToolKind::VirtInspector, &key)
            .await
            .unwrap();
        assert_eq!(persisted.as_ref(), Some(&*first));

        let second = inspector.inspect(&key, &target(&["d0"]), &cancel).await.unwrap();
        assert_eq!(*second, *first);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Sessions from the first call were torn down
        assert!(exporter.artifacts().iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn durable_hit_skips_inspection() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(temp.path()).await.unwrap());
        let key = CacheKey::new("vm1", "snap1");
        let stored = OsInfo {
            distro: "debian".to_string(),
            disks: 3,
        };
        store.set(ToolKind::VirtInspector, &key, &stored).await.unwrap();

        let tool = FakeTool::new();
        let runs = Arc::clone(&tool.runs);
        let exporter = LocalExporter::new();
        let inspector = inspector(tool, Arc::clone(&exporter), Some(store as Arc<dyn DurableStore<OsInfo>>));

        let report = inspector
            .inspect(&key, &target(&["d0"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*report, stored);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(exporter.artifacts().is_empty());
        assert_eq!(inspector.cache().volatile_len(), 1);
    }

    #[tokio::test]
    async fn durable_failures_are_not_fatal() {
        let store = Arc::new(BrokenStore {
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        });
        let tool = FakeTool::new();
        let runs = Arc::clone(&tool.runs);
        let inspector = inspector(
            tool,
            LocalExporter::new(),
            Some(store.clone() as Arc<dyn DurableStore<OsInfo>>),
        );
        let key = CacheKey::new("vm1", "snap1");

        let report = inspector
            .inspect(&key, &target(&["d0"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.distro, "rhel");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert!(inspector.cache().get(&key).is_some());
    }

    #[tokio::test]
    async fn partial_session_failure_rolls_back() {
        let tool = FakeTool::new();
        let runs = Arc::clone(&tool.runs);
        let exporter = LocalExporter::new();
        let inspector = inspector(tool, Arc::clone(&exporter), None);

        let err = inspector
            .inspect(
                &CacheKey::new("vm1", "snap1"),
                &target(&["d0", "d1", "missing"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, InspectError::Disk { index: 2, .. }));
        assert_eq!(err.stage(), Stage::Session);
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let artifacts = exporter.artifacts();
        assert_eq!(artifacts.len(), 3);
        assert!(artifacts.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn cancellation_still_closes_sessions() {
        let mut tool = FakeTool::new();
        tool.block = true;
        let exporter = LocalExporter::new();
        let inspector = inspector(tool, Arc::clone(&exporter), None);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let err = inspector
            .inspect(&CacheKey::new("vm1", "snap1"), &target(&["d0", "d1"]), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, InspectError::Cancelled));
        let artifacts = exporter.artifacts();
        assert_eq!(artifacts.len(), 2);
        assert!(artifacts.iter().all(|p| !p.exists()));
        assert_eq!(inspector.cache().volatile_len(), 0);
    }

    #[tokio::test]
    async fn keys_are_cached_independently() {
        let tool = FakeTool::new();
        let runs = Arc::clone(&tool.runs);
        let inspector = inspector(tool, LocalExporter::new(), None);
        let cancel = CancellationToken::new();

        for snapshot in ["snap1", "snap2", "snap1"] {
            inspector
                .inspect(&CacheKey::new("vm1", snapshot), &target(&["d0"]), &cancel)
                .await
                .unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(inspector.cache().volatile_len(), 2);
    }

    #[tokio::test]
    async fn keys_differing_only_by_colon_placement_are_distinct() {
        let tool = FakeTool::new();
        let runs = Arc::clone(&tool.runs);
        let inspector = inspector(tool, LocalExporter::new(), None);
        let cancel = CancellationToken::new();

        let a = CacheKey::new("a:b", "c");
        let b = CacheKey::new("a", "b:c");
        inspector.inspect(&a, &target(&["d0"]), &cancel).await.unwrap();
        assert!(inspector.cache().get(&b).is_none());

        inspector.inspect(&b, &target(&["d0", "d1"]), &cancel).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(inspector.cache().get(&b).unwrap().disks, 2);
        assert_eq!(inspector.cache().get(&a).unwrap().disks, 1);
    }
}
