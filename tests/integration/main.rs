//! Integration tests for shellcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command isolated from the user's config and state directories
    fn shellcache(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("shellcache");
        cmd.env("SHELLCACHE_STATE_DIR", home.path().join("state"))
            .env("SHELLCACHE_CONFIG", home.path().join("config.toml"))
            .env_remove("SHELLCACHE_BUNDLE")
            .env_remove("SHELLCACHE_ORIGIN");
        cmd
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        shellcache(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("activate"))
            .stdout(predicate::str::contains("manifest"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        shellcache(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("shellcache"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        shellcache(&home)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let home = TempDir::new().unwrap();
        shellcache(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[caches]"))
            .stdout(predicate::str::contains("shell-app-cache"));
    }

    #[test]
    fn config_init_writes_file() {
        let home = TempDir::new().unwrap();
        shellcache(&home).args(["config", "init"]).assert().success();
        assert!(home.path().join("config.toml").exists());

        shellcache(&home)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--force"));
    }

    #[test]
    fn manifest_build_fingerprints_directory() {
        let home = TempDir::new().unwrap();
        let web = home.path().join("web");
        std::fs::create_dir_all(web.join("assets")).unwrap();
        std::fs::write(web.join("index.html"), "<html></html>").unwrap();
        std::fs::write(web.join("main.js"), "main()").unwrap();
        std::fs::write(web.join("assets").join("logo.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(web.join(".DS_Store"), "junk").unwrap();
        let out = home.path().join("bundle.json");

        shellcache(&home)
            .args(["manifest", "build"])
            .arg(&web)
            .args(["--core", "main.js,index.html", "--output"])
            .arg(&out)
            .assert()
            .success()
            .stdout(predicate::str::contains("4 resources"));

        let bundle: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        let resources = bundle["resources"].as_object().unwrap();
        assert!(resources.contains_key("/"));
        assert!(resources.contains_key("assets/logo.png"));
        assert!(!resources.contains_key(".DS_Store"));
        assert_eq!(resources["/"], resources["index.html"]);
        assert_eq!(bundle["core"], serde_json::json!(["main.js", "index.html"]));
    }

    #[test]
    fn manifest_build_rejects_unknown_core_key() {
        let home = TempDir::new().unwrap();
        let web = home.path().join("web");
        std::fs::create_dir_all(&web).unwrap();
        std::fs::write(web.join("index.html"), "<html></html>").unwrap();

        shellcache(&home)
            .args(["manifest", "build"])
            .arg(&web)
            .args(["--core", "missing.js", "--output"])
            .arg(home.path().join("bundle.json"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("missing.js"));
    }

    #[test]
    fn status_on_empty_state() {
        let home = TempDir::new().unwrap();
        shellcache(&home)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("absent"));
    }

    #[test]
    fn clear_with_nothing_to_clear() {
        let home = TempDir::new().unwrap();
        shellcache(&home)
            .args(["clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No caches to clear"));
    }

    #[test]
    fn unknown_message_is_ignored() {
        let home = TempDir::new().unwrap();
        shellcache(&home)
            .args(["message", "reload"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ignored"));
    }

    #[test]
    fn activate_without_bundle_fails() {
        let home = TempDir::new().unwrap();
        shellcache(&home)
            .arg("activate")
            .arg("--bundle")
            .arg(home.path().join("nope.json"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Asset bundle not found"));
    }

    #[test]
    fn fetch_rejects_relative_url() {
        let home = TempDir::new().unwrap();
        let bundle = home.path().join("bundle.json");
        std::fs::write(&bundle, r#"{"resources": {"main.js": "m1"}, "core": []}"#).unwrap();

        shellcache(&home)
            .args(["fetch", "main.js", "--bundle"])
            .arg(&bundle)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid URL"));
    }
}

mod lifecycle_tests {
    use async_trait::async_trait;
    use shellcache::events::EventLog;
    use shellcache::fetch::{Method, Request, Response, StaticFetcher};
    use shellcache::manifest::{AssetBundle, Fingerprint, Manifest, ResourceKey};
    use shellcache::router::{FetchOutcome, Origin, ResponseSource};
    use shellcache::store::{CacheNames, CacheStorage, MemoryStorage, NamedCache, Stores};
    use shellcache::worker::{Precache, Worker, WorkerOptions, WorkerState};
    use shellcache::{ShellcacheError, ShellcacheResult};
    use std::sync::{Arc, Mutex};

    const ORIGIN: &str = "https://app.example.com";

    fn key(s: &str) -> ResourceKey {
        ResourceKey::new(s).unwrap()
    }

    fn manifest(pairs: &[(&str, &str)]) -> Manifest {
        pairs
            .iter()
            .map(|(k, v)| (key(k), Fingerprint::new(*v)))
            .collect()
    }

    fn bundle(pairs: &[(&str, &str)], core: &[&str]) -> AssetBundle {
        AssetBundle::new(manifest(pairs), core.iter().map(|k| key(k)).collect()).unwrap()
    }

    /// Fetcher serving `body of /<key>` for every given key
    fn site(keys: &[&str]) -> Arc<StaticFetcher> {
        let fetcher = Arc::new(StaticFetcher::new());
        for k in keys {
            let path = if *k == "/" { "" } else { k };
            fetcher.route(
                &format!("{}/{}", ORIGIN, path),
                Response::ok(format!("body of /{}", path)),
            );
        }
        fetcher
    }

    fn worker(
        bundle: AssetBundle,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<StaticFetcher>,
        precache: Precache,
    ) -> Worker {
        let mut options = WorkerOptions::new(Origin::parse(ORIGIN).unwrap());
        options.precache = precache;
        Worker::new(
            bundle,
            Stores::new(storage, CacheNames::default()),
            fetcher,
            options,
            EventLog::disabled(),
        )
    }

    async fn content_keys(storage: &Arc<dyn CacheStorage>) -> Vec<String> {
        let stores = Stores::new(storage.clone(), CacheNames::default());
        let mut keys = stores.content().await.unwrap().list_keys().await.unwrap();
        keys.sort();
        keys
    }

    async fn seed(storage: &Arc<dyn CacheStorage>, previous: &Manifest, cached: &[&str]) {
        let stores = Stores::new(storage.clone(), CacheNames::default());
        stores
            .manifest_store()
            .await
            .unwrap()
            .save(previous, "previous-worker")
            .await
            .unwrap();
        let content = stores.content().await.unwrap();
        for k in cached {
            content
                .put(&key(k), &Response::ok(format!("old {}", k)))
                .await
                .unwrap();
        }
    }

    /// Storage wrapper that records writes and can fail puts into one cache
    #[derive(Default)]
    struct Recording {
        inner: MemoryStorage,
        ops: Arc<Mutex<Vec<(String, &'static str, String)>>>,
        fail_puts_into: Arc<Mutex<Option<String>>>,
    }

    impl Recording {
        fn ops_on(&self, cache: &str, key: &str) -> Vec<&'static str> {
            self.ops
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _, k)| c == cache && k == key)
                .map(|(_, op, _)| *op)
                .collect()
        }

        fn fail_puts_into(&self, cache: &str) {
            *self.fail_puts_into.lock().unwrap() = Some(cache.to_string());
        }
    }

    struct RecordingCache {
        inner: Arc<dyn NamedCache>,
        ops: Arc<Mutex<Vec<(String, &'static str, String)>>>,
        fail_puts_into: Arc<Mutex<Option<String>>>,
    }

    #[async_trait]
    impl NamedCache for RecordingCache {
        fn name(&self) -> &str {
            self.inner.name()
        }

        async fn get(&self, key: &str) -> ShellcacheResult<Option<Response>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, response: &Response) -> ShellcacheResult<()> {
            let failing = self.fail_puts_into.lock().unwrap().as_deref() == Some(self.name());
            if failing {
                return Err(ShellcacheError::Internal("injected put failure".to_string()));
            }
            self.ops
                .lock()
                .unwrap()
                .push((self.name().to_string(), "put", key.to_string()));
            self.inner.put(key, response).await
        }

        async fn delete(&self, key: &str) -> ShellcacheResult<bool> {
            self.ops
                .lock()
                .unwrap()
                .push((self.name().to_string(), "delete", key.to_string()));
            self.inner.delete(key).await
        }

        async fn keys(&self) -> ShellcacheResult<Vec<String>> {
            self.inner.keys().await
        }
    }

    #[async_trait]
    impl CacheStorage for Recording {
        async fn open(&self, name: &str) -> ShellcacheResult<Arc<dyn NamedCache>> {
            let cache: Arc<dyn NamedCache> = Arc::new(RecordingCache {
                inner: self.inner.open(name).await?,
                ops: self.ops.clone(),
                fail_puts_into: self.fail_puts_into.clone(),
            });
            Ok(cache)
        }

        async fn has(&self, name: &str) -> ShellcacheResult<bool> {
            self.inner.has(name).await
        }

        async fn delete(&self, name: &str) -> ShellcacheResult<bool> {
            self.inner.delete(name).await
        }

        async fn names(&self) -> ShellcacheResult<Vec<String>> {
            self.inner.names().await
        }
    }

    #[tokio::test]
    async fn upgrade_evicts_removed_and_changed_keys() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        seed(
            &storage,
            &manifest(&[("a", "1"), ("b", "2"), ("c", "3")]),
            &["a", "b", "c"],
        )
        .await;

        let w = worker(
            bundle(&[("a", "1"), ("b", "9"), ("d", "4")], &[]),
            storage.clone(),
            site(&["a", "b", "d"]),
            Precache::Core,
        );
        w.install().await.unwrap();
        let report = w.activate().await.unwrap();

        assert!(!report.fresh_install);
        assert_eq!(report.retained, 1);
        assert_eq!(content_keys(&storage).await, vec!["a".to_string()]);

        let stores = Stores::new(storage.clone(), CacheNames::default());
        let committed = stores.manifest_store().await.unwrap().load().await.unwrap();
        assert_eq!(committed, Some(manifest(&[("a", "1"), ("b", "9"), ("d", "4")])));
        assert!(!storage.has("shell-temp-cache").await.unwrap());
    }

    #[tokio::test]
    async fn upgrade_with_complete_precache_restages_shell_and_changes() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        seed(&storage, &manifest(&[("a", "h1"), ("b", "h2")]), &["a", "b"]).await;

        let w = worker(
            bundle(&[("a", "h1"), ("b", "h3"), ("c", "h4")], &["a"]),
            storage.clone(),
            site(&["a", "b", "c"]),
            Precache::Complete,
        );
        let staged: Vec<String> = w
            .staging_keys()
            .await
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(staged, vec!["a", "b", "c"]);

        w.install().await.unwrap();
        let report = w.activate().await.unwrap();
        assert_eq!(report.evicted, vec!["b".to_string()]);
        assert_eq!(report.promoted, 3);
        assert_eq!(content_keys(&storage).await, vec!["a", "b", "c"]);

        let content = Stores::new(storage.clone(), CacheNames::default())
            .content()
            .await
            .unwrap();
        for k in ["a", "b", "c"] {
            let entry = content.get(&key(k)).await.unwrap().unwrap();
            assert_eq!(entry.body, format!("body of /{}", k).into_bytes());
        }
    }

    #[tokio::test]
    async fn first_activation_flushes_stale_content() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let stores = Stores::new(storage.clone(), CacheNames::default());
        stores
            .content()
            .await
            .unwrap()
            .put(&key("legacy.js"), &Response::ok("from an unknown generation"))
            .await
            .unwrap();

        let w = worker(
            bundle(&[("main.js", "m1"), ("index.html", "i1")], &["main.js"]),
            storage.clone(),
            site(&["main.js", "index.html"]),
            Precache::Core,
        );
        w.install().await.unwrap();
        let report = w.activate().await.unwrap();

        assert!(report.fresh_install);
        assert_eq!(content_keys(&storage).await, vec!["main.js".to_string()]);
    }

    #[tokio::test]
    async fn activating_same_bundle_twice_changes_nothing() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let pairs = [("/", "i1"), ("index.html", "i1"), ("main.js", "m1"), ("a.png", "p1")];
        let fetcher = site(&["/", "index.html", "main.js", "a.png"]);

        let first = worker(bundle(&pairs, &["main.js"]), storage.clone(), fetcher.clone(), Precache::Complete);
        first.install().await.unwrap();
        first.activate().await.unwrap();
        let after_first = content_keys(&storage).await;

        let second = worker(bundle(&pairs, &["main.js"]), storage.clone(), fetcher, Precache::Complete);
        second.install().await.unwrap();
        let report = second.activate().await.unwrap();

        assert!(report.evicted.is_empty());
        assert_eq!(content_keys(&storage).await, after_first);
    }

    #[tokio::test]
    async fn complete_precache_caches_every_resource() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        seed(&storage, &manifest(&[("a.png", "p1"), ("b.png", "q1")]), &["a.png"]).await;

        let pairs = [("a.png", "p1"), ("b.png", "q1"), ("c.png", "r1"), ("main.js", "m1")];
        let w = worker(
            bundle(&pairs, &["main.js"]),
            storage.clone(),
            site(&["a.png", "b.png", "c.png", "main.js"]),
            Precache::Complete,
        );

        let staged: Vec<String> = w
            .staging_keys()
            .await
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(staged, vec!["main.js", "b.png", "c.png"]);

        w.install().await.unwrap();
        w.activate().await.unwrap();
        assert_eq!(
            content_keys(&storage).await,
            vec!["a.png", "b.png", "c.png", "main.js"]
        );
    }

    #[tokio::test]
    async fn unchanged_entries_are_not_touched() {
        let recording = Arc::new(Recording::default());
        let storage: Arc<dyn CacheStorage> = recording.clone();
        seed(
            &storage,
            &manifest(&[("keep.png", "k1"), ("main.js", "m1")]),
            &["keep.png", "main.js"],
        )
        .await;
        recording.ops.lock().unwrap().clear();

        let w = worker(
            bundle(&[("keep.png", "k1"), ("main.js", "m2")], &["main.js"]),
            storage.clone(),
            site(&["keep.png", "main.js"]),
            Precache::Core,
        );
        w.install().await.unwrap();
        w.activate().await.unwrap();

        assert!(recording.ops_on("shell-app-cache", "keep.png").is_empty());
        assert_eq!(
            recording.ops_on("shell-app-cache", "main.js"),
            vec!["delete", "put"]
        );
    }

    #[tokio::test]
    async fn failed_promotion_leaves_no_caches() {
        let recording = Arc::new(Recording::default());
        let storage: Arc<dyn CacheStorage> = recording.clone();
        seed(&storage, &manifest(&[("main.js", "m1")]), &["main.js"]).await;

        let w = worker(
            bundle(&[("main.js", "m2")], &["main.js"]),
            storage.clone(),
            site(&["main.js"]),
            Precache::Core,
        );
        w.install().await.unwrap();

        recording.fail_puts_into("shell-app-cache");
        let err = w.activate().await.unwrap_err();

        assert!(matches!(
            err,
            ShellcacheError::Reconciliation { ref stage, .. } if stage == "promote-staging"
        ));
        assert_eq!(w.state(), WorkerState::Redundant);
        for name in CacheNames::default().all() {
            assert!(!storage.has(name).await.unwrap(), "{} survived", name);
        }
    }

    #[tokio::test]
    async fn failed_install_keeps_previous_generation() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        seed(&storage, &manifest(&[("main.js", "m1")]), &["main.js"]).await;

        let offline = site(&[]);
        offline.set_offline(true);
        let w = worker(
            bundle(&[("main.js", "m2")], &["main.js"]),
            storage.clone(),
            offline,
            Precache::Core,
        );

        assert!(w.install().await.is_err());
        assert_eq!(content_keys(&storage).await, vec!["main.js".to_string()]);
        let stores = Stores::new(storage.clone(), CacheNames::default());
        let committed = stores.manifest_store().await.unwrap().load().await.unwrap();
        assert_eq!(committed, Some(manifest(&[("main.js", "m1")])));
    }

    #[tokio::test]
    async fn versioned_root_is_network_first() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let fetcher = site(&["/"]);
        fetcher.route(&format!("{}/?v=3", ORIGIN), Response::ok("fresh shell"));
        let w = worker(
            bundle(&[("/", "i1"), ("index.html", "i1")], &[]),
            storage.clone(),
            fetcher.clone(),
            Precache::Core,
        );

        let request = Request::parse_get(&format!("{}/?v=3", ORIGIN)).unwrap();
        match w.handle_fetch(&request).await.unwrap() {
            FetchOutcome::Respond { response, source } => {
                assert_eq!(source, ResponseSource::Network);
                assert_eq!(response.body, b"fresh shell");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(content_keys(&storage).await, vec!["/".to_string()]);

        fetcher.set_offline(true);
        match w.handle_fetch(&request).await.unwrap() {
            FetchOutcome::Respond { response, source } => {
                assert_eq!(source, ResponseSource::Cache);
                assert_eq!(response.body, b"fresh shell");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn manifest_resources_are_cache_first() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let fetcher = site(&[]);
        fetcher.route(&format!("{}/main.js?v=12", ORIGIN), Response::ok("main()"));
        let w = worker(
            bundle(&[("main.js", "m1")], &[]),
            storage.clone(),
            fetcher.clone(),
            Precache::Core,
        );
        let request = Request::parse_get(&format!("{}/main.js?v=12", ORIGIN)).unwrap();

        let first = w.handle_fetch(&request).await.unwrap();
        assert!(matches!(
            first,
            FetchOutcome::Respond { source: ResponseSource::Network, .. }
        ));

        fetcher.set_offline(true);
        let second = w.handle_fetch(&request).await.unwrap();
        assert!(matches!(
            second,
            FetchOutcome::Respond { source: ResponseSource::Cache, .. }
        ));
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[tokio::test]
    async fn unknown_requests_pass_through() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let fetcher = site(&["main.js"]);
        let w = worker(
            bundle(&[("main.js", "m1")], &[]),
            storage.clone(),
            fetcher.clone(),
            Precache::Core,
        );

        let unknown = Request::parse_get(&format!("{}/api/data", ORIGIN)).unwrap();
        let foreign = Request::parse_get("https://cdn.example.net/main.js").unwrap();
        let post = Request::parse_get(&format!("{}/main.js", ORIGIN))
            .unwrap()
            .with_method(Method::Post);

        for request in [unknown, foreign, post] {
            assert_eq!(
                w.handle_fetch(&request).await.unwrap(),
                FetchOutcome::PassThrough
            );
        }
        assert!(fetcher.requests().is_empty());
        assert!(content_keys(&storage).await.is_empty());
    }
}
