use parexec::engine::{FileDigest, HashHelper, TaskHelper, hash_file};
use parexec::utils::{
    FDS_PER_WORKER, PackagePaths, TimeoutConsts, apply_file_to_opts, batch_timeout,
    load_parexec_toml, parse_parexec_toml, pool_cap_for,
};
use parexec::{ExecutorOpts, NameMatcher, ResultMap, TaskError};
use std::path::{Path, PathBuf};
use std::time::Duration;

// --- NameMatcher ---

#[test]
fn test_glob_matches_file_name_only() {
    let m = NameMatcher::new("glob:*.csv").unwrap();
    assert!(m.matches(Path::new("/data/2024/prices.csv")));
    assert!(m.matches(Path::new("prices.csv")));
    assert!(!m.matches(Path::new("/data/prices.csv.gz")));
    assert!(!m.matches(Path::new("/data.csv/readme.txt")));
}

#[test]
fn test_glob_alternatives_and_classes() {
    let m = NameMatcher::new("glob:{a,b}[0-9].txt").unwrap();
    assert!(m.matches(Path::new("a1.txt")));
    assert!(m.matches(Path::new("dir/b7.txt")));
    assert!(!m.matches(Path::new("c1.txt")));
}

#[test]
fn test_regex_matches_whole_name() {
    let m = NameMatcher::new("regex:[a-z]+\\.log").unwrap();
    assert!(m.matches(Path::new("/var/app.log")));
    assert!(!m.matches(Path::new("/var/app.log.1")));
    assert!(!m.matches(Path::new("/var/APP.log")));
}

#[test]
fn test_syntax_is_case_insensitive() {
    assert!(NameMatcher::new("GLOB:*.rs").is_ok());
    assert!(NameMatcher::new("Regex:.*").is_ok());
}

#[test]
fn test_pattern_errors() {
    assert!(matches!(
        NameMatcher::new("no-syntax"),
        Err(TaskError::MissingSyntax(_))
    ));
    assert!(matches!(
        NameMatcher::new("shell:*.sh"),
        Err(TaskError::UnsupportedSyntax(s)) if s == "shell"
    ));
    assert!(matches!(
        NameMatcher::new("regex:a(b"),
        Err(TaskError::InvalidPattern { .. })
    ));
}

#[test]
fn test_path_without_file_name_never_matches() {
    let m = NameMatcher::new("glob:*").unwrap();
    assert!(!m.matches(Path::new("/")));
    assert!(!m.matches(Path::new("..")));
}

// --- ResultMap ---

#[test]
fn test_result_map_keeps_insertion_order() {
    let mut map = ResultMap::default();
    map.insert("c", 3);
    map.insert("a", 1);
    map.insert("b", 2);
    let keys: Vec<&str> = map.keys().copied().collect();
    assert_eq!(keys, vec!["c", "a", "b"]);
}

#[test]
fn test_result_map_overwrites_in_place() {
    let mut map = ResultMap::with_capacity(2);
    assert_eq!(map.insert(1, "one"), None);
    map.insert(2, "two");
    assert_eq!(map.insert(1, "uno"), Some("one"));

    assert_eq!(map.len(), 2);
    assert_eq!(map.get(&1), Some(&"uno"));
    let pairs: Vec<(i32, &str)> = map.into_iter().collect();
    assert_eq!(pairs, vec![(1, "uno"), (2, "two")]);
}

#[test]
fn test_result_map_lookup() {
    let mut map = ResultMap::default();
    assert!(map.is_empty());
    map.insert(PathBuf::from("x"), 1.5);
    assert!(map.contains_key(&PathBuf::from("x")));
    assert!(!map.contains_key(&PathBuf::from("y")));
    assert_eq!(map.iter().count(), 1);
    assert_eq!(map.values().sum::<f64>(), 1.5);
}

// --- config ---

#[test]
fn test_batch_timeout_scales_and_caps() {
    let per = Duration::from_millis(100);
    assert_eq!(batch_timeout(per, 3, Duration::from_secs(60)), Duration::from_millis(300));
    assert_eq!(batch_timeout(per, 10_000, Duration::from_secs(60)), Duration::from_secs(60));
    assert_eq!(
        batch_timeout(Duration::MAX, usize::MAX, Duration::from_secs(1)),
        Duration::from_secs(1)
    );
}

#[test]
fn test_pool_cap_from_fd_limit() {
    // 80% of 1024 descriptors, four per worker
    assert_eq!(pool_cap_for(1024), 819 / FDS_PER_WORKER);
    assert_eq!(pool_cap_for(3), 1);
    assert_eq!(pool_cap_for(0), 1);
    assert!(pool_cap_for(u64::MAX) > 1);
}

#[test]
fn test_default_opts() {
    let opts = ExecutorOpts::default();
    assert_eq!(opts.num_threads, None);
    assert_eq!(opts.per_task_timeout, Duration::from_millis(32_767));
    assert_eq!(opts.batch_timeout(2), Duration::from_millis(65_534));
    assert_eq!(opts.batch_timeout(1_000_000), TimeoutConsts::MAX_BATCH);
    assert!(!opts.follow_links);
}

#[test]
fn test_config_filename() {
    assert_eq!(PackagePaths::get().config_filename(), ".parexec.toml");
    assert_eq!(PackagePaths::get().pkg_name(), "parexec");
}

#[test]
fn test_toml_settings_applied() {
    let file = parse_parexec_toml(
        r#"
        [settings]
        pattern = "glob:*.csv"
        threads = 3
        per_task_timeout_ms = 250
        follow_links = true
        "#,
    )
    .unwrap();
    let mut opts = ExecutorOpts::default();
    apply_file_to_opts(&file, &mut opts);

    assert_eq!(file.pattern(), Some("glob:*.csv"));
    assert_eq!(opts.num_threads, Some(3));
    assert_eq!(opts.per_task_timeout, Duration::from_millis(250));
    assert!(opts.follow_links);
    // untouched fields keep their defaults
    assert_eq!(opts.shutdown_timeout, TimeoutConsts::SHUTDOWN);
}

#[test]
fn test_toml_missing_or_invalid() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_parexec_toml(dir.path()).is_none());

    std::fs::write(dir.path().join(".parexec.toml"), "[settings]\nthreads = \"many\"\n").unwrap();
    assert!(load_parexec_toml(dir.path()).is_none());

    std::fs::write(dir.path().join(".parexec.toml"), "[settings]\nverbose = true\n").unwrap();
    let file = load_parexec_toml(dir.path()).unwrap();
    assert_eq!(file.verbose(), Some(true));
    assert_eq!(file.pattern(), None);
}

// --- hashing ---

#[test]
fn test_hash_file_matches_blake3() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    std::fs::write(&path, b"parallel").unwrap();

    let hash = hash_file(&path).unwrap();
    assert_eq!(hash, *blake3::hash(b"parallel").as_bytes());

    let digest = FileDigest {
        path: path.clone(),
        hash,
    };
    assert_eq!(digest.to_hex(), blake3::hash(b"parallel").to_hex().as_str());
    assert_eq!(digest.to_hex().len(), 64);
    assert!(digest.to_string().ends_with(&format!("  {}", path.display())));
}

#[test]
fn test_hash_helper_task() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x.txt");
    std::fs::write(&path, "abc").unwrap();

    let task = HashHelper.new_task(&path).unwrap();
    let digest = task().unwrap().unwrap();
    assert_eq!(digest.hash, *blake3::hash(b"abc").as_bytes());

    let missing = HashHelper.new_task(&dir.path().join("missing")).unwrap();
    assert!(missing().is_err());
}
