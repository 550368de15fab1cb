use editor_context::context::{CacheMode, RelevanceScorer, RelevanceWeights};
use editor_context::utils::text::TRUNCATION_MARKER;
use editor_context::{
    ContextConfig, ContextConfigUpdate, ContextError, ContextManager, LocalFileStore,
    ProjectIndex, WorkspaceIndex,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    index: Arc<WorkspaceIndex>,
    manager: ContextManager,
}

impl Fixture {
    async fn new(files: &[(&str, String)], config: ContextConfig) -> Self {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            write(dir.path(), name, content);
        }
        let index = Arc::new(WorkspaceIndex::default());
        index.load(dir.path()).await.unwrap();
        let manager =
            ContextManager::new(index.clone(), Arc::new(LocalFileStore::new()), config).unwrap();
        Self {
            dir,
            index,
            manager,
        }
    }

    async fn root(&self) -> PathBuf {
        self.index.current_project().await.unwrap().root_path.clone()
    }
}

fn write(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn lines_of(line: &str, count: usize) -> String {
    vec![line; count].join("\n")
}

#[tokio::test]
async fn test_current_file_then_imports() {
    let fixture = Fixture::new(
        &[
            ("a.ts", "import { b } from './b';\nconsole.log(b);".to_string()),
            ("b.ts", "export const b = 1;\nexport default b;".to_string()),
        ],
        ContextConfig::default(),
    )
    .await;

    let collection = fixture
        .manager
        .collect_context("a.ts", None, None)
        .await
        .unwrap();

    assert_eq!(collection.paths(), vec!["a.ts", "b.ts"]);
    assert!(!collection.truncated);
    assert_eq!(collection.total_lines, 4);
    assert_eq!(
        collection.estimated_tokens,
        collection.files.iter().map(|f| f.estimated_tokens).sum::<usize>()
    );
    assert!(collection.summary.starts_with("Context: 2 files\n- a.ts (2 lines)\n- b.ts (2 lines)"));
    assert!(collection.focus.is_none());
}

#[tokio::test]
async fn test_long_file_is_truncated_and_summary_cached() {
    let fixture = Fixture::new(
        &[("x.ts", lines_of(&"a".repeat(100), 1000))],
        ContextConfig {
            max_lines_per_file: 10,
            ..Default::default()
        },
    )
    .await;

    let collection = fixture
        .manager
        .collect_context("x.ts", None, None)
        .await
        .unwrap();

    let file = &collection.files[0];
    assert_eq!(file.lines, 10);
    assert!(file.truncated);
    assert!(collection.truncated);
    assert!(file.content.ends_with(TRUNCATION_MARKER));

    let cached = fixture
        .manager
        .cache()
        .get(&fixture.root().await.join("x.ts"))
        .await;
    assert!(cached.is_some());
    assert_eq!(cached, file.summary);
}

#[tokio::test]
async fn test_bounds_hold_for_large_projects() {
    let mut files = Vec::new();
    for i in 0..12 {
        files.push((format!("src/module{}.ts", i), lines_of("let x = 1;", 30)));
    }
    let files: Vec<(&str, String)> = files.iter().map(|(n, c)| (n.as_str(), c.clone())).collect();

    let config = ContextConfig {
        max_files: 3,
        max_lines_per_file: 5,
        ..Default::default()
    };
    let fixture = Fixture::new(&files, config).await;

    let collection = fixture
        .manager
        .collect_context("src/module4.ts", None, None)
        .await
        .unwrap();

    assert_eq!(collection.files.len(), 3);
    assert_eq!(collection.files[0].path, "src/module4.ts");
    assert!(collection.files.iter().all(|f| f.lines <= 5));
    assert!(collection.total_lines <= 15);
    assert!(collection.truncated);
}

#[tokio::test]
async fn test_current_file_over_budget_is_returned_alone() {
    let fixture = Fixture::new(
        &[
            ("big.ts", lines_of(&"b".repeat(80), 100)),
            ("small.ts", "let s = 1;".to_string()),
        ],
        ContextConfig {
            max_total_tokens: 50,
            ..Default::default()
        },
    )
    .await;

    let collection = fixture
        .manager
        .collect_context("big.ts", None, None)
        .await
        .unwrap();

    assert_eq!(collection.paths(), vec!["big.ts"]);
    assert!(collection.estimated_tokens > 50);
    assert!(collection.truncated);
}

#[tokio::test]
async fn test_token_budget_respected() {
    let fixture = Fixture::new(
        &[
            ("a.ts", "import './b';\nimport './c';".to_string()),
            ("b.ts", lines_of(&"b".repeat(40), 10)),
            ("c.ts", lines_of(&"c".repeat(40), 10)),
            ("d.ts", lines_of(&"d".repeat(40), 10)),
        ],
        ContextConfig {
            max_total_tokens: 150,
            ..Default::default()
        },
    )
    .await;

    let collection = fixture
        .manager
        .collect_context("a.ts", None, None)
        .await
        .unwrap();

    assert!(collection.estimated_tokens <= 150);
    assert_eq!(collection.paths(), vec!["a.ts", "b.ts"]);
    assert!(collection.truncated);
}

#[tokio::test]
async fn test_first_import_breach_halts_import_phase() {
    let fixture = Fixture::new(
        &[
            ("a.ts", "import { big } from './big';\nimport { s } from './small';".to_string()),
            ("big.ts", lines_of(&"x".repeat(100), 200)),
            ("small.ts", "export const s = 1;".to_string()),
        ],
        ContextConfig {
            max_total_tokens: 1000,
            ..Default::default()
        },
    )
    .await;

    let collection = fixture
        .manager
        .collect_context("a.ts", None, None)
        .await
        .unwrap();

    // small.ts is not loaded as an import, only ranked in afterwards
    assert_eq!(collection.paths(), vec!["a.ts", "small.ts"]);
    assert_eq!(collection.files[1].relevance_score, 14.0);
    assert!(collection.truncated);
}

#[tokio::test]
async fn test_related_files_ranked_by_score_then_path() {
    let fixture = Fixture::new(
        &[
            ("src/app.ts", "export const app = 1;".to_string()),
            ("src/app.test.ts", "test('app', () => {});".to_string()),
            ("src/util.ts", "export const u = 1;".to_string()),
            ("src/style.css", "body {}".to_string()),
            ("lib/other.ts", "export const o = 1;".to_string()),
        ],
        ContextConfig::default(),
    )
    .await;

    let collection = fixture
        .manager
        .collect_context("src/app.ts", None, None)
        .await
        .unwrap();

    assert_eq!(
        collection.paths(),
        vec!["src/app.ts", "src/app.test.ts", "src/util.ts", "src/style.css", "lib/other.ts"]
    );
    let scores: Vec<f64> = collection.files[1..].iter().map(|f| f.relevance_score).collect();
    assert_eq!(scores, vec![21.0, 14.0, 11.0, 4.0]);
}

#[tokio::test]
async fn test_python_relative_imports() {
    let fixture = Fixture::new(
        &[
            ("pkg/main.py", "import os\nfrom .helpers import tool\n".to_string()),
            ("pkg/helpers.py", "def tool():\n    pass\n".to_string()),
        ],
        ContextConfig {
            max_files: 2,
            ..Default::default()
        },
    )
    .await;

    let collection = fixture
        .manager
        .collect_context("pkg/main.py", None, None)
        .await
        .unwrap();

    assert_eq!(collection.paths(), vec!["pkg/main.py", "pkg/helpers.py"]);
    assert_eq!(collection.files[1].relevance_score, 50.0);
}

#[tokio::test]
async fn test_collection_is_deterministic() {
    let fixture = Fixture::new(
        &[
            ("src/a.ts", "import './b';".to_string()),
            ("src/b.ts", lines_of("b", 300)),
            ("src/c.ts", "c".to_string()),
            ("src/d.ts", "d".to_string()),
            ("src/e.ts", "e".to_string()),
            ("src/f.ts", "f".to_string()),
        ],
        ContextConfig::default(),
    )
    .await;

    let first = fixture
        .manager
        .collect_context("src/a.ts", Some("import"), Some(1))
        .await
        .unwrap();
    let second = fixture
        .manager
        .collect_context("src/a.ts", Some("import"), Some(1))
        .await
        .unwrap();

    assert_eq!(first.files, second.files);
    assert_eq!(first.summary, second.summary);
    assert_eq!(first.estimated_tokens, second.estimated_tokens);
    assert!(first.summary.contains("Focus: cursor at line 1"));
}

#[tokio::test]
async fn test_warm_call_hits_cache() {
    let fixture = Fixture::new(
        &[("x.ts", lines_of(&"a".repeat(100), 1000))],
        ContextConfig {
            max_lines_per_file: 10,
            ..Default::default()
        },
    )
    .await;

    let cold = fixture
        .manager
        .collect_context("x.ts", None, None)
        .await
        .unwrap();
    let after_cold = fixture.manager.get_cache_metrics().await;
    assert_eq!(after_cold.hits, 0);
    assert_eq!(after_cold.misses, 1);
    assert_eq!(after_cold.total_entries, 1);

    let warm = fixture
        .manager
        .collect_context("x.ts", None, None)
        .await
        .unwrap();
    let after_warm = fixture.manager.get_cache_metrics().await;
    assert_eq!(after_warm.hits, 1);
    assert_eq!(after_warm.misses, 1);
    assert_eq!(after_warm.hit_rate, 0.5);
    assert_eq!(cold.files[0].summary, warm.files[0].summary);
}

#[tokio::test]
async fn test_modified_file_misses_cache() {
    let fixture = Fixture::new(
        &[("x.ts", lines_of(&"a".repeat(100), 1000))],
        ContextConfig {
            max_lines_per_file: 10,
            ..Default::default()
        },
    )
    .await;

    let before = fixture
        .manager
        .collect_context("x.ts", None, None)
        .await
        .unwrap();

    write(fixture.dir.path(), "x.ts", &lines_of(&"b".repeat(90), 1200));

    let after = fixture
        .manager
        .collect_context("x.ts", None, None)
        .await
        .unwrap();

    let metrics = fixture.manager.get_cache_metrics().await;
    assert_eq!(metrics.hits, 0);
    assert_eq!(metrics.misses, 2);
    assert_ne!(before.files[0].content, after.files[0].content);
    assert_ne!(before.files[0].summary, after.files[0].summary);
}

#[tokio::test]
async fn test_invalidate_and_clear_cache() {
    let fixture = Fixture::new(
        &[("x.ts", lines_of("a", 500))],
        ContextConfig::default(),
    )
    .await;

    fixture.manager.collect_context("x.ts", None, None).await.unwrap();
    assert_eq!(fixture.manager.get_cache_metrics().await.total_entries, 1);

    assert_eq!(fixture.manager.invalidate_cache("x.ts").await.unwrap(), 1);
    assert_eq!(fixture.manager.get_cache_metrics().await.total_entries, 0);

    fixture.manager.collect_context("x.ts", None, None).await.unwrap();
    fixture.manager.clear_cache().await.unwrap();
    let metrics = fixture.manager.get_cache_metrics().await;
    assert_eq!(metrics.total_entries, 0);
    assert_eq!(metrics.misses, 0);
}

#[tokio::test]
async fn test_excluded_files_never_returned() {
    let fixture = Fixture::new(
        &[
            (
                "a.js",
                "import './node_modules/lib/index';\nimport './app.min';\nrequire('./vendor.bundle');"
                    .to_string(),
            ),
            ("node_modules/lib/index.js", "module.exports = 1;".to_string()),
            ("app.min.js", "x".to_string()),
            ("vendor.bundle.js", "x".to_string()),
            ("debug.log", "x".to_string()),
            ("a.js.map", "{}".to_string()),
            ("b.js", "x".to_string()),
        ],
        ContextConfig {
            max_files: 10,
            ..Default::default()
        },
    )
    .await;

    let collection = fixture
        .manager
        .collect_context("a.js", None, None)
        .await
        .unwrap();

    assert_eq!(collection.paths(), vec!["a.js", "b.js"]);
}

#[tokio::test]
async fn test_cache_directory_never_returned() {
    let fixture = Fixture::new(
        &[("x.ts", lines_of("a", 500)), ("y.ts", "y".to_string())],
        ContextConfig {
            max_files: 10,
            ..Default::default()
        },
    )
    .await;

    fixture.manager.collect_context("x.ts", None, None).await.unwrap();
    // rescan so the cache entries are part of the project
    fixture.index.load(fixture.dir.path()).await.unwrap();
    let project = fixture.index.current_project().await.unwrap();
    assert!(project.files.iter().any(|f| f.extension == "json"));

    let collection = fixture
        .manager
        .collect_context("x.ts", None, None)
        .await
        .unwrap();
    assert_eq!(collection.paths(), vec!["x.ts", "y.ts"]);
}

#[tokio::test]
async fn test_excluded_current_file_gives_empty_collection() {
    let fixture = Fixture::new(
        &[("server.log", "line".to_string())],
        ContextConfig::default(),
    )
    .await;

    let collection = fixture
        .manager
        .collect_context("server.log", None, None)
        .await
        .unwrap();
    assert!(collection.is_empty());
    assert!(!collection.truncated);
}

#[tokio::test]
async fn test_zero_max_files_selects_nothing() {
    let fixture = Fixture::new(
        &[("a.ts", "a".to_string())],
        ContextConfig {
            max_files: 0,
            ..Default::default()
        },
    )
    .await;

    let collection = fixture
        .manager
        .collect_context("a.ts", None, None)
        .await
        .unwrap();
    assert!(collection.is_empty());
    assert!(collection.truncated);
}

#[tokio::test]
async fn test_missing_current_file_is_not_found() {
    let fixture = Fixture::new(&[("a.ts", "a".to_string())], ContextConfig::default()).await;

    let err = fixture
        .manager
        .collect_context("missing.ts", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ContextError::FileNotFound { .. }));
}

#[tokio::test]
async fn test_absolute_current_path_is_accepted() {
    let fixture = Fixture::new(&[("src/a.ts", "a".to_string())], ContextConfig::default()).await;
    let absolute = fixture.root().await.join("src/a.ts");

    let collection = fixture
        .manager
        .collect_context(&absolute, None, None)
        .await
        .unwrap();
    assert_eq!(collection.files[0].path, "src/a.ts");
}

#[tokio::test]
async fn test_concurrent_collections_agree() {
    let fixture = Fixture::new(
        &[
            ("a.ts", "import './b';".to_string()),
            ("b.ts", lines_of("b", 400)),
            ("c.ts", "c".to_string()),
        ],
        ContextConfig::default(),
    )
    .await;

    let (first, second) = tokio::join!(
        fixture.manager.collect_context("a.ts", None, None),
        fixture.manager.collect_context("a.ts", None, None),
    );
    assert_eq!(first.unwrap().files, second.unwrap().files);
}

#[tokio::test]
async fn test_cache_in_project_root_is_rejected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.ts", "a");
    write(dir.path(), "package.json", "{\"name\":\"app\"}");
    write(dir.path(), "tsconfig.json", "{}");
    let index = Arc::new(WorkspaceIndex::default());
    index.load(dir.path()).await.unwrap();

    for cache_directory in [".", "./", "sub/.."] {
        let config = ContextConfig {
            cache_directory: PathBuf::from(cache_directory),
            ..Default::default()
        };
        let err = ContextManager::new(index.clone(), Arc::new(LocalFileStore::new()), config)
            .err()
            .unwrap();
        assert_eq!(err.category(), "config", "{} should be rejected", cache_directory);
    }

    let manager = ContextManager::new(
        index.clone(),
        Arc::new(LocalFileStore::new()),
        ContextConfig::default(),
    )
    .unwrap();
    let update = ContextConfigUpdate {
        cache_directory: Some(PathBuf::from(".")),
        ..Default::default()
    };
    assert!(manager.update_config(update).await.is_err());

    manager.collect_context("a.ts", None, None).await.unwrap();
    assert!(dir.path().join("package.json").exists());
    assert!(dir.path().join("tsconfig.json").exists());
}

#[tokio::test]
async fn test_unrelated_files_still_fill_free_slots() {
    let fixture = Fixture::new(
        &[
            ("src/a.ts", "let a = 1;".to_string()),
            ("docs/notes.md", lines_of(&"n".repeat(80), 150)),
        ],
        ContextConfig::default(),
    )
    .await;

    let collection = fixture
        .manager
        .collect_context("src/a.ts", None, None)
        .await
        .unwrap();

    assert_eq!(collection.paths(), vec!["src/a.ts", "docs/notes.md"]);
    assert_eq!(collection.files[1].relevance_score, 0.0);
    assert!(!collection.truncated);
}

#[tokio::test]
async fn test_blocked_cache_directory_still_collects() {
    let fixture = Fixture::new(
        &[
            (".context-cache", "a file where the cache directory should be".to_string()),
            ("x.ts", lines_of("a", 500)),
        ],
        ContextConfig::default(),
    )
    .await;

    for _ in 0..2 {
        let collection = fixture
            .manager
            .collect_context("x.ts", None, None)
            .await
            .unwrap();
        assert_eq!(collection.paths(), vec!["x.ts"]);
        assert!(collection.files[0].truncated);
        assert!(collection.files[0].summary.is_some());
    }

    assert!(matches!(
        fixture.manager.cache().mode().await,
        CacheMode::PassThrough { .. }
    ));
    let metrics = fixture.manager.get_cache_metrics().await;
    assert_eq!(metrics.hits, 0);
    assert_eq!(metrics.misses, 2);
    assert_eq!(metrics.total_entries, 0);
    assert!(fixture.dir.path().join(".context-cache").is_file());
}

#[tokio::test]
async fn test_custom_scorer_changes_ranking() {
    let files = [
        ("src/app.ts", "export const app = 1;".to_string()),
        ("src/style.css", "body {}".to_string()),
        ("lib/other.ts", "export const o = 1;".to_string()),
    ];
    let dir = TempDir::new().unwrap();
    for (name, content) in &files {
        write(dir.path(), name, content);
    }
    let index = Arc::new(WorkspaceIndex::default());
    index.load(dir.path()).await.unwrap();

    let weights = RelevanceWeights {
        same_extension: 50.0,
        ..Default::default()
    };
    let manager = ContextManager::new(index, Arc::new(LocalFileStore::new()), ContextConfig::default())
        .unwrap()
        .with_scorer(RelevanceScorer::new(weights));

    let collection = manager.collect_context("src/app.ts", None, None).await.unwrap();
    assert_eq!(collection.paths(), vec!["src/app.ts", "lib/other.ts", "src/style.css"]);
    assert_eq!(collection.files[1].relevance_score, 51.0);
}
