//! Import detection and on-disk resolution.
//!
//! Detection is line-oriented pattern matching, not parsing. It recognises
//! ES module `import`/`export … from`, CommonJS `require(...)` and Python
//! `from X import` / `import X`. It will miss dynamic imports and can report
//! matches inside strings or comments.

use crate::utils::fs::FileStore;
use crate::utils::path::{normalize_path, relative_to};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

lazy_static! {
    static ref ES_IMPORT: Regex = Regex::new(
        r#"^\s*(?:import|export)\s+(?:type\s+)?(?:[\w*$\s{},]+?\s+from\s+)?['"]([^'"]+)['"]"#
    )
    .unwrap();
    static ref ES_FROM_CONTINUATION: Regex =
        Regex::new(r#"^\s*\}\s*from\s+['"]([^'"]+)['"]"#).unwrap();
    static ref REQUIRE: Regex =
        Regex::new(r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap();
    static ref PY_FROM: Regex =
        Regex::new(r"^\s*from\s+(\.+[\w.]*|[A-Za-z_][\w.]*)\s+import\b").unwrap();
    static ref PY_IMPORT: Regex =
        Regex::new(r"^\s*import\s+([A-Za-z_][\w.]*)\s*(?:as\s+\w+\s*)?(?:,|#|$)").unwrap();
}

/// Extensions tried, in order, when a specifier has none
pub const RESOLVE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".py", ".json"];

/// Declaration family an import was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportSyntax {
    EsModule,
    Require,
    PythonFrom,
    PythonImport,
}

/// How a specifier is located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecifierKind {
    /// Starts with `.`; resolved against the importing file's directory
    Relative,
    /// Starts with `/`; resolved against the project root
    RootAbsolute,
    /// External package; never resolved
    Package,
}

/// An import statement as written in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    /// Specifier as declared (Python module paths are kept verbatim)
    pub specifier: String,
    /// Specifier translated to path form
    pub path_specifier: String,
    pub syntax: ImportSyntax,
    pub kind: SpecifierKind,
    /// 1-based line number
    pub line: usize,
}

/// An import resolved to a file on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedImport {
    /// Absolute path of the imported file
    pub target_path: PathBuf,
    pub declared_specifier: String,
    pub kind: SpecifierKind,
    pub syntax: ImportSyntax,
    /// 1-based line number in the importing file
    pub source_line: usize,
}

/// Finds and resolves a file's direct dependencies
pub struct ImportResolver {
    store: Arc<dyn FileStore>,
    extensions: Vec<String>,
}

impl ImportResolver {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self {
            store,
            extensions: RESOLVE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Detect import statements in source order
    pub fn detect_imports(content: &str) -> Vec<ImportStatement> {
        let mut statements = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let line_no = index + 1;

            let es = ES_IMPORT
                .captures(line)
                .or_else(|| ES_FROM_CONTINUATION.captures(line));
            if let Some(caps) = es {
                statements.push(statement(&caps[1], caps[1].to_string(), ImportSyntax::EsModule, line_no));
            } else if let Some(caps) = PY_FROM.captures(line) {
                let path = python_module_to_path(&caps[1]);
                statements.push(statement(&caps[1], path, ImportSyntax::PythonFrom, line_no));
            } else if let Some(caps) = PY_IMPORT.captures(line) {
                let path = python_module_to_path(&caps[1]);
                statements.push(statement(&caps[1], path, ImportSyntax::PythonImport, line_no));
            }

            for caps in REQUIRE.captures_iter(line) {
                statements.push(statement(&caps[1], caps[1].to_string(), ImportSyntax::Require, line_no));
            }
        }

        statements
    }

    /// Detect the imports in `content` and resolve them to files.
    ///
    /// `owner_relative_path` is the importing file's path relative to `root`.
    /// Package imports and specifiers with no matching file are dropped.
    /// Each target appears once, at its first occurrence.
    pub async fn find_imports(
        &self,
        content: &str,
        owner_relative_path: &str,
        root: &Path,
    ) -> Vec<ResolvedImport> {
        let owner_dir = normalize_path(root.join(owner_relative_path))
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf());

        let mut seen = HashSet::new();
        let mut resolved = Vec::new();

        for stmt in Self::detect_imports(content) {
            let base = match stmt.kind {
                SpecifierKind::Package => continue,
                SpecifierKind::Relative => normalize_path(owner_dir.join(&stmt.path_specifier)),
                SpecifierKind::RootAbsolute => {
                    normalize_path(root.join(stmt.path_specifier.trim_start_matches('/')))
                }
            };

            // `from . import x` and `'./'` name a package directory, never a sibling module
            let directory_only = stmt.path_specifier.ends_with('/');
            let Some(target) = self.resolve_candidate(&base, directory_only).await else {
                tracing::debug!(
                    "Unresolved import '{}' in {} (line {})",
                    stmt.specifier,
                    owner_relative_path,
                    stmt.line
                );
                continue;
            };

            if relative_to(&target, root).is_none() {
                tracing::debug!("Import '{}' resolves outside the project", stmt.specifier);
                continue;
            }

            if seen.insert(target.clone()) {
                resolved.push(ResolvedImport {
                    target_path: target,
                    declared_specifier: stmt.specifier,
                    kind: stmt.kind,
                    syntax: stmt.syntax,
                    source_line: stmt.line,
                });
            }
        }

        resolved
    }

    /// Try the literal path, then each extension, then directory index files.
    /// With `directory_only` only the index files are tried.
    async fn resolve_candidate(&self, base: &Path, directory_only: bool) -> Option<PathBuf> {
        if !directory_only {
            if self.is_file(base).await {
                return Some(base.to_path_buf());
            }

            for ext in &self.extensions {
                let mut with_ext = OsString::from(base.as_os_str());
                with_ext.push(ext);
                let candidate = PathBuf::from(with_ext);
                if self.is_file(&candidate).await {
                    return Some(candidate);
                }
            }
        }

        let index_files = self
            .extensions
            .iter()
            .map(|ext| format!("index{}", ext))
            .chain(std::iter::once("__init__.py".to_string()));
        for index in index_files {
            let candidate = base.join(index);
            if self.is_file(&candidate).await {
                return Some(candidate);
            }
        }

        None
    }

    async fn is_file(&self, path: &Path) -> bool {
        self.store.stat(path).await.map(|s| s.is_file).unwrap_or(false)
    }
}

fn statement(specifier: &str, path_specifier: String, syntax: ImportSyntax, line: usize) -> ImportStatement {
    ImportStatement {
        specifier: specifier.to_string(),
        kind: classify(&path_specifier),
        path_specifier,
        syntax,
        line,
    }
}

fn classify(specifier: &str) -> SpecifierKind {
    if specifier.starts_with('.') {
        SpecifierKind::Relative
    } else if specifier.starts_with('/') {
        SpecifierKind::RootAbsolute
    } else {
        SpecifierKind::Package
    }
}

/// Convert a Python module reference to path form.
///
/// `.mod` becomes `./mod`, `..pkg.mod` becomes `../pkg/mod`; absolute module
/// names come back dotted-to-slashed and classify as packages.
fn python_module_to_path(module: &str) -> String {
    let dots = module.chars().take_while(|&c| c == '.').count();
    let rest = module[dots..].replace('.', "/");

    if dots == 0 {
        return rest;
    }

    let mut path = if dots == 1 {
        "./".to_string()
    } else {
        "../".repeat(dots - 1)
    };
    path.push_str(&rest);
    path
}
