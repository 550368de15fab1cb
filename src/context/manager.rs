//! Context manager: assembles a bounded context collection for a request

use super::cache::{CacheMetrics, FingerprintCache, SweepHandle};
use super::exclusion::ExclusionFilter;
use super::imports::ImportResolver;
use super::loader::FileLoader;
use super::relevance::{RelevanceScorer, ScoringAnchor};
use super::{ContextCollection, ContextFile, FocusHint};
use crate::config::{ContextConfig, ContextConfigUpdate};
use crate::project::{ProjectFile, ProjectIndex, ProjectSnapshot};
use crate::utils::errors::ContextError;
use crate::utils::fs::FileStore;
use crate::utils::path::{normalize_path, relative_to, resolve_in_root, to_slash};
use crate::utils::text::truncate;
use crate::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Relevance recorded for the current file
pub const CURRENT_FILE_SCORE: f64 = 100.0;
/// Relevance recorded for directly imported files
pub const IMPORT_SCORE: f64 = 50.0;

/// A request for context around one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextRequest {
    /// Absolute, or relative to the project root
    pub file_path: PathBuf,
    pub selected_text: Option<String>,
    /// 1-based cursor line
    pub cursor_line: Option<usize>,
}

impl ContextRequest {
    pub fn new<P: Into<PathBuf>>(file_path: P) -> Self {
        Self {
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    pub fn with_selection<S: Into<String>>(mut self, selected_text: S) -> Self {
        self.selected_text = Some(selected_text.into());
        self
    }

    pub fn with_cursor_line(mut self, line: usize) -> Self {
        self.cursor_line = Some(line);
        self
    }

    fn focus(&self) -> Option<FocusHint> {
        let focus = FocusHint {
            selected_text: self.selected_text.clone(),
            cursor_line: self.cursor_line,
        };
        (!focus.is_empty()).then_some(focus)
    }
}

/// Configuration snapshot plus its compiled exclusion filter
struct EngineSettings {
    config: ContextConfig,
    filter: Arc<ExclusionFilter>,
}

impl EngineSettings {
    fn compile(config: ContextConfig) -> Result<Self> {
        let mut patterns = config.exclude_patterns.clone();
        // the cache directory and anything under it; validation rules out an empty path
        let cache_dir = to_slash(normalize_path(&config.cache_directory));
        patterns.push(format!("{}{{,/**}}", cache_dir));
        let filter = Arc::new(ExclusionFilter::new(&patterns)?);
        Ok(Self { config, filter })
    }
}

/// Builds context collections and owns the summary cache's lifecycle.
///
/// `collect_context` may run concurrently; each run works from one
/// configuration snapshot and one project snapshot.
pub struct ContextManager {
    project_index: Arc<dyn ProjectIndex>,
    store: Arc<dyn FileStore>,
    cache: Arc<FingerprintCache>,
    resolver: ImportResolver,
    scorer: RelevanceScorer,
    settings: RwLock<Arc<EngineSettings>>,
    /// Serializes cache enable/disable and owns the sweep task
    sweeper: Mutex<Option<SweepHandle>>,
}

impl ContextManager {
    /// Create a context manager with its own summary cache
    pub fn new(
        project_index: Arc<dyn ProjectIndex>,
        store: Arc<dyn FileStore>,
        config: ContextConfig,
    ) -> Result<Self> {
        let cache = Arc::new(FingerprintCache::new(Arc::clone(&store)));
        Self::with_cache(project_index, store, cache, config)
    }

    /// Create a context manager around an existing cache
    pub fn with_cache(
        project_index: Arc<dyn ProjectIndex>,
        store: Arc<dyn FileStore>,
        cache: Arc<FingerprintCache>,
        config: ContextConfig,
    ) -> Result<Self> {
        config.validate()?;
        let settings = EngineSettings::compile(config)?;

        Ok(Self {
            project_index,
            resolver: ImportResolver::new(Arc::clone(&store)),
            store,
            cache,
            scorer: RelevanceScorer::default(),
            settings: RwLock::new(Arc::new(settings)),
            sweeper: Mutex::new(None),
        })
    }

    /// Use custom relevance weights
    pub fn with_scorer(mut self, scorer: RelevanceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Assemble context for `current_file_path`
    pub async fn collect_context<P: AsRef<Path>>(
        &self,
        current_file_path: P,
        selected_text: Option<&str>,
        cursor_line: Option<usize>,
    ) -> Result<ContextCollection> {
        let request = ContextRequest {
            file_path: current_file_path.as_ref().to_path_buf(),
            selected_text: selected_text.map(str::to_string),
            cursor_line,
        };
        self.collect_context_with_cancel(&request, &CancellationToken::new())
            .await
    }

    /// Assemble context, checking `cancel` between file operations
    pub async fn collect_context_with_cancel(
        &self,
        request: &ContextRequest,
        cancel: &CancellationToken,
    ) -> Result<ContextCollection> {
        let project = self
            .project_index
            .current_project()
            .await
            .ok_or(ContextError::NoProjectLoaded)?;
        let settings = Arc::clone(&*self.settings.read().await);
        let config = &settings.config;
        let root = project.root_path.as_path();

        if config.enable_caching {
            self.ensure_cache(root, config).await;
        }

        let mut run = Assembly::new(config, request.focus());
        if config.max_files == 0 {
            run.truncated = true;
            return Ok(run.finish());
        }

        let current_path = resolve_in_root(&request.file_path, root);
        let relative = relative_to(&current_path, root)
            .ok_or_else(|| ContextError::file_not_found(&current_path))?;

        if let Some(pattern) = settings.filter.matching_pattern(&relative) {
            tracing::debug!("Current file {} excluded by '{}'", relative, pattern);
            return Ok(run.finish());
        }

        let loader = FileLoader::new(
            Arc::clone(&self.store),
            Arc::clone(&self.cache),
            Arc::clone(&settings.filter),
            config.max_lines_per_file,
        );

        check_cancelled(cancel, "load current file")?;
        let mut current = loader
            .load(&current_path, root)
            .await?
            .ok_or_else(|| ContextError::file_not_found(&current_path))?;
        current.relevance_score = CURRENT_FILE_SCORE;

        let import_source = config.include_imports.then(|| current.content.clone());
        let over_budget = current.estimated_tokens > config.max_total_tokens;
        run.push(current);

        if over_budget {
            tracing::debug!("Current file {} alone exceeds the token budget", relative);
            run.truncated = true;
            return Ok(run.finish());
        }

        if let Some(source) = import_source {
            self.add_imports(&mut run, &loader, &source, &relative, root, &settings, cancel)
                .await?;
        }

        if run.files.len() < config.max_files {
            self.add_related(&mut run, &loader, &project, &relative, &settings, cancel)
                .await?;
        }

        let collection = run.finish();
        tracing::debug!(
            "Collected {} files ({} lines, ~{} tokens) for {}",
            collection.files.len(),
            collection.total_lines,
            collection.estimated_tokens,
            relative
        );
        Ok(collection)
    }

    #[allow(clippy::too_many_arguments)]
    async fn add_imports(
        &self,
        run: &mut Assembly<'_>,
        loader: &FileLoader,
        source: &str,
        relative: &str,
        root: &Path,
        settings: &EngineSettings,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancelled(cancel, "resolve imports")?;
        let imports = self.resolver.find_imports(source, relative, root).await;

        for import in imports {
            check_cancelled(cancel, "load imports")?;

            let Some(target) = relative_to(&import.target_path, root) else {
                continue;
            };
            if run.contains(&target) || settings.filter.is_excluded(&target) {
                continue;
            }
            if !run.has_slot() {
                run.truncated = true;
                break;
            }

            let mut file = match loader.load(&import.target_path, root).await {
                Ok(Some(file)) => file,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Skipping import {}: {}", target, e);
                    continue;
                }
            };

            if !run.fits(&file) {
                tracing::debug!("Import {} does not fit the remaining budget", target);
                run.truncated = true;
                break;
            }

            file.relevance_score = IMPORT_SCORE;
            run.push(file);
        }

        Ok(())
    }

    async fn add_related(
        &self,
        run: &mut Assembly<'_>,
        loader: &FileLoader,
        project: &ProjectSnapshot,
        relative: &str,
        settings: &EngineSettings,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let anchor = ScoringAnchor::from_relative_path(relative);

        let mut candidates: Vec<(f64, String, &ProjectFile)> = project
            .files
            .iter()
            .filter_map(|file| {
                let rel = project.relative_path(&file.path)?;
                if run.contains(&rel) || settings.filter.is_excluded(&rel) {
                    return None;
                }
                Some((self.scorer.score(file, &rel, &anchor), rel, file))
            })
            .collect();

        candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        for (score, rel, candidate) in candidates {
            check_cancelled(cancel, "load related files")?;

            if !run.has_slot() {
                run.truncated = true;
                break;
            }

            let mut file = match loader.load(&candidate.path, &project.root_path).await {
                Ok(Some(file)) => file,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Skipping related file {}: {}", rel, e);
                    continue;
                }
            };

            if !run.fits(&file) {
                tracing::debug!("Related file {} does not fit the remaining budget", rel);
                run.truncated = true;
                break;
            }

            file.relevance_score = score;
            run.push(file);
        }

        Ok(())
    }

    /// Apply a partial configuration update.
    ///
    /// Invalid updates are rejected and the previous configuration stays in
    /// effect.
    pub async fn update_config(&self, update: ContextConfigUpdate) -> Result<ContextConfig> {
        let mut sweeper = self.sweeper.lock().await;

        let previous = self.settings.read().await.config.clone();
        let next = previous.apply(&update)?;
        let settings = EngineSettings::compile(next.clone())?;
        *self.settings.write().await = Arc::new(settings);

        if !next.enable_caching {
            if previous.enable_caching {
                if let Some(handle) = sweeper.take() {
                    handle.stop().await;
                }
                self.cache.disable().await;
            }
        } else {
            let rebind = !previous.enable_caching
                || previous.cache_directory != next.cache_directory
                || previous.cache_max_age != next.cache_max_age;

            if rebind {
                if let Some(handle) = sweeper.take() {
                    handle.stop().await;
                }
                match self.project_index.current_project().await {
                    Some(project) => {
                        self.bind_cache(&mut sweeper, &project.root_path, &next).await;
                    }
                    // rebound on the next collection
                    None => self.cache.disable().await,
                }
            } else if previous.cache_cleanup_interval != next.cache_cleanup_interval {
                if let Some(handle) = sweeper.take() {
                    handle.stop().await;
                    *sweeper = Some(self.cache.spawn_sweeper(next.cache_cleanup_interval));
                }
            }
        }

        tracing::info!("Context configuration updated");
        Ok(next)
    }

    /// Snapshot of the current configuration
    pub async fn get_config(&self) -> ContextConfig {
        self.settings.read().await.config.clone()
    }

    pub async fn get_cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics().await
    }

    /// Delete every cache entry and reset the metrics
    pub async fn clear_cache(&self) -> Result<()> {
        self.bind_cache_for_current_project().await;
        self.cache.clear_all().await;
        Ok(())
    }

    /// Drop cached summaries for one file; returns how many entries went
    pub async fn invalidate_cache<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        self.bind_cache_for_current_project().await;
        let path = match self.project_index.current_project().await {
            Some(project) => resolve_in_root(path, &project.root_path),
            None => normalize_path(path),
        };
        Ok(self.cache.invalidate(&path).await)
    }

    /// Run a cache sweep now; returns how many entries were evicted
    pub async fn sweep_cache(&self) -> usize {
        self.bind_cache_for_current_project().await;
        self.cache.sweep().await
    }

    /// Stop the sweep task and release the in-memory cache. Idempotent.
    pub async fn cleanup(&self) {
        let mut sweeper = self.sweeper.lock().await;
        if let Some(handle) = sweeper.take() {
            handle.stop().await;
        }
        self.cache.disable().await;
        tracing::debug!("Context manager cleaned up");
    }

    /// The shared summary cache
    pub fn cache(&self) -> &Arc<FingerprintCache> {
        &self.cache
    }

    async fn bind_cache_for_current_project(&self) {
        let config = self.settings.read().await.config.clone();
        if !config.enable_caching {
            return;
        }
        if let Some(project) = self.project_index.current_project().await {
            self.ensure_cache(&project.root_path, &config).await;
        }
    }

    /// Bind the cache to `<root>/<cache_directory>` unless already bound there
    async fn ensure_cache(&self, root: &Path, config: &ContextConfig) {
        let wanted = root.join(&config.cache_directory);
        if self.cache.mode().await.directory() == Some(wanted.as_path()) {
            return;
        }

        let mut sweeper = self.sweeper.lock().await;
        // another run may have bound it while we waited
        if self.cache.mode().await.directory() == Some(wanted.as_path()) {
            return;
        }
        if let Some(handle) = sweeper.take() {
            handle.stop().await;
        }
        self.bind_cache(&mut sweeper, root, config).await;
    }

    async fn bind_cache(
        &self,
        sweeper: &mut Option<SweepHandle>,
        root: &Path,
        config: &ContextConfig,
    ) {
        self.cache
            .enable(root.join(&config.cache_directory), config.cache_max_age)
            .await;
        *sweeper = Some(self.cache.spawn_sweeper(config.cache_cleanup_interval));
    }
}

fn check_cancelled(cancel: &CancellationToken, operation: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ContextError::cancelled(operation));
    }
    Ok(())
}

/// Accumulates one collection under the configured limits
struct Assembly<'a> {
    config: &'a ContextConfig,
    files: Vec<ContextFile>,
    included: HashSet<String>,
    total_lines: usize,
    estimated_tokens: usize,
    truncated: bool,
    focus: Option<FocusHint>,
}

impl<'a> Assembly<'a> {
    fn new(config: &'a ContextConfig, focus: Option<FocusHint>) -> Self {
        Self {
            config,
            files: Vec::new(),
            included: HashSet::new(),
            total_lines: 0,
            estimated_tokens: 0,
            truncated: false,
            focus,
        }
    }

    fn contains(&self, relative: &str) -> bool {
        self.included.contains(relative)
    }

    fn has_slot(&self) -> bool {
        self.files.len() < self.config.max_files
    }

    /// Whether adding `file` keeps every aggregate limit
    fn fits(&self, file: &ContextFile) -> bool {
        self.has_slot()
            && self.total_lines + file.lines <= self.config.max_total_lines()
            && self.estimated_tokens + file.estimated_tokens <= self.config.max_total_tokens
    }

    fn push(&mut self, file: ContextFile) {
        self.truncated |= file.truncated;
        self.total_lines += file.lines;
        self.estimated_tokens += file.estimated_tokens;
        self.included.insert(file.path.clone());
        self.files.push(file);
    }

    fn finish(self) -> ContextCollection {
        let summary = describe(
            &self.files,
            self.total_lines,
            self.estimated_tokens,
            self.truncated,
            self.focus.as_ref(),
        );
        ContextCollection {
            files: self.files,
            total_lines: self.total_lines,
            estimated_tokens: self.estimated_tokens,
            summary,
            truncated: self.truncated,
            focus: self.focus,
        }
    }
}

fn describe(
    files: &[ContextFile],
    total_lines: usize,
    estimated_tokens: usize,
    truncated: bool,
    focus: Option<&FocusHint>,
) -> String {
    let mut summary = format!(
        "Context: {} file{}\n",
        files.len(),
        if files.len() == 1 { "" } else { "s" }
    );

    for file in files {
        summary.push_str(&format!("- {} ({} lines)\n", file.name, file.lines));
    }

    summary.push_str(&format!(
        "Total: {} lines, ~{} tokens",
        total_lines, estimated_tokens
    ));

    if let Some(focus) = focus {
        let mut parts = Vec::new();
        if let Some(line) = focus.cursor_line {
            parts.push(format!("cursor at line {}", line));
        }
        if let Some(selection) = focus.selected_text.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!(
                "{} selected line(s): \"{}\"",
                selection.lines().count().max(1),
                truncate(selection.lines().next().unwrap_or_default(), 40)
            ));
        }
        summary.push_str(&format!("\nFocus: {}", parts.join(", ")));
    }

    if truncated {
        summary.push_str("\nNote: context was truncated to fit the configured limits");
    }

    summary
}
