//! Repo-map manager
//!
//! Concrete [`RepoMapService`]: per-session map caches, render caches keyed
//! by refresh mode, the run-injection latch, read-only path persistence and
//! tracked background refreshes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use agent_coordinator_core::RunInjectionKey;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use rusqlite::params;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::config::{default_repo_map_max_tokens, RefreshMode, RepoMapOptions};
use crate::storage::database::Database;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{clean_path, to_slash};

use super::generator::{MapGenerator, MapRequest, RankedFileListGenerator};
use super::paths::{normalize_unique, union_repo_paths};
use super::service::{GenerateOpts, RepoMapService};

const RENDER_CACHE_VERSION: &str = "v2";

/// Stable key for a repository root: hex SHA-256 of the cleaned absolute path.
pub fn repo_key_for_root(root: &Path) -> String {
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(root))
            .unwrap_or_else(|_| root.to_path_buf())
    };
    let cleaned = clean_path(&absolute);
    let digest = Sha256::digest(cleaned.to_string_lossy().as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Render-cache key for a refresh mode; `None` disables caching.
pub fn render_cache_key(mode: RefreshMode, opts: &GenerateOpts) -> Option<String> {
    let chat = normalize_unique(&opts.chat_files).join(",");
    let budget = opts.token_budget.to_string();
    match mode {
        RefreshMode::Manual => Some("manual".to_string()),
        RefreshMode::Always => None,
        RefreshMode::Files => Some([RENDER_CACHE_VERSION, "files", &chat, &budget].join("|")),
        RefreshMode::Auto => {
            let fnames = normalize_unique(&opts.mentioned_fnames).join(",");
            let mut idents: Vec<&str> = opts
                .mentioned_idents
                .iter()
                .map(|i| i.trim())
                .filter(|i| !i.is_empty())
                .collect();
            idents.sort_unstable();
            idents.dedup();
            let idents = idents.join(",");
            Some([RENDER_CACHE_VERSION, "auto", &chat, &fnames, &idents, &budget].join("|"))
        }
    }
}

/// Identity of a background refresh: hex SHA-256 over the options with
/// path and identifier lists normalized. Refreshes with equal keys coalesce.
pub fn refresh_flight_key(opts: &GenerateOpts) -> String {
    let mut normalized = opts.clone();
    normalized.session_id = normalized.session_id.trim().to_string();
    normalized.chat_files = normalize_unique(&opts.chat_files);
    normalized.mentioned_fnames = normalize_unique(&opts.mentioned_fnames);
    normalized.mentioned_idents.sort_unstable();
    normalized.mentioned_idents.dedup();

    let mut hasher = Sha256::new();
    match serde_json::to_vec(&normalized) {
        Ok(bytes) => hasher.update(&bytes),
        Err(_) => hasher.update(normalized.session_id.as_bytes()),
    }
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

/// Budget for a render: explicit option, then config override, then the
/// dynamic default (with the context window scaled up when no files are in
/// chat).
pub fn resolve_token_budget(options: &RepoMapOptions, opts: &GenerateOpts) -> i64 {
    if opts.token_budget > 0 {
        return opts.token_budget;
    }
    if options.max_tokens > 0 {
        return options.max_tokens;
    }
    let mut context_window = opts.max_context_window;
    if opts.chat_files.is_empty() && options.map_mul_no_files > 0.0 {
        let adjusted = (context_window as f64 * options.map_mul_no_files).ceil() as i64;
        if adjusted > context_window {
            context_window = adjusted;
        }
    }
    default_repo_map_max_tokens(context_window)
}

#[derive(Debug, Clone, Default)]
struct SessionMap {
    text: String,
    tokens: i64,
}

struct Inner {
    root: PathBuf,
    repo_key: String,
    options: RepoMapOptions,
    generator: Arc<dyn MapGenerator>,
    db: Option<Database>,
    sessions: DashMap<String, SessionMap>,
    render_cache: DashMap<(String, String), SessionMap>,
    injected: DashMap<(String, RunInjectionKey), ()>,
    read_only: DashMap<String, Vec<String>>,
    inflight: DashSet<(String, String)>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

/// Repo-map service over a repository root.
#[derive(Clone)]
pub struct RepoMapManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RepoMapManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoMapManager")
            .field("root", &self.inner.root)
            .field("sessions", &self.inner.sessions.len())
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl RepoMapManager {
    /// Manager with the default ranked-file-list generator.
    pub fn new(root: impl Into<PathBuf>, options: RepoMapOptions) -> Self {
        Self::with_generator(root, options, Arc::new(RankedFileListGenerator::new()))
    }

    pub fn with_generator(
        root: impl Into<PathBuf>,
        options: RepoMapOptions,
        generator: Arc<dyn MapGenerator>,
    ) -> Self {
        let root = root.into();
        let repo_key = repo_key_for_root(&root);
        Self {
            inner: Arc::new(Inner {
                root,
                repo_key,
                options,
                generator,
                db: None,
                sessions: DashMap::new(),
                render_cache: DashMap::new(),
                injected: DashMap::new(),
                read_only: DashMap::new(),
                inflight: DashSet::new(),
                tasks: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Persist read-only paths in `db` instead of memory.
    ///
    /// Must be called before the manager is shared.
    pub fn with_database(self, db: Database) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.db = Some(db);
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                warn!("repo map manager already shared; database not attached");
                Self { inner }
            }
        }
    }

    pub fn repo_key(&self) -> &str {
        &self.inner.repo_key
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Number of sessions holding an injection latch entry.
    pub fn injected_count(&self) -> usize {
        self.inner.injected.len()
    }
}

impl Inner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn last_map(&self, session_id: &str) -> SessionMap {
        self.sessions
            .get(session_id)
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn clear_render_cache(&self, session_id: &str) {
        self.render_cache.retain(|(sid, _), _| sid != session_id);
    }

    fn walk_files(&self) -> Vec<String> {
        let patterns: Vec<glob::Pattern> = self
            .options
            .exclude_globs
            .iter()
            .filter_map(|g| match glob::Pattern::new(g) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(pattern = %g, error = %e, "ignoring invalid repo map exclude glob");
                    None
                }
            })
            .collect();

        let mut files = Vec::new();
        for entry in ignore::WalkBuilder::new(&self.root).build() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable repo entry");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let rel = to_slash(rel);
            if patterns.iter().any(|p| p.matches(&rel)) {
                continue;
            }
            files.push(rel);
        }
        files.sort();
        files.dedup();
        files
    }

    async fn all_files(self: &Arc<Self>) -> Vec<String> {
        let inner = self.clone();
        match tokio::task::spawn_blocking(move || inner.walk_files()).await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "repo file walk failed");
                Vec::new()
            }
        }
    }

    async fn generate(self: &Arc<Self>, opts: &GenerateOpts) -> AppResult<(String, i64)> {
        if self.is_closed() || self.cancel.is_cancelled() {
            return Err(AppError::cancelled("repo map service is closed"));
        }

        let session_id = opts.session_id.trim();
        if session_id.is_empty() {
            return Ok((String::new(), 0));
        }

        let mode = self.options.refresh_mode;
        let last = self.last_map(session_id);
        let cache_key = render_cache_key(mode, opts);

        let cached = |key: &Option<String>| -> Option<SessionMap> {
            key.as_ref().and_then(|k| {
                self.render_cache
                    .get(&(session_id.to_string(), k.clone()))
                    .map(|m| m.clone())
            })
        };

        if !opts.force_refresh {
            match mode {
                RefreshMode::Manual => return Ok((last.text, last.tokens)),
                RefreshMode::Files | RefreshMode::Auto => {
                    if !last.text.is_empty() || last.tokens > 0 {
                        return Ok((last.text, last.tokens));
                    }
                    if let Some(hit) = cached(&cache_key) {
                        self.sessions.insert(session_id.to_string(), hit.clone());
                        return Ok((hit.text, hit.tokens));
                    }
                }
                RefreshMode::Always => {}
            }
        }

        let request = MapRequest {
            all_files: self.all_files().await,
            opts: opts.clone(),
            token_budget: resolve_token_budget(&self.options, opts),
        };

        let rendered = match self.generator.render(&request).await {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(session_id, error = %e, "repo map generation failed");
                if !last.text.is_empty() || last.tokens > 0 {
                    return Ok((last.text, last.tokens));
                }
                if let Some(hit) = cached(&cache_key) {
                    return Ok((hit.text, hit.tokens));
                }
                return Err(e);
            }
        };

        let map = SessionMap {
            text: rendered.text,
            tokens: rendered.tokens,
        };
        if let Some(key) = cache_key {
            self.render_cache
                .insert((session_id.to_string(), key), map.clone());
        }
        if !map.text.is_empty() {
            self.sessions.insert(session_id.to_string(), map.clone());
        }
        Ok((map.text, map.tokens))
    }

    fn store_read_only(&self, session_id: &str, paths: &[String]) -> AppResult<()> {
        match &self.db {
            Some(db) => {
                let mut conn = db.get_connection()?;
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM repo_map_session_read_only WHERE repo_key = ?1 AND session_id = ?2",
                    params![self.repo_key, session_id],
                )?;
                for path in paths {
                    tx.execute(
                        "INSERT OR IGNORE INTO repo_map_session_read_only (repo_key, session_id, path)
                         VALUES (?1, ?2, ?3)",
                        params![self.repo_key, session_id, path],
                    )?;
                }
                tx.commit()?;
            }
            None => {
                self.read_only.insert(session_id.to_string(), paths.to_vec());
            }
        }
        Ok(())
    }

    fn load_read_only(&self, session_id: &str) -> AppResult<Vec<String>> {
        match &self.db {
            Some(db) => {
                let conn = db.get_connection()?;
                let mut stmt = conn.prepare(
                    "SELECT path FROM repo_map_session_read_only
                     WHERE repo_key = ?1 AND session_id = ?2 ORDER BY path ASC",
                )?;
                let rows = stmt.query_map(params![self.repo_key, session_id], |row| row.get(0))?;
                let paths = rows.collect::<Result<Vec<String>, _>>()?;
                Ok(paths)
            }
            None => Ok(self
                .read_only
                .get(session_id)
                .map(|p| p.clone())
                .unwrap_or_default()),
        }
    }

    fn clear_read_only(&self, session_id: &str) -> AppResult<()> {
        self.read_only.remove(session_id);
        if let Some(db) = &self.db {
            let conn = db.get_connection()?;
            conn.execute(
                "DELETE FROM repo_map_session_read_only WHERE repo_key = ?1 AND session_id = ?2",
                params![self.repo_key, session_id],
            )?;
        }
        Ok(())
    }

    async fn refresh(self: &Arc<Self>, session_id: &str, mut opts: GenerateOpts) -> AppResult<(String, i64)> {
        if opts.session_id.trim().is_empty() {
            opts.session_id = session_id.to_string();
        }
        if opts.force_refresh {
            self.clear_render_cache(session_id);
        }

        let (text, tokens) = self.generate(&opts).await?;

        // A refresh without mentions keeps the paths earlier mentions added
        let carried = if opts.mentioned_fnames.is_empty() {
            self.load_read_only(session_id).unwrap_or_else(|e| {
                warn!(session_id, error = %e, "failed to load repo map read-only files");
                Vec::new()
            })
        } else {
            opts.mentioned_fnames.clone()
        };
        let read_only = union_repo_paths(&opts.chat_files, &carried);
        if let Err(e) = self.store_read_only(session_id, &read_only) {
            warn!(session_id, error = %e, "failed to persist repo map read-only files");
        }

        debug!(session_id, tokens, "repo map refreshed");
        Ok((text, tokens))
    }
}

#[async_trait]
impl RepoMapService for RepoMapManager {
    fn available(&self) -> bool {
        !self.inner.options.disabled && !self.inner.is_closed()
    }

    async fn generate(&self, opts: &GenerateOpts) -> AppResult<(String, i64)> {
        self.inner.generate(opts).await
    }

    fn last_good_map(&self, session_id: &str) -> String {
        self.inner.last_map(session_id).text
    }

    fn last_token_count(&self, session_id: &str) -> i64 {
        self.inner.last_map(session_id).tokens
    }

    async fn session_read_only_files(&self, session_id: &str) -> Vec<String> {
        match self.inner.load_read_only(session_id) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(session_id, error = %e, "failed to load repo map read-only files");
                Vec::new()
            }
        }
    }

    fn should_inject(&self, session_id: &str, run_key: &RunInjectionKey) -> bool {
        if self.inner.is_closed() || session_id.trim().is_empty() || !run_key.is_valid() {
            return false;
        }
        match self
            .inner
            .injected
            .entry((session_id.to_string(), run_key.clone()))
        {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(());
                true
            }
        }
    }

    fn refresh_async(&self, session_id: &str, opts: GenerateOpts) {
        if self.inner.is_closed() || session_id.trim().is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(session_id, "no async runtime; repo map refresh not scheduled");
            return;
        };
        let flight = (session_id.to_string(), refresh_flight_key(&opts));
        if !self.inner.inflight.insert(flight.clone()) {
            debug!(session_id, "identical repo map refresh already in flight");
            return;
        }

        let inner = self.inner.clone();
        let sid = session_id.to_string();
        let handle = runtime.spawn(async move {
            tokio::select! {
                _ = inner.cancel.cancelled() => {
                    debug!(session_id = %sid, "background repo map refresh cancelled");
                }
                result = inner.refresh(&sid, opts) => {
                    if let Err(e) = result {
                        warn!(session_id = %sid, error = %e, "background repo map refresh failed");
                    }
                }
            }
            inner.inflight.remove(&flight);
        });

        let mut tasks = self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    async fn refresh(&self, session_id: &str, opts: GenerateOpts) -> AppResult<(String, i64)> {
        self.inner.refresh(session_id, opts).await
    }

    async fn reset(&self, session_id: &str) -> AppResult<()> {
        self.inner.sessions.remove(session_id);
        self.inner.clear_render_cache(session_id);
        self.inner
            .injected
            .retain(|(sid, _), _| sid != session_id);
        self.inner.clear_read_only(session_id)?;
        info!(session_id, "repo map state reset");
        Ok(())
    }

    async fn all_files(&self) -> Vec<String> {
        self.inner.all_files().await
    }

    async fn close(&self) -> AppResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "repo map background task ended abnormally");
            }
        }

        self.inner.injected.clear();
        info!(root = %self.inner.root.display(), "repo map service closed");
        Ok(())
    }
}
