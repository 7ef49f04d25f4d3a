//! Repo-map controller
//!
//! Session-level entry points for explicit refresh and reset, plus the
//! refresh closures handed to the `map_refresh` tool.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info};

use crate::utils::error::{AppError, AppResult};

use super::profile::{tracked_chat_files, ReadFileTracker, RepoMapProfile};
use super::service::{GenerateOpts, RepoMapService};

pub const REFRESH_UNAVAILABLE: &str = "repo map refresh is not available in this session";
pub const SESSION_REQUIRED: &str = "session ID is required for map refresh";
pub const REFRESHED: &str = "Repository map refreshed.";
pub const REFRESH_SCHEDULED: &str = "Repository map refresh scheduled.";
pub const RESET_REBUILT: &str = "Repository map reset and rebuilt.";

/// Boxed future returned by a refresh closure.
pub type RefreshFuture = Pin<Box<dyn Future<Output = AppResult<()>> + Send>>;

/// Refresh closure taking the session id.
pub type RefreshFn = Arc<dyn Fn(String) -> RefreshFuture + Send + Sync>;

#[derive(Clone)]
pub struct RepoMapController {
    service: Option<Arc<dyn RepoMapService>>,
    profile: RepoMapProfile,
    tracker: Option<Arc<dyn ReadFileTracker>>,
    working_directory: PathBuf,
}

impl RepoMapController {
    pub fn new(service: Option<Arc<dyn RepoMapService>>) -> Self {
        Self {
            service,
            profile: RepoMapProfile::default(),
            tracker: None,
            working_directory: PathBuf::new(),
        }
    }

    pub fn with_profile(mut self, profile: RepoMapProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Chat files come from `tracker`, relative to `working_directory`.
    pub fn with_tracker(
        mut self,
        tracker: Arc<dyn ReadFileTracker>,
        working_directory: impl Into<PathBuf>,
    ) -> Self {
        self.tracker = Some(tracker);
        self.working_directory = working_directory.into();
        self
    }

    /// Options for an explicit refresh of `session_id`: the configured
    /// profile, the session's chat files and no mentions.
    pub fn forced_opts(&self, session_id: &str) -> GenerateOpts {
        let chat_files =
            tracked_chat_files(self.tracker.as_deref(), &self.working_directory, session_id);
        self.profile.opts(session_id, chat_files, true)
    }

    fn available_service(&self) -> AppResult<&Arc<dyn RepoMapService>> {
        match &self.service {
            Some(service) if service.available() => Ok(service),
            _ => Err(AppError::validation(REFRESH_UNAVAILABLE)),
        }
    }

    /// Refresh the session's map, synchronously or in the background.
    pub async fn refresh(&self, session_id: &str, sync: bool) -> AppResult<String> {
        let service = self.available_service()?;
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(AppError::validation(SESSION_REQUIRED));
        }
        let opts = self.forced_opts(session_id);
        if sync {
            service.refresh(session_id, opts).await?;
            Ok(REFRESHED.to_string())
        } else {
            service.refresh_async(session_id, opts);
            Ok(REFRESH_SCHEDULED.to_string())
        }
    }

    /// Drop all map state for the session and rebuild it.
    pub async fn reset(&self, session_id: &str) -> AppResult<String> {
        let service = self.available_service()?;
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(AppError::validation(SESSION_REQUIRED));
        }
        service.reset(session_id).await?;
        service.refresh(session_id, self.forced_opts(session_id)).await?;
        info!(session_id, "repo map reset and rebuilt");
        Ok(RESET_REBUILT.to_string())
    }

    /// Closure performing a forced synchronous refresh, if the service is
    /// usable.
    pub fn sync_refresh_fn(&self) -> Option<RefreshFn> {
        let service = self.available_service().ok()?.clone();
        let controller = self.clone();
        Some(Arc::new(move |session_id: String| {
            let service = service.clone();
            let opts = controller.forced_opts(&session_id);
            Box::pin(async move {
                service.refresh(&session_id, opts).await?;
                Ok(())
            }) as RefreshFuture
        }))
    }

    /// Closure scheduling a forced background refresh, if the service is
    /// usable.
    pub fn async_refresh_fn(&self) -> Option<RefreshFn> {
        let service = self.available_service().ok()?.clone();
        let controller = self.clone();
        Some(Arc::new(move |session_id: String| {
            debug!(session_id = %session_id, "scheduling repo map refresh");
            service.refresh_async(&session_id, controller.forced_opts(&session_id));
            Box::pin(async { Ok(()) }) as RefreshFuture
        }))
    }
}
