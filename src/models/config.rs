//! Coordinator Configuration Models
//!
//! Configuration sections consumed by the coordinator: repository map
//! generation, long-conversation memory, and the selected models.

use serde::{Deserialize, Serialize};

/// Lower bound of the dynamic repo-map token budget
pub const MIN_REPO_MAP_TOKENS: i64 = 1024;
/// Upper bound of the dynamic repo-map token budget
pub const MAX_REPO_MAP_TOKENS: i64 = 4096;

/// Dynamic repo-map budget for a model context window:
/// `clamp(context_window / 8, 1024, 4096)`.
pub fn default_repo_map_max_tokens(context_window: i64) -> i64 {
    (context_window / 8).clamp(MIN_REPO_MAP_TOKENS, MAX_REPO_MAP_TOKENS)
}

/// When the repository map is regenerated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshMode {
    /// Regenerate when chat files or mentions change
    #[default]
    Auto,
    /// Regenerate when chat files change
    Files,
    /// Only regenerate on explicit request
    Manual,
    /// Regenerate on every request
    Always,
}

impl RefreshMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshMode::Auto => "auto",
            RefreshMode::Files => "files",
            RefreshMode::Manual => "manual",
            RefreshMode::Always => "always",
        }
    }
}

fn default_map_mul_no_files() -> f64 {
    2.0
}

/// Repository map options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoMapOptions {
    /// Disable repo map generation entirely
    #[serde(default)]
    pub disabled: bool,
    /// Override for the rendered map budget (0 = dynamic)
    #[serde(default)]
    pub max_tokens: i64,
    /// Additional glob patterns excluded from scanning
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub refresh_mode: RefreshMode,
    /// Budget multiplier when no files are in chat
    #[serde(default = "default_map_mul_no_files")]
    pub map_mul_no_files: f64,
    /// Parser pool capacity (0 = runtime default)
    #[serde(default)]
    pub parser_pool_size: usize,
}

impl Default for RepoMapOptions {
    fn default() -> Self {
        Self {
            disabled: false,
            max_tokens: 0,
            exclude_globs: Vec::new(),
            refresh_mode: RefreshMode::Auto,
            map_mul_no_files: default_map_mul_no_files(),
            parser_pool_size: 0,
        }
    }
}

impl RepoMapOptions {
    /// Overlay `other` onto `self`. `disabled` is sticky, globs accumulate,
    /// and non-zero scalars in `other` win.
    pub fn merge(mut self, other: RepoMapOptions) -> RepoMapOptions {
        self.disabled = self.disabled || other.disabled;
        if other.max_tokens != 0 {
            self.max_tokens = other.max_tokens;
        }
        self.exclude_globs.extend(other.exclude_globs);
        self.exclude_globs.sort();
        self.exclude_globs.dedup();
        if other.refresh_mode != RefreshMode::Auto {
            self.refresh_mode = other.refresh_mode;
        }
        if other.map_mul_no_files != 0.0 {
            self.map_mul_no_files = other.map_mul_no_files;
        }
        if other.parser_pool_size != 0 {
            self.parser_pool_size = other.parser_pool_size;
        }
        self
    }
}

fn default_ctx_cutoff_threshold() -> f64 {
    0.6
}

fn default_large_tool_output_token_threshold() -> i64 {
    10_000
}

/// Long-conversation memory options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LcmOptions {
    /// Fraction of the context window at which compaction starts
    #[serde(default = "default_ctx_cutoff_threshold")]
    pub ctx_cutoff_threshold: f64,
    #[serde(default)]
    pub disable_large_tool_output: bool,
    #[serde(default = "default_large_tool_output_token_threshold")]
    pub large_tool_output_token_threshold: i64,
    /// Explorer output profile; "parity" enables deterministic repo maps
    #[serde(default)]
    pub explorer_output_profile: String,
}

impl Default for LcmOptions {
    fn default() -> Self {
        Self {
            ctx_cutoff_threshold: default_ctx_cutoff_threshold(),
            disable_large_tool_output: false,
            large_tool_output_token_threshold: default_large_tool_output_token_threshold(),
            explorer_output_profile: String::new(),
        }
    }
}

impl LcmOptions {
    pub fn is_parity_profile(&self) -> bool {
        self.explorer_output_profile
            .trim()
            .eq_ignore_ascii_case("parity")
    }
}

/// A model selected for the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    #[serde(default)]
    pub provider: String,
    pub context_window: i64,
    /// Provider output limit (0 = unknown)
    #[serde(default)]
    pub max_output_tokens: i64,
}

/// Coordinator configuration stored in config.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default)]
    pub repo_map: RepoMapOptions,
    #[serde(default)]
    pub lcm: LcmOptions,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl CoordinatorConfig {
    /// The selected model with the largest context window.
    pub fn large_model(&self) -> Option<&ModelConfig> {
        self.models.iter().max_by_key(|m| m.context_window)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.repo_map.max_tokens < 0 {
            return Err("repo_map.max_tokens cannot be negative".to_string());
        }
        if self.repo_map.map_mul_no_files < 0.0 {
            return Err("repo_map.map_mul_no_files cannot be negative".to_string());
        }
        if !(0.0..=1.0).contains(&self.lcm.ctx_cutoff_threshold) {
            return Err(format!(
                "Invalid lcm.ctx_cutoff_threshold: {}. Must be between 0 and 1",
                self.lcm.ctx_cutoff_threshold
            ));
        }
        for model in &self.models {
            if model.id.trim().is_empty() {
                return Err("model id cannot be empty".to_string());
            }
            if model.context_window <= 0 {
                return Err(format!(
                    "model {} must have a positive context_window",
                    model.id
                ));
            }
        }
        Ok(())
    }
}
