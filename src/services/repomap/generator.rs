//! Map generators
//!
//! A [`MapGenerator`] turns the file list and generate options into map
//! text. The default generator ranks files by mention relevance and lists
//! them up to the token budget.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::services::lcm::budget::estimate_tokens;
use crate::utils::error::AppResult;

use super::service::GenerateOpts;

/// Input for one render.
#[derive(Debug, Clone)]
pub struct MapRequest {
    pub all_files: Vec<String>,
    pub opts: GenerateOpts,
    /// Resolved budget in tokens
    pub token_budget: i64,
}

/// Rendered map text and its token count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedMap {
    pub text: String,
    pub tokens: i64,
}

#[async_trait]
pub trait MapGenerator: Send + Sync {
    async fn render(&self, request: &MapRequest) -> AppResult<RenderedMap>;
}

/// Lists repository files, most relevant first.
///
/// Ranking: mentioned files, then files whose stem equals a mentioned
/// identifier (case-insensitive), then everything else in input order.
/// Chat files are left out since their contents are already in context.
#[derive(Debug, Default, Clone)]
pub struct RankedFileListGenerator;

impl RankedFileListGenerator {
    pub fn new() -> Self {
        Self
    }

    fn rank(&self, request: &MapRequest) -> Vec<String> {
        let chat: HashSet<&str> = request.opts.chat_files.iter().map(String::as_str).collect();
        let idents: HashSet<String> = request
            .opts
            .mentioned_idents
            .iter()
            .map(|i| i.to_lowercase())
            .collect();

        let mut seen: HashSet<&str> = HashSet::new();
        let mut ranked = Vec::with_capacity(request.all_files.len());

        for f in &request.opts.mentioned_fnames {
            if !chat.contains(f.as_str()) && seen.insert(f.as_str()) {
                ranked.push(f.clone());
            }
        }

        let stem_of = |path: &str| -> String {
            let name = path.rsplit('/').next().unwrap_or(path);
            match name.rfind('.') {
                Some(idx) if idx > 0 => name[..idx].to_lowercase(),
                _ => name.to_lowercase(),
            }
        };

        for f in &request.all_files {
            if chat.contains(f.as_str()) || seen.contains(f.as_str()) {
                continue;
            }
            if idents.contains(&stem_of(f)) {
                seen.insert(f.as_str());
                ranked.push(f.clone());
            }
        }

        for f in &request.all_files {
            if !chat.contains(f.as_str()) && seen.insert(f.as_str()) {
                ranked.push(f.clone());
            }
        }

        ranked
    }
}

#[async_trait]
impl MapGenerator for RankedFileListGenerator {
    async fn render(&self, request: &MapRequest) -> AppResult<RenderedMap> {
        let mut text = String::new();
        let mut tokens = 0;

        for path in self.rank(request) {
            let line = format!("{}\n", path);
            let line_tokens = estimate_tokens(&line);
            if request.token_budget > 0 && tokens + line_tokens > request.token_budget {
                break;
            }
            text.push_str(&line);
            tokens += line_tokens;
        }

        let text = text.trim_end().to_string();
        let tokens = estimate_tokens(&text);
        Ok(RenderedMap { text, tokens })
    }
}
