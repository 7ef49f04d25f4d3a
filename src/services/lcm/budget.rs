//! Context budget arithmetic

use serde::{Deserialize, Serialize};

/// Upper bound on the output reserve carved from the context window.
pub const MAX_OUTPUT_RESERVE: i64 = 20_000;

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> i64 {
    let chars = text.chars().count() as i64;
    (chars + 3) / 4
}

/// Token limits for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    pub context_window: i64,
    /// Compaction threshold
    pub soft_limit: i64,
    /// Never exceed
    pub hard_limit: i64,
    /// System prompt, tools and repo map
    pub overhead: i64,
    pub output_reserve: i64,
}

/// Compute the budget for a context window.
///
/// `overhead = system + tools + repo_map`; the output reserve is the
/// smallest of 20k, a quarter of the window and the model's output limit
/// (when known). `hard = window - overhead - reserve` and
/// `soft = min(window * cutoff - overhead, hard)`, both floored at zero.
pub fn compute_budget(
    context_window: i64,
    system_prompt_tokens: i64,
    tool_tokens: i64,
    repo_map_tokens: i64,
    cutoff_threshold: f64,
    model_output_limit: i64,
) -> ContextBudget {
    let overhead = system_prompt_tokens.max(0) + tool_tokens.max(0) + repo_map_tokens.max(0);

    let mut output_reserve = MAX_OUTPUT_RESERVE.min(context_window / 4);
    if model_output_limit > 0 {
        output_reserve = output_reserve.min(model_output_limit);
    }
    let output_reserve = output_reserve.max(0);

    let hard_limit = (context_window - overhead - output_reserve).max(0);
    let soft_limit = (((context_window as f64) * cutoff_threshold) as i64 - overhead)
        .max(0)
        .min(hard_limit);

    ContextBudget {
        context_window,
        soft_limit,
        hard_limit,
        overhead,
        output_reserve,
    }
}
