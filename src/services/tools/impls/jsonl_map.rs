//! JSONL Map Pool
//!
//! Shared machinery behind `llm_map` and `agentic_map`: read a JSONL input
//! file, push every item through an `ItemTransform` on a bounded worker pool
//! with a per-item deadline, and write one result line per item in input
//! order.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::services::llm::types::ParameterSchema;
use crate::services::tools::executor::ToolResult;
use crate::services::tools::trait_def::ToolExecutionContext;
use crate::utils::error::AppResult;

use super::{positive_arg, string_arg};

/// Longest accepted input line.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_CONCURRENCY: usize = 16;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const INPUT_PLACEHOLDER: &str = "{{.Input}}";
const CANCELLED: &str = "cancelled";

/// One unit of work: turn a rendered prompt into raw model/agent output.
#[async_trait]
pub trait ItemTransform: Send + Sync {
    async fn transform(&self, prompt: String, cancel: CancellationToken) -> AppResult<String>;
}

/// One output line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemResult {
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl ItemResult {
    fn success(input: Value, output: Value) -> Self {
        Self {
            input,
            output: Some(output),
            error: None,
        }
    }

    fn failure(input: Value, error: impl Into<String>) -> Self {
        Self {
            input,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// A validated map invocation.
#[derive(Debug, Clone)]
pub struct MapJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub prompt: String,
    /// Parsed JSON Schema; its presence turns on JSON retries.
    pub schema: Option<Value>,
    pub concurrency: usize,
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl MapJob {
    /// Build a job from tool arguments, resolving paths against the context.
    ///
    /// `concurrency` and `timeout` are the variant's defaults; callers that
    /// fix them simply ignore the corresponding arguments.
    pub fn from_args(
        ctx: &ToolExecutionContext,
        args: &Value,
        concurrency: usize,
        timeout: Duration,
    ) -> Result<Self, ToolResult> {
        let input_path = string_arg(args, "input_path");
        if input_path.is_empty() {
            return Err(ToolResult::err("input_path is required"));
        }
        let output_path = string_arg(args, "output_path");
        if output_path.is_empty() {
            return Err(ToolResult::err("output_path is required"));
        }
        let prompt = string_arg(args, "prompt");
        if prompt.is_empty() {
            return Err(ToolResult::err("prompt is required"));
        }

        let schema_text = string_arg(args, "schema");
        let schema = if schema_text.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<Value>(&schema_text) {
                Ok(v) => Some(v),
                Err(e) => {
                    return Err(ToolResult::err(format!(
                        "Invalid JSON Schema (not valid JSON): {}",
                        e
                    )))
                }
            }
        };

        let max_attempts = positive_arg(args, "max_attempts")
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);

        Ok(Self {
            input_path: ctx.resolve_path(&input_path),
            output_path: ctx.resolve_path(&output_path),
            prompt,
            schema,
            concurrency: concurrency.max(1),
            timeout,
            max_attempts,
        })
    }
}

/// Parameters common to both map tools.
pub fn common_parameters() -> HashMap<String, ParameterSchema> {
    let mut properties = HashMap::new();
    properties.insert(
        "input_path".to_string(),
        ParameterSchema::string(Some("Path to input JSONL file")),
    );
    properties.insert(
        "output_path".to_string(),
        ParameterSchema::string(Some("Path to write output JSONL file")),
    );
    properties.insert(
        "prompt".to_string(),
        ParameterSchema::string(Some(
            "Prompt template. Use {{.Input}} for the input item.",
        )),
    );
    properties.insert(
        "schema".to_string(),
        ParameterSchema::string(Some(
            "JSON Schema string for output validation (optional)",
        )),
    );
    properties.insert(
        "max_attempts".to_string(),
        ParameterSchema::integer(Some(
            "Attempts per item when output must be JSON (default 3)",
        ))
        .with_default(serde_json::json!(DEFAULT_MAX_ATTEMPTS)),
    );
    properties
}

/// Read a JSONL file into one value per non-empty line.
pub fn read_jsonl(path: &Path) -> Result<Vec<Value>, String> {
    let file = File::open(path).map_err(|e| format!("opening input file: {}", e))?;
    let mut reader = BufReader::new(file);
    let mut items = Vec::new();
    let mut buf = Vec::new();
    let mut line_num = 0usize;

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64 + 1)
            .read_until(b'\n', &mut buf)
            .map_err(|e| format!("reading file: {}", e))?;
        if read == 0 {
            break;
        }
        line_num += 1;
        if buf.len() > MAX_LINE_BYTES && buf.last() != Some(&b'\n') {
            return Err(format!("line {} exceeds {} bytes", line_num, MAX_LINE_BYTES));
        }

        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_slice(line)
            .map_err(|e| format!("invalid JSON at line {}: {}", line_num, e))?;
        items.push(value);
    }

    Ok(items)
}

/// Substitute the item into the prompt template.
pub fn render_prompt(template: &str, item: &Value) -> String {
    let input = item.to_string();
    if template.contains(INPUT_PLACEHOLDER) {
        template.replace(INPUT_PLACEHOLDER, &input)
    } else {
        format!("{}\n\n{}", template, input)
    }
}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_markdown_fences(s: &str) -> String {
    let s = s.trim();
    if !s.starts_with("```") {
        return s.to_string();
    }
    let mut lines: Vec<&str> = s.lines().collect();
    if lines.len() >= 2 {
        lines.remove(0);
        if lines.last().map(|l| l.trim() == "```").unwrap_or(false) {
            lines.pop();
        }
    }
    lines.join("\n").trim().to_string()
}

/// Run the transform on one item, retrying non-JSON output when a schema is set.
async fn process_item(
    transform: &dyn ItemTransform,
    prompt: &str,
    item: &Value,
    schema_required: bool,
    max_attempts: u32,
    cancel: &CancellationToken,
) -> Result<Value, String> {
    let rendered = render_prompt(prompt, item);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts.max(1) {
        let raw = transform
            .transform(rendered.clone(), cancel.clone())
            .await
            .map_err(|e| e.to_string())?;
        let cleaned = strip_markdown_fences(&raw);

        match serde_json::from_str::<Value>(&cleaned) {
            Ok(value) => return Ok(value),
            Err(_) if !schema_required => return Ok(Value::String(cleaned)),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "map item output is not JSON, retrying");
                last_error = e.to_string();
            }
        }
    }

    Err(format!(
        "output is not valid JSON after {} attempts: {}",
        max_attempts.max(1),
        last_error
    ))
}

/// Execute a map job and return the tool's summary response.
pub async fn run_map(
    job: MapJob,
    transform: Arc<dyn ItemTransform>,
    cancel: CancellationToken,
) -> ToolResult {
    let items = match read_jsonl(&job.input_path) {
        Ok(items) => items,
        Err(e) => return ToolResult::err(format!("Failed to read input file: {}", e)),
    };
    if items.is_empty() {
        return ToolResult::err("Input file is empty");
    }

    let out_file = match File::create(&job.output_path) {
        Ok(f) => f,
        Err(e) => return ToolResult::err(format!("Failed to create output file: {}", e)),
    };

    let results = dispatch(&job, items, transform, cancel).await;

    let mut writer = BufWriter::new(out_file);
    for result in &results {
        let written = serde_json::to_writer(&mut writer, result)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"));
        if let Err(e) = written {
            return ToolResult::err(format!("Failed to write output: {}", e));
        }
    }
    if let Err(e) = writer.flush() {
        return ToolResult::err(format!("Failed to write output: {}", e));
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    let succeeded = results.len() - failed;
    tracing::info!(
        items = results.len(),
        succeeded,
        failed,
        output = %job.output_path.display(),
        "map job finished"
    );

    ToolResult::ok(format!(
        "Processed {} items: {} succeeded, {} failed.\nOutput written to: {}",
        results.len(),
        succeeded,
        failed,
        job.output_path.display()
    ))
}

/// Permits for a pool over `items` inputs: never more workers than items,
/// and never above what the semaphore can hold.
fn worker_count(concurrency: usize, items: usize) -> usize {
    concurrency
        .min(items.max(1))
        .min(Semaphore::MAX_PERMITS)
        .max(1)
}

/// Fan items out to the pool and collect results by input index.
async fn dispatch(
    job: &MapJob,
    items: Vec<Value>,
    transform: Arc<dyn ItemTransform>,
    cancel: CancellationToken,
) -> Vec<ItemResult> {
    let semaphore = Arc::new(Semaphore::new(worker_count(job.concurrency, items.len())));
    let schema_required = job.schema.is_some();
    let prompt: Arc<str> = Arc::from(job.prompt.as_str());
    let mut slots: Vec<Option<ItemResult>> = vec![None; items.len()];
    let mut handles = Vec::with_capacity(items.len());

    for (idx, item) in items.into_iter().enumerate() {
        let sem = semaphore.clone();
        let transform = transform.clone();
        let prompt = prompt.clone();
        let cancel = cancel.clone();
        let timeout = job.timeout;
        let max_attempts = job.max_attempts;

        let handle = tokio::spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ItemResult::failure(item, CANCELLED),
                permit = sem.acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => return ItemResult::failure(item, CANCELLED),
                },
            };

            let item_cancel = cancel.child_token();
            let work = process_item(
                transform.as_ref(),
                &prompt,
                &item,
                schema_required,
                max_attempts,
                &item_cancel,
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(CANCELLED.to_string()),
                res = tokio::time::timeout(timeout, work) => match res {
                    Ok(inner) => inner,
                    Err(_) => {
                        tracing::warn!(index = idx, timeout_secs = timeout.as_secs_f64(), "map item timed out");
                        Err(format!("timed out after {}s", timeout.as_secs_f64()))
                    }
                },
            };
            item_cancel.cancel();

            match outcome {
                Ok(output) => ItemResult::success(item, output),
                Err(e) => ItemResult::failure(item, e),
            }
        });
        handles.push((idx, handle));
    }

    for (idx, handle) in handles {
        slots[idx] = Some(match handle.await {
            Ok(result) => result,
            Err(e) => ItemResult::failure(Value::Null, format!("worker failed: {}", e)),
        });
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| ItemResult::failure(Value::Null, "missing result")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::AppError;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Echoes the rendered prompt back as JSON, sleeping per-item.
    struct EchoTransform {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl EchoTransform {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ItemTransform for EchoTransform {
        async fn transform(&self, prompt: String, _cancel: CancellationToken) -> AppResult<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            // Later items finish first
            let delay = if prompt.contains("\"n\":0") { 60 } else { 5 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("```json\n{{\"echo\": {}}}\n```", serde_json::to_string(&prompt)?))
        }
    }

    struct FixedTransform(&'static str, AtomicU32);

    #[async_trait]
    impl ItemTransform for FixedTransform {
        async fn transform(&self, _prompt: String, _cancel: CancellationToken) -> AppResult<String> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(self.0.to_string())
        }
    }

    struct SlowTransform;

    #[async_trait]
    impl ItemTransform for SlowTransform {
        async fn transform(&self, _prompt: String, cancel: CancellationToken) -> AppResult<String> {
            tokio::select! {
                _ = cancel.cancelled() => Err(AppError::cancelled("item")),
                _ = tokio::time::sleep(Duration::from_secs(30)) => Ok("{}".to_string()),
            }
        }
    }

    fn job(dir: &TempDir, lines: &str, schema: Option<Value>) -> MapJob {
        let input_path = dir.path().join("in.jsonl");
        std::fs::write(&input_path, lines).unwrap();
        MapJob {
            input_path,
            output_path: dir.path().join("out.jsonl"),
            prompt: "Transform {{.Input}}".to_string(),
            schema,
            concurrency: 2,
            timeout: Duration::from_secs(5),
            max_attempts: 3,
        }
    }

    fn read_output(job: &MapJob) -> Vec<Value> {
        std::fs::read_to_string(&job.output_path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_render_prompt() {
        let item = json!({"a": 1});
        assert_eq!(render_prompt("Do {{.Input}} now", &item), "Do {\"a\":1} now");
        assert_eq!(render_prompt("Summarize", &item), "Summarize\n\n{\"a\":1}");
    }

    #[test]
    fn test_strip_markdown_fences() {
        assert_eq!(strip_markdown_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_markdown_fences("```\nplain\n```"), "plain");
        assert_eq!(strip_markdown_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_read_jsonl_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.jsonl");
        std::fs::write(&path, "{\"a\":1}\n\n   \n[2]\n\"three\"").unwrap();
        let items = read_jsonl(&path).unwrap();
        assert_eq!(items, vec![json!({"a": 1}), json!([2]), json!("three")]);
    }

    #[test]
    fn test_read_jsonl_reports_bad_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.jsonl");
        std::fs::write(&path, "{\"a\":1}\n\n{oops\n").unwrap();
        let err = read_jsonl(&path).unwrap_err();
        assert!(err.starts_with("invalid JSON at line 3"), "{}", err);
    }

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(worker_count(16, 3), 3);
        assert_eq!(worker_count(2, 10), 2);
        assert_eq!(worker_count(0, 10), 1);
        assert_eq!(worker_count(usize::MAX, 0), 1);
        assert_eq!(worker_count(usize::MAX, usize::MAX), Semaphore::MAX_PERMITS);
    }

    #[tokio::test]
    async fn test_oversized_concurrency_runs() {
        let dir = TempDir::new().unwrap();
        let mut job = job(&dir, "{\"n\":1}\n{\"n\":2}\n", None);
        job.concurrency = usize::MAX;
        let result = run_map(job.clone(), Arc::new(EchoTransform::new()), CancellationToken::new()).await;
        assert!(result.to_content().starts_with("Processed 2 items: 2 succeeded, 0 failed."));
        assert_eq!(read_output(&job).len(), 2);
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let dir = TempDir::new().unwrap();
        let lines: String = (0..6).map(|n| format!("{{\"n\":{}}}\n", n)).collect();
        let job = job(&dir, &lines, None);
        let transform = Arc::new(EchoTransform::new());

        let result = run_map(job.clone(), transform.clone(), CancellationToken::new()).await;
        assert!(result.success);
        assert_eq!(
            result.to_content(),
            format!(
                "Processed 6 items: 6 succeeded, 0 failed.\nOutput written to: {}",
                job.output_path.display()
            )
        );

        let rows = read_output(&job);
        assert_eq!(rows.len(), 6);
        for (n, row) in rows.iter().enumerate() {
            assert_eq!(row["input"], json!({"n": n}));
            assert_eq!(row["error"], Value::Null);
            let echo = row["output"]["echo"].as_str().unwrap();
            assert_eq!(echo, format!("Transform {{\"n\":{}}}", n));
        }
        assert!(transform.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_non_json_output_kept_as_string_without_schema() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, "1\n", None);
        let transform = Arc::new(FixedTransform("not json", AtomicU32::new(0)));
        run_map(job.clone(), transform.clone(), CancellationToken::new()).await;

        let rows = read_output(&job);
        assert_eq!(rows[0]["output"], json!("not json"));
        assert_eq!(transform.1.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_schema_retries_then_fails() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, "1\n", Some(json!({"type": "object"})));
        let transform = Arc::new(FixedTransform("not json", AtomicU32::new(0)));
        let result = run_map(job.clone(), transform.clone(), CancellationToken::new()).await;

        assert!(result.to_content().starts_with("Processed 1 items: 0 succeeded, 1 failed."));
        assert_eq!(transform.1.load(Ordering::SeqCst), 3);
        let rows = read_output(&job);
        assert_eq!(rows[0]["output"], Value::Null);
        assert!(rows[0]["error"].as_str().unwrap().contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn test_item_timeout_recorded_per_line() {
        let dir = TempDir::new().unwrap();
        let mut job = job(&dir, "1\n2\n", None);
        job.timeout = Duration::from_millis(50);
        let result = run_map(job.clone(), Arc::new(SlowTransform), CancellationToken::new()).await;

        assert!(result.to_content().starts_with("Processed 2 items: 0 succeeded, 2 failed."));
        for row in read_output(&job) {
            assert!(row["error"].as_str().unwrap().starts_with("timed out"));
        }
    }

    #[tokio::test]
    async fn test_parent_cancellation_marks_items_cancelled() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, "1\n2\n3\n", None);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let result = run_map(job.clone(), Arc::new(SlowTransform), cancel).await;
        assert!(result.to_content().contains("0 succeeded, 3 failed"));
        for row in read_output(&job) {
            assert_eq!(row["error"], json!("cancelled"));
        }
    }

    #[tokio::test]
    async fn test_empty_and_missing_input() {
        let dir = TempDir::new().unwrap();
        let empty = job(&dir, "\n\n", None);
        let result = run_map(empty, Arc::new(SlowTransform), CancellationToken::new()).await;
        assert_eq!(result.error.as_deref(), Some("Input file is empty"));

        let mut missing = job(&dir, "1\n", None);
        missing.input_path = dir.path().join("nope.jsonl");
        let result = run_map(missing, Arc::new(SlowTransform), CancellationToken::new()).await;
        assert!(result
            .error
            .unwrap()
            .starts_with("Failed to read input file: opening input file"));
    }
}
