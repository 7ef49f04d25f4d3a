//! Mention extraction
//!
//! Finds repository files and identifiers referenced in the user's text for
//! the current run.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::services::llm::types::{Message, MessageRole};

use super::paths::{normalize_rel_path, normalize_unique};

/// Identifiers shorter than this never match a file stem.
const MIN_IDENT_MATCH_LEN: usize = 5;

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_mention_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '(' | ')' | '[' | ']' | '{' | '}' | '<' | '>')
}

/// Path-shaped tokens: maximal runs between whitespace, quotes and brackets.
fn mention_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(is_mention_delimiter).filter(|t| !t.is_empty())
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        Some(_) => "",
        None => name,
    }
}

/// Messages of the current run: everything after the last system message.
///
/// With no system message the whole list is the current run; when the last
/// message is a system message the run is empty.
pub fn current_run_messages(messages: &[Message]) -> &[Message] {
    match messages.iter().rposition(|m| m.role == MessageRole::System) {
        None => messages,
        Some(idx) => &messages[idx + 1..],
    }
}

/// Concatenated text parts of `messages`.
pub fn messages_text(messages: &[Message]) -> String {
    messages.iter().map(Message::text_content).collect()
}

/// Addable repo files mentioned in `text`, sorted.
///
/// A file is mentioned when its exact relative path appears as a token, or
/// when its basename is unique among addable files, appears in the text, and
/// is not shared with any file already in chat or read-only.
pub fn extract_mentioned_fnames(
    text: &str,
    addable_repo_files: &[String],
    in_chat_or_read_only_files: &[String],
) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let in_chat_basenames: HashSet<String> = normalize_unique(in_chat_or_read_only_files)
        .iter()
        .map(|f| basename(f).to_string())
        .filter(|b| !b.is_empty())
        .collect();

    let addable = normalize_unique(addable_repo_files);
    let addable_set: HashSet<&str> = addable.iter().map(String::as_str).collect();

    let mut by_basename: HashMap<&str, Vec<&str>> = HashMap::new();
    for f in &addable {
        let name = basename(f);
        if !name.is_empty() {
            by_basename.entry(name).or_default().push(f.as_str());
        }
    }

    let mut mentioned: BTreeSet<String> = BTreeSet::new();

    for token in mention_tokens(text) {
        let Some(normalized) = normalize_rel_path(token) else {
            continue;
        };
        if addable_set.contains(normalized.as_str()) {
            by_basename.remove(basename(&normalized));
            mentioned.insert(normalized);
        }
    }

    for (name, files) in &by_basename {
        if in_chat_basenames.contains(*name) {
            continue;
        }
        if let [only] = files.as_slice() {
            if text.contains(name) {
                mentioned.insert(only.to_string());
            }
        }
    }

    mentioned.into_iter().collect()
}

/// Identifier-shaped tokens in `text`, sorted and deduplicated.
///
/// Word runs (`[A-Za-z0-9_]+`) are collected together with any path-like
/// token (one containing `/` or `.`), so `path/to/file.go` yields `path`,
/// `to`, `file`, `go` and `path/to/file.go`.
pub fn extract_idents(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut seen: BTreeSet<String> = text
        .split(|c: char| !is_word_char(c))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    for token in mention_tokens(text) {
        let token = token.trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?'));
        let path_like = token.contains('/') || token.contains('.');
        if path_like && token.chars().any(is_word_char) {
            seen.insert(token.to_string());
        }
    }

    seen.into_iter().collect()
}

/// Repo files whose lowercase stem equals an identifier (or whose lowercase
/// basename equals a dotted identifier). Identifiers shorter than five
/// characters are ignored.
pub fn ident_filename_matches(idents: &[String], all_repo_files: &[String]) -> Vec<String> {
    if idents.is_empty() || all_repo_files.is_empty() {
        return Vec::new();
    }

    let files = normalize_unique(all_repo_files);
    let mut by_stem: HashMap<String, Vec<&str>> = HashMap::new();
    for f in &files {
        let s = stem(basename(f)).to_lowercase();
        if !s.is_empty() {
            by_stem.entry(s).or_default().push(f.as_str());
        }
    }

    let mut matched: BTreeSet<String> = BTreeSet::new();
    for ident in idents {
        let ident = ident.trim();
        if ident.len() < MIN_IDENT_MATCH_LEN {
            continue;
        }
        let lower = ident.to_lowercase();

        if ident.contains('.') {
            for f in &files {
                if basename(f).to_lowercase() == lower {
                    matched.insert(f.clone());
                }
            }
        }

        if let Some(hits) = by_stem.get(&lower) {
            matched.extend(hits.iter().map(|f| f.to_string()));
        }
    }

    matched.into_iter().collect()
}

/// Sorted, deduplicated merge of two path lists.
pub fn merge_sorted_unique(a: &[String], b: &[String]) -> Vec<String> {
    let merged: BTreeSet<&String> = a.iter().chain(b.iter()).collect();
    merged.into_iter().cloned().collect()
}
