// src/pipeline/queries.rs

//! Query set maintenance.
//!
//! Folds a file of newly observed candidate terms into the query set,
//! keeping only terms that are not already covered by an existing query.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::Result;
use crate::models::{Query, QuerySet};
use crate::state::QueryStore;
use crate::utils::fs;

/// Terms known to pull in unrelated, high-volume noise.
pub const BLOCKLIST: &[&str] = &[
    "cnn",
    "crypto",
    "az",
    "breaking",
    "fact",
    "facts",
    "fired",
    "florida",
    "foxnews",
    "freedom",
    "frostedflakes",
    "gif",
    "gifs",
    "giphy",
    "joke",
    "msnbc",
    "notsorry",
    "phoenix",
    "political",
    "politics",
    "racism",
    "texas",
    "tokyo2020",
    "tokyoolympics",
    "tonythetiger",
    "world",
    "worldwide",
];

/// Candidates shorter than this are dropped.
pub const MIN_QUERY_LEN: usize = 4;

/// Inputs of one maintenance run.
#[derive(Debug, Clone)]
pub struct AddQueriesOptions {
    /// One candidate per line
    pub new_file: PathBuf,
    /// Query set to compare against (and update)
    pub existing_file: PathBuf,
    /// Where to write the surviving candidates, before hashtag prefixing
    pub delta_output: Option<PathBuf>,
    /// Prefix survivors with `#`
    pub hashtag: bool,
    /// Append survivors to the query set
    pub update: bool,
}

/// Result of a maintenance run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddQueriesReport {
    pub candidates: usize,
    pub delta: Vec<String>,
    pub appended: usize,
}

/// Candidates not covered by `existing` and not filtered out.
///
/// A candidate is covered when it appears as a substring of any existing
/// query text, compared case-insensitively. Output is lower-case, in input
/// order, without duplicates.
pub fn compute_delta<S: AsRef<str>>(candidates: &[S], existing: &QuerySet) -> Vec<String> {
    let existing: Vec<String> = existing
        .queries()
        .iter()
        .map(|q| q.text.to_lowercase())
        .collect();

    let mut seen = HashSet::new();
    candidates
        .iter()
        .map(|c| c.as_ref().trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .filter(|c| !existing.iter().any(|e| e.contains(c.as_str())))
        .filter(|c| !BLOCKLIST.contains(&c.as_str()))
        .filter(|c| c.chars().count() >= MIN_QUERY_LEN)
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

/// Prefix each term with `#`.
pub fn as_hashtags(terms: &[String]) -> Vec<String> {
    terms.iter().map(|t| format!("#{t}")).collect()
}

/// Run the full maintenance flow against the filesystem.
pub async fn add_queries(options: &AddQueriesOptions) -> Result<AddQueriesReport> {
    let raw = tokio::fs::read_to_string(&options.new_file).await?;
    let candidates: Vec<&str> = raw.lines().collect();

    let store = QueryStore::new(&options.existing_file);
    let mut set = store.load().await?;

    let delta = compute_delta(&candidates, &set);
    log::info!(
        "{} of {} candidates are new against {} existing queries",
        delta.len(),
        candidates.len(),
        set.len()
    );

    if let Some(path) = &options.delta_output {
        let body: String = delta.iter().map(|q| format!("{q}\n")).collect();
        fs::write_bytes(path, body.as_bytes()).await?;
        log::info!("Wrote delta to {}", path.display());
    }

    let texts = if options.hashtag {
        as_hashtags(&delta)
    } else {
        delta.clone()
    };

    let mut appended = 0;
    if options.update {
        for text in texts {
            set.push(Query::new(text));
            appended += 1;
        }
        store.save(&set).await?;
        log::info!("Appended {} queries to {}", appended, store.path().display());
    }

    Ok(AddQueriesReport {
        candidates: candidates.len(),
        delta,
        appended,
    })
}
