//! Demo selection: which episodes a run processes, and in what order.

use trajview_env::{DatasetReader, EnvError};

use crate::error::PlaybackError;

/// Resolves the ordered list of episode identifiers to process.
///
/// Candidates come from the named subset when `filter_key` is given
/// (missing subsets are a fatal [`PlaybackError::NotFound`]), or from
/// the whole dataset otherwise. Ordering is ascending by the numeric
/// suffix of each identifier, so "ep2" sorts before "ep10"; ids
/// without a suffix sort first, by string. `limit` truncates after
/// sorting.
pub fn select_demos(
    dataset: &dyn DatasetReader,
    filter_key: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<String>, PlaybackError> {
    let mut ids = match filter_key {
        Some(key) => dataset.mask(key).map_err(|e| match e {
            EnvError::NotFound(what) => PlaybackError::NotFound(what),
            other => PlaybackError::Env(other),
        })?,
        None => dataset.episode_ids(),
    };

    ids.sort_by(|a, b| {
        (numeric_suffix(a), a.as_str()).cmp(&(numeric_suffix(b), b.as_str()))
    });

    if let Some(n) = limit {
        ids.truncate(n);
    }
    Ok(ids)
}

/// Extracts the trailing decimal number of an identifier, if any.
fn numeric_suffix(id: &str) -> Option<u64> {
    let digits = id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .map(|(i, _)| i)
        .last()?;
    id[digits..].parse().ok()
}
