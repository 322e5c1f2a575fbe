//! Minimal answer loader: a dataset reference is a path to either a JSON
//! array of strings or a plain text file with one answer per line. Blank
//! entries are dropped.

use std::path::Path;

use crate::error::CodeframeError;

pub fn load_answers(path: &Path) -> Result<Vec<String>, CodeframeError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        CodeframeError::Dataset(format!("cannot read {}: {e}", path.display()))
    })?;

    let answers: Vec<String> = match serde_json::from_str::<Vec<String>>(&contents) {
        Ok(list) => list,
        Err(_) => contents.lines().map(str::to_string).collect(),
    };

    Ok(answers
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect())
}
