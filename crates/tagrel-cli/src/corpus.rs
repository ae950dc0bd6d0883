//! Corpus files: one tag list per object.
//!
//! Accepted layouts:
//! - a single JSON array of tag arrays: `[["sky", "sea"], ["city"]]`
//! - JSON lines, one tag array per line; blank lines are skipped

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tagrel_core::TagIndex;

pub fn parse_corpus(text: &str) -> Result<Vec<Vec<String>>> {
    if let Ok(objects) = serde_json::from_str::<Vec<Vec<String>>>(text) {
        return Ok(objects);
    }

    let mut objects = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let tags: Vec<String> = serde_json::from_str(line)
            .map_err(|e| anyhow!("line {}: expected a JSON array of tags: {e}", line_no + 1))?;
        objects.push(tags);
    }
    Ok(objects)
}

pub fn load_index(path: &Path) -> Result<TagIndex> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read corpus {}", path.display()))?;
    let objects =
        parse_corpus(&text).with_context(|| format!("failed to parse corpus {}", path.display()))?;
    if objects.is_empty() {
        tracing::warn!(path = %path.display(), "corpus is empty");
    }
    Ok(TagIndex::build(objects))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_and_json_lines() {
        let array = parse_corpus(r#"[["a", "b"], ["c"]]"#).unwrap();
        assert_eq!(array, vec![vec!["a", "b"], vec!["c"]]);

        let lines = parse_corpus("[\"a\", \"b\"]\n\n[\"c\"]\n").unwrap();
        assert_eq!(lines, array);
    }

    #[test]
    fn reports_bad_line() {
        let err = parse_corpus("[\"a\"]\n{\"tags\": 1}\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn empty_file_is_an_empty_corpus() {
        assert!(parse_corpus("").unwrap().is_empty());
    }
}
