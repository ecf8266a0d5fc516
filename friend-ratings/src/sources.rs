use crate::types::Result;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Split comma separated arguments into friend ids.
pub fn parse_source_args<S: AsRef<str>>(args: &[S]) -> Vec<String> {
    args.iter()
        .flat_map(|arg| arg.as_ref().split(','))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// One friend id per line; blank lines and `#` comments are ignored.
pub fn parse_source_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn load_source_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_source_list(&content))
}

/// Drop repeated ids, keeping the first occurrence and the original order.
pub fn dedup_sources(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
