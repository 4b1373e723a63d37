use std::{collections::BTreeMap, collections::HashMap, path::Path};

use crate::{
    error::{ForgeError, ForgeResult},
    hash::ContentHash,
};

/// Previously persisted `{path -> content hash}` mapping. One record per
/// line: 64 lowercase hex chars, one space, then the path (which may itself
/// contain spaces).
#[derive(Debug, Default, PartialEq)]
pub struct HashCache {
    entries: HashMap<String, ContentHash>,
}

impl HashCache {
    pub fn empty() -> HashCache {
        HashCache::default()
    }

    pub fn parse(text: &str) -> HashCache {
        let mut entries = HashMap::new();
        for (i, line) in text.lines().enumerate() {
            match parse_line(line) {
                Some((path, hash)) => {
                    entries.insert(path.to_string(), hash);
                }
                None => {
                    if !line.is_empty() {
                        tracing::warn!("malformed cache at line {} skipped", i + 1);
                    }
                }
            }
        }
        HashCache { entries }
    }

    /// Reads a cache file; an absent or unreadable file is an empty cache.
    pub fn read(path: &Path) -> HashCache {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let cache = HashCache::parse(&text);
                tracing::debug!("read {} cache entries", cache.len());
                cache
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no cache file at '{}'", path.display());
                HashCache::empty()
            }
            Err(err) => {
                tracing::warn!("cannot read cache file '{}': {err}", path.display());
                HashCache::empty()
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<ContentHash> {
        self.entries.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn serialize(entries: &BTreeMap<String, ContentHash>) -> String {
        let lines: Vec<String> = entries
            .iter()
            .map(|(path, hash)| format!("{hash} {path}"))
            .collect();
        lines.join("\n")
    }

    pub fn write(path: &Path, entries: &BTreeMap<String, ContentHash>) -> ForgeResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| ForgeError::io(format!("cannot create cache directory: {err}")))?;
        }
        std::fs::write(path, Self::serialize(entries))
            .map_err(|err| ForgeError::io(format!("cannot write cache file: {err}")))
    }
}

fn parse_line(line: &str) -> Option<(&str, ContentHash)> {
    if line.len() < 66 || line.as_bytes()[64] != b' ' {
        return None;
    }
    let hash = ContentHash::parse(&line[..64])?;
    Some((&line[65..], hash))
}
