//! JSON configuration tree.
//!
//! Queries are JSON Pointers (RFC 6901), optionally followed by an equality
//! test:
//!
//! | Query | Matches when |
//! |-------|--------------|
//! | `/server/tls` | the node exists |
//! | `/server/tls/enabled == false` | the node exists and renders as `false` |
//! | `/server/debug != false` | the node exists and does not render as `false` |
//!
//! String nodes compare by their unquoted content. A query that does not
//! start with `/` is rejected with [`ConfigurationError::InvalidQuery`].

use std::path::{Path, PathBuf};

use serde_json::Value;

use ironaudit_core::error::ConfigurationError;
use ironaudit_core::{ConfigurationTree, XPathOutcome};

use crate::error::SourcesError;

/// Maximum configuration file size (10 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct JsonConfigTree {
    path: PathBuf,
    root: Value,
}

#[derive(Debug, PartialEq, Eq)]
enum Test<'a> {
    Exists,
    Equals(&'a str),
    NotEquals(&'a str),
}

impl JsonConfigTree {
    pub fn new(path: impl Into<PathBuf>, root: Value) -> Self {
        Self {
            path: path.into(),
            root,
        }
    }

    pub fn parse(content: &str, path: impl Into<PathBuf>) -> Result<Self, SourcesError> {
        let path = path.into();
        let root = serde_json::from_str(content).map_err(|e| SourcesError::ConfigurationParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { path, root })
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SourcesError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|source| SourcesError::Io {
                path: path_str.clone(),
                source,
            })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(SourcesError::FileTooBig {
                path: path_str,
                size: metadata.len(),
                max: MAX_CONFIG_FILE_SIZE,
            });
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SourcesError::Io {
                path: path_str,
                source,
            })?;
        Self::parse(&content, path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Node at a JSON Pointer, if present.
    pub fn get(&self, pointer: &str) -> Option<&Value> {
        self.root.pointer(pointer)
    }
}

fn split_query(query: &str) -> Result<(&str, Test<'_>), ConfigurationError> {
    let query = query.trim();
    if !query.starts_with('/') {
        return Err(ConfigurationError::InvalidQuery {
            query: query.to_owned(),
            reason: "expected a JSON pointer starting with '/'".to_owned(),
        });
    }
    if let Some((pointer, expected)) = query.split_once("!=") {
        return Ok((pointer.trim(), Test::NotEquals(expected.trim())));
    }
    if let Some((pointer, expected)) = query.split_once("==") {
        return Ok((pointer.trim(), Test::Equals(expected.trim())));
    }
    Ok((query, Test::Exists))
}

fn render_node(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn unquote(expected: &str) -> &str {
    expected
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(expected)
}

impl ConfigurationTree for JsonConfigTree {
    fn xpath_evaluate(&self, query: &str) -> Result<XPathOutcome, ConfigurationError> {
        let (pointer, test) = split_query(query)?;
        let Some(node) = self.root.pointer(pointer) else {
            return Ok(XPathOutcome {
                matched: false,
                nodes: Vec::new(),
                message: format!("no node at {pointer}"),
            });
        };

        let rendered = render_node(node);
        let (matched, message) = match test {
            Test::Exists => (true, format!("{pointer} is present")),
            Test::Equals(expected) => {
                let expected = unquote(expected);
                (
                    rendered == expected,
                    format!("{pointer} is {rendered}, expected {expected}"),
                )
            }
            Test::NotEquals(expected) => {
                let expected = unquote(expected);
                (
                    rendered != expected,
                    format!("{pointer} is {rendered}, must not be {expected}"),
                )
            }
        };

        Ok(XPathOutcome {
            matched,
            nodes: vec![rendered],
            message,
        })
    }

    fn render(&self) -> String {
        serde_json::to_string_pretty(&self.root).unwrap_or_else(|_| self.root.to_string())
    }
}
