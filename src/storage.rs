//! Hierarchical document storage backed by JSON.
//!
//! Every persisted document is a single JSON object whose first key names
//! the top-level node, mirroring a named-node key-value store. Readers only
//! look at that first node; writers always produce exactly one.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::constants::{COMMENT_KEY, DOC_EXTENSION, STAGE_FILE_PREFIX};
use crate::error::StorageError;

/// Parses a whole document.
pub fn read_document(path: &Path) -> Result<Value, StorageError> {
    let file = File::open(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| StorageError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// First named node of a document, if the document is a non-empty map.
pub fn first_top_level_node(doc: &Value) -> Option<&Value> {
    doc.as_object().and_then(|map| map.values().next())
}

/// Opens `path` and detaches its first top-level node.
pub fn read_first_node(path: &Path) -> Result<Value, StorageError> {
    let doc = read_document(path)?;
    match doc {
        Value::Object(map) => map
            .into_iter()
            .next()
            .map(|(_, node)| node)
            .ok_or_else(|| StorageError::NoTopLevelNode(path.to_path_buf())),
        _ => Err(StorageError::NoTopLevelNode(path.to_path_buf())),
    }
}

/// Writes `{ name: body }` to `path`, pretty-printed.
pub fn write_document(path: &Path, name: &str, body: Value) -> Result<(), StorageError> {
    let io_err = |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut root = Map::new();
    root.insert(name.to_string(), body);

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &Value::Object(root)).map_err(|source| {
        StorageError::Write {
            path: path.to_path_buf(),
            source,
        }
    })?;
    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)
}

/// Node name derived from a file name: the stem with every character that is
/// not alphanumeric, `-` or `_` replaced, prefixed with `_` when it does not
/// start with a letter.
pub fn default_object_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let mut name = String::with_capacity(stem.len() + 1);
    if !stem
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    {
        name.push('_');
    }
    name.extend(stem.chars().map(|c| {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            c
        } else {
            '_'
        }
    }));

    if name == "_" {
        "unnamed".to_string()
    } else {
        name
    }
}

/// `stage<N>.json`, N in plain decimal.
pub fn stage_file_name(index: usize) -> String {
    format!("{STAGE_FILE_PREFIX}{index}.{DOC_EXTENSION}")
}

/// Path of stage `index` inside a cascade directory.
pub fn stage_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(stage_file_name(index))
}

/// Prepends a comment entry to a map.
pub fn with_comment(comment: &str, body: Map<String, Value>) -> Value {
    let mut map = Map::with_capacity(body.len() + 1);
    map.insert(COMMENT_KEY.to_string(), Value::String(comment.to_string()));
    map.extend(body);
    Value::Object(map)
}

pub fn get_str<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get(key).and_then(Value::as_str)
}

pub fn get_i64(node: &Value, key: &str) -> Option<i64> {
    node.get(key).and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
    })
}

pub fn get_f64(node: &Value, key: &str) -> Option<f64> {
    node.get(key).and_then(Value::as_f64)
}
