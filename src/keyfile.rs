//! Desktop key files
//!
//! Parsing is left to `freedesktop-desktop-entry`; this module looks up
//! groups and keys and splits `;`-separated string lists.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use freedesktop_desktop_entry::{DecodeError, DesktopEntry};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyFileError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("no {0} in any search directory")]
    NotFound(String),

    #[error("group [{0}] not found")]
    GroupNotFound(String),

    #[error("key {key} not found in group [{group}]")]
    KeyNotFound { group: String, key: String },

    #[error("invalid escape in value of {key}")]
    InvalidEscape { key: String },
}

impl KeyFileError {
    /// Missing data rather than broken data
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            KeyFileError::NotFound(_)
                | KeyFileError::GroupNotFound(_)
                | KeyFileError::KeyNotFound { .. }
        )
    }
}

#[derive(Debug)]
pub struct KeyFile {
    entry: DesktopEntry,
}

impl KeyFile {
    pub fn parse(path: &Path, text: &str) -> Result<Self, KeyFileError> {
        let entry = DesktopEntry::from_str(path, text, None::<&[&str]>).map_err(|source| {
            KeyFileError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Self { entry })
    }

    pub fn load(path: &Path) -> Result<Self, KeyFileError> {
        let text = fs::read_to_string(path).map_err(|source| KeyFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    /// Load `file_name` from the first directory that has it
    pub fn load_from_dirs(file_name: &str, dirs: &[PathBuf]) -> Result<(Self, PathBuf), KeyFileError> {
        for dir in dirs {
            let path = dir.join(file_name);
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => return Ok((Self::load(&path)?, path)),
                _ => continue,
            }
        }
        Err(KeyFileError::NotFound(file_name.to_string()))
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.entry.groups.group(group).is_some()
    }

    pub fn value(&self, group: &str, key: &str) -> Result<&str, KeyFileError> {
        let entries = self
            .entry
            .groups
            .group(group)
            .ok_or_else(|| KeyFileError::GroupNotFound(group.to_string()))?;
        entries.entry(key).ok_or_else(|| KeyFileError::KeyNotFound {
            group: group.to_string(),
            key: key.to_string(),
        })
    }

    pub fn string_list(&self, group: &str, key: &str) -> Result<Vec<String>, KeyFileError> {
        split_list(self.value(group, key)?).ok_or_else(|| KeyFileError::InvalidEscape {
            key: key.to_string(),
        })
    }
}

/// Split a string list value, resolving `\;`, `\s`, `\n`, `\t`, `\r` and `\\`
fn split_list(raw: &str) -> Option<Vec<String>> {
    let mut items = Vec::new();
    let mut item = String::new();
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => item.push(match chars.next()? {
                ';' => ';',
                's' => ' ',
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '\\' => '\\',
                _ => return None,
            }),
            ';' => items.push(std::mem::take(&mut item)),
            c => item.push(c),
        }
    }
    if !item.is_empty() {
        items.push(item);
    }
    Some(items)
}
