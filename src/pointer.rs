//! Pointer algebra: absolute and relative JSON pointers.
//!
//! Two token grammars are accepted:
//! - absolute: zero or more `/segment` (`""` is the root)
//! - relative: a decimal ascent count followed by zero or more `/segment`
//!   (`0` is "this node", `2/a/b` climbs two levels then descends `a`, `b`)
//!
//! Segments are opaque keys. A segment that is a canonical base-10 digit
//! sequence (`0`, `7`, `42`, never `007`) becomes an index key so that array
//! positions and object names share one path type.
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use thiserror::Error;

static POINTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]*)((?:/[^/]+)*)$").expect("pointer grammar is a valid regex"));

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("invalid JSON pointer \"{0}\"")]
    Syntax(String),
    #[error("pointer reference out of limit: \"{pointer}\" ascends {ascend} level(s) from \"{base}\"")]
    Range {
        pointer: String,
        base: String,
        ascend: usize,
    },
}

/// One step of a path: an object property name or an array position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Name(String),
    Index(usize),
}

/// A parsed pointer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    relative: bool,
    ascend: usize,
    descend: Vec<Key>,
}

// ————————————————————————————————————————————————————————————————————————————
// KEY
// ————————————————————————————————————————————————————————————————————————————

impl Key {
    /// Classify a raw segment: canonical digit sequences become indices.
    pub fn parse(token: &str) -> Key {
        let canonical = !token.is_empty()
            && token.bytes().all(|b| b.is_ascii_digit())
            && (token == "0" || !token.starts_with('0'));
        if canonical {
            if let Ok(index) = token.parse::<usize>() {
                return Key::Index(index);
            }
        }
        Key::Name(token.to_string())
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Name(_) => None,
        }
    }

    /// Property name used when this key addresses an object.
    pub fn to_name(&self) -> String {
        match self {
            Key::Name(name) => name.clone(),
            Key::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Key {
    fn from(token: &str) -> Self {
        Key::parse(token)
    }
}

impl From<String> for Key {
    fn from(token: String) -> Self {
        Key::parse(&token)
    }
}

impl From<&String> for Key {
    fn from(token: &String) -> Self {
        Key::parse(token)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// POINTER
// ————————————————————————————————————————————————————————————————————————————

impl Pointer {
    pub fn parse(token: &str) -> Result<Pointer, PointerError> {
        let caps = POINTER_RE
            .captures(token)
            .ok_or_else(|| PointerError::Syntax(token.to_string()))?;
        let count = caps.get(1).map_or("", |m| m.as_str());
        let relative = !count.is_empty();
        // digits only, so a failed parse is an overflow; resolve reports it as out of range
        let ascend = if relative { count.parse::<usize>().unwrap_or(usize::MAX) } else { 0 };
        let descend = caps
            .get(2)
            .map_or("", |m| m.as_str())
            .split('/')
            .skip(1)
            .map(Key::parse)
            .collect();
        Ok(Pointer { relative, ascend, descend })
    }

    pub fn is_relative(&self) -> bool {
        self.relative
    }

    pub fn ascend(&self) -> usize {
        self.ascend
    }

    pub fn descend(&self) -> &[Key] {
        &self.descend
    }

    /// Resolve against `base` (an absolute path), yielding a new absolute path.
    ///
    /// Ascent is strict: climbing above the root fails with
    /// [`PointerError::Range`]. Descent is structural only; whether the
    /// target exists is the caller's concern.
    pub fn resolve(&self, base: &[Key]) -> Result<Vec<Key>, PointerError> {
        let mut path = if self.relative { base.to_vec() } else { Vec::new() };
        if self.ascend > path.len() {
            return Err(PointerError::Range {
                pointer: self.to_string(),
                base: path_to_string(base),
                ascend: self.ascend,
            });
        }
        path.truncate(path.len() - self.ascend);
        path.extend(self.descend.iter().cloned());
        Ok(path)
    }
}

impl FromStr for Pointer {
    type Err = PointerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pointer::parse(s)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.relative {
            write!(f, "{}", self.ascend)?;
        }
        f.write_str(&path_to_string(&self.descend))
    }
}

impl Serialize for Pointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// Canonical string form of an absolute path: `""` or `/seg1/seg2/...`.
pub fn path_to_string(path: &[Key]) -> String {
    let mut out = String::new();
    for key in path {
        out.push('/');
        out.push_str(&key.to_string());
    }
    out
}

/// Parse a pointer that must be absolute.
pub fn parse_absolute(token: &str) -> Result<Vec<Key>, PointerError> {
    let pointer = Pointer::parse(token)?;
    if pointer.is_relative() {
        return Err(PointerError::Syntax(token.to_string()));
    }
    Ok(pointer.descend)
}

/// Resolve `token` (absolute or relative) against `base` in one go.
pub fn resolve(base: &[Key], token: &str) -> Result<Vec<Key>, PointerError> {
    Pointer::parse(token)?.resolve(base)
}
