//! Filesystem-safe fingerprints of a call's namespace and arguments.

use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// One argument value of a memoized call.
#[derive(Debug, Clone, PartialEq)]
pub enum SlugValue {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Text(String),
    Path(PathBuf),
}

impl SlugValue {
    /// Text form used in fingerprints, before normalization.
    fn render(&self) -> String {
        match self {
            SlugValue::None => "none".to_string(),
            SlugValue::Bool(b) => b.to_string(),
            SlugValue::Int(i) => i.to_string(),
            // Debug keeps the fractional part, so 100.0 stays distinct from 100.
            SlugValue::Float(f) => format!("{f:?}"),
            SlugValue::Text(s) => s.clone(),
            SlugValue::Path(p) => p.to_string_lossy().into_owned(),
        }
    }
}

macro_rules! slug_value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for SlugValue {
            fn from(v: $t) -> Self {
                SlugValue::Int(i128::from(v))
            }
        })*
    };
}

slug_value_from_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl From<usize> for SlugValue {
    fn from(v: usize) -> Self {
        SlugValue::Int(v as i128)
    }
}

impl From<f32> for SlugValue {
    fn from(v: f32) -> Self {
        SlugValue::Float(f64::from(v))
    }
}

impl From<f64> for SlugValue {
    fn from(v: f64) -> Self {
        SlugValue::Float(v)
    }
}

impl From<bool> for SlugValue {
    fn from(v: bool) -> Self {
        SlugValue::Bool(v)
    }
}

impl From<&str> for SlugValue {
    fn from(v: &str) -> Self {
        SlugValue::Text(v.to_string())
    }
}

impl From<String> for SlugValue {
    fn from(v: String) -> Self {
        SlugValue::Text(v)
    }
}

impl From<&Path> for SlugValue {
    fn from(v: &Path) -> Self {
        SlugValue::Path(v.to_path_buf())
    }
}

impl From<PathBuf> for SlugValue {
    fn from(v: PathBuf) -> Self {
        SlugValue::Path(v)
    }
}

impl<T: Into<SlugValue>> From<Option<T>> for SlugValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SlugValue::None, Into::into)
    }
}

/// Ordered named arguments of a memoized call.
///
/// Order is significant: the same values in a different order give a
/// different fingerprint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlugArgs {
    args: Vec<(String, SlugValue)>,
}

impl SlugArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument. Setting a name twice replaces the value in place.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<SlugValue>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.args.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.args.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&SlugValue> {
        self.args.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            SlugValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i128> {
        match self.get(name)? {
            SlugValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float argument; integers are widened.
    pub fn float(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            SlugValue::Float(f) => Some(*f),
            SlugValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            SlugValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Path argument; text values are accepted as paths.
    pub fn path(&self, name: &str) -> Option<&Path> {
        match self.get(name)? {
            SlugValue::Path(p) => Some(p.as_path()),
            SlugValue::Text(s) => Some(Path::new(s)),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SlugValue)> {
        self.args.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Cache key and output file stem of a memoized call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fingerprint of `namespace` called with `args`.
///
/// `icon` with `file="round.png", size=100` gives `icon-file-roundptpng-size-100`.
///
/// Values are compared by their text form only. `Text("none")` fingerprints
/// like [`SlugValue::None`], `Text("true")` like `Bool(true)` and `Text("12")`
/// like `Int(12)`, so callers mixing those in one argument position share
/// outputs.
pub fn fingerprint(namespace: &str, args: &SlugArgs) -> Fingerprint {
    let mut out = normalize(namespace);
    for (name, value) in args.iter() {
        out.push('-');
        out.push_str(&normalize(name));
        out.push('-');
        out.push_str(&normalize(&value.render()));
    }
    Fingerprint(out)
}

/// Map text onto `[a-z0-9_]`.
///
/// `.` becomes `pt`, path separators become `sl`, whitespace becomes `_` and
/// anything else outside the alphabet is spelled as `x` plus its hex code
/// point. The `-` joiner is escaped too, so parts never run together.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        match c {
            'a'..='z' | '0'..='9' | '_' => out.push(c),
            '.' => out.push_str("pt"),
            '/' | '\\' => out.push_str("sl"),
            c if c.is_whitespace() => out.push('_'),
            c => {
                let _ = write!(out, "x{:x}", u32::from(c));
            }
        }
    }
    out
}
