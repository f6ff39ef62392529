//! Structural comparison of expected and actual output objects.
//!
//! Output objects are JSON-like values with special semantics for
//! `class: File` and `class: Directory` maps: locations match by suffix,
//! file contents/checksums/sizes are verified against the filesystem, and
//! directory listings compare as unordered sets. Everything else compares
//! structurally, with the literal string `"Any"` acting as a wildcard.

use crate::fsaccess::{FsAccess, StdFsAccess};
use serde::Serialize;
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::fmt;
use std::io::Read;

/// Keys on File/Directory objects handled by the dedicated checks rather
/// than the generic key comparator.
const RESERVED_KEYS: [&str; 6] = ["path", "location", "listing", "contents", "checksum", "size"];

/// A comparison mismatch, with an optional nested cause describing which
/// sub-structure diverged.
#[derive(Debug)]
pub struct CompareError {
    message: String,
    cause: Option<Box<CompareError>>,
}

impl CompareError {
    /// A failure with a bare message and no expected/got dump.
    pub fn new(message: impl Into<String>) -> Self {
        CompareError {
            message: message.into(),
            cause: None,
        }
    }

    /// A failure carrying pretty-printed dumps of both sides.
    pub fn format<E: Serialize, A: Serialize>(
        expected: &E,
        actual: &A,
        cause: Option<CompareError>,
    ) -> Self {
        CompareError {
            message: format!(
                "expected: {}\ngot: {}",
                json_pretty(expected),
                json_pretty(actual)
            ),
            cause: cause.map(Box::new),
        }
    }

    /// The nested failure this one wraps, if any.
    pub fn cause(&self) -> Option<&CompareError> {
        self.cause.as_deref()
    }
}

impl fmt::Display for CompareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, "\ncaused by: {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompareError {}

/// Render a value as 4-space-indented JSON with sorted keys, matching the
/// shape comparison messages are expected to have.
pub fn json_pretty<T: Serialize>(value: &T) -> String {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    match value.serialize(&mut ser) {
        Ok(()) => String::from_utf8_lossy(&out).to_string(),
        Err(_) => "<unserializable>".to_string(),
    }
}

type Map = serde_json::Map<String, Value>;

/// How an expected mapping compares, decided once per node from its
/// `class` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MappingKind {
    File,
    Directory,
    Record,
}

fn classify(map: &Map) -> MappingKind {
    match map.get("class").and_then(Value::as_str) {
        Some("File") => MappingKind::File,
        Some("Directory") => MappingKind::Directory,
        _ => MappingKind::Record,
    }
}

/// Recursive comparator over an injected filesystem capability.
pub struct Comparator {
    fs: Box<dyn FsAccess>,
}

impl Comparator {
    /// Compare through the given filesystem capability.
    pub fn new(fs: Box<dyn FsAccess>) -> Self {
        Comparator { fs }
    }

    /// Compare through the local filesystem, paths taken as-is.
    pub fn local() -> Self {
        Comparator::new(Box::new(StdFsAccess::new("")))
    }

    /// Compare an expected output object against an actual one.
    ///
    /// `skip_details` bypasses on-disk existence, checksum, and size
    /// verification, comparing declared metadata only.
    pub fn compare(
        &self,
        expected: &Value,
        actual: &Value,
        skip_details: bool,
    ) -> Result<(), CompareError> {
        if matches!(expected, Value::String(s) if s == "Any") {
            return Ok(());
        }
        if !expected.is_null() && actual.is_null() {
            return Err(CompareError::format(expected, actual, None));
        }

        match expected {
            Value::Object(exp) => {
                let Value::Object(act) = actual else {
                    return Err(CompareError::format(expected, actual, None));
                };
                match classify(exp) {
                    MappingKind::File => self.compare_file(exp, act, skip_details),
                    MappingKind::Directory => self.compare_directory(exp, act, skip_details),
                    MappingKind::Record => self.compare_record(exp, act, skip_details),
                }
            }
            Value::Array(exp) => {
                let Value::Array(act) = actual else {
                    return Err(CompareError::format(expected, actual, None));
                };
                if exp.len() != act.len() {
                    return Err(CompareError::format(
                        expected,
                        actual,
                        Some(CompareError::new("lengths don't match")),
                    ));
                }
                for (e, a) in exp.iter().zip(act.iter()) {
                    self.compare(e, a, skip_details)
                        .map_err(|err| CompareError::format(expected, actual, Some(err)))?;
                }
                Ok(())
            }
            _ => {
                if scalar_eq(expected, actual) {
                    Ok(())
                } else {
                    Err(CompareError::format(expected, actual, None))
                }
            }
        }
    }

    fn compare_record(&self, exp: &Map, act: &Map, skip_details: bool) -> Result<(), CompareError> {
        for (key, exp_val) in exp {
            let act_val = act.get(key).unwrap_or(&Value::Null);
            self.compare(exp_val, act_val, skip_details).map_err(|err| {
                CompareError::format(
                    exp,
                    act,
                    Some(CompareError::new(format!(
                        "failed comparison for key '{key}': {err}"
                    ))),
                )
            })?;
        }
        for (key, act_val) in act {
            if !exp.contains_key(key) && !act_val.is_null() {
                return Err(CompareError::format(
                    exp,
                    act,
                    Some(CompareError::new(format!("unexpected key '{key}'"))),
                ));
            }
        }
        Ok(())
    }

    fn compare_directory(
        &self,
        exp: &Map,
        act: &Map,
        skip_details: bool,
    ) -> Result<(), CompareError> {
        if act.get("class").and_then(Value::as_str) != Some("Directory") {
            return Err(CompareError::format(
                exp,
                act,
                Some(CompareError::new("expected object with a class 'Directory'")),
            ));
        }
        if !act.contains_key("listing") {
            return Err(CompareError::format(
                exp,
                act,
                Some(CompareError::new(
                    "'listing' is mandatory field in Directory object",
                )),
            ));
        }
        let empty = Vec::new();
        let exp_listing = exp.get("listing").and_then(Value::as_array).unwrap_or(&empty);
        let act_listing = act.get("listing").and_then(Value::as_array).unwrap_or(&empty);
        // Order-independent, first match wins.
        for entry in exp_listing {
            let found = act_listing
                .iter()
                .any(|candidate| self.compare(entry, candidate, skip_details).is_ok());
            if !found {
                return Err(CompareError::format(
                    exp,
                    act,
                    Some(CompareError::new(format!("{} not found", json_pretty(entry)))),
                ));
            }
        }
        // Directories share the non-listing comparison path with files.
        self.compare_file(exp, act, skip_details)
    }

    fn compare_file(&self, exp: &Map, act: &Map, skip_details: bool) -> Result<(), CompareError> {
        self.compare_location(exp, act, skip_details)?;
        if exp.contains_key("contents") {
            self.compare_contents(exp, act)?;
        }
        if act.get("class").and_then(Value::as_str) == Some("File") && !skip_details {
            self.compare_checksum(exp, act)?;
            self.compare_size(exp, act)?;
        }
        for (key, exp_val) in exp {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            let act_val = act.get(key).unwrap_or(&Value::Null);
            self.compare(exp_val, act_val, skip_details).map_err(|err| {
                CompareError::format(
                    exp,
                    act,
                    Some(CompareError::new(format!(
                        "field '{key}' failed comparison: {err}"
                    ))),
                )
            })?;
        }
        Ok(())
    }

    fn compare_location(&self, exp: &Map, act: &Map, skip_details: bool) -> Result<(), CompareError> {
        // Prefer `path` over `location` on both sides.
        let Some(exp_loc) = exp.get("path").or_else(|| exp.get("location")) else {
            return Ok(());
        };
        let exp_loc = value_as_str(exp_loc);
        let act_loc = match act.get("path").or_else(|| act.get("location")) {
            Some(v) => value_as_str(v),
            None => {
                return Err(CompareError::format(
                    exp,
                    act,
                    Some(CompareError::new(
                        "no 'path' or 'location' in output object",
                    )),
                ));
            }
        };

        let is_directory = act.get("class").and_then(Value::as_str) == Some("Directory");
        let act_loc = if is_directory {
            act_loc.trim_end_matches('/').to_string()
        } else {
            act_loc
        };

        let exists = if is_directory {
            self.fs.is_dir(&act_loc)
        } else {
            self.fs.is_file(&act_loc)
        };
        if !exists && !skip_details {
            return Err(CompareError::format(
                exp,
                act,
                Some(CompareError::new(format!("{act_loc} does not exist"))),
            ));
        }

        if exp_loc != "Any"
            && !(act_loc.ends_with(&format!("/{exp_loc}"))
                || (!act_loc.contains('/') && exp_loc == act_loc))
        {
            return Err(CompareError::format(
                exp,
                act,
                Some(CompareError::new(format!(
                    "{act_loc} does not end with {exp_loc}"
                ))),
            ));
        }
        Ok(())
    }

    fn compare_contents(&self, exp: &Map, act: &Map) -> Result<(), CompareError> {
        let expected_contents = exp.get("contents").map(value_as_str).unwrap_or_default();
        let path = actual_path(act);
        let mut actual_contents = String::new();
        self.fs
            .open(&path)
            .and_then(|mut reader| reader.read_to_string(&mut actual_contents))
            .map_err(|err| CompareError::new(err.to_string()))?;
        if expected_contents != actual_contents {
            let detail = format!(
                "Output file contents do not match: actual '{actual_contents}' is not equal to expected '{expected_contents}'"
            );
            return Err(CompareError::format(
                exp,
                act,
                Some(CompareError::new(
                    serde_json::to_string(&detail).unwrap_or(detail),
                )),
            ));
        }
        Ok(())
    }

    fn compare_checksum(&self, exp: &Map, act: &Map) -> Result<(), CompareError> {
        let path = actual_path(act);
        let mut reader = self
            .fs
            .open(&path)
            .map_err(|err| CompareError::new(err.to_string()))?;
        let mut hasher = Sha1::new();
        let mut buf = vec![0u8; 1024 * 1024];
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|err| CompareError::new(err.to_string()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let on_disk = format!("sha1${}", hex::encode(hasher.finalize()));

        if let Some(declared) = act.get("checksum").and_then(Value::as_str)
            && on_disk != declared
        {
            return Err(CompareError::format(
                exp,
                act,
                Some(CompareError::new(format!(
                    "Output file checksums do not match: actual '{on_disk}' on disk \
                     is not equal to actual '{declared}' in the output object"
                ))),
            ));
        }
        if let Some(expected_checksum) = exp.get("checksum").and_then(Value::as_str)
            && expected_checksum != on_disk
        {
            return Err(CompareError::format(
                exp,
                act,
                Some(CompareError::new(format!(
                    "Output file checksums do not match: actual '{on_disk}' \
                     is not equal to expected '{expected_checksum}'"
                ))),
            ));
        }
        Ok(())
    }

    fn compare_size(&self, exp: &Map, act: &Map) -> Result<(), CompareError> {
        let path = actual_path(act);
        let on_disk = self
            .fs
            .size(&path)
            .map_err(|err| CompareError::new(err.to_string()))?;

        if let Some(declared) = act.get("size").and_then(Value::as_u64)
            && on_disk != declared
        {
            return Err(CompareError::format(
                exp,
                act,
                Some(CompareError::new(format!(
                    "Output file sizes do not match: actual {on_disk} on disk \
                     is not equal to actual {declared} in the output object"
                ))),
            ));
        }
        if let Some(expected_size) = exp.get("size").and_then(Value::as_u64)
            && expected_size != on_disk
        {
            return Err(CompareError::format(
                exp,
                act,
                Some(CompareError::new(format!(
                    "Output file sizes do not match: actual {on_disk} \
                     is not equal to expected {expected_size}"
                ))),
            ));
        }
        Ok(())
    }
}

/// The on-disk path of an actual File/Directory object.
fn actual_path(act: &Map) -> String {
    act.get("path")
        .or_else(|| act.get("location"))
        .map(value_as_str)
        .unwrap_or_default()
}

fn value_as_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Scalar equality with numeric coercion: `1` and `1.0` compare equal.
fn scalar_eq(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                x == y
            } else {
                a.as_f64() == b.as_f64()
            }
        }
        _ => expected == actual,
    }
}
