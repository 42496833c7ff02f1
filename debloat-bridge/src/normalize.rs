//! Result normalization.
//!
//! Every host names its result fields differently. Each output slot has an
//! ordered list of candidate field names; the first one present wins.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::BridgeError;

pub const EXIT_CODE_FIELDS: &[&str] = &[
    "exitCode",
    "exit_code",
    "code",
    "errno",
    "status",
    "returnCode",
    "rc",
];
pub const STDOUT_FIELDS: &[&str] = &["stdout", "out", "output", "result", "data"];
pub const STDERR_FIELDS: &[&str] = &["stderr", "err", "error", "errorOutput"];
pub const SUCCESS_FIELDS: &[&str] = &["success", "ok"];

/// The fixed result triple every host result is reduced to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout on exit code 0, `CommandFailed` otherwise.
    pub fn into_stdout(self) -> Result<String, BridgeError> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(BridgeError::command_failed(self.exit_code, &self.stderr))
        }
    }
}

pub fn normalize(value: &Value) -> CommandOutput {
    match value {
        Value::Null => CommandOutput::default(),
        Value::Bool(ok) => CommandOutput {
            exit_code: if *ok { 0 } else { 1 },
            ..CommandOutput::default()
        },
        Value::Number(_) => CommandOutput {
            exit_code: exit_code_of(value).unwrap_or(0),
            ..CommandOutput::default()
        },
        Value::String(text) => CommandOutput {
            stdout: text.clone(),
            ..CommandOutput::default()
        },
        Value::Array(items) => CommandOutput {
            stdout: join_lines(items),
            ..CommandOutput::default()
        },
        Value::Object(map) => normalize_object(map),
    }
}

fn normalize_object(map: &Map<String, Value>) -> CommandOutput {
    let exit_code = first_field(map, EXIT_CODE_FIELDS, exit_code_of)
        .or_else(|| {
            first_field(map, SUCCESS_FIELDS, Value::as_bool)
                .filter(|ok| !ok)
                .map(|_| 1)
        })
        .unwrap_or(0);

    CommandOutput {
        stdout: first_field(map, STDOUT_FIELDS, text_of).unwrap_or_default(),
        stderr: first_field(map, STDERR_FIELDS, text_of).unwrap_or_default(),
        exit_code,
    }
}

fn first_field<T>(
    map: &Map<String, Value>,
    fields: &[&str],
    extract: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    fields
        .iter()
        .find_map(|field| map.get(*field).and_then(&extract))
}

fn exit_code_of(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(clamp_code),
        Value::String(text) => text.trim().parse::<i64>().ok().map(clamp_code),
        _ => None,
    }
}

fn clamp_code(code: i64) -> i32 {
    code.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => Some(join_lines(items)),
        _ => None,
    }
}

fn join_lines(items: &[Value]) -> String {
    items
        .iter()
        .map(|item| match item {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
