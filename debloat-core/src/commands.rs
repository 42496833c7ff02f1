//! Shell command builders for the bridge protocol.
//!
//! Every path and payload is single-quoted; the host runs these through
//! `sh -c`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::{EditorConfig, ReadMode, SaveStrategy};
use crate::editor::ApplyMode;
use crate::error::EditorError;

/// Quote `value` for a POSIX shell. Embedded quotes become `'\''`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn read_document(config: &EditorConfig) -> String {
    let doc = shell_quote(&config.document_path());
    match config.read_mode {
        ReadMode::Plain => format!("cat {doc}"),
        ReadMode::Base64 => format!("base64 {doc}"),
    }
}

pub fn save_document(config: &EditorConfig, payload: &str) -> String {
    let payload = shell_quote(payload);
    match config.save_strategy {
        SaveStrategy::Script => {
            format!("sh {} {payload}", shell_quote(&config.save_script_path()))
        }
        SaveStrategy::Inline => {
            let doc = config.document_path();
            let tmp = shell_quote(&format!("{doc}.tmp"));
            let mirror = shell_quote(&config.webroot_document_path());
            let doc = shell_quote(&doc);
            format!(
                "echo {payload} | base64 -d > {tmp} && mv -f {tmp} {doc} && cp -f {doc} {mirror} && chmod 644 {doc} {mirror}"
            )
        }
    }
}

/// `None` for [`ApplyMode::None`].
pub fn apply(config: &EditorConfig, mode: ApplyMode) -> Option<String> {
    let script = shell_quote(&config.apply_script_path());
    match mode {
        ApplyMode::None => None,
        ApplyMode::Background => Some(format!("nohup sh {script} >/dev/null 2>&1 &")),
        ApplyMode::Foreground => Some(format!("sh {script} 2>&1")),
    }
}

/// Base64 of the UTF-8 bytes of `text`.
pub fn encode_payload(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decode `base64` command output. Line wrapping and other whitespace are
/// ignored.
pub fn decode_payload(output: &str) -> Result<String, EditorError> {
    let compact: String = output.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| EditorError::InvalidPayload(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| EditorError::InvalidPayload(e.to_string()))
}
