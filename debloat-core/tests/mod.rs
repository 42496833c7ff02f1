use async_trait::async_trait;
use debloat_bridge::{
    BridgeError, CommandOutput, CommandRunner, HostCall, HostError, HostExec, HostGlobals,
};
use debloat_codec::{parse, serialize};
use debloat_core::commands::{decode_payload, encode_payload};
use debloat_core::{
    ApplyMode, ApplyOutcome, DiscoveryConfig, Editor, EditorConfig, EditorError, LoadSource,
    ReadMode, SaveStrategy, StaticSource, Status, StatusSink, StepLog,
};
use serde_json::json;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SAMPLE: &str = "\
# ColorOS debloat list

# === Core ===
com.oplus.a # Weather widget
#com.oplus.b # Browser

# === Extras ===
##com.heytap.c
com.heytap.d
";

// ============================================================================
// Fakes
// ============================================================================

/// A device with one document file, a save script and an apply script.
struct Device {
    available: AtomicBool,
    file: Mutex<String>,
    commands: Mutex<Vec<String>>,
    save_error: Mutex<Option<BridgeError>>,
    read_error: Mutex<Option<BridgeError>>,
    apply_output: Mutex<CommandOutput>,
}

impl Device {
    fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(true),
            file: Mutex::new(text.to_string()),
            commands: Mutex::new(Vec::new()),
            save_error: Mutex::new(None),
            read_error: Mutex::new(None),
            apply_output: Mutex::new(stdout("applied 3 packages\n")),
        })
    }

    fn offline(text: &str) -> Arc<Self> {
        let device = Self::new(text);
        device.available.store(false, Ordering::SeqCst);
        device
    }

    fn file(&self) -> String {
        self.file.lock().unwrap().clone()
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn respond(&self, command: &str) -> Result<CommandOutput, BridgeError> {
        self.commands.lock().unwrap().push(command.to_string());
        if !self.available.load(Ordering::SeqCst) {
            return Err(BridgeError::Unavailable);
        }

        let reading = command.starts_with("base64 ") || command.starts_with("cat ");
        if reading {
            if let Some(err) = self.read_error.lock().unwrap().clone() {
                return Err(err);
            }
        }

        if command.starts_with("base64 ") {
            Ok(stdout(&wrap76(&encode_payload(&self.file()))))
        } else if command.starts_with("cat ") {
            Ok(stdout(&self.file()))
        } else if command.contains("webui_save.sh") {
            if let Some(err) = self.save_error.lock().unwrap().clone() {
                return Err(err);
            }
            let payload = command.rsplit('\'').nth(1).unwrap();
            *self.file.lock().unwrap() = decode_payload(payload).unwrap();
            Ok(stdout(""))
        } else if command.starts_with("echo ") {
            let payload = command.split('\'').nth(1).unwrap();
            *self.file.lock().unwrap() = decode_payload(payload).unwrap();
            Ok(stdout(""))
        } else if command.contains("apply_now.sh") {
            Ok(self.apply_output.lock().unwrap().clone())
        } else {
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: "sh: not found".into(),
                exit_code: 127,
            })
        }
    }
}

#[async_trait]
impl CommandRunner for Device {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, BridgeError> {
        self.respond(command)
    }
}

/// The same device behind a KernelSU-style `exec` returning `{errno, stdout, stderr}`.
struct DeviceHost(Arc<Device>);

impl HostExec for DeviceHost {
    fn call(&self, command: &str) -> Result<HostCall, HostError> {
        let output = self.0.respond(command).map_err(|e| HostError::Thrown(e.to_string()))?;
        Ok(HostCall::Ready(json!({
            "errno": output.exit_code,
            "stdout": output.stdout,
            "stderr": output.stderr,
        })))
    }
}

struct FakeSource {
    result: Result<String, EditorError>,
    calls: AtomicUsize,
}

impl FakeSource {
    fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            result: Err(EditorError::FetchFailed {
                status: Some(status),
                message: format!("HTTP {status}"),
            }),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl StaticSource for FakeSource {
    async fn fetch_document(&self) -> Result<String, EditorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

#[derive(Default)]
struct RecordingStatus(Mutex<Vec<Status>>);

impl StatusSink for RecordingStatus {
    fn set_status(&self, status: &Status) {
        self.0.lock().unwrap().push(status.clone());
    }
}

fn stdout(text: &str) -> CommandOutput {
    CommandOutput {
        stdout: text.to_string(),
        stderr: String::new(),
        exit_code: 0,
    }
}

// `base64` wraps at 76 columns.
fn wrap76(encoded: &str) -> String {
    encoded
        .as_bytes()
        .chunks(76)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

fn editor(device: &Arc<Device>) -> Editor {
    Editor::new(EditorConfig::default(), device.clone())
}

const DOC_PATH: &str = "/data/adb/modules/coloros16_debloat/packages.txt";

// ============================================================================
// Load
// ============================================================================

#[tokio::test]
async fn test_load_via_bridge() {
    let device = Device::new(SAMPLE);
    let mut editor = editor(&device);

    let report = editor.load().await.unwrap();
    assert_eq!(report.source, LoadSource::Bridge);
    assert_eq!(report.counts.enabled, 2);
    assert_eq!(report.counts.disabled, 1);
    assert_eq!(report.counts.ignored, 1);
    assert!(report.warning.is_none());

    assert_eq!(device.commands(), vec![format!("base64 '{DOC_PATH}'")]);
    let doc = editor.document().unwrap();
    assert_eq!(doc.groups.len(), 2);
    assert_eq!(doc.groups[0].display_title(), "Core");
}

#[tokio::test]
async fn test_load_plain_read_mode() {
    let device = Device::new(SAMPLE);
    let config = EditorConfig {
        read_mode: ReadMode::Plain,
        ..EditorConfig::default()
    };
    let mut editor = Editor::new(config, device.clone());

    editor.load().await.unwrap();
    assert_eq!(device.commands(), vec![format!("cat '{DOC_PATH}'")]);
    assert_eq!(editor.document(), Some(&parse(SAMPLE)));
}

#[tokio::test]
async fn test_load_falls_back_when_unavailable() {
    let device = Device::offline("");
    let source = FakeSource::ok(SAMPLE);
    let mut editor = editor(&device).with_fallback(source.clone());

    let report = editor.load().await.unwrap();
    assert_eq!(report.source, LoadSource::Static);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    // Unavailable means nothing was sent.
    assert!(device.commands().is_empty());
    assert!(!editor.can_save());
}

#[tokio::test]
async fn test_load_falls_back_on_empty_bridge_result() {
    let device = Device::new("  \n");
    let source = FakeSource::ok(SAMPLE);
    let mut editor = editor(&device).with_fallback(source.clone());

    let report = editor.load().await.unwrap();
    assert_eq!(report.source, LoadSource::Static);
    assert_eq!(report.counts.enabled, 2);
}

#[tokio::test]
async fn test_load_unavailable_without_fallback() {
    let device = Device::offline(SAMPLE);
    let mut editor = editor(&device);

    assert_eq!(editor.load().await, Err(EditorError::BridgeUnavailable));
    assert!(editor.document().is_none());
}

#[tokio::test]
async fn test_load_fallback_failure_reported() {
    let device = Device::offline(SAMPLE);
    let mut editor = editor(&device).with_fallback(FakeSource::failing(404));

    let err = editor.load().await.unwrap_err();
    assert_eq!(
        err,
        EditorError::FetchFailed {
            status: Some(404),
            message: "HTTP 404".into()
        }
    );
}

#[tokio::test]
async fn test_load_zero_groups_warns_with_preview() {
    let device = Device::new("not a package list\r\n\r\njust text");
    let status = Arc::new(RecordingStatus::default());
    let mut editor = editor(&device).with_status(status.clone());

    let report = editor.load().await.unwrap();
    assert_eq!(
        report.warning,
        Some(EditorError::ParseEmpty {
            preview: "not a package list just text".into()
        })
    );
    assert!(editor.document().unwrap().groups.is_empty());
    assert!(matches!(
        status.0.lock().unwrap().last(),
        Some(Status::Empty { .. })
    ));
}

#[tokio::test]
async fn test_load_preview_respects_limit() {
    let device = Device::new(&"x".repeat(500));
    let config = EditorConfig {
        preview_chars: 10,
        ..EditorConfig::default()
    };
    let mut editor = Editor::new(config, device.clone());

    let report = editor.load().await.unwrap();
    assert_eq!(
        report.warning,
        Some(EditorError::ParseEmpty {
            preview: "x".repeat(10)
        })
    );
}

#[tokio::test]
async fn test_load_failure_keeps_previous_document() {
    let device = Device::new(SAMPLE);
    let mut editor = editor(&device);
    editor.load().await.unwrap();
    let before = editor.document().cloned();

    device.available.store(false, Ordering::SeqCst);
    assert!(editor.load().await.is_err());
    assert_eq!(editor.document().cloned(), before);
}

#[tokio::test]
async fn test_load_reports_status_sequence() {
    let device = Device::new(SAMPLE);
    let status = Arc::new(RecordingStatus::default());
    let mut editor = editor(&device).with_status(status.clone());
    editor.load().await.unwrap();

    let seen = status.0.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], Status::Loading);
    assert_eq!(
        seen[1].to_string(),
        "已加载: 启用 2 个, 禁用 1 个"
    );
}

// ============================================================================
// Editing
// ============================================================================

#[tokio::test]
async fn test_toggle_and_group_toggle() {
    let device = Device::new(SAMPLE);
    let mut editor = editor(&device);
    assert_eq!(editor.toggle("com.oplus.a"), None);

    editor.load().await.unwrap();
    assert_eq!(editor.toggle("com.oplus.a"), Some(false));
    assert_eq!(editor.toggle("com.oplus.a"), Some(true));
    // Ignored entries are not user-editable.
    assert_eq!(editor.toggle("com.heytap.c"), None);
    assert_eq!(editor.toggle("com.missing"), None);

    assert_eq!(editor.set_group_enabled(0, false), 1);
    assert_eq!(editor.counts().enabled, 1);
    assert!(editor.set_enabled(0, 1, true));
    assert_eq!(editor.counts().enabled, 2);
}

// ============================================================================
// Save
// ============================================================================

#[tokio::test]
async fn test_save_without_document() {
    let device = Device::new(SAMPLE);
    let mut editor = editor(&device);
    assert_eq!(
        editor.save(ApplyMode::None).await,
        Err(EditorError::NothingLoaded)
    );
    assert!(device.commands().is_empty());
}

#[tokio::test]
async fn test_save_writes_then_reloads() {
    let device = Device::new(SAMPLE);
    let mut editor = editor(&device);
    editor.load().await.unwrap();
    editor.toggle("com.oplus.a");
    let expected = serialize(editor.document().unwrap());

    let report = editor.save(ApplyMode::None).await.unwrap();
    assert_eq!(report.apply, ApplyOutcome::Skipped);
    assert_eq!(report.reload.as_ref().unwrap().counts.enabled, 1);
    assert_eq!(device.file(), expected);
    assert!(device.file().contains("#com.oplus.a # Weather widget\n"));

    let commands = device.commands();
    assert_eq!(commands.len(), 3);
    assert!(commands[0].starts_with("base64 "));
    assert!(commands[1].starts_with(
        "sh '/data/adb/modules/coloros16_debloat/webui_save.sh' '"
    ));
    assert!(commands[2].starts_with("base64 "));
}

#[tokio::test]
async fn test_save_payload_is_serialized_document() {
    let device = Device::new(SAMPLE);
    let mut editor = editor(&device);
    editor.load().await.unwrap();
    editor.toggle("com.heytap.d");
    let expected = serialize(editor.document().unwrap());

    editor.save(ApplyMode::None).await.unwrap();
    let save = device
        .commands()
        .into_iter()
        .find(|c| c.contains("webui_save.sh"))
        .unwrap();
    let payload = save.rsplit('\'').nth(1).unwrap();
    assert_eq!(decode_payload(payload).unwrap(), expected);
}

#[tokio::test]
async fn test_save_keeps_ignored_entries() {
    let device = Device::new(SAMPLE);
    let mut editor = editor(&device);
    editor.load().await.unwrap();
    editor.save(ApplyMode::None).await.unwrap();
    assert!(device.file().contains("##com.heytap.c\n"));
    assert_eq!(editor.counts().ignored, 1);
}

#[tokio::test]
async fn test_save_failure_retains_edits() {
    let device = Device::new(SAMPLE);
    let status = Arc::new(RecordingStatus::default());
    let mut editor = editor(&device).with_status(status.clone());
    editor.load().await.unwrap();
    editor.toggle("com.oplus.a");
    *device.save_error.lock().unwrap() = Some(BridgeError::command_failed(1, "No space left\n"));

    let err = editor.save(ApplyMode::Background).await.unwrap_err();
    assert_eq!(
        err,
        EditorError::CommandFailed {
            exit_code: Some(1),
            message: "No space left".into()
        }
    );
    // No apply and no reload after a failed save.
    assert_eq!(device.commands().len(), 2);
    assert_eq!(device.file(), SAMPLE);
    assert_eq!(editor.counts().enabled, 1);
    assert_eq!(
        status.0.lock().unwrap().last().map(|s| s.to_string()),
        Some("保存失败: command failed: No space left".to_string())
    );
}

#[tokio::test]
async fn test_save_succeeds_when_reload_fails() {
    let device = Device::new(SAMPLE);
    let status = Arc::new(RecordingStatus::default());
    let mut editor = editor(&device).with_status(status.clone());
    editor.load().await.unwrap();
    editor.toggle("com.oplus.a");
    let saved = editor.document().cloned();
    *device.read_error.lock().unwrap() = Some(BridgeError::command_failed(1, "Permission denied"));

    let report = editor.save(ApplyMode::Background).await.unwrap();
    assert_eq!(report.apply, ApplyOutcome::Triggered);
    assert_eq!(
        report.reload,
        Err(EditorError::CommandFailed {
            exit_code: Some(1),
            message: "Permission denied".into()
        })
    );
    // Written and applied exactly once; the edited document stays loaded.
    assert_eq!(device.file(), serialize(saved.as_ref().unwrap()));
    assert_eq!(device.commands().len(), 4);
    assert_eq!(editor.document().cloned(), saved);
    assert_eq!(
        status.0.lock().unwrap().last().map(|s| s.to_string()),
        Some("保存成功 (已触发应用)".to_string())
    );
}

#[tokio::test]
async fn test_save_requires_bridge() {
    let device = Device::offline(SAMPLE);
    let mut editor = editor(&device).with_fallback(FakeSource::ok(SAMPLE));
    editor.load().await.unwrap();
    editor.toggle("com.oplus.a");

    assert_eq!(
        editor.save(ApplyMode::None).await,
        Err(EditorError::BridgeUnavailable)
    );
    assert_eq!(editor.counts().enabled, 1);
}

#[tokio::test]
async fn test_save_inline_strategy() {
    let device = Device::new(SAMPLE);
    let config = EditorConfig {
        save_strategy: SaveStrategy::Inline,
        ..EditorConfig::default()
    };
    let mut editor = Editor::new(config, device.clone());
    editor.load().await.unwrap();
    editor.toggle("com.oplus.b");
    let expected = serialize(editor.document().unwrap());

    editor.save(ApplyMode::None).await.unwrap();
    assert_eq!(device.file(), expected);

    let inline = &device.commands()[1];
    assert!(inline.starts_with("echo '"));
    assert!(inline.contains(&format!("| base64 -d > '{DOC_PATH}.tmp'")));
    assert!(inline.contains(&format!("mv -f '{DOC_PATH}.tmp' '{DOC_PATH}'")));
    assert!(inline.ends_with(
        "chmod 644 '/data/adb/modules/coloros16_debloat/packages.txt' '/data/adb/modules/coloros16_debloat/webroot/packages.txt'"
    ));
}

// ============================================================================
// Apply
// ============================================================================

#[tokio::test]
async fn test_save_with_background_apply() {
    let device = Device::new(SAMPLE);
    let mut editor = editor(&device);
    editor.load().await.unwrap();

    let report = editor.save(ApplyMode::Background).await.unwrap();
    assert_eq!(report.apply, ApplyOutcome::Triggered);

    let commands = device.commands();
    assert_eq!(commands.len(), 4);
    assert_eq!(
        commands[2],
        "nohup sh '/data/adb/modules/coloros16_debloat/apply_now.sh' >/dev/null 2>&1 &"
    );
    assert!(commands[3].starts_with("base64 "));
}

#[tokio::test]
async fn test_save_with_foreground_apply() {
    let device = Device::new(SAMPLE);
    let status = Arc::new(RecordingStatus::default());
    let mut editor = editor(&device).with_status(status.clone());
    editor.load().await.unwrap();

    let report = editor.save(ApplyMode::Foreground).await.unwrap();
    assert_eq!(
        report.apply,
        ApplyOutcome::Completed {
            output: "applied 3 packages\n".into()
        }
    );
    assert_eq!(
        device.commands()[2],
        "sh '/data/adb/modules/coloros16_debloat/apply_now.sh' 2>&1"
    );
    assert_eq!(
        status.0.lock().unwrap().last(),
        Some(&Status::Saved {
            apply: report.apply.clone()
        })
    );
}

#[tokio::test]
async fn test_apply_failure_does_not_abort_save() {
    let device = Device::new(SAMPLE);
    *device.apply_output.lock().unwrap() = CommandOutput {
        stdout: "pm: permission denied\n".into(),
        stderr: String::new(),
        exit_code: 2,
    };
    let mut editor = editor(&device);
    editor.load().await.unwrap();

    let report = editor.save(ApplyMode::Foreground).await.unwrap();
    assert_eq!(
        report.apply,
        ApplyOutcome::Failed {
            message: "pm: permission denied".into()
        }
    );
    // Reload still happened.
    assert_eq!(device.commands().len(), 4);
}

#[tokio::test]
async fn test_apply_none_sends_nothing() {
    let device = Device::new(SAMPLE);
    let editor = editor(&device);
    assert_eq!(editor.apply(ApplyMode::None).await, ApplyOutcome::Skipped);
    assert!(device.commands().is_empty());
}

// ============================================================================
// Bridge end to end
// ============================================================================

#[tokio::test]
async fn test_attach_runs_through_host_and_records_steps() {
    let device = Device::new(SAMPLE);
    let globals = HostGlobals::new();
    globals.attach("ksu", Arc::new(DeviceHost(device.clone())));
    let config = EditorConfig {
        discovery: DiscoveryConfig {
            attempts: 1,
            delay_ms: 1,
        },
        ..EditorConfig::default()
    };

    let mut editor = Editor::attach(config, globals).await;
    editor.load().await.unwrap();
    editor.toggle("com.oplus.a");
    editor.save(ApplyMode::None).await.unwrap();

    assert!(device.file().contains("#com.oplus.a # Weather widget"));
    let steps = editor.steps().unwrap().steps();
    assert_eq!(steps.len(), 3);
    assert!(steps.iter().all(|s| s.succeeded()));
    assert!(steps[1].command.ends_with("..."));
}

#[tokio::test]
async fn test_attach_without_host_is_read_only() {
    let config = EditorConfig {
        discovery: DiscoveryConfig {
            attempts: 2,
            delay_ms: 5,
        },
        ..EditorConfig::default()
    };
    let mut editor = Editor::attach(config, HostGlobals::new())
        .await
        .with_fallback(FakeSource::ok(SAMPLE));

    let report = editor.load().await.unwrap();
    assert_eq!(report.source, LoadSource::Static);
    assert!(!editor.can_save());
    assert!(editor.steps().unwrap().is_empty());
}

#[tokio::test]
async fn test_start_uses_global_host() {
    let device = Device::new(SAMPLE);
    HostGlobals::global().attach("ksu", Arc::new(DeviceHost(device.clone())));

    let mut editor = Editor::start(EditorConfig::default()).await;
    let report = editor.load().await.unwrap();
    assert_eq!(report.source, LoadSource::Bridge);
    assert_eq!(device.commands().len(), 1);
    assert_eq!(editor.steps().unwrap().len(), 1);

    // The process-wide bridge is already installed: reused, no step log.
    let config = EditorConfig {
        discovery: DiscoveryConfig {
            attempts: 1,
            delay_ms: 1,
        },
        ..EditorConfig::default()
    };
    let mut second = Editor::start(config).await;
    assert!(second.steps().is_none());
    second.load().await.unwrap();
    assert_eq!(device.commands().len(), 2);
    assert_eq!(editor.steps().unwrap().len(), 2);
}

// ============================================================================
// Step log
// ============================================================================

#[test]
fn test_steplog_is_bounded() {
    use debloat_bridge::CommandObserver;

    let log = StepLog::new(2);
    for code in 0..3 {
        let outcome = Ok(CommandOutput {
            exit_code: code,
            ..CommandOutput::default()
        });
        log.on_finish(&format!("cmd {code}"), &outcome, Duration::from_millis(1));
    }
    let steps = log.steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].command, "cmd 1");
    assert_eq!(steps[1].exit_code, Some(2));

    log.on_finish("boom", &Err(BridgeError::Unavailable), Duration::ZERO);
    let last = log.last().unwrap();
    assert_eq!(last.exit_code, None);
    assert!(!last.succeeded());
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_defaults_from_empty_toml() {
    let config = EditorConfig::from_toml_str("").unwrap();
    assert_eq!(config, EditorConfig::default());
    assert_eq!(config.read_mode, ReadMode::Base64);
    assert_eq!(config.save_strategy, SaveStrategy::Script);
    assert_eq!(config.discovery.attempts, 10);
    assert_eq!(config.discovery.delay_ms, 200);
}

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
module_id = "my_debloat"
read_mode = "plain"
save_strategy = "inline"
static_base_url = "http://127.0.0.1:8080/"

[discovery]
attempts = 3
"#
    )
    .unwrap();

    let config = EditorConfig::from_path(file.path()).unwrap();
    assert_eq!(config.module_root(), "/data/adb/modules/my_debloat");
    assert_eq!(config.read_mode, ReadMode::Plain);
    assert_eq!(config.save_strategy, SaveStrategy::Inline);
    assert_eq!(config.discovery.attempts, 3);
    assert_eq!(config.discovery.delay_ms, 200);
    assert_eq!(config.document_name, "packages.txt");
}

#[test]
fn test_config_rejects_bad_values() {
    assert!(matches!(
        EditorConfig::from_toml_str("read_mode = \"gzip\""),
        Err(EditorError::Config(_))
    ));
    assert!(EditorConfig::from_path("/nonexistent/debloat.toml").is_err());
}

#[test]
fn test_http_source_url() {
    let config = EditorConfig::from_toml_str("static_base_url = \"http://localhost:8080/\"").unwrap();
    let source = debloat_core::HttpSource::from_config(&config).unwrap();
    assert_eq!(source.url(), "http://localhost:8080/packages.txt");
    assert!(debloat_core::HttpSource::from_config(&EditorConfig::default()).is_none());
}
