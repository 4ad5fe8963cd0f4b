//! Environment checks for `narrator check`.
//!
//! Verifies the external tools, the transcription model and the credentials
//! a worker needs before it can run tasks.

use crate::config::Config;
use crate::defaults;
use std::path::Path;
use std::process::Command;

/// Result of a dependency check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Present and usable
    Ok,
    /// Missing
    NotFound,
    /// Present but likely to cause problems
    Warning(String),
}

impl CheckResult {
    fn is_ok(&self) -> bool {
        matches!(self, CheckResult::Ok)
    }
}

/// Check that `command <version_arg>` runs successfully.
fn check_command(command: &Path, version_arg: &str) -> CheckResult {
    let shown = command.display();
    match Command::new(command).arg(version_arg).output() {
        Ok(output) if output.status.success() => CheckResult::Ok,
        Ok(_) => CheckResult::Warning(format!("'{shown}' found but {version_arg} failed")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::NotFound,
        Err(e) => CheckResult::Warning(format!("Error checking '{shown}': {e}")),
    }
}

/// Whether a libx264 encoder is compiled into ffmpeg.
fn check_libx264(ffmpeg: &Path) -> CheckResult {
    match Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .output()
    {
        Ok(output) if String::from_utf8_lossy(&output.stdout).contains("libx264") => {
            CheckResult::Ok
        }
        Ok(_) => CheckResult::Warning("ffmpeg was built without libx264".to_string()),
        Err(_) => CheckResult::NotFound,
    }
}

fn check_model(config: &Config) -> CheckResult {
    let path = &config.stt.model_path;
    if path.as_os_str().is_empty() {
        CheckResult::NotFound
    } else if path.is_file() {
        if cfg!(feature = "whisper") {
            CheckResult::Ok
        } else {
            CheckResult::Warning(
                "model present but this build lacks the `whisper` feature".to_string(),
            )
        }
    } else {
        CheckResult::Warning(format!("no model file at {}", path.display()))
    }
}

fn present(value: Option<&str>) -> CheckResult {
    match value {
        Some(v) if !v.trim().is_empty() => CheckResult::Ok,
        _ => CheckResult::NotFound,
    }
}

/// Credential and identifier checks as `(label, result)` pairs.
fn check_credentials(config: &Config) -> Vec<(&'static str, CheckResult)> {
    vec![
        (
            "records.api_key",
            present(config.records.api_key.as_deref()),
        ),
        ("records.base_id", present(Some(&config.records.base_id))),
        ("records.table", present(Some(&config.records.table))),
        (
            "publish.access_token",
            present(config.publish.access_token.as_deref()),
        ),
        ("publish.folder_id", present(Some(&config.publish.folder_id))),
        ("tts.api_key", present(config.tts.api_key.as_deref())),
    ]
}

fn print_result(label: &str, result: &CheckResult, hint: &str) {
    match result {
        CheckResult::Ok => println!("{label}: ✓ OK"),
        CheckResult::NotFound => {
            println!("{label}: ✗ NOT FOUND");
            if !hint.is_empty() {
                println!("  {hint}");
            }
        }
        CheckResult::Warning(msg) => println!("{label}: ⚠ WARNING: {msg}"),
    }
}

/// Run all checks and print results. Returns `true` when every required
/// check passed.
pub fn check_dependencies(config: &Config) -> bool {
    println!("Checking narrator dependencies...\n");
    let mut ready = true;

    for (tool, path) in [
        ("ffmpeg", &config.merge.ffmpeg),
        ("ffprobe", &config.merge.ffprobe),
    ] {
        let result = check_command(path, "-version");
        print_result(
            tool,
            &result,
            "Install: sudo apt install ffmpeg  (Debian/Ubuntu)\n           sudo pacman -S ffmpeg    (Arch)",
        );
        ready &= result.is_ok();
    }
    let x264 = check_libx264(&config.merge.ffmpeg);
    print_result("libx264 encoder", &x264, "");
    ready &= !matches!(x264, CheckResult::NotFound);

    println!();
    let model = check_model(config);
    print_result(
        "whisper model",
        &model,
        "Set stt.model_path or NARRATOR_STT_MODEL_PATH",
    );
    ready &= model.is_ok();
    println!("  Compiled backend: {}", defaults::gpu_backend());

    println!();
    println!("Credentials:");
    for (label, result) in check_credentials(config) {
        // Speech endpoints without auth are allowed.
        let required = label != "tts.api_key";
        print_result(&format!("  {label}"), &result, "");
        if required {
            ready &= result.is_ok();
        }
    }

    println!();
    match config.publish.visibility() {
        Ok(visibility) => println!("Upload visibility: {visibility:?}"),
        Err(e) => {
            println!("Upload visibility: ✗ {e}");
            ready = false;
        }
    }

    println!();
    if ready {
        println!("✓ Ready to run tasks.");
    } else {
        println!("⚠ Some checks failed; tasks may fail until they are fixed.");
    }
    ready
}
