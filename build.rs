//! Build script: embeds the git short hash for `narrator --version`.

use std::process::Command;

fn main() {
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    if std::env::var_os("CARGO_FEATURE_CUDA").is_some() {
        check_tool("nvcc", "CUDA toolkit (nvcc) not found; whisper-rs CUDA build will fail");
    }
    if std::env::var_os("CARGO_FEATURE_VULKAN").is_some() {
        check_tool("glslc", "Vulkan SDK (glslc) not found; whisper-rs Vulkan build will fail");
    }
}

fn check_tool(tool: &str, warning: &str) {
    let found = Command::new(tool)
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false);
    if !found {
        println!("cargo::warning={}", warning);
    }
}
