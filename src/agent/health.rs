// QueryCut Health Check
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// External binaries the pipeline shells out to.

use std::path::Path;
use tracing::{info, warn};

pub const REQUIRED_BINARIES: [&str; 2] = ["ffmpeg", "ffprobe"];

/// Names of required binaries that are not on PATH
pub fn check_dependencies() -> Vec<String> {
    let missing: Vec<String> = REQUIRED_BINARIES
        .iter()
        .filter(|bin| !which_exists(bin))
        .map(|bin| bin.to_string())
        .collect();

    if missing.is_empty() {
        info!("[HEALTH] All external tools found");
    } else {
        warn!("[HEALTH] Missing external tools: {:?}", missing);
    }
    missing
}

/// Check whether an executable exists on PATH without spawning it.
pub fn which_exists(name: &str) -> bool {
    let Some(path_env) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_env).any(|dir| {
        let candidate = dir.join(name);
        candidate.is_file() || with_exe_suffix(&candidate)
    })
}

fn with_exe_suffix(candidate: &Path) -> bool {
    cfg!(windows) && candidate.with_extension("exe").is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_binary_is_missing() {
        assert!(!which_exists("__querycut_no_such_tool_xyz"));
    }
}
