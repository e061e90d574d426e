//! Java interpreter resolution.
//!
//! In managed mode the runtime installer places exactly one JRE under
//! `warden/system/jre` and records its build id in the config; the launcher
//! uses that runtime's `java` executable. Otherwise the configured
//! `java-path` is used as-is (default `java`, resolved via PATH).

use std::path::{Path, PathBuf};

use crate::config::InterpreterConfig;
use crate::error::InterpreterError;

/// Directory the runtime installer unpacks JREs into, relative to the
/// working directory.
pub const MANAGED_RUNTIME_DIR: &str = "warden/system/jre";

pub fn resolve_interpreter(
    config: &InterpreterConfig,
    working_dir: &Path,
) -> Result<PathBuf, InterpreterError> {
    if !config.managed {
        return Ok(PathBuf::from(config.java_path.trim()));
    }

    // Managed mode without a recorded build id means the installer never ran.
    if config.build_id.is_none_or(|id| id == 0) {
        return Err(InterpreterError::MissingBuildId);
    }

    let root = working_dir.join(MANAGED_RUNTIME_DIR);
    let installation = first_dir(&root).ok_or_else(|| InterpreterError::NoInstallation {
        dir: root.clone(),
    })?;

    let bin = bin_dir(&installation).ok_or_else(|| InterpreterError::MissingBinDir {
        dir: installation.clone(),
    })?;

    let exe = bin.join(executable_name());
    if exe.is_file() {
        Ok(exe)
    } else {
        Err(InterpreterError::MissingExecutable { dir: bin })
    }
}

fn executable_name() -> &'static str {
    if cfg!(windows) { "java.exe" } else { "java" }
}

fn first_dir(root: &Path) -> Option<PathBuf> {
    let rd = std::fs::read_dir(root).ok()?;
    let mut dirs: Vec<PathBuf> = rd
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs.into_iter().next()
}

/// Locate the `bin` directory of a JRE installation. Some archives nest it
/// under `Home/bin` (macOS bundle layout).
fn bin_dir(installation: &Path) -> Option<PathBuf> {
    let direct = installation.join("bin");
    if direct.is_dir() {
        return Some(direct);
    }
    let nested = installation.join("Home").join("bin");
    if nested.is_dir() {
        return Some(nested);
    }
    None
}
