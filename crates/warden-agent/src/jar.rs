//! Server-jar resolution.

use std::path::{Path, PathBuf};

use crate::error::SupervisorError;

/// Resolve the jar to launch.
///
/// `configured` is the `server.jar-path` value: `auto-find` scans the working
/// directory, anything else is treated as an explicit path (relative paths
/// resolve against the working directory).
pub fn resolve_server_jar(
    working_dir: &Path,
    configured: &str,
) -> Result<PathBuf, SupervisorError> {
    let configured = configured.trim();
    if configured.eq_ignore_ascii_case("auto-find") || configured.is_empty() {
        return auto_find(working_dir);
    }

    let path = PathBuf::from(configured);
    let path = if path.is_absolute() {
        path
    } else {
        working_dir.join(path)
    };
    if path.is_file() {
        Ok(path)
    } else {
        Err(SupervisorError::JarNotFound {
            dir: working_dir.to_path_buf(),
        })
    }
}

/// Pick the first jar in the working directory that is not the agent itself.
///
/// Candidates are sorted by name so the pick is deterministic when several
/// jars are present.
fn auto_find(working_dir: &Path) -> Result<PathBuf, SupervisorError> {
    let not_found = || SupervisorError::JarNotFound {
        dir: working_dir.to_path_buf(),
    };

    let rd = std::fs::read_dir(working_dir).map_err(|_| not_found())?;
    let mut candidates: Vec<PathBuf> = rd
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"))
        })
        .filter(|p| {
            p.file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|name| !name.to_ascii_lowercase().starts_with("warden"))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next().ok_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("warden-jar-test-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn auto_find_picks_first_foreign_jar() {
        let dir = temp_dir("auto");
        std::fs::write(dir.join("warden-agent.jar"), b"x").unwrap();
        std::fs::write(dir.join("paper.jar"), b"x").unwrap();
        std::fs::write(dir.join("zzz-backup.jar"), b"x").unwrap();
        std::fs::write(dir.join("readme.txt"), b"x").unwrap();

        let jar = resolve_server_jar(&dir, "auto-find").unwrap();
        assert_eq!(jar, dir.join("paper.jar"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn auto_find_without_jars_fails() {
        let dir = temp_dir("empty");
        std::fs::write(dir.join("warden-agent.jar"), b"x").unwrap();

        let err = resolve_server_jar(&dir, "auto-find").unwrap_err();
        assert!(matches!(err, SupervisorError::JarNotFound { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn explicit_relative_path_resolves_against_working_dir() {
        let dir = temp_dir("relative");
        std::fs::write(dir.join("my-server.jar"), b"x").unwrap();

        let jar = resolve_server_jar(&dir, "./my-server.jar").unwrap();
        assert_eq!(jar, dir.join("./my-server.jar"));
        assert!(jar.is_file());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn explicit_missing_path_fails() {
        let dir = temp_dir("missing");
        let err = resolve_server_jar(&dir, "./nope.jar").unwrap_err();
        assert!(matches!(err, SupervisorError::JarNotFound { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }
}
