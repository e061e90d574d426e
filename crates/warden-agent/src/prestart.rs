//! Hooks that run once before every launch attempt.

use std::path::Path;

use crate::config::Config;

/// An action the supervisor runs before spawning the server. A hook failure
/// aborts the launch.
pub trait PreStartHook: Send + Sync {
    fn run(&self, working_dir: &Path, config: &Config) -> anyhow::Result<()>;
}

/// The hooks every agent instance runs.
pub fn default_hooks() -> Vec<Box<dyn PreStartHook>> {
    vec![Box::new(EulaAccept)]
}

/// Writes an accepted `eula.txt` when `server.auto-eula` is on and the file
/// does not exist yet. An existing file is left untouched so a deliberate
/// `eula=false` stays in effect.
pub struct EulaAccept;

impl PreStartHook for EulaAccept {
    fn run(&self, working_dir: &Path, config: &Config) -> anyhow::Result<()> {
        if !config.server.auto_eula {
            return Ok(());
        }
        let path = working_dir.join("eula.txt");
        if path.exists() {
            return Ok(());
        }
        std::fs::write(&path, b"eula=true\n")?;
        tracing::info!("accepted eula at '{}'", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("warden-prestart-test-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn writes_eula_when_missing() {
        let dir = temp_dir("write");
        EulaAccept.run(&dir, &Config::default()).unwrap();
        assert_eq!(std::fs::read_to_string(dir.join("eula.txt")).unwrap(), "eula=true\n");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn leaves_existing_eula_untouched() {
        let dir = temp_dir("existing");
        std::fs::write(dir.join("eula.txt"), b"eula=false\n").unwrap();
        EulaAccept.run(&dir, &Config::default()).unwrap();
        assert_eq!(std::fs::read_to_string(dir.join("eula.txt")).unwrap(), "eula=false\n");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn disabled_auto_eula_writes_nothing() {
        let dir = temp_dir("disabled");
        let mut config = Config::default();
        config.server.auto_eula = false;
        EulaAccept.run(&dir, &config).unwrap();
        assert!(!dir.join("eula.txt").exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
