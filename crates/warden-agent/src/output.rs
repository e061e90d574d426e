//! Asynchronous line pump over the server's console output.
//!
//! One reader exists per server launch. It follows the stream until the
//! process closes it and is not restartable; a relaunch gets a fresh reader.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;

use warden_process::{OutputLine, Severity};

/// A console-output subscriber. Errors are logged per listener and never
/// reach the read loop. Listeners run synchronously in registration order,
/// so a slow listener delays the ones after it and the next read.
pub type OutputListener = Arc<dyn Fn(&OutputLine) -> anyhow::Result<()> + Send + Sync>;

/// Handle to the pump tasks of one server launch. Dropping it detaches the
/// tasks; they end on their own once the child closes its streams.
pub struct OutputReader {
    _tasks: Vec<JoinHandle<()>>,
}

impl OutputReader {
    /// Start pumping the child's stdout and stderr into the listener set.
    pub fn spawn(
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
        listeners: Arc<[OutputListener]>,
    ) -> Self {
        let mut tasks = Vec::new();
        if let Some(out) = stdout {
            let listeners = listeners.clone();
            tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    dispatch(&listeners, &OutputLine::classify(line));
                }
            }));
        }
        if let Some(err) = stderr {
            tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(err).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    dispatch(&listeners, &OutputLine::classify(line));
                }
            }));
        }
        Self { _tasks: tasks }
    }
}

fn dispatch(listeners: &[OutputListener], line: &OutputLine) {
    for listener in listeners {
        if let Err(e) = listener(line) {
            tracing::warn!(error = %e, "output listener failed");
        }
    }
}

/// Local echo of server output through the agent's own log, at the level the
/// line classified to.
pub fn display_listener() -> OutputListener {
    Arc::new(|line: &OutputLine| {
        match line.severity {
            Severity::Error => tracing::error!(target: "server", "{}", line.text),
            Severity::Warning => tracing::warn!(target: "server", "{}", line.text),
            Severity::Debug => tracing::debug!(target: "server", "{}", line.text),
            Severity::Info => tracing::info!(target: "server", "{}", line.text),
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn dispatch_runs_listeners_in_registration_order() {
        let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let first = {
            let seen = seen.clone();
            Arc::new(move |_: &OutputLine| {
                seen.lock().unwrap().push("first");
                Ok(())
            }) as OutputListener
        };
        let second = {
            let seen = seen.clone();
            Arc::new(move |_: &OutputLine| {
                seen.lock().unwrap().push("second");
                Ok(())
            }) as OutputListener
        };

        dispatch(&[first, second], &OutputLine::classify("hello".to_string()));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn failing_listener_does_not_stop_the_rest() {
        let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let failing = Arc::new(|_: &OutputLine| anyhow::bail!("sink unavailable")) as OutputListener;
        let after = {
            let seen = seen.clone();
            Arc::new(move |_: &OutputLine| {
                seen.lock().unwrap().push("after");
                Ok(())
            }) as OutputListener
        };

        dispatch(&[failing, after], &OutputLine::classify("hello".to_string()));
        assert_eq!(*seen.lock().unwrap(), vec!["after"]);
    }
}
