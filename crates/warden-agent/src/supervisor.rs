//! Supervised server process lifecycle.
//!
//! One `Supervisor` exists per agent. It owns the child process handle, the
//! output reader attached to it, and the singleton liveness checker that
//! turns crashes into restarts.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;

use warden_process::ProcessState;

use crate::config::{ConfigStore, ServerConfig};
use crate::error::SupervisorError;
use crate::jar;
use crate::java;
use crate::output::{OutputListener, OutputReader};
use crate::prestart::PreStartHook;

/// How often the liveness checker samples the running state.
const LIVENESS_INTERVAL: Duration = Duration::from_secs(2);
/// How often `stop()` and `kill()` re-check liveness while waiting.
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One supervised launch. Exists from spawn until liveness polling has
/// observed the process die and a new launch replaces it.
struct ProcessSession {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<OutputReader>,
    stopping: bool,
    /// Listening port parsed from `server.properties`, informational only.
    port: Option<u16>,
}

struct Inner {
    working_dir: PathBuf,
    config: ConfigStore,
    hooks: Vec<Box<dyn PreStartHook>>,
    /// Registered before the first launch; snapshotted per launch.
    listeners: StdMutex<Vec<OutputListener>>,
    session: Mutex<Option<ProcessSession>>,
    checker_started: AtomicBool,
    launching: AtomicBool,
}

#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(
        working_dir: impl Into<PathBuf>,
        config: ConfigStore,
        hooks: Vec<Box<dyn PreStartHook>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                working_dir: working_dir.into(),
                config,
                hooks,
                listeners: StdMutex::new(Vec::new()),
                session: Mutex::new(None),
                checker_started: AtomicBool::new(false),
                launching: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to server console output. Must happen before the first
    /// `start()`; each launch snapshots the list at spawn time.
    pub fn add_output_listener(&self, listener: OutputListener) {
        self.inner
            .listeners
            .lock()
            .expect("listener list poisoned")
            .push(listener);
    }

    /// True iff a child handle exists and the OS reports it alive.
    pub async fn is_running(&self) -> bool {
        let mut session = self.inner.session.lock().await;
        match session.as_mut() {
            Some(s) => child_alive(&mut s.child),
            None => false,
        }
    }

    /// Exit code of the most recent launch, once it has exited.
    pub async fn exit_code(&self) -> Option<i32> {
        let mut session = self.inner.session.lock().await;
        let s = session.as_mut()?;
        match s.child.try_wait() {
            Ok(Some(status)) => status.code(),
            _ => None,
        }
    }

    /// Listening port of the current launch, if `server.properties` had one.
    pub async fn port(&self) -> Option<u16> {
        self.inner.session.lock().await.as_ref().and_then(|s| s.port)
    }

    pub async fn state(&self) -> ProcessState {
        if self.inner.launching.load(Ordering::SeqCst) {
            return ProcessState::Launching;
        }
        let mut session = self.inner.session.lock().await;
        match session.as_mut() {
            None => ProcessState::Stopped,
            Some(s) => match s.child.try_wait() {
                Ok(None) if s.stopping => ProcessState::Stopping,
                Ok(None) => ProcessState::Running,
                Ok(Some(status)) if status.code().is_some_and(|c| c != 0) => ProcessState::Crashed,
                _ => ProcessState::Stopped,
            },
        }
    }

    /// Launch the server. Every failure is logged and swallowed; callers
    /// inspect `is_running()` to learn the outcome.
    pub async fn start(&self) {
        self.inner.launching.store(true, Ordering::SeqCst);
        let result = self.try_start().await;
        self.inner.launching.store(false, Ordering::SeqCst);
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to start server");
        }
    }

    async fn try_start(&self) -> anyhow::Result<()> {
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        if let Some(s) = session.as_mut()
            && child_alive(&mut s.child)
        {
            return Err(SupervisorError::AlreadyRunning.into());
        }

        // Config is read fresh per launch so edits apply on the next restart.
        let config = inner.config.load()?;
        let port = read_server_port(&inner.working_dir);

        for hook in &inner.hooks {
            hook.run(&inner.working_dir, &config)
                .context("pre-start hook failed")?;
        }

        let jar = jar::resolve_server_jar(&inner.working_dir, &config.server.jar_path)?;
        let interpreter = java::resolve_interpreter(&config.interpreter, &inner.working_dir)
            .map_err(SupervisorError::from)?;
        let command = build_launch_command(&interpreter, &jar, &config.server);

        tracing::info!(
            "starting server jar: {}",
            jar.file_name().unwrap_or(jar.as_os_str()).to_string_lossy()
        );
        tracing::debug!(?command, "launch command");

        let mut child = Command::new(&command[0])
            .args(&command[1..])
            .current_dir(&inner.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn server process '{}'", command[0]))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let listeners: Arc<[OutputListener]> = inner
            .listeners
            .lock()
            .expect("listener list poisoned")
            .clone()
            .into();
        let reader = OutputReader::spawn(stdout, stderr, listeners);

        *session = Some(ProcessSession {
            child,
            stdin,
            reader: Some(reader),
            stopping: false,
            port,
        });
        drop(session);

        self.ensure_alive_checker();
        Ok(())
    }

    /// Submit the configured stop command and block until the process dies.
    /// Polls liveness once per second; expect multi-second blocking.
    pub async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!("stopping server...");
        if !self.is_running().await {
            tracing::warn!("server not running");
            return Ok(());
        }

        let stop_command = self.inner.config.load()?.server.stop_command;
        {
            let mut session = self.inner.session.lock().await;
            if let Some(s) = session.as_mut() {
                s.stopping = true;
            }
        }
        self.submit_command(&stop_command).await?;
        while self.is_running().await {
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }

        let mut session = self.inner.session.lock().await;
        if let Some(s) = session.as_mut() {
            s.reader = None;
        }
        Ok(())
    }

    /// Forcibly terminate the server and block until it is gone. Returns
    /// `false` only when the kill signal could not be delivered.
    pub async fn kill(&self) -> bool {
        tracing::info!("killing server");
        {
            let mut session = self.inner.session.lock().await;
            let running = match session.as_mut() {
                Some(s) => {
                    if child_alive(&mut s.child) {
                        s.stopping = true;
                        if let Err(e) = s.child.start_kill() {
                            tracing::warn!(error = %e, "failed to deliver kill signal");
                            return false;
                        }
                        true
                    } else {
                        false
                    }
                }
                None => false,
            };
            if !running {
                tracing::warn!("server is not running");
                return true;
            }
        }

        while self.is_running().await {
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
        tracing::info!("server killed");
        true
    }

    /// Sequential stop then start. Any failure is logged and aborts the
    /// sequence.
    pub async fn restart(&self) {
        tracing::info!("restarting server...");
        if let Err(e) = self.stop().await {
            tracing::warn!(error = %e, "restart aborted, stop failed");
            return;
        }
        self.start().await;
    }

    /// Write one command to the server's stdin, terminated and flushed.
    pub async fn submit_command(&self, command: &str) -> Result<(), SupervisorError> {
        let mut session = self.inner.session.lock().await;
        let stdin = session.as_mut().and_then(|s| {
            if child_alive(&mut s.child) {
                s.stdin.as_mut()
            } else {
                None
            }
        });
        let Some(stdin) = stdin else {
            tracing::warn!(
                "failed to submit command '{}', server is not running",
                command.trim_end()
            );
            return Err(SupervisorError::NotRunning);
        };

        let line = terminated(command);
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Start the liveness checker if this is the first launch. One checker
    /// runs per agent lifetime; it re-reads `is_running()` every cycle, so
    /// it stays correct across stop/start cycles without a per-process
    /// handle.
    fn ensure_alive_checker(&self) {
        if self.inner.checker_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let supervisor = self.clone();
        tokio::spawn(async move {
            if let Err(e) = supervisor.alive_checker().await {
                tracing::error!(error = %e, "server liveness checker stopped due to an error");
            }
        });
    }

    async fn alive_checker(&self) -> anyhow::Result<()> {
        let mut last = false;
        loop {
            tokio::time::sleep(LIVENESS_INTERVAL).await;
            let current = self.is_running().await;
            if last && !current {
                tracing::info!("server was stopped");
                let config = self.inner.config.load()?;
                if config.server.stop_agent_on_server_stop {
                    tracing::info!(
                        "stopping the agent too, since 'stop-agent-on-server-stop' is enabled"
                    );
                    std::process::exit(0);
                }
                if let Some(code) = self.exit_code().await
                    && code != 0
                {
                    tracing::warn!(code, "server crash detected, exit code should be 0");
                    if config.server.restart_on_crash {
                        tracing::info!("restart-on-crash is enabled, restarting the server");
                        self.start().await;
                    }
                }
            }
            last = current;
        }
    }
}

fn child_alive(child: &mut Child) -> bool {
    child.try_wait().map(|status| status.is_none()).unwrap_or(false)
}

/// Commands are only executed once a line terminator arrives, so one is
/// appended unless the caller already supplied it.
fn terminated(command: &str) -> Cow<'_, str> {
    if command.ends_with('\n') {
        Cow::Borrowed(command)
    } else {
        Cow::Owned(format!("{command}\n"))
    }
}

/// Assemble the argv: interpreter, JVM flags, `-jar`, jar path, program
/// arguments. Built fresh per launch from the current config.
fn build_launch_command(interpreter: &Path, jar: &Path, server: &ServerConfig) -> Vec<String> {
    let mut command = Vec::new();
    command.push(normalized(interpreter));
    if server.flags.enable {
        for flag in &server.flags.list {
            command.push(format!("-{}", flag.trim()));
        }
    }
    command.push("-jar".to_string());
    command.push(normalized(jar));
    if server.arguments.enable {
        for arg in &server.arguments.list {
            command.push(arg.trim().to_string());
        }
    }
    command
}

// Lossy UTF-8 pass so a non-UTF-8 byte in an install path degrades to a
// replacement character instead of poisoning the whole argv.
fn normalized(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn read_server_port(working_dir: &Path) -> Option<u16> {
    let path = working_dir.join("server.properties");
    let raw = match std::fs::read_to_string(&path) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "could not read '{}'", path.display());
            return None;
        }
    };
    let port = parse_server_port(&raw);
    if port.is_none() {
        tracing::warn!("no usable server-port entry in '{}'", path.display());
    }
    port
}

fn parse_server_port(raw: &str) -> Option<u16> {
    for line in raw.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if let Some(value) = line.strip_prefix("server-port=") {
            return value.trim().parse().ok();
        }
    }
    None
}
