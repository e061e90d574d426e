//! The long-lived control session.
//!
//! One authenticated primary connection carries a login heartbeat, one byte
//! per second. The gated channels (console send/receive, file transfer) are
//! opened on the logged-in edge and closed on the logged-out edge; the status
//! channel is opened once per authenticated session. Any failure tears the
//! whole session down and a fresh one is built 30 seconds later, forever.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;

use crate::channels::{ConsoleReceiveChannel, ConsoleSendChannel, FileChannel, StatusChannel};
use crate::config::ConfigStore;
use crate::supervisor::Supervisor;
use crate::transport::{ChannelKind, SecuredConnector};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
const RECONNECT_DELAY: Duration = Duration::from_secs(30);

pub struct SessionManager {
    config: ConfigStore,
    console_send: Arc<ConsoleSendChannel>,
    console_receive: Arc<ConsoleReceiveChannel>,
    status: Arc<StatusChannel>,
    file: Arc<FileChannel>,
    logged_in: Arc<AtomicBool>,
}

impl SessionManager {
    pub fn new(config: ConfigStore, supervisor: Supervisor) -> Self {
        let logged_in = Arc::new(AtomicBool::new(false));
        Self {
            console_send: Arc::new(ConsoleSendChannel::new()),
            console_receive: Arc::new(ConsoleReceiveChannel::new(supervisor.clone())),
            status: Arc::new(StatusChannel::new(supervisor, logged_in.clone())),
            file: Arc::new(FileChannel::new()),
            config,
            logged_in,
        }
    }

    pub fn console_send_channel(&self) -> Arc<ConsoleSendChannel> {
        self.console_send.clone()
    }

    pub fn console_receive_channel(&self) -> Arc<ConsoleReceiveChannel> {
        self.console_receive.clone()
    }

    pub fn status_channel(&self) -> Arc<StatusChannel> {
        self.status.clone()
    }

    pub fn file_channel(&self) -> Arc<FileChannel> {
        self.file.clone()
    }

    /// Whether the most recent heartbeat reported the remote user logged in.
    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    /// Run the session loop until the agent exits. Retries are unbounded;
    /// there is no terminal failure state.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(e) = self.run_once().await {
                    tracing::warn!(
                        error = %e,
                        "lost connection to the control server, retrying in 30 seconds..."
                    );
                }
                self.teardown().await;
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        })
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        // Address and key are re-read per session so config edits apply on
        // the next reconnect.
        let config = self.config.load()?;
        let connector = SecuredConnector::new(config.remote.address, config.remote.key);

        tracing::info!("authenticating agent...");
        let mut primary = connector.connect(ChannelKind::Primary).await?;
        tracing::info!("authentication success");
        self.status.open(&connector).await?;

        let mut gate = HeartbeatGate::default();
        loop {
            let logged_in = primary.read_u8().await? != 0;
            self.logged_in.store(logged_in, Ordering::SeqCst);
            match gate.observe(logged_in) {
                Some(HeartbeatEdge::LoggedIn) => {
                    tracing::debug!("user is online, opening gated channels");
                    if self.console_receive.is_connected() {
                        self.console_receive.close().await;
                    }
                    self.console_receive.open(&connector).await?;
                    if self.console_send.is_connected() {
                        self.console_send.close().await;
                    }
                    self.console_send.open(&connector).await?;
                    if self.file.is_connected() {
                        self.file.close().await;
                    }
                    self.file.open(&connector).await?;
                }
                Some(HeartbeatEdge::LoggedOut) => {
                    tracing::debug!("user is offline, closing gated channels");
                    if self.console_receive.is_connected() {
                        self.console_receive.close().await;
                    }
                    if self.console_send.is_connected() {
                        self.console_send.close().await;
                    }
                    if self.file.is_connected() {
                        self.file.close().await;
                    }
                }
                None => {}
            }
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
        }
    }

    /// Close everything this session holds. Each close is isolated so one
    /// failure cannot keep another channel open; the primary connection is
    /// dropped by `run_once` returning.
    async fn teardown(&self) {
        self.logged_in.store(false, Ordering::SeqCst);
        self.console_receive.close().await;
        self.console_send.close().await;
        self.status.close().await;
        self.file.close().await;
    }
}

/// Tracks the previous heartbeat value and reports edges. Recreated per
/// session, so a reconnect always starts from logged-out.
#[derive(Debug, Default)]
struct HeartbeatGate {
    last: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum HeartbeatEdge {
    LoggedIn,
    LoggedOut,
}

impl HeartbeatGate {
    fn observe(&mut self, current: bool) -> Option<HeartbeatEdge> {
        let edge = match (self.last, current) {
            (false, true) => Some(HeartbeatEdge::LoggedIn),
            (true, false) => Some(HeartbeatEdge::LoggedOut),
            _ => None,
        };
        self.last = current;
        edge
    }
}
