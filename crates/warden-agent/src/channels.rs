//! The four secondary channels of the remote session.
//!
//! Each channel is an independent authenticated connection. The console-send,
//! console-receive and file channels only exist while the remote user is
//! logged in; the status channel lives for the whole authenticated session.
//! Open/close transitions are driven by the session loop, never from two
//! tasks at once, so each channel only guards its own handles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use warden_process::OutputLine;

use crate::error::ConnectError;
use crate::output::OutputListener;
use crate::supervisor::Supervisor;
use crate::transport::{ChannelKind, SecuredConnector};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Relays server console output to the control server, one line per write.
///
/// Lines are queued through an unbounded channel so the output reader never
/// blocks on the network; the drain task drops lines while the channel is
/// offline.
pub struct ConsoleSendChannel {
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    connected: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<String>,
}

impl ConsoleSendChannel {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let writer: Arc<Mutex<Option<OwnedWriteHalf>>> = Arc::new(Mutex::new(None));
        let connected = Arc::new(AtomicBool::new(false));

        tokio::spawn({
            let writer = writer.clone();
            let connected = connected.clone();
            async move {
                while let Some(line) = rx.recv().await {
                    if !connected.load(Ordering::SeqCst) {
                        // Offline lines are dropped, not queued for later.
                        continue;
                    }
                    let mut guard = writer.lock().await;
                    let Some(w) = guard.as_mut() else {
                        continue;
                    };
                    let mut payload = line;
                    payload.push('\n');
                    let result = async {
                        w.write_all(payload.as_bytes()).await?;
                        w.flush().await
                    }
                    .await;
                    if let Err(e) = result {
                        tracing::debug!(error = %e, "console-send write failed, dropping channel");
                        guard.take();
                        connected.store(false, Ordering::SeqCst);
                    }
                }
            }
        });

        Self {
            writer,
            connected,
            tx,
        }
    }

    pub async fn open(&self, connector: &SecuredConnector) -> Result<(), ConnectError> {
        let stream = connector.connect(ChannelKind::ConsoleSend).await?;
        let (_read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(mut write_half) = self.writer.lock().await.take()
            && let Err(e) = write_half.shutdown().await
        {
            tracing::debug!(error = %e, "console-send channel shutdown failed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Queue one console line for delivery. Dropped when offline.
    pub fn publish(&self, line: &str) {
        let _ = self.tx.send(line.to_string());
    }

    /// Output listener that feeds this channel.
    pub fn listener(&self) -> OutputListener {
        let tx = self.tx.clone();
        Arc::new(move |line: &OutputLine| {
            let _ = tx.send(line.text.clone());
            Ok(())
        })
    }
}

impl Default for ConsoleSendChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives console commands typed by the remote user and feeds them to the
/// supervised server's stdin.
pub struct ConsoleReceiveChannel {
    supervisor: Supervisor,
    task: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
}

impl ConsoleReceiveChannel {
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            supervisor,
            task: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn open(&self, connector: &SecuredConnector) -> Result<(), ConnectError> {
        let stream = connector.connect(ChannelKind::ConsoleReceive).await?;
        let supervisor = self.supervisor.clone();
        let connected = self.connected.clone();
        let handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let command = line.trim_end();
                if command.is_empty() {
                    continue;
                }
                tracing::debug!(command, "remote console command");
                // A dead server is already logged by the supervisor.
                let _ = supervisor.submit_command(command).await;
            }
            connected.store(false, Ordering::SeqCst);
        });
        if let Some(old) = self.task.lock().await.replace(handle) {
            old.abort();
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Publishes a small JSON status line every few seconds while open.
pub struct StatusChannel {
    supervisor: Supervisor,
    logged_in: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
}

impl StatusChannel {
    pub fn new(supervisor: Supervisor, logged_in: Arc<AtomicBool>) -> Self {
        Self {
            supervisor,
            logged_in,
            task: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn open(&self, connector: &SecuredConnector) -> Result<(), ConnectError> {
        let stream = connector.connect(ChannelKind::Status).await?;
        let (_read_half, mut writer) = stream.into_split();
        let supervisor = self.supervisor.clone();
        let logged_in = self.logged_in.clone();
        let connected = self.connected.clone();
        let handle = tokio::spawn(async move {
            loop {
                let payload = serde_json::json!({
                    "state": supervisor.state().await,
                    "running": supervisor.is_running().await,
                    "port": supervisor.port().await,
                    "logged_in": logged_in.load(Ordering::SeqCst),
                });
                let mut line = payload.to_string();
                line.push('\n');
                if writer.write_all(line.as_bytes()).await.is_err()
                    || writer.flush().await.is_err()
                {
                    break;
                }
                tokio::time::sleep(STATUS_INTERVAL).await;
            }
            connected.store(false, Ordering::SeqCst);
        });
        if let Some(old) = self.task.lock().await.replace(handle) {
            old.abort();
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Holds the file-transfer connection while the remote user is logged in.
/// The transfer protocol itself runs on the control server's schedule over
/// this stream.
pub struct FileChannel {
    stream: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
}

impl FileChannel {
    pub fn new() -> Self {
        Self {
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub async fn open(&self, connector: &SecuredConnector) -> Result<(), ConnectError> {
        let stream = connector.connect(ChannelKind::FileTransfer).await?;
        *self.stream.lock().await = Some(stream);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(mut stream) = self.stream.lock().await.take()
            && let Err(e) = stream.shutdown().await
        {
            tracing::debug!(error = %e, "file channel shutdown failed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Default for FileChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn test_supervisor(name: &str) -> Supervisor {
        let dir = std::env::temp_dir().join(format!("warden-channels-test-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        let config = ConfigStore::new(dir.join("warden.toml"));
        Supervisor::new(dir, config, Vec::new())
    }

    /// Accept one channel connection and complete the key handshake.
    async fn accept_channel(listener: &TcpListener) -> (u8, TcpStream) {
        let (mut socket, _) = listener.accept().await.unwrap();
        let selector = socket.read_u8().await.unwrap();
        let len = socket.read_u16().await.unwrap() as usize;
        let mut key = vec![0u8; len];
        socket.read_exact(&mut key).await.unwrap();
        socket.write_u8(1).await.unwrap();
        (selector, socket)
    }

    async fn local_connector() -> (TcpListener, SecuredConnector) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let connector = SecuredConnector::new(listener.local_addr().unwrap().to_string(), "key");
        (listener, connector)
    }

    #[tokio::test]
    async fn console_send_publishes_lines_while_open() {
        let (listener, connector) = local_connector().await;
        let channel = ConsoleSendChannel::new();

        let accept = tokio::spawn(async move { accept_channel(&listener).await });
        channel.open(&connector).await.unwrap();
        let (selector, mut socket) = accept.await.unwrap();
        assert_eq!(selector, ChannelKind::ConsoleSend.selector());
        assert!(channel.is_connected());

        channel.publish("[Server] Done (3.1s)!");
        let mut line = String::new();
        BufReader::new(&mut socket).read_line(&mut line).await.unwrap();
        assert_eq!(line, "[Server] Done (3.1s)!\n");

        channel.close().await;
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn console_send_drops_lines_while_closed() {
        let channel = ConsoleSendChannel::new();
        // Nothing to assert beyond "does not block or panic".
        channel.publish("dropped");
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn console_receive_feeds_commands_and_closes() {
        let (listener, connector) = local_connector().await;
        let channel = ConsoleReceiveChannel::new(test_supervisor("receive"));

        let accept = tokio::spawn(async move { accept_channel(&listener).await });
        channel.open(&connector).await.unwrap();
        let (selector, mut socket) = accept.await.unwrap();
        assert_eq!(selector, ChannelKind::ConsoleReceive.selector());
        assert!(channel.is_connected());

        // The command reaches a stopped supervisor and is rejected there;
        // the channel itself must stay connected.
        socket.write_all(b"say hello\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(channel.is_connected());

        channel.close().await;
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn status_channel_reports_supervisor_state() {
        let (listener, connector) = local_connector().await;
        let logged_in = Arc::new(AtomicBool::new(true));
        let channel = StatusChannel::new(test_supervisor("status"), logged_in);

        let accept = tokio::spawn(async move { accept_channel(&listener).await });
        channel.open(&connector).await.unwrap();
        let (selector, mut socket) = accept.await.unwrap();
        assert_eq!(selector, ChannelKind::Status.selector());

        let mut line = String::new();
        BufReader::new(&mut socket).read_line(&mut line).await.unwrap();
        let payload: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(payload["running"], serde_json::json!(false));
        assert_eq!(payload["logged_in"], serde_json::json!(true));
        assert_eq!(payload["state"], serde_json::json!("Stopped"));

        channel.close().await;
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn file_channel_holds_the_connection() {
        let (listener, connector) = local_connector().await;
        let channel = FileChannel::new();

        let accept = tokio::spawn(async move { accept_channel(&listener).await });
        channel.open(&connector).await.unwrap();
        let (selector, _socket) = accept.await.unwrap();
        assert_eq!(selector, ChannelKind::FileTransfer.selector());
        assert!(channel.is_connected());

        channel.close().await;
        assert!(!channel.is_connected());
    }
}
