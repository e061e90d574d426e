use warden_agent::{ConfigStore, SessionManager, Supervisor};
use warden_agent::{output, prestart};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let working_dir = std::env::current_dir()?;
    let store = ConfigStore::from_env(&working_dir);
    let config = store.load()?;
    tracing::info!("warden agent {} starting in '{}'", env!("CARGO_PKG_VERSION"), working_dir.display());

    let supervisor = Supervisor::new(working_dir, store.clone(), prestart::default_hooks());
    supervisor.add_output_listener(output::display_listener());

    let manager = SessionManager::new(store, supervisor.clone());
    supervisor.add_output_listener(manager.console_send_channel().listener());
    manager.spawn();

    if config.server.auto_start {
        supervisor.start().await;
    } else {
        tracing::info!("auto-start is disabled, waiting for a remote start");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, stopping server");
    if let Err(e) = supervisor.stop().await {
        tracing::warn!(error = %e, "failed to stop server during shutdown");
    }
    Ok(())
}
