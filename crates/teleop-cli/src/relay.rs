use teleop_relay::{Config, RelayEvent};
use tracing::info;

/// Bind and serve until Ctrl-C.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let mut relay = teleop_relay::setup::build_relay(config).await?;
    if let Some(addr) = relay.local_addr() {
        info!(addr = %addr, users = config.users.len(), "starting relay");
    }

    let events = relay.event_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl-C, shutting down");
            let _ = events.send(RelayEvent::Shutdown).await;
        }
    });

    relay.run().await?;
    Ok(())
}
