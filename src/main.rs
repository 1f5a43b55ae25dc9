use anyhow::Result;
use talos::driver::{DriverCommand, GensetDriver};
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Create driver command channel
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<DriverCommand>();

    // Initialize the driver with command receiver
    let mut driver = GensetDriver::new(cmd_rx, cmd_tx.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create driver: {}", e))?;

    info!("Talos generator start/stop driver starting up");

    // Release the relay and the AC-ignore flags cleanly on SIGINT
    let shutdown = driver.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(());
        }
    });

    match driver.run().await {
        Ok(_) => {
            info!("Driver shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Driver failed with error: {}", e);
            Err(anyhow::anyhow!("Driver error: {}", e))
        }
    }
}
