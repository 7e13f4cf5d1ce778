mod config;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use castv2_channel::{Channel, ChannelConfig, ChannelListener};
use config::DeviceConfig;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

struct CliListener;

impl ChannelListener for CliListener {
    fn on_connection_state(&self, connected: bool) {
        log::info!("connection state changed: connected={connected}");
    }

    fn on_spontaneous_event(&self, message: serde_json::Value) {
        log::info!("spontaneous event: {message}");
    }
}

fn setup_logger() -> Result<()> {
    let term_config = ConfigBuilder::new()
        .set_time_offset_to_local()
        .unwrap()
        .build();
    TermLogger::init(
        LevelFilter::Info,
        term_config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;
    Ok(())
}

fn usage() -> String {
    "usage: castv2-cli <status|launch <appId>|stop <sessionId>|volume <level>>".to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logger()?;

    let device = DeviceConfig::load()?;
    let cfg = ChannelConfig::new(device.host.clone(), device.host.clone(), device.sender_id)
        .with_port(device.port);
    let channel = Channel::with_listener(cfg, Arc::new(CliListener))?;

    channel.connect().await?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().ok_or_else(|| anyhow!(usage()))?;

    match command.as_str() {
        "status" => {
            let status = channel.get_status().await?;
            println!("{}", serde_json::to_string_pretty(&status.status)?);
        }
        "launch" => {
            let app_id = args.get(1).ok_or_else(|| anyhow!(usage()))?;
            let status = channel.launch(app_id).await?;
            println!("{}", serde_json::to_string_pretty(&status.status)?);
        }
        "stop" => {
            let session_id = args.get(1).ok_or_else(|| anyhow!(usage()))?;
            let status = channel.stop(session_id).await?;
            println!("{}", serde_json::to_string_pretty(&status.status)?);
        }
        "volume" => {
            let level: f32 = args
                .get(1)
                .ok_or_else(|| anyhow!(usage()))?
                .parse()
                .map_err(|e| anyhow!("invalid volume level: {e}"))?;
            let status = channel.set_volume_level(level).await?;
            println!("{}", serde_json::to_string_pretty(&status.status)?);
        }
        other => return Err(anyhow!("unknown command {other:?}\n{}", usage())),
    }

    channel.close().await;
    Ok(())
}
