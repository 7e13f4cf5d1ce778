use std::fs;

use serde::Deserialize;

fn default_port() -> u16 {
    castv2_channel::config::DEFAULT_PORT
}

fn default_sender_id() -> String {
    "sender-castv2-cli".to_string()
}

/// TOML-backed target-device name, loaded by the demonstration binary
/// only. The library itself (`ChannelConfig`) takes no file or
/// environment input.
#[derive(Deserialize)]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_sender_id")]
    pub sender_id: String,
}

impl DeviceConfig {
    pub fn load() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()?;
        let config_file = cwd.join("device.toml");
        if !config_file.exists() {
            let template = "# castv2-cli device configuration\n\
host = \"10.0.0.2\"\n\
# port = 8009\n\
# sender_id = \"sender-castv2-cli\"\n";
            fs::write(&config_file, template)?;
            return Err(anyhow::anyhow!(
                "Default config created at {:?}. Please update it and rerun.",
                config_file
            ));
        }
        let content = fs::read_to_string(&config_file)?;
        let cfg: DeviceConfig = toml::from_str(&content)?;
        Ok(cfg)
    }
}
