use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use redlink_common::{AppConfig, FanMode};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::{
    client::{ClientSettings, RedlinkClient, RedlinkConnector},
    device::Device,
    server,
    service::HoldService,
    store::ConfigStore,
};

/// Control Honeywell Total Connect Comfort / Redlink thermostats.
#[derive(Parser, Debug)]
#[command(name = "redlink-controller", version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON config file
    #[arg(long, default_value = "config.json", global = true, value_name = "FILE")]
    config: PathBuf,

    /// Account username
    #[arg(long, env = "REDLINK_USERNAME", global = true)]
    username: Option<String>,

    /// Account password
    #[arg(long, env = "REDLINK_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    /// Device ID from the portal URL
    #[arg(long, env = "REDLINK_DEVICE_ID", global = true)]
    device_id: Option<i64>,

    /// Override the portal base URL
    #[arg(long, env = "REDLINK_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Minutes to add to local time to reach UTC
    #[arg(
        long,
        env = "REDLINK_TIME_OFFSET_MINUTES",
        global = true,
        allow_hyphen_values = true
    )]
    time_offset_minutes: Option<i64>,

    /// Request timeout in seconds
    #[arg(long = "timeout", env = "REDLINK_TIMEOUT", global = true)]
    timeout_seconds: Option<i64>,

    /// Portal path that returns schedule JSON ({device_id} is substituted)
    #[arg(long, env = "REDLINK_SCHEDULE_GET_PATH", global = true)]
    schedule_get_path: Option<String>,

    /// Portal path that accepts schedule JSON
    #[arg(long, env = "REDLINK_SCHEDULE_SUBMIT_PATH", global = true)]
    schedule_submit_path: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// Print current thermostat status
    Status,
    /// Set a temporary heat hold
    Heat {
        #[arg(long)]
        setpoint: f64,
        #[arg(long, default_value_t = 60)]
        hold_minutes: u32,
    },
    /// Set a temporary cool hold
    Cool {
        #[arg(long)]
        setpoint: f64,
        #[arg(long, default_value_t = 60)]
        hold_minutes: u32,
    },
    /// Set the fan mode (auto, on, 0, 1)
    Fan {
        #[arg(long, value_parser = parse_fan_mode)]
        mode: FanMode,
    },
    /// Cancel the current hold
    Cancel,
    /// Fetch schedule JSON
    ScheduleGet {
        /// Write to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Submit schedule JSON
    ScheduleSet {
        #[arg(long = "in", value_name = "FILE")]
        input: PathBuf,
    },
    /// Start the local web controller
    Server {
        /// Bind host (default from config)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (default from config)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn parse_fan_mode(value: &str) -> Result<FanMode, String> {
    FanMode::parse(value).ok_or_else(|| "fan mode must be 'auto' or 'on'".to_string())
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Server { host, port } => run_server(&cli, host.as_deref(), *port).await,
        command => run_once(&cli, command).await,
    }
}

async fn run_server(cli: &Cli, host: Option<&str>, port: Option<u16>) -> anyhow::Result<()> {
    let store = ConfigStore::new(&cli.config);
    let config = store.ensure().await?;

    let host = host.unwrap_or(&config.bind_host).to_string();
    let port = match port {
        Some(port) => port,
        None => u16::try_from(config.bind_port)
            .with_context(|| format!("bind_port {} is out of range", config.bind_port))?,
    };

    let service = Arc::new(HoldService::new(RedlinkConnector, store.clone()));
    server::serve(service, store, &host, port).await
}

async fn run_once(cli: &Cli, command: &Command) -> anyhow::Result<()> {
    let config = cli.device_config().await?;
    let client = RedlinkClient::new(ClientSettings {
        schedule_get_path: cli.schedule_get_path.clone(),
        schedule_submit_path: cli.schedule_submit_path.clone(),
        ..ClientSettings::from_config(&config)
    })?;
    client.login().await?;

    match command {
        Command::Status => {
            let status = client.get_status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }
        Command::Heat {
            setpoint,
            hold_minutes,
        } => client.set_heat_setpoint(*setpoint, *hold_minutes).await?,
        Command::Cool {
            setpoint,
            hold_minutes,
        } => client.set_cool_setpoint(*setpoint, *hold_minutes).await?,
        Command::Fan { mode } => client.set_fan_mode(*mode).await?,
        Command::Cancel => client.cancel_hold().await?,
        Command::ScheduleGet { out } => {
            let schedule = client.get_schedule().await?;
            return write_json(&schedule, out.as_deref()).await;
        }
        Command::ScheduleSet { input } => {
            let raw = tokio::fs::read(input)
                .await
                .with_context(|| format!("failed to read {}", input.display()))?;
            let schedule: Value = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", input.display()))?;
            client.set_schedule(&schedule).await?
        }
        Command::Server { .. } => anyhow::bail!("server is not a one-shot command"),
    }
    println!("OK");
    Ok(())
}

async fn write_json(value: &Value, out: Option<&Path>) -> anyhow::Result<()> {
    let mut rendered = serde_json::to_string_pretty(value)?;
    rendered.push('\n');
    match out {
        Some(path) => tokio::fs::write(path, rendered)
            .await
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            print!("{rendered}");
            Ok(())
        }
    }
}

impl Cli {
    async fn device_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = ConfigStore::new(&self.config).load().await?;
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }
        if let Some(device_id) = self.device_id {
            config.device_id = device_id;
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if self.time_offset_minutes.is_some() {
            config.time_offset_minutes = self.time_offset_minutes;
        }
        if let Some(timeout) = self.timeout_seconds {
            config.timeout_seconds = timeout;
        }

        if !config.is_identified() {
            anyhow::bail!("username, password, and device id are required");
        }
        Ok(config)
    }
}
