//! `esparrier` command line.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use esparrier_protocol::{DeviceStatus, MIN_CONFIG_VERSION, WEBUSB_URL_VERSION};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{load_document, render_document, AppConfig};
use crate::error::{ClientError, ClientResult, ErrorKind, ValidationError};
use crate::session::{OtaProgress, Session, SessionOptions};
use crate::transport::{TcpBridgeTransport, Transport};

/// Control an Esparrier device through a USB bridge.
#[derive(Parser, Debug, Clone)]
#[command(name = "esparrier", version, about)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Bridge address.
    #[arg(long, default_value = "127.0.0.1:7777", global = true)]
    pub connect: String,

    /// Per-frame receive timeout in milliseconds, 0 to wait forever.
    #[arg(long, default_value_t = 2000, global = true)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Show the device state.
    Status {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Print or save the stored configuration.
    ReadConfig {
        /// Write to a file instead of stdout (`.yaml`/`.yml` for YAML).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Stage a configuration file on the device.
    WriteConfig {
        /// JSON or YAML file.
        file: PathBuf,
        /// Commit after staging. The device restarts.
        #[arg(long)]
        commit: bool,
        /// Send the document without checking its fields.
        #[arg(long)]
        no_validate: bool,
    },
    /// Persist the staged configuration and restart.
    Commit,
    /// Turn keep-awake on or off.
    KeepAwake {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Restart the device.
    Reboot,
    /// Flash a firmware image.
    Flash {
        /// Application image (`.bin`).
        file: PathBuf,
    },
}

/// `on` / `off`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl Cli {
    /// Session options derived from the flags.
    pub fn session_options(&self) -> SessionOptions {
        match self.timeout_ms {
            0 => SessionOptions::default(),
            ms => SessionOptions::default().with_receive_timeout(Duration::from_millis(ms)),
        }
    }
}

/// Process exit code for an error kind.
pub fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Connectivity => 2,
        ErrorKind::Protocol => 3,
        ErrorKind::Device => 4,
        ErrorKind::Validation => 5,
    }
}

/// Device state as printed by `status --json`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub version: String,
    pub model: String,
    pub model_id: u8,
    pub features: Vec<&'static str>,
    pub feature_bits: u8,
    pub ip_address: Option<String>,
    pub server_connected: bool,
    pub active: bool,
    pub keep_awake: bool,
}

impl From<&DeviceStatus> for StatusReport {
    fn from(status: &DeviceStatus) -> Self {
        StatusReport {
            version: status.version_string(),
            model: status.model.name().into_owned(),
            model_id: status.model.0,
            features: status.features.names(),
            feature_bits: status.feature_bits,
            ip_address: status.address.map(|addr| addr.to_string()),
            server_connected: status.server_connected,
            active: status.active,
            keep_awake: status.keep_awake,
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Human-readable status block.
pub fn format_status(status: &DeviceStatus) -> String {
    format!(
        "Version:     {}\n\
         Model:       {}\n\
         Features:    {}\n\
         IP address:  {}\n\
         Server:      {}\n\
         Active:      {}\n\
         Keep awake:  {}\n",
        status.version_string(),
        status.model,
        status.features,
        status.address_display(),
        if status.server_connected {
            "connected"
        } else {
            "disconnected"
        },
        yes_no(status.active),
        yes_no(status.keep_awake),
    )
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ValidationError> {
    std::fs::write(path, contents).map_err(|e| ValidationError::File {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, ValidationError> {
    std::fs::read(path).map_err(|e| ValidationError::File {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

async fn require_config_support<T: Transport>(
    session: &Session<T>,
) -> ClientResult<DeviceStatus> {
    let status = session.get_status().await?;
    if !status.version.supports_config() {
        return Err(ValidationError::UnsupportedFirmware {
            feature: "configuration",
            version: status.version,
            required: MIN_CONFIG_VERSION,
        }
        .into());
    }
    Ok(status)
}

/// Run one command against a connected session.
pub async fn execute<T: Transport>(
    session: &Session<T>,
    command: &CliCommand,
) -> ClientResult<()> {
    match command {
        CliCommand::Status { json } => {
            let status = session.get_status().await?;
            let text = if *json {
                let mut text = serde_json::to_string_pretty(&StatusReport::from(&status))
                    .map_err(|e| ValidationError::Serialize(e.to_string()))?;
                text.push('\n');
                text
            } else {
                format_status(&status)
            };
            print!("{}", text);
        }

        CliCommand::ReadConfig { output } => {
            require_config_support(session).await?;
            let document = session.read_config().await?;
            let text = render_document(&document, output.as_deref())?;
            match output {
                Some(path) => {
                    write_file(path, text.as_bytes())?;
                    info!(path = %path.display(), "configuration saved");
                }
                None => print!("{}", text),
            }
        }

        CliCommand::WriteConfig {
            file,
            commit,
            no_validate,
        } => {
            let document = load_document(file)?;
            if !no_validate {
                let config = AppConfig::from_document(&document).map_err(|e| {
                    ValidationError::File {
                        path: file.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                config.validate()?;
            }

            let status = require_config_support(session).await?;
            let has_webusb_url = document
                .as_value()
                .get("webusb_url")
                .is_some_and(|url| !url.is_null());
            if has_webusb_url && !status.version.supports_webusb_url() {
                warn!(
                    version = %status.version,
                    required = %WEBUSB_URL_VERSION,
                    "firmware ignores webusb_url"
                );
            }

            session.write_config(&document).await?;
            info!("configuration staged");
            if *commit {
                session.commit_config().await?;
                info!("configuration committed, device is restarting");
            }
        }

        CliCommand::Commit => {
            session.commit_config().await?;
            info!("configuration committed, device is restarting");
        }

        CliCommand::KeepAwake { state } => {
            session.set_keep_awake(*state == Toggle::On).await?;
        }

        CliCommand::Reboot => {
            session.reboot().await?;
            info!("device is restarting");
        }

        CliCommand::Flash { file } => {
            let image = read_file(file)?;
            let mut stderr = std::io::stderr();
            session
                .flash_firmware(&image, |progress: OtaProgress| {
                    let _ = write!(
                        stderr,
                        "\rflashing: {:5.1}% ({}/{} bytes)",
                        progress.percent(),
                        progress.received,
                        progress.total
                    );
                    let _ = stderr.flush();
                })
                .await?;
            let _ = writeln!(stderr);
            info!("firmware update complete, device is restarting");
        }
    }
    Ok(())
}

/// Connect to the bridge and run the command.
pub async fn run(cli: Cli) -> Result<(), ClientError> {
    let transport = TcpBridgeTransport::connect(cli.connect.as_str()).await?;
    let session = Session::with_options(transport, cli.session_options());
    execute(&session, &cli.command).await
}
