//! MK312 control tool
//!
//! Connects to a box over a serial port or a network bridge and runs one
//! operation: identify, change mode, write the display, set or ramp channel
//! levels, or issue raw box commands.

mod settings;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mk312_device::{
    ChannelLevels, DeviceCommandInformation, DeviceScheduler, Mk312, Mk312Device,
};
use mk312_link::{
    discover, list_ports, Encryption, QueuedRegisters, SerialConfig, SerialTransport,
    TcpTransport, Transport,
};
use mk312_protocol::Mode;
use settings::Settings;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Control an MK312-family stimulation box
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port of the box
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Network bridge address (host:port)
    #[arg(short, long, global = true, conflicts_with = "port")]
    address: Option<String>,

    /// Find a network bridge by UDP broadcast
    #[arg(long, global = true, conflicts_with_all = ["port", "address"])]
    discover: bool,

    /// Ask the box for plaintext operation
    #[arg(long, global = true)]
    no_encryption: bool,

    /// Settings file (default: $XDG_CONFIG_HOME/mk312/settings.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports,
    /// Find a network bridge and print its address
    Discover,
    /// Print box model and firmware version
    Info,
    /// Show the current mode, or switch to NAME (e.g. "waves", "user 3", 0x80)
    Mode { name: Option<String> },
    /// Write up to eight characters to the display
    Display { text: String },
    /// Set both channel levels (0.0 to 1.0)
    Level {
        #[arg(short, long, default_value_t = 0.0)]
        a: f64,
        #[arg(short, long, default_value_t = 0.0)]
        b: f64,
    },
    /// Move the position from FROM to TO (0 to 100) over DURATION_MS
    Ramp {
        #[arg(long, default_value_t = 0.0)]
        from: f64,
        #[arg(long, default_value_t = 100.0)]
        to: f64,
        #[arg(long, default_value_t = 2000)]
        duration_ms: u64,
        /// Keep the final level this long before stopping
        #[arg(long, default_value_t = 500)]
        hold_ms: u64,
    },
    /// Execute a raw box command opcode
    Exec { opcode: String },
    /// Turn the front panel ADC inputs on or off
    Adc {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
    /// Store a new encryption key on the box
    Key { key: String },
    /// Zero both channels
    Reset,
    /// Write the effective settings to the settings file
    SaveSettings,
}

/// Parse `0x`-prefixed hex or decimal
fn parse_byte(text: &str) -> Result<u8> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("Invalid byte value: {}", text))
}

fn parse_mode(text: &str) -> Result<u8> {
    match Mode::from_name(text) {
        Some(mode) => Ok(mode.into()),
        None => parse_byte(text).with_context(|| format!("Unknown mode: {}", text)),
    }
}

/// Merge command-line overrides into the loaded settings
fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(port) = &args.port {
        settings.port = Some(port.clone());
        settings.address = None;
    }
    if let Some(address) = &args.address {
        settings.address = Some(address.clone());
        settings.port = None;
    }
    if args.no_encryption {
        settings.link.encryption = Encryption::Disabled;
    }
}

fn open_transport(settings: &Settings, use_discovery: bool) -> Result<Box<dyn Transport>> {
    if use_discovery {
        let transport =
            TcpTransport::discover(&settings.discovery).context("Network discovery failed")?;
        return Ok(Box::new(transport));
    }
    if let Some(address) = &settings.address {
        let address: SocketAddr = address
            .parse()
            .with_context(|| format!("Invalid bridge address: {}", address))?;
        return Ok(Box::new(TcpTransport::new(address)));
    }
    if let Some(port) = &settings.port {
        return Ok(Box::new(SerialTransport::new(SerialConfig {
            port: port.clone(),
            baud_rate: settings.baud_rate,
        })));
    }
    bail!("No box configured: pass --port, --address, or --discover")
}

type Box312 = Mk312<QueuedRegisters<Box<dyn Transport>>>;

fn connect(settings: &Settings, use_discovery: bool) -> Result<Box312> {
    let transport = open_transport(settings, use_discovery)?;
    let name = transport.connector_name();
    Mk312::connect(transport, settings.link.clone(), settings.device.clone())
        .with_context(|| format!("Failed to connect to box on {}", name))
}

fn run_ramp(mk312: Box312, from: f64, to: f64, duration: Duration, hold: Duration) -> Result<()> {
    let scheduler_config = mk312.config().scheduler.clone();
    let device = Arc::new(Mk312Device::new("mk312", mk312)?);
    let scheduler = DeviceScheduler::new(Arc::clone(&device), scheduler_config)?;

    scheduler.enqueue(DeviceCommandInformation::new(from, to, duration))?;
    thread::sleep(duration + hold);
    println!("Final level {:.1}", device.current_level());

    scheduler.stop();
    scheduler.close();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "mk312ctl=debug,mk312_link=debug,mk312_device=debug"
    } else {
        "mk312ctl=info,mk312_link=info,mk312_device=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    apply_overrides(&mut settings, &args);

    match args.command {
        Command::Ports => {
            for port in list_ports()? {
                match (port.vid, port.pid) {
                    (Some(vid), Some(pid)) => println!(
                        "{}  {:04X}:{:04X}  {}",
                        port.port,
                        vid,
                        pid,
                        port.product.as_deref().unwrap_or("")
                    ),
                    _ => println!("{}", port.port),
                }
            }
            return Ok(());
        }
        Command::Discover => {
            let ip = discover(&settings.discovery).context("No box answered")?;
            println!("{}:{}", ip, settings.discovery.tcp_port);
            return Ok(());
        }
        Command::SaveSettings => {
            let path = settings.save(args.config.as_deref())?;
            println!("Settings written to {}", path.display());
            return Ok(());
        }
        _ => {}
    }

    let mk312 = connect(&settings, args.discover)?;
    info!("Connected");

    match args.command {
        Command::Info => println!("{}", mk312.version_string()?),
        Command::Mode { name: None } => {
            let raw = mk312.current_mode()?;
            match Mode::try_from(raw) {
                Ok(mode) => println!("{} (0x{:02X})", mode.name(), raw),
                Err(_) => println!("0x{:02X}", raw),
            }
        }
        Command::Mode { name: Some(name) } => mk312.set_mode(parse_mode(&name)?)?,
        Command::Display { text } => mk312.write_display_text(&text)?,
        Command::Level { a, b } => {
            mk312.initialize_channels()?;
            mk312.set_levels(ChannelLevels::new(a, b))?;
        }
        Command::Ramp {
            from,
            to,
            duration_ms,
            hold_ms,
        } => {
            return run_ramp(
                mk312,
                from,
                to,
                Duration::from_millis(duration_ms),
                Duration::from_millis(hold_ms),
            );
        }
        Command::Exec { opcode } => mk312.execute_command(parse_byte(&opcode)?)?,
        Command::Adc { state } => mk312.set_adc_enabled(state == "on")?,
        Command::Key { key } => mk312.set_encryption_key(parse_byte(&key)?)?,
        Command::Reset => mk312.reset_channels()?,
        Command::Ports | Command::Discover | Command::SaveSettings => {}
    }

    mk312.disconnect()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_byte() {
        assert_eq!(parse_byte("0x12").unwrap(), 0x12);
        assert_eq!(parse_byte("0XfF").unwrap(), 0xFF);
        assert_eq!(parse_byte("42").unwrap(), 42);
        assert!(parse_byte("0x100").is_err());
        assert!(parse_byte("twelve").is_err());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("waves").unwrap(), 0x76);
        assert_eq!(parse_mode("User 3").unwrap(), 0x8A);
        assert_eq!(parse_mode("0x80").unwrap(), 0x80);
        assert!(parse_mode("nonsense").is_err());
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "mk312ctl",
            "--address",
            "10.0.0.5:8843",
            "--no-encryption",
            "info",
        ]);
        let mut settings = Settings {
            port: Some("/dev/ttyUSB0".to_string()),
            ..Default::default()
        };
        apply_overrides(&mut settings, &args);

        assert_eq!(settings.address.as_deref(), Some("10.0.0.5:8843"));
        assert_eq!(settings.port, None);
        assert_eq!(settings.link.encryption, Encryption::Disabled);
    }

    #[test]
    fn test_missing_box_is_reported() {
        let Err(err) = open_transport(&Settings::default(), false) else {
            panic!("expected an error without a port or address");
        };
        assert!(err.to_string().contains("No box configured"));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
