/*!
# ddcctl

Read and write monitor settings over DDC/CI from the command line.

## Usage

### Read a control
```bash
ddcctl --bus 0 get brightness
ddcctl --bus /dev/i2c-4 --json get 0x12
```

### Write a control
```bash
ddcctl --bus 0 set brightness 70
```

### Generate configuration file
```bash
ddcctl config --output ddcctl.toml
```

You can find your bus number with `i2cdetect -l` or `ddccontrol -p`.
*/

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use ddcci::{control, Bus, DdcciDevice, ReadResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::AppConfig;

/// Control written by the demo, as in the classic ddcci demo script
const DEMO_CONTROL: u8 = 0x41;
const DEMO_VALUE: u16 = 17;

#[derive(Parser)]
#[command(name = "ddcctl")]
#[command(about = "Query and control monitor settings over DDC/CI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults are used if it does not exist)
    #[arg(short, long, default_value = "ddcctl.toml")]
    config: PathBuf,

    /// I2C bus: adapter number or device path (overrides the config file)
    #[arg(short, long)]
    bus: Option<String>,

    /// 7-bit display address, decimal or 0x-prefixed hex
    #[arg(short, long, value_parser = parse_byte)]
    address: Option<u8>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the current and maximum value of a control
    Get {
        /// Control code (0x10) or name (brightness)
        #[arg(value_parser = parse_control)]
        control: u8,
    },

    /// Set a control to a value
    Set {
        /// Control code (0x10) or name (brightness)
        #[arg(value_parser = parse_control)]
        control: u8,

        /// New value
        value: u16,
    },

    /// Read control 0x41, then write 17 to it
    Demo,

    /// List named controls
    Controls,

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "ddcctl.toml")]
        output: PathBuf,
    },
}

/// One control reading, as printed by `get`
#[derive(Serialize)]
struct ControlReport {
    control: u8,
    name: Option<&'static str>,
    value: u16,
    max_value: u16,
}

impl ControlReport {
    fn new(control: u8, result: ReadResult) -> Self {
        Self {
            control,
            name: control::name_of(control),
            value: result.value,
            max_value: result.max_value,
        }
    }
}

/// Acknowledgement printed by `set`
#[derive(Serialize)]
struct WriteReport {
    control: u8,
    name: Option<&'static str>,
    value: u16,
}

impl WriteReport {
    fn new(control: u8, value: u16) -> Self {
        Self {
            control,
            name: control::name_of(control),
            value,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr to keep stdout clean for results
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    match &cli.command {
        Commands::Config { output } => generate_config_file(output),
        Commands::Controls => {
            list_controls();
            Ok(())
        }
        Commands::Get { control } => {
            let device = open_device(&cli)?;
            let result = device
                .read(*control)
                .with_context(|| format!("Failed to read control {:#04x}", control))?;
            print_report(&ControlReport::new(*control, result), cli.json)
        }
        Commands::Set { control, value } => {
            let device = open_device(&cli)?;
            device
                .write(*control, *value)
                .with_context(|| format!("Failed to write control {:#04x}", control))?;
            print_write(&WriteReport::new(*control, *value), cli.json)
        }
        Commands::Demo => run_demo(&cli),
    }
}

/// Open the display selected by the config file and command-line overrides
fn open_device(cli: &Cli) -> Result<DdcciDevice> {
    let mut config = AppConfig::load_or_default(&cli.config)?;
    if let Some(address) = cli.address {
        config.ddcci.address = address;
    }

    let bus = match &cli.bus {
        Some(spec) => parse_bus(spec),
        None => Bus::Path(config.bus.device.clone()),
    };

    info!("Opening {:?} at address {:#04x}", bus, config.ddcci.address);
    DdcciDevice::with_config(bus, &config.ddcci).context("Failed to open DDC/CI device")
}

fn run_demo(cli: &Cli) -> Result<()> {
    let device = open_device(cli)?;

    println!("Demo 1 ...");
    match device.read(DEMO_CONTROL) {
        Ok(result) => print_report(&ControlReport::new(DEMO_CONTROL, result), cli.json)?,
        Err(e) => eprintln!("read {:#04x} failed: {}", DEMO_CONTROL, e),
    }

    device
        .write(DEMO_CONTROL, DEMO_VALUE)
        .with_context(|| format!("Failed to write control {:#04x}", DEMO_CONTROL))?;
    print_write(&WriteReport::new(DEMO_CONTROL, DEMO_VALUE), cli.json)
}

fn print_report(report: &ControlReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        let label = report
            .name
            .map(|n| format!("{} ({:#04x})", n, report.control))
            .unwrap_or_else(|| format!("{:#04x}", report.control));
        println!("{}: {} / {}", label, report.value, report.max_value);
    }
    Ok(())
}

fn print_write(report: &WriteReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        println!("{:#04x} <- {}", report.control, report.value);
    }
    Ok(())
}

fn list_controls() {
    for (name, code) in control::known() {
        println!("{:#04x}  {}", code, name);
    }
}

/// Generate a default configuration file
fn generate_config_file(output_path: &Path) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the file to customize settings, then run:");
    println!("   ddcctl --config {} get brightness", output_path.display());

    Ok(())
}

/// Adapter number (`4`) or device path (`/dev/i2c-4`)
fn parse_bus(spec: &str) -> Bus {
    match spec.parse::<u32>() {
        Ok(n) => Bus::Number(n),
        Err(_) => Bus::Path(PathBuf::from(spec)),
    }
}

/// Decimal or 0x-prefixed hex byte
fn parse_byte(s: &str) -> std::result::Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid byte '{}': {}", s, e))
}

/// Control name from the table, or a raw byte
fn parse_control(s: &str) -> std::result::Result<u8, String> {
    match control::by_name(s) {
        Some(code) => Ok(code),
        None => parse_byte(s).map_err(|_| format!("unknown control '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_byte() {
        assert_eq!(parse_byte("0x37"), Ok(0x37));
        assert_eq!(parse_byte("0X7f"), Ok(0x7F));
        assert_eq!(parse_byte("55"), Ok(55));
        assert!(parse_byte("0x100").is_err());
        assert!(parse_byte("abc").is_err());
    }

    #[test]
    fn test_parse_control() {
        assert_eq!(parse_control("brightness"), Ok(0x10));
        assert_eq!(parse_control("0x41"), Ok(0x41));
        assert_eq!(parse_control("gamma"), Err("unknown control 'gamma'".to_string()));
    }

    #[test]
    fn test_parse_bus() {
        assert_eq!(parse_bus("3").device_path(), Some(PathBuf::from("/dev/i2c-3")));
        assert_eq!(parse_bus("/dev/i2c-9").device_path(), Some(PathBuf::from("/dev/i2c-9")));
    }

    #[test]
    fn test_cli_parses_set() {
        let cli = Cli::try_parse_from(["ddcctl", "-b", "1", "-a", "0x37", "set", "contrast", "40"]).unwrap();
        assert_eq!(cli.address, Some(0x37));
        assert!(matches!(cli.command, Commands::Set { control: 0x12, value: 40 }));
    }

    #[test]
    fn test_report_json() {
        let report = ControlReport::new(0x10, ReadResult { value: 50, max_value: 100 });
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"control":16,"name":"brightness","value":50,"max_value":100}"#
        );
    }

    #[test]
    fn test_write_report_json() {
        assert_eq!(
            serde_json::to_string(&WriteReport::new(0x12, 40)).unwrap(),
            r#"{"control":18,"name":"contrast","value":40}"#
        );
        assert_eq!(
            serde_json::to_string(&WriteReport::new(0x41, 17)).unwrap(),
            r#"{"control":65,"name":null,"value":17}"#
        );
    }
}
