use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use sanboot_firmware::nic::TCPIP_INTERFACES_KEY;
use sanboot_firmware::registry::key_path;
use sanboot_firmware::scan::{BASEMEM_END, BASEMEM_START};
use sanboot_firmware::{
    BootDisplay, BootText, BootTextConfig, DiscoveryOptions, MacAddr, MemoryRegistry, NicServices,
    RegistryValue, SanBoot, StaticNicLocator, TableKind, VecMemory,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TableArg {
    Ibft,
    Abft,
    Sbft,
}

impl From<TableArg> for TableKind {
    fn from(arg: TableArg) -> Self {
        match arg {
            TableArg::Ibft => TableKind::Ibft,
            TableArg::Abft => TableKind::Abft,
            TableArg::Sbft => TableKind::Sbft,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct ImageArgs {
    /// Raw physical memory image covering 0x80000..0xa0000.
    #[arg(long)]
    image: PathBuf,

    /// Physical address of the first byte of the image.
    #[arg(long, default_value = "0", value_parser = parse_addr)]
    base: u64,

    /// Leave iBFT NIC gateways as the firmware wrote them.
    #[arg(long)]
    no_gateway_fixup: bool,
}

#[derive(Debug, Parser)]
#[command(name = "sanbootconf", version)]
#[command(about = "Inspect and extract SAN boot firmware tables (iBFT, aBFT, sBFT) from a memory image")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter (tracing-subscriber EnvFilter syntax).
    ///
    /// Environment variable: `SANBOOTCONF_LOG_LEVEL`.
    #[arg(long, global = true, env = "SANBOOTCONF_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Find and decode every boot firmware table in the image.
    Scan {
        #[command(flatten)]
        image: ImageArgs,

        /// Print the decoded tables as JSON.
        #[arg(long)]
        json: bool,

        /// OS load options, used to decide whether boot text would be drawn.
        ///
        /// Environment variable: `SANBOOTCONF_LOAD_OPTIONS`.
        #[arg(long, env = "SANBOOTCONF_LOAD_OPTIONS", default_value = "")]
        load_options: String,

        /// Behave as if the `BootText` driver parameter were 0.
        #[arg(long)]
        no_boot_text: bool,

        /// Host interface to configure, as `<mac>=<NetCfgInstanceId>`. Repeatable.
        #[arg(long = "interface", value_parser = parse_interface)]
        interfaces: Vec<(MacAddr, String)>,
    },
    /// Write the bytes of one captured table to a file.
    Export {
        #[command(flatten)]
        image: ImageArgs,

        #[arg(long, value_enum)]
        table: TableArg,

        #[arg(long)]
        out: PathBuf,

        /// Truncate the output to this many bytes.
        #[arg(long)]
        max_len: Option<usize>,
    },
}

fn parse_addr(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|err| format!("invalid address {s:?}: {err}"))
}

fn parse_mac(s: &str) -> Result<MacAddr, String> {
    let mut mac = [0u8; 6];
    let mut parts = s.split([':', '-']);
    for byte in &mut mac {
        let part = parts.next().ok_or_else(|| format!("MAC {s:?} is too short"))?;
        *byte = u8::from_str_radix(part, 16).map_err(|err| format!("invalid MAC {s:?}: {err}"))?;
    }
    if parts.next().is_some() {
        return Err(format!("MAC {s:?} is too long"));
    }
    Ok(MacAddr(mac))
}

fn parse_interface(s: &str) -> Result<(MacAddr, String), String> {
    let (mac, id) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <mac>=<NetCfgInstanceId>, got {s:?}"))?;
    if id.is_empty() {
        return Err(format!("empty NetCfgInstanceId in {s:?}"));
    }
    Ok((parse_mac(mac)?, id.to_owned()))
}

/// Shows boot screen text on stdout.
struct ConsoleDisplay {
    owned: bool,
    quiet: bool,
}

impl BootDisplay for ConsoleDisplay {
    fn owns_display(&self) -> bool {
        self.owned
    }

    fn acquire_display(&mut self) {
        self.owned = true;
    }

    fn set_scroll_region(&mut self, _left: u32, _top: u32, _right: u32, _bottom: u32) {}

    fn set_text_colour(&mut self, _colour: u32) {}

    fn display_string(&mut self, text: &str) {
        if !self.quiet {
            println!("boot: {text}");
        }
    }
}

fn load_image(args: &ImageArgs) -> Result<VecMemory> {
    let image = fs::read(&args.image)
        .with_context(|| format!("failed to read memory image {}", args.image.display()))?;
    let end = args.base.saturating_add(image.len() as u64);
    if args.base > BASEMEM_START || end < BASEMEM_END {
        bail!(
            "memory image {} covers {:#x}..{end:#x}, which does not include {BASEMEM_START:#x}..{BASEMEM_END:#x}",
            args.image.display(),
            args.base,
        );
    }
    Ok(VecMemory::from_image(args.base, image))
}

fn options(args: &ImageArgs) -> DiscoveryOptions {
    DiscoveryOptions {
        gateway_fixup: !args.no_gateway_fixup,
    }
}

fn quiet_boot_text() -> BootText<ConsoleDisplay> {
    BootText::new(
        BootTextConfig::default(),
        ConsoleDisplay {
            owned: false,
            quiet: true,
        },
    )
}

fn render_value(value: &RegistryValue) -> String {
    match value {
        RegistryValue::Sz(s) => format!("\"{s}\""),
        RegistryValue::MultiSz(list) => format!("{list:?}"),
        RegistryValue::Dword(d) => format!("{d:#x}"),
    }
}

fn print_report(san: &SanBoot, registry: &MemoryRegistry, interfaces: &[(MacAddr, String)]) {
    if let Some(ibft) = &san.ibft {
        for entry in ibft.entries() {
            println!("{}", entry.structure);
        }
    }
    if let Some(abft) = &san.abft {
        println!("{abft}");
    }
    if let Some(sbft) = &san.sbft {
        println!("{sbft}");
    }
    for change in &san.gateway_changes {
        println!(
            "Amended gateway for iBFT NIC {} from {} to {} ({} directly attached target(s))",
            change.nic_index, change.old, change.new, change.attached_targets
        );
    }
    for outcome in &san.nics {
        match &outcome.interface {
            Ok(id) => println!("NIC {} is interface {id}", outcome.mac),
            Err(err) => println!("NIC {} not configured: {err}", outcome.mac),
        }
    }
    for (_, id) in interfaces {
        let key = key_path(&[TCPIP_INTERFACES_KEY, id]);
        let Some(values) = registry.values(&key) else {
            continue;
        };
        for (name, value) in values {
            println!("{id}: {name} = {}", render_value(value));
        }
    }
    for kind in TableKind::ALL {
        if let Some(table) = san.table(kind) {
            println!("{kind}: {} bytes", table.len());
        }
    }
    if san.san_boot_detected() {
        println!("SAN boot detected");
    } else {
        println!("No SAN boot method detected");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level filter")?,
        None => EnvFilter::new("info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Scan {
            image,
            json,
            load_options,
            no_boot_text,
            interfaces,
        } => {
            let mem = load_image(&image)?;

            let mut registry = MemoryRegistry::new();
            let mut locator = StaticNicLocator::new();
            for (mac, id) in &interfaces {
                registry.create_key(&key_path(&[TCPIP_INTERFACES_KEY, id]));
                locator = locator.with_interface(*mac, id.clone());
            }

            let config = BootTextConfig {
                guiboot_enabled: sanboot_firmware::params::guiboot_enabled(&load_options),
                boot_text_enabled: !no_boot_text,
            };
            let mut boot_text = BootText::new(
                config,
                ConsoleDisplay {
                    owned: false,
                    quiet: json,
                },
            );

            let services = (!interfaces.is_empty()).then(|| NicServices {
                locator: &locator,
                registry: &mut registry,
            });
            let san = SanBoot::discover(&mem, &mut boot_text, options(&image), services);

            if json {
                let out = serde_json::to_string_pretty(&san).context("failed to encode JSON")?;
                println!("{out}");
            } else {
                print_report(&san, &registry, &interfaces);
            }
            Ok(())
        }
        Commands::Export {
            image,
            table,
            out,
            max_len,
        } => {
            let mem = load_image(&image)?;
            let san = SanBoot::discover(&mem, &mut quiet_boot_text(), options(&image), None);
            let kind = TableKind::from(table);

            let len = san.table(kind).map_or(0, |t| t.len());
            let mut buf = vec![0u8; max_len.map_or(len, |max| max.min(len))];
            let written = san
                .fetch_table_copy(kind, &mut buf)
                .with_context(|| format!("cannot export {kind}"))?;
            buf.truncate(written);

            fs::write(&out, &buf)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("wrote {written} bytes of {kind} to {}", out.display());
            Ok(())
        }
    }
}
