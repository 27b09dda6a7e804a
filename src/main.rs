//! Hostlink - host executable
//!
//! Loads a module library, verifies its entry table and drives every entry
//! point across the C ABI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hostlink::config::{HostlinkConfig, CONFIG_FILE};
use hostlink::ffi::{self, callback, ImageHandle, SENTINEL_LIBRARY};
use hostlink::host::{self, ModuleApi};
use hostlink::module::HOST_PROBE_SYMBOL;
use hostlink::Variant;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hl")]
#[command(version)]
#[command(about = "Host side of the hostlink C-ABI boundary", long_about = None)]
struct Cli {
    /// Configuration file (default: hostlink.toml in this or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the module and call every entry point once
    Run {
        /// Module library path (overrides module.path)
        #[arg(short, long)]
        module: Option<PathBuf>,
    },

    /// Print the module's entry table
    Entries {
        /// Module library path (overrides module.path)
        #[arg(short, long)]
        module: Option<PathBuf>,
    },

    /// Resolve a library name in this process
    Resolve {
        /// Library name; "__Internal" is this executable
        library: String,

        /// Symbol to look up in the resolved library
        #[arg(short, long)]
        symbol: Option<String>,
    },

    /// Manage hostlink.toml
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Output path
        #[arg(default_value = CONFIG_FILE)]
        path: PathBuf,
    },
}

static PROBE_CALLS: AtomicUsize = AtomicUsize::new(0);

/// Called by the module during bootstrap, found through `"__Internal"`
#[no_mangle]
pub extern "C" fn hl_host_probe() {
    let calls = PROBE_CALLS.fetch_add(1, Ordering::SeqCst) + 1;
    let _ = writeln!(std::io::stdout().lock(), "host probe called ({})", calls);
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => HostlinkConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => HostlinkConfig::load_from_cwd().context("Failed to load configuration")?,
    };
    init_logging(&config.logging.filter);

    match cli.command {
        Commands::Run { module } => cmd_run(&config, module.as_deref()),
        Commands::Entries { module } => cmd_entries(&config, module.as_deref()),
        Commands::Resolve { library, symbol } => cmd_resolve(&library, symbol.as_deref()),
        Commands::Config {
            action: ConfigAction::Init { path },
        } => cmd_config_init(&path),
    }
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_module(config: &HostlinkConfig, module: Option<&Path>) -> Result<ModuleApi> {
    let configured = config.module.path.as_deref().map(Path::new);
    let path = host::locate_module(
        &config.module.name,
        module.or(configured),
        &config.module_search_paths(),
    )?;
    tracing::info!(path = %path.display(), "loading module");
    ModuleApi::load(&path).with_context(|| format!("Failed to load module {}", path.display()))
}

fn cmd_run(config: &HostlinkConfig, module: Option<&Path>) -> Result<()> {
    let api = load_module(config, module)?;
    println!("Loaded {} module ({} entries)", api.variant(), api.entries().len());

    if api.variant() == Variant::Bootstrap {
        let image = if config.host.bootstrap {
            Some(ImageHandle::current_process()?)
        } else {
            None
        };
        tracing::debug!(
            probe = ?callback::address_of::<callback::HostProbe>(hl_host_probe),
            "bootstrapping module"
        );
        // A failed bootstrap is reported, not fatal
        if let Err(e) = api.bootstrap(image) {
            tracing::warn!(error = %e, "module bootstrap failed");
        }
    }

    let message = &config.host.message;
    api.print(message)?;

    let reply = api.echo_string(message)?;
    println!("host received reply: {}", reply);

    let produced = api.produce_string()?;
    println!("host received reply: {}", produced);

    api.invoke_with_bool(host::report_bool)?;
    api.invoke_with_string(host::report_string)?;

    tracing::info!(
        probe_calls = PROBE_CALLS.load(Ordering::SeqCst),
        "module run complete"
    );
    Ok(())
}

fn cmd_entries(config: &HostlinkConfig, module: Option<&Path>) -> Result<()> {
    let api = load_module(config, module)?;
    if let Some(path) = api.path() {
        println!("Module: {}", path.display());
    }
    println!("Variant: {}", api.variant());
    println!("ABI version: {}", hostlink::ABI_VERSION);
    println!();
    for entry in api.entries() {
        println!("  {:<24} {}", entry.name, entry.signature);
    }
    Ok(())
}

fn cmd_resolve(library: &str, symbol: Option<&str>) -> Result<()> {
    ffi::install_host_image_handle(ImageHandle::current_process()?)?;
    let resolver = ffi::install_resolver();

    let handle = resolver
        .resolve(library)
        .with_context(|| format!("Failed to resolve {}", library))?;
    let kind = if library == SENTINEL_LIBRARY {
        "host image"
    } else {
        "loaded library"
    };
    println!("{} -> {:p} ({})", library, handle.as_raw(), kind);

    if let Some(symbol) = symbol {
        let addr = resolver
            .resolve_symbol(library, symbol)
            .with_context(|| format!("Failed to find {} in {}", symbol, library))?;
        println!("  {} -> {:p}", symbol, addr);
        if symbol == HOST_PROBE_SYMBOL && library == SENTINEL_LIBRARY {
            println!("  (the module calls this during bootstrap)");
        }
    }
    Ok(())
}

fn cmd_config_init(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    HostlinkConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
