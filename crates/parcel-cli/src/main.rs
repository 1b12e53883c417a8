mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{Context, EXIT_FAILURE};
use parcel_core::{ConfigOverrides, LaunchConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "parcel",
    version,
    about = "Verify, extract, and launch applications bundled inside zip containers"
)]
struct Cli {
    /// Bundle (zip container) holding the manifest and payloads.
    #[arg(short = 'f', long = "file", global = true)]
    file: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable debug logging (extraction progress, mode changes, run command).
    #[arg(short, long, default_value_t = false, global = true)]
    debug: bool,

    /// Enable trace-level logging (more detailed than --debug).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Configuration file (default: ~/.config/parcel/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base directory for extracted applications.
    #[arg(long, global = true)]
    extract_dir: Option<PathBuf>,

    /// Port exported to the application as PORT.
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Use this architecture tag instead of detecting the host's.
    #[arg(long = "arch", global = true)]
    arch: Option<String>,

    /// Stop the application after this many seconds.
    #[arg(long = "timeout", global = true)]
    timeout: Option<u64>,

    /// Companion service backend: android or none.
    #[arg(long, global = true)]
    companion: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the applications in a bundle.
    List,
    /// Extract (if needed) and run an application.
    Run {
        /// Application id; the manifest default when omitted.
        id: Option<String>,
    },
    /// Show an application's command and payloads.
    Inspect {
        /// Application id.
        id: String,
    },
    /// Check whether an application's extraction is current.
    Verify {
        /// Application id; the manifest default when omitted.
        id: Option<String>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<LaunchConfig, String> {
    let mut config = match &cli.config {
        Some(path) => LaunchConfig::load(path),
        None => LaunchConfig::load_default(),
    }
    .map_err(|e| e.to_string())?;
    config.apply_overrides(ConfigOverrides {
        extract_dir: cli.extract_dir.clone(),
        port: cli.port,
        debug: cli.debug,
        architecture: cli.arch.clone(),
        timeout_secs: cli.timeout,
        companion: cli.companion.clone(),
    });
    Ok(config)
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let default_level = if cli.trace {
        "trace"
    } else if config.debug {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("PARCEL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();
    tracing::debug!("debug mode enabled");

    let ctx = Context {
        bundle: cli.file,
        config,
        json: cli.json,
    };

    let result = match cli.command {
        Commands::List => commands::list::run(&ctx),
        Commands::Run { id } => commands::run::run(&ctx, id.as_deref()),
        Commands::Inspect { id } => commands::inspect::run(&ctx, &id),
        Commands::Verify { id } => commands::verify::run(&ctx, id.as_deref()),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
