mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::{GlobalOpts, EXIT_FAILURE, EXIT_MANIFEST_ERROR, EXIT_RESOLVE_ERROR};
use freezer_core::DuplicatePolicy;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "freezer",
    version,
    about = "Resolve firmware freeze manifests into the list of modules to embed"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Configuration file (overrides $FREEZER_CONFIG and freezer.toml discovery).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bind a placeholder variable, e.g. --var MPY_DIR=/src/micropython. Repeatable.
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var, global = true)]
    vars: Vec<(String, String)>,

    /// How to settle two entries with the same destination name: error, first-wins, last-wins.
    #[arg(long, value_name = "POLICY", global = true)]
    on_duplicate: Option<DuplicatePolicy>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve a manifest and print the ordered list of frozen files.
    Resolve {
        /// Path to the root manifest (or its directory).
        #[arg(default_value = "manifest.toml")]
        manifest: PathBuf,
    },
    /// Validate a manifest tree without printing entries.
    Check {
        /// Path to the root manifest (or its directory).
        #[arg(default_value = "manifest.toml")]
        manifest: PathBuf,
    },
    /// Resolve, hash every source, and write a lock file.
    Lock {
        /// Path to the root manifest (or its directory).
        #[arg(default_value = "manifest.toml")]
        manifest: PathBuf,
        /// Lock file to write (default: freezer.lock next to the manifest).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Compare a fresh resolution with the lock file; exits 4 on drift.
    Verify {
        /// Path to the root manifest (or its directory).
        #[arg(default_value = "manifest.toml")]
        manifest: PathBuf,
        /// Lock file to compare against (default: freezer.lock next to the manifest).
        #[arg(long)]
        lock: Option<PathBuf>,
    },
    /// Show the effective variable environment and duplicate policy.
    Vars {
        /// Manifest whose project freezer.toml is consulted.
        #[arg(default_value = "manifest.toml")]
        manifest: PathBuf,
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

fn parse_var(s: &str) -> Result<(String, String), String> {
    freezer_schema::Environment::parse_assignment(s).map_err(|e| e.to_string())
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

    let default_level = if cli.global.trace {
        "trace"
    } else if cli.global.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("FREEZER_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let opts = GlobalOpts {
        json: cli.global.json,
        config: cli.global.config,
        vars: cli.global.vars,
        on_duplicate: cli.global.on_duplicate,
    };

    let result = match cli.command {
        Commands::Resolve { manifest } => commands::resolve::run(&opts, &manifest),
        Commands::Check { manifest } => commands::check::run(&opts, &manifest),
        Commands::Lock { manifest, output } => {
            commands::lock::run(&opts, &manifest, output.as_deref())
        }
        Commands::Verify { manifest, lock } => {
            commands::verify::run(&opts, &manifest, lock.as_deref())
        }
        Commands::Vars { manifest } => commands::vars::run(&opts, &manifest),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:") {
                EXIT_MANIFEST_ERROR
            } else if msg.starts_with("resolve error:") {
                EXIT_RESOLVE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
