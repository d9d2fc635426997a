//! zipvault: encrypt zip archives at rest
//!
//! Commands:
//!   encrypt <archive>   - seal the archive (or each entry with --entries)
//!   decrypt <archive>   - open it again with its key file
//!   cat <archive>       - decrypt in memory and print, nothing written
//!   rekey <archive>     - rotate the key of an encrypted archive
//!   clean <archive>     - discard a pending file left by a crashed run
//!   config show         - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};

use zipvault_archive::{
    discard_orphan, rekey, transform, Output, Placement, TransformOptions,
};
use zipvault_core::config::ZipvaultConfig;
use zipvault_core::{CompressionMode, Direction, Granularity};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "zipvault",
    version,
    about = "Encrypt zip archives with a separate key file",
    long_about = "zipvault: encrypt and decrypt zip archives, whole or entry by entry, \
                  with crash-safe in-place replacement"
)]
struct Cli {
    /// Path to zipvault.toml configuration file
    #[arg(long, short = 'c', env = "ZIPVAULT_CONFIG", default_value = "zipvault.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "ZIPVAULT_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "ZIPVAULT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(clap::Args, Debug)]
struct Target {
    /// Archive file
    archive: PathBuf,

    /// Encrypt each entry payload instead of the whole file (keeps the
    /// archive browsable; entry names stay visible)
    #[arg(long, short = 'e')]
    entries: bool,

    /// Key file, or a directory holding `<archive>.key` (default: next to
    /// the archive)
    #[arg(long, short = 'k')]
    key: Option<PathBuf>,
}

impl Target {
    fn granularity(&self) -> Granularity {
        if self.entries {
            Granularity::PerEntry
        } else {
            Granularity::WholeArchive
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt an archive, creating its key file if needed
    Encrypt {
        #[command(flatten)]
        target: Target,
        /// Write cipher_<archive> next to the source instead of replacing it
        #[arg(long)]
        keep: bool,
        /// Generate a new key even if one exists (the old key file is backed up)
        #[arg(long)]
        rotate: bool,
        /// Compression for rebuilt archives (stored, deflated, bzip2, zstd)
        #[arg(long)]
        compression: Option<CompressionMode>,
    },

    /// Decrypt an archive using its key file
    Decrypt {
        #[command(flatten)]
        target: Target,
        /// Write plain_<archive> next to the source instead of replacing it
        #[arg(long)]
        keep: bool,
        /// Compression for rebuilt archives (stored, deflated, bzip2, zstd)
        #[arg(long)]
        compression: Option<CompressionMode>,
    },

    /// Decrypt in memory and print; nothing is written to disk
    ///
    /// Without --entry or --raw, lists entry names and sizes.
    Cat {
        #[command(flatten)]
        target: Target,
        /// Write this entry's plaintext to stdout
        #[arg(long, conflicts_with = "raw")]
        entry: Option<String>,
        /// Write the whole decrypted archive to stdout
        #[arg(long)]
        raw: bool,
    },

    /// Rotate the key of an encrypted archive (previous key is backed up)
    Rekey {
        #[command(flatten)]
        target: Target,
    },

    /// Remove a pending file left behind by an interrupted run
    Clean {
        /// Archive whose pending file should be discarded
        archive: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ZipvaultConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format {
        Some(format) => format,
        None if config.log.format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, &format);

    match cli.command {
        Commands::Encrypt {
            target,
            keep,
            rotate,
            compression,
        } => {
            let mut opts = options(&config, &target, keep, compression);
            opts.rotate_key |= rotate;
            cmd_transform(&target, Direction::Encrypt, &opts)
        }
        Commands::Decrypt {
            target,
            keep,
            compression,
        } => {
            let opts = options(&config, &target, keep, compression);
            cmd_transform(&target, Direction::Decrypt, &opts)
        }
        Commands::Cat { target, entry, raw } => cmd_cat(&config, &target, entry.as_deref(), raw),
        Commands::Rekey { target } => cmd_rekey(&config, &target),
        Commands::Clean { archive } => cmd_clean(&config, &archive),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stderr keeps stdout clean for `cat`
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Merge config defaults with per-command flags. Flags win.
fn options(
    config: &ZipvaultConfig,
    target: &Target,
    keep: bool,
    compression: Option<CompressionMode>,
) -> TransformOptions {
    let mut opts = TransformOptions::from_config(config);
    if let Some(key) = &target.key {
        opts.key_path = Some(key.clone());
    }
    if keep {
        opts.placement = Placement::Alongside;
    }
    if let Some(compression) = compression {
        opts.compression = compression;
    }
    opts
}

// ── `zipvault encrypt` / `zipvault decrypt` ───────────────────────────────────

fn cmd_transform(target: &Target, direction: Direction, opts: &TransformOptions) -> Result<()> {
    let outcome = transform(&target.archive, target.granularity(), direction, opts)
        .with_context(|| format!("{direction} {}", target.archive.display()))?;

    if let Output::Written(path) = &outcome.output {
        println!("{}: {}", outcome.operation, path.display());
    }
    if outcome.key_created {
        println!("  new key: {}", outcome.key_path.display());
        println!("  keep this key safe: without it the archive cannot be decrypted");
    } else {
        println!("  key:     {}", outcome.key_path.display());
    }
    Ok(())
}

// ── `zipvault cat` ────────────────────────────────────────────────────────────

fn cmd_cat(
    config: &ZipvaultConfig,
    target: &Target,
    entry: Option<&str>,
    raw: bool,
) -> Result<()> {
    let opts = options(config, target, false, None).placement(Placement::Memory);
    let outcome = transform(&target.archive, target.granularity(), Direction::Decrypt, &opts)
        .with_context(|| format!("decrypt {}", target.archive.display()))?;

    let Output::Memory(payload) = outcome.output else {
        anyhow::bail!("expected in-memory output");
    };

    if raw {
        let bytes = payload.into_bytes(opts.compression)?;
        std::io::stdout()
            .write_all(&bytes)
            .context("writing archive to stdout")?;
        return Ok(());
    }

    let entries = payload.into_entries()?;
    match entry {
        Some(name) => {
            let data = entries
                .get(name)
                .with_context(|| format!("no entry '{name}' in {}", target.archive.display()))?;
            std::io::stdout()
                .write_all(data)
                .context("writing entry to stdout")?;
        }
        None => {
            for (name, data) in &entries {
                println!("{:>10}  {name}", data.len());
            }
            println!("{} entries", entries.len());
        }
    }
    Ok(())
}

// ── `zipvault rekey` ──────────────────────────────────────────────────────────

fn cmd_rekey(config: &ZipvaultConfig, target: &Target) -> Result<()> {
    let opts = options(config, target, false, None);
    let outcome = rekey(&target.archive, target.granularity(), &opts)
        .with_context(|| format!("rekey {}", target.archive.display()))?;

    println!("rekeyed: {}", outcome.archive.display());
    println!("  new key:      {}", outcome.key_path.display());
    println!("  previous key: {}", outcome.backup_path.display());
    Ok(())
}

// ── `zipvault clean` ──────────────────────────────────────────────────────────

fn cmd_clean(config: &ZipvaultConfig, archive: &Path) -> Result<()> {
    if discard_orphan(archive, &config.output.pending_prefix)? {
        println!("removed pending file for {}", archive.display());
    } else {
        println!("nothing to clean for {}", archive.display());
    }
    Ok(())
}

// ── `zipvault config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &ZipvaultConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
