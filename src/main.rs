//! CLI entry point for `mboxstore`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mboxstore::config::{self, Config};
use mboxstore::import::{run_import, ImportOptions};

#[derive(Parser)]
#[command(
    name = "mboxstore",
    version,
    about = "Import Gmail Takeout MBOX archives (email + chat) into a queryable SQLite database"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an MBOX archive into a SQLite database
    Import {
        /// Path to the .mbox archive
        mbox_file: PathBuf,
        /// Path to the SQLite database (created if missing)
        sqlite_db: PathBuf,
        /// Rows per transaction (overrides config)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level);

    match cli.command {
        Commands::Import {
            mbox_file,
            sqlite_db,
            batch_size,
            quiet,
        } => cmd_import(&mbox_file, &sqlite_db, batch_size, quiet, &config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing on stderr, honoring `RUST_LOG` when present.
fn setup_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run one import with a byte-offset progress bar and print the counters.
fn cmd_import(
    mbox_file: &Path,
    sqlite_db: &Path,
    batch_size: Option<usize>,
    quiet: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let options = ImportOptions {
        batch_size: batch_size.unwrap_or(config.import.batch_size),
        max_message_size: config.import.max_message_size,
    };

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} Importing [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                )
                .expect("valid template")
                .progress_chars("#>-"),
        );
        pb
    };

    let start = Instant::now();
    let report = run_import(
        mbox_file,
        sqlite_db,
        &options,
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    )?;
    pb.finish_and_clear();

    let elapsed = start.elapsed();
    println!(
        "Processed {} messages in {:.1}s: {} inserted, {} updated, {} duplicates skipped, {} failed",
        report.processed,
        elapsed.as_secs_f64(),
        report.inserted,
        report.updated,
        report.skipped,
        report.failed
    );
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mboxstore", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
