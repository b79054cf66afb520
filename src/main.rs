//! Reaper command-line entry point

use clap::Parser;
use reaper::config::Config;
use reaper::crawler;
use reaper::display::Display;
use reaper::ReaperError;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Reaper: a recursive web archiver
///
/// Reaper mirrors a site breadth-first from a seed URL, rewriting links in
/// each archived page to point at the local copies.
#[derive(Parser, Debug)]
#[command(name = "reaper")]
#[command(version = "0.1.0")]
#[command(about = "Recursive web archiver", long_about = None)]
struct Cli {
    /// The URL to start crawling from
    #[arg(value_name = "SEED_URL")]
    seed_url: String,

    /// Breadth-first crawl depth beyond the seed page
    #[arg(long, default_value = "1")]
    depth: u32,

    /// Delay in seconds between requests
    #[arg(long, default_value = "1")]
    delay: u64,

    /// Follow links onto foreign hosts
    #[arg(long)]
    xdomain: bool,

    /// Connect over TLS from the start
    #[arg(long)]
    tls: bool,

    /// Archive root directory (default: $HOME/WR_Reaped)
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Log plain lines instead of drawing the status dashboard
    #[arg(long)]
    plain: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet, cli.plain);

    let config = Config::new(
        cli.seed_url,
        cli.depth,
        cli.delay,
        cli.xdomain,
        cli.tls,
        cli.output,
        cli.plain,
    );

    tracing::info!(
        seed = %config.seed_url,
        depth = config.crawl_depth,
        root = %config.archive_root.display(),
        "starting crawl"
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            flag.store(true, std::sync::atomic::Ordering::Relaxed);
        })?;
    }

    let display = Arc::new(Display::new(cli.plain));

    match crawler::crawl(config, display, interrupted) {
        Ok(nr_reaped) => {
            eprintln!();
            tracing::info!(nr_reaped, "crawl complete");
            println!("Archived {nr_reaped} page(s)");
            Ok(())
        }
        Err(ReaperError::Interrupted) => {
            eprintln!();
            tracing::warn!("crawl interrupted");
            Ok(())
        }
        Err(e) => {
            tracing::error!("crawl failed: {e}");
            Err(e.into())
        }
    }
}

/// Sets up the tracing subscriber from the verbosity flags.
///
/// While the dashboard is drawn, anything below error level would scribble
/// over it, so dashboard mode pins the filter to errors unless verbosity
/// was raised explicitly.
fn setup_logging(verbose: u8, quiet: bool, plain: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match (plain, verbose) {
            (false, 0) => EnvFilter::new("error"),
            (true, 0) => EnvFilter::new("reaper=info,warn"),
            (_, 1) => EnvFilter::new("reaper=debug,info"),
            (_, 2) => EnvFilter::new("reaper=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
