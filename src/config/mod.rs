//! Crawl configuration
//!
//! All options come in through the command line and live in one plain
//! struct for the rest of the run. The only field that changes after
//! startup is the TLS flag, which flips when the crawl follows a redirect
//! onto `https://`.

use std::path::PathBuf;
use std::time::Duration;

/// Name of the mirror directory created under `$HOME` by default.
pub const ARCHIVE_DIR_NAME: &str = "WR_Reaped";

/// Runtime options for one crawl.
#[derive(Debug, Clone)]
pub struct Config {
    /// The URL the crawl starts from.
    pub seed_url: String,

    /// Number of breadth-first generations to descend past the seed.
    pub crawl_depth: u32,

    /// Fixed politeness delay before each request.
    pub crawl_delay: Duration,

    /// Follow links onto foreign hosts.
    allow_xdomain: bool,

    /// Speak TLS. Flips to true on an https redirect mid-crawl.
    use_tls: bool,

    /// Root of the mirror directory tree.
    pub archive_root: PathBuf,

    /// Log plain lines instead of drawing the dashboard.
    pub plain_ui: bool,
}

impl Config {
    /// Builds a config from CLI values. `output` of `None` selects
    /// `$HOME/WR_Reaped`, falling back to the working directory when no
    /// home directory exists.
    pub fn new(
        seed_url: String,
        depth: u32,
        delay_secs: u64,
        xdomain: bool,
        tls: bool,
        output: Option<PathBuf>,
        plain_ui: bool,
    ) -> Self {
        let archive_root = output.unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(ARCHIVE_DIR_NAME)
        });

        Self {
            seed_url,
            crawl_depth: depth,
            crawl_delay: Duration::from_secs(delay_secs),
            allow_xdomain: xdomain,
            use_tls: tls,
            archive_root,
            plain_ui,
        }
    }

    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    pub fn set_use_tls(&mut self, on: bool) {
        self.use_tls = on;
    }

    pub fn allow_xdomain(&self) -> bool {
        self.allow_xdomain
    }
}
