//! The breadth-first crawl loop
//!
//! One generation at a time: visit every record in the draining frontier in
//! arena order, extract new links into the filling frontier, archive the
//! page, then swap sides and descend. The seed generation counts as depth
//! zero, so a crawl of depth N archives the seed plus N generations of
//! discovered links.

use super::parser;
use crate::cache::SlotId;
use crate::config::Config;
use crate::display::{CacheStatus, Display};
use crate::frontier::FrontierPair;
use crate::http::{Client, Outcome, EOH_SENTINEL};
use crate::url::{is_xdomain, make_full_url, make_local_url, parse_host, parse_page};
use crate::{ReaperError, Result};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Stop feeding the filling frontier once it holds this many URLs.
pub const NR_LINKS_THRESHOLD: usize = 500;

/// Initial slot count for each frontier arena.
const INITIAL_FRONTIER_SLOTS: usize = 64;

/// The crawl engine: owns the client, the frontier pair and the counters.
pub struct Engine {
    config: Config,
    display: Arc<Display>,
    client: Client,
    pair: FrontierPair,
    nr_reaped: usize,
    current_depth: u32,
    interrupted: Arc<AtomicBool>,
}

impl Engine {
    /// Connects to the seed origin and queues the seed URL.
    ///
    /// Failure here (DNS, socket, TLS handshake) is fatal for the crawl.
    pub fn new(
        mut config: Config,
        display: Arc<Display>,
        interrupted: Arc<AtomicBool>,
    ) -> Result<Self> {
        let seed = normalize_seed(&config.seed_url, config.use_tls());
        if seed.starts_with("https://") {
            config.set_use_tls(true);
        }
        config.seed_url = seed.clone();

        let client = Client::new(&seed, config.use_tls())?;
        display.update_connection_state(
            crate::display::ConnState::Connected,
            &client.host,
            &client.conn.host_ipv4,
        );

        let mut pair = FrontierPair::new(INITIAL_FRONTIER_SLOTS);
        pair.draining_mut().insert(&seed);

        Ok(Self {
            config,
            display,
            client,
            pair,
            nr_reaped: 0,
            current_depth: 0,
            interrupted,
        })
    }

    /// Number of pages written to the archive so far.
    pub fn nr_reaped(&self) -> usize {
        self.nr_reaped
    }

    /// Runs the crawl to completion, interruption or fatal error.
    pub fn run(&mut self) -> Result<()> {
        let delay = self.config.crawl_delay;

        loop {
            // The side about to be filled still holds the generation before
            // last; tear it down before reuse.
            self.pair.filling_mut().teardown();

            let dside = self.pair.draining_side();
            let fside = 3 - dside;
            self.display.update_cache_status(dside, CacheStatus::Draining);
            self.display.update_cache_status(fside, CacheStatus::Filling);
            self.display
                .update_operation_status(&format!("Draining URL cache {dside}"));

            let links: Vec<(SlotId, String)> = self
                .pair
                .draining()
                .iter()
                .map(|(id, record)| (id, record.url.clone()))
                .collect();
            if links.is_empty() {
                break;
            }

            let mut url_cnt = links.len();
            let mut fill = true;

            for (id, url) in links {
                if url.is_empty() {
                    continue;
                }

                self.visit_url(id, &url, delay, &mut fill)?;

                url_cnt -= 1;
                self.display.update_cache_count(dside, url_cnt);
                self.display.update_cache_count(fside, self.pair.filling().len());
                self.display.clear_error_msg();
            }

            self.pair.swap_generations();
            self.current_depth += 1;

            if self.current_depth > self.config.crawl_depth {
                self.display
                    .update_operation_status("Reached maximum crawl depth");
                break;
            }
        }

        Ok(())
    }

    /// Fetches and archives one URL, feeding the filling frontier on the way.
    fn visit_url(&mut self, id: SlotId, url: &str, delay: Duration, fill: &mut bool) -> Result<()> {
        self.client.wbuf.clear();
        self.client.full_url = url.to_string();
        self.client.page = parse_page(url);

        // Cancellation lands only at the sleep boundary; mid-archive state
        // is never abandoned halfway.
        if self.interrupted.load(Ordering::Relaxed) {
            return Err(ReaperError::Interrupted);
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.interrupted.load(Ordering::Relaxed) {
            return Err(ReaperError::Interrupted);
        }

        if let Err(e) = self.client.check_host() {
            self.display
                .put_error_msg(&format!("Failed to reach host ({e})"));
            self.client.restore_primary_host();
            self.client.reconnect()?;
            return Ok(());
        }

        self.display.update_current_url(url);

        let Some(outcome) = self.request_with_recovery()? else {
            return Ok(());
        };
        self.pair.draining_mut().record_mut(id).nr_requests += 1;

        let outcome = self.resolve_redirect(outcome)?;
        if let Outcome::Status(code) = outcome {
            self.display.update_status_code(code);
        }

        match outcome {
            Outcome::Status(200) | Outcome::Status(404) | Outcome::Status(410) => {}
            Outcome::Status(400) => {
                self.client.rbuf.clear();
                self.client.wbuf.clear();
                self.client.reconnect()?;
                return Ok(());
            }
            Outcome::Status(401)
            | Outcome::Status(403)
            | Outcome::Status(405)
            | Outcome::Status(500..=599) => {
                self.client.rbuf.clear();
                self.client.wbuf.clear();
                self.client.reconnect()?;
                return Ok(());
            }
            // A redirect that survives the single followed hop is abandoned.
            Outcome::Status(301) | Outcome::Status(302) | Outcome::Status(303) => {
                return Ok(());
            }
            Outcome::Xdomain | Outcome::AlreadyExists | Outcome::SkipLink => {
                return Ok(());
            }
            Outcome::Timeout => {
                self.client.rbuf.clear();
                self.client.restore_primary_host();
                self.client.reconnect()?;
                return Ok(());
            }
            Outcome::Status(code) => {
                self.display
                    .put_error_msg(&format!("Unknown HTTP status code returned ({code})"));
                return Err(ReaperError::UnknownStatus(code));
            }
        }

        if *fill && parser::url_parseable(url) {
            let inserted = parser::extract_links(
                &self.client.rbuf,
                self.client.is_secure(),
                &self.client.host,
                &self.client.page,
                &self.client.primary_host,
                &self.config,
                &mut self.pair,
            );
            tracing::debug!(url, inserted, "extracted links");

            if self.pair.filling().len() >= NR_LINKS_THRESHOLD {
                *fill = false;
                self.display
                    .update_cache_status(3 - self.pair.draining_side(), CacheStatus::Full);
            }
        }

        if let Err(e) = self.archive_page() {
            self.display
                .put_error_msg(&format!("Failed to create local copy ({e})"));
            return Ok(());
        }

        Ok(())
    }

    /// One request cycle with the recoverable failures folded away:
    /// a protocol or transport error drops the response, reconnects and
    /// skips the URL (`None`); only unrecoverable errors propagate.
    fn request_with_recovery(&mut self) -> Result<Option<Outcome>> {
        match self.client.do_request(&self.config.archive_root) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(ReaperError::Protocol(msg)) => {
                self.display.put_error_msg(&msg);
                self.client.rbuf.clear();
                self.client.wbuf.clear();
                self.client.reconnect()?;
                Ok(None)
            }
            Err(ReaperError::Io(e)) => {
                self.display.put_error_msg(&format!("Transport error ({e})"));
                self.client.rbuf.clear();
                self.client.wbuf.clear();
                self.client.reconnect()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Follows one redirect hop.
    ///
    /// A `Location` onto `https://` upgrades the connection to TLS and
    /// retries; a cross-domain target is skipped unless enabled; any other
    /// target moves the client and retries once. `primary_host` is left
    /// untouched so a bad redirect can be recovered from.
    fn resolve_redirect(&mut self, outcome: Outcome) -> Result<Outcome> {
        let code = match outcome {
            Outcome::Status(code @ (301 | 302 | 303)) => code,
            _ => return Ok(outcome),
        };
        self.display.update_status_code(code);

        let Some(location) = self.client.fetch_header("Location", 0) else {
            return Ok(Outcome::SkipLink);
        };
        let full = make_full_url(
            self.client.is_secure(),
            &self.client.host,
            &self.client.page,
            &location.value,
        );
        tracing::debug!(from = %self.client.full_url, to = %full, "redirect");

        if is_xdomain(&self.client.primary_host, &full) && !self.config.allow_xdomain() {
            return Ok(Outcome::Xdomain);
        }

        self.client.full_url = full.clone();
        self.client.host = parse_host(&full).to_string();
        self.client.page = parse_page(&full);
        self.client.rbuf.clear();
        self.client.wbuf.clear();

        if full.starts_with("https://") && !self.config.use_tls() {
            self.config.set_use_tls(true);
            self.display
                .update_operation_status(&format!("Upgrading to TLS ({})", self.client.host));
            self.client.upgrade_to_tls()?;
        } else {
            self.client.check_host()?;
        }

        Ok(self.request_with_recovery()?.unwrap_or(Outcome::SkipLink))
    }

    /// Strips the response header, rewrites links and writes the body to
    /// the mirror tree, creating missing directories mode 0700.
    fn archive_page(&mut self) -> Result<()> {
        self.display
            .update_operation_status(&format!("Archiving {}", self.client.full_url));

        if let Some(eoh) = self.client.rbuf.find(EOH_SENTINEL) {
            self.client.rbuf.collapse(0, eoh + EOH_SENTINEL.len());
        }

        if parser::url_parseable(&self.client.full_url) {
            let secure = self.client.is_secure();
            parser::rewrite_links(
                &mut self.client.rbuf,
                secure,
                &self.client.host,
                &self.client.page,
                &self.config.archive_root,
            );
        }

        let Some(local) = make_local_url(&self.config.archive_root, &self.client.full_url) else {
            return Ok(());
        };

        if let Some(parent) = local.parent() {
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(parent)?;
        }

        if local.exists() {
            return Ok(());
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&local)?;
        self.client.rbuf.write_to(&mut file)?;

        self.nr_reaped += 1;
        self.display
            .update_current_local(&local.display().to_string());
        Ok(())
    }
}

/// Gives a bare seed like `t.test/` a scheme matching the TLS flag.
fn normalize_seed(seed: &str, secure: bool) -> String {
    if seed.starts_with("http://") || seed.starts_with("https://") {
        seed.to_string()
    } else if secure {
        format!("https://{seed}")
    } else {
        format!("http://{seed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_seed() {
        assert_eq!(normalize_seed("t.test/", false), "http://t.test/");
        assert_eq!(normalize_seed("t.test/", true), "https://t.test/");
        assert_eq!(normalize_seed("http://t.test/", true), "http://t.test/");
        assert_eq!(normalize_seed("https://t.test/", false), "https://t.test/");
    }
}
