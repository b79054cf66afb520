//! Crawl engine and link processing
//!
//! `parser` scans response bodies for URL attributes, feeding the frontier
//! on the way in and splicing local paths into the body on the way out.
//! `engine` drives the breadth-first loop across generations.

mod engine;
mod parser;

pub use engine::{Engine, NR_LINKS_THRESHOLD};
pub use parser::{extract_links, rewrite_links, url_acceptable, url_parseable};

use crate::config::Config;
use crate::display::Display;
use crate::Result;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Runs a complete crawl, returning the number of pages archived.
pub fn crawl(
    config: Config,
    display: Arc<Display>,
    interrupted: Arc<AtomicBool>,
) -> Result<usize> {
    let mut engine = Engine::new(config, display, interrupted)?;
    engine.run()?;
    Ok(engine.nr_reaped())
}
