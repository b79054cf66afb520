//! Terminal status dashboard
//!
//! Fixed status cells on stderr, addressed with ANSI cursor movement
//! relative to the line below the dashboard. Every update takes the screen
//! mutex, moves up to its row, rewrites the cell and moves back, so
//! concurrent callers never interleave escape sequences. The crawl thread
//! must not hold the lock across I/O to the network; all methods here write
//! and return immediately.
//!
//! With `plain` set the dashboard is skipped entirely and updates become
//! tracing events, which is what the tests and dumb terminals get.

use colored::Colorize;
use std::io::Write;
use std::sync::Mutex;

const TABLE_WIDTH: usize = 72;
const LABEL_WIDTH: usize = 12;

// Rows counted upward from the cursor's resting line.
const ROW_URL: usize = 7;
const ROW_LOCAL: usize = 6;
const ROW_STATUS: usize = 5;
const ROW_OPERATION: usize = 4;
const ROW_CACHE: usize = 3;
const ROW_ERROR: usize = 2;

/// Connection lifecycle states shown in the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Connected,
    Disconnected,
}

/// Cache lifecycle states shown per frontier side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Filling,
    Draining,
    Full,
}

/// The status dashboard. Cheap to share; every method locks internally.
pub struct Display {
    screen: Mutex<()>,
    plain: bool,
}

impl Display {
    /// Creates the display, drawing the dashboard skeleton unless `plain`.
    pub fn new(plain: bool) -> Self {
        let display = Self {
            screen: Mutex::new(()),
            plain,
        };
        if !plain {
            display.draw_skeleton();
        }
        display
    }

    fn draw_skeleton(&self) {
        let _guard = self.screen.lock().unwrap();
        let rule = "-".repeat(TABLE_WIDTH);
        eprintln!("{rule}");
        eprintln!(" URL      :");
        eprintln!(" Created  :");
        eprintln!(" Status   :          Conn :");
        eprintln!(" Operation:");
        eprintln!(" Cache 1  :    0             Cache 2  :    0");
        eprintln!(" Error    :");
        eprintln!("{rule}");
    }

    /// Rewrites one cell: up `row` lines, clear, indent, write, return.
    fn put_cell(&self, row: usize, indent: usize, text: &str, clear: bool) {
        let _guard = self.screen.lock().unwrap();
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\x1b[{row}A\r");
        if clear {
            let _ = write!(err, "\x1b[K");
        }
        if indent > 0 {
            let _ = write!(err, "\x1b[{indent}C");
        }
        let _ = write!(err, "{text}\r\x1b[{row}B");
        let _ = err.flush();
    }

    fn truncated(text: &str, max: usize) -> String {
        if text.len() <= max {
            return text.to_string();
        }
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }

    /// Shows the URL currently being fetched.
    pub fn update_current_url(&self, url: &str) {
        if self.plain {
            tracing::info!(%url, "fetching");
            return;
        }
        let text = Self::truncated(url, TABLE_WIDTH - LABEL_WIDTH - 4);
        self.put_cell(ROW_URL, 0, &format!(" URL      : {text}"), true);
    }

    /// Shows the local path the page was archived at.
    pub fn update_current_local(&self, path: &str) {
        if self.plain {
            tracing::info!(%path, "archived");
            return;
        }
        let text = Self::truncated(path, TABLE_WIDTH - LABEL_WIDTH - 4);
        self.put_cell(
            ROW_LOCAL,
            0,
            &format!(" Created  : {}", text.dimmed()),
            true,
        );
    }

    /// Shows the latest HTTP status, colour-coded by range.
    pub fn update_status_code(&self, code: u16) {
        if self.plain {
            tracing::info!(code, "status");
            return;
        }
        let coloured = match code {
            200..=299 => code.to_string().green(),
            300..=399 => code.to_string().yellow(),
            _ => code.to_string().red(),
        };
        self.put_cell(ROW_STATUS, LABEL_WIDTH, &format!("{coloured}"), false);
    }

    /// Shows what the engine is doing right now.
    pub fn update_operation_status(&self, status: &str) {
        if self.plain {
            tracing::info!(status, "operation");
            return;
        }
        let text = Self::truncated(status, TABLE_WIDTH - LABEL_WIDTH - 6);
        self.put_cell(
            ROW_OPERATION,
            0,
            &format!(" Operation: ({})", text.bright_red()),
            true,
        );
    }

    /// Shows the connection lifecycle state and peer address.
    pub fn update_connection_state(&self, state: ConnState, host: &str, addr: &str) {
        if self.plain {
            tracing::info!(?state, %host, %addr, "connection");
            return;
        }
        let text = match state {
            ConnState::Connecting => format!("connecting to {host} ({addr})"),
            ConnState::Connected => {
                format!("{} to {host} ({addr})", "connected".green())
            }
            ConnState::Disconnected => format!("{}", "disconnected".dimmed()),
        };
        self.put_cell(ROW_STATUS, 27, &text, false);
    }

    /// Shows one frontier side's fill state.
    pub fn update_cache_status(&self, side: usize, status: CacheStatus) {
        if self.plain {
            tracing::debug!(side, ?status, "cache status");
            return;
        }
        let text = match status {
            CacheStatus::Filling => format!("{}", " (filling) ".green()),
            CacheStatus::Draining => format!("{}", "(draining) ".dimmed()),
            CacheStatus::Full => format!("{}", "  (full)   ".red()),
        };
        let indent = if side == 1 { 17 } else { 47 };
        self.put_cell(ROW_CACHE, indent, &text, false);
    }

    /// Shows one frontier side's URL count.
    pub fn update_cache_count(&self, side: usize, count: usize) {
        if self.plain {
            tracing::debug!(side, count, "cache count");
            return;
        }
        let indent = if side == 1 { LABEL_WIDTH } else { 42 };
        self.put_cell(ROW_CACHE, indent, &format!("{count:4}"), false);
    }

    /// Posts one error line, replacing any previous one.
    pub fn put_error_msg(&self, msg: &str) {
        if self.plain {
            tracing::error!("{msg}");
            return;
        }
        let text = Self::truncated(msg, TABLE_WIDTH - LABEL_WIDTH - 4);
        self.put_cell(
            ROW_ERROR,
            0,
            &format!(" Error    : {}", text.red()),
            true,
        );
    }

    /// Clears the error line.
    pub fn clear_error_msg(&self) {
        if self.plain {
            return;
        }
        self.put_cell(ROW_ERROR, 0, " Error    :", true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_display_is_silent_on_screen() {
        // Plain mode must not panic and must not require a terminal.
        let display = Display::new(true);
        display.update_current_url("http://t.test/");
        display.update_status_code(200);
        display.update_cache_count(1, 3);
        display.put_error_msg("boom");
        display.clear_error_msg();
    }

    #[test]
    fn test_truncation() {
        let long = "x".repeat(200);
        let out = Display::truncated(&long, 10);
        assert_eq!(out.len(), 13);
        assert!(out.ends_with("..."));
    }
}
