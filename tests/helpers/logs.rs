//! Captures `log` records emitted on the current test thread
//!
//! Tests run on their own threads, so each one only sees its own lines.
//! Nothing is kept until `capture_logs` is called on that thread.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::cell::RefCell;
use std::sync::Once;

thread_local! {
    static CAPTURED: RefCell<Option<Vec<(Level, String)>>> = const { RefCell::new(None) };
}

struct CapturingLogger;

impl Log for CapturingLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        CAPTURED.with(|captured| {
            if let Some(lines) = captured.borrow_mut().as_mut() {
                lines.push((record.level(), record.args().to_string()));
            }
        });
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger;
static INSTALL: Once = Once::new();

/// Start (or restart) capturing on this thread
pub fn capture_logs() {
    INSTALL.call_once(|| {
        // Another logger already installed means nothing gets captured;
        // assertions on the lines will then fail loudly.
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);
    });
    CAPTURED.with(|captured| *captured.borrow_mut() = Some(Vec::new()));
}

/// Lines captured since `capture_logs`, clearing the buffer
pub fn take_logs() -> Vec<(Level, String)> {
    CAPTURED.with(|captured| {
        captured
            .borrow_mut()
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    })
}

/// Captured lines at `level` or more severe
pub fn lines_at_least(lines: &[(Level, String)], level: Level) -> Vec<String> {
    lines
        .iter()
        .filter(|(line_level, _)| *line_level <= level)
        .map(|(_, message)| message.clone())
        .collect()
}
