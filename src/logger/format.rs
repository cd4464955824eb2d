//! Console output: timestamp, colored tag and level, message
//!
//! Warnings and errors go to stderr, everything else to stdout. A broken pipe on
//! stdout (e.g. `im-gateway | head`) ends the process quietly.

use super::levels::LogLevel;
use super::tags::LogTag;
use chrono::Local;
use colored::*;
use std::io::{stderr, stdout, ErrorKind, Write};

const TAG_WIDTH: usize = 9;
const LEVEL_WIDTH: usize = 7;

pub fn format_and_log(tag: LogTag, level: LogLevel, message: &str) {
    let time = Local::now().format("%H:%M:%S%.3f").to_string();
    let tag_str = tag.paint(format!("{:<width$}", tag.label(), width = TAG_WIDTH));
    let level_str = paint_level(level);

    let line = format!("{} [{}] [{}] {}", time.dimmed(), tag_str, level_str, message);

    match level {
        LogLevel::Error | LogLevel::Warning => {
            let _ = writeln!(stderr(), "{}", line);
        }
        _ => print_stdout_safe(&line),
    }
}

fn paint_level(level: LogLevel) -> ColoredString {
    let padded = format!("{:<width$}", level.as_str(), width = LEVEL_WIDTH);
    match level {
        LogLevel::Error => padded.bright_red().bold(),
        LogLevel::Warning => padded.yellow().bold(),
        LogLevel::Info => padded.white().bold(),
        LogLevel::Debug => padded.bright_black(),
        LogLevel::Verbose => padded.dimmed(),
    }
}

/// Print to stdout but ignore broken pipe errors
fn print_stdout_safe(message: &str) {
    let mut out = stdout().lock();
    if let Err(e) = writeln!(out, "{}", message).and_then(|_| out.flush()) {
        if e.kind() == ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        let _ = writeln!(stderr(), "Logger stdout error: {}", e);
    }
}
