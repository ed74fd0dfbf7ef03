// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::builder::styling::{Ansi256Color, Color, Style, Styles};
use std::io::IsTerminal;

pub mod codes {
    /// Section headers: pastel cyan / steel blue.
    pub const HEADER: u8 = 74;
    /// Commands and literals: light grey.
    pub const LITERAL: u8 = 250;
    /// Descriptions and context: medium grey.
    pub const CONTEXT: u8 = 245;
    /// Muted / secondary text: darker grey.
    pub const MUTED: u8 = 240;
}

/// Determine if color output should be enabled.
///
/// Priority: `NO_COLOR=1` disables → `COLOR=1` forces → TTY check.
pub fn should_colorize() -> bool {
    if std::env::var("NO_COLOR").is_ok_and(|v| v == "1") {
        return false;
    }
    if std::env::var("COLOR").is_ok_and(|v| v == "1") {
        return true;
    }
    std::io::stdout().is_terminal()
}

/// Build clap `Styles` using the project palette.
pub fn styles() -> Styles {
    if !should_colorize() {
        return Styles::plain();
    }
    Styles::styled()
        .header(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::HEADER)))))
        .literal(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::LITERAL)))))
        .placeholder(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::CONTEXT)))))
}

fn fg256(code: u8) -> String {
    format!("\x1b[38;5;{code}m")
}

const RESET: &str = "\x1b[0m";

pub fn header(text: &str) -> String {
    if should_colorize() {
        format!("{}{}{}", fg256(codes::HEADER), text, RESET)
    } else {
        text.to_string()
    }
}

pub fn muted(text: &str) -> String {
    if should_colorize() {
        format!("{}{}{}", fg256(codes::MUTED), text, RESET)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // `#[serial]` because every case mutates the process-global
    // `NO_COLOR`/`COLOR` env vars.

    #[test]
    #[serial]
    fn no_color_wins_over_color() {
        std::env::set_var("NO_COLOR", "1");
        std::env::set_var("COLOR", "1");
        assert!(!should_colorize());
        std::env::remove_var("NO_COLOR");
        std::env::remove_var("COLOR");
    }

    #[test]
    #[serial]
    fn color_forces_on_regardless_of_tty() {
        std::env::remove_var("NO_COLOR");
        std::env::set_var("COLOR", "1");
        assert!(should_colorize());
        std::env::remove_var("COLOR");
    }

    #[test]
    #[serial]
    fn header_is_plain_text_when_colorization_is_disabled() {
        std::env::set_var("NO_COLOR", "1");
        assert_eq!(header("daemon"), "daemon");
        assert_eq!(muted("last error"), "last error");
        std::env::remove_var("NO_COLOR");
    }

    #[test]
    #[serial]
    fn header_carries_ansi_codes_when_forced_on() {
        std::env::remove_var("NO_COLOR");
        std::env::set_var("COLOR", "1");
        let rendered = header("daemon");
        assert!(rendered.starts_with("\x1b[38;5;74m"));
        assert!(rendered.ends_with(RESET));
        std::env::remove_var("COLOR");
    }
}
