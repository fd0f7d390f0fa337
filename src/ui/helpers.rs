//! Utility helper functions for the UI module.

use std::io::{self, Stdout};

use anyhow::Result;
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::Terminal;

/// Fill an entire area with a background color
pub fn fill_area(buf: &mut Buffer, area: Rect, color: Color) {
    let style = Style::default().bg(color);
    for y in area.y..area.y + area.height {
        for x in area.x..area.x + area.width {
            buf.set_string(x, y, " ", style);
        }
    }
}

/// Truncate or pad a string to exactly the given width (in characters)
pub fn truncate_or_pad(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        s.chars().take(width).collect()
    } else {
        let mut result = String::with_capacity(s.len() + width - len);
        result.push_str(s);
        result.push_str(&" ".repeat(width - len));
        result
    }
}

/// Set up the terminal for TUI mode
pub fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore terminal to normal mode
pub fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    Ok(())
}

/// Restore the terminal before the panic message prints, then chain to the
/// previous hook. Install before `setup_terminal`.
pub fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));
}

/// Format an RFC 3339 timestamp as `YYYY-MM-DD HH:MM` (UTC); other input is
/// returned unchanged.
pub fn format_timestamp(iso_time: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(iso_time)
        .map(|dt| {
            dt.with_timezone(&chrono::Utc)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|_| iso_time.to_string())
}

/// Character-based text wrapping - breaks at width boundary
/// Returns Vec of (line, is_code_block)
pub fn wrap_text_with_code(text: &str, width: usize) -> Vec<(String, bool)> {
    if width == 0 {
        return vec![(text.to_string(), false)];
    }

    let mut result = Vec::new();
    let mut in_code_block = false;

    // First split by newlines, then wrap each line
    for line in text.split('\n') {
        // Detect code block markers
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_code_block = !in_code_block;
            // Skip the ``` marker line itself
            continue;
        }

        if line.is_empty() {
            result.push((String::new(), in_code_block));
            continue;
        }

        // For code blocks, preserve exact whitespace and don't wrap aggressively
        if in_code_block {
            // Expand tabs first, then truncate if needed
            let expanded = line.replace('\t', "    ");
            let chars: Vec<char> = expanded.chars().collect();
            if chars.len() > width {
                result.push((chars[..width].iter().collect(), true));
            } else {
                result.push((expanded, true));
            }
        } else {
            let chars: Vec<char> = line.chars().collect();
            let mut i = 0;
            while i < chars.len() {
                let end = (i + width).min(chars.len());
                let wrapped_line: String = chars[i..end].iter().collect();
                result.push((wrapped_line, false));
                i = end;
            }
        }
    }

    if result.is_empty() {
        result.push((String::new(), false));
    }

    result
}

/// Simple wrap_text for non-code content
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    wrap_text_with_code(text, width)
        .into_iter()
        .map(|(line, _)| line)
        .collect()
}
