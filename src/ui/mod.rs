//! Terminal drawing: layout, content view, sticky headings and overlays.

pub mod editor;
pub mod file_list;
pub mod helpers;
pub mod status;

use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph};

use helpers::{fill_area, truncate_or_pad};

/// Screen regions, top to bottom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppLayout {
    pub header: Rect,
    /// Two rows: current file heading, current hunk heading
    pub sticky: Rect,
    pub content: Rect,
    pub file_list: Option<Rect>,
    pub status: Rect,
}

pub const STICKY_ROWS: u16 = 2;

/// Split `area`. The header takes at most a third of the screen; the file
/// list is carved from the right of the content row when shown.
pub fn layout(area: Rect, header_lines: usize, file_list_width: Option<u16>) -> AppLayout {
    let status_h = area.height.min(1);
    let body_h = area.height - status_h;
    let header_h = (header_lines as u16).min(body_h / 3);
    let sticky_h = STICKY_ROWS.min(body_h - header_h);
    let main_h = body_h - header_h - sticky_h;

    let header = Rect::new(area.x, area.y, area.width, header_h);
    let sticky = Rect::new(area.x, area.y + header_h, area.width, sticky_h);
    let main = Rect::new(area.x, sticky.y + sticky_h, area.width, main_h);
    let status = Rect::new(area.x, main.y + main_h, area.width, status_h);

    let (content, file_list) = match file_list_width {
        // Keep at least half the width for the diff
        Some(w) if area.width >= 4 => {
            let w = w.min(area.width / 2);
            (
                Rect::new(main.x, main.y, main.width - w, main.height),
                Some(Rect::new(main.x + main.width - w, main.y, w, main.height)),
            )
        }
        _ => (main, None),
    };

    AppLayout {
        header,
        sticky,
        content,
        file_list,
        status,
    }
}

/// Draw `lines[offset..]` into `area`, highlighting `cursor` if it is visible
pub fn render_lines(
    buf: &mut Buffer,
    area: Rect,
    lines: &[Line<'static>],
    offset: usize,
    cursor: Option<(usize, Color)>,
) {
    fill_area(buf, area, Color::Reset);
    for (row, line) in lines
        .iter()
        .skip(offset)
        .take(area.height as usize)
        .enumerate()
    {
        let y = area.y + row as u16;
        buf.set_line(area.x, y, line, area.width);
        if let Some((index, bg)) = cursor {
            if index == offset + row {
                buf.set_style(Rect::new(area.x, y, area.width, 1), Style::default().bg(bg));
            }
        }
    }
}

/// Labels of the file and hunk sections containing the viewport top
pub fn render_sticky(buf: &mut Buffer, area: Rect, file: Option<&str>, hunk: Option<&str>, accent: Color) {
    let rows = [
        (
            file,
            Style::default()
                .fg(Color::Black)
                .bg(accent)
                .add_modifier(Modifier::BOLD),
        ),
        (hunk, Style::default().fg(Color::White).bg(Color::Rgb(50, 50, 65))),
    ];
    for (i, (text, style)) in rows.iter().enumerate().take(area.height as usize) {
        let line = truncate_or_pad(text.unwrap_or(""), area.width as usize);
        buf.set_string(area.x, area.y + i as u16, line, *style);
    }
}

pub const HELP: &[(&str, &str)] = &[
    ("j / ↓", "Scroll down / move selection"),
    ("k / ↑", "Scroll up / move selection"),
    ("PgDn / PgUp", "Scroll a page"),
    ("g / G", "Go to top / bottom"),
    ("← / →", "Scroll horizontally"),
    ("n / p", "Next / previous hunk"),
    ("N / P", "Next / previous file"),
    ("c / C", "Next / previous comment"),
    ("Tab", "Cycle focus"),
    ("f", "Toggle file list"),
    ("Space", "Select line"),
    ("+", "Comment on selected line"),
    ("r", "Reply to focused comment"),
    ("t", "New top-level comment"),
    ("s", "Start review"),
    ("a", "Approve"),
    ("x", "Request changes"),
    ("S", "Submit review"),
    ("X", "Cancel review"),
    ("M", "Merge"),
    ("R", "Reload"),
    ("q / Esc", "Quit"),
    ("?", "Show this help"),
];

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

pub fn render_help(frame: &mut ratatui::Frame) {
    let area = frame.area();
    let popup_area = centered(
        area,
        56.min(area.width.saturating_sub(4)),
        (HELP.len() as u16 + 2).min(area.height.saturating_sub(2)),
    );
    let bg = Color::Rgb(30, 30, 40);
    fill_area(frame.buffer_mut(), popup_area, bg);

    let block = Block::default()
        .title(" Keyboard Shortcuts (press any key to close) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner_area = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let buf = frame.buffer_mut();
    let key_style = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
        .bg(bg);
    let desc_style = Style::default().fg(Color::White).bg(bg);
    for (i, (key, desc)) in HELP.iter().enumerate() {
        if i as u16 >= inner_area.height {
            break;
        }
        let y = inner_area.y + i as u16;
        buf.set_string(inner_area.x, y, format!("{:>12}  ", key), key_style);
        let available = (inner_area.width as usize).saturating_sub(14);
        let desc: String = desc.chars().take(available).collect();
        buf.set_string(inner_area.x + 14, y, desc, desc_style);
    }
}

/// Yes/no prompt
pub fn render_confirm(frame: &mut ratatui::Frame, message: &str) {
    let area = frame.area();
    let popup_area = centered(area, (message.chars().count() as u16 + 4).max(30), 5);
    fill_area(frame.buffer_mut(), popup_area, Color::Rgb(30, 30, 40));
    let block = Block::default()
        .title(" Confirm ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let text = Paragraph::new(format!("{}\n[y]es / any other key aborts", message))
        .block(block)
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::White));
    frame.render_widget(text, popup_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::text::Span;

    #[test]
    fn test_layout_regions_stack() {
        let l = layout(Rect::new(0, 0, 100, 40), 4, Some(30));
        assert_eq!(l.header, Rect::new(0, 0, 100, 4));
        assert_eq!(l.sticky, Rect::new(0, 4, 100, 2));
        assert_eq!(l.content, Rect::new(0, 6, 70, 33));
        assert_eq!(l.file_list, Some(Rect::new(70, 6, 30, 33)));
        assert_eq!(l.status, Rect::new(0, 39, 100, 1));
    }

    #[test]
    fn test_layout_header_capped() {
        let l = layout(Rect::new(0, 0, 80, 13), 40, None);
        assert_eq!(l.header.height, 4);
        assert_eq!(l.file_list, None);
        assert_eq!(l.content.width, 80);
    }

    #[test]
    fn test_layout_file_list_keeps_half_width() {
        let l = layout(Rect::new(0, 0, 60, 20), 2, Some(45));
        assert_eq!(l.content.width, 30);
        assert_eq!(l.file_list.map(|r| r.width), Some(30));
    }

    #[test]
    fn test_layout_tiny_terminal() {
        let l = layout(Rect::new(0, 0, 10, 1), 3, Some(5));
        assert_eq!(l.status.height, 1);
        assert_eq!(l.content.height, 0);
    }

    #[test]
    fn test_render_lines_offset_and_cursor() {
        let lines: Vec<Line<'static>> = ["one", "two", "three"]
            .iter()
            .map(|s| Line::from(Span::raw(s.to_string())))
            .collect();
        let area = Rect::new(0, 0, 5, 2);
        let mut buf = Buffer::empty(area);
        render_lines(&mut buf, area, &lines, 1, Some((2, Color::Blue)));
        assert_eq!(buf[(0, 0)].symbol(), "t");
        assert_eq!(buf[(2, 1)].symbol(), "r");
        assert_eq!(buf[(0, 1)].bg, Color::Blue);
        assert_ne!(buf[(0, 0)].bg, Color::Blue);
    }

    #[test]
    fn test_render_sticky_labels() {
        let area = Rect::new(0, 0, 8, 2);
        let mut buf = Buffer::empty(area);
        render_sticky(&mut buf, area, Some("a.rs:"), None, Color::Magenta);
        assert_eq!(buf[(0, 0)].symbol(), "a");
        assert_eq!(buf[(0, 0)].bg, Color::Magenta);
        assert_eq!(buf[(0, 1)].symbol(), " ");
    }
}
