//! File list pane.

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};

use super::helpers::{fill_area, truncate_or_pad};
use crate::types::DiffFile;

/// Shorten `name` to `width` characters by replacing its middle with `...`
pub fn crop(name: &str, width: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= width {
        return name.to_string();
    }
    if width <= 3 {
        return chars[..width].iter().collect();
    }
    let keep = width - 3;
    let head = keep / 2;
    let tail = keep - head;
    let mut out: String = chars[..head].iter().collect();
    out.push_str("...");
    out.extend(&chars[chars.len() - tail..]);
    out
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileList {
    selected: usize,
    scroll: usize,
}

impl FileList {
    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn select(&mut self, index: usize, len: usize) {
        self.selected = index.min(len.saturating_sub(1));
    }

    pub fn move_down(&mut self, len: usize) {
        if self.selected + 1 < len {
            self.selected += 1;
        }
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Scroll so the selection is visible in `height` rows
    fn visible_scroll(&self, height: usize) -> usize {
        if height == 0 {
            return 0;
        }
        if self.selected < self.scroll {
            self.selected
        } else if self.selected >= self.scroll + height {
            self.selected + 1 - height
        } else {
            self.scroll
        }
    }

    pub fn render(
        &mut self,
        buf: &mut Buffer,
        area: Rect,
        files: &[DiffFile],
        focused: bool,
        accent: Color,
    ) {
        let bg = Color::Rgb(25, 25, 35);
        fill_area(buf, area, bg);
        if area.width < 2 || area.height == 0 {
            return;
        }

        // Left column is a separator
        let sep_style = Style::default()
            .fg(if focused { accent } else { Color::DarkGray })
            .bg(bg);
        for y in area.y..area.y + area.height {
            buf.set_string(area.x, y, "│", sep_style);
        }

        self.scroll = self.visible_scroll(area.height as usize);
        let width = (area.width - 1) as usize;
        for (row, (index, file)) in files
            .iter()
            .enumerate()
            .skip(self.scroll)
            .take(area.height as usize)
            .enumerate()
        {
            let y = area.y + row as u16;
            let badge = file.kind.badge();
            let name = crop(&file.display_name(), width.saturating_sub(badge.len() + 2));
            let text = truncate_or_pad(&format!(" {} {}", badge, name), width);
            let style = if index == self.selected {
                Style::default()
                    .fg(Color::Black)
                    .bg(accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(file.kind.color()).bg(bg)
            };
            buf.set_string(area.x + 1, y, text, style);
        }
    }
}
