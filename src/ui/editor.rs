//! Modal in-terminal text editor used for comments, replies and review bodies.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders};

use super::helpers::{fill_area, wrap_text};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorAction {
    Continue,
    Submit(String),
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Editor {
    title: String,
    text: String,
}

impl Editor {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: String::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> EditorAction {
        // Save shortcuts: Ctrl+Enter, Ctrl+S, or Alt+Enter
        let is_save = match key.code {
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::CONTROL) => true,
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => true,
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => true,
            _ => false,
        };
        if is_save {
            return EditorAction::Submit(self.text.clone());
        }

        match key.code {
            KeyCode::Esc => return EditorAction::Cancel,
            KeyCode::Enter => self.text.push('\n'),
            KeyCode::Backspace => {
                self.text.pop();
            }
            KeyCode::Char(_) if key.modifiers.contains(KeyModifiers::CONTROL) => {}
            KeyCode::Char(c) => self.text.push(c),
            _ => {}
        }
        EditorAction::Continue
    }

    pub fn render(&self, frame: &mut ratatui::Frame, area: Rect) {
        let popup_width = (area.width * 2 / 3).clamp(20.min(area.width), 80.min(area.width));
        let popup_height = 12.min(area.height);
        let popup_area = Rect {
            x: area.x + (area.width - popup_width) / 2,
            y: area.y + (area.height - popup_height) / 2,
            width: popup_width,
            height: popup_height,
        };

        let bg = Color::Rgb(40, 40, 50);
        fill_area(frame.buffer_mut(), popup_area, bg);

        let block = Block::default()
            .title(format!(" {} (Ctrl+S, Esc) ", self.title))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));
        let inner_area = block.inner(popup_area);
        frame.render_widget(block, popup_area);

        let wrap_width = inner_area.width.saturating_sub(1) as usize;
        let mut lines: Vec<String> = Vec::new();
        for line in self.text.split('\n') {
            lines.extend(wrap_text(line, wrap_width));
        }
        if let Some(last) = lines.last_mut() {
            last.push('_');
        }

        // Keep the cursor line visible
        let skip = lines.len().saturating_sub(inner_area.height as usize);
        let buf = frame.buffer_mut();
        for (i, line) in lines.iter().skip(skip).enumerate() {
            buf.set_string(
                inner_area.x,
                inner_area.y + i as u16,
                line,
                Style::default().fg(Color::White).bg(bg),
            );
        }
    }
}
