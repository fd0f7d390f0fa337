use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};

const FALLBACK_THEME: &str = "base16-eighties.dark";

/// Syntax highlighter using syntect
pub struct Highlighter {
    syntax_set: SyntaxSet,
    theme: Theme,
    min_brightness: u8,
}

/// Ensure a color has minimum brightness for readability
fn ensure_min_brightness(r: u8, g: u8, b: u8, min_brightness: u8) -> (u8, u8, u8) {
    // Calculate perceived brightness (human eye is more sensitive to green)
    let brightness = ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8;

    if brightness >= min_brightness {
        return (r, g, b);
    }

    let scale = min_brightness as f32 / brightness.max(1) as f32;
    let new_r = ((r as f32 * scale).min(255.0)) as u8;
    let new_g = ((g as f32 * scale).min(255.0)) as u8;
    let new_b = ((b as f32 * scale).min(255.0)) as u8;

    // If still too dark (e.g., pure black), use a gray
    let new_brightness =
        ((new_r as u32 * 299 + new_g as u32 * 587 + new_b as u32 * 114) / 1000) as u8;
    if new_brightness < min_brightness {
        return (min_brightness, min_brightness, min_brightness);
    }
    (new_r, new_g, new_b)
}

impl Highlighter {
    /// Unknown theme names fall back to base16-eighties.dark
    pub fn new(theme: &str, min_brightness: u8) -> Self {
        let mut themes = ThemeSet::load_defaults().themes;
        let theme = match themes.remove(theme) {
            Some(t) => t,
            None => {
                log::warn!("Unknown syntax theme {:?}, using {}", theme, FALLBACK_THEME);
                themes.remove(FALLBACK_THEME).unwrap_or_default()
            }
        };
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme,
            min_brightness,
        }
    }

    fn get_syntax(&self, path: &str) -> &SyntaxReference {
        let ext = path.rsplit('.').next().unwrap_or("");
        self.syntax_set
            .find_syntax_by_extension(ext)
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text())
    }

    fn convert_style(&self, style: syntect::highlighting::Style) -> Style {
        let (r, g, b) = ensure_min_brightness(
            style.foreground.r,
            style.foreground.g,
            style.foreground.b,
            self.min_brightness,
        );
        let mut out = Style::default().fg(Color::Rgb(r, g, b));
        if style.font_style.contains(FontStyle::BOLD) {
            out = out.add_modifier(Modifier::BOLD);
        }
        if style.font_style.contains(FontStyle::ITALIC) {
            out = out.add_modifier(Modifier::ITALIC);
        }
        if style.font_style.contains(FontStyle::UNDERLINE) {
            out = out.add_modifier(Modifier::UNDERLINED);
        }
        out
    }

    /// Highlight one line of code. Each line is highlighted on its own, so
    /// multi-line constructs may be colored approximately.
    pub fn highlight_line(&self, content: &str, path: &str) -> Vec<Span<'static>> {
        let mut highlighter = HighlightLines::new(self.get_syntax(path), &self.theme);
        match highlighter.highlight_line(content, &self.syntax_set) {
            Ok(ranges) => ranges
                .into_iter()
                .map(|(style, text)| Span::styled(text.to_string(), self.convert_style(style)))
                .collect(),
            Err(_) => vec![Span::raw(content.to_string())],
        }
    }
}

/// Cut styled spans to the character window `[skip, skip + width)`, padding
/// with `pad_style` when the text is shorter than the window.
pub fn window_spans(
    spans: Vec<Span<'static>>,
    skip: usize,
    width: usize,
    pad_style: Style,
) -> Vec<Span<'static>> {
    let mut out = Vec::new();
    let mut to_skip = skip;
    let mut room = width;

    for span in spans {
        if room == 0 {
            break;
        }
        let chars: Vec<char> = span.content.chars().collect();
        if to_skip >= chars.len() {
            to_skip -= chars.len();
            continue;
        }
        let taken: String = chars[to_skip..].iter().take(room).collect();
        to_skip = 0;
        room -= taken.chars().count();
        out.push(Span::styled(taken, span.style));
    }

    if room > 0 {
        out.push(Span::styled(" ".repeat(room), pad_style));
    }
    out
}
