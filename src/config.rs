use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::render::{Palette, RenderConfig};

/// RGB color representation for config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<RgbColor> for ratatui::style::Color {
    fn from(c: RgbColor) -> Self {
        ratatui::style::Color::Rgb(c.r, c.g, c.b)
    }
}

/// Display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Enable syntax highlighting of diff text
    pub syntax_highlighting: bool,

    /// Minimum brightness for syntax colors (0-255)
    /// Higher values make colors more visible on dark backgrounds
    pub min_brightness: u8,

    /// Syntax highlighting theme name
    /// Available themes: base16-ocean.dark, base16-eighties.dark, base16-mocha.dark,
    /// base16-ocean.light, InspiredGitHub, Solarized (dark), Solarized (light)
    pub theme: String,

    /// Show threads whose line is no longer in the diff at the end of their file
    pub show_orphaned_comments: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            syntax_highlighting: false,
            min_brightness: 180,
            theme: "base16-eighties.dark".to_string(),
            show_orphaned_comments: false,
        }
    }
}

/// Diff color settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffColors {
    /// Foreground of added lines
    pub add: RgbColor,
    /// Foreground of deleted lines
    pub del: RgbColor,
    pub context: RgbColor,
    pub file_heading: RgbColor,
    pub hunk_heading: RgbColor,
    /// Comment block text
    pub comment: RgbColor,
    /// Background of the selected line
    pub cursor_bg: RgbColor,
    /// Accent color used for the PR header, banners and the focused pane
    pub accent: RgbColor,
}

impl Default for DiffColors {
    fn default() -> Self {
        Self {
            add: RgbColor::new(80, 200, 120),
            del: RgbColor::new(230, 90, 90),
            context: RgbColor::new(200, 200, 200),
            file_heading: RgbColor::new(240, 200, 80),
            hunk_heading: RgbColor::new(90, 170, 230),
            comment: RgbColor::new(190, 150, 230),
            cursor_bg: RgbColor::new(45, 45, 65),
            accent: RgbColor::new(106, 50, 159),
        }
    }
}

/// Navigation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSettings {
    /// Number of lines to scroll with Page Up/Down
    pub scroll_lines: usize,

    /// Number of columns to scroll horizontally
    pub horizontal_scroll_columns: usize,

    /// Width of the file list pane
    pub file_list_width: u16,

    /// Show the file list pane on startup
    pub show_file_list: bool,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            scroll_lines: 15,
            horizontal_scroll_columns: 4,
            file_list_width: 45,
            show_file_list: true,
        }
    }
}

/// Status bar settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    /// How long a transient status message stays visible
    pub timeout_ms: u64,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self { timeout_ms: 2000 }
    }
}

/// Where the diff text comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffSource {
    /// Local git when a work tree is available, the API otherwise
    #[default]
    Auto,
    Local,
    Remote,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffSettings {
    pub source: DiffSource,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default tab width used when no language-specific setting exists
    pub default_tab_width: usize,

    /// Language-specific indentation settings
    /// The key is the file extension (without dot), e.g., "rs", "py", "go"
    #[serde(default)]
    pub languages: HashMap<String, LanguageConfig>,

    #[serde(default)]
    pub display: DisplaySettings,

    #[serde(default)]
    pub colors: DiffColors,

    #[serde(default)]
    pub navigation: NavigationSettings,

    #[serde(default)]
    pub status: StatusSettings,

    #[serde(default)]
    pub diff: DiffSettings,
}

/// Language-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Tab width for this language (how many spaces a tab should render as)
    pub tab_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_tab_width: 4,
            languages: HashMap::new(),
            display: DisplaySettings::default(),
            colors: DiffColors::default(),
            navigation: NavigationSettings::default(),
            status: StatusSettings::default(),
            diff: DiffSettings::default(),
        }
    }
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self { tab_width: 4 }
    }
}

/// Per-extension tab widths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabWidths {
    pub default: usize,
    pub by_extension: HashMap<String, usize>,
}

impl TabWidths {
    pub fn for_file(&self, path: &str) -> usize {
        let ext = path.rsplit('.').next().unwrap_or("");
        self.by_extension.get(ext).copied().unwrap_or(self.default)
    }

    /// Expand tabs in content to spaces based on the width for `path`
    pub fn expand(&self, content: &str, path: &str) -> String {
        let tab_width = self.for_file(path);
        if tab_width == 0 || !content.contains('\t') {
            // Tab width of 0 means don't expand tabs
            return content.to_string();
        }

        let mut result = String::with_capacity(content.len());
        let mut column = 0;

        for ch in content.chars() {
            if ch == '\t' {
                // Calculate spaces needed to reach next tab stop
                let spaces_to_add = tab_width - (column % tab_width);
                for _ in 0..spaces_to_add {
                    result.push(' ');
                }
                column += spaces_to_add;
            } else {
                result.push(ch);
                column += 1;
            }
        }

        result
    }
}

impl Default for TabWidths {
    fn default() -> Self {
        Config::default().tab_widths()
    }
}

impl Config {
    /// Get the config file path (~/.config/shinsa/config.toml)
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("shinsa").join("config.toml"))
    }

    /// Load configuration from file, or return default if not found
    pub fn load() -> Self {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                log::warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn tab_widths(&self) -> TabWidths {
        TabWidths {
            default: self.default_tab_width,
            by_extension: self
                .languages
                .iter()
                .map(|(ext, lang)| (ext.clone(), lang.tab_width))
                .collect(),
        }
    }

    pub fn palette(&self) -> Palette {
        let c = &self.colors;
        Palette {
            add: c.add.into(),
            del: c.del.into(),
            context: c.context.into(),
            file_heading: c.file_heading.into(),
            hunk_heading: c.hunk_heading.into(),
            comment: c.comment.into(),
            cursor_bg: c.cursor_bg.into(),
            accent: c.accent.into(),
        }
    }

    /// Build the render configuration for a viewport `width` columns wide
    pub fn render_config(&self, width: usize) -> RenderConfig {
        RenderConfig {
            width,
            palette: self.palette(),
            tabs: self.tab_widths(),
            syntax_highlighting: self.display.syntax_highlighting,
            show_orphaned_comments: self.display.show_orphaned_comments,
        }
    }
}
