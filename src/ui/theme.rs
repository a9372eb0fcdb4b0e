//! Color theme for the watch screen
//!
//! A warm, low-glare palette meant for long study sessions.

use ratatui::style::{Color, Modifier, Style};

/// Watch screen palette
pub struct Theme;

impl Theme {
    // ═══════════════════════════════════════════════════════════════════════
    // CORE PALETTE
    // ═══════════════════════════════════════════════════════════════════════

    /// Background: #16161d (ink)
    pub const BACKGROUND: Color = Color::Rgb(0x16, 0x16, 0x1d);

    /// Primary: #7fd1b9 (mint)
    pub const PRIMARY: Color = Color::Rgb(0x7f, 0xd1, 0xb9);

    /// Secondary: #a9b7ff (periwinkle)
    pub const SECONDARY: Color = Color::Rgb(0xa9, 0xb7, 0xff);

    /// Accent: #f2c14e (amber)
    pub const ACCENT: Color = Color::Rgb(0xf2, 0xc1, 0x4e);

    /// Text: #e6e1d6 (paper)
    pub const TEXT: Color = Color::Rgb(0xe6, 0xe1, 0xd6);

    /// Dim: #6b6b7b
    pub const DIM: Color = Color::Rgb(0x6b, 0x6b, 0x7b);

    /// Success: #8bd17c (green)
    pub const SUCCESS: Color = Color::Rgb(0x8b, 0xd1, 0x7c);

    /// Warning: #f59e5b (orange)
    pub const WARNING: Color = Color::Rgb(0xf5, 0x9e, 0x5b);

    /// Error: #ff6b6b (red)
    pub const ERROR: Color = Color::Rgb(0xff, 0x6b, 0x6b);

    /// Panel background
    pub const BACKGROUND_LIGHT: Color = Color::Rgb(0x22, 0x22, 0x2c);

    /// Border color (muted mint)
    pub const BORDER: Color = Color::Rgb(0x3d, 0x6b, 0x5e);

    // ═══════════════════════════════════════════════════════════════════════
    // STYLE HELPERS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn text() -> Style {
        Style::default().fg(Self::TEXT).bg(Self::BACKGROUND)
    }

    pub fn title() -> Style {
        Style::default()
            .fg(Self::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn dimmed() -> Style {
        Style::default().fg(Self::DIM)
    }

    pub fn accent() -> Style {
        Style::default()
            .fg(Self::ACCENT)
            .add_modifier(Modifier::BOLD)
    }

    pub fn secondary() -> Style {
        Style::default().fg(Self::SECONDARY)
    }

    pub fn error() -> Style {
        Style::default()
            .fg(Self::ERROR)
            .add_modifier(Modifier::BOLD)
    }

    pub fn success() -> Style {
        Style::default().fg(Self::SUCCESS)
    }

    pub fn warning() -> Style {
        Style::default().fg(Self::WARNING)
    }

    pub fn border() -> Style {
        Style::default().fg(Self::BORDER)
    }

    pub fn border_focused() -> Style {
        Style::default()
            .fg(Self::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    /// Focused row in the lecture list
    pub fn list_item_selected() -> Style {
        Style::default()
            .fg(Self::BACKGROUND)
            .bg(Self::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    /// Lecture that is currently playing
    pub fn list_item_active() -> Style {
        Style::default()
            .fg(Self::ACCENT)
            .add_modifier(Modifier::BOLD)
    }

    pub fn keybind() -> Style {
        Style::default()
            .fg(Self::SECONDARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn progress_bar() -> Style {
        Style::default()
            .fg(Self::PRIMARY)
            .bg(Self::BACKGROUND_LIGHT)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTRAST HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// WCAG relative luminance of an sRGB color
pub fn relative_luminance(r: u8, g: u8, b: u8) -> f64 {
    fn channel(c: u8) -> f64 {
        let c = c as f64 / 255.0;
        if c <= 0.03928 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }
    0.2126 * channel(r) + 0.7152 * channel(g) + 0.0722 * channel(b)
}

/// WCAG contrast ratio between two colors (1.0 to 21.0)
pub fn contrast_ratio(fg: (u8, u8, u8), bg: (u8, u8, u8)) -> f64 {
    let l1 = relative_luminance(fg.0, fg.1, fg.2);
    let l2 = relative_luminance(bg.0, bg.1, bg.2);
    let (lighter, darker) = if l1 > l2 { (l1, l2) } else { (l2, l1) };
    (lighter + 0.05) / (darker + 0.05)
}

pub fn color_to_rgb(color: Color) -> Option<(u8, u8, u8)> {
    match color {
        Color::Rgb(r, g, b) => Some((r, g, b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(color: Color) -> (u8, u8, u8) {
        color_to_rgb(color).unwrap()
    }

    #[test]
    fn test_text_colors_readable_on_background() {
        let bg = rgb(Theme::BACKGROUND);
        for color in [Theme::TEXT, Theme::PRIMARY, Theme::ACCENT, Theme::ERROR, Theme::SUCCESS] {
            assert!(
                contrast_ratio(rgb(color), bg) >= 4.5,
                "{:?} fails AA contrast",
                color
            );
        }
    }

    #[test]
    fn test_selected_row_readable() {
        assert!(contrast_ratio(rgb(Theme::BACKGROUND), rgb(Theme::PRIMARY)) >= 4.5);
    }

    #[test]
    fn test_contrast_ratio_extremes() {
        assert!((contrast_ratio((0, 0, 0), (255, 255, 255)) - 21.0).abs() < 0.01);
        assert!((contrast_ratio((40, 40, 40), (40, 40, 40)) - 1.0).abs() < 0.001);
    }
}
