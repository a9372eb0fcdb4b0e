//! Now Playing panel
//!
//! Engine state, position gauge, playback speed and the key help.

use ratatui::{
    prelude::*,
    widgets::{Block, BorderType, Borders, Gauge, Paragraph, Wrap},
};

use crate::models::{PlaybackRate, Tick};
use crate::stream::{EngineState, PlaybackError};
use crate::ui::Theme;

/// Snapshot of what the player panel shows
#[derive(Debug, Clone)]
pub struct NowPlaying {
    /// Active lecture, `#k title`
    pub title: Option<String>,
    pub state: EngineState,
    pub tick: Tick,
    pub rate: PlaybackRate,
    pub buffering: bool,
    /// Last status message from the session
    pub status: Option<String>,
}

impl NowPlaying {
    /// Watched fraction for the gauge, clamped to 0.0-1.0
    pub fn ratio(&self) -> f64 {
        self.tick.fraction().unwrap_or(0.0).clamp(0.0, 1.0)
    }

    fn state_style(&self) -> Style {
        match &self.state {
            EngineState::Playing => Theme::success(),
            EngineState::Paused => Theme::warning(),
            EngineState::Errored(PlaybackError::SlowStart) => Theme::warning(),
            EngineState::Errored(_) => Theme::error(),
            _ => Theme::dimmed(),
        }
    }

    fn state_line(&self) -> Line<'static> {
        let mut spans = vec![Span::styled(self.state.to_string(), self.state_style())];
        if self.buffering {
            spans.push(Span::styled("  ⟳ buffering", Theme::secondary()));
        }
        spans.push(Span::styled(format!("  {}", self.rate), Theme::accent()));
        Line::from(spans)
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Theme::border())
            .title(Span::styled(" ▶ NOW PLAYING ", Theme::success()));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Title + state
                Constraint::Length(1), // Gauge
                Constraint::Length(1), // Time
                Constraint::Min(1),    // Status + help
            ])
            .split(inner);

        let title = self
            .title
            .clone()
            .unwrap_or_else(|| "No lecture selected".to_string());
        let header = Paragraph::new(vec![
            Line::from(Span::styled(title, Theme::title())),
            Line::from(""),
            self.state_line(),
        ]);
        frame.render_widget(header, chunks[0]);

        let gauge = Gauge::default()
            .gauge_style(Theme::progress_bar())
            .ratio(self.ratio())
            .label(format!("{:.0}%", self.ratio() * 100.0));
        frame.render_widget(gauge, chunks[1]);

        let time = Paragraph::new(Span::styled(self.tick.to_string(), Theme::dimmed()))
            .alignment(Alignment::Right);
        frame.render_widget(time, chunks[2]);

        let mut lines = vec![Line::from("")];
        match (&self.state, &self.status) {
            (EngineState::Idle, _) => lines.push(Line::from(vec![
                Span::styled(" SPACE ", Theme::keybind()),
                Span::styled("to start this lecture", Theme::dimmed()),
            ])),
            (_, Some(status)) => lines.push(Line::from(Span::styled(status.clone(), Theme::text()))),
            _ => {}
        }
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled(" SPACE ", Theme::keybind()),
            Span::styled("Play/Pause  ", Theme::dimmed()),
            Span::styled(" ←→ ", Theme::keybind()),
            Span::styled("Seek  ", Theme::dimmed()),
            Span::styled(" 1-5 ", Theme::keybind()),
            Span::styled("Speed", Theme::dimmed()),
        ]));
        lines.push(Line::from(vec![
            Span::styled(" n ", Theme::keybind()),
            Span::styled("Next  ", Theme::dimmed()),
            Span::styled(" r ", Theme::keybind()),
            Span::styled("Retry", Theme::dimmed()),
        ]));
        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), chunks[3]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now_playing(tick: Tick) -> NowPlaying {
        NowPlaying {
            title: Some("#1 Intro".to_string()),
            state: EngineState::Playing,
            tick,
            rate: PlaybackRate::Normal,
            buffering: false,
            status: None,
        }
    }

    #[test]
    fn test_ratio_unknown_duration() {
        assert_eq!(now_playing(Tick::new(30.0, 0.0)).ratio(), 0.0);
    }

    #[test]
    fn test_ratio_clamped() {
        assert_eq!(now_playing(Tick::new(130.0, 120.0)).ratio(), 1.0);
        assert!((now_playing(Tick::new(30.0, 120.0)).ratio() - 0.25).abs() < 1e-9);
    }
}
