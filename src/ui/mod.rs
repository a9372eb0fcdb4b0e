//! Terminal UI for the watch screen
//!
//! Built with ratatui. Rendering is a pure function of the
//! [`LearningSession`]; the session loop redraws after every message.

pub mod lectures;
pub mod player;
pub mod terminal;
pub mod theme;

pub use lectures::LectureList;
pub use player::NowPlaying;
pub use theme::Theme;

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph},
    Frame,
};

use crate::app::{InputMode, LearningSession};
use crate::stream::PlaybackDevice;

/// Draw the whole watch screen
pub fn render_session<D: PlaybackDevice>(frame: &mut Frame, session: &LearningSession<D>) {
    let area = frame.area();

    frame.render_widget(Clear, area);
    frame.render_widget(Block::default().style(Style::default().bg(Theme::BACKGROUND)), area);

    // Main layout: header, content, status bar
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(1),    // Content
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_header(frame, chunks[0], session);

    let content = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[1]);

    LectureList::new(session.sequencer())
        .focused(*session.input_mode() == InputMode::Normal)
        .render(frame, content[0]);
    now_playing(session).render(frame, content[1]);

    render_status_bar(frame, chunks[2], session);

    if let Some(error) = session.error() {
        render_error_popup(frame, area, error);
    }
}

/// Player panel snapshot of the session
pub fn now_playing<D: PlaybackDevice>(session: &LearningSession<D>) -> NowPlaying {
    let engine = session.engine();
    NowPlaying {
        title: session.sequencer().active().map(|l| l.to_string()),
        state: engine.state().clone(),
        tick: engine.last_tick(),
        rate: engine.rate(),
        buffering: session.is_buffering(),
        status: session.status().map(str::to_string),
    }
}

fn render_header<D: PlaybackDevice>(frame: &mut Frame, area: Rect, session: &LearningSession<D>) {
    let header_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(13), // Logo
            Constraint::Min(1),     // Course summary
        ])
        .split(area);

    let logo = Paragraph::new(Span::styled("LECTERN", Theme::title()))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Theme::border()),
        );
    frame.render_widget(logo, header_chunks[0]);

    let summary = Paragraph::new(Line::from(vec![
        Span::styled(format!("{}  ", session.course_id()), Theme::secondary()),
        Span::styled(session.summary().to_string(), Theme::text()),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Theme::border())
            .title(Span::styled(" COURSE ", Theme::title())),
    );
    frame.render_widget(summary, header_chunks[1]);
}

fn render_status_bar<D: PlaybackDevice>(frame: &mut Frame, area: Rect, session: &LearningSession<D>) {
    let mode = match session.input_mode() {
        InputMode::Normal => Span::styled(
            " NORMAL ",
            Style::default().fg(Theme::BACKGROUND).bg(Theme::PRIMARY),
        ),
        InputMode::Filtering => Span::styled(
            " FILTER ",
            Style::default().fg(Theme::BACKGROUND).bg(Theme::ACCENT),
        ),
    };

    let middle = match session.input_mode() {
        InputMode::Filtering => Span::styled(format!(" /{}│", session.filter_input()), Theme::text()),
        InputMode::Normal if session.pending_syncs() > 0 => {
            Span::styled(" saving… ", Theme::secondary())
        }
        InputMode::Normal => Span::raw(" "),
    };

    let help = Span::styled(
        " ↑↓ move  enter open  c current  / filter  q quit ",
        Theme::dimmed(),
    );

    let status = Paragraph::new(Line::from(vec![mode, middle, Span::raw(" │ "), help]))
        .style(Style::default().fg(Theme::TEXT).bg(Theme::BACKGROUND_LIGHT));
    frame.render_widget(status, area);
}

fn render_error_popup(frame: &mut Frame, area: Rect, error: &str) {
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 5;

    let popup_area = Rect {
        x: area.x + (area.width.saturating_sub(popup_width)) / 2,
        y: area.y + (area.height.saturating_sub(popup_height)) / 2,
        width: popup_width,
        height: popup_height.min(area.height),
    };

    frame.render_widget(Clear, popup_area);

    let error_block = Paragraph::new(vec![
        Line::from(""),
        Line::from(Span::styled(error.to_string(), Theme::error())),
    ])
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Double)
            .border_style(Theme::error())
            .title(Span::styled(" ✗ ERROR ", Theme::error()))
            .style(Style::default().bg(Theme::BACKGROUND)),
    );

    frame.render_widget(error_block, popup_area);
}
