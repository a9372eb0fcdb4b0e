//! Lecture list
//!
//! Shows every visible lecture with its unlock state, marks the one that
//! is playing and highlights the focused row.

use ratatui::{
    prelude::*,
    widgets::{Block, BorderType, Borders, List, ListItem, Paragraph},
};

use crate::models::{Lecture, LectureState};
use crate::sequencer::LectureSequencer;
use crate::ui::Theme;

/// Icon shown in front of a lecture title
pub fn state_icon(state: LectureState) -> &'static str {
    match state {
        LectureState::Locked => "🔒",
        LectureState::NotStarted => "○",
        LectureState::InProgress => "◐",
        LectureState::Completed => "✓",
    }
}

/// First row to draw so that `selected` stays inside `visible_height` rows
pub fn scroll_offset(selected: usize, visible_height: usize) -> usize {
    if visible_height == 0 {
        return selected;
    }
    selected.saturating_sub(visible_height - 1)
}

/// Lecture list panel
pub struct LectureList<'a> {
    sequencer: &'a LectureSequencer,
    /// Whether keyboard focus is on the list (false while typing a filter)
    focused: bool,
}

impl<'a> LectureList<'a> {
    pub fn new(sequencer: &'a LectureSequencer) -> Self {
        Self {
            sequencer,
            focused: true,
        }
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    fn row(&self, lecture: &Lecture, is_focus: bool) -> ListItem<'static> {
        let state = self.sequencer.state_of(&lecture.lecture_id);
        let is_active = self.sequencer.active_id() == Some(&lecture.lecture_id);

        let style = if is_focus {
            Theme::list_item_selected()
        } else if is_active {
            Theme::list_item_active()
        } else {
            match state {
                LectureState::Locked => Theme::dimmed(),
                LectureState::Completed => Theme::success(),
                _ => Theme::text(),
            }
        };

        let marker = match (is_focus, is_active) {
            (true, _) => "▸",
            (false, true) => "▶",
            _ => " ",
        };

        let mut spans = vec![
            Span::styled(format!("{} ", marker), style),
            Span::styled(format!("{:>3} ", lecture.order_index), style),
            Span::styled(format!("{} ", state_icon(state)), style),
            Span::styled(lecture.title.clone(), style),
        ];

        if state == LectureState::InProgress {
            if let Some(progress) = self.sequencer.progress(&lecture.lecture_id) {
                let percent = (progress.fraction() * 100.0).round() as u32;
                spans.push(Span::styled(format!("  {}%", percent), Theme::secondary()));
            }
        }
        if lecture.is_preview {
            spans.push(Span::styled("  preview", Theme::dimmed()));
        }

        ListItem::new(Line::from(spans))
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let title = if self.sequencer.filter().is_empty() {
            " LECTURES ".to_string()
        } else {
            format!(" LECTURES · {} ", self.sequencer.filter())
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(if self.focused {
                Theme::border_focused()
            } else {
                Theme::border()
            })
            .title(Span::styled(title, Theme::title()));

        let visible: Vec<&Lecture> = self.sequencer.visible().collect();
        if visible.is_empty() {
            let empty = Paragraph::new(vec![
                Line::from(""),
                Line::from(Span::styled("No lectures match the filter", Theme::dimmed())),
            ])
            .alignment(Alignment::Center)
            .block(block);
            frame.render_widget(empty, area);
            return;
        }

        let selected = self.sequencer.focus_index();
        let height = area.height.saturating_sub(2) as usize;
        let offset = scroll_offset(selected, height);

        let items: Vec<ListItem> = visible
            .iter()
            .enumerate()
            .skip(offset)
            .take(height.max(1))
            .map(|(row, lecture)| self.row(lecture, row == selected))
            .collect();

        frame.render_widget(List::new(items).block(block), area);
    }
}
