//! Lecture sequencer
//!
//! Holds the ordered lecture list, what the learner has done on each
//! lecture, and which lecture is active. Lecture `k` can be played once
//! lecture `k-1` is complete. The focus cursor walks the (optionally
//! filtered) list independently of the active lecture; committing it goes
//! through the same unlock check as any other switch.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::models::{Lecture, LectureId, LectureProgress, LectureState, ProgressUpdate};

/// Outcome of a switch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchDecision {
    /// Target is locked; nothing changed
    Denied { lecture: LectureId },
    /// Target is not part of this course
    Unknown { lecture: LectureId },
    /// Target is already the active lecture
    AlreadyActive,
    /// Active lecture changed
    Switched {
        from: Option<LectureId>,
        to: LectureId,
    },
}

impl SwitchDecision {
    pub fn is_switched(&self) -> bool {
        matches!(self, SwitchDecision::Switched { .. })
    }
}

/// Cursor over the visible lecture rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusCursor {
    /// Row index into the visible list
    pub selected: usize,
    /// Number of visible rows
    pub len: usize,
}

impl FocusCursor {
    pub fn up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn down(&mut self) {
        if self.len > 0 && self.selected < self.len - 1 {
            self.selected += 1;
        }
    }

    /// Update the row count, clamping the selection
    pub fn set_len(&mut self, len: usize) {
        self.len = len;
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }
}

/// Ordered lecture list with unlock policy and focus
#[derive(Debug, Clone, Default)]
pub struct LectureSequencer {
    lectures: Vec<Lecture>,
    progress: HashMap<LectureId, LectureProgress>,
    active: Option<usize>,
    filter: String,
    /// Indices into `lectures` matching the filter, in order
    view: Vec<usize>,
    focus: FocusCursor,
}

impl LectureSequencer {
    /// Build from fetched lectures; order is by `order_index`
    pub fn new(mut lectures: Vec<Lecture>) -> Self {
        lectures.sort_by_key(|l| l.order_index);
        let mut sequencer = Self {
            lectures,
            ..Self::default()
        };
        sequencer.rebuild_view();
        sequencer
    }

    pub fn lectures(&self) -> &[Lecture] {
        &self.lectures
    }

    pub fn is_empty(&self) -> bool {
        self.lectures.is_empty()
    }

    pub fn lecture(&self, id: &LectureId) -> Option<&Lecture> {
        self.index_of(id).map(|i| &self.lectures[i])
    }

    pub fn progress(&self, id: &LectureId) -> Option<&LectureProgress> {
        self.progress.get(id)
    }

    /// Saved position for a lecture, 0 when none
    pub fn resume_position(&self, id: &LectureId) -> f64 {
        self.progress.get(id).map(|p| p.position.max(0.0)).unwrap_or(0.0)
    }

    pub fn is_complete(&self, id: &LectureId) -> bool {
        self.progress.get(id).map(|p| p.is_complete).unwrap_or(false)
    }

    pub fn active(&self) -> Option<&Lecture> {
        self.active.map(|i| &self.lectures[i])
    }

    pub fn active_id(&self) -> Option<&LectureId> {
        self.active().map(|l| &l.lecture_id)
    }

    /// Playability of a lecture; unknown lectures report `Locked`
    pub fn state_of(&self, id: &LectureId) -> LectureState {
        let Some(index) = self.index_of(id) else {
            return LectureState::Locked;
        };
        let lecture = &self.lectures[index];
        if self.is_complete(&lecture.lecture_id) {
            return LectureState::Completed;
        }
        if !self.is_unlocked(lecture) {
            return LectureState::Locked;
        }
        if self.resume_position(&lecture.lecture_id) > 0.0 {
            LectureState::InProgress
        } else {
            LectureState::NotStarted
        }
    }

    fn is_unlocked(&self, lecture: &Lecture) -> bool {
        if lecture.order_index <= 1 {
            return true;
        }
        let previous = lecture.order_index - 1;
        match self.lectures.iter().find(|l| l.order_index == previous) {
            Some(prev) => self.is_complete(&prev.lecture_id),
            None => true,
        }
    }

    /// Merge fetched progress items. Completion never goes back to false.
    pub fn apply_progress(&mut self, items: &[LectureProgress]) {
        for item in items {
            self.progress
                .entry(item.lecture_id.clone())
                .and_modify(|p| p.merge(item))
                .or_insert_with(|| item.clone());
        }
    }

    /// Reflect a persisted save locally
    pub fn record_progress(&mut self, update: &ProgressUpdate) {
        self.apply_progress(&[LectureProgress {
            lecture_id: update.lecture_id.clone(),
            position: update.position,
            duration: update.duration,
            is_complete: update.marks_complete(),
        }]);
    }

    pub fn mark_complete(&mut self, id: &LectureId) {
        self.progress
            .entry(id.clone())
            .or_insert_with(|| LectureProgress::new(id.clone()))
            .is_complete = true;
    }

    /// Pick the lecture to open first: the earliest one not yet complete,
    /// else the first lecture
    pub fn select_initial(&mut self, items: &[LectureProgress]) -> Option<&Lecture> {
        self.apply_progress(items);
        let index = self
            .lectures
            .iter()
            .position(|l| !self.is_complete(&l.lecture_id))
            .or(if self.lectures.is_empty() { None } else { Some(0) })?;

        self.active = Some(index);
        self.focus_active();
        info!(lecture = %self.lectures[index].lecture_id, "initial lecture selected");
        self.active()
    }

    /// Try to make `target` the active lecture; `force` bypasses the lock
    pub fn request_switch(&mut self, target: &LectureId, force: bool) -> SwitchDecision {
        let Some(index) = self.index_of(target) else {
            return SwitchDecision::Unknown {
                lecture: target.clone(),
            };
        };
        if self.active == Some(index) {
            return SwitchDecision::AlreadyActive;
        }
        if !force && self.state_of(target) == LectureState::Locked {
            debug!(lecture = %target, "switch denied, lecture locked");
            return SwitchDecision::Denied {
                lecture: target.clone(),
            };
        }

        let from = self.active_id().cloned();
        self.active = Some(index);
        self.focus_active();
        info!(from = ?from.as_ref().map(|l| l.as_str()), to = %target, force, "active lecture changed");
        SwitchDecision::Switched {
            from,
            to: target.clone(),
        }
    }

    /// Lecture after the active one in order
    pub fn next_lecture(&self) -> Option<&Lecture> {
        let next = self.active.map(|i| i + 1).unwrap_or(0);
        self.lectures.get(next)
    }

    /// Move to the next lecture after a completion, ignoring locks.
    /// Stays put (returns `None`) on the last lecture.
    pub fn advance_after_completion(&mut self) -> Option<SwitchDecision> {
        let next = self.next_lecture()?.lecture_id.clone();
        Some(self.request_switch(&next, true))
    }

    // -------------------------------------------------------------------------
    // Focus and filtering
    // -------------------------------------------------------------------------

    /// Restrict the visible rows to titles containing `query` (case-insensitive)
    pub fn set_filter(&mut self, query: &str) {
        self.filter = query.trim().to_lowercase();
        let focused = self.focused().map(|l| l.lecture_id.clone());
        self.rebuild_view();
        if let Some(row) = focused.and_then(|id| self.view_row(&id)) {
            self.focus.selected = row;
        }
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Lectures currently visible, in order
    pub fn visible(&self) -> impl Iterator<Item = &Lecture> {
        self.view.iter().map(|&i| &self.lectures[i])
    }

    pub fn focus_index(&self) -> usize {
        self.focus.selected
    }

    pub fn focused(&self) -> Option<&Lecture> {
        self.view
            .get(self.focus.selected)
            .map(|&i| &self.lectures[i])
    }

    pub fn focus_next(&mut self) {
        self.focus.down();
    }

    pub fn focus_prev(&mut self) {
        self.focus.up();
    }

    /// Put the cursor on the active lecture when it is visible
    pub fn focus_active(&mut self) -> bool {
        let Some(active) = self.active else {
            return false;
        };
        match self.view.iter().position(|&i| i == active) {
            Some(row) => {
                self.focus.selected = row;
                true
            }
            None => false,
        }
    }

    /// Commit the focused row as a regular (lock-respecting) switch
    pub fn activate_focused(&mut self) -> Option<SwitchDecision> {
        let target = self.focused()?.lecture_id.clone();
        Some(self.request_switch(&target, false))
    }

    fn rebuild_view(&mut self) {
        let filter = &self.filter;
        self.view = self
            .lectures
            .iter()
            .enumerate()
            .filter(|(_, l)| filter.is_empty() || l.title.to_lowercase().contains(filter))
            .map(|(i, _)| i)
            .collect();
        self.focus.set_len(self.view.len());
    }

    fn view_row(&self, id: &LectureId) -> Option<usize> {
        self.view
            .iter()
            .position(|&i| &self.lectures[i].lecture_id == id)
    }

    fn index_of(&self, id: &LectureId) -> Option<usize> {
        self.lectures.iter().position(|l| &l.lecture_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lecture(id: &str, order: u32, title: &str) -> Lecture {
        Lecture {
            lecture_id: id.into(),
            title: title.to_string(),
            order_index: order,
            source_ref: None,
            video_ref: None,
            is_preview: false,
            duration: 600.0,
        }
    }

    fn done(id: &str) -> LectureProgress {
        LectureProgress {
            lecture_id: id.into(),
            position: 600.0,
            duration: 600.0,
            is_complete: true,
        }
    }

    fn course() -> LectureSequencer {
        LectureSequencer::new(vec![
            lecture("l3", 3, "Ownership"),
            lecture("l1", 1, "Intro"),
            lecture("l2", 2, "Borrowing"),
        ])
    }

    #[test]
    fn test_sorted_by_order_index() {
        let seq = course();
        let ids: Vec<_> = seq.lectures().iter().map(|l| l.lecture_id.as_str()).collect();
        assert_eq!(ids, vec!["l1", "l2", "l3"]);
    }

    #[test]
    fn test_first_lecture_never_locked() {
        let seq = course();
        assert_eq!(seq.state_of(&"l1".into()), LectureState::NotStarted);
        assert_eq!(seq.state_of(&"l2".into()), LectureState::Locked);
        assert_eq!(seq.state_of(&"l3".into()), LectureState::Locked);
    }

    #[test]
    fn test_select_initial_skips_completed_and_locks_rest() {
        let mut seq = course();
        let initial = seq.select_initial(&[done("l1")]).unwrap();
        assert_eq!(initial.lecture_id.as_str(), "l2");

        assert_eq!(
            seq.request_switch(&"l3".into(), false),
            SwitchDecision::Denied {
                lecture: "l3".into()
            }
        );
        assert_eq!(seq.active_id().unwrap().as_str(), "l2");
        assert_eq!(seq.state_of(&"l3".into()), LectureState::Locked);
    }

    #[test]
    fn test_select_initial_all_complete_falls_back_to_first() {
        let mut seq = course();
        let initial = seq.select_initial(&[done("l1"), done("l2"), done("l3")]).unwrap();
        assert_eq!(initial.lecture_id.as_str(), "l1");
    }

    #[test]
    fn test_select_initial_empty_course() {
        let mut seq = LectureSequencer::new(vec![]);
        assert!(seq.select_initial(&[]).is_none());
        assert!(seq.active().is_none());
    }

    #[test]
    fn test_gap_in_order_index_unlocks() {
        let mut seq = LectureSequencer::new(vec![lecture("a", 1, "A"), lecture("c", 3, "C")]);
        seq.select_initial(&[]);
        assert_eq!(seq.state_of(&"c".into()), LectureState::NotStarted);
    }

    #[test]
    fn test_completion_is_sticky() {
        let mut seq = course();
        seq.apply_progress(&[done("l1")]);
        seq.apply_progress(&[LectureProgress {
            lecture_id: "l1".into(),
            position: 5.0,
            duration: 600.0,
            is_complete: false,
        }]);
        assert_eq!(seq.state_of(&"l1".into()), LectureState::Completed);
        assert_eq!(seq.state_of(&"l2".into()), LectureState::NotStarted);
    }

    #[test]
    fn test_in_progress_state() {
        let mut seq = course();
        seq.apply_progress(&[LectureProgress {
            lecture_id: "l1".into(),
            position: 42.0,
            duration: 600.0,
            is_complete: false,
        }]);
        assert_eq!(seq.state_of(&"l1".into()), LectureState::InProgress);
        assert_eq!(seq.resume_position(&"l1".into()), 42.0);
    }

    #[test]
    fn test_switch_already_active_and_unknown() {
        let mut seq = course();
        seq.select_initial(&[]);
        assert_eq!(seq.request_switch(&"l1".into(), false), SwitchDecision::AlreadyActive);
        assert_eq!(
            seq.request_switch(&"nope".into(), true),
            SwitchDecision::Unknown {
                lecture: "nope".into()
            }
        );
    }

    #[test]
    fn test_forced_switch_bypasses_lock() {
        let mut seq = course();
        seq.select_initial(&[]);
        let decision = seq.request_switch(&"l3".into(), true);
        assert!(decision.is_switched());
        assert_eq!(seq.active_id().unwrap().as_str(), "l3");
    }

    #[test]
    fn test_advance_after_completion() {
        let mut seq = course();
        seq.select_initial(&[]);
        seq.mark_complete(&"l1".into());

        let decision = seq.advance_after_completion().unwrap();
        assert_eq!(
            decision,
            SwitchDecision::Switched {
                from: Some("l1".into()),
                to: "l2".into()
            }
        );
    }

    #[test]
    fn test_advance_on_last_lecture_stays() {
        let mut seq = course();
        seq.select_initial(&[done("l1"), done("l2")]);
        seq.request_switch(&"l3".into(), false);
        assert!(seq.advance_after_completion().is_none());
        assert_eq!(seq.active_id().unwrap().as_str(), "l3");
    }

    #[test]
    fn test_focus_moves_without_switching() {
        let mut seq = course();
        seq.select_initial(&[]);
        seq.focus_next();
        seq.focus_next();
        seq.focus_next();
        assert_eq!(seq.focused().unwrap().lecture_id.as_str(), "l3");
        assert_eq!(seq.active_id().unwrap().as_str(), "l1");

        assert_eq!(
            seq.activate_focused(),
            Some(SwitchDecision::Denied {
                lecture: "l3".into()
            })
        );

        seq.focus_prev();
        seq.focus_prev();
        seq.focus_prev();
        assert_eq!(seq.focus_index(), 0);
    }

    #[test]
    fn test_filter_and_jump_to_current() {
        let mut seq = course();
        seq.select_initial(&[done("l1")]);
        seq.set_filter("OWN");
        let visible: Vec<_> = seq.visible().map(|l| l.lecture_id.as_str()).collect();
        assert_eq!(visible, vec!["l3"]);
        assert!(!seq.focus_active());

        seq.set_filter("");
        assert_eq!(seq.visible().count(), 3);
        assert!(seq.focus_active());
        assert_eq!(seq.focused().unwrap().lecture_id.as_str(), "l2");
    }

    #[test]
    fn test_record_progress_marks_complete() {
        let mut seq = course();
        seq.record_progress(&ProgressUpdate {
            course_id: "c".to_string(),
            lecture_id: "l1".into(),
            video_ref: None,
            position: 598.0,
            duration: 600.0,
            is_complete: Some(true),
        });
        assert!(seq.is_complete(&"l1".into()));
    }
}
