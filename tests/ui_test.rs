//! Watch screen rendering tests
//!
//! Renders a live session into ratatui's TestBackend and checks what the
//! learner would see.

mod common;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{backend::TestBackend, Terminal};

use common::{progress, three_lectures, FakeDevice, FakePlatform};
use lectern::app::{InputMode, LearningSession, SessionOptions, UserCommand};
use lectern::models::LectureState;
use lectern::stream::{DeviceEvent, SourceResolver};
use lectern::ui::{self, lectures::state_icon};

fn test_terminal(width: u16, height: u16) -> Terminal<TestBackend> {
    let backend = TestBackend::new(width, height);
    Terminal::new(backend).unwrap()
}

fn screen(terminal: &Terminal<TestBackend>) -> String {
    let buffer = terminal.backend().buffer();
    buffer.content.iter().map(|c| c.symbol()).collect()
}

async fn session(platform: &FakePlatform, device: FakeDevice) -> LearningSession<FakeDevice> {
    match LearningSession::open(
        "c1",
        platform.client(),
        SourceResolver::new("http://api.test"),
        device,
        SessionOptions::default(),
    )
    .await
    {
        Ok(session) => session,
        Err(e) => panic!("session did not open: {}", e),
    }
}

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

#[tokio::test]
async fn test_renders_lectures_and_idle_player() {
    let platform = FakePlatform::new(three_lectures())
        .with_progress(vec![progress("l1", 600.0, 600.0, true)]);
    let session = session(&platform, FakeDevice::new()).await;

    let mut terminal = test_terminal(120, 30);
    terminal.draw(|frame| ui::render_session(frame, &session)).unwrap();
    let content = screen(&terminal);

    assert!(content.contains("LECTERN"));
    assert!(content.contains("LECTURES"));
    assert!(content.contains("Lecture 1"));
    assert!(content.contains("Lecture 3"));
    assert!(content.contains("NOW PLAYING"));
    assert!(content.contains("#2 Lecture 2"));
    assert!(content.contains("to start this lecture"));
    assert!(content.contains("NORMAL"));
}

#[tokio::test]
async fn test_renders_playing_state() {
    let platform = FakePlatform::new(three_lectures());
    let device = FakeDevice::new();
    let mut session = session(&platform, device.clone()).await;

    session.apply(UserCommand::TogglePlay);
    device.emit(DeviceEvent::CanPlay);
    device.emit(DeviceEvent::Playing);
    device.emit(DeviceEvent::TimeUpdate {
        position: 150.0,
        duration: Some(600.0),
    });
    session.drain_device_events();

    let now = ui::now_playing(&session);
    assert!((now.ratio() - 0.25).abs() < 1e-9);
    assert!(!now.buffering);

    let mut terminal = test_terminal(120, 30);
    terminal.draw(|frame| ui::render_session(frame, &session)).unwrap();
    let content = screen(&terminal);
    assert!(content.contains("Playing"));
    assert!(content.contains("02:30 / 10:00"));
    assert!(content.contains("25%"));
    assert!(content.contains("1x"));
}

#[tokio::test]
async fn test_locked_switch_shows_error_popup() {
    let platform = FakePlatform::new(three_lectures());
    let mut session = session(&platform, FakeDevice::new()).await;

    session.apply(UserCommand::FocusNext);
    session.apply(UserCommand::ActivateFocused);

    let mut terminal = test_terminal(120, 30);
    terminal.draw(|frame| ui::render_session(frame, &session)).unwrap();
    let content = screen(&terminal);
    assert!(content.contains("ERROR"));
    assert!(content.contains("is locked"));
}

#[tokio::test]
async fn test_filter_mode_from_keyboard() {
    let platform = FakePlatform::new(three_lectures());
    let mut session = session(&platform, FakeDevice::new()).await;

    assert!(session.handle_key(key(KeyCode::Char('/'))));
    assert_eq!(session.input_mode(), &InputMode::Filtering);
    for c in "re 3".chars() {
        session.handle_key(key(KeyCode::Char(c)));
    }
    assert_eq!(session.filter_input(), "re 3");
    assert_eq!(session.sequencer().visible().count(), 1);

    let mut terminal = test_terminal(120, 30);
    terminal.draw(|frame| ui::render_session(frame, &session)).unwrap();
    let content = screen(&terminal);
    assert!(content.contains("FILTER"));
    assert!(content.contains("/re 3"));
    assert!(!content.contains("Lecture 2"));

    // Escape clears the filter and returns to normal mode
    session.handle_key(key(KeyCode::Esc));
    assert_eq!(session.input_mode(), &InputMode::Normal);
    assert_eq!(session.sequencer().visible().count(), 3);
}

#[tokio::test]
async fn test_ctrl_c_quits_in_any_mode() {
    let platform = FakePlatform::new(three_lectures());
    let mut session = session(&platform, FakeDevice::new()).await;

    session.handle_key(key(KeyCode::Char('/')));
    session.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
    assert!(session.should_quit());
}

#[tokio::test]
async fn test_small_terminal_does_not_panic() {
    let platform = FakePlatform::new(three_lectures());
    let session = session(&platform, FakeDevice::new()).await;

    let mut terminal = test_terminal(20, 6);
    terminal.draw(|frame| ui::render_session(frame, &session)).unwrap();
}

#[test]
fn test_state_icons_are_distinct() {
    let icons = [
        state_icon(LectureState::Locked),
        state_icon(LectureState::NotStarted),
        state_icon(LectureState::InProgress),
        state_icon(LectureState::Completed),
    ];
    for (i, a) in icons.iter().enumerate() {
        for b in icons.iter().skip(i + 1) {
            assert_ne!(a, b);
        }
    }
}
