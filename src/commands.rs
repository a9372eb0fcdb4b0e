//! CLI Command Handlers
//!
//! Implements all CLI commands by calling the appropriate backend services.
//! Each handler takes CLI args and Output, returns ExitCode.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

use crate::api::{ApiError, LearningClient, SyncClient};
use crate::app::{SessionError, SessionOptions};
use crate::cli::{
    redact, ConfigCmd, ConfigSetCmd, ConfigView, ExitCode, LectureRow, LecturesCmd, Output,
    ProgressCmd, ResolveCmd, WatchCmd,
};
use crate::config::Config;
use crate::models::{format_duration, LectureId};
use crate::sequencer::LectureSequencer;

/// Map an API error to its exit code
fn api_exit_code(e: &ApiError) -> ExitCode {
    match e {
        ApiError::Unauthorized => ExitCode::Unauthorized,
        ApiError::NotFound => ExitCode::InvalidArgs,
        _ => ExitCode::NetworkError,
    }
}

fn client_from(config: &Config) -> LearningClient {
    LearningClient::new(config.api_base_url(), config.token())
}

// =============================================================================
// Lectures Command
// =============================================================================

pub async fn lectures_cmd(cmd: LecturesCmd, config: &Config, output: &Output) -> ExitCode {
    let client = client_from(config);
    output.info(format!("Loading lectures for course {}", cmd.course));

    let lectures = match client.fetch_lectures(&cmd.course).await {
        Ok(lectures) => lectures,
        Err(e) => return output.error(format!("Failed to load lectures: {}", e), api_exit_code(&e)),
    };
    let progress = match client.fetch_progress(&cmd.course).await {
        Ok(progress) => progress,
        Err(e) => {
            tracing::warn!(error = %e, "progress unavailable");
            Default::default()
        }
    };

    let mut sequencer = LectureSequencer::new(lectures);
    sequencer.apply_progress(&progress.items);
    if let Some(filter) = &cmd.filter {
        sequencer.set_filter(filter);
    }

    let rows: Vec<LectureRow> = sequencer
        .visible()
        .map(|l| {
            let saved = sequencer.progress(&l.lecture_id);
            LectureRow {
                lecture_id: l.lecture_id.to_string(),
                order_index: l.order_index,
                title: l.title.clone(),
                state: sequencer.state_of(&l.lecture_id),
                position: saved.map(|p| p.position).unwrap_or(0.0),
                duration: saved
                    .map(|p| p.duration)
                    .filter(|d| *d > 0.0)
                    .unwrap_or(l.duration),
                is_preview: l.is_preview,
            }
        })
        .collect();

    let printed = output.print_or(&rows, || {
        rows.iter()
            .map(|r| {
                format!(
                    "{:>3}. {:<48} {:<12} {}",
                    r.order_index,
                    r.title,
                    r.state.to_string(),
                    r.lecture_id
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    });
    if let Err(e) = printed {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

// =============================================================================
// Progress Command
// =============================================================================

pub async fn progress_cmd(cmd: ProgressCmd, config: &Config, output: &Output) -> ExitCode {
    let client = client_from(config);

    match client.fetch_progress(&cmd.course).await {
        Ok(progress) => {
            let printed = output.print_or(&progress, || {
                let mut text = progress.summary.to_string();
                for item in &progress.items {
                    let mark = if item.is_complete { "✓" } else { " " };
                    text.push_str(&format!(
                        "\n  [{}] {} {}",
                        mark,
                        item.lecture_id,
                        format_duration(std::time::Duration::from_secs_f64(item.position.max(0.0)))
                    ));
                }
                text
            });
            if let Err(e) = printed {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(format!("Failed to load progress: {}", e), api_exit_code(&e)),
    }
}

// =============================================================================
// Resolve Command
// =============================================================================

pub fn resolve_cmd(cmd: ResolveCmd, config: &Config, output: &Output) -> ExitCode {
    let resolver = client_from(config).resolver();

    match resolver.resolve(&LectureId::new(cmd.lecture), cmd.hint.as_deref()) {
        Ok(source) => {
            let printed = output.print_or(&source, || {
                let kind = if source.is_segmented { "manifest" } else { "direct" };
                format!("{} ({})", source.url, kind)
            });
            if let Err(e) = printed {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(e.to_string(), ExitCode::InvalidArgs),
    }
}

// =============================================================================
// Watch Command
// =============================================================================

#[cfg(unix)]
pub async fn watch_cmd(cmd: WatchCmd, config: &Config, output: &Output) -> ExitCode {
    use crate::app::LearningSession;
    use crate::stream::MpvDevice;
    use crate::ui;

    let player = cmd.player.clone().unwrap_or_else(|| config.player());
    if !MpvDevice::is_available(&player).await {
        return output.error(
            format!("Player '{}' not found. Install mpv first.", player),
            ExitCode::PlayerFailed,
        );
    }

    let client = client_from(config);
    if !client.has_token() {
        output.info("No access token configured (set LECTERN_TOKEN or run `lectern config set --token`)");
    }
    let resolver = client.resolver();

    let device = match MpvDevice::spawn(&player).await {
        Ok(device) => device,
        Err(e) => return output.error(format!("Failed to start player: {}", e), ExitCode::PlayerFailed),
    };

    let options = SessionOptions {
        engine: config.policy.engine_config(),
        policy: config.policy.save_policy(),
        rate: cmd.rate.unwrap_or_else(|| config.rate()),
        initial_lecture: cmd.lecture.map(LectureId::new),
        ..SessionOptions::default()
    };

    let client: Arc<dyn SyncClient> = Arc::new(client);
    let mut session =
        match LearningSession::open(cmd.course.clone(), client, resolver, device, options).await {
            Ok(session) => session,
            Err(SessionError::NotEnrolled(course)) => {
                return output.error(
                    format!("You are not enrolled in course {}", course),
                    ExitCode::NotEnrolled,
                )
            }
            Err(SessionError::Api(e)) => {
                return output.error(format!("Failed to load course: {}", e), api_exit_code(&e))
            }
            Err(e) => return output.error(e.to_string(), ExitCode::Error),
        };

    let mut terminal = match ui::terminal::init_terminal() {
        Ok(terminal) => terminal,
        Err(e) => return output.error(format!("Terminal setup failed: {}", e), ExitCode::Error),
    };
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let keys = ui::terminal::KeyReader::spawn(tx);

    session
        .run(rx, |s| {
            if let Err(e) = terminal.draw(|frame| ui::render_session(frame, s)) {
                tracing::debug!(error = %e, "redraw failed");
            }
        })
        .await;

    keys.stop();
    if let Err(e) = ui::terminal::restore_terminal(&mut terminal) {
        tracing::warn!(error = %e, "terminal restore failed");
    }

    let summary = session.summary().clone();
    output.info(format!("Session ended. {}", summary));
    ExitCode::Success
}

#[cfg(not(unix))]
pub async fn watch_cmd(_cmd: WatchCmd, _config: &Config, output: &Output) -> ExitCode {
    output.error("Interactive playback needs mpv IPC, which is only supported on unix", ExitCode::PlayerFailed)
}

// =============================================================================
// Config Command
// =============================================================================

pub fn config_cmd(cmd: ConfigCmd, config: Config, path: Option<&Path>, output: &Output) -> ExitCode {
    match cmd {
        ConfigCmd::Show => {
            let view = config_view(&config, path);
            if let Err(e) = output.print(&view) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        ConfigCmd::Set(set) => match apply_config_set(config, set, path) {
            Ok(config) => {
                output.info("Configuration saved");
                let view = config_view(&config, path);
                if let Err(e) = output.print(&view) {
                    return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
                }
                ExitCode::Success
            }
            Err(e) => output.error(format!("{:#}", e), ExitCode::InvalidArgs),
        },
    }
}

fn config_view(config: &Config, path: Option<&Path>) -> ConfigView {
    ConfigView {
        path: path
            .map(Path::to_path_buf)
            .or_else(Config::path)
            .map(|p| p.display().to_string()),
        api_base_url: config.api_base_url(),
        token: config.token().map(|t| redact(&t)),
        player: config.player(),
        default_rate: config.rate().to_string(),
    }
}

fn apply_config_set(mut config: Config, set: ConfigSetCmd, path: Option<&Path>) -> anyhow::Result<Config> {
    if set.is_empty() {
        anyhow::bail!("Nothing to set (use --api-url, --token, --player or --rate)");
    }
    if let Some(url) = set.api_url {
        let url = url.trim().trim_end_matches('/').to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("API URL must start with http:// or https://");
        }
        config.api_base_url = Some(url);
    }
    if let Some(token) = set.token {
        config.token = Some(token.trim().to_string()).filter(|t| !t.is_empty());
    }
    if let Some(player) = set.player {
        config.player = Some(player);
    }
    if let Some(rate) = set.rate {
        config.default_rate = Some(rate);
    }

    match path {
        Some(path) => config.save_to(path),
        None => config.save(),
    }
    .context("saving configuration")?;
    Ok(config)
}
