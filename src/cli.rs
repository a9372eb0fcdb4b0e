//! CLI - Command Line Interface for Lectern
//!
//! Every read-only query is scriptable and JSON-parseable; `watch` runs an
//! interactive learning session driving a local mpv.
//!
//! # Examples
//!
//! ```bash
//! # Inspect a course
//! lectern lectures 65f1c2 --json
//! lectern progress 65f1c2
//!
//! # Where would a lecture stream from?
//! lectern resolve 66a0ff --hint https://cdn.example/intro/index.m3u8
//!
//! # Learn
//! lectern watch 65f1c2 --rate 1.25
//! ```

use clap::{ArgAction, Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::models::{LectureState, PlaybackRate};

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network error
    NetworkError = 3,
    /// Missing or rejected credentials
    Unauthorized = 4,
    /// Learner is not enrolled in the course
    NotEnrolled = 5,
    /// Player could not be started
    PlayerFailed = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// Lectern - video lectures with progress that follows you
#[derive(Parser, Debug)]
#[command(
    name = "lectern",
    version,
    about = "Watch course lectures with synced progress",
    long_about = "Streams a course's video lectures in mpv, keeps your watch \
                  position in sync with the learning platform, and unlocks \
                  each lecture once the previous one is complete.",
    after_help = "EXAMPLES:\n\
                  lectern lectures COURSE            List lectures and their state\n\
                  lectern progress COURSE --json     Course progress summary\n\
                  lectern watch COURSE               Start learning\n\
                  lectern config set --token TOKEN   Store your access token"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }

    /// Default tracing filter for the verbosity level
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "lectern=warn",
            1 => "lectern=info",
            _ => "lectern=debug",
        }
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List a course's lectures and whether each can be played
    #[command(visible_alias = "ls")]
    Lectures(LecturesCmd),

    /// Show course progress
    #[command(visible_alias = "p")]
    Progress(ProgressCmd),

    /// Show the stream URL a lecture would play from
    Resolve(ResolveCmd),

    /// Start an interactive learning session
    #[command(visible_alias = "w")]
    Watch(WatchCmd),

    /// Show or change configuration
    #[command(subcommand)]
    Config(ConfigCmd),
}

/// List lectures of a course
#[derive(Args, Debug)]
pub struct LecturesCmd {
    /// Course ID
    #[arg(required = true)]
    pub course: String,

    /// Only lectures whose title contains this text
    #[arg(long, short = 'f')]
    pub filter: Option<String>,
}

/// Course progress summary
#[derive(Args, Debug)]
pub struct ProgressCmd {
    /// Course ID
    #[arg(required = true)]
    pub course: String,
}

/// Resolve a lecture's stream source
#[derive(Args, Debug)]
pub struct ResolveCmd {
    /// Lecture ID
    #[arg(required = true)]
    pub lecture: String,

    /// Raw source URL of the lecture (decides manifest vs direct)
    #[arg(long)]
    pub hint: Option<String>,
}

/// Interactive learning session
#[derive(Args, Debug)]
pub struct WatchCmd {
    /// Course ID
    #[arg(required = true)]
    pub course: String,

    /// Open this lecture instead of the first incomplete one
    #[arg(long, short = 'l')]
    pub lecture: Option<String>,

    /// Playback speed (0.75, 1, 1.25, 1.5, 2)
    #[arg(long, short = 'r')]
    pub rate: Option<PlaybackRate>,

    /// mpv binary to use
    #[arg(long)]
    pub player: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// Print the effective configuration
    Show,
    /// Update configuration values
    Set(ConfigSetCmd),
}

#[derive(Args, Debug)]
pub struct ConfigSetCmd {
    /// Learning platform API base URL
    #[arg(long)]
    pub api_url: Option<String>,

    /// Access token
    #[arg(long)]
    pub token: Option<String>,

    /// mpv binary path
    #[arg(long)]
    pub player: Option<String>,

    /// Default playback speed
    #[arg(long)]
    pub rate: Option<PlaybackRate>,
}

impl ConfigSetCmd {
    pub fn is_empty(&self) -> bool {
        self.api_url.is_none() && self.token.is_none() && self.player.is_none() && self.rate.is_none()
    }
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

/// One row of `lectern lectures`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LectureRow {
    pub lecture_id: String,
    pub order_index: u32,
    pub title: String,
    pub state: LectureState,
    pub position: f64,
    pub duration: f64,
    pub is_preview: bool,
}

/// Effective configuration, token redacted
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigView {
    pub path: Option<String>,
    pub api_base_url: String,
    pub token: Option<String>,
    pub player: String,
    pub default_rate: String,
}

/// Show only the edges of a secret
pub fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print human text, or the data as JSON in JSON mode
    pub fn print_or<T: Serialize>(&self, data: T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
        if self.json {
            self.print(data)
        } else {
            println!("{}", text());
            Ok(())
        }
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
