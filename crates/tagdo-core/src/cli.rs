use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::view::StatusFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tagdo",
    version,
    about = "Tagged to-do list for the terminal",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Override a config key for this run. May be repeated.
    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    /// Config file to read instead of ~/.tagdorc.
    #[arg(long = "rcfile", global = true)]
    pub rcfile: Option<PathBuf>,

    /// Data directory to use instead of data.location.
    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add a task. Words starting with # become tags.
    Add {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Due date: YYYY-MM-DD, today, tomorrow, a weekday, +Nd, in Nw.
        #[arg(long)]
        due: Option<String>,
    },

    /// List tasks, pinned first.
    List {
        #[arg(long, value_enum, default_value_t = StatusFilter::All)]
        status: StatusFilter,
        /// Only tasks carrying this tag.
        #[arg(long)]
        tag: Option<String>,
    },

    /// Flip a task between active and completed.
    Toggle { id: String },

    /// Delete a task.
    Delete { id: String },

    /// Replace a task's text (and with it, its tags).
    Edit {
        id: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Pin or unpin a task.
    Pin { id: String },

    /// Set or clear a task's due date.
    Due {
        id: String,
        #[arg(required_unless_present = "clear", conflicts_with = "clear")]
        date: Option<String>,
        #[arg(long)]
        clear: bool,
    },

    /// Tags in use, most used first.
    Tags,

    /// Active and completed totals.
    Stats,

    /// Suggest tags for a partially typed task.
    Suggest {
        #[arg(num_args = 0..)]
        input: Vec<String>,
    },

    /// Delete every completed task.
    ClearCompleted,

    /// Show or change the light/dark preference.
    Theme {
        #[arg(value_enum, default_value_t = ThemeAction::Show)]
        action: ThemeAction,
    },

    /// Interactive session with undo for deletions.
    Shell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ThemeAction {
    Show,
    Toggle,
    Light,
    Dark,
}

impl Command {
    /// The command run when none is given on the command line.
    pub fn from_default(name: &str) -> anyhow::Result<Self> {
        match name.trim() {
            "list" => Ok(Command::List {
                status: StatusFilter::All,
                tag: None,
            }),
            "tags" => Ok(Command::Tags),
            "stats" => Ok(Command::Stats),
            "shell" => Ok(Command::Shell),
            other => Err(anyhow!("unsupported default.command: {other}")),
        }
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls `rc.key=value` / `rc.key:value` words out of the argument list so
/// they can be given anywhere on the command line.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
