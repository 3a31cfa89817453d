use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::datetime::WeekdayCode;
use crate::habit::Category;

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
        let key = k.trim();
        if key.is_empty() {
            return Err(anyhow!("empty key in override: {s}"));
        }
        Ok(Self {
            key: key.to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "habit",
    version,
    about = "Habitual: plan your week, tick off today",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "habitrc", global = true)]
    pub habitrc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Service root, overrides `api.url`
    #[arg(long = "api-url", global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the habits planned for a day and their progress
    #[command(visible_alias = "day")]
    Today {
        /// today, yesterday, tomorrow, +Nd, -Nd, a weekday name or YYYY-MM-DD
        #[arg(long = "date", short = 'd')]
        date: Option<String>,
    },

    /// Add a habit to the library
    Add {
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,

        #[arg(
            long = "category",
            short = 'c',
            value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Category>())
        )]
        category: Option<Category>,
    },

    /// Remove a habit from the library
    #[command(visible_alias = "delete")]
    Rm { id: String },

    /// Toggle a habit's completion on a day
    Done {
        id: String,

        #[arg(long = "date", short = 'd')]
        date: Option<String>,
    },

    /// Show or edit the weekly plan
    Plan {
        #[command(subcommand)]
        action: Option<PlanAction>,
    },

    /// List every habit in the library
    #[command(visible_alias = "ls")]
    Library,

    /// Per-category progress for a day
    Stats {
        #[arg(long = "date", short = 'd')]
        date: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    /// Assign or unassign a habit on a weekday
    Toggle {
        id: String,

        #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<WeekdayCode>()))]
        day: WeekdayCode,
    },

    /// Copy Monday's habits onto every day of the week
    Replicate,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Today { .. } => "today",
            Command::Add { .. } => "add",
            Command::Rm { .. } => "rm",
            Command::Done { .. } => "done",
            Command::Plan { .. } => "plan",
            Command::Library => "library",
            Command::Stats { .. } => "stats",
        }
    }

    /// The `--date` expression, for commands that look at a specific day.
    pub fn date_expr(&self) -> Option<&str> {
        match self {
            Command::Today { date } | Command::Done { date, .. } | Command::Stats { date } => {
                date.as_deref()
            }
            _ => None,
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
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
