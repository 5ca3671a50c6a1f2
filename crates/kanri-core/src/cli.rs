use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

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
    name = "kanri",
    version,
    about = "kanri: projects, task lists, tasks and tags",
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

    #[arg(long = "kanrirc", global = true)]
    pub kanrirc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Projects.
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Task lists inside a project.
    #[command(subcommand)]
    List(ListCommand),
    #[command(subcommand)]
    Task(TaskCommand),
    #[command(subcommand)]
    Subtask(SubTaskCommand),
    #[command(subcommand)]
    Tag(TagCommand),
    /// Show a view: project, tasklist, today, overdue or completed.
    View(ViewArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProjectCommand {
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    List,
    Rename {
        id: String,
        name: String,
    },
    Rm {
        id: String,
    },
    Move {
        id: String,
        index: usize,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ListCommand {
    Add {
        project: String,
        name: String,
    },
    Rename {
        id: String,
        name: String,
    },
    Rm {
        id: String,
    },
    /// Move a list to another project, or reorder it.
    Move {
        id: String,
        project: String,
        #[arg(default_value_t = usize::MAX)]
        index: usize,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct TaskFields {
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub priority: Option<u8>,
    /// Plan start: today, tomorrow, +3d, 2026-05-01, ...
    #[arg(long)]
    pub start: Option<String>,
    #[arg(long)]
    pub due: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    /// Add a task; `#tag` words in the text become tags.
    Add {
        list: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        #[command(flatten)]
        fields: TaskFields,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: TaskFields,
    },
    /// Toggle completion.
    Done {
        id: String,
    },
    Rm {
        id: String,
    },
    Move {
        id: String,
        list: String,
        #[arg(default_value_t = usize::MAX)]
        index: usize,
    },
    Tag {
        id: String,
        tag: String,
    },
    Untag {
        id: String,
        tag: String,
    },
    Info {
        id: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubTaskCommand {
    Add {
        task: String,
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// Toggle completion.
    Done {
        id: String,
    },
    Rm {
        id: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TagCommand {
    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    List {
        /// Only tags whose name contains this.
        query: Option<String>,
    },
    Rename {
        id: String,
        name: String,
    },
    Rm {
        id: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ViewArgs {
    pub kind: Option<String>,
    /// Project or list id for container views.
    pub id: Option<String>,
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
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls `rc.key=value` (or `rc.key:value`)
/// words out of the argument list.
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

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<OsString> {
        words.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_lifted_out() {
        let pre = preprocess_args(&args(&[
            "kanri",
            "rc.backend=memory",
            "tag",
            "rc.color:off",
            "list",
        ]))
        .expect("preprocess");
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.backend".to_string(), "memory".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
        assert_eq!(pre.cleaned_args, args(&["kanri", "tag", "list"]));
    }

    #[test]
    fn parses_task_add_with_fields() {
        let cli = GlobalCli::parse_from(args(&[
            "kanri", "task", "add", "abc", "buy", "milk", "#shop", "--due", "tomorrow", "-v",
        ]));
        assert_eq!(cli.verbose, 1);
        let Some(Command::Task(TaskCommand::Add { list, text, fields })) = cli.command else {
            panic!("expected task add");
        };
        assert_eq!(list, "abc");
        assert_eq!(text, vec!["buy", "milk", "#shop"]);
        assert_eq!(fields.due.as_deref(), Some("tomorrow"));
    }
}
