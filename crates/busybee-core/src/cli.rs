use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;
use crate::config::Config;

/// A config override, from `--rc KEY=VALUE` or a positional `rc.KEY=VALUE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcOverride {
    pub key: String,
    pub value: String,
}

impl RcOverride {
    /// Positional form, `rc.KEY=VALUE` or `rc.KEY:VALUE`.
    fn from_positional(token: &str) -> Option<Self> {
        let rest = token.strip_prefix("rc.")?;
        let (key, value) = rest.split_once('=').or_else(|| rest.split_once(':'))?;
        Some(Self {
            key: key.trim().to_string(),
            value: value.trim().to_string(),
        })
    }
}

impl FromStr for RcOverride {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: key.trim().to_string(),
            value: value.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "busybee",
    version,
    about = "Tasks, events and recurring series from the command line",
    disable_help_subcommand = true
)]
pub struct BusybeeCli {
    /// More log output (repeatable).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Less log output (repeatable).
    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    /// Override a busybeerc setting.
    #[arg(
        long = "rc",
        value_name = "KEY=VALUE",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<RcOverride>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<RcOverride>,

    /// Config file to load instead of the usual lookup.
    #[arg(long = "busybeerc", value_name = "PATH")]
    pub busybeerc: Option<PathBuf>,

    /// Data directory holding items.data and recurrences.data.
    #[arg(long = "data", value_name = "DIR")]
    pub data: Option<PathBuf>,

    /// `[filter] <command> [args]`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

/// Parses the process arguments. Positional `rc.` overrides are taken out
/// before clap sees the arguments and come before any `--rc` flags.
#[tracing::instrument(skip_all)]
pub fn parse_command_line(raw: Vec<OsString>) -> BusybeeCli {
    let (args, mut overrides) = split_positional_overrides(raw);
    let mut cli = BusybeeCli::parse_from(args);
    overrides.append(&mut cli.rc_overrides);
    cli.rc_overrides = overrides;
    cli
}

fn split_positional_overrides(raw: Vec<OsString>) -> (Vec<OsString>, Vec<RcOverride>) {
    let mut args = Vec::with_capacity(raw.len());
    let mut overrides = Vec::new();

    for (idx, arg) in raw.into_iter().enumerate() {
        // argv[0] is the binary.
        if idx > 0
            && let Some(rc) = arg.to_str().and_then(RcOverride::from_positional)
        {
            debug!(key = %rc.key, value = %rc.value, "positional rc override");
            overrides.push(rc);
            continue;
        }
        args.push(arg);
    }

    (args, overrides)
}

fn default_log_level(verbose: u8, quiet: u8) -> &'static str {
    match (quiet, verbose) {
        (2.., _) => "error",
        (1, _) => "warn",
        (0, 0) => "warn",
        (0, 1) => "info",
        (0, 2) => "debug",
        (0, _) => "trace",
    }
}

/// Logs go to stderr. `RUST_LOG` wins over the `-v`/`-q` counts.
pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_log_level(verbose, quiet))
            .map_err(|e| anyhow!("invalid log filter: {e}"))?,
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = installed {
        debug!(error = %err, "tracing subscriber already installed");
    }

    Ok(())
}

/// `[filter] <command> [args]` split on the first token naming a command.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub filter_terms: Vec<String>,
    pub command: Command,
    pub command_args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(cfg, rest))]
    pub fn parse(cfg: &Config, rest: Vec<OsString>) -> anyhow::Result<Self> {
        let tokens: Vec<String> = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        if tokens.is_empty() {
            let name = cfg
                .get("default.command")
                .unwrap_or_else(|| Command::List.name().to_string());
            let command = Command::resolve(name.trim())
                .ok_or_else(|| anyhow!("default.command is not a busybee command: {name}"))?;
            return Ok(Self {
                filter_terms: vec![],
                command,
                command_args: vec![],
            });
        }

        // `busybee 7` shows item 7.
        if let [only] = tokens.as_slice()
            && only.parse::<u64>().is_ok()
        {
            return Ok(Self {
                filter_terms: tokens,
                command: Command::Info,
                command_args: vec![],
            });
        }

        let found = tokens
            .iter()
            .enumerate()
            .find_map(|(idx, tok)| Command::resolve(tok).map(|command| (idx, command)));

        let Some((idx, command)) = found else {
            debug!("no command token; listing with all terms as filter");
            return Ok(Self {
                filter_terms: tokens,
                command: Command::List,
                command_args: vec![],
            });
        };

        if idx > 0 && !command.accepts_filter() {
            bail!(
                "{command} does not take a filter, got: {}",
                tokens[..idx].join(" ")
            );
        }

        let command_args = tokens[idx + 1..].to_vec();
        let mut filter_terms = tokens;
        filter_terms.truncate(idx);
        debug!(%command, ?filter_terms, ?command_args, "split invocation");

        Ok(Self {
            filter_terms,
            command,
            command_args,
        })
    }
}
