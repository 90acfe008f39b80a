mod item_ops;
mod modifiers;

use std::fmt;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::local_now;
use crate::render::Renderer;

/// Every command busybee understands, in `_commands` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Add,
    List,
    Info,
    Modify,
    Done,
    Undone,
    Delete,
    Preview,
    Frequencies,
    Categories,
    Commands,
    Show,
    Help,
    Version,
}

impl Command {
    pub const ALL: [Command; 14] = [
        Command::Add,
        Command::List,
        Command::Info,
        Command::Modify,
        Command::Done,
        Command::Undone,
        Command::Delete,
        Command::Preview,
        Command::Frequencies,
        Command::Categories,
        Command::Commands,
        Command::Show,
        Command::Help,
        Command::Version,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Add => "add",
            Command::List => "list",
            Command::Info => "info",
            Command::Modify => "modify",
            Command::Done => "done",
            Command::Undone => "undone",
            Command::Delete => "delete",
            Command::Preview => "preview",
            Command::Frequencies => "frequencies",
            Command::Categories => "categories",
            Command::Commands => "_commands",
            Command::Show => "_show",
            Command::Help => "help",
            Command::Version => "version",
        }
    }

    /// Exact name or unique prefix (`pre` for `preview`).
    pub fn resolve(token: &str) -> Option<Self> {
        if token.is_empty() {
            return None;
        }
        if let Some(exact) = Self::ALL.into_iter().find(|c| c.name() == token) {
            return Some(exact);
        }

        let mut matches = Self::ALL
            .into_iter()
            .filter(|c| c.name().starts_with(token));
        let first = matches.next()?;
        if matches.next().is_some() {
            None
        } else {
            Some(first)
        }
    }

    /// Whether terms before the command (a filter or an item id) make sense.
    pub fn accepts_filter(self) -> bool {
        matches!(
            self,
            Command::List
                | Command::Info
                | Command::Modify
                | Command::Done
                | Command::Undone
                | Command::Delete
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[instrument(skip(store, cfg, renderer, inv), fields(command = %inv.command))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = local_now();
    let now_utc = Utc::now();
    let filter_terms = inv.filter_terms.as_slice();
    let args = inv.command_args.as_slice();

    debug!(
        filter = ?inv.filter_terms,
        args = ?inv.command_args,
        "dispatching command"
    );

    match inv.command {
        Command::Add => item_ops::cmd_add(store, cfg, args, now, now_utc),
        Command::List => item_ops::cmd_list(store, renderer, filter_terms, args, now),
        Command::Info => item_ops::cmd_info(store, renderer, filter_terms, args),
        Command::Modify => item_ops::cmd_modify(store, cfg, filter_terms, args, now, now_utc),
        Command::Done => item_ops::cmd_set_complete(store, filter_terms, args, true, now_utc),
        Command::Undone => item_ops::cmd_set_complete(store, filter_terms, args, false, now_utc),
        Command::Delete => item_ops::cmd_delete(store, filter_terms, args),
        Command::Preview => item_ops::cmd_preview(cfg, renderer, args, now),
        Command::Frequencies => item_ops::cmd_frequencies(),
        Command::Categories => item_ops::cmd_categories(store),
        Command::Commands => cmd_commands(),
        Command::Show => cmd_show(cfg),
        Command::Help => cmd_help(),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn cmd_commands() -> anyhow::Result<()> {
    for command in Command::ALL {
        println!("{command}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (k, v) in entries {
        println!("{k}={v}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("usage: busybee [options] [filter] <command> [args]");
    println!();
    println!("  add task|event <name> [due:DATE] [repeat:FREQ times:N] [priority:P]");
    println!("                 [place:TEXT] [notes:TEXT] [+category]");
    println!("  list [filter]      kind: on: from: to: status: series: +category +TODAY");
    println!("  info <id>");
    println!("  modify <id> [modifiers]");
    println!("  done <id> | undone <id>");
    println!("  delete <id> [series]");
    println!("  preview <date> repeat:FREQ times:N");
    println!("  frequencies | categories | _show | version");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Command;

    #[test]
    fn unique_prefixes_resolve() {
        assert_eq!(Command::resolve("pre"), Some(Command::Preview));
        assert_eq!(Command::resolve("fr"), Some(Command::Frequencies));
        assert_eq!(Command::resolve("und"), Some(Command::Undone));
        assert_eq!(Command::resolve("done"), Some(Command::Done));
        assert_eq!(Command::resolve("_s"), Some(Command::Show));
        assert_eq!(Command::resolve("d"), None);
        assert_eq!(Command::resolve("rent"), None);
        assert_eq!(Command::resolve(""), None);
    }

    #[test]
    fn names_round_trip_through_resolve() {
        for command in Command::ALL {
            assert_eq!(Command::resolve(command.name()), Some(command));
        }
    }

    #[test]
    fn only_item_commands_take_a_filter() {
        assert!(Command::List.accepts_filter());
        assert!(Command::Delete.accepts_filter());
        assert!(!Command::Add.accepts_filter());
        assert!(!Command::Preview.accepts_filter());
    }
}
