pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod filter;
pub mod item;
pub mod recurrence;
pub mod render;
pub mod series;

use std::ffi::OsString;

use anyhow::Context;
use tracing::{
  debug,
  info
};

use crate::cli::BusybeeCli;
use crate::config::Config;
use crate::datastore::DataStore;

/// Entry point for the `busybee`
/// binary.
#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let mut cli =
    cli::parse_command_line(raw_args);
  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;
  info!(
    version = env!("CARGO_PKG_VERSION"),
    "busybee starting"
  );

  let cfg = load_config(&cli)?;
  let store = open_store(&cfg, &cli)?;
  let mut renderer =
    render::Renderer::new(&cfg)?;

  let rest = std::mem::take(&mut cli.rest);
  let inv =
    cli::Invocation::parse(&cfg, rest)?;
  commands::dispatch(
    &store,
    &cfg,
    &mut renderer,
    inv
  )
}

/// The busybeerc file with `rc.`
/// overrides applied, positional ones
/// first.
fn load_config(
  cli: &BusybeeCli
) -> anyhow::Result<Config> {
  let mut cfg =
    Config::load(cli.busybeerc.as_deref())?;
  cfg.apply_overrides(
    cli.rc_overrides.iter().map(
      |rc| (rc.key.clone(), rc.value.clone())
    )
  );
  Ok(cfg)
}

/// Opens the data directory and drops
/// recurrence records no item points at.
fn open_store(
  cfg: &Config,
  cli: &BusybeeCli
) -> anyhow::Result<DataStore> {
  let data_dir =
    config::resolve_data_dir(
      cfg,
      cli.data.as_deref()
    )
    .context("no usable data directory")?;

  let store = DataStore::open(&data_dir)
    .with_context(|| {
      format!(
        "cannot open busybee data in {}",
        data_dir.display()
      )
    })?;

  store.purge_orphan_recurrences()?;
  debug!(dir = %data_dir.display(), "store ready");
  Ok(store)
}
