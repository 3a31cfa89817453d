pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod engine;
pub mod habit;
pub mod remote;
pub mod render;
pub mod session;
pub mod store;
pub mod view;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use engine::{
  CreateFailurePolicy,
  Intent,
  SyncEngine
};
pub use remote::{
  HttpRemote,
  RemoteService
};
pub use store::{
  LoadStatus,
  LocalStore
};
pub use view::DayView;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting habitual CLI"
  );

  let mut cfg = config::Config::load(
    cli.habitrc.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
      .chain(cli.api_url.map(|url| {
        ("api.url".to_string(), url)
      }))
  );
  let settings = cfg
    .settings()
    .context("invalid configuration")?;
  debug!(
    api = %settings.remote.base_url,
    zone = %settings.zone,
    policy = %settings.create_failure,
    "resolved settings"
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let session =
    session::SessionFile::in_dir(
      &data_dir
    );
  let restored = session.load();
  debug!(
    file = %session.path().display(),
    screen = restored.screen.as_str(),
    "restored session"
  );

  let now = Utc::now();
  let store =
    store::LocalStore::new(
      settings.zone,
      now
    )
    .with_screen(restored.screen);
  let remote = remote::HttpRemote::new(
    &settings.remote
  )
  .with_context(|| {
    format!(
      "failed to set up client for \
       {}",
      settings.remote.base_url
    )
  })?;
  let engine = engine::SyncEngine::new(
    store,
    remote,
    settings.create_failure
  );
  let renderer =
    render::Renderer::new(&settings);

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;
  runtime.block_on(
    commands::dispatch(
      &engine,
      &renderer,
      cli.command,
      now
    )
  )?;

  session.save(
    &session::NavigationState {
      screen: engine
        .read(|store| store.screen())
    }
  )?;

  info!("done");
  Ok(())
}
