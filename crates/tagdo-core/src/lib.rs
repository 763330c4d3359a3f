pub mod cli;
pub mod commands;
pub mod config;
pub mod due;
pub mod render;
pub mod shell;
pub mod storage;
pub mod store;
pub mod tags;
pub mod task;
pub mod theme;
pub mod timer;
pub mod view;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting tagdo");
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.rcfile.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let mut prefs = storage::FileStore::open(&data_dir)
        .with_context(|| format!("failed to open data directory {}", data_dir.display()))?;
    let theme = theme::load_theme(&prefs, cfg.system_theme());
    let mut renderer = render::Renderer::new(&cfg, theme);
    let mut store = store::TaskStore::open(prefs.clone());

    let command = match cli.command {
        Some(command) => command,
        None => {
            let name = cfg
                .get("default.command")
                .unwrap_or_else(|| "list".to_string());
            cli::Command::from_default(&name)?
        }
    };

    let mut ctx = commands::CommandContext {
        store: &mut store,
        prefs: &mut prefs,
        cfg: &cfg,
        renderer: &mut renderer,
        today: due::today_local(),
    };
    commands::dispatch(&mut ctx, command)?;

    info!("done");
    Ok(())
}
