use std::io;

use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::cli::{Command, ThemeAction};
use crate::config::Config;
use crate::due::parse_due_input;
use crate::render::Renderer;
use crate::shell::Shell;
use crate::storage::KeyValueStore;
use crate::store::TaskStore;
use crate::tags::suggest_tags;
use crate::theme::{Theme, load_theme, save_theme, toggle_theme};
use crate::view::{self, StatusFilter, ViewState};

/// Everything a command needs: the task store, the preference store, and the
/// renderer configured for the active theme.
pub struct CommandContext<'a> {
    pub store: &'a mut TaskStore,
    pub prefs: &'a mut dyn KeyValueStore,
    pub cfg: &'a Config,
    pub renderer: &'a mut Renderer,
    pub today: NaiveDate,
}

#[instrument(skip(ctx))]
pub fn dispatch(ctx: &mut CommandContext<'_>, command: Command) -> anyhow::Result<()> {
    debug!(today = %ctx.today, "dispatching command");

    match command {
        Command::Add { text, due } => cmd_add(ctx, &text.join(" "), due.as_deref()),
        Command::List { status, tag } => cmd_list(ctx, status, tag),
        Command::Toggle { id } => cmd_toggle(ctx, &id),
        Command::Delete { id } => cmd_delete(ctx, &id),
        Command::Edit { id, text } => cmd_edit(ctx, &id, &text.join(" ")),
        Command::Pin { id } => cmd_pin(ctx, &id),
        Command::Due { id, date, clear } => cmd_due(ctx, &id, date.as_deref(), clear),
        Command::Tags => cmd_tags(ctx),
        Command::Stats => cmd_stats(ctx),
        Command::Suggest { input } => cmd_suggest(ctx, &input.join(" ")),
        Command::ClearCompleted => cmd_clear_completed(ctx),
        Command::Theme { action } => cmd_theme(ctx, action),
        Command::Shell => cmd_shell(ctx),
    }
}

fn cmd_add(ctx: &mut CommandContext<'_>, raw: &str, due: Option<&str>) -> anyhow::Result<()> {
    info!("command add");
    let due_at = due
        .map(|input| parse_due_input(input, ctx.today))
        .transpose()?;

    match ctx.store.add(raw, due_at) {
        Some(id) => println!("Added task {}.", id.short()),
        None => println!("Nothing added: the task has no text besides tags."),
    }
    Ok(())
}

fn cmd_list(
    ctx: &mut CommandContext<'_>,
    status: StatusFilter,
    tag: Option<String>,
) -> anyhow::Result<()> {
    let state = ViewState { status, tag };
    let shown = view::derive(ctx.store.tasks(), &state);
    debug!(shown = shown.len(), total = ctx.store.len(), "listing tasks");
    ctx.renderer.print_task_table(&shown, ctx.today)
}

fn cmd_toggle(ctx: &mut CommandContext<'_>, reference: &str) -> anyhow::Result<()> {
    let id = ctx.store.resolve(reference)?;
    ctx.store.toggle(&id);
    if let Some(task) = ctx.store.get(&id) {
        let state = if task.completed { "completed" } else { "active" };
        println!("Task {} is now {state}.", id.short());
    }
    Ok(())
}

fn cmd_delete(ctx: &mut CommandContext<'_>, reference: &str) -> anyhow::Result<()> {
    let id = ctx.store.resolve(reference)?;
    if let Some(removed) = ctx.store.delete(&id) {
        println!("Deleted task {} '{}'.", id.short(), removed.task.text);
    }
    Ok(())
}

fn cmd_edit(ctx: &mut CommandContext<'_>, reference: &str, raw: &str) -> anyhow::Result<()> {
    let id = ctx.store.resolve(reference)?;
    if ctx.store.edit(&id, raw) {
        println!("Edited task {}.", id.short());
    } else {
        println!("Task {} unchanged: the new text has nothing besides tags.", id.short());
    }
    Ok(())
}

fn cmd_pin(ctx: &mut CommandContext<'_>, reference: &str) -> anyhow::Result<()> {
    let id = ctx.store.resolve(reference)?;
    ctx.store.toggle_pin(&id);
    if let Some(task) = ctx.store.get(&id) {
        let state = if task.pinned { "pinned" } else { "unpinned" };
        println!("Task {} {state}.", id.short());
    }
    Ok(())
}

fn cmd_due(
    ctx: &mut CommandContext<'_>,
    reference: &str,
    date: Option<&str>,
    clear: bool,
) -> anyhow::Result<()> {
    let id = ctx.store.resolve(reference)?;
    let due_at = if clear {
        None
    } else {
        date.map(|input| parse_due_input(input, ctx.today))
            .transpose()?
    };

    ctx.store.set_due_date(&id, due_at);
    match due_at {
        Some(date) => println!("Task {} due {}.", id.short(), date.format("%Y-%m-%d")),
        None => println!("Task {} has no due date.", id.short()),
    }
    Ok(())
}

fn cmd_tags(ctx: &mut CommandContext<'_>) -> anyhow::Result<()> {
    let counts = view::tag_counts(ctx.store.tasks());
    ctx.renderer.print_tag_counts(&counts)
}

fn cmd_stats(ctx: &mut CommandContext<'_>) -> anyhow::Result<()> {
    ctx.renderer.print_counts(view::counts(ctx.store.tasks()))
}

fn cmd_suggest(ctx: &mut CommandContext<'_>, input: &str) -> anyhow::Result<()> {
    let known = view::known_tags(ctx.store.tasks());
    for tag in suggest_tags(input, &known) {
        println!("#{tag}");
    }
    Ok(())
}

fn cmd_clear_completed(ctx: &mut CommandContext<'_>) -> anyhow::Result<()> {
    let removed = ctx.store.clear_completed();
    println!("Removed {removed} completed task(s).");
    Ok(())
}

fn cmd_theme(ctx: &mut CommandContext<'_>, action: ThemeAction) -> anyhow::Result<()> {
    let system = ctx.cfg.system_theme();
    let theme = match action {
        ThemeAction::Show => load_theme(ctx.prefs, system),
        ThemeAction::Toggle => toggle_theme(ctx.prefs, system),
        ThemeAction::Light => set_theme(ctx.prefs, Theme::Light),
        ThemeAction::Dark => set_theme(ctx.prefs, Theme::Dark),
    };
    ctx.renderer.set_theme(theme);
    println!("{theme}");
    Ok(())
}

fn set_theme(prefs: &mut dyn KeyValueStore, theme: Theme) -> Theme {
    save_theme(prefs, theme);
    theme
}

fn cmd_shell(ctx: &mut CommandContext<'_>) -> anyhow::Result<()> {
    info!("starting interactive shell");
    let window = ctx.cfg.undo_window()?;
    let system = ctx.cfg.system_theme();
    let mut shell = Shell::new(
        ctx.store,
        ctx.prefs,
        ctx.renderer.clone(),
        window,
        system,
    );
    let stdin = io::stdin();
    shell.run(stdin.lock(), io::stdout())
}
