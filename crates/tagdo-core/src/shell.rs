use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use chrono::NaiveDate;
use clap::ValueEnum;
use tracing::{debug, info, warn};

use crate::due::{parse_due_input, today_local};
use crate::render::Renderer;
use crate::storage::KeyValueStore;
use crate::store::TaskStore;
use crate::tags::suggest_tags;
use crate::theme::{Theme, load_theme, save_theme, toggle_theme};
use crate::timer::UndoWindow;
use crate::view::{self, StatusFilter, ViewState};

const HELP: &str = "\
commands:
  add <text> [due:<when>]   add a task; #words become tags
  list                      show tasks with the current filters
  filter <all|active|completed>
  tag <tag|none>            show only tasks with this tag
  toggle <id>               mark done / not done
  edit <id> <text>          replace the text and tags
  pin <id>                  pin or unpin
  due <id> <when|none>      set or clear the due date
  delete <id>               delete (undo stays available for a short while)
  undo                      restore the last deleted task
  clear                     delete all completed tasks
  tags                      tag usage
  stats                     active / completed totals
  suggest <text>            tag completions for a partial #tag
  theme [toggle|light|dark]
  help
  quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Line-oriented session over one task store. Keeps the list filters and the
/// undo window for the lifetime of the session.
pub struct Shell<'a> {
    store: &'a mut TaskStore,
    prefs: &'a mut dyn KeyValueStore,
    renderer: Renderer,
    system_theme: Option<Theme>,
    view: ViewState,
    undo: UndoWindow,
}

impl<'a> Shell<'a> {
    pub fn new(
        store: &'a mut TaskStore,
        prefs: &'a mut dyn KeyValueStore,
        renderer: Renderer,
        undo_window: Duration,
        system_theme: Option<Theme>,
    ) -> Self {
        Self {
            store,
            prefs,
            renderer,
            system_theme,
            view: ViewState::default(),
            undo: UndoWindow::new(undo_window),
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Reads commands until `quit` or end of input. A failing command is
    /// reported and the session carries on.
    #[tracing::instrument(skip_all)]
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut out: W) -> anyhow::Result<()> {
        writeln!(out, "tagdo shell. Type `help` for commands.")?;
        write!(out, "> ")?;
        out.flush()?;

        for line in input.lines() {
            let line = line?;
            match self.handle_line(&mut out, &line, Instant::now(), today_local()) {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(err) => writeln!(out, "error: {err:#}")?,
            }
            write!(out, "> ")?;
            out.flush()?;
        }

        self.close();
        writeln!(out)?;
        info!("shell closed");
        Ok(())
    }

    pub fn handle_line<W: Write>(
        &mut self,
        out: &mut W,
        line: &str,
        now: Instant,
        today: NaiveDate,
    ) -> anyhow::Result<Flow> {
        if let Some(closed) = self.undo.expire(now) {
            debug!(id = %closed.task.id, "deletion is now final");
        }

        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        debug!(command, "shell command");

        match command {
            "" => {}
            "add" => self.add(out, rest, today)?,
            "list" | "ls" => self.list(out, today)?,
            "filter" => {
                self.view.status = StatusFilter::from_str(rest, true)
                    .map_err(|_| anyhow!("unknown filter '{rest}' (all, active, completed)"))?;
                self.list(out, today)?;
            }
            "tag" => {
                self.view.tag = match rest.trim_start_matches('#') {
                    "" | "none" => None,
                    tag => Some(tag.to_lowercase()),
                };
                self.list(out, today)?;
            }
            "toggle" | "done" => {
                let id = self.store.resolve(rest)?;
                self.store.toggle(&id);
                if let Some(task) = self.store.get(&id) {
                    let state = if task.completed { "completed" } else { "active" };
                    writeln!(out, "'{}' is now {state}.", task.text)?;
                }
            }
            "edit" => {
                let (reference, text) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("usage: edit <id> <text>"))?;
                let id = self.store.resolve(reference)?;
                if self.store.edit(&id, text) {
                    writeln!(out, "Edited {}.", id.short())?;
                } else {
                    writeln!(out, "Unchanged: the new text has nothing besides tags.")?;
                }
            }
            "pin" => {
                let id = self.store.resolve(rest)?;
                self.store.toggle_pin(&id);
                if let Some(task) = self.store.get(&id) {
                    let state = if task.pinned { "Pinned" } else { "Unpinned" };
                    writeln!(out, "{state} '{}'.", task.text)?;
                }
            }
            "due" => {
                let (reference, when) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("usage: due <id> <when|none>"))?;
                let id = self.store.resolve(reference)?;
                let due_at = match when.trim() {
                    "none" | "clear" => None,
                    when => Some(parse_due_input(when, today)?),
                };
                self.store.set_due_date(&id, due_at);
                match due_at {
                    Some(date) => writeln!(out, "Due {}.", date.format("%Y-%m-%d"))?,
                    None => writeln!(out, "Due date cleared.")?,
                }
            }
            "delete" | "rm" => {
                let id = self.store.resolve(rest)?;
                if let Some(removed) = self.store.delete(&id) {
                    if self.undo.window().is_zero() {
                        writeln!(out, "Deleted '{}'.", removed.task.text)?;
                    } else {
                        writeln!(
                            out,
                            "Deleted '{}'. Type `undo` within {}s to restore it.",
                            removed.task.text,
                            self.undo.window().as_secs()
                        )?;
                        self.undo.open(now, removed);
                    }
                }
            }
            "undo" => match self.undo.undo(now) {
                Some(removed) => {
                    let text = removed.task.text.clone();
                    self.store.restore(removed);
                    writeln!(out, "Restored '{text}'.")?;
                }
                None => writeln!(out, "Nothing to undo.")?,
            },
            "clear" | "clear-completed" => {
                let removed = self.store.clear_completed();
                writeln!(out, "Removed {removed} completed task(s).")?;
            }
            "tags" => {
                let counts = view::tag_counts(self.store.tasks());
                self.renderer.write_tag_counts(&mut *out, &counts)?;
            }
            "stats" => {
                self.renderer
                    .write_counts(&mut *out, view::counts(self.store.tasks()))?;
            }
            "suggest" => {
                let known = view::known_tags(self.store.tasks());
                let suggestions = suggest_tags(rest, &known);
                if suggestions.is_empty() {
                    writeln!(out, "No suggestions.")?;
                } else {
                    let line = suggestions
                        .iter()
                        .map(|tag| format!("#{tag}"))
                        .collect::<Vec<_>>()
                        .join(" ");
                    writeln!(out, "{line}")?;
                }
            }
            "theme" => {
                let theme = match rest {
                    "" => load_theme(self.prefs, self.system_theme),
                    "toggle" => toggle_theme(self.prefs, self.system_theme),
                    other => {
                        let theme: Theme = other.parse()?;
                        save_theme(self.prefs, theme);
                        theme
                    }
                };
                self.renderer.set_theme(theme);
                writeln!(out, "Theme: {theme}")?;
            }
            "help" | "?" => writeln!(out, "{HELP}")?,
            "quit" | "exit" | "q" => return Ok(Flow::Quit),
            other => {
                warn!(command = other, "unknown shell command");
                writeln!(out, "Unknown command '{other}'. Type `help` for a list.")?;
            }
        }

        Ok(Flow::Continue)
    }

    /// Session teardown: anything still undoable becomes final.
    pub fn close(&mut self) {
        self.undo.close();
    }

    fn add<W: Write>(&mut self, out: &mut W, rest: &str, today: NaiveDate) -> anyhow::Result<()> {
        let mut due_at = None;
        let mut words = Vec::new();
        for word in rest.split_whitespace() {
            match word.strip_prefix("due:") {
                Some(when) => due_at = Some(parse_due_input(when, today)?),
                None => words.push(word),
            }
        }

        match self.store.add(&words.join(" "), due_at) {
            Some(id) => writeln!(out, "Added {}.", id.short())?,
            None => writeln!(out, "Nothing added: the task has no text besides tags.")?,
        }
        Ok(())
    }

    fn list<W: Write>(&self, out: &mut W, today: NaiveDate) -> anyhow::Result<()> {
        let shown = view::derive(self.store.tasks(), &self.view);
        self.renderer.write_task_table(&mut *out, &shown, today)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::storage::{MemoryStore, THEME_KEY};

    struct Harness {
        store: TaskStore,
        prefs: MemoryStore,
        start: Instant,
        today: NaiveDate,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: TaskStore::new(vec![]),
                prefs: MemoryStore::new(),
                start: Instant::now(),
                today: NaiveDate::from_ymd_opt(2026, 2, 17).expect("date"),
            }
        }

        fn shell(&mut self) -> Shell<'_> {
            self.shell_with_window(Duration::from_secs(5))
        }

        fn shell_with_window(&mut self, window: Duration) -> Shell<'_> {
            Shell::new(
                &mut self.store,
                &mut self.prefs,
                Renderer::plain(),
                window,
                None,
            )
        }
    }

    fn send(shell: &mut Shell<'_>, line: &str, now: Instant, today: NaiveDate) -> String {
        let mut out = Vec::new();
        shell
            .handle_line(&mut out, line, now, today)
            .expect("command");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn add_with_due_modifier_and_list() {
        let mut h = Harness::new();
        let (start, today) = (h.start, h.today);
        let mut shell = h.shell();

        let added = send(&mut shell, "add Pay rent #bills due:today", start, today);
        assert!(added.starts_with("Added "));
        let listed = send(&mut shell, "list", start, today);
        assert!(listed.contains("Pay rent"));
        assert!(listed.contains("#bills"));
        assert!(listed.contains("Today"));
        drop(shell);

        assert_eq!(h.store.tasks()[0].due_at, Some(today));
    }

    #[test]
    fn delete_then_undo_inside_window() {
        let mut h = Harness::new();
        let (start, today) = (h.start, h.today);
        h.store.add("Buy milk #errand", None);
        let id = h.store.tasks()[0].id.short().to_string();
        let mut shell = h.shell();

        let deleted = send(&mut shell, &format!("delete {id}"), start, today);
        assert!(deleted.contains("Deleted 'Buy milk'"));
        let undone = send(&mut shell, "undo", start + Duration::from_secs(3), today);
        assert_eq!(undone, "Restored 'Buy milk'.\n");
        drop(shell);

        assert_eq!(h.store.len(), 1);
        assert_eq!(h.store.tasks()[0].tags, vec!["errand"]);
    }

    #[test]
    fn undo_after_window_does_nothing() {
        let mut h = Harness::new();
        let (start, today) = (h.start, h.today);
        h.store.add("Buy milk", None);
        let id = h.store.tasks()[0].id.short().to_string();
        let mut shell = h.shell();

        send(&mut shell, &format!("delete {id}"), start, today);
        send(&mut shell, "stats", start + Duration::from_secs(6), today);
        let undone = send(&mut shell, "undo", start + Duration::from_secs(6), today);
        assert_eq!(undone, "Nothing to undo.\n");
        drop(shell);

        assert!(h.store.is_empty());
    }

    #[test]
    fn filters_persist_between_commands() {
        let mut h = Harness::new();
        let (start, today) = (h.start, h.today);
        h.store.add("Pay rent #bills", None);
        h.store.add("Walk dog #home", None);
        let mut shell = h.shell();

        let tagged = send(&mut shell, "tag #Bills", start, today);
        assert!(tagged.contains("Pay rent"));
        assert!(!tagged.contains("Walk dog"));
        assert_eq!(shell.view().tag.as_deref(), Some("bills"));

        let completed = send(&mut shell, "filter completed", start, today);
        assert_eq!(completed, "No tasks yet.\n");

        send(&mut shell, "tag none", start, today);
        let all = send(&mut shell, "filter all", start, today);
        assert!(all.contains("Walk dog"));
    }

    #[test]
    fn unknown_id_is_an_error_not_a_panic() {
        let mut h = Harness::new();
        let (start, today) = (h.start, h.today);
        let mut shell = h.shell();
        let mut out = Vec::new();
        assert!(shell.handle_line(&mut out, "toggle nope", start, today).is_err());
        assert!(shell.handle_line(&mut out, "filter someday", start, today).is_err());
    }

    #[test]
    fn theme_toggle_is_saved() {
        let mut h = Harness::new();
        let (start, today) = (h.start, h.today);
        let mut shell = h.shell();
        assert_eq!(send(&mut shell, "theme", start, today), "Theme: light\n");
        assert_eq!(send(&mut shell, "theme toggle", start, today), "Theme: dark\n");
        drop(shell);
        assert_eq!(h.prefs.raw(THEME_KEY), Some("dark"));
    }

    #[test]
    fn run_reads_until_quit_and_closes_undo() {
        let mut h = Harness::new();
        h.store.add("Buy milk", None);
        h.store.add("Walk dog", None);
        let id = h.store.tasks()[0].id.short().to_string();
        let mut shell = h.shell_with_window(Duration::from_secs(3600));

        let input = Cursor::new(format!("delete {id}\nstats\nquit\nadd never reached\n"));
        let mut out = Vec::new();
        shell.run(input, &mut out).expect("run");
        assert!(shell.undo.pending().is_none());
        drop(shell);

        let out = String::from_utf8(out).expect("utf8");
        assert!(out.contains("Deleted 'Walk dog'"));
        assert!(out.contains("active     1"));
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.store.tasks()[0].text, "Buy milk");
    }

    #[test]
    fn zero_window_makes_deletes_final() {
        let mut h = Harness::new();
        let (start, today) = (h.start, h.today);
        h.store.add("Buy milk", None);
        let id = h.store.tasks()[0].id.short().to_string();
        let mut shell = h.shell_with_window(Duration::ZERO);

        let deleted = send(&mut shell, &format!("delete {id}"), start, today);
        assert_eq!(deleted, "Deleted 'Buy milk'.\n");
        assert!(shell.undo.pending().is_none());
        assert_eq!(send(&mut shell, "undo", start, today), "Nothing to undo.\n");
    }
}
