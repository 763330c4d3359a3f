use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::due::{DueBucket, classify};
use crate::task::Task;
use crate::theme::Theme;
use crate::view::{Counts, TagCount};

/// ANSI colour codes per due bucket, picked to stay readable on the
/// background of each theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Palette {
    id: &'static str,
    overdue: &'static str,
    today: &'static str,
    soon: &'static str,
    done: &'static str,
    tag: &'static str,
}

impl Palette {
    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Light => Self {
                id: "34",
                overdue: "31",
                today: "33",
                soon: "32",
                done: "2",
                tag: "35",
            },
            Theme::Dark => Self {
                id: "94",
                overdue: "91",
                today: "93",
                soon: "92",
                done: "90",
                tag: "95",
            },
        }
    }

    fn for_bucket(&self, bucket: DueBucket) -> Option<&'static str> {
        match bucket {
            DueBucket::None => None,
            DueBucket::Overdue => Some(self.overdue),
            DueBucket::Today => Some(self.today),
            DueBucket::Soon => Some(self.soon),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    palette: Palette,
}

impl Renderer {
    pub fn new(cfg: &Config, theme: Theme) -> Self {
        let color = cfg.get_bool("color").unwrap_or(true);
        Self {
            color: color && io::stdout().is_terminal(),
            palette: Palette::for_theme(theme),
        }
    }

    /// No escape codes at all; what pipes and tests see.
    pub fn plain() -> Self {
        Self {
            color: false,
            palette: Palette::for_theme(Theme::Light),
        }
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.palette = Palette::for_theme(theme);
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(&self, tasks: &[&Task], today: NaiveDate) -> anyhow::Result<()> {
        self.write_task_table(io::stdout().lock(), tasks, today)
    }

    pub fn write_task_table<W: Write>(
        &self,
        mut out: W,
        tasks: &[&Task],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks yet.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            " ".to_string(),
            "Done".to_string(),
            "Task".to_string(),
            "Tags".to_string(),
            "Due".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let status = classify(task.due_at, today);
            let due = match status.bucket {
                DueBucket::None => String::new(),
                DueBucket::Overdue => format!("{} ({})", status.label, status.detail),
                _ => status.label.clone(),
            };
            let due = match self.palette.for_bucket(status.bucket) {
                Some(code) => self.paint(&due, code),
                None => due,
            };

            let text = if task.completed {
                self.paint(&task.text, self.palette.done)
            } else {
                task.text.clone()
            };
            let tags = task
                .tags
                .iter()
                .map(|tag| format!("#{tag}"))
                .collect::<Vec<_>>()
                .join(" ");

            rows.push(vec![
                self.paint(task.id.short(), self.palette.id),
                if task.pinned { "*" } else { "" }.to_string(),
                if task.completed { "[x]" } else { "[ ]" }.to_string(),
                text,
                self.paint(&tags, self.palette.tag),
                due,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_tag_counts(&self, counts: &[TagCount]) -> anyhow::Result<()> {
        self.write_tag_counts(io::stdout().lock(), counts)
    }

    pub fn write_tag_counts<W: Write>(&self, mut out: W, counts: &[TagCount]) -> anyhow::Result<()> {
        if counts.is_empty() {
            writeln!(out, "No tags.")?;
            return Ok(());
        }

        let rows = counts
            .iter()
            .map(|c| {
                vec![
                    self.paint(&format!("#{}", c.tag), self.palette.tag),
                    c.count.to_string(),
                ]
            })
            .collect();
        write_table(&mut out, vec!["Tag".to_string(), "Tasks".to_string()], rows)
    }

    pub fn print_counts(&self, counts: Counts) -> anyhow::Result<()> {
        self.write_counts(io::stdout().lock(), counts)
    }

    pub fn write_counts<W: Write>(&self, mut out: W, counts: Counts) -> anyhow::Result<()> {
        writeln!(out, "active     {}", counts.active)?;
        writeln!(out, "completed  {}", counts.completed)?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || text.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let mut line = String::new();
    for idx in 0..column_count {
        line.push_str(&format!("{:width$} ", headers[idx], width = widths[idx]));
    }
    writeln!(writer, "{}", line.trim_end())?;

    line.clear();
    for width in &widths {
        line.push_str(&format!("{:-<width$} ", "", width = *width));
    }
    writeln!(writer, "{}", line.trim_end())?;

    for row in rows {
        line.clear();
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            line.push_str(cell);
            line.push_str(&" ".repeat(padding + 1));
        }
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
