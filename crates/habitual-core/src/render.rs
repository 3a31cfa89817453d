use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::config::Settings;
use crate::habit::{Habit, WeeklyPlan};
use crate::view::{DayView, week_load};

const BAR_CELLS: usize = 20;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            color: settings.color && io::stdout().is_terminal(),
        }
    }

    #[tracing::instrument(skip_all, fields(date = %view.date))]
    pub fn print_day(&self, view: &DayView) -> anyhow::Result<()> {
        self.write_day(&mut io::stdout().lock(), view)
    }

    #[tracing::instrument(skip_all, fields(date = %view.date))]
    pub fn print_stats(&self, view: &DayView) -> anyhow::Result<()> {
        self.write_stats(&mut io::stdout().lock(), view)
    }

    #[tracing::instrument(skip_all, fields(habits = habits.len()))]
    pub fn print_library(&self, habits: &[Habit]) -> anyhow::Result<()> {
        self.write_library(&mut io::stdout().lock(), habits)
    }

    #[tracing::instrument(skip_all)]
    pub fn print_plan(&self, habits: &[Habit], plan: &WeeklyPlan) -> anyhow::Result<()> {
        self.write_plan(&mut io::stdout().lock(), habits, plan)
    }

    pub fn print_notice(&self, message: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", self.paint(message, "36"))?;
        Ok(())
    }

    pub fn write_day<W: Write>(&self, out: &mut W, view: &DayView) -> anyhow::Result<()> {
        writeln!(
            out,
            "{} ({} {})",
            self.paint(&capitalize(&view.label.to_string()), "1"),
            view.weekday,
            view.date
        )?;
        writeln!(
            out,
            "{} {}/{} done",
            self.progress_bar(view.percent),
            view.done,
            view.total
        )?;
        writeln!(out)?;

        if view.rows.is_empty() {
            writeln!(out, "Nothing planned for {}.", view.weekday)?;
            return Ok(());
        }

        let rows = view
            .rows
            .iter()
            .map(|row| {
                let mark = if row.done {
                    self.paint("[x]", "32")
                } else {
                    "[ ]".to_string()
                };
                vec![
                    mark,
                    self.paint(row.id.as_str(), "33"),
                    row.name.clone(),
                    row.category.to_string(),
                ]
            })
            .collect();

        write_table(out, &["", "ID", "Habit", "Category"], rows)
    }

    pub fn write_stats<W: Write>(&self, out: &mut W, view: &DayView) -> anyhow::Result<()> {
        writeln!(out, "{} ({}) {}% complete", view.date, view.weekday, view.percent)?;
        writeln!(out)?;

        if view.breakdown.is_empty() {
            writeln!(out, "Nothing planned for {}.", view.weekday)?;
            return Ok(());
        }

        let rows = view
            .breakdown
            .iter()
            .map(|(category, tally)| {
                vec![
                    category.to_string(),
                    format!("{}/{}", tally.done, tally.total),
                    format!("{}%", tally.percent()),
                ]
            })
            .collect();

        write_table(out, &["Category", "Done", "Progress"], rows)
    }

    pub fn write_library<W: Write>(&self, out: &mut W, habits: &[Habit]) -> anyhow::Result<()> {
        if habits.is_empty() {
            writeln!(out, "No habits yet. Add one with `habit add <name>`.")?;
            return Ok(());
        }

        let rows = habits
            .iter()
            .map(|habit| {
                let id = if habit.id.is_temporary() {
                    format!("{} (pending)", habit.id)
                } else {
                    habit.id.to_string()
                };
                vec![self.paint(&id, "33"), habit.name.clone(), habit.category.to_string()]
            })
            .collect();

        write_table(out, &["ID", "Habit", "Category"], rows)
    }

    pub fn write_plan<W: Write>(
        &self,
        out: &mut W,
        habits: &[Habit],
        plan: &WeeklyPlan,
    ) -> anyhow::Result<()> {
        let load = week_load(habits, plan);
        let peak = load.iter().map(|(_, count)| *count).max().unwrap_or(0);

        let rows = load
            .into_iter()
            .map(|(day, load)| {
                let bar = if peak == 0 {
                    String::new()
                } else {
                    "#".repeat(load * BAR_CELLS / peak)
                };
                let names = habits
                    .iter()
                    .filter(|h| plan.day(day).contains(&h.id))
                    .map(|h| h.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                vec![day.to_string(), load.to_string(), bar, names]
            })
            .collect();

        write_table(out, &["Day", "Load", "", "Habits"], rows)
    }

    fn progress_bar(&self, percent: u8) -> String {
        let filled = usize::from(percent) * BAR_CELLS / 100;
        let bar = format!(
            "[{}{}] {:>3}%",
            "#".repeat(filled),
            "-".repeat(BAR_CELLS - filled),
            percent
        );
        if percent == 100 {
            self.paint(&bar, "32")
        } else {
            bar
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn write_table<W: Write>(writer: &mut W, headers: &[&str], rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(*header));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let header_line = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| pad(header, *width))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{}", header_line.trim_end())?;

    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{rule}")?;

    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| pad(cell, *width))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn pad(cell: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(strip_ansi(cell).as_str());
    format!("{cell}{}", " ".repeat(width.saturating_sub(visible)))
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
