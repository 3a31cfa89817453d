//! Read-only projections of the store for the presentation layer.
//!
//! Plan and completion entries pointing at habits that no longer exist, and
//! completions for habits not planned on the day, are ignored rather than
//! reported.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::datetime::{CalendarKey, DayLabel, WeekdayCode};
use crate::habit::{Category, CompletionSet, Habit, HabitId, WeeklyPlan};
use crate::store::{LoadStatus, LocalStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub total: usize,
    pub done: usize,
}

impl Tally {
    pub fn percent(&self) -> u8 {
        progress_percent(self.done, self.total)
    }
}

/// Habits planned for `weekday`, in library order.
pub fn tasks_for_day<'a>(
    habits: &'a [Habit],
    plan: &WeeklyPlan,
    weekday: WeekdayCode,
) -> Vec<&'a Habit> {
    let planned = plan.day(weekday);
    habits.iter().filter(|h| planned.contains(&h.id)).collect()
}

pub fn tasks_for_date(store: &LocalStore, date: DateTime<Utc>) -> Vec<&Habit> {
    tasks_for_day(store.habits(), store.plan(), store.zone().weekday_code(date))
}

pub fn completed_valid<'a>(tasks: &[&'a Habit], completions: &CompletionSet) -> Vec<&'a Habit> {
    tasks
        .iter()
        .copied()
        .filter(|h| completions.contains(&h.id))
        .collect()
}

/// Whole percentage, rounding halves up; zero when nothing is planned.
pub fn progress_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let rounded = (200 * done.min(total) + total) / (2 * total);
    u8::try_from(rounded).unwrap_or(100)
}

pub fn category_breakdown(
    tasks: &[&Habit],
    completions: &CompletionSet,
) -> BTreeMap<Category, Tally> {
    let mut out: BTreeMap<Category, Tally> = BTreeMap::new();
    for habit in tasks {
        let tally = out.entry(habit.category).or_default();
        tally.total += 1;
        if completions.contains(&habit.id) {
            tally.done += 1;
        }
    }
    out
}

/// Number of live habits assigned to `weekday`.
pub fn weekly_load(habits: &[Habit], plan: &WeeklyPlan, weekday: WeekdayCode) -> usize {
    tasks_for_day(habits, plan, weekday).len()
}

/// Weekly load for all seven days, starting on Sunday.
pub fn week_load(habits: &[Habit], plan: &WeeklyPlan) -> Vec<(WeekdayCode, usize)> {
    WeekdayCode::ALL
        .into_iter()
        .map(|day| (day, weekly_load(habits, plan, day)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub id: HabitId,
    pub name: String,
    pub category: Category,
    pub done: bool,
}

/// Everything the "today" dashboard shows for the viewed date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayView {
    pub date: CalendarKey,
    pub weekday: WeekdayCode,
    pub label: DayLabel,
    pub status: LoadStatus,
    pub rows: Vec<TaskRow>,
    pub done: usize,
    pub total: usize,
    pub percent: u8,
    pub breakdown: BTreeMap<Category, Tally>,
}

impl DayView {
    pub fn derive(store: &LocalStore, now: DateTime<Utc>) -> Self {
        let viewed = store.viewed_date();
        let tasks = tasks_for_date(store, viewed);
        let done = completed_valid(&tasks, store.completions()).len();

        let rows = tasks
            .iter()
            .map(|habit| TaskRow {
                id: habit.id.clone(),
                name: habit.name.clone(),
                category: habit.category,
                done: store.completions().contains(&habit.id),
            })
            .collect();

        Self {
            date: store.viewed_key(),
            weekday: store.viewed_weekday(),
            label: store.zone().label_for(viewed, now),
            status: store.status(),
            rows,
            done,
            total: tasks.len(),
            percent: progress_percent(done, tasks.len()),
            breakdown: category_breakdown(&tasks, store.completions()),
        }
    }
}
