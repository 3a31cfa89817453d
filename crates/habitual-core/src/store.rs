use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::datetime::{CalendarKey, ClientZone, WeekdayCode};
use crate::habit::{CompletionSet, Habit, HabitId, WeeklyPlan};
use crate::session::Screen;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoadStatus {
    Init,
    Loading,
    Ready,
    Error,
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoadStatus::Init => "INIT",
            LoadStatus::Loading => "LOADING",
            LoadStatus::Ready => "READY",
            LoadStatus::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Local mirror of the remote account plus the client-only view state.
///
/// Reads are open to everyone; writes go through the sync engine so that
/// every mutation is either an optimistic effect or a reconciliation.
#[derive(Debug, Clone)]
pub struct LocalStore {
    habits: Vec<Habit>,
    plan: WeeklyPlan,
    completions: CompletionSet,
    status: LoadStatus,
    viewed: DateTime<Utc>,
    zone: ClientZone,
    screen: Screen,
    generation: u64,
    last_error: Option<String>,
    revision: u64,
    deleted_unconfirmed: HashSet<HabitId>,
}

impl LocalStore {
    pub fn new(zone: ClientZone, viewed: DateTime<Utc>) -> Self {
        Self {
            habits: Vec::new(),
            plan: WeeklyPlan::default(),
            completions: CompletionSet::default(),
            status: LoadStatus::Init,
            viewed,
            zone,
            screen: Screen::default(),
            generation: 0,
            last_error: None,
            revision: 0,
            deleted_unconfirmed: HashSet::new(),
        }
    }

    pub fn with_screen(mut self, screen: Screen) -> Self {
        self.screen = screen;
        self
    }

    pub fn habits(&self) -> &[Habit] {
        &self.habits
    }

    pub fn habit(&self, id: &HabitId) -> Option<&Habit> {
        self.habits.iter().find(|h| &h.id == id)
    }

    pub fn plan(&self) -> &WeeklyPlan {
        &self.plan
    }

    pub fn completions(&self) -> &CompletionSet {
        &self.completions
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    pub fn viewed_date(&self) -> DateTime<Utc> {
        self.viewed
    }

    pub fn viewed_key(&self) -> CalendarKey {
        self.zone.calendar_key(self.viewed)
    }

    pub fn viewed_weekday(&self) -> WeekdayCode {
        self.zone.weekday_code(self.viewed)
    }

    pub fn zone(&self) -> ClientZone {
        self.zone
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    /// Navigation is client-only state, so the presentation layer may set it directly.
    pub fn set_screen(&mut self, screen: Screen) {
        if self.screen != screen {
            self.screen = screen;
            self.touch();
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Bumped on every mutation; readers recompute derived views when it moves.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    #[tracing::instrument(skip_all, fields(habits = habits.len(), completions = completions.len()))]
    pub(crate) fn replace_all(
        &mut self,
        mut habits: Vec<Habit>,
        plan: WeeklyPlan,
        completions: CompletionSet,
    ) {
        let mut seen = HashSet::new();
        habits.retain(|habit| {
            let fresh = seen.insert(habit.id.clone());
            if !fresh {
                warn!(id = %habit.id, "dropping duplicate habit id from snapshot");
            }
            fresh
        });

        self.habits = habits;
        self.plan = plan;
        self.completions = completions;
        self.touch();
    }

    pub(crate) fn upsert_habit(&mut self, habit: Habit) {
        match self.habits.iter_mut().find(|h| h.id == habit.id) {
            Some(existing) => *existing = habit,
            None => self.habits.push(habit),
        }
        self.touch();
    }

    /// Plan and completion entries are left behind on purpose; readers filter them.
    pub(crate) fn remove_habit(&mut self, id: &HabitId) -> Option<Habit> {
        let idx = self.habits.iter().position(|h| &h.id == id)?;
        let removed = self.habits.remove(idx);
        self.touch();
        Some(removed)
    }

    /// Returns whether the habit is now planned on `day`.
    pub(crate) fn toggle_planned(&mut self, day: WeekdayCode, id: &HabitId) -> bool {
        let assigned = self.plan.toggle(day, id);
        self.touch();
        assigned
    }

    pub(crate) fn replicate_plan(&mut self, source: WeekdayCode) {
        self.plan.replicate_from(source);
        self.touch();
    }

    pub(crate) fn set_completions(&mut self, ids: CompletionSet) {
        self.completions = ids;
        self.touch();
    }

    /// Swaps a temp-id entry for the confirmed habit, keeping its library slot, and
    /// moves plan and completion references over. Returns false when the temp
    /// entry is gone (deleted before the server answered).
    #[tracing::instrument(skip(self, confirmed), fields(confirmed = %confirmed.id))]
    pub(crate) fn reconcile_habit(&mut self, temp_id: &HabitId, confirmed: Habit) -> bool {
        let Some(idx) = self.habits.iter().position(|h| &h.id == temp_id) else {
            return false;
        };

        let already_present = self.habits.iter().any(|h| h.id == confirmed.id);
        self.plan.rename_habit(temp_id, &confirmed.id);
        self.completions.rename_habit(temp_id, &confirmed.id);
        if already_present {
            debug!("confirmed habit already loaded; dropping temp entry");
            self.habits.remove(idx);
            self.upsert_habit(confirmed);
        } else {
            self.habits[idx] = confirmed;
            self.touch();
        }
        true
    }

    /// Records that the user deleted a habit the service has not confirmed yet.
    pub(crate) fn note_unconfirmed_delete(&mut self, temp_id: HabitId) {
        self.deleted_unconfirmed.insert(temp_id);
    }

    /// True once per temp id passed to [`Self::note_unconfirmed_delete`].
    pub(crate) fn take_unconfirmed_delete(&mut self, temp_id: &HabitId) -> bool {
        self.deleted_unconfirmed.remove(temp_id)
    }

    /// Forgets a habit everywhere, used only to roll back an unconfirmed create.
    pub(crate) fn purge_habit(&mut self, id: &HabitId) {
        self.habits.retain(|h| &h.id != id);
        self.plan.remove_habit(id);
        self.completions.remove_habit(id);
        self.touch();
    }

    /// Points the store at a new day and returns the generation of the fetch
    /// that will fill it.
    pub(crate) fn begin_load(&mut self, viewed: DateTime<Utc>) -> u64 {
        self.viewed = viewed;
        self.status = LoadStatus::Loading;
        self.completions = CompletionSet::default();
        self.generation += 1;
        self.touch();
        self.generation
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub(crate) fn mark_ready(&mut self) {
        self.status = LoadStatus::Ready;
        self.last_error = None;
        self.touch();
    }

    pub(crate) fn mark_error(&mut self, message: String) {
        self.status = LoadStatus::Error;
        self.last_error = Some(message);
        self.touch();
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}
