//! Optimistic mutation and reconciliation.
//!
//! Each user intent is split in two halves. [`apply_intent`] applies the local
//! effect synchronously and returns the single request to send; [`settle`]
//! folds the service's answer back into the store. [`SyncEngine`] glues the two
//! halves around an async [`RemoteService`].
//!
//! Delivery is at-most-once and best-effort: a request is sent exactly once,
//! failures of mutation requests are logged and swallowed, and optimistic
//! state is not rolled back (habit creation follows [`CreateFailurePolicy`]).
//! Divergence heals on the next full load.
//!
//! Date navigation is fenced: every load bumps the store's generation and a
//! snapshot (or failure) for an older generation is dropped, so a slow answer
//! for a previously viewed day can never overwrite a newer one.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::datetime::{CalendarKey, WeekdayCode};
use crate::habit::{Category, Habit, HabitId, NewHabit};
use crate::remote::{InitSnapshot, RemoteError, RemoteService};
use crate::session::Screen;
use crate::store::LocalStore;

/// Day whose plan `replicate-plan` copies onto the whole week.
pub const REPLICATION_SOURCE: WeekdayCode = WeekdayCode::Mon;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateNav {
    Previous,
    Next,
    Today,
    At(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    CreateHabit(NewHabit),
    DeleteHabit(HabitId),
    TogglePlan { habit_id: HabitId, weekday: WeekdayCode },
    ReplicatePlan,
    ToggleCompletion(HabitId),
    Navigate(DateNav),
    Refresh,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::CreateHabit(_) => "create-habit",
            Intent::DeleteHabit(_) => "delete-habit",
            Intent::TogglePlan { .. } => "toggle-plan",
            Intent::ReplicatePlan => "replicate-plan",
            Intent::ToggleCompletion(_) => "toggle-completion",
            Intent::Navigate(_) => "navigate",
            Intent::Refresh => "refresh",
        }
    }
}

/// A request the engine owes the service after an optimistic effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    CreateHabit { temp_id: HabitId, draft: NewHabit },
    DeleteHabit(HabitId),
    TogglePlan { habit_id: HabitId, weekday: WeekdayCode },
    ReplicatePlan,
    ToggleCompletion { habit_id: HabitId, date: CalendarKey },
    FetchInit { date: CalendarKey, generation: u64 },
}

impl Outbound {
    pub fn name(&self) -> &'static str {
        match self {
            Outbound::CreateHabit { .. } => "create-habit",
            Outbound::DeleteHabit(_) => "delete-habit",
            Outbound::TogglePlan { .. } => "toggle-plan",
            Outbound::ReplicatePlan => "replicate-plan",
            Outbound::ToggleCompletion { .. } => "toggle-completion",
            Outbound::FetchInit { .. } => "fetch-init",
        }
    }
}

#[derive(Debug)]
pub enum Reply {
    Created(Habit),
    Snapshot(InitSnapshot),
    Ack,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntentError {
    #[error("habit name cannot be empty")]
    EmptyName,

    #[error("unknown habit: {0}")]
    UnknownHabit(HabitId),

    #[error("cannot change viewed date: {0}")]
    Navigation(String),
}

/// What happens to the optimistic entry when the service rejects a create.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CreateFailurePolicy {
    /// Keep the temp-id entry; it stays unconfirmed until the next load.
    #[default]
    Retain,
    /// Drop the temp-id entry and any plan or completion reference to it.
    Rollback,
    /// Refetch the viewed day, replacing local state wholesale.
    Reload,
}

impl fmt::Display for CreateFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CreateFailurePolicy::Retain => "retain",
            CreateFailurePolicy::Rollback => "rollback",
            CreateFailurePolicy::Reload => "reload",
        })
    }
}

impl FromStr for CreateFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" | "keep" => Ok(CreateFailurePolicy::Retain),
            "rollback" => Ok(CreateFailurePolicy::Rollback),
            "reload" => Ok(CreateFailurePolicy::Reload),
            other => Err(anyhow!(
                "invalid create failure policy: {other} (expected retain, rollback or reload)"
            )),
        }
    }
}

/// Applies the optimistic half of an intent. Returns the request to issue, or
/// `None` when there is nothing the service needs to hear about.
#[tracing::instrument(skip(store, intent, now), fields(intent = intent.name()))]
pub fn apply_intent(
    store: &mut LocalStore,
    intent: Intent,
    now: DateTime<Utc>,
) -> Result<Option<Outbound>, IntentError> {
    match intent {
        Intent::CreateHabit(draft) => {
            let name = draft.name.trim().to_string();
            if name.is_empty() {
                return Err(IntentError::EmptyName);
            }
            let draft = NewHabit {
                name,
                category: draft.category,
            };
            let temp_id = HabitId::temporary();
            store.upsert_habit(draft.clone().into_habit(temp_id.clone()));
            debug!(temp_id = %temp_id, "added unconfirmed habit");
            Ok(Some(Outbound::CreateHabit { temp_id, draft }))
        }
        Intent::DeleteHabit(id) => {
            if store.remove_habit(&id).is_none() {
                return Err(IntentError::UnknownHabit(id));
            }
            if id.is_temporary() {
                // The pending create deletes the confirmed id once it arrives.
                debug!(id = %id, "deleted unconfirmed habit locally only");
                store.note_unconfirmed_delete(id);
                return Ok(None);
            }
            Ok(Some(Outbound::DeleteHabit(id)))
        }
        Intent::TogglePlan { habit_id, weekday } => {
            if !store.plan().day(weekday).contains(&habit_id) && store.habit(&habit_id).is_none() {
                return Err(IntentError::UnknownHabit(habit_id));
            }
            let assigned = store.toggle_planned(weekday, &habit_id);
            debug!(habit_id = %habit_id, weekday = %weekday, assigned, "toggled plan slot");
            Ok(Some(Outbound::TogglePlan { habit_id, weekday }))
        }
        Intent::ReplicatePlan => {
            store.replicate_plan(REPLICATION_SOURCE);
            debug!(
                habits = store.plan().day(REPLICATION_SOURCE).len(),
                "replicated plan across the week"
            );
            Ok(Some(Outbound::ReplicatePlan))
        }
        Intent::ToggleCompletion(habit_id) => {
            let mut done = store.completions().clone();
            if !done.contains(&habit_id) && store.habit(&habit_id).is_none() {
                return Err(IntentError::UnknownHabit(habit_id));
            }
            let now_done = done.toggle(&habit_id);
            store.set_completions(done);
            debug!(habit_id = %habit_id, done = now_done, "toggled completion");
            Ok(Some(Outbound::ToggleCompletion {
                habit_id,
                date: store.viewed_key(),
            }))
        }
        Intent::Navigate(nav) => {
            let viewed = store.viewed_date();
            let zone = store.zone();
            let target = match nav {
                DateNav::Previous => zone.shift_days(viewed, -1),
                DateNav::Next => zone.shift_days(viewed, 1),
                DateNav::Today => Ok(now),
                DateNav::At(instant) => Ok(instant),
            }
            .map_err(|err| IntentError::Navigation(err.to_string()))?;
            Ok(Some(begin_fetch(store, target)))
        }
        Intent::Refresh => {
            let viewed = store.viewed_date();
            Ok(Some(begin_fetch(store, viewed)))
        }
    }
}

fn begin_fetch(store: &mut LocalStore, viewed: DateTime<Utc>) -> Outbound {
    let generation = store.begin_load(viewed);
    let date = store.viewed_key();
    debug!(date = %date, generation, "loading day");
    Outbound::FetchInit { date, generation }
}

/// Folds the outcome of `outbound` into the store. May return a follow-up
/// request (a reload, or deleting a habit the user removed before the service
/// confirmed it).
#[tracing::instrument(skip_all, fields(request = outbound.name()))]
pub fn settle(
    store: &mut LocalStore,
    outbound: Outbound,
    outcome: Result<Reply, RemoteError>,
    policy: CreateFailurePolicy,
) -> Option<Outbound> {
    match (outbound, outcome) {
        (Outbound::FetchInit { date, generation }, outcome) => {
            if !store.is_current(generation) {
                debug!(
                    date = %date,
                    generation,
                    current = store.generation(),
                    "discarding stale load outcome"
                );
                return None;
            }
            match outcome {
                Ok(Reply::Snapshot(snapshot)) => {
                    info!(
                        date = %date,
                        habits = snapshot.habits.len(),
                        done = snapshot.completions.len(),
                        "loaded day"
                    );
                    store.replace_all(snapshot.habits, snapshot.plan, snapshot.completions);
                    store.mark_ready();
                }
                Ok(other) => {
                    warn!(date = %date, reply = ?other, "load answered without a snapshot");
                    store.mark_error("service answered without a snapshot".to_string());
                }
                Err(err) => {
                    warn!(date = %date, error = %err, "load failed; keeping previous state");
                    store.mark_error(err.to_string());
                }
            }
            None
        }
        (Outbound::CreateHabit { temp_id, .. }, Ok(Reply::Created(habit))) => {
            let confirmed = habit.id.clone();
            if store.take_unconfirmed_delete(&temp_id) {
                info!(
                    temp_id = %temp_id,
                    id = %confirmed,
                    "habit was deleted before confirmation; deleting it remotely"
                );
                store.remove_habit(&confirmed);
                return Some(Outbound::DeleteHabit(confirmed));
            }

            if store.reconcile_habit(&temp_id, habit.clone()) {
                info!(temp_id = %temp_id, id = %confirmed, "habit confirmed");
            } else if store.habit(&confirmed).is_none() {
                // A load replaced the library while the create was in flight.
                info!(temp_id = %temp_id, id = %confirmed, "adding confirmed habit missing from the last load");
                store.upsert_habit(habit);
            } else {
                debug!(temp_id = %temp_id, id = %confirmed, "confirmed habit already loaded");
            }
            None
        }
        (Outbound::CreateHabit { temp_id, draft }, Err(err)) => {
            store.take_unconfirmed_delete(&temp_id);
            warn!(
                temp_id = %temp_id,
                name = %draft.name,
                error = %err,
                policy = %policy,
                "habit creation failed"
            );
            match policy {
                CreateFailurePolicy::Retain => None,
                CreateFailurePolicy::Rollback => {
                    store.purge_habit(&temp_id);
                    None
                }
                CreateFailurePolicy::Reload => {
                    let viewed = store.viewed_date();
                    Some(begin_fetch(store, viewed))
                }
            }
        }
        (outbound, Ok(_)) => {
            debug!(request = outbound.name(), "acknowledged");
            None
        }
        (outbound, Err(err)) => {
            warn!(
                request = outbound.name(),
                error = %err,
                "best-effort request failed; local state kept"
            );
            None
        }
    }
}

/// Owns the store on behalf of the presentation layer and drives intents
/// through the service.
pub struct SyncEngine<R> {
    store: Arc<Mutex<LocalStore>>,
    remote: Arc<R>,
    policy: CreateFailurePolicy,
    revisions: Arc<watch::Sender<u64>>,
}

impl<R> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            remote: Arc::clone(&self.remote),
            policy: self.policy,
            revisions: Arc::clone(&self.revisions),
        }
    }
}

impl<R: RemoteService> SyncEngine<R> {
    pub fn new(store: LocalStore, remote: R, policy: CreateFailurePolicy) -> Self {
        let (revisions, _) = watch::channel(store.revision());
        Self {
            store: Arc::new(Mutex::new(store)),
            remote: Arc::new(remote),
            policy,
            revisions: Arc::new(revisions),
        }
    }

    /// Receives the store revision after every change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }

    pub fn read<T>(&self, f: impl FnOnce(&LocalStore) -> T) -> T {
        f(&self.store.lock())
    }

    pub fn set_screen(&self, screen: Screen) {
        self.mutate(|store| store.set_screen(screen));
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut LocalStore) -> T) -> T {
        let (out, revision) = {
            let mut store = self.store.lock();
            let out = f(&mut store);
            (out, store.revision())
        };
        self.revisions.send_replace(revision);
        out
    }

    /// Applies the intent locally, then talks to the service. The store lock is
    /// never held across a request, so other intents may run meanwhile.
    #[tracing::instrument(skip(self, intent), fields(intent = intent.name()))]
    pub async fn dispatch(&self, intent: Intent) -> Result<(), IntentError> {
        let now = Utc::now();
        if let Some(outbound) = self.mutate(|store| apply_intent(store, intent, now))? {
            let outcome = self.deliver(&outbound).await;
            self.settle_all(outbound, outcome).await;
        }
        Ok(())
    }

    /// Settles an answer, then delivers and settles any follow-up requests.
    async fn settle_all(&self, mut outbound: Outbound, mut outcome: Result<Reply, RemoteError>) {
        let policy = self.policy;
        while let Some(next) = self.mutate(|store| settle(store, outbound, outcome, policy)) {
            outcome = self.deliver(&next).await;
            outbound = next;
        }
    }

    async fn deliver(&self, outbound: &Outbound) -> Result<Reply, RemoteError> {
        match outbound {
            Outbound::CreateHabit { draft, .. } => {
                self.remote.create_habit(draft).await.map(Reply::Created)
            }
            Outbound::DeleteHabit(id) => self.remote.delete_habit(id).await.map(|()| Reply::Ack),
            Outbound::TogglePlan { habit_id, weekday } => self
                .remote
                .toggle_plan(habit_id, *weekday)
                .await
                .map(|()| Reply::Ack),
            Outbound::ReplicatePlan => self.remote.replicate_plan().await.map(|()| Reply::Ack),
            Outbound::ToggleCompletion { habit_id, date } => self
                .remote
                .toggle_completion(habit_id, *date)
                .await
                .map(|()| Reply::Ack),
            Outbound::FetchInit { date, .. } => {
                self.remote.fetch_init(*date).await.map(Reply::Snapshot)
            }
        }
    }

    pub async fn load(&self) -> Result<(), IntentError> {
        self.dispatch(Intent::Refresh).await
    }

    /// Creates a habit and returns the id it ends up under: the service's id
    /// once confirmed, the temp id while unconfirmed, or `None` if it was not
    /// kept.
    #[tracing::instrument(skip(self, name))]
    pub async fn create_habit(
        &self,
        name: impl Into<String>,
        category: Category,
    ) -> Result<Option<HabitId>, IntentError> {
        let now = Utc::now();
        let intent = Intent::CreateHabit(NewHabit {
            name: name.into(),
            category,
        });
        let Some(outbound) = self.mutate(|store| apply_intent(store, intent, now))? else {
            return Ok(None);
        };

        let mut candidates = Vec::with_capacity(2);
        if let Outbound::CreateHabit { temp_id, .. } = &outbound {
            candidates.push(temp_id.clone());
        }
        let outcome = self.deliver(&outbound).await;
        if let Ok(Reply::Created(habit)) = &outcome {
            candidates.insert(0, habit.id.clone());
        }
        self.settle_all(outbound, outcome).await;

        Ok(self.read(|store| candidates.into_iter().find(|id| store.habit(id).is_some())))
    }

    pub async fn delete_habit(&self, id: HabitId) -> Result<(), IntentError> {
        self.dispatch(Intent::DeleteHabit(id)).await
    }

    pub async fn toggle_plan(&self, habit_id: HabitId, weekday: WeekdayCode) -> Result<(), IntentError> {
        self.dispatch(Intent::TogglePlan { habit_id, weekday }).await
    }

    pub async fn replicate_plan(&self) -> Result<(), IntentError> {
        self.dispatch(Intent::ReplicatePlan).await
    }

    pub async fn toggle_completion(&self, habit_id: HabitId) -> Result<(), IntentError> {
        self.dispatch(Intent::ToggleCompletion(habit_id)).await
    }

    pub async fn previous_day(&self) -> Result<(), IntentError> {
        self.dispatch(Intent::Navigate(DateNav::Previous)).await
    }

    pub async fn next_day(&self) -> Result<(), IntentError> {
        self.dispatch(Intent::Navigate(DateNav::Next)).await
    }

    pub async fn today(&self) -> Result<(), IntentError> {
        self.dispatch(Intent::Navigate(DateNav::Today)).await
    }

    pub async fn view_date(&self, instant: DateTime<Utc>) -> Result<(), IntentError> {
        self.dispatch(Intent::Navigate(DateNav::At(instant))).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::TimeZone;
    use chrono_tz::America::Sao_Paulo;

    use super::*;
    use crate::datetime::ClientZone;
    use crate::habit::{CompletionSet, WeeklyPlan};
    use crate::store::LoadStatus;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 15, 0, 0)
            .single()
            .expect("valid instant")
    }

    fn habit(id: &str, name: &str, category: Category) -> Habit {
        Habit {
            id: HabitId::from(id),
            name: name.to_string(),
            category,
        }
    }

    fn ids(raw: &[&str]) -> BTreeSet<HabitId> {
        raw.iter().map(|s| HabitId::from(*s)).collect()
    }

    fn loaded_store() -> LocalStore {
        let mut store = LocalStore::new(ClientZone::Named(Sao_Paulo), now());
        let mut plan = WeeklyPlan::default();
        plan.set_day(WeekdayCode::Mon, ids(&["1", "2"]));
        plan.set_day(WeekdayCode::Tue, ids(&["3"]));
        store.replace_all(
            vec![
                habit("1", "Run", Category::Health),
                habit("2", "Read", Category::Study),
                habit("3", "Pray", Category::Spirit),
            ],
            plan,
            CompletionSet::default(),
        );
        store.mark_ready();
        store
    }

    fn snapshot_with(habits: Vec<Habit>) -> InitSnapshot {
        InitSnapshot {
            habits,
            ..InitSnapshot::default()
        }
    }

    fn offline() -> RemoteError {
        RemoteError::Server {
            status: 503,
            body: "unavailable".to_string(),
        }
    }

    fn apply(store: &mut LocalStore, intent: Intent) -> Option<Outbound> {
        apply_intent(store, intent, now()).expect("intent applies")
    }

    #[test]
    fn toggling_completion_twice_restores_membership() {
        let mut store = loaded_store();
        let before = store.completions().clone();

        let first = apply(&mut store, Intent::ToggleCompletion(HabitId::from("1")));
        assert!(store.completions().contains(&HabitId::from("1")));
        apply(&mut store, Intent::ToggleCompletion(HabitId::from("1")));

        assert_eq!(store.completions(), &before);
        assert_eq!(
            first,
            Some(Outbound::ToggleCompletion {
                habit_id: HabitId::from("1"),
                date: store.viewed_key(),
            })
        );
    }

    #[test]
    fn created_habit_is_visible_before_confirmation_and_swapped_after() {
        let mut store = loaded_store();

        let outbound = apply(
            &mut store,
            Intent::CreateHabit(NewHabit {
                name: "  Stretch ".to_string(),
                category: Category::SelfCare,
            }),
        )
        .expect("create request");
        let Outbound::CreateHabit { temp_id, draft } = &outbound else {
            panic!("expected a create request, got {outbound:?}");
        };
        assert!(temp_id.is_temporary());
        assert_eq!(draft.name, "Stretch");
        assert_eq!(store.habit(temp_id).map(|h| h.name.as_str()), Some("Stretch"));

        let follow_up = settle(
            &mut store,
            outbound.clone(),
            Ok(Reply::Created(habit("40", "Stretch", Category::SelfCare))),
            CreateFailurePolicy::Retain,
        );

        assert_eq!(follow_up, None);
        let stretch: Vec<&Habit> =
            store.habits().iter().filter(|h| h.name == "Stretch").collect();
        assert_eq!(stretch.len(), 1);
        assert_eq!(stretch[0].id.as_str(), "40");
        assert!(store.habits().iter().all(|h| !h.id.is_temporary()));
    }

    #[test]
    fn blank_habit_names_are_rejected_without_local_effect() {
        let mut store = loaded_store();
        let revision = store.revision();

        let result = apply_intent(
            &mut store,
            Intent::CreateHabit(NewHabit {
                name: "   ".to_string(),
                category: Category::Other,
            }),
            now(),
        );

        assert_eq!(result, Err(IntentError::EmptyName));
        assert_eq!(store.revision(), revision);
        assert_eq!(store.habits().len(), 3);
    }

    #[test]
    fn failed_create_follows_policy() {
        let draft = NewHabit {
            name: "Journal".to_string(),
            category: Category::Mind,
        };

        let mut retained = loaded_store();
        let outbound = apply(&mut retained, Intent::CreateHabit(draft.clone())).expect("request");
        assert_eq!(
            settle(&mut retained, outbound, Err(offline()), CreateFailurePolicy::Retain),
            None
        );
        assert!(retained.habits().iter().any(|h| h.id.is_temporary()));

        let mut rolled_back = loaded_store();
        let outbound =
            apply(&mut rolled_back, Intent::CreateHabit(draft.clone())).expect("request");
        if let Outbound::CreateHabit { temp_id, .. } = &outbound {
            apply(&mut rolled_back, Intent::ToggleCompletion(temp_id.clone()));
        }
        settle(&mut rolled_back, outbound, Err(offline()), CreateFailurePolicy::Rollback);
        assert_eq!(rolled_back.habits().len(), 3);
        assert!(rolled_back.completions().is_empty());

        let mut reloaded = loaded_store();
        let outbound = apply(&mut reloaded, Intent::CreateHabit(draft)).expect("request");
        let follow_up =
            settle(&mut reloaded, outbound, Err(offline()), CreateFailurePolicy::Reload);
        assert!(matches!(follow_up, Some(Outbound::FetchInit { .. })));
        assert_eq!(reloaded.status(), LoadStatus::Loading);
    }

    #[test]
    fn deleting_an_unconfirmed_habit_deletes_the_confirmed_one_later() {
        let mut store = loaded_store();
        let outbound = apply(
            &mut store,
            Intent::CreateHabit(NewHabit {
                name: "Nap".to_string(),
                category: Category::SelfCare,
            }),
        )
        .expect("create request");
        let Outbound::CreateHabit { temp_id, .. } = &outbound else {
            panic!("expected a create request");
        };

        assert_eq!(apply(&mut store, Intent::DeleteHabit(temp_id.clone())), None);

        let follow_up = settle(
            &mut store,
            outbound,
            Ok(Reply::Created(habit("77", "Nap", Category::SelfCare))),
            CreateFailurePolicy::Retain,
        );
        assert_eq!(follow_up, Some(Outbound::DeleteHabit(HabitId::from("77"))));
        assert!(store.habit(&HabitId::from("77")).is_none());
    }

    #[test]
    fn load_landing_mid_create_keeps_the_confirmed_habit() {
        let mut store = loaded_store();
        let create = apply(
            &mut store,
            Intent::CreateHabit(NewHabit {
                name: "Nap".to_string(),
                category: Category::SelfCare,
            }),
        )
        .expect("create request");
        let refresh = apply(&mut store, Intent::Refresh).expect("fetch");
        settle(
            &mut store,
            refresh,
            Ok(Reply::Snapshot(snapshot_with(vec![habit("1", "Run", Category::Health)]))),
            CreateFailurePolicy::Retain,
        );

        let follow_up = settle(
            &mut store,
            create,
            Ok(Reply::Created(habit("77", "Nap", Category::SelfCare))),
            CreateFailurePolicy::Retain,
        );

        assert_eq!(follow_up, None);
        let ids: Vec<&str> = store.habits().iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "77"]);
    }

    #[test]
    fn delete_is_immediate_and_fire_and_forget() {
        let mut store = loaded_store();
        let outbound = apply(&mut store, Intent::DeleteHabit(HabitId::from("2")));

        assert_eq!(outbound, Some(Outbound::DeleteHabit(HabitId::from("2"))));
        assert!(store.habit(&HabitId::from("2")).is_none());

        let follow_up = settle(
            &mut store,
            Outbound::DeleteHabit(HabitId::from("2")),
            Err(offline()),
            CreateFailurePolicy::Retain,
        );
        assert_eq!(follow_up, None);
        assert!(store.habit(&HabitId::from("2")).is_none());
        assert_eq!(store.status(), LoadStatus::Ready);
    }

    #[test]
    fn deleting_an_unknown_habit_is_an_error() {
        let mut store = loaded_store();
        let result = apply_intent(&mut store, Intent::DeleteHabit(HabitId::from("404")), now());
        assert_eq!(result, Err(IntentError::UnknownHabit(HabitId::from("404"))));
    }

    #[test]
    fn plan_toggle_rejects_unknown_habits_but_clears_stale_ones() {
        let mut store = loaded_store();

        let unknown = apply_intent(
            &mut store,
            Intent::TogglePlan {
                habit_id: HabitId::from("404"),
                weekday: WeekdayCode::Mon,
            },
            now(),
        );
        assert_eq!(unknown, Err(IntentError::UnknownHabit(HabitId::from("404"))));

        apply(&mut store, Intent::DeleteHabit(HabitId::from("1")));
        assert!(store.plan().day(WeekdayCode::Mon).contains(&HabitId::from("1")));

        apply(
            &mut store,
            Intent::TogglePlan {
                habit_id: HabitId::from("1"),
                weekday: WeekdayCode::Mon,
            },
        );
        assert_eq!(store.plan().day(WeekdayCode::Mon), &ids(&["2"]));
    }

    #[test]
    fn replicate_copies_monday_to_all_days() {
        let mut store = loaded_store();
        let monday = store.plan().day(WeekdayCode::Mon).clone();

        let outbound = apply(&mut store, Intent::ReplicatePlan);

        assert_eq!(outbound, Some(Outbound::ReplicatePlan));
        for day in WeekdayCode::ALL {
            assert_eq!(store.plan().day(day), &monday, "{day} differs from monday");
        }
    }

    #[test]
    fn navigation_clears_completions_and_loads_the_new_day() {
        let mut store = loaded_store();
        apply(&mut store, Intent::ToggleCompletion(HabitId::from("1")));

        let outbound = apply(&mut store, Intent::Navigate(DateNav::Next));

        assert_eq!(store.status(), LoadStatus::Loading);
        assert!(store.completions().is_empty());
        assert_eq!(store.viewed_key().to_string(), "2026-10-20");
        let Some(Outbound::FetchInit { date, generation }) = outbound else {
            panic!("expected a fetch");
        };
        assert_eq!(date.to_string(), "2026-10-20");

        let mut plan = WeeklyPlan::default();
        plan.set_day(WeekdayCode::Tue, ids(&["3"]));
        settle(
            &mut store,
            Outbound::FetchInit { date, generation },
            Ok(Reply::Snapshot(InitSnapshot {
                habits: vec![habit("3", "Pray", Category::Spirit)],
                plan,
                completions: [HabitId::from("3")].into_iter().collect(),
            })),
            CreateFailurePolicy::Retain,
        );

        assert_eq!(store.status(), LoadStatus::Ready);
        assert_eq!(store.viewed_weekday(), WeekdayCode::Tue);
        assert!(store.completions().contains(&HabitId::from("3")));
    }

    #[test]
    fn failed_load_sets_error_and_keeps_previous_state() {
        let mut store = loaded_store();
        let outbound = apply(&mut store, Intent::Refresh).expect("fetch");

        settle(&mut store, outbound, Err(offline()), CreateFailurePolicy::Retain);

        assert_eq!(store.status(), LoadStatus::Error);
        assert_eq!(store.habits().len(), 3);
        assert!(store.last_error().is_some());

        let retry = apply(&mut store, Intent::Refresh).expect("fetch");
        assert_eq!(store.status(), LoadStatus::Loading);
        settle(
            &mut store,
            retry,
            Ok(Reply::Snapshot(snapshot_with(vec![habit("9", "Swim", Category::Health)]))),
            CreateFailurePolicy::Retain,
        );
        assert_eq!(store.status(), LoadStatus::Ready);
        assert_eq!(store.last_error(), None);
    }

    #[test]
    fn late_answer_for_an_older_day_is_discarded() {
        let mut store = loaded_store();
        let day_a = Utc.with_ymd_and_hms(2026, 10, 21, 15, 0, 0).single().expect("day a");
        let day_b = Utc.with_ymd_and_hms(2026, 10, 22, 15, 0, 0).single().expect("day b");

        let fetch_a = apply(&mut store, Intent::Navigate(DateNav::At(day_a))).expect("fetch a");
        let fetch_b = apply(&mut store, Intent::Navigate(DateNav::At(day_b))).expect("fetch b");

        settle(
            &mut store,
            fetch_b,
            Ok(Reply::Snapshot(snapshot_with(vec![habit("b", "From B", Category::Work)]))),
            CreateFailurePolicy::Retain,
        );
        settle(
            &mut store,
            fetch_a,
            Ok(Reply::Snapshot(snapshot_with(vec![habit("a", "From A", Category::Work)]))),
            CreateFailurePolicy::Retain,
        );

        assert_eq!(store.viewed_key().to_string(), "2026-10-22");
        assert_eq!(store.habits().len(), 1);
        assert_eq!(store.habits()[0].name, "From B");
        assert_eq!(store.status(), LoadStatus::Ready);
    }

    #[test]
    fn late_failure_for_an_older_day_does_not_flag_an_error() {
        let mut store = loaded_store();
        let fetch_a = apply(&mut store, Intent::Navigate(DateNav::Previous)).expect("fetch a");
        let fetch_b = apply(&mut store, Intent::Navigate(DateNav::Today)).expect("fetch b");

        settle(
            &mut store,
            fetch_b,
            Ok(Reply::Snapshot(InitSnapshot::default())),
            CreateFailurePolicy::Retain,
        );
        settle(&mut store, fetch_a, Err(offline()), CreateFailurePolicy::Retain);

        assert_eq!(store.status(), LoadStatus::Ready);
        assert_eq!(store.last_error(), None);
    }

    #[test]
    fn policies_parse_from_config_values() {
        assert_eq!(
            "Rollback".parse::<CreateFailurePolicy>().expect("parse"),
            CreateFailurePolicy::Rollback
        );
        assert_eq!(
            "keep".parse::<CreateFailurePolicy>().expect("parse"),
            CreateFailurePolicy::Retain
        );
        assert!("retry".parse::<CreateFailurePolicy>().is_err());
    }
}
