//! HTTP client for the habit service.
//!
//! Every mutation endpoint is a best-effort notification: the engine issues
//! each request at most once and never retries. Only habit creation carries a
//! response body the client depends on; `/init` is the sole source of truth
//! for a full refresh.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Url, header};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::datetime::{CalendarKey, WeekdayCode};
use crate::habit::{CompletionSet, Habit, HabitId, NewHabit, WeeklyPlan};

/// Remote call failure
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Body was not the JSON we expected
    #[error("unexpected payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Service answered with a non-success status
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("invalid base url '{url}': {reason}")]
    BaseUrl { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Full account state for one calendar day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitSnapshot {
    pub habits: Vec<Habit>,
    pub plan: WeeklyPlan,
    pub completions: CompletionSet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitPayload {
    #[serde(default)]
    rotina_base: Vec<Habit>,
    #[serde(default)]
    plano_semanal: BTreeMap<WeekdayCode, Vec<HabitId>>,
    #[serde(default)]
    concluidas_hoje: Vec<HabitId>,
}

impl InitSnapshot {
    pub fn from_json(raw: &str) -> Result<Self> {
        let payload: InitPayload = serde_json::from_str(raw)?;
        Ok(Self {
            habits: payload.rotina_base,
            plan: WeeklyPlan::from_wire(payload.plano_semanal),
            completions: payload.concluidas_hoje.into_iter().collect(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanToggleBody<'a> {
    habito_id: &'a HabitId,
    dia_semana: WeekdayCode,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionToggleBody<'a> {
    habito_id: &'a HabitId,
    data: CalendarKey,
}

/// The five mutation endpoints plus the snapshot fetch.
pub trait RemoteService: Send + Sync {
    fn fetch_init(&self, date: CalendarKey) -> impl Future<Output = Result<InitSnapshot>> + Send;

    fn create_habit(&self, draft: &NewHabit) -> impl Future<Output = Result<Habit>> + Send;

    fn delete_habit(&self, id: &HabitId) -> impl Future<Output = Result<()>> + Send;

    fn toggle_plan(
        &self,
        habit_id: &HabitId,
        weekday: WeekdayCode,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Copies Monday's assignment to every weekday server-side.
    fn replicate_plan(&self) -> impl Future<Output = Result<()>> + Send;

    fn toggle_completion(
        &self,
        habit_id: &HabitId,
        date: CalendarKey,
    ) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Service root, e.g. `https://habits.example.com/api`
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct HttpRemote {
    base: Url,
    client: Client,
}

impl HttpRemote {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let raw = config.base_url.trim();
        let base = Url::parse(raw).map_err(|err| RemoteError::BaseUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::BaseUrl {
                url: raw.to_string(),
                reason: "url cannot carry a path".to_string(),
            });
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { base, client })
    }

    async fn execute(&self, request: RequestBuilder) -> Result<String> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "remote response");

        if !status.is_success() {
            return Err(RemoteError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn post(&self, url: Url, body: Option<Vec<u8>>) -> RequestBuilder {
        let request = self.client.post(url);
        match body {
            Some(bytes) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(bytes),
            None => request,
        }
    }
}

impl RemoteService for HttpRemote {
    #[tracing::instrument(skip(self), fields(date = %date))]
    async fn fetch_init(&self, date: CalendarKey) -> Result<InitSnapshot> {
        let mut url = endpoint(&self.base, &["init"])?;
        url.query_pairs_mut().append_pair("data", &date.to_string());

        let body = self.execute(self.client.get(url)).await?;
        InitSnapshot::from_json(&body)
    }

    #[tracing::instrument(skip(self, draft), fields(name = %draft.name, category = %draft.category))]
    async fn create_habit(&self, draft: &NewHabit) -> Result<Habit> {
        let url = endpoint(&self.base, &["habitos"])?;
        let payload = serde_json::to_vec(draft)?;

        let body = self.execute(self.post(url, Some(payload))).await?;
        Ok(serde_json::from_str(&body)?)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    async fn delete_habit(&self, id: &HabitId) -> Result<()> {
        let url = endpoint(&self.base, &["habitos", id.as_str()])?;
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(habit_id = %habit_id, weekday = %weekday))]
    async fn toggle_plan(&self, habit_id: &HabitId, weekday: WeekdayCode) -> Result<()> {
        let url = endpoint(&self.base, &["plano", "toggle"])?;
        let payload = serde_json::to_vec(&PlanToggleBody {
            habito_id: habit_id,
            dia_semana: weekday,
        })?;
        self.execute(self.post(url, Some(payload))).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn replicate_plan(&self) -> Result<()> {
        let url = endpoint(&self.base, &["plano", "replicar"])?;
        self.execute(self.post(url, None)).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(habit_id = %habit_id, date = %date))]
    async fn toggle_completion(&self, habit_id: &HabitId, date: CalendarKey) -> Result<()> {
        let url = endpoint(&self.base, &["execucao", "toggle"])?;
        let payload = serde_json::to_vec(&CompletionToggleBody {
            habito_id: habit_id,
            data: date,
        })?;
        self.execute(self.post(url, Some(payload))).await?;
        Ok(())
    }
}

/// Appends path segments to the base url, percent-encoding each one.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| RemoteError::BaseUrl {
            url: base.to_string(),
            reason: "url cannot carry a path".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
