use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::cli::{Command, PlanAction};
use crate::datetime::parse_date_expr;
use crate::engine::SyncEngine;
use crate::habit::{Category, HabitId};
use crate::remote::RemoteService;
use crate::render::Renderer;
use crate::session::Screen;
use crate::store::LoadStatus;
use crate::view::DayView;

/// Loads the requested day, runs the command against the engine and renders
/// the resulting screen. With no command the last visited screen is shown.
#[tracing::instrument(skip(engine, renderer, command, now), fields(command = command.as_ref().map_or("-", Command::name)))]
pub async fn dispatch<R: RemoteService>(
    engine: &SyncEngine<R>,
    renderer: &Renderer,
    command: Option<Command>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let zone = engine.read(|store| store.zone());
    let target = match command.as_ref().and_then(Command::date_expr) {
        Some(expr) => parse_date_expr(expr, now, &zone)?,
        None => now,
    };

    engine.view_date(target).await?;
    let failure = engine.read(|store| {
        (store.status() == LoadStatus::Error).then(|| {
            format!(
                "could not load {}: {}",
                store.viewed_key(),
                store.last_error().unwrap_or("unknown error")
            )
        })
    });
    if let Some(message) = failure {
        return Err(anyhow!(message));
    }

    let Some(command) = command else {
        let screen = engine.read(|store| store.screen());
        debug!(screen = screen.as_str(), "no command, showing last screen");
        return show(engine, renderer, screen, now);
    };

    match command {
        Command::Today { .. } => {
            engine.set_screen(Screen::Today);
        }
        Command::Add { name, category } => {
            let name = name.join(" ");
            let created = engine
                .create_habit(name.clone(), category.unwrap_or(Category::Other))
                .await?;
            match created {
                Some(id) if id.is_temporary() => renderer.print_notice(&format!(
                    "Added '{name}' locally; the service has not confirmed it yet."
                ))?,
                Some(id) => renderer.print_notice(&format!("Added '{name}' as {id}."))?,
                None => renderer.print_notice(&format!("'{name}' was not kept."))?,
            }
            engine.set_screen(Screen::Library);
        }
        Command::Rm { id } => {
            let id = HabitId::new(id);
            let name = engine
                .read(|store| store.habit(&id).map(|h| h.name.clone()))
                .unwrap_or_else(|| id.to_string());
            engine.delete_habit(id).await?;
            renderer.print_notice(&format!("Removed '{name}'."))?;
            engine.set_screen(Screen::Library);
        }
        Command::Done { id, .. } => {
            engine.toggle_completion(HabitId::new(id)).await?;
            engine.set_screen(Screen::Today);
        }
        Command::Plan { action } => {
            match action {
                Some(PlanAction::Toggle { id, day }) => {
                    engine.toggle_plan(HabitId::new(id), day).await?;
                }
                Some(PlanAction::Replicate) => {
                    engine.replicate_plan().await?;
                }
                None => {}
            }
            engine.set_screen(Screen::Plan);
        }
        Command::Library => {
            engine.set_screen(Screen::Library);
        }
        Command::Stats { .. } => {
            engine.set_screen(Screen::Stats);
        }
    }

    let screen = engine.read(|store| store.screen());
    info!(screen = screen.as_str(), "command finished");
    show(engine, renderer, screen, now)
}

fn show<R: RemoteService>(
    engine: &SyncEngine<R>,
    renderer: &Renderer,
    screen: Screen,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    match screen {
        Screen::Today => {
            let view = engine.read(|store| DayView::derive(store, now));
            renderer.print_day(&view)
        }
        Screen::Stats => {
            let view = engine.read(|store| DayView::derive(store, now));
            renderer.print_stats(&view)
        }
        Screen::Library => {
            let habits = engine.read(|store| store.habits().to_vec());
            renderer.print_library(&habits)
        }
        Screen::Plan => {
            let (habits, plan) = engine.read(|store| (store.habits().to_vec(), store.plan().clone()));
            renderer.print_plan(&habits, &plan)
        }
    }
}
