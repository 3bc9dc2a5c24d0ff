mod commands;
pub mod db;
pub mod models;
pub mod persistence;
pub mod quiz;
pub mod session;
pub mod settings;
pub mod timing;

use std::sync::Arc;

use anyhow::{Context, Result};
use commands::{dispatch, Reply, HELP};
use db::Database;
use log::{error, info, warn};
use quiz::{HttpQuizGenerator, QuizGenerator, UnconfiguredGenerator};
use session::{SessionController, SessionDeps, SessionEvent, SessionState};
use settings::SettingsStore;
use timing::{SystemClock, TokioScheduler};
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};

pub(crate) struct AppState {
    pub(crate) controller: SessionController,
    pub(crate) db: Database,
    pub(crate) settings: SettingsStore,
    pub(crate) user_id: String,
}

pub fn run() {
    // RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Skill Forge starting up...");

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the tokio runtime")
        .and_then(|runtime| runtime.block_on(serve()));

    if let Err(err) = result {
        error!("Skill Forge stopped: {err:#}");
        std::process::exit(1);
    }
}

async fn serve() -> Result<()> {
    let data_dir = settings::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let config = settings_store.effective();
    info!("Settings loaded from {}", settings_store.path().display());

    let database = Database::new(data_dir.join("skill_forge.sqlite3"))?;
    let profile = database
        .ensure_profile(&config.user_id, &config.username)
        .await?;
    info!(
        "Profile {} is {} with {} xp",
        profile.user_id,
        profile.rank().title,
        profile.xp
    );

    let quiz_generator: Arc<dyn QuizGenerator> = if config.quiz_endpoint.trim().is_empty() {
        warn!("No quiz endpoint configured; quizzes will fail until one is set");
        Arc::new(UnconfiguredGenerator)
    } else {
        Arc::new(HttpQuizGenerator::new(
            &config.quiz_endpoint,
            config.request_timeout(),
        )?)
    };

    let controller = SessionController::new(
        config.user_id.clone(),
        config.reward_formula,
        SessionDeps {
            clock: Arc::new(SystemClock),
            scheduler: Arc::new(TokioScheduler::current()?),
            quiz_generator,
            persistence: Arc::new(database.clone()),
        },
    );
    controller.select_duration(config.default_duration_seconds())?;

    let notifier = tokio::spawn(announce_events(controller.subscribe()));

    let state = AppState {
        controller: controller.clone(),
        db: database,
        settings: settings_store,
        user_id: config.user_id,
    };

    println!("{HELP}");
    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        match dispatch(&state, &line).await {
            Ok(Reply::Output(output)) if !output.is_empty() => println!("{output}"),
            Ok(Reply::Output(_)) => {}
            Ok(Reply::Quit) => break,
            Err(message) => eprintln!("error: {message}"),
        }
    }

    if matches!(
        controller.state(),
        SessionState::Running | SessionState::Paused
    ) {
        controller.abandon_session()?;
    }
    controller.flush_pending_writes().await;
    notifier.abort();

    info!("Skill Forge shut down cleanly");
    Ok(())
}

/// Prints the transitions that happen without a command, such as the
/// countdown running out.
async fn announce_events(mut events: tokio::sync::broadcast::Receiver<SessionEvent>) {
    let mut last_state = SessionState::Idle;
    loop {
        match events.recv().await {
            Ok(SessionEvent::StateChanged { snapshot }) => {
                if snapshot.state == last_state {
                    continue;
                }
                if snapshot.state == SessionState::CompletionSelect {
                    println!(
                        "Time! {}s of focus. Mark finished sub-tasks with `toggle`, then `confirm`.",
                        snapshot.focus_seconds
                    );
                } else if last_state == SessionState::Paused
                    && snapshot.state == SessionState::Running
                {
                    println!("Back to work, {}s left", snapshot.remaining_seconds);
                }
                last_state = snapshot.state;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event listener skipped {skipped} events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
