use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    persistence::Persistence,
    quiz::{self, QuizGenerator, QuizQuestion, QuizResult},
    timing::{Clock, Scheduler, TickCallback, TickHandle},
};

use super::{Reward, RewardFormula, SessionError, SessionResult, SessionSnapshot, SessionState};

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimerKind {
    Countdown,
    PauseAllowance,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    StateChanged {
        snapshot: SessionSnapshot,
    },
    Tick {
        state: SessionState,
        remaining_seconds: u64,
        pause_allowance_seconds: u64,
    },
    RewardGranted {
        reward: Reward,
        score: u32,
    },
    QuizFailed {
        message: String,
    },
}

/// External collaborators the controller drives.
pub struct SessionDeps {
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<dyn Scheduler>,
    pub quiz_generator: Arc<dyn QuizGenerator>,
    pub persistence: Arc<dyn Persistence>,
}

struct ActiveTimer {
    kind: TimerKind,
    generation: u64,
    handle: TickHandle,
}

#[derive(Default)]
struct Inner {
    snapshot: SessionSnapshot,
    /// Sub-task id to the quest that owns it, for routing completion writes.
    subtask_owners: HashMap<String, String>,
    /// At most one timer exists; starting one always cancels the other.
    timer: Option<ActiveTimer>,
    next_generation: u64,
    quiz: Vec<QuizQuestion>,
    quiz_results: Vec<QuizResult>,
    generating: bool,
    last_reward: Option<Reward>,
    pending_writes: Vec<JoinHandle<()>>,
}

struct Shared {
    inner: Mutex<Inner>,
    user_id: String,
    formula: RewardFormula,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    quiz_generator: Arc<dyn QuizGenerator>,
    persistence: Arc<dyn Persistence>,
    events: broadcast::Sender<SessionEvent>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = match self.inner.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        cancel_timer(inner);
    }
}

/// Owns one focus session from sub-task selection through reward claim.
/// Cloning is cheap; clones drive the same session.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(user_id: impl Into<String>, formula: RewardFormula, deps: SessionDeps) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                user_id: user_id.into(),
                formula,
                clock: deps.clock,
                scheduler: deps.scheduler,
                quiz_generator: deps.quiz_generator,
                persistence: deps.persistence,
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().snapshot.clone()
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().snapshot.state
    }

    pub fn active_timer(&self) -> Option<TimerKind> {
        self.shared.lock().timer.as_ref().map(|timer| timer.kind)
    }

    pub fn quiz(&self) -> Vec<QuizQuestion> {
        self.shared.lock().quiz.clone()
    }

    pub fn quiz_results(&self) -> Vec<QuizResult> {
        self.shared.lock().quiz_results.clone()
    }

    pub fn last_reward(&self) -> Option<Reward> {
        self.shared.lock().last_reward
    }

    pub fn is_generating_quiz(&self) -> bool {
        self.shared.lock().generating
    }

    pub fn select_duration(&self, seconds: u64) -> SessionResult<()> {
        let mut inner = self.shared.lock();
        require(&inner, &[SessionState::Idle], "change the duration")?;
        if seconds == 0 {
            return Err(SessionError::validation("duration must be greater than zero"));
        }
        inner.snapshot.selected_duration_seconds = seconds;
        self.shared.emit_state(&inner);
        Ok(())
    }

    /// Returns true if the sub-task is now selected.
    pub fn toggle_subtask_selection(&self, quest_id: &str, subtask_id: &str) -> SessionResult<bool> {
        let mut inner = self.shared.lock();
        require(&inner, &[SessionState::Idle], "change the selection")?;
        let selected = inner.snapshot.toggle_selection(subtask_id);
        if selected {
            inner
                .subtask_owners
                .insert(subtask_id.to_string(), quest_id.to_string());
        } else {
            inner.subtask_owners.remove(subtask_id);
        }
        self.shared.emit_state(&inner);
        Ok(selected)
    }

    pub fn start_session(&self) -> SessionResult<SessionSnapshot> {
        let mut inner = self.shared.lock();
        require(&inner, &[SessionState::Idle], "start a session")?;
        if inner.snapshot.selected_subtask_ids.is_empty() {
            return Err(SessionError::validation("select at least one sub-task"));
        }

        inner.snapshot.begin_session();
        self.shared.start_timer(&mut inner, TimerKind::Countdown);

        info!(
            "Session started: {}s with {} sub-tasks, {}s pause allowance",
            inner.snapshot.total_seconds,
            inner.snapshot.selected_subtask_ids.len(),
            inner.snapshot.pause_allowance_seconds
        );
        self.shared.emit_state(&inner);
        Ok(inner.snapshot.clone())
    }

    pub fn pause_session(&self) -> SessionResult<()> {
        let mut inner = self.shared.lock();
        require(&inner, &[SessionState::Running], "pause")?;

        inner.snapshot.state = SessionState::Paused;
        inner.snapshot.last_backgrounded_at = None;
        self.shared.emit_state(&inner);

        // An empty budget pauses and resumes in one step.
        if inner.snapshot.pause_allowance_seconds == 0 {
            info!("No pause allowance left; resuming");
            self.shared.resume_locked(&mut inner);
            return Ok(());
        }

        self.shared.start_timer(&mut inner, TimerKind::PauseAllowance);
        info!(
            "Session paused with {}s of allowance",
            inner.snapshot.pause_allowance_seconds
        );
        Ok(())
    }

    pub fn resume_session(&self) -> SessionResult<()> {
        let mut inner = self.shared.lock();
        require(&inner, &[SessionState::Paused], "resume")?;
        self.shared.resume_locked(&mut inner);
        Ok(())
    }

    pub fn abandon_session(&self) -> SessionResult<()> {
        let mut inner = self.shared.lock();
        require(
            &inner,
            &[SessionState::Running, SessionState::Paused],
            "abandon",
        )?;

        cancel_timer(&mut inner);
        info!(
            "Session abandoned after {}s of focus",
            inner.snapshot.focus_seconds
        );
        reset_session(&mut inner);
        self.shared.emit_state(&inner);
        Ok(())
    }

    pub fn on_app_backgrounded(&self) {
        let mut inner = self.shared.lock();
        if inner.snapshot.state != SessionState::Running {
            return;
        }
        inner.snapshot.last_backgrounded_at = Some(self.shared.clock.now());
        debug!("App backgrounded during a running session");
    }

    pub fn on_app_foregrounded(&self) {
        let mut inner = self.shared.lock();
        if inner.snapshot.state != SessionState::Running {
            return;
        }
        let Some(since) = inner.snapshot.last_backgrounded_at.take() else {
            return;
        };

        let elapsed = (self.shared.clock.now() - since).num_seconds();
        let elapsed = u64::try_from(elapsed).unwrap_or(0);
        if elapsed == 0 {
            return;
        }

        let finished = inner.snapshot.charge_distraction(elapsed);
        info!(
            "Charged {elapsed}s of distraction, {}s remaining",
            inner.snapshot.remaining_seconds
        );

        if finished {
            self.shared.finish_countdown(&mut inner);
        } else {
            self.shared.emit_state(&inner);
        }
    }

    /// Returns true if the id is selected for this session and was toggled.
    pub fn toggle_subtask_completion(&self, subtask_id: &str) -> SessionResult<bool> {
        let mut inner = self.shared.lock();
        require(
            &inner,
            &[SessionState::CompletionSelect],
            "mark sub-tasks",
        )?;
        let toggled = inner.snapshot.toggle_completion(subtask_id);
        if toggled {
            self.shared.emit_state(&inner);
        }
        Ok(toggled)
    }

    pub fn confirm_completion(&self) -> SessionResult<()> {
        let mut inner = self.shared.lock();
        require(
            &inner,
            &[SessionState::CompletionSelect],
            "confirm completion",
        )?;
        inner.snapshot.state = SessionState::Reporting;
        self.shared.emit_state(&inner);
        Ok(())
    }

    /// Asks the quiz generator for questions about `summary`. Failure keeps
    /// the session in `Reporting` so the user can edit and retry.
    pub async fn generate_quiz(&self, summary: &str) -> SessionResult<Vec<QuizQuestion>> {
        {
            let mut inner = self.shared.lock();
            require(&inner, &[SessionState::Reporting], "generate a quiz")?;
            if summary.trim().is_empty() {
                return Err(SessionError::validation(
                    "write a summary of what you learned first",
                ));
            }
            if inner.generating {
                return Err(SessionError::validation(
                    "quiz generation is already in progress",
                ));
            }
            inner.generating = true;
        }

        let in_flight = GeneratingFlag {
            shared: &self.shared,
        };
        let outcome = self.shared.quiz_generator.generate(summary.trim()).await;
        drop(in_flight);

        let mut inner = self.shared.lock();
        require(&inner, &[SessionState::Reporting], "accept a quiz")?;

        let message = match outcome {
            Ok(questions) => {
                let questions: Vec<QuizQuestion> = questions
                    .into_iter()
                    .filter(QuizQuestion::is_well_formed)
                    .collect();
                if !questions.is_empty() {
                    info!("Quiz ready with {} questions", questions.len());
                    inner.quiz = questions.clone();
                    inner.snapshot.state = SessionState::Quiz;
                    self.shared.emit_state(&inner);
                    return Ok(questions);
                }
                "no usable questions came back; add more detail to the summary".to_string()
            }
            Err(err) => format!("{err:#}"),
        };

        warn!("Quiz generation failed: {message}");
        self.shared.emit(SessionEvent::QuizFailed {
            message: message.clone(),
        });
        Err(SessionError::Generation(message))
    }

    /// Grades one answer per question, then completes the quiz with the score.
    pub async fn submit_answers(&self, answers: &[usize]) -> SessionResult<Reward> {
        let score = {
            let mut inner = self.shared.lock();
            require(&inner, &[SessionState::Quiz], "submit answers")?;
            if answers.len() != inner.quiz.len() {
                return Err(SessionError::validation(format!(
                    "expected {} answers, got {}",
                    inner.quiz.len(),
                    answers.len()
                )));
            }
            let results = quiz::grade(&inner.quiz, answers);
            let score = quiz::score(&results);
            inner.quiz_results = results;
            score
        };
        self.complete_quiz(score).await
    }

    /// Grants the reward and queues the writes without waiting for them. A
    /// failed write is logged; the reward still stands.
    pub async fn complete_quiz(&self, score: u32) -> SessionResult<Reward> {
        let mut inner = self.shared.lock();
        require(&inner, &[SessionState::Quiz], "complete the quiz")?;
        if score as usize > inner.quiz.len() {
            return Err(SessionError::validation(format!(
                "score {score} exceeds quiz length {}",
                inner.quiz.len()
            )));
        }

        let reward = self
            .shared
            .formula
            .compute(inner.snapshot.focus_seconds, score);
        inner.last_reward = Some(reward);
        inner.snapshot.state = SessionState::Reward;

        let completions = completions_by_quest(&inner);
        let persistence = self.shared.persistence.clone();
        let user_id = self.shared.user_id.clone();
        let write = tokio::spawn(async move {
            if let Err(err) = persistence
                .write_reward(&user_id, reward.xp, reward.coins)
                .await
            {
                error!("Failed to save reward for {user_id}: {err:#}");
            }
            for (quest_id, subtask_ids) in completions {
                if let Err(err) = persistence
                    .mark_subtasks_completed(&quest_id, &subtask_ids)
                    .await
                {
                    error!("Failed to mark sub-tasks of quest {quest_id}: {err:#}");
                }
            }
        });
        inner.pending_writes.retain(|handle| !handle.is_finished());
        inner.pending_writes.push(write);

        info!(
            "Quiz scored {score}/{}: +{} xp, +{} coins",
            inner.quiz.len(),
            reward.xp,
            reward.coins
        );
        self.shared.emit(SessionEvent::RewardGranted { reward, score });
        self.shared.emit_state(&inner);
        Ok(reward)
    }

    pub fn claim_reward(&self) -> SessionResult<Reward> {
        let mut inner = self.shared.lock();
        require(&inner, &[SessionState::Reward], "claim a reward")?;
        let reward = inner.last_reward.unwrap_or_default();
        reset_session(&mut inner);
        self.shared.emit_state(&inner);
        Ok(reward)
    }

    /// Waits for queued persistence writes. Their failures were already logged.
    pub async fn flush_pending_writes(&self) {
        let pending = std::mem::take(&mut self.shared.lock().pending_writes);
        for handle in pending {
            if let Err(err) = handle.await {
                error!("Persistence task failed to join: {err}");
            }
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn start_timer(self: &Arc<Self>, inner: &mut Inner, kind: TimerKind) {
        cancel_timer(inner);

        inner.next_generation += 1;
        let generation = inner.next_generation;
        let weak = Arc::downgrade(self);
        let callback: TickCallback = Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_tick(kind, generation);
            }
        });

        let handle = self.scheduler.schedule_repeating(TICK_INTERVAL, callback);
        inner.timer = Some(ActiveTimer {
            kind,
            generation,
            handle,
        });
    }

    fn on_tick(self: &Arc<Self>, kind: TimerKind, generation: u64) {
        let mut inner = self.lock();
        let live = inner
            .timer
            .as_ref()
            .is_some_and(|timer| timer.kind == kind && timer.generation == generation);
        if !live {
            debug!("Discarding stale {kind:?} tick #{generation}");
            return;
        }

        match kind {
            TimerKind::Countdown => {
                let finished = inner.snapshot.tick_countdown();
                self.emit_tick(&inner);
                if finished {
                    self.finish_countdown(&mut inner);
                }
            }
            TimerKind::PauseAllowance => {
                let exhausted = inner.snapshot.tick_pause_allowance();
                self.emit_tick(&inner);
                if exhausted {
                    info!("Pause allowance used up; resuming");
                    self.resume_locked(&mut inner);
                }
            }
        }
    }

    fn resume_locked(self: &Arc<Self>, inner: &mut Inner) {
        inner.snapshot.state = SessionState::Running;
        self.start_timer(inner, TimerKind::Countdown);
        info!(
            "Session resumed with {}s remaining",
            inner.snapshot.remaining_seconds
        );
        self.emit_state(inner);
    }

    fn finish_countdown(&self, inner: &mut Inner) {
        cancel_timer(inner);
        inner.snapshot.state = SessionState::CompletionSelect;
        inner.snapshot.last_backgrounded_at = None;
        info!(
            "Session finished: {}s focus, {}s distraction",
            inner.snapshot.focus_seconds, inner.snapshot.distraction_seconds
        );
        self.emit_state(inner);
    }

    fn emit_state(&self, inner: &Inner) {
        self.emit(SessionEvent::StateChanged {
            snapshot: inner.snapshot.clone(),
        });
    }

    fn emit_tick(&self, inner: &Inner) {
        self.emit(SessionEvent::Tick {
            state: inner.snapshot.state,
            remaining_seconds: inner.snapshot.remaining_seconds,
            pause_allowance_seconds: inner.snapshot.pause_allowance_seconds,
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Clears `Inner::generating` when a quiz request ends, including when the
/// caller drops the `generate_quiz` future mid-request.
struct GeneratingFlag<'a> {
    shared: &'a Shared,
}

impl Drop for GeneratingFlag<'_> {
    fn drop(&mut self) {
        self.shared.lock().generating = false;
    }
}

fn cancel_timer(inner: &mut Inner) {
    if let Some(timer) = inner.timer.take() {
        timer.handle.cancel();
    }
}

fn reset_session(inner: &mut Inner) {
    inner.snapshot.reset();
    inner.subtask_owners.clear();
    inner.quiz.clear();
    inner.quiz_results.clear();
    inner.last_reward = None;
}

fn require(inner: &Inner, allowed: &[SessionState], action: &'static str) -> SessionResult<()> {
    let state = inner.snapshot.state;
    if allowed.contains(&state) {
        Ok(())
    } else {
        Err(SessionError::InvalidTransition { action, state })
    }
}

fn completions_by_quest(inner: &Inner) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for subtask_id in &inner.snapshot.completed_subtask_ids {
        match inner.subtask_owners.get(subtask_id) {
            Some(quest_id) => grouped
                .entry(quest_id.clone())
                .or_default()
                .push(subtask_id.clone()),
            None => warn!("Sub-task {subtask_id} has no owning quest; skipping"),
        }
    }
    grouped
}
