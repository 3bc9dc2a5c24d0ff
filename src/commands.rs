//! Line commands for the interactive shell. Each handler maps its errors to
//! a `String` so the shell can print them and keep going.

use chrono::Utc;

use crate::{
    models::{rank_progress, Quest, QuestDifficulty},
    quiz::QuizQuestion,
    session::{Reward, SessionSnapshot},
    AppState,
};

pub const HELP: &str = "\
quests                          list active quests
quest-add <difficulty> <title>: <sub>; <sub>...
select <quest#.sub#>            toggle a sub-task for the next session
duration <minutes>              set and remember the session length
start | pause | resume | abandon
background | foreground         simulate the app leaving / returning
toggle <quest#.sub#>            mark a sub-task done after the session
confirm                         finish marking sub-tasks
report <what you learned>       generate the retention quiz
answer <n> <n>...               answer each question by option number
claim                           claim the reward
status | profile | help | quit";

#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Output(String),
    Quit,
}

pub async fn dispatch(state: &AppState, line: &str) -> Result<Reply, String> {
    let line = line.trim();
    let (command, args) = match line.split_once(char::is_whitespace) {
        Some((command, args)) => (command, args.trim()),
        None => (line, ""),
    };

    let output = match command {
        "" => String::new(),
        "help" => HELP.to_string(),
        "quests" => list_quests(state).await?,
        "quest-add" => add_quest(state, args).await?,
        "select" => select_subtask(state, args).await?,
        "duration" => set_duration(state, args)?,
        "start" => {
            let snapshot = state.controller.start_session().map_err(|e| e.to_string())?;
            format!("Focus! {} on the clock", format_clock(snapshot.remaining_seconds))
        }
        "pause" => {
            state.controller.pause_session().map_err(|e| e.to_string())?;
            render_status(&state.controller.snapshot())
        }
        "resume" => {
            state.controller.resume_session().map_err(|e| e.to_string())?;
            render_status(&state.controller.snapshot())
        }
        "abandon" => {
            state.controller.abandon_session().map_err(|e| e.to_string())?;
            "Session abandoned".to_string()
        }
        "background" => {
            state.controller.on_app_backgrounded();
            String::new()
        }
        "foreground" => {
            state.controller.on_app_foregrounded();
            render_status(&state.controller.snapshot())
        }
        "toggle" => toggle_completion(state, args).await?,
        "confirm" => {
            state.controller.confirm_completion().map_err(|e| e.to_string())?;
            "What did you learn? Use `report <summary>`".to_string()
        }
        "report" => {
            let questions = state
                .controller
                .generate_quiz(args)
                .await
                .map_err(|e| e.to_string())?;
            render_quiz(&questions)
        }
        "answer" => submit_answers(state, args).await?,
        "claim" => {
            let reward = state.controller.claim_reward().map_err(|e| e.to_string())?;
            format!("Claimed {}", render_reward(&reward))
        }
        "status" => render_status(&state.controller.snapshot()),
        "profile" => show_profile(state).await?,
        "quit" | "exit" => return Ok(Reply::Quit),
        other => return Err(format!("unknown command `{other}`; try `help`")),
    };

    Ok(Reply::Output(output))
}

async fn list_quests(state: &AppState) -> Result<String, String> {
    let quests = active_quests(state).await?;
    if quests.is_empty() {
        return Ok("No active quests. Add one with `quest-add`.".to_string());
    }

    let selected = state.controller.snapshot().selected_subtask_ids;
    let mut lines = Vec::new();
    for (quest_number, quest) in quests.iter().enumerate() {
        lines.push(format!(
            "{}. {} [{}, {} xp] {:.0}%",
            quest_number + 1,
            quest.title,
            quest.difficulty.as_str(),
            quest.difficulty.xp_reward(),
            quest.progress() * 100.0
        ));
        for (sub_number, sub) in quest.sub_quests.iter().enumerate() {
            let mark = if sub.is_completed {
                "x"
            } else if selected.contains(&sub.id) {
                "*"
            } else {
                " "
            };
            lines.push(format!(
                "   [{mark}] {}.{} {}",
                quest_number + 1,
                sub_number + 1,
                sub.title
            ));
        }
    }
    Ok(lines.join("\n"))
}

async fn add_quest(state: &AppState, args: &str) -> Result<String, String> {
    let (difficulty, rest) = args
        .split_once(char::is_whitespace)
        .ok_or("usage: quest-add <difficulty> <title>: <sub>; <sub>")?;
    let (title, subs) = rest
        .split_once(':')
        .ok_or("separate the title from its sub-tasks with `:`")?;

    let title = title.trim();
    let sub_titles: Vec<String> = subs
        .split(';')
        .map(str::trim)
        .filter(|sub| !sub.is_empty())
        .map(str::to_string)
        .collect();
    if title.is_empty() || sub_titles.is_empty() {
        return Err("a quest needs a title and at least one sub-task".to_string());
    }

    let quest = Quest::new(
        title,
        QuestDifficulty::from_name(difficulty),
        sub_titles,
        Utc::now(),
    );
    state
        .db
        .insert_quest(&state.user_id, &quest)
        .await
        .map_err(|e| e.to_string())?;

    Ok(format!(
        "Added {} quest `{}` with {} sub-tasks",
        quest.difficulty.as_str(),
        quest.title,
        quest.sub_quests.len()
    ))
}

async fn select_subtask(state: &AppState, args: &str) -> Result<String, String> {
    let (quest, index) = resolve_subtask(state, args).await?;
    let sub = &quest.sub_quests[index];
    if sub.is_completed {
        return Err(format!("`{}` is already done", sub.title));
    }

    let selected = state
        .controller
        .toggle_subtask_selection(&quest.id, &sub.id)
        .map_err(|e| e.to_string())?;
    let verb = if selected { "Selected" } else { "Unselected" };
    Ok(format!("{verb} `{}`", sub.title))
}

fn set_duration(state: &AppState, args: &str) -> Result<String, String> {
    let minutes: u64 = args
        .parse()
        .map_err(|_| format!("`{args}` is not a number of minutes"))?;
    state
        .controller
        .select_duration(minutes.saturating_mul(60))
        .map_err(|e| e.to_string())?;
    state
        .settings
        .update(|settings| settings.default_duration_minutes = minutes)
        .map_err(|e| e.to_string())?;
    Ok(format!("Sessions will last {minutes} min"))
}

async fn toggle_completion(state: &AppState, args: &str) -> Result<String, String> {
    let (quest, index) = resolve_subtask(state, args).await?;
    let sub = &quest.sub_quests[index];
    let toggled = state
        .controller
        .toggle_subtask_completion(&sub.id)
        .map_err(|e| e.to_string())?;
    if !toggled {
        return Err(format!("`{}` was not part of this session", sub.title));
    }

    let done = state
        .controller
        .snapshot()
        .completed_subtask_ids
        .contains(&sub.id);
    let verb = if done { "Done" } else { "Not done" };
    Ok(format!("{verb}: `{}`", sub.title))
}

async fn submit_answers(state: &AppState, args: &str) -> Result<String, String> {
    let answers = parse_answers(args)?;
    let reward = state
        .controller
        .submit_answers(&answers)
        .await
        .map_err(|e| e.to_string())?;

    let results = state.controller.quiz_results();
    let correct = results.iter().filter(|result| result.is_correct()).count();
    let mut lines = vec![format!("{correct}/{} correct", results.len())];
    for (number, result) in results.iter().enumerate() {
        if !result.is_correct() {
            let answer = &result.question.options[result.question.correct_index];
            lines.push(format!("  {}. answer: {answer}", number + 1));
        }
    }
    lines.push(format!("Earned {}; `claim` it", render_reward(&reward)));
    Ok(lines.join("\n"))
}

async fn show_profile(state: &AppState) -> Result<String, String> {
    let profile = state
        .db
        .get_profile(&state.user_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no profile for {}", state.user_id))?;

    Ok(format!(
        "{} | {} ({:.0}% to next) | {} xp | {} coins | {} day streak",
        if profile.username.is_empty() {
            &profile.user_id
        } else {
            &profile.username
        },
        profile.rank().title,
        rank_progress(profile.xp) * 100.0,
        profile.xp,
        profile.coins,
        profile.streak_days
    ))
}

async fn active_quests(state: &AppState) -> Result<Vec<Quest>, String> {
    state
        .db
        .list_active_quests(&state.user_id)
        .await
        .map_err(|e| e.to_string())
}

/// Resolves `quest#.sub#` (1-based, as printed by `quests`) to a quest and
/// the index of its sub-task.
async fn resolve_subtask(state: &AppState, reference: &str) -> Result<(Quest, usize), String> {
    let (quest_number, sub_number) = reference
        .split_once('.')
        .and_then(|(quest, sub)| Some((quest.parse::<usize>().ok()?, sub.parse::<usize>().ok()?)))
        .ok_or_else(|| format!("expected <quest#.sub#>, got `{reference}`"))?;

    let quest = active_quests(state)
        .await?
        .into_iter()
        .nth(quest_number.wrapping_sub(1))
        .ok_or_else(|| format!("no active quest #{quest_number}"))?;
    let index = sub_number.wrapping_sub(1);
    if index >= quest.sub_quests.len() {
        return Err(format!("quest #{quest_number} has no sub-task #{sub_number}"));
    }
    Ok((quest, index))
}

/// Option numbers are typed 1-based.
fn parse_answers(args: &str) -> Result<Vec<usize>, String> {
    args.split_whitespace()
        .map(|token| match token.parse::<usize>() {
            Ok(number) if number > 0 => Ok(number - 1),
            _ => Err(format!("`{token}` is not an option number")),
        })
        .collect()
}

fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn render_status(snapshot: &SessionSnapshot) -> String {
    format!(
        "{} | {} left ({:.0}%) | pause {} | focus {} | distracted {} | {} selected, {} done",
        snapshot.state.as_str(),
        format_clock(snapshot.remaining_seconds),
        snapshot.progress() * 100.0,
        format_clock(snapshot.pause_allowance_seconds),
        format_clock(snapshot.focus_seconds),
        format_clock(snapshot.distraction_seconds),
        snapshot.selected_subtask_ids.len(),
        snapshot.completed_subtask_ids.len()
    )
}

fn render_quiz(questions: &[QuizQuestion]) -> String {
    let mut lines = Vec::new();
    for (number, question) in questions.iter().enumerate() {
        lines.push(format!("{}. {}", number + 1, question.question));
        for (option_number, option) in question.options.iter().enumerate() {
            lines.push(format!("   {}) {option}", option_number + 1));
        }
    }
    lines.push(format!("Reply with `answer` and {} option numbers", questions.len()));
    lines.join("\n")
}

fn render_reward(reward: &Reward) -> String {
    format!("+{} xp, +{} coins", reward.xp, reward.coins)
}
