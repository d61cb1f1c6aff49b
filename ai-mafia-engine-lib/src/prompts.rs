//! Situation reports and instruction texts handed to deciders.
//!
//! Context building is deterministic for a given state and reveals only
//! public information by default. Event rendering is viewer-aware: sheriff
//! check results are shown to the sheriff who made them (and to spectators),
//! never to anyone else.

use ai_mafia_lib::Event;
use ai_mafia_lib::EventDetail;
use ai_mafia_lib::Phase;
use ai_mafia_lib::PlayerId;
use ai_mafia_lib::PromptOverlay;
use ai_mafia_lib::VoteTarget;

use crate::consts::DISCUSSION_WINDOW_SIZE;
use crate::consts::EVENT_WINDOW_SIZE;
use crate::consts::SUMMARY_WINDOW_SIZE;
use crate::game::GameState;

pub const RULES_SUMMARY: &str = "\
You are playing Mafia (Werewolf). There are two sides: Town (villagers, doctor, sheriff) and Mafia.
- At night: Mafia choose one player to eliminate. Doctor chooses one player to protect (saves from mafia kill). Sheriff checks one player and learns if they are mafia or town.
- By day: Everyone discusses, then votes to eliminate one player. Majority wins; ties mean no elimination.
- Town wins when all Mafia are dead. Mafia win when they outnumber or equal Town.
- You must never reveal your secret role in your public statements unless you are eliminated.";

pub const DISCUSSION_INSTRUCTIONS_TEMPLATE: &str = "You are {player_name}, a {role_name}. \
    Give one short statement (1-3 sentences) to the town. \
    Do not reveal your role. Try to help your side win.";

pub const VOTE_INSTRUCTIONS_TEMPLATE: &str = "You are a {role_name}. You must cast a vote. \
    Valid choices: {targets} (or 'abstain' to not vote for anyone). \
    Provide the player_id you vote for (or 'abstain') and a short public reason (1-2 sentences).";

pub const NIGHT_ACTION_INSTRUCTIONS_TEMPLATE: &str = "You are {role_name}. \
    Choose exactly one target from the following player IDs: {targets}. \
    Reply with the target's player_id only. You may add an optional private_reason (for mafia).";

pub const SUMMARIZER_INSTRUCTIONS: &str = "Summarize this round in 2-4 neutral sentences: \
    who died (if anyone), who was voted out (if anyone), and the main discussion points. \
    Do not reveal any player's secret role. Write in past tense, factual only.";

/// The built-in prompt texts, keyed the way the creation overlay keys them.
pub fn default_prompts() -> PromptOverlay {
    PromptOverlay {
        rules_summary: Some(RULES_SUMMARY.to_string()),
        discussion_instructions_template: Some(DISCUSSION_INSTRUCTIONS_TEMPLATE.to_string()),
        vote_instructions_template: Some(VOTE_INSTRUCTIONS_TEMPLATE.to_string()),
        night_action_instructions_template: Some(NIGHT_ACTION_INSTRUCTIONS_TEMPLATE.to_string()),
        summarizer_instructions: Some(SUMMARIZER_INSTRUCTIONS.to_string()),
    }
}

fn name_of(state: &GameState, id: PlayerId) -> String {
    state
        .player(id)
        .map(|p| p.name.to_string())
        .unwrap_or_else(|| id.to_string())
}

/// Renders one event as a human-readable line for the given viewer.
pub fn render_event(
    state: &GameState,
    event: &Event,
    viewer: Option<PlayerId>,
    spectate: bool,
) -> String {
    match &event.detail {
        EventDetail::GameStart { num_players } => {
            format!("Game started with {num_players} players.")
        }
        EventDetail::PhaseChange { phase, no_votes } => match phase {
            Phase::DayDiscussion => format!("Day {}: discussion phase.", event.round + 1),
            Phase::Night if *no_votes => "No votes were cast; night falls.".to_string(),
            Phase::Night => format!("Night {} falls.", event.round + 1),
            Phase::DayVote => "Voting begins.".to_string(),
        },
        EventDetail::NightKill { target } => {
            format!("{} was killed in the night.", name_of(state, *target))
        }
        EventDetail::NightProtect { target: None } => {
            "The doctor foiled the mafia; no one died.".to_string()
        }
        EventDetail::NightProtect { target: Some(target) } => {
            if spectate {
                format!("The doctor watched over {}.", name_of(state, *target))
            } else {
                "The doctor watched over a player.".to_string()
            }
        }
        EventDetail::NightCheck {
            sheriff,
            target,
            alignment,
        } => {
            if spectate || viewer == Some(*sheriff) {
                format!(
                    "Sheriff investigated {}: they are {alignment}.",
                    name_of(state, *target)
                )
            } else {
                "The sheriff investigated a player.".to_string()
            }
        }
        EventDetail::Discussion { speaker } => {
            format!("{} made a statement.", name_of(state, *speaker))
        }
        EventDetail::Vote { voter, target } => match target {
            VoteTarget::Abstain => format!("{} abstained.", name_of(state, *voter)),
            VoteTarget::Player(target) => format!(
                "{} voted to eliminate {}.",
                name_of(state, *voter),
                name_of(state, *target)
            ),
        },
        EventDetail::Eliminated { player, role } => format!(
            "{} was eliminated by vote. They were a {role}.",
            name_of(state, *player)
        ),
    }
}

/// Builds the situation report for one decider: round, phase, alive roster,
/// trailing summaries, trailing events, and this round's discussion window.
pub fn build_game_context(state: &GameState, viewer: Option<PlayerId>) -> String {
    let mut lines = vec![
        format!(
            "Round {}. Phase: {}.",
            state.round_index() + 1,
            state.phase()
        ),
        format!(
            "Alive players: {}.",
            state
                .alive_players()
                .map(|p| format!("{} ({})", p.name, p.id))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    ];

    let summaries = state.round_summaries();
    if !summaries.is_empty() {
        lines.push("Previous rounds summary:".to_string());
        let start = summaries.len().saturating_sub(SUMMARY_WINDOW_SIZE);
        for (idx, summary) in summaries.iter().enumerate().skip(start) {
            lines.push(format!("  Round {}: {summary}", idx + 1));
        }
    }

    let events = state.events();
    let recent = &events[events.len().saturating_sub(EVENT_WINDOW_SIZE)..];
    if !recent.is_empty() {
        lines.push("Recent events:".to_string());
        for event in recent {
            lines.push(format!("  - {}", render_event(state, event, viewer, false)));
        }
    }

    let round_discussion = state
        .discussion()
        .iter()
        .filter(|m| m.round == state.round_index())
        .collect::<Vec<_>>();
    let window = &round_discussion[round_discussion.len().saturating_sub(DISCUSSION_WINDOW_SIZE)..];
    if !window.is_empty() {
        lines.push("Discussion this round:".to_string());
        for message in window {
            lines.push(format!("  {}: {}", message.speaker_name, message.text));
        }
    }

    lines.join("\n")
}

/// [`build_game_context`] with the game's rules preamble prepended.
pub fn context_with_rules(
    state: &GameState,
    viewer: Option<PlayerId>,
    overlay: &PromptOverlay,
) -> String {
    let ctx = build_game_context(state, viewer);
    match &overlay.rules_summary {
        Some(rules) => format!("{}\n\n{ctx}", rules.trim()),
        None => ctx,
    }
}

/// Appends the current night's mafia transcript to a context, if any.
pub fn append_mafia_channel(ctx: &mut String, state: &GameState, heading: &str) {
    let round_messages = state
        .mafia_discussion()
        .iter()
        .filter(|m| m.round == state.round_index())
        .collect::<Vec<_>>();

    if round_messages.is_empty() {
        return;
    }

    ctx.push_str("\n\n");
    ctx.push_str(heading);
    for message in round_messages {
        ctx.push_str(&format!("\n  {}: {}", message.speaker_name, message.text));
    }
}

pub fn night_action_instructions(
    role_label: &str,
    targets: &[PlayerId],
    overlay: &PromptOverlay,
) -> String {
    let template = overlay
        .night_action_instructions_template
        .as_deref()
        .unwrap_or(NIGHT_ACTION_INSTRUCTIONS_TEMPLATE);
    let targets = targets
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    template
        .replace("{role_name}", role_label)
        .replace("{targets}", &targets)
}

pub fn discussion_instructions(
    player_name: &str,
    role_name: &str,
    overlay: &PromptOverlay,
) -> String {
    let template = overlay
        .discussion_instructions_template
        .as_deref()
        .unwrap_or(DISCUSSION_INSTRUCTIONS_TEMPLATE);

    template
        .replace("{player_name}", player_name)
        .replace("{role_name}", role_name)
}

pub fn vote_instructions(role_name: &str, targets: &[String], overlay: &PromptOverlay) -> String {
    let template = overlay
        .vote_instructions_template
        .as_deref()
        .unwrap_or(VOTE_INSTRUCTIONS_TEMPLATE);

    template
        .replace("{role_name}", role_name)
        .replace("{targets}", &targets.join(", "))
}

pub fn summarizer_instructions(overlay: &PromptOverlay) -> String {
    overlay
        .summarizer_instructions
        .clone()
        .unwrap_or_else(|| SUMMARIZER_INSTRUCTIONS.to_string())
}
