//! The phase-dispatching step function and the suspend/resume protocol.
//!
//! A step advances one game by one logical unit: resolve the night, run one
//! discussion turn, or run one vote turn. Whenever the actor who must move
//! is human, the step returns a [`Pause`] instead of advancing; the boundary
//! persists the attached buffers and resumes once the human input arrives.
//! Decider failures never abort a step; each is logged and recovered with a
//! role-appropriate fallback.

use ai_mafia_lib::NightActions;
use ai_mafia_lib::Phase;
use ai_mafia_lib::PlayerId;
use ai_mafia_lib::Role;
use ai_mafia_lib::VoteTarget;
use rand::seq::IndexedRandom;

use crate::decider::DeciderError;
use crate::decider::DeciderFactory;
use crate::decider::DiscussionResponse;
use crate::decider::NightActionResponse;
use crate::decider::SummaryResponse;
use crate::decider::VoteResponse;
use crate::decider::decide;
use crate::game::CollectedVote;
use crate::game::GameState;
use crate::player_set::PlayerSet;
use crate::prompts;
use crate::prompts::RULES_SUMMARY;
use crate::store::SessionConfig;

/// Why a step stopped short of an engine transition.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Pause {
    /// The night cannot resolve until the listed humans submit their actions.
    /// `actions` carries the targets already collected from AI actors.
    Night {
        actions: NightActions,
        pending: Vec<PlayerId>,
    },
    /// The next speaker is human.
    Discussion { actor: PlayerId },
    /// The next voter is human; every listed human may vote in any order.
    Vote {
        pending: Vec<PlayerId>,
        votes: Vec<CollectedVote>,
    },
}

/// Result of one orchestrator step.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StepOutcome {
    /// The step ran to completion; transient buffers are spent.
    Advanced,
    /// AI voters remain; the buffer must survive to the next step.
    VotesInFlight(Vec<CollectedVote>),
    /// Progress requires human input.
    Waiting(Pause),
}

/// Advances the game by one logical step.
#[tracing::instrument(
    skip_all,
    fields(game = %state.game_id(), phase = %state.phase(), round = state.round_index()),
)]
pub async fn step(
    state: GameState,
    config: &SessionConfig,
    pending_votes: Vec<CollectedVote>,
    deciders: &dyn DeciderFactory,
) -> (GameState, StepOutcome) {
    if state.is_game_over() {
        return (state, StepOutcome::Advanced);
    }

    match state.phase() {
        Phase::Night => run_night(state, config, deciders).await,
        Phase::DayDiscussion => {
            if state.discussion_done(Some(config.max_discussion_turns)) {
                // A single step may traverse the phase boundary into the vote.
                let state = state.next_phase();
                run_vote_turn(state, Vec::new(), config, deciders).await
            } else {
                run_discussion_turn(state, config, deciders).await
            }
        }
        Phase::DayVote => run_vote_turn(state, pending_votes, config, deciders).await,
    }
}

fn random_target(targets: &[PlayerId]) -> PlayerId {
    *targets.choose(&mut rand::rng()).expect("at least one target")
}

/// Alive players a night actor may target: everyone but themselves, unless
/// they are the only one left.
fn night_targets(state: &GameState, actor: PlayerId) -> Vec<PlayerId> {
    let mut targets = state.alive_ids();
    targets.retain(|&id| id != actor);

    if targets.is_empty() {
        state.alive_ids()
    } else {
        targets
    }
}

/// Validates a night response against the legal targets, coercing structural
/// failures and out-of-roster targets to a uniformly random valid target.
fn coerce_night_target(
    result: Result<NightActionResponse, DeciderError>,
    targets: &[PlayerId],
    role: Role,
    actor: PlayerId,
) -> (PlayerId, Option<String>) {
    match result {
        Ok(response) => {
            let reason = response
                .private_reason
                .filter(|reason| !reason.trim().is_empty());

            match PlayerId::parse(&response.target_id).filter(|t| targets.contains(t)) {
                Some(target) => (target, reason),
                None => {
                    tracing::warn!(
                        "{role} {actor} chose invalid target '{}'; substituting a random valid target",
                        response.target_id,
                    );
                    (random_target(targets), reason)
                }
            }
        }
        Err(err) => {
            tracing::warn!("{role} night action failed for {actor}: {err}; picking a random target");
            (random_target(targets), None)
        }
    }
}

async fn run_night(
    mut state: GameState,
    config: &SessionConfig,
    deciders: &dyn DeciderFactory,
) -> (GameState, StepOutcome) {
    let mut actions = NightActions::default();
    let mut pending = Vec::new();

    let mafia_ids = state
        .players_by_role(Role::Mafia)
        .iter()
        .map(|p| p.id)
        .collect::<Vec<_>>();

    // One deliberation pass on the private channel before the kill is
    // chosen. Runs only when every mafia is AI; a human mafia suspends the
    // night before any deliberation.
    if mafia_ids.len() > 1 && mafia_ids.iter().all(|&id| !config.humans.contains(id)) {
        for &mafia in &mafia_ids {
            let decider = deciders.decider_for(&config.llm_settings_for(mafia));
            let mut ctx = prompts::context_with_rules(&state, Some(mafia), &config.prompts);
            prompts::append_mafia_channel(&mut ctx, &state, "Mafia discussion so far this night:");
            let instructions = "You are mafia. You are discussing with your mafia partners \
                (they will see this) who to eliminate tonight. Give one short message \
                (1-2 sentences) with your suggestion or opinion. Do not reveal your role to \
                the rest of the game.";

            let statement =
                match decide::<DiscussionResponse>(decider.as_ref(), RULES_SUMMARY, &ctx, instructions)
                    .await
                {
                    Ok(response) if !response.statement.trim().is_empty() => response.statement,
                    Ok(_) => "I have no strong opinion.".to_string(),
                    Err(err) => {
                        tracing::warn!("mafia deliberation failed for {mafia}: {err}");
                        "I defer to the group.".to_string()
                    }
                };

            state = state.add_mafia_discussion_message(mafia, &statement);
        }
    }

    // The first mafia performs the kill-target selection.
    if let Some(&first_mafia) = mafia_ids.first() {
        if config.humans.contains(first_mafia) {
            pending.push(first_mafia);
        } else {
            let targets = night_targets(&state, first_mafia);
            let decider = deciders.decider_for(&config.llm_settings_for(first_mafia));
            let mut ctx = prompts::context_with_rules(&state, Some(first_mafia), &config.prompts);
            prompts::append_mafia_channel(&mut ctx, &state, "Mafia discussion this night:");
            let instructions = prompts::night_action_instructions(
                "Mafia (choose who to eliminate)",
                &targets,
                &config.prompts,
            );

            let result =
                decide::<NightActionResponse>(decider.as_ref(), RULES_SUMMARY, &ctx, &instructions)
                    .await;
            let (target, reason) = coerce_night_target(result, &targets, Role::Mafia, first_mafia);
            actions.mafia_target = Some(target);

            // Keep the private channel non-empty for spectators even with a
            // lone mafia.
            if mafia_ids.len() == 1 {
                let target_name = state.player(target).expect("valid player").name.to_string();
                let line = reason
                    .clone()
                    .unwrap_or_else(|| format!("Eliminating {target_name}."));
                state = state.add_mafia_discussion_message(first_mafia, &line);
            }

            if config.spectate {
                state = state.add_night_reasoning(
                    Role::Mafia,
                    first_mafia,
                    target,
                    reason.as_deref().unwrap_or(""),
                );
            }
        }
    }

    let doctor_id = state.players_by_role(Role::Doctor).first().map(|p| p.id);
    if let Some(doctor) = doctor_id {
        if config.humans.contains(doctor) {
            pending.push(doctor);
        } else {
            let targets = night_targets(&state, doctor);
            let decider = deciders.decider_for(&config.llm_settings_for(doctor));
            let ctx = prompts::context_with_rules(&state, Some(doctor), &config.prompts);
            let instructions = prompts::night_action_instructions(
                "Doctor (choose who to protect)",
                &targets,
                &config.prompts,
            );

            let result =
                decide::<NightActionResponse>(decider.as_ref(), RULES_SUMMARY, &ctx, &instructions)
                    .await;
            let (target, reason) = coerce_night_target(result, &targets, Role::Doctor, doctor);
            actions.doctor_target = Some(target);

            if config.spectate {
                state = state.add_night_reasoning(
                    Role::Doctor,
                    doctor,
                    target,
                    reason.as_deref().unwrap_or(""),
                );
            }
        }
    }

    let sheriff_id = state.players_by_role(Role::Sheriff).first().map(|p| p.id);
    if let Some(sheriff) = sheriff_id {
        if config.humans.contains(sheriff) {
            pending.push(sheriff);
        } else {
            let mut targets = state.alive_ids();
            targets.retain(|&id| id != sheriff);

            // A sheriff with nobody else alive has nothing to investigate.
            if !targets.is_empty() {
                let decider = deciders.decider_for(&config.llm_settings_for(sheriff));
                let ctx = prompts::context_with_rules(&state, Some(sheriff), &config.prompts);
                let instructions = prompts::night_action_instructions(
                    "Sheriff (choose who to investigate)",
                    &targets,
                    &config.prompts,
                );

                let result = decide::<NightActionResponse>(
                    decider.as_ref(),
                    RULES_SUMMARY,
                    &ctx,
                    &instructions,
                )
                .await;
                let (target, reason) = coerce_night_target(result, &targets, Role::Sheriff, sheriff);
                actions.sheriff_target = Some(target);

                if config.spectate {
                    state = state.add_night_reasoning(
                        Role::Sheriff,
                        sheriff,
                        target,
                        reason.as_deref().unwrap_or(""),
                    );
                }
            }
        }
    }

    if !pending.is_empty() {
        return (state, StepOutcome::Waiting(Pause::Night { actions, pending }));
    }

    (state.apply_night_actions(actions), StepOutcome::Advanced)
}

async fn run_discussion_turn(
    state: GameState,
    config: &SessionConfig,
    deciders: &dyn DeciderFactory,
) -> (GameState, StepOutcome) {
    let Some((speaker_id, speaker_name, speaker_role)) = state
        .get_next_speaker()
        .map(|p| (p.id, p.name.to_string(), p.role))
    else {
        return (state, StepOutcome::Advanced);
    };

    if config.humans.contains(speaker_id) {
        return (
            state,
            StepOutcome::Waiting(Pause::Discussion { actor: speaker_id }),
        );
    }

    let decider = deciders.decider_for(&config.llm_settings_for(speaker_id));
    let ctx = prompts::context_with_rules(&state, Some(speaker_id), &config.prompts);
    let instructions =
        prompts::discussion_instructions(&speaker_name, speaker_role.as_str(), &config.prompts);

    let (statement, request_another) =
        match decide::<DiscussionResponse>(decider.as_ref(), RULES_SUMMARY, &ctx, &instructions)
            .await
        {
            Ok(response) if !response.statement.trim().is_empty() => {
                (response.statement, response.request_another_turn)
            }
            Ok(response) => ("I have nothing to add.".to_string(), response.request_another_turn),
            Err(err) => {
                tracing::warn!("discussion turn failed for {speaker_id}: {err}");
                ("I have nothing to add.".to_string(), false)
            }
        };

    let mut state = state.add_discussion_message(speaker_id, &statement);

    // One-turn grant per invocation, only while under the round cap.
    if request_another && state.discussion_messages_this_round() < config.max_discussion_turns {
        state = state.append_discussion_speaker(speaker_id);
    }

    (state, StepOutcome::Advanced)
}

/// Alive humans who have not yet contributed to the vote buffer.
fn pending_human_voters(
    state: &GameState,
    config: &SessionConfig,
    votes: &[CollectedVote],
) -> Vec<PlayerId> {
    let voted = votes.iter().map(|v| v.voter).collect::<PlayerSet>();

    state
        .alive_players()
        .map(|p| p.id)
        .filter(|&id| config.humans.contains(id) && !voted.contains(id))
        .collect()
}

async fn run_vote_turn(
    state: GameState,
    mut votes: Vec<CollectedVote>,
    config: &SessionConfig,
    deciders: &dyn DeciderFactory,
) -> (GameState, StepOutcome) {
    if state.vote_phase_done() {
        return conclude_vote(state, &votes, config, deciders).await;
    }

    let Some((voter_id, voter_role)) = state.get_next_voter().map(|p| (p.id, p.role)) else {
        return conclude_vote(state, &votes, config, deciders).await;
    };

    if config.humans.contains(voter_id) {
        let pending = pending_human_voters(&state, config, &votes);
        return (state, StepOutcome::Waiting(Pause::Vote { pending, votes }));
    }

    let decider = deciders.decider_for(&config.llm_settings_for(voter_id));
    let ctx = prompts::context_with_rules(&state, Some(voter_id), &config.prompts);
    let alive = state.alive_ids();
    let mut choices = alive
        .iter()
        .filter(|&&id| id != voter_id)
        .map(|id| id.to_string())
        .collect::<Vec<_>>();
    choices.push("abstain".to_string());
    let instructions = prompts::vote_instructions(voter_role.as_str(), &choices, &config.prompts);

    let (target, reason) =
        match decide::<VoteResponse>(decider.as_ref(), RULES_SUMMARY, &ctx, &instructions).await {
            Ok(response) => {
                let reason = response.reason;

                if response.target_id == "abstain" {
                    let reason = if reason.is_empty() { "Abstain".to_string() } else { reason };
                    (VoteTarget::Abstain, reason)
                } else {
                    match PlayerId::parse(&response.target_id)
                        .filter(|&t| t != voter_id && alive.contains(&t))
                    {
                        Some(target) => (VoteTarget::Player(target), reason),
                        None => {
                            tracing::warn!(
                                "{voter_id} cast invalid vote '{}'; recording an abstention",
                                response.target_id,
                            );
                            let reason =
                                if reason.is_empty() { "Abstain".to_string() } else { reason };
                            (VoteTarget::Abstain, reason)
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!("vote failed for {voter_id}: {err}; recording an abstention");
                (VoteTarget::Abstain, "Abstain".to_string())
            }
        };

    votes.push(CollectedVote {
        voter: voter_id,
        target,
        reason: reason.into_boxed_str(),
    });

    let state = state.advance_vote_order_index();
    if state.vote_phase_done() {
        return conclude_vote(state, &votes, config, deciders).await;
    }

    (state, StepOutcome::VotesInFlight(votes))
}

/// Resolves the collected votes and, unless the game just ended, appends a
/// neutral round summary. Both the step path and the boundary's human-vote
/// completion funnel through here.
#[tracing::instrument(skip_all, fields(game = %state.game_id(), votes = votes.len()))]
pub(crate) async fn conclude_vote(
    state: GameState,
    votes: &[CollectedVote],
    config: &SessionConfig,
    deciders: &dyn DeciderFactory,
) -> (GameState, StepOutcome) {
    let state = state.apply_vote(votes);

    if let Some(winner) = state.winner() {
        tracing::info!("game {} is over; {winner} wins", state.game_id());
        return (state, StepOutcome::Advanced);
    }

    let state = run_round_summary(state, config, deciders).await;
    (state, StepOutcome::Advanced)
}

/// One summarizer call, appended to the round summaries. Optional: failures
/// degrade to a stock line and never block gameplay.
async fn run_round_summary(
    state: GameState,
    config: &SessionConfig,
    deciders: &dyn DeciderFactory,
) -> GameState {
    let decider = deciders.decider_for(&config.llm_settings_for(PlayerId(0)));
    let ctx = prompts::context_with_rules(&state, None, &config.prompts);
    let instructions = prompts::summarizer_instructions(&config.prompts);

    let summary =
        match decide::<SummaryResponse>(decider.as_ref(), RULES_SUMMARY, &ctx, &instructions).await {
            Ok(response) if !response.summary.trim().is_empty() => response.summary,
            Ok(_) => "Round concluded.".to_string(),
            Err(err) => {
                tracing::warn!("round summary failed: {err}");
                "Round concluded.".to_string()
            }
        };

    state.push_round_summary(&summary)
}
