//! Engine for an LLM-driven game of [Mafia](https://en.wikipedia.org/wiki/Mafia_(party_game)).
//!
//! The engine advances a game one logical step at a time: AI players are
//! dispatched to a [`decider::Decider`], human players suspend the step until
//! their input arrives through [`GameService::submit_action`]. Transport
//! surfaces wrap [`GameService`]; the engine itself owns no sockets.

use std::collections::HashMap;
use std::sync::Arc;

use ai_mafia_lib::ActionPayload;
use ai_mafia_lib::CreateGameRequest;
use ai_mafia_lib::EventPublic;
use ai_mafia_lib::GameId;
use ai_mafia_lib::GameView;
use ai_mafia_lib::HumanAction;
use ai_mafia_lib::LlmSettings;
use ai_mafia_lib::NightReasoningPublic;
use ai_mafia_lib::Phase;
use ai_mafia_lib::PlayerId;
use ai_mafia_lib::PlayerPublic;
use ai_mafia_lib::PlayerSetup;
use ai_mafia_lib::PromptOverlay;
use ai_mafia_lib::Role;
use ai_mafia_lib::VotePublic;
use ai_mafia_lib::VoteTarget;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tap::Tap;

pub mod consts;
pub mod decider;
pub mod game;
pub mod llm;
pub mod orchestrator;
pub mod player_set;
pub mod prompts;
pub mod store;

mod error;

pub use error::MafiaEngineError;

use consts::DEFAULT_NAMES;
use consts::MAX_DISCUSSION_TURNS;
use consts::MAX_MAFIA;
use consts::MAX_PLAYERS;
use consts::MAX_PLAYER_NAME_LENGTH;
use consts::MAX_SPECIAL_ROLES;
use consts::MAX_STATEMENT_LENGTH;
use consts::MAX_VOTE_REASON_LENGTH;
use consts::MIN_PLAYERS;
use decider::DeciderFactory;
use game::CollectedVote;
use game::GameState;
use llm::LlmDeciderFactory;
use orchestrator::Pause;
use orchestrator::StepOutcome;
use player_set::PlayerSet;
use store::GameSession;
use store::SessionConfig;
use store::SessionRegistry;

/// Boundary surface for creating, inspecting, stepping, and acting in games.
///
/// Cheap to clone; all clones share the same registry. Each operation takes
/// the per-game lease, so no two operations on one game interleave while
/// distinct games progress in parallel.
#[derive(Clone)]
pub struct GameService {
    registry: Arc<SessionRegistry>,
    deciders: Arc<dyn DeciderFactory>,
}

impl GameService {
    pub fn new(deciders: Arc<dyn DeciderFactory>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            deciders,
        }
    }

    /// Service with the stock LLM-backed decider.
    pub fn with_default_llm() -> Self {
        Self::new(Arc::new(LlmDeciderFactory::new()))
    }

    /// Creates a new game. The game starts immediately in the night phase of
    /// round 0.
    pub fn create_game(&self, request: CreateGameRequest) -> Result<GameId, MafiaEngineError> {
        validate_request(&request)?;

        let game_id = GameId::new();
        let seed = request.seed.unwrap_or_else(|| rand::rng().random());

        let names = match &request.players {
            Some(players) => players.iter().map(|p| p.name.trim().to_string()).collect(),
            None => DEFAULT_NAMES[..request.num_players]
                .iter()
                .map(|name| name.to_string())
                .collect::<Vec<_>>(),
        };

        let roles = assign_roles(&request).tap_mut(|roles| {
            roles.shuffle(&mut StdRng::seed_from_u64(seed));
        });

        let state = GameState::start(game_id, names, roles, Some(seed))?;

        let humans = match &request.players {
            Some(players) => players
                .iter()
                .enumerate()
                .filter(|(_, p)| p.is_human)
                .map(|(idx, _)| PlayerId(idx))
                .collect(),
            None => PlayerSet::new(),
        };

        let player_llm = match &request.players {
            Some(players) => players.iter().map(slot_llm_settings).collect(),
            None => vec![None; request.num_players],
        };

        let config = SessionConfig {
            default_llm: request.llm.clone(),
            player_llm,
            humans,
            max_discussion_turns: request.max_discussion_turns.unwrap_or(request.num_players),
            prompts: request.prompts.clone().unwrap_or_default(),
            spectate: request.spectate,
        };

        self.registry.insert(game_id, GameSession::new(state, config));
        tracing::info!("created game {game_id} with {} players", request.num_players);

        Ok(game_id)
    }

    /// Returns the public projection of a game. Reading never advances state.
    pub async fn game_view(&self, game_id: GameId) -> Result<GameView, MafiaEngineError> {
        let session = self.session(game_id)?;
        let session = session.lock().await;

        Ok(build_view(&session))
    }

    /// Advances the game by one logical step. A call that arrives while the
    /// game waits on a human is a read.
    pub async fn step(&self, game_id: GameId) -> Result<GameView, MafiaEngineError> {
        let session = self.session(game_id)?;
        let mut session = session.lock().await;

        if session.state().is_game_over() {
            return Ok(build_view(&session));
        }

        // Already waiting on human night actions.
        let (_, pending_night_ids) = session.pending_night();
        if !pending_night_ids.is_empty() {
            return Ok(build_view(&session));
        }

        // Already waiting on human votes.
        if session.state().phase() == Phase::DayVote
            && !session.pending_votes().is_empty()
            && !pending_human_voters(&session).is_empty()
        {
            return Ok(build_view(&session));
        }

        let state = session.state().clone();
        let pending_votes = if state.phase() == Phase::DayVote {
            session.pending_votes().to_vec()
        } else {
            Vec::new()
        };

        let (new_state, outcome) = orchestrator::step(
            state,
            session.config(),
            pending_votes,
            self.deciders.as_ref(),
        )
        .await;

        match outcome {
            StepOutcome::Advanced => {
                session.clear_pending_night();
                session.clear_pending_votes();
            }
            StepOutcome::VotesInFlight(votes) => {
                session.set_pending_votes(votes);
            }
            StepOutcome::Waiting(Pause::Night { actions, pending }) => {
                session.set_pending_night(actions, pending);
            }
            StepOutcome::Waiting(Pause::Discussion { actor: _ }) => {}
            StepOutcome::Waiting(Pause::Vote { pending: _, votes }) => {
                session.set_pending_votes(votes);
            }
        }
        session.set_state(new_state);

        Ok(build_view(&session))
    }

    /// Submits a human player's action into the matching buffer. When the
    /// submission completes the phase's human requirements, the engine
    /// transition fires before the call returns.
    pub async fn submit_action(
        &self,
        game_id: GameId,
        action: HumanAction,
    ) -> Result<GameView, MafiaEngineError> {
        let session = self.session(game_id)?;
        let mut session = session.lock().await;

        if session.state().is_game_over() {
            return Err(MafiaEngineError::GameOver);
        }

        let player_id = action.player_id;
        if !session.config().humans.contains(player_id) {
            return Err(MafiaEngineError::NotAHumanSlot(player_id));
        }

        match action.action {
            ActionPayload::Discussion { statement } => {
                self.submit_discussion(&mut session, player_id, &statement)?
            }
            ActionPayload::Vote { target_id, reason } => {
                self.submit_vote(&mut session, player_id, target_id, &reason)
                    .await?
            }
            ActionPayload::NightAction { target_id } => {
                self.submit_night_action(&mut session, player_id, target_id)?
            }
        }

        Ok(build_view(&session))
    }

    fn submit_discussion(
        &self,
        session: &mut GameSession,
        player_id: PlayerId,
        statement: &str,
    ) -> Result<(), MafiaEngineError> {
        let state = session.state();

        if state.phase() != Phase::DayDiscussion {
            return Err(MafiaEngineError::WrongPhase {
                expected: Phase::DayDiscussion,
                actual: state.phase(),
            });
        }

        if state.get_next_speaker().map(|p| p.id) != Some(player_id) {
            return Err(MafiaEngineError::NotYourTurn(player_id));
        }

        let statement = clip(statement.trim(), MAX_STATEMENT_LENGTH);
        if statement.is_empty() {
            return Err(MafiaEngineError::InvalidAction(
                "statement is required and non-empty".to_string(),
            ));
        }

        let new_state = session.state().clone().add_discussion_message(player_id, statement);
        session.set_state(new_state);

        Ok(())
    }

    async fn submit_vote(
        &self,
        session: &mut GameSession,
        player_id: PlayerId,
        target: VoteTarget,
        reason: &str,
    ) -> Result<(), MafiaEngineError> {
        let state = session.state();

        if state.phase() != Phase::DayVote {
            return Err(MafiaEngineError::WrongPhase {
                expected: Phase::DayVote,
                actual: state.phase(),
            });
        }

        if session.pending_votes().iter().any(|v| v.voter == player_id) {
            return Err(MafiaEngineError::AlreadyVoted(player_id));
        }

        if let VoteTarget::Player(target_id) = target {
            let alive = state.player(target_id).is_some_and(|p| p.alive);
            if !alive || target_id == player_id {
                return Err(MafiaEngineError::InvalidAction(
                    "valid target_id required (alive, not self) or 'abstain'".to_string(),
                ));
            }
        }

        let reason = clip(reason.trim(), MAX_VOTE_REASON_LENGTH);
        let mut votes = session.pending_votes().to_vec();
        votes.push(CollectedVote {
            voter: player_id,
            target,
            reason: Box::from(reason),
        });

        let advanced = session.state().clone().advance_vote_order_index();

        let voted = votes.iter().map(|v| v.voter).collect::<PlayerSet>();
        let humans_pending = advanced
            .alive_players()
            .any(|p| session.config().humans.contains(p.id) && !voted.contains(p.id));

        if humans_pending {
            session.set_state(advanced);
            session.set_pending_votes(votes);
            return Ok(());
        }

        // Last pending human: the vote resolves now.
        let (resolved, _) = orchestrator::conclude_vote(
            advanced,
            &votes,
            session.config(),
            self.deciders.as_ref(),
        )
        .await;

        session.set_state(resolved);
        session.clear_pending_votes();
        session.clear_pending_night();

        Ok(())
    }

    fn submit_night_action(
        &self,
        session: &mut GameSession,
        player_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<(), MafiaEngineError> {
        let state = session.state();

        if state.phase() != Phase::Night {
            return Err(MafiaEngineError::WrongPhase {
                expected: Phase::Night,
                actual: state.phase(),
            });
        }

        let (actions, pending_ids) = session.pending_night();
        if !pending_ids.contains(&player_id) {
            return Err(MafiaEngineError::NotPendingNightAction(player_id));
        }

        if !state.player(target_id).is_some_and(|p| p.alive) {
            return Err(MafiaEngineError::InvalidAction(
                "valid target_id required (alive player)".to_string(),
            ));
        }

        let role = state.player(player_id).expect("valid player").role;
        let mut actions = actions.clone();
        match role {
            Role::Mafia => actions.mafia_target = Some(target_id),
            Role::Doctor => actions.doctor_target = Some(target_id),
            Role::Sheriff => actions.sheriff_target = Some(target_id),
            Role::Villager => {
                return Err(MafiaEngineError::InvalidAction(
                    "your role has no night action".to_string(),
                ));
            }
        }

        let pending = pending_ids
            .iter()
            .copied()
            .filter(|&id| id != player_id)
            .collect::<Vec<_>>();

        if pending.is_empty() {
            let resolved = session.state().clone().apply_night_actions(actions);
            session.set_state(resolved);
            session.clear_pending_night();
            session.clear_pending_votes();
        } else {
            session.set_pending_night(actions, pending);
        }

        Ok(())
    }

    /// Destroys a game session and everything it buffered.
    pub fn delete_game(&self, game_id: GameId) -> Result<(), MafiaEngineError> {
        if self.registry.remove(game_id) {
            Ok(())
        } else {
            Err(MafiaEngineError::GameNotFound(game_id))
        }
    }

    pub fn list_games(&self) -> Vec<GameId> {
        self.registry.list()
    }

    /// The built-in prompt texts, for a settings surface.
    pub fn default_prompts() -> PromptOverlay {
        prompts::default_prompts()
    }

    /// Which provider credentials are present in the environment. Flags only;
    /// key values never leave the environment.
    pub fn env_key_presence() -> HashMap<&'static str, bool> {
        HashMap::from_iter([
            ("openai", std::env::var(llm::ENV_OPENAI_API_KEY).is_ok()),
            ("anthropic", std::env::var(llm::ENV_ANTHROPIC_API_KEY).is_ok()),
            ("google", std::env::var(llm::ENV_GOOGLE_API_KEY).is_ok()),
            ("ollama", true),
            ("ollama_cloud", std::env::var(llm::ENV_OLLAMA_API_KEY).is_ok()),
            ("grok", std::env::var(llm::ENV_XAI_API_KEY).is_ok()),
        ])
    }

    fn session(
        &self,
        game_id: GameId,
    ) -> Result<Arc<tokio::sync::Mutex<GameSession>>, MafiaEngineError> {
        self.registry
            .get(game_id)
            .ok_or(MafiaEngineError::GameNotFound(game_id))
    }
}

fn validate_request(request: &CreateGameRequest) -> Result<(), MafiaEngineError> {
    if request.num_players < MIN_PLAYERS {
        return Err(MafiaEngineError::NotEnoughPlayers(format!(
            "need at least {MIN_PLAYERS} players, got {}",
            request.num_players
        )));
    }

    if request.num_players > MAX_PLAYERS {
        return Err(MafiaEngineError::InvalidGameConfig(format!(
            "at most {MAX_PLAYERS} players supported, got {}",
            request.num_players
        )));
    }

    if request.num_mafia == 0 || request.num_mafia > MAX_MAFIA {
        return Err(MafiaEngineError::InvalidGameConfig(format!(
            "num_mafia must be in 1..={MAX_MAFIA}, got {}",
            request.num_mafia
        )));
    }

    if request.num_mafia >= request.num_players {
        return Err(MafiaEngineError::InvalidGameConfig(
            "num_mafia must be less than num_players".to_string(),
        ));
    }

    if request.num_doctor > MAX_SPECIAL_ROLES || request.num_sheriff > MAX_SPECIAL_ROLES {
        return Err(MafiaEngineError::InvalidGameConfig(format!(
            "doctor and sheriff counts must be at most {MAX_SPECIAL_ROLES}"
        )));
    }

    let town_size = request.num_players - request.num_mafia;
    if request.num_doctor + request.num_sheriff > town_size {
        return Err(MafiaEngineError::InvalidGameConfig(format!(
            "num_doctor ({}) + num_sheriff ({}) must be <= town size ({town_size})",
            request.num_doctor, request.num_sheriff
        )));
    }

    if let Some(players) = &request.players {
        if players.len() != request.num_players {
            return Err(MafiaEngineError::InvalidGameConfig(format!(
                "players length ({}) must equal num_players ({})",
                players.len(),
                request.num_players
            )));
        }

        for player in players {
            let name = player.name.trim();
            if name.is_empty() || name.chars().count() > MAX_PLAYER_NAME_LENGTH {
                return Err(MafiaEngineError::InvalidGameConfig(format!(
                    "player names must be 1..={MAX_PLAYER_NAME_LENGTH} characters"
                )));
            }
        }
    }

    if let Some(cap) = request.max_discussion_turns {
        if cap < request.num_players || cap > MAX_DISCUSSION_TURNS {
            return Err(MafiaEngineError::InvalidGameConfig(format!(
                "max_discussion_turns ({cap}) must be >= num_players ({}) and <= {MAX_DISCUSSION_TURNS}",
                request.num_players
            )));
        }
    }

    Ok(())
}

/// Role list in slot order before the seeded shuffle: mafia, doctor, sheriff,
/// villagers fill the rest.
fn assign_roles(request: &CreateGameRequest) -> Vec<Role> {
    let mut roles = Vec::with_capacity(request.num_players);
    roles.extend(std::iter::repeat_n(Role::Mafia, request.num_mafia));
    roles.extend(std::iter::repeat_n(Role::Doctor, request.num_doctor));
    roles.extend(std::iter::repeat_n(Role::Sheriff, request.num_sheriff));
    roles.resize(request.num_players, Role::Villager);
    roles
}

fn slot_llm_settings(player: &PlayerSetup) -> Option<LlmSettings> {
    if player.provider.is_none() && player.model.is_none() && player.api_key.is_none() {
        return None;
    }

    Some(LlmSettings {
        provider: player.provider.unwrap_or_default(),
        model: player.model.clone(),
        api_key: player.api_key.clone(),
    })
}

/// Truncates to a maximum number of characters without splitting one.
fn clip(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Alive humans who have not yet contributed to the pending vote buffer.
fn pending_human_voters(session: &GameSession) -> Vec<PlayerId> {
    let voted = session
        .pending_votes()
        .iter()
        .map(|v| v.voter)
        .collect::<PlayerSet>();

    session
        .state()
        .alive_players()
        .map(|p| p.id)
        .filter(|&id| session.config().humans.contains(id) && !voted.contains(id))
        .collect()
}

/// Builds the public projection: live roles hidden unless spectating, sheriff
/// checks redacted for non-spectators, waiting flags derived from the
/// session's buffers.
fn build_view(session: &GameSession) -> GameView {
    let state = session.state();
    let config = session.config();
    let spectate = config.spectate;
    let game_over = state.is_game_over();

    let players = state
        .players()
        .iter()
        .map(|p| PlayerPublic {
            id: p.id,
            name: Arc::clone(&p.name),
            alive: p.alive,
            role: (spectate || !p.alive).then_some(p.role),
        })
        .collect();

    let events = state
        .events()
        .iter()
        .map(|event| {
            let redact_check = !spectate
                && matches!(event.detail, ai_mafia_lib::EventDetail::NightCheck { .. });

            EventPublic {
                kind: event.detail.kind().to_string(),
                round_index: event.round,
                phase: event.phase,
                message: prompts::render_event(state, event, None, spectate),
                player_id: if redact_check { None } else { event.detail.subject() },
                target_id: if redact_check { None } else { event.detail.target() },
            }
        })
        .collect();

    let mut waiting_for_human = false;
    let mut current_actor_id = None;
    let mut pending_human_night_ids = Vec::new();
    let mut pending_human_vote_ids = Vec::new();

    if !game_over {
        let (_, pending_night_ids) = session.pending_night();

        if !pending_night_ids.is_empty() {
            waiting_for_human = true;
            current_actor_id = pending_night_ids.first().copied();
            pending_human_night_ids = pending_night_ids.to_vec();
        } else if state.phase() == Phase::DayVote && !config.humans.is_empty() {
            let pending = pending_human_voters(session);
            if !pending.is_empty() {
                waiting_for_human = true;
                pending_human_vote_ids = pending;
            }
        } else if state.phase() == Phase::DayDiscussion {
            if let Some(speaker) = state.get_next_speaker() {
                if config.humans.contains(speaker.id) {
                    waiting_for_human = true;
                    current_actor_id = Some(speaker.id);
                }
            }
        }
    }

    let current_round_votes = if state.phase() == Phase::DayVote
        && !session.pending_votes().is_empty()
    {
        session
            .pending_votes()
            .iter()
            .map(|vote| vote_public(state, vote.voter, vote.target, &vote.reason))
            .collect()
    } else {
        let round_to_show = if state.phase() == Phase::DayVote {
            Some(state.round_index())
        } else {
            state.round_index().checked_sub(1)
        };

        state
            .vote_records()
            .iter()
            .filter(|record| Some(record.round) == round_to_show)
            .map(|record| vote_public(state, record.voter, record.target, &record.reason))
            .collect()
    };

    GameView {
        game_id: state.game_id(),
        players,
        round_index: state.round_index(),
        phase: state.phase(),
        started: state.started(),
        events,
        discussion: state.discussion().to_vec(),
        winner: state.winner(),
        waiting_for_human,
        current_actor_id,
        pending_human_vote_ids,
        pending_human_night_ids,
        human_player_ids: config.humans.iter().collect(),
        current_round_votes,
        spectate,
        mafia_discussion: if spectate {
            state.mafia_discussion().to_vec()
        } else {
            Vec::new()
        },
        night_reasoning: if spectate {
            state
                .night_reasoning()
                .iter()
                .map(|record| NightReasoningPublic {
                    role: record.role,
                    player_name: Arc::clone(&record.actor_name),
                    target_name: Arc::clone(&record.target_name),
                    reason: record.reason.to_string(),
                })
                .collect()
        } else {
            Vec::new()
        },
    }
}

fn vote_public(state: &GameState, voter: PlayerId, target: VoteTarget, reason: &str) -> VotePublic {
    let name_of = |id: PlayerId| {
        state
            .player(id)
            .map(|p| Arc::clone(&p.name))
            .unwrap_or_else(|| Arc::from(id.to_string().as_str()))
    };

    VotePublic {
        voter_id: voter,
        voter_name: name_of(voter),
        target_id: target,
        target_name: match target {
            VoteTarget::Abstain => Arc::from("Abstain"),
            VoteTarget::Player(id) => name_of(id),
        },
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    mod game;
    mod orchestrator;
    mod service;
}
