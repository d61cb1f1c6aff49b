//! Per-game session state and the registry of live games.
//!
//! A session holds the canonical state plus the transient decision buffers
//! that survive between steps while humans are being waited on. The session
//! itself carries no locks; the registry hands out one exclusive lease per
//! game and the boundary serializes on it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use ai_mafia_lib::GameId;
use ai_mafia_lib::LlmSettings;
use ai_mafia_lib::NightActions;
use ai_mafia_lib::PlayerId;
use ai_mafia_lib::PromptOverlay;
use tokio::sync::Mutex;

use crate::game::CollectedVote;
use crate::game::GameState;
use crate::llm::ambient_default_settings;
use crate::player_set::PlayerSet;

/// Fixed per-game configuration, set at creation.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Game-wide default LLM selection.
    pub default_llm: Option<LlmSettings>,
    /// Per-slot LLM selection; indexed by player slot.
    pub player_llm: Vec<Option<LlmSettings>>,
    /// Slots driven by humans through the action surface.
    pub humans: PlayerSet,
    /// Per-round cap on discussion messages.
    pub max_discussion_turns: usize,
    pub prompts: PromptOverlay,
    pub spectate: bool,
}

impl SessionConfig {
    /// Resolves the LLM selection for one player: their own slot config, then
    /// the game default, then the ambient environment default.
    pub fn llm_settings_for(&self, player: PlayerId) -> LlmSettings {
        self.player_llm
            .get(player.index())
            .and_then(|settings| settings.clone())
            .or_else(|| self.default_llm.clone())
            .unwrap_or_else(ambient_default_settings)
    }
}

/// One live game: canonical state plus transient decision buffers.
pub struct GameSession {
    state: GameState,
    config: SessionConfig,
    pending_night: NightActions,
    pending_night_ids: Vec<PlayerId>,
    pending_votes: Vec<CollectedVote>,
}

impl GameSession {
    pub fn new(state: GameState, config: SessionConfig) -> Self {
        Self {
            state,
            config,
            pending_night: NightActions::default(),
            pending_night_ids: Vec::new(),
            pending_votes: Vec::new(),
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn pending_night(&self) -> (&NightActions, &[PlayerId]) {
        (&self.pending_night, &self.pending_night_ids)
    }

    pub fn pending_votes(&self) -> &[CollectedVote] {
        &self.pending_votes
    }

    pub fn set_state(&mut self, state: GameState) {
        self.state = state;
    }

    pub fn set_pending_night(&mut self, actions: NightActions, pending_ids: Vec<PlayerId>) {
        self.pending_night = actions;
        self.pending_night_ids = pending_ids;
    }

    pub fn clear_pending_night(&mut self) {
        self.pending_night = NightActions::default();
        self.pending_night_ids.clear();
    }

    pub fn set_pending_votes(&mut self, votes: Vec<CollectedVote>) {
        self.pending_votes = votes;
    }

    pub fn clear_pending_votes(&mut self) {
        self.pending_votes.clear();
    }
}

/// Registry of live games, keyed by id, handing out one exclusive lease per
/// game. Distinct games progress independently.
#[derive(Default)]
pub struct SessionRegistry {
    games: RwLock<HashMap<GameId, Arc<Mutex<GameSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, game_id: GameId, session: GameSession) {
        self.games
            .write()
            .unwrap()
            .insert(game_id, Arc::new(Mutex::new(session)));
    }

    /// The per-game lease. The map lock is never held across an await; the
    /// caller locks the returned mutex.
    pub fn get(&self, game_id: GameId) -> Option<Arc<Mutex<GameSession>>> {
        self.games.read().unwrap().get(&game_id).cloned()
    }

    pub fn remove(&self, game_id: GameId) -> bool {
        self.games.write().unwrap().remove(&game_id).is_some()
    }

    pub fn list(&self) -> Vec<GameId> {
        self.games.read().unwrap().keys().copied().collect()
    }
}
