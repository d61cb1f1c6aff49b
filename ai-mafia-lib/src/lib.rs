//! Data model shared by the Mafia engine and any transport surface wrapping it.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;
use uuid::Uuid;

/// Identifier for a player slot within a game.
///
/// The wire form is `player_<index>`; the index is assigned at game creation
/// and never reassigned.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PlayerId(pub usize);

impl PlayerId {
    pub fn index(self) -> usize {
        self.0
    }

    /// Parses the `player_<index>` wire form.
    pub fn parse(s: &str) -> Option<Self> {
        let idx = s.strip_prefix("player_")?;
        idx.parse::<usize>().ok().map(PlayerId)
    }
}

impl Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "player_{}", self.0)
    }
}

impl FromStr for PlayerId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlayerId::parse(s).ok_or(())
    }
}

impl Serialize for PlayerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PlayerId::parse(&s)
            .ok_or_else(|| de::Error::custom(format!("invalid player id '{s}'")))
    }
}

/// Opaque identifier for a game session.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct GameId(pub Uuid);

impl GameId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for GameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Which side a player is on; also the winner type and the sheriff's check
/// result.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Town,
    Mafia,
}

impl Alignment {
    pub fn as_str(self) -> &'static str {
        match self {
            Alignment::Town => "town",
            Alignment::Mafia => "mafia",
        }
    }
}

impl Display for Alignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A player's role, assigned once at creation.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Villager,
    /// Protects one player from the mafia kill each night.
    Doctor,
    /// Investigates the alignment of one player each night.
    Sheriff,
    Mafia,
}

impl Role {
    pub fn alignment(self) -> Alignment {
        match self {
            Role::Mafia => Alignment::Mafia,
            Role::Villager | Role::Doctor | Role::Sheriff => Alignment::Town,
        }
    }

    /// Whether this role submits a night action.
    pub fn acts_at_night(self) -> bool {
        matches!(self, Role::Mafia | Role::Doctor | Role::Sheriff)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Villager => "villager",
            Role::Doctor => "doctor",
            Role::Sheriff => "sheriff",
            Role::Mafia => "mafia",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The current game phase, cyclic in declaration order.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Night,
    DayDiscussion,
    DayVote,
}

impl Phase {
    pub fn next(self) -> Self {
        match self {
            Phase::Night => Phase::DayDiscussion,
            Phase::DayDiscussion => Phase::DayVote,
            Phase::DayVote => Phase::Night,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Night => "night",
            Phase::DayDiscussion => "day_discussion",
            Phase::DayVote => "day_vote",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A player in the game.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: Arc<str>,
    pub role: Role,
    pub alive: bool,
}

/// Target of a vote. The `abstain` sentinel exists only on the wire.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum VoteTarget {
    Abstain,
    Player(PlayerId),
}

impl VoteTarget {
    pub fn player(self) -> Option<PlayerId> {
        match self {
            VoteTarget::Abstain => None,
            VoteTarget::Player(id) => Some(id),
        }
    }
}

impl Display for VoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoteTarget::Abstain => f.write_str("abstain"),
            VoteTarget::Player(id) => id.fmt(f),
        }
    }
}

impl Serialize for VoteTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VoteTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == "abstain" {
            return Ok(VoteTarget::Abstain);
        }
        PlayerId::parse(&s)
            .map(VoteTarget::Player)
            .ok_or_else(|| de::Error::custom(format!("invalid vote target '{s}'")))
    }
}

/// An entry in a game's append-only audit log.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Event {
    pub round: usize,
    pub phase: Phase,
    pub detail: EventDetail,
}

/// What happened, as a closed variant rather than a kind string plus an
/// untyped extra map.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum EventDetail {
    GameStart {
        num_players: usize,
    },
    PhaseChange {
        phase: Phase,
        /// Set when a vote round ended with no votes recorded at all.
        no_votes: bool,
    },
    NightKill {
        target: PlayerId,
    },
    NightProtect {
        /// `None` when the protection blocked the mafia kill; `Some` when the
        /// doctor acted and nobody died.
        target: Option<PlayerId>,
    },
    NightCheck {
        sheriff: PlayerId,
        target: PlayerId,
        alignment: Alignment,
    },
    Discussion {
        speaker: PlayerId,
    },
    Vote {
        voter: PlayerId,
        target: VoteTarget,
    },
    Eliminated {
        player: PlayerId,
        role: Role,
    },
}

impl EventDetail {
    pub fn kind(&self) -> &'static str {
        match self {
            EventDetail::GameStart { .. } => "game_start",
            EventDetail::PhaseChange { .. } => "phase_change",
            EventDetail::NightKill { .. } => "night_kill",
            EventDetail::NightProtect { .. } => "night_protect",
            EventDetail::NightCheck { .. } => "night_check",
            EventDetail::Discussion { .. } => "discussion",
            EventDetail::Vote { .. } => "vote",
            EventDetail::Eliminated { .. } => "eliminated",
        }
    }

    /// The player the event is about, when there is one.
    pub fn subject(&self) -> Option<PlayerId> {
        match self {
            EventDetail::NightCheck { sheriff, .. } => Some(*sheriff),
            EventDetail::Discussion { speaker } => Some(*speaker),
            EventDetail::Vote { voter, .. } => Some(*voter),
            EventDetail::Eliminated { player, .. } => Some(*player),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<PlayerId> {
        match self {
            EventDetail::NightKill { target } => Some(*target),
            EventDetail::NightProtect { target } => *target,
            EventDetail::NightCheck { target, .. } => Some(*target),
            EventDetail::Vote { target, .. } => target.player(),
            _ => None,
        }
    }
}

/// One player's statement during day discussion.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct DiscussionMessage {
    #[serde(rename = "speaker_id")]
    pub speaker: PlayerId,
    pub speaker_name: Arc<str>,
    pub text: Box<str>,
    #[serde(rename = "round_index")]
    pub round: usize,
}

/// One player's recorded vote for a completed round.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VoteRecord {
    pub voter: PlayerId,
    pub target: VoteTarget,
    pub reason: Box<str>,
    pub round: usize,
}

/// One mafia player's message on the private night channel.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct MafiaDiscussionMessage {
    #[serde(rename = "speaker_id")]
    pub speaker: PlayerId,
    pub speaker_name: Arc<str>,
    pub text: Box<str>,
    #[serde(rename = "round_index")]
    pub round: usize,
}

/// Private reasoning behind one night action, recorded for spectators.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct NightReasoningRecord {
    pub round: usize,
    pub role: Role,
    pub actor: PlayerId,
    pub actor_name: Arc<str>,
    pub target: PlayerId,
    pub target_name: Arc<str>,
    pub reason: Box<str>,
}

/// Transient night-action triple, consumed by a single resolution.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct NightActions {
    pub mafia_target: Option<PlayerId>,
    pub doctor_target: Option<PlayerId>,
    pub sheriff_target: Option<PlayerId>,
}

// ---------------------------------------------------------------------------
// Wire types.

/// Which LLM backend serves a player's decisions.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize, Default)]
pub enum LlmProvider {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "google")]
    Google,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "ollama_cloud")]
    OllamaCloud,
    #[serde(rename = "grok")]
    Grok,
}

/// Provider selection for one player or for a whole game.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize, Default)]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: LlmProvider,
    /// Provider-specific default when unset.
    #[serde(default)]
    pub model: Option<String>,
    /// Falls back to the ambient environment for the provider when unset.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Per-game overrides of the built-in prompt texts. Omitted keys keep the
/// defaults.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize, Default)]
pub struct PromptOverlay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discussion_instructions_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_instructions_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub night_action_instructions_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summarizer_instructions: Option<String>,
}

/// One slot in a game's player list at creation.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PlayerSetup {
    pub name: String,
    #[serde(default)]
    pub provider: Option<LlmProvider>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// If true, this slot is driven by a human through the action surface.
    #[serde(default)]
    pub is_human: bool,
}

/// Body for game creation.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct CreateGameRequest {
    #[serde(default = "defaults::num_players")]
    pub num_players: usize,
    #[serde(default = "defaults::num_mafia")]
    pub num_mafia: usize,
    #[serde(default = "defaults::num_special")]
    pub num_doctor: usize,
    #[serde(default = "defaults::num_special")]
    pub num_sheriff: usize,
    /// Per-player configuration; length must equal `num_players` when set.
    #[serde(default)]
    pub players: Option<Vec<PlayerSetup>>,
    /// Game-wide default LLM selection.
    #[serde(default, rename = "llm_config")]
    pub llm: Option<LlmSettings>,
    /// Per-round cap on discussion messages. Defaults to `num_players`.
    #[serde(default)]
    pub max_discussion_turns: Option<usize>,
    #[serde(default, rename = "custom_prompts")]
    pub prompts: Option<PromptOverlay>,
    /// Expose roles and private channels in the public projection.
    #[serde(default)]
    pub spectate: bool,
    /// Deterministic shuffle seed; drawn at random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for CreateGameRequest {
    fn default() -> Self {
        Self {
            num_players: defaults::num_players(),
            num_mafia: defaults::num_mafia(),
            num_doctor: defaults::num_special(),
            num_sheriff: defaults::num_special(),
            players: None,
            llm: None,
            max_discussion_turns: None,
            prompts: None,
            spectate: false,
            seed: None,
        }
    }
}

mod defaults {
    pub(super) fn num_players() -> usize {
        6
    }

    pub(super) fn num_mafia() -> usize {
        1
    }

    pub(super) fn num_special() -> usize {
        1
    }
}

/// A human player's submitted action.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct HumanAction {
    pub player_id: PlayerId,
    #[serde(flatten)]
    pub action: ActionPayload,
}

/// Payload of a human action, discriminated by `action_type`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(tag = "action_type", content = "payload", rename_all = "snake_case")]
pub enum ActionPayload {
    Discussion {
        statement: String,
    },
    Vote {
        target_id: VoteTarget,
        #[serde(default)]
        reason: String,
    },
    NightAction {
        target_id: PlayerId,
    },
}

/// Player as shown to clients: role only revealed once dead, or to
/// spectators.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PlayerPublic {
    pub id: PlayerId,
    pub name: Arc<str>,
    pub alive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Event as shown to clients, with a pre-rendered message.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct EventPublic {
    pub kind: String,
    pub round_index: usize,
    pub phase: Phase,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<PlayerId>,
}

/// One vote in the reported round, with display names resolved.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct VotePublic {
    pub voter_id: PlayerId,
    pub voter_name: Arc<str>,
    pub target_id: VoteTarget,
    pub target_name: Arc<str>,
    pub reason: String,
}

/// One night action's reasoning, spectator projection.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct NightReasoningPublic {
    pub role: Role,
    pub player_name: Arc<str>,
    pub target_name: Arc<str>,
    pub reason: String,
}

/// Public projection of a game.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct GameView {
    pub game_id: GameId,
    pub players: Vec<PlayerPublic>,
    pub round_index: usize,
    pub phase: Phase,
    pub started: bool,
    pub events: Vec<EventPublic>,
    pub discussion: Vec<DiscussionMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Alignment>,
    pub waiting_for_human: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_actor_id: Option<PlayerId>,
    pub pending_human_vote_ids: Vec<PlayerId>,
    pub pending_human_night_ids: Vec<PlayerId>,
    pub human_player_ids: Vec<PlayerId>,
    pub current_round_votes: Vec<VotePublic>,
    pub spectate: bool,
    /// Only populated when `spectate` is set.
    pub mafia_discussion: Vec<MafiaDiscussionMessage>,
    /// Only populated when `spectate` is set.
    pub night_reasoning: Vec<NightReasoningPublic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_wire_form() {
        assert_eq!(PlayerId(3).to_string(), "player_3");
        assert_eq!(PlayerId::parse("player_12"), Some(PlayerId(12)));
        assert_eq!(PlayerId::parse("player_"), None);
        assert_eq!(PlayerId::parse("villager_1"), None);
        assert_eq!(PlayerId::parse("abstain"), None);

        let json = serde_json::to_string(&PlayerId(4)).unwrap();
        assert_eq!(json, "\"player_4\"");
        assert_eq!(serde_json::from_str::<PlayerId>(&json).unwrap(), PlayerId(4));
        assert!(serde_json::from_str::<PlayerId>("\"bogus\"").is_err());
    }

    #[test]
    fn test_vote_target_maps_abstain_sentinel() {
        assert_eq!(
            serde_json::to_string(&VoteTarget::Abstain).unwrap(),
            "\"abstain\""
        );
        assert_eq!(
            serde_json::from_str::<VoteTarget>("\"abstain\"").unwrap(),
            VoteTarget::Abstain
        );
        assert_eq!(
            serde_json::from_str::<VoteTarget>("\"player_2\"").unwrap(),
            VoteTarget::Player(PlayerId(2))
        );
        assert!(serde_json::from_str::<VoteTarget>("\"nobody\"").is_err());
    }

    #[test]
    fn test_human_action_wire_shape() {
        let action: HumanAction = serde_json::from_str(
            r#"{"player_id": "player_1", "action_type": "night_action", "payload": {"target_id": "player_2"}}"#,
        )
        .unwrap();
        assert_eq!(action.player_id, PlayerId(1));
        assert_eq!(
            action.action,
            ActionPayload::NightAction {
                target_id: PlayerId(2)
            }
        );

        let action: HumanAction = serde_json::from_str(
            r#"{"player_id": "player_0", "action_type": "vote", "payload": {"target_id": "abstain"}}"#,
        )
        .unwrap();
        assert_eq!(
            action.action,
            ActionPayload::Vote {
                target_id: VoteTarget::Abstain,
                reason: String::new()
            }
        );
    }

    #[test]
    fn test_create_request_defaults() {
        let request: CreateGameRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.num_players, 6);
        assert_eq!(request.num_mafia, 1);
        assert_eq!(request.num_doctor, 1);
        assert_eq!(request.num_sheriff, 1);
        assert!(!request.spectate);
        assert!(request.players.is_none());

        let request: CreateGameRequest = serde_json::from_str(
            r#"{"num_players": 5, "llm_config": {"provider": "ollama_cloud"}, "spectate": true}"#,
        )
        .unwrap();
        assert_eq!(request.num_players, 5);
        assert_eq!(request.llm.unwrap().provider, LlmProvider::OllamaCloud);
        assert!(request.spectate);
    }

    #[test]
    fn test_role_and_phase_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Mafia).unwrap(), "\"mafia\"");
        assert_eq!(
            serde_json::to_string(&Phase::DayDiscussion).unwrap(),
            "\"day_discussion\""
        );
        assert_eq!(serde_json::to_string(&Alignment::Town).unwrap(), "\"town\"");
        assert_eq!(Phase::DayVote.next(), Phase::Night);
        assert_eq!(Role::Sheriff.alignment(), Alignment::Town);
        assert!(Role::Doctor.acts_at_night());
        assert!(!Role::Villager.acts_at_night());
    }
}
