//! Core rules for a game of Mafia: the canonical state and its pure
//! transitions.
//!
//! Transitions consume the state and return the successor value, so callers
//! never observe a half-applied step. Targets that stopped being legal
//! between collection and resolution (dead players, self-votes) are
//! sanitized here rather than reported.

use std::collections::HashMap;
use std::sync::Arc;

use ai_mafia_lib::Alignment;
use ai_mafia_lib::DiscussionMessage;
use ai_mafia_lib::Event;
use ai_mafia_lib::EventDetail;
use ai_mafia_lib::GameId;
use ai_mafia_lib::MafiaDiscussionMessage;
use ai_mafia_lib::NightActions;
use ai_mafia_lib::NightReasoningRecord;
use ai_mafia_lib::Phase;
use ai_mafia_lib::Player;
use ai_mafia_lib::PlayerId;
use ai_mafia_lib::Role;
use ai_mafia_lib::VoteRecord;
use ai_mafia_lib::VoteTarget;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::consts::MIN_PLAYERS;
use crate::consts::VOTE_THRESHOLD;
use crate::error::MafiaEngineError;

/// One vote collected during the day-vote phase, before resolution.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CollectedVote {
    pub voter: PlayerId,
    pub target: VoteTarget,
    pub reason: Box<str>,
}

/// Full state of one game.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GameState {
    game_id: GameId,
    players: Vec<Player>,
    round_index: usize,
    phase: Phase,
    events: Vec<Event>,
    discussion: Vec<DiscussionMessage>,
    vote_records: Vec<VoteRecord>,
    round_summaries: Vec<Box<str>>,
    /// Speaker ids for the current round, fixed when day breaks. Re-entries
    /// are appended at the tail.
    discussion_order: Vec<PlayerId>,
    discussion_order_index: usize,
    /// Voter ids for the current round; the reverse of the discussion order.
    vote_order: Vec<PlayerId>,
    vote_order_index: usize,
    mafia_discussion: Vec<MafiaDiscussionMessage>,
    night_reasoning: Vec<NightReasoningRecord>,
    game_seed: Option<u64>,
    started: bool,
}

impl GameState {
    /// Creates and starts a new game in the night phase of round 0.
    pub fn start(
        game_id: GameId,
        names: Vec<String>,
        roles: Vec<Role>,
        seed: Option<u64>,
    ) -> Result<Self, MafiaEngineError> {
        if names.len() != roles.len() {
            return Err(MafiaEngineError::InvalidGameConfig(format!(
                "{} names provided for {} roles",
                names.len(),
                roles.len()
            )));
        }

        if names.len() < MIN_PLAYERS {
            return Err(MafiaEngineError::NotEnoughPlayers(format!(
                "need at least {} players, got {}",
                MIN_PLAYERS,
                names.len()
            )));
        }

        let players = names
            .into_iter()
            .zip(roles)
            .enumerate()
            .map(|(idx, (name, role))| Player {
                id: PlayerId(idx),
                name: Arc::from(name.as_str()),
                role,
                alive: true,
            })
            .collect::<Vec<_>>();

        tracing::info!("starting game {game_id} with {} players", players.len());

        let mut state = GameState {
            game_id,
            players,
            round_index: 0,
            phase: Phase::Night,
            events: Vec::new(),
            discussion: Vec::new(),
            vote_records: Vec::new(),
            round_summaries: Vec::new(),
            discussion_order: Vec::new(),
            discussion_order_index: 0,
            vote_order: Vec::new(),
            vote_order_index: 0,
            mafia_discussion: Vec::new(),
            night_reasoning: Vec::new(),
            game_seed: seed,
            started: true,
        };

        let num_players = state.players.len();
        state.emit(EventDetail::GameStart { num_players });

        Ok(state)
    }

    fn emit(&mut self, detail: EventDetail) {
        self.events.push(Event {
            round: self.round_index,
            phase: self.phase,
            detail,
        });
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round_index(&self) -> usize {
        self.round_index
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn game_seed(&self) -> Option<u64> {
        self.game_seed
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn discussion(&self) -> &[DiscussionMessage] {
        &self.discussion
    }

    pub fn vote_records(&self) -> &[VoteRecord] {
        &self.vote_records
    }

    pub fn round_summaries(&self) -> &[Box<str>] {
        &self.round_summaries
    }

    pub fn mafia_discussion(&self) -> &[MafiaDiscussionMessage] {
        &self.mafia_discussion
    }

    pub fn night_reasoning(&self) -> &[NightReasoningRecord] {
        &self.night_reasoning
    }

    pub fn discussion_order(&self) -> &[PlayerId] {
        &self.discussion_order
    }

    pub fn discussion_order_index(&self) -> usize {
        self.discussion_order_index
    }

    pub fn vote_order(&self) -> &[PlayerId] {
        &self.vote_order
    }

    pub fn vote_order_index(&self) -> usize {
        self.vote_order_index
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.alive)
    }

    pub fn alive_ids(&self) -> Vec<PlayerId> {
        self.alive_players().map(|p| p.id).collect()
    }

    fn is_alive(&self, id: PlayerId) -> bool {
        self.player(id).is_some_and(|p| p.alive)
    }

    /// Alive players holding the given role, in slot order.
    pub fn players_by_role(&self, role: Role) -> Vec<&Player> {
        self.alive_players().filter(|p| p.role == role).collect()
    }

    pub fn mafia_alive(&self) -> usize {
        self.alive_players()
            .filter(|p| p.role.alignment() == Alignment::Mafia)
            .count()
    }

    pub fn town_alive(&self) -> usize {
        self.alive_players()
            .filter(|p| p.role.alignment() == Alignment::Town)
            .count()
    }

    pub fn is_game_over(&self) -> bool {
        let mafia = self.mafia_alive();
        mafia == 0 || mafia >= self.town_alive()
    }

    pub fn winner(&self) -> Option<Alignment> {
        if !self.is_game_over() {
            return None;
        }

        if self.mafia_alive() > 0 {
            Some(Alignment::Mafia)
        } else {
            Some(Alignment::Town)
        }
    }

    /// Count of this round's discussion messages.
    pub fn discussion_messages_this_round(&self) -> usize {
        self.discussion
            .iter()
            .filter(|m| m.round == self.round_index)
            .count()
    }

    fn mark_dead(&mut self, id: PlayerId) {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .expect("valid player");
        player.alive = false;
    }

    /// Resolves the night: mafia kill unless protected, orphan protection,
    /// sheriff check, then day breaks with a freshly shuffled speaking order.
    ///
    /// The check reads the target's role, not their liveness, so a death
    /// applied this night never changes this night's result.
    pub fn apply_night_actions(mut self, actions: NightActions) -> Self {
        let mafia_target = actions.mafia_target.filter(|&id| self.is_alive(id));
        let doctor_target = actions.doctor_target.filter(|&id| self.is_alive(id));
        let sheriff_target = actions.sheriff_target.filter(|&id| self.is_alive(id));

        let mut killed = None;
        if let Some(target) = mafia_target {
            if doctor_target == Some(target) {
                tracing::info!("{target} was protected from the mafia kill");
                self.emit(EventDetail::NightProtect { target: None });
            } else {
                tracing::info!("{target} was killed by the mafia in the night");
                killed = Some(target);
                self.emit(EventDetail::NightKill { target });
            }
        }

        if let (Some(target), None) = (doctor_target, killed) {
            self.emit(EventDetail::NightProtect {
                target: Some(target),
            });
        }

        let sheriff = self.players_by_role(Role::Sheriff).first().map(|p| p.id);
        if let (Some(target), Some(sheriff)) = (sheriff_target, sheriff) {
            let alignment = self.player(target).expect("valid player").role.alignment();
            tracing::info!("{target} was investigated and found to be {alignment}");
            self.emit(EventDetail::NightCheck {
                sheriff,
                target,
                alignment,
            });
        }

        if let Some(target) = killed {
            self.mark_dead(target);
        }

        self.phase = Phase::DayDiscussion;
        self.discussion_order_index = 0;

        let mut order = self.alive_ids();
        let shuffle_seed = self
            .game_seed
            .unwrap_or(0)
            .wrapping_add(self.round_index as u64 * 1000);
        order.shuffle(&mut StdRng::seed_from_u64(shuffle_seed));
        self.discussion_order = order;

        self.emit(EventDetail::PhaseChange {
            phase: Phase::DayDiscussion,
            no_votes: false,
        });

        self
    }

    /// Appends one discussion message and advances the speaking cursor.
    pub fn add_discussion_message(mut self, speaker: PlayerId, text: &str) -> Self {
        let speaker_name = Arc::clone(&self.player(speaker).expect("valid speaker").name);

        self.discussion.push(DiscussionMessage {
            speaker,
            speaker_name,
            text: Box::from(text),
            round: self.round_index,
        });
        self.emit(EventDetail::Discussion { speaker });
        self.discussion_order_index += 1;

        self
    }

    /// Grants one extra speaking turn by appending the speaker to the tail of
    /// this round's order.
    pub fn append_discussion_speaker(mut self, speaker: PlayerId) -> Self {
        self.discussion_order.push(speaker);
        self
    }

    /// Appends one message to the mafia's private night channel.
    pub fn add_mafia_discussion_message(mut self, speaker: PlayerId, text: &str) -> Self {
        let speaker_name = Arc::clone(&self.player(speaker).expect("valid speaker").name);

        self.mafia_discussion.push(MafiaDiscussionMessage {
            speaker,
            speaker_name,
            text: Box::from(text),
            round: self.round_index,
        });

        self
    }

    /// Records the private reasoning behind one night action.
    pub fn add_night_reasoning(
        mut self,
        role: Role,
        actor: PlayerId,
        target: PlayerId,
        reason: &str,
    ) -> Self {
        let actor_name = Arc::clone(&self.player(actor).expect("valid player").name);
        let target_name = Arc::clone(&self.player(target).expect("valid player").name);

        self.night_reasoning.push(NightReasoningRecord {
            round: self.round_index,
            role,
            actor,
            actor_name,
            target,
            target_name,
            reason: Box::from(reason),
        });

        self
    }

    pub fn push_round_summary(mut self, summary: &str) -> Self {
        self.round_summaries.push(Box::from(summary));
        self
    }

    /// The player whose turn it is to speak, if the discussion is underway.
    pub fn get_next_speaker(&self) -> Option<&Player> {
        if self.phase != Phase::DayDiscussion {
            return None;
        }

        let id = self.discussion_order.get(self.discussion_order_index)?;
        self.player(*id)
    }

    /// True when the discussion queue is exhausted or the round's message cap
    /// is reached.
    pub fn discussion_done(&self, cap: Option<usize>) -> bool {
        if self.discussion_order.is_empty() {
            return true;
        }

        if cap.is_some_and(|cap| self.discussion_messages_this_round() >= cap) {
            return true;
        }

        self.discussion_order_index >= self.discussion_order.len()
    }

    /// Advances to the next phase in cyclic order. Entering the vote sets the
    /// voting order to the reverse of the discussion order (last speaker
    /// votes last); entering the night starts the next round.
    pub fn next_phase(mut self) -> Self {
        self.phase = self.phase.next();

        match self.phase {
            Phase::Night => {
                self.round_index += 1;
            }
            Phase::DayVote => {
                self.vote_order = self.discussion_order.iter().rev().copied().collect();
                self.vote_order_index = 0;
            }
            Phase::DayDiscussion => {}
        }

        self
    }

    /// The player whose turn it is to vote, if the vote is underway.
    pub fn get_next_voter(&self) -> Option<&Player> {
        if self.phase != Phase::DayVote {
            return None;
        }

        let id = self.vote_order.get(self.vote_order_index)?;
        self.player(*id)
    }

    pub fn vote_phase_done(&self) -> bool {
        self.vote_order_index >= self.vote_order.len()
    }

    pub fn advance_vote_order_index(mut self) -> Self {
        self.vote_order_index += 1;
        self
    }

    /// Resolves the day vote and falls to night.
    ///
    /// Dead voters, self-votes, and dead targets are dropped. A player is
    /// eliminated iff they are the unique top target with at least
    /// ceil(0.51 * alive) votes; abstentions count toward nobody.
    pub fn apply_vote(mut self, votes: &[CollectedVote]) -> Self {
        for vote in votes {
            if !self.is_alive(vote.voter) {
                continue;
            }

            let recordable = match vote.target {
                VoteTarget::Abstain => true,
                VoteTarget::Player(target) => self.is_alive(target) && target != vote.voter,
            };

            if recordable {
                self.vote_records.push(VoteRecord {
                    voter: vote.voter,
                    target: vote.target,
                    reason: vote.reason.clone(),
                    round: self.round_index,
                });
                self.emit(EventDetail::Vote {
                    voter: vote.voter,
                    target: vote.target,
                });
            }
        }

        let round = self.round_index;
        let round_votes = self
            .vote_records
            .iter()
            .filter(|v| v.round == round)
            .collect::<Vec<_>>();

        if round_votes.is_empty() {
            tracing::info!("no votes recorded in round {round}; night falls");
            self.phase = Phase::Night;
            self.round_index += 1;
            self.discussion_order_index = 0;
            self.emit(EventDetail::PhaseChange {
                phase: Phase::Night,
                no_votes: true,
            });
            return self;
        }

        let counts = round_votes
            .iter()
            .filter_map(|v| v.target.player())
            .fold(HashMap::new(), |mut acc, target| {
                *acc.entry(target).or_insert(0usize) += 1;
                acc
            });

        let alive_count = self.alive_players().count();
        let threshold = (VOTE_THRESHOLD * alive_count as f64).ceil() as usize;
        let max_votes = counts.values().copied().max().unwrap_or(0);
        let tied = counts
            .iter()
            .filter(|&(_, &count)| count == max_votes)
            .map(|(&target, _)| target)
            .collect::<Vec<_>>();

        if let [eliminated] = tied[..] {
            if max_votes >= threshold {
                let role = self.player(eliminated).expect("valid player").role;
                tracing::info!("{eliminated} was eliminated by vote as {role}");
                self.emit(EventDetail::Eliminated {
                    player: eliminated,
                    role,
                });
                self.mark_dead(eliminated);
            }
        }

        self.phase = Phase::Night;
        self.round_index += 1;
        self.discussion_order_index = 0;
        self.emit(EventDetail::PhaseChange {
            phase: Phase::Night,
            no_votes: false,
        });

        self
    }
}
