use ai_mafia_lib::Alignment;
use ai_mafia_lib::EventDetail;
use ai_mafia_lib::GameId;
use ai_mafia_lib::NightActions;
use ai_mafia_lib::Phase;
use ai_mafia_lib::PlayerId;
use ai_mafia_lib::Role;
use ai_mafia_lib::VoteTarget;

use crate::MafiaEngineError;
use crate::game::CollectedVote;
use crate::game::GameState;

const NAMES: &[&str] = &["Alice", "Bob", "Carol", "Dave", "Eve", "Frank"];

fn new_game(roles: &[Role], seed: u64) -> GameState {
    let names = NAMES[..roles.len()].iter().map(|s| s.to_string()).collect();
    GameState::start(GameId::new(), names, roles.to_vec(), Some(seed)).unwrap()
}

fn vote(voter: usize, target: usize) -> CollectedVote {
    CollectedVote {
        voter: PlayerId(voter),
        target: VoteTarget::Player(PlayerId(target)),
        reason: Box::from("suspicious"),
    }
}

fn abstain(voter: usize) -> CollectedVote {
    CollectedVote {
        voter: PlayerId(voter),
        target: VoteTarget::Abstain,
        reason: Box::from(""),
    }
}

fn kills(state: &GameState) -> Vec<PlayerId> {
    state
        .events()
        .iter()
        .filter_map(|e| match e.detail {
            EventDetail::NightKill { target } => Some(target),
            _ => None,
        })
        .collect()
}

#[test]
fn test_start_validation() {
    let names = vec!["Alice".to_string(), "Bob".to_string()];
    assert!(matches!(
        GameState::start(GameId::new(), names, vec![Role::Mafia], None),
        Err(MafiaEngineError::InvalidGameConfig(_))
    ));

    let names = vec!["Alice".to_string(), "Bob".to_string(), "Carol".to_string()];
    let roles = vec![Role::Mafia, Role::Villager, Role::Villager];
    assert!(matches!(
        GameState::start(GameId::new(), names, roles, None),
        Err(MafiaEngineError::NotEnoughPlayers(_))
    ));
}

#[test_log::test]
fn test_start_assigns_ids_by_index() {
    let state = new_game(
        &[Role::Mafia, Role::Doctor, Role::Sheriff, Role::Villager],
        1,
    );

    assert!(state.started());
    assert_eq!(state.phase(), Phase::Night);
    assert_eq!(state.round_index(), 0);

    for (idx, player) in state.players().iter().enumerate() {
        assert_eq!(player.id, PlayerId(idx));
        assert_eq!(player.id.to_string(), format!("player_{idx}"));
        assert!(player.alive);
    }

    assert!(matches!(
        state.events(),
        [ai_mafia_lib::Event {
            detail: EventDetail::GameStart { num_players: 4 },
            ..
        }]
    ));
}

#[test_log::test]
fn test_doctor_save() {
    let state = new_game(
        &[
            Role::Villager,
            Role::Mafia,
            Role::Doctor,
            Role::Sheriff,
            Role::Mafia,
        ],
        42,
    );

    let state = state.apply_night_actions(NightActions {
        mafia_target: Some(PlayerId(0)),
        doctor_target: Some(PlayerId(0)),
        sheriff_target: None,
    });

    assert!(state.players().iter().all(|p| p.alive));
    assert_eq!(state.phase(), Phase::DayDiscussion);
    assert!(kills(&state).is_empty());
    assert!(
        state
            .events()
            .iter()
            .any(|e| e.detail == EventDetail::NightProtect { target: None })
    );
}

#[test_log::test]
fn test_night_kill_and_sheriff_check() {
    let state = new_game(
        &[Role::Mafia, Role::Doctor, Role::Sheriff, Role::Villager],
        7,
    );

    let state = state.apply_night_actions(NightActions {
        mafia_target: Some(PlayerId(3)),
        doctor_target: Some(PlayerId(1)),
        sheriff_target: Some(PlayerId(0)),
    });

    assert!(!state.player(PlayerId(3)).unwrap().alive);
    assert_eq!(kills(&state), vec![PlayerId(3)]);

    // Orphan protection (doctor acted, kill landed elsewhere) is recorded.
    assert!(state.events().iter().any(|e| {
        e.detail
            == EventDetail::NightProtect {
                target: Some(PlayerId(1)),
            }
    }));

    // The check reads the target's role at resolution time.
    assert!(state.events().iter().any(|e| {
        e.detail
            == EventDetail::NightCheck {
                sheriff: PlayerId(2),
                target: PlayerId(0),
                alignment: Alignment::Mafia,
            }
    }));

    // Canonical night ordering: kill before check.
    let kill_pos = state
        .events()
        .iter()
        .position(|e| matches!(e.detail, EventDetail::NightKill { .. }))
        .unwrap();
    let check_pos = state
        .events()
        .iter()
        .position(|e| matches!(e.detail, EventDetail::NightCheck { .. }))
        .unwrap();
    assert!(kill_pos < check_pos);

    // Day breaks: the dead are not scheduled to speak.
    assert_eq!(state.phase(), Phase::DayDiscussion);
    assert_eq!(state.discussion_order().len(), 3);
    assert!(!state.discussion_order().contains(&PlayerId(3)));
    assert_eq!(state.discussion_order_index(), 0);
}

#[test_log::test]
fn test_night_sanitizes_dead_targets() {
    let state = new_game(
        &[Role::Mafia, Role::Doctor, Role::Sheriff, Role::Villager, Role::Villager],
        3,
    );

    let state = state.apply_night_actions(NightActions {
        mafia_target: Some(PlayerId(4)),
        doctor_target: None,
        sheriff_target: None,
    });
    let state = state.next_phase().apply_vote(&[]);
    assert_eq!(state.round_index(), 1);

    // Targeting the round-0 victim again is dropped silently.
    let state = state.apply_night_actions(NightActions {
        mafia_target: Some(PlayerId(4)),
        doctor_target: Some(PlayerId(4)),
        sheriff_target: Some(PlayerId(4)),
    });

    assert_eq!(kills(&state).len(), 1);
    assert!(
        !state
            .events()
            .iter()
            .any(|e| matches!(e.detail, EventDetail::NightCheck { .. }))
    );
}

#[test]
fn test_seeded_discussion_order_is_deterministic() {
    let roles = [
        Role::Mafia,
        Role::Doctor,
        Role::Sheriff,
        Role::Villager,
        Role::Villager,
        Role::Villager,
    ];
    let actions = NightActions {
        mafia_target: Some(PlayerId(5)),
        doctor_target: None,
        sheriff_target: None,
    };

    let a = new_game(&roles, 99).apply_night_actions(actions.clone());
    let b = new_game(&roles, 99).apply_night_actions(actions);

    assert_eq!(a.discussion_order(), b.discussion_order());
}

#[test_log::test]
fn test_discussion_flow_and_cap() {
    let state = new_game(
        &[Role::Mafia, Role::Doctor, Role::Sheriff, Role::Villager],
        5,
    );
    let state = state.apply_night_actions(NightActions::default());

    assert_eq!(state.discussion_order().len(), 4);
    assert!(!state.discussion_done(None));

    let first = state.get_next_speaker().unwrap().id;
    let state = state.add_discussion_message(first, "good morning");
    assert_eq!(state.discussion_order_index(), 1);
    assert_eq!(state.discussion_messages_this_round(), 1);

    // The cap short-circuits the queue.
    assert!(state.discussion_done(Some(1)));
    assert!(!state.discussion_done(Some(4)));

    // A granted extra turn extends the queue.
    let state = state.append_discussion_speaker(first);
    assert_eq!(state.discussion_order().len(), 5);
    assert_eq!(*state.discussion_order().last().unwrap(), first);
}

#[test_log::test]
fn test_vote_order_is_reverse_of_discussion_order() {
    let state = new_game(
        &[Role::Mafia, Role::Doctor, Role::Sheriff, Role::Villager],
        11,
    );
    let state = state.apply_night_actions(NightActions::default());
    let discussion_order = state.discussion_order().to_vec();

    let state = state.next_phase();
    assert_eq!(state.phase(), Phase::DayVote);
    assert_eq!(state.vote_order_index(), 0);
    assert_eq!(
        state.vote_order(),
        discussion_order.iter().rev().copied().collect::<Vec<_>>()
    );

    let voter = state.get_next_voter().unwrap().id;
    assert_eq!(voter, *discussion_order.last().unwrap());

    let state = state.advance_vote_order_index();
    assert_eq!(state.vote_order_index(), 1);
}

#[test_log::test]
fn test_vote_below_threshold_eliminates_nobody() {
    // 4 alive after the night kill; threshold is ceil(0.51 * 4) = 3.
    let state = new_game(
        &[
            Role::Villager,
            Role::Villager,
            Role::Mafia,
            Role::Villager,
            Role::Villager,
        ],
        2,
    );
    let state = state.apply_night_actions(NightActions {
        mafia_target: Some(PlayerId(0)),
        doctor_target: None,
        sheriff_target: None,
    });
    let state = state.next_phase().apply_vote(&[vote(2, 1), vote(3, 1)]);

    assert!(state.player(PlayerId(1)).unwrap().alive);
    assert_eq!(state.phase(), Phase::Night);
    assert_eq!(state.round_index(), 1);
    assert!(
        !state
            .events()
            .iter()
            .any(|e| matches!(e.detail, EventDetail::Eliminated { .. }))
    );
}

#[test_log::test]
fn test_vote_at_threshold_eliminates_unique_target() {
    let state = new_game(
        &[
            Role::Villager,
            Role::Mafia,
            Role::Villager,
            Role::Villager,
        ],
        2,
    );
    let state = state.apply_night_actions(NightActions::default());
    let state = state
        .next_phase()
        .apply_vote(&[vote(0, 1), vote(2, 1), vote(3, 1)]);

    assert!(!state.player(PlayerId(1)).unwrap().alive);
    assert!(state.events().iter().any(|e| {
        e.detail
            == EventDetail::Eliminated {
                player: PlayerId(1),
                role: Role::Mafia,
            }
    }));
}

#[test_log::test]
fn test_tied_vote_eliminates_nobody() {
    let state = new_game(
        &[
            Role::Villager,
            Role::Mafia,
            Role::Villager,
            Role::Villager,
        ],
        2,
    );
    let state = state.apply_night_actions(NightActions::default());

    // Two targets tied at two votes each.
    let state = state
        .next_phase()
        .apply_vote(&[vote(0, 1), vote(3, 1), vote(1, 0), vote(2, 0)]);

    assert!(state.player(PlayerId(0)).unwrap().alive);
    assert!(state.player(PlayerId(1)).unwrap().alive);
    assert!(
        !state
            .events()
            .iter()
            .any(|e| matches!(e.detail, EventDetail::Eliminated { .. }))
    );
    assert_eq!(state.round_index(), 1);
}

#[test_log::test]
fn test_vote_sanitization() {
    let state = new_game(
        &[
            Role::Villager,
            Role::Mafia,
            Role::Villager,
            Role::Villager,
            Role::Villager,
        ],
        2,
    );
    let state = state.apply_night_actions(NightActions {
        mafia_target: Some(PlayerId(4)),
        doctor_target: None,
        sheriff_target: None,
    });
    let state = state.next_phase().apply_vote(&[
        vote(4, 1),    // dead voter, dropped
        vote(0, 0),    // self-vote, dropped
        vote(2, 4),    // dead target, dropped
        abstain(3),    // recorded, counts toward nobody
        vote(1, 0),    // recorded
    ]);

    let recorded = state
        .vote_records()
        .iter()
        .filter(|v| v.round == 0)
        .collect::<Vec<_>>();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].voter, PlayerId(3));
    assert_eq!(recorded[0].target, VoteTarget::Abstain);
    assert_eq!(recorded[1].voter, PlayerId(1));

    // One vote for player_0 is under the threshold of ceil(0.51 * 4) = 3.
    assert!(state.player(PlayerId(0)).unwrap().alive);

    // Vote events mirror exactly the recorded votes, in collection order.
    let vote_events = state
        .events()
        .iter()
        .filter_map(|e| match &e.detail {
            EventDetail::Vote { voter, target } => Some((*voter, *target)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        vote_events,
        vec![
            (PlayerId(3), VoteTarget::Abstain),
            (PlayerId(1), VoteTarget::Player(PlayerId(0))),
        ]
    );
}

#[test_log::test]
fn test_empty_vote_still_advances_round() {
    let state = new_game(
        &[Role::Mafia, Role::Doctor, Role::Sheriff, Role::Villager],
        2,
    );
    let state = state.apply_night_actions(NightActions::default());
    let state = state.next_phase().apply_vote(&[]);

    assert_eq!(state.phase(), Phase::Night);
    assert_eq!(state.round_index(), 1);
    assert_eq!(state.discussion_order_index(), 0);
    assert!(state.events().iter().any(|e| {
        e.detail
            == EventDetail::PhaseChange {
                phase: Phase::Night,
                no_votes: true,
            }
    }));
}

#[test_log::test]
fn test_mafia_victory() {
    let state = new_game(
        &[Role::Villager, Role::Mafia, Role::Villager, Role::Villager],
        4,
    );

    let state = state.apply_night_actions(NightActions {
        mafia_target: Some(PlayerId(0)),
        doctor_target: None,
        sheriff_target: None,
    });
    assert!(!state.is_game_over());

    let state = state.next_phase().apply_vote(&[]);
    let state = state.apply_night_actions(NightActions {
        mafia_target: Some(PlayerId(2)),
        doctor_target: None,
        sheriff_target: None,
    });

    // One mafia and one villager remain: mafia reach parity and win.
    assert!(state.is_game_over());
    assert_eq!(state.winner(), Some(Alignment::Mafia));
}

#[test_log::test]
fn test_town_victory() {
    let state = new_game(
        &[Role::Villager, Role::Mafia, Role::Villager, Role::Villager],
        4,
    );

    let state = state.apply_night_actions(NightActions {
        mafia_target: Some(PlayerId(0)),
        doctor_target: None,
        sheriff_target: None,
    });

    // Threshold with 3 alive is ceil(0.51 * 3) = 2.
    let state = state.next_phase().apply_vote(&[vote(2, 1), vote(3, 1)]);

    assert!(!state.player(PlayerId(1)).unwrap().alive);
    assert!(state.is_game_over());
    assert_eq!(state.winner(), Some(Alignment::Town));
}

#[test]
fn test_game_over_matches_alive_counts() {
    let state = new_game(
        &[Role::Villager, Role::Mafia, Role::Villager, Role::Villager],
        1,
    );
    assert_eq!(
        state.is_game_over(),
        state.mafia_alive() == 0 || state.mafia_alive() >= state.town_alive()
    );
    assert!(!state.is_game_over());
    assert_eq!(state.winner(), None);
}

#[test_log::test]
fn test_round_index_and_death_are_monotonic() {
    let mut state = new_game(
        &[
            Role::Villager,
            Role::Mafia,
            Role::Doctor,
            Role::Villager,
            Role::Villager,
        ],
        8,
    );

    let mut last_round = state.round_index();
    let mut dead = Vec::new();

    for round in 0..3 {
        let victim = state
            .alive_players()
            .find(|p| p.role == Role::Villager)
            .map(|p| p.id);
        state = state.apply_night_actions(NightActions {
            mafia_target: victim,
            doctor_target: None,
            sheriff_target: None,
        });
        assert!(state.round_index() >= last_round);
        last_round = state.round_index();

        if let Some(victim) = victim {
            dead.push(victim);
        }
        for id in &dead {
            assert!(!state.player(*id).unwrap().alive, "death must be permanent");
        }

        state = state.next_phase().apply_vote(&[]);
        assert_eq!(state.round_index(), round + 1);

        for event in state.events() {
            assert!(event.round <= state.round_index());
        }

        if state.is_game_over() {
            break;
        }
    }
}
