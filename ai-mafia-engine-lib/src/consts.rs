//! Constants for the Mafia engine.

/// Minimum and maximum players a game may be created with.
pub const MIN_PLAYERS: usize = 4;
pub const MAX_PLAYERS: usize = 15;

/// Mafia count bounds at creation.
pub const MAX_MAFIA: usize = 4;

/// Doctor/sheriff count bound at creation.
pub const MAX_SPECIAL_ROLES: usize = 4;

/// Upper bound on the per-round discussion cap.
pub const MAX_DISCUSSION_TURNS: usize = 100;

/// How many of the current round's discussion messages a decider context
/// carries.
pub const DISCUSSION_WINDOW_SIZE: usize = 20;

/// How many trailing events a decider context carries.
pub const EVENT_WINDOW_SIZE: usize = 15;

/// How many trailing round summaries a decider context carries.
pub const SUMMARY_WINDOW_SIZE: usize = 3;

/// Payload limits for human actions.
pub const MAX_STATEMENT_LENGTH: usize = 500;
pub const MAX_VOTE_REASON_LENGTH: usize = 300;
pub const MAX_PLAYER_NAME_LENGTH: usize = 50;

/// Elimination requires a unique top target with at least
/// ceil(VOTE_THRESHOLD * alive) votes.
pub const VOTE_THRESHOLD: f64 = 0.51;

/// Name pool used when a game is created without an explicit player list.
pub const DEFAULT_NAMES: &[&str] = &[
    "Alice", "Bob", "Carol", "Dave", "Eve", "Frank", "Grace", "Henry", "Ivy",
    "Jack", "Kate", "Leo", "Mia", "Noah", "Olivia",
];
