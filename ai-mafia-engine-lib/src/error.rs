use ai_mafia_lib::GameId;
use ai_mafia_lib::Phase;
use ai_mafia_lib::PlayerId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MafiaEngineError {
    #[error("invalid game config: {0}")]
    InvalidGameConfig(String),
    #[error("not enough players: {0}")]
    NotEnoughPlayers(String),
    #[error("no game with id '{0}'")]
    GameNotFound(GameId),
    #[error("game is over")]
    GameOver,
    #[error("{0:?} is not a human slot")]
    NotAHumanSlot(PlayerId),
    #[error("action requires phase {expected:?}, game is in {actual:?}")]
    WrongPhase { expected: Phase, actual: Phase },
    #[error("it is not {0:?}'s turn to speak")]
    NotYourTurn(PlayerId),
    #[error("{0:?} has already voted this round")]
    AlreadyVoted(PlayerId),
    #[error("not waiting for a night action from {0:?}")]
    NotPendingNightAction(PlayerId),
    #[error("invalid action: {0}")]
    InvalidAction(String),
}
