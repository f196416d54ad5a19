use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Phases a game moves through. Serialized as their integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GamePhase {
    /// Seats are being filled; nothing is playable yet.
    PreGame = 0,
    /// The board of a new round is being revealed.
    BoardIntro = 1,
    /// Waiting for the designated picker to choose a cell.
    RecvPick = 2,
    /// Waiting for someone to buzz in (or everyone to pass).
    RecvBuzz = 3,
    /// Waiting for a daily-double wager or every final-round wager.
    RecvWager = 4,
    /// Waiting for the buzzed-in player (or every final-round player) to answer.
    RecvAns = 5,
    /// Players vote on a disputed judgment.
    RecvDispute = 6,
    /// Results are shown; final-round protests and play-again votes are accepted.
    PostGame = 7,
}

impl GamePhase {
    const ALL: [GamePhase; 8] = [
        GamePhase::PreGame,
        GamePhase::BoardIntro,
        GamePhase::RecvPick,
        GamePhase::RecvBuzz,
        GamePhase::RecvWager,
        GamePhase::RecvAns,
        GamePhase::RecvDispute,
        GamePhase::PostGame,
    ];

    /// Phases in which gameplay is running and can be paused.
    pub fn is_active(self) -> bool {
        !matches!(self, GamePhase::PreGame | GamePhase::PostGame)
    }
}

impl TryFrom<u8> for GamePhase {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|phase| *phase as u8 == value)
            .ok_or(value)
    }
}

impl Serialize for GamePhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for GamePhase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        GamePhase::try_from(raw)
            .map_err(|value| serde::de::Error::custom(format!("unknown game state {value}")))
    }
}

/// Rounds of a game. Serialized as their integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RoundState {
    /// Values 200..1000.
    First = 0,
    /// Values 400..2000.
    Second = 1,
    /// The single final question.
    Final = 2,
}

impl RoundState {
    /// Upper wager bound offered to players whose score is below it.
    pub fn max_wager(self) -> i64 {
        match self {
            RoundState::First => 1000,
            RoundState::Second => 2000,
            RoundState::Final => 0,
        }
    }

    /// Lowest legal wager in this round.
    pub fn min_wager(self) -> i64 {
        match self {
            RoundState::Final => 0,
            _ => 5,
        }
    }
}

impl Serialize for RoundState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Edges of the phase graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Seats are filled (or a player forced the start).
    Start,
    /// Board reveal finished.
    IntroComplete,
    /// A cell was chosen.
    Pick {
        /// Whether the chosen cell hides a daily double.
        daily_double: bool,
    },
    /// Someone buzzed in.
    Buzz,
    /// The daily-double wager, or the last final-round wager, arrived.
    WagersIn,
    /// A wrong answer leaves other players able to buzz.
    WrongAnswer,
    /// The active question is finished and the board goes back to the picker.
    QuestionClosed,
    /// A player appealed a wrong judgment.
    RaiseDispute,
    /// The dispute vote concluded either way.
    DisputeResolved,
    /// The first round is exhausted and a second round follows.
    NextRound,
    /// The last board round is exhausted.
    FinalRound {
        /// Whether at least two players are allowed to wager.
        enough_wagerers: bool,
    },
    /// Every final-round answer arrived.
    FinalAnswersIn,
    /// Everyone asked to play again.
    Restart,
}

/// Error returned when an event has no edge from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the game was in when the event was received.
    pub from: GamePhase,
    /// The event that cannot be applied from this phase.
    pub event: PhaseEvent,
}

/// Compute the phase reached by applying `event` in `from`.
pub fn next_phase(from: GamePhase, event: PhaseEvent) -> Result<GamePhase, InvalidTransition> {
    use GamePhase::*;

    let next = match (from, event) {
        (PreGame, PhaseEvent::Start) => BoardIntro,
        (BoardIntro, PhaseEvent::IntroComplete) => RecvPick,
        (RecvPick, PhaseEvent::Pick { daily_double: true }) => RecvWager,
        (RecvPick, PhaseEvent::Pick { daily_double: false }) => RecvBuzz,
        (RecvBuzz, PhaseEvent::Buzz) => RecvAns,
        (RecvWager, PhaseEvent::WagersIn) => RecvAns,
        (RecvAns, PhaseEvent::WrongAnswer) => RecvBuzz,
        (RecvAns | RecvBuzz, PhaseEvent::QuestionClosed) => RecvPick,
        (RecvPick, PhaseEvent::RaiseDispute) => RecvDispute,
        (RecvDispute, PhaseEvent::DisputeResolved) => RecvPick,
        (RecvAns | RecvBuzz | RecvPick, PhaseEvent::NextRound) => BoardIntro,
        (RecvAns | RecvBuzz | RecvPick, PhaseEvent::FinalRound { enough_wagerers }) => {
            if enough_wagerers {
                RecvWager
            } else {
                PostGame
            }
        }
        (RecvAns, PhaseEvent::FinalAnswersIn) => PostGame,
        (PostGame, PhaseEvent::Restart) => PreGame,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}
