use crate::units::{Address, Wei};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Ledger-assigned game identifier (monotonic, starting at 1).
pub type GameId = u64;

/// Betting stage of a game.
///
/// Stages only move forward and `End` is terminal. The discriminants match
/// the ledger's stage encoding.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    PreFlop = 0,
    Flop = 1,
    Turn = 2,
    River = 3,
    End = 4,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown stage index {0}")]
pub struct UnknownStage(pub u8);

impl Stage {
    /// Stages with a betting round, in order.
    pub const BETTING: [Stage; 4] = [Stage::PreFlop, Stage::Flop, Stage::Turn, Stage::River];

    pub fn next(self) -> Stage {
        match self {
            Stage::PreFlop => Stage::Flop,
            Stage::Flop => Stage::Turn,
            Stage::Turn => Stage::River,
            Stage::River | Stage::End => Stage::End,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::End
    }

    /// Community cards visible once this stage is reached.
    pub fn revealed_board(self) -> usize {
        match self {
            Stage::PreFlop => 0,
            Stage::Flop => 3,
            Stage::Turn => 4,
            Stage::River | Stage::End => 5,
        }
    }
}

impl TryFrom<u8> for Stage {
    type Error = UnknownStage;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Stage::PreFlop),
            1 => Ok(Stage::Flop),
            2 => Ok(Stage::Turn),
            3 => Ok(Stage::River),
            4 => Ok(Stage::End),
            other => Err(UnknownStage(other)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PreFlop => "PreFlop",
            Stage::Flop => "Flop",
            Stage::Turn => "Turn",
            Stage::River => "River",
            Stage::End => "End",
        };
        f.write_str(name)
    }
}

/// A single state transition requested by one participant (or the dealer).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Create { buy_in: Wei },
    Join { buy_in: Wei },
    Start,
    Bet { amount: Wei },
    Call,
    Fold,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Create { .. } => ActionKind::Create,
            Action::Join { .. } => ActionKind::Join,
            Action::Start => ActionKind::Start,
            Action::Bet { .. } => ActionKind::Bet,
            Action::Call => ActionKind::Call,
            Action::Fold => ActionKind::Fold,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Join,
    Start,
    Bet,
    Call,
    Fold,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Create => "create",
            ActionKind::Join => "join",
            ActionKind::Start => "start",
            ActionKind::Bet => "bet",
            ActionKind::Call => "call",
            ActionKind::Fold => "fold",
        };
        f.write_str(name)
    }
}

/// Snapshot returned by the ledger's `getGameState`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    pub stage: Stage,
    pub current_player: Address,
    pub pot: Wei,
    pub players: Vec<Address>,
}

/// The ledger's terminal `GameEnded` event.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEnded {
    pub game_id: GameId,
    pub winner: Address,
    pub winning_amount: Wei,
}

/// Orchestrator-side record of one game.
///
/// Built from confirmations only; the roster keeps join order and is frozen
/// once the game starts.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Session {
    pub id: GameId,
    pub dealer: Address,
    pub buy_in: Wei,
    pub participants: Vec<Address>,
    pub stage: Stage,
    pub pot: Wei,
}

impl Session {
    pub fn new(id: GameId, dealer: Address, buy_in: Wei) -> Self {
        Self {
            id,
            dealer,
            buy_in,
            participants: Vec::new(),
            stage: Stage::PreFlop,
            pot: 0,
        }
    }

    /// Record a confirmed join. Returns false for a duplicate.
    pub fn admit(&mut self, participant: Address) -> bool {
        if self.participants.contains(&participant) {
            return false;
        }
        self.participants.push(participant);
        self.pot = self.pot.saturating_add(self.buy_in);
        true
    }
}
