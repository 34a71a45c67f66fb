pub mod api;
pub mod card;
pub mod game;
pub mod units;

pub use card::{decode_hand, Card, InvalidCard, Rank, Suit, UNREVEALED};
pub use game::{Action, ActionKind, GameEnded, GameId, GameState, Session, Stage};
pub use units::{format_ether, parse_ether, Address, Ether, Wei, WEI_PER_ETHER};
