//! Request and response bodies of the HTTP game API.

use crate::card::Card;
use crate::game::{ActionKind, GameEnded, GameId};
use crate::units::{format_ether, Address, Ether, Wei};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub buy_in_ether: Ether,
    /// Dealer creating the game; the server's configured dealer when omitted.
    #[serde(default)]
    pub dealer_account: Option<Address>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinGameRequest {
    pub game_id: GameId,
    pub buy_in_ether: Ether,
    pub player_account: Address,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BetRequest {
    pub game_id: GameId,
    /// Bet size in wei.
    pub amount: Wei,
    pub player_account: Address,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameActionRequest {
    pub game_id: GameId,
    pub player_account: Address,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionResponse {
    pub message: String,
    pub game_id: GameId,
    pub tx_hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardView {
    pub id: u8,
    pub label: String,
    pub card: Card,
}

impl From<Card> for CardView {
    fn from(card: Card) -> Self {
        Self {
            id: card.id(),
            label: card.to_string(),
            card,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommunityCardsResponse {
    pub game_id: GameId,
    pub community_cards: Vec<CardView>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerCardsResponse {
    pub game_id: GameId,
    pub player_account: Address,
    pub player_cards: Vec<CardView>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameResult {
    pub winner: Address,
    pub winning_amount: Wei,
    pub winning_amount_ether: String,
}

impl From<GameEnded> for GameResult {
    fn from(event: GameEnded) -> Self {
        Self {
            winner: event.winner,
            winning_amount: event.winning_amount,
            winning_amount_ether: format_ether(event.winning_amount),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameResultResponse {
    pub game_id: GameId,
    /// `None` while the game has not ended.
    pub result: Option<GameResult>,
}

/// Body of every 400 response.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub action: Option<ActionKind>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub game_id: Option<GameId>,
}
