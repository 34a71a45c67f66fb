//! Card identifiers as stored on the ledger.
//!
//! The ledger stores each card as a single integer in `0..52`. The rank is the
//! id modulo 13 and the suit is the id divided by 13, so `0` is the two of
//! spades and `51` is the ace of clubs. Revealed-card slots that have not been
//! dealt yet read as [`UNREVEALED`], which is why [`decode_hand`] drops them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of cards in a deck.
pub const DECK_SIZE: u8 = 52;

/// Slot value the ledger uses for a card that has not been revealed yet.
pub const UNREVEALED: u8 = 0;

/// Card id outside the deck.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid card id {0} (expected 0..52)")]
pub struct InvalidCard(pub u16);

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Spades,
    Hearts,
    Diamonds,
    Clubs,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Spades, Suit::Hearts, Suit::Diamonds, Suit::Clubs];

    fn name(self) -> &'static str {
        match self {
            Suit::Spades => "Spades",
            Suit::Hearts => "Hearts",
            Suit::Diamonds => "Diamonds",
            Suit::Clubs => "Clubs",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    fn name(self) -> &'static str {
        match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "Jack",
            Rank::Queen => "Queen",
            Rank::King => "King",
            Rank::Ace => "Ace",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    /// Decode a ledger card id.
    pub fn decode(id: u16) -> Result<Self, InvalidCard> {
        if id >= DECK_SIZE as u16 {
            return Err(InvalidCard(id));
        }
        let rank = Rank::ALL[(id % 13) as usize];
        let suit = Suit::ALL[(id / 13) as usize];
        Ok(Self { rank, suit })
    }

    /// Ledger id of this card (inverse of [`Card::decode`]).
    pub fn id(&self) -> u8 {
        (self.suit as u8) * 13 + self.rank as u8
    }
}

impl fmt::Display for Card {
    /// Formats as `Ace of Spades`, `10 of Hearts`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.rank, self.suit)
    }
}

/// Decode a revealed-card slot list, skipping [`UNREVEALED`] slots.
///
/// Input order is preserved. Fails on the first id outside the deck.
pub fn decode_hand(ids: &[u8]) -> Result<Vec<Card>, InvalidCard> {
    ids.iter()
        .filter(|id| **id != UNREVEALED)
        .map(|id| Card::decode(*id as u16))
        .collect()
}

/// Render cards the way the ledger scripts print them: `2 of Spades, Ace of Clubs`.
pub fn describe(cards: &[Card]) -> String {
    cards
        .iter()
        .map(Card::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn decode_is_a_bijection_over_the_deck() {
        let mut seen = HashSet::new();
        for id in 0..DECK_SIZE as u16 {
            let card = Card::decode(id).expect("in range");
            assert_eq!(card.id() as u16, id);
            assert!(seen.insert(card), "duplicate card for id {id}");
        }
        assert_eq!(seen.len(), 52);
    }

    #[test]
    fn decode_matches_ledger_layout() {
        assert_eq!(Card::decode(0).unwrap(), Card::new(Rank::Two, Suit::Spades));
        assert_eq!(Card::decode(12).unwrap(), Card::new(Rank::Ace, Suit::Spades));
        assert_eq!(Card::decode(13).unwrap(), Card::new(Rank::Two, Suit::Hearts));
        assert_eq!(Card::decode(34).unwrap(), Card::new(Rank::Ten, Suit::Diamonds));
        assert_eq!(Card::decode(51).unwrap(), Card::new(Rank::Ace, Suit::Clubs));
        assert_eq!(Card::decode(51).unwrap().to_string(), "Ace of Clubs");
        assert_eq!(Card::decode(8).unwrap().to_string(), "10 of Spades");
    }

    #[test]
    fn decode_rejects_out_of_range() {
        assert_eq!(Card::decode(52), Err(InvalidCard(52)));
        assert_eq!(Card::decode(255), Err(InvalidCard(255)));
        assert_eq!(Card::decode(u16::MAX), Err(InvalidCard(u16::MAX)));
    }

    #[test]
    fn decode_hand_skips_unrevealed_and_keeps_order() {
        let cards = decode_hand(&[0, 51, 0, 13, 0]).unwrap();
        assert_eq!(
            cards,
            vec![
                Card::new(Rank::Ace, Suit::Clubs),
                Card::new(Rank::Two, Suit::Hearts)
            ]
        );
        assert!(decode_hand(&[0, 0, 0, 0, 0]).unwrap().is_empty());
        assert!(decode_hand(&[]).unwrap().is_empty());
    }

    #[test]
    fn decode_hand_fails_on_bad_slot() {
        assert_eq!(decode_hand(&[5, 60]), Err(InvalidCard(60)));
    }

    #[test]
    fn describe_joins_labels() {
        let cards = decode_hand(&[12, 25]).unwrap();
        assert_eq!(describe(&cards), "Ace of Spades, Ace of Hearts");
    }

    proptest! {
        #[test]
        fn decode_hand_never_emits_sentinel(ids in proptest::collection::vec(0u8..52, 0..16)) {
            let cards = decode_hand(&ids).unwrap();
            let expected = ids.iter().filter(|id| **id != UNREVEALED).count();
            prop_assert_eq!(cards.len(), expected);
            prop_assert!(cards.iter().all(|card| card.id() != UNREVEALED));
        }

        #[test]
        fn decode_fails_for_every_id_outside_deck(id in 52u16..) {
            prop_assert_eq!(Card::decode(id), Err(InvalidCard(id)));
        }
    }
}
