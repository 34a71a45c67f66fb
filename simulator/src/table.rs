//! Rules of one poker game as enforced by the ledger contract.

use holdem_types::{Address, GameEnded, GameId, GameState, Stage, Wei, UNREVEALED};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use thiserror::Error;

/// Cards handed out by the dealer. Id 0 is never dealt so that it can mark an
/// unrevealed slot.
const DEALT_IDS: std::ops::RangeInclusive<u8> = 1..=51;

const HOLE_CARDS: usize = 2;
const BOARD_CARDS: usize = 5;

/// Contract revert reasons.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    #[error("Game does not exist")]
    UnknownGame,
    #[error("Buy-in must be positive")]
    ZeroBuyIn,
    #[error("Incorrect buy-in amount")]
    IncorrectBuyIn,
    #[error("Player already joined")]
    AlreadyJoined,
    #[error("Game already started")]
    AlreadyStarted,
    #[error("Not the dealer")]
    NotDealer,
    #[error("Not enough players")]
    NotEnoughPlayers,
    #[error("Game not started")]
    NotStarted,
    #[error("Game has ended")]
    Ended,
    #[error("Not a player")]
    NotAPlayer,
    #[error("Player has folded")]
    Folded,
    #[error("Not your turn")]
    NotYourTurn,
    #[error("Bet must be higher than current bet")]
    BetTooLow,
}

/// What a successful action did to the game.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The turn moved to the next player.
    Continued,
    /// The betting round closed and the game moved to this stage.
    Advanced(Stage),
    /// The game is over.
    Ended(GameEnded),
}

#[derive(Clone, Debug)]
pub struct Table {
    id: GameId,
    dealer: Address,
    buy_in: Wei,
    players: Vec<Address>,
    started: bool,
    stage: Stage,
    folded: HashSet<Address>,
    acted: HashSet<Address>,
    turn: usize,
    current_bet: Wei,
    pot: Wei,
    hands: Vec<[u8; HOLE_CARDS]>,
    board: [u8; BOARD_CARDS],
    result: Option<GameEnded>,
}

impl Table {
    pub fn new(id: GameId, dealer: Address, buy_in: Wei) -> Result<Self, TableError> {
        if buy_in == 0 {
            return Err(TableError::ZeroBuyIn);
        }
        Ok(Self {
            id,
            dealer,
            buy_in,
            players: Vec::new(),
            started: false,
            stage: Stage::PreFlop,
            folded: HashSet::new(),
            acted: HashSet::new(),
            turn: 0,
            current_bet: 0,
            pot: 0,
            hands: Vec::new(),
            board: [UNREVEALED; BOARD_CARDS],
            result: None,
        })
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn dealer(&self) -> Address {
        self.dealer
    }

    pub fn buy_in(&self) -> Wei {
        self.buy_in
    }

    pub fn result(&self) -> Option<GameEnded> {
        self.result
    }

    pub fn join(&mut self, player: Address, value: Wei) -> Result<(), TableError> {
        if self.started {
            return Err(TableError::AlreadyStarted);
        }
        if value != self.buy_in {
            return Err(TableError::IncorrectBuyIn);
        }
        if self.players.contains(&player) {
            return Err(TableError::AlreadyJoined);
        }
        self.players.push(player);
        self.pot = self.pot.saturating_add(value);
        Ok(())
    }

    /// Shuffle and deal. Only the dealer may start, once, with two or more players.
    pub fn start(&mut self, sender: Address, rng: &mut impl Rng) -> Result<(), TableError> {
        if sender != self.dealer {
            return Err(TableError::NotDealer);
        }
        if self.started {
            return Err(TableError::AlreadyStarted);
        }
        if self.players.len() < 2 {
            return Err(TableError::NotEnoughPlayers);
        }
        let mut deck: Vec<u8> = DEALT_IDS.collect();
        deck.shuffle(rng);
        let mut cards = deck.into_iter();
        self.hands = self
            .players
            .iter()
            .map(|_| {
                let mut hand = [UNREVEALED; HOLE_CARDS];
                for slot in hand.iter_mut() {
                    *slot = cards.next().unwrap_or(UNREVEALED);
                }
                hand
            })
            .collect();
        for slot in self.board.iter_mut() {
            *slot = cards.next().unwrap_or(UNREVEALED);
        }
        self.started = true;
        self.stage = Stage::PreFlop;
        self.turn = 0;
        Ok(())
    }

    pub fn bet(
        &mut self,
        sender: Address,
        amount: Wei,
        rng: &mut impl Rng,
    ) -> Result<Transition, TableError> {
        self.check_turn(sender)?;
        if amount <= self.current_bet {
            return Err(TableError::BetTooLow);
        }
        self.current_bet = amount;
        self.pot = self.pot.saturating_add(amount);
        Ok(self.finish_turn(sender, rng))
    }

    /// Match the current bet (a check when nobody bet this round).
    pub fn call(&mut self, sender: Address, rng: &mut impl Rng) -> Result<Transition, TableError> {
        self.check_turn(sender)?;
        self.pot = self.pot.saturating_add(self.current_bet);
        Ok(self.finish_turn(sender, rng))
    }

    pub fn fold(&mut self, sender: Address, rng: &mut impl Rng) -> Result<Transition, TableError> {
        self.check_turn(sender)?;
        self.folded.insert(sender);
        let active: Vec<Address> = self.active().collect();
        if let [winner] = active.as_slice() {
            return Ok(Transition::Ended(self.end(*winner)));
        }
        Ok(self.finish_turn(sender, rng))
    }

    pub fn state(&self) -> GameState {
        let current_player = if self.started && !self.stage.is_terminal() {
            self.players.get(self.turn).copied().unwrap_or_default()
        } else {
            Address::default()
        };
        GameState {
            stage: self.stage,
            current_player,
            pot: self.pot,
            players: self.players.clone(),
        }
    }

    /// Board as the contract exposes it: unrevealed slots read 0.
    pub fn community_cards(&self) -> Vec<u8> {
        let visible = if self.started {
            self.stage.revealed_board()
        } else {
            0
        };
        self.board
            .iter()
            .enumerate()
            .map(|(index, card)| if index < visible { *card } else { UNREVEALED })
            .collect()
    }

    /// Hole cards of `player`; zeros before the deal, empty for strangers.
    pub fn player_cards(&self, player: Address) -> Vec<u8> {
        match self.players.iter().position(|seat| *seat == player) {
            Some(seat) => match self.hands.get(seat) {
                Some(hand) => hand.to_vec(),
                None => vec![UNREVEALED; HOLE_CARDS],
            },
            None => Vec::new(),
        }
    }

    fn active(&self) -> impl Iterator<Item = Address> + '_ {
        self.players
            .iter()
            .copied()
            .filter(|player| !self.folded.contains(player))
    }

    fn check_turn(&self, sender: Address) -> Result<(), TableError> {
        if !self.started {
            return Err(TableError::NotStarted);
        }
        if self.stage.is_terminal() {
            return Err(TableError::Ended);
        }
        if !self.players.contains(&sender) {
            return Err(TableError::NotAPlayer);
        }
        if self.folded.contains(&sender) {
            return Err(TableError::Folded);
        }
        if self.players.get(self.turn) != Some(&sender) {
            return Err(TableError::NotYourTurn);
        }
        Ok(())
    }

    fn finish_turn(&mut self, sender: Address, rng: &mut impl Rng) -> Transition {
        if !self.folded.contains(&sender) {
            self.acted.insert(sender);
        }
        let round_closed = self.active().all(|player| self.acted.contains(&player));
        if !round_closed {
            self.turn = self.next_seat(self.turn);
            return Transition::Continued;
        }

        self.acted.clear();
        self.current_bet = 0;
        match self.stage.next() {
            Stage::End => {
                let active: Vec<Address> = self.active().collect();
                let winner = active
                    .choose(rng)
                    .copied()
                    .unwrap_or(sender);
                Transition::Ended(self.end(winner))
            }
            next => {
                self.stage = next;
                self.turn = self.first_active_seat();
                Transition::Advanced(next)
            }
        }
    }

    fn end(&mut self, winner: Address) -> GameEnded {
        self.stage = Stage::End;
        let result = GameEnded {
            game_id: self.id,
            winner,
            winning_amount: self.pot,
        };
        self.result = Some(result);
        result
    }

    fn next_seat(&self, from: usize) -> usize {
        let seats = self.players.len();
        (1..=seats)
            .map(|offset| (from + offset) % seats)
            .find(|seat| !self.folded.contains(&self.players[*seat]))
            .unwrap_or(from)
    }

    fn first_active_seat(&self) -> usize {
        self.players
            .iter()
            .position(|player| !self.folded.contains(player))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdem_types::{decode_hand, WEI_PER_ETHER};
    use rand::{rngs::StdRng, SeedableRng};

    fn player(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn started(players: u64) -> (Table, StdRng) {
        let mut rng = StdRng::seed_from_u64(1);
        let mut table = Table::new(1, player(100), WEI_PER_ETHER).unwrap();
        for n in 1..=players {
            table.join(player(n), WEI_PER_ETHER).unwrap();
        }
        table.start(player(100), &mut rng).unwrap();
        (table, rng)
    }

    #[test]
    fn join_and_start_rules() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut table = Table::new(1, player(100), 10).unwrap();
        assert_eq!(table.join(player(1), 5), Err(TableError::IncorrectBuyIn));
        table.join(player(1), 10).unwrap();
        assert_eq!(table.join(player(1), 10), Err(TableError::AlreadyJoined));
        assert_eq!(table.start(player(100), &mut rng), Err(TableError::NotEnoughPlayers));
        table.join(player(2), 10).unwrap();
        assert_eq!(table.start(player(1), &mut rng), Err(TableError::NotDealer));
        table.start(player(100), &mut rng).unwrap();
        assert_eq!(table.join(player(3), 10), Err(TableError::AlreadyStarted));
        assert_eq!(table.state().pot, 20);
        assert_eq!(TableError::NotDealer.to_string(), "Not the dealer");
    }

    #[test]
    fn deals_distinct_cards_without_sentinel() {
        let (table, _) = started(3);
        let mut seen = HashSet::new();
        for n in 1..=3 {
            for card in table.player_cards(player(n)) {
                assert_ne!(card, UNREVEALED);
                assert!(seen.insert(card));
            }
        }
        for card in table.board {
            assert!(seen.insert(card));
        }
        assert!(table.player_cards(player(9)).is_empty());
        assert_eq!(table.community_cards(), vec![0; 5]);
    }

    #[test]
    fn preflop_round_collects_bets_and_reveals_flop() {
        let (mut table, mut rng) = started(3);
        let tenth = WEI_PER_ETHER / 10;
        assert_eq!(table.bet(player(1), tenth, &mut rng), Ok(Transition::Continued));
        assert_eq!(table.call(player(2), &mut rng), Ok(Transition::Continued));
        assert_eq!(
            table.call(player(3), &mut rng),
            Ok(Transition::Advanced(Stage::Flop))
        );
        let state = table.state();
        assert_eq!(state.stage, Stage::Flop);
        assert_eq!(state.pot, 3 * WEI_PER_ETHER + 3 * tenth);
        assert_eq!(state.current_player, player(1));
        let board = decode_hand(&table.community_cards()).unwrap();
        assert_eq!(board.len(), 3);
    }

    #[test]
    fn enforces_turn_order_and_raises() {
        let (mut table, mut rng) = started(2);
        assert_eq!(table.call(player(2), &mut rng), Err(TableError::NotYourTurn));
        table.bet(player(1), 5, &mut rng).unwrap();
        assert_eq!(table.bet(player(2), 5, &mut rng), Err(TableError::BetTooLow));
        assert_eq!(table.call(player(9), &mut rng), Err(TableError::NotAPlayer));
    }

    #[test]
    fn last_player_standing_wins_immediately() {
        let (mut table, mut rng) = started(2);
        table.call(player(1), &mut rng).unwrap();
        let transition = table.fold(player(2), &mut rng).unwrap();
        let Transition::Ended(result) = transition else {
            panic!("expected end, got {transition:?}");
        };
        assert_eq!(result.winner, player(1));
        assert_eq!(result.winning_amount, 2 * WEI_PER_ETHER);
        assert_eq!(table.state().stage, Stage::End);
        assert_eq!(table.call(player(1), &mut rng), Err(TableError::Ended));
    }

    #[test]
    fn folded_players_are_skipped() {
        let (mut table, mut rng) = started(3);
        table.fold(player(1), &mut rng).unwrap();
        table.call(player(2), &mut rng).unwrap();
        assert_eq!(
            table.call(player(3), &mut rng),
            Ok(Transition::Advanced(Stage::Flop))
        );
        assert_eq!(table.state().current_player, player(2));
        assert_eq!(table.call(player(1), &mut rng), Err(TableError::Folded));
    }

    #[test]
    fn river_round_pays_an_active_player() {
        let (mut table, mut rng) = started(3);
        let mut last = Transition::Continued;
        for _ in Stage::BETTING {
            for n in 1..=3 {
                last = table.call(player(n), &mut rng).unwrap();
            }
        }
        let Transition::Ended(result) = last else {
            panic!("expected end, got {last:?}");
        };
        assert!([player(1), player(2), player(3)].contains(&result.winner));
        assert_eq!(result.winning_amount, 3 * WEI_PER_ETHER);
        assert_eq!(table.community_cards().iter().filter(|c| **c != 0).count(), 5);
        assert_eq!(table.result(), Some(result));
    }
}
