//! Scripted in-memory [`Ledger`] for unit tests.

use crate::ledger::{Confirmation, EventCursor, Ledger, LedgerCall, LedgerError};
use holdem_types::{Address, GameEnded, GameId, GameState, Stage};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Script {
    outcomes: VecDeque<Result<(), LedgerError>>,
    calls: Vec<(Address, LedgerCall)>,
    states: VecDeque<GameState>,
    state: Option<GameState>,
    board: Vec<u8>,
    hands: HashMap<Address, Vec<u8>>,
    last_id: GameId,
    announce_created: bool,
    events: Vec<GameEnded>,
    event_polls: usize,
    poll_delay: Option<Duration>,
}

/// Every submit succeeds unless an outcome was queued with [`ScriptedLedger::push_outcome`].
/// `game_state` replays queued states and then repeats the last one.
#[derive(Clone)]
pub struct ScriptedLedger {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        let script = Script {
            last_id: 0,
            announce_created: true,
            ..Default::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    pub fn push_outcome(&self, outcome: Result<(), LedgerError>) {
        self.script.lock().unwrap().outcomes.push_back(outcome);
    }

    pub fn push_state(&self, stage: Stage, pot: u128) {
        self.script.lock().unwrap().states.push_back(GameState {
            stage,
            current_player: Address::default(),
            pot,
            players: Vec::new(),
        });
    }

    pub fn set_board(&self, board: Vec<u8>) {
        self.script.lock().unwrap().board = board;
    }

    pub fn set_hand(&self, player: Address, cards: Vec<u8>) {
        self.script.lock().unwrap().hands.insert(player, cards);
    }

    pub fn set_last_id(&self, id: GameId) {
        self.script.lock().unwrap().last_id = id;
    }

    /// Stop reporting the created game id in confirmations.
    pub fn hide_created_id(&self) {
        self.script.lock().unwrap().announce_created = false;
    }

    pub fn emit(&self, event: GameEnded) {
        self.script.lock().unwrap().events.push(event);
    }

    pub fn calls(&self) -> Vec<(Address, LedgerCall)> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Make every event poll take `delay` before answering.
    pub fn delay_polls(&self, delay: Duration) {
        self.script.lock().unwrap().poll_delay = Some(delay);
    }

    pub fn event_polls(&self) -> usize {
        self.script.lock().unwrap().event_polls
    }
}

impl Ledger for ScriptedLedger {
    async fn submit(&self, signer: Address, call: LedgerCall) -> Result<Confirmation, LedgerError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push((signer, call));
        if let Some(outcome) = script.outcomes.pop_front() {
            outcome?;
        }
        let mut created_game = None;
        if let LedgerCall::CreateGame { .. } = call {
            script.last_id += 1;
            if script.announce_created {
                created_game = Some(script.last_id);
            }
        }
        let block_number = script.calls.len() as u64;
        Ok(Confirmation {
            tx_hash: format!("0x{block_number:064x}"),
            block_number,
            created_game,
        })
    }

    async fn game_state(&self, _game_id: GameId) -> Result<GameState, LedgerError> {
        let mut script = self.script.lock().unwrap();
        if let Some(next) = script.states.pop_front() {
            script.state = Some(next);
        }
        script
            .state
            .clone()
            .ok_or_else(|| LedgerError::invalid("no scripted state"))
    }

    async fn community_cards(&self, _game_id: GameId) -> Result<Vec<u8>, LedgerError> {
        Ok(self.script.lock().unwrap().board.clone())
    }

    async fn player_cards(&self, _game_id: GameId, player: Address) -> Result<Vec<u8>, LedgerError> {
        Ok(self
            .script
            .lock()
            .unwrap()
            .hands
            .get(&player)
            .cloned()
            .unwrap_or_default())
    }

    async fn last_id(&self) -> Result<GameId, LedgerError> {
        Ok(self.script.lock().unwrap().last_id)
    }

    async fn game_ended_events(
        &self,
        from: EventCursor,
    ) -> Result<(Vec<GameEnded>, EventCursor), LedgerError> {
        let delay = {
            let mut script = self.script.lock().unwrap();
            script.event_polls += 1;
            script.poll_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let script = self.script.lock().unwrap();
        let start = (from.0 as usize).min(script.events.len());
        let events = script.events[start..].to_vec();
        Ok((events, EventCursor(script.events.len() as u64)))
    }
}

pub fn player(n: u64) -> Address {
    Address::from_low_u64(n)
}
