//! In-memory poker ledger and the HTTP game API.

use holdem_client::{Confirmation, EventCursor, Ledger, LedgerCall, LedgerError};
use holdem_types::{Address, GameEnded, GameId, GameState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

mod api;
pub use api::{Api, ApiConfig};

mod metrics;
pub use metrics::{ActionMetrics, ActionMetricsSnapshot};

pub mod table;
use table::{Table, TableError, Transition};

#[derive(Clone, Debug, Default)]
pub struct SimulatorConfig {
    /// Seed for dealing and winner selection; entropy when unset.
    pub seed: Option<u64>,
    /// Delay before a submitted call is applied and confirmed.
    pub confirmation_latency: Duration,
    /// Delay before a `GameEnded` event becomes visible to pollers.
    pub event_delay: Duration,
}

struct LoggedEvent {
    visible_at: Instant,
    event: GameEnded,
}

struct State {
    tables: BTreeMap<GameId, Table>,
    last_id: GameId,
    block: u64,
    rng: StdRng,
    events: Vec<LoggedEvent>,
    outages: usize,
}

struct Inner {
    config: SimulatorConfig,
    state: Mutex<State>,
}

/// A [`Ledger`] that keeps every game in memory and enforces the contract's rules.
#[derive(Clone)]
pub struct Simulator {
    inner: Arc<Inner>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = State {
            tables: BTreeMap::new(),
            last_id: 0,
            block: 0,
            rng,
            events: Vec::new(),
            outages: 0,
        };
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.inner.config
    }

    /// Make the next `count` submissions fail as unavailable.
    pub fn fail_next(&self, count: usize) {
        self.state().outages += count;
    }

    /// The recorded outcome of `game_id`, visible or not.
    pub fn result(&self, game_id: GameId) -> Option<GameEnded> {
        self.state()
            .tables
            .get(&game_id)
            .and_then(|table| table.result())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.inner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => {
                warn!("simulator state lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    fn with_table<T>(
        &self,
        game_id: GameId,
        read: impl FnOnce(&Table) -> T,
    ) -> Result<T, LedgerError> {
        let state = self.state();
        state
            .tables
            .get(&game_id)
            .map(read)
            .ok_or_else(|| LedgerError::rejected(TableError::UnknownGame.to_string()))
    }

    fn apply(&self, signer: Address, call: LedgerCall) -> Result<Confirmation, LedgerError> {
        let mut guard = self.state();
        let state = &mut *guard;
        if state.outages > 0 {
            state.outages -= 1;
            return Err(LedgerError::unavailable("simulated outage"));
        }

        let mut created_game = None;
        let transition = match call {
            LedgerCall::CreateGame { buy_in } => {
                let id = state.last_id + 1;
                let table = Table::new(id, signer, buy_in).map_err(reject)?;
                state.tables.insert(id, table);
                state.last_id = id;
                created_game = Some(id);
                None
            }
            LedgerCall::JoinGame { game_id, value } => {
                table_mut(&mut state.tables, game_id)?
                    .join(signer, value)
                    .map_err(reject)?;
                None
            }
            LedgerCall::StartGame { game_id } => {
                table_mut(&mut state.tables, game_id)?
                    .start(signer, &mut state.rng)
                    .map_err(reject)?;
                None
            }
            LedgerCall::Bet { game_id, amount } => Some(
                table_mut(&mut state.tables, game_id)?
                    .bet(signer, amount, &mut state.rng)
                    .map_err(reject)?,
            ),
            LedgerCall::Call { game_id } => Some(
                table_mut(&mut state.tables, game_id)?
                    .call(signer, &mut state.rng)
                    .map_err(reject)?,
            ),
            LedgerCall::Fold { game_id } => Some(
                table_mut(&mut state.tables, game_id)?
                    .fold(signer, &mut state.rng)
                    .map_err(reject)?,
            ),
        };

        match transition {
            Some(Transition::Advanced(stage)) => debug!(?call, %stage, "stage advanced"),
            Some(Transition::Ended(event)) => {
                info!(
                    game_id = event.game_id,
                    winner = %event.winner,
                    amount = event.winning_amount,
                    "GameEnded"
                );
                state.events.push(LoggedEvent {
                    visible_at: Instant::now() + self.inner.config.event_delay,
                    event,
                });
            }
            Some(Transition::Continued) | None => {}
        }

        state.block += 1;
        let hash: [u8; 32] = state.rng.gen();
        Ok(Confirmation {
            tx_hash: format!("0x{}", hex::encode(hash)),
            block_number: state.block,
            created_game,
        })
    }
}

fn reject(err: TableError) -> LedgerError {
    LedgerError::rejected(err.to_string())
}

fn table_mut(
    tables: &mut BTreeMap<GameId, Table>,
    game_id: GameId,
) -> Result<&mut Table, LedgerError> {
    tables
        .get_mut(&game_id)
        .ok_or_else(|| reject(TableError::UnknownGame))
}

impl Ledger for Simulator {
    async fn submit(&self, signer: Address, call: LedgerCall) -> Result<Confirmation, LedgerError> {
        let latency = self.inner.config.confirmation_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let result = self.apply(signer, call);
        if let Err(err) = &result {
            debug!(call = call.name(), %signer, error = %err, "submission failed");
        }
        result
    }

    async fn game_state(&self, game_id: GameId) -> Result<GameState, LedgerError> {
        self.with_table(game_id, Table::state)
    }

    async fn community_cards(&self, game_id: GameId) -> Result<Vec<u8>, LedgerError> {
        self.with_table(game_id, Table::community_cards)
    }

    async fn player_cards(&self, game_id: GameId, player: Address) -> Result<Vec<u8>, LedgerError> {
        self.with_table(game_id, |table| table.player_cards(player))
    }

    async fn last_id(&self) -> Result<GameId, LedgerError> {
        Ok(self.state().last_id)
    }

    async fn game_ended_events(
        &self,
        from: EventCursor,
    ) -> Result<(Vec<GameEnded>, EventCursor), LedgerError> {
        let state = self.state();
        let now = Instant::now();
        let start = usize::try_from(from.0)
            .unwrap_or(usize::MAX)
            .min(state.events.len());
        let events: Vec<GameEnded> = state.events[start..]
            .iter()
            .take_while(|logged| logged.visible_at <= now)
            .map(|logged| logged.event)
            .collect();
        let next = EventCursor((start + events.len()) as u64);
        Ok((events, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdem_types::Stage;

    fn player(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn seeded() -> Simulator {
        Simulator::new(SimulatorConfig {
            seed: Some(3),
            ..Default::default()
        })
    }

    async fn started_game(simulator: &Simulator) -> GameId {
        let confirmation = simulator
            .submit(player(100), LedgerCall::CreateGame { buy_in: 10 })
            .await
            .unwrap();
        let game_id = confirmation.created_game.unwrap();
        for n in 1..=2 {
            simulator
                .submit(player(n), LedgerCall::JoinGame { game_id, value: 10 })
                .await
                .unwrap();
        }
        simulator
            .submit(player(100), LedgerCall::StartGame { game_id })
            .await
            .unwrap();
        game_id
    }

    #[tokio::test]
    async fn ids_start_at_one_and_increase() {
        let simulator = seeded();
        assert_eq!(simulator.last_id().await.unwrap(), 0);
        for expected in 1..=3 {
            let confirmation = simulator
                .submit(player(1), LedgerCall::CreateGame { buy_in: 1 })
                .await
                .unwrap();
            assert_eq!(confirmation.created_game, Some(expected));
            assert_eq!(confirmation.block_number, expected);
        }
        assert_eq!(simulator.last_id().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn rejections_carry_contract_reasons() {
        let simulator = seeded();
        let game_id = started_game(&simulator).await;
        let err = simulator
            .submit(player(2), LedgerCall::Call { game_id })
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::rejected("Not your turn"));
        let err = simulator.game_state(99).await.unwrap_err();
        assert_eq!(err, LedgerError::rejected("Game does not exist"));
    }

    #[tokio::test]
    async fn injected_outages_are_consumed() {
        let simulator = seeded();
        simulator.fail_next(2);
        for _ in 0..2 {
            let err = simulator
                .submit(player(1), LedgerCall::CreateGame { buy_in: 1 })
                .await
                .unwrap_err();
            assert!(err.is_retryable());
        }
        simulator
            .submit(player(1), LedgerCall::CreateGame { buy_in: 1 })
            .await
            .unwrap();
        assert_eq!(simulator.last_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn events_are_logged_once_and_cursor_resumes() {
        let simulator = seeded();
        let game_id = started_game(&simulator).await;
        simulator
            .submit(player(1), LedgerCall::Call { game_id })
            .await
            .unwrap();
        simulator
            .submit(player(2), LedgerCall::Fold { game_id })
            .await
            .unwrap();
        assert_eq!(simulator.game_state(game_id).await.unwrap().stage, Stage::End);

        let (events, cursor) = simulator
            .game_ended_events(EventCursor::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].winner, player(1));
        assert_eq!(cursor, EventCursor(1));
        let (again, same) = simulator.game_ended_events(cursor).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(same, cursor);
        assert_eq!(simulator.result(game_id), Some(events[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_events_stay_hidden() {
        let simulator = Simulator::new(SimulatorConfig {
            seed: Some(3),
            event_delay: Duration::from_secs(5),
            ..Default::default()
        });
        let game_id = started_game(&simulator).await;
        simulator
            .submit(player(1), LedgerCall::Fold { game_id })
            .await
            .unwrap();
        let (events, cursor) = simulator
            .game_ended_events(EventCursor::default())
            .await
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(cursor, EventCursor(0));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let (events, _) = simulator.game_ended_events(cursor).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].winner, player(2));
    }
}
