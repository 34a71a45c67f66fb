use holdem_types::{Address, GameEnded, GameId, GameState, Wei};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default number of event polls before giving up.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 60;

/// Default delay between event polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Failure reported by a [`Ledger`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger answered and refused the call (revert, wrong stage, not your turn).
    #[error("ledger rejected call: {reason}")]
    Rejected { reason: String },
    /// No answer could be obtained (transport failure, dropped transaction).
    #[error("ledger unavailable: {reason}")]
    Unavailable { reason: String },
    /// The ledger answered with data that does not fit the poker contract.
    #[error("invalid ledger response: {reason}")]
    InvalidResponse { reason: String },
}

impl LedgerError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// Only an unreachable ledger is worth asking again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// A mutating call on the poker contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerCall {
    CreateGame { buy_in: Wei },
    /// Payable: `value` is transferred with the call and must equal the buy-in.
    JoinGame { game_id: GameId, value: Wei },
    StartGame { game_id: GameId },
    Bet { game_id: GameId, amount: Wei },
    Call { game_id: GameId },
    Fold { game_id: GameId },
}

impl LedgerCall {
    /// Contract function name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCall::CreateGame { .. } => "createGame",
            LedgerCall::JoinGame { .. } => "joinGame",
            LedgerCall::StartGame { .. } => "startGame",
            LedgerCall::Bet { .. } => "bet",
            LedgerCall::Call { .. } => "call",
            LedgerCall::Fold { .. } => "fold",
        }
    }
}

/// Proof that a call reached finality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: String,
    pub block_number: u64,
    /// Game id announced by the call's receipt (set for `CreateGame`).
    pub created_game: Option<GameId>,
}

/// Position in the ledger's event log. Polling from the same cursor is idempotent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventCursor(pub u64);

/// Bounded polling window: `attempts` polls spaced by `interval`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollWindow {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollWindow {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollWindow {
    /// Upper bound on the time spent waiting (excluding the polls themselves).
    pub fn total(&self) -> Duration {
        self.interval.saturating_mul(self.attempts.saturating_sub(1))
    }

    /// Hard limit on a whole wait: the pauses plus one interval for the last poll.
    pub fn deadline(&self) -> Duration {
        self.total().saturating_add(self.interval)
    }
}

/// Trait for interacting with the poker ledger.
///
/// Implementations must be safe to share across concurrently running sessions:
/// every call names its own game and signer.
pub trait Ledger: Clone + Send + Sync + 'static {
    /// Send a mutating call signed by `signer` and wait until it is final.
    fn submit(
        &self,
        signer: Address,
        call: LedgerCall,
    ) -> impl Future<Output = Result<Confirmation, LedgerError>> + Send;

    /// Read `getGameState`.
    fn game_state(
        &self,
        game_id: GameId,
    ) -> impl Future<Output = Result<GameState, LedgerError>> + Send;

    /// Read `getCommunityCards` (unrevealed slots are 0).
    fn community_cards(
        &self,
        game_id: GameId,
    ) -> impl Future<Output = Result<Vec<u8>, LedgerError>> + Send;

    /// Read `getPlayerCards`.
    fn player_cards(
        &self,
        game_id: GameId,
        player: Address,
    ) -> impl Future<Output = Result<Vec<u8>, LedgerError>> + Send;

    /// Read `getLastID`.
    fn last_id(&self) -> impl Future<Output = Result<GameId, LedgerError>> + Send;

    /// `GameEnded` events recorded at or after `from`, and the cursor to resume from.
    fn game_ended_events(
        &self,
        from: EventCursor,
    ) -> impl Future<Output = Result<(Vec<GameEnded>, EventCursor), LedgerError>> + Send;

    /// Poll for the first `GameEnded` event matching `predicate`.
    ///
    /// Returns `None` once the window is exhausted. Poll failures are logged and
    /// count against the window; this never errors. The whole wait, slow polls
    /// included, is capped at [`PollWindow::deadline`].
    fn wait_for_event<P>(
        &self,
        predicate: P,
        window: PollWindow,
    ) -> impl Future<Output = Option<GameEnded>> + Send
    where
        P: Fn(&GameEnded) -> bool + Send + Sync,
    {
        async move {
            let polling = async {
                let mut cursor = EventCursor::default();
                for attempt in 0..window.attempts {
                    if attempt > 0 {
                        tokio::time::sleep(window.interval).await;
                    }
                    match self.game_ended_events(cursor).await {
                        Ok((events, next)) => {
                            if let Some(event) = events.into_iter().find(|event| predicate(event)) {
                                return Some(event);
                            }
                            cursor = next;
                        }
                        Err(err) => {
                            warn!(attempt, error = %err, "event poll failed");
                        }
                    }
                    debug!(attempt, cursor = cursor.0, "no matching event yet");
                }
                None
            };
            match tokio::time::timeout(window.deadline(), polling).await {
                Ok(found) => found,
                Err(_) => {
                    warn!(deadline = ?window.deadline(), "event polling cut off");
                    None
                }
            }
        }
    }
}
