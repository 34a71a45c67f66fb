//! End-to-end run of one game, from creation to the terminal event.

use crate::backoff::RetryPolicy;
use crate::dispatch::{ActionError, Dispatcher};
use crate::ledger::{Ledger, LedgerError, PollWindow};
use crate::sequencer::{with_retry, Cancellation, Policy, StageSequencer};
use crate::watcher::{Completion, CompletionWatcher};
use holdem_types::{decode_hand, Action, Address, Card, GameEnded, GameId, Session, Stage, Wei};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("invalid session request: {0}")]
    Validation(String),
    #[error("session setup failed: {0}")]
    Setup(#[source] ActionError),
    #[error("ledger unavailable for game {game_id} after {attempts} attempts: {reason}")]
    Unavailable {
        game_id: GameId,
        attempts: usize,
        reason: String,
    },
    #[error("ledger error for game {game_id}: {source}")]
    Ledger {
        game_id: GameId,
        source: LedgerError,
    },
    #[error("game {game_id} went back from {from} to {to}")]
    StageRegressed { game_id: GameId, from: Stage, to: Stage },
    #[error("game {game_id} did not leave {stage} after a full round")]
    StageStalled { game_id: GameId, stage: Stage },
    #[error("game {game_id} pot decreased from {from} to {to}")]
    PotDecreased { game_id: GameId, from: Wei, to: Wei },
    #[error("game {game_id} ended inconsistently: {reason}")]
    InconsistentOutcome { game_id: GameId, reason: String },
    #[error("game {game_id} cancelled at {stage}")]
    Cancelled { game_id: GameId, stage: Stage },
    #[error("no result for game {game_id} within {waited:?}")]
    Timeout { game_id: GameId, waited: Duration },
}

impl OrchestrationError {
    pub(crate) fn from_ledger(game_id: GameId, err: LedgerError, attempts: usize) -> Self {
        match err {
            LedgerError::Unavailable { reason } => Self::Unavailable {
                game_id,
                attempts,
                reason,
            },
            source => Self::Ledger { game_id, source },
        }
    }

    pub fn game_id(&self) -> Option<GameId> {
        match self {
            Self::Validation(_) => None,
            Self::Setup(err) => err.game_id(),
            Self::Unavailable { game_id, .. }
            | Self::Ledger { game_id, .. }
            | Self::StageRegressed { game_id, .. }
            | Self::StageStalled { game_id, .. }
            | Self::PotDecreased { game_id, .. }
            | Self::InconsistentOutcome { game_id, .. }
            | Self::Cancelled { game_id, .. }
            | Self::Timeout { game_id, .. } => Some(*game_id),
        }
    }
}

/// Everything learned about a finished game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerminalOutcome {
    pub session: Session,
    pub result: GameEnded,
    pub stages: Vec<Stage>,
    pub board: Vec<Card>,
    /// Hole cards per participant, in roster order.
    pub hands: Vec<(Address, Vec<Card>)>,
    pub folded: Vec<Address>,
}

pub struct SessionOrchestrator<L: Ledger> {
    dispatcher: Dispatcher<L>,
    retry: RetryPolicy,
    window: PollWindow,
    cancellation: Cancellation,
    dealer: Option<Address>,
}

impl<L: Ledger> SessionOrchestrator<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            dispatcher: Dispatcher::new(ledger),
            retry: RetryPolicy::default(),
            window: PollWindow::default(),
            cancellation: Cancellation::new(),
            dealer: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_window(mut self, window: PollWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Account that creates and starts games. Defaults to the first participant.
    pub fn with_dealer(mut self, dealer: Address) -> Self {
        self.dealer = Some(dealer);
        self
    }

    pub fn cancellation(&self) -> Cancellation {
        self.cancellation.clone()
    }

    /// Wait again for the result of a game whose earlier wait timed out.
    pub async fn poll_outcome(&self, game_id: GameId) -> Completion {
        self.watcher().wait(game_id).await
    }

    fn watcher(&self) -> CompletionWatcher<L> {
        CompletionWatcher::new(self.dispatcher.ledger().clone(), self.window)
    }

    /// Create a game, seat `participants`, play it with `policy` and wait for the winner.
    pub async fn run_session<P: Policy>(
        &self,
        buy_in: Wei,
        participants: &[Address],
        mut policy: P,
    ) -> Result<TerminalOutcome, OrchestrationError> {
        validate(buy_in, participants)?;
        let dealer = self.dealer.unwrap_or(participants[0]);

        let (game_id, _) = self
            .dispatcher
            .create(dealer, buy_in)
            .await
            .map_err(OrchestrationError::Setup)?;
        let mut session = Session::new(game_id, dealer, buy_in);
        for participant in participants {
            self.dispatcher
                .dispatch(game_id, *participant, Action::Join { buy_in })
                .await
                .map_err(OrchestrationError::Setup)?;
            session.admit(*participant);
        }
        if self.cancellation.is_cancelled() {
            return Err(OrchestrationError::Cancelled {
                game_id,
                stage: Stage::PreFlop,
            });
        }
        self.dispatcher
            .dispatch(game_id, dealer, Action::Start)
            .await
            .map_err(OrchestrationError::Setup)?;
        info!(game_id, players = session.participants.len(), pot = session.pot, "game started");

        let mut hands = Vec::with_capacity(session.participants.len());
        for participant in &session.participants {
            let ids = with_retry(&self.retry, "player_cards", || {
                self.dispatcher.ledger().player_cards(game_id, *participant)
            })
            .await
            .map_err(|(err, attempts)| OrchestrationError::from_ledger(game_id, err, attempts))?;
            let cards = decode_hand(&ids).unwrap_or_else(|err| {
                warn!(game_id, player = %participant, error = %err, "undecodable hole cards");
                Vec::new()
            });
            hands.push((*participant, cards));
        }

        let sequencer = StageSequencer::new(
            self.dispatcher.clone(),
            self.retry,
            self.cancellation.clone(),
        );
        let report = sequencer.run(&session, &mut policy).await?;
        session.stage = Stage::End;
        session.pot = session.pot.max(report.pot);

        let result = match self.watcher().wait(game_id).await {
            Completion::Resolved(result) => result,
            Completion::Unresolved { game_id, waited } => {
                return Err(OrchestrationError::Timeout { game_id, waited })
            }
        };
        if !session.participants.contains(&result.winner) {
            return Err(OrchestrationError::InconsistentOutcome {
                game_id,
                reason: format!("winner {} is not seated", result.winner),
            });
        }
        if result.winning_amount > session.pot {
            return Err(OrchestrationError::InconsistentOutcome {
                game_id,
                reason: format!(
                    "winnings {} exceed pot {}",
                    result.winning_amount, session.pot
                ),
            });
        }

        Ok(TerminalOutcome {
            session,
            result,
            stages: report.stages,
            board: report.board,
            hands,
            folded: report.folded,
        })
    }
}

fn validate(buy_in: Wei, participants: &[Address]) -> Result<(), OrchestrationError> {
    if buy_in == 0 {
        return Err(OrchestrationError::Validation(
            "buy-in must be positive".to_string(),
        ));
    }
    if participants.len() < 2 {
        return Err(OrchestrationError::Validation(
            "a game needs at least two participants".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for participant in participants {
        if !seen.insert(participant) {
            return Err(OrchestrationError::Validation(format!(
                "participant {participant} listed twice"
            )));
        }
    }
    Ok(())
}
