//! Drives a started game through its betting rounds.

use crate::backoff::{jittered_backoff, RetryPolicy};
use crate::dispatch::{ActionError, Dispatcher};
use crate::ledger::{Ledger, LedgerError};
use crate::orchestrator::OrchestrationError;
use holdem_types::{decode_hand, Action, Address, Card, GameId, GameState, Session, Stage, Wei};
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Chooses each participant's action, once per participant per stage.
pub trait Policy: Send {
    fn action(&mut self, participant: usize, stage: Stage) -> Action;
}

impl<F> Policy for F
where
    F: FnMut(usize, Stage) -> Action + Send,
{
    fn action(&mut self, participant: usize, stage: Stage) -> Action {
        self(participant, stage)
    }
}

/// Every third participant (starting with the first) bets, the others call.
#[derive(Clone, Copy, Debug)]
pub struct RotatingPolicy {
    pub bet: Wei,
}

impl Policy for RotatingPolicy {
    fn action(&mut self, participant: usize, _stage: Stage) -> Action {
        match participant % 3 {
            0 => Action::Bet { amount: self.bet },
            _ => Action::Call,
        }
    }
}

/// Cooperative cancellation flag, checked between stages.
#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One resolved turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionRecord {
    pub stage: Stage,
    pub participant: Address,
    pub action: Action,
    /// Transaction hash when confirmed, `None` when the turn became an implicit fold.
    pub tx_hash: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceReport {
    /// Stages as confirmed by the ledger, ending with `End`.
    pub stages: Vec<Stage>,
    /// Participants that folded, explicitly or through a refused action, in fold order.
    pub folded: Vec<Address>,
    /// Last decodable community cards.
    pub board: Vec<Card>,
    pub actions: Vec<ActionRecord>,
    /// Largest pot observed before payout.
    pub pot: Wei,
}

pub(crate) trait Retryable: Display {
    fn is_retryable(&self) -> bool;
}

impl Retryable for LedgerError {
    fn is_retryable(&self) -> bool {
        LedgerError::is_retryable(self)
    }
}

impl Retryable for ActionError {
    fn is_retryable(&self) -> bool {
        self.is_unavailable()
    }
}

/// Run `op` until it succeeds, fails for good, or the policy runs out of attempts.
pub(crate) async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, (E, usize)>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay =
                    jittered_backoff(&mut rand::thread_rng(), policy.backoff(attempt as u32));
                warn!(what, attempt, ?delay, error = %err, "ledger unavailable, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err((err, attempt)),
        }
    }
}

pub struct StageSequencer<L: Ledger> {
    dispatcher: Dispatcher<L>,
    retry: RetryPolicy,
    cancellation: Cancellation,
}

impl<L: Ledger> StageSequencer<L> {
    pub fn new(dispatcher: Dispatcher<L>, retry: RetryPolicy, cancellation: Cancellation) -> Self {
        Self {
            dispatcher,
            retry,
            cancellation,
        }
    }

    /// Play every betting round of a started `session` until the ledger reports `End`.
    ///
    /// Participants act in roster order. A refused action counts as a fold and
    /// the participant sits out the rest of the game. When at most one
    /// participant is left the sequencer stops dispatching and reports `End`.
    pub async fn run<P: Policy>(
        &self,
        session: &Session,
        policy: &mut P,
    ) -> Result<SequenceReport, OrchestrationError> {
        let game_id = session.id;
        let initial = self.read_state(game_id).await?;
        let mut stage = initial.stage;
        let mut report = SequenceReport {
            stages: vec![stage],
            folded: Vec::new(),
            board: Vec::new(),
            actions: Vec::new(),
            pot: initial.pot,
        };
        let mut folded = HashSet::new();

        while !stage.is_terminal() {
            if self.cancellation.is_cancelled() {
                warn!(game_id, %stage, "session cancelled");
                return Err(OrchestrationError::Cancelled { game_id, stage });
            }
            info!(game_id, %stage, pot = report.pot, "betting round");

            for (index, participant) in session.participants.iter().enumerate() {
                if folded.contains(participant) {
                    continue;
                }
                if session.participants.len() - folded.len() <= 1 {
                    break;
                }
                let action = policy.action(index, stage);
                let result = with_retry(&self.retry, "dispatch", || {
                    self.dispatcher.dispatch(game_id, *participant, action)
                })
                .await;
                match result {
                    Ok(confirmation) => {
                        if action == Action::Fold {
                            folded.insert(*participant);
                            report.folded.push(*participant);
                        }
                        report.actions.push(ActionRecord {
                            stage,
                            participant: *participant,
                            action,
                            tx_hash: Some(confirmation.tx_hash),
                        });
                    }
                    Err((err, _)) if err.is_refusal() => {
                        warn!(game_id, %stage, player = %participant, error = %err, "action refused, folding participant");
                        folded.insert(*participant);
                        report.folded.push(*participant);
                        report.actions.push(ActionRecord {
                            stage,
                            participant: *participant,
                            action,
                            tx_hash: None,
                        });
                        if action != Action::Fold {
                            self.surrender(game_id, stage, *participant, &mut report).await;
                        }
                    }
                    Err((err, attempts)) if err.is_unavailable() => {
                        return Err(OrchestrationError::Unavailable {
                            game_id,
                            attempts,
                            reason: err.reason().to_string(),
                        });
                    }
                    Err((err, _)) => {
                        return Err(OrchestrationError::Ledger {
                            game_id,
                            source: LedgerError::invalid(err.reason()),
                        });
                    }
                }
            }

            if session.participants.len() - folded.len() <= 1 {
                let state = self.read_state(game_id).await?;
                if !state.stage.is_terminal() {
                    warn!(game_id, stage = %state.stage, "one participant left but ledger has not ended the game");
                }
                if state.pot < report.pot && !state.stage.is_terminal() {
                    return Err(OrchestrationError::PotDecreased {
                        game_id,
                        from: report.pot,
                        to: state.pot,
                    });
                }
                report.pot = report.pot.max(state.pot);
                stage = Stage::End;
                report.stages.push(stage);
                info!(game_id, "all but one participant folded");
                break;
            }

            self.reveal(game_id, &mut report).await?;
            let state = self.read_state(game_id).await?;
            stage = self.advance(game_id, stage, &state, &mut report)?;
        }

        Ok(report)
    }

    /// Fold on the ledger for a participant whose action was refused, so the
    /// turn moves on. The participant is out either way.
    async fn surrender(
        &self,
        game_id: GameId,
        stage: Stage,
        participant: Address,
        report: &mut SequenceReport,
    ) {
        let result = with_retry(&self.retry, "fold", || {
            self.dispatcher.dispatch(game_id, participant, Action::Fold)
        })
        .await;
        match result {
            Ok(confirmation) => report.actions.push(ActionRecord {
                stage,
                participant,
                action: Action::Fold,
                tx_hash: Some(confirmation.tx_hash),
            }),
            Err((err, _)) => {
                debug!(game_id, player = %participant, error = %err, "ledger did not accept fold")
            }
        }
    }

    fn advance(
        &self,
        game_id: GameId,
        stage: Stage,
        state: &GameState,
        report: &mut SequenceReport,
    ) -> Result<Stage, OrchestrationError> {
        if state.stage < stage {
            return Err(OrchestrationError::StageRegressed {
                game_id,
                from: stage,
                to: state.stage,
            });
        }
        if state.stage == stage {
            return Err(OrchestrationError::StageStalled { game_id, stage });
        }
        if state.stage != stage.next() {
            debug!(game_id, from = %stage, to = %state.stage, "ledger skipped ahead");
        }
        // The pot is paid out at End.
        if !state.stage.is_terminal() {
            if state.pot < report.pot {
                return Err(OrchestrationError::PotDecreased {
                    game_id,
                    from: report.pot,
                    to: state.pot,
                });
            }
            report.pot = state.pot;
        } else {
            report.pot = report.pot.max(state.pot);
        }
        report.stages.push(state.stage);
        Ok(state.stage)
    }

    async fn reveal(&self, game_id: GameId, report: &mut SequenceReport) -> Result<(), OrchestrationError> {
        let ids = with_retry(&self.retry, "community_cards", || {
            self.dispatcher.ledger().community_cards(game_id)
        })
        .await
        .map_err(|(err, attempts)| OrchestrationError::from_ledger(game_id, err, attempts))?;
        match decode_hand(&ids) {
            Ok(board) => {
                debug!(game_id, board = %holdem_types::card::describe(&board), "community cards");
                report.board = board;
            }
            Err(err) => warn!(game_id, error = %err, "undecodable community cards"),
        }
        Ok(())
    }

    async fn read_state(&self, game_id: GameId) -> Result<GameState, OrchestrationError> {
        with_retry(&self.retry, "game_state", || {
            self.dispatcher.ledger().game_state(game_id)
        })
        .await
        .map_err(|(err, attempts)| OrchestrationError::from_ledger(game_id, err, attempts))
    }
}
