//! Turns one [`Action`] into exactly one ledger submission.

use crate::ledger::{Confirmation, Ledger, LedgerCall, LedgerError};
use holdem_types::{Action, ActionKind, Address, GameId, Wei};
use thiserror::Error;
use tracing::{debug, info};

fn game_label(game_id: &Option<GameId>) -> String {
    match game_id {
        Some(id) => format!("game {id}"),
        None => "new game".to_string(),
    }
}

/// Failure of a single dispatched action.
///
/// `game_id` is `None` only for `Create`, before the ledger assigned one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("invalid {action} for {}: {reason}", game_label(.game_id))]
    Validation {
        action: ActionKind,
        game_id: Option<GameId>,
        reason: String,
    },
    #[error("{action} rejected for {}: {reason}", game_label(.game_id))]
    Rejected {
        action: ActionKind,
        game_id: Option<GameId>,
        reason: String,
    },
    #[error("{action} unavailable for {}: {reason}", game_label(.game_id))]
    Unavailable {
        action: ActionKind,
        game_id: Option<GameId>,
        reason: String,
    },
    #[error("{action} got invalid response for {}: {reason}", game_label(.game_id))]
    InvalidResponse {
        action: ActionKind,
        game_id: Option<GameId>,
        reason: String,
    },
}

impl ActionError {
    fn from_ledger(action: ActionKind, game_id: Option<GameId>, err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected { reason } => Self::Rejected {
                action,
                game_id,
                reason,
            },
            LedgerError::Unavailable { reason } => Self::Unavailable {
                action,
                game_id,
                reason,
            },
            LedgerError::InvalidResponse { reason } => Self::InvalidResponse {
                action,
                game_id,
                reason,
            },
        }
    }

    fn validation(action: ActionKind, game_id: Option<GameId>, reason: &str) -> Self {
        Self::Validation {
            action,
            game_id,
            reason: reason.to_string(),
        }
    }

    pub fn action(&self) -> ActionKind {
        match self {
            Self::Validation { action, .. }
            | Self::Rejected { action, .. }
            | Self::Unavailable { action, .. }
            | Self::InvalidResponse { action, .. } => *action,
        }
    }

    pub fn game_id(&self) -> Option<GameId> {
        match self {
            Self::Validation { game_id, .. }
            | Self::Rejected { game_id, .. }
            | Self::Unavailable { game_id, .. }
            | Self::InvalidResponse { game_id, .. } => *game_id,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Validation { reason, .. }
            | Self::Rejected { reason, .. }
            | Self::Unavailable { reason, .. }
            | Self::InvalidResponse { reason, .. } => reason,
        }
    }

    /// The action definitively did not happen (bad input or refused by the ledger).
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Rejected { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Submits actions on behalf of participants. Never retries on its own.
#[derive(Clone)]
pub struct Dispatcher<L: Ledger> {
    ledger: L,
}

impl<L: Ledger> Dispatcher<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Create a game owned by `dealer` and return the id the ledger assigned.
    pub async fn create(
        &self,
        dealer: Address,
        buy_in: Wei,
    ) -> Result<(GameId, Confirmation), ActionError> {
        let kind = ActionKind::Create;
        if buy_in == 0 {
            return Err(ActionError::validation(kind, None, "buy-in must be positive"));
        }
        let confirmation = self
            .ledger
            .submit(dealer, LedgerCall::CreateGame { buy_in })
            .await
            .map_err(|err| ActionError::from_ledger(kind, None, err))?;
        let game_id = match confirmation.created_game {
            Some(id) => id,
            None => {
                debug!(tx_hash = %confirmation.tx_hash, "no GameCreated log, reading last id");
                self.ledger
                    .last_id()
                    .await
                    .map_err(|err| ActionError::from_ledger(kind, None, err))?
            }
        };
        info!(game_id, %dealer, buy_in, tx_hash = %confirmation.tx_hash, "game created");
        Ok((game_id, confirmation))
    }

    /// Submit `action` for `actor` in `game_id`.
    ///
    /// `Create` has no game yet and must go through [`Dispatcher::create`].
    pub async fn dispatch(
        &self,
        game_id: GameId,
        actor: Address,
        action: Action,
    ) -> Result<Confirmation, ActionError> {
        let kind = action.kind();
        let call = Self::call(game_id, action)?;
        let confirmation = self
            .ledger
            .submit(actor, call)
            .await
            .map_err(|err| ActionError::from_ledger(kind, Some(game_id), err))?;
        info!(
            game_id,
            player = %actor,
            action = %kind,
            tx_hash = %confirmation.tx_hash,
            block = confirmation.block_number,
            "action confirmed"
        );
        Ok(confirmation)
    }

    fn call(game_id: GameId, action: Action) -> Result<LedgerCall, ActionError> {
        let kind = action.kind();
        let positive = |amount: Wei, what: &str| {
            if amount == 0 {
                Err(ActionError::validation(kind, Some(game_id), what))
            } else {
                Ok(amount)
            }
        };
        Ok(match action {
            Action::Create { .. } => {
                return Err(ActionError::validation(
                    kind,
                    Some(game_id),
                    "game already exists",
                ))
            }
            Action::Join { buy_in } => LedgerCall::JoinGame {
                game_id,
                value: positive(buy_in, "buy-in must be positive")?,
            },
            Action::Start => LedgerCall::StartGame { game_id },
            Action::Bet { amount } => LedgerCall::Bet {
                game_id,
                amount: positive(amount, "bet must be positive")?,
            },
            Action::Call => LedgerCall::Call { game_id },
            Action::Fold => LedgerCall::Fold { game_id },
        })
    }
}
