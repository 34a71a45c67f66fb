use crate::ledger::{Ledger, PollWindow};
use holdem_types::{GameEnded, GameId};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Result of waiting for a game's `GameEnded` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    Resolved(GameEnded),
    /// The window elapsed first. Waiting again is safe.
    Unresolved { game_id: GameId, waited: Duration },
}

/// Waits for the terminal event of one game, ignoring every other game's events.
#[derive(Clone)]
pub struct CompletionWatcher<L: Ledger> {
    ledger: L,
    window: PollWindow,
}

impl<L: Ledger> CompletionWatcher<L> {
    pub fn new(ledger: L, window: PollWindow) -> Self {
        Self { ledger, window }
    }

    pub fn window(&self) -> PollWindow {
        self.window
    }

    /// Never takes longer than the window's deadline, even when a poll hangs.
    pub async fn wait(&self, game_id: GameId) -> Completion {
        let started = Instant::now();
        let found = self
            .ledger
            .wait_for_event(move |event| event.game_id == game_id, self.window)
            .await;
        match found {
            Some(event) => {
                info!(game_id, winner = %event.winner, amount = event.winning_amount, "game ended");
                Completion::Resolved(event)
            }
            None => {
                let waited = started.elapsed();
                warn!(game_id, ?waited, "no GameEnded event within window");
                Completion::Unresolved { game_id, waited }
            }
        }
    }
}
