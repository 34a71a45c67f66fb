use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use holdem_client::{ActionError, Completion, Confirmation, Ledger, LedgerError};
use holdem_types::{
    api::{
        ActionResponse, BetRequest, CardView, CommunityCardsResponse, CreateGameRequest,
        ErrorResponse, GameActionRequest, GameResultResponse, JoinGameRequest,
        PlayerCardsResponse,
    },
    decode_hand, Action, ActionKind, Address, GameId,
};
use serde::Serialize;
use tracing::warn;

use super::{AppState, SharedState};
use axum::extract::State as AxumState;

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

pub(super) async fn action_metrics<L: Ledger>(AxumState(state): SharedState<L>) -> Response {
    Json(state.metrics.snapshot()).into_response()
}

fn bad_request(error: String, action: Option<ActionKind>, game_id: Option<GameId>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error,
            action,
            game_id,
        }),
    )
        .into_response()
}

fn action_failed(err: &ActionError) -> Response {
    warn!(action = %err.action(), game_id = ?err.game_id(), error = %err, "action failed");
    bad_request(err.to_string(), Some(err.action()), err.game_id())
}

fn read_failed(game_id: GameId, err: LedgerError) -> Response {
    bad_request(err.to_string(), None, Some(game_id))
}

fn acknowledge(message: String, game_id: GameId, confirmation: Confirmation) -> Response {
    Json(ActionResponse {
        message,
        game_id,
        tx_hash: confirmation.tx_hash,
    })
    .into_response()
}

/// Dispatch `action` for `actor` and turn the outcome into a response.
async fn act<L: Ledger>(
    state: &AppState<L>,
    game_id: GameId,
    actor: Address,
    action: Action,
    message: String,
) -> Response {
    let result = state.dispatcher.dispatch(game_id, actor, action).await;
    state.metrics.record(&result);
    match result {
        Ok(confirmation) => acknowledge(message, game_id, confirmation),
        Err(err) => action_failed(&err),
    }
}

pub(super) async fn create_game<L: Ledger>(
    AxumState(state): SharedState<L>,
    payload: Result<Json<CreateGameRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection.body_text(), Some(ActionKind::Create), None),
    };
    let dealer = request.dealer_account.unwrap_or(state.config.dealer);
    let result = state.dispatcher.create(dealer, request.buy_in_ether.wei()).await;
    state.metrics.record(&result);
    match result {
        Ok((game_id, confirmation)) => acknowledge(
            format!("Game created with ID {game_id}"),
            game_id,
            confirmation,
        ),
        Err(err) => action_failed(&err),
    }
}

pub(super) async fn join_game<L: Ledger>(
    AxumState(state): SharedState<L>,
    payload: Result<Json<JoinGameRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection.body_text(), Some(ActionKind::Join), None),
    };
    let message = format!(
        "Player {} joined game {}",
        request.player_account, request.game_id
    );
    act(
        &state,
        request.game_id,
        request.player_account,
        Action::Join {
            buy_in: request.buy_in_ether.wei(),
        },
        message,
    )
    .await
}

pub(super) async fn start_game<L: Ledger>(
    AxumState(state): SharedState<L>,
    payload: Result<Json<GameActionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection.body_text(), Some(ActionKind::Start), None),
    };
    let message = format!("Game {} started", request.game_id);
    act(&state, request.game_id, request.player_account, Action::Start, message).await
}

pub(super) async fn bet<L: Ledger>(
    AxumState(state): SharedState<L>,
    payload: Result<Json<BetRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection.body_text(), Some(ActionKind::Bet), None),
    };
    let message = format!(
        "Player {} bet {} wei in game {}",
        request.player_account, request.amount, request.game_id
    );
    act(
        &state,
        request.game_id,
        request.player_account,
        Action::Bet {
            amount: request.amount,
        },
        message,
    )
    .await
}

pub(super) async fn call<L: Ledger>(
    AxumState(state): SharedState<L>,
    payload: Result<Json<GameActionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection.body_text(), Some(ActionKind::Call), None),
    };
    let message = format!(
        "Player {} called in game {}",
        request.player_account, request.game_id
    );
    act(&state, request.game_id, request.player_account, Action::Call, message).await
}

pub(super) async fn fold<L: Ledger>(
    AxumState(state): SharedState<L>,
    payload: Result<Json<GameActionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection.body_text(), Some(ActionKind::Fold), None),
    };
    let message = format!(
        "Player {} folded in game {}",
        request.player_account, request.game_id
    );
    act(&state, request.game_id, request.player_account, Action::Fold, message).await
}

fn decode_cards(game_id: GameId, ids: &[u8]) -> Result<Vec<CardView>, Response> {
    decode_hand(ids)
        .map(|cards| cards.into_iter().map(CardView::from).collect())
        .map_err(|err| bad_request(err.to_string(), None, Some(game_id)))
}

pub(super) async fn community_cards<L: Ledger>(
    AxumState(state): SharedState<L>,
    path: Result<Path<GameId>, PathRejection>,
) -> Response {
    let Path(game_id) = match path {
        Ok(path) => path,
        Err(rejection) => return bad_request(rejection.body_text(), None, None),
    };
    let ids = match state.dispatcher.ledger().community_cards(game_id).await {
        Ok(ids) => ids,
        Err(err) => return read_failed(game_id, err),
    };
    match decode_cards(game_id, &ids) {
        Ok(community_cards) => Json(CommunityCardsResponse {
            game_id,
            community_cards,
        })
        .into_response(),
        Err(response) => response,
    }
}

pub(super) async fn player_cards<L: Ledger>(
    AxumState(state): SharedState<L>,
    path: Result<Path<(GameId, Address)>, PathRejection>,
) -> Response {
    let Path((game_id, player_account)) = match path {
        Ok(path) => path,
        Err(rejection) => return bad_request(rejection.body_text(), None, None),
    };
    let ids = match state
        .dispatcher
        .ledger()
        .player_cards(game_id, player_account)
        .await
    {
        Ok(ids) => ids,
        Err(err) => return read_failed(game_id, err),
    };
    match decode_cards(game_id, &ids) {
        Ok(player_cards) => Json(PlayerCardsResponse {
            game_id,
            player_account,
            player_cards,
        })
        .into_response(),
        Err(response) => response,
    }
}

pub(super) async fn game_result<L: Ledger>(
    AxumState(state): SharedState<L>,
    path: Result<Path<GameId>, PathRejection>,
) -> Response {
    let Path(game_id) = match path {
        Ok(path) => path,
        Err(rejection) => return bad_request(rejection.body_text(), None, None),
    };
    let result = match state.watcher.wait(game_id).await {
        Completion::Resolved(event) => Some(event.into()),
        Completion::Unresolved { .. } => None,
    };
    Json(GameResultResponse { game_id, result }).into_response()
}
