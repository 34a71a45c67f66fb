use axum::{
    extract::{Request, State as AxumState},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use holdem_client::{CompletionWatcher, Dispatcher, Ledger, PollWindow};
use holdem_types::Address;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::metrics::ActionMetrics;

mod http;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Account used to create games when the request names none.
    pub dealer: Address,
    /// How long `/game-result` waits for the `GameEnded` event.
    pub result_window: PollWindow,
    /// Browser origins allowed by CORS; `*` allows any.
    pub allowed_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            dealer: Address::from_low_u64(1),
            result_window: PollWindow {
                attempts: 5,
                interval: Duration::from_secs(1),
            },
            allowed_origins: Vec::new(),
        }
    }
}

pub(crate) struct AppState<L: Ledger> {
    dispatcher: Dispatcher<L>,
    watcher: CompletionWatcher<L>,
    config: ApiConfig,
    metrics: ActionMetrics,
}

/// HTTP surface over any [`Ledger`].
pub struct Api<L: Ledger> {
    state: Arc<AppState<L>>,
}

impl<L: Ledger> Api<L> {
    pub fn new(ledger: L, config: ApiConfig) -> Self {
        let state = AppState {
            dispatcher: Dispatcher::new(ledger.clone()),
            watcher: CompletionWatcher::new(ledger, config.result_window),
            config,
            metrics: ActionMetrics::default(),
        };
        Self {
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        let cors = cors_layer(&self.state.config.allowed_origins);

        Router::new()
            .route("/healthz", get(http::healthz))
            .route("/metrics/actions", get(http::action_metrics::<L>))
            .route("/create-game", post(http::create_game::<L>))
            .route("/join-game", post(http::join_game::<L>))
            .route("/start-game", post(http::start_game::<L>))
            .route("/bet", post(http::bet::<L>))
            .route("/call", post(http::call::<L>))
            .route("/fold", post(http::fold::<L>))
            .route("/community-cards/:game_id", get(http::community_cards::<L>))
            .route(
                "/player-cards/:game_id/:player_account",
                get(http::player_cards::<L>),
            )
            .route("/game-result/:game_id", get(http::game_result::<L>))
            .layer(cors)
            .layer(middleware::from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any_origin = allowed_origins.iter().any(|origin| origin == "*");
    if allowed_origins.is_empty() {
        tracing::warn!("ALLOWED_HTTP_ORIGINS is empty; all browser origins will be rejected");
    }
    let origins = allowed_origins
        .iter()
        .filter(|origin| *origin != "*")
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Invalid origin in ALLOWED_HTTP_ORIGINS: {}", origin);
                None
            }
        })
        .collect::<Vec<_>>();

    if allow_any_origin {
        CorsLayer::new().allow_origin(AllowOrigin::any())
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    }
    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
    .allow_headers([
        header::CONTENT_TYPE,
        header::HeaderName::from_static("x-request-id"),
    ])
    .expose_headers([header::HeaderName::from_static("x-request-id")])
}

async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(header::HeaderName::from_static("x-request-id"))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(
            header::HeaderName::from_static("x-request-id"),
            header_value,
        );
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}

pub(crate) type SharedState<L> = AxumState<Arc<AppState<L>>>;
