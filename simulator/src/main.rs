use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use holdem_client::{EvmConfig, EvmLedger, Ledger, PollWindow};
use holdem_simulator::{Api, ApiConfig, Simulator, SimulatorConfig};
use holdem_types::Address;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Trace sampling ratio from `OTEL_SAMPLING_RATE`: clamped to `[0, 1]`, everything when unset or unparsable.
fn sampling_rate(value: Option<&str>) -> f64 {
    value
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|rate| !rate.is_nan())
        .map(|rate| rate.clamp(0.0, 1.0))
        .unwrap_or(1.0)
}

fn init_tracing() -> Result<()> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        });

    if let Some(endpoint) = endpoint {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "holdem-simulator".to_string());
        let rate = sampling_rate(std::env::var("OTEL_SAMPLING_RATE").ok().as_deref());
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .context("failed to build OTLP exporter")?;
        let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(rate))
            .with_resource(
                opentelemetry_sdk::Resource::builder_empty()
                    .with_attributes([opentelemetry::KeyValue::new("service.name", service_name)])
                    .build(),
            )
            .with_batch_exporter(exporter)
            .build();
        let tracer = tracer_provider.tracer("holdem-simulator");
        opentelemetry::global::set_tracer_provider(tracer_provider);

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::INFO))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Games live in this process.
    Memory,
    /// Games live in the poker contract on a JSON-RPC node.
    Evm,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    #[arg(long, value_enum, default_value_t = Backend::Memory)]
    backend: Backend,

    /// Account that creates games when a request names none.
    #[arg(long, env = "HOLDEM_DEALER", default_value = "0x0000000000000000000000000000000000000001")]
    dealer: Address,

    /// Browser origins allowed to call the API (comma separated, `*` for any).
    #[arg(long, env = "ALLOWED_HTTP_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    /// Polls made by /game-result before answering with no result.
    #[arg(long, default_value_t = 5)]
    result_polls: u32,

    #[arg(long, default_value_t = 1000)]
    result_poll_interval_ms: u64,

    /// Seed for dealing and winner selection (memory backend).
    #[arg(long)]
    seed: Option<u64>,

    /// Delay before each submission is confirmed (memory backend).
    #[arg(long, default_value_t = 0)]
    confirmation_latency_ms: u64,

    /// Delay before GameEnded events become visible (memory backend).
    #[arg(long, default_value_t = 0)]
    event_delay_ms: u64,

    #[arg(long, env = "HOLDEM_RPC_URL", default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Poker contract address (evm backend).
    #[arg(long, env = "HOLDEM_CONTRACT")]
    contract: Option<Address>,

    #[arg(long, env = "HOLDEM_CHAIN_ID", default_value_t = 31337)]
    chain_id: u64,

    /// Comma separated private keys to sign with locally (evm backend).
    #[arg(long, env = "HOLDEM_PRIVATE_KEYS", value_delimiter = ',')]
    private_keys: Vec<String>,
}

fn api_config(args: &Args) -> ApiConfig {
    ApiConfig {
        dealer: args.dealer,
        result_window: PollWindow {
            attempts: args.result_polls.max(1),
            interval: Duration::from_millis(args.result_poll_interval_ms),
        },
        allowed_origins: args.allowed_origins.clone(),
    }
}

fn evm_config(args: &Args) -> Result<EvmConfig> {
    let contract = args
        .contract
        .context("--contract (or HOLDEM_CONTRACT) is required for the evm backend")?;
    let mut config = EvmConfig::new(args.rpc_url.clone(), contract);
    config.chain_id = args.chain_id;
    config.private_keys = args.private_keys.clone();
    Ok(config)
}

async fn serve<L: Ledger>(ledger: L, config: ApiConfig, addr: SocketAddr) -> Result<()> {
    let app = Api::new(ledger, config).router();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(listener, app.into_make_service())
        .await
        .context("axum server error")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    init_tracing()?;

    let addr = SocketAddr::new(args.host, args.port);
    let config = api_config(&args);
    match args.backend {
        Backend::Memory => {
            let simulator = Simulator::new(SimulatorConfig {
                seed: args.seed,
                confirmation_latency: Duration::from_millis(args.confirmation_latency_ms),
                event_delay: Duration::from_millis(args.event_delay_ms),
            });
            info!(seed = ?args.seed, "serving in-memory ledger");
            serve(simulator, config, addr).await
        }
        Backend::Evm => {
            let ledger = EvmLedger::new(evm_config(&args)?).context("failed to connect to ledger")?;
            info!(rpc_url = %args.rpc_url, "serving EVM ledger");
            serve(ledger, config, addr).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory_backend_defaults() {
        let args = Args::parse_from(["holdem-simulator", "--seed", "7", "--result-polls", "0"]);
        assert_eq!(args.backend, Backend::Memory);
        assert_eq!(args.seed, Some(7));
        let config = api_config(&args);
        assert_eq!(config.result_window.attempts, 1);
        assert_eq!(config.dealer, Address::from_low_u64(1));
    }

    #[test]
    fn evm_backend_requires_contract() {
        let mut args = Args::parse_from(["holdem-simulator", "--backend", "evm"]);
        // Ignore any HOLDEM_CONTRACT in the environment.
        args.contract = None;
        let err = evm_config(&args).unwrap_err();
        assert!(err.to_string().contains("HOLDEM_CONTRACT"), "unexpected error: {err}");

        let args = Args::parse_from([
            "holdem-simulator",
            "--backend",
            "evm",
            "--contract",
            "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "--chain-id",
            "31337",
        ]);
        let config = evm_config(&args).unwrap();
        assert_eq!(config.chain_id, 31337);
        assert_eq!(
            config.contract,
            "0x5fbdb2315678afecb367f032d93f642f64180aa3".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn sampling_rate_is_clamped() {
        assert_eq!(sampling_rate(None), 1.0);
        assert_eq!(sampling_rate(Some("0.25")), 0.25);
        assert_eq!(sampling_rate(Some(" 0.5 ")), 0.5);
        assert_eq!(sampling_rate(Some("7")), 1.0);
        assert_eq!(sampling_rate(Some("-1")), 0.0);
        assert_eq!(sampling_rate(Some("NaN")), 1.0);
        assert_eq!(sampling_rate(Some("often")), 1.0);
    }
}
