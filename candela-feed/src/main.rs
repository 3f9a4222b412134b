use candela::{
    config::EngineConfig, engine::Engine, exchange::binance::BinanceMarketData,
    interval::Interval, timeframe::TimeFrame,
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialise INFO Tracing log subscriber
    init_logging();

    info!("starting candela feed");

    // Tracked assets are configurable via env vars (comma separated),
    // e.g. CANDELA_BASE_ASSETS=BTC,ETH CANDELA_QUOTE_ASSETS=USDT
    let base_assets = assets_from_env("CANDELA_BASE_ASSETS", &["BTC", "ETH"]);
    let quote_assets = assets_from_env("CANDELA_QUOTE_ASSETS", &["USDT"]);

    let config = EngineConfig::default()
        .with_assets(
            &base_assets.iter().map(String::as_str).collect::<Vec<_>>(),
            &quote_assets.iter().map(String::as_str).collect::<Vec<_>>(),
        )
        .with_window(Interval::S2, 300)
        .with_window(Interval::M1, 500)
        .with_window(Interval::M15, 200)
        .with_window(Interval::H1, 100);

    let engine = match Engine::new(config, BinanceMarketData::new()) {
        Ok(engine) => engine,
        Err(error) => {
            error!(%error, "invalid engine configuration");
            std::process::exit(1);
        }
    };

    let counters = engine.counters();
    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            shutdown.shutdown();
        }
    });

    match engine.run().await {
        Ok(registry) => {
            info!(
                n_symbols = registry.len(),
                candles_backfilled = counters.candle_history(),
                candles_streamed = counters.candle_stream(),
                "engine stopped"
            );
            for entry in registry.symbols() {
                for window in entry.windows() {
                    let latest_close = window
                        .latest()
                        .and_then(TimeFrame::candle)
                        .map(|candle| candle.close.to_string())
                        .unwrap_or_else(|| "none".to_string());
                    info!(
                        symbol = %entry.symbol(),
                        interval = %window.interval(),
                        n_timeframes = window.len(),
                        latest_close = %latest_close,
                        "final window state"
                    );
                }
            }
        }
        Err(error) => {
            error!(%error, "engine stopped with pipeline error");
            std::process::exit(1);
        }
    }
}

fn assets_from_env(var: &str, default: &[&str]) -> Vec<String> {
    std::env::var(var)
        .map(|raw| {
            raw.split(',')
                .map(|asset| asset.trim().to_string())
                .filter(|asset| !asset.is_empty())
                .collect()
        })
        .unwrap_or_else(|_| default.iter().map(|asset| asset.to_string()).collect())
}

// Initialise an INFO `Subscriber` for `Tracing` logs
fn init_logging() {
    tracing_subscriber::fmt()
        // Filter messages based on the INFO level
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        // Use colored output in debug mode
        .with_ansi(cfg!(debug_assertions))
        // Install this Tracing subscriber as global default
        .init()
}
