use candela::{
    config::EngineConfig, engine::Engine, exchange::binance::BinanceMarketData,
    interval::Interval, timeframe::TimeFrame,
};
use tracing::info;

#[tokio::main]
async fn main() {
    // Initialise INFO Tracing log subscriber
    init_logging();

    // Aggregate BTC against USDT into a 2s, 1m and 15m window.
    let config = EngineConfig::default()
        .with_assets(&["BTC"], &["USDT"])
        .with_window(Interval::S2, 300)
        .with_window(Interval::M1, 500)
        .with_window(Interval::M15, 200);

    let engine = Engine::new(config, BinanceMarketData::new()).expect("valid configuration");
    let shutdown = engine.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.shutdown();
        }
    });

    match engine.run().await {
        Ok(registry) => {
            for entry in registry.symbols() {
                for window in entry.windows() {
                    info!(
                        symbol = %entry.symbol(),
                        interval = %window.interval(),
                        n_timeframes = window.len(),
                        latest_close = %window
                            .latest()
                            .and_then(TimeFrame::candle)
                            .map(|candle| candle.close.to_string())
                            .unwrap_or_else(|| "none".to_string()),
                        "final window state"
                    );
                }
            }
        }
        Err(error) => eprintln!("engine stopped with pipeline error: {error}"),
    }
}

// Initialise an INFO `Subscriber` for `Tracing` logs
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init()
}
