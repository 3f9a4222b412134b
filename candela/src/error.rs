use crate::interval::Interval;
use smol_str::SmolStr;
use thiserror::Error;

/// All errors generated by the aggregation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unroutable payload: {0}")]
    UnroutablePayload(String),

    #[error("data corruption in {symbol} {interval} candles: {detail}")]
    DataCorruption {
        symbol: SmolStr,
        interval: Interval,
        detail: String,
    },

    #[error("data leakage in {symbol} {interval}: data arrived out of order or the consumer is lagging")]
    DataLeakage { symbol: SmolStr, interval: Interval },

    #[error("invalid retroactive write: {0}")]
    InvalidRetroactiveWrite(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("market data source error: {0}")]
    Source(String),
}

impl EngineError {
    /// Determine if an error compromises the integrity of a `Window`.
    ///
    /// Non-fatal errors cover a single payload: the consumer drops it, logs,
    /// and keeps draining the queue. Fatal errors mean the affected Window can
    /// no longer be trusted to be gap-free and must be surfaced to the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            EngineError::MalformedPayload(_)
                | EngineError::UnroutablePayload(_)
                | EngineError::Source(_)
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(value: serde_json::Error) -> Self {
        Self::MalformedPayload(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_is_fatal() {
        struct TestCase {
            input: EngineError,
            expected: bool,
        }

        let tests = vec![
            // TC0: malformed payloads are dropped without stopping the consumer
            TestCase {
                input: EngineError::MalformedPayload("bad kline".to_string()),
                expected: false,
            },
            // TC1: unroutable payloads are reported and dropped
            TestCase {
                input: EngineError::UnroutablePayload("no window for ETHBTC 5m".to_string()),
                expected: false,
            },
            // TC2: corrupted backfill compromises the window
            TestCase {
                input: EngineError::DataCorruption {
                    symbol: SmolStr::new("BTCUSDT"),
                    interval: Interval::M15,
                    detail: "skipped a bucket".to_string(),
                },
                expected: true,
            },
            // TC3: stale live updates compromise the window
            TestCase {
                input: EngineError::DataLeakage {
                    symbol: SmolStr::new("BTCUSDT"),
                    interval: Interval::M1,
                },
                expected: true,
            },
            // TC4: retroactive writes are always fatal for the payload path
            TestCase {
                input: EngineError::InvalidRetroactiveWrite("closed bucket".to_string()),
                expected: true,
            },
            // TC5: transport failures do not touch window state
            TestCase {
                input: EngineError::Source("connection reset".to_string()),
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.input.is_fatal(), test.expected, "TC{index} failed");
        }
    }
}
