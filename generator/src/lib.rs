// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

pub mod abi;
pub mod backend;
pub mod chain_registry;
pub mod config;
pub mod cosmos_client;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod eth_client;
pub mod events;
pub mod inflight;
pub mod metered_eth_provider;
pub mod metrics;
pub mod networks;
pub mod node;
pub mod pipeline;
pub mod receipt;
pub mod scheduler;
pub mod server;
pub mod settlement;
pub mod types;

#[cfg(test)]
pub mod eth_mock_provider;

#[cfg(test)]
pub mod test_utils;

#[macro_export]
macro_rules! retry_with_max_elapsed_time {
    ($func:expr, $max_elapsed_time:expr) => {{
        // The following delay sequence (in secs) will be used, applied with jitter
        // 0.4, 0.8, 1.6, 3.2, 6.4, 12.8, 25.6, 30, 60, 120, 120 ...
        let backoff = backoff::ExponentialBackoff {
            initial_interval: Duration::from_millis(400),
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval: Duration::from_secs(120),
            max_elapsed_time: Some($max_elapsed_time),
            ..Default::default()
        };
        backoff::future::retry(backoff, || {
            let fut = async {
                let result = $func.await;
                match result {
                    Ok(_) => {
                        return Ok(result);
                    }
                    Err(e) => {
                        // Every error is treated as transient until max_elapsed_time
                        tracing::debug!("Retrying due to error: {:?}", e);
                        return Err(backoff::Error::transient(e));
                    }
                }
            };
            std::boxed::Box::pin(fut)
        })
        .await
    }};
}

#[cfg(test)]
mod tests {
    use crate::error::{GeneratorError, GeneratorResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn flaky(calls: &AtomicUsize, failures: usize) -> GeneratorResult<usize> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < failures {
            Err(GeneratorError::BackendError(format!("attempt {}", n)))
        } else {
            Ok(n)
        }
    }

    #[tokio::test]
    async fn test_retry_with_max_elapsed_time() {
        crate::test_utils::init_for_testing();
        // no retry is needed, should return immediately. We give it a very small
        // max_elapsed_time and it should still finish in time.
        let calls = AtomicUsize::new(0);
        let max_elapsed_time = Duration::from_millis(20);
        let value = retry_with_max_elapsed_time!(flaky(&calls, 0), max_elapsed_time)
            .unwrap()
            .unwrap();
        assert_eq!(value, 0);

        // one failure, then success on the second attempt
        let calls = AtomicUsize::new(0);
        let value = retry_with_max_elapsed_time!(flaky(&calls, 1), Duration::from_secs(10))
            .unwrap()
            .unwrap();
        assert_eq!(value, 1);

        // now call a function that always errors and expect it to return before max_elapsed_time runs out
        let calls = AtomicUsize::new(0);
        let max_elapsed_time = Duration::from_secs(2);
        let instant = std::time::Instant::now();
        let err = retry_with_max_elapsed_time!(flaky(&calls, usize::MAX), max_elapsed_time)
            .unwrap_err();
        assert!(matches!(err, GeneratorError::BackendError(_)));
        assert!(calls.load(Ordering::SeqCst) > 1);
        assert!(instant.elapsed() < max_elapsed_time + Duration::from_secs(2));
    }
}
