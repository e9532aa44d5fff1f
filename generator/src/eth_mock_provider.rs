// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, MockError};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// JSON-RPC client answering from canned responses keyed by method and
/// serialized params. A method-only response acts as a fallback.
#[derive(Clone, Debug, Default)]
pub struct EthMockProvider {
    responses: Arc<Mutex<HashMap<(String, String), Value>>>,
    method_responses: Arc<Mutex<HashMap<String, Value>>>,
}

impl EthMockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_response<P: Serialize, R: Serialize>(
        &self,
        method: &str,
        params: P,
        response: R,
    ) -> Result<(), MockError> {
        let params = serde_json::to_string(&params)?;
        let value = serde_json::to_value(response)?;
        self.responses
            .lock()
            .insert((method.to_string(), params), value);
        Ok(())
    }

    pub fn add_method_response<R: Serialize>(
        &self,
        method: &str,
        response: R,
    ) -> Result<(), MockError> {
        let value = serde_json::to_value(response)?;
        self.method_responses
            .lock()
            .insert(method.to_string(), value);
        Ok(())
    }
}

#[async_trait]
impl JsonRpcClient for EthMockProvider {
    type Error = MockError;

    async fn request<T: Serialize + Send + Sync + Debug, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, MockError> {
        let params = serde_json::to_string(&params)?;
        let keyed = self
            .responses
            .lock()
            .get(&(method.to_string(), params.clone()))
            .cloned();
        let value = match keyed {
            Some(value) => value,
            None => self
                .method_responses
                .lock()
                .get(method)
                .cloned()
                .ok_or_else(|| {
                    tracing::debug!("[EthMockProvider] no response for {} {}", method, params);
                    MockError::EmptyResponses
                })?,
        };
        Ok(serde_json::from_value(value)?)
    }
}
