// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The generic JSON-over-HTTP GET helper every biotek/incubator call goes
//! through, grounded on `curl(url)` in `original_source/robots.py`: a GET
//! request with a large finite timeout (spec §5: "HTTP calls use a large
//! finite timeout, ~10 minutes"), parsed as JSON.

use std::time::Duration;

use serde_json::Value;

/// Ten minutes, matching `curl`'s `ten_minutes = 60 * 10` timeout.
pub const DEVICE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// A client that can perform a blocking GET and parse the body as JSON.
/// Abstracted so tests can substitute an in-process mock server without
/// pulling `reqwest` into the test binary's critical path.
pub trait JsonClient: Send + Sync {
    fn get(&self, url: &str) -> anyhow::Result<Value>;
}

/// The real adapter, backed by a blocking `reqwest::Client` with the
/// device timeout baked in.
pub struct ReqwestJsonClient {
    client: reqwest::blocking::Client,
}

impl ReqwestJsonClient {
    pub fn new() -> anyhow::Result<ReqwestJsonClient> {
        let client = reqwest::blocking::Client::builder()
            .timeout(DEVICE_TIMEOUT)
            .build()?;
        Ok(ReqwestJsonClient { client })
    }
}

impl Default for ReqwestJsonClient {
    fn default() -> ReqwestJsonClient {
        ReqwestJsonClient::new().expect("failed to build the device HTTP client")
    }
}

impl JsonClient for ReqwestJsonClient {
    fn get(&self, url: &str) -> anyhow::Result<Value> {
        tracing::debug!(url, "curl");
        let value = self.client.get(url).send()?.error_for_status()?.json()?;
        Ok(value)
    }
}
