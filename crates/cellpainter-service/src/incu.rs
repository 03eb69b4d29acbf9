// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The incubator HTTP adapter, grounded on `incu_cmd`/`is_incu_ready` in
//! `original_source/robots.py`: `GET {incu_url}/{input_plate|output_plate}/{loc}`
//! replying `{status, value}` (asserting `status == "OK"`), plus `/is_ready`
//! and `/get_climate`.

use serde_json::Value;

use crate::client::JsonClient;

/// An incubator, spoken to over HTTP.
pub trait IncuDevice: Send + Sync {
    fn put(&self, loc: &str) -> anyhow::Result<()>;
    fn get(&self, loc: &str) -> anyhow::Result<()>;
    fn is_ready(&self) -> anyhow::Result<bool>;
    fn get_climate(&self) -> anyhow::Result<Value>;
}

/// The real adapter.
pub struct HttpIncu<J> {
    client: J,
    base_url: String,
}

impl<J: JsonClient> HttpIncu<J> {
    pub fn new(client: J, base_url: impl Into<String>) -> HttpIncu<J> {
        HttpIncu {
            client,
            base_url: base_url.into(),
        }
    }

    fn require_ok(&self, res: Value) -> anyhow::Result<Value> {
        let status = res.get("status").and_then(|v| v.as_str()).unwrap_or("");
        if status != "OK" {
            anyhow::bail!("incubator status not OK: {res}");
        }
        Ok(res)
    }
}

impl<J: JsonClient> IncuDevice for HttpIncu<J> {
    fn put(&self, loc: &str) -> anyhow::Result<()> {
        let url = format!("{}/input_plate/{loc}", self.base_url);
        self.require_ok(self.client.get(&url)?)?;
        Ok(())
    }

    fn get(&self, loc: &str) -> anyhow::Result<()> {
        let url = format!("{}/output_plate/{loc}", self.base_url);
        self.require_ok(self.client.get(&url)?)?;
        Ok(())
    }

    fn is_ready(&self) -> anyhow::Result<bool> {
        let url = format!("{}/is_ready", self.base_url);
        let res = self.require_ok(self.client.get(&url)?)?;
        Ok(res.get("value").and_then(|v| v.as_bool()).unwrap_or(false))
    }

    fn get_climate(&self) -> anyhow::Result<Value> {
        let url = format!("{}/get_climate", self.base_url);
        let res = self.require_ok(self.client.get(&url)?)?;
        Ok(res.get("value").cloned().unwrap_or(Value::Null))
    }
}

/// An incubator stand-in for `noop`/dry-run configs: every call succeeds
/// immediately without touching the network.
pub struct NoopIncu;

impl IncuDevice for NoopIncu {
    fn put(&self, _loc: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn get(&self, _loc: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_ready(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn get_climate(&self) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedClient(Value);
    impl JsonClient for FixedClient {
        fn get(&self, _url: &str) -> anyhow::Result<Value> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn put_succeeds_on_status_ok() {
        let incu = HttpIncu::new(FixedClient(json!({"status": "OK", "value": ""})), "http://incu");
        assert!(incu.put("L1").is_ok());
    }

    #[test]
    fn put_fails_on_non_ok_status() {
        let incu = HttpIncu::new(FixedClient(json!({"status": "ERROR", "value": ""})), "http://incu");
        assert!(incu.put("L1").is_err());
    }

    #[test]
    fn is_ready_reads_the_boolean_value() {
        let incu = HttpIncu::new(FixedClient(json!({"status": "OK", "value": true})), "http://incu");
        assert!(incu.is_ready().unwrap());
    }

    #[test]
    fn noop_incu_is_always_ready() {
        assert!(NoopIncu.is_ready().unwrap());
    }
}
