// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The washer/dispenser HTTP adapter, grounded on `Biotek.loop` in
//! `original_source/robots.py` and the response shapes documented in
//! `original_source/cellpainter/bioteks.py`: a GET to
//! `{biotek_url}/{wash|disp}/{action}/{protocol_path}` replying
//! `{success, lines}`, classified into success / known-transient (the
//! literal substring `"Error code: 6061"` somewhere in the joined response
//! lines) / fatal.

use cellpainter_repr::command::BiotekMode;

use crate::client::JsonClient;

/// The known-transient device error signature. Per spec §4.8/§9 this is the
/// *only* recognized transient signature; anything else is fatal.
const TRANSIENT_SIGNATURE: &str = "Error code: 6061";

/// How one washer/dispenser request came back.
#[derive(Debug, Clone, PartialEq)]
pub enum BiotekOutcome {
    Success,
    /// Matches the 6061 signature; the caller should retry without
    /// dequeuing a new request.
    Transient(String),
    /// An unrecognized failure; the caller should treat this as fatal and
    /// attach the full detail for postmortem.
    Fatal(String),
}

/// A washer or dispenser, spoken to over HTTP.
pub trait BiotekDevice: Send + Sync {
    /// Runs `protocol_path` (absent only for `TestCommunications`) in
    /// `mode` once, classifying the single response. Retrying on
    /// [`BiotekOutcome::Transient`] is the caller's responsibility (the
    /// device worker's loop), matching `Biotek.loop`'s `while True`.
    fn run(&self, mode: BiotekMode, protocol_path: Option<&str>) -> anyhow::Result<BiotekOutcome>;
}

/// The real adapter: `{base_url}/{machine}/{action}/{protocol_path}`.
pub struct HttpBiotek<J> {
    client: J,
    base_url: String,
    /// `"wash"` or `"disp"`.
    machine: &'static str,
}

impl<J: JsonClient> HttpBiotek<J> {
    pub fn new(client: J, base_url: impl Into<String>, machine: &'static str) -> HttpBiotek<J> {
        HttpBiotek {
            client,
            base_url: base_url.into(),
            machine,
        }
    }
}

impl<J: JsonClient> BiotekDevice for HttpBiotek<J> {
    fn run(&self, mode: BiotekMode, protocol_path: Option<&str>) -> anyhow::Result<BiotekOutcome> {
        let url = format!(
            "{}/{}/{}/{}",
            self.base_url,
            self.machine,
            mode.name(),
            protocol_path.unwrap_or("")
        );
        let url = url.trim_end_matches('/').to_string();
        let res = self.client.get(&url)?;
        Ok(classify(&res))
    }
}

fn classify(res: &serde_json::Value) -> BiotekOutcome {
    let success = res.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
    let lines: Vec<&str> = res
        .get("lines")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    let details = lines.join("\n");
    if success {
        BiotekOutcome::Success
    } else if details.contains(TRANSIENT_SIGNATURE) {
        BiotekOutcome::Transient(details)
    } else {
        BiotekOutcome::Fatal(details)
    }
}

/// The `test-all` config's `disp_and_wash_mode == 'execute short'` stand-in:
/// talks to the real device over HTTP, but substitutes
/// `BiotekMode::TestCommunications` for whatever mode/path was asked,
/// matching the short comms-check protocols `robots.py`'s test configs run
/// in place of a full multi-minute wash/disp protocol.
pub struct ShortBiotek<J>(HttpBiotek<J>);

impl<J: JsonClient> ShortBiotek<J> {
    pub fn new(client: J, base_url: impl Into<String>, machine: &'static str) -> ShortBiotek<J> {
        ShortBiotek(HttpBiotek::new(client, base_url, machine))
    }
}

impl<J: JsonClient> BiotekDevice for ShortBiotek<J> {
    fn run(&self, _mode: BiotekMode, _protocol_path: Option<&str>) -> anyhow::Result<BiotekOutcome> {
        self.0.run(BiotekMode::TestCommunications, None)
    }
}

/// A washer/dispenser stand-in for `noop`/dry-run configs: always succeeds
/// without touching the network, matching `disp_and_wash_mode == 'noop'` in
/// `original_source/cellpainter/bioteks.py`.
pub struct NoopBiotek;

impl BiotekDevice for NoopBiotek {
    fn run(&self, _mode: BiotekMode, _protocol_path: Option<&str>) -> anyhow::Result<BiotekOutcome> {
        Ok(BiotekOutcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedClient(serde_json::Value);
    impl JsonClient for FixedClient {
        fn get(&self, _url: &str) -> anyhow::Result<serde_json::Value> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn classifies_success() {
        let biotek = HttpBiotek::new(
            FixedClient(json!({"success": true, "lines": []})),
            "http://biotek",
            "wash",
        );
        assert_eq!(
            biotek.run(BiotekMode::Run, Some("a.LHC")).unwrap(),
            BiotekOutcome::Success
        );
    }

    #[test]
    fn classifies_the_6061_signature_as_transient() {
        let biotek = HttpBiotek::new(
            FixedClient(json!({
                "success": false,
                "lines": ["message ErrorCode: 24673, ErrorString: Error code: 6061", "Port is no longer available"]
            })),
            "http://biotek",
            "wash",
        );
        assert!(matches!(
            biotek.run(BiotekMode::Run, Some("a.LHC")).unwrap(),
            BiotekOutcome::Transient(_)
        ));
    }

    #[test]
    fn classifies_an_unrecognized_failure_as_fatal() {
        let biotek = HttpBiotek::new(
            FixedClient(json!({"success": false, "lines": ["error last validated protocol and argument does not match"]})),
            "http://biotek",
            "disp",
        );
        assert!(matches!(
            biotek.run(BiotekMode::Run, Some("a.LHC")).unwrap(),
            BiotekOutcome::Fatal(_)
        ));
    }

    #[test]
    fn noop_always_succeeds() {
        assert_eq!(
            NoopBiotek.run(BiotekMode::TestCommunications, None).unwrap(),
            BiotekOutcome::Success
        );
    }

    #[test]
    fn short_biotek_substitutes_test_communications_regardless_of_request() {
        struct RecordingClient(std::cell::RefCell<Option<String>>);
        impl JsonClient for RecordingClient {
            fn get(&self, url: &str) -> anyhow::Result<serde_json::Value> {
                *self.0.borrow_mut() = Some(url.to_string());
                Ok(json!({"success": true, "lines": []}))
            }
        }
        let client = RecordingClient(std::cell::RefCell::new(None));
        let biotek = ShortBiotek::new(client, "http://biotek", "wash");
        let outcome = biotek.run(BiotekMode::Run, Some("automation_v3.1/full.LHC")).unwrap();
        assert_eq!(outcome, BiotekOutcome::Success);
        assert_eq!(
            biotek.0.client.0.borrow().as_deref(),
            Some("http://biotek/wash/TestCommunications")
        );
    }
}
