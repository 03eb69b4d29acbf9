// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! Small helpers shared by the workspace's command-line entry points.
//!
//! Grounded on `original_source/protocol.py`'s `execute_program`, which
//! gates every hardware-touching run behind an `ATTENTION(prompt)` operator
//! confirmation before it starts.

use anyhow::Context;
use dialoguer::Confirm;

/// Prompts `prompt` with a default-to-no confirmation and returns whether
/// the operator confirmed. Callers decide what an unconfirmed prompt means
/// for them (most map it to a user-abort error).
pub fn confirm(prompt: impl Into<String>) -> anyhow::Result<bool> {
    Confirm::new()
        .with_prompt(prompt.into())
        .default(false)
        .interact()
        .context("reading operator confirmation")
}
