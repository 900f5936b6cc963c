// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Dependencies that flood `debug`/`trace` with transport chatter.
const NOISY_MODULES: &[&str] = &[
    "h2",
    "hyper",
    "hyper_util",
    "reqwest",
    "tokio_tungstenite",
    "alloy_transport_http",
    "alloy_transport_ws",
    "alloy_pubsub",
    "sqlx",
];

/// A bare level gets the noisy-module caps; explicit directive strings pass through.
pub fn filter_spec(log_level: &str) -> String {
    let normalized = log_level.trim();
    if normalized.contains(',') || normalized.contains('=') {
        return normalized.to_string();
    }
    let base = if normalized.is_empty() { "info" } else { normalized };
    let mut spec = base.to_string();
    for module in NOISY_MODULES {
        spec.push_str(&format!(",{module}=warn"));
    }
    spec
}

pub fn setup_logging(log_level: &str, json_format: bool) {
    let spec = filter_spec(log_level);
    let filter = EnvFilter::from_str(&spec).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = if json_format {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false);
        subscriber.with(json_layer).try_init()
    } else {
        let fmt_layer = fmt::layer().with_target(true).compact();
        subscriber.with(fmt_layer).try_init()
    };

    if installed.is_err() {
        // Tests and embedders may have installed one already.
        return;
    }
    tracing::info!(
        target: "sentinel",
        filter = %spec,
        format = if json_format { "json" } else { "compact" },
        "Logging initialized"
    );
}
