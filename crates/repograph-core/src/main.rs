// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Repograph - one crawl execution
//!
//! Runs a single execution and exits. Hosts (cron, serverless schedulers)
//! trigger it repeatedly; progress carries over through the database.

use std::process::ExitCode;

use anyhow::Result;
use tracing::{error, info};

use repograph_core::config::Config;
use repograph_core::orchestrator;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("repograph_core=info".parse()?),
        )
        .init();

    info!("Starting repograph execution");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        bootstrap = config.crawl.bootstrap,
        max_concurrency = config.crawl.max_concurrency,
        rate_floor = config.crawl.rate_floor,
        hydrate_commits = config.crawl.hydrate_commits,
        "Configuration loaded"
    );

    let outcome = orchestrator::execute(&config).await;

    Ok(ExitCode::from(outcome.exit_code() as u8))
}
