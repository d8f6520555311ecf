// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedded schema for both backends.
//!
//! Crawl tables: `repositories`, `commits`. Coordination tables:
//! `continuation_tasks`, `execution_leases`. [`crate::persistence::connect`]
//! applies these before handing out a backend, so an execution never runs
//! against a partial schema.

use sqlx::migrate::{MigrateError, Migrator};
use tracing::debug;

/// PostgreSQL migrator.
pub static POSTGRES: Migrator = sqlx::migrate!("./migrations/postgresql");

/// SQLite migrator.
pub static SQLITE: Migrator = sqlx::migrate!("./migrations/sqlite");

/// Tables every backend must provide.
pub const CRAWL_TABLES: [&str; 4] = [
    "repositories",
    "commits",
    "continuation_tasks",
    "execution_leases",
];

/// Bring a PostgreSQL database up to date.
pub async fn run_postgres(pool: &sqlx::PgPool) -> Result<(), MigrateError> {
    debug!(migrations = POSTGRES.iter().count(), "Applying PostgreSQL schema");
    POSTGRES.run(pool).await
}

/// Bring a SQLite database up to date.
pub async fn run_sqlite(pool: &sqlx::SqlitePool) -> Result<(), MigrateError> {
    debug!(migrations = SQLITE.iter().count(), "Applying SQLite schema");
    SQLITE.run(pool).await
}
