// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! DDL for the hub's persisted tables.
//!
//! Schema creation is the host's responsibility; these statements are
//! what the hub expects to find.

/// The two `CREATE TABLE` statements for a hub named `hub_name`.
pub fn schema_statements(hub_name: &str) -> [String; 2] {
    [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {hub_name}_messages (
                offset_msg BIGSERIAL PRIMARY KEY,
                topic TEXT NOT NULL,
                uuid TEXT NOT NULL,
                payload TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{{}}'
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {hub_name}_messages_offsets (
                consumer_group TEXT NOT NULL,
                topic TEXT NOT NULL,
                offset_acked BIGINT NOT NULL DEFAULT 0,
                offset_consumed BIGINT NOT NULL DEFAULT 0,
                PRIMARY KEY (consumer_group, topic)
            )
            "#
        ),
    ]
}
