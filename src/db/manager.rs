use crate::config::DatabaseConfig;
use crate::db::sqlite::{
    SqliteChannelStore, SqliteThreadStore, SqliteUserStore, establish_connection,
};
use crate::db::{ChannelStore, DatabaseError, ThreadStore, UserStore};
use diesel::RunQueryDsl;
use diesel::sql_types::Text;
use diesel::sqlite::SqliteConnection;
use diesel::QueryableByName;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct DatabaseManager {
    sqlite_path: Arc<String>,
    channel_store: Arc<dyn ChannelStore>,
    user_store: Arc<dyn UserStore>,
    thread_store: Arc<dyn ThreadStore>,
}

#[derive(QueryableByName)]
struct TableSql {
    #[diesel(sql_type = Text)]
    sql: String,
}

/// A mapping table whose IRC column must be unique.
struct MappingTable {
    name: &'static str,
    source_column: &'static str,
    target_column: &'static str,
}

const MAPPING_TABLES: [MappingTable; 2] = [
    MappingTable {
        name: "channel_mappings",
        source_column: "slack_channel_id",
        target_column: "irc_channel",
    },
    MappingTable {
        name: "user_mappings",
        source_column: "slack_user_id",
        target_column: "irc_nick",
    },
];

impl MappingTable {
    fn create_statement(&self, table_name: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {table_name} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                {source} TEXT NOT NULL UNIQUE,
                {target} TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )",
            source = self.source_column,
            target = self.target_column,
        )
    }

    fn has_unique_target(&self, sql: &str) -> bool {
        let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        normalized.contains(&format!("{} TEXT NOT NULL UNIQUE", self.target_column))
    }
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        if config.filename.trim().is_empty() {
            return Err(DatabaseError::Connection(
                "database filename is empty".to_string(),
            ));
        }

        let path = Arc::new(config.filename.clone());
        Ok(Self {
            channel_store: Arc::new(SqliteChannelStore::new(path.clone())),
            user_store: Arc::new(SqliteUserStore::new(path.clone())),
            thread_store: Arc::new(SqliteThreadStore::new(path.clone())),
            sqlite_path: path,
        })
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        let path = self.sqlite_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&path)?;

            for table in &MAPPING_TABLES {
                Self::migrate_mapping_table(&mut conn, table)?;
            }

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS thread_timestamps (
                    thread_ts TEXT PRIMARY KEY,
                    thread_id TEXT NOT NULL UNIQUE,
                    slack_channel_id TEXT NOT NULL,
                    last_message_time BIGINT NOT NULL
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_thread_id ON thread_timestamps(thread_id)",
                "CREATE INDEX IF NOT EXISTS idx_thread_last_message ON thread_timestamps(last_message_time)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    fn migrate_mapping_table(
        conn: &mut SqliteConnection,
        table: &MappingTable,
    ) -> Result<(), DatabaseError> {
        let existing = diesel::sql_query(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind::<Text, _>(table.name)
        .get_results::<TableSql>(conn)
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        let Some(existing) = existing.into_iter().next() else {
            return diesel::sql_query(table.create_statement(table.name))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Migration(e.to_string()));
        };

        if table.has_unique_target(&existing.sql) {
            return Ok(());
        }

        conn.immediate_transaction::<_, DatabaseError, _>(|conn| {
            let removed = diesel::sql_query(format!(
                "DELETE FROM {name} WHERE id NOT IN (SELECT MAX(id) FROM {name} GROUP BY {target})",
                name = table.name,
                target = table.target_column,
            ))
            .execute(conn)
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            if removed > 0 {
                warn!(
                    "Dropped duplicate legacy mappings table={} removed={}",
                    table.name, removed
                );
            }

            let new_name = format!("{}_new", table.name);
            let statements = [
                table.create_statement(&new_name),
                format!(
                    "INSERT INTO {new_name} (id, {source}, {target}, created_at) \
                     SELECT id, {source}, {target}, COALESCE(created_at, strftime('%s', 'now')) FROM {name}",
                    source = table.source_column,
                    target = table.target_column,
                    name = table.name,
                ),
                format!("DROP TABLE {}", table.name),
                format!("ALTER TABLE {new_name} RENAME TO {}", table.name),
            ];
            for statement in statements {
                diesel::sql_query(statement)
                    .execute(conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }
            Ok(())
        })?;

        info!(
            "Migrated mapping table to unique IRC column table={} column={}",
            table.name, table.target_column
        );
        Ok(())
    }

    pub fn channel_store(&self) -> Arc<dyn ChannelStore> {
        self.channel_store.clone()
    }

    pub fn user_store(&self) -> Arc<dyn UserStore> {
        self.user_store.clone()
    }

    pub fn thread_store(&self) -> Arc<dyn ThreadStore> {
        self.thread_store.clone()
    }
}

#[cfg(test)]
mod tests {
    use diesel::RunQueryDsl;
    use tempfile::NamedTempFile;

    use super::DatabaseManager;
    use crate::config::DatabaseConfig;
    use crate::db::sqlite::establish_connection;
    use crate::db::{DatabaseError, ThreadRecord};

    async fn manager_for(file: &NamedTempFile) -> DatabaseManager {
        let config = DatabaseConfig {
            filename: file.path().to_string_lossy().to_string(),
        };
        let manager = DatabaseManager::new(&config).await.expect("db manager");
        manager.migrate().await.expect("migrate");
        manager
    }

    #[tokio::test]
    async fn channel_create_overwrites_previous_target() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = manager_for(&file).await;
        let channels = manager.channel_store();

        channels.create("C1", "#a").await.expect("create");
        channels.create("C1", "#b").await.expect("overwrite");

        let mapping = channels
            .get_by_slack_channel("C1")
            .await
            .expect("query")
            .expect("mapping exists");
        assert_eq!(mapping.irc_channel, "#b");
        assert!(channels.get_by_irc_channel("#a").await.expect("query").is_none());
        assert_eq!(channels.list_all().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn channel_create_rejects_claimed_irc_channel() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = manager_for(&file).await;
        let channels = manager.channel_store();

        channels.create("C1", "#a").await.expect("create");
        let err = channels.create("C2", "#a").await.expect_err("collision");
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));

        // Re-linking the same pair is not a collision.
        channels.create("C1", "#a").await.expect("same pair");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = manager_for(&file).await;
        let users = manager.user_store();

        users.create("U1", "alice").await.expect("create");
        users.delete("U1").await.expect("delete");
        users.delete("U1").await.expect("delete again");
        users.delete("U404").await.expect("delete missing");
        assert!(users.get_by_irc_nick("alice").await.expect("query").is_none());
    }

    #[tokio::test]
    async fn user_mappings_survive_reopen() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        {
            let manager = manager_for(&file).await;
            manager.user_store().create("U1", "alice").await.expect("create");
            manager.user_store().create("U2", "bob").await.expect("create");
        }

        let reopened = manager_for(&file).await;
        let all = reopened.user_store().list_all().await.expect("list");
        let nicks: Vec<_> = all.iter().map(|m| m.irc_nick.as_str()).collect();
        assert_eq!(nicks, vec!["alice", "bob"]);

        let by_nick = reopened
            .user_store()
            .get_by_irc_nick("bob")
            .await
            .expect("query")
            .expect("mapping exists");
        assert_eq!(by_nick.slack_user_id, "U2");
    }

    #[tokio::test]
    async fn thread_records_upsert_and_expire() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = manager_for(&file).await;
        let threads = manager.thread_store();

        let mut record = ThreadRecord {
            thread_ts: "1700000000.000100".to_string(),
            thread_id: "abcde".to_string(),
            slack_channel_id: "C1".to_string(),
            last_message_time: 1_000,
        };
        threads.upsert(&record).await.expect("insert");
        record.last_message_time = 5_000;
        threads.upsert(&record).await.expect("refresh");

        let stored = threads
            .get_by_thread_id("abcde")
            .await
            .expect("query")
            .expect("thread exists");
        assert_eq!(stored.last_message_time, 5_000);

        assert_eq!(threads.delete_older_than(5_000).await.expect("sweep"), 0);
        assert_eq!(threads.delete_older_than(5_001).await.expect("sweep"), 1);
        assert!(threads.get(&record.thread_ts).await.expect("query").is_none());
    }

    #[tokio::test]
    async fn legacy_tables_are_deduplicated_and_constrained() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let path = file.path().to_string_lossy().to_string();
        {
            let mut conn = establish_connection(&path).expect("connect");
            for statement in [
                "CREATE TABLE channel_mappings (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    slack_channel_id TEXT NOT NULL UNIQUE,
                    irc_channel TEXT NOT NULL,
                    created_at INTEGER DEFAULT (strftime('%s', 'now'))
                )",
                "INSERT INTO channel_mappings (slack_channel_id, irc_channel, created_at) VALUES ('C1', '#dup', 1700000000)",
                "INSERT INTO channel_mappings (slack_channel_id, irc_channel, created_at) VALUES ('C2', '#dup', 1700000100)",
                "INSERT INTO channel_mappings (slack_channel_id, irc_channel, created_at) VALUES ('C3', '#solo', 1700000200)",
            ] {
                diesel::sql_query(statement).execute(&mut conn).expect("seed legacy");
            }
        }

        let manager = manager_for(&file).await;
        let channels = manager.channel_store();

        let kept = channels
            .get_by_irc_channel("#dup")
            .await
            .expect("query")
            .expect("kept newest");
        assert_eq!(kept.slack_channel_id, "C2");
        assert!(channels.get_by_slack_channel("C1").await.expect("query").is_none());
        assert_eq!(channels.list_all().await.expect("list").len(), 2);

        let err = channels.create("C9", "#solo").await.expect_err("now strict");
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));

        // Running migrate again leaves the rebuilt table alone.
        manager.migrate().await.expect("second migrate");
        assert_eq!(channels.list_all().await.expect("list").len(), 2);
    }
}
