use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use crate::db::schema_sqlite::{channel_mappings, thread_timestamps, user_mappings};

use super::{
    DatabaseError,
    models::{ChannelMapping, ThreadRecord, UserMapping},
};

// Helper function to convert DateTime to ISO string for SQLite
fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// Rows written by older bridge versions carry unix seconds instead of RFC 3339.
fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    s.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| DatabaseError::Query(format!("invalid datetime format: {s}")))
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = channel_mappings)]
struct DbChannelMapping {
    id: i32,
    slack_channel_id: String,
    irc_channel: String,
    created_at: String,
}

impl DbChannelMapping {
    fn to_channel_mapping(&self) -> Result<ChannelMapping, DatabaseError> {
        Ok(ChannelMapping {
            id: self.id as i64,
            slack_channel_id: self.slack_channel_id.clone(),
            irc_channel: self.irc_channel.clone(),
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = channel_mappings)]
struct NewChannelMapping<'a> {
    slack_channel_id: &'a str,
    irc_channel: &'a str,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = user_mappings)]
struct DbUserMapping {
    id: i32,
    slack_user_id: String,
    irc_nick: String,
    created_at: String,
}

impl DbUserMapping {
    fn to_user_mapping(&self) -> Result<UserMapping, DatabaseError> {
        Ok(UserMapping {
            id: self.id as i64,
            slack_user_id: self.slack_user_id.clone(),
            irc_nick: self.irc_nick.clone(),
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = user_mappings)]
struct NewUserMapping<'a> {
    slack_user_id: &'a str,
    irc_nick: &'a str,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = thread_timestamps)]
struct DbThreadRecord {
    thread_ts: String,
    thread_id: String,
    slack_channel_id: String,
    last_message_time: i64,
}

impl From<DbThreadRecord> for ThreadRecord {
    fn from(row: DbThreadRecord) -> Self {
        ThreadRecord {
            thread_ts: row.thread_ts,
            thread_id: row.thread_id,
            slack_channel_id: row.slack_channel_id,
            last_message_time: row.last_message_time,
        }
    }
}

pub(crate) fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn =
        SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))?;
    diesel::sql_query("PRAGMA busy_timeout = 5000")
        .execute(&mut conn)
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(conn)
}

async fn with_connection<T, F>(db_path: &Arc<String>, op: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    let db_path = db_path.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = establish_connection(&db_path)?;
        op(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct SqliteChannelStore {
    db_path: Arc<String>,
}

impl SqliteChannelStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::ChannelStore for SqliteChannelStore {
    async fn get_by_slack_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<ChannelMapping>, DatabaseError> {
        let channel_id = channel_id.to_string();
        with_connection(&self.db_path, move |conn| {
            use crate::db::schema_sqlite::channel_mappings::dsl::*;
            channel_mappings
                .filter(slack_channel_id.eq(channel_id))
                .select(DbChannelMapping::as_select())
                .first::<DbChannelMapping>(conn)
                .optional()?
                .map(|m| m.to_channel_mapping())
                .transpose()
        })
        .await
    }

    async fn get_by_irc_channel(
        &self,
        channel: &str,
    ) -> Result<Option<ChannelMapping>, DatabaseError> {
        let channel = channel.to_string();
        with_connection(&self.db_path, move |conn| {
            use crate::db::schema_sqlite::channel_mappings::dsl::*;
            channel_mappings
                .filter(irc_channel.eq(channel))
                .select(DbChannelMapping::as_select())
                .first::<DbChannelMapping>(conn)
                .optional()?
                .map(|m| m.to_channel_mapping())
                .transpose()
        })
        .await
    }

    async fn create(&self, slack_channel: &str, irc: &str) -> Result<(), DatabaseError> {
        let slack_channel = slack_channel.to_string();
        let irc = irc.to_string();
        with_connection(&self.db_path, move |conn| {
            conn.immediate_transaction::<_, DatabaseError, _>(|conn| {
                let now = datetime_to_string(&Utc::now());
                let updated = diesel::update(
                    channel_mappings::table
                        .filter(channel_mappings::slack_channel_id.eq(&slack_channel)),
                )
                .set((
                    channel_mappings::irc_channel.eq(&irc),
                    channel_mappings::created_at.eq(&now),
                ))
                .execute(conn)?;

                if updated == 0 {
                    diesel::insert_into(channel_mappings::table)
                        .values(&NewChannelMapping {
                            slack_channel_id: &slack_channel,
                            irc_channel: &irc,
                            created_at: now,
                        })
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn delete(&self, slack_channel: &str) -> Result<(), DatabaseError> {
        let slack_channel = slack_channel.to_string();
        with_connection(&self.db_path, move |conn| {
            diesel::delete(
                channel_mappings::table
                    .filter(channel_mappings::slack_channel_id.eq(slack_channel)),
            )
            .execute(conn)
            .map(|_| ())
            .map_err(DatabaseError::from)
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<ChannelMapping>, DatabaseError> {
        with_connection(&self.db_path, move |conn| {
            use crate::db::schema_sqlite::channel_mappings::dsl::*;
            let results = channel_mappings
                .order(id.asc())
                .select(DbChannelMapping::as_select())
                .load::<DbChannelMapping>(conn)?;
            results.iter().map(|m| m.to_channel_mapping()).collect()
        })
        .await
    }
}

pub struct SqliteUserStore {
    db_path: Arc<String>,
}

impl SqliteUserStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::UserStore for SqliteUserStore {
    async fn get_by_slack_user(&self, user_id: &str) -> Result<Option<UserMapping>, DatabaseError> {
        let user_id = user_id.to_string();
        with_connection(&self.db_path, move |conn| {
            use crate::db::schema_sqlite::user_mappings::dsl::*;
            user_mappings
                .filter(slack_user_id.eq(user_id))
                .select(DbUserMapping::as_select())
                .first::<DbUserMapping>(conn)
                .optional()?
                .map(|m| m.to_user_mapping())
                .transpose()
        })
        .await
    }

    async fn get_by_irc_nick(&self, nick: &str) -> Result<Option<UserMapping>, DatabaseError> {
        let nick = nick.to_string();
        with_connection(&self.db_path, move |conn| {
            use crate::db::schema_sqlite::user_mappings::dsl::*;
            user_mappings
                .filter(irc_nick.eq(nick))
                .select(DbUserMapping::as_select())
                .first::<DbUserMapping>(conn)
                .optional()?
                .map(|m| m.to_user_mapping())
                .transpose()
        })
        .await
    }

    async fn create(&self, slack_user: &str, nick: &str) -> Result<(), DatabaseError> {
        let slack_user = slack_user.to_string();
        let nick = nick.to_string();
        with_connection(&self.db_path, move |conn| {
            conn.immediate_transaction::<_, DatabaseError, _>(|conn| {
                let now = datetime_to_string(&Utc::now());
                let updated = diesel::update(
                    user_mappings::table.filter(user_mappings::slack_user_id.eq(&slack_user)),
                )
                .set((
                    user_mappings::irc_nick.eq(&nick),
                    user_mappings::created_at.eq(&now),
                ))
                .execute(conn)?;

                if updated == 0 {
                    diesel::insert_into(user_mappings::table)
                        .values(&NewUserMapping {
                            slack_user_id: &slack_user,
                            irc_nick: &nick,
                            created_at: now,
                        })
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn delete(&self, slack_user: &str) -> Result<(), DatabaseError> {
        let slack_user = slack_user.to_string();
        with_connection(&self.db_path, move |conn| {
            diesel::delete(user_mappings::table.filter(user_mappings::slack_user_id.eq(slack_user)))
                .execute(conn)
                .map(|_| ())
                .map_err(DatabaseError::from)
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<UserMapping>, DatabaseError> {
        with_connection(&self.db_path, move |conn| {
            use crate::db::schema_sqlite::user_mappings::dsl::*;
            let results = user_mappings
                .order(id.asc())
                .select(DbUserMapping::as_select())
                .load::<DbUserMapping>(conn)?;
            results.iter().map(|m| m.to_user_mapping()).collect()
        })
        .await
    }
}

pub struct SqliteThreadStore {
    db_path: Arc<String>,
}

impl SqliteThreadStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::ThreadStore for SqliteThreadStore {
    async fn get(&self, ts: &str) -> Result<Option<ThreadRecord>, DatabaseError> {
        let ts = ts.to_string();
        with_connection(&self.db_path, move |conn| {
            use crate::db::schema_sqlite::thread_timestamps::dsl::*;
            Ok(thread_timestamps
                .filter(thread_ts.eq(ts))
                .select(DbThreadRecord::as_select())
                .first::<DbThreadRecord>(conn)
                .optional()?
                .map(ThreadRecord::from))
        })
        .await
    }

    async fn get_by_thread_id(&self, short_id: &str) -> Result<Option<ThreadRecord>, DatabaseError> {
        let short_id = short_id.to_string();
        with_connection(&self.db_path, move |conn| {
            use crate::db::schema_sqlite::thread_timestamps::dsl::*;
            Ok(thread_timestamps
                .filter(thread_id.eq(short_id))
                .select(DbThreadRecord::as_select())
                .first::<DbThreadRecord>(conn)
                .optional()?
                .map(ThreadRecord::from))
        })
        .await
    }

    async fn upsert(&self, record: &ThreadRecord) -> Result<(), DatabaseError> {
        let row = DbThreadRecord {
            thread_ts: record.thread_ts.clone(),
            thread_id: record.thread_id.clone(),
            slack_channel_id: record.slack_channel_id.clone(),
            last_message_time: record.last_message_time,
        };
        with_connection(&self.db_path, move |conn| {
            diesel::replace_into(thread_timestamps::table)
                .values(&row)
                .execute(conn)
                .map(|_| ())
                .map_err(DatabaseError::from)
        })
        .await
    }

    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize, DatabaseError> {
        with_connection(&self.db_path, move |conn| {
            diesel::delete(
                thread_timestamps::table
                    .filter(thread_timestamps::last_message_time.lt(cutoff_ms)),
            )
            .execute(conn)
            .map_err(DatabaseError::from)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::string_to_datetime;

    #[test]
    fn string_to_datetime_accepts_rfc3339_and_unix_seconds() {
        let rfc = string_to_datetime("2024-05-01T10:00:00+00:00").expect("rfc3339");
        let unix = string_to_datetime("1714557600").expect("unix seconds");
        assert_eq!(rfc, unix);
    }

    #[test]
    fn string_to_datetime_rejects_garbage() {
        assert!(string_to_datetime("yesterday").is_err());
    }
}
