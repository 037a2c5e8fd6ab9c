pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::models::{ChannelMapping, ThreadRecord, UserMapping};
pub use self::stores::{ChannelStore, ThreadStore, UserStore};

pub mod error;
pub mod manager;
pub mod models;
pub mod schema_sqlite;
pub mod sqlite;
pub mod stores;
