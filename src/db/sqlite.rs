use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use super::models::{DueTarget, MonitorTarget, NewServer, OwnerId, ReminderSubscription, TargetId};
use super::{MonitoringStore, ReminderStore, StoreError};

const DEFAULT_REMINDER_DAYS: i64 = 7;
const DEFAULT_REMINDER_TIME: &str = "10:00";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS servers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        hosting TEXT NOT NULL,
        ip TEXT,
        url TEXT,
        expiry_date DATE NOT NULL,
        price REAL NOT NULL,
        currency TEXT NOT NULL DEFAULT 'RUB',
        payment_period TEXT NOT NULL DEFAULT 'monthly',
        notes TEXT,
        tags TEXT,
        is_monitoring BOOLEAN DEFAULT 0,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        user_id INTEGER PRIMARY KEY,
        reminder_days INTEGER DEFAULT 7,
        reminder_time TEXT DEFAULT '10:00'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS hosting_credentials (
        user_id INTEGER NOT NULL,
        provider TEXT NOT NULL,
        api_key TEXT NOT NULL,
        PRIMARY KEY (user_id, provider)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_servers_user_id ON servers(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_servers_expiry ON servers(expiry_date)",
];

/// SQLite-backed record store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!(database_url, "Record store ready.");
        Ok(store)
    }

    /// A private in-memory database; everything lives on one connection.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn insert_server(&self, server: &NewServer) -> Result<TargetId, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO servers (user_id, name, hosting, ip, url, expiry_date,
                                 price, currency, payment_period, is_monitoring)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(server.owner_id)
        .bind(&server.name)
        .bind(&server.hosting)
        .bind(&server.ip)
        .bind(&server.url)
        .bind(server.expiry_date)
        .bind(server.price)
        .bind(&server.currency)
        .bind(&server.payment_period)
        .bind(server.is_monitoring)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn upsert_settings(
        &self,
        owner_id: OwnerId,
        reminder_days: i64,
        reminder_time: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO settings (user_id, reminder_days, reminder_time) VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                reminder_days = excluded.reminder_days,
                reminder_time = excluded.reminder_time
            "#,
        )
        .bind(owner_id)
        .bind(reminder_days)
        .bind(reminder_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stores an already encrypted, hex-encoded provider API key.
    pub async fn save_credential(
        &self,
        owner_id: OwnerId,
        provider: &str,
        encrypted_key: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO hosting_credentials (user_id, provider, api_key) VALUES (?, ?, ?)
            ON CONFLICT(user_id, provider) DO UPDATE SET api_key = excluded.api_key
            "#,
        )
        .bind(owner_id)
        .bind(provider)
        .bind(encrypted_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn credential(
        &self,
        owner_id: OwnerId,
        provider: &str,
    ) -> Result<Option<String>, StoreError> {
        let key = sqlx::query_scalar::<_, String>(
            "SELECT api_key FROM hosting_credentials WHERE user_id = ? AND provider = ?",
        )
        .bind(owner_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        Ok(key)
    }
}

#[async_trait]
impl MonitoringStore for SqliteStore {
    async fn list_monitorable_targets(&self) -> Result<Vec<MonitorTarget>, StoreError> {
        let targets = sqlx::query_as::<_, MonitorTarget>(
            r#"
            SELECT id, user_id AS owner_id, name, hosting, ip, url
            FROM servers
            WHERE is_monitoring = 1
              AND (TRIM(COALESCE(ip, '')) <> '' OR TRIM(COALESCE(url, '')) <> '')
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(targets)
    }
}

#[async_trait]
impl ReminderStore for SqliteStore {
    async fn list_subscriptions(&self) -> Result<Vec<ReminderSubscription>, StoreError> {
        let subscriptions = sqlx::query_as::<_, ReminderSubscription>(
            r#"
            SELECT DISTINCT s.user_id AS owner_id,
                   COALESCE(st.reminder_days, ?) AS horizon_days,
                   COALESCE(st.reminder_time, ?) AS notify_time
            FROM servers s
            LEFT JOIN settings st ON s.user_id = st.user_id
            ORDER BY s.user_id
            "#,
        )
        .bind(DEFAULT_REMINDER_DAYS)
        .bind(DEFAULT_REMINDER_TIME)
        .fetch_all(&self.pool)
        .await?;
        Ok(subscriptions)
    }

    async fn list_due_targets(
        &self,
        owner_id: OwnerId,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<DueTarget>, StoreError> {
        let due = sqlx::query_as::<_, DueTarget>(
            r#"
            SELECT name, hosting, expiry_date, price, currency
            FROM servers
            WHERE user_id = ? AND expiry_date >= ? AND expiry_date <= ?
            ORDER BY expiry_date, id
            "#,
        )
        .bind(owner_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn monitorable_targets_need_the_flag_and_an_address() {
        let store = SqliteStore::in_memory().await.unwrap();
        let expiry = day("2030-01-01");

        let mut with_ip = NewServer::new(1, "ip-box", expiry);
        with_ip.ip = Some("203.0.113.5".into());
        with_ip.is_monitoring = true;
        let ip_id = store.insert_server(&with_ip).await.unwrap();

        let mut with_url = NewServer::new(2, "site", expiry);
        with_url.url = Some("example.com".into());
        with_url.is_monitoring = true;
        let url_id = store.insert_server(&with_url).await.unwrap();

        let mut disabled = NewServer::new(1, "quiet", expiry);
        disabled.ip = Some("203.0.113.6".into());
        store.insert_server(&disabled).await.unwrap();

        let mut blank = NewServer::new(1, "blank", expiry);
        blank.ip = Some("  ".into());
        blank.is_monitoring = true;
        store.insert_server(&blank).await.unwrap();

        let targets = store.list_monitorable_targets().await.unwrap();
        let ids: Vec<_> = targets.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![ip_id, url_id]);
        assert_eq!(targets[0].owner_id, 1);
        assert_eq!(targets[0].ip(), Some("203.0.113.5"));
        assert_eq!(targets[1].url(), Some("example.com"));
        assert_eq!(targets[1].ip(), None);
    }

    #[tokio::test]
    async fn due_targets_respect_inclusive_horizon() {
        let store = SqliteStore::in_memory().await.unwrap();
        let today = day("2026-10-18");
        for (name, offset) in [("yesterday", -1), ("today", 0), ("edge", 7), ("beyond", 8)] {
            let server = NewServer::new(5, name, today + Duration::days(offset));
            store.insert_server(&server).await.unwrap();
        }
        store
            .insert_server(&NewServer::new(6, "other-owner", today))
            .await
            .unwrap();

        let due = store
            .list_due_targets(5, today, today + Duration::days(7))
            .await
            .unwrap();
        let names: Vec<_> = due.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["today", "edge"]);
        assert_eq!(due[1].expiry_date, day("2026-10-25"));
    }

    #[tokio::test]
    async fn subscriptions_default_when_no_settings_row() {
        let store = SqliteStore::in_memory().await.unwrap();
        let expiry = day("2030-01-01");
        store.insert_server(&NewServer::new(10, "a", expiry)).await.unwrap();
        store.insert_server(&NewServer::new(10, "b", expiry)).await.unwrap();
        store.insert_server(&NewServer::new(11, "c", expiry)).await.unwrap();
        store.upsert_settings(11, 3, "09:15").await.unwrap();
        store.upsert_settings(11, 14, "08:00").await.unwrap();

        let subs = store.list_subscriptions().await.unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!((subs[0].owner_id, subs[0].horizon_days), (10, 7));
        assert_eq!(subs[0].notify_time, "10:00");
        assert_eq!((subs[1].owner_id, subs[1].horizon_days), (11, 14));
        assert_eq!(subs[1].notify_time, "08:00");
    }

    #[tokio::test]
    async fn credentials_are_upserted_per_provider() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.credential(1, "4vps").await.unwrap(), None);
        store.save_credential(1, "4vps", "aa").await.unwrap();
        store.save_credential(1, "4vps", "bb").await.unwrap();
        assert_eq!(store.credential(1, "4vps").await.unwrap().as_deref(), Some("bb"));
        assert_eq!(store.credential(2, "4vps").await.unwrap(), None);
    }
}
