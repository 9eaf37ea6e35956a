//! Storage collaborators: merchant configuration and order records.
//!
//! Both are narrow traits so the vault, the authenticator and the gateway
//! never care which backend holds the data. Two backends ship here: an
//! in-memory one backed by DashMap (tests, ephemeral deployments) and a
//! SQLite one that survives restarts.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::{BridgeError, Result};
use crate::security::constant_time_eq;

/// Named merchant settings with get/set semantics.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace. Last writer wins.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// Lifecycle states an order can be moved into by this integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Pending,
    OnHold,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::OnHold => "on-hold",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a new payment may be started for an order in this state.
    pub fn needs_payment(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::OnHold | OrderStatus::Failed
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "on-hold" => Some(OrderStatus::OnHold),
            "processing" => Some(OrderStatus::Processing),
            "completed" => Some(OrderStatus::Completed),
            "failed" => Some(OrderStatus::Failed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// An order record as seen by the payment integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub status: OrderStatus,
    pub total: f64,
    pub currency: String,
    pub billing_first_name: String,
    pub billing_last_name: String,
    /// Buyer-facing secret proving ownership of the order. Assigned on
    /// insert when empty.
    #[serde(default)]
    pub order_key: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Order {
    pub fn new(id: u64, total: f64, currency: impl Into<String>) -> Self {
        Self {
            id,
            status: OrderStatus::Pending,
            total,
            currency: currency.into(),
            billing_first_name: String::new(),
            billing_last_name: String::new(),
            order_key: String::new(),
            meta: BTreeMap::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_billing_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.billing_first_name = first.into();
        self.billing_last_name = last.into();
        self
    }

    pub fn with_order_key(mut self, key: impl Into<String>) -> Self {
        self.order_key = key.into();
        self
    }

    /// Constant-time check of a buyer-supplied order key. An order without
    /// a key matches nothing.
    pub fn key_matches(&self, candidate: &str) -> bool {
        !self.order_key.is_empty()
            && constant_time_eq(self.order_key.as_bytes(), candidate.as_bytes())
    }
}

/// Fresh random order key, `order_` followed by 128 bits of URL-safe base64.
pub fn generate_order_key() -> Result<String> {
    let bytes = crypto::random_bytes(16)?;
    Ok(format!("order_{}", URL_SAFE_NO_PAD.encode(bytes)))
}

fn with_key(mut order: Order) -> Result<Order> {
    if order.order_key.is_empty() {
        order.order_key = generate_order_key()?;
    }
    Ok(order)
}

/// Order records addressed by numeric id, with metadata and a note log.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait OrderStore: Send + Sync {
    /// Insert or replace. An empty `order_key` is replaced by a fresh one.
    fn insert(&self, order: Order) -> Result<()>;

    fn order(&self, order_id: u64) -> Result<Option<Order>>;

    fn exists(&self, order_id: u64) -> Result<bool> {
        Ok(self.order(order_id)?.is_some())
    }

    fn get_meta(&self, order_id: u64, key: &str) -> Result<Option<String>>;

    /// Fails with [`BridgeError::NotFound`] when the order does not exist.
    fn set_meta(&self, order_id: u64, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key, or a key of a missing order, is not an error.
    fn delete_meta(&self, order_id: u64, key: &str) -> Result<()>;

    /// Move the order to `status` and append `note` to its log.
    fn update_status(&self, order_id: u64, status: OrderStatus, note: &str) -> Result<()>;

    fn add_note(&self, order_id: u64, note: &str) -> Result<()>;
}

fn order_not_found(order_id: u64) -> BridgeError {
    BridgeError::NotFound(format!("order {order_id} does not exist"))
}

/// In-memory config store backed by DashMap. Fast but lost on restart.
#[derive(Default)]
pub struct InMemoryConfigStore {
    values: DashMap<String, String>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// In-memory order store backed by DashMap.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<u64, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn insert(&self, order: Order) -> Result<()> {
        let order = with_key(order)?;
        self.orders.insert(order.id, order);
        Ok(())
    }

    fn order(&self, order_id: u64) -> Result<Option<Order>> {
        Ok(self.orders.get(&order_id).map(|o| o.value().clone()))
    }

    fn get_meta(&self, order_id: u64, key: &str) -> Result<Option<String>> {
        Ok(self
            .orders
            .get(&order_id)
            .and_then(|o| o.meta.get(key).cloned()))
    }

    fn set_meta(&self, order_id: u64, key: &str, value: &str) -> Result<()> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        order.meta.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete_meta(&self, order_id: u64, key: &str) -> Result<()> {
        if let Some(mut order) = self.orders.get_mut(&order_id) {
            order.meta.remove(key);
        }
        Ok(())
    }

    fn update_status(&self, order_id: u64, status: OrderStatus, note: &str) -> Result<()> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        order.status = status;
        if !note.is_empty() {
            order.notes.push(note.to_string());
        }
        Ok(())
    }

    fn add_note(&self, order_id: u64, note: &str) -> Result<()> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        order.notes.push(note.to_string());
        Ok(())
    }
}

#[cfg(feature = "full")]
pub use sqlite::SqliteStore;

#[cfg(feature = "full")]
mod sqlite {
    use std::collections::BTreeMap;
    use std::sync::{Mutex, MutexGuard};

    use rusqlite::OptionalExtension;

    use super::{order_not_found, with_key, ConfigStore, Order, OrderStatus, OrderStore};
    use crate::error::{BridgeError, Result};

    /// SQLite integers are signed; ids past `i64::MAX` cannot name a row.
    fn row_id(order_id: u64) -> Result<i64> {
        i64::try_from(order_id).map_err(|_| order_not_found(order_id))
    }

    /// Persistent store backed by SQLite, serving both the config and the
    /// order roles from one database file.
    pub struct SqliteStore {
        conn: Mutex<rusqlite::Connection>,
    }

    impl SqliteStore {
        /// Open (or create) a SQLite database at the given path.
        ///
        /// On Unix systems the file permissions are restricted to 0600, the
        /// database holds vault records and the master key.
        pub fn open(path: &str) -> Result<Self> {
            let conn = rusqlite::Connection::open(path)?;
            Self::init(&conn)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) =
                    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                {
                    tracing::warn!(
                        path = %path,
                        error = %e,
                        "failed to set store database file permissions to 0600"
                    );
                }
            }

            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        pub fn open_in_memory() -> Result<Self> {
            let conn = rusqlite::Connection::open_in_memory()?;
            Self::init(&conn)?;
            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        fn init(conn: &rusqlite::Connection) -> Result<()> {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS options (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS orders (
                    id INTEGER PRIMARY KEY,
                    status TEXT NOT NULL,
                    total REAL NOT NULL,
                    currency TEXT NOT NULL,
                    billing_first_name TEXT NOT NULL DEFAULT '',
                    billing_last_name TEXT NOT NULL DEFAULT '',
                    order_key TEXT NOT NULL DEFAULT ''
                );
                CREATE TABLE IF NOT EXISTS order_meta (
                    order_id INTEGER NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (order_id, key)
                );
                CREATE TABLE IF NOT EXISTS order_notes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    order_id INTEGER NOT NULL,
                    note TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_order_notes_order ON order_notes(order_id);",
            )?;
            Ok(())
        }

        fn conn(&self) -> MutexGuard<'_, rusqlite::Connection> {
            match self.conn.lock() {
                Ok(c) => c,
                Err(poisoned) => {
                    tracing::error!("store mutex poisoned, recovering");
                    poisoned.into_inner()
                }
            }
        }

        fn order_row_exists(conn: &rusqlite::Connection, order_id: u64) -> Result<bool> {
            let Ok(id) = row_id(order_id) else {
                return Ok(false);
            };
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM orders WHERE id = ?1", [id], |row| {
                    row.get(0)
                })?;
            Ok(count > 0)
        }
    }

    impl ConfigStore for SqliteStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            let conn = self.conn();
            let value = conn
                .query_row("SELECT value FROM options WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            let conn = self.conn();
            conn.execute(
                "INSERT INTO options (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )?;
            Ok(())
        }

        fn delete(&self, key: &str) -> Result<()> {
            let conn = self.conn();
            conn.execute("DELETE FROM options WHERE key = ?1", [key])?;
            Ok(())
        }
    }

    impl OrderStore for SqliteStore {
        fn insert(&self, order: Order) -> Result<()> {
            let id = row_id(order.id)?;
            let order = with_key(order)?;
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO orders
                    (id, status, total, currency, billing_first_name, billing_last_name, order_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id,
                    order.status.as_str(),
                    order.total,
                    order.currency,
                    order.billing_first_name,
                    order.billing_last_name,
                    order.order_key,
                ],
            )?;
            tx.execute("DELETE FROM order_meta WHERE order_id = ?1", [id])?;
            for (key, value) in &order.meta {
                tx.execute(
                    "INSERT INTO order_meta (order_id, key, value) VALUES (?1, ?2, ?3)",
                    rusqlite::params![id, key, value],
                )?;
            }
            tx.execute("DELETE FROM order_notes WHERE order_id = ?1", [id])?;
            for note in &order.notes {
                tx.execute(
                    "INSERT INTO order_notes (order_id, note) VALUES (?1, ?2)",
                    rusqlite::params![id, note],
                )?;
            }
            tx.commit()?;
            Ok(())
        }

        fn order(&self, order_id: u64) -> Result<Option<Order>> {
            let Ok(id) = row_id(order_id) else {
                return Ok(None);
            };
            let conn = self.conn();
            let row = conn
                .query_row(
                    "SELECT status, total, currency, billing_first_name, billing_last_name,
                            order_key
                     FROM orders WHERE id = ?1",
                    [id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, f64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                        ))
                    },
                )
                .optional()?;

            let Some((status, total, currency, first, last, order_key)) = row else {
                return Ok(None);
            };
            let status = OrderStatus::parse(&status).ok_or_else(|| {
                BridgeError::Store(format!("order {order_id} has unknown status {status}"))
            })?;

            let mut meta = BTreeMap::new();
            let mut stmt = conn.prepare("SELECT key, value FROM order_meta WHERE order_id = ?1")?;
            let rows = stmt.query_map([id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (key, value) = row?;
                meta.insert(key, value);
            }

            let mut stmt =
                conn.prepare("SELECT note FROM order_notes WHERE order_id = ?1 ORDER BY id")?;
            let notes = stmt
                .query_map([id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(Some(Order {
                id: order_id,
                status,
                total,
                currency,
                billing_first_name: first,
                billing_last_name: last,
                order_key,
                meta,
                notes,
            }))
        }

        fn exists(&self, order_id: u64) -> Result<bool> {
            let conn = self.conn();
            Self::order_row_exists(&conn, order_id)
        }

        fn get_meta(&self, order_id: u64, key: &str) -> Result<Option<String>> {
            let Ok(id) = row_id(order_id) else {
                return Ok(None);
            };
            let conn = self.conn();
            let value = conn
                .query_row(
                    "SELECT value FROM order_meta WHERE order_id = ?1 AND key = ?2",
                    rusqlite::params![id, key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        }

        fn set_meta(&self, order_id: u64, key: &str, value: &str) -> Result<()> {
            let id = row_id(order_id)?;
            let conn = self.conn();
            if !Self::order_row_exists(&conn, order_id)? {
                return Err(order_not_found(order_id));
            }
            conn.execute(
                "INSERT INTO order_meta (order_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(order_id, key) DO UPDATE SET value = excluded.value",
                rusqlite::params![id, key, value],
            )?;
            Ok(())
        }

        fn delete_meta(&self, order_id: u64, key: &str) -> Result<()> {
            let Ok(id) = row_id(order_id) else {
                return Ok(());
            };
            let conn = self.conn();
            conn.execute(
                "DELETE FROM order_meta WHERE order_id = ?1 AND key = ?2",
                rusqlite::params![id, key],
            )?;
            Ok(())
        }

        fn update_status(&self, order_id: u64, status: OrderStatus, note: &str) -> Result<()> {
            let id = row_id(order_id)?;
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE orders SET status = ?2 WHERE id = ?1",
                rusqlite::params![id, status.as_str()],
            )?;
            if changed == 0 {
                return Err(order_not_found(order_id));
            }
            if !note.is_empty() {
                tx.execute(
                    "INSERT INTO order_notes (order_id, note) VALUES (?1, ?2)",
                    rusqlite::params![id, note],
                )?;
            }
            tx.commit()?;
            Ok(())
        }

        fn add_note(&self, order_id: u64, note: &str) -> Result<()> {
            let id = row_id(order_id)?;
            let conn = self.conn();
            if !Self::order_row_exists(&conn, order_id)? {
                return Err(order_not_found(order_id));
            }
            conn.execute(
                "INSERT INTO order_notes (order_id, note) VALUES (?1, ?2)",
                rusqlite::params![id, note],
            )?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_config_basic() {
        let store = InMemoryConfigStore::new();
        assert_eq!(store.get("bridge_key").unwrap(), None);
        store.set("bridge_key", "abc").unwrap();
        assert_eq!(store.get("bridge_key").unwrap().as_deref(), Some("abc"));
        store.set("bridge_key", "def").unwrap();
        assert_eq!(store.get("bridge_key").unwrap().as_deref(), Some("def"));
        store.delete("bridge_key").unwrap();
        assert_eq!(store.get("bridge_key").unwrap(), None);
    }

    #[test]
    fn test_in_memory_meta_requires_order() {
        let store = InMemoryOrderStore::new();
        let err = store.set_meta(42, "k", "v").unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));

        store.insert(Order::new(42, 10.0, "EUR")).unwrap();
        store.set_meta(42, "k", "v").unwrap();
        assert_eq!(store.get_meta(42, "k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.get_meta(43, "k").unwrap(), None);
    }

    #[test]
    fn test_in_memory_status_appends_note() {
        let store = InMemoryOrderStore::new();
        store.insert(Order::new(7, 1.5, "EUR")).unwrap();
        store
            .update_status(7, OrderStatus::OnHold, "payment initiated")
            .unwrap();
        store.add_note(7, "webhook received").unwrap();

        let order = store.order(7).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::OnHold);
        assert_eq!(order.notes, vec!["payment initiated", "webhook received"]);
    }

    #[test]
    fn test_insert_assigns_order_key() {
        let store = InMemoryOrderStore::new();
        store.insert(Order::new(1, 5.0, "EUR")).unwrap();
        store.insert(Order::new(2, 5.0, "EUR")).unwrap();
        store
            .insert(Order::new(3, 5.0, "EUR").with_order_key("order_fixed"))
            .unwrap();

        let first = store.order(1).unwrap().unwrap();
        let second = store.order(2).unwrap().unwrap();
        assert!(first.order_key.starts_with("order_"));
        assert_ne!(first.order_key, second.order_key);
        assert_eq!(store.order(3).unwrap().unwrap().order_key, "order_fixed");

        assert!(first.key_matches(&first.order_key));
        assert!(!first.key_matches(&second.order_key));
        assert!(!first.key_matches(""));
        assert!(!Order::new(4, 1.0, "EUR").key_matches(""));
    }

    #[test]
    fn test_in_memory_delete_meta() {
        let store = InMemoryOrderStore::new();
        store.delete_meta(9, "k").unwrap();
        store.insert(Order::new(9, 1.0, "EUR")).unwrap();
        store.set_meta(9, "k", "v").unwrap();
        store.delete_meta(9, "k").unwrap();
        store.delete_meta(9, "k").unwrap();
        assert_eq!(store.get_meta(9, "k").unwrap(), None);
    }

    #[test]
    fn test_status_strings_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::OnHold,
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("refunded"), None);
    }

    #[cfg(feature = "full")]
    mod sqlite_tests {
        use super::super::*;

        #[test]
        fn test_sqlite_config_persists() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("test.db");

            {
                let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
                store.set("bridge_key", "abc").unwrap();
            }

            {
                let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
                assert_eq!(
                    ConfigStore::get(&store, "bridge_key").unwrap().as_deref(),
                    Some("abc")
                );
            }
        }

        #[test]
        fn test_sqlite_upsert_and_delete() {
            let store = SqliteStore::open_in_memory().unwrap();
            store.set("k", "1").unwrap();
            store.set("k", "2").unwrap();
            assert_eq!(ConfigStore::get(&store, "k").unwrap().as_deref(), Some("2"));
            store.delete("k").unwrap();
            assert_eq!(ConfigStore::get(&store, "k").unwrap(), None);
        }

        #[test]
        fn test_sqlite_order_roundtrip() {
            let store = SqliteStore::open_in_memory().unwrap();
            let mut order = Order::new(42, 99.9, "EUR").with_billing_name("Ada", "Lovelace");
            order.meta.insert("a".into(), "b".into());
            store.insert(order).unwrap();

            store.set_meta(42, "c", "d").unwrap();
            store
                .update_status(42, OrderStatus::Processing, "paid")
                .unwrap();
            store.add_note(42, "done").unwrap();

            let loaded = store.order(42).unwrap().unwrap();
            assert_eq!(loaded.status, OrderStatus::Processing);
            assert_eq!(loaded.billing_last_name, "Lovelace");
            assert_eq!(loaded.meta.get("a").map(String::as_str), Some("b"));
            assert_eq!(loaded.meta.get("c").map(String::as_str), Some("d"));
            assert_eq!(loaded.notes, vec!["paid", "done"]);
            assert!(loaded.order_key.starts_with("order_"));

            store.delete_meta(42, "c").unwrap();
            assert_eq!(store.get_meta(42, "c").unwrap(), None);
        }

        #[test]
        fn test_sqlite_ids_beyond_i64_are_not_found() {
            let store = SqliteStore::open_in_memory().unwrap();
            let huge = u64::MAX;
            store.insert(Order::new(1, 1.0, "EUR")).unwrap();

            assert!(matches!(
                store.insert(Order::new(huge, 1.0, "EUR")),
                Err(BridgeError::NotFound(_))
            ));
            assert!(!store.exists(huge).unwrap());
            assert!(store.order(huge).unwrap().is_none());
            assert_eq!(store.get_meta(huge, "k").unwrap(), None);
            assert!(matches!(
                store.set_meta(huge, "k", "v"),
                Err(BridgeError::NotFound(_))
            ));
            assert!(matches!(
                store.update_status(huge, OrderStatus::Failed, "x"),
                Err(BridgeError::NotFound(_))
            ));
            assert!(matches!(
                store.add_note(huge, "x"),
                Err(BridgeError::NotFound(_))
            ));
            store.delete_meta(huge, "k").unwrap();

            // u64::MAX wraps to -1 under `as`; the real row 1 must stay untouched.
            assert!(store.order(1).unwrap().unwrap().notes.is_empty());
        }

        #[test]
        fn test_sqlite_missing_order() {
            let store = SqliteStore::open_in_memory().unwrap();
            assert!(!store.exists(1).unwrap());
            assert!(store.order(1).unwrap().is_none());
            assert!(matches!(
                store.set_meta(1, "k", "v"),
                Err(BridgeError::NotFound(_))
            ));
            assert!(matches!(
                store.update_status(1, OrderStatus::Failed, ""),
                Err(BridgeError::NotFound(_))
            ));
        }
    }
}
