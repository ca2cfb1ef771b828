//! Persistence layer for the order relay.
//!
//! The rest of the crate talks to the [`Store`] trait; the shipped
//! implementation is SQLite via rusqlite in WAL mode behind a single
//! `Mutex<Connection>`. One process owns one store instance, and every
//! mutation is serialised by that lock — good enough for the expected load.
//! Order line items are persisted as a JSON column so historical orders keep
//! their creation-time product snapshot verbatim.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::{info, warn};

use crate::catalog::{Branch, Category, Product, User};
use crate::error::StoreError;
use crate::orders::{Order, OrderFilter, OrderItem, OrderStatus};

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Database file name under the configured data directory.
const DB_FILE: &str = "order-relay.db";

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Abstract persistence seam. Catalog entities get point lookups plus plain
/// list/upsert/delete; orders additionally get the append, status-update and
/// filtered-listing operations the dispatch engine needs.
pub trait Store: Send + Sync {
    fn branch(&self, id: i64) -> Result<Option<Branch>, StoreError>;
    fn category(&self, id: i64) -> Result<Option<Category>, StoreError>;
    fn product(&self, id: i64) -> Result<Option<Product>, StoreError>;
    fn user(&self, id: i64) -> Result<Option<User>, StoreError>;

    fn list_branches(&self) -> Result<Vec<Branch>, StoreError>;
    fn list_categories(&self) -> Result<Vec<Category>, StoreError>;
    fn list_products(&self) -> Result<Vec<Product>, StoreError>;
    fn list_users(&self) -> Result<Vec<User>, StoreError>;

    fn upsert_branch(&self, branch: &Branch) -> Result<(), StoreError>;
    fn upsert_category(&self, category: &Category) -> Result<(), StoreError>;
    fn upsert_product(&self, product: &Product) -> Result<(), StoreError>;
    fn upsert_user(&self, user: &User) -> Result<(), StoreError>;

    fn delete_branch(&self, id: i64) -> Result<bool, StoreError>;
    fn delete_category(&self, id: i64) -> Result<bool, StoreError>;
    fn delete_product(&self, id: i64) -> Result<bool, StoreError>;
    fn delete_user(&self, id: i64) -> Result<bool, StoreError>;

    /// Append a new order. The store owns the internal sequence number and
    /// returns the id it assigned.
    fn insert_order(&self, order: &Order) -> Result<i64, StoreError>;
    fn order(&self, id: i64) -> Result<Option<Order>, StoreError>;
    /// Every persisted order, oldest first. Used at startup to rebuild the
    /// daily code counters.
    fn list_orders(&self) -> Result<Vec<Order>, StoreError>;
    /// Orders matching the filter, newest first.
    fn list_orders_filtered(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;
    fn orders_by_user(&self, user_id: i64) -> Result<Vec<Order>, StoreError>;
    fn update_order_status(
        &self,
        id: i64,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Mutex<Connection>,
    pub db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database at `{data_dir}/order-relay.db`.
    ///
    /// Creates the directory if needed, opens the connection, sets pragmas,
    /// and runs any pending migrations. On corruption or open failure,
    /// deletes the file and retries once.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir).map_err(|e| {
            StoreError::Corrupt(format!("create data dir {}: {e}", data_dir.display()))
        })?;

        let db_path = data_dir.join(DB_FILE);
        info!("Opening database at {}", db_path.display());

        let conn = match open_and_configure(&db_path) {
            Ok(c) => c,
            Err(first_err) => {
                warn!(
                    "Database open failed ({}), deleting and retrying once",
                    first_err
                );
                if db_path.exists() {
                    let _ = fs::remove_file(&db_path);
                    // Also remove WAL/SHM files if present
                    let _ = fs::remove_file(db_path.with_extension("db-wal"));
                    let _ = fs::remove_file(db_path.with_extension("db-shm"));
                }
                open_and_configure(&db_path)?
            }
        };

        run_migrations(&conn)?;
        info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        })
    }

    /// In-memory store for tests and ephemeral setups.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn open_and_configure(db_path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(conn)
}

fn schema_version(conn: &Connection) -> Result<i32, rusqlite::Error> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let version = schema_version(conn)?;

    if version < 1 {
        conn.execute_batch(
            "BEGIN;
             CREATE TABLE IF NOT EXISTS branches (
                 id        INTEGER PRIMARY KEY,
                 name      TEXT NOT NULL,
                 location  TEXT NOT NULL DEFAULT ''
             );
             CREATE TABLE IF NOT EXISTS categories (
                 id        INTEGER PRIMARY KEY,
                 name      TEXT NOT NULL,
                 printer   INTEGER NOT NULL,
                 image_url TEXT NOT NULL DEFAULT ''
             );
             CREATE TABLE IF NOT EXISTS products (
                 id          INTEGER PRIMARY KEY,
                 name        TEXT NOT NULL,
                 category_id INTEGER NOT NULL,
                 unit_type   TEXT NOT NULL DEFAULT 'piece',
                 image_url   TEXT NOT NULL DEFAULT '',
                 branch_ids  TEXT NOT NULL DEFAULT '[]'
             );
             CREATE TABLE IF NOT EXISTS users (
                 id        INTEGER PRIMARY KEY,
                 name      TEXT NOT NULL,
                 phone     TEXT NOT NULL DEFAULT '',
                 is_admin  INTEGER NOT NULL DEFAULT 0,
                 branch_id INTEGER
             );
             CREATE TABLE IF NOT EXISTS orders (
                 id          INTEGER PRIMARY KEY AUTOINCREMENT,
                 code        TEXT NOT NULL,
                 user_id     INTEGER NOT NULL,
                 user_name   TEXT NOT NULL,
                 branch_id   INTEGER NOT NULL,
                 branch_name TEXT NOT NULL,
                 items_json  TEXT NOT NULL,
                 total       REAL NOT NULL DEFAULT 0,
                 status      TEXT NOT NULL,
                 created_at  TEXT NOT NULL,
                 updated_at  TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_orders_branch  ON orders(branch_id);
             CREATE INDEX IF NOT EXISTS idx_orders_status  ON orders(status);
             CREATE INDEX IF NOT EXISTS idx_orders_created ON orders(created_at);
             PRAGMA user_version = 1;
             COMMIT;",
        )?;
    }

    if version < 2 {
        // v2: per-product pricing (legacy rows keep a zero price)
        conn.execute_batch(
            "BEGIN;
             ALTER TABLE products ADD COLUMN price REAL NOT NULL DEFAULT 0;
             PRAGMA user_version = 2;
             COMMIT;",
        )?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn branch_from_row(row: &Row<'_>) -> rusqlite::Result<Branch> {
    Ok(Branch {
        id: row.get(0)?,
        name: row.get(1)?,
        location: row.get(2)?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        printer: row.get(2)?,
        image_url: row.get(3)?,
    })
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<(Product, String)> {
    let branch_ids_json: String = row.get(5)?;
    Ok((
        Product {
            id: row.get(0)?,
            name: row.get(1)?,
            category_id: row.get(2)?,
            unit_type: row.get(3)?,
            image_url: row.get(4)?,
            branch_ids: Vec::new(),
            price: row.get(6)?,
        },
        branch_ids_json,
    ))
}

fn finish_product((mut product, branch_ids_json): (Product, String)) -> Result<Product, StoreError> {
    product.branch_ids = serde_json::from_str(&branch_ids_json).map_err(|e| {
        StoreError::Corrupt(format!("product {} branch_ids: {e}", product.id))
    })?;
    Ok(product)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        is_admin: row.get(3)?,
        branch_id: row.get(4)?,
    })
}

struct OrderRow {
    order: Order,
    items_json: String,
    status: String,
    created_at: String,
    updated_at: String,
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok(OrderRow {
        order: Order {
            id: row.get(0)?,
            code: row.get(1)?,
            user_id: row.get(2)?,
            user_name: row.get(3)?,
            branch_id: row.get(4)?,
            branch_name: row.get(5)?,
            items: Vec::new(),
            total: row.get(7)?,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        items_json: row.get(6)?,
        status: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn finish_order(raw: OrderRow) -> Result<Order, StoreError> {
    let mut order = raw.order;
    let items: Vec<OrderItem> = serde_json::from_str(&raw.items_json)
        .map_err(|e| StoreError::Corrupt(format!("order {} items: {e}", order.id)))?;
    order.items = items;
    order.status = raw
        .status
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("order {} status: {e}", order.id)))?;
    order.created_at = parse_timestamp(&raw.created_at, order.id, "created_at")?;
    order.updated_at = parse_timestamp(&raw.updated_at, order.id, "updated_at")?;
    Ok(order)
}

fn parse_timestamp(raw: &str, id: i64, field: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("order {id} {field}: {e}")))
}

const ORDER_COLUMNS: &str = "id, code, user_id, user_name, branch_id, branch_name, \
                             items_json, total, status, created_at, updated_at";

// ---------------------------------------------------------------------------
// Trait implementation
// ---------------------------------------------------------------------------

impl Store for SqliteStore {
    fn branch(&self, id: i64) -> Result<Option<Branch>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, location FROM branches WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], branch_from_row)?;
        rows.next().transpose().map_err(StoreError::from)
    }

    fn category(&self, id: i64) -> Result<Option<Category>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, printer, image_url FROM categories WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], category_from_row)?;
        rows.next().transpose().map_err(StoreError::from)
    }

    fn product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, category_id, unit_type, image_url, branch_ids, price
             FROM products WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], product_from_row)?;
        match rows.next().transpose()? {
            Some(raw) => finish_product(raw).map(Some),
            None => Ok(None),
        }
    }

    fn user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, phone, is_admin, branch_id FROM users WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], user_from_row)?;
        rows.next().transpose().map_err(StoreError::from)
    }

    fn list_branches(&self) -> Result<Vec<Branch>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, location FROM branches ORDER BY id")?;
        let rows = stmt.query_map([], branch_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, printer, image_url FROM categories ORDER BY id")?;
        let rows = stmt.query_map([], category_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, category_id, unit_type, image_url, branch_ids, price
             FROM products ORDER BY id",
        )?;
        let rows = stmt.query_map([], product_from_row)?;
        rows.map(|raw| finish_product(raw?)).collect()
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, phone, is_admin, branch_id FROM users ORDER BY id")?;
        let rows = stmt.query_map([], user_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    fn upsert_branch(&self, branch: &Branch) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO branches (id, name, location) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, location = excluded.location",
            params![branch.id, branch.name, branch.location],
        )?;
        Ok(())
    }

    fn upsert_category(&self, category: &Category) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO categories (id, name, printer, image_url) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, printer = excluded.printer,
                                           image_url = excluded.image_url",
            params![category.id, category.name, category.printer, category.image_url],
        )?;
        Ok(())
    }

    fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        let branch_ids = serde_json::to_string(&product.branch_ids)
            .map_err(|e| StoreError::Corrupt(format!("product {} branch_ids: {e}", product.id)))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO products (id, name, category_id, unit_type, image_url, branch_ids, price)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name,
                                           category_id = excluded.category_id,
                                           unit_type = excluded.unit_type,
                                           image_url = excluded.image_url,
                                           branch_ids = excluded.branch_ids,
                                           price = excluded.price",
            params![
                product.id,
                product.name,
                product.category_id,
                product.unit_type,
                product.image_url,
                branch_ids,
                product.price
            ],
        )?;
        Ok(())
    }

    fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, name, phone, is_admin, branch_id) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, phone = excluded.phone,
                                           is_admin = excluded.is_admin,
                                           branch_id = excluded.branch_id",
            params![user.id, user.name, user.phone, user.is_admin, user.branch_id],
        )?;
        Ok(())
    }

    fn delete_branch(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM branches WHERE id = ?1", params![id])? > 0)
    }

    fn delete_category(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM categories WHERE id = ?1", params![id])? > 0)
    }

    fn delete_product(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM products WHERE id = ?1", params![id])? > 0)
    }

    fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM users WHERE id = ?1", params![id])? > 0)
    }

    fn insert_order(&self, order: &Order) -> Result<i64, StoreError> {
        let items_json = serde_json::to_string(&order.items)
            .map_err(|e| StoreError::Corrupt(format!("order items: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO orders (code, user_id, user_name, branch_id, branch_name,
                                 items_json, total, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                order.code,
                order.user_id,
                order.user_name,
                order.branch_id,
                order.branch_name,
                items_json,
                order.total,
                order.status.as_str(),
                order.created_at.to_rfc3339(),
                order.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], order_from_row)?;
        match rows.next().transpose()? {
            Some(raw) => finish_order(raw).map(Some),
            None => Ok(None),
        }
    }

    fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id"))?;
        let rows = stmt.query_map([], order_from_row)?;
        rows.map(|raw| finish_order(raw?)).collect()
    }

    fn list_orders_filtered(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], order_from_row)?;
        let orders: Vec<Order> = rows
            .map(|raw| finish_order(raw?))
            .collect::<Result<_, _>>()?;
        Ok(orders
            .into_iter()
            .filter(|o| filter.matches(o))
            .collect())
    }

    fn orders_by_user(&self, user_id: i64) -> Result<Vec<Order>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], order_from_row)?;
        rows.map(|raw| finish_order(raw?)).collect()
    }

    fn update_order_status(
        &self,
        id: i64,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), updated_at.to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("order", id));
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderItem;
    use chrono::TimeZone;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("open in-memory store")
    }

    fn sample_order(code: &str, user_id: i64, branch_id: i64) -> Order {
        Order {
            id: 0,
            code: code.into(),
            user_id,
            user_name: "Dilshod".into(),
            branch_id,
            branch_name: "Chilonzor".into(),
            items: vec![OrderItem {
                product_id: 1,
                name: "Somsa".into(),
                quantity: 2.0,
                unit_type: "piece".into(),
                subtotal: 24_000.0,
            }],
            total: 24_000.0,
            status: OrderStatus::Pending,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn migrations_create_all_tables() {
        let store = test_store();
        let conn = store.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect();

        for table in ["branches", "categories", "products", "users", "orders"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
        assert_eq!(schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn catalog_upsert_get_round_trip() {
        let store = test_store();

        let branch = Branch {
            id: 1,
            name: "Chilonzor".into(),
            location: "Tashkent".into(),
        };
        store.upsert_branch(&branch).expect("upsert branch");
        assert_eq!(store.branch(1).expect("get branch"), Some(branch.clone()));
        assert_eq!(store.branch(99).expect("get missing"), None);

        let category = Category {
            id: 2,
            name: "Hot dishes".into(),
            printer: 1,
            image_url: String::new(),
        };
        store.upsert_category(&category).expect("upsert category");
        assert_eq!(store.category(2).expect("get category"), Some(category));

        let product = Product {
            id: 3,
            name: "Somsa".into(),
            category_id: 2,
            unit_type: "piece".into(),
            image_url: String::new(),
            price: 12_000.0,
            branch_ids: vec![1, 4],
        };
        store.upsert_product(&product).expect("upsert product");
        assert_eq!(store.product(3).expect("get product"), Some(product.clone()));

        // Upsert overwrites in place
        let renamed = Product {
            name: "Somsa (beef)".into(),
            ..product
        };
        store.upsert_product(&renamed).expect("re-upsert product");
        assert_eq!(store.product(3).expect("get product"), Some(renamed));
        assert_eq!(store.list_products().expect("list products").len(), 1);

        let user = User {
            id: 4,
            name: "Dilshod".into(),
            phone: "+998900000000".into(),
            is_admin: false,
            branch_id: Some(1),
        };
        store.upsert_user(&user).expect("upsert user");
        assert_eq!(store.user(4).expect("get user"), Some(user));

        assert!(store.delete_branch(1).expect("delete branch"));
        assert!(!store.delete_branch(1).expect("delete again"));
    }

    #[test]
    fn insert_order_assigns_monotonic_ids() {
        let store = test_store();
        let first = store
            .insert_order(&sample_order("25-06-01-1", 1, 1))
            .expect("insert first");
        let second = store
            .insert_order(&sample_order("25-06-01-2", 1, 1))
            .expect("insert second");
        assert!(second > first);

        let codes: Vec<String> = store
            .list_orders()
            .expect("list orders")
            .into_iter()
            .map(|o| o.code)
            .collect();
        assert_eq!(codes, vec!["25-06-01-1", "25-06-01-2"]);
    }

    #[test]
    fn order_read_is_idempotent() {
        let store = test_store();
        let id = store
            .insert_order(&sample_order("25-06-01-1", 1, 1))
            .expect("insert");
        let first = store.order(id).expect("read once").expect("present");
        let second = store.order(id).expect("read twice").expect("present");
        assert_eq!(first, second);
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.items[0].subtotal, 24_000.0);
    }

    #[test]
    fn update_order_status_persists_and_touches_updated_at() {
        let store = test_store();
        let id = store
            .insert_order(&sample_order("25-06-01-1", 1, 1))
            .expect("insert");

        let later = Utc.with_ymd_and_hms(2025, 6, 1, 9, 5, 0).unwrap();
        store
            .update_order_status(id, OrderStatus::SentToPrinter, later)
            .expect("update status");

        let order = store.order(id).expect("read").expect("present");
        assert_eq!(order.status, OrderStatus::SentToPrinter);
        assert_eq!(order.updated_at, later);

        let missing = store.update_order_status(999, OrderStatus::PrintError, later);
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn filtered_listing_is_newest_first_and_filterable() {
        let store = test_store();
        let mut early = sample_order("25-06-01-1", 1, 1);
        early.created_at = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let mut late = sample_order("25-06-01-2", 2, 2);
        late.created_at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        late.status = OrderStatus::PrintError;
        let mut other_day = sample_order("25-06-02-1", 1, 1);
        other_day.created_at = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();

        store.insert_order(&early).expect("insert early");
        store.insert_order(&late).expect("insert late");
        store.insert_order(&other_day).expect("insert other day");

        let all = store
            .list_orders_filtered(&OrderFilter::default())
            .expect("list all");
        let codes: Vec<&str> = all.iter().map(|o| o.code.as_str()).collect();
        assert_eq!(codes, vec!["25-06-02-1", "25-06-01-2", "25-06-01-1"]);

        let branch_one = store
            .list_orders_filtered(&OrderFilter {
                branch_id: Some(1),
                ..OrderFilter::default()
            })
            .expect("filter branch");
        assert_eq!(branch_one.len(), 2);

        let failed = store
            .list_orders_filtered(&OrderFilter {
                status: Some(OrderStatus::PrintError),
                ..OrderFilter::default()
            })
            .expect("filter status");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].code, "25-06-01-2");

        let mine = store.orders_by_user(1).expect("orders by user");
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].code, "25-06-02-1");
    }
}
