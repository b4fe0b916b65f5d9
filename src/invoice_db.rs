use crate::heuristics::{Invoice, InvoiceItem, InvoiceSummary};
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use std::path::Path;
use tracing::info;

const SCHEMA_VERSION: i64 = 1;
const ITEM_ID_MAX_CHARS: usize = 80;

pub struct InvoiceStore {
    conn: Connection,
}

impl InvoiceStore {
    /// Open (or create) the invoice store with SQLite backend
    pub fn open<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqliteResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        let version: i64 = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        if version < 1 {
            Self::migrate_v1(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )?;
            info!(from = version, to = SCHEMA_VERSION, "Migrated invoice schema");
        }

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS invoices (
                id TEXT PRIMARY KEY,
                inv_num TEXT,
                inv_date TEXT,
                random_code TEXT,
                seller_id TEXT,
                total REAL,
                raw_left TEXT NOT NULL,
                raw_right TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS invoice_items (
                id TEXT PRIMARY KEY,
                invoice_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                qty REAL NOT NULL,
                unit_price REAL NOT NULL,
                FOREIGN KEY (invoice_id) REFERENCES invoices(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_invoices_created_at ON invoices(created_at)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_items_invoice_id ON invoice_items(invoice_id)",
            [],
        )?;

        Ok(())
    }

    /// Row id of an item: `<invoice>_it_<index>_<name>`, capped at 80 characters.
    pub fn item_row_id(invoice_id: &str, idx: usize, name: &str) -> String {
        format!("{invoice_id}_it_{idx}_{name}")
            .chars()
            .take(ITEM_ID_MAX_CHARS)
            .collect()
    }

    /// Insert or replace an invoice together with its complete item set.
    pub fn save(&self, inv: &Invoice) -> SqliteResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO invoices
                (id, inv_num, inv_date, random_code, seller_id, total, raw_left, raw_right, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                inv.id,
                inv.inv_num,
                inv.date,
                inv.random_code,
                inv.seller_id,
                inv.total,
                inv.raw_left,
                inv.raw_right,
                inv.created_at,
            ],
        )?;

        // a re-save replaces the old item set
        tx.execute(
            "DELETE FROM invoice_items WHERE invoice_id = ?1",
            params![inv.id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO invoice_items (id, invoice_id, position, name, qty, unit_price)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (idx, item) in inv.items.iter().enumerate() {
                stmt.execute(params![
                    Self::item_row_id(&inv.id, idx, &item.name),
                    inv.id,
                    idx as i64,
                    item.name,
                    item.qty,
                    item.unit_price,
                ])?;
            }
        }

        tx.commit()?;
        info!(id = %inv.id, items = inv.items.len(), total = ?inv.total, "Invoice stored");
        Ok(())
    }

    /// Get an invoice with its items by id
    pub fn get_by_id(&self, id: &str) -> SqliteResult<Option<Invoice>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, inv_num, inv_date, random_code, seller_id, total, raw_left, raw_right, created_at
             FROM invoices
             WHERE id = ?1",
        )?;

        let mut rows = stmt.query(params![id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let mut inv = Invoice {
            id: row.get(0)?,
            inv_num: row.get(1)?,
            date: row.get(2)?,
            random_code: row.get(3)?,
            seller_id: row.get(4)?,
            total: row.get(5)?,
            raw_left: row.get(6)?,
            raw_right: row.get(7)?,
            created_at: row.get(8)?,
            items: Vec::new(),
        };
        inv.items = self.get_items(id)?;
        Ok(Some(inv))
    }

    fn get_items(&self, invoice_id: &str) -> SqliteResult<Vec<InvoiceItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, qty, unit_price
             FROM invoice_items
             WHERE invoice_id = ?1
             ORDER BY position ASC",
        )?;

        let items = stmt.query_map(params![invoice_id], |row| {
            Ok(InvoiceItem {
                name: row.get(0)?,
                qty: row.get(1)?,
                unit_price: row.get(2)?,
            })
        })?;

        items.collect()
    }

    /// Most recent invoices first
    pub fn list(&self, limit: usize) -> SqliteResult<Vec<InvoiceSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                i.id,
                i.created_at,
                i.total,
                (SELECT COUNT(1) FROM invoice_items it WHERE it.invoice_id = i.id) AS items_count
             FROM invoices i
             ORDER BY i.created_at DESC, i.rowid DESC
             LIMIT ?1",
        )?;

        let summaries = stmt.query_map(params![limit as i64], |row| {
            Ok(InvoiceSummary {
                id: row.get(0)?,
                created_at: row.get(1)?,
                total: row.get(2)?,
                items_count: row.get(3)?,
            })
        })?;

        summaries.collect()
    }

    pub fn count(&self) -> SqliteResult<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM invoices", [], |row| row.get(0))
    }

    /// Remove every invoice and item
    pub fn clear_all(&self) -> SqliteResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let items = tx.execute("DELETE FROM invoice_items", [])?;
        let invoices = tx.execute("DELETE FROM invoices", [])?;
        tx.commit()?;
        info!(invoices, items, "Cleared invoice store");
        Ok(())
    }

    /// Close the underlying connection, surfacing any close error.
    pub fn close(self) -> SqliteResult<()> {
        self.conn.close().map_err(|(_, e)| e)
    }
}
