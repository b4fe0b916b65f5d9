use crate::config::Config;
use crate::heuristics::{self, Invoice, InvoiceSummary};
use crate::invoice_db::InvoiceStore;
use crate::reconcile::ReconciledPair;
use rusqlite::Result as SqliteResult;
use std::path::Path;
use tracing::info;

/// Invoice repository shared by the scan, list and detail views.
///
/// Built once at startup with [`InvoiceService::init`] and handed out by
/// reference; [`InvoiceService::dispose`] closes the database.
pub struct InvoiceService {
    store: InvoiceStore,
    summaries: Vec<InvoiceSummary>,
    list_limit: usize,
}

impl InvoiceService {
    pub fn init(cfg: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(parent) = Path::new(&cfg.db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!(db_path = %cfg.db_path, "Opening invoice store");
        Ok(Self::with_store(InvoiceStore::open(&cfg.db_path)?, cfg.list_limit)?)
    }

    pub fn with_store(store: InvoiceStore, list_limit: usize) -> SqliteResult<Self> {
        let mut svc = Self {
            store,
            summaries: Vec::new(),
            list_limit,
        };
        svc.refresh()?;
        Ok(svc)
    }

    pub fn summaries(&self) -> &[InvoiceSummary] {
        &self.summaries
    }

    pub fn refresh(&mut self) -> SqliteResult<()> {
        self.summaries = self.store.list(self.list_limit)?;
        Ok(())
    }

    pub fn save(&mut self, inv: &Invoice) -> SqliteResult<()> {
        self.store.save(inv)?;
        self.refresh()
    }

    pub fn get_by_id(&self, id: &str) -> SqliteResult<Option<Invoice>> {
        self.store.get_by_id(id)
    }

    pub fn clear_all(&mut self) -> SqliteResult<()> {
        self.store.clear_all()?;
        self.refresh()
    }

    /// Parse a reconciled pair, persist it and return the stored invoice.
    pub fn ingest(&mut self, pair: &ReconciledPair) -> SqliteResult<Invoice> {
        let inv = heuristics::parse_einvoice(&pair.left, Some(&pair.right));
        self.save(&inv)?;
        info!(id = %inv.id, items = inv.items.len(), total = ?inv.total, "Invoice ingested");
        Ok(inv)
    }

    pub fn dispose(self) -> SqliteResult<()> {
        info!("Closing invoice store");
        self.store.close()
    }
}
