pub mod capture;
pub mod config;
pub mod heuristics;
pub mod invoice_db;
pub mod reconcile;
pub mod service;

pub use capture::{CaptureOutcome, CaptureSession, FrameScanner, JsonFrameScanner, ScanError};
pub use config::Config;
pub use heuristics::{Invoice, InvoiceItem, InvoiceSummary, parse_einvoice};
pub use invoice_db::InvoiceStore;
pub use reconcile::{ReconciledPair, Reconciliation, ResolvedBy, ScanResult, reconcile};
pub use service::InvoiceService;
