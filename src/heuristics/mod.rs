// src/heuristics/mod.rs

mod einvoice;

use serde::Deserialize;
use serde::Serialize;

pub use einvoice::{
    CONTINUATION_MARKER, find_item_start, invoice_id, is_likely_item_name, is_number_like,
    merge_payload, strip_continuation, tokenize,
};

/// A single purchased line on an e-invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub name: String,
    pub qty: f64,
    pub unit_price: f64,
}

impl InvoiceItem {
    pub fn subtotal(&self) -> f64 {
        self.qty * self.unit_price
    }
}

/// A parsed e-invoice, as produced from one LEFT/RIGHT QR pair.
///
/// The header fields (`inv_num`, `date`, `random_code`, `seller_id`) are carried
/// through storage but never filled by the payload parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub inv_num: Option<String>,
    /// YYYY-MM-DD
    pub date: Option<String>,
    pub random_code: Option<String>,
    pub seller_id: Option<String>,
    pub total: Option<f64>,
    pub items: Vec<InvoiceItem>,
    pub raw_left: String,
    pub raw_right: Option<String>,
    /// Unix epoch, milliseconds.
    pub created_at: i64,
}

impl Invoice {
    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    /// Sum of the line subtotals, recomputed from `items`.
    pub fn computed_total(&self) -> f64 {
        self.items.iter().map(InvoiceItem::subtotal).sum()
    }
}

/// Lightweight projection of a stored invoice for list views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub id: String,
    pub created_at: i64,
    pub total: Option<f64>,
    pub items_count: usize,
}

/// Parse a LEFT payload and optional RIGHT payload into an [`Invoice`],
/// stamped with the current time.
pub fn parse_einvoice(left: &str, right: Option<&str>) -> Invoice {
    einvoice::parse(left, right, now_millis())
}

/// Same as [`parse_einvoice`] with an explicit creation timestamp.
pub fn parse_einvoice_at(left: &str, right: Option<&str>, created_at: i64) -> Invoice {
    einvoice::parse(left, right, created_at)
}

fn now_millis() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    (nanos / 1_000_000) as i64
}
