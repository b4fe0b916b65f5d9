use super::{Invoice, InvoiceItem};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use tracing::debug;

/// Leading marker of the RIGHT (continuation) QR code.
pub const CONTINUATION_MARKER: &str = "**";

const ID_PREFIX: &str = "inv_";
const ID_HEX_LEN: usize = 16;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").expect("number pattern is valid"));

/// Main parsing entry point.
pub(super) fn parse(raw_left: &str, raw_right: Option<&str>, created_at: i64) -> Invoice {
    let payload = merge_payload(raw_left, raw_right);
    let tokens = tokenize(&payload);

    let items = match find_item_start(&tokens) {
        Some(start) => extract_items(&tokens[start..]),
        None => Vec::new(),
    };
    let total = compute_total(&items);
    let id = invoice_id(&payload);

    debug!(
        id = %id,
        tokens = tokens.len(),
        items = items.len(),
        total = ?total,
        "Parsed e-invoice payload"
    );

    Invoice {
        id,
        inv_num: None,
        date: None,
        random_code: None,
        seller_id: None,
        total,
        items,
        raw_left: raw_left.to_string(),
        raw_right: raw_right.map(str::to_string),
        created_at,
    }
}

// ---------------------------------------------------------------------------
// Payload normalisation
// ---------------------------------------------------------------------------

/// Drop one leading `**` from an already trimmed RIGHT payload.
pub fn strip_continuation(text: &str) -> &str {
    text.strip_prefix(CONTINUATION_MARKER).unwrap_or(text)
}

/// Trim both halves, strip the RIGHT marker and concatenate them.
/// The halves join directly; no separator is inserted.
pub fn merge_payload(left: &str, right: Option<&str>) -> String {
    let left = left.trim();
    let right = strip_continuation(right.unwrap_or_default().trim());
    let mut payload = String::with_capacity(left.len() + right.len());
    payload.push_str(left);
    payload.push_str(right);
    payload
}

pub fn tokenize(payload: &str) -> Vec<&str> {
    payload
        .split(':')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Token predicates
// ---------------------------------------------------------------------------

/// Signed decimal: optional `-`, ASCII digits, optional `.digits`. No exponent, no separators.
pub fn is_number_like(token: &str) -> bool {
    NUMBER_RE.is_match(token.trim())
}

pub fn is_likely_item_name(token: &str) -> bool {
    let t = token.trim();
    if t.is_empty() {
        return false;
    }
    // a bare number here is a stray quantity or header field
    if t.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    // separator artifacts like "***" or "--=="
    if t.chars().all(|c| matches!(c, '*' | '-' | '_' | '=')) {
        return false;
    }
    true
}

fn parse_number(token: &str) -> Option<f64> {
    if !is_number_like(token) {
        return None;
    }
    token
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

// ---------------------------------------------------------------------------
// Item extraction
// ---------------------------------------------------------------------------

/// Index of the first `(name, number, number)` window, if any.
pub fn find_item_start(tokens: &[&str]) -> Option<usize> {
    tokens.windows(3).position(|w| {
        is_likely_item_name(w[0]) && is_number_like(w[1]) && is_number_like(w[2])
    })
}

/// Consume whole triples until one breaks the pattern. Whatever follows the
/// break is trailer data and is ignored, as is an incomplete final group.
fn extract_items(tokens: &[&str]) -> Vec<InvoiceItem> {
    let mut items = Vec::new();

    for group in tokens.chunks_exact(3) {
        let name = group[0];
        if !is_likely_item_name(name) {
            break;
        }
        let (Some(qty), Some(unit_price)) = (parse_number(group[1]), parse_number(group[2]))
        else {
            break;
        };
        items.push(InvoiceItem {
            name: name.to_string(),
            qty,
            unit_price,
        });
    }

    items
}

fn compute_total(items: &[InvoiceItem]) -> Option<f64> {
    if items.is_empty() {
        return None;
    }
    let sum: f64 = items.iter().map(InvoiceItem::subtotal).sum();
    sum.is_finite().then_some(sum)
}

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Deterministic id for a merged payload: `inv_` + 16 hex chars of its SHA-256.
pub fn invoice_id(payload: &str) -> String {
    let digest = Sha256::digest(payload.as_bytes());
    let hex = format!("{:x}", digest);
    format!("{ID_PREFIX}{}", &hex[..ID_HEX_LEN])
}
