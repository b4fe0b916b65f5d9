// src/reconcile.rs

use crate::heuristics::{CONTINUATION_MARKER, strip_continuation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Axis-aligned bounding box of a detected code.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub origin: Point,
    pub size: Size,
}

/// One barcode detected in a captured frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub corner_points: Vec<Point>,
    #[serde(default)]
    pub bounds: Option<Bounds>,
}

impl ScanResult {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }
}

/// Which of the two printed codes a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Part {
    Left,
    Right,
}

/// Halves known so far; either side may still be missing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartialPair {
    pub left: Option<String>,
    pub right: Option<String>,
}

impl PartialPair {
    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Both halves, once known.
    pub fn complete(&self) -> Option<ReconciledPair> {
        match (&self.left, &self.right) {
            (Some(left), Some(right)) => Some(ReconciledPair {
                left: left.clone(),
                right: right.clone(),
            }),
            _ => None,
        }
    }
}

/// LEFT and RIGHT payloads in the right order. `right` has no leading `**`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledPair {
    pub left: String,
    pub right: String,
}

/// The rule that settled the LEFT/RIGHT assignment of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedBy {
    /// Exactly one payload carried the continuation marker.
    Content,
    /// Smaller horizontal center was taken as LEFT.
    Spatial,
    /// First scanned was taken as LEFT. Weak; treat the pair as provisional.
    ScanOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    NoneDetected,
    Partial(PartialPair),
    Pair {
        pair: ReconciledPair,
        resolved_by: ResolvedBy,
    },
}

pub fn classify_part(text: &str) -> Part {
    if text.trim().starts_with(CONTINUATION_MARKER) {
        Part::Right
    } else {
        Part::Left
    }
}

fn normalize_right(text: &str) -> String {
    strip_continuation(text.trim()).to_string()
}

/// Horizontal center of a result: mean corner x when at least two corners are
/// known, otherwise the bounding box midpoint.
pub fn center_x(result: &ScanResult) -> Option<f64> {
    let cps = &result.corner_points;
    if cps.len() >= 2 {
        let sum: f64 = cps.iter().map(|p| p.x).sum();
        return Some(sum / cps.len() as f64);
    }
    result.bounds.map(|b| b.origin.x + b.size.width / 2.0)
}

/// Drop empty payloads and keep the first result for each distinct trimmed payload.
pub fn dedup_by_payload(results: &[ScanResult]) -> Vec<ScanResult> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for r in results {
        let data = r.data.trim();
        if data.is_empty() || !seen.insert(data.to_string()) {
            continue;
        }
        out.push(r.clone());
    }
    out
}

/// Resolve LEFT/RIGHT roles for an already deduplicated frame.
///
/// Only the first two results are considered. Roles are settled by the
/// continuation marker first, by horizontal position second and by scan order
/// last.
pub fn reconcile(results: &[ScanResult]) -> Reconciliation {
    match results {
        [] => Reconciliation::NoneDetected,
        [only] => Reconciliation::Partial(single(only)),
        [a, b, rest @ ..] => {
            if !rest.is_empty() {
                debug!(ignored = rest.len(), "More than two codes in frame");
            }
            let (pair, resolved_by) = resolve_two(a, b);
            debug!(resolved_by = ?resolved_by, "Reconciled code pair");
            Reconciliation::Pair { pair, resolved_by }
        }
    }
}

/// [`dedup_by_payload`] followed by [`reconcile`].
pub fn reconcile_frame(results: &[ScanResult]) -> Reconciliation {
    reconcile(&dedup_by_payload(results))
}

fn single(result: &ScanResult) -> PartialPair {
    let data = result.data.trim();
    match classify_part(data) {
        Part::Left => PartialPair {
            left: Some(data.to_string()),
            right: None,
        },
        Part::Right => PartialPair {
            left: None,
            right: Some(normalize_right(data)),
        },
    }
}

fn resolve_two(a: &ScanResult, b: &ScanResult) -> (ReconciledPair, ResolvedBy) {
    let a_data = a.data.trim();
    let b_data = b.data.trim();

    let (left, right, resolved_by) = match (classify_part(a_data), classify_part(b_data)) {
        (Part::Left, Part::Right) => (a_data, b_data, ResolvedBy::Content),
        (Part::Right, Part::Left) => (b_data, a_data, ResolvedBy::Content),
        _ => match (center_x(a), center_x(b)) {
            (Some(ax), Some(bx)) if ax <= bx => (a_data, b_data, ResolvedBy::Spatial),
            (Some(_), Some(_)) => (b_data, a_data, ResolvedBy::Spatial),
            _ => {
                warn!("No geometry for ambiguous pair, falling back to scan order");
                (a_data, b_data, ResolvedBy::ScanOrder)
            }
        },
    };

    let pair = ReconciledPair {
        left: left.to_string(),
        right: normalize_right(right),
    };
    (pair, resolved_by)
}
