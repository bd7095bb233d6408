//! Ranking of processed documents that need a human look.

use std::cmp::Ordering;

use serde::Serialize;

use crate::document::Document;

/// Fields below this confidence put a document in the review queue.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub document_id: String,
    pub filename: String,
    pub invoice_id: Option<String>,
    pub vendor_name: Option<String>,
    pub is_duplicate: bool,
    pub arithmetic_mismatch: bool,
    pub low_confidence_fields: Vec<String>,
    pub min_confidence: Option<f64>,
}

impl ReviewItem {
    /// `None` when the document has no result or nothing worth reviewing.
    pub fn from_document(doc: &Document) -> Option<Self> {
        let data = doc.extracted.as_ref()?;
        let low_confidence_fields = data.low_confidence_fields(LOW_CONFIDENCE_THRESHOLD);
        if low_confidence_fields.is_empty() && !data.is_duplicate && !data.arithmetic_mismatch {
            return None;
        }
        Some(Self {
            document_id: doc.id.clone(),
            filename: doc.filename.clone(),
            invoice_id: data.invoice_id.clone(),
            vendor_name: data.vendor_name.clone(),
            is_duplicate: data.is_duplicate,
            arithmetic_mismatch: data.arithmetic_mismatch,
            low_confidence_fields,
            min_confidence: data.min_confidence(),
        })
    }

    fn flagged(&self) -> bool {
        self.is_duplicate || self.arithmetic_mismatch
    }
}

/// Flagged items first, then more low-confidence fields, then lower minimum
/// confidence.
pub fn rank(items: &mut [ReviewItem]) {
    items.sort_by(|a, b| {
        b.flagged()
            .cmp(&a.flagged())
            .then_with(|| b.low_confidence_fields.len().cmp(&a.low_confidence_fields.len()))
            .then_with(|| compare_confidence(a.min_confidence, b.min_confidence))
    });
}

fn compare_confidence(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
