use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single invoice line as reported by the extraction service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "qty")]
    pub quantity: Option<f64>,
    #[serde(default, alias = "price")]
    pub unit_price: Option<f64>,
    #[serde(default, alias = "line_total", alias = "amount")]
    pub total: Option<f64>,
}

impl LineItem {
    pub fn new(description: &str, quantity: Option<f64>, unit_price: Option<f64>) -> Self {
        Self {
            description: Some(description.to_string()),
            quantity,
            unit_price,
            total: None,
        }
    }

    /// The line's total, falling back to quantity × unit price.
    pub fn effective_total(&self) -> Option<f64> {
        self.total.or(match (self.quantity, self.unit_price) {
            (Some(q), Some(p)) => Some(q * p),
            _ => None,
        })
    }
}

/// The document's copy of an extraction result.
///
/// Fields the orchestrator does not interpret (timings, LLM routing) are
/// dropped on decode. Near-duplicate descriptors are kept opaque.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedData {
    pub invoice_id: Option<String>,
    pub vendor_name: Option<String>,
    pub vendor_id: Option<String>,
    pub invoice_date: Option<String>,
    pub currency: Option<String>,
    pub total_amount: Option<f64>,
    pub amount_subtotal: Option<f64>,
    pub amount_tax: Option<f64>,
    pub line_items: Vec<LineItem>,

    pub field_confidences: BTreeMap<String, f64>,
    pub field_sources: BTreeMap<String, serde_json::Value>,
    pub field_reasons: BTreeMap<String, serde_json::Value>,

    pub dedupe_hash: Option<String>,
    pub is_duplicate: bool,
    pub is_near_duplicate: bool,
    pub near_duplicates: Vec<serde_json::Value>,
    pub arithmetic_mismatch: bool,

    pub missing_invoice_id: bool,
    pub missing_total: bool,
    pub missing_vendor_name: bool,
    pub missing_date: bool,
    pub is_invalid: bool,
}

/// Fields a correction may set directly.
pub const CORRECTABLE_FIELDS: &[&str] = &[
    "invoice_id",
    "vendor_name",
    "vendor_id",
    "invoice_date",
    "currency",
    "total_amount",
    "amount_subtotal",
    "amount_tax",
    "line_items",
];

/// Fields whose change invalidates the derived subtotal and total.
pub const TOTAL_INPUT_FIELDS: &[&str] = &["line_items", "amount_tax", "amount_subtotal", "total_amount"];

impl ExtractedData {
    /// Decodes an extraction result where missing and `null` map to defaults.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let value = strip_nulls(value);
        serde_json::from_value(value)
    }

    /// Reads one correctable field as JSON.
    pub fn field_value(&self, field: &str) -> Option<serde_json::Value> {
        let value = serde_json::to_value(self).ok()?;
        value.get(field).cloned()
    }

    /// Recomputes the validation flags from the current field values.
    pub fn refresh_validation_flags(&mut self) {
        self.missing_invoice_id = is_blank(self.invoice_id.as_deref());
        self.missing_vendor_name = is_blank(self.vendor_name.as_deref());
        self.missing_date = is_blank(self.invoice_date.as_deref());
        self.missing_total = self.total_amount.is_none();
        self.is_invalid = self.missing_invoice_id
            || self.missing_total
            || self.missing_vendor_name
            || self.missing_date;
    }

    /// Smallest per-field confidence, if any confidences were reported.
    pub fn min_confidence(&self) -> Option<f64> {
        self.field_confidences
            .values()
            .copied()
            .fold(None, |acc, c| Some(acc.map_or(c, |a: f64| a.min(c))))
    }

    /// Fields whose confidence is below `threshold`, sorted by name.
    pub fn low_confidence_fields(&self, threshold: f64) -> Vec<String> {
        self.field_confidences
            .iter()
            .filter(|(_, c)| **c < threshold)
            .map(|(f, _)| f.clone())
            .collect()
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Removes `null` object members recursively so `#[serde(default)]` applies.
fn strip_nulls(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(strip_nulls).collect())
        }
        other => other,
    }
}
