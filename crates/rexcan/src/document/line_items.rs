//! Line-item normalization.
//!
//! Every path that stores line items (worker ingestion, corrections,
//! rollback mirroring) goes through [`normalize`].

use super::data::LineItem;

const PLACEHOLDER_DESCRIPTIONS: &[&str] = &["-", "--", "---", "N/A", "n/a"];

/// Lower-cased phrases that mark a row as letter text rather than an item.
/// Matched as substrings of the lower-cased description.
const NON_ITEM_PHRASES: &[&str] = &[
    "sales",
    "tax",
    "subtotal",
    "total",
    "amount",
    "payment",
    "terms",
    "many thanks",
    "thank you",
    "thanks for",
    "thanks foryour",
    "thanks for your",
    "thanks for your business",
    "thank you for your business",
    "thanks foryour business",
    "to be received",
    "within",
    "days",
    "please find",
    "cost-breakdown",
    "work completed",
    "earliest convenience",
    "do not hesitate",
    "contact me",
    "questions",
    "dear",
    "ms.",
    "mr.",
    "your name",
    "sincerely",
    "regards",
    "best regards",
    "look forward",
    "doing business",
    "due course",
    "custom",
    "find below",
    "make payment",
    "contact",
    "hesitate",
    "for your business",
    "for business",
    "your business",
];

/// Filters out rows that are not real items and fills in computable values.
///
/// - drops empty, placeholder and boilerplate descriptions
/// - drops rows with no quantity, unit price or total
/// - defaults a missing quantity to 1 when a unit price is present
/// - fills a missing total with quantity × unit price
///
/// Applying it twice yields the same items as applying it once.
pub fn normalize(items: Vec<LineItem>) -> Vec<LineItem> {
    items.into_iter().filter_map(normalize_item).collect()
}

fn normalize_item(mut item: LineItem) -> Option<LineItem> {
    let description = item.description.as_deref().map(str::trim).unwrap_or("");
    if description.is_empty() || PLACEHOLDER_DESCRIPTIONS.contains(&description) {
        return None;
    }

    let lowered = description.to_lowercase();
    if NON_ITEM_PHRASES.iter().any(|p| lowered.contains(p)) {
        return None;
    }

    let has_numbers = [item.quantity, item.unit_price, item.total]
        .iter()
        .any(|v| matches!(v, Some(n) if *n != 0.0));
    if !has_numbers {
        return None;
    }

    let description = description.to_string();
    if item.unit_price.is_some() && item.quantity.is_none() {
        item.quantity = Some(1.0);
    }
    if item.total.is_none() {
        if let (Some(q), Some(p)) = (item.quantity, item.unit_price) {
            item.total = Some(q * p);
        }
    }
    item.description = Some(description);
    Some(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(description: &str, q: Option<f64>, p: Option<f64>, t: Option<f64>) -> LineItem {
        LineItem {
            description: Some(description.to_string()),
            quantity: q,
            unit_price: p,
            total: t,
        }
    }

    #[test]
    fn test_drops_empty_and_placeholder_descriptions() {
        let items = vec![
            item("  ", Some(1.0), Some(2.0), None),
            item("N/A", Some(1.0), Some(2.0), None),
            item("---", Some(1.0), Some(2.0), None),
            LineItem {
                description: None,
                quantity: Some(1.0),
                unit_price: Some(2.0),
                total: None,
            },
        ];
        assert!(normalize(items).is_empty());
    }

    #[test]
    fn test_drops_boilerplate_phrases() {
        let items = vec![
            item("Thank you for your business!", None, None, Some(5.0)),
            item("Payment within 30 days", None, None, Some(30.0)),
            item("Subtotal", None, None, Some(100.0)),
            item("Best regards, Jane", None, Some(1.0), None),
        ];
        assert!(normalize(items).is_empty());
    }

    #[test]
    fn test_drops_rows_without_numbers() {
        let items = vec![
            item("Web design services", None, None, None),
            item("Hosting", Some(0.0), None, None),
        ];
        assert!(normalize(items).is_empty());
    }

    #[test]
    fn test_defaults_quantity_and_fills_total() {
        let out = normalize(vec![item("  Consulting hours ", None, Some(75.0), None)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].description.as_deref(), Some("Consulting hours"));
        assert_eq!(out[0].quantity, Some(1.0));
        assert_eq!(out[0].total, Some(75.0));
    }

    #[test]
    fn test_keeps_reported_total() {
        let out = normalize(vec![item("Widget", Some(2.0), Some(5.0), Some(9.5))]);
        assert_eq!(out[0].total, Some(9.5));
    }

    #[test]
    fn test_total_only_row_is_kept_without_quantity() {
        let out = normalize(vec![item("Annual license", None, None, Some(120.0))]);
        assert_eq!(out.len(), 1);
        assert!(out[0].quantity.is_none());
        assert_eq!(out[0].total, Some(120.0));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let items = vec![
            item("Widget", Some(2.0), Some(5.0), None),
            item("Gadget", None, Some(3.0), None),
            item("Thanks for your business", None, None, Some(1.0)),
        ];
        let once = normalize(items);
        let twice = normalize(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }
}
