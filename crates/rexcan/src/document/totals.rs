//! Derived subtotal / total recomputation.

use super::data::ExtractedData;

/// A derived field whose value changed during recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecomputedField {
    pub field: &'static str,
    pub old: Option<f64>,
    pub new: Option<f64>,
}

/// Recomputes `amount_subtotal` and `total_amount` from line items and tax.
///
/// With line items, subtotal is the sum of line totals (quantity × unit
/// price where a total is absent) and total is subtotal + tax, a missing
/// tax counting as zero. Without line items the subtotal is kept and the
/// total follows it when a subtotal exists. Returns the fields that moved.
pub fn recompute(data: &mut ExtractedData) -> Vec<RecomputedField> {
    let old_subtotal = data.amount_subtotal;
    let old_total = data.total_amount;

    let subtotal = if data.line_items.is_empty() {
        data.amount_subtotal
    } else {
        Some(round_cents(
            data.line_items
                .iter()
                .filter_map(|item| item.effective_total())
                .sum::<f64>(),
        ))
    };

    let total = match subtotal {
        Some(sub) => Some(round_cents(sub + data.amount_tax.unwrap_or(0.0))),
        None => data.total_amount,
    };

    data.amount_subtotal = subtotal;
    data.total_amount = total;

    let mut changed = Vec::new();
    if !same_amount(old_subtotal, subtotal) {
        changed.push(RecomputedField {
            field: "amount_subtotal",
            old: old_subtotal,
            new: subtotal,
        });
    }
    if !same_amount(old_total, total) {
        changed.push(RecomputedField {
            field: "total_amount",
            old: old_total,
            new: total,
        });
    }
    changed
}

/// Whether `sum(line totals) + tax` disagrees with the reported total.
pub fn has_arithmetic_mismatch(data: &ExtractedData) -> bool {
    if data.line_items.is_empty() {
        return false;
    }
    let mut probe = data.clone();
    recompute(&mut probe);
    !same_amount(probe.total_amount, data.total_amount)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn same_amount(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => (x - y).abs() < 0.005,
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::data::LineItem;

    fn sample() -> ExtractedData {
        ExtractedData {
            line_items: vec![
                LineItem::new("Widget", Some(2.0), Some(5.0)),
                LineItem::new("Gadget", Some(1.0), Some(3.0)),
            ],
            amount_tax: Some(1.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_subtotal_and_total_from_line_items_and_tax() {
        let mut data = sample();
        let changed = recompute(&mut data);
        assert_eq!(data.amount_subtotal, Some(13.0));
        assert_eq!(data.total_amount, Some(14.0));
        assert_eq!(changed.len(), 2);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut data = sample();
        recompute(&mut data);
        let snapshot = data.clone();
        let changed = recompute(&mut data);
        assert!(changed.is_empty());
        assert_eq!(data, snapshot);
    }

    #[test]
    fn test_inconsistent_user_totals_are_overridden() {
        let mut data = sample();
        data.amount_subtotal = Some(99.0);
        data.total_amount = Some(500.0);
        let changed = recompute(&mut data);
        assert_eq!(data.amount_subtotal, Some(13.0));
        assert_eq!(data.total_amount, Some(14.0));
        assert_eq!(changed[0].old, Some(99.0));
        assert_eq!(changed[1].old, Some(500.0));
    }

    #[test]
    fn test_missing_tax_counts_as_zero() {
        let mut data = sample();
        data.amount_tax = None;
        recompute(&mut data);
        assert_eq!(data.total_amount, Some(13.0));
    }

    #[test]
    fn test_without_line_items_total_follows_subtotal() {
        let mut data = ExtractedData {
            amount_subtotal: Some(100.0),
            amount_tax: Some(8.25),
            total_amount: Some(90.0),
            ..Default::default()
        };
        recompute(&mut data);
        assert_eq!(data.amount_subtotal, Some(100.0));
        assert_eq!(data.total_amount, Some(108.25));
    }

    #[test]
    fn test_without_line_items_or_subtotal_total_is_kept() {
        let mut data = ExtractedData {
            total_amount: Some(42.0),
            amount_tax: Some(2.0),
            ..Default::default()
        };
        assert!(recompute(&mut data).is_empty());
        assert_eq!(data.total_amount, Some(42.0));
    }

    #[test]
    fn test_arithmetic_mismatch() {
        let mut data = sample();
        data.total_amount = Some(14.0);
        assert!(!has_arithmetic_mismatch(&data));
        data.total_amount = Some(15.0);
        assert!(has_arithmetic_mismatch(&data));
    }
}
