use std::sync::LazyLock;

use regex::Regex;

static RE_NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]").unwrap());
static RE_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());

/// Derives a vendor's canonical id from its display name:
/// `"ACME Corp, Inc."` becomes `"acme_corp_inc"`.
pub fn canonical_vendor_id(vendor_name: &str) -> String {
    let lowered = vendor_name.trim().to_lowercase();
    let replaced = RE_NON_ALNUM.replace_all(&lowered, "_");
    let collapsed = RE_UNDERSCORES.replace_all(&replaced, "_");
    collapsed.trim_matches('_').to_string()
}
