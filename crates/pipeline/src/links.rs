//! Item link resolution.

/// Resolve the link scraped for an item into an absolute URL.
///
/// Site-relative links (`/pin/1/`) are joined to `base_url`, absolute
/// `http(s)` links are kept, and anything else falls back to the page the
/// session was on when the item was collected.
pub fn resolve_item_url(link: Option<&str>, base_url: &str, current_url: Option<&str>) -> String {
    match link.map(str::trim) {
        Some(link) if link.starts_with('/') => {
            format!("{}{}", base_url.trim_end_matches('/'), link)
        }
        Some(link) if link.starts_with("http") => link.to_string(),
        _ => current_url.unwrap_or(base_url).to_string(),
    }
}
