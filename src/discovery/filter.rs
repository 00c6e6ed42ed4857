//! Turning link destinations into follower usernames.

/// First path segments that are site routes, not profiles.
pub const EXCLUDED_SEGMENTS: &[&str] = &[
    "tos",
    "privacy",
    "about",
    "help",
    "explore",
    "notifications",
    "home",
    "i",
    "messages",
    "settings",
    "search",
    "compose",
    "status",
];

/// Substrings that mark a status/detail page or an internal route.
const DETAIL_MARKERS: &[&str] = &["/status/", "/i/", "/search"];

/// Extract the profile username an `href` points at, if it points at one.
///
/// Accepts root-relative links (`/alice`) and absolute links on the site
/// itself (`https://x.com/alice` when `site_url` is `https://x.com`). Links to
/// any other host, including protocol-relative `//host/...`, are rejected.
/// Query strings and fragments are ignored.
pub fn username_from_href(href: &str, site_url: &str) -> Option<String> {
    let href = href.trim();
    let path = if let Some((_, rest)) = href.split_once("://") {
        let (host, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => return None,
        };
        if !same_host(host, host_of(site_url)?) {
            return None;
        }
        path
    } else if href.starts_with('/') && !href.starts_with("//") {
        href
    } else {
        return None;
    };

    let path = path
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    if DETAIL_MARKERS.iter().any(|m| path.contains(m)) {
        return None;
    }

    let segment = path.trim_start_matches('/').split('/').next()?;
    if segment.is_empty() || is_excluded(segment) {
        return None;
    }
    Some(segment.to_string())
}

fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split('/').next().filter(|h| !h.is_empty())
}

/// Host comparison ignoring case and a leading `www.`.
fn same_host(a: &str, b: &str) -> bool {
    let bare = |h: &str| {
        let h = h.to_ascii_lowercase();
        h.strip_prefix("www.").map(str::to_string).unwrap_or(h)
    };
    bare(a) == bare(b)
}

pub fn is_excluded(username: &str) -> bool {
    EXCLUDED_SEGMENTS
        .iter()
        .any(|e| e.eq_ignore_ascii_case(username))
}

/// Final pass over a collected list: drops near-empty and route-like entries.
pub fn is_plausible_username(username: &str) -> bool {
    username.chars().count() > 1 && !is_excluded(username)
}
