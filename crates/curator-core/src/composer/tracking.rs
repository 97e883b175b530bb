//! Click-tracking redirect links.

use chrono::NaiveDate;
use reqwest::Url;

use super::ComposeError;

/// Link used for items that have no original URL.
pub const NO_OP_LINK: &str = "#";

/// Titles are truncated to this many characters inside the redirect.
pub const TITLE_LIMIT: usize = 100;

/// Build the redirect link for one item.
pub fn tracked_link(
    base: &str,
    original_url: &str,
    segment_id: &str,
    run_date: NaiveDate,
    title: &str,
) -> Result<String, ComposeError> {
    let original_url = original_url.trim();
    if original_url.is_empty() {
        return Ok(NO_OP_LINK.to_string());
    }
    let title: String = title.chars().take(TITLE_LIMIT).collect();
    let date = run_date.format("%Y-%m-%d").to_string();
    let url = Url::parse_with_params(
        base,
        &[
            ("url", original_url),
            ("s", segment_id),
            ("d", date.as_str()),
            ("t", title.as_str()),
        ],
    )
    .map_err(|e| ComposeError::InvalidTrackingBase(format!("{base}: {e}")))?;
    Ok(url.into())
}

/// The absolute target carried by a tracked link, if it has one.
///
/// `None` for the no-op link, unparseable links, links without a `url`
/// parameter, and targets that are not absolute URLs with a host.
pub fn tracked_target(link: &str) -> Option<Url> {
    let link = link.trim();
    if link.is_empty() || link == NO_OP_LINK {
        return None;
    }
    let parsed = Url::parse(link).ok()?;
    let target = parsed
        .query_pairs()
        .find(|(k, _)| k == "url")
        .map(|(_, v)| v.into_owned())?;
    let target = Url::parse(&target).ok()?;
    target
        .host_str()
        .is_some_and(|h| !h.is_empty())
        .then_some(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://brief.delights.pro/api/track";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).expect("date")
    }

    #[test]
    fn test_link_carries_target_segment_date_title() {
        let link = tracked_link(
            BASE,
            "https://example.com/post?id=7&ref=rss",
            "builders",
            date(),
            "Agents & tools",
        )
        .expect("link");
        let parsed = Url::parse(&link).expect("parse");
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("url".into(), "https://example.com/post?id=7&ref=rss".into()),
                ("s".into(), "builders".into()),
                ("d".into(), "2026-10-18".into()),
                ("t".into(), "Agents & tools".into()),
            ]
        );
        assert_eq!(
            tracked_target(&link).map(|u| u.to_string()),
            Some("https://example.com/post?id=7&ref=rss".to_string())
        );
    }

    #[test]
    fn test_title_is_truncated() {
        let title = "x".repeat(250);
        let link = tracked_link(BASE, "https://example.com", "s", date(), &title).expect("link");
        let parsed = Url::parse(&link).expect("parse");
        let t = parsed.query_pairs().find(|(k, _)| k == "t").expect("t").1;
        assert_eq!(t.chars().count(), TITLE_LIMIT);
    }

    #[test]
    fn test_missing_url_gets_no_op_link() {
        let link = tracked_link(BASE, "  ", "s", date(), "t").expect("link");
        assert_eq!(link, NO_OP_LINK);
        assert!(tracked_target(&link).is_none());
    }

    #[test]
    fn test_targets_without_host_are_rejected() {
        assert!(tracked_target("https://brief.delights.pro/api/track?s=builders").is_none());
        assert!(tracked_target("https://brief.delights.pro/api/track?url=not-a-url").is_none());
        assert!(tracked_target("https://brief.delights.pro/api/track?url=mailto%3Aa%40b.c").is_none());
        assert!(tracked_target("::garbage::").is_none());
    }

    #[test]
    fn test_any_scheme_with_host_is_accepted() {
        let target = tracked_target("https://brief.delights.pro/api/track?url=ftp%3A%2F%2Ffiles.example.com%2Fa")
            .expect("ftp target");
        assert_eq!(target.scheme(), "ftp");
        assert_eq!(target.host_str(), Some("files.example.com"));
    }
}
