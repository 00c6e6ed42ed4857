// Integration tests for follower discovery against a scripted listing

mod support;

#[cfg(test)]
mod tests {
    use super::support::{test_config, FakeBrowser, COLUMN_CHILD, PRIMARY_COLUMN};
    use follower_dm::config::{DiscoveryLimits, Timings};
    use follower_dm::discovery::{self, scroll_followers, ScrollPlan};
    use tokio::sync::watch;

    fn plan<'a>(limits: &'a DiscoveryLimits, timings: &'a Timings) -> ScrollPlan<'a> {
        ScrollPlan {
            site_url: "https://x.com",
            account: "acme",
            limits,
            timings,
            screenshots: false,
            stop: None,
        }
    }

    #[tokio::test]
    async fn test_collects_every_follower_across_overlapping_screens() {
        let mut browser = FakeBrowser::with_listing(&[
            &["/alice", "/bob", "/carol"],
            &["/carol", "/dave", "https://x.com/erin"],
            &["/erin", "/frank?src=hover"],
        ]);
        let limits = DiscoveryLimits::default();
        let timings = Timings::immediate();

        let followers = scroll_followers(&mut browser, &plan(&limits, &timings)).await;

        assert_eq!(followers, vec!["alice", "bob", "carol", "dave", "erin", "frank"]);
        assert_eq!(browser.navigations, vec!["https://x.com/acme/followers"]);
        // three growing scrolls, then max_no_change quiet ones
        assert_eq!(browser.scrolls, 3 + limits.max_no_change as usize);
    }

    #[tokio::test]
    async fn test_stops_at_scroll_cap_on_endless_listing() {
        let screens: Vec<Vec<String>> = (0..50).map(|i| vec![format!("/user{}", i)]).collect();
        let screen_refs: Vec<Vec<&str>> = screens
            .iter()
            .map(|s| s.iter().map(String::as_str).collect())
            .collect();
        let slices: Vec<&[&str]> = screen_refs.iter().map(Vec::as_slice).collect();
        let mut browser = FakeBrowser::with_listing(&slices);
        let limits = DiscoveryLimits {
            max_scrolls: 7,
            max_no_change: 5,
            screenshot_every: 0,
        };
        let timings = Timings::immediate();

        let followers = scroll_followers(&mut browser, &plan(&limits, &timings)).await;

        assert_eq!(followers.len(), 7);
        assert_eq!(browser.scrolls, 7);
    }

    #[tokio::test]
    async fn test_route_links_never_become_followers() {
        let mut browser = FakeBrowser::with_listing(&[&[
            "/home",
            "/explore",
            "/i/flow/login",
            "/bob/status/123",
            "/search?q=rust",
            "/tos",
            "/x",
            "/realuser",
        ]]);
        let limits = DiscoveryLimits::default();
        let timings = Timings::immediate();

        let followers = scroll_followers(&mut browser, &plan(&limits, &timings)).await;

        assert_eq!(followers, vec!["realuser"]);
    }

    #[tokio::test]
    async fn test_links_to_other_sites_never_become_followers() {
        let mut browser = FakeBrowser::with_listing(&[&[
            "https://t.co/AbCdEf123",
            "https://example.com/shop",
            "//cdn.example.com/avatar",
            "https://x.com/carol",
        ]]);
        let limits = DiscoveryLimits::default();
        let timings = Timings::immediate();

        let followers = scroll_followers(&mut browser, &plan(&limits, &timings)).await;

        assert_eq!(followers, vec!["carol"]);
    }

    #[tokio::test]
    async fn test_raised_interrupt_skips_scrolling() {
        let mut browser = FakeBrowser::with_listing(&[&["/alice"], &["/bob"], &["/carol"]]);
        let limits = DiscoveryLimits::default();
        let timings = Timings::immediate();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let followers = scroll_followers(
            &mut browser,
            &ScrollPlan {
                stop: Some(&rx),
                ..plan(&limits, &timings)
            },
        )
        .await;

        assert!(followers.is_empty());
        assert_eq!(browser.scrolls, 0);
    }

    #[tokio::test]
    async fn test_discover_honors_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config("hi");
        config.paths.export_file = dir.path().join("followers_list.txt");
        let mut browser = FakeBrowser::with_listing(&[&["/alice"], &["/bob"]]);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let followers = discovery::discover(&mut browser, &config, Some(&rx)).await;

        assert!(followers.is_empty());
        assert_eq!(browser.scrolls, 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_container_links_without_user_cells() {
        let mut browser = FakeBrowser::with_listing(&[&["/alice", "/bob"]]);
        browser.listing_without_cells = true;
        browser.show(COLUMN_CHILD);
        let limits = DiscoveryLimits::default();
        let timings = Timings::immediate();

        let followers = scroll_followers(&mut browser, &plan(&limits, &timings)).await;

        assert_eq!(followers, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_page_that_never_loads_yields_nothing() {
        let mut browser = FakeBrowser::with_listing(&[&["/alice"]]);
        browser.hide(PRIMARY_COLUMN);
        let limits = DiscoveryLimits::default();
        let timings = Timings::immediate();

        let followers = scroll_followers(&mut browser, &plan(&limits, &timings)).await;

        assert!(followers.is_empty());
        assert_eq!(browser.scrolls, 0);
    }

    #[tokio::test]
    async fn test_discover_exports_scraped_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config("hi");
        config.paths.export_file = dir.path().join("followers_list.txt");
        let mut browser = FakeBrowser::with_listing(&[&["/alice", "/bob"]]);

        let followers = discovery::discover(&mut browser, &config, None).await;

        assert_eq!(followers, vec!["alice", "bob"]);
        let exported = std::fs::read_to_string(&config.paths.export_file).unwrap();
        assert_eq!(exported, "alice\nbob\n");
    }

    #[tokio::test]
    async fn test_discover_static_mode_skips_browser() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config("hi");
        config.use_followers_txt = true;
        config.paths.followers_file = dir.path().join("followers.txt");
        std::fs::write(&config.paths.followers_file, "alice\n\nbob\n").unwrap();
        let mut browser = FakeBrowser::new();

        let followers = discovery::discover(&mut browser, &config, None).await;

        assert_eq!(followers, vec!["alice", "bob"]);
        assert!(browser.navigations.is_empty());
    }
}
