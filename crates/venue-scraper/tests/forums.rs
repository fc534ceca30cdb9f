//! End-to-end adapter tests against a local `wiremock` forum.

use chrono::{DateTime, TimeZone, Utc};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use venue_core::ScraperKind;
use venue_scraper::{ForumClient, ForumScraper, ScraperError, MAX_POST_PAGES};

fn client() -> ForumClient {
    ForumClient::new(5, "venue-test/0.1", 0, 0).expect("failed to build test ForumClient")
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 2, 18, 0, 0).unwrap()
}

fn bitcointalk_profile(signature: &str) -> String {
    format!(
        r#"<html><body><div id="bodyarea"><table>
        <tr><td>Name:</td><td>satoshi</td></tr>
        <tr><td>Posts:</td><td>57</td></tr>
        <tr><td>Position:</td><td>Member</td></tr>
        <tr><td>Signature:</td><td>{signature}</td></tr>
        </table></div></body></html>"#
    )
}

fn bitcointalk_listing(posts: &[(u32, u32, &str)]) -> String {
    let rows: String = posts
        .iter()
        .map(|(topic, msg, stamp)| {
            format!(
                r#"<tr class="titlebg2"><td>#</td>
                   <td><a href="https://bitcointalk.org/index.php?topic={topic}.msg{msg}#msg{msg}">t</a></td>
                   <td>on: {stamp}</td></tr>
                   <tr><td class="windowbg2"><div class="post">post {msg}</div></td></tr>"#
            )
        })
        .collect();
    format!("<html><body><table>{rows}</table></body></html>")
}

#[tokio::test]
async fn bitcointalk_profile_is_fetched_and_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .and(query_param("action", "profile;u=172792"))
        .respond_with(ResponseTemplate::new(200).set_body_string(bitcointalk_profile(
            r#"<div class="signature"><a href="https://a.com?vcode=X">a</a></div>"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let scraper = ForumScraper::new(ScraperKind::Bitcointalk, &server.uri()).unwrap();
    let page = scraper.fetch_profile(&client(), "172792").await.unwrap();

    assert_eq!(page.status_code, 200);
    assert_eq!(page.username.as_deref(), Some("satoshi"));
    assert_eq!(page.position.as_deref(), Some("Member"));
    assert_eq!(page.total_posts, Some(57));
    assert_eq!(page.signature.unwrap().links, vec!["https://a.com?vcode=X"]);
}

#[tokio::test]
async fn profile_without_signature_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(bitcointalk_profile("")))
        .mount(&server)
        .await;

    let scraper = ForumScraper::new(ScraperKind::Bitcointalk, &server.uri()).unwrap();
    let page = scraper.fetch_profile(&client(), "5").await.unwrap();
    assert!(page.signature.is_none());
}

#[tokio::test]
async fn bitcoin_forum_404_is_profile_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/member-u99/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let scraper = ForumScraper::new(ScraperKind::BitcoinForum, &server.uri()).unwrap();
    let err = scraper.fetch_profile(&client(), "99").await.unwrap_err();
    assert!(
        matches!(err, ScraperError::ProfileNotFound { ref forum_user_id } if forum_user_id == "99"),
        "{err:?}"
    );
}

#[tokio::test]
async fn post_listing_stops_at_posts_older_than_since() {
    let server = MockServer::start().await;

    // A full first page forces a second request; the second page reaches
    // into posts older than `since`, so no third page is requested.
    let first: Vec<(u32, u32, &str)> = (0..20)
        .map(|i| (100, 1000 - i, "Today at 10:00:00 AM"))
        .collect();
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .and(query_param("action", "profile;u=7;sa=showPosts;start=0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(bitcointalk_listing(&first)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .and(query_param("action", "profile;u=7;sa=showPosts;start=20"))
        .respond_with(ResponseTemplate::new(200).set_body_string(bitcointalk_listing(&[
            (101, 50, "March 02, 2024, 01:00:00 AM"),
            (102, 40, "February 20, 2024, 01:00:00 AM"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let scraper = ForumScraper::new(ScraperKind::Bitcointalk, &server.uri()).unwrap();
    let since = Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap();
    let listing = scraper
        .fetch_posts_since(&client(), "7", since, now())
        .await
        .unwrap();
    assert!(listing.complete);
    assert_eq!(listing.covered_since(since), Some(since));

    let posts = listing.posts;
    assert_eq!(posts.len(), 21);
    assert!(posts.iter().all(|p| p.posted_at >= since));
    assert!(posts.iter().any(|p| p.message_id == "50"));
    assert!(!posts.iter().any(|p| p.message_id == "40"));
}

#[tokio::test]
async fn empty_listing_yields_no_posts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.php"))
        .and(query_param("author_id", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let scraper = ForumScraper::new(ScraperKind::BitcoinForum, &server.uri()).unwrap();
    let listing = scraper
        .fetch_posts_since(&client(), "3", now(), now())
        .await
        .unwrap();
    assert!(listing.complete);
    assert!(listing.posts.is_empty());
}

#[tokio::test]
async fn post_listing_stops_at_the_page_cap_and_reports_it() {
    let server = MockServer::start().await;

    // Every page is full and inside the window, so only the cap ends the walk.
    for page in 0..MAX_POST_PAGES {
        let rows: Vec<(u32, u32, &str)> = (0..20)
            .map(|i| (100 + page, 10_000 - page * 20 - i, "Today at 10:00:00 AM"))
            .collect();
        Mock::given(method("GET"))
            .and(path("/index.php"))
            .and(query_param(
                "action",
                format!("profile;u=9;sa=showPosts;start={}", page * 20),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(bitcointalk_listing(&rows)))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .and(query_param(
            "action",
            format!("profile;u=9;sa=showPosts;start={}", MAX_POST_PAGES * 20),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(bitcointalk_listing(&[])))
        .expect(0)
        .mount(&server)
        .await;

    let scraper = ForumScraper::new(ScraperKind::Bitcointalk, &server.uri()).unwrap();
    let since = Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap();
    let listing = scraper
        .fetch_posts_since(&client(), "9", since, now())
        .await
        .unwrap();

    assert!(!listing.complete);
    assert_eq!(listing.posts.len(), (MAX_POST_PAGES * 20) as usize);

    // Only the span after the oldest fetched post is known in full.
    let oldest = Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap();
    assert_eq!(
        listing.covered_since(since),
        Some(oldest + chrono::Duration::seconds(1))
    );
}
