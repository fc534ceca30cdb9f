//! Live batch tests: a `wiremock` forum in front of a fresh `#[sqlx::test]`
//! database.
//!
//! Run with: `DATABASE_URL=postgres://... cargo test -p venue-tasks -- --ignored`

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use venue_core::{AppConfig, Environment, ForumSiteConfig, RankConfig, ScraperKind, SignatureConfig};
use venue_tasks::{
    compute_points, create_forum_profile, run_data_update, scrape_forum_profile,
    verification_code_for, verify_profile_signature, NewProfileRequest, TaskContext,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SIGNATURE_CODE: &str = "[url=https://venue.example/join]Venue[/url]";

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        log_level: "debug".to_string(),
        forums_path: PathBuf::from("./config/forums.yaml"),
        secret_key: "venue test salt".to_string(),
        db_max_connections: 5,
        db_min_connections: 1,
        db_acquire_timeout_secs: 5,
        scraper_request_timeout_secs: 5,
        scraper_user_agent: "venue-test/0.1".to_string(),
        scraper_max_concurrent_profiles: 2,
        scraper_max_retries: 0,
        scraper_retry_backoff_base_ms: 0,
        test_mode: false,
        post_points: Decimal::from(100),
        maturation_period_hours: 24,
        uptime_percentage_threshold: Decimal::from(90),
        tokens_available: Decimal::from(1000),
        scrape_interval_secs: 300,
        posts_lookback_hours: 24,
        task_retention_days: 30,
    }
}

fn site_config(address: &str) -> ForumSiteConfig {
    ForumSiteConfig {
        name: "bitcointalk.org".to_string(),
        address: address.to_string(),
        scraper: ScraperKind::Bitcointalk,
        ranks: vec![
            RankConfig {
                name: "Member".to_string(),
                allowed: true,
                bonus_percentage: 0,
            },
            RankConfig {
                name: "Full Member".to_string(),
                allowed: true,
                bonus_percentage: 5,
            },
        ],
        signatures: vec![SignatureConfig {
            name: "Venue Member".to_string(),
            code: SIGNATURE_CODE.to_string(),
            test_signature: None,
            ranks: vec!["Member".to_string(), "Full Member".to_string()],
            active: true,
        }],
    }
}

fn profile_page(vcode: &str) -> String {
    profile_page_as(vcode, "Member")
}

fn profile_page_as(vcode: &str, position: &str) -> String {
    format!(
        r#"<html><body><table>
        <tr><td>Name:</td><td>poster</td></tr>
        <tr><td>Posts:</td><td>120</td></tr>
        <tr><td>Position:</td><td>{position}</td></tr>
        <tr><td>Signature:</td><td><div class="signature">
            <a href="https://venue.example/join?vcode={vcode}">Venue</a>
        </div></td></tr>
        </table></body></html>"#
    )
}

fn profile_page_without_signature() -> String {
    r#"<html><body><table>
        <tr><td>Name:</td><td>poster</td></tr>
        <tr><td>Posts:</td><td>120</td></tr>
        <tr><td>Position:</td><td>Member</td></tr>
        <tr><td>Signature:</td><td></td></tr>
        </table></body></html>"#
        .to_string()
}

/// A listing page with explicit post times, rendered the way the forum
/// prints dates older than today.
fn dated_posts_page(posts: &[(u32, DateTime<Utc>)]) -> String {
    let rows: String = posts
        .iter()
        .map(|(msg, at)| {
            let stamp = at.format("%B %d, %Y, %I:%M:%S %p");
            format!(
                r#"<tr class="titlebg2"><td>#</td>
                   <td><a href="https://bitcointalk.org/index.php?topic=78.msg{msg}#msg{msg}">t</a></td>
                   <td>on: {stamp}</td></tr>
                   <tr><td class="windowbg2"><div class="post">a post long enough to count</div></td></tr>"#
            )
        })
        .collect();
    format!("<html><body><table>{rows}</table></body></html>")
}

fn posts_page(message_ids: &[u32]) -> String {
    let rows: String = message_ids
        .iter()
        .map(|msg| {
            format!(
                r#"<tr class="titlebg2"><td>#</td>
                   <td><a href="https://bitcointalk.org/index.php?topic=77.msg{msg}#msg{msg}">t</a></td>
                   <td>on: Today at 12:00:05 AM</td></tr>
                   <tr><td class="windowbg2"><div class="post">a post long enough to count</div></td></tr>"#
            )
        })
        .collect();
    format!("<html><body><table>{rows}</table></body></html>")
}

struct Fixture {
    ctx: TaskContext,
    signature_id: i64,
    site_id: i64,
    user_id: i64,
}

async fn fixture(pool: PgPool, server: &MockServer) -> Fixture {
    venue_db::seed_forums(&pool, &[site_config(&server.uri())])
        .await
        .expect("seed forums");
    let site = venue_db::get_forum_site_by_name(&pool, "bitcointalk.org")
        .await
        .expect("site lookup")
        .expect("seeded site");
    let signature_id: i64 = sqlx::query_scalar("SELECT id FROM signatures WHERE name = $1")
        .bind("Venue Member")
        .fetch_one(&pool)
        .await
        .expect("signature id");
    let user = venue_db::create_user_profile(&pool, "alice", true)
        .await
        .expect("create user");

    Fixture {
        ctx: TaskContext::new(pool, app_config()).expect("task context"),
        signature_id,
        site_id: site.id,
        user_id: user.id,
    }
}

/// Register a profile for `forum_user_id` and return its id and code.
async fn register(fx: &Fixture, server: &MockServer, forum_user_id: u32) -> (i64, String) {
    let url = format!("{}/index.php?action=profile;u={forum_user_id}", server.uri());
    let profile = create_forum_profile(
        &fx.ctx,
        &NewProfileRequest {
            user_profile_id: fx.user_id,
            forum_site_id: fx.site_id,
            profile_url: &url,
            signature_id: Some(fx.signature_id),
        },
    )
    .await
    .expect("create forum profile");
    let code = verification_code_for(&fx.ctx, &profile).expect("verification code");
    (profile.id, code)
}

async fn mount_profile(server: &MockServer, forum_user_id: u32, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .and(query_param("action", format!("profile;u={forum_user_id}")))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_posts(server: &MockServer, forum_user_id: u32, message_ids: &[u32]) {
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .and(query_param(
            "action",
            format!("profile;u={forum_user_id};sa=showPosts;start=0"),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(posts_page(message_ids)))
        .mount(server)
        .await;
}

async fn mount_listing_page(server: &MockServer, forum_user_id: u32, start: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .and(query_param(
            "action",
            format!("profile;u={forum_user_id};sa=showPosts;start={start}"),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Serve `profile` and `posts` for a profile, replacing whatever the forum
/// served before.
async fn serve(server: &MockServer, forum_user_id: u32, profile: String, posts: &[u32]) {
    server.reset().await;
    mount_profile(
        server,
        forum_user_id,
        ResponseTemplate::new(200).set_body_string(profile),
    )
    .await;
    mount_posts(server, forum_user_id, posts).await;
}

/// A verified profile whose first scrape recorded one post. Returns the
/// profile id, its verification code and the post id.
async fn tracked_post(fx: &Fixture, server: &MockServer, forum_user_id: u32) -> (i64, String, i64) {
    let (profile_id, code) = register(fx, server, forum_user_id).await;
    venue_db::mark_profile_verified(&fx.ctx.pool, profile_id, None, fx.signature_id, Utc::now())
        .await
        .expect("mark verified");
    serve(server, forum_user_id, profile_page(&code), &[forum_user_id * 10]).await;

    let outcome = scrape_forum_profile(&fx.ctx, profile_id)
        .await
        .expect("first scrape");
    assert_eq!(outcome.posts_created, 1);

    let posts = venue_db::list_posts_for_profile(&fx.ctx.pool, profile_id)
        .await
        .expect("posts");
    (profile_id, code, posts[0].id)
}

async fn set_last_scrape(pool: &PgPool, profile_id: i64, at: DateTime<Utc>) {
    sqlx::query("UPDATE forum_profiles SET last_scrape = $1 WHERE id = $2")
        .bind(at)
        .bind(profile_id)
        .execute(pool)
        .await
        .expect("set last_scrape");
}

async fn post(pool: &PgPool, profile_id: i64, post_id: i64) -> venue_db::ForumPostRow {
    venue_db::list_posts_for_profile(pool, profile_id)
        .await
        .expect("posts")
        .into_iter()
        .find(|p| p.id == post_id)
        .expect("tracked post")
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres DATABASE_URL"]
async fn verification_marks_the_profile_verified(pool: PgPool) {
    let server = MockServer::start().await;
    let fx = fixture(pool, &server).await;
    let (profile_id, code) = register(&fx, &server, 4101).await;
    mount_profile(
        &server,
        4101,
        ResponseTemplate::new(200).set_body_string(profile_page(&code)),
    )
    .await;

    let outcome = verify_profile_signature(&fx.ctx, profile_id, fx.signature_id)
        .await
        .expect("verify");

    assert!(outcome.verified, "{:?}", outcome.reason);
    assert_eq!(outcome.forum_username.as_deref(), Some("poster"));
    let profile = venue_db::get_forum_profile(&fx.ctx.pool, profile_id)
        .await
        .expect("profile");
    assert!(profile.verified && profile.active);
    assert_eq!(profile.forum_username.as_deref(), Some("poster"));
    assert!(profile.date_verified.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres DATABASE_URL"]
async fn code_for_another_profile_is_rejected(pool: PgPool) {
    let server = MockServer::start().await;
    let fx = fixture(pool, &server).await;
    let (profile_id, _) = register(&fx, &server, 4102).await;
    let (_, other_code) = register(&fx, &server, 4103).await;
    mount_profile(
        &server,
        4102,
        ResponseTemplate::new(200).set_body_string(profile_page(&other_code)),
    )
    .await;

    let outcome = verify_profile_signature(&fx.ctx, profile_id, fx.signature_id)
        .await
        .expect("verify");

    assert!(!outcome.verified);
    assert!(outcome.links_verified);
    assert!(!outcome.code_verified);
    assert!(outcome.reason.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres DATABASE_URL"]
async fn batch_survives_one_failed_profile(pool: PgPool) {
    let server = MockServer::start().await;
    let fx = fixture(pool, &server).await;

    let mut profile_ids = Vec::new();
    for (forum_user_id, posts) in [(11_u32, &[501_u32, 502][..]), (12, &[601][..])] {
        let (id, code) = register(&fx, &server, forum_user_id).await;
        mount_profile(
            &server,
            forum_user_id,
            ResponseTemplate::new(200).set_body_string(profile_page(&code)),
        )
        .await;
        mount_posts(&server, forum_user_id, posts).await;
        profile_ids.push(id);
    }
    let (broken_id, _) = register(&fx, &server, 13).await;
    mount_profile(&server, 13, ResponseTemplate::new(404)).await;

    for id in profile_ids.iter().chain([&broken_id]) {
        venue_db::mark_profile_verified(&fx.ctx.pool, *id, None, fx.signature_id, Utc::now())
            .await
            .expect("mark verified");
    }

    let report = run_data_update(&fx.ctx, None).await.expect("batch runs");

    assert!(!report.success);
    assert_eq!(report.profiles_total, 3);
    assert_eq!(report.profiles_failed, 1);
    assert_eq!(report.posts_created, 3);

    let posts = venue_db::list_posts_for_profile(&fx.ctx.pool, profile_ids[0])
        .await
        .expect("posts");
    assert_eq!(posts.len(), 2);
    assert!(posts
        .iter()
        .all(|p| p.total_points == Decimal::new(10_000, 2) && p.monitoring));

    let errors = venue_db::list_open_scraping_errors(&fx.ctx.pool, Some(report.task_id))
        .await
        .expect("errors");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].forum_profile_id, broken_id);
    assert_eq!(errors[0].error_kind, "profile_not_found");

    let task = venue_db::get_data_update_task(&fx.ctx.pool, report.task_id)
        .await
        .expect("task row");
    assert_eq!(task.stage, "DONE");
    assert_eq!(task.success, Some(false));

    let ranking = report.ranking.expect("ranking stage ran");
    assert_eq!(ranking.ranked.len(), 1);
    assert_eq!(ranking.ranked[0].user_id, fx.user_id);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres DATABASE_URL"]
async fn scrapes_accrue_valid_and_invalid_signature_minutes(pool: PgPool) {
    let server = MockServer::start().await;
    let fx = fixture(pool, &server).await;
    let (profile_id, _, post_id) = tracked_post(&fx, &server, 21).await;

    let created = post(&fx.ctx.pool, profile_id, post_id).await;
    assert_eq!(created.valid_sig_minutes, 0);
    assert_eq!(created.invalid_sig_minutes, 0);

    set_last_scrape(&fx.ctx.pool, profile_id, Utc::now() - Duration::minutes(30)).await;
    let outcome = scrape_forum_profile(&fx.ctx, profile_id).await.expect("scrape");
    assert!(outcome.signature_found);
    assert_eq!(post(&fx.ctx.pool, profile_id, post_id).await.valid_sig_minutes, 30);

    serve(&server, 21, profile_page_without_signature(), &[210]).await;
    set_last_scrape(&fx.ctx.pool, profile_id, Utc::now() - Duration::minutes(20)).await;
    let outcome = scrape_forum_profile(&fx.ctx, profile_id).await.expect("scrape");
    assert!(!outcome.signature_found);

    let tracked = post(&fx.ctx.pool, profile_id, post_id).await;
    assert_eq!(tracked.valid_sig_minutes, 30);
    assert_eq!(tracked.invalid_sig_minutes, 20);
    assert!(tracked.monitoring);
    assert!(tracked.last_checked.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres DATABASE_URL"]
async fn maturation_freezes_signature_counters(pool: PgPool) {
    let server = MockServer::start().await;
    let fx = fixture(pool, &server).await;
    let (profile_id, _, post_id) = tracked_post(&fx, &server, 22).await;

    sqlx::query("UPDATE forum_posts SET posted_at = $1 WHERE id = $2")
        .bind(Utc::now() - Duration::hours(25))
        .bind(post_id)
        .execute(&fx.ctx.pool)
        .await
        .expect("age post");

    set_last_scrape(&fx.ctx.pool, profile_id, Utc::now() - Duration::minutes(30)).await;
    let outcome = scrape_forum_profile(&fx.ctx, profile_id).await.expect("scrape");
    assert_eq!(outcome.posts_matured, 1);

    let matured = post(&fx.ctx.pool, profile_id, post_id).await;
    assert!(matured.matured);
    assert!(matured.date_matured.is_some());
    assert_eq!(matured.valid_sig_minutes, 0);

    set_last_scrape(&fx.ctx.pool, profile_id, Utc::now() - Duration::minutes(45)).await;
    let outcome = scrape_forum_profile(&fx.ctx, profile_id).await.expect("scrape");
    assert_eq!(outcome.posts_matured, 0);

    let frozen = post(&fx.ctx.pool, profile_id, post_id).await;
    assert_eq!(frozen.valid_sig_minutes, 0);
    assert_eq!(frozen.invalid_sig_minutes, 0);
    assert_eq!(frozen.date_matured, matured.date_matured);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres DATABASE_URL"]
async fn points_stage_credits_matured_posts(pool: PgPool) {
    let server = MockServer::start().await;
    let fx = fixture(pool, &server).await;
    let (profile_id, _, post_id) = tracked_post(&fx, &server, 23).await;

    let report = run_data_update(&fx.ctx, None).await.expect("batch runs");
    assert_eq!(report.points.credited, 0);
    assert!(!post(&fx.ctx.pool, profile_id, post_id).await.credited);

    sqlx::query("UPDATE forum_posts SET posted_at = $1 WHERE id = $2")
        .bind(Utc::now() - Duration::hours(25))
        .bind(post_id)
        .execute(&fx.ctx.pool)
        .await
        .expect("age post");

    let report = run_data_update(&fx.ctx, None).await.expect("batch runs");
    assert!(report.success);
    assert_eq!(report.points.credited, 1);

    let credited = post(&fx.ctx.pool, profile_id, post_id).await;
    assert!(credited.matured && credited.credited && credited.monitoring);

    let ranking = report.ranking.expect("ranking stage ran");
    assert_eq!(ranking.ranked.len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres DATABASE_URL"]
async fn downtime_past_the_uptime_threshold_drops_the_post(pool: PgPool) {
    let server = MockServer::start().await;
    let fx = fixture(pool, &server).await;
    let (profile_id, _, post_id) = tracked_post(&fx, &server, 24).await;

    // 90% uptime over a 24h window tolerates 144 missing minutes.
    serve(&server, 24, profile_page_without_signature(), &[240]).await;
    set_last_scrape(&fx.ctx.pool, profile_id, Utc::now() - Duration::minutes(150)).await;
    scrape_forum_profile(&fx.ctx, profile_id).await.expect("scrape");

    let summary = compute_points(&fx.ctx).await.expect("points");
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.credited, 0);

    let dropped = post(&fx.ctx.pool, profile_id, post_id).await;
    assert_eq!(dropped.invalid_sig_minutes, 150);
    assert!(!dropped.monitoring && !dropped.credited);

    // Dropped posts stop accruing.
    set_last_scrape(&fx.ctx.pool, profile_id, Utc::now() - Duration::minutes(10)).await;
    scrape_forum_profile(&fx.ctx, profile_id).await.expect("scrape");
    assert_eq!(post(&fx.ctx.pool, profile_id, post_id).await.invalid_sig_minutes, 150);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres DATABASE_URL"]
async fn rank_change_applies_to_new_posts_and_points_stay_fixed(pool: PgPool) {
    let server = MockServer::start().await;
    let fx = fixture(pool, &server).await;
    let (profile_id, code, first_post) = tracked_post(&fx, &server, 25).await;

    let member = venue_db::find_rank_by_name(&fx.ctx.pool, fx.site_id, "Member")
        .await
        .expect("rank lookup")
        .expect("Member rank");
    let full_member = venue_db::find_rank_by_name(&fx.ctx.pool, fx.site_id, "Full Member")
        .await
        .expect("rank lookup")
        .expect("Full Member rank");

    let profile = venue_db::get_forum_profile(&fx.ctx.pool, profile_id)
        .await
        .expect("profile");
    assert_eq!(profile.forum_rank_id, Some(member.id));
    let recorded = post(&fx.ctx.pool, profile_id, first_post).await;
    assert_eq!(recorded.forum_rank_id, Some(member.id));
    assert_eq!(recorded.total_points, Decimal::from(100));

    serve(&server, 25, profile_page_as(&code, "Full Member"), &[250, 251]).await;
    let outcome = scrape_forum_profile(&fx.ctx, profile_id).await.expect("scrape");
    assert_eq!(outcome.posts_created, 1);

    let profile = venue_db::get_forum_profile(&fx.ctx.pool, profile_id)
        .await
        .expect("profile");
    assert_eq!(profile.forum_rank_id, Some(full_member.id));

    let promoted = venue_db::list_posts_for_profile(&fx.ctx.pool, profile_id)
        .await
        .expect("posts")
        .into_iter()
        .find(|p| p.message_id == "251")
        .expect("post recorded after promotion");
    assert_eq!(promoted.forum_rank_id, Some(full_member.id));
    assert_eq!(promoted.influence_bonus_pct, Decimal::from(5));
    assert_eq!(promoted.total_points, Decimal::from(105));

    sqlx::query("UPDATE forum_user_ranks SET bonus_percentage = 50 WHERE id = $1")
        .bind(full_member.id)
        .execute(&fx.ctx.pool)
        .await
        .expect("raise bonus");
    run_data_update(&fx.ctx, None).await.expect("batch runs");

    assert_eq!(post(&fx.ctx.pool, profile_id, first_post).await.total_points, Decimal::from(100));
    assert_eq!(post(&fx.ctx.pool, profile_id, promoted.id).await.total_points, Decimal::from(105));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres DATABASE_URL"]
async fn failed_profile_fetch_is_recorded_in_page_status(pool: PgPool) {
    let server = MockServer::start().await;
    let fx = fixture(pool, &server).await;
    let (profile_id, _, _) = tracked_post(&fx, &server, 26).await;

    server.reset().await;
    mount_profile(&server, 26, ResponseTemplate::new(404)).await;
    let err = scrape_forum_profile(&fx.ctx, profile_id)
        .await
        .expect_err("profile is gone");
    assert_eq!(err.kind(), "profile_not_found");

    let profile = venue_db::get_forum_profile(&fx.ctx.pool, profile_id)
        .await
        .expect("profile");
    let history = &profile.last_page_status.0;
    assert_eq!(history.len(), 2);
    assert!(history[0].page_ok && history[0].signature_found);
    assert_eq!(history[1].status_code, 404);
    assert!(!history[1].page_ok && !history[1].signature_found);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres DATABASE_URL"]
async fn capped_listing_keeps_posts_past_its_last_page(pool: PgPool) {
    let server = MockServer::start().await;
    let fx = fixture(pool, &server).await;
    let (profile_id, code) = register(&fx, &server, 27).await;
    let now = Utc::now();
    venue_db::mark_profile_verified(&fx.ctx.pool, profile_id, None, fx.signature_id, now)
        .await
        .expect("mark verified");

    mount_profile(
        &server,
        27,
        ResponseTemplate::new(200).set_body_string(profile_page(&code)),
    )
    .await;
    mount_listing_page(&server, 27, 0, dated_posts_page(&[(900, now - Duration::hours(3))])).await;
    scrape_forum_profile(&fx.ctx, profile_id).await.expect("first scrape");
    let older = venue_db::list_posts_for_profile(&fx.ctx.pool, profile_id)
        .await
        .expect("posts")
        .remove(0);

    // A burst of newer posts fills every page the scraper reads, pushing the
    // older post beyond the last page fetched.
    server.reset().await;
    mount_profile(
        &server,
        27,
        ResponseTemplate::new(200).set_body_string(profile_page(&code)),
    )
    .await;
    for page in 0..venue_scraper::MAX_POST_PAGES {
        let rows: Vec<(u32, DateTime<Utc>)> = (0..20)
            .map(|i| (1000 + page * 20 + i, now - Duration::hours(1)))
            .collect();
        mount_listing_page(&server, 27, page * 20, dated_posts_page(&rows)).await;
    }

    let outcome = scrape_forum_profile(&fx.ctx, profile_id).await.expect("scrape");
    assert_eq!(outcome.posts_created, venue_scraper::MAX_POST_PAGES * 20);
    assert_eq!(outcome.posts_dropped, 0);
    assert!(post(&fx.ctx.pool, profile_id, older.id).await.monitoring);
}
