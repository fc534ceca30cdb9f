use rust_decimal::Decimal;
use sqlx::PgPool;
use venue_core::ForumSiteConfig;

use crate::DbError;

/// Upsert forum sites from config, including their ranks, signatures and
/// which ranks each signature is offered to.
///
/// Returns the number of sites processed (inserted or updated).
/// All upserts run inside a single transaction; if any operation fails
/// the entire batch is rolled back. Ranks and signatures missing from the
/// file are left in place so existing profiles keep their references.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_forums(pool: &PgPool, sites: &[ForumSiteConfig]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;

    for site in sites {
        let site_id: i64 = sqlx::query_scalar(
            "INSERT INTO forum_sites (name, address, scraper_name) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO UPDATE SET \
                 address = EXCLUDED.address, \
                 scraper_name = EXCLUDED.scraper_name, \
                 updated_at = NOW() \
             RETURNING id",
        )
        .bind(&site.name)
        .bind(&site.address)
        .bind(site.scraper.as_str())
        .fetch_one(&mut *tx)
        .await?;

        for rank in &site.ranks {
            sqlx::query(
                "INSERT INTO forum_user_ranks (forum_site_id, name, allowed, bonus_percentage) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (forum_site_id, name) DO UPDATE SET \
                     allowed = EXCLUDED.allowed, \
                     bonus_percentage = EXCLUDED.bonus_percentage, \
                     updated_at = NOW()",
            )
            .bind(site_id)
            .bind(&rank.name)
            .bind(rank.allowed)
            .bind(Decimal::from(rank.bonus_percentage))
            .execute(&mut *tx)
            .await?;
        }

        for signature in &site.signatures {
            let signature_id: i64 = sqlx::query_scalar(
                "INSERT INTO signatures (forum_site_id, name, code, test_signature, active) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (forum_site_id, name) DO UPDATE SET \
                     code = EXCLUDED.code, \
                     test_signature = EXCLUDED.test_signature, \
                     active = EXCLUDED.active, \
                     updated_at = NOW() \
                 RETURNING id",
            )
            .bind(site_id)
            .bind(&signature.name)
            .bind(&signature.code)
            .bind(&signature.test_signature)
            .bind(signature.active)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM signature_user_ranks WHERE signature_id = $1")
                .bind(signature_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "INSERT INTO signature_user_ranks (signature_id, forum_user_rank_id) \
                 SELECT $1, id FROM forum_user_ranks \
                 WHERE forum_site_id = $2 AND name = ANY($3)",
            )
            .bind(signature_id)
            .bind(site_id)
            .bind(&signature.ranks)
            .execute(&mut *tx)
            .await?;
        }

        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}
