//! Forum profile command handlers.
//!
//! Each handler drives one task from `venue-tasks` and prints its outcome as
//! JSON so the result can be piped into other tooling.

use clap::Subcommand;
use serde::Serialize;
use venue_tasks::{
    check_profile, create_forum_profile, signature_code_for, verification_code_for,
    verify_profile_signature, NewProfileRequest, TaskContext,
};

/// Sub-commands available under `profile`.
#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    /// Register a forum account for a user and print its verification code
    Create {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        site_id: i64,
        /// Profile page URL on the forum
        #[arg(long)]
        url: String,
        #[arg(long)]
        signature_id: Option<i64>,
    },
    /// Look up a forum account before registering it
    Check {
        #[arg(long)]
        site_id: i64,
        #[arg(long)]
        url: String,
        /// User asking, to tell their own registrations apart
        #[arg(long)]
        user_id: i64,
    },
    /// Scrape a profile and verify its signature
    Verify {
        #[arg(long)]
        profile_id: i64,
        #[arg(long)]
        signature_id: i64,
    },
    /// Print the signature text to paste into the forum profile
    SignatureCode {
        #[arg(long)]
        profile_id: i64,
        #[arg(long)]
        signature_id: i64,
    },
}

pub(crate) async fn run_profile_command(
    ctx: &TaskContext,
    command: ProfileCommands,
) -> anyhow::Result<()> {
    match command {
        ProfileCommands::Create {
            user_id,
            site_id,
            url,
            signature_id,
        } => {
            let profile = create_forum_profile(
                ctx,
                &NewProfileRequest {
                    user_profile_id: user_id,
                    forum_site_id: site_id,
                    profile_url: &url,
                    signature_id,
                },
            )
            .await?;
            let code = verification_code_for(ctx, &profile)?;
            println!(
                "created forum profile {} for forum user {} (verification code {code})",
                profile.id, profile.forum_user_id
            );
        }
        ProfileCommands::Check {
            site_id,
            url,
            user_id,
        } => print_json(&check_profile(ctx, site_id, &url, user_id).await?)?,
        ProfileCommands::Verify {
            profile_id,
            signature_id,
        } => {
            let outcome = verify_profile_signature(ctx, profile_id, signature_id).await?;
            print_json(&outcome)?;
            if !outcome.verified {
                tracing::warn!(
                    forum_profile_id = profile_id,
                    reason = outcome.reason.as_deref().unwrap_or("unknown"),
                    "signature not verified"
                );
            }
        }
        ProfileCommands::SignatureCode {
            profile_id,
            signature_id,
        } => println!("{}", signature_code_for(ctx, profile_id, signature_id).await?),
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
