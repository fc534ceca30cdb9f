mod profile;
mod update;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use venue_core::{AppConfig, VerificationCodec};
use venue_tasks::TaskContext;

#[derive(Debug, Parser)]
#[command(name = "venue-cli")]
#[command(about = "Venue forum signature campaign operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Register a campaign participant
    CreateUser {
        #[arg(long)]
        username: String,
        /// Mark the user's email as confirmed so they can be ranked
        #[arg(long)]
        email_confirmed: bool,
    },
    /// Forum profile operations
    Profile {
        #[command(subcommand)]
        command: profile::ProfileCommands,
    },
    /// Run one data update batch now
    Update {
        /// Limit the batch to a single forum profile
        #[arg(long)]
        profile_id: Option<i64>,
    },
    /// Recompute rankings and print the leaderboard
    Rank {
        /// Maximum number of users to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show recent data update batches
    Tasks {
        #[arg(long, default_value = "10")]
        limit: i64,
    },
    /// Encode or decode verification codes
    Vcode {
        #[command(subcommand)]
        command: VcodeCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Upsert forum sites, ranks and signatures from the forums file
    Seed,
}

#[derive(Debug, Subcommand)]
enum VcodeCommands {
    Encode {
        #[arg(long)]
        profile_id: u64,
        #[arg(long)]
        forum_user_id: u64,
    },
    Decode { code: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("venue-cli ready; run with --help to list commands");
        return Ok(());
    };

    let config = venue_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Commands::Vcode { command } = &command {
        run_vcode(&config, command);
        return Ok(());
    }

    let pool_config = venue_db::PoolConfig::from_app_config(&config);
    let pool = venue_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => run_db(&pool, &config, &command).await?,
        Commands::CreateUser {
            username,
            email_confirmed,
        } => {
            let user = venue_db::create_user_profile(&pool, &username, email_confirmed).await?;
            println!("created user {} (id {})", user.username, user.id);
        }
        Commands::Profile { command } => {
            let ctx = TaskContext::new(pool, config)?;
            profile::run_profile_command(&ctx, command).await?;
        }
        Commands::Update { profile_id } => {
            let ctx = TaskContext::new(pool, config)?;
            update::run_update(&ctx, profile_id).await?;
        }
        Commands::Rank { limit } => update::run_rank(&pool, &config, limit).await?,
        Commands::Tasks { limit } => update::run_tasks(&pool, limit).await?,
        Commands::Vcode { .. } => {}
    }

    Ok(())
}

async fn run_db(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: &DbCommands,
) -> anyhow::Result<()> {
    match command {
        DbCommands::Ping => {
            venue_db::health_check(pool).await?;
            println!("database ok");
        }
        DbCommands::Migrate => {
            let applied = venue_db::run_migrations(pool).await?;
            println!("applied {applied} migration(s)");
        }
        DbCommands::Seed => {
            let forums = venue_core::load_forums(&config.forums_path)?;
            let seeded = venue_db::seed_forums(pool, &forums.sites).await?;
            println!(
                "seeded {seeded} forum site(s) from {}",
                config.forums_path.display()
            );
        }
    }
    Ok(())
}

fn run_vcode(config: &AppConfig, command: &VcodeCommands) {
    let codec = VerificationCodec::for_profiles(&config.secret_key);
    match command {
        VcodeCommands::Encode {
            profile_id,
            forum_user_id,
        } => println!("{}", codec.encode_profile(*profile_id, *forum_user_id)),
        VcodeCommands::Decode { code } => match codec.decode(code) {
            Some(numbers) => {
                let rendered: Vec<String> = numbers.iter().map(u64::to_string).collect();
                println!("{}", rendered.join(" "));
            }
            None => println!("invalid verification code"),
        },
    }
}
