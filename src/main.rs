use std::sync::Arc;

use anyhow::Context as _;
use log::info;
use serde::Deserialize;
use sqlx::sqlite::SqlitePoolOptions;

mod dearrow;
mod discord;

/// Compiles a regex once and hands out a `&'static Regex`.
#[macro_export]
macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
        RE.get_or_init(|| regex::Regex::new($re).unwrap())
    }};
}

#[derive(Debug, Deserialize)]
struct DatabaseConfig {
    #[serde(default = "DatabaseConfig::default_path")]
    path: String,
}

impl DatabaseConfig {
    fn default_path() -> String {
        "db.db".to_string()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Config {
    discord: discord::Config,
    #[serde(default)]
    dearrow: dearrow::Config,
    #[serde(default)]
    database: DatabaseConfig,
}

fn load_config() -> anyhow::Result<Config> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {path}"))?;

    toml::from_str(&config).with_context(|| format!("Failed to parse config file {path}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let config = load_config()?;

    let db_pool = SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", config.database.path))
        .await
        .context("Failed to open database")?;

    // run DB migration
    sqlx::migrate!()
        .run(&db_pool)
        .await
        .context("Failed to migrate database")?;

    let (stop_sender, stop_signal) = tokio::sync::broadcast::channel(1);

    let tracker = Arc::new(dearrow::tracker::ReplyTracker::new());
    let eviction =
        tracker.spawn_eviction(dearrow::tracker::EVICTION_PERIOD, stop_sender.subscribe());

    let sub_applications: Vec<Box<dyn discord::SubApplication + Send + Sync>> = vec![Box::new(
        dearrow::DiscordHandler::new(db_pool, &config, tracker)?,
    )];

    // stop the bot when SIGINT occurred.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Could not register ctrl+c handler - {e:?}");
            return;
        }
        info!("SIGINT received");
        let _ = stop_sender.send(());
    });

    discord::start(&config, sub_applications, stop_signal).await?;
    eviction.await?;

    Ok(())
}
