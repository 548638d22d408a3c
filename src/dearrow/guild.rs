use std::fmt;

use anyhow::Context as _;
use serenity::model::id::GuildId;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThumbnailMode {
    #[default]
    RandomTime,
    Blank,
    Original,
}

impl ThumbnailMode {
    pub const ALL: [Self; 3] = [Self::RandomTime, Self::Blank, Self::Original];

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::RandomTime),
            1 => Some(Self::Blank),
            2 => Some(Self::Original),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Self::RandomTime => 0,
            Self::Blank => 1,
            Self::Original => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::RandomTime => "Show a screenshot from a random time",
            Self::Blank => "Show no thumbnail",
            Self::Original => "Show the original thumbnail",
        }
    }
}

impl fmt::Display for ThumbnailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a replaced title is captioned with the original one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OriginalTitleMode {
    #[default]
    Shown,
    Hidden,
}

impl OriginalTitleMode {
    pub const ALL: [Self; 2] = [Self::Shown, Self::Hidden];

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Shown),
            1 => Some(Self::Hidden),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Self::Shown => 0,
            Self::Hidden => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Shown => "Show original titles",
            Self::Hidden => "Hide original titles",
        }
    }
}

impl fmt::Display for OriginalTitleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuildConfig {
    pub thumbnail_mode: ThumbnailMode,
    pub title_mode: OriginalTitleMode,
}

/// Per guild settings stored in the `guild_config` table.
#[derive(Clone)]
pub struct GuildSettings {
    db_pool: SqlitePool,
}

impl GuildSettings {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub async fn get(&self, guild_id: GuildId) -> anyhow::Result<GuildConfig> {
        let guild_id = *guild_id.as_u64() as i64;
        let row = sqlx::query(
            "SELECT `thumbnail_mode`, `title_mode` FROM `guild_config` WHERE `guild_id` = ?",
        )
        .bind(guild_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to query guild config")?;

        Ok(row
            .map(|row| GuildConfig {
                thumbnail_mode: ThumbnailMode::from_i64(row.get(0)).unwrap_or_default(),
                title_mode: OriginalTitleMode::from_i64(row.get(1)).unwrap_or_default(),
            })
            .unwrap_or_default())
    }

    pub async fn set_thumbnail_mode(
        &self,
        guild_id: GuildId,
        mode: ThumbnailMode,
    ) -> anyhow::Result<()> {
        let guild_id = *guild_id.as_u64() as i64;
        sqlx::query(
            "INSERT INTO `guild_config` (`guild_id`, `thumbnail_mode`) VALUES (?, ?)
            ON CONFLICT (`guild_id`) DO UPDATE
            SET `thumbnail_mode` = `excluded`.`thumbnail_mode`",
        )
        .bind(guild_id)
        .bind(mode.as_i64())
        .execute(&self.db_pool)
        .await
        .context("Failed to store thumbnail mode")?;

        Ok(())
    }

    pub async fn set_title_mode(
        &self,
        guild_id: GuildId,
        mode: OriginalTitleMode,
    ) -> anyhow::Result<()> {
        let guild_id = *guild_id.as_u64() as i64;
        sqlx::query(
            "INSERT INTO `guild_config` (`guild_id`, `title_mode`) VALUES (?, ?)
            ON CONFLICT (`guild_id`) DO UPDATE
            SET `title_mode` = `excluded`.`title_mode`",
        )
        .bind(guild_id)
        .bind(mode.as_i64())
        .execute(&self.db_pool)
        .await
        .context("Failed to store title mode")?;

        Ok(())
    }
}
