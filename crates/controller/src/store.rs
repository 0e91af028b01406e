//! Persistence of room configs across restarts.
//!
//! One row per room, keyed by `"veg"` / `"flower"`. Every setting column is
//! nullable: a missing or unusable value falls back to the compiled-in
//! default for that field alone.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Mutex;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use time::OffsetDateTime;
use tracing::warn;

use crate::config::{RoomConfig, HUMIDITY_RANGE, SOIL_RANGE, TEMP_RANGE};
use crate::room::RoomId;

pub trait ConfigStore {
    /// Stored config for `room`, with `defaults` filling any gaps.
    fn load(
        &self,
        room: RoomId,
        defaults: &RoomConfig,
    ) -> impl Future<Output = Result<RoomConfig>> + Send;

    fn save(&self, room: RoomId, cfg: &RoomConfig) -> impl Future<Output = Result<()>> + Send;
}

/// Load `room`, logging any failure and starting from defaults instead.
pub async fn load_or_default<S: ConfigStore>(store: &S, room: RoomId) -> RoomConfig {
    let defaults = RoomConfig::defaults_for(room);
    match store.load(room, &defaults).await {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(room = %room, error = %format!("{e:#}"), "config load failed, using defaults");
            defaults
        }
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// db_url examples:
    /// - "sqlite:/home/pi/grow/grow.db"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal);

        // Each connection to an in-memory database gets its own copy.
        let max_connections = if db_url.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }
}

impl ConfigStore for SqliteStore {
    async fn load(&self, room: RoomId, defaults: &RoomConfig) -> Result<RoomConfig> {
        let row = sqlx::query(
            r#"
            SELECT name, ideal_temp, ideal_humidity, ideal_soil,
                   temp_threshold, humidity_threshold, soil_threshold,
                   light_on_min, light_off_min
            FROM room_config
            WHERE room_id = ?
            "#,
        )
        .bind(room.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load config for room '{room}'"))?;

        match row {
            Some(row) => merge_row(room, &row, defaults),
            None => Ok(defaults.clone()),
        }
    }

    async fn save(&self, room: RoomId, cfg: &RoomConfig) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        sqlx::query(
            r#"
            INSERT INTO room_config (
              room_id, name,
              ideal_temp, ideal_humidity, ideal_soil,
              temp_threshold, humidity_threshold, soil_threshold,
              light_on_min, light_off_min,
              updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(room_id) DO UPDATE SET
              name=excluded.name,
              ideal_temp=excluded.ideal_temp,
              ideal_humidity=excluded.ideal_humidity,
              ideal_soil=excluded.ideal_soil,
              temp_threshold=excluded.temp_threshold,
              humidity_threshold=excluded.humidity_threshold,
              soil_threshold=excluded.soil_threshold,
              light_on_min=excluded.light_on_min,
              light_off_min=excluded.light_off_min,
              updated_at=excluded.updated_at
            "#,
        )
        .bind(room.as_str())
        .bind(&cfg.name)
        .bind(cfg.ideal_temp as f64)
        .bind(cfg.ideal_humidity as f64)
        .bind(cfg.ideal_soil as i64)
        .bind(cfg.temp_threshold as f64)
        .bind(cfg.humidity_threshold as f64)
        .bind(cfg.soil_threshold as i64)
        .bind(cfg.light_on_min as i64)
        .bind(cfg.light_off_min as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save config for room '{room}'"))?;
        Ok(())
    }
}

/// Build a config from a stored row, field by field.
fn merge_row(room: RoomId, row: &SqliteRow, defaults: &RoomConfig) -> Result<RoomConfig> {
    let real = |col: &str| -> Result<Option<f64>> {
        row.try_get::<Option<f64>, _>(col)
            .with_context(|| format!("room '{room}': bad column {col}"))
    };
    let int = |col: &str| -> Result<Option<i64>> {
        row.try_get::<Option<i64>, _>(col)
            .with_context(|| format!("room '{room}': bad column {col}"))
    };

    // Any stored name is kept as written, blank included.
    let name = row
        .try_get::<Option<String>, _>("name")
        .with_context(|| format!("room '{room}': bad column name"))?
        .unwrap_or_else(|| defaults.name.clone());

    let mut cfg = RoomConfig {
        name,
        ideal_temp: pick(room, "ideal_temp", real("ideal_temp")?.map(|v| v as f32), defaults.ideal_temp, |v| {
            TEMP_RANGE.contains(v)
        }),
        ideal_humidity: pick(
            room,
            "ideal_humidity",
            real("ideal_humidity")?.map(|v| v as f32),
            defaults.ideal_humidity,
            |v| HUMIDITY_RANGE.contains(v),
        ),
        ideal_soil: pick(
            room,
            "ideal_soil",
            int("ideal_soil")?.and_then(|v| i32::try_from(v).ok()),
            defaults.ideal_soil,
            |v| SOIL_RANGE.contains(v),
        ),
        temp_threshold: pick(
            room,
            "temp_threshold",
            real("temp_threshold")?.map(|v| v as f32),
            defaults.temp_threshold,
            |v| v.is_finite() && *v >= 0.0,
        ),
        humidity_threshold: pick(
            room,
            "humidity_threshold",
            real("humidity_threshold")?.map(|v| v as f32),
            defaults.humidity_threshold,
            |v| v.is_finite() && *v >= 0.0,
        ),
        soil_threshold: pick(
            room,
            "soil_threshold",
            int("soil_threshold")?.and_then(|v| i32::try_from(v).ok()),
            defaults.soil_threshold,
            |v| *v >= 0,
        ),
        light_on_min: pick(
            room,
            "light_on_min",
            int("light_on_min")?.and_then(|v| u32::try_from(v).ok()),
            defaults.light_on_min,
            |_| true,
        ),
        light_off_min: pick(
            room,
            "light_off_min",
            int("light_off_min")?.and_then(|v| u32::try_from(v).ok()),
            defaults.light_off_min,
            |_| true,
        ),
    };

    // The two light fields only make sense together.
    if cfg.validate().is_err() {
        warn!(room = %room, "stored light cycle unusable, using default cycle");
        cfg.light_on_min = defaults.light_on_min;
        cfg.light_off_min = defaults.light_off_min;
    }
    cfg.validate()
        .with_context(|| format!("stored config for room '{room}' is invalid"))?;
    Ok(cfg)
}

fn pick<T: Copy + std::fmt::Debug>(
    room: RoomId,
    field: &str,
    stored: Option<T>,
    default: T,
    ok: impl Fn(&T) -> bool,
) -> T {
    match stored {
        Some(v) if ok(&v) => v,
        Some(v) => {
            warn!(room = %room, field, value = ?v, "stored value out of range, using default");
            default
        }
        None => default,
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    rooms: Mutex<HashMap<RoomId, RoomConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    async fn load(&self, room: RoomId, defaults: &RoomConfig) -> Result<RoomConfig> {
        let rooms = self
            .rooms
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        Ok(rooms.get(&room).cloned().unwrap_or_else(|| defaults.clone()))
    }

    async fn save(&self, room: RoomId, cfg: &RoomConfig) -> Result<()> {
        let mut rooms = self
            .rooms
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        rooms.insert(room, cfg.clone());
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
