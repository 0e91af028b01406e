use anyhow::{Context, Result};
use std::{env, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use grow_controller::clock::MonotonicClock;
use grow_controller::config::{self, Config};
use grow_controller::console::{Console, ConsoleExit};
use grow_controller::control::{self, ControlCmd, Controller};
use grow_controller::room::{RoomController, RoomId, ZoneId};
use grow_controller::sampler::SensorHub;
use grow_controller::state::{ControllerState, SharedState};
use grow_controller::store::{self, SqliteStore};
use grow_sensors::{ClimateProbe, SoilProbe};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let db_url = env::var("DB_URL").unwrap_or_else(|_| "sqlite:grow.db?mode=rwc".to_string());

    let cfg = config::load_or_default(&config_path)?;

    // ── Database ────────────────────────────────────────────────────
    let db = SqliteStore::connect(&db_url).await?;
    db.migrate().await?;

    // ── Rooms (setpoints from the DB, wiring from the file) ─────────
    let mut rooms = Vec::with_capacity(RoomId::ALL.len());
    for id in RoomId::ALL {
        let room_cfg = store::load_or_default(&db, id).await;
        info!(
            room = %id,
            temp = room_cfg.ideal_temp,
            humidity = room_cfg.ideal_humidity,
            soil = room_cfg.ideal_soil,
            "room config loaded"
        );
        rooms.push(
            RoomController::build(id, &cfg, room_cfg)
                .with_context(|| format!("failed to set up room {id}"))?,
        );
    }

    let channels = ZoneId::ALL
        .iter()
        .map(|&z| (z, cfg.soil_channels(z)))
        .collect();

    let state = ControllerState::shared();
    state
        .write()
        .await
        .record_system("controller started".to_string());

    // ── Sensors ─────────────────────────────────────────────────────
    #[cfg(feature = "hw-sensors")]
    {
        let soil = grow_sensors::adc::Ads1115::new()?;
        let climate = grow_sensors::aht::Aht20::new(cfg.climate.addr)?;
        let hub = SensorHub::new(soil, climate, channels);
        return serve(&cfg, rooms, hub, state, db).await;
    }

    #[cfg(not(feature = "hw-sensors"))]
    {
        use grow_sensors::sim::{Scenario, SimulatedClimate, SimulatedSoil};

        let scenario = match env::var("SIM_SCENARIO") {
            Ok(name) => name.parse().unwrap_or_else(|e| {
                warn!(error = %format!("{e:#}"), "falling back to drying scenario");
                Scenario::Drying
            }),
            Err(_) => Scenario::Drying,
        };
        warn!(%scenario, "running on simulated sensors");
        let soil = SimulatedSoil::new(scenario, 1200.0, 2800.0);
        let climate = SimulatedClimate::new(25.0, 58.0);
        let hub = SensorHub::new(soil, climate, channels);
        return serve(&cfg, rooms, hub, state, db).await;
    }
}

/// Start the control task, hand stdin to the console, and shut down on
/// `reboot` or Ctrl-C.
async fn serve<S, C>(
    cfg: &Config,
    rooms: Vec<RoomController>,
    sensors: SensorHub<S, C>,
    state: SharedState,
    db: SqliteStore,
) -> Result<()>
where
    S: SoilProbe + Send + 'static,
    C: ClimateProbe + Send + 'static,
{
    let controller = Controller::new(rooms, sensors, state.clone(), cfg.timing.summary_every_ticks);
    let tick = Duration::from_millis(cfg.timing.tick_ms);
    let (tx, handle) = control::spawn(controller, MonotonicClock::new(), tick)?;

    let console = Console::new(tx.clone(), state, db);
    tokio::select! {
        exit = console.run() => match exit? {
            ConsoleExit::Reboot => info!("reboot requested from console"),
            ConsoleExit::Eof => {
                info!("no console attached; waiting for Ctrl-C");
                tokio::signal::ctrl_c().await.context("failed to wait for Ctrl-C")?;
            }
        },
        res = tokio::signal::ctrl_c() => {
            res.context("failed to wait for Ctrl-C")?;
            info!("Ctrl-C received");
        }
    }

    if tx.send(ControlCmd::Shutdown).await.is_err() {
        warn!("control task already gone");
    }
    handle.await.context("control task panicked")?;
    Ok(())
}
