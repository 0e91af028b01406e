//! The control task: sole owner of every room.
//!
//! Ticks on a fixed interval. Between ticks it serves commands arriving on
//! an mpsc channel, so a config change never lands halfway through a tick.

use std::time::Duration;

use anyhow::Result;
use grow_sensors::{ClimateProbe, SoilProbe};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use crate::clock::{Millis, MonotonicClock};
use crate::command::SetCommand;
use crate::config::RoomConfig;
use crate::room::{RoomController, RoomId};
use crate::sampler::SensorHub;
use crate::state::SharedState;

pub enum ControlCmd {
    /// Apply a parsed `set`; replies with the room's new config or the
    /// reason it was refused.
    Set {
        cmd: SetCommand,
        reply: oneshot::Sender<Result<RoomConfig, String>>,
    },
    /// Current config of every room.
    Configs {
        reply: oneshot::Sender<Vec<(RoomId, RoomConfig)>>,
    },
    Shutdown,
}

pub struct Controller<S, C> {
    rooms: Vec<RoomController>,
    sensors: SensorHub<S, C>,
    state: SharedState,
    summary_every: u32,
}

impl<S: SoilProbe, C: ClimateProbe> Controller<S, C> {
    pub fn new(
        rooms: Vec<RoomController>,
        sensors: SensorHub<S, C>,
        state: SharedState,
        summary_every: u32,
    ) -> Self {
        Self {
            rooms,
            sensors,
            state,
            summary_every,
        }
    }

    /// One control tick: sample once, update every room from that snapshot,
    /// then publish the reports.
    pub async fn tick(&mut self, now: Millis) {
        let snap = self.sensors.sample(now);
        let reports: Vec<_> = self.rooms.iter_mut().map(|room| room.update(&snap)).collect();

        for room in &self.rooms {
            for sched in room.zones() {
                self.sensors.observe_watering(sched.zone(), sched.is_flooding());
            }
        }

        let mut st = self.state.write().await;
        st.ticks += 1;
        let summary = self.summary_every > 0 && st.ticks % self.summary_every as u64 == 0;
        for fault in &snap.faults {
            st.record_error(fault.clone());
        }
        for report in reports {
            if summary {
                info!(summary = %report.summary(), "status");
            }
            st.record_report(report);
        }
    }

    /// Serve one command. Returns `false` once the controller should stop.
    pub async fn handle(&mut self, cmd: ControlCmd) -> bool {
        match cmd {
            ControlCmd::Set { cmd, reply } => {
                let result = self.apply(cmd).await;
                if reply.send(result).is_err() {
                    warn!("set reply dropped; console went away");
                }
                true
            }
            ControlCmd::Configs { reply } => {
                let configs = self
                    .rooms
                    .iter()
                    .map(|r| (r.id(), r.config().clone()))
                    .collect();
                if reply.send(configs).is_err() {
                    warn!("configs reply dropped; console went away");
                }
                true
            }
            ControlCmd::Shutdown => false,
        }
    }

    async fn apply(&mut self, cmd: SetCommand) -> Result<RoomConfig, String> {
        let id = cmd.target.room();
        let room = self
            .rooms
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| format!("room {id} is not running"))?;

        let next = cmd.apply(room.config());
        room.replace_config(next.clone())
            .map_err(|e| format!("{e:#}"))?;

        info!(
            room = %id,
            target = %cmd.target,
            param = %cmd.setting.param(),
            value = %cmd.setting,
            "setpoint changed"
        );
        self.state.write().await.record_config(id, &next);
        Ok(next)
    }

    pub fn room(&self, id: RoomId) -> Option<&RoomController> {
        self.rooms.iter().find(|r| r.id() == id)
    }
}

/// Drive `controller` until `Shutdown` arrives or every sender is dropped.
pub async fn run<S, C>(
    mut controller: Controller<S, C>,
    clock: MonotonicClock,
    tick: Duration,
    mut rx: mpsc::Receiver<ControlCmd>,
) where
    S: SoilProbe,
    C: ClimateProbe,
{
    let mut ticker = time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(tick_ms = tick.as_millis() as u64, rooms = controller.rooms.len(), "control loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => controller.tick(clock.now()).await,
            cmd = rx.recv() => match cmd {
                Some(cmd) => {
                    if !controller.handle(cmd).await {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    controller
        .state
        .write()
        .await
        .record_system("control loop stopped".to_string());
    info!("control loop stopped; relays left at last state");
}

/// Start the control task. Returns the command sender and the task handle.
pub fn spawn<S, C>(
    controller: Controller<S, C>,
    clock: MonotonicClock,
    tick: Duration,
) -> Result<(mpsc::Sender<ControlCmd>, JoinHandle<()>)>
where
    S: SoilProbe + Send + 'static,
    C: ClimateProbe + Send + 'static,
{
    anyhow::ensure!(!tick.is_zero(), "tick interval must be positive");
    let (tx, rx) = mpsc::channel::<ControlCmd>(16);
    let handle = tokio::spawn(run(controller, clock, tick, rx));
    Ok((tx, handle))
}

// ===========================================================================
// Tests
// ===========================================================================
