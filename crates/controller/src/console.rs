//! Line-oriented operator console on stdin/stdout.

use std::fmt::Write as _;

use anyhow::{anyhow, Context, Result};
use time::macros::format_description;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::command::{parse_command, Command, HELP};
use crate::config::RoomConfig;
use crate::control::ControlCmd;
use crate::room::{RoomId, StatusReport};
use crate::state::{SharedState, StatusView};
use crate::store::ConfigStore;

/// Why the console stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// Operator asked for `reboot`.
    Reboot,
    /// stdin closed (e.g. running under a service manager).
    Eof,
}

pub struct Console<S> {
    tx: mpsc::Sender<ControlCmd>,
    state: SharedState,
    store: S,
}

/// Result of one console line.
pub struct Reply {
    pub text: String,
    pub exit: bool,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exit: false,
        }
    }
}

impl<S: ConfigStore> Console<S> {
    pub fn new(tx: mpsc::Sender<ControlCmd>, state: SharedState, store: S) -> Self {
        Self { tx, state, store }
    }

    /// Read commands from stdin until `reboot` or end of input.
    pub async fn run(&self) -> Result<ConsoleExit> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{HELP}");

        while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
            if line.trim().is_empty() {
                continue;
            }
            let reply = self.handle_line(&line).await?;
            if !reply.text.is_empty() {
                println!("{}", reply.text);
            }
            if reply.exit {
                return Ok(ConsoleExit::Reboot);
            }
        }

        info!("console input closed");
        Ok(ConsoleExit::Eof)
    }

    /// Execute one line. Operator mistakes come back as reply text; only a
    /// dead control task is an error.
    pub async fn handle_line(&self, line: &str) -> Result<Reply> {
        let cmd = match parse_command(line) {
            Ok(cmd) => cmd,
            Err(e) => return Ok(Reply::text(e.to_string())),
        };

        match cmd {
            Command::Help => Ok(Reply::text(HELP)),
            Command::Status => {
                let configs = self.configs().await?;
                let view = self.state.read().await.to_status();
                Ok(Reply::text(render_status(&view, &configs)))
            }
            Command::Save => {
                let configs = self.configs().await?;
                for (room, cfg) in &configs {
                    if let Err(e) = self.store.save(*room, cfg).await {
                        warn!(room = %room, error = %format!("{e:#}"), "config save failed");
                        self.state
                            .write()
                            .await
                            .record_error(format!("save {room} failed: {e:#}"));
                        return Ok(Reply::text(format!("Save failed: {e:#}")));
                    }
                }
                info!(rooms = configs.len(), "configs saved");
                self.state
                    .write()
                    .await
                    .record_system("configs saved".to_string());
                Ok(Reply::text("Configs saved."))
            }
            Command::Reboot => Ok(Reply {
                text: "Rebooting...".into(),
                exit: true,
            }),
            Command::Set(set) => {
                let (reply, rx) = oneshot::channel();
                self.tx
                    .send(ControlCmd::Set { cmd: set, reply })
                    .await
                    .map_err(|_| anyhow!("control task stopped"))?;
                match rx.await.context("control task dropped the reply")? {
                    Ok(_) => Ok(Reply::text(format!(
                        "Set {} {} = {}",
                        set.target,
                        set.setting.param(),
                        set.setting
                    ))),
                    Err(reason) => Ok(Reply::text(format!("Rejected: {reason}"))),
                }
            }
        }
    }

    async fn configs(&self) -> Result<Vec<(RoomId, RoomConfig)>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlCmd::Configs { reply })
            .await
            .map_err(|_| anyhow!("control task stopped"))?;
        rx.await.context("control task dropped the reply")
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

const RECENT_EVENTS: usize = 8;

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "off"
    }
}

fn opt(v: Option<f32>, precision: usize) -> String {
    v.map_or_else(|| "--".to_string(), |v| format!("{v:.precision$}"))
}

fn render_room(out: &mut String, report: Option<&StatusReport>, cfg: &RoomConfig) {
    let _ = writeln!(
        out,
        "{} -> Temp {:.1} Hum {:.1} Soil {}",
        cfg.name, cfg.ideal_temp, cfg.ideal_humidity, cfg.ideal_soil
    );
    let Some(r) = report else {
        let _ = writeln!(out, "  (no tick yet)");
        return;
    };

    let _ = writeln!(
        out,
        "  Temp: {}°C  Humidity: {}%  Light: {}",
        opt(r.temperature, 1),
        opt(r.humidity, 1),
        if r.light_phase { "day" } else { "night" }
    );
    for z in &r.zones {
        let state = match z.state {
            crate::watering::ZoneState::Resting { .. } => "resting",
            crate::watering::ZoneState::Flooding { .. } => "FLOODING",
        };
        let _ = writeln!(
            out,
            "  Soil {}: {} (floods below {:.0}) {}",
            z.zone,
            opt(z.soil, 0),
            z.threshold,
            state
        );
    }
    let relays = r
        .actuators
        .iter()
        .map(|(a, on)| format!("{a}={}", on_off(*on)))
        .collect::<Vec<_>>()
        .join(" ");
    let _ = writeln!(out, "  Relays: {relays}");
}

pub fn render_status(view: &StatusView, configs: &[(RoomId, RoomConfig)]) -> String {
    let mut out = String::new();
    let up = view.uptime_secs;
    let _ = writeln!(
        out,
        "Uptime {}:{:02}:{:02}  ticks {}",
        up / 3600,
        (up / 60) % 60,
        up % 60,
        view.ticks
    );

    for (room, cfg) in configs {
        let report = view.rooms.iter().find(|r| r.room == *room);
        render_room(&mut out, report, cfg);
    }

    if !view.events.is_empty() {
        let _ = writeln!(out, "Recent:");
        let hms = format_description!("[hour]:[minute]:[second]");
        for ev in view.events.iter().take(RECENT_EVENTS) {
            let ts = ev.ts.format(&hms).unwrap_or_else(|_| "--:--:--".into());
            let kind = serde_json::to_value(ev.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_default();
            let _ = writeln!(out, "  {ts} {kind:<8} {}", ev.detail);
        }
    }

    out.trim_end().to_string()
}

// ===========================================================================
// Tests
// ===========================================================================
