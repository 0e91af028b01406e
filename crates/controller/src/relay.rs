//! Relay outputs for one room. The `gpio` feature gates the real rppal
//! driver; without it, a mock board keeps the output levels in memory.
//!
//! Every output sits behind an [`ActuatorGate`]; the board is only driven
//! when a gate accepts a change.

use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[cfg(feature = "gpio")]
use anyhow::Context;
#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

use crate::clock::Millis;
use crate::gate::{ActuatorGate, GateOutcome};
use crate::room::RoomId;

// ---------------------------------------------------------------------------
// Actuators
// ---------------------------------------------------------------------------

/// The five relay outputs every room has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actuator {
    Heater,
    Exhaust,
    Water,
    Light,
    Intake,
}

impl Actuator {
    pub const ALL: [Actuator; 5] = [
        Actuator::Heater,
        Actuator::Exhaust,
        Actuator::Water,
        Actuator::Light,
        Actuator::Intake,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Actuator::Heater => "heater",
            Actuator::Exhaust => "exhaust",
            Actuator::Water => "water",
            Actuator::Light => "light",
            Actuator::Intake => "intake",
        }
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BCM pin numbers for one room's relay board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayPins {
    pub heater: u8,
    pub exhaust: u8,
    pub water: u8,
    pub light: u8,
    pub intake: u8,
}

impl RelayPins {
    pub fn pin(&self, actuator: Actuator) -> u8 {
        match actuator {
            Actuator::Heater => self.heater,
            Actuator::Exhaust => self.exhaust,
            Actuator::Water => self.water,
            Actuator::Light => self.light,
            Actuator::Intake => self.intake,
        }
    }

    /// Pins in [`Actuator::ALL`] order.
    pub fn as_array(&self) -> [u8; 5] {
        Actuator::ALL.map(|a| self.pin(a))
    }
}

// ---------------------------------------------------------------------------
// Real GPIO relay board (requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------

#[cfg(feature = "gpio")]
pub struct RelayBoard {
    pins: Vec<OutputPin>, // indexed by Actuator::index
    active_low: bool,
}

#[cfg(feature = "gpio")]
impl RelayBoard {
    pub fn new(room: RoomId, pins: &RelayPins, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().context("failed to open GPIO")?;
        let mut outputs = Vec::with_capacity(Actuator::ALL.len());

        for actuator in Actuator::ALL {
            let num = pins.pin(actuator);
            let mut pin = gpio
                .get(num)
                .with_context(|| format!("{room} {actuator}: gpio {num} unavailable"))?
                .into_output();

            // Outputs keep their level when the process exits.
            pin.set_reset_on_drop(false);
            drive(&mut pin, active_low, false);
            outputs.push(pin);
        }

        info!(room = %room, ?pins, active_low, "relay board initialised");
        Ok(Self {
            pins: outputs,
            active_low,
        })
    }

    pub fn set(&mut self, actuator: Actuator, on: bool) {
        let active_low = self.active_low;
        drive(&mut self.pins[actuator.index()], active_low, on);
    }
}

#[cfg(feature = "gpio")]
fn drive(pin: &mut OutputPin, active_low: bool, on: bool) {
    // active-low boards switch on with LOW
    if on != active_low {
        pin.set_high();
    } else {
        pin.set_low();
    }
}

// ---------------------------------------------------------------------------
// Mock relay board (no hardware; output levels kept in memory)
// ---------------------------------------------------------------------------

#[cfg(not(feature = "gpio"))]
pub struct RelayBoard {
    pub(crate) outputs: [bool; 5],
}

#[cfg(not(feature = "gpio"))]
impl RelayBoard {
    pub fn new(room: RoomId, pins: &RelayPins, active_low: bool) -> Result<Self> {
        debug!(room = %room, ?pins, active_low, "mock relay board initialised (no hardware)");
        Ok(Self {
            outputs: [false; 5],
        })
    }

    pub fn set(&mut self, actuator: Actuator, on: bool) {
        self.outputs[actuator.index()] = on;
    }
}

// ---------------------------------------------------------------------------
// Relay bank
// ---------------------------------------------------------------------------

/// A change a gate accepted during the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub actuator: Actuator,
    pub on: bool,
    pub at: Millis,
}

/// Five gated outputs for one room.
pub struct RelayBank {
    room: RoomId,
    gates: [ActuatorGate; 5],
    board: RelayBoard,
    transitions: Vec<Transition>,
}

impl RelayBank {
    pub fn new(room: RoomId, board: RelayBoard, min_dwell_ms: u32) -> Self {
        Self {
            room,
            gates: std::array::from_fn(|_| ActuatorGate::new(min_dwell_ms)),
            board,
            transitions: Vec::new(),
        }
    }

    /// Ask for `actuator` to be `on`. The output is driven only when the
    /// gate accepts the change.
    pub fn request(&mut self, actuator: Actuator, on: bool, now: Millis) -> GateOutcome {
        let outcome = self.gates[actuator.index()].request(on, now);
        match outcome {
            GateOutcome::Applied => {
                self.board.set(actuator, on);
                self.transitions.push(Transition { actuator, on, at: now });
                info!(
                    room = %self.room,
                    actuator = %actuator,
                    state = if on { "ON" } else { "OFF" },
                    "relay switched"
                );
            }
            GateOutcome::TooSoon => {
                debug!(
                    room = %self.room,
                    actuator = %actuator,
                    wanted = if on { "ON" } else { "OFF" },
                    "relay change held by dwell"
                );
            }
            GateOutcome::AlreadyInState => {}
        }
        outcome
    }

    pub fn heater(&mut self, on: bool, now: Millis) -> GateOutcome {
        self.request(Actuator::Heater, on, now)
    }

    pub fn exhaust(&mut self, on: bool, now: Millis) -> GateOutcome {
        self.request(Actuator::Exhaust, on, now)
    }

    pub fn water(&mut self, on: bool, now: Millis) -> GateOutcome {
        self.request(Actuator::Water, on, now)
    }

    pub fn light(&mut self, on: bool, now: Millis) -> GateOutcome {
        self.request(Actuator::Light, on, now)
    }

    pub fn intake(&mut self, on: bool, now: Millis) -> GateOutcome {
        self.request(Actuator::Intake, on, now)
    }

    pub fn state(&self, actuator: Actuator) -> bool {
        self.gates[actuator.index()].state()
    }

    pub fn states(&self) -> [(Actuator, bool); 5] {
        Actuator::ALL.map(|a| (a, self.state(a)))
    }

    /// Hand over the transitions accepted since the last call.
    pub fn take_transitions(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    #[cfg(all(test, not(feature = "gpio")))]
    pub(crate) fn board(&self) -> &RelayBoard {
        &self.board
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(all(test, not(feature = "gpio")))]
mod tests {
    use super::*;
    use crate::gate::DEFAULT_MIN_DWELL_MS;

    const PINS: RelayPins = RelayPins {
        heater: 18,
        exhaust: 5,
        water: 19,
        light: 21,
        intake: 22,
    };

    /// First instant the gates accept a change after boot.
    const T0: Millis = Millis(DEFAULT_MIN_DWELL_MS);

    fn bank() -> RelayBank {
        let board = RelayBoard::new(RoomId::Veg, &PINS, true).unwrap();
        RelayBank::new(RoomId::Veg, board, DEFAULT_MIN_DWELL_MS)
    }

    // -- Actuator ---------------------------------------------------------

    #[test]
    fn actuator_indices_are_dense() {
        for (i, a) in Actuator::ALL.iter().enumerate() {
            assert_eq!(a.index(), i);
        }
    }

    #[test]
    fn actuator_serializes_lowercase() {
        let json = serde_json::to_string(&Actuator::Exhaust).unwrap();
        assert_eq!(json, "\"exhaust\"");
        assert_eq!(Actuator::Intake.to_string(), "intake");
    }

    #[test]
    fn pins_lookup_by_actuator() {
        assert_eq!(PINS.pin(Actuator::Water), 19);
        assert_eq!(PINS.as_array(), [18, 5, 19, 21, 22]);
    }

    // -- RelayBoard (mock) ------------------------------------------------

    #[test]
    fn board_starts_all_off() {
        let board = RelayBoard::new(RoomId::Flower, &PINS, false).unwrap();
        assert_eq!(board.outputs, [false; 5]);
    }

    #[test]
    fn board_set_touches_one_output() {
        let mut board = RelayBoard::new(RoomId::Flower, &PINS, true).unwrap();
        board.set(Actuator::Light, true);
        assert_eq!(board.outputs, [false, false, false, true, false]);
    }

    // -- RelayBank --------------------------------------------------------

    #[test]
    fn applied_request_drives_board() {
        let mut bank = bank();
        assert_eq!(bank.heater(true, T0), GateOutcome::Applied);
        assert!(bank.state(Actuator::Heater));
        assert!(bank.board().outputs[Actuator::Heater.index()]);
    }

    #[test]
    fn rejected_request_leaves_board_untouched() {
        let mut bank = bank();
        bank.water(true, T0);
        assert_eq!(bank.water(false, T0.plus(3_000)), GateOutcome::TooSoon);
        assert!(bank.state(Actuator::Water));
        assert!(bank.board().outputs[Actuator::Water.index()]);
    }

    #[test]
    fn gates_are_independent() {
        let mut bank = bank();
        bank.heater(true, T0);
        // Exhaust has not changed since boot, so only the boot dwell applies.
        assert_eq!(bank.exhaust(true, T0.plus(1)), GateOutcome::Applied);
        assert_eq!(bank.light(true, T0.plus(2)), GateOutcome::Applied);
        assert_eq!(bank.intake(true, T0.plus(3)), GateOutcome::Applied);
    }

    #[test]
    fn states_lists_every_actuator() {
        let mut bank = bank();
        bank.light(true, T0);
        let states = bank.states();
        assert_eq!(states.len(), 5);
        assert!(states.contains(&(Actuator::Light, true)));
        assert!(states.contains(&(Actuator::Heater, false)));
    }

    #[test]
    fn no_switching_during_boot_dwell() {
        let mut bank = bank();
        assert_eq!(bank.water(true, Millis(5_000)), GateOutcome::TooSoon);
        assert!(!bank.state(Actuator::Water));
        assert!(!bank.board().outputs[Actuator::Water.index()]);
        assert!(bank.take_transitions().is_empty());
    }

    #[test]
    fn transitions_are_drained() {
        let mut bank = bank();
        bank.heater(true, T0.plus(10));
        bank.heater(true, T0.plus(20));
        bank.exhaust(true, T0.plus(30));

        let taken = bank.take_transitions();
        assert_eq!(
            taken,
            vec![
                Transition { actuator: Actuator::Heater, on: true, at: T0.plus(10) },
                Transition { actuator: Actuator::Exhaust, on: true, at: T0.plus(30) },
            ]
        );
        assert!(bank.take_transitions().is_empty());
    }
}
