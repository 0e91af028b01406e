//! Two-room grow enclosure controller.
//!
//! Each room owns a bank of five relays behind a min-dwell gate, a climate
//! hysteresis loop, a light duty cycle, and one or two flood/rest watering
//! zones. [`control`] drives all rooms from one sensor snapshot per tick;
//! [`console`] is the operator's way in.

pub mod clock;
pub mod command;
pub mod config;
pub mod console;
pub mod control;
pub mod environment;
pub mod gate;
pub mod lighting;
pub mod relay;
pub mod room;
pub mod sampler;
pub mod state;
pub mod store;
pub mod watering;
