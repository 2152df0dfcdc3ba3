//! Alarm Core
//!
//! Domain logic of the smart alarm backend, independent of any transport:
//!
//! - [`AlarmStateMachine`]: armed/triggered flags with the trigger auto-reset
//! - [`StatusListener`]: long-lived status subscription feeding the state machine
//! - [`AlarmCommander`]: publishes arm/cancel commands to the device
//! - [`EligibilityGate`] / [`SleepRatingService`]: once-per-day sleep rating
//! - [`SensorReader`]: one-shot sensor reads
//!
//! Transports plug in through the [`Broker`] trait and persistence through
//! [`SleepStore`]; in-memory implementations of both ship for tests.

pub mod broker;
pub mod commander;
pub mod error;
pub mod gate;
pub mod listener;
pub mod rating;
pub mod sensors;
pub mod state;
pub mod store;

pub use broker::{Broker, MemoryBroker, MessageStream};
pub use commander::{AlarmCommander, CANCEL_PAYLOAD};
pub use error::{AlarmError, Result};
pub use gate::EligibilityGate;
pub use listener::{decode_status, RetryPolicy, StatusEvent, StatusListener};
pub use rating::{SleepRatingService, RATING_RANGE};
pub use sensors::{SensorReader, SensorsData};
pub use state::{AlarmPhase, AlarmStateMachine, AlarmStatus, DEFAULT_AUTO_RESET};
pub use store::{EligibilityRecord, MemorySleepStore, SleepStore, SqliteSleepStore};
