//! `bridge-core`
//!
//! Core types and traits for the Beckhoff bridge.
//!
//! A PLC exposes its variables as flat symbols (`Program.myArray[2].myVar`).
//! This crate defines how those symbols are parsed, how their values are
//! arranged into a nested tree for consumers, and the seams through which
//! runtimes talk to drivers and report events.
//!
//! ## Key Types
//!
//! - [`VariablePath`]: parsed flat symbol name
//! - [`PlcValue`] / [`ValueTree`]: scalar values and their nested arrangement
//! - [`codec`]: flat ⇄ nested transcoding
//! - [`CommunicationDriver`] / [`DriverFactory`]: driver seam
//! - [`BridgeEvent`] / [`EventSink`]: runtime notifications
//! - [`PlcConfig`]: per-PLC registration entry
//! - [`DriverError`] / [`BridgeError`]: error taxonomy
//!
//! ## Example
//!
//! ```rust
//! use bridge_core::codec::merge_flat;
//! use bridge_core::{PlcValue, ValueTree};
//!
//! let mut tree = ValueTree::new();
//! let rejected = merge_flat(
//!     &mut tree,
//!     [("MAIN.counter", PlcValue::Int(7)), ("MAIN.flags[1]", PlcValue::Bool(true))],
//! );
//! assert!(rejected.is_empty());
//! assert_eq!(
//!     tree.to_json(),
//!     serde_json::json!({"MAIN": {"counter": 7, "flags": [null, true]}})
//! );
//! ```

pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod path;
pub mod value;

pub use config::{PlcConfig, PlcDefaults};
pub use driver::{CommunicationDriver, DriverFactory};
pub use error::{BridgeError, BridgeResult, DriverError, DriverErrorKind, DriverResult};
pub use event::{
    BridgeEvent, BridgeEventKind, ConnectionState, EventSink, FanOut, LifecycleEvent, NullSink,
    StatusEvent,
};
pub use path::{PathError, Segment, VariablePath, MAX_INDEX};
pub use value::{FlatValues, Node, PlcValue, ValueTree};
