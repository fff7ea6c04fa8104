//! Application core: measurement pipeline, zero direct I/O.
//!
//! Channel contexts, the persisted configuration store and the service
//! that drives them.  All interaction with hardware happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod channels;
pub mod config_store;
pub mod events;
pub mod ports;
pub mod service;
