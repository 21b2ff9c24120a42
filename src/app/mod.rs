//! Application core: the two loops and the state they share, zero direct I/O.
//!
//! The acquisition loop owns the sensor and the failure streak; the
//! transmission loop owns the network link.  They meet only at the
//! [`store::SharedReadingStore`].  All interaction with hardware happens
//! through **port traits** defined in [`ports`], keeping this layer fully
//! testable without real peripherals.

pub mod acquisition;
pub mod health;
pub mod payload;
pub mod ports;
pub mod store;
pub mod transmission;
