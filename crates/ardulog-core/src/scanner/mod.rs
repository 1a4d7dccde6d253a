//! Port scanner / connection manager
//!
//! Cycles through the fixed candidate list until a port produces data,
//! supervises the live connection, and starts over when it drops. The scan
//! is an unbounded retry loop; it never gives up permanently.
//!
//! Split into a pure state machine ([`fsm`]) and an async driver that owns
//! the port handle and timers ([`driver`]); [`port`] is the hardware seam.

mod driver;
mod fsm;
mod port;

pub use driver::{ScanStatus, Scanner, ScannerHandle};
pub use fsm::{Effect, ScanEvent, ScanFsm, ScanState, ScanTiming};
pub use port::{list_ports, PortInfo, PortOpener, SerialOpener};
