//! Stratus integration scenarios.
//!
//! Everything here runs over the in-process loopback substrate: a
//! transmitter and an execution layer wired to one `MemoryHub` form a
//! complete synchronization loop, with plain-height sync rounds.


mod execution;
mod transport;
