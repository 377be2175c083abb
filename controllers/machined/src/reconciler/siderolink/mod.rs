//! Out-of-band management link.
//!
//! `config` finds the management API, `manager` provisions the WireGuard
//! link against it, `status` watches the peer, and `userspace` runs the
//! device and relay when WireGuard is tunneled over the API connection.

pub mod config;
pub mod manager;
pub mod status;
pub mod userspace;
