//! flipview
//!
//! Flip to hack for a desktop shell: pairs application windows with their
//! toolbox window and flips between the two with a 3D rotation. The pairing
//! core is deterministic and single-threaded; the compositor and the session
//! bus are reached through the adapters in [`ipc_host`] and [`dbus`].

pub mod codeview;
pub mod config;
pub mod context;
pub mod dbus;
pub mod eligibility;
pub mod facade;
pub mod ipc_host;
pub mod keyfile;
pub mod remote;
pub mod shared;
pub mod switcher;
pub mod window;

#[cfg(test)]
mod testing;
