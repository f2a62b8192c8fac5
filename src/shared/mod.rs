//! Types shared between the pairing core and the adapters

pub mod window_state;
