//! D-Bus integration: toolbox discovery and application actions

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use zbus::Connection;

use crate::context::ShellEvent;

pub mod proxies;
pub mod remote;

pub use remote::DbusRemote;

pub struct DbusManager {
    conn: Arc<Connection>,
}

impl DbusManager {
    /// Connect to session D-Bus
    pub async fn new() -> Result<Self> {
        let conn = Connection::session()
            .await
            .context("Failed to connect to D-Bus session bus")?;

        tracing::info!("Connected to D-Bus session bus");

        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    /// Remote actions backed by this connection
    pub fn remote(&self, events: mpsc::UnboundedSender<ShellEvent>) -> DbusRemote {
        DbusRemote::new(Connection::clone(&self.conn), events)
    }
}
