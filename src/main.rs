//! flipview daemon
//!
//! Connects to the compositor over the flipview socket and to the session
//! bus, then feeds every window event through the pairing core.

use anyhow::{Context, Result};
use flipview::config::Config;
use flipview::context::{FlipContext, ShellEvent};
use flipview::dbus::{DbusManager, DbusRemote};
use flipview::ipc_host::IpcWindowSystem;
use flipview_ipc::{FramedMessage, HostEvent, ShellCommand, socket_path};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Flip = FlipContext<IpcWindowSystem, DbusRemote>;

/// How a compositor connection ended
enum Exit {
    Closed,
    Shutdown,
}

struct Channels {
    commands: mpsc::UnboundedReceiver<ShellCommand>,
    events: mpsc::UnboundedReceiver<ShellEvent>,
    shutdown: mpsc::Receiver<()>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "flipview=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting flipview");

    let config = Config::load().context("Failed to load configuration")?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let remote = match DbusManager::new().await {
        Ok(dbus) => dbus.remote(event_tx.clone()),
        Err(e) => {
            warn!("{:#}, toolbox discovery disabled", e);
            DbusRemote::disconnected(event_tx.clone())
        }
    };
    let windows = IpcWindowSystem::new(command_tx, event_tx);
    let mut flip = FlipContext::new(&config, windows, remote);

    // Handle SIGTERM and SIGINT
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            }
            let _ = shutdown_tx.send(()).await;
        });
    }

    let mut channels = Channels {
        commands: command_rx,
        events: event_rx,
        shutdown: shutdown_rx,
    };

    loop {
        match connect_and_run(&mut flip, &mut channels).await {
            Ok(Exit::Shutdown) => break,
            Ok(Exit::Closed) => info!("Compositor connection closed, reconnecting..."),
            Err(e) => warn!("IPC error: {:#}, retrying in 1s...", e),
        }

        flip.disable();
        // Commands for the old connection are stale
        while channels.commands.try_recv().is_ok() {}

        tokio::select! {
            _ = tokio::time::sleep(tokio::time::Duration::from_secs(1)) => {}
            _ = channels.shutdown.recv() => break,
        }
    }

    info!("flipview stopped");
    Ok(())
}

async fn connect_and_run(flip: &mut Flip, channels: &mut Channels) -> Result<Exit> {
    let socket_path = socket_path();
    info!("Connecting to compositor at {:?}", socket_path);

    let stream = UnixStream::connect(&socket_path)
        .await
        .with_context(|| format!("Failed to connect to {:?}", socket_path))?;
    info!("Connected to compositor");

    let (mut reader, mut writer) = stream.into_split();

    // Spawn reader task
    let (host_tx, mut host_rx) = mpsc::unbounded_channel();
    let reader_handle = tokio::spawn(async move {
        let mut len_buf = [0u8; 4];
        loop {
            if reader.read_exact(&mut len_buf).await.is_err() {
                break;
            }
            let len = u32::from_be_bytes(len_buf) as usize;

            let mut msg_buf = vec![0u8; len];
            if reader.read_exact(&mut msg_buf).await.is_err() {
                break;
            }

            match FramedMessage::decode_host_event(&msg_buf) {
                Ok(event) => {
                    if host_tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to decode event: {}", e);
                }
            }
        }
    });

    let exit = loop {
        tokio::select! {
            host = host_rx.recv() => match host {
                Some(event) => handle_host_event(flip, event).await,
                None => break Exit::Closed,
            },
            Some(event) = channels.events.recv() => dispatch(flip, event).await,
            _ = channels.shutdown.recv() => {
                flip.disable();
                break Exit::Shutdown;
            }
        }

        if let Err(e) = flush(flip, &mut channels.commands, &mut writer).await {
            reader_handle.abort();
            return Err(e);
        }
    };

    if matches!(exit, Exit::Shutdown)
        && let Err(e) = flush(flip, &mut channels.commands, &mut writer).await
    {
        error!("Failed to restore windows before exiting: {:#}", e);
    }
    reader_handle.abort();
    Ok(exit)
}

async fn handle_host_event(flip: &mut Flip, event: HostEvent) {
    debug!("Received compositor event: {:?}", event);

    match event {
        HostEvent::SyncState {
            windows,
            focused_window,
        } => {
            flip.disable();
            let existing = flip.windows_mut().sync(windows, focused_window);
            for info in &existing {
                flip.remote().discover(info).await;
            }
            flip.enable(existing);
        }
        event => {
            for shell_event in flip.windows_mut().translate(event) {
                dispatch(flip, shell_event).await;
            }
        }
    }
}

async fn dispatch(flip: &mut Flip, event: ShellEvent) {
    match event {
        ShellEvent::WindowMapped(info) => {
            flip.remote().discover(&info).await;
            let window = info.handle;
            if !flip.dispatch(ShellEvent::WindowMapped(info)) {
                flip.windows_mut().release_map(window);
            }
        }
        ShellEvent::WindowDestroyed(window) => {
            flip.dispatch(event);
            flip.windows_mut().settle_destroyed(window);
            flip.remote().forget(window);
        }
        event => {
            flip.dispatch(event);
        }
    }
}

/// Send queued commands, then the session view if it changed
async fn flush(
    flip: &mut Flip,
    commands: &mut mpsc::UnboundedReceiver<ShellCommand>,
    writer: &mut OwnedWriteHalf,
) -> Result<()> {
    while let Ok(command) = commands.try_recv() {
        let msg = FramedMessage::new(&command)?;
        writer.write_all(&msg.encode()).await?;
    }

    if let Some(sessions) = flip.take_session_snapshot() {
        let msg = FramedMessage::new(&ShellCommand::PublishSessions { sessions })?;
        writer.write_all(&msg.encode()).await?;
    }
    Ok(())
}
