//! Remote actions over the session bus
//!
//! Everything the pairing core asks is answered from a cache. The cache is
//! filled ahead of time: toolbox targets are read before a mapped window is
//! dispatched, action lists are fetched when a session prepares a scope, and
//! action invocations are fired off on the runtime.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zbus::Connection;
use zbus::proxy::CacheProperties;
use zbus::zvariant::Value;

use super::proxies::{GtkActionsProxy, HackableProxy, ToolboxProxy, hackable_interface};
use crate::context::ShellEvent;
use crate::remote::{ActionParam, ActionScope, RemoteActions, RemoteError};
use crate::window::identity::{WindowIdentity, app_id, parse_target, toolbox_probe};
use crate::window::{WindowHandle, WindowInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
enum ActionList {
    Pending,
    Listed(HashSet<String>),
    Failed,
}

#[derive(Default)]
struct RemoteCache {
    targets: HashMap<WindowHandle, WindowIdentity>,
    actions: HashMap<ActionScope, ActionList>,
    hackable_watches: HashMap<WindowHandle, JoinHandle<()>>,
}

pub struct DbusRemote {
    conn: Option<Connection>,
    cache: Arc<Mutex<RemoteCache>>,
    events: mpsc::UnboundedSender<ShellEvent>,
}

impl DbusRemote {
    pub fn new(conn: Connection, events: mpsc::UnboundedSender<ShellEvent>) -> Self {
        Self {
            conn: Some(conn),
            cache: Arc::default(),
            events,
        }
    }

    /// Without a session bus every remote capability is unavailable
    pub fn disconnected(events: mpsc::UnboundedSender<ShellEvent>) -> Self {
        Self {
            conn: None,
            cache: Arc::default(),
            events,
        }
    }

    fn cache(&self) -> MutexGuard<'_, RemoteCache> {
        lock(&self.cache)
    }

    /// Resolve what the pairing core will ask about a new window: its
    /// toolbox target, and the app's runtime hackable switch.
    pub async fn discover(&self, info: &WindowInfo) {
        let Some(conn) = &self.conn else {
            return;
        };

        if let Some(target) = read_target(conn, info).await {
            debug!("Window {} is a toolbox for {}", info.handle, target);
            self.cache().targets.insert(info.handle, target);
            return;
        }

        self.watch_hackable(conn, info);
    }

    fn watch_hackable(&self, conn: &Connection, info: &WindowInfo) {
        let (Some(bus_name), Some(path), Some(app_id)) = (
            info.gtk_application_id.clone(),
            info.gtk_application_object_path.clone(),
            app_id(info),
        ) else {
            return;
        };

        let conn = conn.clone();
        let events = self.events.clone();
        let window = info.handle;
        let handle = tokio::spawn(async move {
            let proxy = match HackableProxy::builder(&conn)
                .destination(bus_name)
                .and_then(|b| b.path(path))
                .and_then(|b| b.interface(hackable_interface(&app_id)))
            {
                Ok(builder) => builder.build().await,
                Err(e) => Err(e),
            };
            let proxy = match proxy {
                Ok(proxy) => proxy,
                Err(e) => {
                    debug!("No hackable switch on {}: {}", window, e);
                    return;
                }
            };

            if let Ok(hackable) = proxy.hackable().await {
                let _ = events.send(ShellEvent::HackableChanged(window, hackable));
            }

            let mut changes = proxy.receive_hackable_changed().await;
            while let Some(change) = changes.next().await {
                match change.get().await {
                    Ok(hackable) => {
                        if events.send(ShellEvent::HackableChanged(window, hackable)).is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("Bad Hackable value from {}: {}", window, e),
                }
            }
        });

        if let Some(previous) = self.cache().hackable_watches.insert(window, handle) {
            previous.abort();
        }
    }

    /// Drop everything cached about a destroyed window
    pub fn forget(&self, window: WindowHandle) {
        let mut cache = self.cache();
        cache.targets.remove(&window);
        if let Some(watch) = cache.hackable_watches.remove(&window) {
            watch.abort();
        }
    }
}

impl Drop for DbusRemote {
    fn drop(&mut self) {
        for (_, watch) in self.cache().hackable_watches.drain() {
            watch.abort();
        }
    }
}

fn lock(cache: &Mutex<RemoteCache>) -> MutexGuard<'_, RemoteCache> {
    // The cache holds no invariants a panicking writer could break
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn read_target(conn: &Connection, info: &WindowInfo) -> Option<WindowIdentity> {
    let probe = toolbox_probe(info)?;
    let proxy = ToolboxProxy::builder(conn)
        .destination(probe.bus_name)
        .ok()?
        .path(probe.object_path)
        .ok()?
        .interface(probe.interface)
        .ok()?
        .cache_properties(CacheProperties::No)
        .build()
        .await
        .ok()?;

    match proxy.target().await {
        Ok((app_id, window_id)) => parse_target(&app_id, &window_id),
        Err(e) => {
            debug!("Window {} has no toolbox target: {}", info.handle, e);
            None
        }
    }
}

async fn actions_proxy(conn: &Connection, scope: &ActionScope) -> zbus::Result<GtkActionsProxy<'static>> {
    GtkActionsProxy::builder(conn)
        .destination(scope.bus_name.clone())?
        .path(scope.object_path.clone())?
        .cache_properties(CacheProperties::No)
        .build()
        .await
}

fn action_parameter(param: &ActionParam) -> Vec<Value<'static>> {
    match param {
        ActionParam::None => Vec::new(),
        ActionParam::Bool(value) => vec![Value::from(*value)],
        ActionParam::Target(identity) => vec![Value::from((
            identity.app_id.clone(),
            identity.window_id.clone(),
        ))],
    }
}

impl RemoteActions for DbusRemote {
    fn resolve_target(&self, window: &WindowInfo) -> Option<WindowIdentity> {
        self.cache().targets.get(&window.handle).cloned()
    }

    fn prepare_actions(&self, scope: &ActionScope) {
        let Some(conn) = self.conn.clone() else {
            return;
        };
        {
            let mut cache = self.cache();
            if matches!(cache.actions.get(scope), Some(ActionList::Pending | ActionList::Listed(_))) {
                return;
            }
            cache.actions.insert(scope.clone(), ActionList::Pending);
        }

        let cache = Arc::clone(&self.cache);
        let scope = scope.clone();
        tokio::spawn(async move {
            let listed = match actions_proxy(&conn, &scope).await {
                Ok(proxy) => proxy.list().await,
                Err(e) => Err(e),
            };
            let entry = match listed {
                Ok(names) => {
                    debug!("{} exports {} actions", scope.object_path, names.len());
                    ActionList::Listed(names.into_iter().collect())
                }
                Err(e) => {
                    warn!("Failed to list actions of {}: {}", scope.object_path, e);
                    ActionList::Failed
                }
            };
            lock(&cache).actions.insert(scope, entry);
        });
    }

    fn has_action(&self, scope: &ActionScope, name: &str) -> bool {
        matches!(
            self.cache().actions.get(scope),
            Some(ActionList::Listed(names)) if names.contains(name)
        )
    }

    fn invoke_action(
        &self,
        scope: &ActionScope,
        name: &str,
        param: ActionParam,
    ) -> Result<(), RemoteError> {
        let Some(conn) = self.conn.clone() else {
            return Err(RemoteError::Unavailable("no session bus".to_string()));
        };
        if matches!(self.cache().actions.get(scope), Some(ActionList::Failed)) {
            return Err(RemoteError::Unavailable(format!(
                "{} on {}",
                scope.object_path, scope.bus_name
            )));
        }

        info!("Activating {} on {}", name, scope.object_path);
        let scope = scope.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            let result = match actions_proxy(&conn, &scope).await {
                Ok(proxy) => {
                    proxy
                        .activate(&name, action_parameter(&param), HashMap::new())
                        .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!("Action {} on {} failed: {}", name, scope.object_path, e);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::toolbox_window;

    fn remote() -> DbusRemote {
        let (tx, _rx) = mpsc::unbounded_channel();
        DbusRemote::disconnected(tx)
    }

    #[test]
    fn test_disconnected_remote_is_unavailable() {
        let remote = remote();
        let scope = ActionScope::toolbox_app("com.example.Foo");
        remote.prepare_actions(&scope);
        assert!(!remote.has_action(&scope, "flip"));
        assert!(matches!(
            remote.invoke_action(&scope, "flip", ActionParam::None),
            Err(RemoteError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_discover_without_bus_finds_nothing() {
        let remote = remote();
        let info = toolbox_window(2, 1);
        remote.discover(&info).await;
        assert_eq!(remote.resolve_target(&info), None);
    }

    #[test]
    fn test_cached_targets_and_actions_answer() {
        let remote = remote();
        let info = toolbox_window(2, 1);
        let target = WindowIdentity::new("com.example.Foo", "/com/example/Foo/window/1");
        let scope = ActionScope::window(&info).unwrap();
        {
            let mut cache = remote.cache();
            cache.targets.insert(info.handle, target.clone());
            cache
                .actions
                .insert(scope.clone(), ActionList::Listed(HashSet::from(["flip-back".to_string()])));
        }

        assert_eq!(remote.resolve_target(&info), Some(target));
        assert!(remote.has_action(&scope, "flip-back"));
        assert!(!remote.has_action(&scope, "flip"));

        remote.forget(info.handle);
        assert_eq!(remote.resolve_target(&info), None);
    }

    #[test]
    fn test_action_parameters() {
        assert!(action_parameter(&ActionParam::None).is_empty());
        assert_eq!(action_parameter(&ActionParam::Bool(true)), vec![Value::from(true)]);
        let target = ActionParam::Target(WindowIdentity::new("a.b.C", "/a/b/C/window/1"));
        assert_eq!(action_parameter(&target).len(), 1);
    }
}
