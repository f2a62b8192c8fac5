//! Which applications may be flipped
//!
//! The desktop entry's explicit hackable flag wins; the companion's own
//! helper apps are always managed; everything else must be shown in menus,
//! not block-listed and, when an allow list exists, allow-listed. The lists
//! come from a data file shipped by the companion flatpak, cached until a
//! file watch reports a change.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};

use crate::config::EligibilityConfig;
use crate::keyfile::{KeyFile, KeyFileError};
use crate::window::WindowInfo;
use crate::window::identity::strip_desktop_suffix;

const CLUBHOUSE_COMPONENTS: &str = "com.hack_computer.Clubhouse";
const LEGACY_COMPONENTS: &str = "com.endlessm.HackComponents";

/// Block and allow lists from the data file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HackData {
    pub block: Vec<String>,
    pub allow: Vec<String>,
}

impl HackData {
    fn from_keyfile(keyfile: &KeyFile, section: &str) -> Self {
        Self {
            block: read_list(keyfile, section, "blacklist"),
            allow: read_list(keyfile, section, "whitelist"),
        }
    }

    pub fn allows(&self, app_id: &str) -> bool {
        if self.block.iter().any(|id| id == app_id) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|id| id == app_id)
    }
}

fn read_list(keyfile: &KeyFile, section: &str, key: &str) -> Vec<String> {
    match keyfile.string_list(section, key) {
        Ok(list) => list,
        Err(e) if e.is_not_found() => Vec::new(),
        Err(e) => {
            error!("Bad {} list in hack data file: {}", key, e);
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cached {
    Data(HackData),
    /// No readable data file
    Unavailable,
}

pub struct EligibilityPolicy {
    config: EligibilityConfig,
    privileged_app_ids: Vec<String>,
    clubhouse_installed: bool,
    cache: Option<Cached>,
    stale: Arc<AtomicBool>,
    watcher: Option<RecommendedWatcher>,
}

impl EligibilityPolicy {
    pub fn new(config: EligibilityConfig, privileged_app_ids: Vec<String>) -> Self {
        Self {
            config,
            privileged_app_ids,
            clubhouse_installed: false,
            cache: None,
            stale: Arc::new(AtomicBool::new(false)),
            watcher: None,
        }
    }

    /// The data file moves with the companion that ships it
    pub fn set_clubhouse_installed(&mut self, installed: bool) {
        if self.clubhouse_installed != installed {
            self.clubhouse_installed = installed;
            self.cache = None;
        }
    }

    /// Directories searched for the data file, in priority order
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        let components = if self.clubhouse_installed {
            CLUBHOUSE_COMPONENTS
        } else {
            LEGACY_COMPONENTS
        };
        self.config
            .installations
            .iter()
            .map(|installation| {
                installation
                    .join("app")
                    .join(components)
                    .join("current/active/files/share/hack-components")
            })
            .collect()
    }

    /// Drop the cached lists; the next query reads the file again
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Watch the search directories so edits to the data file are picked up
    pub fn watch(&mut self) -> Result<()> {
        let stale = Arc::clone(&self.stale);
        let file_name = self.config.file_name.clone();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().is_some_and(|n| n == file_name.as_str()));
                    if ours {
                        debug!("Hack data file changed");
                        stale.store(true, Ordering::SeqCst);
                    }
                }
                Err(e) => error!("Hack data watcher error: {}", e),
            },
            notify::Config::default(),
        )
        .context("Failed to create hack data watcher")?;

        let mut watched = 0;
        for dir in self.search_dirs() {
            if !dir.is_dir() {
                debug!("Not watching {:?}, no such directory", dir);
                continue;
            }
            match watcher.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => watched += 1,
                Err(e) => warn!("Failed to watch {:?}: {}", dir, e),
            }
        }
        info!("Watching {} hack data directories", watched);

        self.watcher = Some(watcher);
        Ok(())
    }

    fn data(&mut self) -> &Cached {
        if self.stale.swap(false, Ordering::SeqCst) {
            self.cache = None;
        }
        if self.cache.is_none() {
            self.cache = Some(self.load());
        }
        self.cache.get_or_insert(Cached::Unavailable)
    }

    fn load(&self) -> Cached {
        match KeyFile::load_from_dirs(&self.config.file_name, &self.search_dirs()) {
            Ok((keyfile, path)) => {
                debug!("Loaded hack data from {:?}", path);
                Cached::Data(HackData::from_keyfile(&keyfile, &self.config.section))
            }
            Err(KeyFileError::NotFound(_)) => {
                debug!("No hack data file found");
                Cached::Unavailable
            }
            Err(e) => {
                error!("Error reading hack data file: {}", e);
                Cached::Unavailable
            }
        }
    }

    fn list_allows(&mut self, app_id: &str) -> bool {
        let fail_open = self.config.fail_open;
        match self.data() {
            Cached::Data(data) => data.allows(app_id),
            Cached::Unavailable => fail_open,
        }
    }

    /// Whether windows of this application may be paired
    pub fn is_managed(&mut self, info: &WindowInfo) -> bool {
        let Some(app) = &info.app else {
            return false;
        };

        if let Some(hackable) = app.hackable {
            return hackable;
        }

        if let Some(gtk_id) = &info.gtk_application_id
            && self.privileged_app_ids.iter().any(|id| id == gtk_id)
        {
            return true;
        }

        if !app.should_show {
            return false;
        }

        self.list_allows(strip_desktop_suffix(&app.desktop_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompanionConfig;
    use crate::testing::app_window;
    use std::fs;

    fn policy(installations: Vec<PathBuf>) -> EligibilityPolicy {
        let config = EligibilityConfig {
            installations,
            ..EligibilityConfig::default()
        };
        EligibilityPolicy::new(config, CompanionConfig::default().privileged_app_ids)
    }

    fn write_data(policy: &EligibilityPolicy, contents: &str) {
        let dir = &policy.search_dirs()[0];
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("hack-data.ini"), contents).unwrap();
    }

    #[test]
    fn test_fails_open_without_data_file() {
        let mut policy = policy(Vec::new());
        assert!(policy.is_managed(&app_window(1, "org.gnome.Weather", 1)));
    }

    #[test]
    fn test_fail_closed_when_configured() {
        let mut policy = policy(Vec::new());
        policy.config.fail_open = false;
        assert!(!policy.is_managed(&app_window(1, "org.gnome.Weather", 1)));
        // Helper apps do not depend on the lists
        assert!(policy.is_managed(&app_window(2, "com.hack_computer.HackToolbox", 1)));
    }

    #[test]
    fn test_hackable_flag_has_last_word() {
        let mut policy = policy(Vec::new());
        let mut info = app_window(1, "com.hack_computer.HackToolbox", 1);
        info.app.as_mut().unwrap().hackable = Some(false);
        assert!(!policy.is_managed(&info));

        let mut info = app_window(2, "org.hidden.App", 1);
        let app = info.app.as_mut().unwrap();
        app.should_show = false;
        app.hackable = Some(true);
        assert!(policy.is_managed(&info));
    }

    #[test]
    fn test_untracked_and_hidden_apps_are_not_managed() {
        let mut policy = policy(Vec::new());
        let mut info = app_window(1, "org.gnome.Weather", 1);
        info.app.as_mut().unwrap().should_show = false;
        assert!(!policy.is_managed(&info));

        info.app = None;
        assert!(!policy.is_managed(&info));
    }

    #[test]
    fn test_block_and_allow_lists() {
        let root = tempfile::tempdir().unwrap();
        let mut policy = policy(vec![root.path().to_path_buf()]);
        write_data(
            &policy,
            "[flip-to-hack]\nblacklist=org.gnome.Calculator;\nwhitelist=org.gnome.Weather;org.gnome.Calculator;\n",
        );

        assert!(policy.is_managed(&app_window(1, "org.gnome.Weather", 1)));
        assert!(!policy.is_managed(&app_window(2, "org.gnome.Calculator", 1)));
        assert!(!policy.is_managed(&app_window(3, "org.gnome.Maps", 1)));
    }

    #[test]
    fn test_cache_is_read_through_until_invalidated() {
        let root = tempfile::tempdir().unwrap();
        let mut policy = policy(vec![root.path().to_path_buf()]);
        let weather = app_window(1, "org.gnome.Weather", 1);
        assert!(policy.is_managed(&weather));

        write_data(&policy, "[flip-to-hack]\nblacklist=org.gnome.Weather;\n");
        assert!(policy.is_managed(&weather));

        policy.stale.store(true, Ordering::SeqCst);
        assert!(!policy.is_managed(&weather));
    }

    #[test]
    fn test_malformed_file_fails_open() {
        let root = tempfile::tempdir().unwrap();
        let mut policy = policy(vec![root.path().to_path_buf()]);
        write_data(&policy, "not a key file\n");
        assert!(policy.is_managed(&app_window(1, "org.gnome.Weather", 1)));
    }

    #[test]
    fn test_search_dirs_follow_companion() {
        let mut policy = policy(vec![PathBuf::from("/var/lib/flatpak")]);
        assert_eq!(
            policy.search_dirs(),
            vec![PathBuf::from(
                "/var/lib/flatpak/app/com.endlessm.HackComponents/current/active/files/share/hack-components"
            )]
        );
        policy.set_clubhouse_installed(true);
        assert!(policy.search_dirs()[0].starts_with("/var/lib/flatpak/app/com.hack_computer.Clubhouse"));
    }
}
