//! Proxies for the interfaces toolboxes and hackable apps export

use std::collections::HashMap;

use zbus::proxy;
use zbus::zvariant::Value;

/// Toolbox window, publishes the window it was opened for
#[proxy(
    interface = "com.hack_computer.HackToolbox.Toolbox",
    default_service = "com.hack_computer.HackToolbox",
    default_path = "/com/hack_computer/HackToolbox"
)]
pub trait Toolbox {
    /// `(app_id, window_id)` of the target window
    #[zbus(property)]
    fn target(&self) -> zbus::Result<(String, String)>;
}

/// Application-level hackable switch
#[proxy(interface = "com.hack_computer.Hackable")]
pub trait Hackable {
    #[zbus(property)]
    fn hackable(&self) -> zbus::Result<bool>;
}

/// GTK action group exported by GApplication and GtkApplicationWindow
#[proxy(interface = "org.gtk.Actions")]
pub trait GtkActions {
    fn list(&self) -> zbus::Result<Vec<String>>;

    fn activate(
        &self,
        action_name: &str,
        parameter: Vec<Value<'_>>,
        platform_data: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<()>;
}

pub const HACKABLE_INTERFACE: &str = "com.hack_computer.Hackable";
pub const OLD_HACKABLE_INTERFACE: &str = "com.endlessm.Hackable";

/// Old hack apps still export the `com.endlessm` interface
pub fn hackable_interface(app_id: &str) -> &'static str {
    if app_id.starts_with("com.endlessm.") {
        OLD_HACKABLE_INTERFACE
    } else {
        HACKABLE_INTERFACE
    }
}
