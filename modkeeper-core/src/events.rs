//! Lifecycle events
//!
//! Listeners registered on the manager are called synchronously on the
//! calling thread. A "before" event (`Installing`, `Enabling`, ...) fires only
//! when the operation is about to change state; the matching "after" event
//! fires only when it succeeded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::manifest::ModuleManifest;

/// What happened to the module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ModuleEventKind {
    Installing { archive: PathBuf },
    Installed,
    Enabling,
    Enabled,
    Disabling,
    Disabled,
    Uninstalling,
    Uninstalled,
}

/// A lifecycle notification for one module
#[derive(Debug, Clone, Serialize)]
pub struct ModuleEvent {
    pub name: String,
    #[serde(flatten)]
    pub kind: ModuleEventKind,
    /// Manifest of the module, when one could be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Arc<ModuleManifest>>,
    pub occurred_at: DateTime<Utc>,
}

impl ModuleEvent {
    pub fn new(
        name: impl Into<String>,
        kind: ModuleEventKind,
        manifest: Option<Arc<ModuleManifest>>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            manifest,
            occurred_at: Utc::now(),
        }
    }
}

/// Observer of module lifecycle events
pub trait ModuleListener: Send + Sync {
    fn on_event(&self, event: &ModuleEvent);
}

impl<F> ModuleListener for F
where
    F: Fn(&ModuleEvent) + Send + Sync,
{
    fn on_event(&self, event: &ModuleEvent) {
        self(event)
    }
}

/// Registered listeners
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn ModuleListener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn ModuleListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Deliver `event` to every listener in registration order
    pub fn publish(&self, event: ModuleEvent) {
        debug!("Module event {:?} for '{}'", event.kind, event.name);

        // Snapshot so a listener may subscribe others without deadlocking
        let listeners: Vec<Arc<dyn ModuleListener>> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for listener in listeners {
            listener.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_listeners_receive_events_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        bus.subscribe(Arc::new(move |event: &ModuleEvent| {
            first.lock().unwrap().push(format!("first:{}", event.name));
        }));
        let second = Arc::clone(&seen);
        bus.subscribe(Arc::new(move |event: &ModuleEvent| {
            second.lock().unwrap().push(format!("second:{}", event.name));
        }));

        bus.publish(ModuleEvent::new("Blog", ModuleEventKind::Enabling, None));

        assert_eq!(bus.listener_count(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:Blog".to_string(), "second:Blog".to_string()]
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = ModuleEvent::new(
            "Blog",
            ModuleEventKind::Installing {
                archive: PathBuf::from("/tmp/blog.tar.gz"),
            },
            None,
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "installing");
        assert_eq!(json["name"], "Blog");
        assert_eq!(json["archive"], "/tmp/blog.tar.gz");
        assert!(json.get("manifest").is_none());
        assert!(json["occurred_at"].is_string());
    }
}
