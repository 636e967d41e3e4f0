use crate::error::{BridgeError, Result};
use crate::models::{BridgeEvent, BridgeMessage, EventSender};
use crate::services::geometry::FontMetrics;
use crate::services::panel::{PLACEHOLDER_COLS, PLACEHOLDER_ROWS};
use crate::services::{Surface, SurfaceFactory};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tauri::{AppHandle, Emitter, Manager, WebviewUrl, WebviewWindowBuilder, WindowEvent};
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};

/// Event name the panel page listens on
pub const BRIDGE_EVENT: &str = "bridge-message";

const LABEL_PREFIX: &str = "panel-";

pub fn panel_label(panel: u32) -> String {
    format!("{}{}", LABEL_PREFIX, panel)
}

/// Panel number of a panel window label
pub fn panel_number(label: &str) -> Option<u32> {
    label.strip_prefix(LABEL_PREFIX)?.parse().ok()
}

/// Messages posted before the page registered its listener
#[derive(Default)]
struct Outbox {
    ready: bool,
    pending: Vec<BridgeMessage>,
}

/// Per-window outboxes, shared between the dispatcher and IPC handlers
#[derive(Clone, Default)]
pub struct Outboxes(Arc<Mutex<HashMap<String, Arc<Mutex<Outbox>>>>>);

impl Outboxes {
    fn register(&self, label: &str) -> Arc<Mutex<Outbox>> {
        let outbox = Arc::new(Mutex::new(Outbox::default()));
        self.0.lock().insert(label.to_string(), outbox.clone());
        outbox
    }

    fn remove(&self, label: &str) {
        self.0.lock().remove(label);
    }

    /// Flush queued messages in order and deliver directly from now on
    pub fn mark_ready(&self, app: &AppHandle, label: &str) -> Result<()> {
        let outbox = self
            .0
            .lock()
            .get(label)
            .cloned()
            .ok_or_else(|| BridgeError::Surface(format!("no surface {}", label)))?;

        let mut outbox = outbox.lock();
        for message in outbox.pending.drain(..) {
            emit(app, label, &message)?;
        }
        outbox.ready = true;
        Ok(())
    }
}

fn emit(app: &AppHandle, label: &str, message: &BridgeMessage) -> Result<()> {
    app.emit_to(label, BRIDGE_EVENT, message.clone())
        .map_err(|e| BridgeError::Surface(format!("Failed to post {}: {}", message.command(), e)))
}

fn show_error(app: &AppHandle, message: &str) {
    app.dialog()
        .message(message)
        .title("F18")
        .kind(MessageDialogKind::Error)
        .show(|_| {});
}

/// Webview window rendering one panel
pub struct WebviewSurface {
    app: AppHandle,
    label: String,
    outbox: Arc<Mutex<Outbox>>,
}

impl Surface for WebviewSurface {
    fn post(&mut self, message: &BridgeMessage) -> Result<()> {
        let mut outbox = self.outbox.lock();
        if outbox.ready {
            emit(&self.app, &self.label, message)
        } else {
            outbox.pending.push(message.clone());
            Ok(())
        }
    }

    fn notify_error(&mut self, message: &str) {
        show_error(&self.app, message);
    }

    fn close(&mut self) {
        if let Some(window) = self.app.get_webview_window(&self.label) {
            if let Err(e) = window.destroy() {
                log::warn!("[Webview] Failed to close {}: {}", self.label, e);
            }
        }
    }
}

pub struct WebviewSurfaceFactory {
    app: AppHandle,
    outboxes: Outboxes,
    full_screen: bool,
    metrics: FontMetrics,
}

impl WebviewSurfaceFactory {
    pub fn new(app: AppHandle, outboxes: Outboxes, full_screen: bool, metrics: FontMetrics) -> Self {
        Self {
            app,
            outboxes,
            full_screen,
            metrics,
        }
    }
}

impl SurfaceFactory for WebviewSurfaceFactory {
    fn open(&self, panel: u32, title: &str, events: EventSender) -> Result<Box<dyn Surface>> {
        let label = panel_label(panel);
        let outbox = self.outboxes.register(&label);

        // Big enough for the placeholder grid until the page measures itself
        let (cell_width, cell_height) = self.metrics.cell_size();
        let width = (PLACEHOLDER_COLS as f32 * cell_width) as f64;
        let height = (PLACEHOLDER_ROWS as f32 * cell_height) as f64;

        let window = WebviewWindowBuilder::new(&self.app, &label, WebviewUrl::App("panel.html".into()))
            .title(title)
            .inner_size(width, height)
            .fullscreen(self.full_screen)
            .build()
            .map_err(|e| {
                self.outboxes.remove(&label);
                BridgeError::Surface(format!("Failed to create webview: {}", e))
            })?;

        let outboxes = self.outboxes.clone();
        let closed_label = label.clone();
        window.on_window_event(move |event| {
            if let WindowEvent::Destroyed = event {
                outboxes.remove(&closed_label);
                let _ = events.send(BridgeEvent::SurfaceClosed { panel });
            }
        });

        log::info!("[Webview] Created {} ({}) at {}x{}", label, title, width, height);

        Ok(Box::new(WebviewSurface {
            app: self.app.clone(),
            label,
            outbox,
        }))
    }

    fn notify_error(&self, message: &str) {
        show_error(&self.app, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_panel_numbers() {
        assert_eq!(panel_label(7), "panel-7");
        assert_eq!(panel_number("panel-7"), Some(7));
        assert_eq!(panel_number("main"), None);
        assert_eq!(panel_number("panel-x"), None);
    }
}
