/// Panel Commands
/// Invoked from the launcher (`panel_open`) and from panel pages (the rest)

use crate::config::BridgeConfig;
use crate::models::{Geometry, SurfaceMessage, LETTER_SPACING, LINE_HEIGHT};
use crate::services::geometry::{compute_geometry, FontMetrics};
use crate::services::BridgeHandle;
use crate::webview::{panel_number, Outboxes};
use tauri::{AppHandle, State, WebviewWindow};

fn panel_of(window: &WebviewWindow) -> Result<u32, String> {
    panel_number(window.label()).ok_or_else(|| format!("{} is not a panel window", window.label()))
}

/// Open a new panel running `module`
#[tauri::command]
pub fn panel_open(
    module: String,
    organization: Option<String>,
    bridge: State<'_, BridgeHandle>,
) -> Result<(), String> {
    bridge.open(&module, organization).map_err(|e| e.to_string())
}

/// Panel page has registered its listener; deliver anything queued
#[tauri::command]
pub fn panel_ready(app: AppHandle, window: WebviewWindow, outboxes: State<'_, Outboxes>) -> Result<(), String> {
    outboxes.mark_ready(&app, window.label()).map_err(|e| e.to_string())
}

/// Surface → bridge message (`alert`, `cli-dimensions`, `cli-focus`, `cli-input`)
#[tauri::command]
pub fn panel_message(
    window: WebviewWindow,
    message: SurfaceMessage,
    bridge: State<'_, BridgeHandle>,
) -> Result<(), String> {
    let panel = panel_of(&window)?;
    bridge.message(panel, message).map_err(|e| e.to_string())
}

/// Grid estimate for pages that cannot measure glyphs themselves
#[tauri::command]
pub fn measure_geometry(width: u32, height: u32, config: State<'_, BridgeConfig>) -> Result<Geometry, String> {
    let metrics = FontMetrics {
        font_family: config.effective_font_family(),
        font_size: config.effective_font_size(),
        line_height: LINE_HEIGHT,
        letter_spacing: LETTER_SPACING,
    };
    compute_geometry(width, height, &metrics).map_err(|e| e.to_string())
}
