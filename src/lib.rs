/// F18 panel bridge
/// Runs the F18 terminal application in desktop panels: each panel is a
/// webview rendering surface paired with one pseudo-terminal session.
///
/// Module structure:
/// - services: build resolution, PTY sessions, geometry, panel handshake, registry
/// - models: types shared with the rendering surface
/// - commands: Tauri IPC handlers (desktop feature)

pub mod config;
pub mod error;
pub mod models;
pub mod services;

#[cfg(feature = "desktop")]
mod commands;
#[cfg(feature = "desktop")]
mod webview;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use services::{BridgeHandle, PanelRegistry};

/// Dispatcher thread, joined on exit so every panel process is gone first
#[cfg(feature = "desktop")]
struct Dispatcher(parking_lot::Mutex<Option<std::thread::JoinHandle<()>>>);

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use models::{LETTER_SPACING, LINE_HEIGHT};
    use services::geometry::FontMetrics;
    use services::{PlatformResolver, PtyFactory};
    use tauri::{Manager, RunEvent};
    use webview::{Outboxes, WebviewSurfaceFactory};

    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            if cfg!(debug_assertions) {
                app.handle().plugin(
                    tauri_plugin_log::Builder::default()
                        .level(log::LevelFilter::Info)
                        .build(),
                )?;
            }

            let config_path = app.path().app_config_dir()?.join("config.json");
            let config = BridgeConfig::load(&config_path)?;
            let resolver = PlatformResolver::for_host()?;
            log::info!(
                "F18 bridge on {} (channel {})",
                resolver.platform(),
                config.ver_channel
            );

            let outboxes = Outboxes::default();
            let metrics = FontMetrics {
                font_family: config.effective_font_family(),
                font_size: config.effective_font_size(),
                line_height: LINE_HEIGHT,
                letter_spacing: LETTER_SPACING,
            };
            let surfaces =
                WebviewSurfaceFactory::new(app.handle().clone(), outboxes.clone(), config.full_screen, metrics);

            let (bridge, dispatcher) =
                PanelRegistry::start(config.clone(), resolver, Box::new(surfaces), Box::new(PtyFactory))?;

            if let Some(module) = &config.on_start {
                bridge.open(module, None)?;
            }

            app.manage(bridge);
            app.manage(Dispatcher(parking_lot::Mutex::new(Some(dispatcher))));
            app.manage(outboxes);
            app.manage(config);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::panel::panel_open,
            commands::panel::panel_ready,
            commands::panel::panel_message,
            commands::panel::measure_geometry,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| {
            if let RunEvent::Exit = event {
                // Clean up all panel processes on app exit
                log::info!("App shutting down - disposing panels");
                if let Some(bridge) = app_handle.try_state::<BridgeHandle>() {
                    let _ = bridge.shutdown();
                }
                if let Some(dispatcher) = app_handle.try_state::<Dispatcher>() {
                    if let Some(handle) = dispatcher.0.lock().take() {
                        let _ = handle.join();
                    }
                }
            }
        });
}
