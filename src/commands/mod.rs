/// Commands module
/// Tauri IPC handlers (panel page → bridge). They only enqueue events for the
/// dispatcher; panel state is never touched from here.

pub mod panel;
