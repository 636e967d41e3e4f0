/// Models module
/// Shared data types between the bridge and the rendering surface.
/// Everything crossing the surface message channel is serde-serializable.

use serde::{Deserialize, Serialize};

pub const RENDERER_TYPE: &str = "canvas";
pub const LINE_HEIGHT: f32 = 0.92;
pub const LETTER_SPACING: f32 = 0.0;

/// Negotiated terminal size in cells and pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub cols: u16,
    pub rows: u16,
    pub width: u32,
    pub height: u32,
}

/// One panel's session bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelSession {
    pub id: u32,
    pub module: String,
    pub organization: String,
    pub cols: u16,
    pub rows: u16,
    pub width: u32,
    pub height: u32,
    pub font_family: String,
    pub font_size: u16,
}

impl PanelSession {
    pub fn new(id: u32, module: &str, organization: &str, font_family: &str, font_size: u16) -> Self {
        Self {
            id,
            module: module.to_string(),
            organization: organization.to_string(),
            cols: 0,
            rows: 0,
            width: 0,
            height: 0,
            font_family: font_family.to_string(),
            font_size,
        }
    }

    /// Caption of the panel; doubles as the terminal name used to match exit events
    pub fn name(&self) -> String {
        format!("F18 {} - {}", self.module, self.id)
    }

    /// Negotiated geometry, `None` until the handshake delivered one
    pub fn geometry(&self) -> Option<Geometry> {
        if self.cols == 0 || self.rows == 0 {
            return None;
        }
        Some(Geometry {
            cols: self.cols,
            rows: self.rows,
            width: self.width,
            height: self.height,
        })
    }

    pub fn apply(&mut self, geometry: Geometry) {
        self.cols = geometry.cols;
        self.rows = geometry.rows;
        self.width = geometry.width;
        self.height = geometry.height;
    }
}

/// Messages sent by the rendering surface
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", content = "data", rename_all = "kebab-case")]
pub enum SurfaceMessage {
    Alert(String),
    /// Geometry payload; an object or a JSON string holding one
    CliDimensions(serde_json::Value),
    CliFocus,
    CliInput(String),
}

/// Messages sent to the rendering surface
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", content = "data", rename_all = "kebab-case")]
pub enum BridgeMessage {
    TermGetDimensions(DimensionsRequest),
    TermCreate(TermOptions),
    TermWrite(String),
}

impl BridgeMessage {
    pub fn command(&self) -> &'static str {
        match self {
            BridgeMessage::TermGetDimensions(_) => "term-get-dimensions",
            BridgeMessage::TermCreate(_) => "term-create",
            BridgeMessage::TermWrite(_) => "term-write",
        }
    }
}

/// Everything the dispatcher reacts to, in delivery order
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Launch command fired for a module; organization defaults to the configured one
    Open {
        module: String,
        organization: Option<String>,
    },
    /// Outcome of the spawn: the OS process id, if one was reported
    ProcessReady { panel: u32, pid: Option<u32> },
    Surface { panel: u32, message: SurfaceMessage },
    SurfaceClosed { panel: u32 },
    Output { session: String, data: String },
    Exited { session: String, code: Option<u32> },
    Shutdown,
}

pub type EventSender = std::sync::mpsc::Sender<BridgeEvent>;

/// User settings passed through to the surface untouched
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceSettings {
    pub ver_channel: String,
    pub on_start: Option<String>,
    pub full_screen: bool,
}

/// Payload of `term-get-dimensions`: what the surface needs to measure glyphs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionsRequest {
    #[serde(flatten)]
    pub settings: SurfaceSettings,
    pub renderer_type: String,
    pub font_family: String,
    pub font_size: u16,
    pub letter_spacing: f32,
    pub line_height: f32,
}

/// Payload of `term-create`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermOptions {
    pub cols: u16,
    pub rows: u16,
    pub cursor_blink: bool,
    pub bell_style: String,
    pub cursor_style: String,
    pub renderer_type: String,
    pub experimental_char_atlas: String,
    pub font_family: String,
    pub font_size: u16,
    pub letter_spacing: f32,
    pub line_height: f32,
    pub term_name: String,
}

impl TermOptions {
    pub fn for_session(session: &PanelSession) -> Self {
        Self {
            cols: session.cols,
            rows: session.rows,
            cursor_blink: true,
            bell_style: "sound".to_string(),
            cursor_style: "block".to_string(),
            renderer_type: RENDERER_TYPE.to_string(),
            experimental_char_atlas: "dynamic".to_string(),
            font_family: session.font_family.clone(),
            font_size: session.font_size,
            letter_spacing: LETTER_SPACING,
            line_height: LINE_HEIGHT,
            term_name: session.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn surface_messages_deserialize_by_command() {
        let msg: SurfaceMessage =
            serde_json::from_value(json!({ "command": "cli-input", "data": "ls\r" })).unwrap();
        assert_eq!(msg, SurfaceMessage::CliInput("ls\r".to_string()));

        let msg: SurfaceMessage = serde_json::from_value(json!({ "command": "cli-focus" })).unwrap();
        assert_eq!(msg, SurfaceMessage::CliFocus);

        let msg: SurfaceMessage = serde_json::from_value(
            json!({ "command": "cli-dimensions", "data": "{\"cols\":80,\"rows\":24}" }),
        )
        .unwrap();
        assert!(matches!(msg, SurfaceMessage::CliDimensions(serde_json::Value::String(_))));
    }

    #[test]
    fn term_write_serializes_with_command_tag() {
        let value = serde_json::to_value(BridgeMessage::TermWrite("hi".to_string())).unwrap();
        assert_eq!(value, json!({ "command": "term-write", "data": "hi" }));
    }

    #[test]
    fn session_has_no_geometry_until_applied() {
        let mut session = PanelSession::new(3, "fin", "proba_2018", "monospace", 16);
        assert_eq!(session.name(), "F18 fin - 3");
        assert!(session.geometry().is_none());

        let geometry = Geometry { cols: 120, rows: 40, width: 960, height: 720 };
        session.apply(geometry);
        assert_eq!(session.geometry(), Some(geometry));

        let options = TermOptions::for_session(&session);
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["cols"], 120);
        assert_eq!(value["rows"], 40);
        assert_eq!(value["termName"], "F18 fin - 3");
        assert_eq!(value["cursorStyle"], "block");
    }

    #[test]
    fn dimensions_request_flattens_user_settings() {
        let request = DimensionsRequest {
            settings: SurfaceSettings {
                ver_channel: "S".to_string(),
                on_start: Some("pos".to_string()),
                full_screen: true,
            },
            renderer_type: RENDERER_TYPE.to_string(),
            font_family: "monospace".to_string(),
            font_size: 14,
            letter_spacing: LETTER_SPACING,
            line_height: LINE_HEIGHT,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["verChannel"], "S");
        assert_eq!(value["fullScreen"], true);
        assert_eq!(value["rendererType"], "canvas");
        assert_eq!(value["fontSize"], 14);
    }
}
