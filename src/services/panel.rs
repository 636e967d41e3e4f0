/// Panel Controller
/// Drives one panel through the terminal handshake:
/// spawn with placeholder geometry, ask the surface for its measured size,
/// resize, create the front-end terminal, then launch F18 in the shell.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::models::{
    BridgeEvent, BridgeMessage, DimensionsRequest, EventSender, Geometry, PanelSession, SurfaceMessage,
    TermOptions, LETTER_SPACING, LINE_HEIGHT, RENDERER_TYPE,
};
use crate::services::geometry::parse_geometry;
use crate::services::launch::{shell_for, LaunchPlan};
use crate::services::platform::ResolvedBuild;
use crate::services::pty::{SpawnRequest, Terminal, TerminalFactory};
use std::fmt;

/// Size the shell is spawned with before the surface has been measured
pub const PLACEHOLDER_COLS: u16 = 120;
pub const PLACEHOLDER_ROWS: u16 = 40;

/// Rendering surface (webview) a panel draws into
pub trait Surface: Send {
    fn post(&mut self, message: &BridgeMessage) -> Result<()>;

    /// Show a user-facing error notification
    fn notify_error(&mut self, message: &str);

    /// Release the surface; only called while the host still has it open
    fn close(&mut self);
}

pub trait SurfaceFactory: Send {
    /// Open a surface for `panel`; its messages and close event go to `events`
    fn open(&self, panel: u32, title: &str, events: EventSender) -> Result<Box<dyn Surface>>;

    /// Error notification that belongs to no panel
    fn notify_error(&self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Created,
    AwaitingProcessReady,
    AwaitingDimensions,
    Negotiating,
    Running,
    Failed,
    Disposed,
}

impl fmt::Display for PanelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identity and inputs of a new panel
pub struct PanelParams<'a> {
    pub number: u32,
    pub module: &'a str,
    pub organization: &'a str,
    pub build: ResolvedBuild,
    pub config: &'a BridgeConfig,
}

pub struct PanelController {
    session: PanelSession,
    state: PanelState,
    surface: Option<Box<dyn Surface>>,
    terminal: Option<Box<dyn Terminal>>,
    plan: LaunchPlan,
    dimensions_request: DimensionsRequest,
    build: ResolvedBuild,
}

impl PanelController {
    /// Open the surface and spawn the shell. On spawn failure the error is shown,
    /// the surface released and the error returned; no process is left behind.
    pub fn open(
        params: PanelParams<'_>,
        surfaces: &dyn SurfaceFactory,
        terminals: &dyn TerminalFactory,
        events: &EventSender,
    ) -> Result<Self> {
        let PanelParams {
            number,
            module,
            organization,
            build,
            config,
        } = params;

        let font_family = config.effective_font_family();
        let font_size = config.effective_font_size();
        let session = PanelSession::new(number, module, organization, &font_family, font_size);
        let name = session.name();

        let surface = surfaces.open(number, &name, events.clone())?;

        let plan = LaunchPlan {
            platform: build.platform,
            bin_dir: config.install_dir.join(build.platform.bin_dir_name()),
            executable: config.executable.clone(),
            database: config.database.clone(),
            organization: organization.to_string(),
            module: module.to_string(),
            panel_number: number,
        };

        let dimensions_request = DimensionsRequest {
            settings: config.surface_settings(),
            renderer_type: RENDERER_TYPE.to_string(),
            font_family,
            font_size,
            letter_spacing: LETTER_SPACING,
            line_height: LINE_HEIGHT,
        };

        let mut controller = Self {
            session,
            state: PanelState::Created,
            surface: Some(surface),
            terminal: None,
            plan,
            dimensions_request,
            build,
        };

        log::info!(
            "[Panel {}] Opening {} with F18 {} ({})",
            number,
            name,
            controller.build.revision,
            controller.build.platform
        );

        let request = SpawnRequest {
            name,
            shell: shell_for(controller.build.platform).to_string(),
            cwd: None,
            cols: PLACEHOLDER_COLS,
            rows: PLACEHOLDER_ROWS,
        };

        match terminals.spawn(&request, events.clone()) {
            Ok(terminal) => {
                let pid = terminal.pid();
                controller.terminal = Some(terminal);
                controller.state = PanelState::AwaitingProcessReady;
                let _ = events.send(BridgeEvent::ProcessReady { panel: number, pid });
                Ok(controller)
            }
            Err(e) => {
                let err = if matches!(e, BridgeError::Spawn(_)) {
                    e
                } else {
                    BridgeError::Spawn(e.to_string())
                };
                Err(controller.fail(err))
            }
        }
    }

    pub fn number(&self) -> u32 {
        self.session.id
    }

    pub fn name(&self) -> String {
        self.session.name()
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn session(&self) -> &PanelSession {
        &self.session
    }

    pub fn build(&self) -> &ResolvedBuild {
        &self.build
    }

    pub fn is_disposed(&self) -> bool {
        self.state == PanelState::Disposed
    }

    /// React to one event. Events for other panels are ignored.
    /// An `Err` is a fatal handshake error; the panel has already been disposed.
    pub fn handle(&mut self, event: &BridgeEvent) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }

        match event {
            BridgeEvent::ProcessReady { panel, pid } if *panel == self.number() => self.on_process_ready(*pid),
            BridgeEvent::Surface { panel, message } if *panel == self.number() => self.on_message(message),
            BridgeEvent::SurfaceClosed { panel } if *panel == self.number() => {
                log::info!("[Panel {}] Surface closed by host", self.number());
                // Already gone on the host side
                self.surface = None;
                self.dispose();
                Ok(())
            }
            BridgeEvent::Output { session, data } if *session == self.name() => {
                self.on_output(data);
                Ok(())
            }
            BridgeEvent::Exited { session, code } if *session == self.name() => {
                log::info!("[Panel {}] Terminal exited ({:?})", self.number(), code);
                self.dispose();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_process_ready(&mut self, pid: Option<u32>) -> Result<()> {
        if self.state != PanelState::AwaitingProcessReady {
            return Ok(());
        }

        if pid.is_none() {
            return Err(self.fail(BridgeError::ProcessNotCreated(format!(
                "no process id for {}",
                self.name()
            ))));
        }

        log::debug!("[Panel {}] Process {:?} ready, requesting dimensions", self.number(), pid);
        let request = BridgeMessage::TermGetDimensions(self.dimensions_request.clone());
        if let Err(e) = self.post(&request) {
            return Err(self.fail(e));
        }
        self.state = PanelState::AwaitingDimensions;
        Ok(())
    }

    fn on_message(&mut self, message: &SurfaceMessage) -> Result<()> {
        match message {
            SurfaceMessage::Alert(text) => {
                if let Some(surface) = self.surface.as_mut() {
                    surface.notify_error(text);
                }
                Ok(())
            }
            SurfaceMessage::CliDimensions(payload) => match self.state {
                PanelState::AwaitingDimensions => {
                    self.state = PanelState::Negotiating;
                    match parse_geometry(payload) {
                        Ok(geometry) => self.negotiate(geometry),
                        Err(e) => Err(self.fail(e)),
                    }
                }
                PanelState::Running => {
                    match parse_geometry(payload) {
                        Ok(geometry) => {
                            log::debug!(
                                "[Panel {}] Re-negotiated {}x{}",
                                self.number(),
                                geometry.cols,
                                geometry.rows
                            );
                            self.session.apply(geometry);
                            self.resize_to_current();
                        }
                        Err(e) => log::warn!("[Panel {}] Ignoring re-negotiation: {}", self.number(), e),
                    }
                    Ok(())
                }
                _ => Ok(()),
            },
            SurfaceMessage::CliFocus => {
                self.resize_to_current();
                Ok(())
            }
            SurfaceMessage::CliInput(text) => {
                if self.state != PanelState::Running {
                    return Ok(());
                }
                if let Some(terminal) = self.terminal.as_mut() {
                    if let Err(e) = terminal.write(text, false) {
                        log::warn!("[Panel {}] Input dropped: {}", self.session.id, e);
                    }
                }
                Ok(())
            }
        }
    }

    fn negotiate(&mut self, geometry: Geometry) -> Result<()> {
        self.session.apply(geometry);
        log::info!(
            "[Panel {}] Negotiated {}x{} ({}x{} px)",
            self.number(),
            geometry.cols,
            geometry.rows,
            geometry.width,
            geometry.height
        );

        self.resize_to_current();

        let create = BridgeMessage::TermCreate(TermOptions::for_session(&self.session));
        if let Err(e) = self.post(&create) {
            return Err(self.fail(e));
        }

        let command = self.plan.command(geometry);
        if let Some(terminal) = self.terminal.as_mut() {
            if let Err(e) = terminal.write(&command, true) {
                return Err(self.fail(BridgeError::Spawn(format!("launch command not delivered: {}", e))));
            }
        }

        self.state = PanelState::Running;
        Ok(())
    }

    /// Resize to the negotiated geometry; nothing happens before one is known
    fn resize_to_current(&mut self) {
        let Some(geometry) = self.session.geometry() else {
            return;
        };
        if let Some(terminal) = self.terminal.as_mut() {
            if let Err(e) = terminal.resize(geometry.cols, geometry.rows) {
                log::warn!("[Panel {}] Resize failed: {}", self.session.id, e);
            }
        }
    }

    fn on_output(&mut self, data: &str) {
        if self.state != PanelState::Running {
            return;
        }
        let message = BridgeMessage::TermWrite(data.to_string());
        if let Err(e) = self.post(&message) {
            log::warn!("[Panel {}] Output dropped: {}", self.session.id, e);
        }
    }

    fn post(&mut self, message: &BridgeMessage) -> Result<()> {
        match self.surface.as_mut() {
            Some(surface) => surface.post(message),
            None => Err(BridgeError::Surface(format!("{} sent after surface closed", message.command()))),
        }
    }

    /// Report a fatal error, then dispose. Returns the error for propagation.
    fn fail(&mut self, err: BridgeError) -> BridgeError {
        log::error!("[Panel {}] {} failed in {}: {}", self.session.id, self.name(), self.state, err);
        self.state = PanelState::Failed;
        if let Some(surface) = self.surface.as_mut() {
            surface.notify_error(&err.to_string());
        }
        self.dispose();
        err
    }

    /// Terminate the process and release the surface; idempotent
    pub fn dispose(&mut self) {
        if self.is_disposed() {
            return;
        }
        log::info!("[Panel {}] Disposing {}", self.session.id, self.name());

        if let Some(mut terminal) = self.terminal.take() {
            terminal.dispose();
        }
        if let Some(mut surface) = self.surface.take() {
            surface.close();
        }
        self.state = PanelState::Disposed;
    }
}

impl Drop for PanelController {
    fn drop(&mut self) {
        self.dispose();
    }
}
