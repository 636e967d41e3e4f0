/// Panel Registry
/// Process-wide owner of every live panel and of the panel numbering counter.
/// Runs on a single dispatcher thread: events are handled one at a time, so
/// panels never see concurrent handlers.

use crate::config::{is_known_module, is_valid_organization, BridgeConfig};
use crate::error::{BridgeError, Result};
use crate::models::{BridgeEvent, EventSender, SurfaceMessage};
use crate::services::panel::{PanelController, PanelParams, SurfaceFactory};
use crate::services::platform::{PlatformResolver, ResolvedBuild};
use crate::services::pty::TerminalFactory;
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver};
use std::thread;

pub struct PanelRegistry {
    config: BridgeConfig,
    resolver: PlatformResolver,
    surfaces: Box<dyn SurfaceFactory>,
    terminals: Box<dyn TerminalFactory>,
    events: EventSender,
    next_number: u32,
    panels: BTreeMap<u32, PanelController>,
}

impl PanelRegistry {
    pub fn new(
        config: BridgeConfig,
        resolver: PlatformResolver,
        surfaces: Box<dyn SurfaceFactory>,
        terminals: Box<dyn TerminalFactory>,
        events: EventSender,
    ) -> Self {
        Self {
            config,
            resolver,
            surfaces,
            terminals,
            events,
            next_number: 1,
            panels: BTreeMap::new(),
        }
    }

    /// Build the registry and run it on its own dispatcher thread
    pub fn start(
        config: BridgeConfig,
        resolver: PlatformResolver,
        surfaces: Box<dyn SurfaceFactory>,
        terminals: Box<dyn TerminalFactory>,
    ) -> Result<(BridgeHandle, thread::JoinHandle<()>)> {
        let (tx, rx) = mpsc::channel();
        let registry = Self::new(config, resolver, surfaces, terminals, tx.clone());

        let dispatcher = thread::Builder::new()
            .name("panel-dispatcher".to_string())
            .spawn(move || registry.run(rx))?;

        Ok((BridgeHandle { events: tx }, dispatcher))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn panel(&self, number: u32) -> Option<&PanelController> {
        self.panels.get(&number)
    }

    /// Numbers of live panels, ascending
    pub fn live_panels(&self) -> Vec<u32> {
        self.panels.keys().copied().collect()
    }

    /// Create a panel for `module`. Build resolution happens first so a
    /// failure leaves no surface or process behind.
    pub fn create_panel(&mut self, module: &str, organization: &str) -> Result<u32> {
        let build = match self.precheck(module, organization) {
            Ok(build) => build,
            Err(e) => {
                log::error!("[Registry] Cannot open {}: {}", module, e);
                self.surfaces.notify_error(&e.to_string());
                return Err(e);
            }
        };

        let number = self.next_number;
        self.next_number += 1;

        let params = PanelParams {
            number,
            module,
            organization,
            build,
            config: &self.config,
        };

        match PanelController::open(params, self.surfaces.as_ref(), self.terminals.as_ref(), &self.events) {
            Ok(panel) => {
                self.panels.insert(number, panel);
                Ok(number)
            }
            // Spawn failures were already shown on the panel's own surface
            Err(e @ BridgeError::Spawn(_)) => Err(e),
            Err(e) => {
                log::error!("[Registry] Panel {} failed to open: {}", number, e);
                self.surfaces.notify_error(&e.to_string());
                Err(e)
            }
        }
    }

    fn precheck(&mut self, module: &str, organization: &str) -> Result<ResolvedBuild> {
        if !is_known_module(module) {
            return Err(BridgeError::Config(format!("unknown module `{}`", module)));
        }
        // Ends up on the F18 command line
        if !is_valid_organization(organization) {
            return Err(BridgeError::Config(format!("invalid organization `{}`", organization)));
        }
        self.resolver.resolve(self.config.ver_channel, &self.config.catalog)
    }

    /// Handle one event. Returns `false` once the registry has shut down.
    pub fn dispatch(&mut self, event: BridgeEvent) -> bool {
        match &event {
            BridgeEvent::Open { module, organization } => {
                let organization = organization
                    .clone()
                    .unwrap_or_else(|| self.config.organization.clone());
                let _ = self.create_panel(module, &organization);
            }
            BridgeEvent::Shutdown => {
                self.dispose_all();
                return false;
            }
            BridgeEvent::ProcessReady { panel, .. }
            | BridgeEvent::Surface { panel, .. }
            | BridgeEvent::SurfaceClosed { panel } => match self.panels.get_mut(panel) {
                Some(controller) => {
                    let _ = controller.handle(&event);
                }
                None => log::debug!("[Registry] Event for unknown panel {}", panel),
            },
            // Terminal events are matched by session name
            BridgeEvent::Output { .. } | BridgeEvent::Exited { .. } => {
                for controller in self.panels.values_mut() {
                    let _ = controller.handle(&event);
                }
            }
        }

        self.panels.retain(|_, panel| !panel.is_disposed());
        true
    }

    pub fn dispose_all(&mut self) {
        if !self.panels.is_empty() {
            log::info!("[Registry] Disposing {} panel(s)", self.panels.len());
        }
        for panel in self.panels.values_mut() {
            panel.dispose();
        }
        self.panels.clear();
    }

    pub fn run(mut self, events: Receiver<BridgeEvent>) {
        log::info!("[Registry] Dispatcher started");
        while let Ok(event) = events.recv() {
            if !self.dispatch(event) {
                break;
            }
        }
        self.dispose_all();
        log::info!("[Registry] Dispatcher stopped");
    }
}

/// Cloneable entry point into the dispatcher for IPC handlers
#[derive(Clone)]
pub struct BridgeHandle {
    events: EventSender,
}

impl BridgeHandle {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    fn send(&self, event: BridgeEvent) -> Result<()> {
        self.events.send(event).map_err(|_| BridgeError::DispatcherStopped)
    }

    pub fn open(&self, module: &str, organization: Option<String>) -> Result<()> {
        self.send(BridgeEvent::Open {
            module: module.to_string(),
            organization,
        })
    }

    pub fn message(&self, panel: u32, message: SurfaceMessage) -> Result<()> {
        self.send(BridgeEvent::Surface { panel, message })
    }

    pub fn surface_closed(&self, panel: u32) -> Result<()> {
        self.send(BridgeEvent::SurfaceClosed { panel })
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(BridgeEvent::Shutdown)
    }

    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }
}
