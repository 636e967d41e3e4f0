use f18_bridge_lib::config::BridgeConfig;
use f18_bridge_lib::error::{BridgeError, Result};
use f18_bridge_lib::models::{BridgeEvent, BridgeMessage, EventSender, SurfaceMessage};
use f18_bridge_lib::services::platform::{BuildChannel, ChannelRelease, PlatformKey, PlatformResolver, ReleaseCatalog};
use f18_bridge_lib::services::pty::SpawnRequest;
use f18_bridge_lib::services::{PanelRegistry, PanelState, Surface, SurfaceFactory, Terminal, TerminalFactory};
use serde_json::json;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct World {
    posts: Vec<(u32, BridgeMessage)>,
    spawned: Vec<SpawnRequest>,
    writes: Vec<String>,
    resizes: Vec<(u16, u16)>,
    killed: usize,
}

type Shared = Arc<Mutex<World>>;

struct TestSurface {
    panel: u32,
    world: Shared,
}

impl Surface for TestSurface {
    fn post(&mut self, message: &BridgeMessage) -> Result<()> {
        self.world.lock().unwrap().posts.push((self.panel, message.clone()));
        Ok(())
    }
    fn notify_error(&mut self, _message: &str) {}
    fn close(&mut self) {}
}

struct TestSurfaces(Shared);

impl SurfaceFactory for TestSurfaces {
    fn open(&self, panel: u32, _title: &str, _events: EventSender) -> Result<Box<dyn Surface>> {
        Ok(Box::new(TestSurface {
            panel,
            world: self.0.clone(),
        }))
    }
    fn notify_error(&self, _message: &str) {}
}

struct TestTerminal {
    name: String,
    world: Shared,
    alive: bool,
}

impl Terminal for TestTerminal {
    fn name(&self) -> &str {
        &self.name
    }
    fn pid(&self) -> Option<u32> {
        Some(100)
    }
    fn write(&mut self, text: &str, _append_newline: bool) -> Result<()> {
        if self.alive {
            self.world.lock().unwrap().writes.push(text.to_string());
        }
        Ok(())
    }
    fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        if self.alive && cols > 0 && rows > 0 {
            self.world.lock().unwrap().resizes.push((cols, rows));
        }
        Ok(())
    }
    fn dispose(&mut self) {
        if self.alive {
            self.alive = false;
            self.world.lock().unwrap().killed += 1;
        }
    }
}

struct TestTerminals(Shared);

impl TerminalFactory for TestTerminals {
    fn spawn(&self, request: &SpawnRequest, _events: EventSender) -> Result<Box<dyn Terminal>> {
        self.0.lock().unwrap().spawned.push(request.clone());
        Ok(Box::new(TestTerminal {
            name: request.name.clone(),
            world: self.0.clone(),
            alive: true,
        }))
    }
}

fn legacy(revision: &str, entries: &[(&str, &str)]) -> ChannelRelease {
    let hashes: HashMap<String, String> = entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ChannelRelease::from_legacy(revision, &hashes)
}

fn registry(platform: PlatformKey, catalog: ReleaseCatalog) -> (PanelRegistry, Receiver<BridgeEvent>, Shared) {
    let world = Shared::default();
    let (tx, rx) = mpsc::channel();
    let config = BridgeConfig {
        install_dir: "/srv/f18".into(),
        catalog,
        ..BridgeConfig::default()
    };
    let registry = PanelRegistry::new(
        config,
        PlatformResolver::new(platform),
        Box::new(TestSurfaces(world.clone())),
        Box::new(TestTerminals(world.clone())),
        tx,
    );
    (registry, rx, world)
}

fn pump(registry: &mut PanelRegistry, rx: &Receiver<BridgeEvent>) {
    while let Ok(event) = rx.try_recv() {
        registry.dispatch(event);
    }
}

fn dimensions(panel: u32, value: serde_json::Value) -> BridgeEvent {
    BridgeEvent::Surface {
        panel,
        message: SurfaceMessage::CliDimensions(value),
    }
}

#[test]
fn resolves_direct_build() {
    let catalog = ReleaseCatalog::new().with_channel(BuildChannel::S, legacy("4.22.58", &[("linux-x64", "abc")]));
    let mut resolver = PlatformResolver::new(PlatformKey::LinuxX64);

    let build = resolver.resolve(BuildChannel::S, &catalog).unwrap();
    assert_eq!(build.revision, "4.22.58");
    assert_eq!(build.exec_hash, "abc");
}

#[test]
fn resolves_previous_build_when_platform_missing() {
    let catalog = ReleaseCatalog::new().with_channel(
        BuildChannel::S,
        legacy(
            "4.23.28",
            &[
                ("windows-x64", "0"),
                ("windows-x64-prev", "607271"),
                ("windows-x64-prev-rev", "4.23.26"),
            ],
        ),
    );
    let mut resolver = PlatformResolver::new(PlatformKey::WindowsX64);

    let build = resolver.resolve(BuildChannel::S, &catalog).unwrap();
    assert_eq!(build.revision, "4.23.26");
    assert_eq!(build.exec_hash, "607271");
    assert_eq!(resolver.fallback_notices().len(), 1);
}

#[test]
fn full_handshake_launches_f18() {
    let catalog = ReleaseCatalog::new().with_channel(BuildChannel::S, legacy("4.22.58", &[("linux-x64", "abc")]));
    let (mut registry, rx, world) = registry(PlatformKey::LinuxX64, catalog);

    registry.dispatch(BridgeEvent::Open {
        module: "pos".to_string(),
        organization: Some("firma".to_string()),
    });
    pump(&mut registry, &rx);
    assert_eq!(registry.panel(1).unwrap().state(), PanelState::AwaitingDimensions);

    registry.dispatch(dimensions(1, json!({ "cols": 120, "rows": 40, "width": 960, "height": 720 })));
    assert_eq!(registry.panel(1).unwrap().state(), PanelState::Running);

    let world = world.lock().unwrap();
    assert_eq!(world.resizes, vec![(120, 40)]);

    let commands: Vec<&str> = world.posts.iter().map(|(_, m)| m.command()).collect();
    assert_eq!(commands, vec!["term-get-dimensions", "term-create"]);

    let create = serde_json::to_value(&world.posts[1].1).unwrap();
    assert_eq!(create["data"]["cols"], 120);
    assert_eq!(create["data"]["rows"], 40);

    assert_eq!(
        world.writes,
        vec![
            "stty cols 120 rows 40; reset; cd /srv/f18/linux; \
             ./F18 2>pos_1.log -h localhost -y 5432 -u postgres -p '' -d firma --pos; exit"
        ]
    );
}

#[test]
fn malformed_dimensions_never_reach_running() {
    let (mut registry, rx, world) = registry(PlatformKey::WindowsX64, ReleaseCatalog::builtin());
    let panel = registry.create_panel("fin", "proba_2018").unwrap();
    pump(&mut registry, &rx);

    registry.dispatch(dimensions(panel, json!({ "cols": 0, "rows": 40, "width": 960, "height": 720 })));

    assert!(registry.panel(panel).is_none());
    let world = world.lock().unwrap();
    assert!(world.writes.is_empty());
    assert!(world.resizes.is_empty());
    assert_eq!(world.killed, 1);
}

#[test]
fn output_flows_to_the_owning_panel_in_order() {
    let (mut registry, rx, world) = registry(PlatformKey::LinuxX64, ReleaseCatalog::builtin());
    for module in ["fin", "kalk"] {
        registry.create_panel(module, "proba_2018").unwrap();
    }
    pump(&mut registry, &rx);
    for panel in [1, 2] {
        registry.dispatch(dimensions(panel, json!("{\"cols\":80,\"rows\":24,\"width\":640,\"height\":480}")));
    }

    for data in ["a", "b", "c"] {
        registry.dispatch(BridgeEvent::Output {
            session: "F18 kalk - 2".to_string(),
            data: data.to_string(),
        });
    }

    let world = world.lock().unwrap();
    let written: Vec<(u32, String)> = world
        .posts
        .iter()
        .filter_map(|(panel, m)| match m {
            BridgeMessage::TermWrite(data) => Some((*panel, data.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        written,
        vec![(2, "a".to_string()), (2, "b".to_string()), (2, "c".to_string())]
    );
}

#[test]
fn no_build_means_no_panel() {
    let (mut registry, _rx, world) = registry(PlatformKey::LinuxX86, ReleaseCatalog::builtin());
    let err = registry.create_panel("fin", "proba_2018").unwrap_err();

    assert!(matches!(err, BridgeError::NoBuildAvailable { platform: PlatformKey::LinuxX86, .. }));
    assert!(world.lock().unwrap().spawned.is_empty());
    assert!(registry.live_panels().is_empty());
}
