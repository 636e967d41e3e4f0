/// Services module
/// Business logic of the bridge: build resolution, PTY sessions, geometry,
/// the per-panel handshake and the registry that owns every panel.

pub mod geometry;
pub mod launch;
pub mod panel;
pub mod platform;
pub mod pty;
pub mod registry;

pub use panel::{PanelController, PanelState, Surface, SurfaceFactory};
pub use platform::{BuildChannel, PlatformKey, PlatformResolver, ReleaseCatalog, ResolvedBuild};
pub use pty::{PtyFactory, PtySession, Terminal, TerminalFactory};
pub use registry::{BridgeHandle, PanelRegistry};
