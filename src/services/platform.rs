/// Platform Resolver
/// Picks the F18 build to launch for this OS/architecture and release channel,
/// falling back one revision when the current one was not built for the platform.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Hash value that marks "not built for this platform" in legacy catalogs
pub const MISSING_BUILD_SENTINEL: &str = "0";

/// OS/architecture key used to index release catalogs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformKey {
    #[serde(rename = "linux-x64")]
    LinuxX64,
    #[serde(rename = "linux-x86")]
    LinuxX86,
    #[serde(rename = "windows-x64")]
    WindowsX64,
    #[serde(rename = "windows-x86")]
    WindowsX86,
    #[serde(rename = "mac")]
    Mac,
}

impl PlatformKey {
    pub const ALL: [PlatformKey; 5] = [
        PlatformKey::LinuxX64,
        PlatformKey::LinuxX86,
        PlatformKey::WindowsX64,
        PlatformKey::WindowsX86,
        PlatformKey::Mac,
    ];

    /// Platform of the running process
    pub fn detect() -> Result<Self> {
        Self::from_os_arch(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map an OS name and CPU architecture to a key.
    ///
    /// Anything that is not a 64-bit x86 CPU is treated as the x86 build,
    /// which is the only other architecture F18 ships for.
    pub fn from_os_arch(os: &str, arch: &str) -> Result<Self> {
        let x64 = matches!(arch, "x86_64" | "x64" | "amd64");
        match os {
            "macos" | "darwin" => Ok(PlatformKey::Mac),
            "linux" if x64 => Ok(PlatformKey::LinuxX64),
            "linux" => Ok(PlatformKey::LinuxX86),
            "windows" | "win32" if x64 => Ok(PlatformKey::WindowsX64),
            "windows" | "win32" => Ok(PlatformKey::WindowsX86),
            _ => Err(BridgeError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKey::LinuxX64 => "linux-x64",
            PlatformKey::LinuxX86 => "linux-x86",
            PlatformKey::WindowsX64 => "windows-x64",
            PlatformKey::WindowsX86 => "windows-x86",
            PlatformKey::Mac => "mac",
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, PlatformKey::WindowsX64 | PlatformKey::WindowsX86)
    }

    /// Directory under the install root that holds this platform's binaries
    pub fn bin_dir_name(&self) -> &'static str {
        match self {
            PlatformKey::LinuxX64 | PlatformKey::LinuxX86 => "linux",
            PlatformKey::WindowsX64 | PlatformKey::WindowsX86 => "win32",
            PlatformKey::Mac => "mac",
        }
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named release track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BuildChannel {
    #[default]
    S,
    E,
    X,
}

impl fmt::Display for BuildChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildChannel::S => "S",
            BuildChannel::E => "E",
            BuildChannel::X => "X",
        };
        f.write_str(name)
    }
}

/// Previous known-good build for a platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackBuild {
    pub hash: String,
    pub revision: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformBuild {
    /// `None` when the channel's revision was not built for the platform
    #[serde(deserialize_with = "deserialize_hash")]
    pub hash: Option<String>,
    pub fallback: Option<FallbackBuild>,
}

fn is_build_hash(hash: &str) -> bool {
    !hash.is_empty() && hash != MISSING_BUILD_SENTINEL
}

/// The sentinel and the empty string both mean "no build"
fn deserialize_hash<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let hash = Option::<String>::deserialize(deserializer)?;
    Ok(hash.filter(|h| is_build_hash(h)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRelease {
    pub revision: String,
    #[serde(default)]
    pub platforms: HashMap<PlatformKey, PlatformBuild>,
}

impl ChannelRelease {
    /// Build a release from the flat legacy layout: `"<platform>"` holds the hash
    /// (or the `"0"` sentinel), `"<platform>-prev"` and `"<platform>-prev-rev"` the
    /// fallback hash and revision. A fallback missing either half is dropped.
    pub fn from_legacy(revision: &str, hashes: &HashMap<String, String>) -> Self {
        let mut platforms = HashMap::new();

        for key in PlatformKey::ALL {
            let hash = hashes
                .get(key.as_str())
                .filter(|h| is_build_hash(h))
                .cloned();

            let prev_hash = hashes.get(&format!("{}-prev", key));
            let prev_rev = hashes.get(&format!("{}-prev-rev", key));
            let fallback = match (prev_hash, prev_rev) {
                (Some(hash), Some(revision)) => Some(FallbackBuild {
                    hash: hash.clone(),
                    revision: revision.clone(),
                }),
                _ => None,
            };

            if hash.is_some() || fallback.is_some() {
                platforms.insert(key, PlatformBuild { hash, fallback });
            }
        }

        Self {
            revision: revision.to_string(),
            platforms,
        }
    }
}

/// Per-channel release data, loaded once from configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseCatalog {
    channels: HashMap<BuildChannel, ChannelRelease>,
}

impl ReleaseCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: BuildChannel, release: ChannelRelease) -> Self {
        self.channels.insert(channel, release);
        self
    }

    pub fn channel(&self, channel: BuildChannel) -> Option<&ChannelRelease> {
        self.channels.get(&channel)
    }

    /// Catalog shipped with the bridge
    pub fn builtin() -> Self {
        fn legacy(revision: &str, entries: &[(&str, &str)]) -> ChannelRelease {
            let hashes = entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            ChannelRelease::from_legacy(revision, &hashes)
        }

        Self::new()
            .with_channel(
                BuildChannel::S,
                legacy(
                    "4.22.58",
                    &[
                        ("linux-x64", "087bf6069ee42b6d4f9373dfa97127dc"),
                        ("windows-x64", "213a8721ffb2ec9d8ba7fb5d5034e0f3"),
                        ("windows-x86", "64159523474d5d459db855a0aaa0f5ad"),
                    ],
                ),
            )
            .with_channel(
                BuildChannel::E,
                legacy(
                    "4.22.57",
                    &[
                        ("linux-x64", "d86b86f8579541f5e486fdc48f0b6604"),
                        ("windows-x64", "173ccf0dc6bedb567f03dc52341634f2"),
                        ("windows-x86", "c1f07f06cbdd497ae4c68a7dc4ab4236"),
                    ],
                ),
            )
            .with_channel(
                BuildChannel::X,
                legacy(
                    "4.22.54",
                    &[
                        ("linux-x64", "c78ba866980fd1b06783395444dd4959"),
                        ("windows-x64", "f323249688a560aaec816372c16c600a"),
                        ("windows-x86", "adb7667247a5c498567576af3b2fb42a"),
                    ],
                ),
            )
    }
}

/// Build chosen for this process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedBuild {
    pub revision: String,
    pub exec_hash: String,
    pub platform: PlatformKey,
}

/// Recorded whenever a fallback build replaces the requested revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackNotice {
    pub channel: BuildChannel,
    pub platform: PlatformKey,
    pub requested_revision: String,
    pub used_revision: String,
}

/// Resolves and caches builds per channel for one platform
pub struct PlatformResolver {
    platform: PlatformKey,
    cache: HashMap<BuildChannel, ResolvedBuild>,
    notices: Vec<FallbackNotice>,
}

impl PlatformResolver {
    pub fn new(platform: PlatformKey) -> Self {
        Self {
            platform,
            cache: HashMap::new(),
            notices: Vec::new(),
        }
    }

    /// Resolver for the host OS; fails on platforms F18 is not built for
    pub fn for_host() -> Result<Self> {
        Ok(Self::new(PlatformKey::detect()?))
    }

    pub fn platform(&self) -> PlatformKey {
        self.platform
    }

    pub fn fallback_notices(&self) -> &[FallbackNotice] {
        &self.notices
    }

    pub fn resolve(&mut self, channel: BuildChannel, catalog: &ReleaseCatalog) -> Result<ResolvedBuild> {
        if let Some(build) = self.cache.get(&channel) {
            return Ok(build.clone());
        }

        let no_build = || BridgeError::NoBuildAvailable {
            channel,
            platform: self.platform,
        };

        let release = catalog.channel(channel).ok_or_else(no_build)?;
        let entry = release.platforms.get(&self.platform);

        let build = match entry.and_then(|e| e.hash.as_ref()) {
            Some(hash) => ResolvedBuild {
                revision: release.revision.clone(),
                exec_hash: hash.clone(),
                platform: self.platform,
            },
            None => {
                let fallback = entry.and_then(|e| e.fallback.as_ref()).ok_or_else(no_build)?;

                log::warn!(
                    "[Resolver] No {} build of revision {} (channel {}), using previous revision {}",
                    self.platform,
                    release.revision,
                    channel,
                    fallback.revision
                );
                self.notices.push(FallbackNotice {
                    channel,
                    platform: self.platform,
                    requested_revision: release.revision.clone(),
                    used_revision: fallback.revision.clone(),
                });

                ResolvedBuild {
                    revision: fallback.revision.clone(),
                    exec_hash: fallback.hash.clone(),
                    platform: self.platform,
                }
            }
        };

        self.cache.insert(channel, build.clone());
        Ok(build)
    }
}
