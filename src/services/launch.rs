/// Launch command construction
/// Builds the line typed into the panel's shell once geometry is negotiated:
/// set geometry, clear the screen, enter the binary directory, run F18 with its
/// connection flags and stderr redirected to a per-panel log, then exit.

use crate::config::DatabaseConfig;
use crate::models::Geometry;
use crate::services::platform::PlatformKey;
use shell_words::quote;
use std::borrow::Cow;
use std::path::PathBuf;

/// Shell the panel's terminal runs
pub fn shell_for(platform: PlatformKey) -> &'static str {
    if platform.is_windows() {
        "cmd.exe"
    } else {
        "/bin/bash"
    }
}

/// Everything needed to start F18 in one panel
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub platform: PlatformKey,
    pub bin_dir: PathBuf,
    pub executable: String,
    pub database: DatabaseConfig,
    pub organization: String,
    pub module: String,
    pub panel_number: u32,
}

impl LaunchPlan {
    pub fn log_file(&self) -> String {
        format!("{}_{}.log", self.module, self.panel_number)
    }

    /// Connection flags in fixed order, every value quoted as one word
    fn f18_args(&self, quote_word: fn(&str) -> Cow<'_, str>) -> String {
        let port = self.database.port.to_string();
        format!(
            "-h {} -y {} -u {} -p {} -d {} --{}",
            quote_word(&self.database.host),
            quote_word(&port),
            quote_word(&self.database.user),
            quote_word(&self.database.password),
            quote_word(&self.organization),
            self.module
        )
    }

    /// Full command line for the given geometry, in the platform's shell dialect
    pub fn command(&self, geometry: Geometry) -> String {
        if self.platform.is_windows() {
            let executable = format!("{}.exe", self.executable);
            let steps = [
                format!("mode con: cols={} lines={}", geometry.cols, geometry.rows),
                "cls".to_string(),
                format!("cd /d {}", quote_batch(&self.bin_dir.to_string_lossy())),
                format!(
                    "{} 2>{} {}",
                    quote_batch(&executable),
                    self.log_file(),
                    self.f18_args(quote_batch)
                ),
                "exit".to_string(),
            ];
            steps.join("& ")
        } else {
            let executable = format!("./{}", self.executable);
            let steps = [
                format!("stty cols {} rows {}", geometry.cols, geometry.rows),
                "reset".to_string(),
                format!("cd {}", quote(&self.bin_dir.to_string_lossy())),
                format!(
                    "{} 2>{} {}",
                    quote(&executable),
                    self.log_file(),
                    self.f18_args(quote)
                ),
                "exit".to_string(),
            ];
            steps.join("; ")
        }
    }
}

/// Characters a cmd.exe line cannot carry safely, even inside double quotes
pub const BATCH_UNSAFE: [char; 3] = ['"', '%', '!'];

/// Double-quote a cmd.exe word when it is empty or holds separators.
/// Values containing [`BATCH_UNSAFE`] characters are rejected by configuration
/// validation before they get here.
fn quote_batch(raw: &str) -> Cow<'_, str> {
    let plain = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "\\/:._-+@".contains(c));
    if plain {
        Cow::Borrowed(raw)
    } else {
        Cow::Owned(format!("\"{}\"", raw))
    }
}
