/// PTY Service
/// One OS process wired to a pseudo-terminal, owned by exactly one panel.
/// Output and exit are reported as events on the bridge channel; the session
/// itself is only driven from the dispatcher thread.

use crate::error::{BridgeError, Result};
use crate::models::{BridgeEvent, EventSender};
use parking_lot::Mutex;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

/// What the panel asks for when it needs a terminal
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    /// Unique among live sessions; exit events carry it back
    pub name: String,
    pub shell: String,
    pub cwd: Option<PathBuf>,
    pub cols: u16,
    pub rows: u16,
}

/// Process-backed terminal as seen by a panel
pub trait Terminal: Send {
    fn name(&self) -> &str;

    /// OS process id, `None` if the OS did not report one
    fn pid(&self) -> Option<u32>;

    /// Send input; a no-op once the process has exited
    fn write(&mut self, text: &str, append_newline: bool) -> Result<()>;

    /// Resize the pseudo-terminal; a no-op for 0x0 or after exit
    fn resize(&mut self, cols: u16, rows: u16) -> Result<()>;

    /// Terminate the process if still running; idempotent
    fn dispose(&mut self);
}

pub trait TerminalFactory: Send {
    fn spawn(&self, request: &SpawnRequest, events: EventSender) -> Result<Box<dyn Terminal>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    Running,
    Exited(Option<u32>),
}

/// `portable-pty` backed terminal
pub struct PtySession {
    name: String,
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    pid: Option<u32>,
    status: Arc<Mutex<SessionStatus>>,
    disposed: bool,
}

impl PtySession {
    pub fn spawn(request: &SpawnRequest, events: EventSender) -> Result<Self> {
        if request.cols == 0 || request.rows == 0 {
            return Err(BridgeError::Spawn(format!(
                "invalid initial size {}x{}",
                request.cols, request.rows
            )));
        }

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: request.rows,
                cols: request.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BridgeError::Spawn(format!("Failed to open PTY: {}", e)))?;

        let mut cmd = CommandBuilder::new(&request.shell);
        if let Some(cwd) = &request.cwd {
            cmd.cwd(cwd);
        }

        // Set environment variables for proper terminal
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BridgeError::Spawn(format!("Failed to spawn {}: {}", request.shell, e)))?;
        // Our copy of the slave must go or the reader never sees EOF
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BridgeError::Spawn(format!("Failed to get PTY reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| BridgeError::Spawn(format!("Failed to get PTY writer: {}", e)))?;

        let killer = child.clone_killer();
        let pid = child.process_id();
        let status = Arc::new(Mutex::new(SessionStatus::Running));

        let session = request.name.clone();
        let output_events = events.clone();
        thread::spawn(move || {
            let mut buf = [0u8; 8192];
            let mut carry = Vec::new();
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let data = decode_chunk(&mut carry, &buf[..n]);
                        if data.is_empty() {
                            continue;
                        }
                        let event = BridgeEvent::Output {
                            session: session.clone(),
                            data,
                        };
                        if output_events.send(event).is_err() {
                            break;
                        }
                    }
                }
            }
            if !carry.is_empty() {
                let data = String::from_utf8_lossy(&carry).into_owned();
                let _ = output_events.send(BridgeEvent::Output { session, data });
            }
        });

        let session = request.name.clone();
        let exit_status = status.clone();
        thread::spawn(move || {
            let code = child.wait().ok().map(|s| s.exit_code());
            *exit_status.lock() = SessionStatus::Exited(code);
            log::info!("[Pty] {} exited with {:?}", session, code);
            let _ = events.send(BridgeEvent::Exited { session, code });
        });

        log::info!(
            "[Pty] Spawned {} ({}) as {:?} at {}x{}",
            request.name,
            request.shell,
            pid,
            request.cols,
            request.rows
        );

        Ok(Self {
            name: request.name.clone(),
            master: pair.master,
            writer,
            killer,
            pid,
            status,
            disposed: false,
        })
    }

    fn is_live(&self) -> bool {
        !self.disposed && *self.status.lock() == SessionStatus::Running
    }
}

impl Terminal for PtySession {
    fn name(&self) -> &str {
        &self.name
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn write(&mut self, text: &str, append_newline: bool) -> Result<()> {
        if !self.is_live() {
            log::debug!("[Pty] Dropping input for finished session {}", self.name);
            return Ok(());
        }

        let mut payload = text.as_bytes().to_vec();
        if append_newline {
            payload.push(b'\r');
        }
        let result = self.writer.write_all(&payload).and_then(|_| self.writer.flush());

        match result {
            Ok(()) => Ok(()),
            // Raced with process exit
            Err(_) if !self.is_live() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        if cols == 0 || rows == 0 || !self.is_live() {
            return Ok(());
        }
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BridgeError::Io(std::io::Error::other(e.to_string())))
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if *self.status.lock() != SessionStatus::Running {
            return;
        }

        log::info!("[Pty] Terminating {}", self.name);

        // Kill process group (shell + F18)
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGTERM);
                }
                let status = self.status.clone();
                thread::spawn(move || {
                    thread::sleep(std::time::Duration::from_millis(100));
                    if *status.lock() == SessionStatus::Running {
                        unsafe {
                            libc::kill(-(pid as i32), libc::SIGKILL);
                        }
                    }
                });
                return;
            }
        }

        // cmd.exe and F18.exe form a tree; killing the shell alone orphans F18
        #[cfg(windows)]
        {
            if let Some(pid) = self.pid {
                if kill_tree(pid) {
                    return;
                }
            }
        }

        let _ = self.killer.kill();
    }
}

/// `taskkill` arguments that force-kill `pid` and all of its descendants
#[cfg_attr(not(windows), allow(dead_code))]
fn tree_kill_args(pid: u32) -> [String; 4] {
    ["/F".to_string(), "/T".to_string(), "/PID".to_string(), pid.to_string()]
}

#[cfg(windows)]
fn kill_tree(pid: u32) -> bool {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    match std::process::Command::new("taskkill")
        .args(tree_kill_args(pid))
        .creation_flags(CREATE_NO_WINDOW)
        .output()
    {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            log::warn!(
                "[Pty] taskkill for {} failed: {}",
                pid,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        }
        Err(e) => {
            log::warn!("[Pty] taskkill for {} failed: {}", pid, e);
            false
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Spawns real PTY sessions
#[derive(Debug, Default, Clone, Copy)]
pub struct PtyFactory;

impl TerminalFactory for PtyFactory {
    fn spawn(&self, request: &SpawnRequest, events: EventSender) -> Result<Box<dyn Terminal>> {
        Ok(Box::new(PtySession::spawn(request, events)?))
    }
}

/// Decode a chunk as UTF-8, holding back a trailing partial character for the next read
fn decode_chunk(carry: &mut Vec<u8>, chunk: &[u8]) -> String {
    carry.extend_from_slice(chunk);

    let keep = match std::str::from_utf8(&carry[..]) {
        Ok(_) => 0,
        Err(e) if e.error_len().is_none() => carry.len() - e.valid_up_to(),
        Err(_) => 0,
    };

    let tail = carry.split_off(carry.len() - keep);
    let text = String::from_utf8_lossy(&carry[..]).into_owned();
    *carry = tail;
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_multibyte_character_is_reassembled() {
        let bytes = "čćž".as_bytes();
        let mut carry = Vec::new();

        let first = decode_chunk(&mut carry, &bytes[..3]);
        assert_eq!(first, "č");
        assert_eq!(carry.len(), 1);

        let second = decode_chunk(&mut carry, &bytes[3..]);
        assert_eq!(second, "ćž");
        assert!(carry.is_empty());
    }

    #[test]
    fn tree_kill_covers_descendants() {
        assert_eq!(tree_kill_args(4242), ["/F", "/T", "/PID", "4242"]);
    }

    #[test]
    fn invalid_bytes_are_replaced_not_held() {
        let mut carry = Vec::new();
        let text = decode_chunk(&mut carry, &[b'a', 0xff, b'b']);
        assert_eq!(text, "a\u{fffd}b");
        assert!(carry.is_empty());
    }

    #[test]
    fn zero_size_spawn_is_rejected() {
        let (tx, _rx) = std::sync::mpsc::channel();
        let request = SpawnRequest {
            name: "F18 pos - 1".to_string(),
            shell: "/bin/sh".to_string(),
            cwd: None,
            cols: 0,
            rows: 0,
        };
        assert!(matches!(PtySession::spawn(&request, tx), Err(BridgeError::Spawn(_))));
    }

    #[cfg(unix)]
    #[test]
    #[ignore = "needs a pseudo-terminal device"]
    fn session_echoes_output_and_reports_exit_once() {
        use std::time::Duration;

        let (tx, rx) = std::sync::mpsc::channel();
        let request = SpawnRequest {
            name: "F18 cmd - 1".to_string(),
            shell: "/bin/sh".to_string(),
            cwd: None,
            cols: 80,
            rows: 24,
        };
        let mut session = PtySession::spawn(&request, tx).unwrap();
        assert!(session.pid().is_some());

        session.write("echo bridge-ok; exit", true).unwrap();

        let mut output = String::new();
        let mut exits = 0;
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(10)) {
            match event {
                BridgeEvent::Output { data, .. } => output.push_str(&data),
                BridgeEvent::Exited { session: name, .. } => {
                    assert_eq!(name, "F18 cmd - 1");
                    exits += 1;
                }
                _ => {}
            }
        }
        assert!(output.contains("bridge-ok"));
        assert_eq!(exits, 1);

        // Use after termination is tolerated
        session.write("ignored", true).unwrap();
        session.resize(100, 30).unwrap();
        session.dispose();
        session.dispose();
    }
}
