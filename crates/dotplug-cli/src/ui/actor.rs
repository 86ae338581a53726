//! UI Actor - Single-threaded event processing
//!
//! Workers report from many tasks at once while the terminal is strictly
//! serial. Every reporter call becomes a [`UiEvent`] on a channel; one
//! thread owns the [`TableRenderer`] and applies events in order, so two
//! writers never interleave on stdout and the table needs no lock.

use super::table::{RowState, Severity, TableRenderer};
use super::theme::Theme;
use crossterm::style::Stylize;
use std::io::IsTerminal;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Frame interval for blinking icons.
const TICK: Duration = Duration::from_millis(100);

/// Events that can be sent to the UI actor
#[derive(Debug)]
pub enum UiEvent {
    /// Reserve rows, as `(name, version)`, in manifest order.
    Prepare { items: Vec<(String, String)> },
    /// The row's application is working on a step.
    Step { name: String, label: String },
    Downloading {
        name: String,
        current: u64,
        total: Option<u64>,
    },
    Done {
        name: String,
        detail: String,
        size: Option<u64>,
    },
    Failed { name: String, reason: String },
    Info(String),
    Warning(String),
    Error(String),
    Summary(SummaryLine),
    Shutdown,
}

/// Final tallies of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryLine {
    pub installed: usize,
    pub already_installed: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
}

impl SummaryLine {
    pub fn message(&self) -> String {
        let mut parts = vec![format!("{} installed", self.installed)];
        if self.already_installed > 0 {
            parts.push(format!("{} already installed", self.already_installed));
        }
        if self.failed > 0 {
            parts.push(format!("{} failed", self.failed));
        }
        format!("INSTALL COMPLETE {}, elapsed {:.1}s", parts.join(", "), self.elapsed_secs)
    }

    pub fn json(&self) -> serde_json::Value {
        let status = if self.failed == 0 { "success" } else { "failure" };
        serde_json::json!({
            "operation": "install",
            "status": status,
            "installed": self.installed,
            "already_installed": self.already_installed,
            "failed": self.failed,
            "elapsed": self.elapsed_secs,
        })
    }
}

/// Handle to the UI actor thread
#[derive(Debug)]
pub struct UiActor {
    sender: mpsc::Sender<UiEvent>,
    handle: Option<thread::JoinHandle<()>>,
}

impl UiActor {
    /// Spawn the actor. Rows are redrawn in place only when stdout is a
    /// terminal.
    pub fn spawn() -> Self {
        Self::spawn_with(std::io::stdout().is_terminal())
    }

    pub fn spawn_with(live: bool) -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::spawn(move || run_event_loop(&receiver, live));
        Self {
            sender,
            handle: Some(handle),
        }
    }

    /// Get a cloneable sender for this actor
    pub fn sender(&self) -> mpsc::Sender<UiEvent> {
        self.sender.clone()
    }

    /// Drain every pending event and stop the thread.
    pub fn shutdown(mut self) {
        let _ = self.sender.send(UiEvent::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for UiActor {
    fn drop(&mut self) {
        let _ = self.sender.send(UiEvent::Shutdown);
    }
}

fn run_event_loop(receiver: &mpsc::Receiver<UiEvent>, live: bool) {
    let theme = Theme::default();
    let mut table = TableRenderer::new(theme, live);

    loop {
        match receiver.recv_timeout(TICK) {
            Ok(UiEvent::Prepare { items }) => table.prepare(&items),
            Ok(UiEvent::Step { name, label }) => {
                table.update(&name, RowState::Active { label });
            }
            Ok(UiEvent::Downloading {
                name,
                current,
                total,
            }) => table.update(&name, RowState::Downloading { current, total }),
            Ok(UiEvent::Done { name, detail, size }) => {
                table.update(&name, RowState::Done { detail, size });
            }
            Ok(UiEvent::Failed { name, reason }) => {
                table.update(&name, RowState::Failed { reason });
            }
            Ok(UiEvent::Info(msg)) => {
                table.close();
                println!("  {} {}", theme.icons.info, msg);
            }
            Ok(UiEvent::Warning(msg)) => table.print_footer(&msg, Severity::Warning),
            Ok(UiEvent::Error(msg)) => table.print_footer(&msg, Severity::Error),
            Ok(UiEvent::Summary(summary)) => {
                let severity = if summary.failed == 0 {
                    Severity::Success
                } else {
                    Severity::Error
                };
                table.print_footer(&summary.message(), severity);
                println!(
                    "\n{} {}",
                    "RESULT".dark_grey(),
                    serde_json::to_string(&summary.json()).unwrap_or_default()
                );
            }
            Ok(UiEvent::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => table.tick(),
        }
    }
    table.close();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_message() {
        let summary = SummaryLine {
            installed: 2,
            already_installed: 1,
            failed: 0,
            elapsed_secs: 1.24,
        };
        assert_eq!(
            summary.message(),
            "INSTALL COMPLETE 2 installed, 1 already installed, elapsed 1.2s"
        );
        assert_eq!(summary.json()["status"], "success");
    }

    #[test]
    fn test_summary_reports_failures() {
        let summary = SummaryLine {
            installed: 0,
            already_installed: 0,
            failed: 3,
            elapsed_secs: 0.0,
        };
        assert!(summary.message().contains("3 failed"));
        assert_eq!(summary.json()["status"], "failure");
    }

    #[test]
    fn test_actor_drains_before_shutdown() {
        let actor = UiActor::spawn_with(false);
        let sender = actor.sender();
        sender
            .send(UiEvent::Prepare {
                items: vec![("foo".into(), "1.0".into())],
            })
            .unwrap();
        sender.send(UiEvent::Info("test".to_string())).unwrap();
        actor.shutdown();
        assert!(sender.send(UiEvent::Info("late".into())).is_err());
    }
}
