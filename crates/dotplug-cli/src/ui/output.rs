//! [`Reporter`] implementation that forwards to the UI actor.

use super::actor::{SummaryLine, UiEvent};
use dotplug_core::{AppName, InstallState, Reporter, RunReport, Version};
use std::sync::mpsc;
use std::time::Duration;

/// Console reporter. In quiet mode only failures, warnings, errors and the
/// final summary reach the terminal.
#[derive(Debug)]
pub struct ConsoleReporter {
    sender: mpsc::Sender<UiEvent>,
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(sender: mpsc::Sender<UiEvent>, quiet: bool) -> Self {
        Self { sender, quiet }
    }

    fn send(&self, event: UiEvent) {
        // The actor only goes away at shutdown; late events are dropped.
        let _ = self.sender.send(event);
    }

    fn progress(&self, event: UiEvent) {
        if !self.quiet {
            self.send(event);
        }
    }
}

/// Row label for a non-terminal state.
fn step_label(state: InstallState) -> Option<&'static str> {
    match state {
        InstallState::NotInstalled => Some("preparing"),
        InstallState::Acquiring => Some("downloading"),
        InstallState::Installing => Some("installing"),
        InstallState::Linking => Some("linking"),
        _ => None,
    }
}

impl Reporter for ConsoleReporter {
    fn prepare(&self, apps: &[(AppName, Version)]) {
        let items = apps
            .iter()
            .map(|(name, version)| (name.to_string(), version.to_string()))
            .collect();
        self.progress(UiEvent::Prepare { items });
    }

    fn transition(&self, name: &AppName, _: &Version, _: InstallState, to: InstallState) {
        if let Some(label) = step_label(to) {
            self.progress(UiEvent::Step {
                name: name.to_string(),
                label: label.to_string(),
            });
        }
    }

    fn message(&self, name: &AppName, msg: &str) {
        self.progress(UiEvent::Step {
            name: name.to_string(),
            label: msg.to_string(),
        });
    }

    fn downloading(&self, name: &AppName, _: &Version, current: u64, total: Option<u64>) {
        self.progress(UiEvent::Downloading {
            name: name.to_string(),
            current,
            total,
        });
    }

    fn done(&self, name: &AppName, _: &Version, detail: &str, size: Option<u64>) {
        self.progress(UiEvent::Done {
            name: name.to_string(),
            detail: detail.to_string(),
            size,
        });
    }

    fn failed(&self, name: &AppName, version: &Version, reason: &str) {
        if self.quiet {
            self.send(UiEvent::Error(format!("{name} {version}: {reason}")));
        } else {
            self.send(UiEvent::Failed {
                name: name.to_string(),
                reason: reason.to_string(),
            });
        }
    }

    fn info(&self, msg: &str) {
        self.progress(UiEvent::Info(msg.to_string()));
    }

    fn warning(&self, msg: &str) {
        self.send(UiEvent::Warning(msg.to_string()));
    }

    fn error(&self, msg: &str) {
        self.send(UiEvent::Error(msg.to_string()));
    }

    fn summary(&self, report: &RunReport, elapsed: Duration) {
        self.send(UiEvent::Summary(SummaryLine {
            installed: report.count(InstallState::Successful),
            already_installed: report.count(InstallState::AlreadyInstalled),
            failed: report.count(InstallState::Failed),
            elapsed_secs: elapsed.as_secs_f64(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter(quiet: bool) -> (ConsoleReporter, mpsc::Receiver<UiEvent>) {
        let (tx, rx) = mpsc::channel();
        (ConsoleReporter::new(tx, quiet), rx)
    }

    #[test]
    fn test_transitions_become_steps() {
        let (reporter, rx) = reporter(false);
        let name = AppName::new("foo");
        let version = Version::new("1.0");

        reporter.transition(&name, &version, InstallState::Pending, InstallState::NotInstalled);
        reporter.transition(&name, &version, InstallState::Linking, InstallState::Successful);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            UiEvent::Step { name, label } if name == "foo" && label == "preparing"
        ));
    }

    #[test]
    fn test_quiet_keeps_failures_and_summary() {
        let (reporter, rx) = reporter(true);
        let name = AppName::new("foo");
        let version = Version::new("1.0");

        reporter.prepare(&[(name.clone(), version.clone())]);
        reporter.done(&name, &version, "installed", None);
        reporter.failed(&name, &version, "boom");
        reporter.summary(&RunReport::default(), Duration::from_secs(1));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], UiEvent::Error(msg) if msg == "foo 1.0: boom"));
        assert!(matches!(&events[1], UiEvent::Summary(s) if s.installed == 0));
    }
}
