//! Reporter trait for dependency injection
//!
//! Core logic reports progress and state changes through this trait without
//! being coupled to a particular terminal UI. Implementations must not block:
//! they are called from worker tasks in the middle of an install.

use crate::scheduler::RunReport;
use crate::types::{AppName, InstallState, Version};
use std::time::Duration;

/// Status and progress sink for an install run.
pub trait Reporter: Send + Sync {
    /// Reserve display space for every application of the run, in manifest order.
    fn prepare(&self, apps: &[(AppName, Version)]);

    /// An application moved from one install state to the next.
    fn transition(&self, name: &AppName, version: &Version, from: InstallState, to: InstallState);

    /// Free-form progress text for an application (e.g. "already installed").
    fn message(&self, name: &AppName, msg: &str);

    /// Updates the progress of a download.
    fn downloading(&self, name: &AppName, version: &Version, current: u64, total: Option<u64>);

    /// Marks an application as successfully installed.
    fn done(&self, name: &AppName, version: &Version, detail: &str, size: Option<u64>);

    /// Marks an application as failed with a specific reason.
    fn failed(&self, name: &AppName, version: &Version, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display the final summary of a run.
    fn summary(&self, report: &RunReport, elapsed: Duration);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn prepare(&self, apps: &[(AppName, Version)]) {
        (**self).prepare(apps);
    }
    fn transition(&self, name: &AppName, version: &Version, from: InstallState, to: InstallState) {
        (**self).transition(name, version, from, to);
    }
    fn message(&self, name: &AppName, msg: &str) {
        (**self).message(name, msg);
    }
    fn downloading(&self, name: &AppName, version: &Version, current: u64, total: Option<u64>) {
        (**self).downloading(name, version, current, total);
    }
    fn done(&self, name: &AppName, version: &Version, detail: &str, size: Option<u64>) {
        (**self).done(name, version, detail, size);
    }
    fn failed(&self, name: &AppName, version: &Version, reason: &str) {
        (**self).failed(name, version, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
    fn summary(&self, report: &RunReport, elapsed: Duration) {
        (**self).summary(report, elapsed);
    }
}

/// A no-op reporter for silent runs (e.g. `dot check`, tests).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn prepare(&self, _: &[(AppName, Version)]) {}
    fn transition(&self, _: &AppName, _: &Version, _: InstallState, _: InstallState) {}
    fn message(&self, _: &AppName, _: &str) {}
    fn downloading(&self, _: &AppName, _: &Version, _: u64, _: Option<u64>) {}
    fn done(&self, _: &AppName, _: &Version, _: &str, _: Option<u64>) {}
    fn failed(&self, _: &AppName, _: &Version, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: &RunReport, _: Duration) {}
}

#[cfg(test)]
pub(crate) mod recording {
    //! Reporter that records every event, for asserting on ordering and
    //! concurrency in tests.

    use super::Reporter;
    use crate::scheduler::RunReport;
    use crate::types::{AppName, InstallState, Version};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Event {
        Transition(String, InstallState, InstallState),
        Done(String),
        Failed(String, String),
    }

    #[derive(Debug, Default)]
    pub(crate) struct RecordingReporter {
        events: Mutex<Vec<Event>>,
        installing: Mutex<(usize, usize)>,
    }

    impl RecordingReporter {
        pub(crate) fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        /// States `name` went through, in order, starting with `Pending`.
        pub(crate) fn states_of(&self, name: &str) -> Vec<InstallState> {
            let mut states = vec![InstallState::Pending];
            for event in self.events() {
                if let Event::Transition(n, _, to) = event {
                    if n == name {
                        states.push(to);
                    }
                }
            }
            states
        }

        /// Index of the first event matching `pred`.
        pub(crate) fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
            self.events().iter().position(pred)
        }

        /// Highest number of applications observed in `Installing` at once.
        pub(crate) fn max_installing(&self) -> usize {
            self.installing.lock().unwrap().1
        }
    }

    impl Reporter for RecordingReporter {
        fn prepare(&self, _: &[(AppName, Version)]) {}

        fn transition(&self, name: &AppName, _: &Version, from: InstallState, to: InstallState) {
            {
                let mut installing = self.installing.lock().unwrap();
                if to == InstallState::Installing {
                    installing.0 += 1;
                    installing.1 = installing.1.max(installing.0);
                }
                if from == InstallState::Installing {
                    installing.0 -= 1;
                }
            }
            self.events
                .lock()
                .unwrap()
                .push(Event::Transition(name.to_string(), from, to));
        }

        fn message(&self, _: &AppName, _: &str) {}
        fn downloading(&self, _: &AppName, _: &Version, _: u64, _: Option<u64>) {}

        fn done(&self, name: &AppName, _: &Version, _: &str, _: Option<u64>) {
            self.events.lock().unwrap().push(Event::Done(name.to_string()));
        }

        fn failed(&self, name: &AppName, _: &Version, reason: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Failed(name.to_string(), reason.to_string()));
        }

        fn info(&self, _: &str) {}
        fn warning(&self, _: &str) {}
        fn error(&self, _: &str) {}
        fn summary(&self, _: &RunReport, _: Duration) {}
    }
}
