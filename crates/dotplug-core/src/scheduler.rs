//! Dependency-aware install scheduler.
//!
//! Every descriptor of a run is admitted, in manifest order, into a bounded
//! queue drained by `config.concurrency` workers. A worker whose item still
//! waits on a dependency parks it: a short-lived task sleeps until the next
//! terminal transition (or the backoff ceiling) and pushes the item back.
//! Items whose dependency failed are failed without running.
//!
//! The graph is validated before anything is admitted, so every item
//! eventually reaches a terminal state and the run terminates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use reqwest::Client;
use serde::Serialize;
use tokio::sync::{Mutex, Notify, RwLock, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::descriptor::AppDescriptor;
use crate::error::{Error, InstallError};
use crate::manifest;
use crate::pipeline::{Outcome, Pipeline};
use crate::reporter::Reporter;
use crate::types::{AppName, InstallState};

/// Final states of one run, in manifest order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<Outcome>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.state == InstallState::Failed)
    }

    /// Number of applications that finished in `state`.
    pub fn count(&self, state: InstallState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state == InstallState::Failed)
    }

    pub fn get(&self, name: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}

/// What a worker should do with a dequeued item.
#[derive(Debug)]
enum Readiness {
    Ready,
    Waiting,
    Blocked(AppName),
}

type Queue = mpsc::Receiver<Arc<AppDescriptor>>;

/// State shared by the admitter, the workers and the parking tasks.
struct Shared {
    config: Arc<Config>,
    client: Client,
    reporter: Arc<dyn Reporter>,
    /// Applications that finished Successful or AlreadyInstalled.
    seen: RwLock<HashSet<AppName>>,
    failed: RwLock<HashSet<AppName>>,
    outcomes: Mutex<HashMap<AppName, Outcome>>,
    /// Fired on every terminal transition.
    ready: Notify,
    remaining: AtomicUsize,
    /// Dropped once `remaining` reaches zero, which closes the queue.
    sender: Mutex<Option<mpsc::Sender<Arc<AppDescriptor>>>>,
}

impl Shared {
    /// One consistent snapshot of both sets for one decision.
    async fn readiness(&self, app: &AppDescriptor) -> Readiness {
        let seen = self.seen.read().await;
        let failed = self.failed.read().await;
        if let Some(dep) = app.depends.iter().find(|d| failed.contains(*d)) {
            return Readiness::Blocked(dep.clone());
        }
        if app.depends.iter().all(|d| seen.contains(d)) {
            Readiness::Ready
        } else {
            Readiness::Waiting
        }
    }

    async fn finish(&self, outcome: Outcome) {
        if outcome.is_success() {
            self.seen.write().await.insert(outcome.name.clone());
        } else {
            self.failed.write().await.insert(outcome.name.clone());
        }
        self.outcomes
            .lock()
            .await
            .insert(outcome.name.clone(), outcome);
        self.ready.notify_waiters();

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            debug!("all applications terminal, closing queue");
            self.close().await;
        }
    }

    async fn close(&self) {
        self.sender.lock().await.take();
    }

    fn fail_blocked(&self, app: &AppDescriptor, dep: AppName) -> Outcome {
        let reason = InstallError::DependencyFailed(dep).to_string();
        info!(app = %app.name, "{reason}");
        self.reporter.transition(
            &app.name,
            &app.version,
            InstallState::Pending,
            InstallState::Failed,
        );
        self.reporter.failed(&app.name, &app.version, &reason);
        Outcome {
            name: app.name.clone(),
            version: app.version.clone(),
            state: InstallState::Failed,
            error: Some(reason),
        }
    }
}

/// Parks `app` until the next terminal transition or the backoff ceiling,
/// then re-enqueues it.
fn park(shared: &Arc<Shared>, app: Arc<AppDescriptor>) {
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let notified = shared.ready.notified();
        tokio::select! {
            () = notified => {}
            () = tokio::time::sleep(shared.config.requeue_backoff) => {}
        }
        let sender = shared.sender.lock().await.clone();
        if let Some(tx) = sender {
            let _ = tx.send(app).await;
        }
    });
}

async fn worker(id: usize, shared: Arc<Shared>, queue: Arc<Mutex<Queue>>) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(app) = next else {
            debug!(worker = id, "queue closed");
            return;
        };

        match shared.readiness(&app).await {
            Readiness::Ready => {
                let outcome = Pipeline::new(
                    Arc::clone(&app),
                    Arc::clone(&shared.config),
                    shared.client.clone(),
                    Arc::clone(&shared.reporter),
                )
                .run()
                .await;
                shared.finish(outcome).await;
            }
            Readiness::Blocked(dep) => {
                let outcome = shared.fail_blocked(&app, dep);
                shared.finish(outcome).await;
            }
            Readiness::Waiting => {
                debug!(worker = id, app = %app.name, "dependencies pending, parking");
                park(&shared, app);
            }
        }
    }
}

/// Runs a set of applications to completion, honouring their dependencies.
pub struct Scheduler {
    config: Arc<Config>,
    client: Client,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("concurrency", &self.config.concurrency)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(config: Arc<Config>, client: Client, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            config,
            client,
            reporter,
        }
    }

    /// Install every descriptor. Fails only when the manifest itself is
    /// invalid; per-application failures are recorded in the report.
    #[instrument(skip_all, fields(apps = apps.len()))]
    pub async fn run(&self, apps: Vec<AppDescriptor>) -> Result<RunReport, Error> {
        let order = manifest::validate(&apps)?;
        debug!(?order, "dependency graph is acyclic");

        let started = Instant::now();
        let names: Vec<_> = apps
            .iter()
            .map(|a| (a.name.clone(), a.version.clone()))
            .collect();
        self.reporter.prepare(&names);

        if apps.is_empty() {
            let report = RunReport::default();
            self.reporter.summary(&report, started.elapsed());
            return Ok(report);
        }

        let workers = self.config.concurrency.max(1);
        let (tx, rx) = mpsc::channel(workers);
        let shared = Arc::new(Shared {
            config: Arc::clone(&self.config),
            client: self.client.clone(),
            reporter: Arc::clone(&self.reporter),
            seen: RwLock::new(HashSet::new()),
            failed: RwLock::new(HashSet::new()),
            outcomes: Mutex::new(HashMap::with_capacity(apps.len())),
            ready: Notify::new(),
            remaining: AtomicUsize::new(apps.len()),
            sender: Mutex::new(Some(tx.clone())),
        });

        let admitted: Vec<Arc<AppDescriptor>> = apps.into_iter().map(Arc::new).collect();
        let admitting = admitted.clone();
        tokio::spawn(async move {
            for app in admitting {
                if tx.send(app).await.is_err() {
                    break;
                }
            }
        });

        let queue = Arc::new(Mutex::new(rx));
        let mut set = JoinSet::new();
        for id in 0..workers {
            set.spawn(worker(id, Arc::clone(&shared), Arc::clone(&queue)));
        }
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                self.reporter.error(&format!("Internal error: {e}"));
                shared.close().await;
            }
        }

        let mut outcomes = shared.outcomes.lock().await;
        let report = RunReport {
            outcomes: admitted
                .iter()
                .map(|app| {
                    outcomes.remove(&app.name).unwrap_or_else(|| Outcome {
                        name: app.name.clone(),
                        version: app.version.clone(),
                        state: InstallState::Failed,
                        error: Some("install was interrupted".to_string()),
                    })
                })
                .collect(),
        };

        info!(
            failed = report.count(InstallState::Failed),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        self.reporter.summary(&report, started.elapsed());
        Ok(report)
    }
}
