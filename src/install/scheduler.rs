// src/install/scheduler.rs

//! Batch install scheduler
//!
//! Workers start at the sinks of the batch graph and walk upward: when a
//! vertex finishes, a worker is spawned for each of its parents. Several
//! children may spawn the same parent; only the first claims it. A claimed
//! vertex waits on the shared condition variable until every child is done,
//! re-checking its own readiness after each broadcast.

use super::graph::{BatchGraph, Vertex, VertexId};
use crate::error::{Error, Result};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, Scope};
use tracing::{debug, info, warn};

/// Performs the install sequence for one vertex
pub trait VertexInstaller: Sync {
    type Output: Send;

    fn install(&self, vertex: &Vertex) -> Result<Self::Output>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VertexState {
    Unstarted,
    Working,
    Done,
    Failed,
}

struct Progress<T> {
    states: Vec<VertexState>,
    /// First error recorded by any worker
    error: Option<Error>,
    completed: Vec<T>,
}

enum Readiness {
    Ready,
    Blocked,
    /// A child failed, or the batch already has an error
    Abandoned(Option<VertexId>),
}

struct Scheduler<'a, I: VertexInstaller> {
    graph: &'a BatchGraph,
    installer: &'a I,
    progress: Mutex<Progress<I::Output>>,
    changed: Condvar,
}

/// Install every vertex of `graph`, dependencies first
///
/// Returns the installer outputs in completion order, or the first error
/// any worker hit. Installs already running when an error occurs are left
/// to finish; vertices that have not started are skipped.
pub fn run<I: VertexInstaller>(graph: &BatchGraph, installer: &I) -> Result<Vec<I::Output>> {
    let scheduler = Scheduler {
        graph,
        installer,
        progress: Mutex::new(Progress {
            states: vec![VertexState::Unstarted; graph.len()],
            error: None,
            completed: Vec::with_capacity(graph.len()),
        }),
        changed: Condvar::new(),
    };

    let sinks = graph.sinks();
    info!(
        "Scheduling {} package(s) from {} sink(s)",
        graph.len(),
        sinks.len()
    );

    thread::scope(|scope| {
        let scheduler = &scheduler;
        for sink in sinks {
            scope.spawn(move || scheduler.work(scope, sink));
        }
    });

    let progress = scheduler
        .progress
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    match progress.error {
        Some(e) => Err(e),
        None => Ok(progress.completed),
    }
}

impl<I: VertexInstaller> Scheduler<'_, I> {
    fn lock(&self) -> MutexGuard<'_, Progress<I::Output>> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn readiness(&self, progress: &Progress<I::Output>, id: VertexId) -> Readiness {
        let mut ready = true;
        for &child in self.graph.children(id) {
            match progress.states[child] {
                VertexState::Done => {}
                VertexState::Failed => return Readiness::Abandoned(Some(child)),
                VertexState::Unstarted | VertexState::Working => ready = false,
            }
        }

        if progress.error.is_some() {
            Readiness::Abandoned(None)
        } else if ready {
            Readiness::Ready
        } else {
            Readiness::Blocked
        }
    }

    fn work<'scope, 'env>(&'env self, scope: &'scope Scope<'scope, 'env>, id: VertexId) {
        let vertex = self.graph.vertex(id);

        {
            let mut progress = self.lock();
            if progress.states[id] != VertexState::Unstarted {
                return;
            }
            progress.states[id] = VertexState::Working;
            debug!("Claimed {}", vertex.name());

            loop {
                match self.readiness(&progress, id) {
                    Readiness::Ready => break,
                    Readiness::Blocked => {
                        debug!("{} waiting on dependencies", vertex.name());
                        progress = self
                            .changed
                            .wait(progress)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    Readiness::Abandoned(failed_child) => {
                        progress.states[id] = VertexState::Failed;
                        if let Some(child) = failed_child {
                            let dependency = self.graph.vertex(child).name();
                            warn!("Skipping {}: dependency {} failed", vertex.name(), dependency);
                            progress.error.get_or_insert_with(|| Error::DependencyFailed {
                                package: vertex.name().to_string(),
                                dependency: dependency.to_string(),
                            });
                        } else {
                            debug!("Skipping {}: batch aborted", vertex.name());
                        }
                        self.changed.notify_all();
                        return;
                    }
                }
            }
        }

        let result = self.installer.install(vertex);

        {
            let mut progress = self.lock();
            match result {
                Ok(output) => {
                    progress.states[id] = VertexState::Done;
                    progress.completed.push(output);
                    debug!("Finished {}", vertex.name());
                }
                Err(e) => {
                    warn!("Failed to install {}: {}", vertex.name(), e);
                    progress.states[id] = VertexState::Failed;
                    progress.error.get_or_insert(e);
                }
            }
            self.changed.notify_all();

            if progress.states[id] == VertexState::Failed {
                return;
            }
        }

        for &parent in self.graph.parents(id) {
            scope.spawn(move || self.work(scope, parent));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::Manifest;
    use std::path::Path;
    use std::time::Duration;

    fn graph(names: &[&str], edges: &[(usize, usize)]) -> BatchGraph {
        let mut graph = BatchGraph::new();
        for name in names {
            let manifest = Manifest::from_toml(
                &format!("[package]\nname = \"{name}\"\nversion = \"1.0.0\"\n"),
                name,
            )
            .unwrap();
            graph.add_vertex(Path::new(name), manifest).unwrap();
        }
        for &(from, to) in edges {
            graph.add_edge(from, to).unwrap();
        }
        graph
    }

    /// Records install order; fails on the named vertex
    #[derive(Default)]
    struct Recorder {
        started: Mutex<Vec<String>>,
        fail: Option<&'static str>,
    }

    impl VertexInstaller for Recorder {
        type Output = String;

        fn install(&self, vertex: &Vertex) -> Result<String> {
            self.started
                .lock()
                .unwrap()
                .push(vertex.name().to_string());
            if self.fail == Some(vertex.name()) {
                return Err(Error::HookFailed {
                    package: vertex.name().to_string(),
                    hook: "preinstall".to_string(),
                    status: Some(1),
                });
            }
            Ok(vertex.name().to_string())
        }
    }

    #[test]
    fn test_empty_batch() {
        let result = run(&BatchGraph::new(), &Recorder::default()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_chain_installs_dependencies_first() {
        // a -> b -> c
        let graph = graph(&["a", "b", "c"], &[(0, 1), (1, 2)]);
        let completed = run(&graph, &Recorder::default()).unwrap();
        assert_eq!(completed, ["c", "b", "a"]);
    }

    #[test]
    fn test_diamond_installs_each_vertex_once() {
        // a -> b, a -> c, b -> d, c -> d
        let graph = graph(&["a", "b", "c", "d"], &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let recorder = Recorder::default();
        let completed = run(&graph, &recorder).unwrap();

        assert_eq!(completed.len(), 4);
        assert_eq!(completed.first().map(String::as_str), Some("d"));
        assert_eq!(completed.last().map(String::as_str), Some("a"));
        assert_eq!(recorder.started.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_independent_vertices_run_concurrently() {
        struct Rendezvous {
            active: Mutex<usize>,
            arrived: Condvar,
            peak: Mutex<usize>,
        }

        impl VertexInstaller for Rendezvous {
            type Output = ();

            fn install(&self, _vertex: &Vertex) -> Result<()> {
                let mut active = self.active.lock().unwrap();
                *active += 1;
                self.arrived.notify_all();
                let (mut active, _) = self
                    .arrived
                    .wait_timeout_while(active, Duration::from_secs(5), |a| *a < 2)
                    .unwrap();
                let mut peak = self.peak.lock().unwrap();
                *peak = (*peak).max(*active);
                *active -= 1;
                Ok(())
            }
        }

        let graph = graph(&["x", "y"], &[]);
        let installer = Rendezvous {
            active: Mutex::new(0),
            arrived: Condvar::new(),
            peak: Mutex::new(0),
        };
        run(&graph, &installer).unwrap();
        assert_eq!(*installer.peak.lock().unwrap(), 2);
    }

    #[test]
    fn test_failure_skips_dependents() {
        // a -> b -> c, c fails
        let graph = graph(&["a", "b", "c"], &[(0, 1), (1, 2)]);
        let recorder = Recorder {
            fail: Some("c"),
            ..Default::default()
        };

        match run(&graph, &recorder) {
            Err(Error::HookFailed { package, .. }) => assert_eq!(package, "c"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(*recorder.started.lock().unwrap(), ["c"]);
    }

    #[test]
    fn test_waiting_parent_wakes_on_failed_child() {
        // a -> b, a -> c; b fails while a may be waiting on c
        let graph = graph(&["a", "b", "c"], &[(0, 1), (0, 2)]);
        let recorder = Recorder {
            fail: Some("b"),
            ..Default::default()
        };

        assert!(run(&graph, &recorder).is_err());
        let started = recorder.started.lock().unwrap();
        assert!(started.iter().any(|n| n == "b"));
        assert!(!started.iter().any(|n| n == "a"));
    }
}
