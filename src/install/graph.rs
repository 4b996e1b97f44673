// src/install/graph.rs

//! Dependency graph over one install batch
//!
//! One vertex per archive. An edge runs from a dependent to the batch member
//! that satisfies one of its dependencies, so vertices without outgoing edges
//! (sinks) depend only on what is already installed. Edges that would close a
//! cycle are rejected as they are added.

use crate::db::models::Database;
use crate::error::{Error, Result};
use crate::packages::{DependencySpec, Manifest, archive};
use crate::resolver::{self, Candidate, Resolution};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Index of a vertex within its graph
pub type VertexId = usize;

#[derive(Debug)]
pub struct Vertex {
    id: VertexId,
    pub path: PathBuf,
    pub manifest: Manifest,
    /// Dependency specs, parsed once when the vertex is added
    pub specs: Vec<DependencySpec>,
}

impl Vertex {
    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.manifest.name()
    }
}

impl Candidate for Vertex {
    type Id = VertexId;

    fn id(&self) -> VertexId {
        self.id
    }

    fn name(&self) -> &str {
        self.manifest.name()
    }

    fn version(&self) -> &str {
        self.manifest.version()
    }
}

#[derive(Debug, Default)]
pub struct BatchGraph {
    vertices: Vec<Vertex>,
    /// Outgoing edges: the batch members each vertex depends on
    children: Vec<Vec<VertexId>>,
    /// Incoming edges: the batch members depending on each vertex
    parents: Vec<Vec<VertexId>>,
}

impl BatchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect every archive and wire up in-batch dependencies
    ///
    /// Nothing is extracted. Fails on the first unreadable archive, duplicate
    /// or already-installed name, unresolvable dependency, or cycle.
    pub fn build(archives: &[PathBuf], db: &Database) -> Result<Self> {
        let mut graph = Self::new();
        let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();

        for path in archives {
            let manifest = archive::inspect(path)?;
            let name = manifest.name().to_string();

            if let Some(first) = seen.get(&name) {
                return Err(Error::DuplicatePackage {
                    name,
                    first: first.clone(),
                    second: path.clone(),
                });
            }
            if db.contains(&name) {
                return Err(Error::AlreadyInstalled(name));
            }

            debug!("Inspected {} from {}", name, path.display());
            seen.insert(name, path.clone());
            graph.add_vertex(path, manifest)?;
        }

        for id in 0..graph.len() {
            let vertex = &graph.vertices[id];
            let mut targets = Vec::new();
            for spec in &vertex.specs {
                if let Resolution::Batch(target) =
                    resolver::resolve_dependency(vertex.name(), spec, db, &graph.vertices)?
                {
                    targets.push(target);
                }
            }
            for target in targets {
                graph.add_edge(id, target)?;
            }
        }

        debug!(
            "Built batch graph: {} vertices, {} sinks",
            graph.len(),
            graph.sinks().len()
        );
        Ok(graph)
    }

    /// Add a vertex, parsing its dependency specs
    pub fn add_vertex(&mut self, path: &Path, manifest: Manifest) -> Result<VertexId> {
        let specs = manifest.dependencies.parse_all()?;
        let id = self.vertices.len();
        self.vertices.push(Vertex {
            id,
            path: path.to_path_buf(),
            manifest,
            specs,
        });
        self.children.push(Vec::new());
        self.parents.push(Vec::new());
        Ok(id)
    }

    /// Record that `from` depends on `to`
    ///
    /// Duplicate edges are ignored. Fails with `CycleDetected` when `to`
    /// already reaches `from`, including the self-edge case.
    pub fn add_edge(&mut self, from: VertexId, to: VertexId) -> Result<()> {
        if self.children[from].contains(&to) {
            return Ok(());
        }

        if let Some(path) = self.path_between(to, from) {
            let mut cycle = vec![self.vertices[from].name().to_string()];
            cycle.extend(path.iter().map(|&v| self.vertices[v].name().to_string()));
            return Err(Error::CycleDetected { cycle });
        }

        self.children[from].push(to);
        self.parents[to].push(from);
        Ok(())
    }

    /// Vertices on a path from `start` to `goal`, both inclusive
    fn path_between(&self, start: VertexId, goal: VertexId) -> Option<Vec<VertexId>> {
        let mut visited = HashSet::new();
        let mut stack = vec![(start, vec![start])];

        while let Some((current, path)) = stack.pop() {
            if current == goal {
                return Some(path);
            }
            if !visited.insert(current) {
                continue;
            }
            for &next in &self.children[current] {
                let mut extended = path.clone();
                extended.push(next);
                stack.push((next, extended));
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id]
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Batch members `id` depends on
    pub fn children(&self, id: VertexId) -> &[VertexId] {
        &self.children[id]
    }

    /// Batch members depending on `id`
    pub fn parents(&self, id: VertexId) -> &[VertexId] {
        &self.parents[id]
    }

    /// Vertices with no in-batch dependencies
    pub fn sinks(&self) -> Vec<VertexId> {
        (0..self.len())
            .filter(|&id| self.children[id].is_empty())
            .collect()
    }
}
