use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use glam::{Quat, Vec3};
use log::info;

use crate::graph::{NodeId, SceneGraph, Transform, BUILTIN_CUBE_MESH};
use crate::mesh::{MeshData, MeshRegistry};
use crate::scene::{ObjectKind, SceneEntry, SceneManifest};

/// Resolves the manifest's mesh files on background threads.
///
/// Each load is independent: on success it performs a single insertion
/// into its target group. There is no ordering guarantee between loads and
/// the frame loop never assumes a group is complete; objects are simply
/// not ray-testable until their mesh lands in the registry.
pub struct AssetLoadManager {
    graph: SceneGraph,
    registry: MeshRegistry,
    root_dir: PathBuf,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<Result<()>>>,
}

impl AssetLoadManager {
    pub fn new(graph: SceneGraph, registry: MeshRegistry, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            graph,
            registry,
            root_dir: root_dir.into(),
            running: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        }
    }

    /// Places meshless entries immediately and spawns one load per entry
    /// with a mesh. Returns the number of loads in flight.
    pub fn start(&mut self, manifest: &SceneManifest) -> Result<usize> {
        self.stop()?;
        self.running.store(true, Ordering::Release);

        for entry in &manifest.entries {
            if entry.mesh.is_none() {
                // Register the stand-in cube so the entry stays
                // ray-testable, not just drawable.
                if !self.registry.contains(BUILTIN_CUBE_MESH) {
                    self.registry.insert(
                        BUILTIN_CUBE_MESH,
                        MeshData::cuboid(Vec3::splat(-0.5), Vec3::splat(0.5)),
                    );
                }
                insert_entry(&self.graph, entry, BUILTIN_CUBE_MESH.to_string());
                continue;
            }
            let graph = self.graph.clone();
            let registry = self.registry.clone();
            let root_dir = self.root_dir.clone();
            let running = Arc::clone(&self.running);
            let entry = entry.clone();
            let handle =
                thread::spawn(move || load_entry(graph, registry, &root_dir, running, entry));
            self.threads.push(handle);
        }
        Ok(self.threads.len())
    }

    /// Blocks until every in-flight load finishes.
    pub fn wait(&mut self) -> Result<()> {
        self.join_threads()
    }

    /// Abandons loads that have not started yet and waits for the rest.
    pub fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        self.join_threads()
    }

    fn join_threads(&mut self) -> Result<()> {
        if self.threads.is_empty() {
            return Ok(());
        }
        let handles = std::mem::take(&mut self.threads);
        let mut errors = Vec::new();
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => errors.push(err),
                Err(panic) => errors.push(anyhow!("loader thread panicked: {:?}", panic)),
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            // A failed load is fatal to that asset only; the scene keeps
            // running with whatever did resolve.
            let message = errors
                .into_iter()
                .map(|err| format!("{err:#}"))
                .collect::<Vec<_>>()
                .join("; ");
            Err(anyhow!("{message}"))
        }
    }
}

impl Drop for AssetLoadManager {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn load_entry(
    graph: SceneGraph,
    registry: MeshRegistry,
    root_dir: &Path,
    running: Arc<AtomicBool>,
    entry: SceneEntry,
) -> Result<()> {
    if !running.load(Ordering::Acquire) {
        return Ok(());
    }
    let mesh_name = entry.mesh.clone().unwrap_or_default();
    if !registry.contains(&mesh_name) {
        let path = root_dir.join(&mesh_name);
        let source = fs::read_to_string(&path)
            .with_context(|| format!("failed to read mesh {}", path.display()))?;
        let mesh = MeshData::from_obj_str(&source)
            .with_context(|| format!("failed to parse OBJ mesh {mesh_name}"))?;
        registry.insert(mesh_name.clone(), mesh);
    }
    insert_entry(&graph, &entry, mesh_name);
    info!("loaded {} into the {} group", entry.name, entry.kind.as_str());
    Ok(())
}

/// The single completion-side mutation: one node inserted into the
/// entry's target group.
fn insert_entry(graph: &SceneGraph, entry: &SceneEntry, mesh_name: String) -> NodeId {
    let wells = graph.wells();
    let parent = match entry.kind {
        ObjectKind::Grab => wells.interactables,
        ObjectKind::Floor => wells.teleport_surfaces,
        ObjectKind::Prop => wells.root,
    };
    let id = graph.add(&entry.name, parent, entry_transform(entry));
    graph.set_mesh(id, mesh_name);
    graph.set_color(id, entry.color);
    id
}

fn entry_transform(entry: &SceneEntry) -> Transform {
    let rotation = Quat::from_rotation_z(entry.rotation.z.to_radians())
        * Quat::from_rotation_y(entry.rotation.y.to_radians())
        * Quat::from_rotation_x(entry.rotation.x.to_radians());
    Transform {
        translation: entry.position,
        rotation,
        scale: entry.scale,
    }
}
