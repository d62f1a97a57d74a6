use std::any::Any;
use std::env;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::{Quat, Vec2, Vec3};
use log::{info, warn};
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event::{
    ElementState, Event, KeyboardInput, MouseButton, MouseScrollDelta, VirtualKeyCode, WindowEvent,
};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::run_return::EventLoopExtRunReturn;
use winit::window::WindowBuilder;

use xr_stage::{
    AssetLoadManager, CameraParams, ControllerEvent, ControllerId, InteractionLoop, LightParams,
    MeshRegistry, ObjectKind, OrbitCamera, Renderer, SceneGraph, SceneManifest, TargetRayMode,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let manifest_path = options.scene_dir.join("scene.xml");
    let xml = fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    let manifest = SceneManifest::from_xml(&xml).context("failed to parse scene XML")?;

    println!("Loaded scene with {} objects", manifest.entries.len());
    for entry in &manifest.entries {
        println!(" - {} ({})", entry.name, entry.kind.as_str());
    }
    if let Some(environment) = &manifest.environment {
        info!("scene names environment texture {environment}");
    }

    let graph = SceneGraph::new();
    let registry = MeshRegistry::new();
    let mut loader =
        AssetLoadManager::new(graph.clone(), registry.clone(), options.scene_dir.clone());
    let in_flight = loader.start(&manifest).context("failed to start loads")?;
    println!("Launched {in_flight} mesh load(s)");

    if options.summary_only {
        run_headless(loader, graph)
    } else {
        let headless_graph = graph.clone();
        match run_interactive(loader, graph, registry, manifest.environment.clone()) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.downcast_ref::<WindowInitError>().is_some() {
                    eprintln!(
                        "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                    );
                    print_final_state(&headless_graph);
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }
}

fn run_headless(mut loader: AssetLoadManager, graph: SceneGraph) -> Result<()> {
    if let Err(err) = loader.wait() {
        warn!("some meshes failed to load: {err:#}");
    }
    print_final_state(&graph);
    Ok(())
}

fn run_interactive(
    loader: AssetLoadManager,
    graph: SceneGraph,
    registry: MeshRegistry,
    environment: Option<String>,
) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let mut event_loop =
        event_loop.map_err(|panic| WindowInitError::from_panic("event loop", panic))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("XR Stage")
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let mut renderer = block_on(Renderer::new(Arc::clone(&window), registry.clone()))?;
    if let Some(name) = &environment {
        renderer.set_clear_color(xr_stage::render::environment_tint(name));
    }
    let interaction = InteractionLoop::new(graph.clone(), registry);

    let mut app = AppState {
        renderer,
        graph,
        interaction,
        orbit: OrbitCamera::new(),
        loader,
        cursor: Vec2::ZERO,
        rotating: false,
        last_error: None,
    };

    event_loop.run_return(|event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        if let Err(err) = app.process_event(&event, control_flow) {
            app.last_error = Some(err);
            control_flow.set_exit();
        }
    });

    app.shutdown();

    if let Some(err) = app.last_error {
        return Err(err);
    }

    Ok(())
}

struct AppState {
    renderer: Renderer,
    graph: SceneGraph,
    interaction: InteractionLoop,
    orbit: OrbitCamera,
    loader: AssetLoadManager,
    cursor: Vec2,
    rotating: bool,
    last_error: Option<anyhow::Error>,
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

const ROTATE_SPEED: f32 = 0.005;
const ZOOM_SPEED: f32 = 0.5;

impl AppState {
    /// Desktop stand-ins for the headset inputs: left drag orbits, the
    /// wheel dollies, the right button grabs and Space teleports.
    fn process_event(&mut self, event: &Event<()>, control_flow: &mut ControlFlow) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.renderer.window_id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        control_flow.set_exit();
                    }
                    WindowEvent::Resized(size) => {
                        self.renderer.resize(*size);
                    }
                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        self.renderer.resize(**new_inner_size);
                    }
                    WindowEvent::KeyboardInput { input, .. } => {
                        self.handle_keyboard(input);
                    }
                    WindowEvent::MouseInput { state, button, .. } => {
                        self.handle_mouse_button(*state, *button);
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        let amount = match delta {
                            MouseScrollDelta::LineDelta(_, y) => *y,
                            MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 50.0,
                        };
                        self.orbit.zoom(amount * ZOOM_SPEED);
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        let pos = Vec2::new(position.x as f32, position.y as f32);
                        let delta = pos - self.cursor;
                        self.cursor = pos;
                        if self.rotating {
                            self.orbit
                                .rotate(-delta.x * ROTATE_SPEED, delta.y * ROTATE_SPEED);
                        }
                    }
                    _ => {}
                }
            }
            Event::RedrawRequested(window_id) if *window_id == self.renderer.window_id() => {
                self.frame()?;
            }
            Event::MainEventsCleared => {
                self.renderer.window().request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        self.orbit.update();

        // The hand rides the camera: a ray straight down the view axis.
        let eye = self.orbit.position();
        let aim = Quat::from_rotation_arc(Vec3::NEG_Z, (self.orbit.target - eye).normalize());
        self.interaction
            .set_pose(ControllerId::One, xr_stage::Pose::new(eye, aim));

        self.interaction.tick();

        let camera = self.camera_params();
        let light = LightParams {
            position: Vec3::new(3.0, 10.0, 4.0),
            color: Vec3::splat(1.0),
            intensity: 1.0,
        };
        self.renderer.update_globals(&camera, &light);

        if let Err(err) = self.renderer.render(&self.graph.draw_list()) {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    let size = self.renderer.window().inner_size();
                    self.renderer.resize(size);
                }
                wgpu::SurfaceError::OutOfMemory => {
                    return Err(anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout => {
                    info!("Surface timeout; retrying next frame");
                }
            }
        }
        Ok(())
    }

    /// Viewer position is the orbit eye shifted by the committed
    /// reference-space origin, so a teleport recenters the view.
    fn camera_params(&self) -> CameraParams {
        let origin = self.interaction.reference_space().origin;
        let mut shifted = self.orbit.clone();
        shifted.target -= origin;
        shifted.camera_params(self.renderer.aspect())
    }

    fn handle_keyboard(&mut self, input: &KeyboardInput) {
        if input.virtual_keycode != Some(VirtualKeyCode::Space) {
            return;
        }
        let squeezing = self.interaction.controller(ControllerId::One).squeezing;
        match input.state {
            // Key repeat resends Pressed; only the first edge counts.
            ElementState::Pressed if !squeezing => self
                .interaction
                .handle_event(ControllerId::One, ControllerEvent::SqueezeStart),
            ElementState::Released if squeezing => self
                .interaction
                .handle_event(ControllerId::One, ControllerEvent::SqueezeEnd),
            _ => {}
        }
    }

    fn handle_mouse_button(&mut self, state: ElementState, button: MouseButton) {
        match (button, state) {
            (MouseButton::Left, ElementState::Pressed) => self.rotating = true,
            (MouseButton::Left, ElementState::Released) => self.rotating = false,
            (MouseButton::Right, ElementState::Pressed) => self.interaction.handle_event(
                ControllerId::One,
                ControllerEvent::SelectStart {
                    ray_mode: TargetRayMode::TrackedPointer,
                },
            ),
            (MouseButton::Right, ElementState::Released) => self
                .interaction
                .handle_event(ControllerId::One, ControllerEvent::SelectEnd),
            _ => {}
        }
    }

    fn shutdown(&mut self) {
        if let Err(err) = self.loader.stop() {
            warn!("some meshes failed to load: {err:#}");
        }
        print_final_state(&self.graph);
    }
}

fn print_final_state(graph: &SceneGraph) {
    let wells = graph.wells();
    let fixed = [
        wells.interactables,
        wells.teleport_surfaces,
        wells.controllers[0],
        wells.controllers[1],
        wells.marker,
    ];

    println!("Final scene state:");
    for (kind, group) in [
        (ObjectKind::Grab, wells.interactables),
        (ObjectKind::Floor, wells.teleport_surfaces),
    ] {
        for id in graph.children(group) {
            print_node(graph, id, kind.as_str());
        }
    }
    for id in graph.children(wells.root) {
        if !fixed.contains(&id) {
            print_node(graph, id, ObjectKind::Prop.as_str());
        }
    }
}

fn print_node(graph: &SceneGraph, id: xr_stage::NodeId, kind: &str) {
    let node = graph.node(id);
    let position = node.transform.translation;
    println!(
        " - {} [{kind}] pos=({:.2}, {:.2}, {:.2})",
        node.name, position.x, position.y, position.z
    );
}

struct CliOptions {
    scene_dir: PathBuf,
    summary_only: bool,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(scene_dir) = args.next() else {
            return Err(anyhow!("Usage: xr-stage <scene-dir> [--summary-only]"));
        };
        let mut summary_only = false;
        for arg in args {
            match arg.as_str() {
                "--summary-only" => summary_only = true,
                other => {
                    return Err(anyhow!("Unknown argument: {other}. Expected --summary-only"));
                }
            }
        }
        Ok(Self {
            scene_dir: PathBuf::from(scene_dir),
            summary_only,
        })
    }
}
