//! A backend that draws into memory, for tests, servers and tooling.

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;
use trellis_core::{BackendFactory, NodeId, RenderBackend, RendererOptions, Scene, SharedBackend, SurfaceId};
use web_time::{Duration, Instant};

use crate::color::Point;
use crate::display::display_of;
use crate::graphics::Graphics;

/// One visible display object as the backend would have drawn it.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawItem {
    pub node: NodeId,
    pub type_name: String,
    /// Accumulated translation from the stage.
    pub origin: Point,
    /// Product of the alphas on the path from the stage.
    pub alpha: f64,
    pub filters: SmallVec<[NodeId; 2]>,
    /// Vector commands, for [`Graphics`] only.
    pub commands: usize,
}

#[derive(Debug)]
pub struct HeadlessBackend {
    pub surface: SurfaceId,
    pub options: RendererOptions,
    pub size: (u32, u32),
    pub frames: u64,
    pub items: Vec<DrawItem>,
    pub disposed: bool,
    last_render: Option<Instant>,
    frame_time: Duration,
}

impl HeadlessBackend {
    pub fn new(surface: SurfaceId, options: &RendererOptions) -> Self {
        Self {
            surface,
            options: options.clone(),
            size: (0, 0),
            frames: 0,
            items: Vec::new(),
            disposed: false,
            last_render: None,
            frame_time: Duration::ZERO,
        }
    }

    /// Interval between the last two rendered frames.
    pub fn frame_time(&self) -> Duration {
        self.frame_time
    }

    fn walk(&mut self, scene: &Scene, id: NodeId, origin: Point, alpha: f64) {
        let Some(object) = scene.object(id) else {
            return;
        };
        let (origin, alpha, filters) = match display_of(object) {
            Some(display) if !display.visible => return,
            Some(display) => (
                Point::new(origin.x + display.position.x, origin.y + display.position.y),
                alpha * display.alpha,
                display.filters.iter().copied().collect(),
            ),
            // Foreign display objects (the stage group) pass their parent's transform through.
            None if object.is_display_object() => (origin, alpha, SmallVec::new()),
            None => return,
        };
        let commands = object
            .as_any()
            .downcast_ref::<Graphics>()
            .map_or(0, |g| g.commands.len());
        self.items.push(DrawItem {
            node: id,
            type_name: object.type_name().to_string(),
            origin,
            alpha,
            filters,
            commands,
        });
        for child in scene.children(id) {
            self.walk(scene, *child, origin, alpha);
        }
    }
}

impl RenderBackend for HeadlessBackend {
    fn resize(&mut self, width: u32, height: u32) {
        log::debug!("headless {:?}: resize to {width}x{height}", self.surface);
        self.size = (width, height);
    }

    fn render(&mut self, scene: &Scene, stage: NodeId) {
        if self.disposed {
            log::warn!("headless {:?}: render after dispose", self.surface);
            return;
        }
        let now = Instant::now();
        if let Some(prev) = self.last_render.replace(now) {
            self.frame_time = now - prev;
        }
        self.items.clear();
        self.walk(scene, stage, Point::default(), 1.0);
        self.frames += 1;
        log::trace!(
            "headless {:?}: frame {} with {} items",
            self.surface,
            self.frames,
            self.items.len()
        );
    }

    fn configure(&mut self, options: &RendererOptions) {
        self.options = options.clone();
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.items.clear();
    }
}

/// Creates a [`HeadlessBackend`] per surface and keeps a handle to each,
/// so callers can look at what was drawn.
#[derive(Clone, Debug, Default)]
pub struct HeadlessFactory {
    created: Rc<RefCell<Vec<Rc<RefCell<HeadlessBackend>>>>>,
}

impl HeadlessFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent backend created for `surface`.
    pub fn backend(&self, surface: SurfaceId) -> Option<Rc<RefCell<HeadlessBackend>>> {
        self.created
            .borrow()
            .iter()
            .rev()
            .find(|b| b.borrow().surface == surface)
            .cloned()
    }

    pub fn created(&self) -> usize {
        self.created.borrow().len()
    }
}

impl BackendFactory for HeadlessFactory {
    fn create(&self, surface: SurfaceId, options: &RendererOptions) -> SharedBackend {
        let backend = Rc::new(RefCell::new(HeadlessBackend::new(surface, options)));
        self.created.borrow_mut().push(backend.clone());
        backend
    }
}
