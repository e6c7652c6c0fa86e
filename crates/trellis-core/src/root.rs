//! Mounted roots: one per drawing surface.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::disposal::dispose_guarded;
use crate::error::Result;
use crate::frameloop::TimerId;
use crate::geometry::Size;
use crate::host::{Element, HostConfig, HostTree};
use crate::reconciler::Reconciler;
use crate::render_api::{BackendFactory, RendererOptions, SharedBackend, SurfaceId};
use crate::store::{Frameloop, Store};

/// How long an unmounted root keeps its resources, so an in-flight commit
/// can still finish against it.
pub const UNMOUNT_GRACE: Duration = Duration::from_millis(500);

pub type OnCreated = Rc<dyn Fn(&Store)>;

/// Per-root configuration.
#[derive(Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RootConfig {
    pub frameloop: Frameloop,
    /// Keeps the current size when unset.
    pub size: Option<Size>,
    pub renderer: RendererOptions,
    /// Used instead of the reconciler's backend factory.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub backend: Option<SharedBackend>,
    /// Runs once the first render has mounted.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub on_created: Option<OnCreated>,
}

impl fmt::Debug for RootConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootConfig")
            .field("frameloop", &self.frameloop)
            .field("size", &self.size)
            .field("renderer", &self.renderer)
            .field("backend", &self.backend.is_some())
            .field("on_created", &self.on_created.is_some())
            .finish()
    }
}

pub(crate) struct RootInner {
    surface: SurfaceId,
    reconciler: Reconciler,
    store: Store,
    tree: RefCell<HostTree>,
    configured: Cell<bool>,
    mounted: Cell<bool>,
    renderer: RefCell<Option<RendererOptions>>,
    on_created: RefCell<Option<OnCreated>>,
    teardown: Cell<Option<TimerId>>,
}

#[derive(Clone)]
pub struct Root(Rc<RootInner>);

#[derive(Clone, Default)]
pub struct WeakRoot(Weak<RootInner>);

impl WeakRoot {
    pub fn upgrade(&self) -> Option<Root> {
        self.0.upgrade().map(Root)
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("surface", &self.0.surface)
            .field("configured", &self.0.configured.get())
            .field("mounted", &self.0.mounted.get())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for WeakRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakRoot({:p})", self.0.as_ptr())
    }
}

impl Reconciler {
    /// Returns the root for `surface`, creating it on first use.
    pub fn create_root(&self, surface: SurfaceId) -> Root {
        let existing = self.roots.borrow().get(&surface).and_then(WeakRoot::upgrade);
        if let Some(root) = existing {
            log::warn!("create_root should only be called once per surface; reusing the root of {surface:?}");
            return root;
        }

        let store = match self.frame_loop.root(surface) {
            Some(store) => store,
            None => {
                let store = Store::new(&self.frame_loop);
                self.frame_loop.insert_root(surface, store.clone());
                store
            }
        };
        let root = Root(Rc::new(RootInner {
            surface,
            reconciler: self.clone(),
            store,
            tree: RefCell::new(HostTree::new()),
            configured: Cell::new(false),
            mounted: Cell::new(false),
            renderer: RefCell::new(None),
            on_created: RefCell::new(None),
            teardown: Cell::new(None),
        }));
        self.roots.borrow_mut().insert(surface, root.downgrade());
        log::debug!("created root for {surface:?}");
        root
    }

    pub fn root(&self, surface: SurfaceId) -> Option<Root> {
        self.roots.borrow().get(&surface).and_then(WeakRoot::upgrade)
    }
}

impl Root {
    pub fn downgrade(&self) -> WeakRoot {
        WeakRoot(Rc::downgrade(&self.0))
    }

    pub fn surface(&self) -> SurfaceId {
        self.0.surface
    }

    pub fn store(&self) -> &Store {
        &self.0.store
    }

    pub fn is_mounted(&self) -> bool {
        self.0.mounted.get()
    }

    /// Applies `config`. The backend is created on the first call only;
    /// later calls reconfigure it when the renderer options changed.
    pub fn configure(&self, config: RootConfig) -> &Self {
        let inner = &self.0;
        let store = &inner.store;

        match store.with(|s| s.gl.clone()) {
            None => {
                let gl = config.backend.clone().or_else(|| {
                    inner
                        .reconciler
                        .backends
                        .as_ref()
                        .map(|factory| factory.create(inner.surface, &config.renderer))
                });
                if let Some(gl) = gl {
                    store.set(|s| s.gl = Some(gl));
                } else {
                    log::debug!("{:?} has no backend; frames run without drawing", inner.surface);
                }
            }
            Some(gl) => {
                if inner.renderer.borrow().as_ref() != Some(&config.renderer) {
                    gl.borrow_mut().configure(&config.renderer);
                }
            }
        }
        *inner.renderer.borrow_mut() = Some(config.renderer.clone());

        if let Some(size) = config.size
            && store.with(|s| s.size) != size
        {
            store.set_size(size.width, size.height);
        }
        if store.with(|s| s.frameloop) != config.frameloop {
            store.set_frameloop(config.frameloop);
        }

        *inner.on_created.borrow_mut() = config.on_created;
        inner.configured.set(true);
        self
    }

    /// Renders `elements` under the stage. The first render activates the
    /// root and runs `on_created`.
    pub fn render(&self, elements: impl IntoIterator<Item = Element>) -> Result<Store> {
        let inner = &self.0;
        if !inner.configured.get() {
            self.configure(RootConfig::default());
        }
        if let Some(id) = inner.teardown.take() {
            inner.reconciler.cancel_timeout(id);
        }

        {
            let scene = inner.store.scene();
            let mut scene = scene.borrow_mut();
            inner.tree.borrow_mut().render(
                &inner.reconciler,
                &mut scene,
                &inner.store,
                elements.into_iter().collect(),
            )?;
        }

        if !inner.mounted.replace(true) {
            inner.store.internal().borrow_mut().active = true;
            inner.store.invalidate();
            let on_created = inner.on_created.borrow().clone();
            if let Some(on_created) = on_created {
                on_created(&inner.store);
            }
            log::debug!("mounted {:?}", inner.surface);
        }
        Ok(inner.store.clone())
    }

    /// Deactivates the root and removes its tree right away. Resources are
    /// released after [`UNMOUNT_GRACE`].
    pub fn unmount(&self) {
        let inner = &self.0;
        inner.store.internal().borrow_mut().active = false;
        {
            let scene = inner.store.scene();
            let mut scene = scene.borrow_mut();
            if let Err(err) = inner.tree.borrow_mut().clear(&inner.reconciler, &mut scene, &inner.store) {
                log::warn!("unmounting {:?}: {err}", inner.surface);
            }
        }
        inner.mounted.set(false);

        let root = self.clone();
        let id = inner
            .reconciler
            .schedule_timeout(UNMOUNT_GRACE, Box::new(move || root.teardown()));
        if let Some(previous) = inner.teardown.replace(Some(id)) {
            inner.reconciler.cancel_timeout(previous);
        }
    }

    fn teardown(&self) {
        let inner = &self.0;
        inner.teardown.set(None);
        inner.store.flush_disposals();

        let (scene, stage, gl) = inner.store.with(|s| (s.scene.clone(), s.stage, s.gl.clone()));
        match scene.try_borrow_mut() {
            Ok(mut scene) => {
                for node in scene.descendants(stage) {
                    if let Some(object) = scene.object_mut(node)
                        && object.is_disposable()
                    {
                        dispose_guarded(object);
                    }
                }
            }
            Err(_) => log::warn!("{:?} torn down mid-commit; stage left undisposed", inner.surface),
        }
        if let Some(gl) = gl {
            gl.borrow_mut().dispose();
        }
        inner.store.patch(|s| s.gl = None);

        inner.reconciler.frame_loop.remove_root(inner.surface);
        let mut roots = inner.reconciler.roots.borrow_mut();
        if roots
            .get(&inner.surface)
            .is_some_and(|w| Weak::ptr_eq(&w.0, &Rc::downgrade(&self.0)))
        {
            roots.shift_remove(&inner.surface);
        }
        log::debug!("released {:?}", inner.surface);
    }
}
