use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use trellis_core::{Attach, Dispose, NodeId, Scene, Store};

/// Frame statistics for one root, fed by a frame subscription.
#[derive(Debug, Default)]
pub struct Hud {
    frame_count: u64,
    fps_smooth: f64,
    pub metrics: Option<Metrics>,
}

impl Hud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn fps(&self) -> f64 {
        self.fps_smooth
    }

    /// Counts a frame that took `delta` seconds.
    pub fn record(&mut self, delta: f64) {
        self.frame_count += 1;
        if delta > 0.0 {
            let fps = 1.0 / delta;
            // simple EMA
            let a = 0.2;
            self.fps_smooth = if self.fps_smooth == 0.0 {
                fps
            } else {
                (1.0 - a) * self.fps_smooth + a * fps
            };
        }
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("frame: {}", self.frame_count),
            format!("fps: {:.1}", self.fps_smooth),
        ];
        if let Some(m) = &self.metrics {
            lines.push(format!("nodes: {}", m.scene_nodes));
            lines.push(format!("subscribers: {}", m.subscribers));
            lines.push(format!("pending disposals: {}", m.pending_disposals));
        }
        lines.join("  |  ")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metrics {
    pub scene_nodes: usize,
    pub subscribers: usize,
    pub pending_disposals: usize,
}

impl Metrics {
    /// Reads the store. `None` while the scene is mid-commit.
    pub fn collect(store: &Store) -> Option<Self> {
        let scene = store.scene();
        let scene_nodes = scene.try_borrow().ok()?.len();
        let internal = store.internal();
        let subscribers = internal.try_borrow().ok()?.subscribers().len();
        Some(Self {
            scene_nodes,
            subscribers,
            pending_disposals: store.with(|s| s.disposals.len()),
        })
    }
}

/// Watches one root: keeps a [`Hud`] current and dumps the scene tree.
pub struct Inspector {
    pub hud: Rc<RefCell<Hud>>,
    store: Store,
    subscription: Option<Dispose>,
}

impl Inspector {
    pub fn new(store: &Store) -> Self {
        Self {
            hud: Rc::new(RefCell::new(Hud::new())),
            store: store.clone(),
            subscription: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.subscription.is_some()
    }

    /// Starts or stops following frames. The subscription has priority 0,
    /// so the backend keeps rendering.
    pub fn toggle(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.run();
            log::debug!("inspector off after {} frames", self.hud.borrow().frame_count());
            return;
        }
        let hud = self.hud.clone();
        self.subscription = Some(self.store.subscribe_frame(
            move |store, delta| {
                let mut hud = hud.borrow_mut();
                hud.record(delta);
                if let Some(metrics) = Metrics::collect(store) {
                    hud.metrics = Some(metrics);
                }
                log::trace!("{}", hud.summary());
            },
            0,
        ));
    }

    pub fn tree(&self) -> String {
        match self.store.scene().try_borrow() {
            Ok(scene) => dump(&scene, self.store.stage()),
            Err(_) => String::from("<scene is mid-commit>"),
        }
    }
}

impl Drop for Inspector {
    fn drop(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.run();
        }
    }
}

/// An indented outline of `root`: native children first, then attached
/// objects with the directive that holds them.
pub fn dump(scene: &Scene, root: NodeId) -> String {
    let mut out = String::new();
    dump_node(scene, root, 0, &mut out);
    out
}

fn dump_node(scene: &Scene, id: NodeId, depth: usize, out: &mut String) {
    let Some(inst) = scene.get(id) else {
        let _ = writeln!(out, "{:indent$}<stale {id:?}>", "", indent = depth * 2);
        return;
    };
    let _ = write!(out, "{:indent$}{}", "", inst.object.type_name(), indent = depth * 2);
    if let Some(name) = inst.object.get("name").as_ref().and_then(|v| v.as_str()) {
        let _ = write!(out, " {name:?}");
    }
    if let Some(state) = &inst.state {
        match state.memoized_props.attach() {
            Some(Attach::Array(name)) => {
                let _ = write!(out, " -> {name}[]");
            }
            Some(Attach::Object { target, name }) => {
                let _ = write!(out, " -> {target}.{name}");
            }
            Some(Attach::Property(name)) => {
                let _ = write!(out, " -> {name}");
            }
            Some(Attach::Fns { .. }) => out.push_str(" -> fns"),
            None => {}
        }
        if state.is_primitive() {
            out.push_str(" [primitive]");
        }
    }
    out.push('\n');

    for child in inst.children() {
        dump_node(scene, *child, depth + 1, out);
    }
    if let Some(state) = &inst.state {
        for object in &state.objects {
            dump_node(scene, *object, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use trellis_core::{FrameLoop, Frameloop, Reconciler, RootConfig, SurfaceId, Value, element};

    use super::*;

    fn reconciler() -> Reconciler {
        Reconciler::new(trellis_scene::catalogue(), FrameLoop::new())
    }

    #[test]
    fn ema_settles_on_steady_frames() {
        let mut hud = Hud::new();
        hud.record(0.0);
        assert_eq!(hud.fps(), 0.0);
        for _ in 0..50 {
            hud.record(0.02);
        }
        assert_eq!(hud.frame_count(), 51);
        assert!((hud.fps() - 50.0).abs() < 1e-6);
        assert!(hud.summary().starts_with("frame: 51  |  fps: 50.0"));
    }

    #[test]
    fn tree_lists_attachments() {
        let reconciler = reconciler();
        let root = reconciler.create_root(SurfaceId(1));
        let store = root
            .render([element("container")
                .prop("name", "world")
                .child(element("sprite").child(
                    element("texture")
                        .args([Value::from(4.0), Value::from(4.0)])
                        .attach("texture"),
                ))
                .child(element("blurFilter").attach_array("filters"))])
            .unwrap();

        insta::assert_snapshot!(dump(&store.scene().borrow(), store.stage()), @r#"
        Group
          Container "world"
            Sprite
              Texture -> texture
            BlurFilter -> filters[]
        "#);
    }

    #[test]
    fn inspector_follows_frames_until_toggled_off() {
        let reconciler = reconciler();
        let root = reconciler.create_root(SurfaceId(1));
        root.configure(RootConfig {
            frameloop: Frameloop::Never,
            ..RootConfig::default()
        });
        let store = root.render([element("container")]).unwrap();

        let mut inspector = Inspector::new(&store);
        inspector.toggle();
        store.advance(0.0, false);
        store.advance(16.0, false);
        {
            let hud = inspector.hud.borrow();
            assert_eq!(hud.frame_count(), 2);
            assert_eq!(
                hud.metrics,
                Some(Metrics {
                    scene_nodes: 2,
                    subscribers: 1,
                    pending_disposals: 0,
                })
            );
        }

        inspector.toggle();
        assert!(!inspector.is_enabled());
        store.advance(32.0, false);
        assert_eq!(inspector.hud.borrow().frame_count(), 2);
        assert!(inspector.tree().starts_with("Group\n  Container\n"));
    }
}
