use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use web_time::Duration;

use crate::clock::TestClock;
use crate::effects::Dispose;
use crate::error::{DisposeError, PropertyError};
use crate::frameloop::FrameLoop;
use crate::geometry::Size;
use crate::host::{HostConfig, HostContainer, NodeRef, UpdatePayload, create_portal, element};
use crate::object::{Group, PropertyBag, SceneObject};
use crate::portal::InjectState;
use crate::props::{Props, keys};
use crate::reconciler::Reconciler;
use crate::registry::{Catalogue, NodeType, Registry};
use crate::render_api::{RenderBackend, RendererOptions, SharedBackend, SurfaceId};
use crate::root::{RootConfig, UNMOUNT_GRACE};
use crate::scene::{NodeId, Scene};
use crate::store::{Frameloop, Store};
use crate::value::Value;

#[derive(Debug, Default)]
struct Material {
    props: PropertyBag,
}

impl SceneObject for Material {
    fn type_name(&self) -> &str {
        "Material"
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.props.get(key)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), PropertyError> {
        self.props.set(key, value);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Records its constructor arguments and counts disposals.
#[derive(Debug)]
struct Probe {
    name: &'static str,
    display: bool,
    args: Vec<Value>,
    props: PropertyBag,
    material: Material,
    disposals: Arc<AtomicUsize>,
}

impl SceneObject for Probe {
    fn type_name(&self) -> &str {
        self.name
    }

    fn get(&self, key: &str) -> Option<Value> {
        match key {
            "args" => Some(Value::Array(self.args.clone())),
            _ => self.props.get(key),
        }
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), PropertyError> {
        self.props.set(key, value);
        Ok(())
    }

    fn field(&self, key: &str) -> Option<&dyn SceneObject> {
        (key == "material").then_some(&self.material as &dyn SceneObject)
    }

    fn field_mut(&mut self, key: &str) -> Option<&mut dyn SceneObject> {
        (key == "material").then_some(&mut self.material as &mut dyn SceneObject)
    }

    fn is_display_object(&self) -> bool {
        self.display
    }

    fn is_disposable(&self) -> bool {
        true
    }

    fn dispose(&mut self) -> Result<(), DisposeError> {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn probe_type(name: &'static str, display: bool, disposals: &Arc<AtomicUsize>) -> NodeType {
    let disposals = disposals.clone();
    NodeType::new(move |args| {
        Ok(Box::new(Probe {
            name,
            display,
            args: args.to_vec(),
            props: PropertyBag::default(),
            material: Material::default(),
            disposals: disposals.clone(),
        }) as Box<dyn SceneObject>)
    })
    .with_default("alpha", || Value::Number(1.0))
}

struct Fixture {
    reconciler: Reconciler,
    clock: TestClock,
    disposals: Arc<AtomicUsize>,
}

impl Fixture {
    fn disposed(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    fn store(&self) -> Store {
        let store = Store::new(self.reconciler.frame_loop());
        store.internal().borrow_mut().active = true;
        store
    }
}

fn fixture() -> Fixture {
    let disposals = Arc::new(AtomicUsize::new(0));
    let registry = Registry::with_namespace(
        "",
        [
            ("Probe".to_string(), probe_type("Probe", true, &disposals)),
            ("Filter".to_string(), probe_type("Filter", false, &disposals)),
        ],
    );
    let clock = TestClock::new();
    let reconciler = Reconciler::new(Catalogue::new(registry), FrameLoop::with_clock(clock.clone()));
    Fixture {
        reconciler,
        clock,
        disposals,
    }
}

#[derive(Default)]
struct CountingBackend {
    renders: Rc<Cell<u32>>,
    disposed: Rc<Cell<bool>>,
}

impl RenderBackend for CountingBackend {
    fn resize(&mut self, _width: u32, _height: u32) {}

    fn render(&mut self, _scene: &Scene, _stage: NodeId) {
        self.renders.set(self.renders.get() + 1);
    }

    fn dispose(&mut self) {
        self.disposed.set(true);
    }
}

fn prop_of(scene: &Scene, node: NodeId, key: &str) -> Option<Value> {
    scene.object(node).and_then(|o| o.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_reversal_restores_props() {
        let f = fixture();
        let root = f.reconciler.create_root(SurfaceId(1));
        let a = Props::new().with("alpha", 0.5).with("tint", "red");
        let b = Props::new().with("tint", "blue");

        let store = root.render([element("probe").key("p").props(a.clone())]).unwrap();
        let node = store.scene().borrow().children(store.stage())[0];

        root.render([element("probe").key("p").props(b.clone())]).unwrap();
        {
            let scene = store.scene();
            let scene = scene.borrow();
            assert_eq!(prop_of(&scene, node, "alpha"), Some(Value::Number(1.0)));
            assert_eq!(prop_of(&scene, node, "tint"), Some(Value::from("blue")));
        }

        root.render([element("probe").key("p").props(a.clone())]).unwrap();
        let scene = store.scene();
        let mut scene = scene.borrow_mut();
        assert_eq!(scene.children(store.stage()), [node]);
        assert_eq!(prop_of(&scene, node, "alpha"), Some(Value::Number(0.5)));
        assert_eq!(prop_of(&scene, node, "tint"), Some(Value::from("red")));

        let payload = f.reconciler.prepare_update(&mut scene, node, "probe", &a, &a).unwrap();
        assert_eq!(payload, UpdatePayload::None);
    }

    #[test]
    fn test_attach_array_keeps_items_apart_from_children() {
        let f = fixture();
        let root = f.reconciler.create_root(SurfaceId(1));
        root.configure(RootConfig {
            size: Some(Size::new(800.0, 600.0)),
            ..Default::default()
        });

        let child_b = || element("filter").key("b").attach_array("items");
        let store = root
            .render([element("probe")
                .key("parent")
                .children([element("probe").key("a"), child_b()])])
            .unwrap();
        assert_eq!(store.with(|s| s.size), Size::new(800.0, 600.0));
        assert_eq!(store.with(|s| s.viewport.aspect), 800.0 / 600.0);

        let (parent, a, b) = {
            let scene = store.scene();
            let scene = scene.borrow();
            let parent = scene.children(store.stage())[0];
            let a = scene.children(parent)[0];
            let Some(Value::Array(items)) = prop_of(&scene, parent, "items") else {
                panic!("items not set");
            };
            let b = items[0].as_node().unwrap();
            assert_eq!(scene.children(parent), [a]);
            assert_eq!(scene.state(parent).unwrap().objects, [b]);
            (parent, a, b)
        };

        root.render([element("probe").key("parent").children([child_b()])]).unwrap();
        let scene = store.scene();
        let scene = scene.borrow();
        assert!(scene.children(parent).is_empty());
        assert!(!scene.contains(a));
        assert_eq!(prop_of(&scene, parent, "items"), Some(Value::Array(vec![Value::Node(b)])));
    }

    #[test]
    fn test_dashed_key_patches_nested_field() {
        let f = fixture();
        let root = f.reconciler.create_root(SurfaceId(1));
        let store = root
            .render([element("probe").key("m").prop("material-color", "red")])
            .unwrap();
        let node = store.scene().borrow().children(store.stage())[0];

        let old = Props::new().with("material-color", "red");
        let new = Props::new().with("material-color", "blue");
        {
            let scene = store.scene();
            let mut scene = scene.borrow_mut();
            let UpdatePayload::Patch(diff) = f.reconciler.prepare_update(&mut scene, node, "probe", &old, &new).unwrap()
            else {
                panic!("expected a patch");
            };
            assert_eq!(diff.changes.len(), 1);
            assert_eq!(diff.changes[0].path.as_slice(), ["material", "color"]);
        }

        root.render([element("probe").key("m").prop("material-color", "blue")]).unwrap();
        let scene = store.scene();
        let scene = scene.borrow();
        assert_eq!(scene.children(store.stage()), [node]);
        let probe = scene.downcast_ref::<Probe>(node).unwrap();
        assert_eq!(probe.material.get("color"), Some(Value::from("blue")));
        assert_eq!(probe.props.get("material-color"), None);
    }

    #[test]
    fn test_changed_args_reconstruct_in_place() {
        let f = fixture();
        let root = f.reconciler.create_root(SurfaceId(1));
        let b_ref = NodeRef::new();
        let tree = |arg: f64| {
            element("probe").key("parent").children([
                element("probe").key("a"),
                element("probe")
                    .key("b")
                    .args([Value::from(arg)])
                    .node_ref(&b_ref)
                    .child(element("probe").key("d")),
                element("probe").key("c"),
            ])
        };

        let store = root.render([tree(1.0)]).unwrap();
        let (parent, old_b, d) = {
            let scene = store.scene();
            let mut scene = scene.borrow_mut();
            let parent = scene.children(store.stage())[0];
            let old_b = scene.children(parent)[1];
            let d = scene.children(old_b)[0];
            assert_eq!(b_ref.get(), Some(old_b));

            let old = Props::new().with(keys::ARGS, vec![Value::from(1.0)]);
            let new = Props::new().with(keys::ARGS, vec![Value::from(2.0)]);
            let payload = f.reconciler.prepare_update(&mut scene, old_b, "probe", &old, &new).unwrap();
            assert_eq!(payload, UpdatePayload::Reconstruct);
            (parent, old_b, d)
        };

        root.render([tree(2.0)]).unwrap();
        {
            let scene = store.scene();
            let scene = scene.borrow();
            let children = scene.children(parent);
            assert_eq!(children.len(), 3);
            let new_b = children[1];
            assert_ne!(new_b, old_b);
            assert!(!scene.contains(old_b));
            assert_eq!(prop_of(&scene, new_b, "args"), Some(Value::Array(vec![Value::from(2.0)])));
            assert_eq!(scene.children(new_b), [d]);
            assert_eq!(scene.state(d).unwrap().parent, Some(new_b));
            assert_eq!(b_ref.get(), Some(new_b));
        }

        assert_eq!(f.disposed(), 0);
        store.flush_disposals();
        assert_eq!(f.disposed(), 1);
    }

    #[test]
    fn test_destroy_policy() {
        let f = fixture();
        let r = &f.reconciler;
        let store = f.store();
        let container = HostContainer::Root(store.clone());
        let stage = store.stage();
        let scene = store.scene();
        let mut scene = scene.borrow_mut();
        let probe = |scene: &mut Scene, props: Props| r.create_instance(scene, "probe", &props, &container).unwrap();

        // Explicitly kept: nothing is disposed, ever.
        let kept = probe(&mut scene, Props::new());
        let kept_child = probe(&mut scene, Props::new());
        r.append_child(&mut scene, kept, kept_child).unwrap();
        r.append_child(&mut scene, stage, kept).unwrap();
        r.remove_child_with(&mut scene, stage, kept, Some(false)).unwrap();
        assert_eq!(store.with(|s| s.disposals.len()), 0);

        // Default: queued, then disposed exactly once.
        let dropped = probe(&mut scene, Props::new());
        r.append_child(&mut scene, stage, dropped).unwrap();
        r.remove_child(&mut scene, stage, dropped).unwrap();
        assert_eq!(f.disposed(), 0);
        let queue = store.with(|s| s.disposals.clone());
        assert_eq!(queue.flush(&mut scene), 1);
        assert_eq!(queue.flush(&mut scene), 0);
        assert_eq!(f.disposed(), 1);

        // `dispose: null` opts the node and its subtree out.
        let opted = probe(&mut scene, Props::new().with(keys::DISPOSE, Value::Null));
        let inner = probe(&mut scene, Props::new());
        r.append_child(&mut scene, opted, inner).unwrap();
        r.append_child(&mut scene, stage, opted).unwrap();
        r.remove_child(&mut scene, stage, opted).unwrap();
        assert_eq!(queue.flush(&mut scene), 0);
        assert_eq!(f.disposed(), 1);

        // Primitives survive removal with a severed state.
        let adopted = scene.insert(Box::new(Group::new()));
        let props = Props::new().with(keys::OBJECT, adopted);
        let node = r.create_instance(&mut scene, "primitive", &props, &container).unwrap();
        r.append_child(&mut scene, stage, node).unwrap();
        r.remove_child(&mut scene, stage, node).unwrap();
        assert!(scene.contains(adopted));
        let state = scene.state(adopted).unwrap();
        assert!(state.is_primitive());
        assert!(state.parent.is_none() && state.root.is_none());
    }

    #[test]
    fn test_positive_priority_suppresses_backend() {
        let f = fixture();
        let store = f.store();
        let backend = CountingBackend::default();
        let renders = backend.renders.clone();
        let gl: SharedBackend = Rc::new(RefCell::new(backend));
        store.set(|s| s.gl = Some(gl));

        store.advance(0.0, false);
        assert_eq!(renders.get(), 1);

        let ran = Rc::new(Cell::new(0));
        let sub = {
            let ran = ran.clone();
            store.subscribe_frame(move |_, _| ran.set(ran.get() + 1), 1)
        };
        store.advance(16.0, false);
        assert_eq!((renders.get(), ran.get()), (1, 1));
        assert_eq!(store.internal().borrow().priority, 1);

        sub.run();
        sub.run();
        assert_eq!(store.internal().borrow().priority, 0);
        store.advance(32.0, false);
        assert_eq!((renders.get(), ran.get()), (2, 1));
    }

    #[test]
    fn test_subscriber_can_unsubscribe_itself_mid_frame() {
        let f = fixture();
        let store = f.store();
        let slot: Rc<RefCell<Option<Dispose>>> = Rc::default();
        let calls = Rc::new(Cell::new(0));
        let order = Rc::new(RefCell::new(Vec::new()));

        let dispose = {
            let slot = slot.clone();
            let calls = calls.clone();
            let order = order.clone();
            store.subscribe_frame(
                move |_, _| {
                    calls.set(calls.get() + 1);
                    order.borrow_mut().push("self");
                    if let Some(d) = slot.borrow().as_ref() {
                        d.run();
                    }
                },
                0,
            )
        };
        *slot.borrow_mut() = Some(dispose);
        let _late = {
            let order = order.clone();
            store.subscribe_frame(move |_, _| order.borrow_mut().push("late"), -1)
        };

        store.advance(0.0, false);
        store.advance(16.0, false);
        assert_eq!(calls.get(), 1);
        assert_eq!(*order.borrow(), ["late", "self", "late"]);
        assert_eq!(store.internal().borrow().subscribers().len(), 1);
    }

    #[test]
    fn test_root_lifecycle() {
        let f = fixture();
        let disposed = Rc::new(Cell::new(false));
        let reconciler = f.reconciler.clone().with_backends({
            let disposed = disposed.clone();
            move |_: SurfaceId, _: &RendererOptions| -> SharedBackend {
                Rc::new(RefCell::new(CountingBackend {
                    disposed: disposed.clone(),
                    ..Default::default()
                }))
            }
        });
        let surface = SurfaceId(7);
        let created = Rc::new(Cell::new(0));

        let root = reconciler.create_root(surface);
        let again = reconciler.create_root(surface);
        assert!(root.store().ptr_eq(again.store()));
        assert!(reconciler.frame_loop().root(surface).is_some());

        root.configure(RootConfig {
            frameloop: Frameloop::Demand,
            on_created: Some({
                let created = created.clone();
                Rc::new(move |_: &Store| created.set(created.get() + 1))
            }),
            ..Default::default()
        });
        let store = root.render([element("probe").key("x")]).unwrap();
        root.render([element("probe").key("x").prop("alpha", 0.5)]).unwrap();
        assert_eq!(created.get(), 1);
        assert!(store.is_active());
        assert!(store.with(|s| s.gl.is_some()));
        assert!(root.is_mounted());

        root.unmount();
        assert!(!store.is_active());
        assert!(store.scene().borrow().children(store.stage()).is_empty());
        assert_eq!(f.disposed(), 0);

        reconciler.frame_loop().run_timers();
        assert!(reconciler.root(surface).is_some());

        f.clock.advance(UNMOUNT_GRACE);
        assert_eq!(reconciler.frame_loop().run_timers(), 1);
        assert_eq!(f.disposed(), 1);
        assert!(disposed.get());
        assert!(store.with(|s| s.gl.is_none()));
        assert!(reconciler.frame_loop().root(surface).is_none());
        drop((root, again));
        assert!(reconciler.root(surface).is_none());
    }

    #[test]
    fn test_render_within_grace_cancels_teardown() {
        let f = fixture();
        let root = f.reconciler.create_root(SurfaceId(1));
        let store = root.render([element("probe")]).unwrap();
        root.unmount();
        f.clock.advance(Duration::from_millis(100));
        root.render([element("probe")]).unwrap();
        f.clock.advance(UNMOUNT_GRACE);

        assert_eq!(f.reconciler.frame_loop().run_timers(), 0);
        assert!(store.is_active());
        assert!(f.reconciler.frame_loop().root(SurfaceId(1)).is_some());
        assert_eq!(store.scene().borrow().children(store.stage()).len(), 1);
    }

    #[test]
    fn test_portal_renders_into_its_container() {
        let f = fixture();
        let root = f.reconciler.create_root(SurfaceId(1));
        let store = root.store().clone();
        let container = store.adopt(Box::new(Group::new()));
        let inject = InjectState {
            frameloop: Some(Frameloop::Never),
            ..Default::default()
        };

        root.render([
            element("probe").key("main"),
            create_portal([element("probe").key("inside")], container, inject.clone()),
        ])
        .unwrap();
        {
            let scene = store.scene();
            let scene = scene.borrow();
            assert_eq!(scene.children(store.stage()).len(), 1);
            let inside = scene.children(container)[0];
            let portal = scene.state(inside).and_then(|s| s.store()).unwrap();
            assert!(!portal.ptr_eq(&store));
            assert_eq!(portal.stage(), container);
            assert_eq!(portal.with(|s| s.frameloop), Frameloop::Never);
            let previous = portal.with(|s| s.previous_root.clone()).and_then(|w| w.upgrade()).unwrap();
            assert!(previous.ptr_eq(&store));
        }

        root.render([element("probe").key("main"), create_portal([], container, inject)])
            .unwrap();
        let scene = store.scene();
        assert!(scene.borrow().children(container).is_empty());
    }

    #[test]
    fn test_text_children_fail_the_commit() {
        let f = fixture();
        let root = f.reconciler.create_root(SurfaceId(1));
        let err = root
            .render([element("probe").child(crate::host::text("hello"))])
            .unwrap_err();
        assert!(matches!(err, crate::Error::UnsupportedNode(_)));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_root_config_round_trip() {
        let config = RootConfig {
            frameloop: Frameloop::Demand,
            size: Some(Size::new(800.0, 600.0)),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: RootConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.frameloop, Frameloop::Demand);
        assert_eq!(back.size, Some(Size::new(800.0, 600.0)));
        assert_eq!(back.renderer, RendererOptions::default());
        assert!(back.on_created.is_none());
    }
}
