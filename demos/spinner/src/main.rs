use std::cell::Cell;
use std::f64::consts::TAU;
use std::rc::Rc;

use trellis_core::*;
use trellis_devtools::Inspector;
use trellis_scene::{Color, Graphics, HeadlessFactory, Point, catalogue, emit};

const FRAMES: u32 = 120;
const DOTS: usize = 8;

fn dots() -> Callback {
    Callback::new(|object: &mut dyn SceneObject| {
        let Some(g) = object.as_any_mut().downcast_mut::<Graphics>() else {
            return;
        };
        g.clear();
        for i in 0..DOTS {
            let t = i as f64 / DOTS as f64;
            let (sin, cos) = (t * TAU).sin_cos();
            let alpha = (255.0 * (0.25 + 0.75 * t)) as u8;
            g.draw_circle(
                Point::new(cos * 24.0, sin * 24.0),
                4.0,
                Color::from_hex("#44AAFF").with_alpha(alpha),
            );
        }
    })
}

fn app(angle: f64, reversed: bool, draw: &Callback, on_click: &Handler) -> Vec<Element> {
    vec![
        element("graphics")
            .key("backdrop")
            .prop("alpha", 0.2)
            .prop("draw", draw.clone()),
        element("container")
            .key("spinner")
            .prop("position", [160.0, 120.0])
            .prop("rotation", if reversed { -angle } else { angle })
            .prop("interactive", true)
            .prop("onClick", on_click.clone())
            .children([
                element("graphics").key("dots").prop("draw", draw.clone()),
                element("blurFilter")
                    .args([Value::from(2.0)])
                    .attach_array("filters"),
            ]),
    ]
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let backends = HeadlessFactory::new();
    let reconciler = Reconciler::new(catalogue(), FrameLoop::new()).with_backends(backends.clone());
    let surface = SurfaceId(1);
    let root = reconciler.create_root(surface);
    root.configure(RootConfig {
        frameloop: Frameloop::Demand,
        size: Some(Size::new(320.0, 240.0)),
        ..RootConfig::default()
    });

    let reversed = Rc::new(Cell::new(false));
    let on_click = {
        let reversed = reversed.clone();
        Handler::new(move |_| reversed.set(!reversed.get()))
    };
    let draw = dots();

    let store = root.render(app(0.0, false, &draw, &on_click))?;
    let mut inspector = Inspector::new(&store);
    inspector.toggle();

    let frame_loop = reconciler.frame_loop();
    for frame in 0..FRAMES {
        let t = frame as f64 * 1000.0 / 60.0;
        let angle = (t / 1000.0 * TAU) % TAU;
        root.render(app(angle, reversed.get(), &draw, &on_click))?;
        frame_loop.tick(t);

        if frame == FRAMES / 2 {
            let scene = store.scene();
            let scene = scene.borrow();
            if let Some(&spinner) = scene.children(store.stage()).get(1)
                && let Some(object) = scene.object(spinner)
            {
                let event = PointerEvent {
                    name: "click",
                    position: Vec2 { x: 160.0, y: 120.0 },
                    target: Some(spinner),
                };
                log::info!("click ran {} listener(s)", emit(object, &event));
            }
        }
    }

    log::info!("{}", inspector.hud.borrow().summary());
    log::info!("scene:\n{}", inspector.tree());
    if let Some(backend) = backends.backend(surface) {
        let backend = backend.borrow();
        log::info!("drew {} frames, {} items in the last one", backend.frames, backend.items.len());
    }

    root.unmount();
    Ok(())
}
