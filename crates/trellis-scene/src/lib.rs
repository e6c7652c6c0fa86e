//! # A small retained 2D engine for Trellis
//!
//! Containers, sprites, meshes, vector graphics, textures and filters, plus a
//! [`HeadlessBackend`] that walks the stage each frame and records what it
//! would draw.
//!
//! [`catalogue`] returns every type here under the `trellis` namespace, so
//! elements can be written as `"sprite"` or `"trellisSprite"`.
//!
//! ```rust
//! use trellis_core::*;
//! use trellis_scene::{catalogue, HeadlessFactory, Sprite};
//!
//! let backends = HeadlessFactory::new();
//! let reconciler = Reconciler::new(catalogue(), FrameLoop::new()).with_backends(backends.clone());
//! let root = reconciler.create_root(SurfaceId(7));
//! root.configure(RootConfig {
//!     size: Some(Size::new(320.0, 240.0)),
//!     ..RootConfig::default()
//! });
//!
//! let store = root.render([element("sprite")
//!     .prop("tint", "#ff0000")
//!     .child(element("texture").args([Value::from(16.0), Value::from(16.0)]).attach("texture"))])?;
//!
//! let scene = store.scene();
//! let scene = scene.borrow();
//! let sprite = scene.children(store.stage())[0];
//! assert!(scene.downcast_ref::<Sprite>(sprite).unwrap().texture.is_some());
//! assert_eq!(backends.created(), 1);
//! # Ok::<(), trellis_core::Error>(())
//! ```

use trellis_core::{Catalogue, NodeType, Registry, SceneObject, Value};

pub mod backend;
pub mod color;
pub mod display;
pub mod filters;
pub mod graphics;
pub mod texture;


pub use backend::*;
pub use color::*;
pub use display::*;
pub use filters::*;
pub use graphics::*;
pub use texture::*;

fn boxed<T: SceneObject>(object: T) -> Box<dyn SceneObject> {
    Box::new(object)
}

/// Defaults shared by every display object, restored when a prop is removed.
fn display_defaults(ty: NodeType) -> NodeType {
    ty.with_default("position", || Point::default().to_value())
        .with_default("scale", || Point::splat(1.0).to_value())
        .with_default("pivot", || Point::default().to_value())
        .with_default("x", || 0.0.into())
        .with_default("y", || 0.0.into())
        .with_default("rotation", || 0.0.into())
        .with_default("alpha", || 1.0.into())
        .with_default("visible", || true.into())
        .with_default("interactive", || false.into())
        .with_default("mask", || Value::Null)
        .with_default("filters", || Value::Array(Vec::new()))
}

/// Every engine type, keyed by its registered name.
pub fn node_types() -> Vec<(String, NodeType)> {
    vec![
        (
            Container::NAME.into(),
            display_defaults(NodeType::new(|_| Ok(boxed(Container::new())))),
        ),
        (
            Sprite::NAME.into(),
            display_defaults(NodeType::new(|args| Sprite::from_args(args).map(boxed)))
                .with_default("tint", || Color::WHITE.to_value())
                .with_default("anchor", || Point::default().to_value())
                .with_default("texture", || Value::Null)
                .with_default("blendMode", || "normal".into()),
        ),
        (
            Mesh::NAME.into(),
            display_defaults(NodeType::new(|args| Mesh::from_args(args).map(boxed))),
        ),
        (
            Graphics::NAME.into(),
            display_defaults(NodeType::new(|_| Ok(boxed(Graphics::new())))),
        ),
        (
            Texture::NAME.into(),
            NodeType::new(|args| Texture::from_args(args).map(boxed)),
        ),
        (
            BlurFilter::NAME.into(),
            NodeType::new(|args| BlurFilter::from_args(args).map(boxed))
                .with_default("strength", || 8.0.into())
                .with_default("quality", || 4.0.into())
                .with_default("enabled", || true.into()),
        ),
    ]
}

/// A catalogue holding [`node_types`] under the `trellis` namespace, with
/// [`Point`] and [`Color`] registered as composite values.
pub fn catalogue() -> Catalogue {
    let mut registry = Registry::with_namespace("trellis", node_types());
    registry.register_value(Point::KIND, Point::value_type());
    registry.register_value(Color::KIND, Color::value_type());
    Catalogue::new(registry)
}
