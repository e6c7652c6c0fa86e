//! # Reconciling a declarative tree into a retained scene
//!
//! Trellis drives a retained-mode 2D scene from element descriptions. A
//! runtime describes what the scene should look like; the reconciler works
//! out the mutations and applies them to live objects. There are four main
//! pieces:
//!
//! - [`Reconciler`]: builds objects from a [`Catalogue`], links them to
//!   their parents, applies prop diffs and tears subtrees down.
//! - [`Store`]: the reactive state of one mounted surface.
//! - [`FrameLoop`]: the shared scheduler that renders roots that want a frame.
//! - [`Root`]: binds a surface to a store and a rendered tree.
//!
//! ## Mounting
//!
//! ```rust
//! use trellis_core::*;
//!
//! let registry = Registry::with_namespace(
//!     "",
//!     [(
//!         "Group".to_string(),
//!         NodeType::new(|_| Ok(Box::new(Group::new()) as Box<dyn SceneObject>)),
//!     )],
//! );
//! let reconciler = Reconciler::new(Catalogue::new(registry), FrameLoop::new());
//! let root = reconciler.create_root(SurfaceId(1));
//!
//! let store = root.render([element("group").key("hud").prop("alpha", 0.5)])?;
//! let scene = store.scene();
//! let scene = scene.borrow();
//! let hud = scene.children(store.stage())[0];
//! assert_eq!(scene.object(hud).and_then(|o| o.get("alpha")), Some(Value::Number(0.5)));
//! # Ok::<(), trellis_core::Error>(())
//! ```
//!
//! Rendering again diffs every element against what was rendered before.
//! Only changed props are written; a changed `args` array rebuilds the
//! object and moves its children and listeners over.
//!
//! ## Attachment
//!
//! Display objects become native children of display parents. Anything else
//! is attached through a directive:
//!
//! - `attach: "mask"` assigns the child to a property of the parent.
//! - `attachArray: "filters"` appends it to an array property.
//! - `attachObject: ["textures", "hover"]` stores it under a key of a map.
//! - `attachFns: [attach, detach]` calls methods or callbacks.
//!
//! ## Frames
//!
//! Each root picks a [`Frameloop`] mode. `Always` renders every tick;
//! `Demand` renders only after an invalidation; `Never` renders only through
//! [`Store::advance`]. Frame subscribers run in priority order, and any
//! positive priority takes rendering over from the backend.
//!
//! ```rust
//! use trellis_core::*;
//!
//! let frame_loop = FrameLoop::new();
//! let store = Store::new(&frame_loop);
//! store.internal().borrow_mut().active = true;
//! store.set_frameloop(Frameloop::Demand);
//! assert_eq!(store.pending_frames(), 1);
//!
//! store.advance(16.0, false);
//! assert_eq!(store.pending_frames(), 0);
//! store.invalidate();
//! assert_eq!(store.pending_frames(), 1);
//! ```
//!
//! ## Disposal
//!
//! Removed objects are disposed after the commit, when the loop next runs
//! idle or when [`Store::flush_disposals`] is called. Primitives (objects
//! the author built and handed in) are never disposed unless asked to, and
//! `dispose: null` opts a node and its subtree out.

pub mod apply;
pub mod clock;
pub mod diff;
pub mod disposal;
pub mod effects;
pub mod error;
pub mod frameloop;
pub mod geometry;
pub mod host;
pub mod object;
pub mod portal;
pub mod props;
pub mod reconciler;
pub mod registry;
pub mod render_api;
pub mod root;
pub mod scene;
pub mod state;
pub mod store;
pub mod value;

#[cfg(test)]
mod tests;

pub use apply::*;
pub use clock::*;
pub use diff::*;
pub use disposal::*;
pub use effects::*;
pub use error::*;
pub use frameloop::*;
pub use geometry::*;
pub use host::*;
pub use object::*;
pub use portal::*;
pub use props::*;
pub use reconciler::*;
pub use registry::*;
pub use render_api::*;
pub use root::*;
pub use scene::*;
pub use state::*;
pub use store::*;
pub use value::*;
