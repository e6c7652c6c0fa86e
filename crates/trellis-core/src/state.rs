use indexmap::IndexMap;

use crate::props::Props;
use crate::scene::NodeId;
use crate::store::{Store, WeakStore};
use crate::value::{Callback, Handler};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StateFlags: u8 {
        /// Supplied by the author; never reconstructed or auto-disposed.
        const PRIMITIVE = 1 << 0;
        /// A root stage or portal container; never disposed by removal.
        const CONTAINER = 1 << 1;
        /// Opted out of disposal with `dispose: null`.
        const NO_DISPOSE = 1 << 2;
        const HIDDEN = 1 << 3;
    }
}

/// Reconciler bookkeeping attached to every instance it creates or adopts.
#[derive(Clone, Debug, Default)]
pub struct LocalState {
    pub root: Option<WeakStore>,
    /// Logical parent, which may differ from the native one for attached nodes.
    pub parent: Option<NodeId>,
    /// Attached dependents that are not native children.
    pub objects: Vec<NodeId>,
    pub flags: StateFlags,
    /// Event key (`onClick`) to the listener currently registered for it.
    pub handlers: IndexMap<String, Handler>,
    pub memoized_props: Props,
    pub on_update: Option<Callback>,
}

impl LocalState {
    pub fn new(root: Option<WeakStore>) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.flags.contains(StateFlags::PRIMITIVE)
    }

    pub fn is_container(&self) -> bool {
        self.flags.contains(StateFlags::CONTAINER)
    }

    pub fn store(&self) -> Option<Store> {
        self.root.as_ref()?.upgrade()
    }

    /// Drops every reference into the tree. Flags survive so a severed
    /// primitive stays recognizable.
    pub fn sever(&mut self) {
        self.root = None;
        self.parent = None;
        self.objects.clear();
        self.handlers.clear();
        self.memoized_props = Props::new();
        self.on_update = None;
    }
}
