use std::cell::RefCell;
use std::rc::Rc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::scene::{NodeId, Scene};

/// Identifies the drawing surface a root is mounted on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SurfaceId(pub u64);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum PowerPreference {
    #[default]
    HighPerformance,
    LowPower,
}

/// Options a backend is created and reconfigured with.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RendererOptions {
    pub antialias: bool,
    /// Clear color as `0xRRGGBBAA`.
    pub background: Option<u32>,
    pub resolution: f32,
    pub power_preference: PowerPreference,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            antialias: true,
            background: None,
            resolution: 1.0,
            power_preference: PowerPreference::HighPerformance,
        }
    }
}

/// The engine's drawing side, driven by the frame loop.
pub trait RenderBackend {
    /// Surface size in physical pixels changed.
    fn resize(&mut self, width: u32, height: u32);
    fn render(&mut self, scene: &Scene, stage: NodeId);
    fn configure(&mut self, _options: &RendererOptions) {}
    /// Releases GPU-side resources when the root is torn down.
    fn dispose(&mut self) {}
}

pub type SharedBackend = Rc<RefCell<dyn RenderBackend>>;

/// Creates backends for newly configured roots.
pub trait BackendFactory {
    fn create(&self, surface: SurfaceId, options: &RendererOptions) -> SharedBackend;
}

impl<F> BackendFactory for F
where
    F: Fn(SurfaceId, &RendererOptions) -> SharedBackend,
{
    fn create(&self, surface: SurfaceId, options: &RendererOptions) -> SharedBackend {
        self(surface, options)
    }
}
