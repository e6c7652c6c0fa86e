use std::any::Any;

use trellis_core::{DisposeError, PropertyError, SceneObject, Value};

/// Pixel storage a [`Sprite`](crate::Sprite) samples from. Not a display
/// object; it reaches a sprite through `attach: "texture"`.
#[derive(Debug)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub source: Option<String>,
    released: bool,
}

impl Texture {
    pub const NAME: &'static str = "Texture";

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            source: None,
            released: false,
        }
    }

    /// `[width, height]` or `[source]`.
    pub fn from_args(args: &[Value]) -> Result<Self, String> {
        match args {
            [] => Ok(Self::new(1, 1)),
            [Value::Str(source)] => Ok(Self {
                source: Some(source.clone()),
                ..Self::new(1, 1)
            }),
            [w, h] => match (w.as_f64(), h.as_f64()) {
                (Some(w), Some(h)) if w >= 0.0 && h >= 0.0 => Ok(Self::new(w as u32, h as u32)),
                _ => Err("texture size must be two non-negative numbers".into()),
            },
            _ => Err(format!("unexpected texture arguments ({} given)", args.len())),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl SceneObject for Texture {
    fn type_name(&self) -> &str {
        Self::NAME
    }

    fn get(&self, key: &str) -> Option<Value> {
        match key {
            "width" => Some(self.width.into()),
            "height" => Some(self.height.into()),
            "source" => self.source.clone().map(Value::from),
            "valid" => Some((!self.released).into()),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, _value: Value) -> Result<(), PropertyError> {
        match key {
            "width" | "height" | "source" | "valid" => Err(PropertyError::ReadOnly),
            _ => Err(PropertyError::Unknown),
        }
    }

    fn is_disposable(&self) -> bool {
        true
    }

    fn dispose(&mut self) -> Result<(), DisposeError> {
        if self.released {
            return Err(DisposeError("texture already destroyed".into()));
        }
        self.released = true;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
