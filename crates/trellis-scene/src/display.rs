//! Display objects: everything that takes part in the native child relation.

use std::any::Any;

use trellis_core::{DisposeError, Listeners, NodeId, PropertyBag, PropertyError, SceneObject, Value};

use crate::color::{Color, Point};

/// Transform and compositing state shared by all display objects.
#[derive(Debug)]
pub struct Display {
    pub position: Point,
    pub scale: Point,
    pub pivot: Point,
    pub rotation: f64,
    pub alpha: f64,
    pub visible: bool,
    pub interactive: bool,
    pub name: Option<String>,
    pub mask: Option<NodeId>,
    pub filters: Vec<NodeId>,
    pub listeners: Listeners,
    /// Whatever the engine does not model explicitly.
    pub extra: PropertyBag,
}

impl Default for Display {
    fn default() -> Self {
        Self {
            position: Point::default(),
            scale: Point::splat(1.0),
            pivot: Point::default(),
            rotation: 0.0,
            alpha: 1.0,
            visible: true,
            interactive: false,
            name: None,
            mask: None,
            filters: Vec::new(),
            listeners: Listeners::default(),
            extra: PropertyBag::default(),
        }
    }
}

fn number(value: &Value) -> Result<f64, PropertyError> {
    value.as_f64().ok_or(PropertyError::Type {
        expected: "number",
        got: value.type_label(),
    })
}

fn boolean(value: &Value) -> Result<bool, PropertyError> {
    value.as_bool().ok_or(PropertyError::Type {
        expected: "bool",
        got: value.type_label(),
    })
}

fn node(value: &Value) -> Result<Option<NodeId>, PropertyError> {
    match value {
        Value::Null => Ok(None),
        Value::Node(id) => Ok(Some(*id)),
        other => Err(PropertyError::Type {
            expected: "node",
            got: other.type_label(),
        }),
    }
}

pub(crate) fn nodes(value: &Value) -> Result<Vec<NodeId>, PropertyError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.iter().map(|v| node(v)?.ok_or(PropertyError::Unknown)).collect(),
        other => Err(PropertyError::Type {
            expected: "array of nodes",
            got: other.type_label(),
        }),
    }
}

impl Display {
    pub fn get(&self, key: &str) -> Option<Value> {
        Some(match key {
            "position" => self.position.to_value(),
            "scale" => self.scale.to_value(),
            "pivot" => self.pivot.to_value(),
            "x" => self.position.x.into(),
            "y" => self.position.y.into(),
            "rotation" => self.rotation.into(),
            "alpha" => self.alpha.into(),
            "visible" => self.visible.into(),
            "interactive" => self.interactive.into(),
            "name" => self.name.clone()?.into(),
            "mask" => self.mask?.into(),
            "filters" => Value::Array(self.filters.iter().map(|f| Value::Node(*f)).collect()),
            _ => return self.extra.get(key),
        })
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<(), PropertyError> {
        match key {
            "position" => self.position = Point::from_value(&value)?,
            "scale" => self.scale = Point::from_value(&value)?,
            "pivot" => self.pivot = Point::from_value(&value)?,
            "x" => self.position.x = number(&value)?,
            "y" => self.position.y = number(&value)?,
            "rotation" => self.rotation = number(&value)?,
            "alpha" => self.alpha = number(&value)?.clamp(0.0, 1.0),
            "visible" => self.visible = boolean(&value)?,
            "interactive" => self.interactive = boolean(&value)?,
            "name" => self.name = value.as_str().map(str::to_string),
            "mask" => self.mask = node(&value)?,
            "filters" => self.filters = nodes(&value)?,
            _ => self.extra.set(key, value),
        }
        Ok(())
    }
}

/// Forwards the display plumbing of a type holding a `display: Display`.
macro_rules! display_object {
    () => {
        fn is_display_object(&self) -> bool {
            true
        }

        fn add_event_listener(&mut self, event: &str, handler: trellis_core::Handler) {
            self.display.listeners.add(event, handler);
        }

        fn remove_event_listener(&mut self, event: &str, handler: &trellis_core::Handler) {
            self.display.listeners.remove(event, handler);
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}
pub(crate) use display_object;

/// A plain grouping node.
#[derive(Debug, Default)]
pub struct Container {
    pub display: Display,
}

impl Container {
    pub const NAME: &'static str = "Container";

    pub fn new() -> Self {
        Self::default()
    }
}

impl SceneObject for Container {
    fn type_name(&self) -> &str {
        Self::NAME
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.display.get(key)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), PropertyError> {
        self.display.set(key, value)
    }

    display_object!();
}

/// A textured quad. The texture is attached as a child node
/// (`attach: "texture"`) or passed as the first constructor argument.
#[derive(Debug)]
pub struct Sprite {
    pub display: Display,
    pub texture: Option<NodeId>,
    pub tint: Color,
    pub anchor: Point,
    pub blend_mode: String,
}

impl Sprite {
    pub const NAME: &'static str = "Sprite";

    pub fn new(texture: Option<NodeId>) -> Self {
        Self {
            display: Display::default(),
            texture,
            tint: Color::WHITE,
            anchor: Point::default(),
            blend_mode: "normal".into(),
        }
    }

    pub fn from_args(args: &[Value]) -> Result<Self, String> {
        match args {
            [] => Ok(Self::new(None)),
            [Value::Node(texture)] => Ok(Self::new(Some(*texture))),
            [other, ..] => Err(format!("expected a texture node, got {}", other.type_label())),
        }
    }
}

impl SceneObject for Sprite {
    fn type_name(&self) -> &str {
        Self::NAME
    }

    fn get(&self, key: &str) -> Option<Value> {
        match key {
            "texture" => self.texture.map(Value::Node),
            "tint" => Some(self.tint.to_value()),
            "anchor" => Some(self.anchor.to_value()),
            "blendMode" => Some(self.blend_mode.clone().into()),
            _ => self.display.get(key),
        }
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), PropertyError> {
        match key {
            "texture" => {
                self.texture = match value {
                    Value::Null => None,
                    Value::Node(id) => Some(id),
                    other => {
                        return Err(PropertyError::Type {
                            expected: "texture node",
                            got: other.type_label(),
                        });
                    }
                }
            }
            "tint" => self.tint = Color::from_value(&value)?,
            "anchor" => self.anchor = Point::from_value(&value)?,
            "blendMode" => {
                self.blend_mode = value
                    .as_str()
                    .ok_or(PropertyError::Type {
                        expected: "string",
                        got: value.type_label(),
                    })?
                    .to_string()
            }
            _ => self.display.set(key, value)?,
        }
        Ok(())
    }

    display_object!();
}

/// Shading parameters of a [`Mesh`], reachable as `material-*` props.
#[derive(Debug)]
pub struct Material {
    pub color: Color,
    pub opacity: f64,
    pub wireframe: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            opacity: 1.0,
            wireframe: false,
        }
    }
}

impl SceneObject for Material {
    fn type_name(&self) -> &str {
        "Material"
    }

    fn get(&self, key: &str) -> Option<Value> {
        match key {
            "color" => Some(self.color.to_value()),
            "opacity" => Some(self.opacity.into()),
            "wireframe" => Some(self.wireframe.into()),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), PropertyError> {
        match key {
            "color" => self.color = Color::from_value(&value)?,
            "opacity" => self.opacity = number(&value)?,
            "wireframe" => self.wireframe = boolean(&value)?,
            _ => return Err(PropertyError::Unknown),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A vertex mesh with its own material and GPU buffers.
#[derive(Debug)]
pub struct Mesh {
    pub display: Display,
    pub material: Material,
    pub vertices: Vec<f64>,
    pub released: bool,
}

impl Mesh {
    pub const NAME: &'static str = "Mesh";

    /// `args` is the flat `[x0, y0, x1, y1, ..]` vertex list.
    pub fn from_args(args: &[Value]) -> Result<Self, String> {
        let vertices = args
            .iter()
            .map(Value::as_f64)
            .collect::<Option<Vec<_>>>()
            .ok_or("vertices must be numbers")?;
        if vertices.len() % 2 != 0 {
            return Err(format!("odd vertex component count {}", vertices.len()));
        }
        Ok(Self {
            display: Display::default(),
            material: Material::default(),
            vertices,
            released: false,
        })
    }
}

impl SceneObject for Mesh {
    fn type_name(&self) -> &str {
        Self::NAME
    }

    fn get(&self, key: &str) -> Option<Value> {
        match key {
            "vertexCount" => Some(((self.vertices.len() / 2) as f64).into()),
            _ => self.display.get(key),
        }
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), PropertyError> {
        match key {
            "vertexCount" => Err(PropertyError::ReadOnly),
            _ => self.display.set(key, value),
        }
    }

    fn field(&self, key: &str) -> Option<&dyn SceneObject> {
        (key == "material").then_some(&self.material as &dyn SceneObject)
    }

    fn field_mut(&mut self, key: &str) -> Option<&mut dyn SceneObject> {
        (key == "material").then_some(&mut self.material as &mut dyn SceneObject)
    }

    fn is_disposable(&self) -> bool {
        true
    }

    fn dispose(&mut self) -> Result<(), DisposeError> {
        if self.released {
            return Err(DisposeError("mesh buffers already released".into()));
        }
        self.released = true;
        self.vertices.clear();
        Ok(())
    }

    display_object!();
}

/// Emits `event` on a display object's listeners. Returns how many ran.
pub fn emit(object: &dyn SceneObject, event: &trellis_core::PointerEvent) -> usize {
    let Some(display) = display_of(object) else {
        return 0;
    };
    display.listeners.emit(event);
    display.listeners.count(event.name)
}

/// The shared display state of any engine display object.
pub fn display_of(object: &dyn SceneObject) -> Option<&Display> {
    let any = object.as_any();
    if let Some(c) = any.downcast_ref::<Container>() {
        return Some(&c.display);
    }
    if let Some(s) = any.downcast_ref::<Sprite>() {
        return Some(&s.display);
    }
    if let Some(m) = any.downcast_ref::<Mesh>() {
        return Some(&m.display);
    }
    if let Some(g) = any.downcast_ref::<crate::graphics::Graphics>() {
        return Some(&g.display);
    }
    None
}
