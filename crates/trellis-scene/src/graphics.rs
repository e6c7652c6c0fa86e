use trellis_core::{PropertyError, SceneObject, Value};

use crate::color::{Color, Point};
use crate::display::{Display, display_object};

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Rect {
        origin: Point,
        size: Point,
        color: Color,
        radius: f64,
        stroke: Option<(f64, Color)>,
    },
    Ellipse {
        center: Point,
        rx: f64,
        ry: f64,
        color: Color,
        stroke: Option<(f64, Color)>,
    },
    Line {
        from: Point,
        to: Point,
        width: f64,
        color: Color,
    },
}

/// Vector shapes, usually drawn from a `draw` callback.
///
/// The callback receives the object itself; downcast it to draw:
///
/// ```rust
/// use trellis_core::{Callback, SceneObject};
/// use trellis_scene::{Color, Graphics, Point};
///
/// let draw = Callback::new(|object: &mut dyn SceneObject| {
///     if let Some(g) = object.as_any_mut().downcast_mut::<Graphics>() {
///         g.clear();
///         g.draw_circle(Point::new(0.0, 0.0), 8.0, Color::WHITE);
///     }
/// });
/// let mut g = Graphics::new();
/// draw.call(&mut g);
/// assert_eq!(g.commands.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Graphics {
    pub display: Display,
    pub commands: Vec<DrawCommand>,
}

impl Graphics {
    pub const NAME: &'static str = "Graphics";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn draw_rect(&mut self, origin: Point, size: Point, color: Color, radius: f64) {
        self.commands.push(DrawCommand::Rect {
            origin,
            size,
            color,
            radius,
            stroke: None,
        });
    }

    pub fn draw_rect_stroke(&mut self, origin: Point, size: Point, color: Color, radius: f64, width: f64) {
        self.commands.push(DrawCommand::Rect {
            origin,
            size,
            color,
            radius,
            stroke: Some((width.max(0.0), color)),
        });
    }

    pub fn draw_ellipse(&mut self, center: Point, rx: f64, ry: f64, color: Color) {
        self.commands.push(DrawCommand::Ellipse {
            center,
            rx: rx.max(0.0),
            ry: ry.max(0.0),
            color,
            stroke: None,
        });
    }

    pub fn draw_circle(&mut self, center: Point, radius: f64, color: Color) {
        self.draw_ellipse(center, radius, radius, color);
    }

    pub fn draw_line(&mut self, from: Point, to: Point, width: f64, color: Color) {
        self.commands.push(DrawCommand::Line {
            from,
            to,
            width: width.max(0.0),
            color,
        });
    }
}

impl SceneObject for Graphics {
    fn type_name(&self) -> &str {
        Self::NAME
    }

    fn get(&self, key: &str) -> Option<Value> {
        match key {
            "commandCount" => Some((self.commands.len() as f64).into()),
            _ => self.display.get(key),
        }
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), PropertyError> {
        match key {
            "commandCount" => Err(PropertyError::ReadOnly),
            _ => self.display.set(key, value),
        }
    }

    fn invoke(&mut self, method: &str, _args: &[Value]) -> Option<Result<Value, PropertyError>> {
        match method {
            "clear" => {
                self.clear();
                Some(Ok(Value::Null))
            }
            _ => None,
        }
    }

    display_object!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_extents_are_clamped() {
        let mut g = Graphics::new();
        g.draw_ellipse(Point::default(), -1.0, 2.0, Color::BLACK);
        assert_eq!(
            g.commands[0],
            DrawCommand::Ellipse {
                center: Point::default(),
                rx: 0.0,
                ry: 2.0,
                color: Color::BLACK,
                stroke: None,
            }
        );
    }

    #[test]
    fn clear_is_invokable() {
        let mut g = Graphics::new();
        g.draw_line(Point::default(), Point::new(1.0, 1.0), 1.0, Color::WHITE);
        assert!(matches!(g.invoke("clear", &[]), Some(Ok(Value::Null))));
        assert!(g.commands.is_empty());
        assert!(g.invoke("fill", &[]).is_none());
    }
}
