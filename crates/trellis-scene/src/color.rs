use trellis_core::{Capabilities, Composite, PropertyError, Value, ValueType};

/// Straight-alpha RGBA, one byte per channel.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Color(pub u8, pub u8, pub u8, pub u8);

impl Color {
    pub const KIND: &'static str = "Color";
    pub const TRANSPARENT: Color = Color(0, 0, 0, 0);
    pub const BLACK: Color = Color(0, 0, 0, 255);
    pub const WHITE: Color = Color(255, 255, 255, 255);

    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Color(r, g, b, 255)
    }

    pub fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color(r, g, b, a)
    }

    /// Parses `#RRGGBB` or `#RRGGBBAA`. Anything else is opaque black.
    pub fn from_hex(hex: &str) -> Self {
        let s = hex.trim_start_matches('#');
        let byte = |i: usize, fallback: u8| {
            s.get(i..i + 2)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .unwrap_or(fallback)
        };
        match s.len() {
            6 => Color(byte(0, 0), byte(2, 0), byte(4, 0), 255),
            8 => Color(byte(0, 0), byte(2, 0), byte(4, 0), byte(6, 255)),
            _ => Color::BLACK,
        }
    }

    /// Packed `0xRRGGBB`, the usual tint notation.
    pub fn from_u32(rgb: u32) -> Self {
        Color((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8, 255)
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Color(self.0, self.1, self.2, a)
    }

    pub fn value_type() -> ValueType {
        ValueType::new(
            Capabilities::SET_COMPONENTS | Capabilities::COPY,
            &["r", "g", "b", "a"],
        )
    }

    /// Components as `0.0..=1.0` floats.
    pub fn to_value(self) -> Value {
        let f = |c: u8| c as f64 / 255.0;
        Value::Composite(Composite::new(
            Self::KIND,
            &[f(self.0), f(self.1), f(self.2), f(self.3)],
        ))
    }

    /// Accepts a `Color` composite, a hex string or a packed number.
    pub fn from_value(value: &Value) -> Result<Self, PropertyError> {
        match value {
            Value::Composite(c) if c.kind == Self::KIND && c.components.len() == 4 => {
                let b = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
                Ok(Color(
                    b(c.components[0]),
                    b(c.components[1]),
                    b(c.components[2]),
                    b(c.components[3]),
                ))
            }
            Value::Str(hex) => Ok(Color::from_hex(hex)),
            Value::Number(n) if *n >= 0.0 => Ok(Color::from_u32(*n as u32)),
            other => Err(PropertyError::Type {
                expected: "color",
                got: other.type_label(),
            }),
        }
    }
}

/// A 2D point or vector property (`position`, `scale`, `anchor`).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const KIND: &'static str = "Point";

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn splat(v: f64) -> Self {
        Self { x: v, y: v }
    }

    pub fn value_type() -> ValueType {
        ValueType::new(
            Capabilities::SET_COMPONENTS | Capabilities::COPY | Capabilities::BROADCAST,
            &["x", "y"],
        )
    }

    pub fn to_value(self) -> Value {
        Value::Composite(Composite::new(Self::KIND, &[self.x, self.y]))
    }

    /// Accepts a `Point` composite or a two-number array.
    pub fn from_value(value: &Value) -> Result<Self, PropertyError> {
        let components = match value {
            Value::Composite(c) if c.kind == Self::KIND => Some(c.components.clone()),
            Value::Array(_) => value.as_components(),
            _ => None,
        };
        match components.as_deref() {
            Some([x, y]) => Ok(Point::new(*x, *y)),
            _ => Err(PropertyError::Type {
                expected: "point",
                got: value.type_label(),
            }),
        }
    }
}
