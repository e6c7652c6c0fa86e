use std::any::Any;

use trellis_core::{DisposeError, PropertyError, SceneObject, Value};

/// Gaussian blur applied to a display object through its `filters` list
/// (`attachArray: "filters"`).
#[derive(Debug)]
pub struct BlurFilter {
    pub strength: f64,
    pub quality: u32,
    pub enabled: bool,
    released: bool,
}

impl Default for BlurFilter {
    fn default() -> Self {
        Self {
            strength: 8.0,
            quality: 4,
            enabled: true,
            released: false,
        }
    }
}

impl BlurFilter {
    pub const NAME: &'static str = "BlurFilter";

    pub fn from_args(args: &[Value]) -> Result<Self, String> {
        let mut filter = Self::default();
        match args {
            [] => {}
            [strength] => filter.strength = arg(strength)?,
            [strength, quality] => {
                filter.strength = arg(strength)?;
                filter.quality = arg(quality)? as u32;
            }
            _ => return Err(format!("expected at most 2 arguments, got {}", args.len())),
        }
        Ok(filter)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

fn arg(value: &Value) -> Result<f64, String> {
    match value.as_f64() {
        Some(n) if n >= 0.0 => Ok(n),
        _ => Err(format!("expected a non-negative number, got {}", value.type_label())),
    }
}

impl SceneObject for BlurFilter {
    fn type_name(&self) -> &str {
        Self::NAME
    }

    fn get(&self, key: &str) -> Option<Value> {
        match key {
            "strength" | "blur" => Some(self.strength.into()),
            "quality" => Some(self.quality.into()),
            "enabled" => Some(self.enabled.into()),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), PropertyError> {
        let number = || {
            value.as_f64().filter(|n| *n >= 0.0).ok_or(PropertyError::Type {
                expected: "non-negative number",
                got: value.type_label(),
            })
        };
        match key {
            "strength" | "blur" => self.strength = number()?,
            "quality" => self.quality = number()? as u32,
            "enabled" => {
                self.enabled = value.as_bool().ok_or(PropertyError::Type {
                    expected: "bool",
                    got: value.type_label(),
                })?
            }
            _ => return Err(PropertyError::Unknown),
        }
        Ok(())
    }

    fn is_disposable(&self) -> bool {
        true
    }

    fn dispose(&mut self) -> Result<(), DisposeError> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_is_an_alias_for_strength() {
        let mut f = BlurFilter::from_args(&[2.0.into()]).unwrap();
        f.set("blur", 5.0.into()).unwrap();
        assert_eq!(f.get("strength"), Some(Value::Number(5.0)));
        assert!(f.set("quality", (-1.0).into()).is_err());
        assert_eq!(f.set("tint", 1.0.into()), Err(PropertyError::Unknown));
    }
}
