//! Animatable value types
//!
//! A tween is generic over the value it animates. The only thing the engine
//! needs from a value type is how to blend two of them ([`Interpolate`]) and
//! what its rest value is (`Default`).

use serde::{Deserialize, Serialize};

/// Trait for values that can be linearly interpolated
pub trait Interpolate: Clone {
    /// Linearly interpolate between self and other by factor t (0.0 to 1.0)
    fn lerp(&self, other: &Self, t: f32) -> Self;
}

/// Everything a tween needs from its value type
///
/// `Default` supplies the implicit rest value a tween starts from when no
/// explicit "from" value is set.
pub trait TweenValue: Interpolate + Default + 'static {}

impl<T: Interpolate + Default + 'static> TweenValue for T {}

// ============================================================================
// Scalars
// ============================================================================

impl Interpolate for f32 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Interpolate for f64 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t as f64
    }
}

// ============================================================================
// Vectors
// ============================================================================

/// A 2D vector
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2::new(0.0, 0.0);

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Interpolate for Vec2 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Vec2::new(self.x.lerp(&other.x, t), self.y.lerp(&other.y, t))
    }
}

/// A 3D vector
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Interpolate for Vec3 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Vec3::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
        )
    }
}

// ============================================================================
// Color
// ============================================================================

/// Linear RGBA color
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_hex(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xFF) as f32 / 255.0;
        let g = ((hex >> 8) & 0xFF) as f32 / 255.0;
        let b = (hex & 0xFF) as f32 / 255.0;
        Self::rgb(r, g, b)
    }
}

/// Colors rest at white, so an implicit fade starts from full opacity
impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

impl Interpolate for Color {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Color::rgba(
            self.r + (other.r - self.r) * t,
            self.g + (other.g - self.g) * t,
            self.b + (other.b - self.b) * t,
            self.a + (other.a - self.a) * t,
        )
    }
}

// ============================================================================
// Text
// ============================================================================

/// Typewriter blend: the target's characters replace the source's from the
/// left as `t` grows
impl Interpolate for String {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        let target_len = other.chars().count();
        let shown = ((target_len as f32) * t.clamp(0.0, 1.0)).round() as usize;

        let mut out: String = other.chars().take(shown).collect();
        out.extend(self.chars().skip(shown));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_interpolation() {
        assert!((0.0_f32.lerp(&1.0, 0.5) - 0.5).abs() < 1e-6);
        assert!((10.0_f32.lerp(&20.0, 0.25) - 12.5).abs() < 1e-6);
        assert!((10.0_f64.lerp(&20.0, 0.25) - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_vec3_interpolation() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(10.0, 20.0, 30.0);
        let mid = a.lerp(&b, 0.5);

        assert_eq!(mid, Vec3::new(5.0, 10.0, 15.0));
    }

    #[test]
    fn test_color_interpolation() {
        let mid = Color::BLACK.lerp(&Color::TRANSPARENT, 0.5);
        assert_eq!(mid, Color::rgba(0.0, 0.0, 0.0, 0.5));
        assert_eq!(Color::default(), Color::WHITE);
        assert_eq!(Color::from_hex(0xFF0000), Color::rgb(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_string_typewriter() {
        let from = String::from("-----");
        let to = String::from("hello");
        assert_eq!(from.lerp(&to, 0.0), "-----");
        assert_eq!(from.lerp(&to, 0.4), "he---");
        assert_eq!(from.lerp(&to, 1.0), "hello");
        assert_eq!(String::new().lerp(&to, 0.6), "hel");
    }
}
