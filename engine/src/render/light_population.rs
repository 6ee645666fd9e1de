//! Light Population
//!
//! Authoritative point-light state. Lights are placed once by a seeded,
//! uniform-in-volume generator (fixed count for the session) and optionally
//! animated with constant-speed motion that reflects off the bounds volume.
//! The GPU `LightBuffer` is a per-frame mirror produced by [`LightPopulation::to_gpu`].

use glam::{Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::cluster_layout::GpuLight;

/// A point light. Color in rgb, intensity in w.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub color_intensity: Vec4,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color_intensity: Vec4::new(1.0, 1.0, 1.0, 1.0),
        }
    }
}

impl Light {
    pub fn new(position: Vec3, color_intensity: Vec4) -> Self {
        Self {
            position,
            color_intensity,
        }
    }

    /// White light of unit intensity at `position`.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color_intensity = color.extend(self.color_intensity.w);
        self
    }

    pub fn to_gpu(&self) -> GpuLight {
        GpuLight::new(self.position, self.color_intensity)
    }
}

/// World-space box that lights are placed in and bounce inside.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for LightBounds {
    fn default() -> Self {
        Self {
            min: Vec3::new(-40.0, -10.0, -120.0),
            max: Vec3::new(40.0, 10.0, -1.0),
        }
    }
}

impl LightBounds {
    /// Corners in any order.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// Place `count` lights uniformly in `bounds`. Same seed, same lights.
pub fn generate_lights(count: usize, bounds: LightBounds, seed: u64) -> Vec<Light> {
    let mut rng = StdRng::seed_from_u64(seed);
    let bounds = LightBounds::new(bounds.min, bounds.max);
    (0..count).map(|_| random_light(&mut rng, &bounds)).collect()
}

fn random_light(rng: &mut StdRng, bounds: &LightBounds) -> Light {
    let position = Vec3::new(
        rng.gen_range(bounds.min.x..=bounds.max.x),
        rng.gen_range(bounds.min.y..=bounds.max.y),
        rng.gen_range(bounds.min.z..=bounds.max.z),
    );
    // Saturated hue so heat-map markers stay distinguishable.
    let color = hue_to_rgb(rng.gen_range(0.0..1.0));
    let intensity = rng.gen_range(0.5..=2.0);
    Light::new(position, color.extend(intensity))
}

fn random_direction(rng: &mut StdRng) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        let len_sq = v.length_squared();
        if len_sq > 1e-4 && len_sq <= 1.0 {
            return v / len_sq.sqrt();
        }
    }
}

fn hue_to_rgb(h: f32) -> Vec3 {
    let r = (h * 6.0 - 3.0).abs() - 1.0;
    let g = 2.0 - (h * 6.0 - 2.0).abs();
    let b = 2.0 - (h * 6.0 - 4.0).abs();
    Vec3::new(r, g, b).clamp(Vec3::ZERO, Vec3::ONE)
}

/// Owns the lights and their motion state.
#[derive(Clone, Debug)]
pub struct LightPopulation {
    lights: Vec<Light>,
    velocities: Vec<Vec3>,
    bounds: LightBounds,
    animated: bool,
}

impl LightPopulation {
    /// Seeded placement with stationary lights. See [`LightPopulation::with_motion`].
    pub fn generate(count: usize, bounds: LightBounds, seed: u64) -> Self {
        let bounds = LightBounds::new(bounds.min, bounds.max);
        Self {
            lights: generate_lights(count, bounds, seed),
            velocities: vec![Vec3::ZERO; count],
            bounds,
            animated: false,
        }
    }

    /// Wrap an explicit light list (tests, scripted scenes).
    pub fn from_lights(lights: Vec<Light>, bounds: LightBounds) -> Self {
        let count = lights.len();
        Self {
            lights,
            velocities: vec![Vec3::ZERO; count],
            bounds: LightBounds::new(bounds.min, bounds.max),
            animated: false,
        }
    }

    /// Give every light a seeded random direction at `speed` units per second.
    pub fn with_motion(mut self, speed: f32, seed: u64) -> Self {
        // Offset so directions are not correlated with positions.
        let mut rng = StdRng::seed_from_u64(seed ^ 0x9E37_79B9_7F4A_7C15);
        for v in &mut self.velocities {
            *v = random_direction(&mut rng) * speed;
        }
        self.animated = speed != 0.0;
        self
    }

    pub fn set_animated(&mut self, animated: bool) {
        self.animated = animated;
    }

    pub fn is_animated(&self) -> bool {
        self.animated
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }

    pub fn bounds(&self) -> LightBounds {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Advance motion by `delta_time` seconds, reflecting off the bounds.
    pub fn step(&mut self, delta_time: f32) {
        // Also rejects NaN, which would poison every position.
        if !self.animated || !(delta_time > 0.0) {
            return;
        }
        let bounds = self.bounds;
        for (light, velocity) in self.lights.iter_mut().zip(self.velocities.iter_mut()) {
            let mut p = light.position + *velocity * delta_time;
            for axis in 0..3 {
                let (lo, hi) = (bounds.min[axis], bounds.max[axis]);
                if p[axis] < lo {
                    p[axis] = lo + (lo - p[axis]);
                    velocity[axis] = velocity[axis].abs();
                } else if p[axis] > hi {
                    p[axis] = hi - (p[axis] - hi);
                    velocity[axis] = -velocity[axis].abs();
                }
                // A step longer than the box itself still has to land inside.
                p[axis] = p[axis].clamp(lo, hi);
            }
            light.position = p;
        }
    }

    /// GPU mirror of at most `max_lights` lights.
    pub fn to_gpu(&self, max_lights: usize) -> Vec<GpuLight> {
        if self.lights.len() > max_lights {
            log::warn!(
                "[LightPopulation] {} lights exceed buffer capacity {}, truncating upload",
                self.lights.len(),
                max_lights
            );
        }
        self.lights.iter().take(max_lights).map(Light::to_gpu).collect()
    }
}
