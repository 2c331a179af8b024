// Animation clock and FPS accounting for table-scene

use std::f64::consts::TAU;

use glam::Vec3;

pub const RISE_START_Y: f32 = 2.7;
pub const RISE_END_Y: f32 = 5.0;
pub const RISE_DURATION_MS: f64 = 3000.0;
pub const ORBIT_PERIOD_MS: f64 = 2000.0;
pub const ORBIT_RADIUS: f32 = 4.0;
pub const FPS_WINDOW_MS: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    /// Climbing from `RISE_START_Y` to `RISE_END_Y`.
    Rising,
    /// Circling the Y axis. Never left once entered.
    Orbiting { entered_at: f64 },
}

/// Position of the floating cube, driven by wall-clock time.
#[derive(Debug, Clone)]
pub struct AnimationState {
    position: Vec3,
    angle: f32,
    radius: f32,
    start_time: Option<f64>,
    phase: Phase,
}

impl Default for AnimationState {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationState {
    pub fn new() -> Self {
        Self {
            position: Vec3::new(0.0, RISE_START_Y, 0.0),
            angle: 0.0,
            radius: ORBIT_RADIUS,
            start_time: None,
            phase: Phase::Rising,
        }
    }

    #[cfg(test)]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Orbit angle in radians, within `[0, 2π)`.
    #[cfg(test)]
    pub fn angle(&self) -> f32 {
        self.angle
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Advances to `now_ms` and returns the new cube position.
    ///
    /// The first call fixes the animation start time.
    pub fn advance(&mut self, now_ms: f64) -> Vec3 {
        let start = *self.start_time.get_or_insert(now_ms);

        if self.phase == Phase::Rising && self.position.y >= RISE_END_Y {
            self.phase = Phase::Orbiting { entered_at: now_ms };
        }

        match self.phase {
            Phase::Rising => {
                let progress = ((now_ms - start) / RISE_DURATION_MS).clamp(0.0, 1.0) as f32;
                self.position.y = if progress >= 1.0 {
                    RISE_END_Y
                } else {
                    RISE_START_Y + progress * (RISE_END_Y - RISE_START_Y)
                };
            }
            Phase::Orbiting { entered_at } => {
                let turns = (now_ms - entered_at) / ORBIT_PERIOD_MS;
                let angle = (turns * TAU).rem_euclid(TAU) as f32;
                // Narrowing can round a value just below 2π up to 2π.
                self.angle = if angle >= std::f32::consts::TAU { 0.0 } else { angle };
                self.position.x = self.angle.cos() * self.radius;
                self.position.z = self.angle.sin() * self.radius;
            }
        }

        self.position
    }
}

/// Frames-per-second accounting over fixed one-second windows.
#[derive(Debug, Clone, Default)]
pub struct FpsCounter {
    frames: u32,
    last_reset: f64,
    published: Option<u32>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one frame at `now_ms`.
    ///
    /// Returns the frame count of the window that just closed, if any.
    pub fn record_frame(&mut self, now_ms: f64) -> Option<u32> {
        self.frames += 1;
        if now_ms - self.last_reset < FPS_WINDOW_MS {
            return None;
        }

        let fps = self.frames;
        self.published = Some(fps);
        self.frames = 0;
        self.last_reset = now_ms;
        Some(fps)
    }

    /// Frames counted in the current window.
    #[cfg(test)]
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Most recently published value.
    #[cfg(test)]
    pub fn published(&self) -> Option<u32> {
        self.published
    }
}
