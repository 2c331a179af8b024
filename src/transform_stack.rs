// Model-view transform stack for table-scene

use glam::{Mat4, Vec3};

use crate::error::RenderError;

/// The current model-view matrix plus a LIFO of saved copies.
///
/// Composition operations post-multiply, so a transform applied later acts
/// first on object-local coordinates.
#[derive(Debug, Clone)]
pub struct TransformStack {
    current: Mat4,
    saved: Vec<Mat4>,
    pushes: usize,
    pops: usize,
}

impl Default for TransformStack {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformStack {
    pub fn new() -> Self {
        Self {
            current: Mat4::IDENTITY,
            saved: Vec::with_capacity(8),
            pushes: 0,
            pops: 0,
        }
    }

    pub fn current(&self) -> &Mat4 {
        &self.current
    }

    /// Number of saved matrices.
    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    /// Saves a copy of the current matrix.
    pub fn push(&mut self) {
        self.saved.push(self.current);
        self.pushes += 1;
    }

    /// Restores the most recently saved matrix and returns it.
    pub fn pop(&mut self) -> Result<Mat4, RenderError> {
        let restored = self.saved.pop().ok_or(RenderError::StackUnderflow)?;
        self.current = restored;
        self.pops += 1;
        Ok(restored)
    }

    pub fn identity(&mut self) {
        self.current = Mat4::IDENTITY;
    }

    /// Composes a world-to-eye transform for a camera at `eye`.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        self.current *= Mat4::look_at_rh(eye, target, up);
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.current *= Mat4::from_translation(offset);
    }

    pub fn scale(&mut self, factors: Vec3) {
        self.current *= Mat4::from_scale(factors);
    }

    /// `(pushes, pops)` since the last [`reset_counters`](Self::reset_counters).
    pub fn counters(&self) -> (usize, usize) {
        (self.pushes, self.pops)
    }

    pub fn reset_counters(&mut self) {
        self.pushes = 0;
        self.pops = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_on_empty_stack_underflows() {
        let mut stack = TransformStack::new();
        assert!(matches!(stack.pop(), Err(RenderError::StackUnderflow)));

        stack.push();
        assert!(stack.pop().is_ok());
        assert!(matches!(stack.pop(), Err(RenderError::StackUnderflow)));
    }

    #[test]
    fn underflow_leaves_current_matrix_untouched() {
        let mut stack = TransformStack::new();
        stack.translate(Vec3::new(1.0, 2.0, 3.0));
        let before = *stack.current();

        assert!(stack.pop().is_err());
        assert_eq!(*stack.current(), before);
        assert_eq!(stack.counters(), (0, 0));
    }

    #[test]
    fn pushed_snapshot_is_not_aliased() {
        let mut stack = TransformStack::new();
        stack.translate(Vec3::X);
        let saved = *stack.current();

        stack.push();
        stack.scale(Vec3::splat(4.0));
        stack.translate(Vec3::Y);
        assert_ne!(*stack.current(), saved);

        assert_eq!(stack.pop().ok(), Some(saved));
        assert_eq!(*stack.current(), saved);
    }

    #[test]
    fn matched_sequences_round_trip() {
        let mut stack = TransformStack::new();
        stack.look_at(Vec3::new(8.0, 5.0, 10.0), Vec3::ZERO, Vec3::Y);
        let start = *stack.current();

        // Nested and sibling pushes, each with its own composition.
        let steps: [(Vec3, Vec3); 4] = [
            (Vec3::new(0.0, 1.1, 0.0), Vec3::ONE),
            (Vec3::new(0.0, 1.0, 0.0), Vec3::new(2.0, 0.1, 2.0)),
            (Vec3::new(-1.9, -0.1, 1.9), Vec3::new(0.1, 1.0, 0.1)),
            (Vec3::new(4.0, 5.0, 0.0), Vec3::splat(0.5)),
        ];
        for depth in 1..=steps.len() {
            for (offset, factors) in &steps[..depth] {
                stack.push();
                stack.translate(*offset);
                stack.scale(*factors);
            }
            assert_eq!(stack.depth(), depth);
            for _ in 0..depth {
                stack.pop().expect("matched pop");
            }
            assert_eq!(*stack.current(), start);
            assert_eq!(stack.depth(), 0);
        }

        let (pushes, pops) = stack.counters();
        assert_eq!(pushes, pops);
        assert_eq!(pushes, 1 + 2 + 3 + 4);
    }

    #[test]
    fn composition_applies_scale_before_translation() {
        let mut stack = TransformStack::new();
        stack.translate(Vec3::new(0.0, 1.0, 0.0));
        stack.scale(Vec3::new(2.0, 0.1, 2.0));

        let corner = stack.current().transform_point3(Vec3::ONE);
        assert!(corner.abs_diff_eq(Vec3::new(2.0, 1.1, 2.0), 1e-6));
    }
}
