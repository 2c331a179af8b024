// Scene composer for table-scene

use glam::Vec3;

use crate::device::RenderDevice;
use crate::error::RenderError;
use crate::frame::RenderContext;
use crate::math::{normal_matrix, Camera};
use crate::mesh::RegisteredMesh;
use crate::shader::ShaderBindings;
use crate::transform_stack::TransformStack;

/// Translation followed by scale, relative to the parent transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub translation: Vec3,
    pub scale: Vec3,
}

impl Placement {
    pub const fn new(translation: Vec3, scale: Vec3) -> Self {
        Self { translation, scale }
    }
}

/// Lift from the floor to the table's local origin.
pub const TABLE_OFFSET: Vec3 = Vec3::new(0.0, 1.1, 0.0);

pub const TABLE_TOP: Placement = Placement::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(2.0, 0.1, 2.0));

const LEG_SPREAD: f32 = 1.9;
const LEG_DROP: f32 = -0.1;
const LEG_SCALE: Vec3 = Vec3::new(0.1, 1.0, 0.1);

pub const TABLE_LEGS: [Placement; 4] = [
    Placement::new(Vec3::new(-LEG_SPREAD, LEG_DROP, -LEG_SPREAD), LEG_SCALE),
    Placement::new(Vec3::new(-LEG_SPREAD, LEG_DROP, LEG_SPREAD), LEG_SCALE),
    Placement::new(Vec3::new(LEG_SPREAD, LEG_DROP, -LEG_SPREAD), LEG_SCALE),
    Placement::new(Vec3::new(LEG_SPREAD, LEG_DROP, LEG_SPREAD), LEG_SCALE),
];

/// Uniform scale turning the 2-unit cube mesh into a 1-unit box.
pub const FLOATING_CUBE_SCALE: f32 = 0.5;

/// What one pass over the scene did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositionStats {
    pub pushes: usize,
    pub pops: usize,
    pub draws: usize,
}

/// Draws the floor, the table and the floating cube at `cube_position`.
///
/// Leaves the transform stack at the depth it had on entry.
pub fn compose_frame<D: RenderDevice>(
    context: &mut RenderContext,
    device: &mut D,
    camera: &Camera,
    aspect_ratio: f32,
    cube_position: Vec3,
) -> Result<CompositionStats, RenderError> {
    let RenderContext {
        bindings,
        meshes,
        stack,
        ..
    } = context;
    let mut composer = Composer {
        device,
        bindings,
        stack,
        draws: 0,
    };

    let entry_depth = composer.stack.depth();
    composer.stack.reset_counters();

    composer.stack.identity();
    composer.stack.look_at(camera.eye, camera.target, camera.up);
    composer.upload_model_view();
    composer
        .bindings
        .upload_projection(composer.device, &camera.projection_matrix(aspect_ratio));

    composer.draw(&meshes.floor);

    composer.stack.push();
    composer.stack.translate(TABLE_OFFSET);
    composer.upload_model_view();
    composer.draw_placed(&meshes.cube, &TABLE_TOP)?;
    for leg in &TABLE_LEGS {
        composer.draw_placed(&meshes.cube, leg)?;
    }
    composer.stack.pop()?;

    composer.draw_placed(
        &meshes.cube,
        &Placement::new(cube_position, Vec3::splat(FLOATING_CUBE_SCALE)),
    )?;

    debug_assert_eq!(composer.stack.depth(), entry_depth);
    let (pushes, pops) = composer.stack.counters();
    Ok(CompositionStats {
        pushes,
        pops,
        draws: composer.draws,
    })
}

struct Composer<'a, D> {
    device: &'a mut D,
    bindings: &'a ShaderBindings,
    stack: &'a mut TransformStack,
    draws: usize,
}

impl<D: RenderDevice> Composer<'_, D> {
    fn upload_model_view(&mut self) {
        let model_view = *self.stack.current();
        self.bindings
            .upload_model_view(self.device, &model_view, &normal_matrix(&model_view));
    }

    fn draw(&mut self, mesh: &RegisteredMesh) {
        mesh.draw(self.device);
        self.draws += 1;
    }

    /// Saves the transform, applies `placement`, draws, and restores.
    fn draw_placed(&mut self, mesh: &RegisteredMesh, placement: &Placement) -> Result<(), RenderError> {
        self.stack.push();
        self.stack.translate(placement.translation);
        self.stack.scale(placement.scale);
        self.upload_model_view();
        self.draw(mesh);
        self.stack.pop()?;
        Ok(())
    }
}
