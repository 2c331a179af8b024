// Shader program bindings for table-scene

use glam::{Mat3, Mat4, Vec3};

use crate::device::{ProgramHandle, RenderDevice, UniformSlot};
use crate::error::RenderError;

pub const VERTEX_SOURCE: &str = include_str!("shader.vert.wgsl");
pub const FRAGMENT_SOURCE: &str = include_str!("shader.frag.wgsl");

/// The single point light. Colors are pre-multiplied with a white material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Eye-space position.
    pub position: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 20.0, 0.0),
            ambient: Vec3::splat(0.2),
            diffuse: Vec3::splat(0.7),
            specular: Vec3::splat(0.8),
        }
    }
}

/// A linked program and every slot the renderer writes to.
#[derive(Debug, Clone, Copy)]
pub struct ShaderBindings {
    pub program: ProgramHandle,
    pub model_view: UniformSlot,
    pub projection: UniformSlot,
    pub normal_matrix: UniformSlot,
    pub light_position: UniformSlot,
    pub ambient_color: UniformSlot,
    pub diffuse_color: UniformSlot,
    pub specular_color: UniformSlot,
}

impl ShaderBindings {
    /// Compiles and links the scene shaders, then resolves every slot.
    pub fn link<D: RenderDevice>(device: &mut D) -> Result<Self, RenderError> {
        let program = device.compile_and_link(VERTEX_SOURCE, FRAGMENT_SOURCE)?;

        let attribute = |name: &'static str| {
            device
                .attribute_slot(program, name)
                .ok_or(RenderError::MissingAttribute(name))
        };
        let position = attribute("position")?;
        let normal = attribute("normal")?;

        let uniform = |name: &'static str| {
            device
                .uniform_slot(program, name)
                .ok_or(RenderError::MissingUniform(name))
        };
        let bindings = Self {
            program,
            model_view: uniform("model_view")?,
            projection: uniform("projection")?,
            normal_matrix: uniform("normal_matrix")?,
            light_position: uniform("light_position")?,
            ambient_color: uniform("ambient_color")?,
            diffuse_color: uniform("diffuse_color")?,
            specular_color: uniform("specular_color")?,
        };
        log::debug!("shader slots resolved: {bindings:?}");

        device.enable_vertex_attributes(position, normal);
        Ok(bindings)
    }

    pub fn upload_light<D: RenderDevice>(&self, device: &mut D, light: &Light) {
        device.set_uniform_vec3(self.light_position, light.position);
        device.set_uniform_vec3(self.ambient_color, light.ambient);
        device.set_uniform_vec3(self.diffuse_color, light.diffuse);
        device.set_uniform_vec3(self.specular_color, light.specular);
    }

    pub fn upload_projection<D: RenderDevice>(&self, device: &mut D, projection: &Mat4) {
        device.set_uniform_mat4(self.projection, projection);
    }

    /// Uploads a model-view matrix together with its derived normal matrix.
    pub fn upload_model_view<D: RenderDevice>(&self, device: &mut D, model_view: &Mat4, normal: &Mat3) {
        device.set_uniform_mat4(self.model_view, model_view);
        device.set_uniform_mat3(self.normal_matrix, normal);
    }
}
