// Shader/device interface consumed by the renderer core

use glam::{Mat3, Mat4, Vec3};

use crate::error::{DeviceError, LinkError};

/// A linked shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Location of a vertex attribute inside a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeSlot(pub u32);

/// Location of a uniform inside a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformSlot(pub u32);

/// Geometry uploaded to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u32);

/// How an index list is assembled into triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Every triangle shares the first vertex.
    TriangleFan,
    TriangleList,
}

/// The capabilities the renderer core needs from a graphics backend.
///
/// Uniform setters act on the program most recently returned by
/// [`compile_and_link`](RenderDevice::compile_and_link). Draw calls capture the
/// uniform values current at the time of the call.
pub trait RenderDevice {
    fn compile_and_link(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramHandle, LinkError>;

    fn attribute_slot(&self, program: ProgramHandle, name: &str) -> Option<AttributeSlot>;

    fn uniform_slot(&self, program: ProgramHandle, name: &str) -> Option<UniformSlot>;

    /// Routes per-vertex positions and normals to the given attributes.
    fn enable_vertex_attributes(&mut self, position: AttributeSlot, normal: AttributeSlot);

    fn set_uniform_mat4(&mut self, slot: UniformSlot, value: &Mat4);

    fn set_uniform_mat3(&mut self, slot: UniformSlot, value: &Mat3);

    fn set_uniform_vec3(&mut self, slot: UniformSlot, value: Vec3);

    /// Uploads flat position and normal triplets plus an index list.
    fn upload_mesh(
        &mut self,
        positions: &[f32],
        normals: &[f32],
        indices: &[u16],
    ) -> Result<MeshHandle, DeviceError>;

    fn draw_indexed(&mut self, mesh: MeshHandle, topology: Topology, count: u32);

    fn viewport_resize(&mut self, width: u32, height: u32);

    /// Starts a new frame with cleared color and depth.
    fn clear_frame(&mut self);

    /// Submits everything drawn since [`clear_frame`](RenderDevice::clear_frame).
    fn finish_frame(&mut self) -> Result<(), DeviceError>;
}

#[cfg(test)]
pub mod recording {
    //! A `RenderDevice` that records calls instead of drawing.

    use super::*;

    pub const UNIFORM_NAMES: [&str; 7] = [
        "model_view",
        "projection",
        "normal_matrix",
        "light_position",
        "ambient_color",
        "diffuse_color",
        "specular_color",
    ];

    pub const ATTRIBUTE_NAMES: [&str; 2] = ["position", "normal"];

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Link,
        EnableAttributes(AttributeSlot, AttributeSlot),
        Mat4(UniformSlot, Mat4),
        Mat3(UniformSlot, Mat3),
        Vec3(UniformSlot, Vec3),
        Upload { vertices: usize, indices: usize },
        Draw(MeshHandle, Topology, u32),
        Viewport(u32, u32),
        Clear,
        Finish,
    }

    #[derive(Debug, Default)]
    pub struct RecordingDevice {
        pub calls: Vec<Call>,
        pub fail_link: bool,
        pub missing_uniform: Option<&'static str>,
        pub fail_finish: bool,
        next_mesh: u32,
        next_program: u32,
    }

    impl RecordingDevice {
        pub fn new() -> Self {
            Self::default()
        }

        /// A device whose shader link always fails.
        pub fn failing_link() -> Self {
            Self {
                fail_link: true,
                ..Self::default()
            }
        }

        /// A device whose linked program lacks the uniform `name`.
        pub fn missing_uniform(name: &'static str) -> Self {
            Self {
                missing_uniform: Some(name),
                ..Self::default()
            }
        }

        pub fn draws(&self) -> Vec<(MeshHandle, Topology, u32)> {
            self.calls
                .iter()
                .filter_map(|call| match call {
                    Call::Draw(mesh, topology, count) => Some((*mesh, *topology, *count)),
                    _ => None,
                })
                .collect()
        }

        pub fn uploads(&self) -> usize {
            self.calls
                .iter()
                .filter(|call| matches!(call, Call::Upload { .. }))
                .count()
        }

        pub fn slot_of(name: &str) -> UniformSlot {
            let index = UNIFORM_NAMES
                .iter()
                .position(|candidate| *candidate == name)
                .unwrap_or_else(|| panic!("unknown uniform {name}"));
            UniformSlot(index as u32)
        }
    }

    impl RenderDevice for RecordingDevice {
        fn compile_and_link(&mut self, _: &str, _: &str) -> Result<ProgramHandle, LinkError> {
            if self.fail_link {
                return Err(LinkError::Link("forced failure".into()));
            }
            self.calls.push(Call::Link);
            self.next_program += 1;
            Ok(ProgramHandle(self.next_program))
        }

        fn attribute_slot(&self, _: ProgramHandle, name: &str) -> Option<AttributeSlot> {
            ATTRIBUTE_NAMES
                .iter()
                .position(|candidate| *candidate == name)
                .map(|index| AttributeSlot(index as u32))
        }

        fn uniform_slot(&self, _: ProgramHandle, name: &str) -> Option<UniformSlot> {
            if self.missing_uniform == Some(name) {
                return None;
            }
            UNIFORM_NAMES
                .iter()
                .position(|candidate| *candidate == name)
                .map(|index| UniformSlot(index as u32))
        }

        fn enable_vertex_attributes(&mut self, position: AttributeSlot, normal: AttributeSlot) {
            self.calls.push(Call::EnableAttributes(position, normal));
        }

        fn set_uniform_mat4(&mut self, slot: UniformSlot, value: &Mat4) {
            self.calls.push(Call::Mat4(slot, *value));
        }

        fn set_uniform_mat3(&mut self, slot: UniformSlot, value: &Mat3) {
            self.calls.push(Call::Mat3(slot, *value));
        }

        fn set_uniform_vec3(&mut self, slot: UniformSlot, value: Vec3) {
            self.calls.push(Call::Vec3(slot, value));
        }

        fn upload_mesh(
            &mut self,
            positions: &[f32],
            normals: &[f32],
            indices: &[u16],
        ) -> Result<MeshHandle, DeviceError> {
            assert_eq!(positions.len(), normals.len());
            self.calls.push(Call::Upload {
                vertices: positions.len() / 3,
                indices: indices.len(),
            });
            self.next_mesh += 1;
            Ok(MeshHandle(self.next_mesh))
        }

        fn draw_indexed(&mut self, mesh: MeshHandle, topology: Topology, count: u32) {
            self.calls.push(Call::Draw(mesh, topology, count));
        }

        fn viewport_resize(&mut self, width: u32, height: u32) {
            self.calls.push(Call::Viewport(width, height));
        }

        fn clear_frame(&mut self) {
            self.calls.push(Call::Clear);
        }

        fn finish_frame(&mut self) -> Result<(), DeviceError> {
            self.calls.push(Call::Finish);
            if self.fail_finish {
                return Err(DeviceError::ContextLost);
            }
            Ok(())
        }
    }
}
