// Static meshes for table-scene

use crate::device::{MeshHandle, RenderDevice, Topology};
use crate::error::RenderError;

/// Read-only geometry in device-ready layout.
///
/// Positions and normals are flat `xyz` triplets, one normal per vertex.
#[derive(Debug)]
pub struct Mesh {
    pub name: &'static str,
    pub positions: &'static [f32],
    pub normals: &'static [f32],
    pub indices: &'static [u16],
    pub topology: Topology,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// 10x10 quad at y = 0, facing +Y.
#[rustfmt::skip]
pub static FLOOR: Mesh = Mesh {
    name: "floor",
    positions: &[
         5.0, 0.0,  5.0,
         5.0, 0.0, -5.0,
        -5.0, 0.0, -5.0,
        -5.0, 0.0,  5.0,
    ],
    normals: &[
        0.0, 1.0, 0.0,
        0.0, 1.0, 0.0,
        0.0, 1.0, 0.0,
        0.0, 1.0, 0.0,
    ],
    indices: &[0, 1, 2, 3],
    topology: Topology::TriangleFan,
};

/// Cube with edge length 2 centred on the origin.
///
/// Each face has its own four vertices so its normal stays flat.
#[rustfmt::skip]
pub static CUBE: Mesh = Mesh {
    name: "cube",
    positions: &[
        // front
         1.0,  1.0,  1.0,  -1.0,  1.0,  1.0,  -1.0, -1.0,  1.0,   1.0, -1.0,  1.0,
        // back
         1.0,  1.0, -1.0,  -1.0,  1.0, -1.0,  -1.0, -1.0, -1.0,   1.0, -1.0, -1.0,
        // left
        -1.0,  1.0,  1.0,  -1.0,  1.0, -1.0,  -1.0, -1.0, -1.0,  -1.0, -1.0,  1.0,
        // right
         1.0,  1.0,  1.0,   1.0, -1.0,  1.0,   1.0, -1.0, -1.0,   1.0,  1.0, -1.0,
        // top
         1.0,  1.0,  1.0,   1.0,  1.0, -1.0,  -1.0,  1.0, -1.0,  -1.0,  1.0,  1.0,
        // bottom
         1.0, -1.0,  1.0,   1.0, -1.0, -1.0,  -1.0, -1.0, -1.0,  -1.0, -1.0,  1.0,
    ],
    normals: &[
         0.0,  0.0,  1.0,   0.0,  0.0,  1.0,   0.0,  0.0,  1.0,   0.0,  0.0,  1.0,
         0.0,  0.0, -1.0,   0.0,  0.0, -1.0,   0.0,  0.0, -1.0,   0.0,  0.0, -1.0,
        -1.0,  0.0,  0.0,  -1.0,  0.0,  0.0,  -1.0,  0.0,  0.0,  -1.0,  0.0,  0.0,
         1.0,  0.0,  0.0,   1.0,  0.0,  0.0,   1.0,  0.0,  0.0,   1.0,  0.0,  0.0,
         0.0,  1.0,  0.0,   0.0,  1.0,  0.0,   0.0,  1.0,  0.0,   0.0,  1.0,  0.0,
         0.0, -1.0,  0.0,   0.0, -1.0,  0.0,   0.0, -1.0,  0.0,   0.0, -1.0,  0.0,
    ],
    indices: &[
         0,  1,  2,   0,  2,  3, // front
         4,  6,  5,   4,  7,  6, // back
         8,  9, 10,   8, 10, 11, // left
        12, 13, 14,  12, 14, 15, // right
        16, 17, 18,  16, 18, 19, // top
        20, 22, 21,  20, 23, 22, // bottom
    ],
    topology: Topology::TriangleList,
};

/// Expands a triangle fan into an equivalent triangle list.
pub fn fan_to_list(indices: &[u16]) -> Vec<u16> {
    let Some((&hub, rest)) = indices.split_first() else {
        return Vec::new();
    };
    rest.windows(2)
        .flat_map(|edge| [hub, edge[0], edge[1]])
        .collect()
}

/// A mesh together with its device handle.
#[derive(Debug, Clone, Copy)]
pub struct RegisteredMesh {
    pub mesh: &'static Mesh,
    pub handle: MeshHandle,
}

impl RegisteredMesh {
    fn upload<D: RenderDevice>(device: &mut D, mesh: &'static Mesh) -> Result<Self, RenderError> {
        let handle = device.upload_mesh(mesh.positions, mesh.normals, mesh.indices)?;
        log::debug!(
            "uploaded {} mesh: {} vertices, {} indices",
            mesh.name,
            mesh.vertex_count(),
            mesh.index_count()
        );
        Ok(Self { mesh, handle })
    }

    pub fn draw<D: RenderDevice>(&self, device: &mut D) {
        device.draw_indexed(self.handle, self.mesh.topology, self.mesh.index_count());
    }
}

/// The two meshes the scene is built from.
#[derive(Debug, Clone, Copy)]
pub struct MeshRegistry {
    pub floor: RegisteredMesh,
    pub cube: RegisteredMesh,
}

impl MeshRegistry {
    /// Uploads both meshes. Called again after every context restore.
    pub fn upload<D: RenderDevice>(device: &mut D) -> Result<Self, RenderError> {
        Ok(Self {
            floor: RegisteredMesh::upload(device, &FLOOR)?,
            cube: RegisteredMesh::upload(device, &CUBE)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::{Call, RecordingDevice};
    use glam::Vec3;

    fn vertex(mesh: &Mesh, index: u16) -> Vec3 {
        let i = index as usize * 3;
        Vec3::from_slice(&mesh.positions[i..i + 3])
    }

    fn normal(mesh: &Mesh, index: u16) -> Vec3 {
        let i = index as usize * 3;
        Vec3::from_slice(&mesh.normals[i..i + 3])
    }

    #[test]
    fn mesh_sizes() {
        assert_eq!(FLOOR.vertex_count(), 4);
        assert_eq!(FLOOR.index_count(), 4);
        assert_eq!(CUBE.vertex_count(), 24);
        assert_eq!(CUBE.index_count(), 36);
        for mesh in [&FLOOR, &CUBE] {
            assert_eq!(mesh.positions.len(), mesh.normals.len());
            assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertex_count()));
        }
    }

    #[test]
    fn cube_faces_are_flat_and_outward() {
        for face in CUBE.indices.chunks(6) {
            let n = normal(&CUBE, face[0]);
            assert!(face.iter().all(|&i| normal(&CUBE, i) == n));
            // Every vertex of the face lies on the plane n . p = 1.
            assert!(face.iter().all(|&i| (vertex(&CUBE, i).dot(n) - 1.0).abs() < 1e-6));
        }
    }

    #[test]
    fn floor_normals_point_up() {
        assert!((0..4).all(|i| normal(&FLOOR, i) == Vec3::Y));
        assert!((0..4).all(|i| vertex(&FLOOR, i).y == 0.0));
    }

    #[test]
    fn fan_expansion() {
        assert_eq!(fan_to_list(&[0, 1, 2, 3]), vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(fan_to_list(&[7, 8, 9]), vec![7, 8, 9]);
        assert!(fan_to_list(&[0, 1]).is_empty());
        assert!(fan_to_list(&[]).is_empty());
    }

    #[test]
    fn registry_uploads_and_draws_with_mesh_topology() {
        let mut device = RecordingDevice::new();
        let registry = MeshRegistry::upload(&mut device).expect("upload");

        assert_eq!(
            device.calls,
            vec![
                Call::Upload { vertices: 4, indices: 4 },
                Call::Upload { vertices: 24, indices: 36 },
            ]
        );

        registry.floor.draw(&mut device);
        registry.cube.draw(&mut device);
        assert_eq!(
            device.draws(),
            vec![
                (registry.floor.handle, Topology::TriangleFan, 4),
                (registry.cube.handle, Topology::TriangleList, 36),
            ]
        );
    }
}
