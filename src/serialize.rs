//! Binary Save/Load stream (§6 External interfaces, §7 "Version skew on
//! load", §8 "Save/load idempotence").
//!
//! A mesh is written as its raw build inputs (welded vertices,
//! reindexed triangles, material/foreign ids) plus the handful of
//! fields `TriangleMesh::build` doesn't derive on its own
//! (`last_new_tri_idx`, and an optional caller-pinned `vtx_map`).
//! Topology, islands, convexity cache, and the bounding-volume tree are
//! never stored on the wire; they're pure functions of the geometry
//! already, so `load` gets them back for free by calling `build` again
//! the same way any other caller would, rather than duplicating that
//! pipeline as a deserializer. This is what makes idempotence trivial:
//! two saves of a stream that hasn't been mutated in between are
//! byte-identical because the rebuild is deterministic.

use crate::mesh::TriangleMesh;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use cgmath::Point3;
use std::io::{self, Read, Write};

/// Boundary trait so callers can plug in whatever file/network
/// byte-stream type they already have (a `File`, a `TcpStream`, a
/// `Cursor<Vec<u8>>`) without this module naming a concrete type.
pub trait ByteStream: Read + Write {}
impl<T: Read + Write> ByteStream for T {}

/// Negative version numbers flag the current stream format.
pub const CURRENT_VERSION: i32 = -1;

/// The only recognized older format: material ids were a single byte
/// and there was no per-triangle foreign id at all.
const LEGACY_V1_VERSION: i32 = 1;

/// Vocabulary flags on the mesh stream (§6). Most of these describe
/// sharing/ownership choices the original engine made about its buffers
/// and have no bearing on a self-contained stream; only `KEEP_VTXMAP` is
/// interpreted here. The rest are kept as named constants so a future
/// reader can recognize a bit set on a stream written by another tool.
pub mod flags {
    pub const SHARED_VTX: u32 = 1 << 0;
    pub const SHARED_IDX: u32 = 1 << 1;
    pub const SHARED_MATS: u32 = 1 << 2;
    pub const SHARED_FOREIGN_IDX: u32 = 1 << 3;
    /// When set, `vtx_map` is written/read verbatim instead of being
    /// left for `TriangleMesh::build` to recompute from the geometry.
    pub const KEEP_VTXMAP: u32 = 1 << 4;
    pub const FULL_SERIALIZATION: u32 = 1 << 5;
    pub const AABB: u32 = 1 << 6;
    pub const OBB: u32 = 1 << 7;
    pub const AABB_ROTATED: u32 = 1 << 8;
    pub const AABB_PLANE_OPTIMISE: u32 = 1 << 9;
    pub const SINGLE_BB: u32 = 1 << 10;
    pub const VOXEL_GRID: u32 = 1 << 11;
    pub const NO_FILTER: u32 = 1 << 12;
    pub const NO_VTX_MERGE: u32 = 1 << 13;
    pub const ALWAYS_STATIC: u32 = 1 << 14;
    pub const MULTICONTACT0: u32 = 1 << 15;
    pub const MULTICONTACT2: u32 = 1 << 16;
    pub const NO_BOOLEANS: u32 = 1 << 17;
    pub const SHOULD_DIE: u32 = 1 << 18;
}

fn tree_type_tag(tree: &crate::bvtree::BvTreeKind) -> u8 {
    use crate::bvtree::BvTreeKind;
    match tree {
        BvTreeKind::Aabb(_) => 0,
        BvTreeKind::Obb(_) => 1,
        BvTreeKind::Single(_) => 2,
    }
}

/// Writes `mesh` to `w` in the current stream format.
pub fn save<W: Write>(mesh: &TriangleMesh, w: &mut W) -> io::Result<()> {
    mesh.with_contents(|c| {
        w.write_i32::<LittleEndian>(CURRENT_VERSION)?;
        w.write_u32::<LittleEndian>(c.vertices.len() as u32)?;
        let tri_count = (c.indices.len() / 3) as u32;
        w.write_u32::<LittleEndian>(tri_count)?;

        let identity_vtx_map = c.vtx_map.iter().enumerate().all(|(i, &m)| m as usize == i);
        let mut flag_bits = 0u32;
        if !identity_vtx_map {
            flag_bits |= flags::KEEP_VTXMAP;
        }
        w.write_u32::<LittleEndian>(flag_bits)?;
        w.write_u32::<LittleEndian>(c.last_new_tri_idx)?;
        w.write_u8(tree_type_tag(&c.bvtree))?;

        for v in &c.vertices {
            w.write_f64::<LittleEndian>(v.x)?;
            w.write_f64::<LittleEndian>(v.y)?;
            w.write_f64::<LittleEndian>(v.z)?;
        }
        for &i in &c.indices {
            w.write_u32::<LittleEndian>(i)?;
        }
        for &m in &c.material_ids {
            w.write_u16::<LittleEndian>(m)?;
        }
        for &f in &c.foreign_ids {
            w.write_u32::<LittleEndian>(f)?;
        }
        if !identity_vtx_map {
            for &m in &c.vtx_map {
                w.write_u32::<LittleEndian>(m)?;
            }
        }
        Ok(())
    })
}

/// Reads a mesh stream, upgrading older recognized versions and
/// resetting to an empty single-box mesh on an unrecognized one (§7
/// "Version skew on load").
pub fn load<R: Read>(r: &mut R) -> io::Result<TriangleMesh> {
    let version = r.read_i32::<LittleEndian>()?;
    if version == CURRENT_VERSION {
        load_current(r)
    } else if version == LEGACY_V1_VERSION {
        load_legacy_v1(r)
    } else {
        log::warn!("mesh load: unrecognized stream version {version}, resetting to empty mesh");
        Ok(TriangleMesh::build(Vec::new(), Vec::new(), Vec::new(), Vec::new()))
    }
}

fn read_vertices<R: Read>(r: &mut R, n: usize) -> io::Result<Vec<Point3<f64>>> {
    (0..n)
        .map(|_| {
            let x = r.read_f64::<LittleEndian>()?;
            let y = r.read_f64::<LittleEndian>()?;
            let z = r.read_f64::<LittleEndian>()?;
            Ok(Point3::new(x, y, z))
        })
        .collect()
}

fn read_indices<R: Read>(r: &mut R, n_tris: usize) -> io::Result<Vec<u32>> {
    (0..n_tris * 3).map(|_| r.read_u32::<LittleEndian>()).collect()
}

fn load_current<R: Read>(r: &mut R) -> io::Result<TriangleMesh> {
    let n_vertices = r.read_u32::<LittleEndian>()? as usize;
    let n_tris = r.read_u32::<LittleEndian>()? as usize;
    let flag_bits = r.read_u32::<LittleEndian>()?;
    let last_new_tri_idx = r.read_u32::<LittleEndian>()?;
    let _tree_type = r.read_u8()?;

    let vertices = read_vertices(r, n_vertices)?;
    let indices = read_indices(r, n_tris)?;
    let material_ids: Vec<u16> = (0..n_tris).map(|_| r.read_u16::<LittleEndian>()).collect::<Result<_, _>>()?;
    let foreign_ids: Vec<u32> = (0..n_tris).map(|_| r.read_u32::<LittleEndian>()).collect::<Result<_, _>>()?;
    let saved_vtx_map = if flag_bits & flags::KEEP_VTXMAP != 0 {
        Some((0..n_vertices).map(|_| r.read_u32::<LittleEndian>()).collect::<Result<Vec<_>, _>>()?)
    } else {
        None
    };

    let mesh = TriangleMesh::build(vertices, indices, material_ids, foreign_ids);
    mesh.with_contents_mut(|c| {
        c.last_new_tri_idx = last_new_tri_idx;
        if let Some(vtx_map) = saved_vtx_map {
            c.vtx_map = vtx_map;
        }
    });
    Ok(mesh)
}

/// Expands the legacy layout (`u8` material ids, no foreign ids at all)
/// into a current-format mesh (§7 "explicit format-upgrade pass").
fn load_legacy_v1<R: Read>(r: &mut R) -> io::Result<TriangleMesh> {
    log::info!("mesh load: upgrading legacy v1 stream (byte material ids, no foreign ids)");
    let n_vertices = r.read_u32::<LittleEndian>()? as usize;
    let n_tris = r.read_u32::<LittleEndian>()? as usize;
    let vertices = read_vertices(r, n_vertices)?;
    let indices = read_indices(r, n_tris)?;
    let material_ids: Vec<u16> = (0..n_tris).map(|_| r.read_u8().map(|b| b as u16)).collect::<Result<_, _>>()?;
    let foreign_ids = vec![0u32; n_tris];
    Ok(TriangleMesh::build(vertices, indices, material_ids, foreign_ids))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn unit_cube() -> TriangleMesh {
        let v = vec![
            Point3::new(0., 0., 0.),
            Point3::new(1., 0., 0.),
            Point3::new(1., 1., 0.),
            Point3::new(0., 1., 0.),
            Point3::new(0., 0., 1.),
            Point3::new(1., 0., 1.),
            Point3::new(1., 1., 1.),
            Point3::new(0., 1., 1.),
        ];
        let i = vec![
            0, 1, 2, 0, 2, 3, // bottom
            4, 6, 5, 4, 7, 6, // top
            0, 4, 5, 0, 5, 1, // front
            1, 5, 6, 1, 6, 2, // right
            2, 6, 7, 2, 7, 3, // back
            3, 7, 4, 3, 4, 0, // left
        ];
        let n = i.len() / 3;
        TriangleMesh::build(v, i, vec![0; n], (0..n as u32).collect())
    }

    #[test]
    fn save_load_save_round_trips_to_identical_bytes() {
        let mesh = unit_cube();
        let mut first = Vec::new();
        save(&mesh, &mut first).unwrap();

        let reloaded = load(&mut Cursor::new(first.clone())).unwrap();
        let mut second = Vec::new();
        save(&reloaded, &mut second).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn load_preserves_geometry() {
        let mesh = unit_cube();
        let mut bytes = Vec::new();
        save(&mesh, &mut bytes).unwrap();
        let reloaded = load(&mut Cursor::new(bytes)).unwrap();

        mesh.with_contents(|orig| {
            reloaded.with_contents(|got| {
                assert_eq!(orig.vertices.len(), got.vertices.len());
                assert_eq!(orig.indices, got.indices);
                assert_eq!(orig.foreign_ids, got.foreign_ids);
            });
        });
    }

    #[test]
    fn legacy_v1_stream_upgrades_without_foreign_ids() {
        let mut bytes = Vec::new();
        bytes.write_i32::<LittleEndian>(LEGACY_V1_VERSION).unwrap();
        bytes.write_u32::<LittleEndian>(3).unwrap();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        for v in [(0., 0., 0.), (1., 0., 0.), (0., 1., 0.)] {
            bytes.write_f64::<LittleEndian>(v.0).unwrap();
            bytes.write_f64::<LittleEndian>(v.1).unwrap();
            bytes.write_f64::<LittleEndian>(v.2).unwrap();
        }
        for idx in [0u32, 1, 2] {
            bytes.write_u32::<LittleEndian>(idx).unwrap();
        }
        bytes.write_u8(7).unwrap();

        let mesh = load(&mut Cursor::new(bytes)).unwrap();
        mesh.with_contents(|c| {
            assert_eq!(c.material_ids, vec![7]);
            assert_eq!(c.foreign_ids, vec![0]);
        });
    }

    #[test]
    fn unrecognized_version_resets_to_empty_mesh() {
        let mut bytes = Vec::new();
        bytes.write_i32::<LittleEndian>(999).unwrap();
        let mesh = load(&mut Cursor::new(bytes)).unwrap();
        mesh.with_contents(|c| assert!(c.vertices.is_empty() && c.indices.is_empty()));
    }
}
