//! Collision-geometry core of a rigid-body physics engine: bounding
//! volume hierarchies, triangle-mesh topology/islands/convexity, a
//! planar hash grid, boolean subtract, planar slicing, buoyancy
//! floodfill, polygon triangulation, and voxelization/boxify.
//!
//! There is no rendering, scene graph, or broad-phase object management
//! here — callers own their own object layer and call into this crate
//! per mesh.

pub mod boolean;
pub mod bvtree;
pub mod filter;
pub mod floodfill;
pub mod intersect;
pub mod jitter;
pub mod mesh;
pub mod primitives;
pub mod scratch;
pub mod serialize;
pub mod slice;
pub mod triangulate;
pub mod voxel;

pub use mesh::TriangleMesh;
pub use primitives::{Aabb, BoundingVolume, Obb, Plane, Ray, Sphere, Triangle};
