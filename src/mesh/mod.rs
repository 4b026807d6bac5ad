pub mod topology;
pub mod geometry;
pub mod state;
pub mod quality;

pub use topology::{Cell, Connectivity};
pub use geometry::{Geometry, Mesh};
pub use state::PlasticityState;
pub use quality::{MeshQuality, assess_mesh_quality, build_node_neighbors, smooth_laplacian};
