pub mod model;
pub mod param;
pub mod settings;
pub mod state_dict;
pub mod voxel_net;

pub use model::Model;
pub use param::Param;
pub use settings::VoxelNetSettings;
pub use state_dict::StateDict;
pub use voxel_net::VoxelNet;
