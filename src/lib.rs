#[cfg(feature = "plugin")]
use bevy::prelude::*;

pub use error::{
    Result,
    SplatError,
};
pub use gaussian::{
    rand::{
        random_spacetime_splats,
        random_splats,
    },
    record::{
        Motion,
        SphericalHarmonics,
        SplatRecord,
    },
    settings::{
        ChunkConfig,
        EngineSettings,
        QualityTier,
        SortConfig,
        TriggerConfig,
    },
};
pub use engine::{
    SceneDescriptor,
    SortEngine,
    SortJob,
    SortOutput,
    SortWorker,
};
pub use kernel::{
    EncodedScene,
    SplatKernel,
    SplatKind,
};

#[cfg(feature = "plugin")]
use engine::plugin::SortWorkerPlugin;

pub mod bvh;
pub mod chunk;
pub mod cull;
pub mod engine;
pub mod error;
pub mod gaussian;
pub mod io;
pub mod kernel;
pub mod math;
pub mod sort;


#[cfg(feature = "plugin")]
#[derive(Default)]
pub struct SplatEnginePlugin {
    pub settings: EngineSettings,
}

#[cfg(feature = "plugin")]
impl Plugin for SplatEnginePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.settings);

        app.add_plugins((
            SortWorkerPlugin,
        ));
    }
}
