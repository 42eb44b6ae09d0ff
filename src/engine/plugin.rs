use bevy::prelude::*;

use crate::{
    engine::{
        SceneDescriptor,
        SortJob,
        SortResponse,
        SortWorker,
    },
    error::Result,
    gaussian::settings::EngineSettings,
    sort::trigger::SortTrigger,
};


#[derive(Component, Clone, Debug, Default)]
#[require(SortTrigger)]
pub struct SplatView {
    pub view_projection: Mat4,
    pub position: Vec3,
    pub rotation: Quat,
    pub timestamp: Option<f32>,
}


#[derive(Event, Clone, Copy, Debug)]
pub struct SplatViewChanged {
    pub entity: Entity,
}


#[derive(Resource)]
pub struct SplatSorter {
    worker: SortWorker,
    generation: u64,
    in_flight: bool,
    spare: Vec<u32>,
}

impl SplatSorter {
    pub fn new(settings: EngineSettings) -> Result<Self> {
        Ok(Self {
            worker: SortWorker::spawn(settings)?,
            generation: 0,
            in_flight: false,
            spare: Vec::new(),
        })
    }

    pub fn load_scene(&mut self, scene: SceneDescriptor) -> Result<()> {
        self.worker.reconfigure(scene)?;
        self.generation += 1;
        Ok(())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight
    }
}


// latest finished draw order, stays valid until the next one lands
#[derive(Resource, Clone, Debug, Default)]
pub struct SortedSplats {
    pub indices: Vec<u32>,
    pub visible_count: usize,
    pub cull_time_ms: f32,
    pub sort_time_ms: f32,
    pub revision: u64,
}


#[derive(Default)]
pub struct SortWorkerPlugin;

impl Plugin for SortWorkerPlugin {
    fn build(&self, app: &mut App) {
        let settings = app
            .world()
            .get_resource::<EngineSettings>()
            .copied()
            .unwrap_or_default();

        match SplatSorter::new(settings) {
            Ok(sorter) => {
                app.insert_resource(sorter);
            }
            Err(err) => {
                error!("failed to spawn sort worker: {err}");
                return;
            }
        }

        app.init_resource::<SortedSplats>();
        app.add_event::<SplatViewChanged>();

        app.add_systems(Update, (receive_sorts, request_sorts).chain());
    }
}


fn request_sorts(
    mut sorter: ResMut<SplatSorter>,
    mut views: Query<(Entity, &SplatView, &mut SortTrigger)>,
    mut changed: EventWriter<SplatViewChanged>,
) {
    for (entity, view, mut trigger) in views.iter_mut() {
        let decision = trigger.evaluate(view.position, view.rotation, sorter.generation, sorter.in_flight);

        if decision.changed {
            changed.write(SplatViewChanged { entity });
        }

        if !decision.sort {
            continue;
        }

        let indices = std::mem::take(&mut sorter.spare);
        let job = SortJob {
            view_projection: view.view_projection,
            camera_position: view.position,
            timestamp: view.timestamp,
            indices,
        };

        match sorter.worker.sort(job) {
            Ok(()) => sorter.in_flight = true,
            Err(err) => error!("failed to request sort: {err}"),
        }
    }
}

fn receive_sorts(
    mut sorter: ResMut<SplatSorter>,
    mut sorted: ResMut<SortedSplats>,
) {
    loop {
        match sorter.worker.try_recv() {
            Ok(Some(SortResponse::Sorted(output))) => {
                sorter.spare = std::mem::replace(&mut sorted.indices, output.sorted);
                sorted.visible_count = output.visible_count;
                sorted.cull_time_ms = output.cull_time_ms;
                sorted.sort_time_ms = output.sort_time_ms;
                sorted.revision += 1;
                sorter.in_flight = false;
            }
            Ok(Some(SortResponse::Configured { capacity })) => {
                debug!(capacity, "sort worker configured");
            }
            Ok(None) => break,
            Err(err) => {
                error!("sort worker unavailable: {err}");
                break;
            }
        }
    }
}
