use std::{
    sync::{
        Mutex,
        mpsc::{
            Receiver,
            Sender,
            TryRecvError,
            channel,
        },
    },
    thread::JoinHandle,
    time::Instant,
};

use bevy::{
    log::{debug, info},
    math::{Mat4, Vec3},
};

use crate::{
    bvh::Bvh,
    chunk::{
        ChunkGrid,
        TemporalFalloff,
    },
    cull::Frustum,
    error::{
        Result,
        SplatError,
    },
    gaussian::settings::{
        EngineSettings,
        QualityTier,
    },
    kernel::{
        EncodedScene,
        SplatKind,
    },
    sort::DepthSorter,
};

#[cfg(feature = "plugin")]
pub mod plugin;


#[derive(Clone, Debug, PartialEq)]
pub struct ChunkedLayout {
    pub grid: ChunkGrid,
    pub chunk_count: usize,
    /// per-slot temporal falloff, empty for static scenes
    pub falloff: Vec<TemporalFalloff>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneDescriptor {
    pub kind: SplatKind,
    pub tier: QualityTier,
    pub count: usize,
    /// per-slot centers, `kind.center_stride()` floats each
    pub centers: Vec<f32>,
    pub chunks: Option<ChunkedLayout>,
}

impl SceneDescriptor {
    pub fn capacity(&self) -> usize {
        match &self.chunks {
            Some(chunks) => chunks.grid.capacity(),
            None => self.count,
        }
    }
}

impl From<&EncodedScene> for SceneDescriptor {
    fn from(scene: &EncodedScene) -> Self {
        Self {
            kind: scene.kind,
            tier: scene.tier,
            count: scene.count,
            centers: scene.centers.clone(),
            chunks: None,
        }
    }
}


#[derive(Clone, Debug, PartialEq)]
pub struct SortJob {
    pub view_projection: Mat4,
    pub camera_position: Vec3,
    pub timestamp: Option<f32>,
    /// recycled output buffer, handed back inside the response
    pub indices: Vec<u32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SortOutput {
    pub sorted: Vec<u32>,
    pub visible_count: usize,
    pub cull_time_ms: f32,
    pub sort_time_ms: f32,
}


struct SceneState {
    kind: SplatKind,
    centers: Vec<f32>,
    bvh: Option<Bvh>,
    mapping: Vec<u32>,
}


// synchronous core of the sort worker, owns every scene-derived structure
pub struct SortEngine {
    settings: EngineSettings,
    scene: Option<SceneState>,
    sorter: DepthSorter,
    visible: Vec<u32>,
    capacity: usize,
}

impl SortEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            scene: None,
            sorter: DepthSorter::new(&settings.sort),
            visible: Vec::new(),
            capacity: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn bvh(&self) -> Option<&Bvh> {
        self.scene.as_ref().and_then(|scene| scene.bvh.as_ref())
    }

    pub fn reconfigure(&mut self, scene: SceneDescriptor) {
        let capacity = scene.capacity();
        assert!(
            scene.centers.len() >= capacity * scene.kind.center_stride(),
            "center array shorter than scene capacity",
        );

        if capacity > self.capacity {
            self.capacity = capacity;
            self.visible.reserve(capacity.saturating_sub(self.visible.len()));
            self.sorter.reserve(capacity);
        }

        let (bvh, mapping) = match &scene.chunks {
            Some(chunks) => {
                assert!(chunks.chunk_count <= chunks.grid.chunk_count(), "chunk count exceeds grid");

                let mapping = chunks.grid.slot_mapping(chunks.chunk_count);
                let bounds = scene.kind.build_chunks(
                    &scene.centers,
                    &chunks.falloff,
                    &mapping,
                    chunks.chunk_count,
                    &self.settings.chunk,
                );
                (Some(Bvh::build(&bounds)), mapping)
            }
            None => (None, Vec::new()),
        };

        if bvh.is_none() {
            self.visible.clear();
            self.visible.extend(0..scene.count as u32);
        }

        info!(
            count = scene.count,
            capacity,
            kind = ?scene.kind,
            tier = ?scene.tier,
            chunks = bvh.as_ref().map_or(0, Bvh::leaf_count),
            "sort engine reconfigured"
        );

        self.scene = Some(SceneState {
            kind: scene.kind,
            centers: scene.centers,
            bvh,
            mapping,
        });
    }

    pub fn sort(&mut self, job: SortJob) -> SortOutput {
        let mut sorted = job.indices;

        let Some(scene) = self.scene.as_ref() else {
            sorted.clear();
            return SortOutput {
                sorted,
                ..Default::default()
            };
        };

        let cull_start = Instant::now();
        if let Some(bvh) = &scene.bvh {
            let frustum = Frustum::from_view_projection(&job.view_projection);
            scene.kind.cull(bvh, &frustum, job.timestamp, &scene.mapping, &mut self.visible);
        }
        let cull_time_ms = cull_start.elapsed().as_secs_f32() * 1000.0;

        let sort_start = Instant::now();
        scene.kind.sort(
            &mut self.sorter,
            &scene.centers,
            &self.visible,
            &job.view_projection,
            job.timestamp.unwrap_or(0.0),
            &mut sorted,
        );
        let sort_time_ms = sort_start.elapsed().as_secs_f32() * 1000.0;

        let visible_count = sorted.len();
        debug!(visible_count, cull_time_ms, sort_time_ms, "sorted splats");

        SortOutput {
            sorted,
            visible_count,
            cull_time_ms,
            sort_time_ms,
        }
    }
}


#[derive(Debug)]
pub enum SortRequest {
    Reconfigure(Box<SceneDescriptor>),
    Sort(SortJob),
    Shutdown,
}

#[derive(Debug)]
pub enum SortResponse {
    Configured {
        capacity: usize,
    },
    Sorted(SortOutput),
}


// runs a SortEngine on its own thread, requests are handled strictly in arrival order
pub struct SortWorker {
    sender: Sender<SortRequest>,
    receiver: Mutex<Receiver<SortResponse>>,
    handle: Option<JoinHandle<()>>,
}

impl SortWorker {
    pub fn spawn(settings: EngineSettings) -> Result<Self> {
        let (request_sender, request_receiver) = channel::<SortRequest>();
        let (response_sender, response_receiver) = channel::<SortResponse>();

        let handle = std::thread::Builder::new()
            .name("splat-sort".to_string())
            .spawn(move || {
                let mut engine = SortEngine::new(settings);

                while let Ok(request) = request_receiver.recv() {
                    let response = match request {
                        SortRequest::Reconfigure(scene) => {
                            engine.reconfigure(*scene);
                            SortResponse::Configured {
                                capacity: engine.capacity(),
                            }
                        }
                        SortRequest::Sort(job) => SortResponse::Sorted(engine.sort(job)),
                        SortRequest::Shutdown => break,
                    };

                    if response_sender.send(response).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            sender: request_sender,
            receiver: Mutex::new(response_receiver),
            handle: Some(handle),
        })
    }

    pub fn send(&self, request: SortRequest) -> Result<()> {
        self.sender
            .send(request)
            .map_err(|_| SplatError::EngineDisconnected)
    }

    pub fn reconfigure(&self, scene: SceneDescriptor) -> Result<()> {
        self.send(SortRequest::Reconfigure(Box::new(scene)))
    }

    pub fn sort(&self, job: SortJob) -> Result<()> {
        self.send(SortRequest::Sort(job))
    }

    pub fn try_recv(&self) -> Result<Option<SortResponse>> {
        let receiver = self.receiver.lock().map_err(|_| SplatError::EngineDisconnected)?;
        match receiver.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(SplatError::EngineDisconnected),
        }
    }

    pub fn recv(&self) -> Result<SortResponse> {
        let receiver = self.receiver.lock().map_err(|_| SplatError::EngineDisconnected)?;
        receiver.recv().map_err(|_| SplatError::EngineDisconnected)
    }
}

impl Drop for SortWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(SortRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
