use bevy::{
    log::debug,
    math::{Mat4, Vec3},
};
use clap::ValueEnum;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    bvh::Bvh,
    chunk::{
        ChunkBounds,
        TemporalFalloff,
    },
    cull::{
        Frustum,
        cull,
    },
    error::{
        Result,
        SplatError,
    },
    gaussian::{
        record::SplatRecord,
        settings::{
            ChunkConfig,
            QualityTier,
        },
    },
    io::{
        layout::{
            BufferLayout,
            SplatBuffer,
        },
        source::{
            SourceLayout,
            SourceView,
        },
    },
    math::clamp_splat_count,
    sort::{
        DepthSorter,
        depth_row,
    },
};

pub mod spacetime;
pub mod three_d;

pub use spacetime::SpaceTime;
pub use three_d::ThreeD;


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    Deserialize,
    ValueEnum,
)]
pub enum SplatKind {
    #[default]
    ThreeD,
    SpaceTime,
}

impl SplatKind {
    pub fn identify(layout: &SourceLayout) -> Result<Self> {
        if layout.has("trbf_center") {
            Ok(Self::SpaceTime)
        } else if three_d::matches(layout) {
            Ok(Self::ThreeD)
        } else {
            Err(SplatError::UnknownSplatKind)
        }
    }

    /// name used by pre-encoded scene headers
    pub fn header_name(&self) -> &'static str {
        match self {
            Self::ThreeD => "ThreeD",
            Self::SpaceTime => "SPACETIME",
        }
    }

    pub fn from_header_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "threed" | "3d" => Ok(Self::ThreeD),
            "spacetime" => Ok(Self::SpaceTime),
            _ => Err(SplatError::InvalidHeader(format!("unknown splat kind `{name}`"))),
        }
    }
}


// the per-kind codec and the kind-specific halves of chunking, culling and sorting
pub trait SplatKernel {
    type Fields;

    const KIND: SplatKind;
    const CENTER_STRIDE: usize;
    const TEMPORAL: bool;

    fn resolve(layout: &SourceLayout) -> Result<Self::Fields>;

    fn has_sh(_fields: &Self::Fields) -> bool {
        false
    }

    fn decode(fields: &Self::Fields, index: usize, source: &SourceView) -> SplatRecord;

    fn layouts(tier: QualityTier, with_sh: bool) -> Vec<BufferLayout>;

    /// writes one splat into buffers allocated from `layouts`
    fn encode(record: &SplatRecord, index: usize, buffers: &mut [SplatBuffer]);

    fn write_center(record: &SplatRecord, center: &mut [f32]);

    fn center_from_buffers(index: usize, buffers: &[SplatBuffer], center: &mut [f32]);

    fn position_at(center: &[f32], timestamp: f32) -> Vec3;

    fn chunk_bounds(
        centers: &[f32],
        _falloff: &[TemporalFalloff],
        slots: &[u32],
        _config: &ChunkConfig,
    ) -> ChunkBounds {
        crate::chunk::static_chunk_bounds(centers, Self::CENTER_STRIDE, slots)
    }

    fn build_chunks(
        centers: &[f32],
        falloff: &[TemporalFalloff],
        mapping: &[u32],
        chunk_count: usize,
        config: &ChunkConfig,
    ) -> Vec<ChunkBounds> {
        crate::chunk::build_chunk_bounds(chunk_count, mapping, |slots| {
            Self::chunk_bounds(centers, falloff, slots, config)
        })
    }

    fn cull(
        bvh: &Bvh,
        frustum: &Frustum,
        timestamp: Option<f32>,
        mapping: &[u32],
        out: &mut Vec<u32>,
    ) -> usize {
        let timestamp = if Self::TEMPORAL { timestamp } else { None };
        cull(bvh, frustum, timestamp, mapping, out)
    }

    fn sort(
        sorter: &mut DepthSorter,
        centers: &[f32],
        visible: &[u32],
        view_projection: &Mat4,
        timestamp: f32,
        out: &mut Vec<u32>,
    ) {
        let row = depth_row(view_projection);
        sorter.sort(
            visible,
            |slot| {
                let center = &centers[slot as usize * Self::CENTER_STRIDE..(slot as usize + 1) * Self::CENTER_STRIDE];
                row.dot(Self::position_at(center, timestamp).extend(1.0))
            },
            out,
        );
    }
}


#[derive(Clone, Debug, PartialEq)]
pub struct EncodedScene {
    pub kind: SplatKind,
    pub tier: QualityTier,
    pub count: usize,
    pub buffers: Vec<SplatBuffer>,
    /// float positions (and motion) for chunking and sorting, `center_stride` floats per splat
    pub centers: Vec<f32>,
}

impl EncodedScene {
    pub fn buffer(&self, role: &str) -> Option<&SplatBuffer> {
        crate::io::layout::find_buffer(&self.buffers, role)
    }
}


fn allocate<K: SplatKernel>(tier: QualityTier, with_sh: bool, count: usize) -> (Vec<SplatBuffer>, Vec<f32>) {
    let buffers = K::layouts(tier, with_sh)
        .into_iter()
        .map(|layout| SplatBuffer::new(layout, count))
        .collect();

    (buffers, vec![0.0; count * K::CENTER_STRIDE])
}

fn encode_records<K: SplatKernel>(records: &[SplatRecord], tier: QualityTier) -> EncodedScene {
    let count = clamp_splat_count(records.len());
    let with_sh = records.iter().any(|record| record.sh.is_some());
    let (mut buffers, mut centers) = allocate::<K>(tier, with_sh, count);

    for (index, (record, center)) in records[..count]
        .iter()
        .zip(centers.chunks_exact_mut(K::CENTER_STRIDE))
        .enumerate()
    {
        K::encode(record, index, &mut buffers);
        K::write_center(record, center);
    }

    EncodedScene {
        kind: K::KIND,
        tier,
        count,
        buffers,
        centers,
    }
}

fn encode_source<K: SplatKernel>(layout: &SourceLayout, bytes: &[u8], tier: QualityTier) -> Result<EncodedScene> {
    let fields = K::resolve(layout)?;
    let source = layout.view(bytes)?;

    let count = clamp_splat_count(layout.count);
    let (mut buffers, mut centers) = allocate::<K>(tier, K::has_sh(&fields), count);

    for (index, center) in centers.chunks_exact_mut(K::CENTER_STRIDE).enumerate() {
        let record = K::decode(&fields, index, &source);
        K::encode(&record, index, &mut buffers);
        K::write_center(&record, center);
    }

    debug!(count, kind = ?K::KIND, ?tier, "encoded source splats");

    Ok(EncodedScene {
        kind: K::KIND,
        tier,
        count,
        buffers,
        centers,
    })
}

fn centers_from_buffers<K: SplatKernel>(count: usize, buffers: &[SplatBuffer]) -> Vec<f32> {
    let mut centers = vec![0.0; count * K::CENTER_STRIDE];

    #[cfg(feature = "sort_rayon")]
    {
        use rayon::prelude::*;

        centers
            .par_chunks_exact_mut(K::CENTER_STRIDE)
            .enumerate()
            .for_each(|(index, center)| K::center_from_buffers(index, buffers, center));
    }

    #[cfg(not(feature = "sort_rayon"))]
    for (index, center) in centers.chunks_exact_mut(K::CENTER_STRIDE).enumerate() {
        K::center_from_buffers(index, buffers, center);
    }

    centers
}


macro_rules! dispatch {
    ($kind:expr, $kernel:ident => $body:expr) => {
        match $kind {
            SplatKind::ThreeD => {
                type $kernel = ThreeD;
                $body
            }
            SplatKind::SpaceTime => {
                type $kernel = SpaceTime;
                $body
            }
        }
    };
}

impl SplatKind {
    pub fn center_stride(&self) -> usize {
        dispatch!(self, K => K::CENTER_STRIDE)
    }

    pub fn is_temporal(&self) -> bool {
        dispatch!(self, K => K::TEMPORAL)
    }

    pub fn layouts(&self, tier: QualityTier, with_sh: bool) -> Vec<BufferLayout> {
        dispatch!(self, K => K::layouts(tier, with_sh))
    }

    pub fn encode(&self, records: &[SplatRecord], tier: QualityTier) -> EncodedScene {
        dispatch!(self, K => encode_records::<K>(records, tier))
    }

    pub fn decode_source(&self, layout: &SourceLayout, bytes: &[u8], tier: QualityTier) -> Result<EncodedScene> {
        dispatch!(self, K => encode_source::<K>(layout, bytes, tier))
    }

    pub fn decode_splat(&self, layout: &SourceLayout, index: usize, bytes: &[u8]) -> Result<SplatRecord> {
        let source = layout.view(bytes)?;
        dispatch!(self, K => {
            let fields = K::resolve(layout)?;
            Ok(K::decode(&fields, index, &source))
        })
    }

    pub fn centers_from_buffers(&self, count: usize, buffers: &[SplatBuffer]) -> Vec<f32> {
        dispatch!(self, K => centers_from_buffers::<K>(count, buffers))
    }

    pub fn position_at(&self, center: &[f32], timestamp: f32) -> Vec3 {
        dispatch!(self, K => K::position_at(center, timestamp))
    }

    pub fn build_chunks(
        &self,
        centers: &[f32],
        falloff: &[TemporalFalloff],
        mapping: &[u32],
        chunk_count: usize,
        config: &ChunkConfig,
    ) -> Vec<ChunkBounds> {
        dispatch!(self, K => K::build_chunks(centers, falloff, mapping, chunk_count, config))
    }

    pub fn cull(
        &self,
        bvh: &Bvh,
        frustum: &Frustum,
        timestamp: Option<f32>,
        mapping: &[u32],
        out: &mut Vec<u32>,
    ) -> usize {
        dispatch!(self, K => K::cull(bvh, frustum, timestamp, mapping, out))
    }

    pub fn sort(
        &self,
        sorter: &mut DepthSorter,
        centers: &[f32],
        visible: &[u32],
        view_projection: &Mat4,
        timestamp: f32,
        out: &mut Vec<u32>,
    ) {
        dispatch!(self, K => K::sort(sorter, centers, visible, view_projection, timestamp, out))
    }
}

/// decodes a point cloud source into quantized buffers, identifying its splat kind from the header
pub fn encode_source_scene(layout: &SourceLayout, bytes: &[u8], tier: QualityTier) -> Result<EncodedScene> {
    SplatKind::identify(layout)?.decode_source(layout, bytes, tier)
}
