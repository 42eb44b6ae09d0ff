use std::io::Write;

use bevy::log::debug;
use bytemuck::Pod;
use serde::Deserialize;
use serde_json::json;

use crate::{
    chunk::{
        CHUNK_SIDE,
        CHUNK_SIZE,
        ChunkGrid,
    },
    engine::SceneDescriptor,
    error::{
        Result,
        SplatError,
    },
    gaussian::settings::QualityTier,
    io::chunked::{
        ChunkRange,
        ChunkedOther,
        ChunkedScene,
        RANGE_TEXEL_BYTES,
    },
    kernel::SplatKind,
};


const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;
const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

const RAW_MIME: &str = "image/vnd.custom-raw";

const U_XYZ: &str = "u_xyz";
const U_Q: &str = "u_q";
const U_COLOR: &str = "u_color";
const U_S: &str = "u_s";
const U_OTHER: &str = "u_other";
const U_RANGE: &str = "u_range";


#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GltfDocument {
    #[serde(default)]
    images: Vec<GltfImage>,
    #[serde(default)]
    buffer_views: Vec<GltfBufferView>,
    #[serde(default)]
    nodes: Vec<GltfNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GltfImage {
    buffer_view: Option<usize>,
    #[serde(default)]
    extras: Option<ImageExtras>,
}

#[derive(Deserialize)]
struct ImageExtras {
    name: String,
    #[serde(default)]
    format: String,
    width: usize,
    height: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GltfBufferView {
    #[serde(default)]
    byte_offset: usize,
    byte_length: usize,
}

#[derive(Deserialize)]
struct GltfNode {
    #[serde(default)]
    extras: Option<NodeExtras>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeExtras {
    gs_type: String,
    #[serde(default)]
    name: String,
    num: usize,
    #[serde(default)]
    quality: Option<String>,
}


/// one texture of the chunked layout, resolved against the binary chunk
struct Texture<'a> {
    width: usize,
    height: usize,
    bytes: &'a [u8],
}

impl Texture<'_> {
    fn texels<T: Pod>(&self, name: &str) -> Result<Vec<T>> {
        let stride = std::mem::size_of::<T>();
        let needed = self.width * self.height * stride;
        if self.bytes.len() < needed {
            return Err(SplatError::Truncated {
                needed,
                available: self.bytes.len(),
            });
        }

        debug!(texture = name, width = self.width, height = self.height, "reading chunked texture");
        Ok(self.bytes[..needed]
            .chunks_exact(stride)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }
}


// chunked scene stored as raw data textures inside a binary glTF container
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkedGlb {
    pub name: String,
    pub tier: QualityTier,
    pub scene: ChunkedScene,
}

impl ChunkedGlb {
    pub fn new(name: impl Into<String>, tier: QualityTier, scene: ChunkedScene) -> Self {
        Self {
            name: name.into(),
            tier,
            scene,
        }
    }

    pub fn descriptor(&self) -> SceneDescriptor {
        self.scene.descriptor(self.tier)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        write_glb(self, &mut bytes)?;
        Ok(bytes)
    }
}


fn texture<'a>(document: &GltfDocument, bin: &'a [u8], name: &str) -> Result<Texture<'a>> {
    let (image, extras) = document
        .images
        .iter()
        .find_map(|image| image.extras.as_ref().filter(|e| e.name == name).map(|e| (image, e)))
        .ok_or_else(|| SplatError::MissingField(name.to_string()))?;
    let view = image
        .buffer_view
        .and_then(|index| document.buffer_views.get(index))
        .ok_or_else(|| SplatError::MissingField(format!("{name} bufferView")))?;

    let end = view.byte_offset + view.byte_length;
    let bytes = bin.get(view.byte_offset..end).ok_or(SplatError::Truncated {
        needed: end,
        available: bin.len(),
    })?;

    debug!(texture = name, format = %extras.format, "resolved chunked texture");
    Ok(Texture {
        width: extras.width,
        height: extras.height,
        bytes,
    })
}

/// per-splat texture, which must share the position texture's dimensions
fn slot_texels<T: Pod>(document: &GltfDocument, bin: &[u8], name: &str, grid: &ChunkGrid) -> Result<Vec<T>> {
    let texture = texture(document, bin, name)?;
    if texture.width != grid.width * CHUNK_SIDE || texture.height != grid.height * CHUNK_SIDE {
        return Err(SplatError::InvalidHeader(format!(
            "{name} is {}x{}, expected {}x{}",
            texture.width,
            texture.height,
            grid.width * CHUNK_SIDE,
            grid.height * CHUNK_SIDE,
        )));
    }
    texture.texels(name)
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let word = bytes.get(offset..offset + 4).ok_or(SplatError::Truncated {
        needed: offset + 4,
        available: bytes.len(),
    })?;
    Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

fn read_chunk(bytes: &[u8], offset: usize, expected: u32) -> Result<(&[u8], usize)> {
    let length = read_u32(bytes, offset)? as usize;
    let kind = read_u32(bytes, offset + 4)?;
    if kind != expected {
        return Err(SplatError::InvalidHeader(format!("unexpected glb chunk type {kind:#010x}")));
    }

    let start = offset + CHUNK_HEADER_LEN;
    let data = bytes.get(start..start + length).ok_or(SplatError::Truncated {
        needed: start + length,
        available: bytes.len(),
    })?;
    Ok((data, start + length))
}

pub fn read_glb(bytes: &[u8]) -> Result<ChunkedGlb> {
    if read_u32(bytes, 0)? != GLB_MAGIC {
        return Err(SplatError::InvalidHeader("missing glTF magic".to_string()));
    }
    let version = read_u32(bytes, 4)?;
    if version != GLB_VERSION {
        return Err(SplatError::InvalidHeader(format!("unsupported glb version {version}")));
    }

    let (json, next) = read_chunk(bytes, HEADER_LEN, CHUNK_JSON)?;
    let (bin, _) = read_chunk(bytes, next, CHUNK_BIN)?;
    let document: GltfDocument = serde_json::from_slice(json)?;

    let extras = document
        .nodes
        .iter()
        .find_map(|node| node.extras.as_ref())
        .ok_or_else(|| SplatError::MissingField("gsType".to_string()))?;
    let kind = SplatKind::from_header_name(&extras.gs_type)?;
    let tier = match &extras.quality {
        Some(quality) => quality.parse()?,
        None => QualityTier::default(),
    };

    let xyz = texture(&document, bin, U_XYZ)?;
    if xyz.width % CHUNK_SIDE != 0 || xyz.height % CHUNK_SIDE != 0 || xyz.width * xyz.height == 0 {
        return Err(SplatError::InvalidHeader(format!(
            "{U_XYZ} is {}x{}, expected whole {CHUNK_SIDE}x{CHUNK_SIDE} chunks",
            xyz.width, xyz.height,
        )));
    }
    let grid = ChunkGrid::from_texture(xyz.width, xyz.height);

    let chunk_count = extras.num.div_ceil(CHUNK_SIZE);
    if chunk_count > grid.chunk_count() {
        return Err(SplatError::InvalidHeader(format!(
            "{} splats exceed the {}x{} chunk grid",
            extras.num, grid.width, grid.height,
        )));
    }

    let range = texture(&document, bin, U_RANGE)?;
    let texels_per_chunk = range.width / grid.width;
    if texels_per_chunk != ChunkRange::texel_count(kind) {
        return Err(SplatError::InvalidHeader(format!(
            "{U_RANGE} holds {texels_per_chunk} texels per chunk, expected {}",
            ChunkRange::texel_count(kind),
        )));
    }

    let mut scene = ChunkedScene::with_grid(kind, grid, chunk_count, extras.num);
    scene.xyz = xyz.texels(U_XYZ)?;
    scene.rotation = slot_texels(&document, bin, U_Q, &grid)?;
    scene.color = slot_texels(&document, bin, U_COLOR, &grid)?;
    match kind {
        SplatKind::ThreeD => scene.scale = slot_texels(&document, bin, U_S, &grid)?,
        SplatKind::SpaceTime => scene.other = slot_texels(&document, bin, U_OTHER, &grid)?,
    }

    let record_len = ChunkRange::byte_len(kind);
    let records: Vec<[u8; RANGE_TEXEL_BYTES]> = range.texels(U_RANGE)?;
    let records = bytemuck::cast_slice::<[u8; RANGE_TEXEL_BYTES], u8>(&records);
    scene.ranges = records
        .chunks_exact(record_len)
        .take(chunk_count)
        .map(|record| ChunkRange::from_bytes(kind, record))
        .collect();

    Ok(ChunkedGlb {
        name: extras.name.clone(),
        tier,
        scene,
    })
}


fn pad_to_four(bytes: &mut Vec<u8>, fill: u8) {
    while bytes.len() % 4 != 0 {
        bytes.push(fill);
    }
}

pub fn write_glb(glb: &ChunkedGlb, writer: &mut impl Write) -> Result<()> {
    let scene = &glb.scene;
    let grid = scene.grid;
    let (width, height) = (grid.width * CHUNK_SIDE, grid.height * CHUNK_SIDE);

    let mut ranges = Vec::with_capacity(grid.chunk_count() * ChunkRange::byte_len(scene.kind));
    for range in &scene.ranges {
        range.write_bytes(scene.kind, &mut ranges);
    }
    ranges.resize(grid.chunk_count() * ChunkRange::byte_len(scene.kind), 0);

    let fourth = match scene.kind {
        SplatKind::ThreeD => (U_S, "RGB8", bytemuck::cast_slice::<[u8; 3], u8>(&scene.scale).to_vec()),
        SplatKind::SpaceTime => (U_OTHER, "RGBA32UI", bytemuck::cast_slice::<ChunkedOther, u8>(&scene.other).to_vec()),
    };
    let textures = [
        (U_XYZ, "R32UI", width, bytemuck::cast_slice::<u32, u8>(&scene.xyz).to_vec()),
        (U_Q, "RGBA8", width, bytemuck::cast_slice::<[u8; 4], u8>(&scene.rotation).to_vec()),
        (U_COLOR, "RGBA8", width, bytemuck::cast_slice::<[u8; 4], u8>(&scene.color).to_vec()),
        (fourth.0, fourth.1, width, fourth.2),
        (U_RANGE, "RGBA32UI", grid.width * ChunkRange::texel_count(scene.kind), ranges),
    ];

    let mut bin = Vec::new();
    let mut images = Vec::new();
    let mut views = Vec::new();
    let mut data_textures = serde_json::Map::new();
    for (index, (name, format, texture_width, bytes)) in textures.iter().enumerate() {
        let texture_height = if *name == U_RANGE { grid.height } else { height };

        views.push(json!({ "buffer": 0, "byteOffset": bin.len(), "byteLength": bytes.len() }));
        images.push(json!({
            "bufferView": index,
            "mimeType": RAW_MIME,
            "extras": { "name": name, "format": format, "width": texture_width, "height": texture_height },
        }));
        data_textures.insert(name.to_string(), json!(index));

        bin.extend_from_slice(bytes);
        pad_to_four(&mut bin, 0);
    }

    // single placeholder point so generic viewers accept the file
    let placeholder = bin.len();
    bin.extend_from_slice(&[0; 12]);
    views.push(json!({ "buffer": 0, "byteOffset": placeholder, "byteLength": 12, "target": 34962 }));

    let texture_entries: Vec<serde_json::Value> = (0..textures.len())
        .map(|source| json!({ "sampler": 0, "source": source }))
        .collect();

    let document = json!({
        "asset": { "version": "2.0" },
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": views,
        "samplers": [{ "magFilter": 9728, "minFilter": 9728 }],
        "images": images,
        "textures": texture_entries,
        "materials": [{
            "pbrMetallicRoughness": { "baseColorFactor": [1.0, 1.0, 1.0, 1.0] },
            "extras": { "dataTextures": data_textures },
        }],
        "accessors": [{
            "bufferView": textures.len(),
            "componentType": 5126,
            "count": 1,
            "type": "VEC3",
            "min": [0.0, 0.0, 0.0],
            "max": [0.0, 0.0, 0.0],
        }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "material": 0, "mode": 0 }] }],
        "nodes": [{
            "mesh": 0,
            "matrix": [1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1],
            "extras": {
                "gsType": scene.kind.header_name(),
                "name": glb.name,
                "num": scene.chunk_count * CHUNK_SIZE,
                "quality": glb.tier,
            },
        }],
        "scenes": [{ "nodes": [0] }],
        "scene": 0,
    });

    let mut json = serde_json::to_vec(&document)?;
    pad_to_four(&mut json, b' ');

    let total = HEADER_LEN + 2 * CHUNK_HEADER_LEN + json.len() + bin.len();
    for word in [GLB_MAGIC, GLB_VERSION, total as u32, json.len() as u32, CHUNK_JSON] {
        writer.write_all(&word.to_le_bytes())?;
    }
    writer.write_all(&json)?;
    for word in [bin.len() as u32, CHUNK_BIN] {
        writer.write_all(&word.to_le_bytes())?;
    }
    writer.write_all(&bin)?;

    Ok(())
}
