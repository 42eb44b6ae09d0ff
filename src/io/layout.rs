use bytemuck::Pod;
use serde::Serialize;

use crate::math::texture_size;


#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    Serialize,
)]
pub enum TexelFormat {
    Rgba16Float,
    Rgba32Float,
    Rgb32Uint,
    Rgba32Uint,
}


#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    Serialize,
)]
pub struct BufferLayout {
    /// binding role, e.g. `pospad` or `covcol`
    pub role: &'static str,
    /// packing name, e.g. `Pos6Pad2`
    pub name: &'static str,
    pub bytes_per_texel: usize,
    pub texel_per_splat: usize,
    pub format: TexelFormat,
}

impl BufferLayout {
    pub const fn bytes_per_splat(&self) -> usize {
        self.bytes_per_texel * self.texel_per_splat
    }

    pub fn capacity_bytes(&self, count: usize) -> usize {
        let (width, height) = texture_size(count * self.texel_per_splat);
        width * height * self.bytes_per_texel
    }
}


#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SplatBuffer {
    pub layout: BufferLayout,
    pub width: usize,
    pub height: usize,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl SplatBuffer {
    pub fn new(layout: BufferLayout, count: usize) -> Self {
        let (width, height) = texture_size(count * layout.texel_per_splat);

        Self {
            layout,
            width,
            height,
            bytes: vec![0; width * height * layout.bytes_per_texel],
        }
    }

    /// adopts pre-encoded bytes, zero-extending or truncating them to the layout capacity
    pub fn from_bytes(layout: BufferLayout, count: usize, bytes: &[u8]) -> Self {
        let mut buffer = Self::new(layout, count);
        let available = bytes.len().min(buffer.bytes.len());
        buffer.bytes[..available].copy_from_slice(&bytes[..available]);
        buffer
    }

    pub fn splat_bytes(&self, index: usize) -> &[u8] {
        let stride = self.layout.bytes_per_splat();
        &self.bytes[index * stride..(index + 1) * stride]
    }

    pub fn write<T: Pod>(&mut self, index: usize, value: &T) {
        let stride = self.layout.bytes_per_splat();
        debug_assert_eq!(std::mem::size_of::<T>(), stride);

        self.bytes[index * stride..(index + 1) * stride].copy_from_slice(bytemuck::bytes_of(value));
    }

    pub fn read<T: Pod>(&self, index: usize) -> T {
        bytemuck::pod_read_unaligned(self.splat_bytes(index))
    }
}


pub fn find_buffer<'a>(buffers: &'a [SplatBuffer], role: &str) -> Option<&'a SplatBuffer> {
    buffers.iter().find(|buffer| buffer.layout.role == role)
}
