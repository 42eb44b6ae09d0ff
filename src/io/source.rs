use std::collections::HashMap;

use crate::error::{
    Result,
    SplatError,
};


// property name to byte offset table of a fixed-stride little endian float payload
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceLayout {
    pub count: usize,
    pub stride: usize,
    pub payload_offset: usize,
    pub offsets: HashMap<String, usize>,
}

impl SourceLayout {
    pub fn new(count: usize, stride: usize, payload_offset: usize) -> Self {
        Self {
            count,
            stride,
            payload_offset,
            offsets: HashMap::new(),
        }
    }

    /// float properties laid out back to back in the given order
    pub fn from_float_properties(count: usize, payload_offset: usize, names: &[&str]) -> Self {
        let mut layout = Self::new(count, names.len() * 4, payload_offset);
        for (i, name) in names.iter().enumerate() {
            layout.offsets.insert(name.to_string(), i * 4);
        }
        layout
    }

    pub fn has(&self, name: &str) -> bool {
        self.offsets.contains_key(name)
    }

    pub fn offset(&self, name: &str) -> Result<usize> {
        self.offsets
            .get(name)
            .copied()
            .ok_or_else(|| SplatError::MissingField(name.to_string()))
    }

    pub fn offsets<const N: usize>(&self, names: [&str; N]) -> Result<[usize; N]> {
        let mut offsets = [0; N];
        for (offset, name) in offsets.iter_mut().zip(names) {
            *offset = self.offset(name)?;
        }
        Ok(offsets)
    }

    pub fn view<'a>(&self, bytes: &'a [u8]) -> Result<SourceView<'a>> {
        let needed = self.payload_offset + self.count * self.stride;
        if bytes.len() < needed {
            return Err(SplatError::Truncated {
                needed,
                available: bytes.len(),
            });
        }

        Ok(SourceView {
            bytes: &bytes[self.payload_offset..needed],
            stride: self.stride,
        })
    }
}


#[derive(Clone, Copy, Debug)]
pub struct SourceView<'a> {
    bytes: &'a [u8],
    stride: usize,
}

impl<'a> SourceView<'a> {
    pub fn len(&self) -> usize {
        if self.stride == 0 {
            return 0;
        }
        self.bytes.len() / self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn f32(&self, index: usize, offset: usize) -> f32 {
        let start = index * self.stride + offset;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.bytes[start..start + 4]);
        f32::from_le_bytes(raw)
    }

    pub fn f32s<const N: usize>(&self, index: usize, offsets: &[usize; N]) -> [f32; N] {
        offsets.map(|offset| self.f32(index, offset))
    }
}
