use std::io::Cursor;

use ply_rs::{
    parser::Parser,
    ply::{
        DefaultElement,
        Encoding,
        PropertyType,
        ScalarType,
    },
};

use crate::{
    error::{
        Result,
        SplatError,
    },
    gaussian::settings::QualityTier,
    io::source::SourceLayout,
    kernel::{
        EncodedScene,
        encode_source_scene,
    },
};


fn scalar_size(scalar: &ScalarType) -> usize {
    match scalar {
        ScalarType::Char | ScalarType::UChar => 1,
        ScalarType::Short | ScalarType::UShort => 2,
        ScalarType::Int | ScalarType::UInt | ScalarType::Float => 4,
        ScalarType::Double => 8,
    }
}

/// reads a ply header into the vertex property offset table, float properties only
pub fn parse_header(bytes: &[u8]) -> Result<SourceLayout> {
    let mut cursor = Cursor::new(bytes);
    let header = Parser::<DefaultElement>::new().read_header(&mut cursor)?;
    let payload_offset = cursor.position() as usize;

    if !matches!(header.encoding, Encoding::BinaryLittleEndian) {
        return Err(SplatError::UnsupportedEncoding(format!("{:?}", header.encoding)));
    }

    let mut preceding = false;
    for (_key, element) in &header.elements {
        if element.name != "vertex" {
            preceding |= element.count > 0;
            continue;
        }

        if preceding {
            return Err(SplatError::InvalidHeader("vertex element must come first".to_string()));
        }

        let mut layout = SourceLayout::new(element.count, 0, payload_offset);
        for (name, property) in &element.properties {
            match &property.data_type {
                PropertyType::Scalar(scalar) => {
                    if matches!(scalar, ScalarType::Float) {
                        layout.offsets.insert(name.clone(), layout.stride);
                    }
                    layout.stride += scalar_size(scalar);
                }
                PropertyType::List(_, _) => {
                    return Err(SplatError::InvalidHeader(format!("list property `{name}` in vertex element")));
                }
            }
        }

        return Ok(layout);
    }

    Err(SplatError::MissingField("vertex".to_string()))
}

pub fn encode_ply(bytes: &[u8], tier: QualityTier) -> Result<EncodedScene> {
    let layout = parse_header(bytes)?;
    encode_source_scene(&layout, bytes, tier)
}
