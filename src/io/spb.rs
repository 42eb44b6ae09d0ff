use std::io::Write;

use bevy::log::{debug, warn};

use crate::{
    error::{
        Result,
        SplatError,
    },
    gaussian::settings::QualityTier,
    io::layout::{
        BufferLayout,
        SplatBuffer,
    },
    kernel::{
        EncodedScene,
        SplatKind,
    },
    math::clamp_splat_count,
};


const MAGIC: &str = "SPB";
const END_HEADER: &[u8] = b"end_header\n";
const SH_ROLE: &str = "sh";


/// one `Buffer <name> <bytes>` line, `offset` is absolute within the blob
#[derive(Clone, Debug, PartialEq)]
pub struct SpbBuffer {
    pub name: String,
    pub size: usize,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpbHeader {
    pub kind: SplatKind,
    pub tier: QualityTier,
    pub count: usize,
    /// buffers are stored at full layout capacity
    pub padded: bool,
    /// declared buffers in bind order
    pub buffers: Vec<SpbBuffer>,
    pub header_len: usize,
}

impl SpbHeader {
    /// matches a layout by packing or role name, falling back to its bind position
    pub fn bind(&self, position: usize, layout: &BufferLayout, known: &[BufferLayout]) -> Option<&SpbBuffer> {
        let named = |buffer: &&SpbBuffer| buffer.name == layout.name || buffer.name == layout.role;

        self.buffers.iter().find(named).or_else(|| {
            self.buffers.get(position).filter(|buffer| {
                !known
                    .iter()
                    .any(|other| buffer.name == other.name || buffer.name == other.role)
            })
        })
    }
}

fn invalid(message: impl Into<String>) -> SplatError {
    SplatError::InvalidHeader(message.into())
}

fn parse_number<T: std::str::FromStr>(token: Option<&str>, what: &str) -> Result<T> {
    token
        .ok_or_else(|| invalid(format!("missing {what}")))?
        .parse()
        .map_err(|_| invalid(format!("malformed {what}")))
}

pub fn parse_header(bytes: &[u8]) -> Result<SpbHeader> {
    let header_len = bytes
        .windows(END_HEADER.len())
        .position(|window| window == END_HEADER)
        .map(|position| position + END_HEADER.len())
        .ok_or_else(|| invalid("missing end_header"))?;

    let text = std::str::from_utf8(&bytes[..header_len]).map_err(|_| invalid("header is not utf-8"))?;
    let mut lines = text.lines();

    let mut tokens = lines.next().unwrap_or_default().split_whitespace();
    if tokens.next() != Some(MAGIC) {
        return Err(invalid("missing SPB magic"));
    }

    let kind = SplatKind::from_header_name(tokens.next().ok_or_else(|| invalid("missing splat kind"))?)?;
    let tier = QualityTier::from_level(parse_number(tokens.next(), "quality level")?);
    let count = clamp_splat_count(parse_number(tokens.next(), "splat count")?);
    let padded = tokens.next().is_some_and(|pad| pad != "0");

    let mut buffers = Vec::new();
    let mut offset = header_len;
    for line in lines {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("Buffer") => {
                let name = tokens.next().ok_or_else(|| invalid("missing buffer name"))?;
                let size = parse_number(tokens.next(), "buffer size")?;
                buffers.push(SpbBuffer {
                    name: name.to_string(),
                    size,
                    offset,
                });
                offset += size;
            }
            Some("end_header") | None => {}
            Some(other) => return Err(invalid(format!("unexpected header line `{other}`"))),
        }
    }

    Ok(SpbHeader {
        kind,
        tier,
        count,
        padded,
        buffers,
        header_len,
    })
}

// an SH buffer declared with zero bytes (`SH0 0`) means the scene carries no SH
fn declares_sh(header: &SpbHeader) -> bool {
    let known = header.kind.layouts(header.tier, true);

    known
        .iter()
        .enumerate()
        .filter(|(_, layout)| layout.role == SH_ROLE)
        .any(|(position, layout)| header.bind(position, layout, &known).is_some_and(|buffer| buffer.size > 0))
}

/// rehydrates a pre-encoded scene, copy-extending buffers the blob does not fully cover
pub fn read_spb(bytes: &[u8]) -> Result<EncodedScene> {
    let header = parse_header(bytes)?;

    let with_sh = declares_sh(&header);
    let known = header.kind.layouts(header.tier, true);
    let layouts = header.kind.layouts(header.tier, with_sh);

    let mut buffers = Vec::with_capacity(layouts.len());
    for (position, layout) in layouts.into_iter().enumerate() {
        let declared = header
            .bind(position, &layout, &known)
            .ok_or_else(|| SplatError::MissingField(layout.name.to_string()))?;

        let used = header.count * layout.bytes_per_splat();
        let nominal = layout.capacity_bytes(header.count);
        let extent = if header.padded { nominal } else { declared.size.max(used) };

        let start = declared.offset.min(bytes.len());
        let available = (bytes.len() - start).min(extent);

        if available < used {
            warn!(buffer = layout.name, used, available, "pre-encoded buffer underrun, zero filling");
        } else if available < nominal {
            debug!(buffer = layout.name, available, nominal, "extending compact buffer to capacity");
        }

        buffers.push(SplatBuffer::from_bytes(layout, header.count, &bytes[start..start + available]));
    }

    let centers = header.kind.centers_from_buffers(header.count, &buffers);

    Ok(EncodedScene {
        kind: header.kind,
        tier: header.tier,
        count: header.count,
        buffers,
        centers,
    })
}


pub struct SpbWriter {
    /// write buffers at full capacity instead of trimming to the splat count
    pub padded: bool,
}

impl SpbWriter {
    pub fn write(&self, scene: &EncodedScene, writer: &mut impl Write) -> Result<()> {
        let payloads: Vec<&[u8]> = scene
            .buffers
            .iter()
            .map(|buffer| {
                if self.padded {
                    buffer.bytes.as_slice()
                } else {
                    let used = scene.count * buffer.layout.bytes_per_splat();
                    &buffer.bytes[..used.min(buffer.bytes.len())]
                }
            })
            .collect();

        writeln!(
            writer,
            "{MAGIC} {} {} {} {}",
            scene.kind.header_name(),
            scene.tier.level(),
            scene.count,
            self.padded as u8,
        )?;
        for (buffer, payload) in scene.buffers.iter().zip(&payloads) {
            writeln!(writer, "Buffer {} {}", buffer.layout.name, payload.len())?;
        }
        if scene.kind == SplatKind::ThreeD && scene.buffer(SH_ROLE).is_none() {
            writeln!(writer, "Buffer SH0 0")?;
        }
        writer.write_all(END_HEADER)?;

        for payload in payloads {
            writer.write_all(payload)?;
        }

        Ok(())
    }

    pub fn to_bytes(&self, scene: &EncodedScene) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write(scene, &mut bytes)?;
        Ok(bytes)
    }
}
