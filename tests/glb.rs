use bevy::math::Vec3;
use half::f16;
use serde_json::{
    Value,
    json,
};

use bevy_splat_engine::{
    QualityTier,
    SplatError,
    SplatKind,
    chunk::CHUNK_SIZE,
    io::{
        chunked::ChunkedScene,
        glb::{
            ChunkedGlb,
            read_glb,
        },
    },
    random_spacetime_splats,
    random_splats,
};


fn halves(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| f16::from_f32(*v).to_le_bytes()).collect()
}

// glb container around raw textures laid out back to back, in the order given
fn fixture(gs_type: &str, quality: &str, textures: &[(&str, &str, usize, usize, Vec<u8>)]) -> Vec<u8> {
    let mut bin = Vec::new();
    let mut views = Vec::new();
    let mut images = Vec::new();
    for (index, (name, format, width, height, bytes)) in textures.iter().enumerate() {
        views.push(json!({ "buffer": 0, "byteOffset": bin.len(), "byteLength": bytes.len() }));
        images.push(json!({
            "bufferView": index,
            "mimeType": "image/vnd.custom-raw",
            "extras": { "name": name, "format": format, "width": width, "height": height },
        }));
        bin.extend_from_slice(bytes);
    }

    let document: Value = json!({
        "asset": { "version": "2.0" },
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": views,
        "images": images,
        "nodes": [{
            "mesh": 0,
            "extras": { "gsType": gs_type, "name": "fixture", "num": CHUNK_SIZE, "quality": quality },
        }],
    });
    let mut json = serde_json::to_vec(&document).unwrap();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let mut glb = Vec::new();
    let total = 12 + 8 + json.len() + 8 + bin.len();
    for word in [0x4654_6C67u32, 2, total as u32, json.len() as u32, 0x4E4F_534A] {
        glb.extend_from_slice(&word.to_le_bytes());
    }
    glb.extend_from_slice(&json);
    for word in [bin.len() as u32, 0x004E_4942] {
        glb.extend_from_slice(&word.to_le_bytes());
    }
    glb.extend_from_slice(&bin);
    glb
}

fn slot_zero<const N: usize>(first: [u8; N]) -> Vec<u8> {
    let mut bytes = vec![0; CHUNK_SIZE * N];
    bytes[..N].copy_from_slice(&first);
    bytes
}

fn three_d_textures() -> Vec<(&'static str, &'static str, usize, usize, Vec<u8>)> {
    let xyz = (0u32 << 21) | (1023 << 11) | 2047;

    let mut range = halves(&[0.0, 0.0, -2.0, 2.0, 4.0, 0.0, 0.5, 1.0]);
    range.extend(halves(&[0.0, 1.0, 0.2, 0.4, 0.0, 1.0, 0.0, 0.0]));

    vec![
        ("u_xyz", "R32UI", 16, 16, slot_zero(xyz.to_le_bytes())),
        ("u_q", "RGBA8", 16, 16, slot_zero([128, 128, 128, 255])),
        ("u_color", "RGBA8", 16, 16, slot_zero([255, 0, 0, 128])),
        ("u_s", "RGB8", 16, 16, slot_zero([255, 0, 255])),
        ("u_range", "RGBA32UI", 2, 1, range),
    ]
}


#[test]
fn test_reads_converter_threed_glb() {
    let glb = read_glb(&fixture("ThreeD", "high", &three_d_textures())).unwrap();
    assert_eq!(glb.name, "fixture");
    assert_eq!(glb.tier, QualityTier::High);

    let scene = &glb.scene;
    assert_eq!(scene.kind, SplatKind::ThreeD);
    assert_eq!(scene.chunk_count, 1);
    assert_eq!((scene.grid.width, scene.grid.height), (1, 1));

    let splat = scene.decode(0);
    assert!(splat.position.abs_diff_eq(Vec3::new(2.0, 4.0, -2.0), 1e-3));
    assert!(splat.scale.abs_diff_eq(Vec3::new(1.0, 0.25, 1.0), 1e-3));
    assert!((splat.color.x - 1.0).abs() < 1e-3);
    assert!((splat.color.y - 0.2).abs() < 1e-3);
    assert!((splat.color.w - 128.0 / 255.0).abs() < 1e-6);
    assert!(splat.rotation.w > 0.99);

    let descriptor = glb.descriptor();
    assert_eq!(descriptor.kind, SplatKind::ThreeD);
    assert_eq!(descriptor.tier, QualityTier::High);
    assert_eq!(descriptor.count, CHUNK_SIZE);
    assert_eq!(descriptor.centers.len(), CHUNK_SIZE * 4);
    assert!((descriptor.centers[0] - 2.0).abs() < 1e-3);
    assert!((descriptor.centers[1] - 4.0).abs() < 1e-3);

    let layout = descriptor.chunks.unwrap();
    assert_eq!(layout.chunk_count, 1);
    assert!(layout.falloff.is_empty());
}

#[test]
fn test_reads_converter_spacetime_glb() {
    let xyz = 0u32;

    let mut range = halves(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 2.0]);
    range.extend(halves(&[-1.0, 1.0, 0.0, 0.0, -3.0, 3.0, 0.0, 0.0]));
    range.extend(halves(&[0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0]));

    let mut other = [0u8; 16];
    other[0..4].copy_from_slice(&[255, 0, 0, 255]);
    other[8..12].copy_from_slice(&[255, 255, 255, 0]);
    other[12..14].copy_from_slice(&f16::from_f32(0.5).to_le_bytes());
    other[14..16].copy_from_slice(&f16::from_f32(4.0).to_le_bytes());

    let textures = vec![
        ("u_xyz", "R32UI", 16, 16, slot_zero(xyz.to_le_bytes())),
        ("u_q", "RGBA8", 16, 16, slot_zero([128, 128, 128, 255])),
        ("u_color", "RGBA8", 16, 16, slot_zero([0, 0, 0, 200])),
        ("u_other", "RGBA32UI", 16, 16, slot_zero(other)),
        ("u_range", "RGBA32UI", 3, 1, range),
    ];

    let glb = read_glb(&fixture("SPACETIME", "medium", &textures)).unwrap();
    assert_eq!(glb.tier, QualityTier::Medium);

    let splat = glb.scene.decode(0);
    let motion = splat.motion.unwrap();
    assert!(motion.pos1.abs_diff_eq(Vec3::new(1.0, -1.0, -1.0), 1e-3));
    assert!(motion.pos3.abs_diff_eq(Vec3::splat(3.0), 1e-3));
    assert_eq!(motion.t_center, 0.5);
    assert_eq!(motion.t_scale, 4.0);
    assert!((splat.scale.x - 4.0).abs() < 1e-3);
    assert_eq!(splat.scale.z, 0.0);

    let layout = glb.descriptor().chunks.unwrap();
    assert_eq!(layout.falloff[0].opacity, 200);
    assert_eq!(layout.falloff[0].t_scale, 4.0);
}

#[test]
fn test_missing_texture_is_reported() {
    let textures: Vec<_> = three_d_textures()
        .into_iter()
        .filter(|texture| texture.0 != "u_range")
        .collect();

    match read_glb(&fixture("ThreeD", "medium", &textures)) {
        Err(SplatError::MissingField(name)) => assert_eq!(name, "u_range"),
        other => panic!("expected missing u_range, got {other:?}"),
    }
}

#[test]
fn test_range_width_must_match_kind() {
    let mut textures = three_d_textures();
    textures[4].2 = 3;

    assert!(matches!(
        read_glb(&fixture("ThreeD", "medium", &textures)),
        Err(SplatError::InvalidHeader(_)),
    ));
}

#[test]
fn test_short_texture_is_truncated() {
    let mut textures = three_d_textures();
    textures[1].4.truncate(100);

    assert!(matches!(
        read_glb(&fixture("ThreeD", "medium", &textures)),
        Err(SplatError::Truncated { .. }),
    ));
}

#[test]
fn test_written_glb_reads_back() {
    for (kind, records) in [
        (SplatKind::ThreeD, random_splats(600)),
        (SplatKind::SpaceTime, random_spacetime_splats(300)),
    ] {
        let scene = ChunkedScene::encode(&records, kind);
        let written = ChunkedGlb::new("roundtrip", QualityTier::Low, scene.clone());

        let read = read_glb(&written.to_bytes().unwrap()).unwrap();
        assert_eq!(read.name, "roundtrip");
        assert_eq!(read.tier, QualityTier::Low);

        let decoded = &read.scene;
        assert_eq!(decoded.kind, kind);
        assert_eq!(decoded.grid, scene.grid);
        assert_eq!(decoded.chunk_count, scene.chunk_count);
        assert_eq!(decoded.count, scene.chunk_count * CHUNK_SIZE);
        assert_eq!(decoded.ranges, scene.ranges);
        assert_eq!(decoded.xyz, scene.xyz);
        assert_eq!(decoded.rotation, scene.rotation);
        assert_eq!(decoded.color, scene.color);
        assert_eq!(decoded.scale, scene.scale);
        assert_eq!(decoded.other, scene.other);

        assert_eq!(read.descriptor().centers, scene.descriptor(QualityTier::Low).centers);
    }
}
