use bevy_splat_engine::{
    EncodedScene,
    QualityTier,
    SplatError,
    SplatKind,
    io::spb::{
        SpbWriter,
        parse_header,
        read_spb,
    },
    random_spacetime_splats,
    random_splats,
};


#[test]
fn test_spb_header() {
    let scene = SplatKind::ThreeD.encode(&random_splats(100), QualityTier::Medium);
    let bytes = SpbWriter { padded: false }.to_bytes(&scene).unwrap();

    let header = parse_header(&bytes).unwrap();
    assert_eq!(header.kind, SplatKind::ThreeD);
    assert_eq!(header.tier, QualityTier::Medium);
    assert_eq!(header.count, 100);
    assert!(!header.padded);

    let names: Vec<&str> = header.buffers.iter().map(|buffer| buffer.name.as_str()).collect();
    assert_eq!(names, ["Pos6Pad2", "Cov12Col4", "SH9Pad3"]);
    assert_eq!(header.buffers[0].size, 100 * 8);
    assert_eq!(header.buffers[1].size, 100 * 16);
    assert_eq!(header.buffers[2].size, 100 * 12);
    assert_eq!(header.buffers[0].offset, header.header_len);
    assert_eq!(header.buffers[2].offset, header.header_len + 100 * 24);

    let text = std::str::from_utf8(&bytes[..header.header_len]).unwrap();
    assert!(text.starts_with("SPB ThreeD 1 100 0\n"));
    assert!(text.ends_with("end_header\n"));
}

#[test]
fn test_spb_compact_roundtrip() {
    let scene = SplatKind::ThreeD.encode(&random_splats(1000), QualityTier::High);
    let bytes = SpbWriter { padded: false }.to_bytes(&scene).unwrap();

    let decoded = read_spb(&bytes).unwrap();
    assert_eq!(decoded.kind, scene.kind);
    assert_eq!(decoded.tier, scene.tier);
    assert_eq!(decoded.count, scene.count);
    assert_eq!(decoded.buffers, scene.buffers);

    // full precision positions survive, so do the sort centers
    assert_eq!(decoded.centers, scene.centers);
}

#[test]
fn test_spb_padded_roundtrip() {
    let scene = SplatKind::SpaceTime.encode(&random_spacetime_splats(700), QualityTier::Low);
    let bytes = SpbWriter { padded: true }.to_bytes(&scene).unwrap();

    let header = parse_header(&bytes).unwrap();
    assert!(header.padded);
    assert_eq!(header.kind, SplatKind::SpaceTime);
    for (declared, buffer) in header.buffers.iter().zip(&scene.buffers) {
        assert_eq!(declared.size, buffer.bytes.len());
    }

    let decoded = read_spb(&bytes).unwrap();
    assert_eq!(decoded.buffers, scene.buffers);
    assert_eq!(decoded.centers.len(), 700 * 13);
}

#[test]
fn test_spb_underrun_zero_fills() {
    let scene = SplatKind::ThreeD.encode(&random_splats(64), QualityTier::Low);
    let mut bytes = SpbWriter { padded: false }.to_bytes(&scene).unwrap();
    bytes.truncate(bytes.len() - 16 * 4);

    let decoded = read_spb(&bytes).unwrap();
    assert_eq!(decoded.buffers[0], scene.buffers[0]);

    let covcol = &decoded.buffers[1];
    assert_eq!(covcol.bytes.len(), scene.buffers[1].bytes.len());
    assert_eq!(covcol.bytes[..60 * 16], scene.buffers[1].bytes[..60 * 16]);
    assert!(covcol.bytes[60 * 16..].iter().all(|&byte| byte == 0));
}

#[test]
fn test_spb_invalid_header() {
    assert!(matches!(read_spb(b"not a scene"), Err(SplatError::InvalidHeader(_))));
    assert!(matches!(read_spb(b"PLY ThreeD 1 1 0\nend_header\n"), Err(SplatError::InvalidHeader(_))));
    assert!(matches!(read_spb(b"SPB Mesh 1 1 0\nend_header\n"), Err(SplatError::InvalidHeader(_))));

    match read_spb(b"SPB ThreeD 1 4 0\nBuffer pospad 32\nend_header\n") {
        Err(SplatError::MissingField(name)) => assert_eq!(name, "Cov12Col4"),
        other => panic!("expected missing buffer, got {other:?}"),
    }
}


// blob laid out the way the converter writes it: header text, then compact payloads
fn converter_blob(header: &str, scene: &EncodedScene, order: &[usize]) -> Vec<u8> {
    let mut bytes = header.as_bytes().to_vec();
    for &index in order {
        let buffer = &scene.buffers[index];
        bytes.extend_from_slice(&buffer.bytes[..scene.count * buffer.layout.bytes_per_splat()]);
    }
    bytes
}

#[test]
fn test_spb_reads_layout_named_zero_payload() {
    let mut bytes = b"SPB ThreeD 1 4 0\nBuffer Pos6Pad2 32\nBuffer Cov12Col4 64\nBuffer SH9Pad3 48\nend_header\n".to_vec();
    bytes.extend_from_slice(&[0; 144]);

    let decoded = read_spb(&bytes).unwrap();
    assert_eq!(decoded.kind, SplatKind::ThreeD);
    assert_eq!(decoded.tier, QualityTier::Medium);
    assert_eq!(decoded.count, 4);

    let names: Vec<&str> = decoded.buffers.iter().map(|buffer| buffer.layout.name).collect();
    assert_eq!(names, ["Pos6Pad2", "Cov12Col4", "SH9Pad3"]);
    assert!(decoded.buffers.iter().all(|buffer| buffer.bytes.iter().all(|&b| b == 0)));
    assert!(decoded.centers.iter().all(|&c| c == 0.0 || c == 1.0));
}

#[test]
fn test_spb_reads_converter_threed_headers() {
    let records = random_splats(40);

    let cases = [
        (QualityTier::Low, "SPB ThreeD 2 40 0\nBuffer Pos6Pad2 320\nBuffer Cov12Col4 640\nBuffer SH0 0\nend_header\n", 2),
        (QualityTier::Medium, "SPB ThreeD 1 40 0\nBuffer Pos6Pad2 320\nBuffer Cov12Col4 640\nBuffer SH9Pad3 480\nend_header\n", 3),
        (QualityTier::High, "SPB ThreeD 0 40 0\nBuffer Pos12Pad4 640\nBuffer Cov12Col4 640\nBuffer SH24 960\nend_header\n", 3),
    ];

    for (tier, header, buffer_count) in cases {
        let scene = SplatKind::ThreeD.encode(&records, tier);
        assert_eq!(scene.buffers.len(), buffer_count);

        let order: Vec<usize> = (0..buffer_count).collect();
        let decoded = read_spb(&converter_blob(header, &scene, &order)).unwrap();

        assert_eq!(decoded.tier, tier);
        assert_eq!(decoded.count, 40);
        assert_eq!(decoded.buffers, scene.buffers);
        if tier == QualityTier::High {
            assert_eq!(decoded.centers, scene.centers);
        }
    }
}

#[test]
fn test_spb_reads_converter_spacetime_headers() {
    let records = random_spacetime_splats(40);

    // the low tier converter declares its last buffer with zero bytes but still writes it
    let cases = [
        (QualityTier::Low, "SPB SPACETIME 2 40 0\nBuffer Pos6Pad2 320\nBuffer Rot4Omega4Scale6Ts2 640\nBuffer Motion11Tc1Col4 0\nend_header\n"),
        (QualityTier::Medium, "SPB SPACETIME 1 40 0\nBuffer Pos6Pad2 320\nBuffer Rot8Omega4Col4 640\nBuffer Motion15Tc1Scale6Ts2 960\nend_header\n"),
        (QualityTier::High, "SPB SPACETIME 0 40 0\nBuffer Pos12Pad4 640\nBuffer Rot8Omega8 640\nBuffer Motion18Scale6Tc2Ts2Col4 1280\nend_header\n"),
    ];

    for (tier, header) in cases {
        let scene = SplatKind::SpaceTime.encode(&records, tier);
        let decoded = read_spb(&converter_blob(header, &scene, &[0, 1, 2])).unwrap();

        assert_eq!(decoded.kind, SplatKind::SpaceTime);
        assert_eq!(decoded.tier, tier);
        assert_eq!(decoded.buffers, scene.buffers);
        assert_eq!(decoded.centers.len(), 40 * 13);
    }
}

#[test]
fn test_spb_binds_reordered_buffers_by_name() {
    let scene = SplatKind::ThreeD.encode(&random_splats(4), QualityTier::Medium);
    let header = "SPB ThreeD 1 4 0\nBuffer SH9Pad3 48\nBuffer Pos6Pad2 32\nBuffer Cov12Col4 64\nend_header\n";

    let bytes = converter_blob(header, &scene, &[2, 0, 1]);
    let decoded = read_spb(&bytes).unwrap();

    assert_eq!(decoded.buffers.len(), 3);
    assert_eq!(decoded.buffers, scene.buffers);
}

#[test]
fn test_spb_binds_unknown_names_by_position() {
    let scene = SplatKind::ThreeD.encode(&random_splats(4), QualityTier::Medium);
    let header = "SPB ThreeD 1 4 0\nBuffer bind0 32\nBuffer bind1 64\nBuffer bind2 48\nend_header\n";

    let decoded = read_spb(&converter_blob(header, &scene, &[0, 1, 2])).unwrap();
    assert_eq!(decoded.buffers, scene.buffers);
}

#[test]
fn test_spb_writer_uses_layout_names() {
    let low = SplatKind::ThreeD.encode(&random_splats(8), QualityTier::Low);
    let bytes = SpbWriter { padded: false }.to_bytes(&low).unwrap();

    let header = parse_header(&bytes).unwrap();
    let names: Vec<&str> = header.buffers.iter().map(|buffer| buffer.name.as_str()).collect();
    assert_eq!(names, ["Pos6Pad2", "Cov12Col4", "SH0"]);
    assert_eq!(header.buffers[2].size, 0);

    let decoded = read_spb(&bytes).unwrap();
    assert_eq!(decoded.buffers, low.buffers);

    let spacetime = SplatKind::SpaceTime.encode(&random_spacetime_splats(8), QualityTier::Medium);
    let header = parse_header(&SpbWriter { padded: false }.to_bytes(&spacetime).unwrap()).unwrap();
    let names: Vec<&str> = header.buffers.iter().map(|buffer| buffer.name.as_str()).collect();
    assert_eq!(names, ["Pos6Pad2", "Rot8Omega4Col4", "Motion15Tc1Scale6Ts2"]);
}
