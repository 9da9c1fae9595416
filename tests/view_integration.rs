use mkv_ebml::prelude::*;
use mkv_ebml::schema::admits;
use mkv_ebml::view::DEFAULT_TIMECODE_SCALE;
use std::io::Cursor;

/// Helper function to create a video and an audio track
fn tracks() -> Vec<Track> {
    let mut video = Track::video(1, "V_VP9", 1920, 1080);
    video.name = Some("Video Track".to_string());
    let mut audio = Track::audio(2, "A_OPUS", 48000.0, 2);
    audio.language = Some("eng".to_string());
    vec![video, audio]
}

/// Interleaved frames: a video frame every 40 ticks with a keyframe every 5,
/// an audio frame every 20 ticks.
fn frames(n: i64) -> Vec<Frame> {
    let mut frames = Vec::new();
    for i in 0..n {
        frames.push(Frame::new(1, i * 40, i % 5 == 0, vec![(i % 251) as u8; 300 + (i as usize % 7) * 50]));
        frames.push(Frame::new(2, i * 40, true, vec![0xA0; 60]));
        frames.push(Frame::new(2, i * 40 + 20, true, vec![0xA1; 60]));
    }
    frames
}

fn config(k: u64) -> MuxerConfig {
    MuxerConfig {
        title: Some("Test Segment 1".to_string()),
        duration: Some(30000.0),
        frames_per_cluster: Some(k),
        ..MuxerConfig::default()
    }
}

fn mux(k: u64, n: i64) -> Vec<u8> {
    let muxer = Muxer::new(config(k), tracks()).unwrap();
    let mut bytes = Vec::new();
    muxer.write(frames(n), &mut bytes).unwrap();
    bytes
}

#[test]
fn mux_then_view() {
    let bytes = mux(12, 40);
    let view = MatroskaView::parse(Cursor::new(&bytes), ParserConfig::default()).unwrap();

    assert_eq!(view.doc_type(), Some("matroska"));
    assert_eq!(view.timecode_scale(), DEFAULT_TIMECODE_SCALE);
    assert_eq!(view.duration(), Some(30000.0));
    let read = view.tracks().unwrap();
    assert_eq!(read.len(), 2);
    assert_eq!(read[0].kind, TrackKind::Video);
    assert_eq!(read[0].name.as_deref(), Some("Video Track"));
    assert_eq!(read[1].audio.unwrap().channels, 2);
    assert_eq!(read[1].language.as_deref(), Some("eng"));

    let frames_read: Vec<Frame> = view
        .clusters()
        .flat_map(|c| c.frames())
        .collect::<mkv_ebml::Result<_>>()
        .unwrap();
    assert_eq!(frames_read, frames(40));

    // re-encoding the parsed tree gives the same bytes
    let reencoded: Vec<u8> = [&view.ebml, &view.segment]
        .iter()
        .flat_map(|e| e.encode_to_vec().unwrap())
        .collect();
    assert_eq!(reencoded, bytes);
}

#[test]
fn seek_head_locates_top_level_elements() {
    let bytes = mux(30, 40);
    let view = MatroskaView::from_elements(parse_bytes(&bytes).unwrap()).unwrap();
    let entries = view.seek_entries();
    let targets: Vec<u32> = entries.iter().map(|e| e.id).collect();
    assert_eq!(
        targets,
        vec![ElementType::Info.id(), ElementType::Tracks.id(), ElementType::Cues.id()]
    );
    for entry in entries {
        assert_eq!(view.locate(entry.position).unwrap().id, entry.id);
    }
}

#[test]
fn cue_positions_hit_cluster_ids() {
    // enough clusters for the cue positions to need two and three bytes
    let bytes = mux(3, 200);
    let view = MatroskaView::from_elements(parse_bytes(&bytes).unwrap()).unwrap();
    let cues = view.cue_points();
    assert!(!cues.is_empty());
    assert!(cues.iter().any(|c| c.cluster_position >= 1 << 14));

    for cue in &cues {
        let absolute = (view.segment.data_offset + cue.cluster_position) as usize;
        assert_eq!(&bytes[absolute..absolute + 4], &[0x1F, 0x43, 0xB6, 0x75]);
        assert_eq!(cue.track, 1);

        let cluster = ClusterView::new(view.locate(cue.cluster_position).unwrap()).unwrap();
        let block = cluster
            .blocks()
            .nth(cue.block_number.unwrap() as usize - 1)
            .unwrap()
            .block()
            .unwrap();
        assert!(block.keyframe);
        assert_eq!(block.track, 1);
        assert_eq!(cluster.timecode() as i64 + block.timecode as i64, cue.timecode as i64);
    }
}

#[test]
fn clusters_partition_frames() {
    for k in [1, 2, 7, 64] {
        let n = 20;
        let bytes = mux(k, n);
        let view = MatroskaView::from_elements(parse_bytes(&bytes).unwrap()).unwrap();
        let clusters: Vec<ClusterView> = view.clusters().collect();

        let total = (n * 3) as u64;
        assert_eq!(clusters.len() as u64, total.div_ceil(k));
        let counts: Vec<u64> = clusters.iter().map(|c| c.blocks().count() as u64).collect();
        assert_eq!(counts.iter().sum::<u64>(), total);
        assert!(counts[..counts.len() - 1].iter().all(|c| *c == k));

        let timecodes: Vec<u64> = clusters.iter().map(|c| c.timecode()).collect();
        assert!(timecodes.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(clusters[0].prev_size(), None);
        for pair in clusters.windows(2) {
            assert_eq!(pair[1].prev_size(), Some(pair[0].element().encoded_len()));
        }
    }
}

#[test]
fn resync_after_corrupt_byte() {
    let ebml = Element::master(
        ElementType::Ebml,
        vec![Element::string(ElementType::DocType, "webm")],
    );
    let segment = Element::master(
        ElementType::Segment,
        vec![Element::master(
            ElementType::Info,
            vec![Element::uint(ElementType::TimecodeScale, 1_000_000)],
        )],
    );
    let first = ebml.encode_to_vec().unwrap();
    let second = segment.encode_to_vec().unwrap();

    let clean = parse_bytes(&[first.clone(), second.clone()].concat()).unwrap();
    let corrupt = parse_bytes(&[first.clone(), vec![0x00], second].concat()).unwrap();
    assert_eq!(corrupt.len(), 2);
    assert_eq!(corrupt[0], clean[0]);
    assert_eq!(corrupt[1].offset, clean[1].offset + 1);
    assert_eq!(
        corrupt[1].path(&[ElementType::Info, ElementType::TimecodeScale]).unwrap().as_uint(),
        Some(1_000_000)
    );
}

#[test]
fn parsed_tree_respects_schema() {
    fn check(parent: &Element) {
        for child in parent.children() {
            assert!(
                admits(parent.ty, child.ty),
                "{:?} under {:?}",
                child.ty,
                parent.ty
            );
            check(child);
        }
    }

    let bytes = mux(5, 30);
    let mut roots = parse_bytes(&bytes).unwrap();
    // Filler some encoders leave inside Clusters, plus global elements.
    let cluster = roots[1]
        .children_mut()
        .unwrap()
        .iter_mut()
        .find(|c| c.ty == ElementType::Cluster)
        .unwrap();
    let children = cluster.children_mut().unwrap();
    children.insert(1, Element::uint(ElementType::TrackNumber, 9));
    children.insert(2, Element::void(3));
    children.push(Element::binary(ElementType::Crc32, vec![0u8; 4]));

    let bytes: Vec<u8> = roots.iter().flat_map(|e| e.encode_to_vec().unwrap()).collect();
    let reparsed = parse_bytes(&bytes).unwrap();
    assert_eq!(reparsed.len(), 2);
    for root in &reparsed {
        check(root);
    }
    let first = reparsed[1].child(ElementType::Cluster).unwrap();
    assert_eq!(first.child_uint(ElementType::TrackNumber), Some(9));
    assert!(first.child(ElementType::Void).is_some());
    assert!(first.child(ElementType::Crc32).is_some());
    assert_eq!(reparsed[1].children_of(ElementType::Cluster).count(), 18);
}

#[test]
fn streaming_and_whole_file_agree_on_frames() {
    let mut muxer = StreamingMuxer::new(Vec::new(), config(8), tracks()).unwrap();
    for frame in frames(25) {
        muxer.push(frame).unwrap();
    }
    let streamed = muxer.finish().unwrap();

    let view = MatroskaView::from_elements(parse_bytes(&streamed).unwrap()).unwrap();
    assert_eq!(view.segment.size, DataSize::Unknown);
    let frames_read: Vec<Frame> = view
        .clusters()
        .flat_map(|c| c.frames())
        .collect::<mkv_ebml::Result<_>>()
        .unwrap();
    assert_eq!(frames_read, frames(25));
    for cue in view.cue_points() {
        assert_eq!(view.locate(cue.cluster_position).unwrap().ty, ElementType::Cluster);
    }
    for entry in view.seek_entries() {
        assert_eq!(view.locate(entry.position).unwrap().id, entry.id);
    }
}
