//! Property-based tests for the varint codec, lacing and the offset index.

use mkv_ebml::base::{decode_signed, decode_size, encode_signed, encode_size, size_width, vint_width, DataSize};
use mkv_ebml::index::{CueEntry, CueIndex, Placement};
use mkv_ebml::lacer::Lacer;
use mkv_ebml::prelude::*;
use proptest::prelude::*;

/// Largest size an 8-byte varint carries below the unknown-size sentinel.
const MAX_KNOWN_SIZE: u64 = (1 << 56) - 2;

/// Cluster lengths with a flag telling whether the cluster gets a cue.
fn arb_clusters() -> impl Strategy<Value = Vec<(u64, bool)>> {
    prop::collection::vec((1u64..200_000, any::<bool>()), 0..64)
}

proptest! {
    #[test]
    fn size_round_trip(value in 0..=MAX_KNOWN_SIZE, floor in 1usize..=8) {
        let bytes = encode_size(value, floor).unwrap();
        let (decoded, len) = decode_size(&bytes).unwrap();
        prop_assert_eq!(decoded, DataSize::Known(value));
        prop_assert_eq!(len, bytes.len());
        prop_assert_eq!(len, size_width(value).max(floor));
    }

    #[test]
    fn size_width_is_minimal(value in 0..=MAX_KNOWN_SIZE) {
        let width = encode_size(value, 1).unwrap().len();
        if width > 1 {
            // one byte narrower is either too small or the sentinel
            let narrower = width - 1;
            prop_assert!(value >= (1u64 << (7 * narrower)) - 1);
        }
    }

    #[test]
    fn signed_round_trip(value in -(1i64 << 48)..(1i64 << 48)) {
        let bytes = encode_signed(value).unwrap();
        prop_assert_eq!(decode_signed(&bytes).unwrap(), (value, bytes.len()));
    }

    #[test]
    fn lacing_round_trip(
        frames in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..600), 1..20),
        mode in prop_oneof![Just(Lacer::Xiph), Just(Lacer::Ebml)],
    ) {
        let refs: Vec<&[u8]> = frames.iter().map(|f| &f[..]).collect();
        let laced = mode.lace(&refs).unwrap();
        prop_assert_eq!(mode.delace(&laced).unwrap(), refs);
    }

    #[test]
    fn stabilizer_fixed_point(base in 0u64..100_000, clusters in arb_clusters()) {
        let mut index = CueIndex::new(ElementType::Cues, Placement::Leading, base);
        let mut cued = Vec::new();
        let mut offset = base;
        for (i, (len, cue)) in clusters.iter().enumerate() {
            if *cue {
                index.push(CueEntry { timecode: i as u64 * 1000, track: 1, block_number: None }, *len);
                cued.push(offset);
            } else {
                index.advance(*len);
            }
            offset += len;
        }

        let len = index.stabilize().unwrap();
        let widths = index.widths();
        let positions = index.positions();
        prop_assert_eq!(index.stabilize().unwrap(), len);
        prop_assert_eq!(index.widths(), widths.clone());

        for ((w, p), data_offset) in widths.iter().zip(&positions).zip(&cued) {
            prop_assert_eq!(*p, data_offset + len);
            prop_assert!(*w >= vint_width(*p));
        }
        let built = index.build().unwrap();
        prop_assert_eq!(built.encoded_len(), len);
        prop_assert_eq!(built.encode_to_vec().unwrap().len() as u64, len);
    }
}
