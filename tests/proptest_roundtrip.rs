use std::fs::File;

use proptest::prelude::*;
use tempfile::NamedTempFile;

use binpickle::codec::CodecConfig;
use binpickle::{Reader, Writer};

fn chain_for(tag: u8, level: i32) -> Vec<CodecConfig> {
    match tag % 4 {
        0 => vec![],
        1 => vec![CodecConfig::new("none")],
        2 => vec![CodecConfig::with_level("zstd", level.clamp(1, 19))],
        _ => vec![CodecConfig::with_level("lz4", 0)],
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn buffers_round_trip_through_any_builtin_codec(
        buffers in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..2048), 1..6),
        tags in prop::collection::vec(any::<u8>(), 1..6),
        level in 1..19i32,
        align in any::<bool>(),
    ) {
        let temp = NamedTempFile::new().unwrap();
        let chains: Vec<Vec<CodecConfig>> = tags.iter().map(|&t| chain_for(t, level)).collect();

        {
            let file = File::create(temp.path()).unwrap();
            let mut writer = Writer::new(file);
            for (i, data) in buffers.iter().enumerate() {
                let chain = chains.get(i).cloned().unwrap_or_default();
                writer.write_buffer(data, &chain, None, align).unwrap();
            }
            writer.finalize().unwrap();
            writer.close().unwrap();
        }

        let reader = Reader::open(temp.path(), true).unwrap();
        prop_assert_eq!(reader.entries().len(), buffers.len());
        for (i, expected) in buffers.iter().enumerate() {
            let view = reader.get_buffer(i).unwrap();
            prop_assert_eq!(&*view, expected.as_slice());
        }
        reader.close().unwrap();
    }

    #[test]
    fn index_encoding_is_deterministic_across_runs(
        offsets in prop::collection::vec(16u64..1_000_000, 1..8),
    ) {
        use binpickle::index::{encode_index, IndexEntry};

        let mut sorted = offsets.clone();
        sorted.sort_unstable();
        sorted.dedup();

        let entries: Vec<IndexEntry> = sorted
            .iter()
            .enumerate()
            .map(|(i, &offset)| IndexEntry {
                offset,
                enc_length: 4,
                dec_length: 4,
                hash: [i as u8; 32],
                codecs: vec![],
                info: None,
            })
            .collect();

        let a = encode_index(&entries).unwrap();
        let b = encode_index(&entries).unwrap();
        prop_assert_eq!(a, b);
    }
}
