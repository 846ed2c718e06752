//! Property tests: whatever is uploaded reads back byte-identical through
//! the mount, for any content and chunk size.

use proptest::prelude::*;

use crate::harness::TestEnv;

fn file_set() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..600), 1..4)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_mount_reads_back_uploaded_files(
        contents in file_set(),
        max_chunk in 1usize..64,
        step in 1u64..200,
    ) {
        let env = TestEnv::new("prop_mount");
        for (i, data) in contents.iter().enumerate() {
            env.write_file(&format!("d{}/f{}.bin", i % 2, i), data);
        }
        let mount = env.chunked_mount(max_chunk);

        for (i, data) in contents.iter().enumerate() {
            let path = format!("d{}/f{}.bin", i % 2, i);
            let attrs = mount.adapter.get_attributes(&path).unwrap();
            prop_assert_eq!(attrs.size, data.len() as u64);

            let manifest = mount.controller.manifest(&path).unwrap();
            let expected_chunks = data.len().div_ceil(max_chunk);
            prop_assert_eq!(manifest.chunk_count(), expected_chunks);

            prop_assert_eq!(&mount.read_all(&path, step).unwrap(), data);
        }
        prop_assert_eq!(mount.adapter.open_handles(), 0);
    }

    #[test]
    fn prop_range_reads_match_slices(
        data in prop::collection::vec(any::<u8>(), 1..800),
        max_chunk in 1usize..100,
        ranges in prop::collection::vec((0u64..1000, 0u64..300), 1..10),
    ) {
        let env = TestEnv::new("prop_ranges");
        env.write_file("blob", &data);
        let mount = env.chunked_mount(max_chunk);

        let fh = mount.adapter.open_file("blob").unwrap();
        for (offset, len) in ranges {
            let got = mount.adapter.read(fh, offset, len).unwrap();
            let start = (offset as usize).min(data.len());
            let end = (offset.saturating_add(len) as usize).min(data.len());
            prop_assert_eq!(&got[..], &data[start..end]);
        }
        mount.adapter.release(fh).unwrap();
    }
}
