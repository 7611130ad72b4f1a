//! Property tests for the random-access cipher path.

use cloakfs_core::store::encrypted::EncryptedStore;
use cloakfs_core::{Backend, OpenFlags, SecretKey};
use proptest::prelude::*;
use tempfile::TempDir;

fn zero_key() -> SecretKey {
    SecretKey::from_bytes([0u8; 32])
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u64).wrapping_mul(31).wrapping_add(seed as u64) as u8)
        .collect()
}

fn read_back(store: &EncryptedStore, path: &str, len: usize) -> Vec<u8> {
    let fd = store.open(path, OpenFlags::read_only()).unwrap();
    let data = store.read(path, fd, len, 0).unwrap();
    store.release(path, fd).unwrap();
    data
}

#[test]
fn round_trip_at_interesting_sizes() {
    // Around block and AES boundaries, plus a multi-block body.
    for len in [0, 1, 15, 16, 17, 4096, 65_535, 65_536, 65_537, 300_000] {
        let dir = TempDir::new().unwrap();
        let store = EncryptedStore::new(dir.path(), &zero_key()).unwrap();
        let data = pattern(len, 42);

        let fd = store.create("/f", 0o644).unwrap();
        store.write("/f", fd, &data, 0).unwrap();
        store.release("/f", fd).unwrap();

        assert_eq!(read_back(&store, "/f", len.max(1)), data, "len {len}");
    }
}

#[test]
fn round_trip_four_mebibytes() {
    let dir = TempDir::new().unwrap();
    let store = EncryptedStore::new(dir.path(), &zero_key()).unwrap();
    let data = pattern(4 * 1024 * 1024, 7);

    let fd = store.create("/big", 0o644).unwrap();
    store.write("/big", fd, &data, 0).unwrap();
    assert_eq!(store.read("/big", fd, data.len(), 0).unwrap(), data);
    store.release("/big", fd).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Writing then reading any payload returns it unchanged.
    #[test]
    fn write_read_round_trip(len in 0usize..40_000, seed in any::<u8>()) {
        let dir = TempDir::new().unwrap();
        let store = EncryptedStore::with_block_size(dir.path(), &zero_key(), 4096).unwrap();
        let data = pattern(len, seed);

        let fd = store.create("/f", 0o644).unwrap();
        prop_assert_eq!(store.write("/f", fd, &data, 0).unwrap(), len);
        prop_assert_eq!(store.read("/f", fd, len.max(1), 0).unwrap(), data);
        store.release("/f", fd).unwrap();
    }

    /// Overwriting `[a, b)` splices the new bytes into the old contents.
    #[test]
    fn overwrite_matches_reference(
        len in 1usize..30_000,
        x in 0usize..30_000,
        y in 0usize..30_000,
        seed in any::<u8>(),
    ) {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        let (a, b) = (a.min(len), b.min(len));

        let dir = TempDir::new().unwrap();
        let store = EncryptedStore::with_block_size(dir.path(), &zero_key(), 1024).unwrap();

        let mut reference = pattern(len, seed);
        let patch = pattern(b - a, seed.wrapping_add(1));

        let fd = store.create("/f", 0o644).unwrap();
        store.write("/f", fd, &reference, 0).unwrap();
        store.write("/f", fd, &patch, a as u64).unwrap();
        reference[a..b].copy_from_slice(&patch);

        prop_assert_eq!(store.read("/f", fd, len, 0).unwrap(), reference);
        store.release("/f", fd).unwrap();
    }

    /// A write past the end zero-fills the gap.
    #[test]
    fn gap_writes_zero_fill(
        initial in 0usize..5_000,
        gap in 1usize..50_000,
        tail in 1usize..2_000,
        seed in any::<u8>(),
    ) {
        let dir = TempDir::new().unwrap();
        let store = EncryptedStore::with_block_size(dir.path(), &zero_key(), 4096).unwrap();

        let head = pattern(initial, seed);
        let data = pattern(tail, seed.wrapping_add(1));

        let fd = store.create("/f", 0o644).unwrap();
        store.write("/f", fd, &head, 0).unwrap();
        store.write("/f", fd, &data, (initial + gap) as u64).unwrap();

        let mut expected = head;
        expected.resize(initial + gap, 0);
        expected.extend_from_slice(&data);

        prop_assert_eq!(store.read("/f", fd, expected.len(), 0).unwrap(), expected);
        store.release("/f", fd).unwrap();
    }

    /// Contents are independent of the block size used while writing.
    #[test]
    fn block_size_does_not_leak_into_contents(
        len in 1usize..20_000,
        write_bs in prop::sample::select(vec![16usize, 48, 1024, 65_536]),
        read_bs in prop::sample::select(vec![16usize, 4096, 65_536]),
        cut in 0usize..20_000,
        seed in any::<u8>(),
    ) {
        let cut = cut.min(len);
        let dir = TempDir::new().unwrap();
        let key = zero_key();

        let writer = EncryptedStore::with_block_size(dir.path(), &key, write_bs).unwrap();
        let data = pattern(len, seed);
        let fd = writer.create("/f", 0o644).unwrap();
        // Two writes so the second starts mid-file at an arbitrary offset.
        writer.write("/f", fd, &data[..cut], 0).unwrap();
        writer.write("/f", fd, &data[cut..], cut as u64).unwrap();
        writer.release("/f", fd).unwrap();

        let reader = EncryptedStore::with_block_size(dir.path(), &key, read_bs).unwrap();
        prop_assert_eq!(read_back(&reader, "/f", len), data);
    }

    /// Reads clip to the logical size wherever they start.
    #[test]
    fn reads_clip_to_size(len in 1usize..10_000, offset in 0usize..20_000) {
        let dir = TempDir::new().unwrap();
        let store = EncryptedStore::with_block_size(dir.path(), &zero_key(), 1024).unwrap();
        let data = pattern(len, 3);

        let fd = store.create("/f", 0o644).unwrap();
        store.write("/f", fd, &data, 0).unwrap();

        let out = store.read("/f", fd, 777, offset as u64).unwrap();
        if offset >= len {
            prop_assert!(out.is_empty());
        } else {
            let expected = &data[offset..(offset + 777).min(len)];
            prop_assert_eq!(out, expected);
        }
        store.release("/f", fd).unwrap();
    }
}
