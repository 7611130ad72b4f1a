//! Byte-level checks of the on-disk format.
//!
//! These pin the exact layout other implementations must be able to read:
//! size field, nonce placement, CTR body, and the name token format.

use std::fs;
use std::path::PathBuf;

use cloakfs_core::crypto::names::NameCodec;
use cloakfs_core::crypto::stream::StreamCipher;
use cloakfs_core::store::encrypted::{EncryptedStore, META};
use cloakfs_core::{Backend, SecretKey};
use hex_literal::hex;
use tempfile::TempDir;

fn zero_key() -> SecretKey {
    SecretKey::from_bytes([0u8; 32])
}

/// The single entry of a backing directory.
fn sole_entry(dir: &TempDir) -> PathBuf {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 1, "expected exactly one backing entry");
    entries.pop().unwrap()
}

fn nonce_of(raw: &[u8]) -> [u8; 16] {
    let mut nonce = [0u8; 16];
    nonce.copy_from_slice(&raw[8..24]);
    nonce
}

#[test]
fn header_layout_is_bit_exact() {
    let dir = TempDir::new().unwrap();
    let store = EncryptedStore::new(dir.path(), &zero_key()).unwrap();

    let fd = store.create("/a.txt", 0o644).unwrap();
    store.write("/a.txt", fd, b"hello", 0).unwrap();
    store.release("/a.txt", fd).unwrap();

    let raw = fs::read(sole_entry(&dir)).unwrap();
    // 8-byte big-endian size, 16-byte nonce, one padded AES block of body.
    assert_eq!(raw.len(), META as usize + 16);
    assert_eq!(&raw[..8], hex!("0000 0000 0000 0005"));

    // The body deciphers with the nonce from the header at counter 0.
    let cipher = StreamCipher::new(&zero_key());
    let mut body = raw[META as usize..].to_vec();
    cipher.apply(&nonce_of(&raw), 0, &mut body);
    assert_eq!(&body[..5], b"hello");
}

#[test]
fn created_empty_file_is_header_only() {
    let dir = TempDir::new().unwrap();
    let store = EncryptedStore::new(dir.path(), &zero_key()).unwrap();

    let fd = store.create("/empty", 0o644).unwrap();
    store.release("/empty", fd).unwrap();

    let raw = fs::read(sole_entry(&dir)).unwrap();
    assert_eq!(raw.len(), META as usize);
    assert_eq!(&raw[..8], hex!("0000 0000 0000 0000"));
}

#[test]
fn directory_names_are_urlsafe_tokens() {
    let dir = TempDir::new().unwrap();
    let store = EncryptedStore::new(dir.path(), &zero_key()).unwrap();

    store.mkdir("/folder", 0o755).unwrap();

    let entry = sole_entry(&dir);
    let token = entry.file_name().unwrap().to_str().unwrap();
    assert!(!token.contains('='));
    assert!(
        token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    );

    let codec = NameCodec::new(&zero_key());
    assert_eq!(codec.decrypt(token).unwrap(), "folder");

    // And the listing decodes it back.
    let names: Vec<String> = store
        .readdir("/")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["folder"]);
}

#[test]
fn nonce_is_stable_across_reopen_and_rewrite() {
    let dir = TempDir::new().unwrap();
    let store = EncryptedStore::new(dir.path(), &zero_key()).unwrap();

    let fd = store.create("/n", 0o644).unwrap();
    store.write("/n", fd, b"first", 0).unwrap();
    store.release("/n", fd).unwrap();

    let backing = sole_entry(&dir);
    let nonce = nonce_of(&fs::read(&backing).unwrap());

    for _ in 0..3 {
        let fd = store
            .open("/n", cloakfs_core::OpenFlags::read_only())
            .unwrap();
        store.read("/n", fd, 5, 0).unwrap();
        store.release("/n", fd).unwrap();
    }

    let fd = store
        .open("/n", cloakfs_core::OpenFlags::read_write())
        .unwrap();
    store.write("/n", fd, b"second pass", 2).unwrap();
    store.release("/n", fd).unwrap();
    store.truncate("/n", 4).unwrap();

    assert_eq!(nonce_of(&fs::read(&backing).unwrap()), nonce);
}

#[test]
fn fresh_files_get_distinct_nonces() {
    let dir = TempDir::new().unwrap();
    let store = EncryptedStore::new(dir.path(), &zero_key()).unwrap();

    for path in ["/one", "/two"] {
        let fd = store.create(path, 0o644).unwrap();
        store.write(path, fd, b"same plaintext", 0).unwrap();
        store.release(path, fd).unwrap();
    }

    let raws: Vec<Vec<u8>> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| fs::read(e.unwrap().path()).unwrap())
        .collect();
    assert_eq!(raws.len(), 2);
    assert_ne!(nonce_of(&raws[0]), nonce_of(&raws[1]));
    // Same plaintext, same key, different nonce: different ciphertext.
    assert_ne!(raws[0][24..], raws[1][24..]);
}

#[test]
fn truncate_shrinks_physical_body() {
    let dir = TempDir::new().unwrap();
    let store = EncryptedStore::new(dir.path(), &zero_key()).unwrap();

    let fd = store.create("/big", 0o644).unwrap();
    store.write("/big", fd, &[0xAB; 128 * 1024], 0).unwrap();
    store.release("/big", fd).unwrap();
    store.truncate("/big", 100).unwrap();

    let data = {
        let fd = store
            .open("/big", cloakfs_core::OpenFlags::read_only())
            .unwrap();
        let data = store.read("/big", fd, 200, 0).unwrap();
        store.release("/big", fd).unwrap();
        data
    };
    assert_eq!(data, vec![0xAB; 100]);

    let raw = fs::read(sole_entry(&dir)).unwrap();
    assert!(raw.len() as u64 - META <= 112);
}

#[test]
fn wrong_key_neither_decodes_names_nor_bodies() {
    let dir = TempDir::new().unwrap();
    let store = EncryptedStore::new(dir.path(), &zero_key()).unwrap();

    let fd = store.create("/s", 0o644).unwrap();
    store.write("/s", fd, b"A", 0).unwrap();
    store.release("/s", fd).unwrap();

    let other = SecretKey::from_bytes([1u8; 32]);
    let entry = sole_entry(&dir);
    let token = entry.file_name().unwrap().to_str().unwrap();
    assert!(NameCodec::new(&other).decrypt(token).is_err());

    let raw = fs::read(&entry).unwrap();
    let nonce = nonce_of(&raw);

    let mut with_right_key = raw[META as usize..].to_vec();
    StreamCipher::new(&zero_key()).apply(&nonce, 0, &mut with_right_key);
    assert_eq!(with_right_key[0], b'A');

    let mut with_wrong_key = raw[META as usize..].to_vec();
    StreamCipher::new(&other).apply(&nonce, 0, &mut with_wrong_key);
    assert_ne!(with_right_key, with_wrong_key);
}
