//! Blob assembly: ordering, corrupted chunks, foreign keys, and clear.

use seclog_cache::cache::decrypt_failure_marker;
use seclog_cache::names::chunk_name;
use seclog_cache::{ConfigStore, KeyProvider, LogCache, Settings};
use seclog_core::{CacheLimits, LogLevel, SeclogError};
use seclog_crypto::{InstallSecret, KdfParams};
use std::path::Path;
use tempfile::TempDir;

fn cache_with_secret(dir: &Path, fill: u8) -> LogCache {
    let settings = ConfigStore::in_memory(Settings {
        limits: CacheLimits {
            max_file_size_bytes: 1_000,
            ..Default::default()
        },
        min_level: LogLevel::Verbose,
    });
    let secret = InstallSecret::from_bytes(vec![fill; 32]).expect("secret");
    LogCache::new(dir, settings, KeyProvider::from_secret(secret, KdfParams::default()))
}

/// Three chunks holding "aaa...", "bbb...", "ccc..." (1000 bytes each).
fn three_chunks(cache: &LogCache) -> Vec<String> {
    for fill in ["a", "b", "c"] {
        cache.append(&fill.repeat(1_000)).unwrap();
    }
    let names: Vec<String> = cache.chunks().unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(names.len(), 3);
    names
}

#[test]
fn known_lines_come_back_byte_for_byte() {
    let tmp = TempDir::new().unwrap();
    let cache = cache_with_secret(tmp.path(), 1);

    let lines: Vec<String> = (0..50).map(|i| format!("line {i}: ünïcödé ok")).collect();
    for line in &lines {
        cache.append_line(line).unwrap();
    }

    let expected: String = lines.iter().map(|l| format!("{l}\n")).collect();
    assert_eq!(cache.assemble_blob().unwrap(), expected.into_bytes());
}

#[test]
fn chunks_are_ciphertext_on_disk() {
    let tmp = TempDir::new().unwrap();
    let cache = cache_with_secret(tmp.path(), 1);
    cache.append_line("card number 4111111111111111").unwrap();

    let name = cache.active_chunk().unwrap();
    let raw = std::fs::read(tmp.path().join(name)).unwrap();
    assert!(!raw.windows(4).any(|w| w == b"4111"));
}

#[test]
fn corrupted_chunk_becomes_a_marker() {
    let tmp = TempDir::new().unwrap();
    let cache = cache_with_secret(tmp.path(), 1);
    let names = three_chunks(&cache);

    // flip the last tag byte of the middle chunk
    let victim = tmp.path().join(&names[1]);
    let mut bytes = std::fs::read(&victim).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    std::fs::write(&victim, &bytes).unwrap();

    let blob = String::from_utf8(cache.assemble_blob().unwrap()).unwrap();
    let header = format!(
        "\n\n[[CHUNK DECRYPT FAILURE - {} ({} bytes)]]\n<<<<<<<<<<<<<<<<\n",
        names[1],
        bytes.len()
    );

    assert!(blob.starts_with(&"a".repeat(1_000)));
    assert!(blob.ends_with(&"c".repeat(1_000)));
    assert_eq!(blob.matches("[[CHUNK DECRYPT FAILURE").count(), 1);
    assert!(blob.contains(&header), "marker header missing in {blob:?}");
    assert!(blob.contains("decryption failed"));
    assert!(!blob.contains(&"b".repeat(10)), "no plaintext from the corrupted record");
}

#[test]
fn truncated_chunk_keeps_authenticated_prefix() {
    let tmp = TempDir::new().unwrap();
    let cache = cache_with_secret(tmp.path(), 1);

    cache.append_line("survives").unwrap();
    cache.append_line("torn write").unwrap();
    let name = cache.active_chunk().unwrap();
    cache.destroy();

    let path = tmp.path().join(&name);
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

    let cache = cache_with_secret(tmp.path(), 1);
    let blob = String::from_utf8(cache.assemble_blob().unwrap()).unwrap();
    assert!(blob.starts_with("survives\n\n\n[[CHUNK DECRYPT FAILURE - "));
    assert!(!blob.contains("torn write"));
}

#[test]
fn header_only_and_empty_files() {
    let tmp = TempDir::new().unwrap();
    let broken = chunk_name(1);
    std::fs::write(tmp.path().join(&broken), b"short").unwrap();

    let cache = cache_with_secret(tmp.path(), 1);
    cache.append("fine").unwrap();

    let blob = String::from_utf8(cache.assemble_blob().unwrap()).unwrap();
    let marker_start = format!("\n\n[[CHUNK DECRYPT FAILURE - {broken} (5 bytes)]]");
    assert!(blob.starts_with(&marker_start));
    assert!(blob.contains("truncated header"));
    assert!(blob.ends_with("fine"));
}

#[test]
fn foreign_secret_marks_every_chunk() {
    let tmp = TempDir::new().unwrap();
    {
        let cache = cache_with_secret(tmp.path(), 1);
        three_chunks(&cache);
    }

    let stranger = cache_with_secret(tmp.path(), 2);
    let chunks = stranger.chunks().unwrap();
    let blob = String::from_utf8(stranger.assemble_blob().unwrap()).unwrap();

    assert_eq!(blob.matches("[[CHUNK DECRYPT FAILURE").count(), 3);
    for chunk in &chunks {
        assert!(blob.contains(&format!("{} ({} bytes)", chunk.name, chunk.size)));
    }
}

#[test]
fn marker_is_exactly_the_documented_shape() {
    let tmp = TempDir::new().unwrap();
    let name = chunk_name(7);
    std::fs::write(tmp.path().join(&name), b"").unwrap();

    let cache = cache_with_secret(tmp.path(), 1);
    let blob = String::from_utf8(cache.assemble_blob().unwrap()).unwrap();

    let error = blob
        .split("<<<<<<<<<<<<<<<<\n")
        .nth(1)
        .and_then(|rest| rest.split("\n>>>>>>>>>>>>>>>>").next())
        .unwrap();
    assert_eq!(blob, decrypt_failure_marker(&name, 0, error));
}

#[test]
fn stray_files_are_ignored_and_cleared() {
    let tmp = TempDir::new().unwrap();
    let cache = cache_with_secret(tmp.path(), 1);
    std::fs::write(tmp.path().join("notes.txt"), b"not a chunk").unwrap();
    cache.append("data").unwrap();

    assert_eq!(cache.assemble_blob().unwrap(), b"data");
    assert!(cache.clear().unwrap());
    assert!(!tmp.path().join("notes.txt").exists());
}

#[test]
fn clear_then_assemble_is_empty() {
    let tmp = TempDir::new().unwrap();
    let cache = cache_with_secret(tmp.path(), 1);
    three_chunks(&cache);

    assert!(cache.clear().unwrap());
    assert!(cache.chunks().unwrap().is_empty());
    assert!(cache.assemble_blob().unwrap().is_empty());

    cache.append("fresh start").unwrap();
    assert_eq!(cache.assemble_blob().unwrap(), b"fresh start");
}

#[test]
fn destroyed_cache_refuses_assembly() {
    let tmp = TempDir::new().unwrap();
    let cache = cache_with_secret(tmp.path(), 1);
    cache.append("x").unwrap();
    cache.destroy();

    assert!(matches!(cache.assemble_blob(), Err(SeclogError::Destroyed)));
    assert!(!cache.clear().unwrap());
    assert!(tmp.path().read_dir().unwrap().next().is_some(), "files are left in place");
}
