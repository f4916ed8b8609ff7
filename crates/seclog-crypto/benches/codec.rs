use std::io::Read;

use seclog_crypto::{ChunkKey, EncryptedReader, EncryptedWriter, KEY_SIZE};

fn make_line(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| b'a' + (i.wrapping_mul(7) % 26) as u8)
        .collect()
}

#[divan::bench(args = [128, 4096, 65536])]
fn bench_append_flush(bencher: divan::Bencher, size: usize) {
    let dir = tempfile::tempdir().unwrap();
    let key = ChunkKey::from_bytes([0x5Au8; KEY_SIZE]);
    let mut writer = EncryptedWriter::create(&dir.path().join("bench.log"), &key).unwrap();
    let line = make_line(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench_local(|| {
            writer.write(divan::black_box(&line));
            writer.flush().unwrap();
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_read_chunk(bencher: divan::Bencher, size: usize) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.log");
    let key = ChunkKey::from_bytes([0x5Au8; KEY_SIZE]);
    {
        let mut writer = EncryptedWriter::create(&path, &key).unwrap();
        for line in make_line(size).chunks(256) {
            writer.write(line);
            writer.flush().unwrap();
        }
        writer.close().unwrap();
    }
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut reader = EncryptedReader::open(&path, &key).unwrap();
            let mut out = Vec::with_capacity(size);
            reader.read_to_end(&mut out).unwrap();
            divan::black_box(out)
        });
}

fn main() {
    divan::main();
}
