#![no_main]

use std::sync::Arc;

use chunksaver::{ChunkSplitter, Envelope, IoSink, MemoryStorage, MimePart, read_message};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    // First bytes pick the cap, the write size and the part layout
    let cap = usize::from(data[0]) + 1;
    let write_size = usize::from(data[1]) + 1;
    let cuts = usize::from(data[2] % 8);
    let message = &data[3..];
    let len = message.len() as u64;

    let mut positions: Vec<u64> = (1..=cuts as u64)
        .map(|i| i * len / (cuts as u64 + 1))
        .filter(|&p| p > 0)
        .collect();
    positions.dedup();

    let mut parts = vec![MimePart::new("1", 0, positions.first().copied().unwrap_or(0))];
    for (i, pair) in positions.get(1..).unwrap_or_default().chunks(2).enumerate() {
        parts.push(MimePart::new(
            format!("1.{}", i + 1),
            pair[0],
            pair.get(1).copied().unwrap_or(0),
        ));
    }

    let storage = Arc::new(MemoryStorage::new());
    let mut splitter = ChunkSplitter::new(IoSink::new(Vec::new()), storage.clone(), cap);
    let envelope = Envelope::new("a@example.com", "b@example.com").into_shared();
    envelope.write().set_mime_parts(parts);

    let id = splitter.open(envelope).unwrap();
    for piece in message.chunks(write_size) {
        assert_eq!(splitter.write(piece).unwrap(), piece.len());
    }
    assert_eq!(splitter.written(), len);
    splitter.close().unwrap();

    // Verify: pass-through is byte-exact
    assert_eq!(splitter.get_ref().get_ref().as_slice(), message);

    // Verify: the stored message reassembles to the input
    assert_eq!(read_message(&*storage, id).unwrap(), message);
});
