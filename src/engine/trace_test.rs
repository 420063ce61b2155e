use std::{collections::HashMap, fmt::Write};

use crate::{
    array::{Batch, Dtype, Sample},
    compression::{Codec, Compression, Subject},
    config::WriteOptions,
    index_map::{chunk_key, set_index_map, IndexMap},
    store::MemoryStore,
};

use super::ChunkEngine;

fn sample_bytes(seed: usize, len: usize) -> Vec<u8> {
    (0..len).map(|i| ((seed * 7 + i) % 251) as u8).collect()
}

fn arg<'a>(args: &'a HashMap<String, Vec<String>>, name: &str) -> Option<&'a str> {
    args.get(name).and_then(|v| v.first()).map(|s| s.as_str())
}

fn options(args: &HashMap<String, Vec<String>>) -> WriteOptions {
    let chunk_size = arg(args, "chunk-size")
        .map(|s| s.parse().unwrap())
        .unwrap_or(10);
    let codec = match arg(args, "codec").unwrap_or("none") {
        "none" => Codec::Uncompressed,
        "lz4" => Codec::Lz4,
        "zstd" => Codec::Zstd { level: 3 },
        c => panic!("unknown codec {}", c),
    };
    let subject = match arg(args, "subject").unwrap_or("sample") {
        "sample" => Subject::Sample,
        "chunk" => Subject::Chunk,
        s => panic!("unknown subject {}", s),
    };
    WriteOptions::new(chunk_size, Compression::new(codec, subject))
}

#[test]
fn test_engine_trace() {
    datadriven::walk("src/engine/testdata/", |f| {
        let store = MemoryStore::new();
        let mut engine = ChunkEngine::new(store.clone());
        let mut written: HashMap<String, Vec<Vec<u8>>> = HashMap::new();
        let mut seed = 0;
        f.run(|test_case| {
            let key = arg(&test_case.args, "key").unwrap_or("t").to_owned();
            match test_case.directive.as_str() {
                "write" => {
                    let opts = options(&test_case.args);
                    let mut samples = Vec::new();
                    for line in test_case.input.lines() {
                        let len: usize = line.trim().parse().unwrap();
                        seed += 1;
                        samples.push(Sample::new(vec![len], sample_bytes(seed, len)));
                    }
                    let batch = match Batch::from_samples(Dtype::Uint8, samples) {
                        Ok(batch) => batch,
                        Err(e) => return format!("error: {}\n", e),
                    };
                    match engine.write_batch(&key, &batch, &opts) {
                        Ok(_) => {
                            let w = written.entry(key).or_default();
                            w.extend(batch.samples().iter().map(|s| s.data.clone()));
                            "ok\n".into()
                        }
                        Err(e) => format!("error: {}\n", e),
                    }
                }
                "index-map" => {
                    let im = engine.index_map(&key).unwrap();
                    if im.is_empty() {
                        return "empty\n".into();
                    }
                    let mut out = String::new();
                    for (i, e) in im.entries().iter().enumerate() {
                        writeln!(
                            &mut out,
                            "{}: chunks={:?} incomplete={:?} bytes={}..{} shape={:?}",
                            i,
                            e.chunk_names,
                            e.incomplete_chunk_names,
                            e.start_byte,
                            e.end_byte,
                            e.shape
                        )
                        .unwrap();
                    }
                    out
                }
                "chunks" => {
                    let im = engine.index_map(&key).unwrap();
                    let mut out = String::new();
                    for i in 0..im.next_chunk_index().unwrap() {
                        let name = format!("c{}", i);
                        match (*store.data).borrow().raw(&chunk_key(&key, &name)) {
                            Some(v) => writeln!(&mut out, "{}: {}", name, v.len()).unwrap(),
                            None => writeln!(&mut out, "{}: missing", name).unwrap(),
                        }
                    }
                    if out.is_empty() {
                        "none\n".into()
                    } else {
                        out
                    }
                }
                "meta" => match engine.meta(&key).unwrap() {
                    Some(m) => format!(
                        "dtype={} compression={} chunk_size={} length={}\n",
                        m.dtype, m.compression, m.chunk_size, m.length
                    ),
                    None => "none\n".into(),
                },
                "read" => {
                    let expected = written.get(&key).cloned().unwrap_or_default();
                    match engine.read_all(&key) {
                        Ok(samples) => {
                            let mut out = String::new();
                            for (i, s) in samples.iter().enumerate() {
                                let status = if expected.get(i) == Some(&s.data) {
                                    "ok"
                                } else {
                                    "mismatch"
                                };
                                writeln!(&mut out, "{}: shape={:?} {}", i, s.shape, status)
                                    .unwrap();
                            }
                            if samples.len() != expected.len() {
                                writeln!(&mut out, "expected {} samples", expected.len())
                                    .unwrap();
                            }
                            out
                        }
                        Err(e) => format!("error: {}\n", e),
                    }
                }
                "set-incomplete" => {
                    // Rewrites the last entry's incomplete chunk list.
                    let mut entries = engine.index_map(&key).unwrap().entries().to_vec();
                    if let Some(last) = entries.last_mut() {
                        last.incomplete_chunk_names = test_case
                            .input
                            .split_whitespace()
                            .map(|s| s.to_owned())
                            .collect();
                    }
                    let mut store = store.clone();
                    set_index_map(&key, &mut store, &IndexMap::from(entries)).unwrap();
                    "ok\n".into()
                }
                "crash" => {
                    let ops = arg(&test_case.args, "ops").unwrap().parse().unwrap();
                    (*store.data).borrow_mut().schedule_crash(ops);
                    "ok\n".into()
                }
                "recover" => {
                    (*store.data).borrow_mut().recover();
                    "ok\n".into()
                }
                "trace" => {
                    let mut result = String::new();
                    for event in (*store.data).borrow_mut().take_events() {
                        event.write_abbrev(&mut result).unwrap();
                        result.push('\n');
                    }
                    if test_case.args.contains_key("squelch") || result.is_empty() {
                        "ok\n".into()
                    } else {
                        result
                    }
                }
                _ => {
                    panic!("unhandled");
                }
            }
        })
    })
}
