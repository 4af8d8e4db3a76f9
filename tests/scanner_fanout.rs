//! End-to-end scanner behaviour over nested containers.

use flate2::write::GzEncoder;
use flate2::Compression;
use lc0ar::scanner::{Scanner, ScannerConfig};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::thread;
use tempfile::tempdir;

// ---------- helpers ----------

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::best());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn write_tar(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut builder = tar::Builder::new(File::create(path).unwrap());
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data.as_slice()).unwrap();
    }
    builder.finish().unwrap();
}

fn base_name(name: &str) -> String {
    Path::new(name).file_name().unwrap().to_string_lossy().into_owned()
}

// ---------- tests ----------

#[test]
fn scanner_expands_directory_tar_and_gzip() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.bin"), b"plain a").unwrap();
    write_tar(
        &dir.path().join("b.tar"),
        &[("c.bin", b"entry c".to_vec()), ("d.bin.gz", gzip(b"entry d, inflated"))],
    );
    fs::write(dir.path().join("e.bin.gz"), gzip(b"loose e, inflated")).unwrap();

    let scanner = Scanner::new(ScannerConfig::default()).unwrap();
    let output = scanner.output();
    let consumer = thread::spawn(move || output.iter().collect::<Vec<_>>());

    scanner.add_input(dir.path());
    let stats = scanner.close();
    let records = consumer.join().unwrap();

    assert_eq!(records.len(), 4);
    assert_eq!(stats.records, 4);
    assert_eq!(stats.skipped, 0);

    let by_name: HashMap<String, Vec<u8>> = records.into_iter().map(|r| (base_name(&r.name), r.content)).collect();
    assert_eq!(by_name.len(), 4);
    assert_eq!(by_name["a.bin"], b"plain a");
    assert_eq!(by_name["c.bin"], b"entry c");
    assert_eq!(by_name["d.bin"], b"entry d, inflated");
    assert_eq!(by_name["e.bin"], b"loose e, inflated");
}

#[test]
fn tar_entries_keep_their_entry_names() {
    let dir = tempdir().unwrap();
    let tar_path = dir.path().join("games.tar");
    write_tar(&tar_path, &[("run1/game1.bin", vec![1; 10]), ("run1/game2.bin.gz", gzip(&[2; 30]))]);

    let scanner = Scanner::new(ScannerConfig { expansion_workers: 1, decompression_workers: 1, output_capacity: None }).unwrap();
    scanner.add_input(&tar_path);
    let output = scanner.output();
    scanner.close();

    let mut names: Vec<_> = output.iter().map(|r| r.name).collect();
    names.sort();
    assert_eq!(names, vec!["run1/game1.bin".to_string(), "run1/game2.bin".to_string()]);
}

#[test]
fn many_inputs_are_delivered_exactly_once() {
    let dir = tempdir().unwrap();
    let mut expected = Vec::new();
    for i in 0..40 {
        let name = format!("loose{i}.bin");
        fs::write(dir.path().join(&name), vec![i as u8; i + 1]).unwrap();
        expected.push(name);
    }
    let tar_entries: Vec<(String, Vec<u8>)> = (0..40).map(|i| (format!("t{i}.bin.gz"), gzip(&[i as u8; 64]))).collect();
    let tar_refs: Vec<(&str, Vec<u8>)> = tar_entries.iter().map(|(n, d)| (n.as_str(), d.clone())).collect();
    write_tar(&dir.path().join("bundle.tar"), &tar_refs);
    expected.extend((0..40).map(|i| format!("t{i}.bin")));
    expected.sort();

    let scanner = Scanner::new(ScannerConfig { expansion_workers: 4, decompression_workers: 3, output_capacity: Some(0) }).unwrap();
    let output = scanner.output();
    let consumer = thread::spawn(move || output.iter().map(|r| base_name(&r.name)).collect::<Vec<_>>());

    scanner.add_input(dir.path());
    scanner.close();
    let mut names = consumer.join().unwrap();
    names.sort();
    assert_eq!(names, expected);
}
