use relay_core::StdFileSystem;
use tempfile::tempdir;

/// S4 — collision resolution: worker_dir already has A.pcap when a new
/// A.pcap arrives from source_dir; the new file must land at A-1.pcap
/// without touching the pre-existing file.
#[test]
fn pre_populated_destination_yields_numbered_sibling() {
    let dir = tempdir().unwrap();
    let source_dir = dir.path().join("source");
    let worker_dir = dir.path().join("worker");
    std::fs::create_dir_all(&source_dir).unwrap();
    std::fs::create_dir_all(&worker_dir).unwrap();

    std::fs::write(worker_dir.join("A.pcap"), vec![0u8; 5]).unwrap();
    let source = source_dir.join("A.pcap");
    std::fs::write(&source, vec![1u8; 10]).unwrap();

    let fs = StdFileSystem;
    assert!(relay_mover::move_one(&fs, &source, &worker_dir));

    assert_eq!(std::fs::metadata(worker_dir.join("A.pcap")).unwrap().len(), 5);
    assert_eq!(
        std::fs::metadata(worker_dir.join("A-1.pcap")).unwrap().len(),
        10
    );
    assert!(!source.exists());
}

/// Repeated collisions keep climbing the numbered suffix, matching the
/// idempotent-disambiguation invariant (foo, foo-1 present -> foo-2 next).
#[test]
fn repeated_collisions_climb_the_suffix() {
    let dir = tempdir().unwrap();
    let source_dir = dir.path().join("source");
    let worker_dir = dir.path().join("worker");
    std::fs::create_dir_all(&source_dir).unwrap();
    std::fs::create_dir_all(&worker_dir).unwrap();

    std::fs::write(worker_dir.join("foo.pcap"), b"0").unwrap();
    std::fs::write(worker_dir.join("foo-1.pcap"), b"1").unwrap();

    let source = source_dir.join("foo.pcap");
    std::fs::write(&source, b"2").unwrap();

    let fs = StdFileSystem;
    assert!(relay_mover::move_one(&fs, &source, &worker_dir));

    assert!(worker_dir.join("foo-2.pcap").exists());
}
