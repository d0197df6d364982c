//! Several writers racing to add the same implementation.

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use depot_core::Store;
use depot_core::extract::ArchiveFileInfo;
use depot_core::manifest::digest_tree;
use depot_core::store::StoreError;
use depot_schema::{ManifestDigest, ManifestFormat, mime};
use tokio_util::sync::CancellationToken;

const WRITERS: usize = 8;

fn source_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("lib/nested")).unwrap();
    for i in 0..20 {
        fs::write(dir.path().join(format!("lib/nested/file{i}")), vec![i as u8; 1000 * i]).unwrap();
    }
    fs::write(dir.path().join("README"), b"same tree for everyone").unwrap();
    dir
}

#[test]
fn concurrent_adds_publish_one_entry() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(tmp.path().join("implementations")).unwrap();
    let source = source_tree();
    let digest = digest_tree(
        source.path(),
        &[ManifestFormat::Sha256New, ManifestFormat::Sha1New],
    )
    .unwrap();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", source.path()).unwrap();
    let tarball = tmp.path().join("tree.tar");
    fs::write(&tarball, builder.into_inner().unwrap()).unwrap();

    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let store = store.clone();
            let digest = digest.clone();
            let barrier = Arc::clone(&barrier);
            let source = source.path().to_path_buf();
            let tarball = tarball.clone();
            thread::spawn(move || {
                barrier.wait();
                if i % 2 == 0 {
                    store.add_directory(&source, &digest)
                } else {
                    let info = ArchiveFileInfo {
                        path: tarball,
                        mime_type: mime::TAR.to_string(),
                        start_offset: 0,
                        extract: None,
                        destination: None,
                    };
                    store.add_archive(&info, &digest, &CancellationToken::new())
                }
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "{results:?}");
    for result in &results {
        if let Err(e) = result {
            assert!(matches!(e, StoreError::AlreadyInStore(_)), "{e}");
        }
    }

    assert_eq!(store.list_all().unwrap().len(), 1);
    store.verify(&digest).unwrap();

    let stray: Vec<String> = fs::read_dir(store.root())
        .unwrap()
        .filter_map(|e| e.unwrap().file_name().into_string().ok())
        .filter(|n| n.starts_with('.') && n != ".locks" && n != ".aliases")
        .collect();
    assert!(stray.is_empty(), "{stray:?}");
}

#[test]
fn overlapping_digests_publish_one_entry() {
    let source = source_tree();
    let full = digest_tree(
        source.path(),
        &[ManifestFormat::Sha256New, ManifestFormat::Sha1New],
    )
    .unwrap();
    let weak = ManifestDigest::with(ManifestFormat::Sha1New, full.sha1new.clone().unwrap());

    for _ in 0..30 {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(tmp.path().join("implementations")).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [full.clone(), weak.clone()]
            .into_iter()
            .map(|digest| {
                let store = store.clone();
                let barrier = Arc::clone(&barrier);
                let source = source.path().to_path_buf();
                thread::spawn(move || {
                    barrier.wait();
                    store.add_directory(&source, &digest)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "{results:?}");
        assert_eq!(store.list_all().unwrap().len(), 1);
        assert_eq!(store.get_path(&full).unwrap(), store.get_path(&weak).unwrap());
    }
}

#[test]
fn readers_never_see_partial_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(tmp.path().join("implementations")).unwrap();
    let source = source_tree();
    let digest = digest_tree(source.path(), &[ManifestFormat::Sha256New]).unwrap();

    let reader = {
        let store = store.clone();
        let digest = digest.clone();
        thread::spawn(move || {
            for _ in 0..10_000 {
                if store.contains(&digest) {
                    // Once visible, the entry is complete.
                    store.verify(&digest).unwrap();
                    return true;
                }
            }
            false
        })
    };

    store.add_directory(source.path(), &digest).unwrap();
    reader.join().unwrap();
    store.verify(&digest).unwrap();
}
