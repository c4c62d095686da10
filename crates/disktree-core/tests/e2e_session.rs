/// End-to-end scan session tests.
///
/// A session runs on its own thread and reports through a bounded channel,
/// so these tests drain with a generous deadline rather than a fixed sleep.
use disktree_core::cache::PathCache;
use disktree_core::config::ScanConfig;
use disktree_core::scanner::{CancelToken, ScanEvent, ScanSession, Scanner};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn build_test_tree(root: &Path) {
    let b = root.join("a").join("b");
    fs::create_dir_all(&b).unwrap();
    fs::create_dir_all(root.join("c")).unwrap();
    write_bytes(&root.join("a").join("file1"), 100);
    write_bytes(&b.join("file2"), 200);
    write_bytes(&root.join("c").join("file4"), 50);
    write_bytes(&root.join("file3"), 300);
}

fn write_bytes(path: &Path, n: usize) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(&vec![0u8; n]).unwrap();
}

fn scanner() -> Scanner {
    Scanner::new(&ScanConfig::default().with_workers(4), PathCache::new()).unwrap()
}

/// Collect every event until the stream closes, panicking after 30 s.
fn drain(session: &ScanSession) -> Vec<ScanEvent> {
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut events = Vec::new();
    while let Some(event) = session.recv() {
        events.push(event);
        assert!(Instant::now() < deadline, "session did not finish in time");
    }
    events
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn events_arrive_in_order_and_end_with_scan_done() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let s = scanner();
    let session = s.start_session(tmp.path().to_path_buf(), false, &CancelToken::new());
    let token = session.token();
    let events = drain(&session);
    session.join();

    assert!(events.iter().all(|e| e.token() == token));
    let (last, updates) = events.split_last().unwrap();
    let ScanEvent::ScanDone { node, .. } = last else {
        panic!("last event was not ScanDone: {last:?}");
    };
    assert!(updates
        .iter()
        .all(|e| matches!(e, ScanEvent::ChildUpdate { .. })));

    // One update per file, two per directory.
    assert_eq!(updates.len(), 1 + 2 * 2);

    // Each directory's placeholder precedes its final update.
    for dir in ["a", "c"] {
        let target = tmp.path().join(dir);
        let sizes: Vec<Option<u64>> = updates
            .iter()
            .filter_map(|e| match e {
                ScanEvent::ChildUpdate { child, parent, .. } if child.path == target => {
                    assert_eq!(parent, tmp.path());
                    Some(child.size)
                }
                _ => None,
            })
            .collect();
        assert_eq!(sizes.len(), 2, "{dir}");
        assert_eq!(sizes[0], None);
        assert!(sizes[1].is_some());
    }

    assert_eq!(node.size, Some(650));
    assert_eq!(node.files, 4);
    assert_eq!(node.dirs, 1);
    assert!(node.scanned);
    assert_eq!(node.children.len(), 3);
}

#[test]
fn session_result_matches_build_level() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let one_shot = scanner().build_level(tmp.path(), &CancelToken::new());

    let s = scanner();
    let session = s.start_session(tmp.path().to_path_buf(), false, &CancelToken::new());
    let done = drain(&session).pop().unwrap();
    let ScanEvent::ScanDone { node, .. } = done else {
        panic!("expected ScanDone");
    };
    assert_eq!(node.size, one_shot.size);
    assert_eq!(node.files, one_shot.files);
    assert_eq!(node.dirs, one_shot.dirs);
}

#[test]
fn finished_session_populates_cache() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let s = scanner();
    let session = s.start_session(tmp.path().to_path_buf(), false, &CancelToken::new());
    drain(&session);
    session.join();

    let cached = s.cache().get_scanned(tmp.path()).expect("cached after ScanDone");
    assert_eq!(cached.size, Some(650));
    assert_eq!(s.sessions_running(), 0);
}

#[test]
fn fast_path_answers_from_cache_without_workers() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let s = scanner();
    let first = s.start_session(tmp.path().to_path_buf(), true, &CancelToken::new());
    let first_events = drain(&first);
    first.join();
    let summaries = s.summaries_started();
    assert!(summaries > 0);

    let second = s.start_session(tmp.path().to_path_buf(), true, &CancelToken::new());
    let events = drain(&second);
    second.join();

    assert_eq!(events.len(), 1);
    let (ScanEvent::ScanDone { node: a, .. }, Some(ScanEvent::ScanDone { node: b, .. })) =
        (&events[0], first_events.last())
    else {
        panic!("expected ScanDone on both runs");
    };
    assert_eq!((a.size, a.files, a.dirs), (b.size, b.files, b.dirs));
    assert_eq!(s.summaries_started(), summaries);
}

#[test]
fn fast_path_off_rescans() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let s = scanner();
    let first = s.start_session(tmp.path().to_path_buf(), false, &CancelToken::new());
    drain(&first);
    first.join();

    write_bytes(&tmp.path().join("new"), 1_000);
    let second = s.start_session(tmp.path().to_path_buf(), false, &CancelToken::new());
    let events = drain(&second);
    second.join();

    let Some(ScanEvent::ScanDone { node, .. }) = events.last() else {
        panic!("expected ScanDone");
    };
    assert_eq!(node.size, Some(1_650));
}

#[test]
fn unreadable_root_yields_single_scan_done() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("missing");

    let s = scanner();
    let session = s.start_session(missing.clone(), false, &CancelToken::new());
    let events = drain(&session);
    session.join();

    assert_eq!(events.len(), 1);
    let ScanEvent::ScanDone { node, .. } = &events[0] else {
        panic!("expected ScanDone");
    };
    assert!(node.scanned);
    assert!(node.error.is_some());
    assert_eq!(node.size, Some(0));
    assert!(s.cache().get(&missing).is_none());
}

#[test]
fn cancelled_session_sends_no_scan_done() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let parent = CancelToken::new();
    parent.cancel();

    let s = scanner();
    let session = s.start_session(tmp.path().to_path_buf(), false, &parent);
    assert!(session.is_cancelled());
    let events = drain(&session);
    session.join();

    assert!(events
        .iter()
        .all(|e| !matches!(e, ScanEvent::ScanDone { .. })));
    assert!(s.cache().get(tmp.path()).is_none());
    assert_eq!(s.sessions_running(), 0);
}

#[test]
fn detached_session_still_caches_result() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let s = scanner();
    let session = s.start_session(tmp.path().to_path_buf(), false, &CancelToken::new());
    session.detach();

    let deadline = Instant::now() + Duration::from_secs(30);
    while s.cache().get_scanned(tmp.path()).is_none() {
        assert!(Instant::now() < deadline, "detached session never cached");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn full_channel_blocks_instead_of_dropping() {
    let tmp = TempDir::new().unwrap();
    for i in 0..200 {
        write_bytes(&tmp.path().join(format!("f{i:03}")), 1);
    }
    for d in 0..10 {
        let dir = tmp.path().join(format!("d{d}"));
        fs::create_dir(&dir).unwrap();
        write_bytes(&dir.join("x"), 10);
        write_bytes(&dir.join("y"), 10);
    }

    let config = ScanConfig::default().with_workers(4).with_event_capacity(1);
    let s = Scanner::new(&config, PathCache::new()).unwrap();
    let session = s.start_session(tmp.path().to_path_buf(), false, &CancelToken::new());

    // Slow consumer: the producer must wait on the single slot.
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut updates = 0;
    let mut done = None;
    while let Some(event) = session.recv() {
        assert!(Instant::now() < deadline, "session did not finish in time");
        match event {
            ScanEvent::ChildUpdate { .. } => updates += 1,
            ScanEvent::ScanDone { node, .. } => done = Some(node),
        }
        if updates % 20 == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    session.join();

    // 200 files once each, 10 directories twice each.
    assert_eq!(updates, 200 + 2 * 10);
    let node = done.expect("ScanDone delivered");
    assert_eq!(node.size, Some(400));
    assert_eq!(node.files, 220);
    assert_eq!(node.children.len(), 210);
}

#[test]
fn tokens_are_unique_per_session() {
    let tmp = TempDir::new().unwrap();
    let s = scanner();
    let a = s.start_session(tmp.path().to_path_buf(), false, &CancelToken::new());
    let b = s.start_session(tmp.path().to_path_buf(), false, &CancelToken::new());
    assert_ne!(a.token(), b.token());
    a.join();
    b.join();
}
