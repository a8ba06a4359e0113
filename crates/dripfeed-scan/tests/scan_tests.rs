use dripfeed_scan::{
    EnumerationEngine, ExtensionFilter, FeedConfig, Notification, Outcome, Playlist, RefillReport,
    TraversalMode, TraversalOrchestrator, WarningKind,
};
use filetime::FileTime;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_flat_dir(count: usize) -> TempDir {
    let temp = TempDir::new().unwrap();
    for i in 0..count {
        fs::write(temp.path().join(format!("track{i:02}.mp3")), "x").unwrap();
    }
    temp
}

fn create_nested_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    fs::create_dir_all(root.join("a/deep/deeper")).unwrap();
    fs::create_dir(root.join("b")).unwrap();
    fs::create_dir(root.join("empty")).unwrap();

    fs::write(root.join("top1.mkv"), "x").unwrap();
    fs::write(root.join("top2.mkv"), "x").unwrap();
    fs::write(root.join("a/a1.mkv"), "x").unwrap();
    fs::write(root.join("a/deep/d1.mkv"), "x").unwrap();
    fs::write(root.join("a/deep/d2.mkv"), "x").unwrap();
    fs::write(root.join("a/deep/deeper/x1.mkv"), "x").unwrap();
    fs::write(root.join("b/b1.mkv"), "x").unwrap();
    fs::write(root.join("b/b2.mkv"), "x").unwrap();

    temp
}

fn orchestrator_for(paths: &[&Path]) -> TraversalOrchestrator {
    TraversalOrchestrator::from_inputs(EnumerationEngine::default(), paths.iter().copied())
}

fn refill(
    orchestrator: &mut TraversalOrchestrator,
    budget: u64,
    mode: TraversalMode,
    playlist: &mut Playlist,
) -> RefillReport {
    let mut notifications: Vec<Notification> = Vec::new();
    let report = orchestrator
        .refill(budget, mode, playlist, &mut notifications)
        .unwrap();
    assert_eq!(notifications, vec![Notification::new(report.total_added, mode)]);
    report
}

/// Move a directory's modification time somewhere it has never been.
fn bump_mtime(dir: &Path, seconds: i64) {
    filetime::set_file_mtime(dir, FileTime::from_unix_time(seconds, 0)).unwrap();
}

#[test]
fn test_budget_respected() {
    let temp = create_nested_tree();

    for budget in 0..10u64 {
        let mut orchestrator = orchestrator_for(&[temp.path()]);
        let mut playlist = Playlist::new();
        let report = refill(&mut orchestrator, budget, TraversalMode::Append, &mut playlist);

        assert!(report.total_added <= budget);
        assert_eq!(report.total_added, budget.min(8));
        assert_eq!(playlist.len() as u64, report.total_added);
    }
}

#[test]
fn test_resumes_without_duplicates() {
    let temp = create_flat_dir(10);
    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    let mut totals = Vec::new();
    for _ in 0..4 {
        totals.push(refill(&mut orchestrator, 3, TraversalMode::Append, &mut playlist).total_added);
    }

    assert_eq!(totals, vec![3, 3, 3, 1]);
    let unique: HashSet<_> = playlist.entries().iter().collect();
    assert_eq!(unique.len(), 10);
    assert_eq!(playlist.len(), 10);
}

#[test]
fn test_resumes_nested_tree_without_duplicates() {
    let temp = create_nested_tree();
    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    let mut calls = 0;
    loop {
        calls += 1;
        let report = refill(&mut orchestrator, 3, TraversalMode::Append, &mut playlist);
        assert!(report.total_added <= 3);
        if report.roots[0].outcome == Outcome::Exhausted {
            break;
        }
        assert!(calls < 10, "traversal did not terminate");
    }

    assert_eq!(calls, 3);
    let unique: HashSet<_> = playlist.entries().iter().collect();
    assert_eq!(unique.len(), 8);
    assert_eq!(playlist.len(), 8);
    assert!(playlist.entries().contains(&temp.path().join("a/deep/deeper/x1.mkv")));
}

#[test]
fn test_paused_subdirectory_is_kept() {
    let temp = TempDir::new().unwrap();
    let sub = temp.path().join("sub");
    fs::create_dir(&sub).unwrap();
    for i in 0..3 {
        fs::write(sub.join(format!("{i}.flac")), "x").unwrap();
    }

    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();
    let report = refill(&mut orchestrator, 1, TraversalMode::Append, &mut playlist);

    assert_eq!(report.roots[0].outcome, Outcome::BudgetReached);
    let root = orchestrator.roots().next().unwrap();
    assert_eq!(root.stack().len(), 2);
}

#[test]
fn test_change_detection_restarts_directory() {
    let temp = create_flat_dir(4);
    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    let first = refill(&mut orchestrator, 2, TraversalMode::Append, &mut playlist);
    assert_eq!(first.total_added, 2);

    fs::write(temp.path().join("new.mp3"), "x").unwrap();
    bump_mtime(temp.path(), 1_000_000_000);

    let second = refill(&mut orchestrator, 100, TraversalMode::Append, &mut playlist);
    assert_eq!(second.total_added, 5);
}

#[test]
fn test_unchanged_directory_keeps_position() {
    let temp = create_flat_dir(4);
    bump_mtime(temp.path(), 1_000_000_000);
    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    refill(&mut orchestrator, 2, TraversalMode::Append, &mut playlist);
    let second = refill(&mut orchestrator, 100, TraversalMode::Append, &mut playlist);

    assert_eq!(second.total_added, 2);
}

#[test]
fn test_replace_wraps_around() {
    let temp = create_flat_dir(3);
    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    let first = refill(&mut orchestrator, 2, TraversalMode::Replace, &mut playlist);
    assert_eq!(first.total_added, 2);
    assert_eq!(playlist.len(), 2);

    let second = refill(&mut orchestrator, 2, TraversalMode::Replace, &mut playlist);
    assert_eq!(second.total_added, 2);
    assert_eq!(playlist.len(), 2);

    for _ in 0..5 {
        let report = refill(&mut orchestrator, 2, TraversalMode::Replace, &mut playlist);
        assert_eq!(report.total_added, 2);
    }
}

#[test]
fn test_replace_reads_each_file_once_per_call() {
    let temp = create_flat_dir(3);
    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    // Pause after one file so the next call starts mid-directory.
    refill(&mut orchestrator, 1, TraversalMode::Replace, &mut playlist);
    let report = refill(&mut orchestrator, 100, TraversalMode::Replace, &mut playlist);

    assert_eq!(report.total_added, 3);
    let unique: HashSet<_> = playlist.entries().iter().collect();
    assert_eq!(unique.len(), 3);
}

#[test]
fn test_replace_resumed_in_subdirectory_reads_it_once() {
    let temp = TempDir::new().unwrap();
    let sub = temp.path().join("sub");
    fs::create_dir(&sub).unwrap();
    for i in 0..3 {
        fs::write(sub.join(format!("s{i}.flac")), "x").unwrap();
    }
    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    let first = refill(&mut orchestrator, 2, TraversalMode::Replace, &mut playlist);
    assert_eq!(first.roots[0].outcome, Outcome::BudgetReached);

    // Finishing `sub` must not lead the root's wrap back into it.
    let second = refill(&mut orchestrator, 10, TraversalMode::Replace, &mut playlist);
    assert_eq!(second.total_added, 1);
    assert_eq!(playlist.entries(), &[sub.join("s2.flac")][..]);

    let third = refill(&mut orchestrator, 10, TraversalMode::Replace, &mut playlist);
    assert_eq!(third.total_added, 3);
    let unique: HashSet<_> = playlist.entries().iter().collect();
    assert_eq!(unique.len(), 3);
}

#[test]
fn test_replace_wrap_through_subdirectories_never_repeats() {
    let temp = create_nested_tree();
    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();
    let mut seen = HashSet::new();

    for _ in 0..12 {
        let report = refill(&mut orchestrator, 3, TraversalMode::Replace, &mut playlist);
        assert!(report.total_added <= 3);
        assert_eq!(playlist.len() as u64, report.total_added);

        let unique: HashSet<_> = playlist.entries().iter().cloned().collect();
        assert_eq!(unique.len(), playlist.len());
        seen.extend(unique);
    }

    assert_eq!(seen.len(), 8);
}

#[test]
fn test_change_in_paused_subdirectory_restarts_it() {
    let temp = TempDir::new().unwrap();
    let sub = temp.path().join("sub");
    fs::create_dir(&sub).unwrap();
    for i in 0..4 {
        fs::write(sub.join(format!("{i}.flac")), "x").unwrap();
    }
    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    let first = refill(&mut orchestrator, 2, TraversalMode::Append, &mut playlist);
    assert_eq!(first.roots[0].outcome, Outcome::BudgetReached);

    fs::write(sub.join("new.flac"), "x").unwrap();
    bump_mtime(&sub, 1_000_000_000);

    let second = refill(&mut orchestrator, 100, TraversalMode::Append, &mut playlist);
    assert_eq!(second.total_added, 5);
    assert_eq!(second.roots[0].outcome, Outcome::Exhausted);
}

#[test]
fn test_replace_empty_directory_reports_zero() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("nothing-here")).unwrap();
    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    for _ in 0..3 {
        let report = refill(&mut orchestrator, 5, TraversalMode::Replace, &mut playlist);
        assert_eq!(report.total_added, 0);
        assert_eq!(report.roots[0].outcome, Outcome::Exhausted);
    }
    assert!(playlist.is_empty());
}

#[test]
fn test_replace_fully_excluded_directory_reports_zero() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.srt"), "x").unwrap();
    fs::write(temp.path().join("b.SRT"), "x").unwrap();

    let config = FeedConfig::builder().exclude(vec!["srt".to_string()]).build().unwrap();
    let mut orchestrator = TraversalOrchestrator::from_inputs(EnumerationEngine::new(&config), [temp.path()]);
    let mut playlist = Playlist::new();

    let report = refill(&mut orchestrator, 5, TraversalMode::Replace, &mut playlist);
    assert_eq!(report.total_added, 0);
}

#[test]
fn test_append_terminates_until_new_files() {
    let temp = create_flat_dir(3);
    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    assert_eq!(refill(&mut orchestrator, 10, TraversalMode::Append, &mut playlist).total_added, 3);
    assert_eq!(refill(&mut orchestrator, 10, TraversalMode::Append, &mut playlist).total_added, 0);
    assert_eq!(refill(&mut orchestrator, 10, TraversalMode::Append, &mut playlist).total_added, 0);
    assert_eq!(playlist.len(), 3);

    fs::write(temp.path().join("late.mp3"), "x").unwrap();
    bump_mtime(temp.path(), 1_000_000_000);

    let report = refill(&mut orchestrator, 10, TraversalMode::Append, &mut playlist);
    assert!(report.total_added > 0);
    assert!(playlist.entries().contains(&temp.path().join("late.mp3")));
}

#[test]
fn test_exclusion_is_case_insensitive_and_uncounted() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.mp4"), "x").unwrap();
    fs::write(temp.path().join("b.SRT"), "x").unwrap();
    fs::write(temp.path().join("c.srt"), "x").unwrap();
    fs::write(temp.path().join("d.mkv"), "x").unwrap();

    let engine = EnumerationEngine::default().with_exclusion(ExtensionFilter::new(["Srt"]));
    let mut orchestrator = TraversalOrchestrator::from_inputs(engine, [temp.path()]);
    let mut playlist = Playlist::new();

    let report = refill(&mut orchestrator, 2, TraversalMode::Append, &mut playlist);
    assert_eq!(report.total_added, 2);
    assert!(playlist.entries().iter().all(|p| {
        p.extension().unwrap().to_ascii_lowercase() != "srt"
    }));
}

#[test]
fn test_mode_switch_resets_cursors() {
    let temp = TempDir::new().unwrap();
    let sub = temp.path().join("sub");
    fs::create_dir(&sub).unwrap();
    for i in 0..3 {
        fs::write(sub.join(format!("{i}.flac")), "x").unwrap();
    }

    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    refill(&mut orchestrator, 1, TraversalMode::Append, &mut playlist);
    assert_eq!(orchestrator.roots().next().unwrap().stack().len(), 2);

    refill(&mut orchestrator, 0, TraversalMode::Replace, &mut playlist);
    let root = orchestrator.roots().next().unwrap();
    assert_eq!(root.stack().len(), 1);
    assert!(root.stack().root().resume_offset().is_start());
    assert_eq!(orchestrator.last_mode(), TraversalMode::Replace);
}

#[test]
fn test_same_mode_keeps_cursors() {
    let temp = TempDir::new().unwrap();
    let sub = temp.path().join("sub");
    fs::create_dir(&sub).unwrap();
    for i in 0..3 {
        fs::write(sub.join(format!("{i}.flac")), "x").unwrap();
    }

    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    refill(&mut orchestrator, 1, TraversalMode::Append, &mut playlist);
    refill(&mut orchestrator, 1, TraversalMode::Append, &mut playlist);

    assert_eq!(playlist.len(), 2);
    let unique: HashSet<_> = playlist.entries().iter().collect();
    assert_eq!(unique.len(), 2);
}

#[test]
fn test_media_example() {
    let temp = TempDir::new().unwrap();
    let media = temp.path();
    fs::write(media.join("a.mp4"), "x").unwrap();
    fs::write(media.join("b.srt"), "x").unwrap();
    fs::write(media.join("c.mkv"), "x").unwrap();
    fs::create_dir(media.join("sub")).unwrap();
    fs::write(media.join("sub/d.mp4"), "x").unwrap();

    let mut orchestrator = orchestrator_for(&[media]);
    let mut playlist = Playlist::new();

    let first = refill(&mut orchestrator, 2, TraversalMode::Append, &mut playlist);
    assert_eq!(first.total_added, 2);
    assert_eq!(first.roots[0].outcome, Outcome::BudgetReached);

    let second = refill(&mut orchestrator, 2, TraversalMode::Append, &mut playlist);
    assert_eq!(second.total_added, 2);
    assert_eq!(second.roots[0].outcome, Outcome::Exhausted);

    let third = refill(&mut orchestrator, 2, TraversalMode::Append, &mut playlist);
    assert_eq!(third.total_added, 0);

    let emitted: HashSet<PathBuf> = playlist.entries().iter().cloned().collect();
    let expected: HashSet<PathBuf> = ["a.mp4", "b.srt", "c.mkv", "sub/d.mp4"]
        .iter()
        .map(|name| media.join(name))
        .collect();
    assert_eq!(emitted, expected);
}

#[test]
fn test_plain_files_reemitted_only_on_replace() {
    let temp = create_flat_dir(2);
    let other = TempDir::new().unwrap();
    let single = other.path().join("single.opus");
    fs::write(&single, "x").unwrap();

    let mut orchestrator = orchestrator_for(&[temp.path(), single.as_path()]);
    let mut playlist = Playlist::new();

    let report = refill(&mut orchestrator, 10, TraversalMode::Replace, &mut playlist);
    assert_eq!(report.total_added, 2);
    assert_eq!(playlist.len(), 3);
    assert!(playlist.entries().contains(&single));

    let report = refill(&mut orchestrator, 10, TraversalMode::Append, &mut playlist);
    assert_eq!(report.total_added, 2);
    assert_eq!(playlist.entries().iter().filter(|p| **p == single).count(), 1);
}

#[test]
fn test_budget_offered_to_each_root() {
    let first = create_flat_dir(3);
    let second = create_flat_dir(3);
    let mut orchestrator = orchestrator_for(&[first.path(), second.path()]);
    let mut playlist = Playlist::new();

    let report = refill(&mut orchestrator, 2, TraversalMode::Append, &mut playlist);
    assert_eq!(report.total_added, 4);
    assert_eq!(report.roots.len(), 2);
    assert!(report.roots.iter().all(|root| root.added == 2));
}

#[test]
fn test_vanished_root_does_not_stop_others() {
    let doomed = create_flat_dir(2);
    let survivor = create_flat_dir(2);
    let mut orchestrator = orchestrator_for(&[doomed.path(), survivor.path()]);
    let mut playlist = Playlist::new();

    fs::remove_dir_all(doomed.path()).unwrap();

    let report = refill(&mut orchestrator, 10, TraversalMode::Append, &mut playlist);
    assert_eq!(report.total_added, 2);
    assert_eq!(report.roots[0].added, 0);
    assert_eq!(report.roots[0].warnings[0].kind, WarningKind::OpenFailed);
}

#[test]
fn test_no_recursion() {
    let temp = create_nested_tree();
    let config = FeedConfig::builder().recurse(false).build().unwrap();
    let mut orchestrator = TraversalOrchestrator::from_inputs(EnumerationEngine::new(&config), [temp.path()]);
    let mut playlist = Playlist::new();

    let report = refill(&mut orchestrator, 100, TraversalMode::Append, &mut playlist);
    assert_eq!(report.total_added, 2);
}

#[cfg(unix)]
#[test]
fn test_symlink_loop_is_skipped() {
    let temp = create_flat_dir(2);
    std::os::unix::fs::symlink(temp.path(), temp.path().join("loop")).unwrap();

    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    let report = refill(&mut orchestrator, 100, TraversalMode::Append, &mut playlist);
    assert_eq!(report.total_added, 2);
    assert!(report.warnings().any(|w| w.kind == WarningKind::SymlinkLoop));
}

#[cfg(unix)]
#[test]
fn test_broken_symlink_is_skipped() {
    let temp = create_flat_dir(1);
    std::os::unix::fs::symlink(temp.path().join("missing"), temp.path().join("dangling")).unwrap();

    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    let report = refill(&mut orchestrator, 100, TraversalMode::Append, &mut playlist);
    assert_eq!(report.total_added, 1);
    assert!(report.warnings().any(|w| w.kind == WarningKind::MetadataError));
}

#[test]
fn test_report_serializes() {
    let temp = create_flat_dir(1);
    let mut orchestrator = orchestrator_for(&[temp.path()]);
    let mut playlist = Playlist::new();

    let report = refill(&mut orchestrator, 10, TraversalMode::Append, &mut playlist);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["mode"], "append");
    assert_eq!(json["total_added"], 1);
    assert_eq!(json["roots"][0]["outcome"], "exhausted");
}
