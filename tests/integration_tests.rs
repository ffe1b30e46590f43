//! Integration tests for the refactor engine.

use refactor_engine::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const COUNTER: &str = "package p;

public class Counter {
    private int count;

    void increment() {
        count++;
    }

    int get() {
        return count;
    }

    void reset() {
        this.count = 0;
    }
}
";

const COUNTER_WITH_LOCAL: &str = "package p;

public class Counter {
    private int count;

    void increment() {
        count++;
    }

    int get() {
        int total = 1;
        return count + total;
    }

    void reset() {
        this.count = 0;
    }
}
";

fn memory_engine(files: &[(&str, &str)]) -> (Arc<MemoryStorage>, Engine) {
    let mut storage = MemoryStorage::new();
    for (path, content) in files {
        storage = storage.with_file(*path, *content);
    }
    let storage = Arc::new(storage);
    let engine = Engine::new(storage.clone(), RefactorSettings::default()).unwrap();
    (storage, engine)
}

fn name_collisions(handle: &RefactoringHandle) -> usize {
    handle
        .find_conflicts()
        .iter()
        .filter(|c| c.kind == ConflictKind::NameCollision && c.is_blocking())
        .count()
}

#[test]
fn test_rename_field_edits_declaration_and_references() {
    let (_, engine) = memory_engine(&[("src/p/Counter.java", COUNTER)]);
    let count = engine.index().resolve("p.Counter#count").unwrap();

    let handle = engine.factory().create_rename(count, "total").unwrap();
    assert_eq!(handle.plan().edits.len(), 4);
    assert!(handle.find_conflicts().is_empty());
}

#[test]
fn test_rename_round_trip_restores_text() {
    let (storage, mut engine) = memory_engine(&[("src/p/Counter.java", COUNTER)]);
    let original = storage.snapshot();

    let count = engine.index().resolve("p.Counter#count").unwrap();
    engine.factory().create_rename(count, "total").unwrap().apply().unwrap();
    let renamed = storage.read(Path::new("src/p/Counter.java")).unwrap();
    assert!(renamed.contains("private int total;"));
    assert!(renamed.contains("this.total = 0;"));
    assert!(!renamed.contains("count"));

    engine.reindex().unwrap();
    let total = engine.index().resolve("p.Counter#total").unwrap();
    engine.factory().create_rename(total, "count").unwrap().apply().unwrap();
    assert_eq!(storage.snapshot(), original);
}

#[test]
fn test_local_collision_blocks_apply_until_overridden() {
    let (storage, engine) = memory_engine(&[("src/p/Counter.java", COUNTER_WITH_LOCAL)]);
    let count = engine.index().resolve("p.Counter#count").unwrap();

    let handle = engine.factory().create_rename(count, "total").unwrap();
    assert_eq!(name_collisions(&handle), 1);
    let err = handle.apply().unwrap_err();
    assert!(matches!(err, RefactorError::BlockingConflict { count: 1, .. }));
    assert_eq!(
        storage.read(Path::new("src/p/Counter.java")).unwrap(),
        COUNTER_WITH_LOCAL
    );

    let mut handle = engine.factory().create_rename(count, "total").unwrap();
    handle.override_conflicts();
    handle.apply().unwrap();
    let after = storage.read(Path::new("src/p/Counter.java")).unwrap();
    assert!(after.contains("return total + total;"));
}

#[test]
fn test_conflicts_grow_with_shadowed_sites() {
    let more_sites = COUNTER_WITH_LOCAL.replace(
        "    void increment() {\n        count++;",
        "    void increment() {\n        int total = 0;\n        count++;",
    );
    let (_, fewer) = memory_engine(&[("src/p/Counter.java", COUNTER_WITH_LOCAL)]);
    let (_, more) = memory_engine(&[("src/p/Counter.java", more_sites.as_str())]);

    let plan = |engine: &Engine| {
        let count = engine.index().resolve("p.Counter#count").unwrap();
        name_collisions(&engine.factory().create_rename(count, "total").unwrap())
    };
    assert_eq!(plan(&fewer), 1);
    assert_eq!(plan(&more), 2);
}

#[test]
fn test_make_static_passes_receiver_as_self() {
    const POINT: &str = "package p;

public class Point {
    int x;

    int doubled() {
        return x * 2;
    }
}
";
    const PLOT: &str = "package p;

class Plot {
    int draw(Point point) {
        return point.doubled() + point.doubled();
    }
}
";
    let (_, engine) = memory_engine(&[("src/p/Point.java", POINT), ("src/p/Plot.java", PLOT)]);
    let doubled = engine.index().resolve("p.Point#doubled").unwrap();

    let handle = engine
        .factory()
        .create_make_method_static(doubled, true, None, &["x"], &["self"])
        .unwrap();
    assert!(!handle.has_blocking_conflicts(), "{:?}", handle.find_conflicts());

    let changes = handle.preview().unwrap();
    let point = changes
        .iter()
        .find(|c| c.path == Path::new("src/p/Point.java"))
        .and_then(|c| c.modified.clone())
        .unwrap();
    assert!(point.contains("static int doubled(Point self) {"));
    assert!(point.contains("return self.x * 2;"));

    let plot = changes
        .iter()
        .find(|c| c.path == Path::new("src/p/Plot.java"))
        .and_then(|c| c.modified.clone())
        .unwrap();
    assert!(plot.contains("return Point.doubled(point) + Point.doubled(point);"));
}

#[test]
fn test_storage_failure_leaves_no_edits_visible() {
    const USER: &str = "package p;

class User {
    Counter counter = new Counter();
}
";
    let (storage, engine) = memory_engine(&[
        ("src/p/Counter.java", COUNTER),
        ("src/p/User.java", USER),
    ]);
    let original = storage.snapshot();
    let counter = engine.index().resolve("p.Counter").unwrap();

    let handle = engine.factory().create_rename(counter, "Tally").unwrap();
    assert!(handle.plan().affected_files().len() >= 2);
    storage.fail_writes_after(1);

    let err = handle.apply().unwrap_err();
    assert!(matches!(err, RefactorError::StorageFailure { .. }));
    assert_eq!(storage.snapshot(), original);
}

#[test]
fn test_modified_file_makes_plan_stale() {
    let (storage, engine) = memory_engine(&[("src/p/Counter.java", COUNTER)]);
    let count = engine.index().resolve("p.Counter#count").unwrap();
    let handle = engine.factory().create_rename(count, "total").unwrap();

    let edited = COUNTER.replace("this.count = 0;", "this.count = -1;");
    storage.insert("src/p/Counter.java", edited.as_str());

    let err = handle.apply().unwrap_err();
    assert!(matches!(err, RefactorError::StaleSnapshot(_)));
    assert_eq!(storage.read(Path::new("src/p/Counter.java")).unwrap(), edited);
}

#[test]
fn test_moved_class_keeps_its_users() {
    const UTIL: &str = "package com.a;

public class Util {
    public static int twice(int x) { return x * 2; }
}
";
    const CLIENT: &str = "package com.b;

import com.a.Util;

class Client {
    int go() {
        return Util.twice(3);
    }
}
";
    let (storage, mut engine) = memory_engine(&[
        ("src/main/java/com/a/Util.java", UTIL),
        ("src/main/java/com/b/Client.java", CLIENT),
    ]);
    let util = engine.index().resolve("com.a.Util").unwrap();
    let users = |engine: &Engine, id| {
        let mut files: Vec<_> = engine
            .index()
            .references(id, &SearchScope::code_only())
            .into_iter()
            .filter(|r| r.context != ReferenceContext::Import)
            .map(|r| r.file.clone())
            .collect();
        files.dedup();
        files
    };
    let before = users(&engine, util);

    let factory = engine.factory();
    let destination = factory.create_source_folder_preserving_move_destination("com.c");
    let report = factory
        .create_move_classes_or_packages(vec![util], destination)
        .unwrap()
        .apply()
        .unwrap();
    assert_eq!(report.files_created.len(), 1);
    assert_eq!(report.files_deleted.len(), 1);
    assert!(!storage.exists(Path::new("src/main/java/com/a/Util.java")));

    engine.reindex().unwrap();
    assert!(engine.index().find("com.a.Util").is_empty());
    let moved = engine.index().resolve("com.c.Util").unwrap();
    assert_eq!(users(&engine, moved), before);
    let client = storage.read(Path::new("src/main/java/com/b/Client.java")).unwrap();
    assert!(client.contains("import com.c.Util;"));
}

#[test]
fn test_unknown_source_root_destination() {
    let (_, engine) = memory_engine(&[("src/main/java/p/Counter.java", COUNTER)]);
    let err = engine
        .factory()
        .create_source_root_move_destination("q", "lib")
        .unwrap_err();
    assert!(matches!(err, RefactorError::AmbiguousTarget { .. }));
}

#[test]
fn test_engine_open_applies_to_disk() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src/main/java/p");
    fs::create_dir_all(&src).unwrap();
    fs::create_dir_all(dir.path().join("target/classes")).unwrap();
    fs::write(src.join("Counter.java"), COUNTER).unwrap();
    fs::write(
        dir.path().join("target/classes/Counter.java"),
        "package p;\n\nclass Counter {}\n",
    )
    .unwrap();
    fs::write(
        dir.path().join(".refactor.yaml"),
        "search_in_comments: false\n",
    )
    .unwrap();

    let engine = Engine::open(dir.path()).unwrap();
    assert!(!engine.settings().search_in_comments);
    assert_eq!(engine.index().stats().files, 1);

    let counter = engine.index().resolve("p.Counter").unwrap();
    let handle = engine.factory().create_rename(counter, "Tally").unwrap();
    assert!(handle.diff(false).unwrap().contains("+public class Tally {"));
    handle.apply().unwrap();

    assert!(!src.join("Counter.java").exists());
    let renamed = fs::read_to_string(src.join("Tally.java")).unwrap();
    assert!(renamed.contains("public class Tally {"));
}

#[test]
fn test_cancelled_planning_has_no_effect() {
    let (storage, engine) = memory_engine(&[("src/p/Counter.java", COUNTER)]);
    let original = storage.snapshot();
    let count = engine.index().resolve("p.Counter#count").unwrap();

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let err = engine
        .plan_with(Rename::new(count, "total"), cancel)
        .unwrap_err();
    assert!(matches!(err, RefactorError::Cancelled));
    assert_eq!(storage.snapshot(), original);
}
