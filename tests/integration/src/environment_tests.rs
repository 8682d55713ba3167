//! End-to-end environment tests: open, reference counting, dependency
//! resolution, duplicate and cycle handling.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use vox_loader::{Environment, Error};
use vox_testkit::interpreter::{self, NullInterpreter};
use vox_testkit::library::LibraryBuilder;

fn version(s: &str) -> vox_meta::VersionNumber {
    s.parse().unwrap()
}

fn env_with_acoustic_interpreter() -> Environment {
    vox_testkit::init_tracing();
    let env = Environment::new();
    interpreter::register(env.locator(), NullInterpreter::new("svs.Acoustic", 3));
    env
}

#[test]
fn test_open_activates_and_close_unloads() {
    let root = tempfile::tempdir().unwrap();
    let dir = LibraryBuilder::new("voice", "1.0")
        .inference("acoustic", "svs.Acoustic", 1)
        .write(root.path());

    let env = env_with_acoustic_interpreter();
    let library = env.open_library(&dir, false).unwrap();
    assert!(library.is_loaded());
    assert!(!library.has_error());
    assert_eq!(env.loaded_count(), 1);

    env.close_library(&library).unwrap();
    assert!(!library.is_loaded());
    assert_eq!(env.loaded_count(), 0);
}

#[test]
fn test_reopen_returns_the_same_handle() {
    let root = tempfile::tempdir().unwrap();
    let dir = LibraryBuilder::new("voice", "1.0").write(root.path());

    let env = env_with_acoustic_interpreter();
    let first = env.open_library(&dir, false).unwrap();
    let second = env.open_library(&dir, false).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(env.loaded_count(), 1);

    // One close per open; the library unloads only on the last one.
    env.close_library(&second).unwrap();
    assert!(first.is_loaded());
    env.close_library(&first).unwrap();
    assert!(!first.is_loaded());
    assert!(env.close_library(&first).is_err());
}

#[test]
fn test_close_of_unknown_manifest_fails() {
    let root = tempfile::tempdir().unwrap();
    let dir = LibraryBuilder::new("voice", "1.0").write(root.path());

    let env = env_with_acoustic_interpreter();
    let other_env = Environment::new();

    let library = env.open_library(&dir, false).unwrap();
    let err = other_env.close_library(&library).unwrap_err();
    assert!(matches!(err, Error::LibraryNotFound(_)));

    // The owning environment is unaffected.
    assert!(library.is_loaded());
    env.close_library(&library).unwrap();
}

#[test]
fn test_inspect_mode_returns_inert_manifest() {
    let root = tempfile::tempdir().unwrap();
    let dir = LibraryBuilder::new("voice", "1.0")
        .dependency("base[1.0]")
        .inference("acoustic", "svs.Acoustic", 1)
        .write(root.path());

    // Neither the dependency nor an interpreter exists; inspection must
    // still succeed because it resolves and activates nothing.
    let env = Environment::new();
    let library = env.open_library(&dir, true).unwrap();
    assert!(!library.is_loaded());
    assert!(!library.has_error());
    assert_eq!(env.loaded_count(), 0);
    assert_eq!(library.id(), "voice");
    assert_eq!(library.dependencies().len(), 1);
    assert_eq!(library.extension_count(), 1);

    env.close_library(&library).unwrap();
}

#[test]
fn test_duplicate_library_is_inert_but_inspectable() {
    let root = tempfile::tempdir().unwrap();
    let first_dir = LibraryBuilder::new("voice", "1.0").write_as(root.path(), "first");
    let second_dir = LibraryBuilder::new("voice", "1.0").write_as(root.path(), "second");

    let env = env_with_acoustic_interpreter();
    let first = env.open_library(&first_dir, false).unwrap();
    let second = env.open_library(&second_dir, false).unwrap();

    assert!(matches!(second.error(), Some(Error::FileDuplicated { .. })));
    assert!(!second.is_loaded());
    assert_eq!(second.id(), "voice");
    assert_eq!(env.loaded_count(), 1);

    env.close_library(&second).unwrap();
    env.close_library(&first).unwrap();
}

#[test]
fn test_transitive_dependencies_load_and_unload() {
    let root = tempfile::tempdir().unwrap();
    let libs = root.path().join("libs");
    LibraryBuilder::new("dsp", "0.4").write(&libs);
    LibraryBuilder::new("base", "1.0")
        .dependency("dsp[0.4]")
        .write(&libs);
    let app = LibraryBuilder::new("app", "1.0")
        .dependency("base[1.0]")
        .write(root.path());

    let env = env_with_acoustic_interpreter();
    env.add_library_path(&libs);

    let library = env.open_library(&app, false).unwrap();
    assert!(library.is_loaded());
    assert_eq!(env.loaded_count(), 3);
    assert!(env.find_loaded("base", &version("1.0")).is_some());
    assert!(env.find_loaded("dsp", &version("0.4")).is_some());

    env.close_library(&library).unwrap();
    assert_eq!(env.loaded_count(), 0);
}

#[test]
fn test_shared_dependency_survives_first_close() {
    let root = tempfile::tempdir().unwrap();
    let libs = root.path().join("libs");
    LibraryBuilder::new("base", "1.0").write(&libs);
    let a = LibraryBuilder::new("a", "1.0").dependency("base").write(root.path());
    let b = LibraryBuilder::new("b", "1.0").dependency("base").write(root.path());

    let env = env_with_acoustic_interpreter();
    env.add_library_path(&libs);

    let lib_a = env.open_library(&a, false).unwrap();
    let lib_b = env.open_library(&b, false).unwrap();
    let base = env.find_loaded("base", &version("1.0")).unwrap();
    assert_eq!(env.loaded_count(), 3);

    // Both dependents hold a reference to base; it unloads with the last.
    env.close_library(&lib_a).unwrap();
    assert!(base.is_loaded());
    env.close_library(&lib_b).unwrap();
    assert!(!base.is_loaded());
    assert_eq!(env.loaded_count(), 0);
}

#[test]
fn test_exact_version_wins_over_compatible_upgrade() {
    let root = tempfile::tempdir().unwrap();
    let libs = root.path().join("libs");
    LibraryBuilder::new("base", "1.0").write(&libs);
    LibraryBuilder::new("base", "1.2")
        .compat_version("1.0")
        .write(&libs);
    let app = LibraryBuilder::new("app", "1.0")
        .dependency("base[1.0]")
        .write(root.path());

    let env = env_with_acoustic_interpreter();
    env.add_library_path(&libs);

    let library = env.open_library(&app, false).unwrap();
    assert!(library.is_loaded());
    assert!(env.find_loaded("base", &version("1.0")).is_some());
    assert!(env.find_loaded("base", &version("1.2")).is_none());
}

#[test]
fn test_compatible_upgrade_satisfies_absent_exact_version() {
    let root = tempfile::tempdir().unwrap();
    let libs = root.path().join("libs");
    LibraryBuilder::new("base", "1.2")
        .compat_version("1.0")
        .write(&libs);
    let app = LibraryBuilder::new("app", "1.0")
        .dependency("base[1.0]")
        .write(root.path());

    let env = env_with_acoustic_interpreter();
    env.add_library_path(&libs);

    let library = env.open_library(&app, false).unwrap();
    assert!(library.is_loaded());
    assert!(env.find_loaded("base", &version("1.2")).is_some());
}

#[test]
fn test_incompatible_upgrade_fails_resolution() {
    let root = tempfile::tempdir().unwrap();
    let libs = root.path().join("libs");
    // 2.0 only reaches back to 1.5.
    LibraryBuilder::new("base", "2.0")
        .compat_version("1.5")
        .write(&libs);
    let app = LibraryBuilder::new("app", "1.0")
        .dependency("base[1.0]")
        .write(root.path());

    let env = env_with_acoustic_interpreter();
    env.add_library_path(&libs);

    let library = env.open_library(&app, false).unwrap();
    assert!(!library.is_loaded());
    assert!(matches!(library.error(), Some(Error::LibraryNotFound(_))));
    assert_eq!(env.loaded_count(), 0);
}

#[test]
fn test_unversioned_dependency_takes_highest() {
    let root = tempfile::tempdir().unwrap();
    let libs = root.path().join("libs");
    LibraryBuilder::new("base", "1.0").write(&libs);
    LibraryBuilder::new("base", "2.0").write(&libs);
    let app = LibraryBuilder::new("app", "1.0").dependency("base").write(root.path());

    let env = env_with_acoustic_interpreter();
    env.add_library_path(&libs);

    let library = env.open_library(&app, false).unwrap();
    assert!(library.is_loaded());
    assert!(env.find_loaded("base", &version("2.0")).is_some());
    assert!(env.find_loaded("base", &version("1.0")).is_none());
}

#[test]
fn test_dependency_cycle_reports_recursion() {
    let root = tempfile::tempdir().unwrap();
    let libs = root.path().join("libs");
    let a = LibraryBuilder::new("a", "1.0").dependency("b").write(&libs);
    LibraryBuilder::new("b", "1.0").dependency("c").write(&libs);
    LibraryBuilder::new("c", "1.0").dependency("a").write(&libs);

    let env = env_with_acoustic_interpreter();
    env.add_library_path(&libs);

    let library = env.open_library(&a, false).unwrap();
    assert!(!library.is_loaded());
    assert!(matches!(
        library.error(),
        Some(Error::RecursiveDependency { .. })
    ));
    assert_eq!(env.loaded_count(), 0);
    env.close_library(&library).unwrap();
}

#[test]
fn test_failed_dependency_unwinds_earlier_opens() {
    let root = tempfile::tempdir().unwrap();
    let libs = root.path().join("libs");
    LibraryBuilder::new("first", "1.0").write(&libs);
    let app = LibraryBuilder::new("app", "1.0")
        .dependency("first")
        .dependency("missing")
        .write(root.path());

    let env = env_with_acoustic_interpreter();
    env.add_library_path(&libs);

    let library = env.open_library(&app, false).unwrap();
    assert!(!library.is_loaded());
    assert!(matches!(library.error(), Some(Error::LibraryNotFound(_))));
    // The dependency opened before the failure was closed again.
    assert_eq!(env.loaded_count(), 0);
}
