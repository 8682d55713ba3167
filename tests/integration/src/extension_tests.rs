//! Extension activation tests across the manifest, registry and plugin
//! locator seams: lifecycle states, interpreter binding and singer imports.

use pretty_assertions::assert_eq;

use vox_loader::{
    Environment, Error, ExtensionState, INFERENCE_SPEC_KEY, InferenceSpec, SINGER_SPEC_KEY,
    SingerSpec,
};
use vox_testkit::interpreter::{self, NullInterpreter, RejectingInterpreter};
use vox_testkit::library::LibraryBuilder;

fn env_with_acoustic_interpreter() -> Environment {
    vox_testkit::init_tracing();
    let env = Environment::new();
    interpreter::register(env.locator(), NullInterpreter::new("svs.Acoustic", 3));
    env
}

#[test]
fn test_specs_reach_ready_and_end_deleted() {
    let root = tempfile::tempdir().unwrap();
    let dir = LibraryBuilder::new("voice", "1.0")
        .inference("acoustic", "svs.Acoustic", 1)
        .singer("stella", &["acoustic"])
        .write(root.path());

    let env = env_with_acoustic_interpreter();
    let library = env.open_library(&dir, false).unwrap();

    for spec in library
        .extensions(INFERENCE_SPEC_KEY)
        .iter()
        .chain(library.extensions(SINGER_SPEC_KEY))
    {
        assert_eq!(spec.state(), ExtensionState::Ready);
        assert!(spec.library().is_some());
    }

    env.close_library(&library).unwrap();
    for spec in library
        .extensions(INFERENCE_SPEC_KEY)
        .iter()
        .chain(library.extensions(SINGER_SPEC_KEY))
    {
        assert_eq!(spec.state(), ExtensionState::Deleted);
    }
}

#[test]
fn test_interpreter_bound_while_loaded() {
    let root = tempfile::tempdir().unwrap();
    let dir = LibraryBuilder::new("voice", "1.0")
        .inference("acoustic", "svs.Acoustic", 2)
        .write(root.path());

    let env = env_with_acoustic_interpreter();
    let library = env.open_library(&dir, false).unwrap();

    let spec = library.extension(INFERENCE_SPEC_KEY, "acoustic").unwrap();
    let inference = spec.as_any().downcast_ref::<InferenceSpec>().unwrap();
    let interpreter = inference.interpreter().unwrap();
    assert_eq!(interpreter.class_name(), "svs.Acoustic");
    assert_eq!(inference.level(), 2);

    env.close_library(&library).unwrap();
    assert!(inference.interpreter().is_none());
}

#[test]
fn test_missing_interpreter_fails_activation() {
    let root = tempfile::tempdir().unwrap();
    let dir = LibraryBuilder::new("voice", "1.0")
        .inference("acoustic", "svs.Vocoder", 1)
        .write(root.path());

    // Only svs.Acoustic is registered.
    let env = env_with_acoustic_interpreter();
    let library = env.open_library(&dir, false).unwrap();
    assert!(!library.is_loaded());
    assert!(matches!(
        library.error(),
        Some(Error::FeatureNotSupported(_))
    ));
}

#[test]
fn test_interpreter_level_gates_activation() {
    let root = tempfile::tempdir().unwrap();
    // The registered interpreter implements level 3; level 4 is out of
    // reach.
    let dir = LibraryBuilder::new("voice", "1.0")
        .inference("acoustic", "svs.Acoustic", 4)
        .write(root.path());

    let env = env_with_acoustic_interpreter();
    let library = env.open_library(&dir, false).unwrap();
    assert!(!library.is_loaded());
    assert!(matches!(
        library.error(),
        Some(Error::FeatureNotSupported(_))
    ));
}

#[test]
fn test_interpreter_validation_failure_surfaces_as_invalid_format() {
    let root = tempfile::tempdir().unwrap();
    let dir = LibraryBuilder::new("voice", "1.0")
        .inference("acoustic", "svs.Acoustic", 1)
        .write(root.path());

    vox_testkit::init_tracing();
    let env = Environment::new();
    interpreter::register(
        env.locator(),
        RejectingInterpreter::new("svs.Acoustic", "schema rejected"),
    );

    let library = env.open_library(&dir, false).unwrap();
    assert!(!library.is_loaded());
    assert!(matches!(library.error(), Some(Error::InvalidFormat(_))));
}

#[test]
fn test_singer_import_of_sibling_inference() {
    let root = tempfile::tempdir().unwrap();
    let dir = LibraryBuilder::new("voice", "1.0")
        .inference("acoustic", "svs.Acoustic", 1)
        .singer("stella", &["acoustic"])
        .write(root.path());

    let env = env_with_acoustic_interpreter();
    let library = env.open_library(&dir, false).unwrap();
    assert!(library.is_loaded());

    let spec = library.extension(SINGER_SPEC_KEY, "stella").unwrap();
    let singer = spec.as_any().downcast_ref::<SingerSpec>().unwrap();
    assert_eq!(singer.imports().len(), 1);
    assert_eq!(singer.imports()[0].local_id(), Some("acoustic"));
}

#[test]
fn test_singer_import_of_unknown_sibling_fails() {
    let root = tempfile::tempdir().unwrap();
    let dir = LibraryBuilder::new("voice", "1.0")
        .inference("acoustic", "svs.Acoustic", 1)
        .singer("stella", &["nonexistent"])
        .write(root.path());

    let env = env_with_acoustic_interpreter();
    let library = env.open_library(&dir, false).unwrap();
    assert!(!library.is_loaded());
    assert!(matches!(library.error(), Some(Error::LibraryNotFound(_))));

    // The Ready failure unwound the already-initialized inference too.
    assert_eq!(
        library
            .extension(INFERENCE_SPEC_KEY, "acoustic")
            .unwrap()
            .state(),
        ExtensionState::Deleted
    );
}

#[test]
fn test_library_qualified_import_is_not_resolved_locally() {
    let root = tempfile::tempdir().unwrap();
    let dir = LibraryBuilder::new("voice", "1.0")
        .inference("acoustic", "svs.Acoustic", 1)
        .singer("stella", &["otherlib[1.0]/vocoder"])
        .write(root.path());

    // Qualified imports point outside the manifest; the kernel leaves them
    // to consumers and activation succeeds.
    let env = env_with_acoustic_interpreter();
    let library = env.open_library(&dir, false).unwrap();
    assert!(library.is_loaded());
}

#[test]
fn test_duplicate_extension_ids_rejected_at_parse() {
    let root = tempfile::tempdir().unwrap();
    let dir = LibraryBuilder::new("voice", "1.0")
        .inference("acoustic", "svs.Acoustic", 1)
        .inference("acoustic", "svs.Acoustic", 2)
        .write(root.path());

    let env = env_with_acoustic_interpreter();
    let err = env.open_library(&dir, false).unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));
}

#[test]
fn test_unknown_contributes_section_rejected_at_parse() {
    let root = tempfile::tempdir().unwrap();
    let dir = LibraryBuilder::new("voice", "1.0")
        .file(
            "library.json",
            r#"{ "id": "voice", "version": "1.0", "contributes": { "widgets": [] } }"#,
        )
        .write(root.path());

    let env = env_with_acoustic_interpreter();
    let err = env.open_library(&dir, false).unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));
}
