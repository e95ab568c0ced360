//! Batch acquisition against a mocked inventory store.

use mockall::mock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use whorl_cli::Session;
use whorl_cli::commands::get::{CandidateStatus, acquire_batch};
use whorl_core::traits::{InventoryRecord, InventoryStore, StoreOutcome};
use whorl_core::{Envelope, Error, ItemDescriptor, ItemName, OwnerId, Result};
use whorl_runtime::{ItemLoader, LoadRegistry};

mock! {
    pub Store {}

    impl InventoryStore for Store {
        fn store(
            &self,
            owner: &OwnerId,
            descriptor: &ItemDescriptor,
            envelope: &Envelope,
        ) -> Result<StoreOutcome>;
        fn list(&self, owner: &OwnerId) -> Result<Vec<ItemDescriptor>>;
        fn find(&self, owner: &OwnerId, name: &ItemName) -> Result<Option<InventoryRecord>>;
        fn remove(&self, owner: &OwnerId, name: &ItemName) -> Result<()>;
    }
}

fn module(type_name: &str) -> String {
    format!(
        r#"(module ${type_name}
  (memory (export "memory") 1)
  (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 0))
  (func $use (export "use") (result i32) (i32.const 0)))
"#
    )
}

fn write_candidates(dir: &Path, files: &[(&str, &str)]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(file, type_name)| {
            let path = dir.join(file);
            std::fs::write(&path, module(type_name)).unwrap();
            path
        })
        .collect()
}

fn session<'a>(store: &'a MockStore, workdir: &Path) -> Session<'a> {
    Session::new(
        OwnerId::new("ada").unwrap(),
        store,
        ItemLoader::default().with_registry(Arc::new(LoadRegistry::new())),
        workdir,
    )
}

fn named(
    item: &'static str,
) -> impl Fn(&OwnerId, &ItemDescriptor, &Envelope) -> bool + Send + 'static {
    move |owner, descriptor, _| owner.as_str() == "ada" && descriptor.name().as_str() == item
}

#[test]
fn test_invalid_candidate_never_reaches_store() {
    let temp = tempfile::tempdir().unwrap();
    let paths = write_candidates(
        temp.path(),
        &[("first.wat", "First"), ("second.wat", "Other"), ("third.wat", "Third")],
    );

    let mut store = MockStore::new();
    store
        .expect_store()
        .withf(named("first"))
        .times(1)
        .returning(|_, _, _| Ok(StoreOutcome::Stored));
    store
        .expect_store()
        .withf(named("third"))
        .times(1)
        .returning(|_, _, _| Ok(StoreOutcome::Stored));

    let report = acquire_batch(&session(&store, temp.path()), &paths);

    assert_eq!(report.stored, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.candidates[1].status, CandidateStatus::Failed);
    assert_eq!(report.candidates[1].name.as_deref(), Some("second"));
}

#[test]
fn test_store_failure_does_not_stop_batch() {
    let temp = tempfile::tempdir().unwrap();
    let paths = write_candidates(
        temp.path(),
        &[("lamp.wat", "Lamp"), ("bell.wat", "Bell"), ("rope.wat", "Rope")],
    );

    let mut store = MockStore::new();
    store
        .expect_store()
        .withf(named("lamp"))
        .times(1)
        .returning(|_, _, _| {
            Err(Error::io(
                "inventory/ada/lamp",
                std::io::Error::other("disk full"),
            ))
        });
    store
        .expect_store()
        .withf(named("bell"))
        .times(1)
        .returning(|_, _, _| Ok(StoreOutcome::Conflict));
    store
        .expect_store()
        .withf(named("rope"))
        .times(1)
        .returning(|_, _, _| Ok(StoreOutcome::Stored));

    let report = acquire_batch(&session(&store, temp.path()), &paths);

    let statuses: Vec<_> = report.candidates.iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![
            CandidateStatus::Failed,
            CandidateStatus::Failed,
            CandidateStatus::Stored
        ]
    );
    assert!(report.candidates[0].reason.as_deref().unwrap().contains("disk full"));
    assert!(
        report.candidates[1]
            .reason
            .as_deref()
            .unwrap()
            .contains("ada already holds an item named 'bell'")
    );
}

#[test]
fn test_loose_candidate_gets_default_descriptor() {
    let temp = tempfile::tempdir().unwrap();
    let paths = write_candidates(temp.path(), &[("pebble.wat", "Pebble")]);

    let mut store = MockStore::new();
    store
        .expect_store()
        .withf(|_, descriptor, envelope| {
            descriptor.author == "ada"
                && descriptor.version == "1.0.0"
                && descriptor.consumable
                && whorl_codec::decode(envelope).unwrap() == module("Pebble").into_bytes()
        })
        .times(1)
        .returning(|_, _, _| Ok(StoreOutcome::Stored));

    let report = acquire_batch(&session(&store, temp.path()), &paths);
    assert_eq!(report.stored, 1);
}
