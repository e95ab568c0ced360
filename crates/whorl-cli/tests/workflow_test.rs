//! Workflow tests for the inventory commands against a local inventory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use whorl_cli::Session;
use whorl_cli::commands::get::{CandidateStatus, acquire_batch};
use whorl_cli::commands::{drop, info, list, package, use_item};
use whorl_core::traits::InventoryStore;
use whorl_core::{Error, ItemName, OwnerId};
use whorl_inventory::LocalInventory;
use whorl_package::{PackageValidator, ScaffoldOptions, create_source_tree};
use whorl_runtime::{ItemLoader, LoadRegistry};

fn item_wat(type_name: &str, description: &str, message: &str) -> String {
    format!(
        r#"(module ${type_name}
  (import "whorl" "emit" (func $emit (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "{description}")
  (data (i32.const 64) "{message}")
  (func (export "describe") (result i32 i32)
    (i32.const 0) (i32.const {description_len}))
  (func $use (export "use") (result i32)
    (call $emit (i32.const 64) (i32.const {message_len}))
    (i32.const 0)))
"#,
        description_len = description.len(),
        message_len = message.len(),
    )
}

const TRAPPING_WAT: &str = r#"(module $Bomb
  (memory (export "memory") 1)
  (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 0))
  (func $use (export "use") (result i32) unreachable))
"#;

fn loader() -> ItemLoader {
    ItemLoader::default().with_registry(Arc::new(LoadRegistry::new()))
}

struct Fixture {
    _temp: tempfile::TempDir,
    candidates: PathBuf,
    workdir: PathBuf,
    inventory: LocalInventory,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let candidates = temp.path().join("candidates");
        let workdir = temp.path().join("work");
        std::fs::create_dir(&candidates).unwrap();
        std::fs::create_dir(&workdir).unwrap();
        let inventory = LocalInventory::new(temp.path().join("inventory")).unwrap();
        Self {
            _temp: temp,
            candidates,
            workdir,
            inventory,
        }
    }

    fn session(&self) -> Session<'_> {
        Session::new(
            OwnerId::new("ada").unwrap(),
            &self.inventory,
            loader(),
            &self.workdir,
        )
    }

    fn candidate(&self, file: &str, text: &str) -> PathBuf {
        let path = self.candidates.join(file);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn lamp(&self) -> PathBuf {
        self.candidate("lamp.wat", &item_wat("Lamp", "A brass lamp.", "You rub the lamp."))
    }

    fn packaged(&self, options: &ScaffoldOptions) -> PathBuf {
        let tree = create_source_tree(&self.candidates.join("src"), options).unwrap();
        let validator = PackageValidator::with_loader(loader());
        let result = package::package_item(&tree, &self.candidates, false, validator).unwrap();
        PathBuf::from(result.archive)
    }
}

fn name(value: &str) -> ItemName {
    ItemName::new(value).unwrap()
}

fn held(fixture: &Fixture, item: &str) -> bool {
    fixture
        .inventory
        .find(&OwnerId::new("ada").unwrap(), &name(item))
        .unwrap()
        .is_some()
}

#[test]
fn test_batch_continues_past_invalid_candidate() {
    let fixture = Fixture::new();
    let paths = vec![
        fixture.lamp(),
        fixture.candidate("gadget.wat", &item_wat("Widget", "w", "w")),
        fixture.candidate("bell.wat", &item_wat("Bell", "A bell.", "Ding.")),
    ];

    let report = acquire_batch(&fixture.session(), &paths);

    assert_eq!(report.stored, 2);
    assert_eq!(report.failed, 1);
    let statuses: Vec<_> = report.candidates.iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![
            CandidateStatus::Stored,
            CandidateStatus::Failed,
            CandidateStatus::Stored
        ]
    );
    let reason = report.candidates[1].reason.as_deref().unwrap();
    assert!(reason.contains("type name does not match module name"), "{reason}");
    assert!(!report.exit_code().is_success());

    assert!(held(&fixture, "lamp"));
    assert!(held(&fixture, "bell"));
    assert!(!held(&fixture, "gadget"));
}

#[test]
fn test_second_acquisition_of_same_name_fails() {
    let fixture = Fixture::new();
    let lamp = fixture.lamp();

    let report = acquire_batch(&fixture.session(), &[lamp.clone(), lamp]);
    assert_eq!(report.stored, 1);
    assert_eq!(report.candidates[1].status, CandidateStatus::Failed);
    assert!(
        report.candidates[1]
            .reason
            .as_deref()
            .unwrap()
            .contains("already holds")
    );
}

#[test]
fn test_missing_candidate_is_reported() {
    let fixture = Fixture::new();
    let report = acquire_batch(&fixture.session(), &[fixture.candidates.join("nope.wat")]);
    assert_eq!(report.failed, 1);
    assert!(report.candidates[0].reason.is_some());
}

#[test]
fn test_archive_acquisition_uses_its_metadata() {
    let fixture = Fixture::new();
    let mut options = ScaffoldOptions::new(name("magic_lamp"), "grace");
    options.description = Some("A lamp that grants one wish.".to_string());
    options.consumable = Some(false);
    options.weight = Some(2.5);
    let archive = fixture.packaged(&options);

    let session = fixture.session();
    let report = acquire_batch(&session, &[archive]);
    assert_eq!(report.stored, 1, "{:?}", report.candidates);

    let listing = list::list_items(&session).unwrap();
    assert_eq!(listing.count, 1);
    assert_eq!(listing.items[0].display_name, "Magic Lamp");
    assert!(!listing.items[0].consumable);
    assert!((listing.total_weight - 2.5).abs() < f64::EPSILON);

    let details = info::describe_item(&session, &name("magic_lamp")).unwrap();
    assert_eq!(details.author, "grace");
    assert_eq!(details.details, "A lamp that grants one wish.");
}

#[test]
fn test_use_consumable_removes_item() {
    let fixture = Fixture::new();
    let session = fixture.session();
    acquire_batch(&session, &[fixture.lamp()]);

    let result = use_item::use_item(&session, &name("lamp"), &[]).unwrap();
    assert_eq!(result.messages, vec!["You rub the lamp."]);
    assert!(result.consumed);
    assert!(!held(&fixture, "lamp"));

    let err = use_item::use_item(&session, &name("lamp"), &[]).unwrap_err();
    assert_eq!(err.to_string(), "You don't seem to have any lamp!");
}

#[test]
fn test_use_durable_item_keeps_it() {
    let fixture = Fixture::new();
    let mut options = ScaffoldOptions::new(name("bell"), "ada");
    options.consumable = Some(false);
    let archive = fixture.packaged(&options);
    let session = fixture.session();
    acquire_batch(&session, &[archive]);

    for _ in 0..2 {
        let result = use_item::use_item(&session, &name("bell"), &[]).unwrap();
        assert_eq!(result.messages, vec!["You use the Bell."]);
        assert!(!result.consumed);
    }
    assert!(held(&fixture, "bell"));
}

#[test]
fn test_trapping_item_leaves_inventory_untouched() {
    let fixture = Fixture::new();
    let session = fixture.session();
    let report = acquire_batch(&session, &[fixture.candidate("bomb.wat", TRAPPING_WAT)]);
    assert_eq!(report.stored, 1, "{:?}", report.candidates);

    let err = use_item::use_item(&session, &name("bomb"), &[]).unwrap_err();
    assert!(err.downcast_ref::<Error>().unwrap().is_execution_error());
    assert!(held(&fixture, "bomb"));
}

#[test]
fn test_malformed_arguments_rejected_before_use() {
    let fixture = Fixture::new();
    let session = fixture.session();
    acquire_batch(&session, &[fixture.lamp()]);

    let args = ["positional".to_string()];
    assert!(use_item::use_item(&session, &name("lamp"), &args).is_err());
    assert!(held(&fixture, "lamp"));
}

#[test]
fn test_drop_writes_item_to_working_dir() {
    let fixture = Fixture::new();
    let session = fixture.session();
    let lamp = fixture.lamp();
    acquire_batch(&session, std::slice::from_ref(&lamp));

    let result = drop::drop_item(&session, &name("lamp")).unwrap();
    let dropped = fixture.workdir.join("lamp.wat");
    assert_eq!(Path::new(&result.path), dropped);
    assert_eq!(std::fs::read(&dropped).unwrap(), std::fs::read(&lamp).unwrap());
    assert!(!held(&fixture, "lamp"));

    // The dropped file can be acquired again.
    let report = acquire_batch(&session, &[dropped]);
    assert_eq!(report.stored, 1);
}

#[test]
fn test_drop_batch_continues_past_missing_item() {
    let fixture = Fixture::new();
    let session = fixture.session();
    let paths = vec![
        fixture.lamp(),
        fixture.candidate("bell.wat", &item_wat("Bell", "A bell.", "Ding.")),
    ];
    acquire_batch(&session, &paths);

    let report = drop::drop_batch(&session, &[name("lamp"), name("kettle"), name("bell")]);

    assert_eq!(report.dropped, 2);
    assert_eq!(report.failed, 1);
    assert!(!report.exit_code().is_success());
    let names: Vec<&str> = report.items.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, ["lamp", "kettle", "bell"]);
    assert!(report.items[1].result.is_none());
    assert_eq!(
        report.items[1].reason.as_deref(),
        Some("You don't seem to have any kettle!")
    );

    assert!(fixture.workdir.join("lamp.wat").is_file());
    assert!(fixture.workdir.join("bell.wat").is_file());
    assert!(!held(&fixture, "lamp"));
    assert!(!held(&fixture, "bell"));
}

#[test]
fn test_drop_batch_of_held_items_succeeds() {
    let fixture = Fixture::new();
    let session = fixture.session();
    acquire_batch(&session, &[fixture.lamp()]);

    let report = drop::drop_batch(&session, &[name("lamp")]);
    assert!(report.exit_code().is_success());
    let result = report.items[0].result.as_ref().unwrap();
    assert_eq!(Path::new(&result.path), fixture.workdir.join("lamp.wat"));
}

#[test]
fn test_drop_archive_keeps_item_when_file_exists() {
    let fixture = Fixture::new();
    let archive = fixture.packaged(&ScaffoldOptions::new(name("magic_lamp"), "ada"));
    let session = fixture.session();
    acquire_batch(&session, &[archive]);

    let existing = fixture.workdir.join("MagicLamp.whorl");
    std::fs::write(&existing, "occupied").unwrap();
    let err = drop::drop_item(&session, &name("magic_lamp")).unwrap_err();
    assert!(err.to_string().contains("refusing to overwrite"));
    assert!(held(&fixture, "magic_lamp"));

    std::fs::remove_file(&existing).unwrap();
    drop::drop_item(&session, &name("magic_lamp")).unwrap();
    assert!(whorl_codec::archive::is_archive_bytes(
        &std::fs::read(&existing).unwrap()
    ));
    assert!(!held(&fixture, "magic_lamp"));
}

#[test]
fn test_list_empty_inventory() {
    let fixture = Fixture::new();
    let listing = list::list_items(&fixture.session()).unwrap();
    assert_eq!(listing.owner, "ada");
    assert_eq!(listing.count, 0);
    assert!(listing.items.is_empty());
}
