//! Unit tests for cfsec-kernel
//!
//! Two small entities declared with `define_entity!` exercise the generated
//! accessors, the comparator, the registry and the controller against the
//! in-memory storage.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use proptest::prelude::*;
use test_case::test_case;

use crate::controller::{AuditContext, Controller, ControllerOptions, HistoryPolicy};
use crate::entity::{Entity, ParentRef};
use crate::error::{CollisionReason, KernelError};
use crate::history::{History, HistoryKey};
use crate::index::IndexKey;
use crate::registry::{Registry, RegistryBuilder};
use crate::runtime::{MemoryHistory, MemoryTable};
use crate::traits::{Clock, HistoryTable, Inserted, StorageError, Table};
use crate::value::Value;
use crate::{AuditAction, AuditEnvelope, IdentityKey, Revision, Timestamp, compare};
use crate::{Shape, define_entity};

// ============================================================================
// Test Entities
// ============================================================================

define_entity! {
    /// Parent entity.
    pub struct Shelf("Shelf") {
        keys {}
        scalars {
            label: Text(16) ["requiredLabel"] => set_label;
        }
        indexes {
            unique "ULabelIdx" => ["label"];
        }
    }
}

define_entity! {
    /// Child entity covering every field kind.
    pub struct Gadget("Gadget") {
        keys {
            required shelf_id: Shelf ["requiredShelfId"]
                => set_shelf_id, container_shelf, set_container_shelf;
            optional spare_shelf_id: Shelf ["optionalSpareShelfId"]
                => set_spare_shelf_id, spare_shelf, set_spare_shelf;
        }
        scalars {
            name: Text(8) ["requiredName"] => set_name;
            note: OptText(12) ["optionalNote"] => set_note;
            size: SmallInt(0, 10) ["requiredSize"] => set_size;
            weight: Integer(-1000, 1000) ["requiredWeight"] => set_weight;
            active: Boolean() ["requiredActive"] => set_active;
            seen: Timestamp() ["requiredSeen"] => set_seen;
            retired: OptTimestamp() ["optionalRetired"] => set_retired;
        }
        indexes {
            index "ShelfIdx" => ["shelf_id"];
            unique "UNameIdx" => ["name"];
            index "SizeIdx" => ["size"];
        }
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

pub(crate) fn shelf_key() -> IdentityKey {
    IdentityKey::derive("Shelf", "main")
}

/// A gadget with a fresh key, on the main shelf.
pub(crate) fn gadget(name: &str, size: i16) -> Gadget {
    let mut gadget = unkeyed_gadget(name, size);
    gadget.replace_pkey(IdentityKey::generate());
    gadget
}

fn unkeyed_gadget(name: &str, size: i16) -> Gadget {
    let mut gadget = Gadget::new();
    gadget.set_shelf_id(shelf_key()).expect("non-null shelf");
    gadget.set_name(name).expect("name fits");
    gadget.set_size(size).expect("size in range");
    gadget
}

fn shelf(label: &str) -> Shelf {
    let mut shelf = Shelf::new();
    shelf.replace_pkey(IdentityKey::derive("Shelf", label));
    shelf.set_label(label).expect("label fits");
    shelf
}

fn ctx() -> AuditContext {
    AuditContext::new(
        IdentityKey::derive("Cluster", "test"),
        IdentityKey::derive("SecSession", "test"),
        IdentityKey::derive("SecUser", "tester"),
    )
}

/// Clock that ticks by one nanosecond per reading.
struct MockClock {
    now_ns: AtomicU64,
}

impl MockClock {
    fn starting_at(now_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(now_ns),
        }
    }
}

impl Clock for MockClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(self.now_ns.fetch_add(1, AtomicOrdering::SeqCst))
    }
}

/// History store whose appends always fail.
struct FailingHistory;

impl HistoryTable<Gadget> for FailingHistory {
    fn append(&self, _history: History<Gadget>) -> Result<(), StorageError> {
        Err(StorageError::Backend("history volume full".to_string()))
    }

    fn find(&self, _key: &HistoryKey) -> Result<Option<History<Gadget>>, StorageError> {
        Ok(None)
    }

    fn for_entity(&self, _key: &IdentityKey) -> Result<Vec<History<Gadget>>, StorageError> {
        Ok(vec![])
    }
}

type Interleave = Box<dyn FnOnce(&MemoryTable<Gadget>) + Send>;

/// Memory table that runs one competing write just before a named operation.
struct InterleavedTable {
    inner: Arc<MemoryTable<Gadget>>,
    pending: Mutex<Option<(&'static str, Interleave)>>,
}

impl InterleavedTable {
    fn new() -> Self {
        Self {
            inner: Arc::new(MemoryTable::new()),
            pending: Mutex::new(None),
        }
    }

    fn before(
        &self,
        operation: &'static str,
        write: impl FnOnce(&MemoryTable<Gadget>) + Send + 'static,
    ) {
        let write: Interleave = Box::new(write);
        *self.pending.lock().unwrap() = Some((operation, write));
    }

    fn interleave(&self, operation: &'static str) {
        let write = {
            let mut pending = self.pending.lock().unwrap();
            match pending.take() {
                Some((armed, write)) if armed == operation => Some(write),
                other => {
                    *pending = other;
                    None
                }
            }
        };
        if let Some(write) = write {
            write(&self.inner);
        }
    }
}

impl Table<Gadget> for InterleavedTable {
    fn find_by_key(&self, key: &IdentityKey) -> Result<Option<Gadget>, StorageError> {
        self.inner.find_by_key(key)
    }

    fn insert(&self, record: Gadget) -> Result<Inserted<Gadget>, StorageError> {
        self.interleave("insert");
        self.inner.insert(record)
    }

    fn save(&self, record: Gadget) -> Result<Gadget, StorageError> {
        self.interleave("save");
        self.inner.save(record)
    }

    fn restore(&self, record: Gadget, expected: Option<Revision>) -> Result<bool, StorageError> {
        self.interleave("restore");
        self.inner.restore(record, expected)
    }

    fn delete_by_key(&self, key: &IdentityKey) -> Result<Option<Gadget>, StorageError> {
        self.interleave("delete_by_key");
        self.inner.delete_by_key(key)
    }

    fn delete_if_revision(
        &self,
        key: &IdentityKey,
        expected: Revision,
    ) -> Result<Option<Gadget>, StorageError> {
        self.interleave("delete_if_revision");
        self.inner.delete_if_revision(key, expected)
    }

    fn find_by_index(&self, key: &IndexKey) -> Result<Vec<Gadget>, StorageError> {
        self.inner.find_by_index(key)
    }

    fn find_all(&self) -> Result<Vec<Gadget>, StorageError> {
        self.inner.find_all()
    }

    fn lock_by_key(&self, key: &IdentityKey) -> Result<Option<Gadget>, StorageError> {
        self.inner.lock_by_key(key)
    }
}

fn interleaved_controller(
    table: &Arc<InterleavedTable>,
    history: Arc<dyn HistoryTable<Gadget>>,
) -> Controller<Gadget> {
    Controller::<Gadget>::new(
        table.clone(),
        history,
        Arc::new(MockClock::starting_at(1_000)),
        ControllerOptions::default(),
    )
}

struct Fixture {
    controller: Controller<Gadget>,
    table: Arc<MemoryTable<Gadget>>,
    history: Arc<MemoryHistory<Gadget>>,
}

fn fixture_with(options: ControllerOptions) -> Fixture {
    let table = Arc::new(MemoryTable::<Gadget>::new());
    let history = Arc::new(MemoryHistory::<Gadget>::new());
    let controller = Controller::<Gadget>::new(
        table.clone(),
        history.clone(),
        Arc::new(MockClock::starting_at(1_000)),
        options,
    );
    Fixture {
        controller,
        table,
        history,
    }
}

fn fixture() -> Fixture {
    fixture_with(ControllerOptions::default())
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// ============================================================================
// Generated Entity Tests
// ============================================================================

#[test]
fn field_table_follows_declaration_order() {
    let names: Vec<&str> = Gadget::FIELDS.iter().map(|f| f.name).collect();
    assert_eq!(
        names,
        [
            "shelf_id",
            "spare_shelf_id",
            "name",
            "note",
            "size",
            "weight",
            "active",
            "seen",
            "retired"
        ]
    );
    assert_eq!(Gadget::FIELDS[0].references, Some("Shelf"));
    assert!(Gadget::FIELDS[0].required);
    assert!(!Gadget::FIELDS[1].required);
    assert_eq!(Gadget::values(&Gadget::new()).len(), Gadget::FIELDS.len());
}

#[test]
fn every_index_resolves_to_declared_fields() {
    for index in Gadget::INDEXES {
        assert!(index.positions::<Gadget>().is_ok(), "{}", index.name);
    }
    assert!(Gadget::index_def("UNameIdx").is_some_and(|i| i.unique));
    assert!(Gadget::index_def("SizeIdx").is_some_and(|i| !i.unique));
}

#[test]
fn text_setter_reports_length_and_bound() {
    let mut gadget = gadget("alpha", 1);
    let err = gadget.set_name("ninechars").unwrap_err();

    assert!(matches!(
        err,
        KernelError::ArgumentOverflow {
            method: "Gadget::set_name",
            argument: "value.length()",
            actual: 9,
            max: 8,
        }
    ));
    assert_eq!(gadget.name(), "alpha");
}

#[test]
fn optional_text_accepts_none_and_checks_some() {
    let mut gadget = gadget("alpha", 1);
    gadget.set_note(Some("short".to_string())).unwrap();
    assert_eq!(gadget.note(), Some("short"));

    assert!(gadget.set_note(Some("x".repeat(13))).is_err());
    assert_eq!(gadget.note(), Some("short"));

    gadget.set_note(None).unwrap();
    assert_eq!(gadget.note(), None);
}

#[test_case(-1, false; "below min")]
#[test_case(0, true; "min")]
#[test_case(10, true; "max")]
#[test_case(11, false; "above max")]
fn small_int_setter_enforces_range(size: i16, ok: bool) {
    let mut gadget = gadget("alpha", 5);
    assert_eq!(gadget.set_size(size).is_ok(), ok);
    assert_eq!(gadget.size(), if ok { size } else { 5 });
}

#[test]
fn integer_underflow_names_bound() {
    let mut gadget = gadget("alpha", 1);
    assert!(matches!(
        gadget.set_weight(-1001),
        Err(KernelError::ArgumentUnderflow {
            actual: -1001,
            min: -1000,
            ..
        })
    ));
}

#[test]
fn required_key_setter_rejects_null() {
    let mut gadget = gadget("alpha", 1);
    let err = gadget.set_shelf_id(IdentityKey::NULL).unwrap_err();

    assert!(matches!(
        err,
        KernelError::NullArgument {
            method: "Gadget::set_shelf_id",
            argument: "value"
        }
    ));
    assert_eq!(gadget.shelf_id(), shelf_key());
}

#[test]
fn identity_key_is_immutable_once_set() {
    let mut gadget = Gadget::new();
    let key = IdentityKey::derive("Gadget", "one");

    gadget.set_pkey(key).unwrap();
    gadget.set_pkey(key).unwrap();
    let err = gadget
        .set_pkey(IdentityKey::derive("Gadget", "two"))
        .unwrap_err();

    assert!(matches!(err, KernelError::ImmutableKey { entity: "Gadget", .. }));
    assert_eq!(gadget.pkey(), key);
}

#[test]
fn first_missing_required_skips_optional_keys() {
    let empty = Gadget::new();
    assert_eq!(
        empty.first_missing_required().map(|f| f.attr),
        Some("requiredShelfId")
    );
    assert!(gadget("alpha", 1).first_missing_required().is_none());
}

#[test]
fn assign_from_leaves_identity_audit_and_revision() {
    let mut target = gadget("alpha", 1);
    target.set_revision(Revision::new(7));
    let source = gadget("beta", 2);

    target.assign_from(&source);

    assert_eq!(target.name(), "beta");
    assert_eq!(target.size(), 2);
    assert_ne!(target.pkey(), source.pkey());
    assert_eq!(target.revision(), Revision::new(7));
}

#[test]
fn set_from_history_copies_business_fields_only() {
    let mut snapshot = gadget("alpha", 3);
    snapshot.set_revision(Revision::new(4));
    let history = History::capture(&snapshot);

    let mut live = Gadget::new();
    live.set_revision(Revision::new(9));
    live.set_from_history(&history);

    assert_eq!(live.pkey(), snapshot.pkey());
    assert_eq!(live.name(), "alpha");
    assert_eq!(live.revision(), Revision::new(9));
}

#[test]
fn records_serialize_with_serde() {
    let gadget = gadget("alpha", 3);
    let json = serde_json::to_string(&gadget).unwrap();
    let back: Gadget = serde_json::from_str(&json).unwrap();
    assert_eq!(back, gadget);
}

// ============================================================================
// Comparator Tests
// ============================================================================

#[test]
fn clone_is_equal_with_equal_hash() {
    let a = gadget("alpha", 1);
    let b = a.clone();
    assert_eq!(a, b);
    assert_eq!(a.structural_hash(), b.structural_hash());
    assert_eq!(hash_of(&a), hash_of(&b));
    assert!(a.structural_hash() <= 0x7FFF_FFFF);
}

#[test]
fn revision_is_not_part_of_the_order() {
    let a = gadget("alpha", 1);
    let mut b = a.clone();
    b.set_revision(Revision::new(5));
    assert_eq!(a.cmp(&b), Ordering::Equal);
}

#[test]
fn identity_key_orders_first() {
    let mut low = unkeyed_gadget("zzz", 9);
    low.replace_pkey(IdentityKey::from_bytes([1; 32]));
    let mut high = unkeyed_gadget("aaa", 0);
    high.replace_pkey(IdentityKey::from_bytes([2; 32]));
    assert!(low < high);
}

#[test]
fn audit_quad_orders_before_fields() {
    let mut a = gadget("zzz", 1);
    let mut b = a.clone();
    b.set_name("aaa").unwrap();
    a.set_audit(crate::AuditStamp::created(IdentityKey::NULL, Timestamp::from_nanos(1)));
    b.set_audit(crate::AuditStamp::created(IdentityKey::NULL, Timestamp::from_nanos(2)));
    assert_eq!(a.cmp(&b), Ordering::Less);
}

#[test]
fn null_optional_key_equals_sentinel() {
    let mut a = gadget("alpha", 1);
    let mut b = a.clone();
    a.set_spare_shelf_id(None);
    b.set_spare_shelf_id(Some(IdentityKey::NULL));
    assert_eq!(a, b);
    assert_eq!(a.structural_hash(), b.structural_hash());

    b.set_spare_shelf_id(Some(shelf_key()));
    assert_ne!(a, b);
    assert_eq!(a.cmp(&b), Ordering::Less);
}

#[test]
fn primary_key_shape_compares_key_only() {
    let a = gadget("alpha", 1);
    let key = a.pkey();
    assert!(a.shape_eq(Some(Shape::PrimaryKey(&key))));
    assert!(!a.shape_eq(Some(Shape::PrimaryKey(&IdentityKey::NULL))));
}

#[test]
fn index_shape_narrows_equality() {
    let a = gadget("alpha", 4);
    let b = gadget("beta", 4);
    let k = IndexKey::project(&a, "SizeIdx").unwrap();

    assert!(a.shape_eq(Some(Shape::Index(&k))));
    assert!(b.shape_eq(Some(Shape::Index(&k))));
    assert_ne!(a, b);

    let other = IndexKey::new::<Gadget>("SizeIdx", vec![Value::from(5i16)]).unwrap();
    assert_eq!(a.shape_cmp(Some(Shape::Index(&other))).unwrap(), Ordering::Less);
}

#[test]
fn foreign_index_key_is_unsupported() {
    let a = gadget("alpha", 4);
    let key = IndexKey::project(&shelf("main"), "ULabelIdx").unwrap();

    assert!(!a.shape_eq(Some(Shape::Index(&key))));
    assert!(matches!(
        a.shape_cmp(Some(Shape::Index(&key))),
        Err(KernelError::UnsupportedShape { entity: "Gadget", .. })
    ));
}

#[test]
fn history_key_shape_is_unsupported_for_records() {
    let a = gadget("alpha", 4);
    let history = History::capture(&a);

    assert!(!a.shape_eq(Some(Shape::HistoryKey(history.key()))));
    assert!(matches!(
        a.shape_cmp(Some(Shape::HistoryKey(history.key()))),
        Err(KernelError::UnsupportedShape { .. })
    ));
    assert!(history.shape_eq(Some(Shape::HistoryKey(history.key()))));
}

#[test]
fn missing_shape_orders_before() {
    let a = gadget("alpha", 4);
    assert_eq!(a.shape_cmp(None).unwrap(), Ordering::Greater);
    assert!(!a.shape_eq(None));
    assert_eq!(compare::history_cmp(&History::capture(&a), None).unwrap(), Ordering::Greater);
}

#[test]
fn record_and_its_history_are_equal() {
    let a = gadget("alpha", 4);
    let history = History::capture(&a);
    assert!(a.shape_eq(Some(Shape::History(&history))));
    assert!(history.shape_eq(Some(Shape::Record(&a))));
    assert!(history.shape_eq(Some(Shape::PrimaryKey(&a.pkey()))));
}

#[test]
fn histories_order_by_history_key_first() {
    let a = gadget("alpha", 4);
    let envelope = |nanos| AuditEnvelope {
        cluster_id: ctx().cluster_id,
        stamp: Timestamp::from_nanos(nanos),
        action: AuditAction::Update,
        session_id: ctx().session_id,
    };
    let early = History::capture(&a).with_envelope(envelope(10));
    let late = History::capture(&a).with_envelope(envelope(20));

    assert!(early < late);
    assert_ne!(early, late);
    assert_eq!(late.key().envelope(), envelope(20));
}

// ============================================================================
// Index Key Tests
// ============================================================================

#[test]
fn index_key_checks_arity() {
    let err = IndexKey::new::<Gadget>("SizeIdx", vec![]).unwrap_err();
    assert!(matches!(err, KernelError::InvalidIndexKey { index: "SizeIdx", .. }));
}

#[test]
fn index_key_checks_kind() {
    let err = IndexKey::new::<Gadget>("SizeIdx", vec![Value::from("four")]).unwrap_err();
    assert!(matches!(err, KernelError::InvalidIndexKey { .. }));
}

#[test]
fn index_key_rejects_unknown_index() {
    assert!(matches!(
        IndexKey::new::<Gadget>("NoSuchIdx", vec![]),
        Err(KernelError::UnknownIndex { entity: "Gadget", .. })
    ));
}

#[test]
fn index_key_allows_null_values() {
    let key = IndexKey::new::<Gadget>("ShelfIdx", vec![Value::Null]).unwrap();
    assert!(key.has_null());
    assert!(!key.is_unique());
}

// ============================================================================
// Registry Tests
// ============================================================================

fn registry_with_shelves(shelves: &[Shelf]) -> Registry {
    let table = Arc::new(MemoryTable::<Shelf>::new());
    for shelf in shelves {
        table.save(shelf.clone()).unwrap();
    }
    let registry = Registry::new();
    assert!(registry.configure(RegistryBuilder::new().register::<Shelf>(table)));
    registry
}

#[test]
fn lookup_before_configure_is_a_configuration_error() {
    let registry = Registry::new();
    let gadget = gadget("alpha", 1);

    assert!(matches!(
        gadget.container_shelf(&registry),
        Err(KernelError::NotConfigured { entity: "Shelf" })
    ));
}

#[test]
fn registry_configures_once() {
    let registry = registry_with_shelves(&[]);
    let again = RegistryBuilder::new().register::<Shelf>(Arc::new(MemoryTable::<Shelf>::new()));
    assert!(!registry.configure(again));
    assert!(registry.is_configured());
    assert!(matches!(
        registry.lookup::<Gadget>(),
        Err(KernelError::NotConfigured { entity: "Gadget" })
    ));
}

#[test]
fn resolver_loads_parent_by_key() {
    let main = shelf("main");
    let registry = registry_with_shelves(&[main.clone()]);
    let gadget = gadget("alpha", 1);

    let parent = gadget.container_shelf(&registry).unwrap().unwrap();
    assert_eq!(parent.label(), "main");
    assert!(gadget.spare_shelf(&registry).unwrap().is_none());
}

#[test]
fn linker_accepts_object_or_live_key() {
    let main = shelf("main");
    let spare = shelf("spare");
    let registry = registry_with_shelves(&[main.clone(), spare.clone()]);
    let mut gadget = gadget("alpha", 1);

    gadget.set_container_shelf(&registry, &spare).unwrap();
    assert_eq!(gadget.shelf_id(), spare.pkey());

    gadget.set_spare_shelf(&registry, main.pkey()).unwrap();
    assert_eq!(gadget.spare_shelf_id(), Some(main.pkey()));

    gadget
        .set_spare_shelf(&registry, ParentRef::Key(IdentityKey::NULL))
        .unwrap();
    assert_eq!(gadget.spare_shelf_id(), None);
}

#[test]
fn linker_rejects_dangling_key() {
    let registry = registry_with_shelves(&[]);
    let mut gadget = gadget("alpha", 1);
    let dangling = IdentityKey::derive("Shelf", "gone");

    let err = gadget.set_container_shelf(&registry, dangling).unwrap_err();
    assert!(matches!(
        err,
        KernelError::UnresolvedReference {
            entity: "Gadget",
            field: "requiredShelfId",
            parent: "Shelf",
            ..
        }
    ));
    assert_eq!(gadget.shelf_id(), shelf_key());
}

#[test]
fn required_linker_rejects_null_key() {
    let registry = registry_with_shelves(&[]);
    let mut gadget = gadget("alpha", 1);
    assert!(matches!(
        gadget.set_container_shelf(&registry, IdentityKey::NULL),
        Err(KernelError::NullArgument { .. })
    ));
}

// ============================================================================
// Controller Tests
// ============================================================================

#[test]
fn create_generates_key_and_stamps_audit() {
    let f = fixture();
    let mut record = unkeyed_gadget("alpha", 1);

    let stored = f.controller.create(&ctx(), &mut record).unwrap();

    assert!(!stored.pkey().is_null());
    assert_eq!(record.pkey(), stored.pkey());
    assert_eq!(stored.revision(), Revision::INITIAL);
    let audit = stored.audit();
    assert_eq!(audit.created_by, ctx().user_id);
    assert_eq!(audit.created_at, audit.updated_at);
    assert_eq!(
        f.controller.find(&stored.pkey()).unwrap().unwrap().pkey(),
        stored.pkey()
    );
}

#[test]
fn create_appends_history() {
    let f = fixture();
    let stored = f
        .controller
        .create(&ctx(), &mut unkeyed_gadget("alpha", 1))
        .unwrap();

    let history = f.controller.history(&stored.pkey()).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action(), AuditAction::Create);
    assert_eq!(history[0].key().audit_stamp, stored.audit().created_at);
    assert_eq!(history[0].key().audit_session_id, ctx().session_id);
    assert_eq!(history[0].revision(), Revision::INITIAL);
    assert!(history[0].shape_eq(Some(Shape::Record(&stored))));
}

#[test]
fn create_is_idempotent_on_existing_key() {
    let f = fixture();
    let mut first = gadget("alpha", 1);
    let mut second = first.clone();
    second.set_name("beta").unwrap();

    let a = f.controller.create(&ctx(), &mut first).unwrap();
    let b = f.controller.create(&ctx(), &mut second).unwrap();

    assert_eq!(a, b);
    assert_eq!(b.name(), "alpha");
    assert_eq!(f.table.len().unwrap(), 1);
    assert_eq!(f.history.len().unwrap(), 1);
}

#[test]
fn create_names_first_missing_required_field() {
    let f = fixture();
    let mut record = Gadget::new();
    record.set_name("alpha").unwrap();

    let err = f.controller.create(&ctx(), &mut record).unwrap_err();

    assert!(matches!(
        &err,
        KernelError::MissingRequired { field, .. } if field == "data.requiredShelfId"
    ));
    assert!(record.pkey().is_null());
    assert!(f.table.is_empty().unwrap());
}

#[test]
fn create_without_key_generation_requires_key() {
    let f = fixture_with(ControllerOptions {
        generate_missing_keys: false,
        ..ControllerOptions::default()
    });
    let err = f
        .controller
        .create(&ctx(), &mut unkeyed_gadget("alpha", 1))
        .unwrap_err();
    assert!(matches!(
        &err,
        KernelError::MissingRequired { field, .. } if field == "data.pkey"
    ));
}

#[test]
fn failed_create_rolls_back_generated_key() {
    let f = fixture();
    f.controller
        .create(&ctx(), &mut unkeyed_gadget("alpha", 1))
        .unwrap();

    let mut clash = unkeyed_gadget("alpha", 2);
    let err = f.controller.create(&ctx(), &mut clash).unwrap_err();

    assert!(matches!(
        err,
        KernelError::Storage {
            source: StorageError::UniqueViolation { .. },
            ..
        }
    ));
    assert!(clash.pkey().is_null());
    assert_eq!(clash.audit(), &crate::AuditStamp::default());
    assert_eq!(f.table.len().unwrap(), 1);
}

#[test]
fn create_undoes_row_when_history_fails() {
    let table = Arc::new(MemoryTable::<Gadget>::new());
    let controller = Controller::<Gadget>::new(
        table.clone(),
        Arc::new(FailingHistory),
        Arc::new(MockClock::starting_at(1)),
        ControllerOptions::default(),
    );

    let mut record = unkeyed_gadget("alpha", 1);
    assert!(controller.create(&ctx(), &mut record).is_err());
    assert!(record.pkey().is_null());
    assert!(table.is_empty().unwrap());
}

#[test]
fn update_advances_revision_and_records_history() {
    let f = fixture();
    let created = f
        .controller
        .create(&ctx(), &mut unkeyed_gadget("alpha", 1))
        .unwrap();

    let mut edit = created.clone();
    edit.set_size(2).unwrap();
    let updated = f.controller.update(&ctx(), &edit).unwrap();

    assert_eq!(updated.revision(), Revision::new(2));
    assert_eq!(updated.size(), 2);
    assert_eq!(updated.audit().created_at, created.audit().created_at);
    assert!(updated.audit().updated_at > created.audit().updated_at);

    let history = f.controller.history(&created.pkey()).unwrap();
    let actions: Vec<AuditAction> = history.iter().map(History::action).collect();
    assert_eq!(actions, [AuditAction::Create, AuditAction::Update]);
    assert_eq!(history[1].revision(), Revision::new(2));
}

#[test]
fn update_with_stale_revision_collides() {
    let f = fixture();
    let created = f
        .controller
        .create(&ctx(), &mut unkeyed_gadget("alpha", 1))
        .unwrap();

    let mut first = created.clone();
    first.set_size(2).unwrap();
    f.controller.update(&ctx(), &first).unwrap();

    let mut stale = created.clone();
    stale.set_size(3).unwrap();
    let err = f.controller.update(&ctx(), &stale).unwrap_err();

    assert!(matches!(
        err,
        KernelError::CollisionDetected {
            reason: CollisionReason::Stale { expected, found },
            ..
        } if expected == Revision::INITIAL && found == Revision::new(2)
    ));
    assert_eq!(f.controller.find(&created.pkey()).unwrap().unwrap().size(), 2);
}

#[test]
fn update_of_missing_row_collides() {
    let f = fixture();
    let err = f.controller.update(&ctx(), &gadget("alpha", 1)).unwrap_err();
    assert!(matches!(
        err,
        KernelError::CollisionDetected {
            reason: CollisionReason::Missing,
            ..
        }
    ));
}

#[test]
fn update_requires_key() {
    let f = fixture();
    assert!(matches!(
        f.controller.update(&ctx(), &unkeyed_gadget("alpha", 1)),
        Err(KernelError::MissingRequired { .. })
    ));
}

#[test]
fn update_restores_row_when_history_fails() {
    let f = fixture_with(ControllerOptions {
        history: HistoryPolicy {
            record_creates: false,
            ..HistoryPolicy::default()
        },
        ..ControllerOptions::default()
    });
    let created = f
        .controller
        .create(&ctx(), &mut unkeyed_gadget("alpha", 1))
        .unwrap();

    let failing = Controller::<Gadget>::new(
        f.table.clone(),
        Arc::new(FailingHistory),
        Arc::new(MockClock::starting_at(5_000)),
        ControllerOptions::default(),
    );
    let mut edit = created.clone();
    edit.set_size(9).unwrap();
    assert!(failing.update(&ctx(), &edit).is_err());

    let stored = f.table.find_by_key(&created.pkey()).unwrap().unwrap();
    assert_eq!(stored.size(), 1);
    assert_eq!(stored.revision(), Revision::INITIAL);
}

#[test]
fn delete_checks_revision_and_records_terminal_history() {
    let f = fixture();
    let created = f
        .controller
        .create(&ctx(), &mut unkeyed_gadget("alpha", 1))
        .unwrap();
    let mut edit = created.clone();
    edit.set_size(2).unwrap();
    let updated = f.controller.update(&ctx(), &edit).unwrap();

    assert!(f.controller.delete(&ctx(), &created).unwrap_err().is_collision());
    f.controller.delete(&ctx(), &updated).unwrap();

    assert!(f.controller.find(&created.pkey()).unwrap().is_none());
    let history = f.controller.history(&created.pkey()).unwrap();
    assert_eq!(history.last().map(History::action), Some(AuditAction::Delete));
}

#[test]
fn delete_by_index_removes_every_match() {
    let f = fixture();
    for (name, size) in [("a", 3), ("b", 3), ("c", 4)] {
        f.controller
            .create(&ctx(), &mut unkeyed_gadget(name, size))
            .unwrap();
    }

    let key = IndexKey::new::<Gadget>("SizeIdx", vec![3i16.into()]).unwrap();
    assert_eq!(f.controller.delete_by_index(&ctx(), &key).unwrap(), 2);
    assert_eq!(f.controller.find_all().unwrap().len(), 1);
    assert_eq!(f.history.len().unwrap(), 5);
}

#[test]
fn delete_by_key_reports_absence() {
    let f = fixture();
    assert!(!f
        .controller
        .delete_by_key(&ctx(), &IdentityKey::derive("Gadget", "none"))
        .unwrap());
}

#[test]
fn disabled_history_policy_skips_rows() {
    let f = fixture_with(ControllerOptions {
        history: HistoryPolicy {
            record_creates: false,
            record_updates: false,
            record_deletes: false,
        },
        ..ControllerOptions::default()
    });
    let created = f
        .controller
        .create(&ctx(), &mut unkeyed_gadget("alpha", 1))
        .unwrap();
    f.controller.delete(&ctx(), &created).unwrap();
    assert!(f.history.is_empty().unwrap());
}

#[test]
fn index_reads_and_locks() {
    let f = fixture();
    f.controller
        .create(&ctx(), &mut unkeyed_gadget("alpha", 3))
        .unwrap();
    f.controller
        .create(&ctx(), &mut unkeyed_gadget("beta", 3))
        .unwrap();

    let by_name = IndexKey::new::<Gadget>("UNameIdx", vec!["beta".into()]).unwrap();
    let found = f.controller.find_one_by_index(&by_name).unwrap().unwrap();
    assert_eq!(found.name(), "beta");
    assert!(f.controller.lock(&found.pkey()).unwrap().is_some());

    let by_size = IndexKey::new::<Gadget>("SizeIdx", vec![3i16.into()]).unwrap();
    assert_eq!(f.controller.lock_by_index(&by_size).unwrap().len(), 2);
}

#[test]
fn reads_reject_index_keys_of_other_entities() {
    let f = fixture();
    let key = IndexKey::project(&shelf("main"), "ULabelIdx").unwrap();
    assert!(matches!(
        f.controller.find_by_index(&key),
        Err(KernelError::InvalidIndexKey { .. })
    ));
}

#[test]
fn concurrent_updates_from_one_revision_have_one_winner() {
    let f = fixture();
    let created = f
        .controller
        .create(&ctx(), &mut unkeyed_gadget("alpha", 1))
        .unwrap();

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (2..6)
            .map(|size| {
                let controller = f.controller.clone();
                let mut edit = created.clone();
                scope.spawn(move || {
                    edit.set_size(size).unwrap();
                    controller.update(&ctx(), &edit)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(KernelError::is_collision)
    );
    let stored = f.controller.find(&created.pkey()).unwrap().unwrap();
    assert_eq!(stored.revision(), Revision::new(2));
}

#[test]
fn create_returns_row_inserted_by_a_competitor() {
    let table = Arc::new(InterleavedTable::new());
    let history = Arc::new(MemoryHistory::<Gadget>::new());
    let controller = interleaved_controller(&table, history.clone());

    let mut mine = gadget("mine", 1);
    let mut theirs = mine.clone();
    theirs.set_name("theirs").unwrap();
    table.before("insert", move |inner| {
        assert!(matches!(inner.insert(theirs).unwrap(), Inserted::Created(_)));
    });

    let stored = controller.create(&ctx(), &mut mine).unwrap();

    assert_eq!(stored.name(), "theirs");
    assert_eq!(stored.revision(), Revision::INITIAL);
    assert_eq!(mine.name(), "theirs");
    let row = table.find_by_key(&stored.pkey()).unwrap().unwrap();
    assert_eq!(row.name(), "theirs");
    assert_eq!(row.revision(), Revision::INITIAL);
    assert!(history.is_empty().unwrap());
}

#[test]
fn racing_creates_of_one_key_store_one_row() {
    let f = fixture();
    let key = IdentityKey::generate();
    let barrier = std::sync::Barrier::new(4);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|name| {
                let controller = f.controller.clone();
                let barrier = &barrier;
                scope.spawn(move || {
                    let mut record = unkeyed_gadget(name, 1);
                    record.replace_pkey(key);
                    barrier.wait();
                    controller.create(&ctx(), &mut record)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let stored = f.table.find_by_key(&key).unwrap().unwrap();
    assert_eq!(stored.revision(), Revision::INITIAL);
    assert!(results.iter().all(|r| r.as_ref().unwrap() == &stored));
    assert_eq!(f.table.len().unwrap(), 1);
    assert_eq!(f.history.len().unwrap(), 1);
}

#[test]
fn delete_refuses_row_updated_after_read() {
    let table = Arc::new(InterleavedTable::new());
    let history = Arc::new(MemoryHistory::<Gadget>::new());
    let controller = interleaved_controller(&table, history.clone());
    let created = controller
        .create(&ctx(), &mut unkeyed_gadget("alpha", 1))
        .unwrap();

    let mut winner = created.clone();
    winner.set_name("winner").unwrap();
    table.before("delete_if_revision", move |inner| {
        assert_eq!(inner.save(winner).unwrap().revision(), Revision::new(2));
    });

    let err = controller.delete(&ctx(), &created).unwrap_err();

    assert!(matches!(
        err,
        KernelError::CollisionDetected {
            reason: CollisionReason::Stale { expected, found },
            ..
        } if expected == Revision::INITIAL && found == Revision::new(2)
    ));
    let row = table.find_by_key(&created.pkey()).unwrap().unwrap();
    assert_eq!(row.name(), "winner");
    assert_eq!(history.len().unwrap(), 1);
}

#[test]
fn delete_of_missing_row_collides() {
    let f = fixture();
    let err = f.controller.delete(&ctx(), &gadget("alpha", 1)).unwrap_err();
    assert!(matches!(
        err,
        KernelError::CollisionDetected {
            reason: CollisionReason::Missing,
            ..
        }
    ));
}

#[test]
fn failed_update_keeps_a_later_write() {
    let table = Arc::new(InterleavedTable::new());
    let created = interleaved_controller(&table, Arc::new(MemoryHistory::<Gadget>::new()))
        .create(&ctx(), &mut unkeyed_gadget("alpha", 1))
        .unwrap();

    let key = created.pkey();
    table.before("restore", move |inner| {
        let mut later = inner.find_by_key(&key).unwrap().unwrap();
        later.set_name("later").unwrap();
        assert_eq!(inner.save(later).unwrap().revision(), Revision::new(3));
    });

    let failing = interleaved_controller(&table, Arc::new(FailingHistory));
    let mut edit = created.clone();
    edit.set_size(9).unwrap();
    assert!(failing.update(&ctx(), &edit).is_err());

    let row = table.find_by_key(&created.pkey()).unwrap().unwrap();
    assert_eq!(row.revision(), Revision::new(3));
    assert_eq!(row.name(), "later");
    assert_eq!(row.size(), 9);
}

#[test]
fn failed_delete_restores_row_when_key_is_still_free() {
    let table = Arc::new(MemoryTable::<Gadget>::new());
    let created = Controller::<Gadget>::new(
        table.clone(),
        Arc::new(MemoryHistory::<Gadget>::new()),
        Arc::new(MockClock::starting_at(1)),
        ControllerOptions::default(),
    )
    .create(&ctx(), &mut unkeyed_gadget("alpha", 1))
    .unwrap();

    let failing = Controller::<Gadget>::new(
        table.clone(),
        Arc::new(FailingHistory),
        Arc::new(MockClock::starting_at(5_000)),
        ControllerOptions::default(),
    );
    assert!(failing.delete(&ctx(), &created).is_err());

    assert_eq!(table.find_by_key(&created.pkey()).unwrap(), Some(created));
}

// ============================================================================
// Property Tests
// ============================================================================

fn arb_gadget() -> impl Strategy<Value = Gadget> {
    (
        0u8..3,
        "[a-c]{0,2}",
        proptest::option::of("[a-c]{0,2}"),
        0i16..=2,
        any::<bool>(),
        proptest::option::of(0u8..2),
    )
        .prop_map(|(key, name, note, size, active, spare)| {
            let mut gadget = Gadget::new();
            gadget.replace_pkey(IdentityKey::from_bytes([key; 32]));
            gadget.set_name(name).unwrap();
            gadget.set_note(note).unwrap();
            gadget.set_size(size).unwrap();
            gadget.set_active(active);
            gadget.set_spare_shelf_id(spare.map(|b| IdentityKey::from_bytes([b; 32])));
            gadget
        })
}

proptest! {
    #[test]
    fn comparator_is_antisymmetric(a in arb_gadget(), b in arb_gadget()) {
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
    }

    #[test]
    fn comparator_agrees_with_equality(a in arb_gadget(), b in arb_gadget()) {
        prop_assert_eq!(a.cmp(&b) == Ordering::Equal, a == b);
        prop_assert_eq!(a.shape_eq(Some(Shape::Record(&b))), a == b);
    }

    #[test]
    fn equal_records_hash_equal(a in arb_gadget(), b in arb_gadget()) {
        if a == b {
            prop_assert_eq!(a.structural_hash(), b.structural_hash());
        }
    }

    #[test]
    fn projection_matches_its_source(a in arb_gadget()) {
        for index in Gadget::INDEXES {
            let key = IndexKey::project(&a, index.name).unwrap();
            prop_assert!(a.shape_eq(Some(Shape::Index(&key))));
        }
    }
}
