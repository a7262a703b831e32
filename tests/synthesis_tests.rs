use rustmutant::cache::Bookkeeping;
use rustmutant::definition::DefinitionSource;
use rustmutant::synth::BaseType;
use rustmutant::{
    BaseDraft, DataType, DeclaredType, FieldDescriptor, FieldDraft, FieldKind, MutantError,
    OrderingDraft, RelationTarget, SchemaDraft, SchemaEngine, TypeKey,
};

fn timestamped() -> DeclaredType {
    DeclaredType::new(TypeKey::new("core", "Timestamped"))
        .abstract_type()
        .field(FieldDescriptor::new("created", DataType::DateTime).nullable())
        .ordering(&["-created"])
}

#[test]
fn test_synthesis_is_deterministic() {
    let engine = SchemaEngine::builder()
        .mixin("core::Timestamped", timestamped())
        .build()
        .unwrap();

    let id = engine
        .store()
        .create_schema(
            SchemaDraft::new("shop", "Product")
                .base(BaseDraft::mixin("core::Timestamped"))
                .field(FieldDraft::new("name", FieldKind::text()))
                .field(FieldDraft::new("price", FieldKind::Float))
                .field(FieldDraft::new("sku", FieldKind::text()).unique())
                .ordering(OrderingDraft::ascending("name"))
                .unique_together(&["name", "sku"]),
        )
        .unwrap();

    let snapshot = engine.store().snapshot(id).unwrap();
    let synthesizer = engine.cache().synthesizer();
    let first = synthesizer.synthesize(&snapshot, Bookkeeping::new()).unwrap();
    let second = synthesizer.synthesize(&snapshot, Bookkeeping::new()).unwrap();

    assert_eq!(first.fields(), second.fields());
    assert_eq!(first.bases(), second.bases());
    assert_eq!(first.options(), second.options());
    assert_eq!(first.columns(), vec!["id", "created", "name", "price", "sku"]);
    assert_eq!(first.bases().last(), Some(&BaseType::DynamicMarker));
}

#[test]
fn test_round_trip_columns() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let id = engine
        .store()
        .create_schema(
            SchemaDraft::new("shop", "Item")
                .field(FieldDraft::new("b", FieldKind::text()))
                .field(FieldDraft::new("a", FieldKind::Integer).primary_key()),
        )
        .unwrap();

    let runtime = engine.handle(id).unwrap().resolve().unwrap();
    assert_eq!(runtime.columns(), vec!["a", "b"]);
    assert_eq!(runtime.primary_key().unwrap().name, "a");
    assert!(!runtime.has_implicit_primary_key());

    let columns = database.columns(runtime.table_name()).unwrap();
    let names: Vec<&str> = columns.iter().map(|column| column.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(columns[0].primary_key);
}

#[test]
fn test_verbose_names_are_derived() {
    let (engine, _) = SchemaEngine::in_memory().unwrap();
    let derived = engine
        .store()
        .create_schema(SchemaDraft::new("shop", "ShoppingCart"))
        .unwrap();
    let explicit = engine
        .store()
        .create_schema(SchemaDraft::new("shop", "Person").display_name("person", "people"))
        .unwrap();

    let cart = engine.handle(derived).unwrap().resolve().unwrap();
    assert_eq!(cart.options().verbose_name, "shopping cart");
    assert_eq!(cart.options().verbose_name_plural, "shopping carts");

    let person = engine.handle(explicit).unwrap().resolve().unwrap();
    assert_eq!(person.options().verbose_name_plural, "people");
}

#[test]
fn test_ordering_falls_back_to_base() {
    let engine = SchemaEngine::builder()
        .mixin("core::Timestamped", timestamped())
        .build()
        .unwrap();

    let inherited = engine
        .store()
        .create_schema(SchemaDraft::new("blog", "Note").base(BaseDraft::mixin("core::Timestamped")))
        .unwrap();
    let own = engine
        .store()
        .create_schema(
            SchemaDraft::new("blog", "Entry")
                .base(BaseDraft::mixin("core::Timestamped"))
                .field(FieldDraft::new("title", FieldKind::text()))
                .ordering(OrderingDraft::descending("title")),
        )
        .unwrap();

    let note = engine.handle(inherited).unwrap().resolve().unwrap();
    assert_eq!(note.options().ordering, None);
    assert_eq!(note.effective_ordering(), vec!["-created"]);

    let entry = engine.handle(own).unwrap().resolve().unwrap();
    assert_eq!(entry.effective_ordering(), vec!["-title"]);
}

#[test]
fn test_relation_to_dynamic_type_is_a_dependency() {
    let (engine, _) = SchemaEngine::in_memory().unwrap();
    let author = engine
        .store()
        .create_schema(SchemaDraft::new("blog", "Author"))
        .unwrap();
    let post = engine
        .store()
        .create_schema(SchemaDraft::new("blog", "Post").field(FieldDraft::new(
            "author",
            FieldKind::ForeignKey {
                target: RelationTarget::Schema(author),
            },
        )))
        .unwrap();

    let runtime = engine.handle(post).unwrap().resolve().unwrap();
    assert_eq!(runtime.dependencies(), &[author]);
    assert_eq!(runtime.field("author").unwrap().column, "author_id");
}

#[test]
fn test_unresolved_mixin_is_a_configuration_error() {
    let (engine, _) = SchemaEngine::in_memory().unwrap();
    let err = engine
        .store()
        .create_schema(SchemaDraft::new("shop", "Item").base(BaseDraft::mixin("core::Missing")))
        .unwrap_err();
    assert!(matches!(err, MutantError::Configuration(_)));
    assert!(engine.store().list().unwrap().is_empty());
}

#[test]
fn test_duplicate_field_name_is_rejected_at_save() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let err = engine
        .store()
        .create_schema(
            SchemaDraft::new("shop", "Item")
                .field(FieldDraft::new("name", FieldKind::text()))
                .field(FieldDraft::new("name", FieldKind::Integer)),
        )
        .unwrap_err();
    assert!(err.is_validation());
    assert!(database.journal().unwrap().is_empty());
}
