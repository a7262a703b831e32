use rustmutant::migration::Column;
use rustmutant::{
    BaseDraft, BaseKind, DataType, DeclaredType, FieldDescriptor, FieldDraft, FieldKind, MutantError,
    RelationTarget, SchemaDraft, SchemaEngine, SchemaOperation, TypeKey, Value,
};

fn add(table: &str, column: &str) -> SchemaOperation {
    SchemaOperation::AddColumn {
        table: table.to_string(),
        column: column.to_string(),
    }
}

fn remove(table: &str, column: &str) -> SchemaOperation {
    SchemaOperation::RemoveColumn {
        table: table.to_string(),
        column: column.to_string(),
    }
}

fn alter(table: &str, from: &str, to: &str) -> SchemaOperation {
    SchemaOperation::AlterColumn {
        table: table.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn unique(table: &str, columns: &[&str], create: bool) -> SchemaOperation {
    let table = table.to_string();
    let columns = columns.iter().map(|column| column.to_string()).collect();
    if create {
        SchemaOperation::CreateUnique { table, columns }
    } else {
        SchemaOperation::DropUnique { table, columns }
    }
}

fn column<'a>(columns: &'a [Column], name: &str) -> &'a Column {
    columns
        .iter()
        .find(|column| column.name == name)
        .unwrap_or_else(|| panic!("no column {}", name))
}

#[test]
fn test_create_schema_creates_one_table() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    engine
        .store()
        .create_schema(
            SchemaDraft::new("shop", "Item")
                .field(FieldDraft::new("name", FieldKind::text()))
                .field(FieldDraft::new("price", FieldKind::Float))
                .unique_together(&["name", "price"]),
        )
        .unwrap();

    assert_eq!(
        database.journal().unwrap(),
        vec![SchemaOperation::CreateTable {
            table: "mutant_shop_item".to_string(),
            columns: vec!["id".to_string(), "name".to_string(), "price".to_string()],
        }]
    );
    assert_eq!(
        database.unique_together("mutant_shop_item").unwrap(),
        vec![vec!["name".to_string(), "price".to_string()]]
    );
}

#[test]
fn test_initial_value_fills_existing_rows_once() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let id = engine
        .store()
        .create_schema(SchemaDraft::new("shop", "Item").field(FieldDraft::new("name", FieldKind::text())))
        .unwrap();
    let handle = engine.handle(id).unwrap();
    let runtime = handle.resolve().unwrap();
    let record = handle.new_record([("name", Value::from("lamp"))]).unwrap();
    database.insert(&runtime, &record).unwrap();
    database.clear_journal().unwrap();

    let stock = engine
        .store()
        .add_field(id, FieldDraft::new("stock", FieldKind::Integer).initial_value(5i64))
        .unwrap();
    assert_eq!(database.journal().unwrap(), vec![add("mutant_shop_item", "stock")]);

    let rows = database.rows("mutant_shop_item").unwrap();
    assert_eq!(rows[0]["stock"], Value::Integer(5));

    // The initial value is gone from the definition; later alterations do
    // not see it.
    assert_eq!(engine.store().field(stock).unwrap().default, None);
    database.clear_journal().unwrap();
    engine
        .store()
        .update_field(stock, |field| field.kind = FieldKind::Float)
        .unwrap();
    assert_eq!(
        database.journal().unwrap(),
        vec![alter("mutant_shop_item", "stock", "stock")]
    );
    let rows = database.rows("mutant_shop_item").unwrap();
    assert_eq!(rows[0]["stock"], Value::Float(5.0));
}

#[test]
fn test_adding_required_field_without_default_fails_on_existing_rows() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let id = engine
        .store()
        .create_schema(SchemaDraft::new("shop", "Item").field(FieldDraft::new("name", FieldKind::text())))
        .unwrap();
    let handle = engine.handle(id).unwrap();
    let record = handle.new_record([("name", Value::from("lamp"))]).unwrap();
    database.insert(&handle.resolve().unwrap(), &record).unwrap();

    let err = engine
        .store()
        .add_field(id, FieldDraft::new("stock", FieldKind::Integer))
        .unwrap_err();
    assert!(err.is_migration());
    assert!(handle.field("stock").unwrap().is_none());
    assert_eq!(engine.store().get_schema(id).unwrap().type_name, "Item");
    assert_eq!(database.columns("mutant_shop_item").unwrap().len(), 2);
}

#[test]
fn test_cascade_issues_single_drop_table() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let id = engine
        .store()
        .create_schema(
            SchemaDraft::new("shop", "Order")
                .field(FieldDraft::new("number", FieldKind::Integer))
                .field(FieldDraft::new("customer", FieldKind::text()))
                .field(FieldDraft::new("placed", FieldKind::Date(Default::default())))
                .unique_together(&["number", "customer"]),
        )
        .unwrap();
    let handle = engine.handle(id).unwrap();
    let before = handle.resolve().unwrap();
    database.clear_journal().unwrap();

    engine.store().delete_schema(id).unwrap();

    assert_eq!(
        database.journal().unwrap(),
        vec![SchemaOperation::DropTable {
            table: "mutant_shop_order".to_string()
        }]
    );
    assert!(before.is_obsolete());
    assert!(!database.has_table("mutant_shop_order").unwrap());
    assert!(engine.cache().peek(id).unwrap().is_none());
}

#[test]
fn test_cascade_removes_relations_of_other_owners() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let author = engine
        .store()
        .create_schema(SchemaDraft::new("blog", "Author").field(FieldDraft::new("name", FieldKind::text())))
        .unwrap();
    let post = engine
        .store()
        .create_schema(
            SchemaDraft::new("blog", "Post")
                .field(FieldDraft::new("title", FieldKind::text()))
                .field(
                    FieldDraft::new(
                        "author",
                        FieldKind::ForeignKey {
                            target: RelationTarget::Schema(author),
                        },
                    )
                    .nullable(),
                ),
        )
        .unwrap();
    database.clear_journal().unwrap();

    engine.store().delete_schema(author).unwrap();

    assert_eq!(
        database.journal().unwrap(),
        vec![
            remove("mutant_blog_post", "author_id"),
            SchemaOperation::DropTable {
                table: "mutant_blog_author".to_string()
            },
        ]
    );
    let runtime = engine.handle(post).unwrap().resolve().unwrap();
    assert_eq!(runtime.columns(), vec!["id", "title"]);
}

#[test]
fn test_deleting_primary_key_reinstates_implicit_key() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let id = engine
        .store()
        .create_schema(
            SchemaDraft::new("shop", "Item")
                .field(FieldDraft::new("code", FieldKind::text()).primary_key())
                .field(FieldDraft::new("name", FieldKind::text())),
        )
        .unwrap();
    let handle = engine.handle(id).unwrap();
    for (code, name) in [("a1", "lamp"), ("b2", "desk")] {
        let record = handle
            .new_record([("code", Value::from(code)), ("name", Value::from(name))])
            .unwrap();
        database.insert(&handle.resolve().unwrap(), &record).unwrap();
    }
    database.clear_journal().unwrap();

    let code = engine
        .store()
        .data()
        .unwrap()
        .fields_of(id)
        .iter()
        .find(|field| field.name == "code")
        .map(|field| field.id)
        .unwrap();
    engine.store().delete_field(code).unwrap();

    assert_eq!(
        database.journal().unwrap(),
        vec![alter("mutant_shop_item", "code", "id")]
    );
    assert!(handle.resolve().unwrap().has_implicit_primary_key());

    let columns = database.columns("mutant_shop_item").unwrap();
    let key = column(&columns, "id");
    assert!(key.primary_key && key.auto_increment);
    let keys: Vec<Value> = database
        .rows("mutant_shop_item")
        .unwrap()
        .into_iter()
        .map(|row| row["id"].clone())
        .collect();
    assert_eq!(keys, vec![Value::Integer(1), Value::Integer(2)]);
}

#[test]
fn test_deleting_plain_field_removes_column() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let id = engine
        .store()
        .create_schema(SchemaDraft::new("shop", "Item"))
        .unwrap();
    let name = engine
        .store()
        .add_field(id, FieldDraft::new("name", FieldKind::text()).nullable())
        .unwrap();
    database.clear_journal().unwrap();

    engine.store().delete_field(name).unwrap();
    assert_eq!(database.journal().unwrap(), vec![remove("mutant_shop_item", "name")]);
}

#[test]
fn test_declared_primary_key_replaces_implicit_key() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let id = engine
        .store()
        .create_schema(SchemaDraft::new("shop", "Item"))
        .unwrap();
    database.clear_journal().unwrap();

    engine
        .store()
        .add_field(id, FieldDraft::new("code", FieldKind::text()).primary_key())
        .unwrap();

    assert_eq!(
        database.journal().unwrap(),
        vec![add("mutant_shop_item", "code"), remove("mutant_shop_item", "id")]
    );
    let runtime = engine.handle(id).unwrap().resolve().unwrap();
    assert_eq!(runtime.columns(), vec!["code"]);
}

#[test]
fn test_unique_together_transitions() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let id = engine
        .store()
        .create_schema(
            SchemaDraft::new("shop", "Item")
                .field(FieldDraft::new("a", FieldKind::Integer))
                .field(FieldDraft::new("b", FieldKind::Integer))
                .field(FieldDraft::new("c", FieldKind::Integer)),
        )
        .unwrap();
    let data = engine.store().data().unwrap();
    let ids: Vec<_> = data.fields_of(id).iter().map(|field| field.id).collect();
    let (a, b, c) = (ids[0], ids[1], ids[2]);

    let set = engine.store().add_unique_together(id, &[a, b]).unwrap();
    assert_eq!(
        database.journal().unwrap().last(),
        Some(&unique("mutant_shop_item", &["a", "b"], true))
    );

    database.clear_journal().unwrap();
    engine.store().set_unique_members(set, &[a, c]).unwrap();
    assert_eq!(
        database.journal().unwrap(),
        vec![
            unique("mutant_shop_item", &["a", "b"], false),
            unique("mutant_shop_item", &["a", "c"], true),
        ]
    );

    engine.store().set_unique_members(set, &[a, b]).unwrap();
    database.clear_journal().unwrap();
    engine.store().clear_unique_members(set).unwrap();
    assert_eq!(
        database.journal().unwrap(),
        vec![unique("mutant_shop_item", &["a", "b"], false)]
    );
    assert!(database.unique_together("mutant_shop_item").unwrap().is_empty());

    // Clearing an empty set changes nothing.
    database.clear_journal().unwrap();
    engine.store().clear_unique_members(set).unwrap();
    assert!(database.journal().unwrap().is_empty());
}

#[test]
fn test_deleting_member_field_shrinks_unique_set_first() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let id = engine
        .store()
        .create_schema(
            SchemaDraft::new("shop", "Item")
                .field(FieldDraft::new("a", FieldKind::Integer))
                .field(FieldDraft::new("b", FieldKind::Integer).nullable())
                .unique_together(&["a", "b"]),
        )
        .unwrap();
    let b = engine
        .store()
        .data()
        .unwrap()
        .fields_of(id)
        .iter()
        .find(|field| field.name == "b")
        .map(|field| field.id)
        .unwrap();
    database.clear_journal().unwrap();

    engine.store().delete_field(b).unwrap();
    assert_eq!(
        database.journal().unwrap(),
        vec![
            unique("mutant_shop_item", &["a", "b"], false),
            unique("mutant_shop_item", &["a"], true),
            remove("mutant_shop_item", "b"),
        ]
    );
}

#[test]
fn test_strict_alteration_keeps_everything_on_failure() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let id = engine
        .store()
        .create_schema(SchemaDraft::new("shop", "Item").field(FieldDraft::new("code", FieldKind::text())))
        .unwrap();
    let handle = engine.handle(id).unwrap();
    let record = handle.new_record([("code", Value::from("abc"))]).unwrap();
    database.insert(&handle.resolve().unwrap(), &record).unwrap();
    let before = handle.resolve().unwrap();
    let journal = database.journal().unwrap();

    let code = engine.store().data().unwrap().fields_of(id)[0].id;
    let err = engine
        .store()
        .update_field(code, |field| field.kind = FieldKind::Integer)
        .unwrap_err();

    assert!(matches!(err, MutantError::Migration(_)));
    assert_eq!(engine.store().field(code).unwrap().kind, FieldKind::text());
    assert_eq!(database.journal().unwrap(), journal);
    assert_eq!(
        column(&database.columns("mutant_shop_item").unwrap(), "code").data_type,
        DataType::Text
    );
    assert_eq!(
        database.rows("mutant_shop_item").unwrap()[0]["code"],
        Value::from("abc")
    );
    assert!(!before.is_obsolete());
    assert!(handle.is(&before).unwrap());
}

#[test]
fn test_lenient_alteration_nulls_unconvertible_values() {
    let config = rustmutant::EngineConfig::new().strict_alterations(false);
    let (engine, database) = SchemaEngine::in_memory_with(config).unwrap();
    let id = engine
        .store()
        .create_schema(
            SchemaDraft::new("shop", "Item")
                .field(FieldDraft::new("code", FieldKind::text()).nullable()),
        )
        .unwrap();
    let handle = engine.handle(id).unwrap();
    for code in ["12", "abc"] {
        let record = handle.new_record([("code", Value::from(code))]).unwrap();
        database.insert(&handle.resolve().unwrap(), &record).unwrap();
    }

    let code = engine.store().data().unwrap().fields_of(id)[0].id;
    engine
        .store()
        .update_field(code, |field| field.kind = FieldKind::Integer)
        .unwrap();

    let values: Vec<Value> = database
        .rows("mutant_shop_item")
        .unwrap()
        .into_iter()
        .map(|row| row["code"].clone())
        .collect();
    assert_eq!(values, vec![Value::Integer(12), Value::Null]);
}

#[test]
fn test_rename_moves_table_and_invalidates_names() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let id = engine
        .store()
        .create_schema(SchemaDraft::new("blog", "Post"))
        .unwrap();
    let handle = engine.handle_for("blog", "Post").unwrap();
    database.clear_journal().unwrap();

    engine
        .store()
        .update_schema(id, |schema| schema.type_name = "Article".to_string())
        .unwrap();

    assert_eq!(
        database.journal().unwrap(),
        vec![SchemaOperation::RenameTable {
            from: "mutant_blog_post".to_string(),
            to: "mutant_blog_article".to_string(),
        }]
    );
    assert_eq!(handle.table_name().unwrap(), "mutant_blog_article");
    assert!(engine.handle_for("blog", "Post").is_err());
    assert_eq!(engine.handle_for("blog", "Article").unwrap().identity(), id);
}

#[test]
fn test_externally_managed_types_issue_no_ddl() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let id = engine
        .store()
        .create_schema(
            SchemaDraft::new("legacy", "Customer")
                .externally_managed()
                .field(FieldDraft::new("name", FieldKind::text())),
        )
        .unwrap();
    engine
        .store()
        .add_field(id, FieldDraft::new("email", FieldKind::text()).nullable())
        .unwrap();

    let handle = engine.handle(id).unwrap();
    assert!(handle.field("email").unwrap().is_some());

    engine.store().delete_schema(id).unwrap();
    assert!(database.journal().unwrap().is_empty());
}

#[test]
fn test_mixin_base_adds_and_removes_columns() {
    let (engine, database) = {
        let database = std::sync::Arc::new(rustmutant::MemoryDatabase::new());
        let engine = SchemaEngine::builder()
            .mixin(
                "core::Timestamped",
                DeclaredType::new(TypeKey::new("core", "Timestamped"))
                    .abstract_type()
                    .field(FieldDescriptor::new("created", DataType::DateTime).nullable())
                    .field(FieldDescriptor::new("updated", DataType::DateTime).nullable()),
            )
            .connection("default", database.clone())
            .build()
            .unwrap();
        (engine, database)
    };
    let id = engine
        .store()
        .create_schema(SchemaDraft::new("blog", "Post"))
        .unwrap();
    database.clear_journal().unwrap();

    let base = engine
        .store()
        .add_base(id, BaseDraft::mixin("core::Timestamped"))
        .unwrap();
    assert_eq!(
        database.journal().unwrap(),
        vec![add("mutant_blog_post", "created"), add("mutant_blog_post", "updated")]
    );

    database.clear_journal().unwrap();
    engine.store().delete_base(base).unwrap();
    assert_eq!(
        database.journal().unwrap(),
        vec![remove("mutant_blog_post", "created"), remove("mutant_blog_post", "updated")]
    );
}

#[test]
fn test_concrete_base_promotes_parent_link() {
    let database = std::sync::Arc::new(rustmutant::MemoryDatabase::new());
    let engine = SchemaEngine::builder()
        .declare(
            DeclaredType::new(TypeKey::new("places", "Place"))
                .field(FieldDescriptor::new("address", DataType::Text)),
        )
        .connection("default", database.clone())
        .build()
        .unwrap();
    let id = engine
        .store()
        .create_schema(SchemaDraft::new("food", "Restaurant"))
        .unwrap();
    database.clear_journal().unwrap();

    let base = engine
        .store()
        .add_base(id, BaseDraft::model(TypeKey::new("places", "Place")))
        .unwrap();
    assert_eq!(
        database.journal().unwrap(),
        vec![alter("mutant_food_restaurant", "id", "place_ptr_id")]
    );
    let runtime = engine.handle(id).unwrap().resolve().unwrap();
    assert_eq!(runtime.primary_key().unwrap().name, "place_ptr");

    database.clear_journal().unwrap();
    engine.store().delete_base(base).unwrap();
    assert_eq!(
        database.journal().unwrap(),
        vec![alter("mutant_food_restaurant", "place_ptr_id", "id")]
    );
}

#[test]
fn test_deleting_primary_key_promotes_existing_parent_link() {
    let database = std::sync::Arc::new(rustmutant::MemoryDatabase::new());
    let engine = SchemaEngine::builder()
        .declare(
            DeclaredType::new(TypeKey::new("places", "Place"))
                .field(FieldDescriptor::new("address", DataType::Text)),
        )
        .connection("default", database.clone())
        .build()
        .unwrap();
    let id = engine
        .store()
        .create_schema(
            SchemaDraft::new("food", "Restaurant")
                .field(FieldDraft::new("code", FieldKind::text()).primary_key()),
        )
        .unwrap();
    engine
        .store()
        .add_base(id, BaseDraft::model(TypeKey::new("places", "Place")))
        .unwrap();
    let handle = engine.handle(id).unwrap();
    assert_eq!(handle.resolve().unwrap().primary_key().unwrap().name, "code");
    database.clear_journal().unwrap();

    let code = engine.store().data().unwrap().fields_of(id)[0].id;
    engine.store().delete_field(code).unwrap();

    assert_eq!(
        database.journal().unwrap(),
        vec![
            remove("mutant_food_restaurant", "code"),
            alter("mutant_food_restaurant", "place_ptr_id", "place_ptr_id"),
        ]
    );
    assert_eq!(handle.resolve().unwrap().primary_key().unwrap().name, "place_ptr");
    let columns = database.columns("mutant_food_restaurant").unwrap();
    let keys: Vec<&str> = columns
        .iter()
        .filter(|column| column.primary_key)
        .map(|column| column.name.as_str())
        .collect();
    assert_eq!(keys, vec!["place_ptr_id"]);
}

#[test]
fn test_updating_base_swaps_contributed_columns() {
    let database = std::sync::Arc::new(rustmutant::MemoryDatabase::new());
    let engine = SchemaEngine::builder()
        .mixin(
            "core::Timestamped",
            DeclaredType::new(TypeKey::new("core", "Timestamped"))
                .abstract_type()
                .field(FieldDescriptor::new("created", DataType::DateTime).nullable())
                .field(FieldDescriptor::new("updated", DataType::DateTime).nullable()),
        )
        .mixin(
            "core::Audited",
            DeclaredType::new(TypeKey::new("core", "Audited"))
                .abstract_type()
                .field(FieldDescriptor::new("updated", DataType::Date).nullable())
                .field(FieldDescriptor::new("editor", DataType::Text).nullable()),
        )
        .connection("default", database.clone())
        .build()
        .unwrap();
    let id = engine
        .store()
        .create_schema(SchemaDraft::new("blog", "Post"))
        .unwrap();
    let base = engine
        .store()
        .add_base(id, BaseDraft::mixin("core::Timestamped"))
        .unwrap();
    database.clear_journal().unwrap();

    engine
        .store()
        .update_base(base, |base| {
            base.kind = BaseKind::Mixin {
                reference: "core::Audited".to_string(),
            }
        })
        .unwrap();

    assert_eq!(
        database.journal().unwrap(),
        vec![
            alter("mutant_blog_post", "updated", "updated"),
            add("mutant_blog_post", "editor"),
            remove("mutant_blog_post", "created"),
        ]
    );
    let runtime = engine.handle(id).unwrap().resolve().unwrap();
    assert_eq!(runtime.columns(), vec!["id", "updated", "editor"]);
    let columns = database.columns("mutant_blog_post").unwrap();
    assert_eq!(column(&columns, "updated").data_type, DataType::Date);

    // Putting the same base back changes the columns back.
    database.clear_journal().unwrap();
    engine
        .store()
        .update_base(base, |base| {
            base.kind = BaseKind::Mixin {
                reference: "core::Timestamped".to_string(),
            }
        })
        .unwrap();
    assert_eq!(
        database.journal().unwrap(),
        vec![
            add("mutant_blog_post", "created"),
            alter("mutant_blog_post", "updated", "updated"),
            remove("mutant_blog_post", "editor"),
        ]
    );
}

#[test]
fn test_reserved_namespace_and_dynamic_bases_are_rejected() {
    let database = std::sync::Arc::new(rustmutant::MemoryDatabase::new());
    let engine = SchemaEngine::builder()
        .declare(DeclaredType::new(TypeKey::new("auth", "User")))
        .reserve_namespace("admin")
        .connection("default", database.clone())
        .build()
        .unwrap();

    for namespace in ["auth", "admin"] {
        let err = engine
            .store()
            .create_schema(SchemaDraft::new(namespace, "Profile"))
            .unwrap_err();
        assert!(matches!(err, MutantError::Configuration(_)));
    }

    let parent = engine
        .store()
        .create_schema(SchemaDraft::new("shop", "Item"))
        .unwrap();
    let child = engine
        .store()
        .create_schema(SchemaDraft::new("shop", "Special"))
        .unwrap();
    let err = engine
        .store()
        .add_base(child, BaseDraft::model(engine.store().get_schema(parent).unwrap().key()))
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(database.table_names().unwrap().len(), 2);
}

#[test]
fn test_failure_in_later_event_rolls_back_earlier_ddl() {
    let (engine, database) = SchemaEngine::in_memory().unwrap();
    let id = engine
        .store()
        .create_schema(
            SchemaDraft::new("shop", "Item")
                .field(FieldDraft::new("a", FieldKind::Integer))
                .field(FieldDraft::new("b", FieldKind::Integer))
                .field(FieldDraft::new("c", FieldKind::Integer))
                .unique_together(&["b", "c"])
                .unique_together(&["a", "b"]),
        )
        .unwrap();
    let handle = engine.handle(id).unwrap();
    for (b, c) in [(1, 1), (2, 2)] {
        let record = handle
            .new_record([
                ("a", Value::Integer(1)),
                ("b", Value::Integer(b)),
                ("c", Value::Integer(c)),
            ])
            .unwrap();
        database.insert(&handle.resolve().unwrap(), &record).unwrap();
    }
    let journal = database.journal().unwrap();
    let b = engine.store().data().unwrap().fields_of(id)[1].id;

    // Shrinking {b, c} to {c} succeeds, shrinking {a, b} to {a} does not.
    let err = engine.store().delete_field(b).unwrap_err();
    assert!(err.is_migration());

    assert_eq!(database.journal().unwrap(), journal);
    assert_eq!(
        database.unique_together("mutant_shop_item").unwrap(),
        vec![
            vec!["b".to_string(), "c".to_string()],
            vec!["a".to_string(), "b".to_string()],
        ]
    );
    let runtime = handle.resolve().unwrap();
    assert_eq!(runtime.columns(), vec!["id", "a", "b", "c"]);
    assert_eq!(runtime.options().unique_together.len(), 2);
}

#[test]
fn test_namespace_router_splits_connections() {
    let main = std::sync::Arc::new(rustmutant::MemoryDatabase::new());
    let archive = std::sync::Arc::new(rustmutant::MemoryDatabase::new());
    let engine = SchemaEngine::builder()
        .connection("main", main.clone())
        .connection("archive", archive.clone())
        .router(rustmutant::NamespaceRouter::new("main").route("history", "archive"))
        .build()
        .unwrap();

    engine
        .store()
        .create_schema(SchemaDraft::new("shop", "Item"))
        .unwrap();
    engine
        .store()
        .create_schema(SchemaDraft::new("history", "Event"))
        .unwrap();

    assert_eq!(main.table_names().unwrap(), vec!["mutant_shop_item"]);
    assert_eq!(archive.table_names().unwrap(), vec!["mutant_history_event"]);
}
