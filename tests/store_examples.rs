use sqlite_manager::{
    ColumnDefinition, DataType, ExecOutcome, Result, Row, Schema, SqliteStore, StoreConfig,
    StoreError, TableSchema, Value,
};
use tempfile::TempDir;

// Helper to build a row from literal pairs
fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn users_table() -> TableSchema {
    TableSchema::new("users")
        .column(ColumnDefinition::new("id", DataType::Integer))
        .column(ColumnDefinition::new("name", DataType::Text).not_null())
        .column(ColumnDefinition::new("age", DataType::Integer).with_default(0))
        .primary_key(&["id"])
}

// Helper function to create a store on a temporary file
fn create_temp_store() -> Result<(SqliteStore, TempDir)> {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open_path(dir.path().join("test.db"))?;
    Ok((store, dir))
}

#[tokio::test]
async fn test_users_scenario() {
    test_users_scenario_impl().unwrap();
}

fn test_users_scenario_impl() -> Result<()> {
    let (mut store, _dir) = create_temp_store()?;
    store.create_table(&users_table())?;

    let id = store.insert("users", &row(&[("name", "John".into()), ("age", 25.into())]))?;
    assert_eq!(id, 1);

    let john = row(&[("id", 1.into()), ("name", "John".into()), ("age", 25.into())]);
    assert_eq!(store.select("users", None)?, vec![john]);

    let updated = store.update("users", &row(&[("age", 26.into())]), Some("name = 'John'"))?;
    assert_eq!(updated, 1);

    let older = row(&[("id", 1.into()), ("name", "John".into()), ("age", 26.into())]);
    assert_eq!(store.select("users", Some("age > 20"))?, vec![older]);
    assert!(store.select("users", Some("age > 30"))?.is_empty());

    assert_eq!(store.delete("users", Some("age = 26"))?, 1);
    assert_eq!(store.table_count("users")?, 0);
    store.close()
}

#[test]
fn table_info_mirrors_created_schema() -> anyhow::Result<()> {
    let (mut store, _dir) = create_temp_store()?;
    let table = TableSchema::new("events")
        .column(ColumnDefinition::new("id", DataType::Integer).not_null())
        .column(ColumnDefinition::new("title", DataType::Text).not_null())
        .column(ColumnDefinition::new("weight", DataType::Real))
        .column(ColumnDefinition::new("payload", DataType::Blob))
        .column(ColumnDefinition::new("done", DataType::Boolean).with_default(false))
        .column(ColumnDefinition::new("day", DataType::Date))
        .column(ColumnDefinition::new("at", DataType::Time))
        .column(ColumnDefinition::new("created", DataType::DateTime))
        .column(ColumnDefinition::new("seen", DataType::Timestamp))
        .primary_key(&["id"])
        .unique(&["title", "day"])
        .check("weight IS NULL OR weight >= 0");
    store.create_table(&table)?;

    let info = store.table_info("events")?;
    let described: Vec<(String, String, bool)> = info
        .columns
        .iter()
        .map(|c| (c.name.clone(), c.declared_type.clone(), c.not_null))
        .collect();
    let expected: Vec<(String, String, bool)> = table
        .columns
        .iter()
        .map(|c| (c.name.clone(), c.data_type.to_string(), !c.nullable))
        .collect();
    assert_eq!(described, expected);
    assert_eq!(info.columns[0].primary_key, 1);
    assert!(info.indexes.iter().any(|i| i.unique && i.columns == ["title", "day"]));
    assert_eq!(info.row_count, 0);
    assert!(info.sql.unwrap().contains("CHECK (weight IS NULL OR weight >= 0)"));
    Ok(())
}

#[test]
fn values_survive_a_round_trip() -> anyhow::Result<()> {
    let (mut store, _dir) = create_temp_store()?;
    store.create_table(
        &TableSchema::new("samples")
            .column(ColumnDefinition::new("id", DataType::Integer))
            .column(ColumnDefinition::new("label", DataType::Text))
            .column(ColumnDefinition::new("ratio", DataType::Real))
            .column(ColumnDefinition::new("flag", DataType::Boolean))
            .column(ColumnDefinition::new("raw", DataType::Blob))
            .primary_key(&["id"]),
    )?;

    let sample = row(&[
        ("id", 7.into()),
        ("label", "it's \"quoted\", with; DROP TABLE samples; --".into()),
        ("ratio", 0.125.into()),
        ("flag", true.into()),
        ("raw", vec![0u8, 1, 254].into()),
    ]);
    store.insert("samples", &sample)?;
    store.insert("samples", &row(&[("id", 8.into()), ("label", Value::Null)]))?;

    let rows = store.select("samples", None)?;
    assert_eq!(rows[0], sample);
    assert_eq!(
        rows[1],
        row(&[
            ("id", 8.into()),
            ("label", Value::Null),
            ("ratio", Value::Null),
            ("flag", Value::Null),
            ("raw", Value::Null),
        ])
    );

    // integers widen into REAL columns
    store.update("samples", &row(&[("ratio", 2.into())]), Some("id = 8"))?;
    assert_eq!(store.select("samples", Some("id = 8"))?[0]["ratio"], Value::Real(2.0));
    Ok(())
}

#[test]
fn rows_keep_table_column_order() -> anyhow::Result<()> {
    let (mut store, _dir) = create_temp_store()?;
    store.create_table(&users_table())?;
    store.insert("users", &row(&[("age", 40.into()), ("name", "Zed".into())]))?;

    let rows = store.select("users", None)?;
    let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(keys, ["id", "name", "age"]);
    assert_eq!(
        serde_json::to_string(&rows[0])?,
        r#"{"id":1,"name":"Zed","age":40}"#
    );

    let ExecOutcome::Rows(raw) = store.execute("SELECT age, name FROM users")? else {
        panic!("expected rows");
    };
    let keys: Vec<&str> = raw[0].keys().map(String::as_str).collect();
    assert_eq!(keys, ["age", "name"]);
    Ok(())
}

#[test]
fn insert_rejects_invalid_rows() -> anyhow::Result<()> {
    let (mut store, _dir) = create_temp_store()?;
    store.create_table(&users_table())?;

    let missing = store.insert("users", &row(&[("age", 3.into())])).unwrap_err();
    assert!(matches!(missing, StoreError::Constraint(m) if m.contains("name")));

    let unknown = store
        .insert("users", &row(&[("name", "a".into()), ("email", "a@b".into())]))
        .unwrap_err();
    assert!(matches!(unknown, StoreError::Schema(m) if m.contains("email")));

    let mistyped = store
        .insert("users", &row(&[("name", "a".into()), ("age", "old".into())]))
        .unwrap_err();
    assert!(matches!(mistyped, StoreError::TypeMismatch(m) if m.contains("INTEGER") && m.contains("TEXT")));

    let absent = store.insert("ghosts", &row(&[("name", "a".into())])).unwrap_err();
    assert!(matches!(absent, StoreError::NotFound(m) if m.contains("ghosts")));

    assert_eq!(store.table_count("users")?, 0);
    Ok(())
}

#[test]
fn insert_many_is_all_or_nothing() -> anyhow::Result<()> {
    let (mut store, _dir) = create_temp_store()?;
    store.create_table(&users_table().unique(&["name"]))?;

    let mut rows: Vec<Row> = (0..4)
        .map(|i| row(&[("name", format!("user{i}").into()), ("age", i.into())]))
        .collect();
    rows.insert(2, row(&[("age", 99.into())]));

    let err = store.insert_many("users", &rows).unwrap_err();
    assert!(matches!(err, StoreError::Constraint(m) if m.starts_with("row 3")));
    assert_eq!(store.table_count("users")?, 0);

    // failures raised by the engine itself roll back too
    let duplicate = vec![
        row(&[("name", "ann".into())]),
        row(&[("name", "bob".into())]),
        row(&[("name", "ann".into())]),
    ];
    let err = store.insert_many("users", &duplicate).unwrap_err();
    assert!(matches!(err, StoreError::Constraint(m) if m.starts_with("row 3") && m.contains("UNIQUE")));
    assert_eq!(store.table_count("users")?, 0);

    rows.remove(2);
    assert_eq!(store.insert_many("users", &rows)?, 4);
    assert_eq!(store.table_count("users")?, 4);
    assert_eq!(store.insert_many("users", &[])?, 0);
    Ok(())
}

#[test]
fn mutations_without_condition_are_refused() -> anyhow::Result<()> {
    let (mut store, _dir) = create_temp_store()?;
    store.create_table(&users_table())?;
    store.insert_many(
        "users",
        &[row(&[("name", "a".into())]), row(&[("name", "b".into())])],
    )?;

    for condition in [None, Some(""), Some("  \n")] {
        assert!(matches!(
            store.delete("users", condition),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.update("users", &row(&[("age", 1.into())]), condition),
            Err(StoreError::Validation(_))
        ));
    }
    assert_eq!(store.table_count("users")?, 2);
    assert!(store.select("users", Some("age = 1"))?.is_empty());
    Ok(())
}

#[test]
fn create_and_drop_report_failures() -> anyhow::Result<()> {
    let (mut store, _dir) = create_temp_store()?;
    store.create_table(&users_table())?;

    let duplicate = store.create_table(&users_table()).unwrap_err();
    assert!(matches!(duplicate, StoreError::Schema(m) if m.contains("already exists")));

    let bad = TableSchema::new("orders")
        .column(ColumnDefinition::new("id", DataType::Integer))
        .primary_key(&["order_id"]);
    assert!(matches!(store.create_table(&bad), Err(StoreError::Schema(_))));

    let broken_check = TableSchema::new("orders")
        .column(ColumnDefinition::new("id", DataType::Integer))
        .check("id >");
    assert!(store.create_table(&broken_check).is_err());
    assert_eq!(store.list_tables()?, vec!["users"]);

    assert!(matches!(
        store.drop_table("orders", false),
        Err(StoreError::NotFound(m)) if m.contains("orders")
    ));
    assert!(!store.drop_table("orders", true)?);
    assert!(store.drop_table("users", false)?);
    assert!(store.list_tables()?.is_empty());
    Ok(())
}

#[test]
fn raw_statements_return_rows_or_counts() -> anyhow::Result<()> {
    let (mut store, _dir) = create_temp_store()?;
    store.create_table(&users_table())?;

    let inserted = store.execute("INSERT INTO users (name, age) VALUES ('a', 1), ('b', 2)")?;
    assert_eq!(inserted, ExecOutcome::Affected(2));
    assert_eq!(store.execute("UPDATE users SET age = age + 1")?, ExecOutcome::Affected(2));

    let ExecOutcome::Rows(rows) = store.execute("SELECT COUNT(*) AS count FROM users")? else {
        panic!("expected rows");
    };
    assert_eq!(rows, vec![row(&[("count", 2.into())])]);

    assert!(matches!(store.execute("SELEC nothing"), Err(StoreError::Validation(_))));
    assert!(matches!(store.execute("SELECT * FROM nowhere"), Err(StoreError::NotFound(_))));
    assert!(matches!(store.execute("   "), Err(StoreError::Validation(_))));
    assert!(matches!(
        store.execute("INSERT INTO users (age) VALUES (1)"),
        Err(StoreError::Constraint(_))
    ));

    // an explicit transaction is committed by the next mutating statement
    store.execute("BEGIN")?;
    store.execute("DELETE FROM users WHERE name = 'a'")?;
    assert_eq!(store.table_count("users")?, 1);
    Ok(())
}

#[test]
fn structured_operations_nest_inside_raw_transaction() -> anyhow::Result<()> {
    let (mut store, dir) = create_temp_store()?;
    store.create_table(&users_table())?;

    store.execute("BEGIN")?;
    store.insert("users", &row(&[("name", "inside".into())]))?;
    store.create_table(
        &TableSchema::new("audit").column(ColumnDefinition::new("note", DataType::Text)),
    )?;
    // a failing statement only rolls back its own savepoint
    assert!(matches!(
        store.insert("users", &row(&[("id", 1.into()), ("name", "dup".into())])),
        Err(StoreError::Constraint(_))
    ));
    store.insert("audit", &row(&[("note", "kept".into())]))?;
    store.execute("COMMIT")?;
    store.close()?;

    let store = SqliteStore::open_path(dir.path().join("test.db"))?;
    assert_eq!(store.table_count("users")?, 1);
    assert_eq!(store.table_count("audit")?, 1);
    Ok(())
}

#[test]
fn tables_with_non_identifier_names_stay_reachable() -> anyhow::Result<()> {
    let (mut store, dir) = create_temp_store()?;
    store.execute("CREATE TABLE \"order-items\" (sku TEXT, qty INTEGER)")?;
    store.insert("order-items", &row(&[("sku", "a-1".into()), ("qty", 2.into())]))?;

    assert_eq!(store.list_tables()?, ["order-items"]);
    let info = store.database_info()?;
    assert_eq!(info.tables[0].name, "order-items");
    assert_eq!(info.tables[0].row_count, 1);
    assert_eq!(
        store.select("order-items", Some("qty > 1"))?,
        vec![row(&[("sku", "a-1".into()), ("qty", 2.into())])]
    );
    assert_eq!(store.export_csv("order-items", dir.path().join("items.csv"))?, 1);

    assert!(store.drop_table("order-items", false)?);
    assert!(store.list_tables()?.is_empty());
    Ok(())
}

#[test]
fn database_info_lists_every_table() -> anyhow::Result<()> {
    let (mut store, dir) = create_temp_store()?;
    store.create_table(&users_table())?;
    store.create_table(
        &TableSchema::new("audit").column(ColumnDefinition::new("note", DataType::Text)),
    )?;
    store.insert("users", &row(&[("name", "a".into())]))?;

    let info = store.database_info()?;
    assert_eq!(info.path, dir.path().join("test.db").display().to_string());
    assert_eq!(info.table_count, 2);
    let names: Vec<&str> = info.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["audit", "users"]);
    assert_eq!(info.tables[1].row_count, 1);

    assert!(matches!(store.table_info("nope"), Err(StoreError::NotFound(_))));
    assert!(matches!(store.table_count("nope"), Err(StoreError::NotFound(_))));
    Ok(())
}

#[test]
fn bootstrap_schema_is_applied_once() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let config = StoreConfig::new(
        dir.path().join("nested").join("app.db"),
        Schema::new().add_table(users_table()),
    );

    let mut store = SqliteStore::open(config.clone())?;
    store.insert("users", &row(&[("name", "kept".into())]))?;
    store.close()?;

    let store = SqliteStore::open(config)?;
    assert_eq!(store.table_count("users")?, 1);
    Ok(())
}

#[test]
fn create_database_appends_extension() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = SqliteStore::create_database("inventory", Some(dir.path()))?;
    assert_eq!(store.path(), dir.path().join("inventory.db"));
    assert!(store.path().exists());
    assert!(store.is_open());
    Ok(())
}
