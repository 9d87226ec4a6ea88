use super::*;

fn column(ty: &str) -> ColumnDecl {
    ColumnDecl {
        ty: ty.to_string(),
        nullable: false,
        default: None,
        unique: false,
    }
}

fn table(columns: &[(&str, &str)]) -> TableDecl {
    TableDecl {
        comment: None,
        columns: columns
            .iter()
            .map(|(name, ty)| (name.to_string(), column(ty)))
            .collect(),
        primary_key: None,
        foreign_keys: IndexMap::new(),
        indexes: IndexMap::new(),
        checks: IndexMap::new(),
    }
}

fn file(tables: Vec<(&str, TableDecl)>) -> SchemaFile {
    let tables = tables
        .into_iter()
        .map(|(name, t)| (name.to_string(), t))
        .collect();
    let mut schemas = IndexMap::new();
    schemas.insert("public".to_string(), SchemaDecl { tables });
    SchemaFile { schemas }
}

fn fk(columns: &[&str], references: &str) -> ForeignKeyDecl {
    ForeignKeyDecl {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        references: references.to_string(),
        on_delete: None,
        on_update: None,
    }
}

#[test]
fn demo_schema_loads() {
    let realm = match demo_realm() {
        Ok(realm) => realm,
        Err(e) => panic!("demo schema failed to load:\n{}", e),
    };

    let public = realm.schema("public").expect("public schema");
    let names: Vec<&str> = public.tables.keys().map(|k| k.as_str()).collect();
    assert_eq!(names, vec!["users", "groups", "group_has_user"]);

    let users = public.table("users").unwrap();
    let id = users.column("id").unwrap();
    assert_eq!(id.pg_type, PgType::Uuid);
    assert!(id.unique);
    assert!(!id.nullable);
    assert_eq!(id.default.as_deref(), Some("gen_random_uuid()"));
    assert_eq!(
        users.primary_key.as_ref().map(|pk| pk.columns.clone()),
        Some(vec!["id".to_string()])
    );

    let join = public.table("group_has_user").unwrap();
    assert_eq!(join.foreign_keys.len(), 2);
    let users_fk = &join.foreign_keys[0];
    assert_eq!(users_fk.name, "users_kf");
    assert_eq!(users_fk.columns, vec!["user_id"]);
    assert_eq!(users_fk.references_schema, "public");
    assert_eq!(users_fk.references_table, "users");
    assert_eq!(users_fk.references_columns, vec!["id"]);
}

#[test]
fn parse_error_is_rendered() {
    let err = load_str("schemas {", "broken.styx").unwrap_err();
    assert!(matches!(err, DeclError::Parse { .. }));
}

#[test]
fn lowering_keeps_declaration_order_and_flags() {
    let mut users = table(&[("id", "bigint"), ("email", "text"), ("bio", "text")]);
    users.columns.get_mut("email").unwrap().unique = true;
    users.columns.get_mut("bio").unwrap().nullable = true;
    users.primary_key = Some(vec!["id".to_string()]);
    users.comment = Some("people".to_string());
    users.checks.insert(
        "users_email_not_blank".to_string(),
        "char_length(email) > 0".to_string(),
    );

    let realm = file(vec![("users", users)]).to_realm().unwrap();
    let t = realm.schema("public").unwrap().table("users").unwrap();

    let names: Vec<&str> = t.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "email", "bio"]);
    assert!(t.column("email").unwrap().unique);
    assert!(t.column("bio").unwrap().nullable);
    assert_eq!(t.primary_key.as_ref().unwrap().name, "users_pkey");
    assert_eq!(t.comment(), Some("people"));
    assert_eq!(t.checks[0].name, "users_email_not_blank");
}

#[test]
fn unknown_type_is_rejected() {
    let realm = file(vec![("users", table(&[("id", "bignum")]))]).to_realm();
    match realm {
        Err(DeclError::UnknownType { table, column, ty, .. }) => {
            assert_eq!(table, "users");
            assert_eq!(column, "id");
            assert_eq!(ty, "bignum");
        }
        other => panic!("expected UnknownType, got {:?}", other),
    }
}

#[test]
fn primary_key_must_name_declared_columns() {
    let mut users = table(&[("id", "bigint")]);
    users.primary_key = Some(vec!["uuid".to_string()]);
    let err = file(vec![("users", users)]).to_realm().unwrap_err();
    assert_eq!(
        err.to_string(),
        "public.users: primary key references unknown column `uuid`"
    );
}

#[test]
fn foreign_key_target_columns_are_checked() {
    let users = table(&[("id", "uuid")]);
    let mut posts = table(&[("id", "uuid"), ("author_id", "uuid")]);
    posts
        .foreign_keys
        .insert("posts_author".to_string(), fk(&["author_id"], "users(uid)"));

    let err = file(vec![("users", users), ("posts", posts)])
        .to_realm()
        .unwrap_err();
    assert!(matches!(
        err,
        DeclError::UnknownColumn { ref table, ref column, .. } if table == "users" && column == "uid"
    ));
}

#[test]
fn foreign_key_to_undeclared_table_is_allowed() {
    let mut posts = table(&[("id", "uuid"), ("tenant_id", "uuid")]);
    let mut tenant_fk = fk(&["tenant_id"], "auth.tenant(id)");
    tenant_fk.on_delete = Some("cascade".to_string());
    posts.foreign_keys.insert("posts_tenant".to_string(), tenant_fk);

    let realm = file(vec![("posts", posts)]).to_realm().unwrap();
    let fk = &realm.schema("public").unwrap().table("posts").unwrap().foreign_keys[0];
    assert_eq!(fk.references_schema, "auth");
    assert_eq!(fk.references_table, "tenant");
    assert_eq!(fk.on_delete, ReferentialAction::Cascade);
    assert_eq!(fk.on_update, ReferentialAction::NoAction);
}

#[test]
fn foreign_key_arity_and_actions_are_validated() {
    let mut posts = table(&[("a", "int"), ("b", "int")]);
    posts
        .foreign_keys
        .insert("two_to_one".to_string(), fk(&["a", "b"], "other.id"));
    let err = file(vec![("posts", posts)]).to_realm().unwrap_err();
    assert!(matches!(
        err,
        DeclError::ReferenceArity {
            columns: 2,
            references: 1,
            ..
        }
    ));

    let mut posts = table(&[("a", "int")]);
    let mut bad = fk(&["a"], "other.id");
    bad.on_update = Some("explode".to_string());
    posts.foreign_keys.insert("bad".to_string(), bad);
    let err = file(vec![("posts", posts)]).to_realm().unwrap_err();
    assert!(matches!(err, DeclError::BadAction { ref action, .. } if action == "explode"));
}

#[test]
fn index_columns_are_parsed_and_checked() {
    let mut events = table(&[("id", "bigint"), ("created_at", "timestamptz")]);
    events.indexes.insert(
        "idx_events_recent".to_string(),
        IndexDecl {
            columns: vec!["created_at DESC".to_string()],
            unique: false,
            where_clause: Some("id > 0".to_string()),
        },
    );
    let realm = file(vec![("events", events)]).to_realm().unwrap();
    let idx = &realm.schema("public").unwrap().table("events").unwrap().indexes[0];
    assert_eq!(idx.columns, vec![IndexColumn::desc("created_at")]);
    assert_eq!(idx.where_clause.as_deref(), Some("id > 0"));

    let mut events = table(&[("id", "bigint")]);
    events.indexes.insert(
        "idx_missing".to_string(),
        IndexDecl {
            columns: vec!["nope".to_string()],
            unique: true,
            where_clause: None,
        },
    );
    let err = file(vec![("events", events)]).to_realm().unwrap_err();
    assert_eq!(
        err.to_string(),
        "public.events: index `idx_missing` references unknown column `nope`"
    );
}
