mod common;

use common::{open_store, registry, Flag, Flags, Tag, Tags, User, Users, USER_SCOPE};
use refstore_core::db::open_db_in_memory;
use refstore_core::mapper::to_entity;
use refstore_core::{
    as_record, CallingContext, Consistency, DefaultQueryStrategy, FilterSpec, Identifier,
    QueryOptions, Reference, ReferenceInput, RegistryError, RepoError, Repository, SrefRegistry,
    Symbol,
};
use serde_json::json;

#[test]
fn create_then_get_by_every_reference_shape() {
    let conn = open_db_in_memory().unwrap();
    let store = open_store(&conn);
    let registry = registry();
    let repo = Repository::<Users, _>::try_new(&registry, DefaultQueryStrategy::new(&store)).unwrap();
    let ctx = CallingContext::system();
    let options = QueryOptions::default();

    let alice = User::new(1, "Alice", 30);
    let record = repo.create(&alice, &ctx, &options).unwrap();
    assert_eq!(record.identifier, Identifier::Numeric(1));
    assert_eq!(record.projections, vec![json!("alice@example.com"), json!(30)]);

    assert_eq!(repo.get(1_i64, &ctx, &options).unwrap(), Some(alice.clone()));
    assert_eq!(repo.get("ref.user.1", &ctx, &options).unwrap(), Some(alice.clone()));
    assert_eq!(
        repo.get(Reference::numeric(USER_SCOPE, 1), &ctx, &options)
            .unwrap(),
        Some(alice.clone())
    );
    assert_eq!(
        repo.get(ReferenceInput::Entity(alice.clone()), &ctx, &options)
            .unwrap(),
        Some(alice.clone())
    );
    assert_eq!(repo.get(record, &ctx, &options).unwrap(), Some(alice));
}

#[test]
fn missing_rows_are_absent_not_errors() {
    let conn = open_db_in_memory().unwrap();
    let store = open_store(&conn);
    let registry = registry();
    let repo = Repository::<Users, _>::try_new(&registry, DefaultQueryStrategy::new(&store)).unwrap();
    let ctx = CallingContext::system();
    let options = QueryOptions::default();

    assert_eq!(repo.get(404_i64, &ctx, &options).unwrap(), None);
    assert_eq!(repo.get_transactional(404_i64, &ctx, &options).unwrap(), None);
    assert_eq!(repo.record("ref.user.404", &ctx, None).unwrap(), None);
    assert_eq!(repo.get("unknown", &ctx, &options).unwrap(), None);
}

#[test]
fn update_overwrites_and_delete_removes() {
    let conn = open_db_in_memory().unwrap();
    let store = open_store(&conn);
    let registry = registry();
    let repo = Repository::<Users, _>::try_new(&registry, DefaultQueryStrategy::new(&store)).unwrap();
    let ctx = CallingContext::request("api:admin").with_reason("profile edit");
    let options = QueryOptions::default();

    let mut bob = User::new(2, "Bob", 40);
    repo.create(&bob, &ctx, &options).unwrap();

    bob.age = 41;
    let updated = repo.update(&bob, &ctx, &options).unwrap();
    assert_eq!(updated.projections[1], json!(41));
    assert_eq!(repo.get(2_i64, &ctx, &options).unwrap(), Some(bob.clone()));

    repo.delete(ReferenceInput::Entity(bob), &ctx, &options)
        .unwrap();
    assert_eq!(repo.get(2_i64, &ctx, &options).unwrap(), None);

    repo.delete(2_i64, &ctx, &options).unwrap();
    repo.delete("ref.user.99", &ctx, &options).unwrap();
}

#[test]
fn dirty_and_transactional_reads_agree() {
    let conn = open_db_in_memory().unwrap();
    let store = open_store(&conn);
    let registry = registry();
    let repo = Repository::<Users, _>::try_new(&registry, DefaultQueryStrategy::new(&store)).unwrap();
    let ctx = CallingContext::system();
    let dirty = QueryOptions::new().with_dirty(true);

    let carol = User::new(3, "Carol", 27);
    repo.create(&carol, &ctx, &dirty).unwrap();

    let relaxed = repo.get(3_i64, &ctx, &dirty).unwrap();
    let strict = repo.get_transactional(3_i64, &ctx, &dirty).unwrap();
    assert_eq!(relaxed, strict);
    assert_eq!(strict, Some(carol.clone()));

    assert_eq!(
        repo.entity_transactional(3_i64, &ctx, Some(&dirty)).unwrap(),
        Some(carol.clone())
    );
    assert_eq!(
        repo.record_transactional(3_i64, &ctx, Some(&dirty))
            .unwrap()
            .map(|record| record.entity),
        Some(carol)
    );
}

#[test]
fn entity_and_record_skip_the_store_when_value_is_at_hand() {
    let conn = open_db_in_memory().unwrap();
    let store = open_store(&conn);
    let registry = registry();
    let repo = Repository::<Users, _>::try_new(&registry, DefaultQueryStrategy::new(&store)).unwrap();
    let ctx = CallingContext::system();

    // Never persisted, so any store access would come back empty.
    let dave = User::new(4, "Dave", 50);

    assert_eq!(
        repo.entity(ReferenceInput::Entity(dave.clone()), &ctx, None)
            .unwrap(),
        Some(dave.clone())
    );
    assert_eq!(
        repo.record(ReferenceInput::Entity(dave.clone()), &ctx, None)
            .unwrap(),
        Some(as_record::<Users>(&dave))
    );
    assert_eq!(
        repo.entity(as_record::<Users>(&dave), &ctx, Some(&QueryOptions::default()))
            .unwrap(),
        Some(dave.clone())
    );

    // Explicit options force a fetch.
    assert_eq!(
        repo.entity(
            ReferenceInput::Entity(dave.clone()),
            &ctx,
            Some(&QueryOptions::default())
        )
        .unwrap(),
        None
    );

    let round_trip = to_entity::<Users, _>(
        &repo,
        as_record::<Users>(&dave).into(),
        &ctx,
        None,
        Consistency::Relaxed,
        "entity",
    )
    .unwrap();
    assert_eq!(round_trip, Some(dave));
}

#[test]
fn entity_with_options_returns_the_stored_version() {
    let conn = open_db_in_memory().unwrap();
    let store = open_store(&conn);
    let registry = registry();
    let repo = Repository::<Users, _>::try_new(&registry, DefaultQueryStrategy::new(&store)).unwrap();
    let ctx = CallingContext::system();
    let options = QueryOptions::default();

    let stored = User::new(5, "Erin", 22);
    repo.create(&stored, &ctx, &options).unwrap();

    let mut stale = stored.clone();
    stale.age = 99;
    assert_eq!(
        repo.entity(ReferenceInput::Entity(stale), &ctx, Some(&options))
            .unwrap(),
        Some(stored)
    );
}

#[test]
fn unsupported_input_is_rejected_with_operation_name() {
    let conn = open_db_in_memory().unwrap();
    let store = open_store(&conn);
    let registry = registry();
    let repo = Repository::<Users, _>::try_new(&registry, DefaultQueryStrategy::new(&store)).unwrap();
    let ctx = CallingContext::system();

    let err = repo.get(2.5_f64, &ctx, &QueryOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        RepoError::UnsupportedReference {
            operation: "get",
            ..
        }
    ));

    let err = repo.record_transactional(2.5_f64, &ctx, None).unwrap_err();
    assert!(matches!(
        err,
        RepoError::UnsupportedReference {
            operation: "record_transactional",
            ..
        }
    ));
}

#[test]
fn match_is_not_implemented() {
    let conn = open_db_in_memory().unwrap();
    let store = open_store(&conn);
    let registry = registry();
    let repo = Repository::<Users, _>::try_new(&registry, DefaultQueryStrategy::new(&store)).unwrap();

    let err = repo
        .match_records(
            &FilterSpec::default(),
            &CallingContext::system(),
            &QueryOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::NotImplemented("match")));
}

#[test]
fn symbol_keyed_scope_round_trips_through_reference_strings() {
    let conn = open_db_in_memory().unwrap();
    let store = open_store(&conn);
    let registry = registry();
    let repo = Repository::<Flags, _>::try_new(&registry, DefaultQueryStrategy::new(&store)).unwrap();
    let ctx = CallingContext::system();
    let options = QueryOptions::default();

    let beta = Flag::new("beta", true);
    repo.create(&beta, &ctx, &options).unwrap();

    let encoded = repo.encode(ReferenceInput::Entity(beta.clone())).unwrap();
    assert_eq!(encoded, "ref.flag.beta");
    assert_eq!(repo.get(encoded.as_str(), &ctx, &options).unwrap(), Some(beta.clone()));
    assert_eq!(
        repo.get(Symbol::new("beta").unwrap(), &ctx, &options)
            .unwrap(),
        Some(beta)
    );
    assert_eq!(repo.get("beta", &ctx, &options).unwrap(), None);
}

#[test]
fn encoded_keys_are_distinct_from_numeric_keys() {
    let conn = open_db_in_memory().unwrap();
    let store = open_store(&conn);
    let registry = registry();
    let repo = Repository::<Tags, _>::try_new(&registry, DefaultQueryStrategy::new(&store)).unwrap();
    let ctx = CallingContext::system();
    let options = QueryOptions::default();

    let answer = Tag::new("42", "answer");
    let spaced = Tag::new("rust lang", "language");
    let record = repo.create(&answer, &ctx, &options).unwrap();
    assert_eq!(record.identifier, Identifier::Encoded("42".to_string()));
    repo.create(&spaced, &ctx, &options).unwrap();

    assert_eq!(repo.get("42", &ctx, &options).unwrap(), Some(answer.clone()));
    assert_eq!(repo.get(42_i64, &ctx, &options).unwrap(), None);
    assert_eq!(
        repo.get("rust lang", &ctx, &options).unwrap(),
        Some(spaced.clone())
    );

    let encoded = repo.encode(ReferenceInput::Entity(answer.clone())).unwrap();
    assert_eq!(encoded, "ref.tag.\"42\"");
    assert_eq!(
        repo.get(encoded.as_str(), &ctx, &options).unwrap(),
        Some(answer.clone())
    );
    assert_eq!(repo.get("ref.tag.42", &ctx, &options).unwrap(), None);

    let page = repo.list(&ctx, &options).unwrap().unwrap();
    let records = page.records().unwrap();
    assert_eq!(
        records
            .iter()
            .map(|record| record.identifier.clone())
            .collect::<Vec<_>>(),
        vec![
            Identifier::Encoded("42".to_string()),
            Identifier::Encoded("rust lang".to_string()),
        ]
    );
    assert_eq!(page.entities().unwrap(), vec![answer, spaced]);

    repo.delete("42", &ctx, &options).unwrap();
    assert_eq!(repo.get("42", &ctx, &options).unwrap(), None);
}

#[test]
fn numeric_and_encoded_keys_address_different_users() {
    let conn = open_db_in_memory().unwrap();
    let store = open_store(&conn);
    let registry = registry();
    let repo = Repository::<Users, _>::try_new(&registry, DefaultQueryStrategy::new(&store)).unwrap();
    let ctx = CallingContext::system();
    let options = QueryOptions::default();

    let user = User::new(42, "Zed", 33);
    repo.create(&user, &ctx, &options).unwrap();

    assert_eq!(repo.get(42_i64, &ctx, &options).unwrap(), Some(user));
    assert_eq!(repo.get("42", &ctx, &options).unwrap(), None);
}

#[test]
fn repository_requires_a_registered_prefix() {
    let conn = open_db_in_memory().unwrap();
    let store = open_store(&conn);
    let registry = SrefRegistry::new();

    let err = Repository::<Users, _>::try_new(&registry, DefaultQueryStrategy::new(&store))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        RepoError::Registry(RegistryError::ScopeNotFound(_))
    ));
}
