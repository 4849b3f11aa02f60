use kennel_core::{
    open_db_in_memory, Address, CrudRepository, Dog, DogRepository, LiteralQuery, Params,
    QueryError, QueryValue, RepoError, SqliteRepository, TxMode, TxScope,
};
use rusqlite::Connection;

fn seed(conn: &Connection) -> Vec<Dog> {
    let repo = SqliteRepository::<Dog>::new(conn);
    [("金毛", 3), ("小金", 5), ("金毛", 7), ("哈士奇", 3)]
        .into_iter()
        .map(|(name, age)| repo.save(Dog::new(name, age)).unwrap())
        .collect()
}

#[test]
fn declared_queries_return_expected_rows() {
    let conn = open_db_in_memory().unwrap();
    let dogs = seed(&conn);
    let repo = DogRepository::try_new(&conn).unwrap();

    let max = repo.find_max_id_dog().unwrap().unwrap();
    assert_eq!(max, dogs[3]);

    let positional = repo.query_by_name_and_age_positional("金毛", 7).unwrap();
    assert_eq!(positional, vec![dogs[2].clone()]);

    let named = repo.query_by_age_and_name_named(3, "金毛").unwrap();
    assert_eq!(named, vec![dogs[0].clone()]);

    let containing = repo.query_by_name_containing("金").unwrap();
    assert_eq!(containing.len(), 3);

    assert_eq!(repo.query_count().unwrap(), 4);
}

#[test]
fn update_inside_read_write_scope_changes_row() {
    let mut conn = open_db_in_memory().unwrap();
    let dogs = seed(&conn);
    let id = dogs[0].id.unwrap();

    let scope = TxScope::begin(&mut conn, TxMode::ReadWrite).unwrap();
    let repo = DogRepository::try_in_scope(&scope).unwrap();
    assert_eq!(repo.update_dog_age(11, id).unwrap(), 1);
    assert_eq!(repo.update_dog_age(11, 999).unwrap(), 0);
    drop(repo);
    scope.commit().unwrap();

    let repo = DogRepository::try_new(&conn).unwrap();
    assert_eq!(repo.find_by_id(id).unwrap().unwrap().age, Some(11));
}

#[test]
fn update_outside_scope_fails_and_leaves_row_unchanged() {
    let conn = open_db_in_memory().unwrap();
    let dogs = seed(&conn);
    let id = dogs[0].id.unwrap();
    let repo = DogRepository::try_new(&conn).unwrap();

    let err = repo.update_dog_age(20, id).unwrap_err();
    assert!(matches!(err, RepoError::ReadOnlyTransaction(_)));
    assert_eq!(repo.find_by_id(id).unwrap().unwrap().age, Some(3));
}

#[test]
fn ad_hoc_entity_queries_traverse_relations() {
    let conn = open_db_in_memory().unwrap();
    let address = SqliteRepository::<Address>::new(&conn)
        .save(Address::new("四川", "成都"))
        .unwrap();
    let repo = SqliteRepository::<Dog>::new(&conn);
    let housed = repo
        .save(Dog::new("熊猫犬", 2).living_at(address.id.unwrap()))
        .unwrap();
    repo.save(Dog::new("流浪", 2)).unwrap();

    let found = repo
        .query_list(
            &LiteralQuery::entity("select d from Dog d where d.address.city = :city"),
            &Params::named([("city", "成都")]),
        )
        .unwrap();
    assert_eq!(found, vec![housed]);

    let average = repo
        .query_scalar(
            &LiteralQuery::entity("select avg(d.age) from Dog d"),
            &Params::none(),
        )
        .unwrap();
    assert_eq!(average, Some(QueryValue::Real(2.0)));
}

#[test]
fn scalar_results_keep_real_and_blob_values() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::<Dog>::new(&conn);
    repo.save(Dog::new("一岁", 1)).unwrap();
    repo.save(Dog::new("两岁", 2)).unwrap();

    let average = repo
        .query_scalar(
            &LiteralQuery::native("select avg(age) from JS_DOGS"),
            &Params::none(),
        )
        .unwrap();
    assert_eq!(average, Some(QueryValue::Real(1.5)));
    assert_eq!(average.unwrap().as_f64(), Some(1.5));

    let rows = repo
        .query_rows(
            &LiteralQuery::native("select x'CAFE', max(age) * 0.5 from JS_DOGS"),
            &Params::none(),
        )
        .unwrap();
    assert_eq!(
        rows,
        vec![vec![QueryValue::Blob(vec![0xca, 0xfe]), QueryValue::Real(1.0)]]
    );
}

#[test]
fn list_parameters_are_rejected_instead_of_matching_nothing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::<Dog>::new(&conn);
    repo.save(Dog::new("一岁", 1)).unwrap();
    repo.save(Dog::new("两岁", 2)).unwrap();

    let err = repo
        .query_list(
            &LiteralQuery::entity("select d from Dog d where d.age in (:ages)"),
            &Params::named([("ages", vec![1, 2])]),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Query(QueryError::InvalidArgument { .. })
    ));

    let found = repo
        .find_by("findByAgeIn", vec![vec![1, 2].into()])
        .unwrap();
    assert_eq!(found.len(), 2);
}

#[test]
fn colons_and_paths_inside_string_literals_are_plain_text() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::<Dog>::new(&conn);
    let colon = repo.save(Dog::new("a:b", 4)).unwrap();
    let dotted = repo.save(Dog::new("d.name", 5)).unwrap();
    repo.save(Dog::new("plain", 6)).unwrap();

    let count = repo
        .count_native(
            &LiteralQuery::native("select count(*) from JS_DOGS where DOG_NAME = 'a:b'"),
            &Params::none(),
        )
        .unwrap();
    assert_eq!(count, 1);

    let clock = repo
        .query_scalar(
            &LiteralQuery::native("select strftime('%H:%M', '2024-01-02 03:04:05')"),
            &Params::none(),
        )
        .unwrap();
    assert_eq!(clock, Some(QueryValue::from("03:04")));

    let found = repo
        .query_list(
            &LiteralQuery::entity("select d from Dog d where d.name = 'a:b'"),
            &Params::none(),
        )
        .unwrap();
    assert_eq!(found, vec![colon]);

    let found = repo
        .query_list(
            &LiteralQuery::entity(
                "select d from Dog d where d.name = 'd.name' or d.name = 'it''s:x' or d.age = :age",
            ),
            &Params::named([("age", 99)]),
        )
        .unwrap();
    assert_eq!(found, vec![dotted]);
}

#[test]
fn native_rows_are_untyped() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let repo = SqliteRepository::<Dog>::new(&conn);

    let rows = repo
        .query_rows(
            &LiteralQuery::native(
                "select DOG_NAME, count(*) from JS_DOGS group by DOG_NAME order by DOG_NAME",
            ),
            &Params::none(),
        )
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.contains(&vec![QueryValue::from("金毛"), QueryValue::Integer(2)]));

    let count = repo
        .count_native(
            &LiteralQuery::native("select count(id) from JS_DOGS where age = ?1"),
            &Params::positional([3]),
        )
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn malformed_literal_queries_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::<Dog>::new(&conn);

    let err = repo
        .query_list(
            &LiteralQuery::entity("insert into Dog (name) values (:name)"),
            &Params::named([("name", "x")]),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Query(QueryError::UnsupportedStatement(_))
    ));

    let err = repo
        .query_list(
            &LiteralQuery::entity("select c from Cat c"),
            &Params::none(),
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::Query(QueryError::UnknownEntity(_))));

    let err = repo
        .query_list(
            &LiteralQuery::entity("select d from Dog d where d.name = :name"),
            &Params::positional(["x"]),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Query(QueryError::MixedParameterStyles(_))
    ));

    let err = repo
        .query_list(
            &LiteralQuery::entity("select d from Dog d where d.name = :name"),
            &Params::named([("nam", "x")]),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Query(QueryError::MissingParameter(_))
    ));
}
