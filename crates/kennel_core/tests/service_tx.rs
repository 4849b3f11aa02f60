use kennel_core::{
    open_db_in_memory, Address, CrudRepository, Dog, DogRepository, DogService, ErrorContext,
    LiteralQuery, PageRequest, Params, RepoError, SqliteRepository, TxMode, TxScope,
};
use rusqlite::Connection;

fn with_unique_names(conn: &Connection) {
    conn.execute_batch("CREATE UNIQUE INDEX uq_dog_name ON JS_DOGS(DOG_NAME);")
        .unwrap();
}

#[test]
fn save_dog_commits() {
    let mut conn = open_db_in_memory().unwrap();
    let saved = DogService::new(&mut conn)
        .save_dog(Dog::new("阿黄", 2))
        .unwrap();

    let repo = DogRepository::try_new(&conn).unwrap();
    assert_eq!(repo.find_by_id(saved.id.unwrap()).unwrap(), Some(saved));
}

#[test]
fn save_dogs_with_one_invalid_dog_leaves_store_unchanged() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = DogService::new(&mut conn);
    service.save_dog(Dog::new("existing", 1)).unwrap();

    let err = service
        .save_dogs(vec![
            Dog::new("a", 1),
            Dog::new("b", 2),
            Dog::new("", 3),
            Dog::new("d", 4),
        ])
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));

    let page = service.find_page(&PageRequest::of(0, 10).unwrap()).unwrap();
    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content[0].name, "existing");
}

#[test]
fn save_dogs_failing_mid_batch_leaves_store_unchanged() {
    let mut conn = open_db_in_memory().unwrap();
    with_unique_names(&conn);
    let mut service = DogService::new(&mut conn);
    service.save_dog(Dog::new("existing", 1)).unwrap();

    let err = service
        .save_dogs(vec![
            Dog::new("a", 1),
            Dog::new("b", 2),
            Dog::new("a", 3),
            Dog::new("d", 4),
        ])
        .unwrap_err();
    match err {
        RepoError::ConstraintViolation { context, .. } => {
            assert_eq!(context, ErrorContext::new("Dog", "save_all"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let count = service
        .transactional(TxMode::ReadOnly, |repo| repo.count())
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn save_all_failure_only_undoes_its_own_batch() {
    let mut conn = open_db_in_memory().unwrap();
    with_unique_names(&conn);

    let scope = TxScope::begin(&mut conn, TxMode::ReadWrite).unwrap();
    let repo = SqliteRepository::<Dog>::in_scope(&scope);
    repo.save(Dog::new("before", 1)).unwrap();

    let err = repo
        .save_all(vec![Dog::new("x", 1), Dog::new("y", 2), Dog::new("x", 3)])
        .unwrap_err();
    assert!(matches!(err, RepoError::ConstraintViolation { .. }));
    assert_eq!(repo.count().unwrap(), 1);

    repo.save_all(vec![Dog::new("x", 1), Dog::new("y", 2)])
        .unwrap();
    drop(repo);
    scope.commit().unwrap();

    let repo = SqliteRepository::<Dog>::new(&conn);
    let names: Vec<String> = repo
        .find_all()
        .unwrap()
        .into_iter()
        .map(|dog| dog.name)
        .collect();
    assert_eq!(names, vec!["before", "x", "y"]);
}

#[test]
fn store_constraint_failure_rolls_back_whole_scope() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = DogService::new(&mut conn);
    let first = service.save_dog(Dog::new("first", 1)).unwrap();

    let result = service.transactional(TxMode::ReadWrite, |repo| {
        repo.save(Dog::new("new", 3))?;
        repo.execute_modifying(
            &LiteralQuery::native("update JS_DOGS set DOG_NAME = NULL where id = ?1"),
            &Params::positional([first.id.unwrap()]),
        )
    });
    match result {
        Err(RepoError::ConstraintViolation { context, .. }) => {
            assert_eq!(context, ErrorContext::new("Dog", "execute_modifying"));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let count = service
        .transactional(TxMode::ReadOnly, |repo| repo.count())
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn update_dog_age_runs_in_read_write_scope() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = DogService::new(&mut conn);
    let dog = service.save_dog(Dog::new("rex", 1)).unwrap();

    assert_eq!(service.update_dog_age(6, dog.id.unwrap()).unwrap(), 1);
    let age = service
        .transactional(TxMode::ReadOnly, |repo| {
            Ok(repo.find_by_id(dog.id.unwrap())?.and_then(|dog| dog.age))
        })
        .unwrap();
    assert_eq!(age, Some(6));
}

#[test]
fn update_in_read_only_scope_fails_and_leaves_row_unchanged() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = DogService::new(&mut conn);
    let dog = service.save_dog(Dog::new("rex", 1)).unwrap();
    let id = dog.id.unwrap();

    let err = service
        .transactional(TxMode::ReadOnly, |repo| repo.update_dog_age(30, id))
        .unwrap_err();
    assert!(matches!(err, RepoError::ReadOnlyTransaction(_)));

    let err = service
        .transactional(TxMode::ReadOnly, |repo| repo.delete_by_id(id))
        .unwrap_err();
    assert!(matches!(err, RepoError::ReadOnlyTransaction(_)));

    let loaded = service
        .transactional(TxMode::ReadOnly, |repo| repo.find_by_id(id))
        .unwrap();
    assert_eq!(loaded, Some(dog));
}

#[test]
fn save_address_then_resolve_through_dog() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = DogService::new(&mut conn);
    let address = service.save_address(Address::new("广东", "深圳")).unwrap();
    let dog = service
        .save_dog(Dog::new("旺财", 4).living_at(address.id.unwrap()))
        .unwrap();

    let found = service
        .transactional(TxMode::ReadOnly, |repo| repo.find_with_address(dog.id.unwrap()))
        .unwrap()
        .unwrap();
    assert_eq!(found.dog, dog);
    assert_eq!(found.address, Some(address));

    let err = service
        .save_address(Address {
            city: Some("  ".to_string()),
            ..Address::new("广东", "广州")
        })
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}
