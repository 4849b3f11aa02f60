use kennel_core::{
    open_db_in_memory, Address, CrudRepository, Dog, DogRepository, PageRequest, QueryError,
    QueryValue, RepoError, SqliteRepository,
};
use rusqlite::Connection;

const BORN_2020: i64 = 1_577_836_800_000;
const BORN_2023: i64 = 1_672_531_200_000;

fn names(dogs: &[Dog]) -> Vec<&str> {
    dogs.iter().map(|dog| dog.name.as_str()).collect()
}

fn seed(conn: &Connection) {
    let repo = SqliteRepository::<Dog>::new(conn);
    for (name, age, birth) in [
        ("狼牙", 1, BORN_2023),
        ("狼王", 9, BORN_2020),
        ("雪狼", 2, BORN_2023),
        ("黄狗", 8, BORN_2023),
        ("黑狗", 4, BORN_2023),
    ] {
        repo.save(Dog::new(name, age).born_at(birth)).unwrap();
    }
}

#[test]
fn starting_with_and_id_less_than_filters_by_prefix() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let repo = DogRepository::try_new(&conn).unwrap();

    let dogs = repo
        .find_by_name_starting_with_and_id_less_than("狼", 10)
        .unwrap();
    assert_eq!(names(&dogs), vec!["狼牙", "狼王"]);

    let dogs = repo
        .find_by_name_starting_with_and_id_less_than("狼", 2)
        .unwrap();
    assert_eq!(names(&dogs), vec!["狼牙"]);
}

#[test]
fn ending_with_and_id_less_than_filters_by_suffix() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let repo = DogRepository::try_new(&conn).unwrap();

    let dogs = repo
        .find_by_name_ending_with_and_id_less_than("狗", 10)
        .unwrap();
    assert_eq!(names(&dogs), vec!["黄狗", "黑狗"]);
}

#[test]
fn age_in_or_birth_less_than_combines_with_or() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let repo = DogRepository::try_new(&conn).unwrap();

    let dogs = repo
        .find_by_age_in_or_birth_less_than(vec![10, 9, 8], BORN_2023)
        .unwrap();
    assert_eq!(names(&dogs), vec!["狼王", "黄狗"]);

    let dogs = repo
        .find_by_age_in_or_birth_less_than(vec![1, 4], BORN_2023)
        .unwrap();
    assert_eq!(names(&dogs), vec!["狼牙", "狼王", "黑狗"]);
}

#[test]
fn address_id_binds_direct_field_unless_traversal_is_written() {
    let conn = open_db_in_memory().unwrap();
    let address = SqliteRepository::<Address>::new(&conn)
        .save(Address::new("江苏", "南京"))
        .unwrap();
    let address_id = address.id.unwrap();
    let repo = DogRepository::try_new(&conn).unwrap();
    repo.save(Dog::new("有家", 2).living_at(address_id)).unwrap();
    // Dangling foreign key: only the direct column matches it.
    repo.save(Dog::new("流浪", 3).living_at(address_id + 40))
        .unwrap();

    assert_eq!(names(&repo.find_by_address_id(address_id).unwrap()), vec!["有家"]);
    assert_eq!(
        names(&repo.find_by_address_id(address_id + 40).unwrap()),
        vec!["流浪"]
    );
    assert_eq!(
        names(&repo.find_by_address_traversal_id(address_id).unwrap()),
        vec!["有家"]
    );
    assert!(repo
        .find_by_address_traversal_id(address_id + 40)
        .unwrap()
        .is_empty());
}

#[test]
fn relation_attributes_are_queryable_by_name() {
    let conn = open_db_in_memory().unwrap();
    let addresses = SqliteRepository::<Address>::new(&conn);
    let hangzhou = addresses.save(Address::new("浙江", "杭州")).unwrap();
    let nanjing = addresses.save(Address::new("江苏", "南京")).unwrap();
    let repo = DogRepository::try_new(&conn).unwrap();
    repo.save(Dog::new("西湖", 1).living_at(hangzhou.id.unwrap()))
        .unwrap();
    repo.save(Dog::new("秦淮", 1).living_at(nanjing.id.unwrap()))
        .unwrap();

    let dogs = repo.find_by("findByAddressCity", vec!["杭州".into()]).unwrap();
    assert_eq!(names(&dogs), vec!["西湖"]);
}

#[test]
fn count_and_exists_subjects() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let repo = DogRepository::try_new(&conn).unwrap();

    assert_eq!(
        repo.count_by("countByNameStartingWith", vec!["狼".into()])
            .unwrap(),
        2
    );
    assert!(repo
        .exists_by("existsByAgeGreaterThan", vec![8.into()])
        .unwrap());
    assert!(!repo
        .exists_by("existsByAgeGreaterThan", vec![9.into()])
        .unwrap());
}

#[test]
fn derived_queries_page_their_results() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let repo = DogRepository::try_new(&conn).unwrap();

    let page = repo
        .find_page_by(
            "findByBirthGreaterThanEqual",
            vec![QueryValue::Timestamp(BORN_2023)],
            &PageRequest::of(1, 3).unwrap(),
        )
        .unwrap();
    assert_eq!(page.total_elements, 4);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.number_of_elements(), 1);
}

#[test]
fn resolution_errors_surface_before_any_statement() {
    let conn = open_db_in_memory().unwrap();
    let repo = DogRepository::try_new(&conn).unwrap();

    let err = repo.find_by("findByWeight", vec![3.into()]).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Query(QueryError::UnresolvedAttribute { .. })
    ));

    let err = repo.find_by("findByName", vec![]).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Query(QueryError::ArityMismatch {
            expected: 1,
            actual: 0,
            ..
        })
    ));

    let err = repo.find_by("deleteByName", vec!["x".into()]).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Query(QueryError::InvalidMethodName { .. })
    ));
}

#[test]
fn like_wildcards_in_arguments_match_literally() {
    let conn = open_db_in_memory().unwrap();
    let repo = DogRepository::try_new(&conn).unwrap();
    repo.save(Dog::new("100%狗", 1)).unwrap();
    repo.save(Dog::new("100个狗", 1)).unwrap();

    let dogs = repo
        .find_by("findByNameStartingWith", vec!["100%".into()])
        .unwrap();
    assert_eq!(names(&dogs), vec!["100%狗"]);
}
