use kennel_core::{
    open_db_in_memory, Address, CrudRepository, Dog, Order, PageRequest, Predicate, QueryError,
    QueryResult, RepoError, Root, Sort, SqliteRepository,
};
use rusqlite::Connection;

fn seed(conn: &Connection, count: i64) {
    let repo = SqliteRepository::<Dog>::new(conn);
    for i in 1..=count {
        repo.save(Dog::new(format!("dog-{i:02}"), i % 5)).unwrap();
    }
}

fn ids(dogs: &[Dog]) -> Vec<i64> {
    dogs.iter().filter_map(|dog| dog.id).collect()
}

#[test]
fn specification_composes_with_paging() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, 20);
    let repo = SqliteRepository::<Dog>::new(&conn);

    let spec = |root: &Root<Dog>| -> QueryResult<Predicate> { Ok(root.get("id")?.gt(5)) };
    let request = PageRequest::of_sorted(2, 5, Sort::by([Order::asc("id")])).unwrap();
    let page = repo.find_all_matching(&spec, &request).unwrap();

    assert_eq!(page.total_elements, 15);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.number, 2);
    assert_eq!(page.number_of_elements(), 5);
    assert_eq!(ids(&page.content), vec![16, 17, 18, 19, 20]);
    assert!(!page.has_next());
}

#[test]
fn composed_predicates_filter_and_count() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, 10);
    let repo = SqliteRepository::<Dog>::new(&conn);

    let spec = |root: &Root<Dog>| -> QueryResult<Predicate> {
        let age = root.get("age")?;
        Ok(age
            .eq(0)
            .or(age.between(3, 4))
            .and(root.get("id")?.le(8)))
    };
    let dogs = repo.find_all_where(&spec).unwrap();
    assert_eq!(ids(&dogs), vec![3, 4, 5, 8]);
    assert_eq!(repo.count_where(&spec).unwrap(), 4);

    let negated = |root: &Root<Dog>| -> QueryResult<Predicate> {
        Ok(root.get("name")?.ends_with("0").not())
    };
    assert_eq!(repo.count_where(&negated).unwrap(), 9);
}

#[test]
fn find_one_where_rejects_ambiguous_matches() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, 4);
    let repo = SqliteRepository::<Dog>::new(&conn);

    let by_id = |root: &Root<Dog>| -> QueryResult<Predicate> { Ok(root.get("id")?.eq(3)) };
    assert_eq!(repo.find_one_where(&by_id).unwrap().unwrap().id, Some(3));

    let none = |root: &Root<Dog>| -> QueryResult<Predicate> { Ok(root.get("id")?.gt(100)) };
    assert!(repo.find_one_where(&none).unwrap().is_none());

    let many = |root: &Root<Dog>| -> QueryResult<Predicate> { Ok(root.get("id")?.gt(1)) };
    assert!(matches!(
        repo.find_one_where(&many),
        Err(RepoError::InvalidData(_))
    ));
}

#[test]
fn joins_filter_on_related_attributes() {
    let conn = open_db_in_memory().unwrap();
    let addresses = SqliteRepository::<Address>::new(&conn);
    let zhejiang = addresses.save(Address::new("浙江", "杭州")).unwrap();
    let jiangsu = addresses.save(Address::new("江苏", "苏州")).unwrap();
    let repo = SqliteRepository::<Dog>::new(&conn);
    repo.save(Dog::new("a", 1).living_at(zhejiang.id.unwrap()))
        .unwrap();
    repo.save(Dog::new("b", 1).living_at(jiangsu.id.unwrap()))
        .unwrap();
    repo.save(Dog::new("c", 1)).unwrap();

    let spec = |root: &Root<Dog>| -> QueryResult<Predicate> {
        Ok(root.join("address")?.get("city")?.ends_with("州"))
    };
    assert_eq!(repo.count_where(&spec).unwrap(), 2);

    let homeless = |root: &Root<Dog>| -> QueryResult<Predicate> {
        Ok(root.get("addressId")?.is_null())
    };
    let dogs = repo.find_all_where(&homeless).unwrap();
    assert_eq!(dogs.len(), 1);
    assert_eq!(dogs[0].name, "c");
}

#[test]
fn specification_errors_abort_the_query() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::<Dog>::new(&conn);
    let spec = |root: &Root<Dog>| -> QueryResult<Predicate> { Ok(root.get("color")?.eq("red")) };
    let err = repo
        .find_all_matching(&spec, &PageRequest::of(0, 10).unwrap())
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Query(QueryError::UnresolvedAttribute { .. })
    ));
}
