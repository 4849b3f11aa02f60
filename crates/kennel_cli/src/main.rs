//! Kennel CLI demo.
//!
//! # Responsibility
//! - Open a store from `KENNEL_*` environment variables, or from a JSON
//!   config file passed as the first argument.
//! - Seed a few dogs and print the results of the declared queries.

use kennel_core::{
    init_logging, open_with_config, CrudRepository, Dog, DogRepository, DogService, Order,
    PageRequest, Predicate, QueryResult, Root, Sort, StoreConfig, TxMode,
};
use std::error::Error;
use std::process::ExitCode;

fn load_config() -> Result<StoreConfig, Box<dyn Error>> {
    match std::env::args().nth(1) {
        Some(path) => Ok(StoreConfig::from_json(&std::fs::read_to_string(path)?)?),
        None => Ok(StoreConfig::from_env()?),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = load_config()?;
    if let Some(logging) = &config.logging {
        init_logging(logging)?;
    }
    let mut conn = open_with_config(&config)?;
    println!("kennel_core ping={}", kennel_core::ping());
    println!("kennel_core version={}", kennel_core::core_version());

    let mut service = DogService::new(&mut conn);
    let existing = service.transactional(TxMode::ReadOnly, |repo| repo.count())?;
    if existing == 0 {
        let seeded = service.save_dogs(
            ["狼牙", "狼王", "雪狼", "阿黄", "大黄"]
                .into_iter()
                .zip(1..)
                .map(|(name, age)| Dog::new(name, age))
                .collect(),
        )?;
        log::info!("event=seed module=cli status=ok dogs={}", seeded.len());
    }

    let request = PageRequest::of_sorted(0, 3, Sort::by([Order::desc("id"), Order::asc("age")]))?;
    let page = service.find_page(&request)?;
    println!(
        "page {}/{} total={}",
        page.number + 1,
        page.total_pages,
        page.total_elements
    );
    for dog in &page.content {
        println!("  {}", serde_json::to_string(dog)?);
    }

    drop(service);
    let repo = DogRepository::try_new(&conn)?;
    for dog in repo.find_by_name_starting_with_and_id_less_than("狼", 10)? {
        println!("starts with 狼: {} (id={:?})", dog.name, dog.id);
    }
    let older = repo.find_all_where(&|root: &Root<Dog>| -> QueryResult<Predicate> {
        Ok(root.get("age")?.gt(2))
    })?;
    println!("older than 2: {}", older.len());
    println!("native count: {}", repo.query_count()?);
    if let Some(dog) = repo.find_max_id_dog()? {
        println!("max id dog: {}", dog.name);
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("kennel: {err}");
            ExitCode::FAILURE
        }
    }
}
