//! Pagination and sorting model.
//!
//! # Invariants
//! - Page indices are zero-based.
//! - `total_pages == ceil(total_elements / size)`.
//! - `content.len() <= size`.

use crate::model::schema::EntitySchema;
use crate::query::path::ResolvedPath;
use crate::query::{QueryError, QueryResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One sort key: attribute path (`age`, `address.city`) and direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Desc,
        }
    }
}

/// Ordered list of sort keys. Empty means store order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub orders: Vec<Order>,
}

impl Sort {
    pub fn by(orders: impl IntoIterator<Item = Order>) -> Self {
        Self {
            orders: orders.into_iter().collect(),
        }
    }

    pub fn unsorted() -> Self {
        Self::default()
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn and(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    /// Validates every sort key against `schema`.
    pub(crate) fn resolve(
        &self,
        schema: &'static EntitySchema,
    ) -> QueryResult<Vec<(ResolvedPath, Direction)>> {
        self.orders
            .iter()
            .map(|order| Ok((ResolvedPath::parse(schema, &order.property)?, order.direction)))
            .collect()
    }
}

/// Validated page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    size: u32,
    sort: Sort,
}

impl PageRequest {
    /// Creates an unsorted page request.
    ///
    /// # Errors
    /// - `InvalidPageRequest` when `page < 0` or `size <= 0`, or either
    ///   value does not fit `u32`.
    pub fn of(page: i64, size: i64) -> QueryResult<Self> {
        Self::of_sorted(page, size, Sort::unsorted())
    }

    pub fn of_sorted(page: i64, size: i64, sort: Sort) -> QueryResult<Self> {
        let invalid = || QueryError::InvalidPageRequest { page, size };
        if page < 0 || size <= 0 {
            return Err(invalid());
        }
        Ok(Self {
            page: u32::try_from(page).map_err(|_| invalid())?,
            size: u32::try_from(size).map_err(|_| invalid())?,
            sort,
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            size: self.size,
            sort: self.sort.clone(),
        }
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: u64,
    pub total_pages: u64,
    /// Zero-based index of this page.
    pub number: u32,
    pub size: u32,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        Self {
            content,
            total_elements,
            total_pages: total_pages(total_elements, request.size()),
            number: request.page(),
            size: request.size(),
        }
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.number) + 1 < self.total_pages
    }

    pub fn is_first(&self) -> bool {
        self.number == 0
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            number: self.number,
            size: self.size,
        }
    }
}

fn total_pages(total_elements: u64, size: u32) -> u64 {
    total_elements.div_ceil(u64::from(size.max(1)))
}

#[cfg(test)]
mod tests {
    use super::{total_pages, Order, Page, PageRequest, Sort};
    use crate::model::dog::DOG_SCHEMA;
    use crate::query::QueryError;

    #[test]
    fn page_request_rejects_negative_page_and_non_positive_size() {
        for (page, size) in [(-1, 5), (0, 0), (2, -3)] {
            let err = PageRequest::of(page, size).unwrap_err();
            assert_eq!(err, QueryError::InvalidPageRequest { page, size });
        }
        assert!(PageRequest::of(0, 1).is_ok());
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 5), 0);
        assert_eq!(total_pages(5, 5), 1);
        assert_eq!(total_pages(26, 5), 6);
        assert_eq!(total_pages(1, 10), 1);
    }

    #[test]
    fn page_reports_position_and_counts() {
        let request = PageRequest::of(3, 5).unwrap();
        assert_eq!(request.offset(), 15);

        let page = Page::new(vec![1, 2, 3, 4, 5], &request, 26);
        assert_eq!(page.total_pages, 6);
        assert_eq!(page.number_of_elements(), 5);
        assert!(page.has_next());
        assert!(!page.is_first());
        assert_eq!(page.map(|value| value * 2).content[0], 2);
    }

    #[test]
    fn sort_resolution_validates_properties() {
        let sort = Sort::by([Order::desc("id"), Order::asc("age")]);
        assert_eq!(sort.resolve(&DOG_SCHEMA).unwrap().len(), 2);

        let err = Sort::by([Order::asc("height")])
            .resolve(&DOG_SCHEMA)
            .unwrap_err();
        assert!(matches!(err, QueryError::UnresolvedAttribute { .. }));
    }
}
