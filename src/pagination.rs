use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PER_PAGE: u64 = 24;
pub const MAX_PER_PAGE: u64 = 100;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct Pagination {
    #[param(default = 1, minimum = 1)]
    pub page: Option<u64>,
    #[param(default = 24, minimum = 1, maximum = 100)]
    pub per_page: Option<u64>,
}

impl Pagination {
    /// `(page, per_page)` with page ≥ 1 and per_page clamped to [1, 100].
    pub fn resolve(&self) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        (page, per_page)
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total_items: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub page_size: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total_items: u64, page: u64, page_size: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_items.div_ceil(page_size)
        };

        Self {
            data,
            total_items,
            total_pages,
            current_page: page,
            page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_enforced() {
        let p = Pagination { page: Some(0), per_page: Some(500) };
        assert_eq!(p.resolve(), (1, 100));
        assert_eq!(Pagination::default().resolve(), (1, 24));
        assert_eq!(Pagination { page: Some(3), per_page: Some(0) }.resolve(), (3, 1));
    }

    #[test]
    fn total_pages_round_up() {
        let r = PaginatedResponse::new(vec![1, 2], 49, 1, 24);
        assert_eq!(r.total_pages, 3);
    }
}
