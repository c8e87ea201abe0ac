use serde::{Deserialize, Serialize};

const DEFAULT_PER_PAGE: usize = 5;
const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    DEFAULT_PER_PAGE
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl Pagination {
    pub fn new(page: usize, per_page: usize) -> Self {
        Self { page, per_page }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> usize {
        self.per_page
    }

    pub fn total_pages(&self, total: usize) -> usize {
        total.div_ceil(self.per_page)
    }

    pub fn check(&self) -> Self {
        if self.page < 1 || self.per_page < 1 {
            return Self::default();
        }
        Self {
            page: self.page,
            per_page: self.per_page.min(MAX_PER_PAGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_falls_back_to_defaults() {
        let p = Pagination::new(0, 10).check();
        assert_eq!((p.page, p.per_page), (1, DEFAULT_PER_PAGE));
        let p = Pagination::new(3, 0).check();
        assert_eq!((p.page, p.per_page), (1, DEFAULT_PER_PAGE));
        let p = Pagination::new(2, 1000).check();
        assert_eq!((p.page, p.per_page), (2, MAX_PER_PAGE));
    }

    #[test]
    fn test_offset_and_total_pages() {
        let p = Pagination::new(3, 5);
        assert_eq!(p.offset(), 10);
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(11), 3);
        assert_eq!(p.total_pages(15), 3);
    }
}
