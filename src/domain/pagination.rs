const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn parse(page: Option<i64>, limit: Option<i64>) -> Result<Pagination, String> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_LIMIT);

        if page < 1 {
            return Err("The page must be greater than or equal to 1".to_string());
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(format!("The limit must be between 1 and {}", MAX_LIMIT));
        }
        if (page - 1).checked_mul(limit).is_none() {
            return Err("The page is out of range".to_string());
        }

        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}
