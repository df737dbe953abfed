//! Store trait seams and shared query types.
//!
//! Handlers and middleware only ever see these traits; the concrete backend
//! is chosen at startup. The traits are object safe so tests can substitute
//! failing or canned implementations where needed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Movie, Scope, Token, User};
use crate::validation::Validator;

pub mod memory;

pub use memory::MemoryStore;

/// Failures a store can report.
///
/// `NotFound` and `EditConflict` are expected outcomes a handler maps onto
/// 404/409 responses; `Unavailable` is an infrastructure fault and always
/// surfaces as a 500.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("edit conflict")]
    EditConflict,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The permission codes granted to one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn new(codes: Vec<String>) -> Self {
        Self(codes)
    }

    pub fn includes(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }
}

/// Listing parameters for collection endpoints.
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: Vec<&'static str>,
}

impl Filters {
    /// Validate page bounds and that the sort key is on the safelist.
    pub fn validate(&self, v: &mut Validator) {
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(
            self.page <= 10_000_000,
            "page",
            "must be a maximum of 10 million",
        );
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(
            self.page_size <= 100,
            "page_size",
            "must be a maximum of 100",
        );
        v.check(
            self.sort_safelist.iter().any(|s| *s == self.sort),
            "sort",
            "invalid sort value",
        );
    }

    /// Sort key with any leading direction marker stripped.
    pub fn sort_column(&self) -> &str {
        self.sort.trim_start_matches('-')
    }

    pub fn sort_descending(&self) -> bool {
        self.sort.starts_with('-')
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

/// Pagination details returned alongside a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

impl Metadata {
    /// Compute pagination metadata; an empty result set yields the zero value.
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 {
            return Metadata::default();
        }

        Metadata {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

#[async_trait]
pub trait MovieStore: Send + Sync {
    /// Insert a new record, filling in `id`, `created_at` and `version`.
    async fn insert(&self, movie: &mut Movie) -> Result<(), StoreError>;

    async fn get(&self, id: i64) -> Result<Movie, StoreError>;

    /// Title substring match plus genre containment, sorted and paginated.
    async fn list(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError>;

    /// Update with an optimistic concurrency check: succeeds only when the
    /// stored version matches `movie.version`, then increments it.
    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new account, filling in `id`, `created_at` and `version`.
    /// Fails with `DuplicateEmail` when the address is taken.
    async fn insert(&self, user: &mut User) -> Result<(), StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Update with the same compare-and-increment check as movies.
    async fn update(&self, user: &mut User) -> Result<(), StoreError>;

    /// Resolve the account holding an unexpired token in the given scope.
    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> Result<User, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Generate and persist a token; the returned value is the only place
    /// the plaintext ever exists.
    async fn create(&self, user_id: i64, ttl: Duration, scope: Scope)
    -> Result<Token, StoreError>;

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError>;

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError>;
}

/// The bundle of store handles a request touches.
#[derive(Clone)]
pub struct Stores {
    pub movies: Arc<dyn MovieStore>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
}

impl Stores {
    /// All stores backed by one shared in-memory database.
    pub fn in_memory() -> Self {
        let backend = Arc::new(MemoryStore::new());

        Stores {
            movies: backend.clone(),
            users: backend.clone(),
            tokens: backend.clone(),
            permissions: backend,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn filters(page: i64, page_size: i64, sort: &str) -> Filters {
        Filters {
            page,
            page_size,
            sort: sort.to_string(),
            sort_safelist: vec!["id", "title", "-id", "-title"],
        }
    }

    #[test]
    fn test_filters_validate_ok() {
        let mut v = Validator::new();
        filters(1, 20, "id").validate(&mut v);
        assert!(v.valid());
    }

    #[test]
    fn test_filters_reject_bad_page() {
        let mut v = Validator::new();
        filters(0, 20, "id").validate(&mut v);
        assert!(!v.valid());
    }

    #[test]
    fn test_filters_reject_unknown_sort() {
        let mut v = Validator::new();
        filters(1, 20, "rating").validate(&mut v);
        assert!(!v.valid());
    }

    #[test]
    fn test_sort_direction() {
        let f = filters(1, 20, "-title");
        assert_eq!(f.sort_column(), "title");
        assert!(f.sort_descending());

        let f = filters(1, 20, "title");
        assert!(!f.sort_descending());
    }

    #[test]
    fn test_offset() {
        assert_eq!(filters(1, 20, "id").offset(), 0);
        assert_eq!(filters(3, 20, "id").offset(), 40);
    }

    #[test]
    fn test_metadata_empty() {
        assert_eq!(Metadata::calculate(0, 1, 20), Metadata::default());
    }

    #[test]
    fn test_metadata_last_page_rounds_up() {
        let meta = Metadata::calculate(41, 2, 20);
        assert_eq!(meta.first_page, 1);
        assert_eq!(meta.last_page, 3);
        assert_eq!(meta.total_records, 41);
    }

    #[test]
    fn test_permissions_includes() {
        let perms = Permissions::new(vec!["movies:read".to_string()]);
        assert!(perms.includes("movies:read"));
        assert!(!perms.includes("movies:write"));
    }
}
