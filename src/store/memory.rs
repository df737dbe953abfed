//! In-memory store backend.
//!
//! One shared set of tables behind a `tokio::sync::RwLock` implements every
//! store trait, which keeps the cross-store joins (token to user, user to
//! permissions) trivially consistent. Writes take the lock briefly and never
//! hold it across I/O.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{Movie, Scope, Token, User, token};
use crate::store::{
    Filters, Metadata, MovieStore, PermissionStore, Permissions, StoreError, TokenStore, UserStore,
};

/// A persisted token: hash only, never plaintext.
#[derive(Debug, Clone)]
struct StoredToken {
    hash: [u8; 32],
    user_id: i64,
    expiry: DateTime<Utc>,
    scope: Scope,
}

#[derive(Default)]
struct Tables {
    movies: HashMap<i64, Movie>,
    next_movie_id: i64,
    users: HashMap<i64, User>,
    next_user_id: i64,
    tokens: Vec<StoredToken>,
    permissions: HashMap<i64, HashSet<String>>,
}

/// Shared in-memory database implementing all store traits.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert(&self, movie: &mut Movie) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        tables.next_movie_id += 1;
        movie.id = tables.next_movie_id;
        movie.created_at = Utc::now();
        movie.version = 1;

        tables.movies.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Movie, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }

        let tables = self.tables.read().await;
        tables.movies.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError> {
        let tables = self.tables.read().await;

        let title_lower = title.to_lowercase();
        let mut matches: Vec<Movie> = tables
            .movies
            .values()
            .filter(|m| title.is_empty() || m.title.to_lowercase().contains(&title_lower))
            .filter(|m| genres.iter().all(|g| m.genres.contains(g)))
            .cloned()
            .collect();

        let descending = filters.sort_descending();
        matches.sort_by(|a, b| {
            let ordering = match filters.sort_column() {
                "title" => a.title.cmp(&b.title),
                "year" => a.year.cmp(&b.year),
                "runtime" => a.runtime.0.cmp(&b.runtime.0),
                _ => a.id.cmp(&b.id),
            };
            // Ties fall back to id ascending so pagination is stable.
            let ordering = if descending { ordering.reverse() } else { ordering };
            ordering.then(a.id.cmp(&b.id))
        });

        let total = matches.len() as i64;
        let metadata = Metadata::calculate(total, filters.page, filters.page_size);

        let page: Vec<Movie> = matches
            .into_iter()
            .skip(filters.offset().max(0) as usize)
            .take(filters.limit().max(0) as usize)
            .collect();

        Ok((page, metadata))
    }

    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        let stored = tables
            .movies
            .get_mut(&movie.id)
            .ok_or(StoreError::NotFound)?;

        if stored.version != movie.version {
            return Err(StoreError::EditConflict);
        }

        movie.version += 1;
        movie.created_at = stored.created_at;
        *stored = movie.clone();
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }

        let mut tables = self.tables.write().await;
        tables
            .movies
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &mut User) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }

        tables.next_user_id += 1;
        user.id = tables.next_user_id;
        user.created_at = Utc::now();
        user.version = 1;

        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        let tables = self.tables.read().await;
        tables
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &mut User) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        if tables
            .users
            .values()
            .any(|u| u.email == user.email && u.id != user.id)
        {
            return Err(StoreError::DuplicateEmail);
        }

        let stored = tables.users.get_mut(&user.id).ok_or(StoreError::NotFound)?;

        if stored.version != user.version {
            return Err(StoreError::EditConflict);
        }

        user.version += 1;
        user.created_at = stored.created_at;
        *stored = user.clone();
        Ok(())
    }

    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> Result<User, StoreError> {
        let hash = token::hash_plaintext(plaintext);
        let now = Utc::now();

        let tables = self.tables.read().await;

        let user_id = tables
            .tokens
            .iter()
            .find(|t| t.hash == hash && t.scope == scope && t.expiry > now)
            .map(|t| t.user_id)
            .ok_or(StoreError::NotFound)?;

        tables
            .users
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn create(
        &self,
        user_id: i64,
        ttl: Duration,
        scope: Scope,
    ) -> Result<Token, StoreError> {
        let token = Token::generate(user_id, ttl, scope);

        let mut tables = self.tables.write().await;
        tables.tokens.push(StoredToken {
            hash: token.hash,
            user_id: token.user_id,
            expiry: token.expiry,
            scope: token.scope,
        });

        Ok(token)
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .tokens
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        let tables = self.tables.read().await;

        let codes = tables
            .permissions
            .get(&user_id)
            .map(|set| {
                let mut codes: Vec<String> = set.iter().cloned().collect();
                codes.sort();
                codes
            })
            .unwrap_or_default();

        Ok(Permissions::new(codes))
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let granted = tables.permissions.entry(user_id).or_default();

        for code in codes {
            granted.insert((*code).to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::Runtime;
    use crate::models::user::Password;

    fn new_movie(title: &str, year: i32, genres: &[&str]) -> Movie {
        Movie {
            id: 0,
            created_at: Utc::now(),
            title: title.to_string(),
            year,
            runtime: Runtime(100),
            genres: genres.iter().map(|g| (*g).to_string()).collect(),
            version: 0,
        }
    }

    fn new_user(name: &str, email: &str) -> User {
        let mut password = Password::default();
        password.set("pa55word1234").unwrap();

        User {
            id: 0,
            created_at: Utc::now(),
            name: name.to_string(),
            email: email.to_string(),
            password,
            activated: false,
            version: 0,
        }
    }

    fn default_filters() -> Filters {
        Filters {
            page: 1,
            page_size: 20,
            sort: "id".to_string(),
            sort_safelist: vec!["id", "title", "year", "runtime"],
        }
    }

    #[tokio::test]
    async fn test_movie_insert_assigns_identity() {
        let store = MemoryStore::new();
        let mut movie = new_movie("Casablanca", 1942, &["drama"]);

        MovieStore::insert(&store, &mut movie).await.unwrap();
        assert_eq!(movie.id, 1);
        assert_eq!(movie.version, 1);

        let fetched = MovieStore::get(&store, 1).await.unwrap();
        assert_eq!(fetched.title, "Casablanca");
    }

    #[tokio::test]
    async fn test_movie_get_missing() {
        let store = MemoryStore::new();
        assert_eq!(
            MovieStore::get(&store, 42).await.unwrap_err(),
            StoreError::NotFound
        );
        assert_eq!(
            MovieStore::get(&store, 0).await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn test_movie_update_bumps_version() {
        let store = MemoryStore::new();
        let mut movie = new_movie("Alien", 1979, &["horror"]);
        MovieStore::insert(&store, &mut movie).await.unwrap();

        movie.title = "Aliens".to_string();
        MovieStore::update(&store, &mut movie).await.unwrap();
        assert_eq!(movie.version, 2);

        let fetched = MovieStore::get(&store, movie.id).await.unwrap();
        assert_eq!(fetched.title, "Aliens");
        assert_eq!(fetched.version, 2);
    }

    #[tokio::test]
    async fn test_movie_update_stale_version_conflicts() {
        let store = MemoryStore::new();
        let mut movie = new_movie("Alien", 1979, &["horror"]);
        MovieStore::insert(&store, &mut movie).await.unwrap();

        let mut stale = movie.clone();
        movie.title = "Alien: Director's Cut".to_string();
        MovieStore::update(&store, &mut movie).await.unwrap();

        stale.title = "Other edit".to_string();
        assert_eq!(
            MovieStore::update(&store, &mut stale).await.unwrap_err(),
            StoreError::EditConflict
        );
    }

    #[tokio::test]
    async fn test_movie_delete() {
        let store = MemoryStore::new();
        let mut movie = new_movie("Brief", 2000, &["drama"]);
        MovieStore::insert(&store, &mut movie).await.unwrap();

        MovieStore::delete(&store, movie.id).await.unwrap();
        assert_eq!(
            MovieStore::delete(&store, movie.id).await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn test_movie_list_filters_and_sorts() {
        let store = MemoryStore::new();
        for (title, year, genres) in [
            ("Blade Runner", 1982, vec!["scifi"]),
            ("Brazil", 1985, vec!["scifi", "comedy"]),
            ("Amelie", 2001, vec!["comedy"]),
        ] {
            let genre_refs: Vec<&str> = genres.clone();
            let mut movie = new_movie(title, year, &genre_refs);
            MovieStore::insert(&store, &mut movie).await.unwrap();
        }

        // Genre containment.
        let (page, meta) = MovieStore::list(
            &store,
            "",
            &["scifi".to_string()],
            &default_filters(),
        )
        .await
        .unwrap();
        assert_eq!(meta.total_records, 2);
        assert_eq!(page.len(), 2);

        // Case-insensitive title substring.
        let (page, _) = MovieStore::list(&store, "blade", &[], &default_filters())
            .await
            .unwrap();
        assert_eq!(page.len(), 1);

        // Descending year sort.
        let mut filters = default_filters();
        filters.sort = "-year".to_string();
        let (page, _) = MovieStore::list(&store, "", &[], &filters).await.unwrap();
        let years: Vec<i32> = page.iter().map(|m| m.year).collect();
        assert_eq!(years, vec![2001, 1985, 1982]);
    }

    #[tokio::test]
    async fn test_movie_list_pagination() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let mut movie = new_movie(&format!("Movie {i}"), 2000 + i, &["drama"]);
            MovieStore::insert(&store, &mut movie).await.unwrap();
        }

        let mut filters = default_filters();
        filters.page = 2;
        filters.page_size = 2;

        let (page, meta) = MovieStore::list(&store, "", &[], &filters).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(meta.last_page, 3);
        assert_eq!(meta.current_page, 2);
    }

    #[tokio::test]
    async fn test_user_duplicate_email() {
        let store = MemoryStore::new();
        let mut first = new_user("Ada Wong", "a.wong@mail.com");
        UserStore::insert(&store, &mut first).await.unwrap();

        let mut second = new_user("Impostor", "a.wong@mail.com");
        assert_eq!(
            UserStore::insert(&store, &mut second).await.unwrap_err(),
            StoreError::DuplicateEmail
        );
    }

    #[tokio::test]
    async fn test_user_get_by_email() {
        let store = MemoryStore::new();
        let mut user = new_user("Ada Wong", "a.wong@mail.com");
        UserStore::insert(&store, &mut user).await.unwrap();

        let fetched = store.get_by_email("a.wong@mail.com").await.unwrap();
        assert_eq!(fetched.id, user.id);
        assert_eq!(
            store.get_by_email("nobody@mail.com").await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn test_user_update_cas() {
        let store = MemoryStore::new();
        let mut user = new_user("Ada Wong", "a.wong@mail.com");
        UserStore::insert(&store, &mut user).await.unwrap();

        let mut stale = user.clone();
        user.activated = true;
        UserStore::update(&store, &mut user).await.unwrap();

        stale.name = "Renamed".to_string();
        assert_eq!(
            UserStore::update(&store, &mut stale).await.unwrap_err(),
            StoreError::EditConflict
        );
    }

    #[tokio::test]
    async fn test_token_round_trip() {
        let store = MemoryStore::new();
        let mut user = new_user("Ada Wong", "a.wong@mail.com");
        UserStore::insert(&store, &mut user).await.unwrap();

        let token = store
            .create(user.id, Duration::from_secs(3600), Scope::Authentication)
            .await
            .unwrap();

        let resolved = store
            .get_for_token(Scope::Authentication, &token.plaintext)
            .await
            .unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_token_scope_is_enforced() {
        let store = MemoryStore::new();
        let mut user = new_user("Ada Wong", "a.wong@mail.com");
        UserStore::insert(&store, &mut user).await.unwrap();

        let token = store
            .create(user.id, Duration::from_secs(3600), Scope::Activation)
            .await
            .unwrap();

        assert_eq!(
            store
                .get_for_token(Scope::Authentication, &token.plaintext)
                .await
                .unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn test_expired_token_not_resolved() {
        let store = MemoryStore::new();
        let mut user = new_user("Ada Wong", "a.wong@mail.com");
        UserStore::insert(&store, &mut user).await.unwrap();

        let token = store
            .create(user.id, Duration::from_secs(0), Scope::Authentication)
            .await
            .unwrap();

        assert_eq!(
            store
                .get_for_token(Scope::Authentication, &token.plaintext)
                .await
                .unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn test_delete_all_for_user_is_scoped() {
        let store = MemoryStore::new();
        let mut user = new_user("Ada Wong", "a.wong@mail.com");
        UserStore::insert(&store, &mut user).await.unwrap();

        let auth = store
            .create(user.id, Duration::from_secs(3600), Scope::Authentication)
            .await
            .unwrap();
        let activation = store
            .create(user.id, Duration::from_secs(3600), Scope::Activation)
            .await
            .unwrap();

        store
            .delete_all_for_user(Scope::Authentication, user.id)
            .await
            .unwrap();

        assert!(
            store
                .get_for_token(Scope::Authentication, &auth.plaintext)
                .await
                .is_err()
        );
        assert!(
            store
                .get_for_token(Scope::Activation, &activation.plaintext)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_permission_grant_and_lookup() {
        let store = MemoryStore::new();

        store
            .add_for_user(1, &["movies:read", "movies:write"])
            .await
            .unwrap();

        let perms = store.all_for_user(1).await.unwrap();
        assert!(perms.includes("movies:read"));
        assert!(perms.includes("movies:write"));

        let none = store.all_for_user(2).await.unwrap();
        assert!(!none.includes("movies:read"));
    }
}
