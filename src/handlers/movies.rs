//! Movie CRUD handlers.
//!
//! All routes here sit behind a permission gate (`movies:read` for reads,
//! `movies:write` for writes), so a request that reaches a handler is
//! already authenticated, activated and permissioned.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::movie::{Movie, Runtime, validate_movie};
use crate::state::AppState;
use crate::store::{Filters, Metadata, MovieStore as _};
use crate::validation::Validator;

/// Sort keys accepted by the listing endpoint, with `-` for descending.
const SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

#[derive(Serialize)]
pub struct MovieEnvelope {
    movie: Movie,
}

#[derive(Deserialize)]
pub struct CreateMovieInput {
    title: String,
    year: i32,
    runtime: Runtime,
    genres: Vec<String>,
}

/// `POST /v1/movies`
pub async fn create_movie(
    State(state): State<AppState>,
    Json(input): Json<CreateMovieInput>,
) -> AppResult<impl IntoResponse> {
    let mut v = Validator::new();
    validate_movie(&mut v, &input.title, input.year, input.runtime.0, &input.genres);
    v.finish()?;

    let mut movie = Movie {
        id: 0,
        created_at: Utc::now(),
        title: input.title,
        year: input.year,
        runtime: input.runtime,
        genres: input.genres,
        version: 0,
    };

    state.stores.movies.insert(&mut movie).await?;

    let location = format!("/v1/movies/{}", movie.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(MovieEnvelope { movie }),
    ))
}

/// `GET /v1/movies/{id}`
pub async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MovieEnvelope>> {
    let movie = state.stores.movies.get(id).await?;
    Ok(Json(MovieEnvelope { movie }))
}

#[derive(Deserialize)]
pub struct ListMoviesQuery {
    title: Option<String>,
    genres: Option<String>,
    page: Option<i64>,
    page_size: Option<i64>,
    sort: Option<String>,
}

#[derive(Serialize)]
pub struct MovieListEnvelope {
    movies: Vec<Movie>,
    metadata: Metadata,
}

/// `GET /v1/movies`
///
/// Supports `title` substring search, comma-separated `genres` containment,
/// `sort` from the safelist and `page`/`page_size` pagination.
pub async fn list_movies(
    State(state): State<AppState>,
    Query(query): Query<ListMoviesQuery>,
) -> AppResult<Json<MovieListEnvelope>> {
    let title = query.title.unwrap_or_default();
    let genres: Vec<String> = query
        .genres
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect();

    let filters = Filters {
        page: query.page.unwrap_or(1),
        page_size: query.page_size.unwrap_or(20),
        sort: query.sort.unwrap_or_else(|| "id".to_string()),
        sort_safelist: SORT_SAFELIST.to_vec(),
    };

    let mut v = Validator::new();
    filters.validate(&mut v);
    v.finish()?;

    let (movies, metadata) = state.stores.movies.list(&title, &genres, &filters).await?;

    Ok(Json(MovieListEnvelope { movies, metadata }))
}

/// Partial update: absent fields keep their stored values.
#[derive(Deserialize)]
pub struct UpdateMovieInput {
    title: Option<String>,
    year: Option<i32>,
    runtime: Option<Runtime>,
    genres: Option<Vec<String>>,
}

/// `PATCH /v1/movies/{id}`
///
/// Carries the optimistic-concurrency check through to the store: two
/// racing updates produce one success and one 409.
pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateMovieInput>,
) -> AppResult<Json<MovieEnvelope>> {
    let mut movie = state.stores.movies.get(id).await?;

    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    validate_movie(&mut v, &movie.title, movie.year, movie.runtime.0, &movie.genres);
    v.finish()?;

    state.stores.movies.update(&mut movie).await?;

    Ok(Json(MovieEnvelope { movie }))
}

#[derive(Serialize)]
struct MessageEnvelope {
    message: &'static str,
}

/// `DELETE /v1/movies/{id}`
pub async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<impl Serialize>> {
    state.stores.movies.delete(id).await?;

    Ok(Json(MessageEnvelope {
        message: "movie successfully deleted",
    }))
}
