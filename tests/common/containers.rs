// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for PostgreSQL and Elasticsearch.

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

pub const PG_USER: &str = "postgres";
pub const PG_PASSWORD: &str = "postgres";
pub const PG_DB: &str = "movies_database";

/// Create a PostgreSQL 16 container.
///
/// The image logs "ready to accept connections" once for the init server and
/// once for the real one; callers should tolerate a refused first connect.
pub fn postgres_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("postgres", "16-alpine")
        .with_env_var("POSTGRES_USER", PG_USER)
        .with_env_var("POSTGRES_PASSWORD", PG_PASSWORD)
        .with_env_var("POSTGRES_DB", PG_DB)
        .with_exposed_port(5432)
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ));
    docker.run(image)
}

/// Create a single-node Elasticsearch 8 container with security disabled.
pub fn elasticsearch_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("docker.elastic.co/elasticsearch/elasticsearch", "8.11.3")
        .with_env_var("discovery.type", "single-node")
        .with_env_var("xpack.security.enabled", "false")
        .with_env_var("ES_JAVA_OPTS", "-Xms512m -Xmx512m")
        .with_exposed_port(9200)
        .with_wait_for(WaitFor::message_on_stdout("\"message\":\"started"));
    docker.run(image)
}

pub fn postgres_port(container: &Container<'_, GenericImage>) -> u16 {
    container.get_host_port_ipv4(5432)
}

pub fn elasticsearch_url(container: &Container<'_, GenericImage>) -> String {
    format!("http://127.0.0.1:{}", container.get_host_port_ipv4(9200))
}

pub fn pg_options(port: u16) -> PgConnectOptions {
    PgConnectOptions::new()
        .host("127.0.0.1")
        .port(port)
        .username(PG_USER)
        .password(PG_PASSWORD)
        .database(PG_DB)
}

/// Connect, retrying while the container finishes its init restart.
pub async fn pg_pool(port: u16) -> PgPool {
    let mut last_error = None;
    for _ in 0..30 {
        match PgPoolOptions::new()
            .max_connections(2)
            .connect_with(pg_options(port))
            .await
        {
            Ok(pool) => return pool,
            Err(e) => last_error = Some(e),
        }
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
    panic!("PostgreSQL never became reachable: {last_error:?}");
}

/// Create the film_work table used by the container tests.
pub async fn create_film_work(pool: &PgPool) {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS film_work (
            id uuid PRIMARY KEY,
            title text NOT NULL,
            rating double precision,
            updated_at timestamptz NOT NULL
        )",
    )
    .execute(pool)
    .await
    .expect("create film_work");
}

pub async fn insert_film(pool: &PgPool, id: &str, title: &str, updated_at: &str) {
    sqlx::query(
        "INSERT INTO film_work (id, title, rating, updated_at)
         VALUES ($1::uuid, $2, 7.5, $3::timestamptz)
         ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title, updated_at = EXCLUDED.updated_at",
    )
    .bind(id)
    .bind(title)
    .bind(updated_at)
    .execute(pool)
    .await
    .expect("insert film_work row");
}
