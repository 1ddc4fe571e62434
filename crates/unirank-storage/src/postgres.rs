use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use unirank_core::{normalize_name_key, university_id, UniversityRecord};
use uuid::Uuid;

use crate::store::{validate_record, StoreError, StoredUniversity, UniversityStore};

const SELECT_COLUMNS: &str = r#"
    id, name, country, city, location, rank, score, website, image_url, description,
    sources, source_urls, rating, tuition, majors, facilities, created_at, updated_at
"#;

/// Postgres-backed store over the `schools` table.
#[derive(Debug, Clone)]
pub struct PgUniversityStore {
    pool: PgPool,
}

impl PgUniversityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Message(format!("migration failed: {err}")))
    }
}

fn row_to_stored(row: PgRow) -> Result<StoredUniversity, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let rank: Option<i32> = row.try_get("rank")?;
    let sources: Json<BTreeSet<String>> = row.try_get("sources")?;
    let source_urls: Json<Vec<String>> = row.try_get("source_urls")?;
    let record = UniversityRecord {
        id: Some(id),
        name: row.try_get("name")?,
        country: row.try_get("country")?,
        city: row.try_get("city")?,
        location: row.try_get("location")?,
        rank: rank.and_then(|r| u32::try_from(r).ok()),
        score: row.try_get("score")?,
        website: row.try_get("website")?,
        image_url: row.try_get("image_url")?,
        description: row.try_get("description")?,
        sources: sources.0,
        source_urls: source_urls.0,
        rating: row.try_get("rating")?,
        tuition: row.try_get("tuition")?,
        majors: row.try_get("majors")?,
        facilities: row.try_get("facilities")?,
    };
    Ok(StoredUniversity {
        id,
        record,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_write_error(err: sqlx::Error, name: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate(name.to_string()),
        sqlx::Error::Database(db) if db.is_check_violation() || db.is_foreign_key_violation() => {
            StoreError::Constraint(db.message().to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl UniversityStore for PgUniversityStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<StoredUniversity>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM schools WHERE name_key = $1");
        let row = sqlx::query(&sql)
            .bind(normalize_name_key(name))
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_stored).transpose()
    }

    async fn insert(&self, record: &UniversityRecord) -> Result<StoredUniversity, StoreError> {
        validate_record(record)?;
        let key = record.name_key();
        let sql = format!(
            r#"
            INSERT INTO schools (
                id, name_key, name, country, city, location, rank, score, website, image_url,
                description, sources, source_urls, rating, tuition, majors, facilities
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {SELECT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(university_id(&key))
            .bind(&key)
            .bind(&record.name)
            .bind(&record.country)
            .bind(&record.city)
            .bind(&record.location)
            .bind(record.rank.and_then(|r| i32::try_from(r).ok()))
            .bind(record.score)
            .bind(&record.website)
            .bind(&record.image_url)
            .bind(&record.description)
            .bind(Json(&record.sources))
            .bind(Json(&record.source_urls))
            .bind(record.rating)
            .bind(record.tuition)
            .bind(&record.majors)
            .bind(&record.facilities)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| map_write_error(err, &record.name))?;
        row_to_stored(row)
    }

    async fn update(&self, id: Uuid, record: &UniversityRecord) -> Result<StoredUniversity, StoreError> {
        validate_record(record)?;
        let sql = format!(
            r#"
            UPDATE schools
               SET name_key = $2,
                   name = $3,
                   country = $4,
                   city = $5,
                   location = $6,
                   rank = $7,
                   score = $8,
                   website = $9,
                   image_url = $10,
                   description = $11,
                   sources = $12,
                   source_urls = $13,
                   rating = $14,
                   tuition = $15,
                   majors = $16,
                   facilities = $17,
                   updated_at = NOW()
             WHERE id = $1
            RETURNING {SELECT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(record.name_key())
            .bind(&record.name)
            .bind(&record.country)
            .bind(&record.city)
            .bind(&record.location)
            .bind(record.rank.and_then(|r| i32::try_from(r).ok()))
            .bind(record.score)
            .bind(&record.website)
            .bind(&record.image_url)
            .bind(&record.description)
            .bind(Json(&record.sources))
            .bind(Json(&record.source_urls))
            .bind(record.rating)
            .bind(record.tuition)
            .bind(&record.majors)
            .bind(&record.facilities)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| map_write_error(err, &record.name))?;
        match row {
            Some(row) => row_to_stored(row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schools")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as usize)
    }

    async fn list(&self) -> Result<Vec<StoredUniversity>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM schools ORDER BY country, name");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_stored).collect()
    }
}
