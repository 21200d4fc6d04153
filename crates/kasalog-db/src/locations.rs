//! Umbrella location repository backed by PostgreSQL.

use std::time::Instant;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use kasalog_core::{Coordinate, Error, LocationRecord, LocationRepository, NewLocation, Result};

/// Table holding one row per scan.
pub const LOCATIONS_TABLE: &str = "umbrella_locations";

/// PostgreSQL location repository.
#[derive(Clone)]
pub struct PgLocationRepository {
    pool: Pool<Postgres>,
}

impl PgLocationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> LocationRecord {
        LocationRecord {
            id: row.get("id"),
            umbrella_id: row.get("umbrella_id"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            scanned_at: row.get("scanned_at"),
        }
    }
}

#[async_trait]
impl LocationRepository for PgLocationRepository {
    async fn insert(&self, location: NewLocation) -> Result<Uuid> {
        if location.umbrella_id.trim().is_empty() {
            return Err(Error::InvalidInput("umbrella_id cannot be empty".to_string()));
        }
        let coordinate = Coordinate::new(
            location.coordinate.latitude(),
            location.coordinate.longitude(),
        )?;

        let start = Instant::now();
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO umbrella_locations (id, umbrella_id, latitude, longitude, scanned_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(&location.umbrella_id)
        .bind(coordinate.latitude())
        .bind(coordinate.longitude())
        .bind(location.scanned_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(
                subsystem = "database",
                component = "locations",
                op = "insert",
                umbrella_id = %location.umbrella_id,
                error = %e,
                "Insert rejected"
            );
            Error::Database(e)
        })?;

        debug!(
            subsystem = "database",
            component = "locations",
            op = "insert",
            db_table = LOCATIONS_TABLE,
            record_id = %id,
            umbrella_id = %location.umbrella_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Location recorded"
        );
        Ok(id)
    }

    async fn list_all(&self) -> Result<Vec<LocationRecord>> {
        let start = Instant::now();
        let rows = sqlx::query(
            "SELECT id, umbrella_id, latitude, longitude, scanned_at
             FROM umbrella_locations
             ORDER BY scanned_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "locations",
            op = "list_all",
            result_count = rows.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Listed locations"
        );
        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM umbrella_locations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "locations",
            op = "delete",
            record_id = %id,
            rows_affected = result.rows_affected(),
            "Location deleted"
        );
        Ok(())
    }
}
