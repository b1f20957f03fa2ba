//! DuckDB persistence for acquired observations and their labels.

use std::collections::HashSet;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use duckdb::{Connection, params};
use monarch_core::{AnnotationTask, LifeStage, ObservationId, Record};
use tracing::info;

use crate::StoreError;

const OBSERVATIONS_DDL: &str = "
    CREATE TABLE IF NOT EXISTS observations (
        observation_id                   BIGINT PRIMARY KEY,
        source_uri                       TEXT NOT NULL,
        observed_on                      DATE,
        observer_login                   TEXT,
        observer_name                    TEXT,
        latitude                         DOUBLE,
        longitude                        DOUBLE,
        location                         TEXT,
        image_url                        TEXT,
        image_local_path                 TEXT,
        quality_grade                    TEXT,
        num_identification_agreements    INTEGER,
        num_identification_disagreements INTEGER,
        license                          TEXT,
        raw_payload                      TEXT,
        created_at                       TIMESTAMP DEFAULT current_timestamp
    );
";

const LABELS_VIEW_DDL: &str = "
    CREATE INDEX IF NOT EXISTS idx_labels_observation_id ON labels(observation_id);
    CREATE INDEX IF NOT EXISTS idx_labels_life_stage ON labels(life_stage);

    CREATE OR REPLACE VIEW observations_with_labels AS
    SELECT
        o.observation_id,
        o.source_uri,
        o.observed_on,
        o.observer_login,
        o.observer_name,
        o.latitude,
        o.longitude,
        o.location,
        o.image_url,
        o.image_local_path,
        o.quality_grade,
        l.life_stage,
        l.annotator,
        l.annotation_date,
        l.label_studio_task_id
    FROM observations o
    LEFT JOIN labels l ON o.observation_id = l.observation_id;
";

/// What opening the store had to do to the schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaStatus {
    /// The `observations` table did not exist and was created.
    pub created: bool,
    /// A legacy `observations` table lacked `raw_payload` and it was added.
    pub migrated: bool,
}

/// Row counts removed by [`DuckStore::purge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub observations: usize,
    pub labels: usize,
}

/// DuckDB store holding one row per acquired observation.
///
/// `observation_id` is the primary key and the single source of truth for
/// "already acquired". Inserts use `ON CONFLICT DO NOTHING`, so a record
/// written twice, by this run or by another writer, ends up as one row.
///
/// The `labels` table belongs to the annotation workflow; this store only
/// creates it, counts it, and clears it on purge.
pub struct DuckStore {
    conn: Connection,
    schema: SchemaStatus,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    ///
    /// The schema is created on first open and migrated on later opens.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Wrap an existing connection, initialising and migrating its schema.
    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let mut store = Self {
            conn,
            schema: SchemaStatus::default(),
        };
        store.schema = store.initialize()?;
        Ok(store)
    }

    /// What the last open did to the schema.
    pub fn schema_status(&self) -> SchemaStatus {
        self.schema
    }

    // ── Schema ──

    fn initialize(&self) -> Result<SchemaStatus, StoreError> {
        let created = !self.table_exists("observations")?;
        self.conn.execute_batch(OBSERVATIONS_DDL)?;

        let stages = LifeStage::ALL
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        self.conn.execute_batch(&format!(
            "CREATE SEQUENCE IF NOT EXISTS labels_id_seq;
             CREATE TABLE IF NOT EXISTS labels (
                 label_id                   BIGINT PRIMARY KEY DEFAULT nextval('labels_id_seq'),
                 observation_id             BIGINT NOT NULL REFERENCES observations(observation_id),
                 life_stage                 TEXT NOT NULL CHECK (life_stage IN ({stages})),
                 annotator                  TEXT,
                 annotation_date            TIMESTAMP DEFAULT current_timestamp,
                 label_studio_task_id       INTEGER,
                 label_studio_annotation_id INTEGER
             );"
        ))?;
        self.conn.execute_batch(LABELS_VIEW_DDL)?;

        let migrated = self.migrate()?;
        if created {
            info!("created observations schema");
        }
        Ok(SchemaStatus { created, migrated })
    }

    /// Add `raw_payload` to tables created before it existed.
    fn migrate(&self) -> Result<bool, StoreError> {
        if self.column_exists("observations", "raw_payload")? {
            return Ok(false);
        }
        self.conn
            .execute_batch("ALTER TABLE observations ADD COLUMN raw_payload TEXT;")?;
        info!("migrated observations: added raw_payload column");
        Ok(true)
    }

    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT count(*) FROM information_schema.tables WHERE table_name = ?",
            [table],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    fn column_exists(&self, table: &str, column: &str) -> Result<bool, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT count(*) FROM information_schema.columns WHERE table_name = ? AND column_name = ?",
            [table, column],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    // ── Identity ──

    /// Whether a record with this id is stored.
    pub fn exists(&self, id: ObservationId) -> Result<bool, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT count(*) FROM observations WHERE observation_id = ?",
            [id],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// Every stored observation id, in one scan.
    pub fn load_all_ids(&self) -> Result<HashSet<ObservationId>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT observation_id FROM observations")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    // ── Writes ──

    /// Insert a record unless its id is already present.
    ///
    /// Returns `true` when a new row was written, `false` on conflict.
    pub fn insert_ignore_conflict(&self, record: &Record) -> Result<bool, StoreError> {
        let observed_on = record.observed_at.map(|d| d.format("%Y-%m-%d").to_string());
        let (latitude, longitude) = match record.coordinates {
            Some(c) => (Some(c.latitude), Some(c.longitude)),
            None => (None, None),
        };
        let raw_payload = serde_json::to_string(&record.raw_payload)?;

        let changed = self.conn.execute(
            "INSERT INTO observations (
                observation_id, source_uri, observed_on, observer_login, observer_name,
                latitude, longitude, location, image_url, image_local_path,
                quality_grade, num_identification_agreements, num_identification_disagreements,
                license, raw_payload
            ) VALUES (?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (observation_id) DO NOTHING",
            params![
                record.id,
                record.source_uri,
                observed_on,
                record.submitter_handle,
                record.submitter_name,
                latitude,
                longitude,
                record.place_text,
                record.asset_url,
                record.local_asset_path,
                record.quality_tier,
                i64::from(record.agreement_count),
                i64::from(record.disagreement_count),
                record.license_code,
                raw_payload,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Record an annotator's life stage label for a stored observation.
    pub fn add_label(
        &self,
        id: ObservationId,
        stage: LifeStage,
        annotator: Option<&str>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO labels (observation_id, life_stage, annotator) VALUES (?, ?, ?)",
            params![id, stage.as_str(), annotator],
        )?;
        Ok(())
    }

    /// Delete every label and observation row.
    pub fn purge(&self) -> Result<PurgeStats, StoreError> {
        // Children first: labels reference observations.
        let labels = self.conn.execute("DELETE FROM labels", [])?;
        let observations = self.conn.execute("DELETE FROM observations", [])?;
        info!(observations, labels, "purged observation tables");
        Ok(PurgeStats {
            observations,
            labels,
        })
    }

    // ── Counts ──

    /// Number of rows in the `observations` table.
    pub fn observation_count(&self) -> Result<usize, StoreError> {
        self.count_table("observations")
    }

    /// Number of rows in the `labels` table.
    pub fn labels_count(&self) -> Result<usize, StoreError> {
        self.count_table("labels")
    }

    fn count_table(&self, table: &str) -> Result<usize, StoreError> {
        let batches = self.query_arrow(&format!("SELECT count(*)::BIGINT AS cnt FROM {table}"))?;
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }

    // ── Reads ──

    /// Fetch one observation as a single-row RecordBatch (without the raw payload).
    pub fn get_observation(&self, id: ObservationId) -> Result<RecordBatch, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * EXCLUDE (raw_payload) FROM observations WHERE observation_id = ?")?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([id])?.collect();
        let batch = batches.into_iter().next().ok_or(StoreError::NoResults)?;
        if batch.num_rows() == 0 {
            return Err(StoreError::NoResults);
        }
        Ok(batch)
    }

    /// The stored source document for one observation.
    pub fn raw_payload(&self, id: ObservationId) -> Result<serde_json::Value, StoreError> {
        let text: Option<String> = self
            .conn
            .query_row(
                "SELECT raw_payload FROM observations WHERE observation_id = ?",
                [id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                duckdb::Error::QueryReturnedNoRows => StoreError::NoResults,
                other => other.into(),
            })?;
        let text = text.ok_or(StoreError::NoResults)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Life stage labels recorded for one observation, oldest first.
    pub fn labels_for(&self, id: ObservationId) -> Result<Vec<RecordBatch>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT life_stage, annotator, annotation_date, label_studio_task_id
             FROM labels WHERE observation_id = ? ORDER BY annotation_date, label_id",
        )?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([id])?.collect();
        Ok(batches)
    }

    /// Stored observations as annotation task payloads, newest first.
    pub fn annotation_tasks(&self, limit: Option<usize>) -> Result<Vec<AnnotationTask>, StoreError> {
        let mut sql = String::from(
            "SELECT observation_id, source_uri, CAST(observed_on AS VARCHAR),
                    observer_login, location, image_local_path
             FROM observations
             ORDER BY created_at DESC, observation_id",
        );
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = stmt
            .query_map([], |row| {
                let observed_on: Option<String> = row.get(2)?;
                Ok(AnnotationTask::from_row(
                    row.get(0)?,
                    row.get(1)?,
                    observed_on.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    // ── Escape hatch ──

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }
}
