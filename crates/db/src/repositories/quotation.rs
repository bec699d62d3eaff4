use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use moldquote_core::domain::quotation::{ContactInfo, QuotationId, QuotationRecord};
use moldquote_core::sink::{QuotationSink, SinkError};

use super::{QuotationRepository, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT
        id,
        sender_id,
        material,
        size,
        volume_cm3,
        weight_kg,
        quantity,
        total_cost,
        contact_name,
        contact_phone,
        contact_email,
        created_at
     FROM quotation";

#[derive(Clone)]
pub struct SqlQuotationRepository {
    pool: DbPool,
}

impl SqlQuotationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotationRepository for SqlQuotationRepository {
    async fn find_by_id(
        &self,
        id: &QuotationId,
    ) -> Result<Option<QuotationRecord>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(record_from_row).transpose()
    }

    async fn save(&self, record: &QuotationRecord) -> Result<(), RepositoryError> {
        let contact = record.contact.as_ref();
        sqlx::query(
            "INSERT INTO quotation (
                id,
                sender_id,
                material,
                size,
                volume_cm3,
                weight_kg,
                quantity,
                total_cost,
                contact_name,
                contact_phone,
                contact_email,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(&record.sender_id)
        .bind(&record.material)
        .bind(&record.size)
        .bind(record.volume_cm3)
        .bind(record.weight_kg)
        .bind(i64::from(record.quantity))
        .bind(record.total_cost)
        .bind(contact.map(|c| c.name.as_str()))
        .bind(contact.map(|c| c.phone.as_str()))
        .bind(contact.map(|c| c.email.as_str()))
        .bind(record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<QuotationRecord>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC LIMIT ?"))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl QuotationSink for SqlQuotationRepository {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn append(&self, record: &QuotationRecord) -> Result<(), SinkError> {
        self.save(record).await.map_err(|error| SinkError::Storage(error.to_string()))?;
        debug!(event_name = "sink.sqlite.appended", quotation_id = %record.id.0, "row inserted");
        Ok(())
    }
}

fn record_from_row(row: SqliteRow) -> Result<QuotationRecord, RepositoryError> {
    let contact = match (
        row.try_get::<Option<String>, _>("contact_name")?,
        row.try_get::<Option<String>, _>("contact_phone")?,
        row.try_get::<Option<String>, _>("contact_email")?,
    ) {
        (Some(name), Some(phone), Some(email)) => Some(ContactInfo { name, phone, email }),
        (None, None, None) => None,
        _ => {
            return Err(RepositoryError::Decode(
                "contact columns must be all set or all null".to_string(),
            ))
        }
    };

    Ok(QuotationRecord {
        id: QuotationId(row.try_get("id")?),
        sender_id: row.try_get("sender_id")?,
        material: row.try_get("material")?,
        size: row.try_get("size")?,
        volume_cm3: row.try_get("volume_cm3")?,
        weight_kg: row.try_get("weight_kg")?,
        quantity: parse_u32("quantity", row.try_get("quantity")?)?,
        total_cost: row.try_get("total_cost")?,
        contact,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
