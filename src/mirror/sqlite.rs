/// SQLite mirror store
use crate::{
    address::Address,
    error::{ArcIdError, ArcIdResult},
    mirror::{
        format_timestamp, ConnectedDApp, EventStatus, IdentityRecord, MirrorStore,
        VerificationEvent, VerificationType,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Mirror backed by the service's SQLite database
#[derive(Clone)]
pub struct SqliteMirror {
    db: SqlitePool,
}

impl SqliteMirror {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MirrorStore for SqliteMirror {
    async fn upsert_identity(&self, record: &IdentityRecord) -> ArcIdResult<()> {
        let now = format_timestamp(&Utc::now());

        sqlx::query(
            r#"
            INSERT INTO arcid_identities (
                address, verified, credit_score, data_hash, metadata_uri,
                issued_at, email, country, provider, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(address) DO UPDATE SET
                verified = excluded.verified,
                credit_score = excluded.credit_score,
                data_hash = excluded.data_hash,
                metadata_uri = excluded.metadata_uri,
                issued_at = COALESCE(excluded.issued_at, arcid_identities.issued_at),
                email = COALESCE(excluded.email, arcid_identities.email),
                country = COALESCE(excluded.country, arcid_identities.country),
                provider = COALESCE(excluded.provider, arcid_identities.provider),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.address.as_str())
        .bind(record.verified)
        .bind(i64::from(record.credit_score))
        .bind(&record.data_hash)
        .bind(&record.metadata_uri)
        .bind(record.issued_at.as_ref().map(format_timestamp))
        .bind(&record.email)
        .bind(&record.country)
        .bind(&record.provider)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn update_hash(&self, address: &Address, data_hash: &str) -> ArcIdResult<bool> {
        let result = sqlx::query(
            "UPDATE arcid_identities SET data_hash = ?1, updated_at = ?2 WHERE address = ?3",
        )
        .bind(data_hash)
        .bind(format_timestamp(&Utc::now()))
        .bind(address.as_str())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_verified(&self, address: &Address, verified: bool) -> ArcIdResult<bool> {
        let result = sqlx::query(
            "UPDATE arcid_identities SET verified = ?1, updated_at = ?2 WHERE address = ?3",
        )
        .bind(verified)
        .bind(format_timestamp(&Utc::now()))
        .bind(address.as_str())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_identity(&self, address: &Address) -> ArcIdResult<Option<IdentityRecord>> {
        let row = sqlx::query(
            r#"
            SELECT address, verified, credit_score, data_hash, metadata_uri,
                   issued_at, email, country, provider, updated_at
            FROM arcid_identities
            WHERE address = ?1
            "#,
        )
        .bind(address.as_str())
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(identity_from_row).transpose()
    }

    async fn append_event(
        &self,
        address: &Address,
        provider: &str,
        status: EventStatus,
        verification_type: VerificationType,
    ) -> ArcIdResult<VerificationEvent> {
        let verified_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO arcid_verifications (address, provider, status, verification_type, verified_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(address.as_str())
        .bind(provider)
        .bind(status.as_str())
        .bind(verification_type.as_str())
        .bind(format_timestamp(&verified_at))
        .execute(&self.db)
        .await?;

        Ok(VerificationEvent {
            id: result.last_insert_rowid(),
            address: address.clone(),
            provider: provider.to_string(),
            status,
            verification_type,
            verified_at,
        })
    }

    async fn list_events(&self, address: &Address) -> ArcIdResult<Vec<VerificationEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, address, provider, status, verification_type, verified_at
            FROM arcid_verifications
            WHERE address = ?1
            ORDER BY verified_at DESC, id DESC
            "#,
        )
        .bind(address.as_str())
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn upsert_connected_dapp(
        &self,
        address: &Address,
        dapp_name: &str,
        dapp_url: &str,
    ) -> ArcIdResult<ConnectedDApp> {
        let now = format_timestamp(&Utc::now());

        sqlx::query(
            r#"
            INSERT INTO connected_dapps (address, dapp_name, dapp_url, connected_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(address, dapp_name) DO UPDATE SET
                dapp_url = excluded.dapp_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(address.as_str())
        .bind(dapp_name)
        .bind(dapp_url)
        .bind(&now)
        .execute(&self.db)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT address, dapp_name, dapp_url, connected_at, updated_at
            FROM connected_dapps
            WHERE address = ?1 AND dapp_name = ?2
            "#,
        )
        .bind(address.as_str())
        .bind(dapp_name)
        .fetch_one(&self.db)
        .await?;

        dapp_from_row(&row)
    }

    async fn list_connected_dapps(&self, address: &Address) -> ArcIdResult<Vec<ConnectedDApp>> {
        let rows = sqlx::query(
            r#"
            SELECT address, dapp_name, dapp_url, connected_at, updated_at
            FROM connected_dapps
            WHERE address = ?1
            ORDER BY updated_at DESC, id DESC
            "#,
        )
        .bind(address.as_str())
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(dapp_from_row).collect()
    }
}

fn identity_from_row(row: &SqliteRow) -> ArcIdResult<IdentityRecord> {
    let credit_score: i64 = row.try_get("credit_score")?;

    Ok(IdentityRecord {
        address: stored_address(&row.try_get::<String, _>("address")?)?,
        verified: row.try_get("verified")?,
        credit_score: u16::try_from(credit_score)
            .map_err(|_| ArcIdError::Internal(format!("Stored credit score out of range: {}", credit_score)))?,
        data_hash: row.try_get("data_hash")?,
        metadata_uri: row.try_get("metadata_uri")?,
        issued_at: row
            .try_get::<Option<String>, _>("issued_at")?
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        email: row.try_get("email")?,
        country: row.try_get("country")?,
        provider: row.try_get("provider")?,
        updated_at: Some(parse_timestamp(&row.try_get::<String, _>("updated_at")?)?),
    })
}

fn event_from_row(row: &SqliteRow) -> ArcIdResult<VerificationEvent> {
    let status: String = row.try_get("status")?;
    let verification_type: String = row.try_get("verification_type")?;

    Ok(VerificationEvent {
        id: row.try_get("id")?,
        address: stored_address(&row.try_get::<String, _>("address")?)?,
        provider: row.try_get("provider")?,
        status: EventStatus::parse(&status)
            .ok_or_else(|| ArcIdError::Internal(format!("Unknown event status: {}", status)))?,
        verification_type: VerificationType::parse(&verification_type).ok_or_else(|| {
            ArcIdError::Internal(format!("Unknown verification type: {}", verification_type))
        })?,
        verified_at: parse_timestamp(&row.try_get::<String, _>("verified_at")?)?,
    })
}

fn dapp_from_row(row: &SqliteRow) -> ArcIdResult<ConnectedDApp> {
    Ok(ConnectedDApp {
        address: stored_address(&row.try_get::<String, _>("address")?)?,
        dapp_name: row.try_get("dapp_name")?,
        dapp_url: row.try_get("dapp_url")?,
        connected_at: parse_timestamp(&row.try_get::<String, _>("connected_at")?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn stored_address(s: &str) -> ArcIdResult<Address> {
    Address::parse(s).map_err(|_| ArcIdError::Internal(format!("Corrupt address in mirror: {}", s)))
}

/// Parse RFC3339 timestamp
fn parse_timestamp(s: &str) -> ArcIdResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ArcIdError::Internal(format!("Invalid timestamp: {}", e)))
}
