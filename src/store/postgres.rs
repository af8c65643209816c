//! Postgres-backed `ScanStore`. Uses raw `sqlx::query`/`sqlx::query_as`
//! (not the compile-time-checked `query!` macro) so the crate builds without
//! a reachable `DATABASE_URL`, following the teacher's `api::scan` style.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::ScanStore;
use crate::error::Error;
use crate::models::{Asset, Finding, RiskScore, Scan, ScanStatus, ScannerType};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn transient(e: sqlx::Error) -> Error {
        Error::StoreUnavailable(e.to_string())
    }
}

fn naive_to_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    dt.and_utc()
}

#[async_trait]
impl ScanStore for PostgresStore {
    async fn insert_scan(&self, scan: Scan) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO scan (id, target, scanner, status, options, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(scan.id)
        .bind(&scan.target)
        .bind(scan.scanner.to_string())
        .bind(scan.status.to_string())
        .bind(&scan.options)
        .bind(scan.created_at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(Self::transient)?;
        Ok(())
    }

    async fn get_scan(&self, scan_id: Uuid) -> Result<Option<Scan>, Error> {
        let row = sqlx::query(
            "SELECT id, target, scanner, status, options, results, error_message,
                    created_at, started_at, completed_at
             FROM scan WHERE id = $1",
        )
        .bind(scan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::transient)?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_scan(&row)?))
    }

    async fn mark_running(&self, scan_id: Uuid) -> Result<(), Error> {
        sqlx::query(
            "UPDATE scan SET status = 'running', started_at = $2
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(scan_id)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await
        .map_err(Self::transient)?;
        Ok(())
    }

    async fn complete_scan(
        &self,
        scan_id: Uuid,
        results: Value,
        findings: Vec<Finding>,
        asset: Asset,
        risk_score: RiskScore,
    ) -> Result<(), Error> {
        let mut tx = self.pool.begin().await.map_err(Self::transient)?;

        let current_status: Option<String> =
            sqlx::query("SELECT status FROM scan WHERE id = $1 FOR UPDATE")
                .bind(scan_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Self::transient)?
                .map(|r| r.get("status"));

        let Some(current_status) = current_status else {
            return Err(Error::NotFound(scan_id));
        };
        if matches!(current_status.as_str(), "completed" | "failed") {
            tx.commit().await.map_err(Self::transient)?;
            return Ok(());
        }

        sqlx::query(
            "UPDATE scan SET status = 'completed', results = $2, completed_at = $3 WHERE id = $1",
        )
        .bind(scan_id)
        .bind(&results)
        .bind(Utc::now().naive_utc())
        .execute(&mut *tx)
        .await
        .map_err(Self::transient)?;

        for finding in &findings {
            sqlx::query(
                "INSERT INTO finding (id, scan_id, target, finding_type, severity, title,
                                      description, port, service, metadata, created_at, verified)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
            )
            .bind(finding.id)
            .bind(finding.scan_id)
            .bind(&finding.target)
            .bind(finding.finding_type.to_string())
            .bind(finding.severity.to_string())
            .bind(&finding.title)
            .bind(&finding.description)
            .bind(finding.port.map(|p| p as i32))
            .bind(&finding.service)
            .bind(&finding.metadata)
            .bind(finding.created_at.naive_utc())
            .bind(finding.verified)
            .execute(&mut *tx)
            .await
            .map_err(Self::transient)?;
        }

        sqlx::query(
            "INSERT INTO asset (id, target, asset_type, status, created_at, updated_at, metadata)
             VALUES ($1,$2,$3,$4,$5,$6,$7)
             ON CONFLICT (target) DO UPDATE
             SET asset_type = EXCLUDED.asset_type, status = EXCLUDED.status,
                 updated_at = EXCLUDED.updated_at, metadata = EXCLUDED.metadata",
        )
        .bind(asset.id)
        .bind(&asset.target)
        .bind(asset.asset_type.to_string())
        .bind(&asset.status)
        .bind(asset.created_at.naive_utc())
        .bind(asset.updated_at.naive_utc())
        .bind(&asset.metadata)
        .execute(&mut *tx)
        .await
        .map_err(Self::transient)?;

        let factors = serde_json::to_value(&risk_score.factors).unwrap_or(Value::Null);
        sqlx::query(
            "INSERT INTO risk_score (id, target, score, level, factors, calculated_at, expires_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7)
             ON CONFLICT (target) DO UPDATE
             SET score = EXCLUDED.score, level = EXCLUDED.level, factors = EXCLUDED.factors,
                 calculated_at = EXCLUDED.calculated_at, expires_at = EXCLUDED.expires_at",
        )
        .bind(risk_score.id)
        .bind(&risk_score.target)
        .bind(risk_score.score as i32)
        .bind(&risk_score.level)
        .bind(&factors)
        .bind(risk_score.calculated_at.naive_utc())
        .bind(risk_score.expires_at.naive_utc())
        .execute(&mut *tx)
        .await
        .map_err(Self::transient)?;

        tx.commit().await.map_err(Self::transient)?;
        Ok(())
    }

    async fn fail_scan(&self, scan_id: Uuid, error_message: String) -> Result<(), Error> {
        sqlx::query(
            "UPDATE scan SET status = 'failed', error_message = $2, completed_at = $3
             WHERE id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(scan_id)
        .bind(error_message)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await
        .map_err(Self::transient)?;
        Ok(())
    }

    async fn list_findings(&self, scan_id: Uuid) -> Result<Vec<Finding>, Error> {
        let rows = sqlx::query(
            "SELECT id, scan_id, target, finding_type, severity, title, description,
                    port, service, metadata, created_at, verified
             FROM finding WHERE scan_id = $1",
        )
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::transient)?;

        rows.iter().map(row_to_finding).collect()
    }

    async fn get_risk_score(&self, target: &str) -> Result<Option<RiskScore>, Error> {
        let row = sqlx::query(
            "SELECT id, target, score, level, factors, calculated_at, expires_at
             FROM risk_score WHERE target = $1",
        )
        .bind(target)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::transient)?;

        let Some(row) = row else { return Ok(None) };
        let factors: Value = row.get("factors");
        Ok(Some(RiskScore {
            id: row.get("id"),
            target: row.get("target"),
            score: row.get::<i32, _>("score") as u8,
            level: row.get("level"),
            factors: serde_json::from_value(factors).unwrap_or_default(),
            calculated_at: naive_to_utc(row.get("calculated_at")),
            expires_at: naive_to_utc(row.get("expires_at")),
        }))
    }

    async fn ping(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(Self::transient)?;
        Ok(())
    }
}

fn row_to_scan(row: &sqlx::postgres::PgRow) -> Result<Scan, Error> {
    let scanner: String = row.get("scanner");
    let status: String = row.get("status");
    Ok(Scan {
        id: row.get("id"),
        target: row.get("target"),
        scanner: scanner.parse::<ScannerType>()?,
        status: status.parse::<ScanStatus>()?,
        options: row.get("options"),
        results: row.get("results"),
        error_message: row.get("error_message"),
        created_at: naive_to_utc(row.get("created_at")),
        started_at: row.get::<Option<NaiveDateTime>, _>("started_at").map(naive_to_utc),
        completed_at: row.get::<Option<NaiveDateTime>, _>("completed_at").map(naive_to_utc),
    })
}

fn row_to_finding(row: &sqlx::postgres::PgRow) -> Result<Finding, Error> {
    let finding_type: String = row.get("finding_type");
    let severity: String = row.get("severity");
    Ok(Finding {
        id: row.get("id"),
        scan_id: row.get("scan_id"),
        target: row.get("target"),
        finding_type: match finding_type.as_str() {
            "open-port" => crate::models::FindingType::OpenPort,
            "service" => crate::models::FindingType::Service,
            "vulnerability" => crate::models::FindingType::Vulnerability,
            other => return Err(Error::ScannerParseFailed(format!("unknown finding_type '{other}'"))),
        },
        severity: severity.parse()?,
        title: row.get("title"),
        description: row.get("description"),
        port: row.get::<Option<i32>, _>("port").map(|p| p as u16),
        service: row.get("service"),
        metadata: row.get("metadata"),
        created_at: naive_to_utc(row.get("created_at")),
        verified: row.get("verified"),
    })
}
