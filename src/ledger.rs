use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::pipeline::PredictionReport;
use crate::settlement::{
    MarketPick, MatchResult, SettledPrediction, StoredPrediction, reconcile,
};
use crate::sport::SportRules;

const TOTAL_GOALS_LINE: f64 = 2.5;

/// Predictions and their settlements, one SQLite file.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open ledger db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory ledger")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Stores a prediction; a second call with the same id replaces it while unsettled.
    pub fn record_prediction(
        &self,
        prediction: &StoredPrediction,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.load_settlement(&prediction.id)?.is_some() {
            return Err(anyhow!(
                "prediction {} is already settled and cannot change",
                prediction.id
            ));
        }
        let body = serde_json::to_string(prediction).context("encode prediction")?;
        self.conn
            .execute(
                r#"
                INSERT INTO predictions (
                    id, match_id, predicted_outcome, confidence, stake, created_at, body
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    match_id = excluded.match_id,
                    predicted_outcome = excluded.predicted_outcome,
                    confidence = excluded.confidence,
                    stake = excluded.stake,
                    body = excluded.body
                "#,
                params![
                    prediction.id,
                    prediction.match_id,
                    prediction.predicted_outcome.as_str(),
                    prediction.confidence,
                    prediction.stake,
                    created_at.to_rfc3339(),
                    body,
                ],
            )
            .context("insert prediction")?;
        debug!(id = %prediction.id, match_id = %prediction.match_id, "prediction recorded");
        Ok(())
    }

    /// Turns a report into a stored prediction and records it.
    pub fn record_report(&self, report: &PredictionReport, stake: f64) -> Result<StoredPrediction> {
        let prediction = stored_from_report(report, stake);
        self.record_prediction(&prediction, report.generated_at)?;
        Ok(prediction)
    }

    pub fn load_prediction(&self, id: &str) -> Result<Option<StoredPrediction>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM predictions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .context("query prediction")?;
        body.map(|b| serde_json::from_str(&b).context("decode stored prediction"))
            .transpose()
    }

    pub fn load_settlement(&self, prediction_id: &str) -> Result<Option<SettledPrediction>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM settlements WHERE prediction_id = ?1",
                params![prediction_id],
                |row| row.get(0),
            )
            .optional()
            .context("query settlement")?;
        body.map(|b| serde_json::from_str(&b).context("decode settlement"))
            .transpose()
    }

    /// Settles a stored prediction under `rules`.
    ///
    /// Settling again with the same result returns the stored row unchanged.
    pub fn record_settlement(
        &self,
        rules: &dyn SportRules,
        prediction_id: &str,
        result: &MatchResult,
        settled_at: DateTime<Utc>,
    ) -> Result<SettledPrediction> {
        let prediction = self
            .load_prediction(prediction_id)?
            .ok_or_else(|| anyhow!("no stored prediction with id {prediction_id}"))?;

        if let Some(existing) = self.load_settlement(prediction_id)? {
            let fresh = rules.settle(&prediction, result, existing.settled_at)?;
            let kept = reconcile(&existing, &fresh)?;
            debug!(id = prediction_id, "settlement already recorded");
            return Ok(kept);
        }

        let settled = rules.settle(&prediction, result, settled_at)?;
        let body = serde_json::to_string(&settled).context("encode settlement")?;
        self.conn
            .execute(
                r#"
                INSERT INTO settlements (
                    prediction_id, match_id, status, profit_loss, points_earned, settled_at, body
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    settled.prediction_id,
                    settled.match_id,
                    settled.status.as_str(),
                    settled.profit_loss,
                    settled.points_earned as i64,
                    settled.settled_at.to_rfc3339(),
                    body,
                ],
            )
            .context("insert settlement")?;
        info!(
            id = prediction_id,
            status = settled.status.as_str(),
            profit_loss = settled.profit_loss,
            "prediction settled"
        );
        Ok(settled)
    }

    /// Every settled prediction alongside what was predicted, oldest settlement first.
    pub fn settled_history(&self) -> Result<Vec<(StoredPrediction, SettledPrediction)>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT p.body, s.body
                FROM settlements s
                JOIN predictions p ON p.id = s.prediction_id
                ORDER BY s.settled_at ASC, s.prediction_id ASC
                "#,
            )
            .context("prepare settled history query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("query settled history")?;

        let mut out = Vec::new();
        for row in rows {
            let (p, s) = row.context("decode settled history row")?;
            out.push((
                serde_json::from_str(&p).context("decode stored prediction")?,
                serde_json::from_str(&s).context("decode settlement")?,
            ));
        }
        Ok(out)
    }

    pub fn pending_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT id FROM predictions
                WHERE id NOT IN (SELECT prediction_id FROM settlements)
                ORDER BY created_at ASC, id ASC
                "#,
            )
            .context("prepare pending query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("query pending predictions")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode pending id")?);
        }
        Ok(out)
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS predictions (
            id TEXT PRIMARY KEY,
            match_id TEXT NOT NULL,
            predicted_outcome TEXT NOT NULL,
            confidence REAL NOT NULL,
            stake REAL NOT NULL,
            created_at TEXT NOT NULL,
            body TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_predictions_match ON predictions(match_id);

        CREATE TABLE IF NOT EXISTS settlements (
            prediction_id TEXT PRIMARY KEY REFERENCES predictions(id),
            match_id TEXT NOT NULL,
            status TEXT NOT NULL,
            profit_loss REAL NOT NULL,
            points_earned INTEGER NOT NULL,
            settled_at TEXT NOT NULL,
            body TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_settlements_status ON settlements(status);
        "#,
    )
    .context("create ledger schema")?;
    Ok(())
}

/// The ledger's view of a report: headline outcome, consensus price and two side picks.
pub fn stored_from_report(report: &PredictionReport, stake: f64) -> StoredPrediction {
    let ensemble = &report.ensemble;
    let odds = report
        .value
        .as_ref()
        .and_then(|v| v.consensus.get(ensemble.outcome));
    StoredPrediction {
        id: prediction_id(&report.match_id, report.generated_at),
        match_id: report.match_id.clone(),
        predicted_outcome: ensemble.outcome,
        predicted_score: Some(ensemble.score),
        confidence: ensemble.confidence,
        probabilities: Some(ensemble.probabilities),
        stake,
        odds,
        potential_return: odds.filter(|o| *o > 1.0).map(|o| stake * o),
        picks: vec![
            MarketPick::BothTeamsToScore {
                yes: report.markets.btts.prediction,
            },
            MarketPick::TotalGoals {
                line: TOTAL_GOALS_LINE,
                over: report.markets.over_under.over_2_5,
            },
        ],
    }
}

pub fn prediction_id(match_id: &str, at: DateTime<Utc>) -> String {
    format!("{match_id}-{}", at.format("%Y%m%d%H%M%S"))
}
