//! Session persistence for restart recovery.
//!
//! The engine snapshots its portfolio state and open positions (with their
//! stop/target levels) to a JSON file keyed by trading session date, and
//! reloads them on startup.

use crate::types::{PortfolioState, Position};
use crate::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Everything required to resume a trading session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: PortfolioState,
    pub open_positions: Vec<Position>,
}

/// File-backed store, one JSON document per session date.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("session-{}.json", date))
    }

    /// Persist the current portfolio state and open positions. Writes to a
    /// temp file first so a crash mid-write never corrupts the snapshot.
    pub fn save(&self, state: &PortfolioState, open_positions: &[Position]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let snapshot = SessionSnapshot {
            state: state.clone(),
            open_positions: open_positions.to_vec(),
        };
        let path = self.path_for(state.session_date);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&snapshot)?)?;
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), positions = open_positions.len(), "Session snapshot saved");
        Ok(())
    }

    /// Load the snapshot for `date`, if one exists.
    pub fn load(&self, date: NaiveDate) -> Result<Option<SessionSnapshot>> {
        let path = self.path_for(date);
        if !Path::new(&path).exists() {
            return Ok(None);
        }
        let raw = fs::read(&path)?;
        let snapshot: SessionSnapshot = serde_json::from_slice(&raw)?;
        info!(
            path = %path.display(),
            equity = %snapshot.state.equity,
            positions = snapshot.open_positions.len(),
            "Session snapshot loaded"
        );
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Position};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn temp_store() -> SessionStore {
        let dir = std::env::temp_dir().join(format!("eo-bot-store-{}", uuid::Uuid::new_v4()));
        SessionStore::new(dir)
    }

    #[test]
    fn test_round_trip_reproduces_state() {
        let store = temp_store();
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let mut state = PortfolioState::new(date, Decimal::new(10000, 0));
        state.apply_realized(Decimal::new(-75, 0));

        let position = Position::open(
            "market1",
            Direction::Long,
            Decimal::new(50, 2),
            Decimal::new(200, 0),
            Utc::now(),
            Decimal::new(45, 2),
            Some(Decimal::new(60, 2)),
            "sentiment",
            3600,
        )
        .with_trailing(Decimal::new(4, 2), Decimal::new(3, 2));

        store.save(&state, &[position.clone()]).unwrap();
        let loaded = store.load(date).unwrap().unwrap();

        assert_eq!(loaded.state.equity, state.equity);
        assert_eq!(loaded.state.daily_realized_loss, state.daily_realized_loss);
        assert_eq!(loaded.open_positions.len(), 1);
        let restored = &loaded.open_positions[0];
        assert_eq!(restored.id, position.id);
        assert_eq!(restored.stop_loss, position.stop_loss);
        assert_eq!(restored.take_profit, position.take_profit);
        assert_eq!(restored.quantity, position.quantity);
    }

    #[test]
    fn test_load_missing_session() {
        let store = temp_store();
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert!(store.load(date).unwrap().is_none());
    }
}
