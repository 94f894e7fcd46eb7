use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::{
    error::{Result, TallyError},
    fs::operations::{read_shared, write_atomic},
    history::DailyAggregate,
    utils::time::{day_key, parse_day_key},
};

use super::{DayMap, LocalStore};

/// The main realization of [LocalStore]. Every day lives in its own `YYYY-MM-DD.json` file.
pub struct FileHistoryStore {
    days_dir: PathBuf,
}

impl FileHistoryStore {
    pub fn new(days_dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&days_dir)?;

        Ok(Self { days_dir })
    }

    fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.days_dir.join(format!("{}.json", day_key(day)))
    }

    async fn read_day(path: &Path, day: NaiveDate) -> Result<Option<DailyAggregate>> {
        let Some(content) = read_shared(path)
            .await
            .map_err(|e| TallyError::io(path, e))?
        else {
            return Ok(None);
        };
        match serde_json::from_slice::<DailyAggregate>(&content) {
            Ok(aggregate) if aggregate.day() == day => Ok(Some(aggregate)),
            Ok(aggregate) => {
                warn!(
                    "File {path:?} contains day {} instead of {day}, ignoring it",
                    aggregate.day()
                );
                Ok(None)
            }
            Err(e) => {
                // Might happen if the file was edited by hand.
                warn!("During parsing of {path:?} found illegal json: {e}");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl LocalStore for FileHistoryStore {
    async fn load_all(&self) -> Result<DayMap> {
        let mut entries = tokio::fs::read_dir(&self.days_dir)
            .await
            .map_err(|e| TallyError::io(&self.days_dir, e))?;

        let mut days = DayMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TallyError::io(&self.days_dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|v| v.to_str()) != Some("json") {
                continue;
            }
            let Some(day) = path
                .file_stem()
                .and_then(|v| v.to_str())
                .and_then(parse_day_key)
            else {
                debug!("Skipping unrelated file {path:?}");
                continue;
            };
            match Self::read_day(&path, day).await {
                Ok(Some(aggregate)) => {
                    days.insert(day, aggregate);
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable day file: {e}"),
            }
        }
        debug!("Loaded {} days from {:?}", days.len(), self.days_dir);
        Ok(days)
    }

    async fn save(&self, aggregate: &DailyAggregate) -> Result<()> {
        let path = self.path_for(aggregate.day());
        let content = serde_json::to_vec(aggregate)
            .map_err(|e| TallyError::serialization(day_key(aggregate.day()), e))?;
        write_atomic(&path, &content)
            .await
            .map_err(|e| TallyError::io(&path, e))?;
        debug!("Saved {path:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        daemon::storage::LocalStore,
        device::DeviceId,
        history::{DailyAggregate, Metric},
    };

    use super::FileHistoryStore;

    fn aggregate(day: u32, keystrokes: u64) -> DailyAggregate {
        let now = Utc.with_ymd_and_hms(2018, 7, day, 10, 0, 0).unwrap();
        let mut aggregate =
            DailyAggregate::new(NaiveDate::from_ymd_opt(2018, 7, day).unwrap(), now);
        aggregate
            .increment(&DeviceId::new("a"), Metric::Keystrokes, keystrokes, now)
            .unwrap();
        aggregate
            .increment_distance(&DeviceId::new("a"), 320.5, now)
            .unwrap();
        aggregate
    }

    #[tokio::test]
    async fn test_save_and_load_all() -> Result<()> {
        let dir = tempdir()?;
        let store = FileHistoryStore::new(dir.path().join("days"))?;

        store.save(&aggregate(3, 10)).await?;
        store.save(&aggregate(4, 20)).await?;
        store.save(&aggregate(4, 25)).await?;

        let days = store.load_all().await?;

        assert_eq!(days.len(), 2);
        assert_eq!(
            days.values().cloned().collect::<Vec<_>>(),
            vec![aggregate(3, 10), aggregate(4, 25)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_load_skips_broken_and_foreign_files() -> Result<()> {
        let dir = tempdir()?;
        let days_dir = dir.path().join("days");
        let store = FileHistoryStore::new(days_dir.clone())?;
        store.save(&aggregate(4, 20)).await?;

        std::fs::write(days_dir.join("2018-07-05.json"), "{ not json")?;
        std::fs::write(days_dir.join("notes.txt"), "hello")?;
        std::fs::write(
            days_dir.join("2018-07-06.json"),
            serde_json::to_vec(&aggregate(4, 99))?,
        )?;

        let days = store.load_all().await?;

        assert_eq!(days.len(), 1);
        assert_eq!(days.values().next(), Some(&aggregate(4, 20)));
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_day_file_does_not_hide_the_rest() -> Result<()> {
        let dir = tempdir()?;
        let days_dir = dir.path().join("days");
        let store = FileHistoryStore::new(days_dir.clone())?;
        store.save(&aggregate(2, 5)).await?;
        store.save(&aggregate(4, 20)).await?;

        // Opening succeeds but reading fails.
        std::fs::create_dir(days_dir.join("2018-07-03.json"))?;

        let days = store.load_all().await?;

        assert_eq!(
            days.values().cloned().collect::<Vec<_>>(),
            vec![aggregate(2, 5), aggregate(4, 20)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_directory_loads_nothing() -> Result<()> {
        let dir = tempdir()?;
        let store = FileHistoryStore::new(dir.path().join("days"))?;

        assert!(store.load_all().await?.is_empty());
        Ok(())
    }
}
