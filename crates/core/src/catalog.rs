//! The browsable collections and the loaders that page over them.

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::{
    config::AppConfig,
    models::{Achievement, LeaderboardEntry, Record, StatRecord},
    paging::{DataSource, JsonFileSource, LoaderOptions, PaginatedLoader},
};

/// Lists the front end can browse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Unlockable milestones.
    Achievements,
    /// Best runs.
    Leaderboard,
    /// Campaign statistics.
    Statistics,
}

impl Collection {
    /// Every collection in display order.
    pub const ALL: [Collection; 3] = [
        Collection::Achievements,
        Collection::Leaderboard,
        Collection::Statistics,
    ];

    /// Title shown in tabs.
    pub fn title(self) -> &'static str {
        match self {
            Collection::Achievements => "Achievements",
            Collection::Leaderboard => "Leaderboard",
            Collection::Statistics => "Statistics",
        }
    }

    /// JSON file backing the collection inside the data directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Collection::Achievements => "achievements.json",
            Collection::Leaderboard => "leaderboard.json",
            Collection::Statistics => "statistics.json",
        }
    }

    /// Collection whose backing file is `path`, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|collection| collection.file_name() == name)
    }
}

/// Builds loaders over the JSON files in a data directory.
#[derive(Debug, Clone)]
pub struct Catalog {
    data_dir: PathBuf,
    latency: Duration,
    options: LoaderOptions,
}

impl Catalog {
    /// Catalog described by `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            latency: Duration::from_millis(config.demo_latency_ms),
            options: config.paging.loader_options(),
        }
    }

    /// Directory holding the collection files.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the file backing `collection`.
    pub fn path(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(collection.file_name())
    }

    /// Loader paging over `collection`, with its count taken from the file.
    pub fn loader(&self, collection: Collection) -> PaginatedLoader<Record> {
        match collection {
            Collection::Achievements => self.file_loader(collection, Record::Achievement),
            Collection::Leaderboard => self.file_loader(collection, Record::Leaderboard),
            Collection::Statistics => self.file_loader(collection, Record::Stat),
        }
    }

    fn file_loader<R>(
        &self,
        collection: Collection,
        wrap: fn(R) -> Record,
    ) -> PaginatedLoader<Record>
    where
        R: DeserializeOwned + Send + Sync + 'static,
    {
        let file: JsonFileSource<R> = JsonFileSource::new(self.path(collection));
        let counter = file.clone();
        let latency = self.latency;
        let fetch = move |skip: usize, take: usize| -> Result<Vec<Record>> {
            if !latency.is_zero() {
                thread::sleep(latency);
            }
            Ok(file.fetch(skip, take)?.into_iter().map(wrap).collect())
        };
        PaginatedLoader::with_counter(fetch, counter, self.options)
    }

    /// Write generated sample files for any collection missing on disk.
    pub fn seed_samples(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        for collection in Collection::ALL {
            let path = self.path(collection);
            if path.exists() {
                continue;
            }
            match collection {
                Collection::Achievements => write_json(&path, &sample_achievements(137))?,
                Collection::Leaderboard => write_json(&path, &sample_leaderboard(250))?,
                Collection::Statistics => write_json(&path, &sample_statistics())?,
            }
            info!(path = %path.display(), "seeded sample data");
        }
        Ok(())
    }
}

fn write_json<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let serialized = serde_json::to_vec_pretty(records)?;
    fs::write(path, serialized).with_context(|| format!("failed to write {}", path.display()))
}

const DEEDS: [&str; 8] = [
    "Oathbreaker", "Lantern", "Wayfarer", "Ironbound", "Grave", "Ember", "Tidecaller", "Hollow",
];
const TIERS: [&str; 4] = ["Initiate", "Adept", "Veteran", "Legend"];
const CHAPTERS: [&str; 5] = [
    "Prologue",
    "The Ashen Gate",
    "Salt and Silence",
    "Crown of Thorns",
    "Epilogue",
];

fn sample_achievements(count: usize) -> Vec<Achievement> {
    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 18, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    (0..count)
        .map(|index| {
            let deed = DEEDS[index % DEEDS.len()];
            let tier = TIERS[(index / DEEDS.len()) % TIERS.len()];
            Achievement {
                id: format!("ach-{index:03}"),
                title: format!("{deed} {tier} {}", index / 32 + 1),
                description: format!("Earn the {deed} mark at the {tier} tier."),
                points: 5 * (1 + (index % 10) as u32),
                unlocked_at: (index % 3 == 0)
                    .then(|| start + ChronoDuration::days(index as i64)),
            }
        })
        .collect()
}

fn sample_leaderboard(count: usize) -> Vec<LeaderboardEntry> {
    (0..count)
        .map(|index| LeaderboardEntry {
            rank: index as u32 + 1,
            player: format!("{}-{}", DEEDS[(index * 7) % DEEDS.len()], 100 + index),
            score: 50_000u64.saturating_sub(index as u64 * 173),
            chapter: CHAPTERS[index % CHAPTERS.len()].to_string(),
        })
        .collect()
}

fn sample_statistics() -> Vec<StatRecord> {
    CHAPTERS
        .iter()
        .flat_map(|chapter| {
            [
                ("clears", "clears", 12.0),
                ("deaths", "deaths", 31.0),
                ("stress", "average stress", 4.5),
                ("trauma", "trauma taken", 2.0),
            ]
            .into_iter()
            .map(move |(key, label, base)| (chapter, key, label, base))
        })
        .enumerate()
        .map(|(index, (chapter, key, label, base))| StatRecord {
            key: format!("{}.{key}", chapter.to_lowercase().replace(' ', "_")),
            label: format!("{chapter}: {label}"),
            value: base * (1.0 + index as f64 / 10.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paging::PagingResult;
    use tempfile::tempdir;

    fn catalog(dir: &Path) -> Catalog {
        let mut config = AppConfig {
            data_dir: dir.to_path_buf(),
            ..AppConfig::default()
        };
        config.paging.page_size = 25;
        Catalog::from_config(&config)
    }

    #[test]
    fn collections_resolve_from_paths() {
        assert_eq!(
            Collection::from_path(Path::new("/tmp/x/leaderboard.json")),
            Some(Collection::Leaderboard)
        );
        assert_eq!(Collection::from_path(Path::new("notes.txt")), None);
    }

    #[test]
    fn seeded_files_page_through_loaders() -> Result<()> {
        let dir = tempdir()?;
        let catalog = catalog(dir.path());
        catalog.seed_samples()?;

        let achievements = catalog.loader(Collection::Achievements);
        assert_eq!(achievements.total_count()?, 137);
        assert_eq!(achievements.total_pages()?, 6);
        let last = achievements.load_page(5)?;
        assert_eq!(last.len(), 12);
        assert!(matches!(&last[0], Record::Achievement(a) if a.id == "ach-125"));

        let leaderboard = catalog.loader(Collection::Leaderboard);
        match leaderboard.get_item(0)? {
            Some(Record::Leaderboard(entry)) => assert_eq!(entry.rank, 1),
            other => panic!("unexpected first row {other:?}"),
        }

        let stats = catalog.loader(Collection::Statistics);
        assert_eq!(stats.total_count()?, 20);
        Ok(())
    }

    #[test]
    fn seeding_keeps_existing_files() -> Result<()> {
        let dir = tempdir()?;
        let catalog = catalog(dir.path());
        fs::write(catalog.path(Collection::Statistics), "[]")?;
        catalog.seed_samples()?;
        assert_eq!(fs::read_to_string(catalog.path(Collection::Statistics))?, "[]");
        Ok(())
    }

    #[test]
    fn edits_show_up_after_invalidation() -> PagingResult<()> {
        let dir = tempdir().expect("tempdir");
        let catalog = catalog(dir.path());
        let path = catalog.path(Collection::Statistics);
        let write = |value: f64| {
            let stats = vec![StatRecord {
                key: "k".to_string(),
                label: "k".to_string(),
                value,
            }];
            write_json(&path, &stats).expect("write stats");
        };

        write(1.0);
        let loader = catalog.loader(Collection::Statistics);
        let before = loader.get_item(0)?;
        write(2.0);
        assert_eq!(loader.get_item(0)?, before);

        loader.invalidate_cache();
        match loader.get_item(0)? {
            Some(Record::Stat(stat)) => assert_eq!(stat.value, 2.0),
            other => panic!("unexpected row {other:?}"),
        }
        Ok(())
    }
}
