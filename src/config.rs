use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::models::{Campus, CampusId, Stat, UNKNOWN_CAMPUS};
use crate::text;

const DEFAULT_CAMPUSES: &[(&str, &str, &[&str])] = &[
    ("south", "South", &["south", "south campus", "southside"]),
    ("paradise", "Paradise", &["paradise", "paradise campus"]),
    ("salisbury", "Salisbury", &["salisbury", "salisbury campus"]),
    (
        "mount_barker",
        "Mount Barker",
        &["mount barker", "mt barker", "barker", "mount barker campus"],
    ),
    (
        "adelaide_city",
        "Adelaide City",
        &["adelaide city", "adelaide city campus", "city campus", "adelaide"],
    ),
    (
        "victor_harbour",
        "Victor Harbour",
        &["victor harbour", "victor harbor", "victor"],
    ),
    ("clare_valley", "Clare Valley", &["clare valley", "clare"]),
    ("copper_coast", "Copper Coast", &["copper coast", "copper coast campus"]),
    ("online", "Online", &["online", "online campus"]),
];

const DEFAULT_TRIGGERS: &[(Stat, &[&str])] = &[
    (
        Stat::TotalAttendance,
        &["people", "attendance", "total attendance", "attended", "attendees", "total"],
    ),
    (
        Stat::NewVisitors,
        &[
            "new visitors",
            "new visitor",
            "new people",
            "new guests",
            "visitors",
            "guests",
            "np",
            "newcomers",
            "first time guests",
        ],
    ),
    (
        Stat::Decisions,
        &[
            "salvations",
            "salvation",
            "decisions",
            "decision",
            "new christians",
            "christians",
            "baptisms",
            "nc",
        ],
    ),
    (
        Stat::YouthAttendance,
        &["youth", "yout", "youth attendance", "youth group", "teens"],
    ),
    (
        Stat::KidsAttendance,
        &["kids", "kids total", "kids attendance", "children", "kids ministry"],
    ),
    (
        Stat::ConnectGroups,
        &["connect groups", "connect group", "connects", "small groups", "life groups"],
    ),
];

#[derive(Debug, Clone, Deserialize)]
pub struct CampusConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Reference data loaded once at startup. Nothing mutates it afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub extraction_window: usize,
    pub insight_threshold: f64,
    pub campuses: Vec<CampusConfig>,
    /// Per-stat trigger overrides keyed by stat key; replaces the defaults
    /// for that stat only.
    pub triggers: BTreeMap<String, Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            extraction_window: 3,
            insight_threshold: 0.2,
            campuses: DEFAULT_CAMPUSES
                .iter()
                .map(|(id, name, aliases)| CampusConfig {
                    id: id.to_string(),
                    name: name.to_string(),
                    aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
                })
                .collect(),
            triggers: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Settings> {
        let settings = match path {
            None => Settings::default(),
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
        };
        settings.validate()?;
        tracing::debug!(
            campuses = settings.campuses.len(),
            window = settings.extraction_window,
            "settings loaded"
        );
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.campuses.is_empty() {
            bail!("at least one campus must be configured");
        }
        let mut seen = HashSet::new();
        for campus in &self.campuses {
            if campus.id.trim().is_empty() || campus.id == UNKNOWN_CAMPUS {
                bail!("invalid campus id {:?}", campus.id);
            }
            if !seen.insert(campus.id.as_str()) {
                bail!("duplicate campus id {}", campus.id);
            }
        }
        for key in self.triggers.keys() {
            if Stat::from_key(key).is_none() {
                bail!("unknown stat {key:?} in trigger overrides");
            }
        }
        if !(0.0..10.0).contains(&self.insight_threshold) {
            bail!("insight_threshold must be between 0 and 10");
        }
        Ok(())
    }

    pub fn directory(&self) -> CampusDirectory {
        CampusDirectory::new(
            self.campuses
                .iter()
                .map(|campus| {
                    let mut aliases: Vec<String> = vec![
                        text::normalize(&campus.name),
                        text::normalize(&campus.id.replace('_', " ")),
                    ];
                    aliases.extend(campus.aliases.iter().map(|alias| text::normalize(alias)));
                    aliases.retain(|alias| !alias.is_empty());
                    let mut seen = HashSet::new();
                    aliases.retain(|alias| seen.insert(alias.clone()));
                    Campus {
                        id: campus.id.clone(),
                        name: campus.name.clone(),
                        aliases,
                    }
                })
                .collect(),
        )
    }

    pub fn triggers(&self) -> StatTriggers {
        StatTriggers {
            entries: DEFAULT_TRIGGERS
                .iter()
                .map(|(stat, defaults)| {
                    let phrases = match self.triggers.get(stat.key()) {
                        Some(custom) => custom.clone(),
                        None => defaults.iter().map(|phrase| phrase.to_string()).collect(),
                    };
                    (*stat, phrases)
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CampusDirectory {
    campuses: Vec<Campus>,
}

impl CampusDirectory {
    pub fn new(campuses: Vec<Campus>) -> Self {
        Self { campuses }
    }

    pub fn campuses(&self) -> &[Campus] {
        &self.campuses
    }

    pub fn get(&self, id: &str) -> Option<&Campus> {
        self.campuses.iter().find(|campus| campus.id == id)
    }

    pub fn ids(&self) -> Vec<CampusId> {
        self.campuses.iter().map(|campus| campus.id.clone()).collect()
    }

    /// Display name for an id; unknown ids are shown as given.
    pub fn display_name(&self, id: &str) -> String {
        self.get(id)
            .map(|campus| campus.name.clone())
            .unwrap_or_else(|| id.replace('_', " "))
    }

    /// Exact lookup of a campus id, display name or alias. Used for explicit
    /// overrides and for mapping stored rows back to ids.
    pub fn lookup(&self, name: &str) -> Option<&Campus> {
        let wanted = text::normalize(name);
        if wanted.is_empty() {
            return None;
        }
        self.campuses
            .iter()
            .find(|campus| {
                campus.id == wanted || campus.aliases.iter().any(|alias| *alias == wanted)
            })
    }
}

#[derive(Debug, Clone)]
pub struct StatTriggers {
    entries: Vec<(Stat, Vec<String>)>,
}

impl StatTriggers {
    pub fn entries(&self) -> &[(Stat, Vec<String>)] {
        &self.entries
    }
}
