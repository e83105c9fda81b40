use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::language::Language;

/// A hosted bot — the unit of supervision.
///
/// The CRUD surface owns `name`, `source`, `credential` and the timestamps;
/// the supervisor only ever toggles `running`, `started_at` and
/// `uptime_seconds` alongside the process registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    /// Opaque unique identifier, assigned at creation, immutable.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub language: Language,
    /// Program text. Mutable while the bot is not running.
    pub source: String,
    /// Opaque secret injected into the source before launch.
    pub credential: String,
    /// Authoritative record of whether a process is believed to exist.
    #[serde(default)]
    pub running: bool,
    /// Unix timestamp of the last successful launch.
    #[serde(default)]
    pub started_at: Option<u64>,
    /// Derived from `started_at` on reconciliation; advisory only.
    #[serde(default)]
    pub uptime_seconds: u64,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl Bot {
    pub fn new(name: &str, language: Language, source: &str, credential: &str) -> Self {
        let now = current_timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            language,
            source: source.to_string(),
            credential: credential.to_string(),
            running: false,
            started_at: None,
            uptime_seconds: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deterministic working file name for this bot's injected source.
    pub fn working_file_name(&self) -> String {
        format!("bot_{}.{}", self.id, self.language.strategy().extension)
    }

    /// Stop-sentinel file name for the cooperative shutdown fallback.
    pub fn sentinel_file_name(&self) -> String {
        format!("bot_{}.stop", self.id)
    }
}

/// Bot store — whole-collection persistence over `bots.json`.
///
/// Reads and writes replace the entire collection; callers tolerate
/// last-writer-wins semantics. No partial updates, no transactions.
pub struct BotStore {
    file_path: PathBuf,
    bots: Vec<Bot>,
}

impl BotStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            bots: Vec::new(),
        }
    }

    /// Load the collection from disk. A missing file is an empty store.
    pub fn load(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            tracing::info!("Bot store file does not exist, starting empty");
            self.bots = Vec::new();
            return Ok(());
        }

        let content = fs::read_to_string(&self.file_path)?;
        self.bots = serde_json::from_str(&content)?;
        tracing::info!("Loaded {} bots", self.bots.len());
        Ok(())
    }

    /// Persist the whole collection.
    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.bots)?;
        fs::write(&self.file_path, content)?;
        tracing::debug!("Saved {} bots", self.bots.len());
        Ok(())
    }

    pub fn add(&mut self, bot: Bot) -> Result<()> {
        self.bots.push(bot);
        self.save()?;
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        self.bots.retain(|b| b.id != id);
        self.save()?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Bot> {
        self.bots.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Bot> {
        self.bots.iter_mut().find(|b| b.id == id)
    }

    pub fn list(&self) -> &[Bot] {
        &self.bots
    }

    /// Mutable access for batched updates. The caller is responsible for
    /// calling `save()` once after mutating — at most once per pass.
    pub fn list_mut(&mut self) -> &mut Vec<Bot> {
        &mut self.bots
    }

    pub fn update(&mut self, id: &str, bot: Bot) -> Result<()> {
        if let Some(pos) = self.bots.iter().position(|b| b.id == id) {
            self.bots[pos] = bot;
            self.save()?;
            Ok(())
        } else {
            Err(anyhow::anyhow!("Bot not found: {}", id))
        }
    }
}

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
