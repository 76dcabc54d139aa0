use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use engram_store::Database;

use crate::client::{
    AdminOps, CapsuleOps, ConsolidationOps, ContextOps, DecisionOps, EditOps, EventOps, HandoffOps,
};
use crate::config::Config;
use crate::scheduler::{ConsolidationScheduler, SchedulerHandle};
use crate::summarizer::{ExtractiveSummarizer, Summarizer};
use crate::Result;

/// Service facade. Holds the shared store handle and configuration and
/// hands out per-concern operation groups; every operation takes the
/// authenticated principal explicitly.
pub struct Engram {
    db: Arc<Mutex<Database>>,
    config: Arc<Config>,
    summarizer: Arc<dyn Summarizer>,
}

impl Engram {
    /// Open (or create) the service state under a data directory.
    pub fn open(data_dir: PathBuf) -> Result<Self> {
        let db_path = data_dir.join("engram.db");
        let config_path = data_dir.join("engram.toml");

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                crate::Error::Invalid(format!("cannot create data dir: {}", e))
            })?;
        }

        let db = Database::open(&db_path)?;
        let config = Config::load_from(&config_path)?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            config: Arc::new(config),
            summarizer: Arc::new(ExtractiveSummarizer),
        })
    }

    /// Ephemeral in-memory service, for tests and local experimentation.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Arc::new(Mutex::new(Database::open_in_memory()?)),
            config: Arc::new(Config::default()),
            summarizer: Arc::new(ExtractiveSummarizer),
        })
    }

    pub fn with_config(mut self, config: Config) -> Result<Self> {
        config.validate()?;
        self.config = Arc::new(config);
        Ok(self)
    }

    /// Swap in a real summarization capability (an LLM-backed
    /// implementation); consolidation is its only caller.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn events(&self) -> EventOps {
        EventOps::new(self.db.clone(), self.config.clone())
    }

    pub fn context(&self) -> ContextOps {
        ContextOps::new(self.db.clone(), self.config.clone())
    }

    pub fn edits(&self) -> EditOps {
        EditOps::new(self.db.clone(), self.config.clone())
    }

    pub fn decisions(&self) -> DecisionOps {
        DecisionOps::new(self.db.clone(), self.config.clone())
    }

    pub fn handoffs(&self) -> HandoffOps {
        HandoffOps::new(self.db.clone(), self.config.clone())
    }

    pub fn capsules(&self) -> CapsuleOps {
        CapsuleOps::new(self.db.clone(), self.config.clone())
    }

    pub fn consolidation(&self) -> ConsolidationOps {
        ConsolidationOps::new(
            self.db.clone(),
            self.config.clone(),
            self.summarizer.clone(),
        )
    }

    pub fn admin(&self) -> AdminOps {
        AdminOps::new(self.db.clone())
    }

    /// Start the background consolidation scheduler. Must be called from
    /// within a tokio runtime; stop it through the returned handle.
    pub fn start_scheduler(&self) -> SchedulerHandle {
        ConsolidationScheduler::start(
            self.db.clone(),
            self.config.clone(),
            self.summarizer.clone(),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
