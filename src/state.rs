use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::config::AuthConfig;
use crate::db::Database;
use crate::services::generation::StudyAssistant;
use crate::services::llm_provider::TextGenerator;
use crate::services::youtube::TranscriptSource;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    db: Database,
    auth: Arc<AuthConfig>,
    assistant: StudyAssistant,
    transcripts: Arc<dyn TranscriptSource>,
}

impl AppState {
    pub fn new(
        db: Database,
        auth: AuthConfig,
        generator: Arc<dyn TextGenerator>,
        transcripts: Arc<dyn TranscriptSource>,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            db,
            auth: Arc::new(auth),
            assistant: StudyAssistant::new(generator),
            transcripts,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn auth_config(&self) -> &AuthConfig {
        &self.auth
    }

    pub fn assistant(&self) -> &StudyAssistant {
        &self.assistant
    }

    pub fn transcripts(&self) -> Arc<dyn TranscriptSource> {
        Arc::clone(&self.transcripts)
    }
}
