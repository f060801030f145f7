use anyhow::{Context, Result, anyhow};
use reverie_application::{DreamingOrchestrator, EvolutionEngine, Replayer, SessionRecorder};
use reverie_core::config::ReverieConfig;
use reverie_core::session::SessionRepository;
use reverie_execution::{NudgeMutation, ParameterPerturbation, SafetyEnvelopeSimulator};
use reverie_infrastructure::paths::ReveriePaths;
use reverie_infrastructure::{ConfigService, FileBehaviorRepository, FileSessionRepository};
use std::path::PathBuf;
use std::sync::Arc;

/// Every service a command may need, constructed once per invocation.
pub struct Services {
    pub config: ReverieConfig,
    pub sessions: Arc<dyn SessionRepository>,
    pub recorder: Arc<SessionRecorder>,
    pub orchestrator: Arc<DreamingOrchestrator>,
}

impl Services {
    pub async fn build(data_dir: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<Self> {
        let config_service = match config_path {
            Some(path) => ConfigService::new(path),
            None => ConfigService::default_location()?,
        };
        let config = config_service
            .get_config()
            .with_context(|| format!("Failed to load {}", config_service.path().display()))?;

        let data_dir = match data_dir.or_else(|| config.storage.data_dir.clone()) {
            Some(dir) => dir,
            None => ReveriePaths::data_dir()
                .map_err(|e| anyhow!("Failed to resolve data directory: {}", e))?,
        };
        tracing::debug!("[Bootstrap] Data directory: {}", data_dir.display());

        let sessions: Arc<dyn SessionRepository> = Arc::new(
            FileSessionRepository::new(&data_dir)
                .await
                .with_context(|| format!("Failed to open session store in {}", data_dir.display()))?,
        );
        let recorder = Arc::new(SessionRecorder::new(sessions.clone(), &config.recorder));
        let replayer = Arc::new(Replayer::new(
            Arc::new(SafetyEnvelopeSimulator::default()),
            config.replay.clone(),
        ));
        let engine = Arc::new(EvolutionEngine::new(
            recorder.clone(),
            replayer,
            Arc::new(FileBehaviorRepository::new()),
            Arc::new(ParameterPerturbation::default()),
            Arc::new(NudgeMutation::default()),
        ));
        let orchestrator = Arc::new(DreamingOrchestrator::new(
            recorder.clone(),
            engine,
            &config.dreaming,
        ));

        Ok(Self {
            config,
            sessions,
            recorder,
            orchestrator,
        })
    }
}
