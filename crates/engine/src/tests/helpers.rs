use crate::Engine;
use anyhow::Result;
use config::EngineConfig;
use std::path::Path;

pub fn test_config(dir: &Path) -> EngineConfig {
    EngineConfig::new(dir.join("translog.log")).with_translog_sync(false)
}

pub fn open_engine(dir: &Path) -> Result<Engine> {
    Engine::open(test_config(dir))
}

pub fn engine_error(err: &anyhow::Error) -> Option<&crate::EngineError> {
    err.downcast_ref::<crate::EngineError>()
}
