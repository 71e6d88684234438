use docket_graph::EngineConfig;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatConfig {
    /// Bound applied to every call a step makes to a dependency.
    pub dependency_timeout: Duration,
    pub engine: EngineConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            dependency_timeout: Duration::from_secs(60),
            engine: EngineConfig::default(),
        }
    }
}

impl ChatConfig {
    pub fn with_dependency_timeout(mut self, timeout: Duration) -> Self {
        self.dependency_timeout = timeout;
        self
    }
}
