use crate::ai::tools::all_tools;
use crate::core::AppConfig;
use crate::openai::BoxedToolCall;

pub struct AppState {
    pub tools: Vec<BoxedToolCall>,
}

impl AppState {
    /// Tools are wired to their services once, at startup.
    pub fn new(config: AppConfig) -> Self {
        Self {
            tools: all_tools(&config),
        }
    }

    pub fn tool(&self, name: &str) -> Option<&BoxedToolCall> {
        self.tools.iter().find(|t| t.function_name() == name)
    }
}
