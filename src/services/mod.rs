pub mod generation;
pub mod llm_provider;
pub mod quiz;
pub mod scheduler;
pub mod youtube;
