//! Service layer: the model backend client and the document analyzer built on it.

pub mod ai_client;
pub mod analyzer;

pub use ai_client::OpenAiClient;
pub use analyzer::{AnalysisError, DocumentAnalyzer};
