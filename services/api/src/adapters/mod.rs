pub mod db;
pub mod suggestions_llm;

pub use db::DbAdapter;
pub use suggestions_llm::OpenAiSuggestionAdapter;
