pub mod llm;
pub mod openai;
pub mod watsonx;

pub use openai::OpenAIAdapter;
pub use watsonx::WatsonxAdapter;
