// Resume analysis: attribute extraction, similarity scoring, feedback, and the
// request pipeline that ties them together behind the form and JSON handlers.
// All model inference goes through `nlp`; all Gemini calls through `llm_client`.

pub mod attributes;
pub mod feedback;
pub mod handlers;
pub mod pages;
pub mod pipeline;
pub mod prompts;
pub mod similarity;
pub mod stopwords;
