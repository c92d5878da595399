//! The instruction preamble prepended to every relayed query.
//!
//! The preamble only asks the model to stay on farming topics. Nothing
//! checks that the reply honors it.

/// Fixed refusal text the model is told to use for off-topic questions.
pub const REFUSAL: &str =
    "I'm here to help with farming and agriculture. Please ask something related to that.";

/// Role marker placed before the user's query.
pub const USER_MARKER: &str = "User:";

/// Role marker the prompt ends on, so the model answers as the assistant.
pub const ASSISTANT_MARKER: &str = "Assistant:";

pub const FARMER_INSTRUCTIONS: &str = r#"
You are an AI assistant for Indian farmers.
You should ONLY answer questions related to:
1. Smart irrigation (based on weather forecasts).
2. Buying/selling crops directly in markets.
3. Farming practices like crops, soil, fertilizers, pests, and climate.

If a user asks something unrelated (e.g. politics, history, movies, tech), respond with:
"I'm here to help with farming and agriculture. Please ask something related to that."
"#;

/// Wrap a user query in the farmer preamble and role markers.
pub fn build_farmer_prompt(query: &str) -> String {
    format!(
        "{instructions}\n{user} {query}\n{assistant}",
        instructions = FARMER_INSTRUCTIONS,
        user = USER_MARKER,
        query = query,
        assistant = ASSISTANT_MARKER
    )
}
