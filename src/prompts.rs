//! Prompt for LLM-based event extraction.
//!
//! Kept in one place so the wording can change without touching the analyzer's
//! timeout and validation logic, and so tests can inspect it directly.

/// Instruction block preceding the document text.
///
/// The analyzer accepts the reply only if it is a bare JSON array, so every
/// rule that keeps the model from adding prose is load-bearing.
pub const EVENT_EXTRACTION_INSTRUCTIONS: &str = r#"Extract all important dates, times, and event descriptions from the following text.
If no events are found, return an empty JSON array: [].
Do not include any other text or conversational phrases in your response.
Return the information as a JSON array of objects. Each object must have a 'summary', 'start_time', and 'end_time' key.
The time format should be 'YYYY-MM-DDTHH:MM:SSZ'. If no specific time is mentioned, use noon (12:00:00)."#;

/// Build the full analysis prompt for `text`.
pub fn event_extraction_prompt(text: &str) -> String {
    format!(
        "{}\nText: \"\"\"{}\"\"\"",
        EVENT_EXTRACTION_INSTRUCTIONS, text
    )
}
