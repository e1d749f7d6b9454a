// --- Default value functions ---

pub(super) fn default_log_level() -> String {
    "info".to_string()
}
pub(super) fn default_identity() -> String {
    "rohan".to_string()
}
pub(super) fn default_history_limit() -> usize {
    10
}
pub(super) fn default_ms_per_char() -> u64 {
    80
}
pub(super) fn default_thinking_min_ms() -> u64 {
    1000
}
pub(super) fn default_thinking_max_ms() -> u64 {
    3000
}
pub(super) fn default_typo_probability() -> f64 {
    0.05
}
pub(super) fn default_provider() -> String {
    "gemini".to_string()
}
pub(super) fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}
pub(super) fn default_location() -> String {
    "us-central1".to_string()
}
pub(super) fn default_max_output_tokens() -> u32 {
    2048
}
pub(super) fn default_temperature() -> f32 {
    0.9
}
pub(super) fn default_top_p() -> f32 {
    1.0
}
pub(super) fn default_timeout_secs() -> u64 {
    120
}
pub(super) fn default_db_path() -> String {
    "~/.replica/data/replica.db".to_string()
}
pub(super) fn default_poll_interval_ms() -> u64 {
    500
}
