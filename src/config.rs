//! Settings that shape how handlers report progress.

use serde::Deserialize;

/// Configuration shared by every method handler of a registry.
///
/// Usually taken from the client's `initializationOptions`. Missing fields use their defaults.
///
/// ```
/// use lspower_handlers::HandlerConfig;
///
/// let config: HandlerConfig = serde_json::from_str(r#"{ "workDoneTitle": "Indexing" }"#).unwrap();
/// assert_eq!(config.work_done_title, "Indexing");
/// assert!(config.cancellable_progress);
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HandlerConfig {
    /// Title of the `begin` notification sent implicitly on the first progress report.
    pub work_done_title: String,
    /// Whether work-done progress tells the client the operation can be cancelled.
    pub cancellable_progress: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        HandlerConfig {
            work_done_title: "Working".to_string(),
            cancellable_progress: true,
        }
    }
}
