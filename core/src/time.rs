use chrono::Utc;
use uuid::Uuid;

/// Unique token for naming a run's private workspace.
///
/// A sortable UTC timestamp followed by a random suffix, so runs started in
/// the same instant by different configuration groups never share a
/// directory.
pub fn run_token() -> String {
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%d%H%M%S%6f"),
        Uuid::new_v4().simple()
    )
}
