const SCHEDULER_URL: &str = "SLOT_MONITOR_SCHEDULER_URL";

/// Scheduler URL override from the environment, if set and non-empty
pub fn get_scheduler_url() -> Option<String> {
    std::env::var(SCHEDULER_URL)
        .ok()
        .filter(|url| !url.trim().is_empty())
}

/// Join a base URL and a path, ignoring a trailing `/` on the base
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
