pub const METRICS: &str = "/metrics";

pub const HOOK_ON_PUBLISH: &str = "/api/hooks/on_publish";
pub const HOOK_ON_UNPUBLISH: &str = "/api/hooks/on_unpublish";

pub const SESSIONS: &str = "/api/sessions";

pub fn session(session: &str) -> String {
    format!("/api/sessions/{}", session)
}

pub fn session_relays(session: &str) -> String {
    format!("/api/sessions/{}/relays", session)
}

pub fn destination_restart(destination: &str) -> String {
    format!("/api/destinations/{}/restart", destination)
}

/// Stats endpoint of the ingest server HTTP API
pub fn ingest_stream_stat(app: &str, stream: &str) -> String {
    format!("/api/v1/streams/{}/{}/stat", app, stream)
}
