/// `{hostname[:20]}-{pid}-{8-char uuid}`, matching the source's `_generate_worker_id`.
pub fn generate_worker_id() -> String {
    let hostname = hostname_or_unknown();
    let truncated: String = hostname.chars().take(20).collect();
    let pid = std::process::id();
    let short_uuid = uuid::Uuid::new_v4().to_string()[..8].to_string();
    format!("{truncated}-{pid}-{short_uuid}")
}

fn hostname_or_unknown() -> String {
    // `hostname::get()` isn't in the dependency set here; shell out to the
    // platform-provided env var the way a minimal CLI would, falling back to a
    // fixed label rather than pulling in a whole crate for one syscall.
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown-host".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_id_has_three_dash_separated_parts_with_pid_in_the_middle() {
        let id = generate_worker_id();
        let parts: Vec<&str> = id.rsplitn(2, '-').collect();
        assert_eq!(parts.len(), 2);
        let short_uuid = parts[0];
        assert_eq!(short_uuid.len(), 8);
    }
}
