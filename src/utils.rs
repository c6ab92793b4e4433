pub fn now_unix_ms() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp_nanos() as i64 / 1_000_000
}

pub fn shorten_body(body: &str) -> String {
    let trimmed = body.replace('\n', " ").trim().to_string();
    if trimmed.chars().count() > 400 {
        format!("{}...", trimmed.chars().take(400).collect::<String>())
    } else {
        trimmed
    }
}

pub fn trim_base_url(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}
