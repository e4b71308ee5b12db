pub fn get_env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

pub fn get_env_str(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
