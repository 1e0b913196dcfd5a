/// Result alias used by the plumbing layers; typed errors live in `domain::error`.
pub type Result<T> = anyhow::Result<T>;
