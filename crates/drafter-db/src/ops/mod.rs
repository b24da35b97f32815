mod branches;
mod commits;
mod files;
mod locks;
mod remote;

pub use branches::*;
pub use commits::*;
pub use files::*;
pub use locks::*;
pub use remote::*;

use chrono::{DateTime, Utc};

// ── Helpers ──

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn fmt_dt(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn opt_dt(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(fmt_dt)
}
