//! Data models

pub mod user;
pub mod session;
pub mod log;
pub mod alert;
pub mod ml_detection;
pub mod suricata;

pub use user::*;
pub use session::*;
pub use log::*;
pub use alert::*;
pub use ml_detection::*;
pub use suricata::*;

use sqlx::{Postgres, QueryBuilder};

/// Default page size for list endpoints
pub const DEFAULT_LIMIT: i64 = 100;

/// Append ` WHERE ` for the first condition and ` AND ` afterwards
pub(crate) fn push_condition<'q, 'args>(
    qb: &'q mut QueryBuilder<'args, Postgres>,
    has_where: &mut bool,
) -> &'q mut QueryBuilder<'args, Postgres> {
    qb.push(if *has_where { " AND " } else { " WHERE " });
    *has_where = true;
    qb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_condition_builds_where_chain() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM logs");
        let mut has_where = false;
        push_condition(&mut qb, &mut has_where).push("source = ").push_bind("suricata".to_string());
        push_condition(&mut qb, &mut has_where).push("severity = ").push_bind("critical".to_string());

        assert_eq!(qb.sql(), "SELECT * FROM logs WHERE source = $1 AND severity = $2");
    }
}
