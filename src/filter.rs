use sqlx::{Postgres, QueryBuilder};

use crate::model::{LogFilter, StatusCodeFilter};

/// Compiles a validated [`LogFilter`] into AND-joined predicate fragments
/// on the given statement builder.
///
/// This is the single compilation step shared by the count and page
/// statements, so both always see the identical WHERE clause. Every
/// user-supplied value is pushed as a bind parameter; the only literal
/// fragments are the status-class ranges, which come from a fixed enum
/// and never from user text. An empty filter contributes no WHERE clause.
pub fn push_filter_predicates(builder: &mut QueryBuilder<'_, Postgres>, filter: &LogFilter) {
    let mut join = PredicateJoiner::default();

    if let Some(search) = &filter.search {
        // One shared pattern value, matched against the service name and
        // the textual origin IP.
        let pattern = format!("%{search}%");
        builder.push(join.separator());
        builder.push("(service_name ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR origin_ip ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }

    if let Some(service_name) = &filter.service_name {
        builder.push(join.separator());
        builder.push("service_name = ");
        builder.push_bind(service_name.clone());
    }

    if let Some(status_code) = filter.status_code {
        builder.push(join.separator());
        match status_code {
            StatusCodeFilter::Class(class) => {
                let (low, high) = class.bounds();
                builder.push(format!(
                    "(status_code >= {low} AND status_code <= {high})"
                ));
            }
            StatusCodeFilter::Exact(code) => {
                builder.push("status_code = ");
                builder.push_bind(code);
            }
        }
    }

    if let Some(start_time) = filter.start_time {
        builder.push(join.separator());
        builder.push("timestamp >= ");
        builder.push_bind(start_time);
    }
}

/// Emits ` WHERE ` before the first fragment and ` AND ` before the rest.
#[derive(Default)]
struct PredicateJoiner {
    any: bool,
}

impl PredicateJoiner {
    fn separator(&mut self) -> &'static str {
        if self.any {
            " AND "
        } else {
            self.any = true;
            " WHERE "
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::StatusClass;

    fn compile(filter: &LogFilter) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM logs");
        push_filter_predicates(&mut builder, filter);
        builder.into_sql()
    }

    #[test]
    fn empty_filter_compiles_to_no_where_clause() {
        assert_eq!(compile(&LogFilter::default()), "SELECT COUNT(*) FROM logs");
    }

    #[test]
    fn search_binds_one_pattern_on_both_sides_of_the_or() {
        let filter = LogFilter {
            search: Some("edge".into()),
            ..Default::default()
        };
        assert_eq!(
            compile(&filter),
            "SELECT COUNT(*) FROM logs WHERE (service_name ILIKE $1 OR origin_ip ILIKE $2)"
        );
    }

    #[test]
    fn status_class_compiles_to_a_literal_inclusive_range_without_binds() {
        let filter = LogFilter {
            status_code: Some(StatusCodeFilter::Class(StatusClass::ClientError)),
            ..Default::default()
        };
        let sql = compile(&filter);
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM logs WHERE (status_code >= 400 AND status_code <= 499)"
        );
        assert!(!sql.contains('$'));
    }

    #[test]
    fn exact_status_code_is_bound_as_a_parameter() {
        let filter = LogFilter {
            status_code: Some(StatusCodeFilter::Exact(404)),
            ..Default::default()
        };
        assert_eq!(
            compile(&filter),
            "SELECT COUNT(*) FROM logs WHERE status_code = $1"
        );
    }

    #[test]
    fn start_time_is_an_inclusive_bound_parameter() {
        let filter = LogFilter {
            start_time: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        assert_eq!(
            compile(&filter),
            "SELECT COUNT(*) FROM logs WHERE timestamp >= $1"
        );
    }

    #[test]
    fn all_fragments_join_with_and_in_a_fixed_order() {
        let filter = LogFilter {
            search: Some("10.0".into()),
            service_name: Some("checkout".into()),
            status_code: Some(StatusCodeFilter::Class(StatusClass::ServerError)),
            start_time: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        assert_eq!(
            compile(&filter),
            "SELECT COUNT(*) FROM logs \
             WHERE (service_name ILIKE $1 OR origin_ip ILIKE $2) \
             AND service_name = $3 \
             AND (status_code >= 500 AND status_code <= 599) \
             AND timestamp >= $4"
        );
    }
}
