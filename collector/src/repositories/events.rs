use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::models::event::{EventFilter, NewLoginEvent, StoredLoginEvent};

const EVENT_COLUMNS: &str = "id, received_at, event_type, event_timestamp, hostname, user, method, \
     source_ip, source_port, raw_message, region, host_group, severity, flagged";

pub async fn insert_event(
    pool: &SqlitePool,
    event: &NewLoginEvent,
    received_at: DateTime<Utc>,
) -> Result<StoredLoginEvent, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO login_events
            (received_at, event_type, event_timestamp, hostname, user, method,
             source_ip, source_port, raw_message, region, host_group, severity, flagged)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {}
        "#,
        EVENT_COLUMNS
    );

    sqlx::query_as::<_, StoredLoginEvent>(&sql)
        .bind(received_at)
        .bind(&event.event_type)
        .bind(&event.event_timestamp)
        .bind(&event.hostname)
        .bind(&event.user)
        .bind(&event.method)
        .bind(&event.source_ip)
        .bind(&event.source_port)
        .bind(&event.raw_message)
        .bind(&event.region)
        .bind(&event.host_group)
        .bind(&event.severity)
        .bind(event.flagged)
        .fetch_one(pool)
        .await
}

/// Events received inside the filter's window, newest first
pub async fn list_events(pool: &SqlitePool, filter: &EventFilter) -> Result<Vec<StoredLoginEvent>, sqlx::Error> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {} FROM login_events WHERE received_at >= ", EVENT_COLUMNS));
    query.push_bind(filter.received_since);

    let text_filters = [
        ("user", &filter.user),
        ("hostname", &filter.hostname),
        ("region", &filter.region),
        ("host_group", &filter.host_group),
        ("severity", &filter.severity),
    ];
    for (column, value) in text_filters {
        if let Some(value) = value {
            query.push(format!(" AND {} = ", column));
            query.push_bind(value.clone());
        }
    }

    if let Some(flagged) = filter.flagged {
        query.push(" AND flagged = ");
        query.push_bind(flagged);
    }

    query.push(" ORDER BY received_at DESC, id DESC LIMIT ");
    query.push_bind(filter.limit);

    query.build_query_as::<StoredLoginEvent>().fetch_all(pool).await
}

pub async fn count_events(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM login_events")
        .fetch_one(pool)
        .await
}
