//! SQLite schema. Applied idempotently every time a store is opened.
//!
//! `route_stops` deliberately declares no foreign keys: links to unknown
//! routes or stops must stay storable so integrity validation can report them.

pub(crate) const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS routes (
        route_id TEXT PRIMARY KEY CHECK (length(route_id) > 0),
        route_name TEXT NOT NULL,
        origin TEXT NOT NULL,
        destination TEXT NOT NULL,
        service_type INTEGER NOT NULL,
        operator TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stops (
        stop_id TEXT PRIMARY KEY CHECK (length(stop_id) > 0),
        stop_name TEXT NOT NULL,
        lat REAL NOT NULL,
        lng REAL NOT NULL,
        operator TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS route_stops (
        route_id TEXT NOT NULL CHECK (length(route_id) > 0),
        stop_id TEXT NOT NULL CHECK (length(stop_id) > 0),
        direction INTEGER NOT NULL CHECK (direction IN (1, 2)),
        service_type INTEGER NOT NULL,
        sequence INTEGER NOT NULL CHECK (sequence >= 0),
        updated_at TEXT NOT NULL,
        PRIMARY KEY (route_id, stop_id, direction, service_type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS update_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT NOT NULL,
        records_updated INTEGER NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        logged_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_route_stops_route_id ON route_stops(route_id)",
    "CREATE INDEX IF NOT EXISTS idx_route_stops_stop_id ON route_stops(stop_id)",
    "CREATE INDEX IF NOT EXISTS idx_route_stops_direction ON route_stops(direction)",
    "CREATE INDEX IF NOT EXISTS idx_update_log_logged_at ON update_log(logged_at)",
];
