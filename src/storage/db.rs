use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Result;

/// One stored contact.
///
/// `id` is a surrogate sequence number shown to the admin as "Number"; it is
/// stable across upserts and never reused. `user_id` is the external Telegram
/// identity and is unique across live records. `tag` and `phone` use the
/// empty string for "unset".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Surrogate primary key ("Number" in the UI)
    pub id: i64,
    /// Telegram ID of the contact, unique
    pub user_id: i64,
    /// Short handle, `@`-prefixed
    pub user: String,
    /// Display name, free text
    pub name: String,
    /// Optional tag, empty string when unset
    pub tag: String,
    /// Optional phone in `+digits` form, empty string when unset
    pub phone: String,
}

/// Columns the admin may rewrite through the replace flows.
///
/// Closed enumeration so a column name can never be assembled from free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Name,
    User,
    Tag,
}

impl RecordField {
    /// SQL column name for this field
    pub fn column(self) -> &'static str {
        match self {
            RecordField::Name => "name",
            RecordField::User => "user",
            RecordField::Tag => "tag",
        }
    }
}

/// Filter applied to listing queries.
///
/// Closed enumeration; the filtered column is chosen here, never from user
/// text, so there is no injection surface in the query builders below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    ByUser(String),
    ByName(String),
}

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and ensures the
/// schema is up to date.
///
/// # Arguments
///
/// * `database_path` - Path to SQLite database file
///
/// # Returns
///
/// Returns a `DbPool` on success or an `r2d2::Error` if pool creation fails.
pub fn create_pool(database_path: &str) -> std::result::Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    build_pool(manager)
}

/// Create a pool backed by an in-memory database (tests)
///
/// Capped at a single connection: `:memory:` databases are private per
/// connection, so a larger pool would hand out empty databases.
pub fn create_memory_pool() -> std::result::Result<DbPool, r2d2::Error> {
    let pool = Pool::builder().max_size(1).build(SqliteConnectionManager::memory())?;

    let conn = pool.get()?;
    if let Err(e) = migrate_schema(&conn) {
        log::warn!("Failed to migrate schema: {}", e);
    }
    drop(conn);

    Ok(pool)
}

fn build_pool(manager: SqliteConnectionManager) -> std::result::Result<DbPool, r2d2::Error> {
    let pool = Pool::builder()
        .max_size(10) // Maximum 10 connections in the pool
        .build(manager)?;

    // Ensure schema is up to date on first connection
    let conn = pool.get()?;
    if let Err(e) = migrate_schema(&conn) {
        log::warn!("Failed to migrate schema: {}", e);
        // Don't fail on migration errors, as they might be expected
    }

    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is automatically returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> std::result::Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Migrate database schema to ensure the table and all required columns exist
///
/// Older deployments carried a `list` table without `tag`/`phone`; those
/// columns are added in place.
fn migrate_schema(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS list (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER UNIQUE,
            user TEXT NOT NULL,
            name TEXT NOT NULL,
            tag TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    // Check which columns exist
    let mut stmt = conn.prepare("PRAGMA table_info(list)")?;
    let rows = stmt.query_map([], |row| {
        row.get::<_, String>(1) // column name
    })?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }

    // Add tag if it doesn't exist
    if !columns.contains(&"tag".to_string()) {
        log::info!("Adding missing column: tag to list table");
        if let Err(e) = conn.execute("ALTER TABLE list ADD COLUMN tag TEXT NOT NULL DEFAULT ''", []) {
            log::warn!("Failed to add tag column: {}", e);
        }
    }

    // Add phone if it doesn't exist
    if !columns.contains(&"phone".to_string()) {
        log::info!("Adding missing column: phone to list table");
        if let Err(e) = conn.execute("ALTER TABLE list ADD COLUMN phone TEXT NOT NULL DEFAULT ''", []) {
            log::warn!("Failed to add phone column: {}", e);
        }
    }

    Ok(())
}

/// Insert a record, or replace the fields of the record sharing `user_id`.
///
/// Uses `ON CONFLICT(user_id) DO UPDATE`, so the surrogate `id` of an existing
/// row is preserved: a "Number" the admin already saw stays valid after the
/// same contact is re-added.
///
/// # Returns
///
/// Returns `Ok(())` at success or a database error.
pub fn upsert_record(
    conn: &DbConnection,
    user_id: i64,
    user: &str,
    name: &str,
    tag: &str,
    phone: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO list (user_id, user, name, tag, phone) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
            user = excluded.user,
            name = excluded.name,
            tag = excluded.tag,
            phone = excluded.phone",
        rusqlite::params![user_id, user, name, tag, phone],
    )?;
    Ok(())
}

/// Fetch a record by surrogate id.
pub fn get_record(conn: &DbConnection, id: i64) -> Result<Option<Record>> {
    let mut stmt =
        conn.prepare("SELECT id, user_id, user, name, tag, phone FROM list WHERE id = ?1")?;
    let mut rows = stmt.query_map(rusqlite::params![id], record_from_row)?;

    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// Check whether a record with the given surrogate id exists.
pub fn record_exists(conn: &DbConnection, id: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM list WHERE id = ?1",
        rusqlite::params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Check whether any record carries the given Telegram user id.
pub fn user_known(conn: &DbConnection, user_id: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM list WHERE user_id = ?1",
        rusqlite::params![user_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Delete a record by surrogate id.
///
/// # Returns
///
/// Returns `Ok(true)` if a row existed and was removed, `Ok(false)` if no row
/// had that id.
pub fn delete_record(conn: &DbConnection, id: i64) -> Result<bool> {
    let rows_affected = conn.execute("DELETE FROM list WHERE id = ?1", rusqlite::params![id])?;
    Ok(rows_affected > 0)
}

/// Remove every record. Admin-gated by the caller.
pub fn clear_records(conn: &DbConnection) -> Result<usize> {
    conn.execute("DELETE FROM list", [])
}

/// Count records matching a filter.
pub fn count_records(conn: &DbConnection, filter: &RecordFilter) -> Result<u64> {
    let count: i64 = match filter {
        RecordFilter::All => conn.query_row("SELECT COUNT(*) FROM list", [], |row| row.get(0))?,
        RecordFilter::ByUser(user) => conn.query_row(
            "SELECT COUNT(*) FROM list WHERE user = ?1",
            rusqlite::params![user],
            |row| row.get(0),
        )?,
        RecordFilter::ByName(name) => conn.query_row(
            "SELECT COUNT(*) FROM list WHERE name = ?1",
            rusqlite::params![name],
            |row| row.get(0),
        )?,
    };
    Ok(count as u64)
}

/// Select one listing page, ordered by ascending surrogate id.
///
/// An offset past the end of the table yields an empty vector, not an error.
pub fn select_page(
    conn: &DbConnection,
    filter: &RecordFilter,
    limit: usize,
    offset: usize,
) -> Result<Vec<Record>> {
    let (sql, value) = match filter {
        RecordFilter::All => (
            "SELECT id, user_id, user, name, tag, phone FROM list ORDER BY id ASC LIMIT ?1 OFFSET ?2",
            None,
        ),
        RecordFilter::ByUser(user) => (
            "SELECT id, user_id, user, name, tag, phone FROM list WHERE user = ?3 ORDER BY id ASC LIMIT ?1 OFFSET ?2",
            Some(user.as_str()),
        ),
        RecordFilter::ByName(name) => (
            "SELECT id, user_id, user, name, tag, phone FROM list WHERE name = ?3 ORDER BY id ASC LIMIT ?1 OFFSET ?2",
            Some(name.as_str()),
        ),
    };

    let mut stmt = conn.prepare(sql)?;
    let mut records = Vec::new();
    match value {
        Some(v) => {
            let rows =
                stmt.query_map(rusqlite::params![limit as i64, offset as i64, v], record_from_row)?;
            for row in rows {
                records.push(row?);
            }
        }
        None => {
            let rows = stmt.query_map(rusqlite::params![limit as i64, offset as i64], record_from_row)?;
            for row in rows {
                records.push(row?);
            }
        }
    }
    Ok(records)
}

/// Rewrite one field of a record.
///
/// # Returns
///
/// Returns `Ok(true)` if the row existed, `Ok(false)` otherwise.
pub fn update_field(conn: &DbConnection, id: i64, field: RecordField, value: &str) -> Result<bool> {
    // Column name comes from the closed enum, never from input.
    let sql = format!("UPDATE list SET \"{}\" = ?1 WHERE id = ?2", field.column());
    let rows_affected = conn.execute(&sql, rusqlite::params![value, id])?;
    Ok(rows_affected > 0)
}

/// Snapshot of every stored `user_id`, for broadcast fan-out.
///
/// Fetched once up front so the delivery loop never touches the store (or any
/// lock) while it runs.
pub fn recipient_ids(conn: &DbConnection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT user_id FROM list ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

fn record_from_row(row: &rusqlite::Row<'_>) -> Result<Record> {
    Ok(Record {
        id: row.get(0)?,
        user_id: row.get(1)?,
        user: row.get(2)?,
        name: row.get(3)?,
        tag: row.get(4)?,
        phone: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_conn() -> (DbPool, DbConnection) {
        let pool = create_memory_pool().unwrap();
        let conn = get_connection(&pool).unwrap();
        (pool, conn)
    }

    #[test]
    fn test_upsert_same_user_id_does_not_create_second_row() {
        let (_pool, conn) = test_conn();

        upsert_record(&conn, 12345, "@abc", "John", "", "").unwrap();
        upsert_record(&conn, 12345, "@abc_new", "Johnny", "friend", "+380501112233").unwrap();

        assert_eq!(count_records(&conn, &RecordFilter::All).unwrap(), 1);

        let record = get_record(&conn, 1).unwrap().unwrap();
        assert_eq!(record.user, "@abc_new");
        assert_eq!(record.name, "Johnny");
        assert_eq!(record.tag, "friend");
        assert_eq!(record.phone, "+380501112233");
    }

    #[test]
    fn test_upsert_preserves_surrogate_id() {
        let (_pool, conn) = test_conn();

        upsert_record(&conn, 100, "@one", "One", "", "").unwrap();
        upsert_record(&conn, 200, "@two", "Two", "", "").unwrap();

        // Re-adding the first contact must not move it to a new Number
        upsert_record(&conn, 100, "@one_renamed", "One", "", "").unwrap();

        let record = get_record(&conn, 1).unwrap().unwrap();
        assert_eq!(record.user_id, 100);
        assert_eq!(record.user, "@one_renamed");
    }

    #[test]
    fn test_user_known_matches_on_user_id_not_number() {
        let (_pool, conn) = test_conn();

        upsert_record(&conn, 5555, "@a", "A", "", "").unwrap();

        assert!(user_known(&conn, 5555).unwrap());
        assert!(!user_known(&conn, 1).unwrap());
    }

    #[test]
    fn test_delete_record_semantics() {
        let (_pool, conn) = test_conn();

        upsert_record(&conn, 1, "@a", "A", "", "").unwrap();
        assert_eq!(count_records(&conn, &RecordFilter::All).unwrap(), 1);

        assert!(!delete_record(&conn, 999).unwrap());
        assert_eq!(count_records(&conn, &RecordFilter::All).unwrap(), 1);

        assert!(delete_record(&conn, 1).unwrap());
        assert_eq!(count_records(&conn, &RecordFilter::All).unwrap(), 0);
    }

    #[test]
    fn test_select_page_is_ordered_and_filtered() {
        let (_pool, conn) = test_conn();

        upsert_record(&conn, 3, "@same", "X", "", "").unwrap();
        upsert_record(&conn, 1, "@same", "Y", "", "").unwrap();
        upsert_record(&conn, 2, "@other", "X", "", "").unwrap();

        let all = select_page(&conn, &RecordFilter::All, 10, 0).unwrap();
        let ids: Vec<i64> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let by_user = select_page(&conn, &RecordFilter::ByUser("@same".into()), 10, 0).unwrap();
        assert_eq!(by_user.len(), 2);

        let by_name = select_page(&conn, &RecordFilter::ByName("X".into()), 10, 0).unwrap();
        assert_eq!(by_name.len(), 2);

        // Offset past the end is an empty slice, not an error
        let past_end = select_page(&conn, &RecordFilter::All, 10, 100).unwrap();
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_update_field_per_column() {
        let (_pool, conn) = test_conn();

        upsert_record(&conn, 7, "@old", "Old", "old-tag", "").unwrap();

        assert!(update_field(&conn, 1, RecordField::Name, "New").unwrap());
        assert!(update_field(&conn, 1, RecordField::User, "@new").unwrap());
        assert!(update_field(&conn, 1, RecordField::Tag, "").unwrap());
        assert!(!update_field(&conn, 999, RecordField::Name, "nobody").unwrap());

        let record = get_record(&conn, 1).unwrap().unwrap();
        assert_eq!(record.name, "New");
        assert_eq!(record.user, "@new");
        assert_eq!(record.tag, "");
    }

    #[test]
    fn test_recipient_ids_snapshot() {
        let (_pool, conn) = test_conn();

        upsert_record(&conn, 11, "@a", "A", "", "").unwrap();
        upsert_record(&conn, 22, "@b", "B", "", "").unwrap();
        upsert_record(&conn, 33, "@c", "C", "", "").unwrap();

        assert_eq!(recipient_ids(&conn).unwrap(), vec![11, 22, 33]);
    }
}
