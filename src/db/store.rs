//! Storage operations used by the device layer, the collection loop and the CLI.

use crate::db::models::{
    EventCodeRow, LogRow, NewHumidityReading, NewLightReading, NewLogEntry, NewPinConfig, NewReading,
    NewSoilMoistureReading, NewTemperatureReading, NewWaterReading, Page, PinConfigRow, ReadingRow, TypedReading,
};
use crate::devices::actuator::AuditLog;
use crate::models::device::EventCode;
use crate::models::pins::PinConfig;
use crate::schema;
use chrono::{NaiveDateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::info;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
pub const DEFAULT_PER_PAGE: i64 = 20;

/// Open the database, enable foreign keys and apply pending migrations.
pub fn connect(database_url: &str) -> Result<SqliteConnection, String> {
    let mut conn =
        SqliteConnection::establish(database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        .map_err(|e| format!("configuring connection failed: {}", e))?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

fn apply_migrations(conn: &mut SqliteConnection) -> Result<(), String> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| format!("Applying database migrations failed: {}", e))?;
    if applied.is_empty() {
        info!("Database schema is up to date");
    } else {
        let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
        info!("Applied {} database migration(s): {}", applied.len(), names);
    }
    Ok(())
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Insert the anchor row for a collection cycle and return its id.
pub fn create_reading(conn: &mut SqliteConnection, timestamp: NaiveDateTime) -> Result<i32, String> {
    use schema::reading::dsl as R;

    diesel::insert_into(R::reading)
        .values(&NewReading { timestamp })
        .returning(R::id)
        .get_result(conn)
        .map_err(|e| format!("insert reading failed: {}", e))
}

/// Insert one typed reading in its own transaction.
pub fn insert_typed_reading(conn: &mut SqliteConnection, reading_id: i32, value: TypedReading) -> Result<(), String> {
    let id = reading_id;
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        match value {
            TypedReading::Light(light_level) => diesel::insert_into(schema::light_reading::table)
                .values(&NewLightReading { id, light_level })
                .execute(conn)?,
            TypedReading::Temperature(temperature) => diesel::insert_into(schema::temperature_reading::table)
                .values(&NewTemperatureReading { id, temperature })
                .execute(conn)?,
            TypedReading::Humidity(humidity) => diesel::insert_into(schema::humidity_reading::table)
                .values(&NewHumidityReading { id, humidity })
                .execute(conn)?,
            TypedReading::Water(water_level) => diesel::insert_into(schema::water_reading::table)
                .values(&NewWaterReading { id, water_level })
                .execute(conn)?,
            TypedReading::SoilMoisture(soil_moisture) => diesel::insert_into(schema::soil_moisture_reading::table)
                .values(&NewSoilMoistureReading { id, soil_moisture })
                .execute(conn)?,
        };
        Ok(())
    })
    .map_err(|e| format!("insert {} reading {} failed: {}", value.kind().name(), reading_id, e))
}

pub fn append_log(conn: &mut SqliteConnection, code: EventCode) -> Result<(), String> {
    use schema::audit_log::dsl as A;

    diesel::insert_into(A::audit_log)
        .values(&NewLogEntry {
            timestamp: now(),
            event_code: code.code(),
        })
        .execute(conn)
        .map(|_| ())
        .map_err(|e| format!("append log {} failed: {}", code.code(), e))
}

impl AuditLog for SqliteConnection {
    fn record(&mut self, code: EventCode) -> Result<(), String> {
        append_log(self, code)
    }
}

#[derive(Debug, Clone)]
pub struct StoredPinConfig {
    pub id: i32,
    pub pins: PinConfig,
    /// Bumped by the database on every update of the row.
    pub revision: i32,
    pub updated_at: NaiveDateTime,
}

/// First configuration row; the default wiring is stored and returned when the table is empty.
pub fn load_pin_config(conn: &mut SqliteConnection) -> Result<StoredPinConfig, String> {
    let row = match first_pin_config(conn)? {
        Some(row) => row,
        None => {
            info!("No pin configuration stored; writing default wiring");
            diesel::insert_into(schema::pin_config::table)
                .values(&NewPinConfig::from(&PinConfig::default_wiring()))
                .execute(conn)
                .map_err(|e| format!("insert default pin config failed: {}", e))?;
            first_pin_config(conn)?.ok_or_else(|| "default pin config vanished after insert".to_string())?
        }
    };
    let pins = PinConfig::try_from(&row).map_err(|e| format!("pin config {}: {}", row.id, e))?;
    Ok(StoredPinConfig {
        id: row.id,
        pins,
        revision: row.revision,
        updated_at: row.updated_at,
    })
}

fn first_pin_config(conn: &mut SqliteConnection) -> Result<Option<PinConfigRow>, String> {
    use schema::pin_config::dsl as P;

    P::pin_config
        .order(P::id.asc())
        .select(PinConfigRow::as_select())
        .first(conn)
        .optional()
        .map_err(|e| format!("query pin config failed: {}", e))
}

/// `revision` of the row [`load_pin_config`] would return.
pub fn pin_config_revision(conn: &mut SqliteConnection) -> Result<Option<i32>, String> {
    use schema::pin_config::dsl as P;

    P::pin_config
        .order(P::id.asc())
        .select(P::revision)
        .first(conn)
        .optional()
        .map_err(|e| format!("query pin config revision failed: {}", e))
}

/// Clamped `(page, per_page, offset)`; the offset saturates for absurd page numbers.
fn page_bounds(page: i64, per_page: i64) -> (i64, i64, i64) {
    let page = page.max(1);
    let per_page = if per_page > 0 { per_page } else { DEFAULT_PER_PAGE };
    (page, per_page, (page - 1).saturating_mul(per_page))
}

/// Newest first.
pub fn paginate_readings(conn: &mut SqliteConnection, page: i64, per_page: i64) -> Result<Page<ReadingRow>, String> {
    use schema::humidity_reading::dsl as H;
    use schema::light_reading::dsl as L;
    use schema::reading::dsl as R;
    use schema::soil_moisture_reading::dsl as S;
    use schema::temperature_reading::dsl as T;
    use schema::water_reading::dsl as W;

    let (page, per_page, offset) = page_bounds(page, per_page);
    let total: i64 = R::reading
        .count()
        .get_result(conn)
        .map_err(|e| format!("count readings failed: {}", e))?;

    let items = R::reading
        .left_join(L::light_reading)
        .left_join(T::temperature_reading)
        .left_join(H::humidity_reading)
        .left_join(W::water_reading)
        .left_join(S::soil_moisture_reading)
        .select((
            R::id,
            R::timestamp,
            L::light_level.nullable(),
            T::temperature.nullable(),
            H::humidity.nullable(),
            W::water_level.nullable(),
            S::soil_moisture.nullable(),
        ))
        .order(R::id.desc())
        .limit(per_page)
        .offset(offset)
        .load::<ReadingRow>(conn)
        .map_err(|e| format!("query readings failed: {}", e))?;

    Ok(Page {
        items,
        page,
        per_page,
        total,
    })
}

/// Newest first, with the event description joined in.
pub fn paginate_logs(conn: &mut SqliteConnection, page: i64, per_page: i64) -> Result<Page<LogRow>, String> {
    use schema::audit_log::dsl as A;
    use schema::event_codes::dsl as E;

    let (page, per_page, offset) = page_bounds(page, per_page);
    let total: i64 = A::audit_log
        .count()
        .get_result(conn)
        .map_err(|e| format!("count log entries failed: {}", e))?;

    let items = A::audit_log
        .inner_join(E::event_codes)
        .select((A::id, A::timestamp, A::event_code, E::description))
        .order(A::id.desc())
        .limit(per_page)
        .offset(offset)
        .load::<LogRow>(conn)
        .map_err(|e| format!("query log entries failed: {}", e))?;

    Ok(Page {
        items,
        page,
        per_page,
        total,
    })
}

pub fn event_catalog(conn: &mut SqliteConnection) -> Result<Vec<EventCodeRow>, String> {
    use schema::event_codes::dsl as E;

    E::event_codes
        .order(E::code.asc())
        .select(EventCodeRow::as_select())
        .load(conn)
        .map_err(|e| format!("query event codes failed: {}", e))
}
