use crate::db::models::TypedReading;
use crate::db::store;
use crate::devices::context::DeviceContext;
use crate::devices::manager::DeviceManager;
use crate::models::device::{Device, SensorKind};
use chrono::Utc;
use diesel::SqliteConnection;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep between stop-flag checks.
const STOP_POLL: Duration = Duration::from_millis(100);

/// What one collection cycle did with each configured sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub reading_id: i32,
    pub stored: Vec<SensorKind>,
    /// Sampled, but the insert was rolled back.
    pub failed: Vec<SensorKind>,
    /// Configured, but produced no value.
    pub missing: Vec<SensorKind>,
}

/// Create this cycle's reading, then sample and store each configured sensor.
/// A failing sensor or insert never affects the others.
pub fn collect_once(conn: &mut SqliteConnection, devices: &mut DeviceManager) -> Result<CycleReport, String> {
    let reading_id = store::create_reading(conn, Utc::now().naive_utc())?;
    let mut report = CycleReport {
        reading_id,
        ..CycleReport::default()
    };

    for kind in SensorKind::ALL {
        if !devices.is_configured(Device::Sensor(kind)) {
            continue;
        }
        let Some(value) = devices.sense(kind) else {
            report.missing.push(kind);
            continue;
        };
        match store::insert_typed_reading(conn, reading_id, TypedReading::new(kind, value)) {
            Ok(()) => report.stored.push(kind),
            Err(e) => {
                error!("{}", e);
                report.failed.push(kind);
            }
        }
    }

    Ok(report)
}

/// The collection loop's device manager, rebuilt whenever the stored pin
/// configuration changes.
pub struct Collector {
    devices: Option<DeviceManager>,
    pins_revision: i32,
}

impl Collector {
    pub fn start(conn: &mut SqliteConnection, ctx: &DeviceContext) -> Result<Self, String> {
        let stored = store::load_pin_config(conn)?;
        let devices = DeviceManager::new(&stored.pins, ctx).map_err(|e| format!("device setup failed: {}", e))?;
        Ok(Self {
            devices: Some(devices),
            pins_revision: stored.revision,
        })
    }

    pub fn devices_mut(&mut self) -> Option<&mut DeviceManager> {
        self.devices.as_mut()
    }

    /// Rebuild the devices when `pin_config.revision` moved. Returns whether a rebuild happened.
    pub fn refresh(&mut self, conn: &mut SqliteConnection, ctx: &DeviceContext) -> Result<bool, String> {
        match store::pin_config_revision(conn)? {
            Some(revision) if revision != self.pins_revision => {}
            _ => return Ok(false),
        }

        let stored = store::load_pin_config(conn)?;
        info!(
            "Pin configuration changed (revision {}, {}); rebuilding devices",
            stored.revision, stored.updated_at
        );
        self.pins_revision = stored.revision;
        // old lines must be free before the new manager claims them
        self.devices = None;
        match DeviceManager::new(&stored.pins, ctx) {
            Ok(devices) => {
                self.devices = Some(devices);
                Ok(true)
            }
            Err(e) => Err(format!("device setup failed, sampling paused until the configuration changes: {}", e)),
        }
    }

    pub fn collect(&mut self, conn: &mut SqliteConnection) -> Result<CycleReport, String> {
        match self.devices.as_mut() {
            Some(devices) => collect_once(conn, devices),
            None => Err("no devices available".to_string()),
        }
    }
}

/// Run collection cycles every `interval` until `stop` is set.
pub fn run_loop(
    conn: &mut SqliteConnection,
    ctx: &DeviceContext,
    interval: Duration,
    stop: &AtomicBool,
) -> Result<(), String> {
    let mut collector = Collector::start(conn, ctx)?;
    info!("Collection loop started: interval={}s", interval.as_secs());

    while !stop.load(Ordering::SeqCst) {
        let tick_start = Instant::now();

        if let Err(e) = collector.refresh(conn, ctx) {
            warn!("{}", e);
        }
        match collector.collect(conn) {
            Ok(report) => debug!(
                "reading {}: stored {:?}, failed {:?}, no value {:?}",
                report.reading_id, report.stored, report.failed, report.missing
            ),
            Err(e) => error!("collection cycle failed: {}", e),
        }

        // Maintain steady cadence
        let deadline = tick_start + interval;
        while !stop.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(STOP_POLL));
        }
    }

    info!("Stop requested; turning devices off");
    drop(collector);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::{ActuatorKind, EventCode};
    use crate::schema;
    use crate::testing::{FakeBackend, context, test_db};
    use diesel::connection::SimpleConnection;
    use diesel::prelude::*;

    macro_rules! rows {
        ($conn:expr, $table:path) => {
            $table.count().get_result::<i64>($conn).unwrap()
        };
    }

    #[test]
    fn light_sensor_and_pump_end_to_end() {
        let mut conn = test_db();
        conn.batch_execute("INSERT INTO pin_config (light_pin_in, water_pin) VALUES (0, 17);")
            .unwrap();
        let ctx = context(true, FakeBackend::default());
        let mut collector = Collector::start(&mut conn, &ctx).unwrap();

        let report = collector.collect(&mut conn).unwrap();
        assert_eq!(report.stored, vec![SensorKind::Light]);
        assert!(report.failed.is_empty() && report.missing.is_empty());

        let (id, level): (i32, f64) = schema::light_reading::table
            .select((schema::light_reading::id, schema::light_reading::light_level))
            .first(&mut conn)
            .unwrap();
        assert_eq!(id, report.reading_id);
        assert!((500.0..=1500.0).contains(&level), "{level}");
        assert_eq!(rows!(&mut conn, schema::reading::table), 1);
        assert_eq!(rows!(&mut conn, schema::light_reading::table), 1);
        assert_eq!(rows!(&mut conn, schema::temperature_reading::table), 0);
        assert_eq!(rows!(&mut conn, schema::humidity_reading::table), 0);
        assert_eq!(rows!(&mut conn, schema::water_reading::table), 0);
        assert_eq!(rows!(&mut conn, schema::soil_moisture_reading::table), 0);

        let devices = collector.devices_mut().unwrap();
        devices.turn_on(ActuatorKind::WaterPump, &mut conn).unwrap();
        devices.turn_off(ActuatorKind::WaterPump, &mut conn).unwrap();

        let codes: Vec<i32> = schema::audit_log::table
            .order(schema::audit_log::id.asc())
            .select(schema::audit_log::event_code)
            .load(&mut conn)
            .unwrap();
        assert_eq!(codes, vec![EventCode::PumpOn.code(), EventCode::PumpOff.code()]);
    }

    #[test]
    fn storage_failure_is_isolated_to_one_sensor() {
        let mut conn = test_db();
        let ctx = context(true, FakeBackend::default());
        let mut collector = Collector::start(&mut conn, &ctx).unwrap();
        conn.batch_execute(
            "CREATE TRIGGER reject_humidity BEFORE INSERT ON humidity_reading \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();

        let report = collector.collect(&mut conn).unwrap();

        assert_eq!(report.failed, vec![SensorKind::Humidity]);
        assert_eq!(
            report.stored,
            vec![
                SensorKind::Light,
                SensorKind::Temperature,
                SensorKind::WaterLevel,
                SensorKind::SoilMoisture
            ]
        );
        assert_eq!(rows!(&mut conn, schema::reading::table), 1);
        assert_eq!(rows!(&mut conn, schema::light_reading::table), 1);
        assert_eq!(rows!(&mut conn, schema::temperature_reading::table), 1);
        assert_eq!(rows!(&mut conn, schema::humidity_reading::table), 0);
        assert_eq!(rows!(&mut conn, schema::water_reading::table), 1);
        assert_eq!(rows!(&mut conn, schema::soil_moisture_reading::table), 1);
    }

    #[test]
    fn failed_sensor_is_reported_as_missing() {
        let mut conn = test_db();
        conn.batch_execute("INSERT INTO pin_config (temperature_pin_in, soil_moisture_pin_in) VALUES (4, 1);")
            .unwrap();
        // hardware mode: the one-wire directory does not exist and no ADC samples are scripted
        let ctx = context(false, FakeBackend::default());
        let mut collector = Collector::start(&mut conn, &ctx).unwrap();

        let report = collector.collect(&mut conn).unwrap();

        assert!(report.stored.is_empty());
        assert_eq!(report.missing, vec![SensorKind::Temperature, SensorKind::SoilMoisture]);
        assert_eq!(rows!(&mut conn, schema::reading::table), 1);
    }

    #[test]
    fn rebuilds_devices_when_configuration_changes() {
        let mut conn = test_db();
        let ctx = context(true, FakeBackend::default());
        let mut collector = Collector::start(&mut conn, &ctx).unwrap();
        assert!(!collector.refresh(&mut conn, &ctx).unwrap());

        conn.batch_execute("UPDATE pin_config SET light_pin_in = NULL, humidity_pin_in = NULL;")
            .unwrap();
        assert!(collector.refresh(&mut conn, &ctx).unwrap());
        assert!(!collector.refresh(&mut conn, &ctx).unwrap());

        let report = collector.collect(&mut conn).unwrap();
        assert_eq!(report.stored.len(), 3);
        assert!(!report.stored.contains(&SensorKind::Light));
    }

    #[test]
    fn single_pin_edit_is_picked_up() {
        let mut conn = test_db();
        let ctx = context(true, FakeBackend::default());
        let mut collector = Collector::start(&mut conn, &ctx).unwrap();

        conn.batch_execute("UPDATE pin_config SET light_pin_in = NULL;").unwrap();
        assert!(collector.refresh(&mut conn, &ctx).unwrap());

        let report = collector.collect(&mut conn).unwrap();
        assert_eq!(
            report.stored,
            vec![
                SensorKind::Temperature,
                SensorKind::Humidity,
                SensorKind::WaterLevel,
                SensorKind::SoilMoisture
            ]
        );
        assert_eq!(rows!(&mut conn, schema::light_reading::table), 0);
    }

    #[test]
    fn conflicting_configuration_pauses_sampling() {
        let mut conn = test_db();
        let ctx = context(true, FakeBackend::default());
        let mut collector = Collector::start(&mut conn, &ctx).unwrap();

        conn.batch_execute("UPDATE pin_config SET heater_pin = 18;").unwrap();
        assert!(collector.refresh(&mut conn, &ctx).is_err());
        assert!(collector.collect(&mut conn).is_err());
        // no retry until the row changes again
        assert!(!collector.refresh(&mut conn, &ctx).unwrap());
    }

    #[test]
    fn loop_exits_when_stop_is_already_set() {
        let mut conn = test_db();
        let ctx = context(true, FakeBackend::default());
        let stop = AtomicBool::new(true);
        run_loop(&mut conn, &ctx, Duration::from_secs(1), &stop).unwrap();
        assert_eq!(rows!(&mut conn, schema::reading::table), 0);
    }
}
