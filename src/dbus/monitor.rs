use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::time::{Duration, interval};
use zbus::Connection;
use zbus::zvariant::OwnedValue;

use super::items::BusItem;
use crate::error::{Result, TalosError};
use crate::logging::get_logger;
use crate::telemetry::{SETTINGS_SERVICE, SYSTEM_SERVICE, ServiceInfo, TelemetrySource};

/// Per-call timeout for remote reads; the tick side never waits on these
const CALL_TIMEOUT: Duration = Duration::from_millis(600);

/// Service classes and paths the monitor keeps cached. Battery and vebus
/// classes are matched by prefix against discovered services; settings and
/// system are fixed singletons.
pub fn monitored_tree() -> Vec<(String, Vec<String>)> {
    let paths = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    vec![
        (
            SETTINGS_SERVICE.to_string(),
            paths(&[
                "/Settings/SystemSetup/AcInput1",
                "/Settings/SystemSetup/AcInput2",
                "/Settings/Relay/Polarity",
            ]),
        ),
        (
            SYSTEM_SERVICE.to_string(),
            paths(&[
                "/Ac/ConsumptionOnInput/L1/Power",
                "/Ac/ConsumptionOnInput/L2/Power",
                "/Ac/ConsumptionOnInput/L3/Power",
                "/Ac/ConsumptionOnOutput/L1/Power",
                "/Ac/ConsumptionOnOutput/L2/Power",
                "/Ac/ConsumptionOnOutput/L3/Power",
                "/Ac/ActiveIn/Source",
                "/Ac/In/NumberOfAcInputs",
                "/VebusService",
                "/Dc/Battery/Voltage",
                "/Dc/Battery/Current",
                "/Dc/Battery/Soc",
                "/Relay/0/State",
            ]),
        ),
        (
            "com.victronenergy.battery".to_string(),
            paths(&[
                "/Dc/0/Voltage",
                "/Dc/0/Current",
                "/Dc/1/Voltage",
                "/Dc/1/Current",
                "/Soc",
            ]),
        ),
        (
            "com.victronenergy.vebus".to_string(),
            paths(&[
                "/Ac/Out/L1/P",
                "/Ac/Out/L2/P",
                "/Ac/Out/L3/P",
                "/Alarms/HighTemperature",
                "/Alarms/Overload",
                "/Alarms/L1/HighTemperature",
                "/Alarms/L2/HighTemperature",
                "/Alarms/L3/HighTemperature",
                "/Alarms/L1/Overload",
                "/Alarms/L2/Overload",
                "/Alarms/L3/Overload",
                "/Ac/ActiveIn/ActiveInput",
                "/Ac/ActiveIn/Connected",
                "/Ac/State/AcIn1Available",
                "/Ac/State/AcIn2Available",
                "/Dc/0/Voltage",
                "/Dc/0/Current",
                "/Soc",
            ]),
        ),
    ]
}

/// Polls monitored Venus services and caches their values so the decision
/// engine can read them without blocking. Also discovers services by prefix
/// and performs fire-and-forget writes.
pub struct DbusMonitor {
    connection: Option<Connection>,
    tree: Vec<(String, Vec<String>)>,
    cache: RwLock<HashMap<String, serde_json::Value>>,
    services: RwLock<Vec<ServiceInfo>>,
    logger: crate::logging::StructuredLogger,
}

impl DbusMonitor {
    /// Connect to the bus (system first, session as fallback), perform an
    /// initial sweep, and keep refreshing once per second in the background.
    pub async fn connect(tree: Vec<(String, Vec<String>)>) -> Result<Arc<Self>> {
        let logger = get_logger("monitor");
        let connection = match Connection::system().await {
            Ok(c) => {
                logger.info("Connected to D-Bus: system bus");
                c
            }
            Err(e_sys) => match Connection::session().await {
                Ok(c) => {
                    logger.warn(&format!(
                        "System bus unavailable ({}); using session bus",
                        e_sys
                    ));
                    c
                }
                Err(e_sess) => {
                    return Err(TalosError::dbus(format!(
                        "DBus connect failed: system={} session={}",
                        e_sys, e_sess
                    )));
                }
            },
        };

        let monitor = Arc::new(Self {
            connection: Some(connection),
            tree,
            cache: RwLock::new(HashMap::new()),
            services: RwLock::new(Vec::new()),
            logger,
        });
        monitor.refresh().await;
        tokio::spawn(Arc::clone(&monitor).refresh_loop());
        Ok(monitor)
    }

    /// A monitor with no bus behind it: every read is absent, writes are
    /// dropped. Used when running detached from D-Bus.
    pub fn disconnected() -> Arc<Self> {
        Arc::new(Self {
            connection: None,
            tree: Vec::new(),
            cache: RwLock::new(HashMap::new()),
            services: RwLock::new(Vec::new()),
            logger: get_logger("monitor"),
        })
    }

    async fn refresh_loop(self: Arc<Self>) {
        let mut tick = interval(Duration::from_millis(1000));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            self.refresh().await;
        }
    }

    /// One cache sweep: discover services, then read every monitored path
    async fn refresh(&self) {
        let Some(conn) = &self.connection else {
            return;
        };

        let names = match self.list_victron_names(conn).await {
            Ok(names) => names,
            Err(e) => {
                self.logger.warn(&format!("Service discovery failed: {}", e));
                return;
            }
        };

        let mut discovered = Vec::with_capacity(names.len());
        for name in &names {
            let device_instance = self
                .fetch_value(conn, name, "/DeviceInstance")
                .await
                .and_then(|v| v.as_u64())
                .map(|v| v as u32);
            discovered.push(ServiceInfo {
                name: name.clone(),
                device_instance,
            });
        }

        for (class, paths) in &self.tree {
            for name in names.iter().filter(|n| n.starts_with(class.as_str())) {
                for path in paths {
                    let key = format!("{}{}", name, path);
                    match self.fetch_value(conn, name, path).await {
                        Some(value) => {
                            if let Ok(mut cache) = self.cache.write() {
                                cache.insert(key, value);
                            }
                        }
                        None => {
                            if let Ok(mut cache) = self.cache.write() {
                                cache.remove(&key);
                            }
                        }
                    }
                }
            }
        }

        // Drop cached values of services that left the bus
        if let Ok(mut cache) = self.cache.write() {
            cache.retain(|key, _| names.iter().any(|n| key.starts_with(n.as_str())));
        }

        if let Ok(mut services) = self.services.write() {
            *services = discovered;
        }
    }

    async fn list_victron_names(&self, conn: &Connection) -> Result<Vec<String>> {
        let proxy = zbus::fdo::DBusProxy::new(conn)
            .await
            .map_err(|e| TalosError::dbus(format!("DBusProxy creation failed: {}", e)))?;
        let names = proxy
            .list_names()
            .await
            .map_err(|e| TalosError::dbus(format!("ListNames failed: {}", e)))?;
        Ok(names
            .into_iter()
            .map(|n| n.to_string())
            .filter(|n| n.starts_with("com.victronenergy."))
            .collect())
    }

    /// GetValue with a hard timeout; `None` covers both missing paths and
    /// Victron's invalid-value marker (an empty array)
    async fn fetch_value(
        &self,
        conn: &Connection,
        service: &str,
        path: &str,
    ) -> Option<serde_json::Value> {
        let proxy = tokio::time::timeout(
            CALL_TIMEOUT,
            zbus::Proxy::new(conn, service.to_string(), path.to_string(), "com.victronenergy.BusItem"),
        )
        .await
        .ok()?
        .ok()?;

        let value: OwnedValue = tokio::time::timeout(CALL_TIMEOUT, proxy.call("GetValue", &()))
            .await
            .ok()?
            .ok()?;

        let json = BusItem::owned_value_to_serde(&value);
        if json.is_number() || json.is_string() || json.is_boolean() {
            Some(json)
        } else {
            None
        }
    }
}

impl TelemetrySource for DbusMonitor {
    fn read(&self, service: &str, path: &str) -> Option<f64> {
        let key = format!("{}{}", service, path);
        let cache = self.cache.read().ok()?;
        let value = cache.get(&key)?;
        value
            .as_f64()
            .or_else(|| value.as_i64().map(|v| v as f64))
            .or_else(|| value.as_u64().map(|v| v as f64))
    }

    fn read_text(&self, service: &str, path: &str) -> Option<String> {
        let key = format!("{}{}", service, path);
        let cache = self.cache.read().ok()?;
        cache.get(&key)?.as_str().map(|s| s.to_string())
    }

    fn write_async(&self, service: &str, path: &str, value: f64) {
        let Some(conn) = self.connection.clone() else {
            return;
        };
        let service = service.to_string();
        let path = path.to_string();
        let logger = self.logger.clone();
        tokio::spawn(async move {
            let result = async {
                let proxy = tokio::time::timeout(
                    CALL_TIMEOUT,
                    zbus::Proxy::new(&conn, service.clone(), path.clone(), "com.victronenergy.BusItem"),
                )
                .await
                .map_err(|_| TalosError::timeout("DBus proxy creation timed out"))?
                .map_err(|e| TalosError::dbus(format!("Proxy creation failed: {}", e)))?;

                // Venus expects integers for flags and relay states
                let arg = if value.fract() == 0.0 {
                    zbus::zvariant::Value::from(value as i32)
                } else {
                    zbus::zvariant::Value::from(value)
                };
                let _: i32 = tokio::time::timeout(CALL_TIMEOUT, proxy.call("SetValue", &(arg)))
                    .await
                    .map_err(|_| TalosError::timeout("DBus SetValue timed out"))?
                    .map_err(|e| TalosError::dbus(format!("SetValue call failed: {}", e)))?;
                Ok::<(), TalosError>(())
            }
            .await;

            if let Err(e) = result {
                logger.warn(&format!("Write to {}{} failed: {}", service, path, e));
            }
        });
    }

    fn list_services(&self) -> Vec<ServiceInfo> {
        self.services
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}
