use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use zbus::zvariant::OwnedObjectPath;
use zbus::{Connection, Result as ZbusResult, names::WellKnownName};

use crate::driver::DriverCommand;
use crate::error::{Result, TalosError};
use crate::logging::get_logger;

use super::items::BusItem;
use super::shared::DbusSharedState;
use super::tree::{RootBus, TreeNode};
use super::util::text_for_path;

/// Published generator start/stop service
pub struct DbusService {
    logger: crate::logging::StructuredLogger,
    service_name: String,
    connection: Option<Connection>,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
    registered_paths: HashSet<String>,
    root_path: OwnedObjectPath,
}

impl DbusService {
    pub async fn new(
        device_instance: u32,
        commands_tx: mpsc::UnboundedSender<DriverCommand>,
    ) -> Result<Self> {
        let logger = get_logger("dbus");
        logger.info("Initializing D-Bus service (zbus)");
        let service_name = format!("com.victronenergy.generator.talos_{}", device_instance);
        let root_path = OwnedObjectPath::try_from("/")
            .map_err(|e| TalosError::dbus(format!("Invalid object path: {}", e)))?;
        Ok(Self {
            logger,
            service_name,
            connection: None,
            shared: Arc::new(Mutex::new(DbusSharedState::new(
                commands_tx,
                root_path.clone(),
            ))),
            registered_paths: HashSet::new(),
            root_path,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let connection = match Connection::system().await {
            Ok(c) => {
                self.logger.info("Connected to D-Bus: system bus");
                c
            }
            Err(e_sys) => match Connection::session().await {
                Ok(c) => {
                    self.logger.warn(&format!(
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
        self.request_name(&connection)
            .await
            .map_err(|e| TalosError::dbus(format!("RequestName failed: {}", e)))?;
        self.logger
            .info(&format!("D-Bus service started: {}", self.service_name));

        let root = RootBus {
            shared: Arc::clone(&self.shared),
        };
        connection
            .object_server()
            .at(&self.root_path, root)
            .await
            .map_err(|e| TalosError::dbus(format!("Register root BusItem failed: {}", e)))?;

        self.connection = Some(connection.clone());
        {
            let mut shared = self.shared.lock().unwrap();
            shared.connection = Some(connection);
        }
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.logger.info("Stopping D-Bus service");
        self.connection = None;
        {
            let mut shared = self.shared.lock().unwrap();
            shared.connection = None;
        }
        Ok(())
    }

    /// Register a path (and any intermediate tree nodes), seeding its value
    pub async fn ensure_item(
        &mut self,
        path: &str,
        initial_value: serde_json::Value,
        writable: bool,
    ) -> Result<()> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for i in 1..=segments.len() {
            let subpath = format!("/{}", segments[..i].join("/"));
            if self.registered_paths.contains(&subpath) {
                continue;
            }
            let obj_path = OwnedObjectPath::try_from(subpath.as_str()).map_err(|e| {
                TalosError::dbus(format!("Invalid object path '{}': {}", subpath, e))
            })?;
            let item_is_leaf = i == segments.len();
            if let Some(conn) = &self.connection {
                if item_is_leaf {
                    let item = BusItem::new(subpath.clone(), Arc::clone(&self.shared));
                    conn.object_server().at(&obj_path, item).await.map_err(|e| {
                        TalosError::dbus(format!("Register BusItem failed for {}: {}", subpath, e))
                    })?;
                } else {
                    let node = TreeNode::new(subpath.clone(), Arc::clone(&self.shared));
                    conn.object_server().at(&obj_path, node).await.map_err(|e| {
                        TalosError::dbus(format!("Register TreeNode failed for {}: {}", subpath, e))
                    })?;
                }
            }
            self.registered_paths.insert(subpath);
        }

        {
            let mut shared = self.shared.lock().unwrap();
            if !shared.paths.contains_key(path) {
                shared.paths.insert(path.to_string(), initial_value);
            }
            if writable {
                shared.writable.insert(path.to_string());
            }
        }
        Ok(())
    }

    pub async fn update_paths(
        &mut self,
        updates: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Result<()> {
        for (k, v) in updates {
            self.update_path(&k, v).await?;
        }
        Ok(())
    }

    /// Publish a value, emitting change signals. Unchanged values are
    /// suppressed so repeating a write stays cheap and signal-free.
    pub async fn update_path(&mut self, path: &str, value: serde_json::Value) -> Result<()> {
        {
            let shared = self.shared.lock().unwrap();
            if let Some(old) = shared.paths.get(path)
                && old == &value
            {
                return Ok(());
            }
        }
        self.ensure_item(path, value.clone(), false).await?;
        {
            let mut shared = self.shared.lock().unwrap();
            shared.paths.insert(path.to_string(), value.clone());
        }

        let Some(conn) = &self.connection else {
            return Ok(());
        };

        let item_ctx = zbus::object_server::SignalEmitter::new(
            conn,
            OwnedObjectPath::try_from(path)
                .map_err(|e| TalosError::dbus(format!("Invalid object path '{}': {}", path, e)))?,
        )
        .map_err(|e| TalosError::dbus(format!("SignalEmitter new failed: {}", e)))?;
        let mut changes: std::collections::HashMap<&str, zbus::zvariant::OwnedValue> =
            std::collections::HashMap::new();
        changes.insert("Value", BusItem::serde_to_owned_value(&value));
        let text = text_for_path(path, &value);
        if let Ok(text_ov) =
            zbus::zvariant::OwnedValue::try_from(zbus::zvariant::Value::from(text.as_str()))
        {
            changes.insert("Text", text_ov);
        }
        let _ = BusItem::properties_changed(&item_ctx, changes).await;

        let root_ctx = zbus::object_server::SignalEmitter::new(conn, self.root_path.clone())
            .map_err(|e| TalosError::dbus(format!("Root SignalEmitter failed: {}", e)))?;
        let mut inner: std::collections::HashMap<&str, zbus::zvariant::OwnedValue> =
            std::collections::HashMap::new();
        inner.insert("Value", BusItem::serde_to_owned_value(&value));
        if let Ok(text_ov) =
            zbus::zvariant::OwnedValue::try_from(zbus::zvariant::Value::from(text.as_str()))
        {
            inner.insert("Text", text_ov);
        }
        let mut outer: std::collections::HashMap<
            &str,
            std::collections::HashMap<&str, zbus::zvariant::OwnedValue>,
        > = std::collections::HashMap::new();
        outer.insert(path, inner);
        let _ = RootBus::items_changed(&root_ctx, outer).await;

        Ok(())
    }

    /// Cached value of a published path
    pub fn get(&self, path: &str) -> Option<serde_json::Value> {
        let shared = self.shared.lock().unwrap();
        shared.paths.get(path).cloned()
    }

    async fn request_name(&self, connection: &Connection) -> ZbusResult<()> {
        use zbus::fdo::{DBusProxy, RequestNameFlags};
        let proxy = DBusProxy::new(connection).await?;
        let name = WellKnownName::try_from(self.service_name.as_str())?;
        let _ = proxy
            .request_name(name, RequestNameFlags::ReplaceExisting.into())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn update_paths_populates_cache_without_connection() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut svc = DbusService::new(0, tx).await.unwrap();

        svc.update_paths([
            ("/State".to_string(), serde_json::json!(1)),
            ("/Runtime".to_string(), serde_json::json!(42)),
            ("/Alarms/NoGeneratorAtAcIn".to_string(), serde_json::json!(0)),
        ])
        .await
        .unwrap();

        assert_eq!(svc.get("/State"), Some(serde_json::json!(1)));
        assert_eq!(svc.get("/Runtime"), Some(serde_json::json!(42)));
        assert_eq!(
            svc.get("/Alarms/NoGeneratorAtAcIn"),
            Some(serde_json::json!(0))
        );
    }

    #[tokio::test]
    async fn writable_flag_is_tracked() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut svc = DbusService::new(0, tx).await.unwrap();
        svc.ensure_item("/ManualStart", serde_json::json!(0), true)
            .await
            .unwrap();
        svc.ensure_item("/State", serde_json::json!(0), false)
            .await
            .unwrap();

        let shared = svc.shared.lock().unwrap();
        assert!(shared.writable.contains("/ManualStart"));
        assert!(!shared.writable.contains("/State"));
    }
}
