use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

use super::shared::DbusSharedState;
use super::util::text_for_path;
use crate::driver::DriverCommand;

/// VeDbus-style BusItem implementing com.victronenergy.BusItem
pub struct BusItem {
    pub(crate) path: String,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl BusItem {
    pub fn new(path: String, shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { path, shared }
    }

    /// Coerce writes to the 0/1 flags (`/ManualStart`, `/AutoStartEnabled`,
    /// `/ServiceCounterReset`); accepts booleans, numbers and on/off strings
    fn normalize_flag(value: &serde_json::Value) -> serde_json::Value {
        let v = match value {
            serde_json::Value::Bool(b) => u8::from(*b),
            serde_json::Value::Number(n) => {
                if n.as_u64().unwrap_or(0) > 0 || n.as_i64().unwrap_or(0) > 0 {
                    1
                } else {
                    0
                }
            }
            serde_json::Value::String(s) => {
                let t = s.trim().to_ascii_lowercase();
                u8::from(t == "1" || t == "true" || t == "on" || t == "enabled")
            }
            _ => 0,
        };
        serde_json::json!(v)
    }

    /// Coerce `/ManualStartTimer` writes to non-negative whole seconds
    fn normalize_seconds(value: &serde_json::Value) -> serde_json::Value {
        let secs = match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            serde_json::Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
            _ => 0,
        };
        serde_json::json!(secs.max(0))
    }

    fn normalize_value_for_path(&self, value: &serde_json::Value) -> serde_json::Value {
        match self.path.as_str() {
            "/ManualStart" | "/AutoStartEnabled" | "/ServiceCounterReset" => {
                Self::normalize_flag(value)
            }
            "/ManualStartTimer" => Self::normalize_seconds(value),
            _ => value.clone(),
        }
    }

    fn dispatch_driver_command(&self, shared: &DbusSharedState, normalized: &serde_json::Value) {
        let as_i64 = normalized.as_i64().unwrap_or(0);
        match self.path.as_str() {
            "/ManualStart" => {
                let _ = shared
                    .commands_tx
                    .send(DriverCommand::SetManualStart(as_i64 == 1));
            }
            "/ManualStartTimer" => {
                let _ = shared
                    .commands_tx
                    .send(DriverCommand::SetManualStartTimer(as_i64));
            }
            "/AutoStartEnabled" => {
                let _ = shared
                    .commands_tx
                    .send(DriverCommand::SetAutoStart(as_i64 == 1));
            }
            "/ServiceCounterReset" => {
                if as_i64 == 1 {
                    let _ = shared.commands_tx.send(DriverCommand::ResetServiceCounter);
                }
            }
            _ => {}
        }
    }

    pub(crate) fn serde_to_owned_value(v: &serde_json::Value) -> OwnedValue {
        match v {
            serde_json::Value::Null => OwnedValue::from(0i64),
            serde_json::Value::Bool(b) => OwnedValue::from(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    OwnedValue::from(i)
                } else if let Some(u) = n.as_u64() {
                    OwnedValue::from(u)
                } else {
                    OwnedValue::from(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => OwnedValue::try_from(Value::from(s.as_str()))
                .unwrap_or_else(|_| OwnedValue::from(0i64)),
            _ => OwnedValue::from(0i64),
        }
    }

    pub(crate) fn owned_value_to_serde(v: &OwnedValue) -> serde_json::Value {
        if let Ok(b) = <bool as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(b);
        }
        if let Ok(i) = <i64 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(i);
        }
        if let Ok(u) = <u64 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(u);
        }
        if let Ok(f) = <f64 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(f);
        }
        if let Ok(s) = <&str as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(s.to_string());
        }
        serde_json::json!(v.to_string())
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl BusItem {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        let val = {
            let shared = self.shared.lock().unwrap();
            shared
                .paths
                .get(&self.path)
                .cloned()
                .unwrap_or(serde_json::json!(0))
        };
        Self::serde_to_owned_value(&val)
    }

    #[zbus(name = "SetValue")]
    async fn set_value(&self, value: OwnedValue) -> i32 {
        let (conn_opt, root_path, normalized) = {
            let mut shared = self.shared.lock().unwrap();
            if !shared.writable.contains(&self.path) {
                return 1;
            }
            let incoming = Self::owned_value_to_serde(&value);
            let normalized = self.normalize_value_for_path(&incoming);
            shared.paths.insert(self.path.clone(), normalized.clone());
            (shared.connection.clone(), shared.root_path.clone(), normalized)
        };

        if let Some(conn) = conn_opt {
            if let Ok(obj_path) = OwnedObjectPath::try_from(self.path.as_str())
                && let Ok(item_ctx) = SignalEmitter::new(&conn, obj_path)
            {
                let mut changes: HashMap<&str, OwnedValue> = HashMap::new();
                changes.insert("Value", BusItem::serde_to_owned_value(&normalized));
                let text = text_for_path(&self.path, &normalized);
                if let Ok(text_ov) = OwnedValue::try_from(Value::from(text.as_str())) {
                    changes.insert("Text", text_ov);
                }
                let _ = BusItem::properties_changed(&item_ctx, changes).await;
            }
            if let Ok(root_ctx) = SignalEmitter::new(&conn, root_path) {
                let mut inner: HashMap<&str, OwnedValue> = HashMap::new();
                inner.insert("Value", BusItem::serde_to_owned_value(&normalized));
                let text = text_for_path(&self.path, &normalized);
                if let Ok(text_ov) = OwnedValue::try_from(Value::from(text.as_str())) {
                    inner.insert("Text", text_ov);
                }
                let mut outer: HashMap<&str, HashMap<&str, OwnedValue>> = HashMap::new();
                outer.insert(self.path.as_str(), inner);
                let _ = crate::dbus::RootBus::items_changed(&root_ctx, outer).await;
            }
        }

        let shared = self.shared.lock().unwrap();
        self.dispatch_driver_command(&shared, &normalized);

        0
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> String {
        let val = {
            let shared = self.shared.lock().unwrap();
            shared
                .paths
                .get(&self.path)
                .cloned()
                .unwrap_or(serde_json::json!(0))
        };
        text_for_path(&self.path, &val)
    }

    #[zbus(signal)]
    pub async fn properties_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, OwnedValue>,
    ) -> zbus::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_shared() -> (
        Arc<Mutex<DbusSharedState>>,
        mpsc::UnboundedReceiver<DriverCommand>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let root = OwnedObjectPath::try_from("/").unwrap();
        (Arc::new(Mutex::new(DbusSharedState::new(tx, root))), rx)
    }

    #[test]
    fn normalize_flag_various_inputs() {
        assert_eq!(
            BusItem::normalize_flag(&serde_json::json!(true)),
            serde_json::json!(1)
        );
        assert_eq!(
            BusItem::normalize_flag(&serde_json::json!(0)),
            serde_json::json!(0)
        );
        assert_eq!(
            BusItem::normalize_flag(&serde_json::json!("On")),
            serde_json::json!(1)
        );
        assert_eq!(
            BusItem::normalize_flag(&serde_json::json!("disabled")),
            serde_json::json!(0)
        );
    }

    #[test]
    fn normalize_seconds_clamps_negative() {
        assert_eq!(
            BusItem::normalize_seconds(&serde_json::json!(-5)),
            serde_json::json!(0)
        );
        assert_eq!(
            BusItem::normalize_seconds(&serde_json::json!("120")),
            serde_json::json!(120)
        );
        assert_eq!(
            BusItem::normalize_seconds(&serde_json::json!(90.7)),
            serde_json::json!(90)
        );
    }

    #[test]
    fn owned_value_conversions_roundtrip() {
        let ov_b = BusItem::serde_to_owned_value(&serde_json::json!(true));
        assert_eq!(
            BusItem::owned_value_to_serde(&ov_b),
            serde_json::json!(true)
        );

        let ov_i = BusItem::serde_to_owned_value(&serde_json::json!(-5));
        assert_eq!(BusItem::owned_value_to_serde(&ov_i), serde_json::json!(-5));

        let ov_f = BusItem::serde_to_owned_value(&serde_json::json!(2.5));
        assert_eq!(BusItem::owned_value_to_serde(&ov_f), serde_json::json!(2.5));
    }

    #[tokio::test]
    async fn set_value_respects_writable_and_dispatches_commands() {
        let (shared, mut rx) = make_shared();
        {
            let mut s = shared.lock().unwrap();
            s.paths
                .insert("/ManualStart".to_string(), serde_json::json!(0));
            s.writable.insert("/ManualStart".to_string());
        }

        let item = BusItem::new("/ManualStart".to_string(), shared.clone());
        let rc = item.set_value(OwnedValue::from(1i64)).await;
        assert_eq!(rc, 0);
        {
            let s = shared.lock().unwrap();
            assert_eq!(
                s.paths.get("/ManualStart").cloned(),
                Some(serde_json::json!(1))
            );
        }
        match rx.try_recv().expect("expected driver command") {
            DriverCommand::SetManualStart(v) => assert!(v),
            other => panic!("unexpected command: {:?}", other),
        }

        // Non-writable path: rejected, value unchanged
        let (shared2, mut rx2) = make_shared();
        {
            let mut s = shared2.lock().unwrap();
            s.paths.insert("/State".to_string(), serde_json::json!(0));
        }
        let item2 = BusItem::new("/State".to_string(), shared2.clone());
        let rc2 = item2.set_value(OwnedValue::from(1i64)).await;
        assert_eq!(rc2, 1);
        assert!(rx2.try_recv().is_err());
        let s2 = shared2.lock().unwrap();
        assert_eq!(s2.paths.get("/State"), Some(&serde_json::json!(0)));
    }

    #[tokio::test]
    async fn service_counter_reset_fires_only_on_one() {
        let (shared, mut rx) = make_shared();
        {
            let mut s = shared.lock().unwrap();
            s.paths
                .insert("/ServiceCounterReset".to_string(), serde_json::json!(0));
            s.writable.insert("/ServiceCounterReset".to_string());
        }
        let item = BusItem::new("/ServiceCounterReset".to_string(), shared.clone());

        assert_eq!(item.set_value(OwnedValue::from(0i64)).await, 0);
        assert!(rx.try_recv().is_err());

        assert_eq!(item.set_value(OwnedValue::from(1i64)).await, 0);
        assert!(matches!(
            rx.try_recv(),
            Ok(DriverCommand::ResetServiceCounter)
        ));
    }
}
