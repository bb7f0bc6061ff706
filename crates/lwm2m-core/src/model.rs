//! Object model registry.
//!
//! Codecs need the declared kind and multiplicity of each resource to type
//! decoded values and to reject mismatched ones. The registry is built
//! explicitly and passed to whoever needs it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node::ValueKind;

/// Operations allowed on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operations {
    None,
    R,
    W,
    RW,
    E,
}

impl Operations {
    pub fn is_readable(&self) -> bool {
        matches!(self, Operations::R | Operations::RW)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Operations::W | Operations::RW)
    }

    pub fn is_executable(&self) -> bool {
        matches!(self, Operations::E)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceModel {
    pub id: u16,
    pub name: String,
    pub operations: Operations,
    pub multiple: bool,
    pub mandatory: bool,
    /// `None` for executable resources, which carry no value
    pub kind: Option<ValueKind>,
}

impl ResourceModel {
    pub fn new(
        id: u16,
        name: impl Into<String>,
        operations: Operations,
        multiple: bool,
        mandatory: bool,
        kind: Option<ValueKind>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            operations,
            multiple,
            mandatory,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectModel {
    pub id: u16,
    pub name: String,
    pub version: String,
    pub multiple: bool,
    pub mandatory: bool,
    pub resources: BTreeMap<u16, ResourceModel>,
}

impl ObjectModel {
    pub fn new(
        id: u16,
        name: impl Into<String>,
        version: impl Into<String>,
        multiple: bool,
        mandatory: bool,
        resources: impl IntoIterator<Item = ResourceModel>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            version: version.into(),
            multiple,
            mandatory,
            resources: resources.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    pub fn resource(&self, id: u16) -> Option<&ResourceModel> {
        self.resources.get(&id)
    }
}

/// Set of object models known to a codec or parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LwM2mModel {
    objects: BTreeMap<u16, ObjectModel>,
}

impl LwM2mModel {
    /// Empty model. Every resource decodes as opaque.
    pub fn new() -> Self {
        Self::default()
    }

    /// Core objects: Security, Server, Access Control, Device, Connectivity
    /// Monitoring and OSCORE.
    pub fn core() -> Self {
        Self::new()
            .with_object(security_object())
            .with_object(server_object())
            .with_object(access_control_object())
            .with_object(device_object())
            .with_object(connectivity_monitoring_object())
            .with_object(oscore_object())
    }

    pub fn with_object(mut self, object: ObjectModel) -> Self {
        self.objects.insert(object.id, object);
        self
    }

    pub fn object(&self, object_id: u16) -> Option<&ObjectModel> {
        self.objects.get(&object_id)
    }

    pub fn resource(&self, object_id: u16, resource_id: u16) -> Option<&ResourceModel> {
        self.objects.get(&object_id)?.resource(resource_id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectModel> {
        self.objects.values()
    }
}

fn res(
    id: u16,
    name: &str,
    operations: Operations,
    multiple: bool,
    mandatory: bool,
    kind: Option<ValueKind>,
) -> ResourceModel {
    ResourceModel::new(id, name, operations, multiple, mandatory, kind)
}

use Operations::{E, R, RW, W};
use ValueKind::{Boolean, Integer, ObjLnk, Opaque, Time};

fn security_object() -> ObjectModel {
    ObjectModel::new(
        0,
        "LWM2M Security",
        "1.1",
        true,
        true,
        [
            res(0, "LWM2M Server URI", Operations::None, false, true, Some(ValueKind::String)),
            res(1, "Bootstrap-Server", Operations::None, false, true, Some(Boolean)),
            res(2, "Security Mode", Operations::None, false, true, Some(Integer)),
            res(3, "Public Key or Identity", Operations::None, false, true, Some(Opaque)),
            res(4, "Server Public Key", Operations::None, false, true, Some(Opaque)),
            res(5, "Secret Key", Operations::None, false, true, Some(Opaque)),
            res(10, "Short Server ID", Operations::None, false, false, Some(Integer)),
            res(11, "Client Hold Off Time", Operations::None, false, false, Some(Integer)),
            res(12, "Bootstrap-Server Account Timeout", Operations::None, false, false, Some(Integer)),
            res(17, "OSCORE Security Mode", Operations::None, false, false, Some(ObjLnk)),
        ],
    )
}

fn server_object() -> ObjectModel {
    ObjectModel::new(
        1,
        "LwM2M Server",
        "1.1",
        true,
        true,
        [
            res(0, "Short Server ID", R, false, true, Some(Integer)),
            res(1, "Lifetime", RW, false, true, Some(Integer)),
            res(2, "Default Minimum Period", RW, false, false, Some(Integer)),
            res(3, "Default Maximum Period", RW, false, false, Some(Integer)),
            res(4, "Disable", E, false, false, None),
            res(5, "Disable Timeout", RW, false, false, Some(Integer)),
            res(6, "Notification Storing When Disabled or Offline", RW, false, true, Some(Boolean)),
            res(7, "Binding", RW, false, true, Some(ValueKind::String)),
            res(8, "Registration Update Trigger", E, false, true, None),
        ],
    )
}

fn access_control_object() -> ObjectModel {
    ObjectModel::new(
        2,
        "LwM2M Access Control",
        "1.0",
        true,
        false,
        [
            res(0, "Object ID", R, false, true, Some(Integer)),
            res(1, "Object Instance ID", R, false, true, Some(Integer)),
            res(2, "ACL", RW, true, false, Some(Integer)),
            res(3, "Access Control Owner", RW, false, true, Some(Integer)),
        ],
    )
}

fn device_object() -> ObjectModel {
    ObjectModel::new(
        3,
        "Device",
        "1.1",
        false,
        true,
        [
            res(0, "Manufacturer", R, false, false, Some(ValueKind::String)),
            res(1, "Model Number", R, false, false, Some(ValueKind::String)),
            res(2, "Serial Number", R, false, false, Some(ValueKind::String)),
            res(3, "Firmware Version", R, false, false, Some(ValueKind::String)),
            res(4, "Reboot", E, false, true, None),
            res(5, "Factory Reset", E, false, false, None),
            res(6, "Available Power Sources", R, true, false, Some(Integer)),
            res(7, "Power Source Voltage", R, true, false, Some(Integer)),
            res(8, "Power Source Current", R, true, false, Some(Integer)),
            res(9, "Battery Level", R, false, false, Some(Integer)),
            res(10, "Memory Free", R, false, false, Some(Integer)),
            res(11, "Error Code", R, true, true, Some(Integer)),
            res(12, "Reset Error Code", E, false, false, None),
            res(13, "Current Time", RW, false, false, Some(Time)),
            res(14, "UTC Offset", RW, false, false, Some(ValueKind::String)),
            res(15, "Timezone", RW, false, false, Some(ValueKind::String)),
            res(16, "Supported Binding and Modes", R, false, true, Some(ValueKind::String)),
            res(17, "Device Type", R, false, false, Some(ValueKind::String)),
            res(18, "Hardware Version", R, false, false, Some(ValueKind::String)),
            res(19, "Software Version", R, false, false, Some(ValueKind::String)),
            res(20, "Battery Status", R, false, false, Some(Integer)),
            res(21, "Memory Total", R, false, false, Some(Integer)),
            res(22, "ExtDevInfo", R, true, false, Some(ObjLnk)),
        ],
    )
}

fn connectivity_monitoring_object() -> ObjectModel {
    ObjectModel::new(
        4,
        "Connectivity Monitoring",
        "1.2",
        false,
        false,
        [
            res(0, "Network Bearer", R, false, true, Some(Integer)),
            res(1, "Available Network Bearer", R, true, true, Some(Integer)),
            res(2, "Radio Signal Strength", R, false, true, Some(Integer)),
            res(3, "Link Quality", R, false, false, Some(Integer)),
            res(4, "IP Addresses", R, true, true, Some(ValueKind::String)),
            res(5, "Router IP Addresses", R, true, false, Some(ValueKind::String)),
            res(6, "Link Utilization", R, false, false, Some(Integer)),
            res(7, "APN", R, true, false, Some(ValueKind::String)),
            res(8, "Cell ID", R, false, false, Some(Integer)),
            res(9, "SMNC", R, false, false, Some(Integer)),
            res(10, "SMCC", R, false, false, Some(Integer)),
        ],
    )
}

fn oscore_object() -> ObjectModel {
    ObjectModel::new(
        21,
        "OSCORE",
        "2.0",
        true,
        false,
        [
            res(0, "OSCORE Master Secret", Operations::None, false, true, Some(Opaque)),
            res(1, "OSCORE Sender ID", Operations::None, false, true, Some(Opaque)),
            res(2, "OSCORE Recipient ID", Operations::None, false, true, Some(Opaque)),
            res(3, "OSCORE AEAD Algorithm", Operations::None, false, false, Some(Integer)),
            res(4, "OSCORE HMAC Algorithm", Operations::None, false, false, Some(Integer)),
            res(5, "OSCORE Master Salt", Operations::None, false, false, Some(Opaque)),
            res(6, "OSCORE ID Context", W, false, false, Some(Opaque)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_model_lookup() {
        let model = LwM2mModel::core();
        let manufacturer = model.resource(3, 0).unwrap();
        assert_eq!(manufacturer.kind, Some(ValueKind::String));
        assert!(!manufacturer.multiple);
        assert!(model.resource(3, 11).unwrap().multiple);
        assert_eq!(model.resource(3, 4).unwrap().kind, None);
        assert!(model.resource(3, 999).is_none());
        assert!(model.object(42).is_none());
    }

    #[test]
    fn test_with_object_overrides() {
        let custom = ObjectModel::new(
            3,
            "Custom Device",
            "2.0",
            false,
            true,
            [ResourceModel::new(0, "Name", Operations::R, false, true, Some(ValueKind::Opaque))],
        );
        let model = LwM2mModel::core().with_object(custom);
        assert_eq!(model.resource(3, 0).unwrap().kind, Some(ValueKind::Opaque));
        assert!(model.resource(3, 1).is_none());
    }

    #[test]
    fn test_operations() {
        let model = LwM2mModel::core();
        let reboot = model.resource(3, 4).unwrap();
        assert!(reboot.operations.is_executable());
        assert!(!reboot.operations.is_readable());
        assert!(model.resource(3, 0).unwrap().operations.is_readable());
        assert!(!model.resource(3, 0).unwrap().operations.is_writable());
    }
}
