//! LwM2M paths.
//!
//! A path addresses a node of a device's data tree with up to four
//! components: `/objectId/instanceId/resourceId/resourceInstanceId`.
//! A component can only be present when every previous one is, so the
//! number of components alone gives the level of the addressed node.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::InvalidPathError;

/// Largest usable id. 65535 is reserved by LwM2M for objects, instances
/// and resources.
pub const MAX_ID: u16 = 65534;

/// Level of the node addressed by a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathLevel {
    Root,
    Object,
    ObjectInstance,
    Resource,
    ResourceInstance,
}

/// Immutable LwM2M path.
///
/// Ordering is lexicographic by component with a prefix ordered before its
/// descendants, so `/3 < /3/0 < /3/0/1 < /3/1 < /4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LwM2mPath {
    object_id: Option<u16>,
    object_instance_id: Option<u16>,
    resource_id: Option<u16>,
    resource_instance_id: Option<u16>,
}

impl LwM2mPath {
    /// The root path `/`.
    pub const fn root() -> Self {
        Self {
            object_id: None,
            object_instance_id: None,
            resource_id: None,
            resource_instance_id: None,
        }
    }

    pub const fn object(object_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            object_instance_id: None,
            resource_id: None,
            resource_instance_id: None,
        }
    }

    pub const fn object_instance(object_id: u16, object_instance_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            object_instance_id: Some(object_instance_id),
            resource_id: None,
            resource_instance_id: None,
        }
    }

    pub const fn resource(object_id: u16, object_instance_id: u16, resource_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            object_instance_id: Some(object_instance_id),
            resource_id: Some(resource_id),
            resource_instance_id: None,
        }
    }

    pub const fn resource_instance(
        object_id: u16,
        object_instance_id: u16,
        resource_id: u16,
        resource_instance_id: u16,
    ) -> Self {
        Self {
            object_id: Some(object_id),
            object_instance_id: Some(object_instance_id),
            resource_id: Some(resource_id),
            resource_instance_id: Some(resource_instance_id),
        }
    }

    /// Build a path from explicit components.
    ///
    /// Accepts up to four components. Object, instance and resource ids must
    /// not exceed [`MAX_ID`].
    pub fn from_components(components: &[u32]) -> Result<Self, InvalidPathError> {
        if components.len() > 4 {
            return Err(InvalidPathError(format!(
                "a path has at most 4 components, got {}",
                components.len()
            )));
        }
        let mut ids = [None; 4];
        for (index, component) in components.iter().enumerate() {
            let max = if index == 3 { u16::MAX as u32 } else { MAX_ID as u32 };
            if *component > max {
                return Err(InvalidPathError(format!(
                    "component {} of path is out of range [0, {}]",
                    component, max
                )));
            }
            ids[index] = Some(*component as u16);
        }
        Ok(Self {
            object_id: ids[0],
            object_instance_id: ids[1],
            resource_id: ids[2],
            resource_instance_id: ids[3],
        })
    }

    /// Parse a slash delimited path such as `/3/0/1`.
    ///
    /// The leading slash is optional. `/` and the empty string are the root.
    pub fn parse(path: &str) -> Result<Self, InvalidPathError> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut components = Vec::with_capacity(4);
        for segment in trimmed.split('/') {
            if segment.is_empty() {
                return Err(InvalidPathError(format!("empty segment in '{}'", path)));
            }
            if !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(InvalidPathError(format!(
                    "segment '{}' of '{}' is not a non-negative integer",
                    segment, path
                )));
            }
            let value: u32 = segment.parse().map_err(|_| {
                InvalidPathError(format!("segment '{}' of '{}' is out of range", segment, path))
            })?;
            components.push(value);
        }
        Self::from_components(&components)
            .map_err(|e| InvalidPathError(format!("'{}': {}", path, e.0)))
    }

    pub fn object_id(&self) -> Option<u16> {
        self.object_id
    }

    pub fn object_instance_id(&self) -> Option<u16> {
        self.object_instance_id
    }

    pub fn resource_id(&self) -> Option<u16> {
        self.resource_id
    }

    pub fn resource_instance_id(&self) -> Option<u16> {
        self.resource_instance_id
    }

    /// Number of components, `0` for the root.
    pub fn len(&self) -> usize {
        self.components().count()
    }

    pub fn is_empty(&self) -> bool {
        self.object_id.is_none()
    }

    pub fn components(&self) -> impl Iterator<Item = u16> {
        [
            self.object_id,
            self.object_instance_id,
            self.resource_id,
            self.resource_instance_id,
        ]
        .into_iter()
        .map_while(|c| c)
    }

    pub fn level(&self) -> PathLevel {
        match self.len() {
            0 => PathLevel::Root,
            1 => PathLevel::Object,
            2 => PathLevel::ObjectInstance,
            3 => PathLevel::Resource,
            _ => PathLevel::ResourceInstance,
        }
    }

    pub fn is_root(&self) -> bool {
        self.level() == PathLevel::Root
    }

    pub fn is_object(&self) -> bool {
        self.level() == PathLevel::Object
    }

    pub fn is_object_instance(&self) -> bool {
        self.level() == PathLevel::ObjectInstance
    }

    pub fn is_resource(&self) -> bool {
        self.level() == PathLevel::Resource
    }

    pub fn is_resource_instance(&self) -> bool {
        self.level() == PathLevel::ResourceInstance
    }

    /// Parent path, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let mut parent = *self;
        if parent.resource_instance_id.take().is_some()
            || parent.resource_id.take().is_some()
            || parent.object_instance_id.take().is_some()
            || parent.object_id.take().is_some()
        {
            Some(parent)
        } else {
            None
        }
    }

    /// Child path with `id` appended, `None` if this path is already a
    /// resource instance path.
    pub fn append(&self, id: u16) -> Option<Self> {
        let mut child = *self;
        match self.level() {
            PathLevel::Root => child.object_id = Some(id),
            PathLevel::Object => child.object_instance_id = Some(id),
            PathLevel::ObjectInstance => child.resource_id = Some(id),
            PathLevel::Resource => child.resource_instance_id = Some(id),
            PathLevel::ResourceInstance => return None,
        }
        Some(child)
    }

    /// Whether `prefix` equals this path or is one of its ancestors.
    pub fn starts_with(&self, prefix: &LwM2mPath) -> bool {
        let mut own = self.components();
        prefix.components().all(|c| own.next() == Some(c))
    }
}

impl fmt::Display for LwM2mPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for component in self.components() {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for LwM2mPath {
    type Err = InvalidPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for LwM2mPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LwM2mPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
