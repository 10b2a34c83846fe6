use std::fmt;

pub const INGRESS: &str = "Ingress";

/// Describes a change to a watched ingress, published after the cache is
/// updated.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub kind: AnnouncementKind,
    pub resource_type: &'static str,
    pub namespace: String,
    pub name: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum AnnouncementKind {
    Added,
    Updated,
    Deleted,
}

// === impl Announcement ===

impl Announcement {
    pub(crate) fn ingress(kind: AnnouncementKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            resource_type: INGRESS,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} {}",
            self.resource_type, self.namespace, self.name, self.kind
        )
    }
}

// === impl AnnouncementKind ===

impl fmt::Display for AnnouncementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => f.write_str("added"),
            Self::Updated => f.write_str("updated"),
            Self::Deleted => f.write_str("deleted"),
        }
    }
}
