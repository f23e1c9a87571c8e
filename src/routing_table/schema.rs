use serde::Deserialize;
use serde::Serialize;

/// `{epoch, index}` vector clock the scheduler attaches to every record.
///
/// Causal ordering of incremental updates rests entirely on this tag: a
/// mutation carrying an older tag than the stored one is rejected silently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationTag {
    pub epoch: String,
    pub index: u32,
}

impl ModificationTag {
    /// Whether `other` supersedes this tag.
    ///
    /// An empty epoch on either side always accepts: records built from a
    /// full snapshot carry no tag and must yield to tagged updates.
    pub fn succeeded_by(
        &self,
        other: &ModificationTag,
    ) -> bool {
        if self.epoch.is_empty() || other.epoch.is_empty() {
            return true;
        }

        self.epoch != other.epoch || self.index < other.index
    }
}

/// One routable instance: host address plus externally-mapped port, tied back
/// to the container port it serves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub instance_guid: String,
    pub host: String,
    pub port: u16,
    pub container_port: u16,
    pub evacuating: bool,
    pub modification_tag: ModificationTag,
}

/// The set of hostnames bound to one routing key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Routes {
    pub hostnames: Vec<String>,
    pub log_guid: String,
    pub modification_tag: ModificationTag,
}

/// `{process identifier, container port}`: the slot at which endpoints and
/// hostnames meet. Two endpoints sharing a key serve the same hostnames.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct RoutingKey {
    pub process_guid: String,
    pub container_port: u16,
}
