use super::ActualLrp;
use super::DesiredLrp;

/// The scheduler's incremental event union.
///
/// `Unrecognized` carries event types this emitter does not know; the watcher
/// logs and drops them.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DesiredLrpCreated(DesiredLrp),
    DesiredLrpChanged { before: DesiredLrp, after: DesiredLrp },
    DesiredLrpRemoved(DesiredLrp),
    ActualLrpCreated(ActualLrp),
    ActualLrpChanged { before: ActualLrp, after: ActualLrp },
    ActualLrpRemoved(ActualLrp),
    Unrecognized { event_type: String },
}

impl Event {
    /// The process the event concerns; debug logging only.
    pub fn key(&self) -> &str {
        match self {
            Event::DesiredLrpCreated(desired) | Event::DesiredLrpRemoved(desired) => &desired.process_guid,
            Event::DesiredLrpChanged { after, .. } => &after.process_guid,
            Event::ActualLrpCreated(actual) | Event::ActualLrpRemoved(actual) => &actual.process_guid,
            Event::ActualLrpChanged { after, .. } => &after.process_guid,
            Event::Unrecognized { .. } => "",
        }
    }
}
