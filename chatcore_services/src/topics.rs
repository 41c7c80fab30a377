use chatcore_core::event::EventType;

/// Topic naming convention shared by every service that publishes
/// onto the event bus: one topic per event type.
pub fn topic_for(event_type: &EventType) -> String {
  format!("chatcore.{}", event_type.as_str())
}
