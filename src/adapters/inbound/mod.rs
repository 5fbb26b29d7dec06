mod event_reactor;

pub use event_reactor::{EventReactor, EventSender};
