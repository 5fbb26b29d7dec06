mod dashmap_mac_table;
mod dashmap_switch_registry;
mod memory_channel;
mod restconf_body;
mod restconf_channel;

pub use dashmap_mac_table::DashMapMacTable;
pub use dashmap_switch_registry::DashMapSwitchRegistry;
pub use memory_channel::{InMemorySwitchChannel, PacketOutRecord, DEFAULT_LOG_CAPACITY};
pub use restconf_channel::{RestconfConfig, RestconfSwitchChannel};
