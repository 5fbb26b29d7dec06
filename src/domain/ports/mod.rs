mod mac_table;
mod switch_channel;
mod switch_registry;

pub use mac_table::MacTable;
pub use switch_channel::SwitchChannel;
pub use switch_registry::SwitchRegistry;
