//! DashMap MAC Table
//!
//! Implements MacTable with one DashMap keyed by (switch, mac).

use crate::domain::entities::{LearnOutcome, MacBinding};
use crate::domain::ports::MacTable;
use crate::domain::value_objects::{DatapathId, MacAddr, PortNo};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

pub struct DashMapMacTable {
    bindings: Arc<DashMap<(DatapathId, MacAddr), PortNo>>,
}

impl DashMapMacTable {
    pub fn new() -> Self {
        Self {
            bindings: Arc::new(DashMap::new()),
        }
    }
}

impl Default for DashMapMacTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MacTable for DashMapMacTable {
    fn learn(&self, dpid: DatapathId, mac: MacAddr, in_port: PortNo) -> LearnOutcome {
        match self.bindings.entry((dpid, mac)) {
            Entry::Vacant(e) => {
                e.insert(in_port);
                LearnOutcome::LearnedNew
            }
            Entry::Occupied(e) if *e.get() == in_port => LearnOutcome::LearnedSame,
            Entry::Occupied(e) => LearnOutcome::Conflict {
                bound_port: *e.get(),
            },
        }
    }

    fn lookup(&self, dpid: DatapathId, mac: MacAddr) -> Option<PortNo> {
        self.bindings.get(&(dpid, mac)).map(|e| *e.value())
    }

    fn bindings(&self, dpid: DatapathId) -> Vec<MacBinding> {
        self.bindings
            .iter()
            .filter(|e| e.key().0 == dpid)
            .map(|e| MacBinding {
                dpid,
                mac: e.key().1,
                port: *e.value(),
            })
            .collect()
    }

    fn count(&self) -> usize {
        self.bindings.len()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn mac(last: u8) -> MacAddr {
        MacAddr::new(0, 0, 0, 0, 0, last)
    }

    #[test]
    fn test_learn_new_then_same() {
        let table = DashMapMacTable::new();
        assert_eq!(
            table.learn(DatapathId(1), mac(1), PortNo(1)),
            LearnOutcome::LearnedNew
        );
        for _ in 0..5 {
            assert_eq!(
                table.learn(DatapathId(1), mac(1), PortNo(1)),
                LearnOutcome::LearnedSame
            );
        }
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn test_conflict_keeps_binding() {
        let table = DashMapMacTable::new();
        table.learn(DatapathId(1), mac(1), PortNo(1));
        assert_eq!(
            table.learn(DatapathId(1), mac(1), PortNo(2)),
            LearnOutcome::Conflict {
                bound_port: PortNo(1)
            }
        );
        assert_eq!(table.lookup(DatapathId(1), mac(1)), Some(PortNo(1)));
    }

    #[test]
    fn test_bindings_are_per_switch() {
        let table = DashMapMacTable::new();
        table.learn(DatapathId(1), mac(1), PortNo(1));
        assert_eq!(
            table.learn(DatapathId(2), mac(1), PortNo(3)),
            LearnOutcome::LearnedNew
        );
        table.learn(DatapathId(2), mac(2), PortNo(4));

        assert_eq!(table.lookup(DatapathId(2), mac(1)), Some(PortNo(3)));
        assert_eq!(table.lookup(DatapathId(3), mac(1)), None);
        assert_eq!(table.bindings(DatapathId(1)).len(), 1);
        assert_eq!(table.bindings(DatapathId(2)).len(), 2);
        assert_eq!(table.count(), 3);
    }
}
