//! Route dictionary.
//!
//! Both directions are filled by the same insert, so `code -> route` and
//! `route -> code` never disagree.

use std::collections::HashMap;

/// Bidirectional route name / code table negotiated at handshake.
#[derive(Debug, Clone, Default)]
pub struct RouteDictionary {
    code_to_route: HashMap<u16, String>,
    route_to_code: HashMap<String, u16>,
}

impl RouteDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the handshake `dict` table (route name to code).
    ///
    /// Names are inserted in sorted order so a duplicated code resolves the
    /// same way on every run.
    pub fn from_table(table: &HashMap<String, u16>) -> Self {
        let mut entries: Vec<(&String, &u16)> = table.iter().collect();
        entries.sort();

        let mut dict = Self::new();
        for (route, code) in entries {
            dict.insert(route, *code);
        }
        dict
    }

    /// Insert a pair, evicting any older pairing of either side.
    pub fn insert(&mut self, route: &str, code: u16) {
        if let Some(old_route) = self.code_to_route.remove(&code) {
            self.route_to_code.remove(&old_route);
        }
        if let Some(old_code) = self.route_to_code.remove(route) {
            self.code_to_route.remove(&old_code);
        }
        self.code_to_route.insert(code, route.to_string());
        self.route_to_code.insert(route.to_string(), code);
    }

    /// Route for an inbound compressed code.
    pub fn route(&self, code: u16) -> Option<&str> {
        self.code_to_route.get(&code).map(String::as_str)
    }

    /// Code for an outbound route, if it can be compressed.
    pub fn code(&self, route: &str) -> Option<u16> {
        self.route_to_code.get(route).copied()
    }

    pub fn len(&self) -> usize {
        self.code_to_route.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code_to_route.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_directions_agree() {
        let table: HashMap<String, u16> = [("foo.bar", 1), ("chat.send", 2), ("area.move", 7)]
            .into_iter()
            .map(|(r, c)| (r.to_string(), c))
            .collect();
        let dict = RouteDictionary::from_table(&table);

        assert_eq!(dict.len(), 3);
        for (route, code) in &table {
            assert_eq!(dict.route(*code), Some(route.as_str()));
            assert_eq!(dict.code(route), Some(*code));
        }
    }

    #[test]
    fn test_misses() {
        let dict = RouteDictionary::new();
        assert!(dict.is_empty());
        assert_eq!(dict.route(1), None);
        assert_eq!(dict.code("foo.bar"), None);
    }

    #[test]
    fn test_reinsert_keeps_maps_consistent() {
        let mut dict = RouteDictionary::new();
        dict.insert("a", 1);
        dict.insert("b", 1);

        assert_eq!(dict.route(1), Some("b"));
        assert_eq!(dict.code("a"), None);
        assert_eq!(dict.len(), 1);

        dict.insert("b", 2);
        assert_eq!(dict.route(1), None);
        assert_eq!(dict.route(2), Some("b"));
    }
}
