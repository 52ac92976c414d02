//! IRCv3 capability registry.
//!
//! Tracks the server's advertised capability set across multi-line
//! `CAP LS` batches and the requested/enabled flags driven by
//! ACK/NAK/NEW/DEL.
//!
//! # Reference
//! - <https://ircv3.net/specs/extensions/capability-negotiation>

use std::collections::{BTreeMap, BTreeSet};

/// One advertised capability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capability {
    /// Capability name as advertised.
    pub name: String,
    /// `name=value` parameter, when present (e.g. `sasl=PLAIN,EXTERNAL`).
    pub value: Option<String>,
    /// Whether this session asked for it in `CAP REQ`.
    pub requested: bool,
    /// Whether the server acknowledged it.
    pub enabled: bool,
}

/// The session's view of server capabilities.
#[derive(Clone, Debug, Default)]
pub struct CapRegistry {
    caps: BTreeMap<String, Capability>,
    pending_ls: Vec<(String, Option<String>)>,
    /// Names the session intends to request. Seeded by the default
    /// policy when an LS batch commits; callers may mutate it before
    /// the `CAP REQ` is built.
    pub enable: BTreeSet<String>,
}

fn split_cap(entry: &str) -> (&str, Option<&str>) {
    match entry.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (entry, None),
    }
}

impl CapRegistry {
    /// Feed one `CAP LS`/`CAP NEW` capability list. `is_final` is
    /// false for a continuation line (the `*` marker). On the final
    /// line the accumulated batch commits and the names that were
    /// genuinely new are returned; already-known capabilities are
    /// suppressed (their value still updates).
    pub fn accumulate(&mut self, list: &str, is_final: bool) -> Option<Vec<String>> {
        for entry in list.split_whitespace() {
            let (name, value) = split_cap(entry);
            self.pending_ls
                .push((name.to_owned(), value.map(str::to_owned)));
        }
        if !is_final {
            return None;
        }

        let mut added = Vec::new();
        for (name, value) in self.pending_ls.drain(..) {
            match self.caps.get_mut(&name) {
                Some(cap) => cap.value = value,
                None => {
                    added.push(name.clone());
                    self.caps.insert(
                        name.clone(),
                        Capability { name, value, requested: false, enabled: false },
                    );
                }
            }
        }
        Some(added)
    }

    /// Mark the listed capabilities requested (CAP REQ sent).
    pub fn mark_requested(&mut self, names: &[String]) {
        for name in names {
            if let Some(cap) = self.caps.get_mut(name) {
                cap.requested = true;
            }
        }
    }

    /// Apply a `CAP ACK` list; `-name` entries disable. Returns the
    /// names newly enabled.
    pub fn ack(&mut self, list: &str) -> Vec<String> {
        let mut enabled = Vec::new();
        for entry in list.split_whitespace() {
            if let Some(name) = entry.strip_prefix('-') {
                if let Some(cap) = self.caps.get_mut(name) {
                    cap.enabled = false;
                }
            } else {
                let (name, _) = split_cap(entry);
                if let Some(cap) = self.caps.get_mut(name) {
                    if !cap.enabled {
                        cap.enabled = true;
                        enabled.push(cap.name.clone());
                    }
                }
            }
        }
        enabled
    }

    /// Apply a `CAP NAK` list: nothing from the batch is enabled.
    pub fn nak(&mut self, list: &str) {
        for entry in list.split_whitespace() {
            let (name, _) = split_cap(entry);
            if let Some(cap) = self.caps.get_mut(name) {
                cap.requested = false;
            }
            self.enable.remove(name);
        }
    }

    /// Apply a `CAP DEL` list: remove from supported and enabled.
    /// Returns the names that were actually known.
    pub fn del(&mut self, list: &str) -> Vec<String> {
        let mut removed = Vec::new();
        for entry in list.split_whitespace() {
            let (name, _) = split_cap(entry);
            if self.caps.remove(name).is_some() {
                removed.push(name.to_owned());
            }
            self.enable.remove(name);
        }
        removed
    }

    /// Whether the server advertises `name`.
    pub fn is_supported(&self, name: &str) -> bool {
        self.caps.contains_key(name)
    }

    /// Whether `name` is currently enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.caps.get(name).is_some_and(|cap| cap.enabled)
    }

    /// The advertised value of `name`, if any.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.caps.get(name).and_then(|cap| cap.value.as_deref())
    }

    /// All advertised capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.caps.values()
    }

    /// The names to put in `CAP REQ`: the intersection of the enable
    /// set with the supported set.
    pub fn request_list(&self) -> Vec<String> {
        self.enable
            .iter()
            .filter(|name| self.caps.contains_key(*name))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiline_ls_accumulates() {
        let mut reg = CapRegistry::default();
        assert_eq!(reg.accumulate("multi-prefix sasl=PLAIN", false), None);
        let added = reg.accumulate("away-notify", true).unwrap();
        assert_eq!(added, ["multi-prefix", "sasl", "away-notify"]);
        assert_eq!(reg.value("sasl"), Some("PLAIN"));
    }

    #[test]
    fn known_caps_suppressed_on_new_batch() {
        let mut reg = CapRegistry::default();
        reg.accumulate("sasl=PLAIN", true);
        let added = reg.accumulate("sasl=PLAIN,EXTERNAL batch", true).unwrap();
        assert_eq!(added, ["batch"]);
        // Value still refreshed.
        assert_eq!(reg.value("sasl"), Some("PLAIN,EXTERNAL"));
    }

    #[test]
    fn ack_enables_and_minus_disables() {
        let mut reg = CapRegistry::default();
        reg.accumulate("multi-prefix sasl", true);
        let enabled = reg.ack("multi-prefix sasl");
        assert_eq!(enabled, ["multi-prefix", "sasl"]);
        assert!(reg.is_enabled("sasl"));
        reg.ack("-sasl");
        assert!(!reg.is_enabled("sasl"));
    }

    #[test]
    fn del_removes_supported_and_enabled() {
        let mut reg = CapRegistry::default();
        reg.accumulate("monitor", true);
        reg.ack("monitor");
        let removed = reg.del("monitor unknown");
        assert_eq!(removed, ["monitor"]);
        assert!(!reg.is_supported("monitor"));
    }

    #[test]
    fn request_list_is_intersection() {
        let mut reg = CapRegistry::default();
        reg.accumulate("away-notify monitor", true);
        reg.enable.insert("away-notify".to_owned());
        reg.enable.insert("chghost".to_owned());
        assert_eq!(reg.request_list(), ["away-notify"]);
    }
}
