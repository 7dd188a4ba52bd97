//! Concurrent per-exporter template cache.
//!
//! Maps a [`TemplateKey`] to the most recently announced template together
//! with its resolved [`FieldLayout`]. Entries are stored as `Arc`s in a
//! sharded `DashMap`: a writer swaps the whole entry in one insert, so a
//! reader either sees the complete old entry or the complete new one.
//!
//! Lookups never create entries; an unknown key is simply `None`. There is
//! no expiry, entries live for the whole process.

use crate::field_layout::FieldLayout;
use dashmap::DashMap;
use sonic_ipfix::TemplateRecord;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Identity of a template within an exporter's export stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub exporter: Ipv4Addr,
    pub domain_id: u32,
    pub template_id: u16,
}

impl TemplateKey {
    pub const fn new(exporter: Ipv4Addr, domain_id: u32, template_id: u16) -> Self {
        Self {
            exporter,
            domain_id,
            template_id,
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.exporter, self.domain_id, self.template_id)
    }
}

/// A cached template definition and the layout derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTemplate {
    pub definition: TemplateRecord,
    pub layout: FieldLayout,
}

impl CachedTemplate {
    pub fn new(definition: TemplateRecord) -> Self {
        let layout = FieldLayout::resolve(&definition);
        Self { definition, layout }
    }
}

#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: DashMap<TemplateKey, Arc<CachedTemplate>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `definition` under `key`, replacing any earlier one.
    ///
    /// Returns the replaced entry.
    pub fn set(&self, key: TemplateKey, definition: TemplateRecord) -> Option<Arc<CachedTemplate>> {
        // Resolve outside the shard lock
        let entry = Arc::new(CachedTemplate::new(definition));
        self.entries.insert(key, entry)
    }

    /// Current entry for `key`; the shard lock is released before returning.
    pub fn get(&self, key: &TemplateKey) -> Option<Arc<CachedTemplate>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_ipfix::fields::*;
    use sonic_ipfix::FieldSpecifier;

    const EXPORTER: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);

    fn template(template_id: u16, fields: &[(u16, u16)]) -> TemplateRecord {
        TemplateRecord::new(
            template_id,
            fields
                .iter()
                .map(|&(id, len)| FieldSpecifier::iana(id, len))
                .collect(),
        )
    }

    #[test]
    fn test_key_display() {
        assert_eq!(TemplateKey::new(EXPORTER, 7, 256).to_string(), "192.0.2.1|7|256");
    }

    #[test]
    fn test_set_then_get() {
        let cache = TemplateCache::new();
        let key = TemplateKey::new(EXPORTER, 0, 256);
        let t = template(256, &[(SOURCE_IPV4_ADDRESS, 4), (OCTET_DELTA_COUNT, 4)]);

        assert!(cache.set(key, t.clone()).is_none());
        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.definition, t);
        assert_eq!(entry.layout.src_addr, Some(0));
        assert_eq!(entry.layout.bytes, Some(1));
    }

    #[test]
    fn test_last_write_wins() {
        let cache = TemplateCache::new();
        let key = TemplateKey::new(EXPORTER, 0, 256);
        let first = template(256, &[(SOURCE_IPV4_ADDRESS, 4)]);
        let second = template(256, &[(SOURCE_IPV6_ADDRESS, 16), (PROTOCOL_IDENTIFIER, 1)]);

        cache.set(key, first.clone());
        let replaced = cache.set(key, second.clone()).unwrap();
        assert_eq!(replaced.definition, first);

        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.definition, second);
        assert_eq!(entry.layout, FieldLayout::resolve(&second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_key_components_are_distinct() {
        let cache = TemplateCache::new();
        let t = template(256, &[(SOURCE_IPV4_ADDRESS, 4)]);
        cache.set(TemplateKey::new(EXPORTER, 0, 256), t.clone());

        assert!(cache.get(&TemplateKey::new(Ipv4Addr::new(192, 0, 2, 2), 0, 256)).is_none());
        assert!(cache.get(&TemplateKey::new(EXPORTER, 1, 256)).is_none());
        assert!(cache.get(&TemplateKey::new(EXPORTER, 0, 257)).is_none());
    }

    #[test]
    fn test_unknown_key_does_not_create_entry() {
        let cache = TemplateCache::new();
        assert!(cache.is_empty());
        assert!(cache.get(&TemplateKey::new(EXPORTER, 0, 300)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_set_get_integrity() {
        let cache = TemplateCache::new();
        let shared = TemplateKey::new(EXPORTER, 0, 256);
        let a = template(256, &[(SOURCE_IPV4_ADDRESS, 4), (OCTET_DELTA_COUNT, 4)]);
        let b = template(256, &[(SOURCE_IPV6_ADDRESS, 16), (PACKET_DELTA_COUNT, 8)]);

        std::thread::scope(|s| {
            for t in 0..8u16 {
                let (cache, a, b) = (&cache, &a, &b);
                s.spawn(move || {
                    let own = TemplateKey::new(EXPORTER, u32::from(t), 300 + t);
                    for i in 0..500 {
                        let next = if (i + t) % 2 == 0 { a.clone() } else { b.clone() };
                        cache.set(shared, next);
                        cache.set(own, template(300 + t, &[(SOURCE_TRANSPORT_PORT, 2)]));

                        // A reader sees one complete definition, never a mix
                        let seen = cache.get(&shared).unwrap();
                        assert!(seen.definition == *a || seen.definition == *b);
                        assert_eq!(seen.layout, FieldLayout::resolve(&seen.definition));
                        assert_eq!(cache.get(&own).unwrap().definition.template_id, 300 + t);
                    }
                });
            }
        });

        assert_eq!(cache.len(), 9);

        // With no concurrent writers the final set is visible
        cache.set(shared, a.clone());
        assert_eq!(cache.get(&shared).unwrap().definition, a);
    }
}
