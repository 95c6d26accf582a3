//! The condition-indexed dispatch table: a read-optimised map from
//! match-key to the sink ids whose condition contains it, plus the
//! id→writer mapping `select` resolves against.

use std::cmp::Ordering;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::condition::{self, diff, MatchKey, NormalisedCondition};
use crate::ids::SinkId;
use crate::severity::Severity;
use crate::sink::Writer;

#[derive(Debug, Default, Clone)]
struct IndexEntry {
    /// Count of registered keys strictly more specific than this one
    /// (arity 2 keys rooted at an arity 1 key, arity 3 keys rooted at an
    /// arity 1 or arity 2 key).
    descendant_count: usize,
    /// Sink ids whose normalised condition contains exactly this key,
    /// kept sorted for the linear merge in `select`.
    sink_ids: Vec<SinkId>,
}

impl IndexEntry {
    fn is_empty(&self) -> bool {
        self.descendant_count == 0 && self.sink_ids.is_empty()
    }
}

/// One channel's dispatch table. Safe to share across the emitting hot
/// path (via `select`) and the channel actor (via `register`/`deregister`/
/// `set_writer`) — the two maps are each guarded by their own `RwLock`, so
/// a `select` never contends with another `select`, only briefly with a
/// concurrent mutation.
#[derive(Default)]
pub struct IndexTable {
    index: RwLock<AHashMap<MatchKey, IndexEntry>>,
    writers: RwLock<AHashMap<SinkId, Arc<dyn Writer>>>,
}

impl IndexTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the diff between `old_condition` and `new_condition` to the
    /// index under one write-lock critical section, so concurrent readers
    /// never observe a state that is neither fully old nor fully new for
    /// the keys that actually change (keys common to both are untouched).
    pub fn register(&self, sink_id: &SinkId, new_condition: &NormalisedCondition, old_condition: &NormalisedCondition) {
        let delta = diff(new_condition, old_condition);
        if delta.added.is_empty() && delta.removed.is_empty() {
            return;
        }
        let mut map = self.index.write();
        for key in &delta.added {
            add_key(&mut map, key, sink_id);
        }
        for key in &delta.removed {
            remove_key(&mut map, key, sink_id);
        }
    }

    /// Removes every key the sink's current condition holds, and drops its
    /// writer entry.
    pub fn deregister(&self, sink_id: &SinkId, condition: &NormalisedCondition) {
        self.register(sink_id, &NormalisedCondition::empty(), condition);
        self.writers.write().remove(sink_id);
    }

    /// Sets (or, with `None`, clears) the writer a sink id resolves to.
    /// Independent of `register`/`deregister`: this never touches the
    /// index map, only the writer map, so a composite coordinator's
    /// writer hot-swap never needs to go through the channel actor.
    pub fn set_writer(&self, sink_id: &SinkId, writer: Option<Arc<dyn Writer>>) {
        match writer {
            Some(w) => {
                self.writers.write().insert(sink_id.clone(), w);
            }
            None => {
                self.writers.write().remove(sink_id);
            }
        }
    }

    /// Resolves a tagged record to every writer whose sink condition
    /// matches, by walking from the coarsest to the most specific key and
    /// stopping early whenever a key has no more specific descendants
    /// registered. Sink ids whose writer is currently absent (a narrow
    /// race with a concurrent uninstall, or a composite child that hasn't
    /// published yet) are silently dropped rather than erroring.
    pub fn select(&self, severity: Severity, application: &str, module: &str) -> Vec<Arc<dyn Writer>> {
        let map = self.index.read();

        let k1 = MatchKey::severity_only(severity);
        let (c1, l1) = lookup(&map, &k1);
        if c1 == 0 {
            drop(map);
            return self.resolve(&l1);
        }

        let app: crate::condition::AppName = Arc::from(application);
        let k2 = MatchKey::severity_app(severity, app.clone());
        let (c2, l2) = lookup(&map, &k2);
        if c2 == 0 {
            let merged = merge(&l1, &l2);
            drop(map);
            return self.resolve(&merged);
        }

        let module_name: crate::condition::ModuleName = Arc::from(module);
        let k3 = MatchKey::severity_app_module(severity, app, module_name);
        let (_, l3) = lookup(&map, &k3);
        let merged = merge3(&l1, &l2, &l3);
        drop(map);
        self.resolve(&merged)
    }

    fn resolve(&self, ids: &[SinkId]) -> Vec<Arc<dyn Writer>> {
        let writers = self.writers.read();
        ids.iter().filter_map(|id| writers.get(id).cloned()).collect()
    }

    #[cfg(test)]
    fn descendant_count(&self, key: &MatchKey) -> usize {
        self.index.read().get(key).map(|e| e.descendant_count).unwrap_or(0)
    }
}

fn lookup(map: &AHashMap<MatchKey, IndexEntry>, key: &MatchKey) -> (usize, Vec<SinkId>) {
    match map.get(key) {
        Some(e) => (e.descendant_count, e.sink_ids.clone()),
        None => (0, Vec::new()),
    }
}

fn add_key(map: &mut AHashMap<MatchKey, IndexEntry>, key: &MatchKey, sink_id: &SinkId) {
    match key.arity() {
        2 => bump(map, &key.prefix(1), 1),
        3 => {
            bump(map, &key.prefix(1), 1);
            bump(map, &key.prefix(2), 1);
        }
        _ => {}
    }
    let entry = map.entry(key.clone()).or_default();
    if let Err(pos) = entry.sink_ids.binary_search(sink_id) {
        entry.sink_ids.insert(pos, sink_id.clone());
    }
}

fn remove_key(map: &mut AHashMap<MatchKey, IndexEntry>, key: &MatchKey, sink_id: &SinkId) {
    if let Some(entry) = map.get_mut(key) {
        if let Ok(pos) = entry.sink_ids.binary_search(sink_id) {
            entry.sink_ids.remove(pos);
        }
    }
    prune(map, key);
    match key.arity() {
        2 => bump(map, &key.prefix(1), -1),
        3 => {
            bump(map, &key.prefix(1), -1);
            bump(map, &key.prefix(2), -1);
        }
        _ => {}
    }
}

fn bump(map: &mut AHashMap<MatchKey, IndexEntry>, key: &MatchKey, delta: i64) {
    let entry = map.entry(key.clone()).or_default();
    if delta > 0 {
        entry.descendant_count += delta as usize;
    } else {
        entry.descendant_count = entry.descendant_count.saturating_sub((-delta) as usize);
    }
    prune(map, key);
}

fn prune(map: &mut AHashMap<MatchKey, IndexEntry>, key: &MatchKey) {
    if map.get(key).is_some_and(IndexEntry::is_empty) {
        map.remove(key);
    }
}

fn merge(a: &[SinkId], b: &[SinkId]) -> Vec<SinkId> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                out.push(a[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

fn merge3(a: &[SinkId], b: &[SinkId], c: &[SinkId]) -> Vec<SinkId> {
    merge(&merge(a, b), c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::ids::SinkId;
    use crate::sink::{RecordContext, WriterError};

    struct NullWriter(&'static str);
    impl Writer for NullWriter {
        fn write(&self, _context: &RecordContext, _format: &str, _data: &[u8]) -> Result<(), WriterError> {
            Ok(())
        }
        fn get_writee(&self) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    fn install(table: &IndexTable, id: &str, condition: NormalisedCondition) {
        let sink_id = SinkId::new(id).unwrap();
        table.register(&sink_id, &condition, &NormalisedCondition::empty());
        table.set_writer(&sink_id, Some(Arc::new(NullWriter(Box::leak(id.to_string().into_boxed_str())))));
    }

    fn writee_names(writers: &[Arc<dyn Writer>]) -> Vec<String> {
        let mut names: Vec<_> = writers.iter().filter_map(|w| w.get_writee()).collect();
        names.sort();
        names
    }

    #[test]
    fn descendant_count_tracks_more_specific_registrations() {
        let table = IndexTable::new();
        install(&table, "s1", Condition::severity(Severity::Debug).normalise().unwrap());
        install(&table, "s4", Condition::severity(Severity::Info).with_application("stdlib").normalise().unwrap());
        install(
            &table,
            "s5",
            Condition::severity(Severity::Info)
                .with_application("stdlib")
                .with_module("lists")
                .normalise()
                .unwrap(),
        );

        // s4 (arity 2) and s5 (arity 3) both root at severity_only(Info); s5
        // additionally roots at severity_app(Info, stdlib).
        assert_eq!(table.descendant_count(&MatchKey::severity_only(Severity::Info)), 2);
        assert_eq!(
            table.descendant_count(&MatchKey::severity_app(Severity::Info, Arc::from("stdlib"))),
            1
        );
    }

    #[test]
    fn select_matches_scenario_from_worked_example() {
        let table = IndexTable::new();
        install(&table, "s1", Condition::severity(Severity::Debug).normalise().unwrap());
        install(&table, "s2", Condition::range(Severity::Info, Severity::Alert).normalise().unwrap());
        install(&table, "s3", Condition::severities([Severity::Info]).normalise().unwrap());
        install(&table, "s4", Condition::severity(Severity::Info).with_application("stdlib").normalise().unwrap());
        install(
            &table,
            "s5",
            Condition::severity(Severity::Info).with_module("lists").normalise().unwrap(),
        );

        let got = writee_names(&table.select(Severity::Debug, "stdlib", "lists"));
        assert_eq!(got, vec!["s1"]);

        let got = writee_names(&table.select(Severity::Info, "stdlib", "lists"));
        assert_eq!(got, vec!["s1", "s2", "s3", "s4", "s5"]);

        let got = writee_names(&table.select(Severity::Notice, "stdlib", "dict"));
        assert_eq!(got, vec!["s1", "s2", "s4"]);
    }

    #[test]
    fn deregister_removes_every_key_and_the_writer() {
        let table = IndexTable::new();
        let condition = Condition::severity(Severity::Debug).with_application("app").normalise().unwrap();
        install(&table, "s1", condition.clone());
        let sink_id = SinkId::new("s1").unwrap();
        table.deregister(&sink_id, &condition);

        assert!(table.select(Severity::Debug, "app", "mod").is_empty());
        assert_eq!(table.descendant_count(&MatchKey::severity_only(Severity::Debug)), 0);
    }

    #[test]
    fn absent_writer_is_silently_dropped() {
        let table = IndexTable::new();
        let condition = Condition::severity(Severity::Debug).normalise().unwrap();
        let sink_id = SinkId::new("s1").unwrap();
        table.register(&sink_id, &condition, &NormalisedCondition::empty());
        // No writer ever set - the id is indexed but unresolved.
        assert!(table.select(Severity::Debug, "app", "mod").is_empty());
    }

    #[test]
    fn empty_channel_select_is_empty_not_an_error() {
        let table = IndexTable::new();
        assert!(table.select(Severity::Emergency, "anything", "anything").is_empty());
    }
}
