use std::sync::{Arc, Mutex};

use canopy::{FixedClock, Memory, NotifyFn, Tree, Update};

// ==========================
// CORE TEST FACTORIES
// ==========================
// All notification delivery in the engine is synchronous, so tests built on
// these factories never need to sleep or poll: by the time a put() or a
// subscription call returns, every resulting notification has been recorded.

/// A tree over a single in-memory adapter with a deterministic clock
/// starting at t=1000 (auto-advancing 1ms per default-stamped write).
pub fn fixed_tree() -> (Tree, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(1000));
    let tree = Tree::with_clock(vec![Arc::new(Memory::new())], clock.clone());
    (tree, clock)
}

/// Like [`fixed_tree`] but also hands back the adapter for direct inspection.
pub fn memory_tree() -> (Tree, Arc<Memory>) {
    let memory = Arc::new(Memory::new());
    let tree = Tree::with_clock(vec![memory.clone()], Arc::new(FixedClock::new(1000)));
    (tree, memory)
}

/// A tree fanning out to two independent in-memory adapters.
pub fn two_adapter_tree() -> (Tree, Arc<Memory>, Arc<Memory>) {
    let first = Arc::new(Memory::new());
    let second = Arc::new(Memory::new());
    let tree = Tree::with_clock(
        vec![first.clone(), second.clone()],
        Arc::new(FixedClock::new(1000)),
    );
    (tree, first, second)
}

/// A callback that appends every delivered update to a shared log.
pub fn recorder() -> (NotifyFn, Arc<Mutex<Vec<Update>>>) {
    let log: Arc<Mutex<Vec<Update>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let callback: NotifyFn = Arc::new(move |update: Update| {
        sink.lock().unwrap().push(update);
    });
    (callback, log)
}

/// The last recorded update, panicking if nothing was delivered.
pub fn last(log: &Arc<Mutex<Vec<Update>>>) -> Update {
    log.lock()
        .unwrap()
        .last()
        .cloned()
        .expect("expected at least one delivered update")
}

pub fn delivered_count(log: &Arc<Mutex<Vec<Update>>>) -> usize {
    log.lock().unwrap().len()
}
