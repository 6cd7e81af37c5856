use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use glam::Vec3;
use hashbrown::HashSet;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sylvan_core::{ChunkKey, DistanceMetric, Error, Result};
use sylvan_world::{
    ChunkData, ChunkSource, ChunkState, ChunkStore, GeneratorConfig, Heightfield,
    WorkerDispatcher, WorldConfig, WorldManager,
};

fn config(view_distance: i32) -> WorldConfig {
    WorldConfig {
        view_distance,
        generator: GeneratorConfig {
            tile_size: 10.0,
            resolution: 4,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn keys(coords: &[(i32, i32)]) -> HashSet<ChunkKey> {
    coords.iter().map(|&(x, z)| ChunkKey::new(x, z)).collect()
}

/// Source whose every generation fails, counting attempts.
#[derive(Default)]
struct BrokenSource {
    attempts: AtomicUsize,
}

impl ChunkSource for BrokenSource {
    fn generate(&self, key: ChunkKey) -> Result<ChunkData> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::GenerationFailed {
            key,
            reason: "disk on fire".into(),
        })
    }
}

/// Source that holds generation of one key until the test releases it.
struct GatedSource {
    gated: ChunkKey,
    entered: Barrier,
    release: Barrier,
}

impl GatedSource {
    fn new(gated: ChunkKey) -> Self {
        Self {
            gated,
            entered: Barrier::new(2),
            release: Barrier::new(2),
        }
    }
}

impl ChunkSource for GatedSource {
    fn generate(&self, key: ChunkKey) -> Result<ChunkData> {
        if key == self.gated {
            self.entered.wait();
            self.release.wait();
        }
        Ok(flat_chunk(key))
    }
}

/// Source that always succeeds instantly.
struct FlatSource;

impl ChunkSource for FlatSource {
    fn generate(&self, key: ChunkKey) -> Result<ChunkData> {
        Ok(flat_chunk(key))
    }
}

fn wait_for_idle(world: &WorldManager) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while world.in_flight_count() > 0 {
        assert!(Instant::now() < deadline, "workers never went idle");
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn flat_chunk(key: ChunkKey) -> ChunkData {
    ChunkData {
        key,
        heightfield: Heightfield::new(1, 10.0, vec![0.0; 4]),
        instances: Vec::new(),
    }
}

#[test]
fn crossing_a_boundary_shifts_the_view_block() {
    let mut world = WorldManager::new_inline(config(1)).unwrap();

    let first = world.update(Vec3::ZERO);
    let first = first.reconciled.unwrap();
    assert_eq!(
        first.scheduled.iter().copied().collect::<HashSet<_>>(),
        ChunkKey::new(0, 0)
            .neighborhood(1, DistanceMetric::Chebyshev)
            .collect()
    );

    let moved = world.update(Vec3::new(11.0, 0.0, 0.0));
    assert_eq!(moved.center, Some(ChunkKey::new(1, 0)));
    let moved = moved.reconciled.unwrap();
    assert_eq!(
        moved.evicted.iter().copied().collect::<HashSet<_>>(),
        keys(&[(-1, -1), (-1, 0), (-1, 1)])
    );
    assert_eq!(
        moved.scheduled.iter().copied().collect::<HashSet<_>>(),
        keys(&[(2, -1), (2, 0), (2, 1)])
    );

    // The first update's chunks were committed before the move.
    assert_eq!(world.store().ready_keys().len(), 6);
}

#[test]
fn staying_inside_a_chunk_does_nothing() {
    let mut world = WorldManager::new_inline(config(2)).unwrap();
    world.update(Vec3::new(1.0, 0.0, 1.0));

    for step in 0..5 {
        let report = world.update(Vec3::new(1.0 + step as f32, 3.0, 8.0));
        assert!(report.reconciled.is_none());
    }
    assert!(world.is_settled());
    assert_eq!(world.stats().ready, 25);
}

#[test]
fn resident_set_tracks_a_random_walk() {
    let mut world = WorldManager::new_inline(config(2)).unwrap();
    let store = world.store();
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let mut position = Vec3::ZERO;

    for _ in 0..200 {
        position.x += rng.gen_range(-7.0..7.0);
        position.z += rng.gen_range(-7.0..7.0);
        world.update(position);

        let center = world.current_key().unwrap();
        let expected: HashSet<ChunkKey> = center
            .neighborhood(2, DistanceMetric::Chebyshev)
            .collect();
        assert_eq!(*world.resident_keys(), expected);
        for key in store.keys() {
            assert!(expected.contains(&key), "{key} outlived the view");
        }
        for key in &expected {
            assert!(store.contains(*key), "{key} missing from store");
        }
    }
}

#[test]
fn eviction_before_commit_discards_the_result() {
    let store = ChunkStore::new();
    let key = ChunkKey::new(4, -4);
    let ticket = store.mark_pending(key).unwrap();

    assert_eq!(store.evict(key), Some(ChunkState::Pending));
    assert_eq!(ticket.state(), ChunkState::Evicted);

    let err = store.commit(&ticket, flat_chunk(key)).unwrap_err();
    assert!(matches!(err, Error::StaleCommit(k) if k == key));
    assert!(err.is_benign());
    assert!(!store.contains(key));
}

#[test]
fn re_requested_chunk_ignores_the_old_ticket() {
    let store = ChunkStore::new();
    let key = ChunkKey::new(0, 1);
    let old = store.mark_pending(key).unwrap();
    store.evict(key);
    let fresh = store.mark_pending(key).unwrap();

    assert!(matches!(
        store.commit(&old, flat_chunk(key)),
        Err(Error::StaleCommit(_))
    ));
    assert_eq!(store.get(key).unwrap().state, ChunkState::Pending);

    store.commit(&fresh, flat_chunk(key)).unwrap();
    assert_eq!(store.get(key).unwrap().state, ChunkState::Ready);
}

#[test]
fn failed_chunk_is_retried_once_then_left_absent() {
    let source = Arc::new(BrokenSource::default());
    let dispatcher = WorkerDispatcher::inline(source.clone());
    let mut world = WorldManager::with_dispatcher(config(0), dispatcher).unwrap();
    let key = ChunkKey::new(0, 0);

    world.update(Vec3::ZERO);
    let retry = world.update(Vec3::ZERO);
    assert_eq!(retry.retried, vec![key]);

    let gave_up = world.update(Vec3::ZERO);
    assert_eq!(gave_up.failed, vec![key]);
    assert_eq!(source.attempts.load(Ordering::SeqCst), 2);
    assert!(!world.store().contains(key));
    assert!(world.failed_keys().contains(&key));
    assert!(world.is_settled());

    // No further attempts while the key stays in view.
    world.update(Vec3::new(2.0, 0.0, 2.0));
    world.update(Vec3::new(3.0, 0.0, 3.0));
    assert_eq!(source.attempts.load(Ordering::SeqCst), 2);

    // Leaving and re-entering view tries again.
    world.update(Vec3::new(25.0, 0.0, 0.0));
    assert!(world.failed_keys().is_empty());
    let back = world.update(Vec3::ZERO);
    assert_eq!(back.reconciled.unwrap().scheduled, vec![key]);
}

#[test]
fn threaded_world_settles() {
    let mut cfg = config(2);
    cfg.workers = 4;
    let mut world = WorldManager::new(cfg).unwrap();
    let deadline = Instant::now() + Duration::from_secs(30);

    world.update(Vec3::new(-3.0, 0.0, 14.0));
    while !world.is_settled() || world.in_flight_count() > 0 {
        assert!(Instant::now() < deadline, "world never settled");
        std::thread::sleep(Duration::from_millis(5));
        world.update(Vec3::new(-3.0, 0.0, 14.0));
    }

    let stats = world.stats();
    assert_eq!(stats.ready, 25);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.in_flight, 0);
    assert!(stats.memory_bytes > 0);
    assert!(world.chunk(ChunkKey::new(-1, 1)).is_some());
}

#[test]
fn dropping_the_world_empties_the_store() {
    let store = {
        let mut world = WorldManager::new_inline(config(1)).unwrap();
        world.update(Vec3::ZERO);
        world.update(Vec3::ZERO);
        world.store()
    };
    assert!(store.is_empty());
}

#[test]
fn chunk_evicted_mid_generation_never_lands() {
    let origin = ChunkKey::new(0, 0);
    let source = Arc::new(GatedSource::new(origin));
    let dispatcher = WorkerDispatcher::spawn(source.clone(), 2).unwrap();
    let mut world = WorldManager::with_dispatcher(config(0), dispatcher).unwrap();
    let store = world.store();
    let far = Vec3::new(55.0, 0.0, 5.0);

    world.update(Vec3::ZERO);
    source.entered.wait();

    // Walk away while the worker is still inside `generate`.
    let moved = world.update(far).reconciled;
    let evicted_while_running = !store.contains(origin);
    source.release.wait();

    assert_eq!(moved.unwrap().evicted, vec![origin]);
    assert!(evicted_while_running);

    let mut committed = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while !world.is_settled() || world.in_flight_count() > 0 {
        assert!(Instant::now() < deadline, "world never settled");
        committed.extend(world.update(far).committed);
        std::thread::sleep(Duration::from_millis(1));
    }
    committed.extend(world.update(far).committed);

    assert_eq!(committed, vec![ChunkKey::new(5, 0)]);
    assert_eq!(store.keys(), vec![ChunkKey::new(5, 0)]);
}

#[test]
fn finished_result_for_evicted_chunk_is_discarded() {
    let dispatcher = WorkerDispatcher::spawn(Arc::new(FlatSource), 1).unwrap();
    let mut world = WorldManager::with_dispatcher(config(0), dispatcher).unwrap();
    let origin = ChunkKey::new(0, 0);

    world.update(Vec3::ZERO);
    // The result is waiting on the channel but has not been collected yet.
    wait_for_idle(&world);
    let moved = world.reconcile(ChunkKey::new(5, 0));
    assert_eq!(moved.evicted, vec![origin]);

    let report = world.update(Vec3::new(55.0, 0.0, 5.0));
    assert_eq!(report.stale, 1);
    assert!(!report.committed.contains(&origin));
    assert!(!world.store().contains(origin));
}

#[test]
fn failure_for_evicted_chunk_is_not_retried() {
    let source = Arc::new(BrokenSource::default());
    let dispatcher = WorkerDispatcher::spawn(source.clone(), 1).unwrap();
    let mut world = WorldManager::with_dispatcher(config(0), dispatcher).unwrap();
    let origin = ChunkKey::new(0, 0);

    world.update(Vec3::ZERO);
    wait_for_idle(&world);
    world.reconcile(ChunkKey::new(5, 0));

    let report = world.update(Vec3::new(55.0, 0.0, 5.0));
    assert_eq!(report.stale, 1);
    assert!(!report.retried.contains(&origin));
    assert!(!report.failed.contains(&origin));
    assert!(!world.failed_keys().contains(&origin));
    assert!(!world.store().contains(origin));
}
