//! Two clients sharing one store, coordinating edits through part locks.

use depot::clock::ManualClock;
use depot::entity::{Part, UnitOfQuantity};
use depot::gateway::LockGateway;
use depot::store::memory::Operation;
use depot::{
    Catalog, DepotConfig, LeaseOutcome, LockSettings, MemoryStore, Permissions, SessionContext,
    SessionId,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct World {
    store: MemoryStore,
    clock: ManualClock,
    bolt: i64,
}

impl World {
    fn new() -> Self {
        let clock = ManualClock::default();
        let store = MemoryStore::with_clock(Arc::new(clock.clone()));
        let bolt = store.parts().seed(vec![
            Part::new("P-1", "Bolt", "Acme", UnitOfQuantity::Pieces, "AC-1").unwrap(),
            Part::new("P-2", "Cable", "Acme", UnitOfQuantity::LinearFeet, "AC-2").unwrap(),
        ])[0];
        Self { store, clock, bolt }
    }

    fn client(&self, login: &str, locks: LockSettings) -> Catalog {
        let session = SessionContext::new(login, SessionId::generate(login), Permissions::all());
        let catalog = Catalog::in_memory(&self.store, session, locks);
        catalog.open_parts().unwrap();
        catalog
    }
}

fn thirty_minutes() -> LockSettings {
    DepotConfig::from_toml_str("[locks]\ntimeout_seconds = 1800\n")
        .unwrap()
        .locks
}

#[test]
fn test_second_editor_is_turned_away_until_the_first_closes() {
    let world = World::new();
    let ana = world.client("ana", thirty_minutes());
    let ben = world.client("ben", thirty_minutes());

    let ana_bolt = ana.parts().find_by_id(world.bolt).unwrap();
    let ben_bolt = ben.parts().find_by_id(world.bolt).unwrap();

    let lease = ana.edit_part(&ana_bolt).unwrap().into_lease().unwrap();
    match ben.edit_part(&ben_bolt).unwrap() {
        LeaseOutcome::Denied { holder: Some(holder) } => {
            assert_eq!(&holder.session, ana.session().session_id());
        }
        other => panic!("expected ben to be denied, got {other:?}"),
    }

    // ana re-opening the same part is fine
    assert!(ana.locks().acquire(world.bolt).unwrap().is_granted());

    ana_bolt.edit(|p| p.set_vendor("Globex")).unwrap();
    ana.save(&ana_bolt).unwrap();
    drop(lease);

    let ben_lease = ben.edit_part(&ben_bolt).unwrap();
    assert!(ben_lease.is_granted());
    // ben's resident copy stays stale until reloaded explicitly
    assert_eq!(ben_bolt.borrow().vendor(), "Acme");
    ben_bolt.reload().unwrap();
    assert_eq!(ben_bolt.borrow().vendor(), "Globex");
}

#[test]
fn test_abandoned_lock_is_reclaimed_when_the_list_is_opened() {
    let world = World::new();
    let ana = world.client("ana", thirty_minutes());
    let bolt = ana.parts().find_by_id(world.bolt).unwrap();
    let lease = ana.edit_part(&bolt).unwrap().into_lease().unwrap();
    // ana's client dies without releasing
    std::mem::forget(lease);

    let ben = world.client("ben", thirty_minutes());
    assert!(!ben.locks().acquire(world.bolt).unwrap().is_granted());

    world.clock.advance(chrono::Duration::minutes(29));
    ben.open_parts().unwrap();
    assert!(!ben.locks().acquire(world.bolt).unwrap().is_granted());

    world.clock.advance(chrono::Duration::minutes(2));
    ben.open_parts().unwrap();
    assert!(ben.locks().acquire(world.bolt).unwrap().is_granted());
}

#[test]
fn test_sweep_on_open_can_be_disabled() {
    let world = World::new();
    let mut locks = thirty_minutes();
    locks.sweep_on_open = false;
    let ana = world.client("ana", locks);

    ana.open_parts().unwrap();
    assert_eq!(world.store.parts().calls(Operation::SweepLocks), 0);
}

#[test]
fn test_background_sweeper_runs_from_configuration() {
    let world = World::new();
    world
        .store
        .parts()
        .acquire_lock(world.bolt, Some(&SessionId::from("ghost")))
        .unwrap();
    world.clock.advance(chrono::Duration::hours(2));

    let mut locks = thirty_minutes();
    locks.sweep_interval_seconds = 1;
    locks.sweep_on_open = false;
    let mut ana = world.client("ana", locks);

    let deadline = Instant::now() + Duration::from_secs(10);
    while world.store.parts().query_lock(world.bolt).unwrap().is_some()
        && Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(world.store.parts().query_lock(world.bolt).unwrap().is_none());

    ana.shutdown().unwrap();
}

#[test]
fn test_shutdown_gives_back_every_lock() {
    let world = World::new();
    let mut ana = world.client("ana", thirty_minutes());
    for part in ana.parts().items() {
        let lease = ana.edit_part(&part).unwrap().into_lease().unwrap();
        std::mem::forget(lease);
    }
    assert_eq!(ana.locks().held().len(), 2);

    ana.shutdown().unwrap();

    let parts = world.store.parts();
    for part in ana.parts().items() {
        assert!(parts.query_lock(part.id()).unwrap().is_none());
    }
    assert!(ana.locks().held().is_empty());
}
