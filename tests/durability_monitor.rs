//! Durability monitor behaviour through the public API

mod common;

use std::time::{Duration, Instant};

use common::{add, add_with_timeout, monitor, replicas, Fault, FaultInjector, Outcome};
use wolfsync::durability::{Level, ReplicationTopology, Requirements, SyncWrite};
use wolfsync::Error;

#[test]
fn test_non_positive_seqno_never_commits_without_acks() {
    let (recorder, monitor) = monitor(replicas(&["r1", "r2"]));
    for (seqno, level) in [(0, Level::Majority), (-5, Level::PersistToMajority)] {
        let err = monitor
            .add_sync_write(SyncWrite::new(seqno, "key", Requirements::new(level)))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    assert_eq!(monitor.num_tracked(), 0);
    assert!(recorder.outcomes().is_empty());
    assert_eq!(monitor.stats().total_accepted, 0);

    // Replicas joining later start at 0 and must not cover anything either
    add(&monitor, 1, Level::Majority);
    monitor.set_replication_topology(replicas(&["r3", "r4"])).unwrap();
    assert_eq!(monitor.tracked_seqnos(), vec![1]);
    assert!(recorder.outcomes().is_empty());
}

#[test]
fn test_contiguous_ack_commits_prefix() {
    let (recorder, monitor) = monitor(replicas(&["replica"]));
    for seqno in 1..=3 {
        add(&monitor, seqno, Level::Majority);
    }

    monitor.seqno_ack_received("replica", 2, 0).unwrap();

    assert_eq!(monitor.num_tracked(), 1);
    assert_eq!(monitor.replica_memory_seqno("replica").unwrap(), 2);
    assert_eq!(monitor.replica_ack_seqno("replica").unwrap(), 2);
    assert_eq!(recorder.committed(), vec![1, 2]);
}

#[test]
fn test_sparse_ack_clamps_to_tracked_seqno() {
    let (recorder, monitor) = monitor(replicas(&["replica"]));
    for seqno in [1, 3, 5] {
        add(&monitor, seqno, Level::Majority);
    }

    monitor.seqno_ack_received("replica", 4, 0).unwrap();

    assert_eq!(monitor.replica_memory_seqno("replica").unwrap(), 3);
    assert_eq!(monitor.replica_ack_seqno("replica").unwrap(), 4);
    assert_eq!(monitor.num_tracked(), 1);
    assert_eq!(monitor.tracked_seqnos(), vec![5]);
    assert_eq!(recorder.committed(), vec![1, 3]);
}

#[test]
fn test_overshoot_ack_commits_everything() {
    let (recorder, monitor) = monitor(replicas(&["replica"]));
    for seqno in [1, 3, 5] {
        add(&monitor, seqno, Level::Majority);
    }

    monitor.seqno_ack_received("replica", 20, 0).unwrap();
    assert_eq!(monitor.num_tracked(), 0);
    assert_eq!(monitor.replica_memory_seqno("replica").unwrap(), 5);
    assert_eq!(monitor.replica_ack_seqno("replica").unwrap(), 20);
    assert_eq!(recorder.committed(), vec![1, 3, 5]);

    let err = monitor.seqno_ack_received("replica", 21, 0).unwrap_err();
    assert!(matches!(err, Error::NoTrackedWrite { seqno: 21, .. }));
}

#[test]
fn test_regressing_ack_is_stale() {
    let (_recorder, monitor) = monitor(replicas(&["replica"]));
    for seqno in 1..=3 {
        add(&monitor, seqno, Level::Majority);
    }
    monitor.seqno_ack_received("replica", 2, 0).unwrap();

    let err = monitor.seqno_ack_received("replica", 1, 0).unwrap_err();
    assert!(matches!(err, Error::StaleAck { acked: 1, recorded: 2, .. }));
    assert!(err.is_operational());

    assert_eq!(monitor.replica_memory_seqno("replica").unwrap(), 2);
    assert_eq!(monitor.replica_ack_seqno("replica").unwrap(), 2);
    assert_eq!(monitor.num_tracked(), 1);
}

#[test]
fn test_sparse_regression_is_stale() {
    let (_recorder, monitor) = monitor(replicas(&["r1", "r2", "r3"]));
    for seqno in [10, 20] {
        add(&monitor, seqno, Level::Majority);
    }
    monitor.seqno_ack_received("r1", 15, 0).unwrap();

    // Clamped position is 10, but the raw ack was 15
    let err = monitor.seqno_ack_received("r1", 12, 0).unwrap_err();
    assert!(matches!(err, Error::StaleAck { acked: 12, recorded: 15, .. }));
    assert_eq!(monitor.replica_memory_seqno("r1").unwrap(), 10);
}

#[test]
fn test_ack_with_empty_log() {
    let (_recorder, monitor) = monitor(replicas(&["replica"]));

    let err = monitor.seqno_ack_received("replica", 1, 0).unwrap_err();
    assert!(matches!(err, Error::NoTrackedWrite { ref replica, seqno: 1 } if replica == "replica"));
    assert_eq!(monitor.replica_ack_seqno("replica").unwrap(), 0);
}

#[test]
fn test_unknown_replica_is_rejected() {
    let (recorder, monitor) = monitor(replicas(&["replica"]));
    add(&monitor, 1, Level::Majority);

    let err = monitor.seqno_ack_received("ghost", 1, 0).unwrap_err();
    assert!(matches!(err, Error::UnknownReplica(ref id) if id == "ghost"));
    assert!(!err.is_fatal());
    assert_eq!(monitor.num_tracked(), 1);
    assert!(recorder.outcomes().is_empty());
    assert!(monitor.replica_ack_seqno("ghost").is_err());
}

#[test]
fn test_disk_ahead_of_memory_is_invariant_violation() {
    let (_recorder, monitor) = monitor(replicas(&["replica"]));
    add(&monitor, 1, Level::PersistToMajority);

    let err = monitor.seqno_ack_received("replica", 1, 2).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(monitor.replica_ack_seqno("replica").unwrap(), 0);
    assert_eq!(monitor.replica_disk_ack_seqno("replica").unwrap(), 0);
    assert_eq!(monitor.num_tracked(), 1);
}

#[test]
fn test_timeout_aborts_head_only() {
    let (recorder, monitor) = monitor(replicas(&["replica"]));
    let now = Instant::now();
    monitor
        .add_sync_write(SyncWrite::with_inserted_at(
            1,
            "key1",
            Requirements::with_timeout(Level::Majority, Duration::from_millis(10)),
            now,
        ))
        .unwrap();
    add(&monitor, 2, Level::Majority);

    // At the deadline the write is not yet older than its timeout
    assert_eq!(monitor.process_timeout(now + Duration::from_millis(10)), 0);
    assert_eq!(monitor.process_timeout(now + Duration::from_millis(11)), 1);
    assert_eq!(recorder.outcomes(), vec![Outcome::Abort(1)]);
    assert_eq!(monitor.tracked_seqnos(), vec![2]);
}

#[test]
fn test_expired_write_waits_behind_unexpired_head() {
    let (recorder, monitor) = monitor(replicas(&["replica"]));
    let now = Instant::now();
    for (seqno, timeout) in [(1, 100), (2, 10)] {
        monitor
            .add_sync_write(SyncWrite::with_inserted_at(
                seqno,
                format!("key{}", seqno),
                Requirements::with_timeout(Level::Majority, Duration::from_millis(timeout)),
                now,
            ))
            .unwrap();
    }

    assert_eq!(monitor.process_timeout(now + Duration::from_millis(50)), 0);
    assert_eq!(monitor.num_tracked(), 2);

    assert_eq!(monitor.process_timeout(now + Duration::from_millis(101)), 2);
    assert_eq!(recorder.outcomes(), vec![Outcome::Abort(1), Outcome::Abort(2)]);
}

#[test]
fn test_default_timeout_applies() {
    let (_recorder, monitor) = monitor(replicas(&["replica"]));
    add(&monitor, 1, Level::Majority);
    add_with_timeout(&monitor, 2, Duration::from_secs(3600));

    // Default timeout is 30s
    assert_eq!(monitor.process_timeout(Instant::now() + Duration::from_secs(29)), 0);
    assert_eq!(monitor.process_timeout(Instant::now() + Duration::from_secs(31)), 1);
    assert_eq!(monitor.tracked_seqnos(), vec![2]);
}

#[test]
fn test_majority_of_three_nodes() {
    let (recorder, monitor) = monitor(replicas(&["r1", "r2"]));
    add(&monitor, 1, Level::Majority);

    monitor.seqno_ack_received("r1", 1, 0).unwrap();
    assert_eq!(recorder.committed(), vec![1]);
}

#[test]
fn test_majority_of_four_nodes() {
    let (recorder, monitor) = monitor(replicas(&["r1", "r2", "r3"]));
    add(&monitor, 1, Level::Majority);

    monitor.seqno_ack_received("r1", 1, 0).unwrap();
    assert_eq!(monitor.num_tracked(), 1);

    monitor.seqno_ack_received("r3", 1, 0).unwrap();
    assert_eq!(recorder.committed(), vec![1]);
}

#[test]
fn test_persist_to_majority_needs_disk_ack() {
    let (recorder, monitor) = monitor(replicas(&["replica"]));
    add(&monitor, 1, Level::PersistToMajority);

    monitor.seqno_ack_received("replica", 1, 0).unwrap();
    assert_eq!(monitor.num_tracked(), 1);
    assert_eq!(monitor.replica_disk_seqno("replica").unwrap(), 0);

    monitor.seqno_ack_received("replica", 1, 1).unwrap();
    assert_eq!(recorder.committed(), vec![1]);
    assert_eq!(monitor.replica_disk_seqno("replica").unwrap(), 1);
}

#[test]
fn test_majority_and_persist_on_master_uses_memory_acks() {
    let (recorder, monitor) = monitor(replicas(&["replica"]));
    add(&monitor, 1, Level::MajorityAndPersistOnMaster);

    monitor.seqno_ack_received("replica", 1, 0).unwrap();
    assert_eq!(recorder.committed(), vec![1]);
}

#[test]
fn test_mixed_levels_stop_at_first_unsatisfied() {
    let (recorder, monitor) = monitor(replicas(&["replica"]));
    add(&monitor, 1, Level::PersistToMajority);
    add(&monitor, 2, Level::Majority);

    monitor.seqno_ack_received("replica", 2, 0).unwrap();
    assert_eq!(monitor.num_tracked(), 2);

    monitor.seqno_ack_received("replica", 2, 1).unwrap();
    assert_eq!(recorder.committed(), vec![1, 2]);
}

#[test]
fn test_unreachable_topology_aborts_everything_in_order() {
    let (recorder, monitor) = monitor(replicas(&["r1", "r2", "r3"]));
    for seqno in 1..=3 {
        add(&monitor, seqno, Level::Majority);
    }
    monitor.seqno_ack_received("r1", 3, 0).unwrap();

    monitor
        .set_replication_topology(ReplicationTopology::new(vec![Some("r1".to_string()), None, None]))
        .unwrap();

    assert_eq!(monitor.num_tracked(), 0);
    assert_eq!(
        recorder.outcomes(),
        vec![Outcome::Abort(1), Outcome::Abort(2), Outcome::Abort(3)]
    );
    assert!(!monitor.stats().quorum_reachable);
}

#[test]
fn test_undefined_slot_still_counts_toward_majority() {
    let (recorder, monitor) = monitor(replicas(&["r1"]));
    add(&monitor, 1, Level::Majority);

    // N = 3, majority 2: the active node and r1 suffice
    monitor
        .set_replication_topology(ReplicationTopology::new(vec![Some("r1".to_string()), None]))
        .unwrap();
    assert_eq!(monitor.num_tracked(), 1);

    monitor.seqno_ack_received("r1", 1, 0).unwrap();
    assert_eq!(recorder.committed(), vec![1]);
}

#[test]
fn test_shrink_to_local_only_commits_pending() {
    let (recorder, monitor) = monitor(replicas(&["replica"]));
    for seqno in 1..=2 {
        add(&monitor, seqno, Level::PersistToMajority);
    }

    monitor.set_replication_topology(ReplicationTopology::local_only()).unwrap();
    assert_eq!(monitor.num_tracked(), 0);
    assert_eq!(recorder.committed(), vec![1, 2]);
}

#[test]
fn test_topology_change_retains_watermarks() {
    let (recorder, monitor) = monitor(replicas(&["r1", "r2", "r3"]));
    for seqno in 1..=3 {
        add(&monitor, seqno, Level::Majority);
    }
    monitor.seqno_ack_received("r1", 2, 0).unwrap();
    assert!(recorder.outcomes().is_empty());

    monitor.set_replication_topology(replicas(&["r1", "r4"])).unwrap();

    assert_eq!(recorder.committed(), vec![1, 2]);
    assert_eq!(monitor.replica_ack_seqno("r1").unwrap(), 2);
    assert_eq!(monitor.replica_ack_seqno("r4").unwrap(), 0);
    assert!(matches!(
        monitor.replica_ack_seqno("r2"),
        Err(Error::UnknownReplica(_))
    ));
}

#[test]
fn test_invalid_topology_leaves_state_untouched() {
    let (_recorder, monitor) = monitor(replicas(&["r1"]));
    add(&monitor, 1, Level::Majority);

    let err = monitor.set_replication_topology(replicas(&["r1", "r1"])).unwrap_err();
    assert!(matches!(err, Error::InvalidTopology(_)));

    let err = monitor
        .set_replication_topology(replicas(&["r1", "r2", "r3", "r4"]))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTopology(_)));

    assert_eq!(monitor.topology(), replicas(&["r1"]));
    assert_eq!(monitor.num_tracked(), 1);
}

#[test]
fn test_counts_balance() {
    let (recorder, monitor) = monitor(replicas(&["replica"]));
    let now = Instant::now();
    for seqno in 1..=6 {
        add(&monitor, seqno, Level::Majority);
    }
    monitor.seqno_ack_received("replica", 3, 0).unwrap();
    monitor.process_timeout(now + Duration::from_secs(60));

    let stats = monitor.stats();
    assert_eq!(stats.total_accepted, 6);
    assert_eq!(stats.total_committed, 3);
    assert_eq!(stats.total_aborted, 3);
    assert_eq!(stats.total_timed_out, 3);
    assert_eq!(
        stats.num_tracked as u64,
        stats.total_accepted - stats.total_resolved()
    );
    assert_eq!(recorder.outcomes().len(), 6);
}

#[test]
fn test_stats_snapshot() {
    let (_recorder, monitor) = monitor(replicas(&["r1", "r2"]));
    for seqno in [2, 4] {
        add(&monitor, seqno, Level::Majority);
    }
    monitor.seqno_ack_received("r2", 3, 1).unwrap();

    let stats = monitor.stats();
    assert_eq!(stats.partition, 0);
    assert_eq!(stats.num_tracked, 1);
    assert_eq!(stats.majority, 2);
    assert_eq!(stats.high_committed_seqno, 2);
    assert_eq!(stats.replicas.len(), 2);

    let r2 = stats.replica("r2").unwrap();
    assert_eq!(r2.memory_seqno, 2);
    assert_eq!(r2.memory_ack_seqno, 3);
    assert_eq!(r2.disk_ack_seqno, 1);
    assert_eq!(stats.replica("r1").unwrap().memory_ack_seqno, 0);
}

#[test]
fn test_duplicate_acks_are_harmless() {
    let (recorder, monitor) = monitor(replicas(&["r1", "r2", "r3"]));
    for seqno in 1..=3 {
        add(&monitor, seqno, Level::Majority);
    }
    let mut transport = FaultInjector::new(&monitor);

    for result in transport.ack(Fault::Duplicate, "r1", 2, 0) {
        result.unwrap();
    }
    // One replica delivering twice is still one vote
    assert_eq!(monitor.num_tracked(), 3);

    // Write 3 stays pending, so the repeat still finds a tracked write
    for result in transport.ack(Fault::Duplicate, "r2", 2, 0) {
        result.unwrap();
    }
    assert_eq!(recorder.committed(), vec![1, 2]);
    assert_eq!(monitor.tracked_seqnos(), vec![3]);
}

#[test]
fn test_duplicate_of_committing_ack_finds_empty_log() {
    let (recorder, monitor) = monitor(replicas(&["r1", "r2", "r3"]));
    for seqno in 1..=2 {
        add(&monitor, seqno, Level::Majority);
    }
    let mut transport = FaultInjector::new(&monitor);
    transport.ack(Fault::Deliver, "r1", 2, 0)[0].as_ref().unwrap();

    let results = transport.ack(Fault::Duplicate, "r2", 2, 0);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(Error::NoTrackedWrite { seqno: 2, .. })));
    assert_eq!(recorder.committed(), vec![1, 2]);
    assert_eq!(monitor.replica_ack_seqno("r2").unwrap(), 2);
}

#[test]
fn test_reordered_ack_is_stale_without_damage() {
    let (recorder, monitor) = monitor(replicas(&["r1", "r2", "r3"]));
    for seqno in 1..=4 {
        add(&monitor, seqno, Level::Majority);
    }
    let mut transport = FaultInjector::new(&monitor);

    assert!(transport.ack(Fault::Delay, "r1", 1, 0).is_empty());
    assert_eq!(transport.num_held(), 1);

    let results = transport.ack(Fault::Deliver, "r1", 3, 0);
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(Error::StaleAck { acked: 1, recorded: 3, .. })));

    assert_eq!(monitor.replica_ack_seqno("r1").unwrap(), 3);
    assert_eq!(monitor.replica_memory_seqno("r1").unwrap(), 3);

    transport.ack(Fault::Deliver, "r2", 3, 0)[0].as_ref().unwrap();
    assert_eq!(recorder.committed(), vec![1, 2, 3]);
    assert_eq!(monitor.tracked_seqnos(), vec![4]);
}

#[test]
fn test_dropped_acks_leave_writes_pending_until_timeout() {
    let (recorder, monitor) = monitor(replicas(&["replica"]));
    add_with_timeout(&monitor, 1, Duration::from_millis(10));
    let mut transport = FaultInjector::new(&monitor);

    assert!(transport.ack(Fault::Drop, "replica", 1, 0).is_empty());
    assert_eq!(monitor.num_tracked(), 1);

    monitor.process_timeout(Instant::now() + Duration::from_millis(20));
    assert_eq!(recorder.aborted(), vec![1]);
}
