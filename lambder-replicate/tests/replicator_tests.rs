// Replicator Tests
// End-to-end runs over in-memory source and destination regions

use lambder_replicate::{
    MemoryStore, MissingGroupPolicy, ReplicationError, ReplicationOutcome, Replicator,
    ReplicatorConfig, Snapshot, StoreError,
};
use std::sync::Arc;

const SOURCE: &str = "us-east-1";
const DEST: &str = "us-west-2";
const REPLICATE_TAG: &str = "LambderReplicate";
const BACKUP_TAG: &str = "LambderBackup";

fn tagged(id: &str, group: &str) -> Snapshot {
    Snapshot::new(id, SOURCE)
        .with_tag(REPLICATE_TAG, "x")
        .with_tag(BACKUP_TAG, group)
}

fn build_replicator(
    config: ReplicatorConfig,
    source: &Arc<MemoryStore>,
    destination: &Arc<MemoryStore>,
) -> Replicator {
    Replicator::new(config, source.clone(), destination.clone())
}

fn setup(snapshots: Vec<Snapshot>) -> (Replicator, Arc<MemoryStore>, Arc<MemoryStore>) {
    let source = Arc::new(MemoryStore::new(SOURCE));
    for snapshot in snapshots {
        source.insert(snapshot);
    }
    let destination = Arc::new(MemoryStore::new(DEST));
    let replicator = build_replicator(ReplicatorConfig::new(SOURCE, DEST), &source, &destination);
    (replicator, source, destination)
}

#[tokio::test]
async fn test_copies_missing_replica() {
    let (replicator, _source, destination) = setup(vec![tagged("snap-1", "nightly")]);

    let report = replicator.run().await.unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.copied, 1);

    let copies = destination.copies();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].source_region, SOURCE);
    assert_eq!(copies[0].source_snapshot_id, "snap-1");
    assert_eq!(copies[0].description, "us-east-1_snap-1_nightly");

    let replicas = destination.find_by_description("us-east-1_snap-1_nightly");
    assert_eq!(replicas.len(), 1);
    assert_eq!(replicas[0].region, DEST);
    assert_eq!(
        replicas[0].tags.get(REPLICATE_TAG),
        Some("us-east-1_snap-1_nightly")
    );
    assert_eq!(replicas[0].tags.get(BACKUP_TAG), Some("nightly"));
    assert_eq!(replicas[0].tags.len(), 2);
}

#[tokio::test]
async fn test_existing_replica_is_not_copied() {
    let (replicator, _source, destination) = setup(vec![tagged("snap-1", "nightly")]);
    destination.insert(Snapshot::new("snap-dr", DEST).with_description("us-east-1_snap-1_nightly"));

    let report = replicator.run().await.unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.already_replicated, 1);
    assert_eq!(report.copied, 0);

    let counts = destination.counts();
    assert_eq!(counts.list_by_description, 1);
    assert_eq!(counts.copy, 0);
    assert_eq!(counts.create_tags, 0);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let (replicator, _source, destination) = setup(vec![
        tagged("snap-1", "nightly"),
        tagged("snap-2", "weekly"),
    ]);

    let first = replicator.run().await.unwrap();
    assert_eq!(first.copied, 2);

    let second = replicator.run().await.unwrap();
    assert_eq!(second.copied, 0);
    assert_eq!(second.already_replicated, 2);

    assert_eq!(destination.counts().copy, 2);
    assert_eq!(destination.find_by_description("us-east-1_snap-1_nightly").len(), 1);
    assert_eq!(destination.find_by_description("us-east-1_snap-2_weekly").len(), 1);
}

#[tokio::test]
async fn test_only_tagged_snapshots_are_candidates() {
    let (replicator, _source, destination) = setup(vec![
        tagged("snap-1", "nightly"),
        Snapshot::new("snap-2", SOURCE).with_tag(BACKUP_TAG, "nightly"),
        Snapshot::new("snap-3", SOURCE),
    ]);

    let candidates = replicator.discover_candidates().await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].id, "snap-1");

    let report = replicator.run().await.unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.copied, 1);

    assert_eq!(
        destination.description_lookups(),
        vec!["us-east-1_snap-1_nightly".to_string()]
    );
    assert_eq!(destination.copies().len(), 1);
    assert_eq!(destination.copies()[0].source_snapshot_id, "snap-1");
}

#[tokio::test]
async fn test_replicate_tag_value_is_not_propagated() {
    let source_snapshot = Snapshot::new("snap-1", SOURCE)
        .with_tag(REPLICATE_TAG, "please-copy")
        .with_tag(BACKUP_TAG, "nightly");
    let (replicator, _source, destination) = setup(vec![source_snapshot.clone()]);

    let outcome = replicator
        .copy_snapshot_if_missing(&source_snapshot)
        .await
        .unwrap();

    let (destination_id, fingerprint) = match outcome {
        ReplicationOutcome::Copied {
            destination_id,
            fingerprint,
        } => (destination_id, fingerprint),
        other => panic!("expected a copy, got {:?}", other),
    };
    assert_eq!(fingerprint.as_str(), "us-east-1_snap-1_nightly");

    let replica = destination.get(&destination_id).unwrap();
    assert_eq!(replica.tags.get(REPLICATE_TAG), Some(fingerprint.as_str()));
    assert_eq!(replica.tags.get(BACKUP_TAG), Some("nightly"));
}

#[tokio::test]
async fn test_missing_backup_group_is_skipped() {
    let (replicator, _source, destination) = setup(vec![
        Snapshot::new("snap-1", SOURCE).with_tag(REPLICATE_TAG, "x"),
        tagged("snap-2", "nightly"),
    ]);

    let report = replicator.run().await.unwrap();
    assert_eq!(report.candidates, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.copied, 1);

    // The skipped snapshot is never looked up or copied
    assert_eq!(
        destination.description_lookups(),
        vec!["us-east-1_snap-2_nightly".to_string()]
    );
    assert_eq!(destination.copies().len(), 1);
}

#[tokio::test]
async fn test_missing_backup_group_with_empty_segment() {
    let source = Arc::new(MemoryStore::new(SOURCE));
    source.insert(Snapshot::new("snap-1", SOURCE).with_tag(REPLICATE_TAG, "x"));
    let destination = Arc::new(MemoryStore::new(DEST));

    let mut config = ReplicatorConfig::new(SOURCE, DEST);
    config.missing_group = MissingGroupPolicy::EmptySegment;
    let replicator = build_replicator(config, &source, &destination);

    let report = replicator.run().await.unwrap();
    assert_eq!(report.copied, 1);

    let replicas = destination.find_by_description("us-east-1_snap-1_");
    assert_eq!(replicas.len(), 1);
    assert_eq!(replicas[0].tags.get(REPLICATE_TAG), Some("us-east-1_snap-1_"));
    assert_eq!(replicas[0].tags.get(BACKUP_TAG), Some(""));
}

#[tokio::test]
async fn test_copy_failure_aborts_run() {
    let source = Arc::new(MemoryStore::new(SOURCE));
    for (id, group) in [("snap-1", "a"), ("snap-2", "b"), ("snap-3", "c")] {
        source.insert(tagged(id, group));
    }
    let destination = Arc::new(MemoryStore::new(DEST).fail_copy_at(2));
    let replicator = build_replicator(ReplicatorConfig::new(SOURCE, DEST), &source, &destination);

    let err = replicator.run().await.unwrap_err();
    match &err {
        ReplicationError::Snapshot {
            snapshot_id,
            source: StoreError::Remote { operation, .. },
        } => {
            assert_eq!(snapshot_id, "snap-2");
            assert_eq!(*operation, "CopySnapshot");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.to_string().contains("RequestLimitExceeded"));

    // Candidate 1 stays fully replicated
    let replicas = destination.find_by_description("us-east-1_snap-1_a");
    assert_eq!(replicas.len(), 1);
    assert_eq!(replicas[0].tags.get(BACKUP_TAG), Some("a"));

    // Candidate 3 is never reached
    let counts = destination.counts();
    assert_eq!(counts.list_by_description, 2);
    assert_eq!(counts.copy, 2);
    assert_eq!(counts.create_tags, 1);
    assert!(
        !destination
            .description_lookups()
            .contains(&"us-east-1_snap-3_c".to_string())
    );
}

#[tokio::test]
async fn test_discovery_failure_aborts_run() {
    let source = Arc::new(MemoryStore::new(SOURCE).fail_listing());
    let destination = Arc::new(MemoryStore::new(DEST));
    let replicator = build_replicator(ReplicatorConfig::new(SOURCE, DEST), &source, &destination);

    let err = replicator.run().await.unwrap_err();
    assert!(matches!(err, ReplicationError::Discovery(_)));
    assert_eq!(destination.counts().list_by_description, 0);
}

#[tokio::test]
async fn test_multiple_replicas_are_accepted() {
    let (replicator, _source, destination) = setup(vec![tagged("snap-1", "nightly")]);
    for id in ["snap-dr-1", "snap-dr-2"] {
        destination.insert(Snapshot::new(id, DEST).with_description("us-east-1_snap-1_nightly"));
    }

    assert_eq!(
        replicator
            .find_existing_replica("snap-1", "nightly")
            .await
            .unwrap(),
        2
    );

    let outcome = replicator
        .copy_snapshot_if_missing(&tagged("snap-1", "nightly"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReplicationOutcome::AlreadyReplicated { replicas: 2, .. }
    ));
    assert_eq!(destination.counts().copy, 0);
}

#[tokio::test]
async fn test_dry_run_copies_nothing() {
    let source = Arc::new(MemoryStore::new(SOURCE));
    source.insert(tagged("snap-1", "nightly"));
    source.insert(tagged("snap-2", "nightly"));
    let destination = Arc::new(MemoryStore::new(DEST));
    destination.insert(Snapshot::new("snap-dr", DEST).with_description("us-east-1_snap-2_nightly"));

    let mut config = ReplicatorConfig::new(SOURCE, DEST);
    config.dry_run = true;
    let replicator = build_replicator(config, &source, &destination);

    let report = replicator.run().await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.would_copy, 1);
    assert_eq!(report.already_replicated, 1);
    assert_eq!(report.copied, 0);

    let counts = destination.counts();
    assert_eq!(counts.copy, 0);
    assert_eq!(counts.create_tags, 0);
}

#[tokio::test]
async fn test_custom_tag_keys() {
    let source = Arc::new(MemoryStore::new(SOURCE));
    source.insert(
        Snapshot::new("snap-1", SOURCE)
            .with_tag("DrCopy", "yes")
            .with_tag("BackupJob", "db"),
    );
    source.insert(tagged("snap-2", "nightly"));
    let destination = Arc::new(MemoryStore::new(DEST));

    let mut config = ReplicatorConfig::new(SOURCE, DEST);
    config.tags.replicate_tag = "DrCopy".to_string();
    config.tags.backup_tag = "BackupJob".to_string();
    let replicator = build_replicator(config, &source, &destination);

    let report = replicator.run().await.unwrap();
    assert_eq!(report.candidates, 1);

    let replicas = destination.find_by_description("us-east-1_snap-1_db");
    assert_eq!(replicas.len(), 1);
    assert_eq!(replicas[0].tags.get("DrCopy"), Some("us-east-1_snap-1_db"));
    assert_eq!(replicas[0].tags.get("BackupJob"), Some("db"));
}

#[tokio::test]
async fn test_resolve_backup_group_and_fingerprint() {
    let (replicator, _source, _destination) = setup(vec![]);

    let snapshot = tagged("snap-9", "hourly");
    assert_eq!(replicator.resolve_backup_group(&snapshot), Some("hourly"));
    assert_eq!(
        replicator.resolve_backup_group(&Snapshot::new("snap-0", SOURCE)),
        None
    );

    assert_eq!(
        replicator.fingerprint("snap-9", "hourly").as_str(),
        "us-east-1_snap-9_hourly"
    );
    assert_eq!(
        replicator.fingerprint("snap-9", "hourly"),
        replicator.fingerprint("snap-9", "hourly")
    );
}

#[tokio::test]
async fn test_empty_source() {
    let (replicator, _source, destination) = setup(vec![]);

    let report = replicator.run().await.unwrap();
    assert_eq!(report.candidates, 0);
    assert!(report.finished_at >= report.started_at);
    assert_eq!(destination.counts().list_by_description, 0);
}

#[tokio::test]
async fn test_report_serializes() {
    let (replicator, _source, _destination) = setup(vec![tagged("snap-1", "nightly")]);
    let report = replicator.run().await.unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["source_region"], SOURCE);
    assert_eq!(json["dest_region"], DEST);
    assert_eq!(json["candidates"], 1);
    assert_eq!(json["copied"], 1);
}
