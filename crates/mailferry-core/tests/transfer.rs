//! Transfer engine behavior against in-memory stores.

#![allow(clippy::unwrap_used)]

mod common;

use common::{MemoryServer, fast_config, message};
use mailferry_core::{
    DedupIndex, DedupStrategy, Error, MailboxPair, MessageIdentity, PairSelection, RetryPolicy,
    Session, TransferConfig, Warning, run_transfer,
};
use mailferry_imap::Flag;

fn inbox_pair() -> PairSelection {
    PairSelection::Explicit(vec![MailboxPair::new("INBOX", "INBOX")])
}

fn seeded_source(count: usize) -> MemoryServer {
    let source = MemoryServer::new().with_mailbox("INBOX");
    for i in 0..count {
        source.add(
            "INBOX",
            message(Some(&format!("<{i}@example.com>")), &format!("message {i}")),
            vec![Flag::Seen],
        );
    }
    source
}

#[tokio::test]
async fn second_run_only_finds_duplicates() {
    let source = seeded_source(3);
    let dest = MemoryServer::new().with_mailbox("INBOX");
    let config = fast_config();

    let first = run_transfer(source.connector("src"), dest.connector("dst"), inbox_pair(), &config)
        .await
        .unwrap();
    assert!(first.is_success());
    assert_eq!(first.totals().transferred, 3);
    assert_eq!(first.totals().duplicates, 0);
    assert!(first.totals().bytes > 0);

    let second = run_transfer(source.connector("src"), dest.connector("dst"), inbox_pair(), &config)
        .await
        .unwrap();
    assert_eq!(second.totals().transferred, 0);
    assert_eq!(second.totals().duplicates, 3);
    assert_eq!(dest.count("INBOX"), 3);
}

#[tokio::test]
async fn materialized_index_also_dedups() {
    let source = seeded_source(4);
    let dest = MemoryServer::new().with_mailbox("INBOX");
    dest.add("INBOX", message(Some("<1@example.com>"), "already there"), Vec::new());
    let config = TransferConfig {
        dedup: DedupStrategy::Materialize,
        ..fast_config()
    };

    let report = run_transfer(source.connector("src"), dest.connector("dst"), inbox_pair(), &config)
        .await
        .unwrap();
    assert_eq!(report.totals().transferred, 3);
    assert_eq!(report.totals().duplicates, 1);
    assert_eq!(dest.count("INBOX"), 4);
}

#[tokio::test]
async fn messages_without_message_id_are_never_duplicates() {
    let source = MemoryServer::new().with_mailbox("INBOX");
    source.add("INBOX", message(None, "anonymous"), Vec::new());
    let dest = MemoryServer::new().with_mailbox("INBOX");
    let config = fast_config();

    for _ in 0..2 {
        let report =
            run_transfer(source.connector("src"), dest.connector("dst"), inbox_pair(), &config)
                .await
                .unwrap();
        assert_eq!(report.totals().transferred, 1);
        assert_eq!(report.totals().duplicates, 0);
    }
    assert_eq!(dest.count("INBOX"), 2);
}

#[tokio::test]
async fn identity_exists_only_after_append() {
    let dest = MemoryServer::new().with_mailbox("INBOX");
    let mut session = Session::connect(dest.connector("dst"), RetryPolicy::default())
        .await
        .unwrap();
    let raw = message(Some("<stable@example.com>"), "hello");
    let identity = MessageIdentity::from_message(&raw);
    let index = DedupIndex::search();

    assert!(!index.exists_in_target(&mut session, "INBOX", &identity).await.unwrap());
    session.append("INBOX", &raw, &[]).await.unwrap();
    assert!(index.exists_in_target(&mut session, "INBOX", &identity).await.unwrap());

    let none = MessageIdentity::NoIdentity;
    assert!(!index.exists_in_target(&mut session, "INBOX", &none).await.unwrap());
}

#[tokio::test]
async fn recent_flag_never_reaches_append() {
    let source = seeded_source(2);
    let dest = MemoryServer::new().with_mailbox("INBOX");

    let report = run_transfer(
        source.connector("src"),
        dest.connector("dst"),
        inbox_pair(),
        &fast_config(),
    )
    .await
    .unwrap();
    assert_eq!(report.totals().transferred, 2);

    let appended = dest.appended();
    assert_eq!(appended.len(), 2);
    for (_, flags) in appended {
        assert_eq!(flags, vec![Flag::Seen]);
    }
}

#[tokio::test]
async fn auto_match_pairs_by_role() {
    let source = MemoryServer::new().with_mailbox("INBOX").with_mailbox("Sent");
    source.add("Sent", message(Some("<s@example.com>"), "sent"), Vec::new());
    let dest = MemoryServer::new()
        .with_mailbox("INBOX")
        .with_mailbox("Sent Items")
        .with_mailbox("Archive");

    let report = run_transfer(
        source.connector("src"),
        dest.connector("dst"),
        PairSelection::AutoMatch,
        &fast_config(),
    )
    .await
    .unwrap();

    let pairs: Vec<_> = report
        .pairs
        .iter()
        .map(|p| (p.source.as_str(), p.destination.as_str()))
        .collect();
    assert_eq!(pairs, [("INBOX", "INBOX"), ("Sent", "Sent Items")]);
    assert_eq!(dest.count("Sent Items"), 1);
    assert_eq!(dest.count("Archive"), 0);
}

#[tokio::test]
async fn nothing_matched_is_an_empty_report() {
    let source = MemoryServer::new().with_mailbox("Receipts");
    let dest = MemoryServer::new().with_mailbox("Other");

    let report = run_transfer(
        source.connector("src"),
        dest.connector("dst"),
        PairSelection::AutoMatch,
        &fast_config(),
    )
    .await
    .unwrap();
    assert!(report.pairs.is_empty());
    assert!(report.is_success());
}

#[tokio::test]
async fn dropped_connection_reconnects_once_without_reprocessing() {
    let source = seeded_source(5);
    let dest = MemoryServer::new().with_mailbox("INBOX");
    dest.drop_after_appends(2);

    let report = run_transfer(
        source.connector("src"),
        dest.connector("dst"),
        inbox_pair(),
        &fast_config(),
    )
    .await
    .unwrap();

    assert!(report.is_success());
    assert_eq!(report.totals().transferred, 5);
    assert_eq!(dest.count("INBOX"), 5);
    // Initial connect plus exactly one reconnect.
    assert_eq!(dest.connects(), 2);
    assert_eq!(source.connects(), 1);
    for uid in 1..=5 {
        assert_eq!(source.fetch_count("INBOX", uid), 1, "uid {uid}");
    }
}

#[tokio::test]
async fn failed_duplicate_check_appends_with_warning() {
    let source = seeded_source(1);
    let dest = MemoryServer::new().with_mailbox("INBOX");
    dest.add("INBOX", message(Some("<0@example.com>"), "copy"), Vec::new());
    dest.fail_header_searches(3);

    let report = run_transfer(
        source.connector("src"),
        dest.connector("dst"),
        inbox_pair(),
        &fast_config(),
    )
    .await
    .unwrap();

    assert!(report.is_success());
    assert_eq!(report.totals().transferred, 1);
    assert_eq!(dest.count("INBOX"), 2);
    assert!(matches!(
        report.warnings.as_slice(),
        [Warning::DuplicateCheckDegraded { message_id, .. }] if message_id == "<0@example.com>"
    ));
}

#[tokio::test]
async fn transient_fetch_failures_are_retried() {
    let source = seeded_source(1);
    source.fail_fetches(2);
    let dest = MemoryServer::new().with_mailbox("INBOX");

    let report = run_transfer(
        source.connector("src"),
        dest.connector("dst"),
        inbox_pair(),
        &fast_config(),
    )
    .await
    .unwrap();
    assert!(report.is_success());
    assert_eq!(report.totals().transferred, 1);
}

#[tokio::test]
async fn exhausted_retries_fail_only_that_pair() {
    let source = seeded_source(2).with_mailbox("Sent");
    source.add("Sent", message(Some("<sent@example.com>"), "sent"), Vec::new());
    source.fail_fetches(3);
    let dest = MemoryServer::new().with_mailbox("INBOX").with_mailbox("Sent");

    let selection = PairSelection::Explicit(vec![
        MailboxPair::new("INBOX", "INBOX"),
        MailboxPair::new("Sent", "Sent"),
    ]);
    let report = run_transfer(source.connector("src"), dest.connector("dst"), selection, &fast_config())
        .await
        .unwrap();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].source, "INBOX");
    assert!(!report.errors[0].fatal);
    assert!(report.errors[0].error.contains("fetch failed after 3 attempts"));
    assert!(!report.aborted());
    assert_eq!(report.pairs.len(), 2);
    assert_eq!(report.pairs[1].record.transferred, 1);
    assert_eq!(dest.count("Sent"), 1);
}

#[tokio::test]
async fn transient_append_failures_are_retried() {
    let source = seeded_source(2);
    let dest = MemoryServer::new().with_mailbox("INBOX");
    dest.fail_appends(2);

    let report = run_transfer(
        source.connector("src"),
        dest.connector("dst"),
        inbox_pair(),
        &fast_config(),
    )
    .await
    .unwrap();
    assert!(report.is_success());
    assert_eq!(report.totals().transferred, 2);
    assert_eq!(dest.count("INBOX"), 2);
    assert_eq!(dest.connects(), 1);
}

#[tokio::test]
async fn exhausted_append_retries_fail_the_pair() {
    let source = seeded_source(2);
    let dest = MemoryServer::new().with_mailbox("INBOX");
    dest.fail_appends(3);

    let report = run_transfer(
        source.connector("src"),
        dest.connector("dst"),
        inbox_pair(),
        &fast_config(),
    )
    .await
    .unwrap();
    assert_eq!(report.errors.len(), 1);
    assert!(!report.errors[0].fatal);
    assert!(report.errors[0].error.contains("append failed after 3 attempts"));
    assert_eq!(dest.count("INBOX"), 0);
}

#[tokio::test]
async fn materialize_failure_falls_back_to_search() {
    let dest = MemoryServer::new().with_mailbox("INBOX");
    dest.add("INBOX", message(Some("<1@example.com>"), "already there"), Vec::new());
    dest.fail_id_fetches(3);

    let policy = RetryPolicy::from_config(&fast_config());
    let mut session = Session::connect(dest.connector("dst"), policy).await.unwrap();
    let index = DedupIndex::prepare(&mut session, "INBOX", DedupStrategy::Materialize)
        .await
        .unwrap();
    assert!(!index.is_materialized());
    let known = MessageIdentity::MessageId("<1@example.com>".into());
    assert!(index.exists_in_target(&mut session, "INBOX", &known).await.unwrap());

    // The same fallback inside a run still finds the duplicate.
    dest.fail_id_fetches(3);
    let config = TransferConfig {
        dedup: DedupStrategy::Materialize,
        ..fast_config()
    };
    let source = seeded_source(3);
    let report = run_transfer(source.connector("src"), dest.connector("dst"), inbox_pair(), &config)
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(report.totals().transferred, 2);
    assert_eq!(report.totals().duplicates, 1);
}

#[tokio::test]
async fn lookalike_message_ids_are_not_duplicates() {
    for strategy in [DedupStrategy::Search, DedupStrategy::Materialize] {
        let source = MemoryServer::new().with_mailbox("INBOX");
        source.add("INBOX", message(Some("<1234@host>"), "original"), Vec::new());
        let dest = MemoryServer::new().with_mailbox("INBOX");
        dest.add("INBOX", message(Some("<x<1234@host>>"), "lookalike"), Vec::new());
        let config = TransferConfig {
            dedup: strategy,
            ..fast_config()
        };

        let report =
            run_transfer(source.connector("src"), dest.connector("dst"), inbox_pair(), &config)
                .await
                .unwrap();
        assert_eq!(report.totals().transferred, 1, "{strategy:?}");
        assert_eq!(report.totals().duplicates, 0, "{strategy:?}");
        assert_eq!(dest.count("INBOX"), 2);
    }
}

#[tokio::test]
async fn missing_destination_mailbox_is_a_pair_failure() {
    let source = seeded_source(1).with_mailbox("Projects");
    source.add("Projects", message(Some("<p@example.com>"), "p"), Vec::new());
    let dest = MemoryServer::new().with_mailbox("INBOX");

    let selection = PairSelection::Explicit(vec![
        MailboxPair::new("Projects", "Projects"),
        MailboxPair::new("INBOX", "INBOX"),
    ]);
    let report = run_transfer(source.connector("src"), dest.connector("dst"), selection, &fast_config())
        .await
        .unwrap();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].destination, "Projects");
    assert_eq!(report.pairs[1].record.transferred, 1);
    assert_eq!(dest.connects(), 1);
}

#[tokio::test]
async fn unreachable_endpoint_is_fatal() {
    let source = seeded_source(1);
    let dest = MemoryServer::new().with_mailbox("INBOX");
    dest.refuse_connects();

    let err = run_transfer(source.connector("src"), dest.connector("dst"), inbox_pair(), &fast_config())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn lost_connection_mid_run_aborts_remaining_pairs() {
    let source = seeded_source(1).with_mailbox("Sent").with_mailbox("Trash");
    let dest = MemoryServer::new()
        .with_mailbox("INBOX")
        .with_mailbox("Sent")
        .with_mailbox("Trash");
    dest.drop_after_appends(1);
    dest.limit_connects(1);

    let selection = PairSelection::Explicit(vec![
        MailboxPair::new("INBOX", "INBOX"),
        MailboxPair::new("Sent", "Sent"),
        MailboxPair::new("Trash", "Trash"),
    ]);
    let report = run_transfer(source.connector("src"), dest.connector("dst"), selection, &fast_config())
        .await
        .unwrap();

    assert!(report.aborted());
    assert_eq!(report.pairs[0].record.transferred, 1);
    // The completed pair stays; the failing one is reported; the rest is skipped.
    assert_eq!(report.pairs.len(), 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].source, "Sent");
    assert!(report.errors[0].fatal);
    assert_eq!(dest.count("INBOX"), 1);
}

#[tokio::test]
async fn uid_prefilter_skips_colliding_uids() {
    let source = seeded_source(3);
    let dest = MemoryServer::new().with_mailbox("INBOX");
    dest.add("INBOX", message(Some("<other@example.com>"), "unrelated"), Vec::new());
    let config = TransferConfig {
        uid_prefilter: true,
        ..fast_config()
    };

    let report = run_transfer(source.connector("src"), dest.connector("dst"), inbox_pair(), &config)
        .await
        .unwrap();
    assert_eq!(report.totals().prefiltered, 1);
    assert_eq!(report.totals().transferred, 2);
}

#[tokio::test]
async fn advisory_noops_every_interval() {
    let source = seeded_source(4);
    let dest = MemoryServer::new().with_mailbox("INBOX");
    let config = TransferConfig {
        keepalive_interval: 2,
        ..fast_config()
    };

    let report = run_transfer(source.connector("src"), dest.connector("dst"), inbox_pair(), &config)
        .await
        .unwrap();
    assert_eq!(report.totals().transferred, 4);
    // Every call checks liveness first; the keepalive adds one NOOP per interval.
    assert!(source.noops() >= 2);
}

#[tokio::test]
async fn uid_validity_change_is_reported() {
    let server = seeded_source(2);
    let mut session = Session::connect(server.connector("src"), RetryPolicy::default())
        .await
        .unwrap();
    session.select("INBOX").await.unwrap();

    server.set_uid_validity("INBOX", 42);
    server.drop_connections();
    let uids = session.search_all().await.unwrap();

    assert_eq!(uids.len(), 2);
    assert_eq!(session.reconnect_count(), 1);
    assert_eq!(session.selected(), Some("INBOX"));
    assert!(matches!(
        session.take_warnings().as_slice(),
        [Warning::UidValidityChanged { mailbox }] if mailbox == "INBOX"
    ));
}

#[tokio::test]
async fn healthy_session_never_reconnects() {
    let server = seeded_source(1);
    let mut session = Session::connect(server.connector("src"), RetryPolicy::default())
        .await
        .unwrap();
    session.select("INBOX").await.unwrap();
    session.search_all().await.unwrap();
    session.probe().await;
    assert_eq!(session.reconnect_count(), 0);
    assert!(session.take_warnings().is_empty());
}
