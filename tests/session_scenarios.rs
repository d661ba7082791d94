//! Protocol-level scenarios: a session served on one end of an in-process
//! channel, driven by raw envelopes on the other.

use std::thread::{self, JoinHandle};

use proofreader::prelude::*;
use serde_json::json;

/// Fragments 1-2-3-4 in a row.
fn chain_labels() -> LabelVolume {
    LabelVolume::new(vec![1, 4], vec![1, 2, 3, 4]).unwrap()
}

fn test_config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.forest.n_trees = 10;
    config.seed = 7;
    config
}

fn spawn_session(
    labels: LabelVolume,
    config: SessionConfig,
) -> (MemoryChannel, JoinHandle<(Result<()>, ProofreadingSession)>) {
    let (client, mut server) = MemoryChannel::pair();
    let handle = thread::spawn(move || {
        let mut session =
            ProofreadingSession::new(&labels, &ImageVolume::empty(), config).unwrap();
        let outcome = session.listen(&mut server);
        (outcome, session)
    });
    (client, handle)
}

fn request(client: &mut MemoryChannel) -> LookupTable {
    client.send(&Envelope::request_lut()).unwrap();
    LookupTable::from_envelope(&client.recv().unwrap()).unwrap()
}

fn stop(
    client: &mut MemoryChannel,
    handle: JoinHandle<(Result<()>, ProofreadingSession)>,
) -> ProofreadingSession {
    client.send(&Envelope::stop()).unwrap();
    let (outcome, session) = handle.join().unwrap();
    outcome.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
    session
}

#[test]
fn test_end_to_end_two_groups() {
    let (mut client, handle) = spawn_session(chain_labels(), test_config());
    client.send(&Envelope::merge(&[1, 2])).unwrap();
    client.send(&Envelope::separate(2, 3)).unwrap();
    client.send(&Envelope::merge(&[3, 4])).unwrap();
    let table = request(&mut client);

    assert_eq!(table.fragments, vec![1, 2, 3, 4]);
    assert_eq!(table.segment_of(1), table.segment_of(2));
    assert_eq!(table.segment_of(3), table.segment_of(4));
    assert_ne!(table.segment_of(1), table.segment_of(3));

    let session = stop(&mut client, handle);
    assert_eq!(session.log().merges().len(), 2);
    assert_eq!(session.log().separations().len(), 1);
}

#[test]
fn test_merge_chain_adds_k_minus_one_examples() {
    let labels = LabelVolume::new(vec![1, 6], vec![1, 2, 3, 4, 5, 6]).unwrap();
    let (mut client, handle) = spawn_session(labels, test_config());
    client.send(&Envelope::merge(&[5, 2, 4, 3])).unwrap();
    let session = stop(&mut client, handle);

    assert_eq!(session.log().merges().len(), 3);
    assert_eq!(session.log().len(), 3);
    assert!(session.log().targets().iter().all(|&t| t == Label::Merge));
}

#[test]
fn test_boundary_separation_is_noop() {
    let labels = LabelVolume::new(vec![1, 5], vec![1, 2, 0, 3, 4]).unwrap();
    let (mut client, handle) = spawn_session(labels, test_config());
    client.send(&Envelope::separate(2, 0)).unwrap();
    client.send(&Envelope::separate(0, 3)).unwrap();
    let session = stop(&mut client, handle);

    assert!(session.log().is_empty());
    assert!(session.log().separations().is_empty());
    assert_eq!(session.stats().ignored_separations, 2);
}

#[test]
fn test_repeated_requests_are_identical() {
    let (mut client, handle) = spawn_session(chain_labels(), test_config());
    client.send(&Envelope::merge(&[1, 2])).unwrap();
    client.send(&Envelope::separate(2, 3)).unwrap();
    let first = request(&mut client);
    let second = request(&mut client);
    assert_eq!(first, second);
    stop(&mut client, handle);
}

#[test]
fn test_every_fragment_covered() {
    let labels = LabelVolume::new(vec![2, 3], vec![1, 2, 3, 4, 0, 6]).unwrap();
    let (mut client, handle) = spawn_session(labels, test_config());
    client.send(&Envelope::merge(&[1, 2, 4])).unwrap();
    client.send(&Envelope::separate(3, 2)).unwrap();
    client.send(&Envelope::separate(4, 0)).unwrap();
    let table = request(&mut client);

    assert_eq!(table.fragments, vec![1, 2, 3, 4, 6]);
    assert_eq!(table.segments.len(), 5);
    stop(&mut client, handle);
}

#[test]
fn test_disconnected_merge_ends_session() {
    let (mut client, handle) = spawn_session(chain_labels(), test_config());
    client.send(&Envelope::merge(&[1, 4])).unwrap();

    let (outcome, session) = handle.join().unwrap();
    assert!(matches!(outcome, Err(ProofreadError::InvalidSelection(_))));
    assert!(session.log().is_empty());
    assert!(matches!(client.recv(), Err(ProofreadError::ChannelClosed)));
}

#[test]
fn test_exclusions_hold_after_relearn() {
    // Segments 1 and 3 carry a common exclusion after the rebuild.
    let labels = LabelVolume::new(vec![1, 6], vec![1, 2, 3, 4, 5, 6]).unwrap();
    let (mut client, handle) = spawn_session(labels, test_config());
    client.send(&Envelope::merge(&[1, 2])).unwrap();
    client.send(&Envelope::merge(&[3, 4])).unwrap();
    client.send(&Envelope::separate(2, 3)).unwrap();
    let table = request(&mut client);

    assert_ne!(table.segment_of(2), table.segment_of(3));
    stop(&mut client, handle);
}

#[test]
fn test_split_inside_merged_segment_survives_request() {
    let (mut client, handle) = spawn_session(chain_labels(), test_config());
    client.send(&Envelope::merge(&[1, 2, 3, 4])).unwrap();
    client.send(&Envelope::separate(2, 3)).unwrap();
    let table = request(&mut client);

    assert_eq!(table.segment_of(1), table.segment_of(2));
    assert_ne!(table.segment_of(2), table.segment_of(3));
    // 4 only touches 1 through 3.
    assert_ne!(table.segment_of(1), table.segment_of(4));

    let session = stop(&mut client, handle);
    assert_eq!(session.graph().find(2).unwrap(), 1);
    assert_ne!(session.graph().find(3).unwrap(), 1);
}

#[test]
fn test_merge_after_separation_survives_request() {
    let (mut client, handle) = spawn_session(chain_labels(), test_config());
    client.send(&Envelope::merge(&[1, 2])).unwrap();
    client.send(&Envelope::separate(1, 2)).unwrap();
    client.send(&Envelope::merge(&[1, 2])).unwrap();
    let first = request(&mut client);
    assert_eq!(first.segment_of(1), first.segment_of(2));

    let second = request(&mut client);
    assert_eq!(first, second);

    let session = stop(&mut client, handle);
    assert_eq!(session.log().merges().len(), 2);
    assert_eq!(session.log().separations().len(), 1);
}

#[test]
fn test_unknown_messages_ignored_by_default() {
    let (mut client, handle) = spawn_session(chain_labels(), test_config());
    client
        .send(&Envelope::new("split", json!({ "segments": [1] })))
        .unwrap();
    client
        .send(&Envelope::new("request", json!({ "what": "everything" })))
        .unwrap();
    client.send(&Envelope::merge(&[1, 2])).unwrap();
    let table = request(&mut client);
    assert_eq!(table.segment_of(1), table.segment_of(2));

    let session = stop(&mut client, handle);
    assert_eq!(session.stats().unknown_commands, 1);
}

#[test]
fn test_unknown_message_stops_strict_session() {
    let mut config = test_config();
    config.strict_commands = true;
    let (mut client, handle) = spawn_session(chain_labels(), config);
    client.send(&Envelope::new("split", json!({}))).unwrap();

    let (outcome, session) = handle.join().unwrap();
    outcome.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_resume_from_saved_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrections.json");

    let (mut client, handle) = spawn_session(chain_labels(), test_config());
    client.send(&Envelope::merge(&[3, 4])).unwrap();
    client.send(&Envelope::separate(2, 3)).unwrap();
    let session = stop(&mut client, handle);
    session.log().save(&path).unwrap();

    let resumed = ProofreadingSession::new(&chain_labels(), &ImageVolume::empty(), test_config())
        .unwrap()
        .with_log(CorrectionLog::load(&path).unwrap())
        .unwrap();
    assert_eq!(resumed.graph().find(4).unwrap(), 3);
    assert!(resumed.graph().shares_exclusion(2, 3));
}
