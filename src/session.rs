//! The proofreading session: a protocol state machine over a live graph.
//!
//! A session owns a frozen copy of the initial graph and a live copy that
//! corrections mutate. Every correction is recorded in a [`CorrectionLog`]
//! together with a training example. Relearning trains a fresh classifier on
//! the whole log, rebuilds the live graph from the frozen copy under the new
//! merge policy, and replays every correction in the order it was given.
//! Replayed separations also tag both sides with an exclusion.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::classifier::{ClassifierFactory, RandomForest};
use crate::config::{RelearnMode, SessionConfig};
use crate::correction::{Correction, CorrectionLog};
use crate::error::{ProofreadError, Result};
use crate::features::{DefaultFeatures, FeatureExtractor};
use crate::graph::{BoundaryMean, ClassifierProbability, MergePolicy, Rag, ReplayStep};
use crate::protocol::{Channel, Command, Envelope, LUT_REQUEST, LookupTable};
use crate::volume::{ImageVolume, LabelVolume};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Listening,
    Stopped,
}

/// What became of a `separate` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparationOutcome {
    /// Recorded; the fragments now belong to segments `s0` and `s1`.
    Recorded { s0: u64, s1: u64 },
    /// One side was the boundary body.
    Ignored,
    /// No training example could be made for the pair.
    Dropped,
}

/// Counters over the lifetime of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub commands: usize,
    pub merges: usize,
    pub separations: usize,
    pub ignored_separations: usize,
    pub dropped_separations: usize,
    pub unknown_commands: usize,
    pub relearns: usize,
}

pub struct ProofreadingSession {
    id: Uuid,
    config: SessionConfig,
    original: Rag,
    rag: Rag,
    log: CorrectionLog,
    extractor: Arc<dyn FeatureExtractor>,
    classifier_factory: ClassifierFactory,
    relearn_trigger: usize,
    state: SessionState,
    stats: SessionStats,
}

impl std::fmt::Debug for ProofreadingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofreadingSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("graph", &self.rag)
            .field("examples", &self.log.len())
            .field("relearn_trigger", &self.relearn_trigger)
            .finish()
    }
}

impl ProofreadingSession {
    /// Build a session over a label volume and an optional (empty) image.
    pub fn new(labels: &LabelVolume, image: &ImageVolume, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let original = Rag::new(labels, image, config.boundary_body)?;
        let id = Uuid::new_v4();
        info!(
            "[{id}] session over {} fragments and {} edges",
            original.node_count(),
            original.edge_count()
        );

        Ok(Self {
            id,
            rag: original.clone(),
            original,
            log: CorrectionLog::new(),
            extractor: Arc::new(DefaultFeatures),
            classifier_factory: RandomForest::factory(config.forest.clone(), config.seed),
            relearn_trigger: config.relearn_threshold,
            state: SessionState::Listening,
            stats: SessionStats::default(),
            config,
        })
    }

    pub fn with_feature_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_classifier_factory(mut self, factory: ClassifierFactory) -> Self {
        self.classifier_factory = factory;
        self
    }

    /// Resume from earlier corrections. The graph is relearned from them.
    pub fn with_log(mut self, log: CorrectionLog) -> Result<Self> {
        log.validate()?;
        info!("[{}] resuming with {} corrections", self.id, log.len());
        self.log = log;
        self.relearn()?;
        Ok(self)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The live graph.
    pub fn graph(&self) -> &Rag {
        &self.rag
    }

    pub fn log(&self) -> &CorrectionLog {
        &self.log
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn relearn_trigger(&self) -> usize {
        self.relearn_trigger
    }

    fn count_correction(&mut self) {
        self.relearn_trigger = self.relearn_trigger.saturating_sub(1);
    }

    /// Merge the segments containing `segment_ids` into one.
    ///
    /// The ids are resolved to their current segments and merged one at a
    /// time along a traversal of the selection, so every merged pair is
    /// adjacent. A selection that is not connected is rejected before any
    /// change is made. Returns the number of merges.
    pub fn handle_merge(&mut self, segment_ids: &[u64]) -> Result<usize> {
        let boundary = self.config.boundary_body;
        let selection = segment_ids
            .iter()
            .filter(|&&id| id != boundary)
            .map(|&id| self.rag.find(id))
            .collect::<Result<BTreeSet<u64>>>()?;
        let order = self.traversal_order(&selection)?;

        let mut order = order.into_iter();
        let Some(mut s0) = order.next() else {
            return Ok(0);
        };
        let mut merged = 0;
        for s1 in order {
            let features = self.extractor.compute(&self.rag, s0, s1)?;
            s0 = self.rag.merge_nodes(s0, s1)?;
            self.log.record_merge(features, s0, s1);
            self.count_correction();
            merged += 1;
        }
        self.stats.merges += merged;
        debug!("[{}] merged {merged} segments into {s0}", self.id);
        Ok(merged)
    }

    /// Depth-first preorder of the subgraph induced by `selection`, starting
    /// from its smallest id. Every id after the first is adjacent to an
    /// earlier one.
    fn traversal_order(&self, selection: &BTreeSet<u64>) -> Result<Vec<u64>> {
        let Some(&start) = selection.first() else {
            return Ok(Vec::new());
        };
        let mut visited = BTreeSet::new();
        let mut order = Vec::with_capacity(selection.len());
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            let mut next: Vec<u64> = self
                .rag
                .neighbors(id)
                .filter(|n| selection.contains(n) && !visited.contains(n))
                .collect();
            next.reverse();
            stack.extend(next);
        }

        if order.len() != selection.len() {
            let unreached: Vec<u64> = selection.difference(&visited).copied().collect();
            return Err(ProofreadError::invalid_selection(format!(
                "segments {unreached:?} are not connected to segment {start} within the selection"
            )));
        }
        Ok(order)
    }

    /// Keep fragments `f0` and `f1` in different segments.
    pub fn handle_separate(&mut self, f0: u64, f1: u64) -> Result<SeparationOutcome> {
        let boundary = self.config.boundary_body;
        if f0 == boundary || f1 == boundary {
            debug!("[{}] ignoring separation of {f0} and {f1} from the boundary", self.id);
            self.stats.ignored_separations += 1;
            return Ok(SeparationOutcome::Ignored);
        }
        if f0 == f1 {
            warn!("[{}] cannot separate fragment {f0} from itself", self.id);
            self.stats.dropped_separations += 1;
            return Ok(SeparationOutcome::Dropped);
        }

        let (s0, s1) = match self.rag.separate_fragments(f0, f1) {
            Ok(segments) => segments,
            Err(ProofreadError::UnknownNode(id)) => {
                warn!("[{}] dropping separation of {f0} and {f1}: no fragment {id}", self.id);
                self.stats.dropped_separations += 1;
                return Ok(SeparationOutcome::Dropped);
            }
            Err(e) => return Err(e),
        };

        match self.extractor.compute(&self.rag, s0, s1) {
            Ok(features) => {
                self.log.record_separation(features, f0, f1);
                self.count_correction();
                self.stats.separations += 1;
                debug!("[{}] separated {f0} ({s0}) from {f1} ({s1})", self.id);
                Ok(SeparationOutcome::Recorded { s0, s1 })
            }
            Err(e) if e.is_recoverable() => {
                warn!("[{}] dropping separation of {f0} and {f1}: {e}", self.id);
                self.stats.dropped_separations += 1;
                Ok(SeparationOutcome::Dropped)
            }
            Err(e) => Err(e),
        }
    }

    /// Retrain on every recorded correction and rebuild the live graph.
    pub fn relearn(&mut self) -> Result<()> {
        let policy: Arc<dyn MergePolicy> = if self.log.is_empty() {
            Arc::new(BoundaryMean)
        } else {
            let mut classifier = (self.classifier_factory)();
            classifier.fit(self.log.features(), self.log.targets())?;
            Arc::new(ClassifierProbability::new(
                Arc::clone(&self.extractor),
                Arc::from(classifier),
            ))
        };

        let mut rag = self.original.clone();
        rag.set_policy(policy);
        rag.replay_history(self.log.history().map(|correction| match correction {
            Correction::Merge(m) => ReplayStep::Merge(m.s0, m.s1),
            Correction::Separation { tag, event } => ReplayStep::Separate {
                f0: event.f0,
                f1: event.f1,
                tag,
            },
        }))?;

        info!(
            "[{}] relearned from {} examples under {}, {} merges in effect",
            self.id,
            self.log.len(),
            rag.policy().name(),
            rag.merge_record().len()
        );
        self.rag = rag;
        self.relearn_trigger = self.config.relearn_threshold;
        self.stats.relearns += 1;
        Ok(())
    }

    fn relearn_due(&self) -> bool {
        match self.config.relearn_mode {
            RelearnMode::Always => true,
            RelearnMode::Threshold => self.relearn_trigger == 0 || self.stats.relearns == 0,
        }
    }

    /// Agglomerate the live graph up to `threshold` and map every original
    /// fragment to its segment.
    pub fn produce_lookup_table(&mut self, threshold: f64) -> Result<LookupTable> {
        if self.relearn_due() {
            self.relearn()?;
        } else {
            debug!(
                "[{}] {} corrections until the next relearn",
                self.id, self.relearn_trigger
            );
        }
        self.rag.agglomerate(threshold)?;
        let (fragments, segments) = self.rag.segment_map();
        Ok(LookupTable::new(fragments, segments))
    }

    /// Apply one command. Returns the reply to send, if any.
    pub fn handle(&mut self, command: Command) -> Result<Option<Envelope>> {
        self.stats.commands += 1;
        match command {
            Command::Merge(segments) => {
                self.handle_merge(&segments)?;
                Ok(None)
            }
            Command::Separate(f0, f1) => {
                self.handle_separate(f0, f1)?;
                Ok(None)
            }
            Command::Request(what) if what == LUT_REQUEST => {
                let table = self.produce_lookup_table(self.config.lut_threshold)?;
                Ok(Some(table.to_envelope()))
            }
            Command::Request(what) => {
                warn!("[{}] unsupported request '{what}'", self.id);
                Ok(None)
            }
            Command::Stop => {
                self.state = SessionState::Stopped;
                Ok(None)
            }
            Command::Unknown(description) => {
                self.stats.unknown_commands += 1;
                if self.config.strict_commands {
                    warn!("[{}] {description}, stopping", self.id);
                    self.state = SessionState::Stopped;
                } else {
                    warn!("[{}] {description}, ignoring", self.id);
                }
                Ok(None)
            }
        }
    }

    /// Serve commands from `channel` until stopped.
    ///
    /// Errors other than dropped separations end the session and are
    /// returned to the caller.
    pub fn listen(&mut self, channel: &mut dyn Channel) -> Result<()> {
        info!("[{}] listening", self.id);
        while self.state == SessionState::Listening {
            let command = match channel.recv() {
                Ok(envelope) => {
                    debug!("[{}] received '{}'", self.id, envelope.kind);
                    Command::parse(&envelope)
                }
                Err(ProofreadError::Protocol(description)) => Command::Unknown(description),
                Err(e) => return Err(e),
            };
            if let Some(reply) = self.handle(command)? {
                channel.send(&reply)?;
            }
        }
        info!("[{}] stopped: {:?}", self.id, self.stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fragments 1-2-3-4 in a row, without an image.
    fn chain_session(config: SessionConfig) -> ProofreadingSession {
        let labels = LabelVolume::new(vec![1, 4], vec![1, 2, 3, 4]).unwrap();
        ProofreadingSession::new(&labels, &ImageVolume::empty(), config).unwrap()
    }

    fn small_forest() -> SessionConfig {
        let mut config = SessionConfig::default();
        config.forest.n_trees = 5;
        config
    }

    #[test]
    fn test_merge_resolves_ancestors_and_dedupes() {
        let mut session = chain_session(small_forest());
        assert_eq!(session.handle_merge(&[1, 2]).unwrap(), 1);
        // 2 now resolves to 1, so the selection is {1, 3}.
        assert_eq!(session.handle_merge(&[2, 1, 3]).unwrap(), 1);
        assert_eq!(session.graph().find(3).unwrap(), 1);
        assert_eq!(session.log().merges().len(), 2);
        assert_eq!(session.log().len(), 2);
        assert_eq!(session.stats().merges, 2);
    }

    #[test]
    fn test_merge_chain_order_is_adjacent() {
        let mut session = chain_session(small_forest());
        assert_eq!(session.handle_merge(&[4, 2, 3, 1]).unwrap(), 3);
        let merges: Vec<(u64, u64)> = session.log().merges().iter().map(|m| (m.s0, m.s1)).collect();
        assert_eq!(merges, vec![(1, 2), (1, 3), (1, 4)]);
    }

    #[test]
    fn test_disconnected_merge_rejected() {
        let mut session = chain_session(small_forest());
        let err = session.handle_merge(&[1, 4]).unwrap_err();
        assert!(matches!(err, ProofreadError::InvalidSelection(_)));
        assert!(session.log().is_empty());
        assert_eq!(session.graph().node_count(), 4);
    }

    #[test]
    fn test_separate_outcomes() {
        let mut session = chain_session(small_forest());
        assert_eq!(session.handle_separate(0, 2).unwrap(), SeparationOutcome::Ignored);
        assert_eq!(session.handle_separate(2, 2).unwrap(), SeparationOutcome::Dropped);
        // 1 and 3 are not adjacent.
        assert_eq!(session.handle_separate(1, 3).unwrap(), SeparationOutcome::Dropped);
        assert_eq!(session.handle_separate(5, 3).unwrap(), SeparationOutcome::Dropped);
        assert_eq!(
            session.handle_separate(2, 3).unwrap(),
            SeparationOutcome::Recorded { s0: 2, s1: 3 }
        );
        assert_eq!(session.log().separations().len(), 1);
        assert_eq!(session.log().len(), 1);
        assert_eq!(session.stats().dropped_separations, 3);
        assert_eq!(session.stats().ignored_separations, 1);
    }

    #[test]
    fn test_separate_splits_merged_segment() {
        let mut session = chain_session(small_forest());
        session.handle_merge(&[1, 2, 3]).unwrap();
        let outcome = session.handle_separate(2, 3).unwrap();
        assert_eq!(outcome, SeparationOutcome::Recorded { s0: 1, s1: 3 });
        assert_ne!(
            session.graph().find(2).unwrap(),
            session.graph().find(3).unwrap()
        );
    }

    #[test]
    fn test_relearn_without_examples_keeps_boundary_mean() {
        let mut session = chain_session(small_forest());
        session.relearn().unwrap();
        assert_eq!(session.graph().policy().name(), "boundary-mean");
        assert_eq!(session.stats().relearns, 1);
    }

    #[test]
    fn test_relearn_replays_history_and_tags_exclusions() {
        let mut session = chain_session(small_forest());
        session.handle_merge(&[1, 2, 3]).unwrap();
        session.handle_separate(2, 3).unwrap();
        session.relearn().unwrap();

        let graph = session.graph();
        assert_eq!(graph.policy().name(), "classifier-probability");
        assert_eq!(graph.find(2).unwrap(), 1);
        assert_ne!(graph.find(3).unwrap(), 1);
        assert!(graph.shares_exclusion(1, 3));
    }

    #[test]
    fn test_relearn_matches_live_graph_after_split() {
        let mut session = chain_session(small_forest());
        session.handle_merge(&[1, 2, 3, 4]).unwrap();
        session.handle_separate(2, 3).unwrap();
        let (_, live) = session.graph().segment_map();
        assert_eq!(live, vec![1, 1, 3, 4]);

        session.relearn().unwrap();
        let (_, rebuilt) = session.graph().segment_map();
        assert_eq!(rebuilt, live);

        let table = session.produce_lookup_table(0.5).unwrap();
        assert_eq!(table.segment_of(1), table.segment_of(2));
        assert_ne!(table.segment_of(1), table.segment_of(3));
        assert_ne!(table.segment_of(1), table.segment_of(4));
    }

    #[test]
    fn test_relearn_keeps_merge_after_separation() {
        let mut session = chain_session(small_forest());
        session.handle_merge(&[1, 2]).unwrap();
        session.handle_separate(1, 2).unwrap();
        session.handle_merge(&[1, 2]).unwrap();
        assert_eq!(session.graph().find(2).unwrap(), 1);

        let table = session.produce_lookup_table(0.5).unwrap();
        assert_eq!(table.segment_of(1), table.segment_of(2));
    }

    #[test]
    fn test_threshold_mode_counts_down() {
        let mut config = small_forest();
        config.relearn_mode = RelearnMode::Threshold;
        config.relearn_threshold = 2;
        let mut session = chain_session(config);

        session.produce_lookup_table(0.5).unwrap();
        assert_eq!(session.stats().relearns, 1);

        session.handle_merge(&[1, 2]).unwrap();
        assert_eq!(session.relearn_trigger(), 1);
        session.produce_lookup_table(0.5).unwrap();
        assert_eq!(session.stats().relearns, 1);

        session.handle_separate(2, 3).unwrap();
        assert_eq!(session.relearn_trigger(), 0);
        session.produce_lookup_table(0.5).unwrap();
        assert_eq!(session.stats().relearns, 2);
        assert_eq!(session.relearn_trigger(), 2);
    }

    #[test]
    fn test_unknown_commands() {
        let mut session = chain_session(small_forest());
        session.handle(Command::Unknown("odd".into())).unwrap();
        assert_eq!(session.state(), SessionState::Listening);

        let mut config = small_forest();
        config.strict_commands = true;
        let mut strict = chain_session(config);
        strict.handle(Command::Unknown("odd".into())).unwrap();
        assert_eq!(strict.state(), SessionState::Stopped);
    }

    #[test]
    fn test_unsupported_request_has_no_reply() {
        let mut session = chain_session(small_forest());
        let reply = session.handle(Command::Request("everything".into())).unwrap();
        assert!(reply.is_none());
        assert_eq!(session.stats().relearns, 0);
    }

    #[test]
    fn test_with_log_relearns() {
        let mut source = chain_session(small_forest());
        source.handle_merge(&[3, 4]).unwrap();
        let resumed = chain_session(small_forest())
            .with_log(source.log().clone())
            .unwrap();
        assert_eq!(resumed.graph().find(4).unwrap(), 3);
        assert_eq!(resumed.stats().relearns, 1);
    }
}
