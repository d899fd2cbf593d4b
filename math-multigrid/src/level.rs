//! Per-level artifact store
//!
//! A [`Level`] holds the named artifacts of one grid (operator, transfer
//! operators, smoothers, intermediate data) keyed by `(name, producer)`.
//! Every slot carries an explicit request counter and a set of keep flags:
//!
//! - `request` declares that someone will need the artifact; it never computes
//! - `release` withdraws one such need; at zero, and without keep flags, the
//!   slot and its value are dropped
//! - producers store outputs only into slots that are requested or kept
//!
//! Values are reference counted, so a `get` hands out a cheap clone that stays
//! valid even if the slot is evicted afterwards.

use crate::error::{MultigridError, Result};
use crate::producers::{CoarseSplitting, Input, InputLevel, LevelManager, ProducerId};
use crate::smoothers::LevelSmoother;
use crate::sparse::CsrMatrix;
use crate::traits::ComplexField;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

/// Reasons for a slot to outlive its requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeepFlags(u8);

impl KeepFlags {
    /// Set directly by the caller
    pub const USER_DATA: KeepFlags = KeepFlags(0b001);
    /// Explicit keep requested by the caller
    pub const KEEP: KeepFlags = KeepFlags(0b010);
    /// Published for the cycle by a top producer
    pub const FINAL: KeepFlags = KeepFlags(0b100);
    /// Every flag
    pub const ALL: KeepFlags = KeepFlags(0b111);

    /// No flag set
    pub const fn empty() -> Self {
        KeepFlags(0)
    }

    /// Whether no flag is set
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Whether every flag of `other` is set
    pub const fn contains(&self, other: KeepFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the flags of `other`
    pub fn insert(&mut self, other: KeepFlags) {
        self.0 |= other.0;
    }

    /// Clear the flags of `other`
    pub fn remove(&mut self, other: KeepFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for KeepFlags {
    type Output = KeepFlags;

    fn bitor(self, rhs: KeepFlags) -> KeepFlags {
        KeepFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for KeepFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (KeepFlags::USER_DATA, "UserData"),
            (KeepFlags::KEEP, "Keep"),
            (KeepFlags::FINAL, "Final"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        if names.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Value stored in a slot
#[derive(Debug, Clone)]
pub enum ArtifactValue<T: ComplexField> {
    /// Sparse operator; `None` when this process owns no rows of it
    Operator(Option<Arc<CsrMatrix<T>>>),
    /// Smoother or coarse solver
    Smoother(Arc<LevelSmoother<T>>),
    /// C/F splitting
    Splitting(Arc<CoarseSplitting>),
}

impl<T: ComplexField> ArtifactValue<T> {
    /// Operator placeholder for a level this process owns no rows of
    pub fn null_operator() -> Self {
        ArtifactValue::Operator(None)
    }

    /// Kind name, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            ArtifactValue::Operator(_) => "operator",
            ArtifactValue::Smoother(_) => "smoother",
            ArtifactValue::Splitting(_) => "splitting",
        }
    }
}

impl<T: ComplexField> From<CsrMatrix<T>> for ArtifactValue<T> {
    fn from(matrix: CsrMatrix<T>) -> Self {
        ArtifactValue::Operator(Some(Arc::new(matrix)))
    }
}

impl<T: ComplexField> From<Arc<CsrMatrix<T>>> for ArtifactValue<T> {
    fn from(matrix: Arc<CsrMatrix<T>>) -> Self {
        ArtifactValue::Operator(Some(matrix))
    }
}

impl<T: ComplexField> From<LevelSmoother<T>> for ArtifactValue<T> {
    fn from(smoother: LevelSmoother<T>) -> Self {
        ArtifactValue::Smoother(Arc::new(smoother))
    }
}

impl<T: ComplexField> From<Arc<LevelSmoother<T>>> for ArtifactValue<T> {
    fn from(smoother: Arc<LevelSmoother<T>>) -> Self {
        ArtifactValue::Smoother(smoother)
    }
}

impl<T: ComplexField> From<CoarseSplitting> for ArtifactValue<T> {
    fn from(splitting: CoarseSplitting) -> Self {
        ArtifactValue::Splitting(Arc::new(splitting))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ArtifactKey {
    name: String,
    producer: ProducerId,
}

impl ArtifactKey {
    fn new(name: &str, producer: ProducerId) -> Self {
        Self {
            name: name.to_string(),
            producer,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot<T: ComplexField> {
    value: Option<ArtifactValue<T>>,
    requests: usize,
    keep: KeepFlags,
}

impl<T: ComplexField> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: None,
            requests: 0,
            keep: KeepFlags::empty(),
        }
    }
}

/// Snapshot of one slot, for reports and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    /// Artifact name
    pub name: String,
    /// Producer the slot belongs to
    pub producer: ProducerId,
    /// Whether a value is stored
    pub available: bool,
    /// Outstanding requests
    pub requests: usize,
    /// Keep flags
    pub keep: KeepFlags,
}

/// Dependency edge recorded when a producer declares its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencyEdge {
    /// Producer of the input
    pub from: ProducerId,
    /// Producer consuming it
    pub to: ProducerId,
    /// Artifact name
    pub name: &'static str,
    /// Whether the input lives on the next finer level
    pub from_fine: bool,
}

/// One grid of the hierarchy
#[derive(Debug, Clone)]
pub struct Level<T: ComplexField> {
    level_id: Option<usize>,
    previous: Option<usize>,
    slots: HashMap<ArtifactKey, Slot<T>>,
    /// Producers whose inputs are currently requested on their behalf
    declared: HashMap<ProducerId, Vec<Input>>,
    built: HashSet<ProducerId>,
    edges: BTreeSet<DependencyEdge>,
    manager: Option<LevelManager>,
}

impl<T: ComplexField> Default for Level<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ComplexField> Level<T> {
    /// Empty, unnumbered level
    pub fn new() -> Self {
        Self {
            level_id: None,
            previous: None,
            slots: HashMap::new(),
            declared: HashMap::new(),
            built: HashSet::new(),
            edges: BTreeSet::new(),
            manager: None,
        }
    }

    /// Derive the next coarser level.
    ///
    /// Only structural defaults carry over: the new level holds no artifact
    /// and is unnumbered until added to a chain.
    pub fn build(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            ..Self::new()
        }
    }

    /// Position in the chain, once added
    pub fn level_id(&self) -> Option<usize> {
        self.level_id
    }

    /// Index of the next finer level
    pub fn previous(&self) -> Option<usize> {
        self.previous
    }

    pub(crate) fn set_level_id(&mut self, id: usize) {
        self.level_id = Some(id);
    }

    pub(crate) fn set_previous(&mut self, previous: Option<usize>) {
        self.previous = previous;
    }

    /// Strategies the level was last set up with
    pub fn manager(&self) -> Option<&LevelManager> {
        self.manager.as_ref()
    }

    pub(crate) fn set_manager(&mut self, manager: LevelManager) {
        self.manager = Some(manager);
    }

    // Request bookkeeping

    /// Request user or final data
    pub fn request(&mut self, name: &str) -> usize {
        self.request_from(name, ProducerId::NoFactory)
    }

    /// Add one outstanding request; returns the new count
    pub fn request_from(&mut self, name: &str, producer: ProducerId) -> usize {
        let slot = self
            .slots
            .entry(ArtifactKey::new(name, producer))
            .or_default();
        slot.requests += 1;
        slot.requests
    }

    /// Release user or final data
    pub fn release(&mut self, name: &str) -> Result<usize> {
        self.release_from(name, ProducerId::NoFactory)
    }

    /// Withdraw one request; returns the remaining count.
    ///
    /// At zero, a slot without keep flags is dropped with its value.
    pub fn release_from(&mut self, name: &str, producer: ProducerId) -> Result<usize> {
        if !self.is_requested(name, producer) {
            return Err(MultigridError::PreconditionViolation(format!(
                "Level {}: release of '{}' generated by {:?} without a matching request",
                self.id_label(),
                name,
                producer
            )));
        }

        let key = ArtifactKey::new(name, producer);
        let mut remaining = 0;
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.requests -= 1;
            remaining = slot.requests;
        }
        self.evict_if_unused(&key);
        Ok(remaining)
    }

    /// Outstanding requests on a slot
    pub fn request_count(&self, name: &str, producer: ProducerId) -> usize {
        self.slots
            .get(&ArtifactKey::new(name, producer))
            .map_or(0, |slot| slot.requests)
    }

    /// Whether a slot has outstanding requests
    pub fn is_requested(&self, name: &str, producer: ProducerId) -> bool {
        self.request_count(name, producer) > 0
    }

    /// Total outstanding requests on the outputs of `producer`
    pub fn demand(&self, producer: ProducerId) -> usize {
        self.slots
            .iter()
            .filter(|(key, _)| key.producer == producer)
            .map(|(_, slot)| slot.requests)
            .sum()
    }

    // Values

    /// Whether user or final data is stored under `name`
    pub fn is_available(&self, name: &str) -> bool {
        self.is_available_from(name, ProducerId::NoFactory)
    }

    /// Whether a value is stored; never has side effects
    pub fn is_available_from(&self, name: &str, producer: ProducerId) -> bool {
        self.slots
            .get(&ArtifactKey::new(name, producer))
            .is_some_and(|slot| slot.value.is_some())
    }

    /// User or final data stored under `name`
    pub fn get(&self, name: &str) -> Result<ArtifactValue<T>> {
        self.get_from(name, ProducerId::NoFactory)
    }

    /// Stored value, `NotAvailable` if nothing produced it yet
    pub fn get_from(&self, name: &str, producer: ProducerId) -> Result<ArtifactValue<T>> {
        self.slots
            .get(&ArtifactKey::new(name, producer))
            .and_then(|slot| slot.value.clone())
            .ok_or_else(|| MultigridError::NotAvailable {
                name: name.to_string(),
                producer,
                level: self.level_id,
            })
    }

    /// Operator stored under `name`; `None` for a null operator
    pub fn get_operator(&self, name: &str) -> Result<Option<Arc<CsrMatrix<T>>>> {
        self.get_operator_from(name, ProducerId::NoFactory)
    }

    /// Operator generated by `producer`
    pub fn get_operator_from(
        &self,
        name: &str,
        producer: ProducerId,
    ) -> Result<Option<Arc<CsrMatrix<T>>>> {
        match self.get_from(name, producer)? {
            ArtifactValue::Operator(op) => Ok(op),
            _ => Err(Self::kind_error(name, "operator")),
        }
    }

    /// Smoother stored under `name`
    pub fn get_smoother(&self, name: &str) -> Result<Arc<LevelSmoother<T>>> {
        self.get_smoother_from(name, ProducerId::NoFactory)
    }

    /// Smoother generated by `producer`
    pub fn get_smoother_from(
        &self,
        name: &str,
        producer: ProducerId,
    ) -> Result<Arc<LevelSmoother<T>>> {
        match self.get_from(name, producer)? {
            ArtifactValue::Smoother(s) => Ok(s),
            _ => Err(Self::kind_error(name, "smoother")),
        }
    }

    /// Splitting generated by `producer`
    pub fn get_splitting_from(
        &self,
        name: &str,
        producer: ProducerId,
    ) -> Result<Arc<CoarseSplitting>> {
        match self.get_from(name, producer)? {
            ArtifactValue::Splitting(s) => Ok(s),
            _ => Err(Self::kind_error(name, "splitting")),
        }
    }

    /// Store user data; it stays until deleted
    pub fn set(&mut self, name: &str, value: impl Into<ArtifactValue<T>>) {
        let slot = self
            .slots
            .entry(ArtifactKey::new(name, ProducerId::NoFactory))
            .or_default();
        slot.value = Some(value.into());
        slot.keep.insert(KeepFlags::USER_DATA);
    }

    /// Store a producer output.
    ///
    /// Nothing is stored unless the slot is requested or kept; the return
    /// value tells whether the value was retained.
    pub fn store_from(
        &mut self,
        name: &str,
        producer: ProducerId,
        value: impl Into<ArtifactValue<T>>,
    ) -> bool {
        match self.slots.get_mut(&ArtifactKey::new(name, producer)) {
            Some(slot) if slot.requests > 0 || !slot.keep.is_empty() => {
                slot.value = Some(value.into());
                true
            }
            _ => false,
        }
    }

    /// Publish a final artifact for the cycle
    pub fn publish(&mut self, name: &str, value: ArtifactValue<T>) {
        let slot = self
            .slots
            .entry(ArtifactKey::new(name, ProducerId::NoFactory))
            .or_default();
        slot.value = Some(value);
        slot.keep.insert(KeepFlags::FINAL);
    }

    // Keep flags

    /// Keep the output of `producer` once it is generated
    pub fn keep(&mut self, name: &str, producer: ProducerId) {
        self.add_keep_flag(name, producer, KeepFlags::KEEP);
    }

    /// Drop every keep flag; the value goes away unless still requested
    pub fn delete(&mut self, name: &str, producer: ProducerId) {
        self.remove_keep_flag(name, producer, KeepFlags::ALL);
    }

    /// Set keep flags, creating the slot if needed
    pub fn add_keep_flag(&mut self, name: &str, producer: ProducerId, flags: KeepFlags) {
        self.slots
            .entry(ArtifactKey::new(name, producer))
            .or_default()
            .keep
            .insert(flags);
    }

    /// Clear keep flags; an unrequested slot left without flags is dropped
    pub fn remove_keep_flag(&mut self, name: &str, producer: ProducerId, flags: KeepFlags) {
        let key = ArtifactKey::new(name, producer);
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.keep.remove(flags);
            self.evict_if_unused(&key);
        }
    }

    /// Keep flags of a slot
    pub fn keep_flags(&self, name: &str, producer: ProducerId) -> KeepFlags {
        self.slots
            .get(&ArtifactKey::new(name, producer))
            .map_or(KeepFlags::empty(), |slot| slot.keep)
    }

    // Producer state, driven by the hierarchy

    pub(crate) fn is_declared(&self, producer: ProducerId) -> bool {
        self.declared.contains_key(&producer)
    }

    pub(crate) fn declare(&mut self, producer: ProducerId, inputs: Vec<Input>) {
        for input in &inputs {
            self.edges.insert(DependencyEdge {
                from: input.producer,
                to: producer,
                name: input.name,
                from_fine: input.at == InputLevel::Fine,
            });
        }
        self.declared.insert(producer, inputs);
    }

    pub(crate) fn take_declared(&mut self, producer: ProducerId) -> Option<Vec<Input>> {
        self.declared.remove(&producer)
    }

    pub(crate) fn mark_built(&mut self, producer: ProducerId) {
        self.built.insert(producer);
    }

    /// Whether `producer` ran on this level
    pub fn was_built(&self, producer: ProducerId) -> bool {
        self.built.contains(&producer)
    }

    /// Producer dependencies declared on this level so far
    pub fn dependency_edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter()
    }

    /// Every slot, sorted by name then producer
    pub fn slots(&self) -> Vec<SlotStatus> {
        let mut status: Vec<SlotStatus> = self
            .slots
            .iter()
            .map(|(key, slot)| SlotStatus {
                name: key.name.clone(),
                producer: key.producer,
                available: slot.value.is_some(),
                requests: slot.requests,
                keep: slot.keep,
            })
            .collect();
        status.sort_by(|a, b| a.name.cmp(&b.name).then(a.producer.cmp(&b.producer)));
        status
    }

    fn evict_if_unused(&mut self, key: &ArtifactKey) {
        let unused = self
            .slots
            .get(key)
            .is_some_and(|slot| slot.requests == 0 && slot.keep.is_empty());
        if unused {
            self.slots.remove(key);
            log::trace!(
                "Level {}: evicted '{}' generated by {:?}",
                self.id_label(),
                key.name,
                key.producer
            );
        }
    }

    fn kind_error(name: &str, expected: &'static str) -> MultigridError {
        MultigridError::ArtifactKind {
            name: name.to_string(),
            expected,
        }
    }

    fn id_label(&self) -> String {
        self.level_id
            .map_or_else(|| "?".to_string(), |id| id.to_string())
    }
}

impl<T: ComplexField> fmt::Display for Level<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Level {}", self.id_label())?;
        writeln!(f, "{:<16} {:<24} {:>5} {:>8}  keep", "name", "generated by", "avail", "requests")?;
        for slot in self.slots() {
            writeln!(
                f,
                "{:<16} {:<24} {:>5} {:>8}  {}",
                slot.name,
                slot.producer.label(),
                if slot.available { "yes" } else { "no" },
                slot.requests,
                slot.keep
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producers::{OPERATOR, PROLONGATOR, SPLITTING};

    fn level() -> Level<f64> {
        let mut level = Level::new();
        level.set_level_id(0);
        level
    }

    #[test]
    fn test_request_twice_release_once_keeps_value() {
        let mut level = level();
        level.request_from(SPLITTING, ProducerId::Coarsening);
        level.request_from(SPLITTING, ProducerId::Coarsening);
        assert!(level.store_from(SPLITTING, ProducerId::Coarsening, CsrMatrix::identity(2)));

        assert_eq!(level.release_from(SPLITTING, ProducerId::Coarsening).unwrap(), 1);
        assert!(level.is_available_from(SPLITTING, ProducerId::Coarsening));

        assert_eq!(level.release_from(SPLITTING, ProducerId::Coarsening).unwrap(), 0);
        assert!(!level.is_available_from(SPLITTING, ProducerId::Coarsening));
        assert!(level.slots().is_empty());
    }

    #[test]
    fn test_store_without_request_is_dropped() {
        let mut level = level();
        assert!(!level.store_from(PROLONGATOR, ProducerId::Prolongator, CsrMatrix::identity(2)));
        assert!(!level.is_available_from(PROLONGATOR, ProducerId::Prolongator));

        level.keep(PROLONGATOR, ProducerId::Prolongator);
        assert!(level.store_from(PROLONGATOR, ProducerId::Prolongator, CsrMatrix::identity(2)));
        assert!(level.is_available_from(PROLONGATOR, ProducerId::Prolongator));

        level.delete(PROLONGATOR, ProducerId::Prolongator);
        assert!(!level.is_available_from(PROLONGATOR, ProducerId::Prolongator));
    }

    #[test]
    fn test_release_without_request_fails() {
        let mut level = level();
        let err = level.release(OPERATOR).unwrap_err();
        assert!(matches!(err, MultigridError::PreconditionViolation(_)));
    }

    #[test]
    fn test_user_data_survives_release() {
        let mut level = level();
        level.set(OPERATOR, CsrMatrix::<f64>::identity(3));
        level.request(OPERATOR);
        level.release(OPERATOR).unwrap();
        assert!(level.is_available(OPERATOR));
        assert_eq!(level.keep_flags(OPERATOR, ProducerId::NoFactory), KeepFlags::USER_DATA);
    }

    #[test]
    fn test_get_unavailable() {
        let mut level = level();
        level.request_from("Nothing", ProducerId::Rap);
        assert!(!level.is_available_from("Nothing", ProducerId::Rap));
        let err = level.get_from("Nothing", ProducerId::Rap).unwrap_err();
        assert!(matches!(
            err,
            MultigridError::NotAvailable { level: Some(0), .. }
        ));
        // The failed lookup left the request count untouched
        assert_eq!(level.request_count("Nothing", ProducerId::Rap), 1);
    }

    #[test]
    fn test_wrong_kind() {
        let mut level = level();
        level.set(OPERATOR, CsrMatrix::<f64>::identity(3));
        let err = level.get_smoother(OPERATOR).unwrap_err();
        assert!(matches!(err, MultigridError::ArtifactKind { expected: "smoother", .. }));
        assert!(level.get_operator(OPERATOR).unwrap().is_some());
    }

    #[test]
    fn test_null_operator() {
        let mut level = level();
        level.set(OPERATOR, ArtifactValue::null_operator());
        assert!(level.is_available(OPERATOR));
        assert!(level.get_operator(OPERATOR).unwrap().is_none());
    }

    #[test]
    fn test_publish_is_final() {
        let mut level = level();
        level.publish(OPERATOR, CsrMatrix::<f64>::identity(2).into());
        level.request(OPERATOR);
        level.release(OPERATOR).unwrap();
        assert!(level.is_available(OPERATOR));

        level.remove_keep_flag(OPERATOR, ProducerId::NoFactory, KeepFlags::FINAL);
        assert!(!level.is_available(OPERATOR));
    }

    #[test]
    fn test_demand_sums_outputs() {
        let mut level = level();
        level.request_from("PreSmoother", ProducerId::Smoother);
        level.request_from("PostSmoother", ProducerId::Smoother);
        level.request_from("PostSmoother", ProducerId::Smoother);
        assert_eq!(level.demand(ProducerId::Smoother), 3);
        assert_eq!(level.demand(ProducerId::Rap), 0);
    }

    #[test]
    fn test_build_derives_empty_unnumbered_level() {
        let mut level = level();
        level.set(OPERATOR, CsrMatrix::<f64>::identity(2));
        level.set_manager(LevelManager::default());

        let coarse = level.build();
        assert_eq!(coarse.level_id(), None);
        assert_eq!(coarse.previous(), None);
        assert!(!coarse.is_available(OPERATOR));
        assert!(coarse.manager().is_some());
    }

    #[test]
    fn test_keep_flags_display() {
        assert_eq!(KeepFlags::empty().to_string(), "-");
        assert_eq!((KeepFlags::USER_DATA | KeepFlags::FINAL).to_string(), "UserData|Final");
    }
}
