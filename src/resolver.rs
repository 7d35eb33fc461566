// 🔀 Merge Resolver - operator decisions over duplicate and similarity groups
// Each decision is validated in full before anything is committed, appends
// exactly one audit entry, and pushes one undo frame.
//
// Group lifecycle:
//   Pending → Resolved            (terminal)
//   Pending → Skipped → Pending   (only through reset)

use crate::catalog::Catalog;
use crate::config::{EngineConfig, TokenOrder, UndoPolicy};
use crate::error::ResolveError;
use crate::identity::{collapse, IdentityEngine, IdentityField};
use crate::record::{KnownField, PolicyRecord, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

// ============================================================================
// GROUPS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    /// Identical identity signature
    Duplicate,
    /// Identical except for one identity field
    Similar { field: IdentityField },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupState {
    Pending,
    Resolved,
    Skipped,
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GroupState::Pending => "pending",
            GroupState::Resolved => "resolved",
            GroupState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeGroup {
    pub id: usize,
    pub kind: GroupKind,
    /// First-seen order
    pub members: Vec<RecordId>,
    pub state: GroupState,
}

// ============================================================================
// ACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenameSuffix {
    /// `<name>-from-<origin>`
    Origin,
    /// `<name>-1`, `<name>-2`, ...
    Counter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Discard every member except `keep`
    KeepOne { keep: RecordId },

    /// Keep every member, suffixing names that collide inside the group
    KeepBothRenamed { suffix: RenameSuffix },

    /// Union the differing field into the first-seen member; `name` overrides
    /// the merged record's name
    MergeFields { name: Option<String> },

    /// Keep `canonical` untouched and discard the rest
    Promote { canonical: RecordId },
}

impl Action {
    fn audit_action(&self) -> AuditAction {
        match self {
            Action::KeepOne { .. } => AuditAction::KeepOne,
            Action::KeepBothRenamed { .. } => AuditAction::KeepBothRenamed,
            Action::MergeFields { .. } => AuditAction::MergeFields,
            Action::Promote { .. } => AuditAction::Promote,
        }
    }
}

// ============================================================================
// AUDIT LOG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    KeepOne,
    KeepBothRenamed,
    MergeFields,
    Promote,
    Skip,
    Reset,
    /// Compensates an earlier entry (see `UndoPolicy::Compensate`)
    Revert,
    /// Automatic rename enforcing unique policy names
    UniquenessViolation,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::KeepOne => "keep-one",
            AuditAction::KeepBothRenamed => "keep-both-renamed",
            AuditAction::MergeFields => "merge-fields",
            AuditAction::Promote => "promote",
            AuditAction::Skip => "skip",
            AuditAction::Reset => "reset",
            AuditAction::Revert => "revert",
            AuditAction::UniquenessViolation => "uniqueness-violation",
        }
    }

    pub fn from_str_name(s: &str) -> Option<AuditAction> {
        [
            AuditAction::KeepOne,
            AuditAction::KeepBothRenamed,
            AuditAction::MergeFields,
            AuditAction::Promote,
            AuditAction::Skip,
            AuditAction::Reset,
            AuditAction::Revert,
            AuditAction::UniquenessViolation,
        ]
        .into_iter()
        .find(|a| a.as_str() == s)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One identity/merge decision (append-only history)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    /// None for synthetic entries not tied to a group
    pub group: Option<usize>,
    /// Affected records
    pub records: Vec<RecordId>,
    /// Origin tags of the affected records, sorted
    pub origins: Vec<String>,
    /// Records that remain after the decision
    pub results: Vec<RecordId>,
    pub note: Option<String>,
}

impl AuditEntry {
    pub fn new(
        actor: &str,
        action: AuditAction,
        group: Option<usize>,
        records: Vec<RecordId>,
        origins: Vec<String>,
        results: Vec<RecordId>,
    ) -> Self {
        AuditEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            actor: actor.to_string(),
            action,
            group,
            records,
            origins,
            results,
            note: None,
        }
    }

    /// Builder: attach a free-form note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

// ============================================================================
// DECISION RESULTS
// ============================================================================

/// What one decision did to the record set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub group: usize,
    /// Records that remain
    pub results: Vec<RecordId>,
    /// Records removed from the set
    pub discarded: Vec<RecordId>,
    /// (record, old name, new name)
    pub renamed: Vec<(RecordId, String, String)>,
}

/// Slot contents before a decision, restored by undo
struct UndoFrame {
    generation: usize,
    group: Option<(usize, GroupState)>,
    slots: Vec<(usize, Option<PolicyRecord>)>,
    /// Audit entries written by the decision
    audit: std::ops::Range<usize>,
}

/// Fully computed decision, committed in one step
struct Plan {
    writes: Vec<(usize, Option<PolicyRecord>)>,
    results: Vec<RecordId>,
    discarded: Vec<RecordId>,
    renamed: Vec<(RecordId, String, String)>,
    note: Option<String>,
}

// ============================================================================
// MERGE RESOLVER
// ============================================================================

pub struct MergeResolver<'a> {
    engine: IdentityEngine<'a>,
    token_order: TokenOrder,
    undo_policy: UndoPolicy,

    /// Recorded as `actor` on every audit entry (default: "operator")
    actor: String,

    /// Records in first-seen order; None = discarded
    slots: Vec<Option<PolicyRecord>>,
    index: HashMap<RecordId, usize>,

    groups: Vec<MergeGroup>,
    /// Bumped on every re-analysis; stale undo frames leave groups alone
    generation: usize,

    audit: Vec<AuditEntry>,
    undo_stack: Vec<UndoFrame>,
}

impl<'a> MergeResolver<'a> {
    /// Take ownership of the record set and compute the initial groups
    pub fn new(records: Vec<PolicyRecord>, catalog: &'a Catalog, config: &EngineConfig) -> Self {
        let mut index = HashMap::new();
        let mut slots = Vec::with_capacity(records.len());

        for mut record in records {
            if index.contains_key(&record.id) {
                let unique = RecordId::from(format!("{}~{}", record.id, record.seq).as_str());
                tracing::warn!(
                    record = %record.id,
                    renamed = %unique,
                    "record id collision (same origin tag from two exports)"
                );
                record.id = unique;
            }
            index.insert(record.id.clone(), slots.len());
            slots.push(Some(record));
        }

        let mut resolver = MergeResolver {
            engine: IdentityEngine::new(catalog, config),
            token_order: config.token_order,
            undo_policy: config.undo_policy,
            actor: "operator".to_string(),
            slots,
            index,
            groups: Vec::new(),
            generation: 0,
            audit: Vec::new(),
            undo_stack: Vec::new(),
        };
        resolver.analyze();
        resolver
    }

    /// Builder: set the actor recorded in audit entries
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    /// Recompute duplicate and similarity groups over the live records
    pub fn analyze(&mut self) {
        let live: Vec<PolicyRecord> = self.records().cloned().collect();
        let dedupe = self.engine.dedupe(&live);
        let similar = self.engine.find_similar(&live);

        let mut groups = Vec::new();
        for group in dedupe.duplicate_groups {
            groups.push(MergeGroup {
                id: groups.len(),
                kind: GroupKind::Duplicate,
                members: group.members.iter().map(|&i| live[i].id.clone()).collect(),
                state: GroupState::Pending,
            });
        }
        for group in similar.groups {
            groups.push(MergeGroup {
                id: groups.len(),
                kind: GroupKind::Similar { field: group.field },
                members: group.members.iter().map(|&i| live[i].id.clone()).collect(),
                state: GroupState::Pending,
            });
        }

        self.groups = groups;
        self.generation += 1;
    }

    // ------------------------------------------------------------------------
    // READ ACCESS
    // ------------------------------------------------------------------------

    pub fn groups(&self) -> &[MergeGroup] {
        &self.groups
    }

    pub fn group(&self, id: usize) -> Result<&MergeGroup, ResolveError> {
        self.groups.get(id).ok_or(ResolveError::UnknownGroup(id))
    }

    pub fn pending_groups(&self) -> impl Iterator<Item = &MergeGroup> {
        self.groups.iter().filter(|g| g.state == GroupState::Pending)
    }

    /// Live records in first-seen order
    pub fn records(&self) -> impl Iterator<Item = &PolicyRecord> {
        self.slots.iter().flatten()
    }

    pub fn record(&self, id: &RecordId) -> Option<&PolicyRecord> {
        self.index.get(id).and_then(|&slot| self.slots[slot].as_ref())
    }

    /// Read-only audit log view
    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn into_records(self) -> Vec<PolicyRecord> {
        self.slots.into_iter().flatten().collect()
    }

    // ------------------------------------------------------------------------
    // DECISIONS
    // ------------------------------------------------------------------------

    /// Apply an action to a pending group
    pub fn apply_decision(&mut self, group_id: usize, action: Action) -> Result<Resolution, ResolveError> {
        let group = self.group(group_id)?.clone();
        expect_state(&group, GroupState::Pending)?;

        let live = self.live_members(&group);
        if live.len() < 2 {
            return Err(ResolveError::NotApplicable {
                group: group_id,
                action: action.audit_action().to_string(),
                reason: format!("only {} live member(s) left", live.len()),
            });
        }

        let plan = match &action {
            Action::KeepOne { keep } => self.plan_keep(&group, &live, keep)?,
            Action::Promote { canonical } => self.plan_keep(&group, &live, canonical)?,
            Action::KeepBothRenamed { suffix } => self.plan_rename(&live, *suffix),
            Action::MergeFields { name } => self.plan_merge(&group, &live, name.as_deref())?,
        };

        let records: Vec<RecordId> = live.iter().map(|&s| self.slot_id(s)).collect();
        let origins = self.origins_of(&live);
        let mut entry = AuditEntry::new(
            &self.actor,
            action.audit_action(),
            Some(group_id),
            records,
            origins,
            plan.results.clone(),
        );
        if let Some(note) = &plan.note {
            entry = entry.with_note(note.clone());
        }

        tracing::info!(
            group = group_id,
            action = %action.audit_action(),
            kept = plan.results.len(),
            discarded = plan.discarded.len(),
            "decision applied"
        );

        self.commit(Some((group_id, GroupState::Resolved)), plan.writes, vec![entry]);

        Ok(Resolution {
            group: group_id,
            results: plan.results,
            discarded: plan.discarded,
            renamed: plan.renamed,
        })
    }

    /// Pending → Skipped
    pub fn skip(&mut self, group_id: usize) -> Result<(), ResolveError> {
        let group = self.group(group_id)?.clone();
        expect_state(&group, GroupState::Pending)?;
        let entry = self.state_entry(&group, AuditAction::Skip);
        self.commit(Some((group_id, GroupState::Skipped)), Vec::new(), vec![entry]);
        Ok(())
    }

    /// Skipped → Pending
    pub fn reset(&mut self, group_id: usize) -> Result<(), ResolveError> {
        let group = self.group(group_id)?.clone();
        expect_state(&group, GroupState::Skipped)?;
        let entry = self.state_entry(&group, AuditAction::Reset);
        self.commit(Some((group_id, GroupState::Pending)), Vec::new(), vec![entry]);
        Ok(())
    }

    /// Revert the most recent decision and return its audit entry
    pub fn undo(&mut self) -> Result<AuditEntry, ResolveError> {
        let frame = self.undo_stack.pop().ok_or(ResolveError::NothingToUndo)?;

        let reverted: Vec<AuditEntry> = self.audit[frame.audit.clone()].to_vec();
        let Some(last) = reverted.last().cloned() else {
            return Err(ResolveError::NothingToUndo);
        };

        for (slot, previous) in frame.slots {
            self.slots[slot] = previous;
        }
        if let Some((group, previous)) = frame.group {
            if frame.generation == self.generation {
                self.groups[group].state = previous;
            }
        }

        match self.undo_policy {
            UndoPolicy::Remove => {
                self.audit.drain(frame.audit);
            }
            UndoPolicy::Compensate => {
                let ids: Vec<&str> = reverted.iter().map(|e| e.entry_id.as_str()).collect();
                let revert = AuditEntry::new(
                    &self.actor,
                    AuditAction::Revert,
                    last.group,
                    last.records.clone(),
                    last.origins.clone(),
                    last.records.clone(),
                )
                .with_note(format!("reverts {}", ids.join(", ")));
                self.audit.push(revert);
            }
        }

        tracing::info!(action = %last.action, group = ?last.group, "decision undone");
        Ok(last)
    }

    /// Keep-one for every pending duplicate group, skip every pending
    /// similarity group; returns the number of groups touched
    pub fn apply_defaults(&mut self) -> usize {
        let pending: Vec<(usize, GroupKind)> = self
            .pending_groups()
            .map(|g| (g.id, g.kind))
            .collect();

        let mut touched = 0;
        for (id, kind) in pending {
            let outcome = match kind {
                GroupKind::Duplicate => match self.group(id).map(|g| self.live_members(g)) {
                    Ok(live) if live.len() > 1 => {
                        let keep = self.slot_id(live[0]);
                        self.apply_decision(id, Action::KeepOne { keep }).map(|_| ())
                    }
                    _ => self.skip(id),
                },
                GroupKind::Similar { .. } => self.skip(id),
            };

            match outcome {
                Ok(()) => touched += 1,
                Err(e) => tracing::warn!(group = id, error = %e, "default decision rejected"),
            }
        }
        touched
    }

    /// Enforce globally unique policy names by numeric suffixing; each rename
    /// is logged as a synthetic uniqueness audit entry
    pub fn finalize(&mut self) -> Vec<(RecordId, String, String)> {
        let mut taken: HashSet<String> = self.records().map(|r| r.name().to_string()).collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut writes = Vec::new();
        let mut entries = Vec::new();
        let mut renamed = Vec::new();

        for (slot, record) in self.slots.iter().enumerate() {
            let Some(record) = record else { continue };
            let name = record.name();
            if name.is_empty() || seen.insert(name.to_string()) {
                continue;
            }

            let new_name = next_free(name, &taken);
            taken.insert(new_name.clone());
            seen.insert(new_name.clone());

            tracing::warn!(record = %record.id, from = name, to = %new_name, "duplicate policy name renamed");

            let mut updated = record.clone();
            updated.set_field(KnownField::Name, new_name.clone());
            writes.push((slot, Some(updated)));

            entries.push(
                AuditEntry::new(
                    "system",
                    AuditAction::UniquenessViolation,
                    None,
                    vec![record.id.clone()],
                    vec![record.origin.clone()],
                    vec![record.id.clone()],
                )
                .with_note(format!("renamed '{}' to '{}'", name, new_name)),
            );
            renamed.push((record.id.clone(), name.to_string(), new_name));
        }

        if !writes.is_empty() {
            self.commit(None, writes, entries);
        }
        renamed
    }

    // ------------------------------------------------------------------------
    // PLANNING
    // ------------------------------------------------------------------------

    fn plan_keep(&self, group: &MergeGroup, live: &[usize], keep: &RecordId) -> Result<Plan, ResolveError> {
        let keep_slot = self.member_slot(group, live, keep)?;

        let discarded: Vec<usize> = live.iter().copied().filter(|&s| s != keep_slot).collect();
        Ok(Plan {
            writes: discarded.iter().map(|&s| (s, None)).collect(),
            results: vec![keep.clone()],
            discarded: discarded.iter().map(|&s| self.slot_id(s)).collect(),
            renamed: Vec::new(),
            note: None,
        })
    }

    fn plan_rename(&self, live: &[usize], suffix: RenameSuffix) -> Plan {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for &slot in live {
            if let Some(r) = &self.slots[slot] {
                *counts.entry(r.name()).or_default() += 1;
            }
        }

        let mut taken: HashSet<String> = self.records().map(|r| r.name().to_string()).collect();
        let mut writes = Vec::new();
        let mut renamed = Vec::new();
        let mut counter = 0;

        for &slot in live {
            let Some(record) = &self.slots[slot] else { continue };
            let name = record.name();
            if counts.get(name).copied().unwrap_or(0) < 2 && !name.is_empty() {
                continue;
            }

            let base = if name.is_empty() { "rule" } else { name };
            let mut candidate = match suffix {
                RenameSuffix::Origin => format!("{}-from-{}", base, record.origin),
                RenameSuffix::Counter => {
                    counter += 1;
                    format!("{}-{}", base, counter)
                }
            };
            if taken.contains(&candidate) {
                candidate = next_free(&candidate, &taken);
            }
            taken.insert(candidate.clone());

            let mut updated = record.clone();
            updated.set_field(KnownField::Name, candidate.clone());
            writes.push((slot, Some(updated)));
            renamed.push((record.id.clone(), name.to_string(), candidate));
        }

        Plan {
            writes,
            results: live.iter().map(|&s| self.slot_id(s)).collect(),
            discarded: Vec::new(),
            renamed,
            note: None,
        }
    }

    fn plan_merge(&self, group: &MergeGroup, live: &[usize], name: Option<&str>) -> Result<Plan, ResolveError> {
        let GroupKind::Similar { field } = group.kind else {
            return Err(ResolveError::NotApplicable {
                group: group.id,
                action: AuditAction::MergeFields.to_string(),
                reason: "duplicate groups have no differing field".to_string(),
            });
        };

        let members: Vec<&PolicyRecord> = live.iter().filter_map(|&s| self.slots[s].as_ref()).collect();
        let base_slot = live[0];
        let base = members[0];

        let mut seen = HashSet::new();
        let mut tokens: Vec<String> = Vec::new();
        for member in &members {
            for token in self.engine.field_tokens(member, field) {
                if seen.insert(token.clone()) {
                    tokens.push(token);
                }
            }
        }
        if self.token_order == TokenOrder::Alphabetical {
            tokens.sort();
        }
        let tokens = collapse(tokens, self.engine.wildcard(field));

        let mut merged = base.clone();
        merged.set_field(field.known(), tokens.join(" "));

        let mut renamed = Vec::new();
        let merged_name = match name {
            Some(n) => n.to_string(),
            None if !base.name().is_empty() => base.name().to_string(),
            None => format!("merged-{}", base.field(KnownField::PolicyId)),
        };
        if merged_name != base.name() {
            renamed.push((base.id.clone(), base.name().to_string(), merged_name.clone()));
            merged.set_field(KnownField::Name, merged_name);
        }

        let mut writes = vec![(base_slot, Some(merged))];
        writes.extend(live[1..].iter().map(|&s| (s, None)));

        Ok(Plan {
            writes,
            results: vec![base.id.clone()],
            discarded: live[1..].iter().map(|&s| self.slot_id(s)).collect(),
            renamed,
            note: Some(format!("{} = {}", field.column(), tokens.join(" "))),
        })
    }

    // ------------------------------------------------------------------------
    // HELPERS
    // ------------------------------------------------------------------------

    /// Apply slot writes, group transition and audit entries in one step
    fn commit(
        &mut self,
        transition: Option<(usize, GroupState)>,
        writes: Vec<(usize, Option<PolicyRecord>)>,
        entries: Vec<AuditEntry>,
    ) {
        let mut previous = Vec::with_capacity(writes.len());
        for (slot, value) in writes {
            previous.push((slot, std::mem::replace(&mut self.slots[slot], value)));
        }

        let group = transition.map(|(id, next)| {
            let prior = self.groups[id].state;
            self.groups[id].state = next;
            (id, prior)
        });

        let start = self.audit.len();
        self.audit.extend(entries);
        self.undo_stack.push(UndoFrame {
            generation: self.generation,
            group,
            slots: previous,
            audit: start..self.audit.len(),
        });
    }

    fn live_members(&self, group: &MergeGroup) -> Vec<usize> {
        group
            .members
            .iter()
            .filter_map(|id| self.index.get(id).copied())
            .filter(|&slot| self.slots[slot].is_some())
            .collect()
    }

    fn member_slot(&self, group: &MergeGroup, live: &[usize], id: &RecordId) -> Result<usize, ResolveError> {
        self.index
            .get(id)
            .copied()
            .filter(|slot| live.contains(slot))
            .ok_or_else(|| ResolveError::RecordNotInGroup {
                group: group.id,
                record: id.to_string(),
            })
    }

    fn slot_id(&self, slot: usize) -> RecordId {
        self.slots[slot]
            .as_ref()
            .map(|r| r.id.clone())
            .unwrap_or_else(|| RecordId::from(""))
    }

    fn origins_of(&self, slots: &[usize]) -> Vec<String> {
        let origins: BTreeSet<String> = slots
            .iter()
            .filter_map(|&s| self.slots[s].as_ref())
            .map(|r| r.origin.clone())
            .collect();
        origins.into_iter().collect()
    }

    fn state_entry(&self, group: &MergeGroup, action: AuditAction) -> AuditEntry {
        let live = self.live_members(group);
        let records: Vec<RecordId> = live.iter().map(|&s| self.slot_id(s)).collect();
        AuditEntry::new(
            &self.actor,
            action,
            Some(group.id),
            records.clone(),
            self.origins_of(&live),
            records,
        )
    }
}

fn expect_state(group: &MergeGroup, expected: GroupState) -> Result<(), ResolveError> {
    if group.state == expected {
        Ok(())
    } else {
        Err(ResolveError::InvalidTransition {
            group: group.id,
            state: group.state.to_string(),
            expected: expected.to_string(),
        })
    }
}

/// `<name>-N` with the smallest N not already taken
fn next_free(name: &str, taken: &HashSet<String>) -> String {
    (1..)
        .map(|n| format!("{}-{}", name, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_record(origin: &str, seq: usize, name: &str, service: &str) -> PolicyRecord {
        PolicyRecord::new(
            origin,
            seq,
            seq,
            vec![
                ("policyid".to_string(), (seq + 1).to_string()),
                ("name".to_string(), name.to_string()),
                ("srcintf".to_string(), "port1".to_string()),
                ("dstintf".to_string(), "port2".to_string()),
                ("srcaddr".to_string(), "HQ-NET".to_string()),
                ("dstaddr".to_string(), "DC-NET".to_string()),
                ("service".to_string(), service.to_string()),
                ("vendor_tag".to_string(), format!("tag-{}", seq)),
            ],
        )
    }

    fn http_pair() -> Vec<PolicyRecord> {
        vec![
            create_test_record("FW-A", 0, "Web", "HTTP"),
            create_test_record("FW-B", 1, "Web", "HTTPS"),
        ]
    }

    #[test]
    fn test_merge_fields_first_seen_union() {
        let catalog = Catalog::empty();
        let mut resolver = MergeResolver::new(http_pair(), &catalog, &EngineConfig::default());

        assert_eq!(resolver.groups().len(), 1);
        let resolution = resolver
            .apply_decision(0, Action::MergeFields { name: None })
            .unwrap();

        assert_eq!(resolution.results, vec![RecordId::from("FW-A#0")]);
        assert_eq!(resolution.discarded, vec![RecordId::from("FW-B#1")]);

        let records: Vec<&PolicyRecord> = resolver.records().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field(KnownField::Service), "HTTP HTTPS");
        assert_eq!(records[0].get("vendor_tag"), Some("tag-0"));

        let log = resolver.audit_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, AuditAction::MergeFields);
        assert_eq!(log[0].origins, vec!["FW-A", "FW-B"]);
        assert_eq!(resolver.group(0).unwrap().state, GroupState::Resolved);
    }

    #[test]
    fn test_merge_fields_alphabetical_and_named() {
        let catalog = Catalog::empty();
        let config = EngineConfig {
            token_order: TokenOrder::Alphabetical,
            ..EngineConfig::default()
        };
        let records = vec![
            create_test_record("FW-A", 0, "Web", "SSH HTTPS"),
            create_test_record("FW-B", 1, "Web", "DNS"),
        ];
        let mut resolver = MergeResolver::new(records, &catalog, &config);

        let resolution = resolver
            .apply_decision(0, Action::MergeFields { name: Some("Web-merged".to_string()) })
            .unwrap();

        let merged = resolver.record(&resolution.results[0]).unwrap();
        assert_eq!(merged.field(KnownField::Service), "DNS HTTPS SSH");
        assert_eq!(merged.name(), "Web-merged");
    }

    #[test]
    fn test_cannot_resolve_twice_without_reset() {
        let catalog = Catalog::empty();
        let mut resolver = MergeResolver::new(http_pair(), &catalog, &EngineConfig::default());

        resolver
            .apply_decision(0, Action::KeepOne { keep: RecordId::from("FW-B#1") })
            .unwrap();
        let err = resolver
            .apply_decision(0, Action::KeepOne { keep: RecordId::from("FW-A#0") })
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidTransition { .. }));

        // Skipped groups only come back through reset
        resolver.undo().unwrap();
        resolver.skip(0).unwrap();
        assert!(resolver.apply_decision(0, Action::MergeFields { name: None }).is_err());
        resolver.reset(0).unwrap();
        assert!(resolver.apply_decision(0, Action::MergeFields { name: None }).is_ok());
    }

    #[test]
    fn test_rejected_decision_leaves_state_untouched() {
        let catalog = Catalog::empty();
        let mut resolver = MergeResolver::new(http_pair(), &catalog, &EngineConfig::default());

        let err = resolver
            .apply_decision(0, Action::Promote { canonical: RecordId::from("FW-C#9") })
            .unwrap_err();
        assert!(matches!(err, ResolveError::RecordNotInGroup { .. }));
        assert_eq!(resolver.records().count(), 2);
        assert!(resolver.audit_log().is_empty());
        assert!(!resolver.can_undo());
        assert!(matches!(resolver.apply_decision(7, Action::MergeFields { name: None }), Err(ResolveError::UnknownGroup(7))));
    }

    #[test]
    fn test_keep_both_renamed_by_origin() {
        let catalog = Catalog::empty();
        let mut resolver = MergeResolver::new(http_pair(), &catalog, &EngineConfig::default());

        let resolution = resolver
            .apply_decision(0, Action::KeepBothRenamed { suffix: RenameSuffix::Origin })
            .unwrap();

        let names: Vec<&str> = resolver.records().map(|r| r.name()).collect();
        assert_eq!(names, vec!["Web-from-FW-A", "Web-from-FW-B"]);
        assert_eq!(resolution.renamed.len(), 2);
        assert!(resolution.discarded.is_empty());
    }

    #[test]
    fn test_keep_both_renamed_by_counter() {
        let catalog = Catalog::empty();
        let mut resolver = MergeResolver::new(http_pair(), &catalog, &EngineConfig::default());

        resolver
            .apply_decision(0, Action::KeepBothRenamed { suffix: RenameSuffix::Counter })
            .unwrap();

        let names: Vec<&str> = resolver.records().map(|r| r.name()).collect();
        assert_eq!(names, vec!["Web-1", "Web-2"]);
    }

    #[test]
    fn test_undo_compensates_by_default() {
        let catalog = Catalog::empty();
        let mut resolver = MergeResolver::new(http_pair(), &catalog, &EngineConfig::default());

        resolver
            .apply_decision(0, Action::KeepOne { keep: RecordId::from("FW-A#0") })
            .unwrap();
        let reverted = resolver.undo().unwrap();

        assert_eq!(reverted.action, AuditAction::KeepOne);
        assert_eq!(resolver.records().count(), 2);
        assert_eq!(resolver.group(0).unwrap().state, GroupState::Pending);

        let log = resolver.audit_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].action, AuditAction::Revert);
        assert!(log[1].note.as_deref().unwrap_or("").contains(&log[0].entry_id));
    }

    #[test]
    fn test_undo_removes_entry_when_configured() {
        let catalog = Catalog::empty();
        let config = EngineConfig {
            undo_policy: UndoPolicy::Remove,
            ..EngineConfig::default()
        };
        let mut resolver = MergeResolver::new(http_pair(), &catalog, &config);

        resolver
            .apply_decision(0, Action::MergeFields { name: None })
            .unwrap();
        resolver.undo().unwrap();

        assert!(resolver.audit_log().is_empty());
        assert_eq!(resolver.records().count(), 2);
        assert!(matches!(resolver.undo(), Err(ResolveError::NothingToUndo)));
    }

    #[test]
    fn test_finalize_suffixes_colliding_names() {
        let catalog = Catalog::empty();
        let records = vec![
            create_test_record("FW-A", 0, "HQ-to-DC", "HTTP"),
            PolicyRecord::new(
                "FW-B",
                0,
                1,
                vec![
                    ("policyid".to_string(), "7".to_string()),
                    ("name".to_string(), "HQ-to-DC".to_string()),
                    ("srcaddr".to_string(), "BRANCH".to_string()),
                ],
            ),
        ];
        let mut resolver = MergeResolver::new(records, &catalog, &EngineConfig::default());

        let renamed = resolver.finalize();
        assert_eq!(renamed.len(), 1);
        assert_eq!(renamed[0].2, "HQ-to-DC-1");

        let names: Vec<&str> = resolver.records().map(|r| r.name()).collect();
        assert_eq!(names, vec!["HQ-to-DC", "HQ-to-DC-1"]);

        let last = resolver.audit_log().last().unwrap();
        assert_eq!(last.action, AuditAction::UniquenessViolation);
        assert_eq!(last.records, vec![RecordId::from("FW-B#0")]);
    }

    #[test]
    fn test_apply_defaults() {
        let catalog = Catalog::empty();
        let records = vec![
            create_test_record("FW-A", 0, "A", "HTTP"),
            create_test_record("FW-B", 1, "B", "HTTP"),
            create_test_record("FW-C", 2, "C", "SSH"),
        ];
        let mut resolver = MergeResolver::new(records, &catalog, &EngineConfig::default());

        // One duplicate group (A,B) and one similarity group (A,B,C on service)
        assert_eq!(resolver.groups().len(), 2);
        assert_eq!(resolver.apply_defaults(), 2);

        let ids: Vec<&str> = resolver.records().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["FW-A#0", "FW-C#2"]);
        assert_eq!(resolver.groups()[1].state, GroupState::Skipped);
    }
}
