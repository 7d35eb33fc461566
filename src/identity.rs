// 🔍 Identity & Similarity Engine - exact duplicates and one-field neighbours
// Everything is hash-bucketed (no pairwise sweep over the whole set) and every
// output is ordered by (identity signature, first-seen position), never by
// hash iteration order.

use crate::catalog::{Catalog, ObjectKind};
use crate::config::EngineConfig;
use crate::record::{KnownField, PolicyRecord, RecordId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};

// ============================================================================
// IDENTITY FIELDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdentityField {
    SrcAddr,
    DstAddr,
    SrcIntf,
    DstIntf,
    Service,
}

impl IdentityField {
    pub const ALL: [IdentityField; 5] = [
        IdentityField::SrcAddr,
        IdentityField::DstAddr,
        IdentityField::SrcIntf,
        IdentityField::DstIntf,
        IdentityField::Service,
    ];

    pub fn index(&self) -> usize {
        match self {
            IdentityField::SrcAddr => 0,
            IdentityField::DstAddr => 1,
            IdentityField::SrcIntf => 2,
            IdentityField::DstIntf => 3,
            IdentityField::Service => 4,
        }
    }

    pub fn known(&self) -> KnownField {
        match self {
            IdentityField::SrcAddr => KnownField::SrcAddr,
            IdentityField::DstAddr => KnownField::DstAddr,
            IdentityField::SrcIntf => KnownField::SrcIntf,
            IdentityField::DstIntf => KnownField::DstIntf,
            IdentityField::Service => KnownField::Service,
        }
    }

    /// Catalog kinds used to tokenize this field
    pub fn ref_kinds(&self) -> &'static [ObjectKind] {
        match self {
            IdentityField::SrcAddr | IdentityField::DstAddr => &ObjectKind::ADDRESS_REFS,
            IdentityField::Service => &ObjectKind::SERVICE_REFS,
            IdentityField::SrcIntf | IdentityField::DstIntf => &[],
        }
    }

    pub fn column(&self) -> &'static str {
        self.known().column()
    }
}

// ============================================================================
// IDENTITY SIGNATURE
// ============================================================================

/// Five normalized identity fields, each an order-normalized token set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentitySignature {
    values: [Vec<String>; 5],
}

impl IdentitySignature {
    pub fn value(&self, field: IdentityField) -> &[String] {
        &self.values[field.index()]
    }

    /// Fields whose token sets differ
    pub fn differing_fields(&self, other: &IdentitySignature) -> Vec<IdentityField> {
        IdentityField::ALL
            .iter()
            .copied()
            .filter(|f| self.value(*f) != other.value(*f))
            .collect()
    }

    /// The four fields other than `excluded`, borrowed for bucketing
    fn key_without(&self, excluded: IdentityField) -> [&[String]; 4] {
        let mut key: [&[String]; 4] = [&[]; 4];
        let mut slot = 0;
        for field in IdentityField::ALL {
            if field != excluded {
                key[slot] = self.value(field);
                slot += 1;
            }
        }
        key
    }

    /// SHA-256 over the canonical encoding, stable across runs
    pub fn fingerprint(&self) -> String {
        fingerprint_parts(self.values.iter().map(|v| v.as_slice()))
    }
}

fn fingerprint_parts<'a>(parts: impl Iterator<Item = &'a [String]>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        for token in part {
            hasher.update(token.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// ANALYSIS RESULTS
// ============================================================================

/// Records sharing one identity signature (indices into the analysed slice)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub signature: IdentitySignature,
    /// First-seen order, at least two members
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupeReport {
    /// One representative per signature (the first seen), input order
    pub unique: Vec<usize>,
    pub duplicate_groups: Vec<DuplicateGroup>,
}

impl DedupeReport {
    pub fn removed_count(&self) -> usize {
        self.duplicate_groups.iter().map(|g| g.members.len() - 1).sum()
    }
}

/// Records agreeing on four identity fields and differing in `field`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityGroup {
    pub field: IdentityField,
    /// First-seen order, at least two members
    pub members: Vec<usize>,
    /// Mean pairwise token-set similarity of the differing field
    pub score: f64,
    /// Fingerprint of the four shared fields
    pub key: String,
}

/// A record claimed by more than one candidate grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityAmbiguity {
    pub record: RecordId,
    pub chosen: IdentityField,
    pub rejected: IdentityField,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub groups: Vec<SimilarityGroup>,
    pub ambiguities: Vec<IdentityAmbiguity>,
}

struct Candidate {
    field: IdentityField,
    members: Vec<usize>,
    score: f64,
    origins: Vec<String>,
}

// ============================================================================
// IDENTITY ENGINE
// ============================================================================

pub struct IdentityEngine<'a> {
    catalog: &'a Catalog,

    /// Dominant token of address fields (default: "all")
    wildcard_address: String,

    /// Dominant token of service fields (default: "ALL")
    wildcard_service: String,
}

impl<'a> IdentityEngine<'a> {
    pub fn new(catalog: &'a Catalog, config: &EngineConfig) -> Self {
        IdentityEngine {
            catalog,
            wildcard_address: config.wildcard_address.clone(),
            wildcard_service: config.wildcard_service.clone(),
        }
    }

    /// Dominant token for a field, if it has one
    pub fn wildcard(&self, field: IdentityField) -> Option<&str> {
        match field {
            IdentityField::SrcAddr | IdentityField::DstAddr => Some(&self.wildcard_address),
            IdentityField::Service => Some(&self.wildcard_service),
            IdentityField::SrcIntf | IdentityField::DstIntf => None,
        }
    }

    /// Tokens of one field in first-seen order, deduplicated, with dominance
    /// applied
    pub fn field_tokens(&self, record: &PolicyRecord, field: IdentityField) -> Vec<String> {
        let names = self
            .catalog
            .token_names(field.ref_kinds(), record.field(field.known()));
        collapse(dedup_first_seen(names), self.wildcard(field))
    }

    pub fn compute_signature(&self, record: &PolicyRecord) -> IdentitySignature {
        let values = IdentityField::ALL.map(|field| {
            let mut tokens = self.field_tokens(record, field);
            tokens.sort();
            tokens
        });
        IdentitySignature { values }
    }

    /// Token-set Jaccard with dominance; single-token fields are exact-match
    pub fn score(&self, field: IdentityField, a: &[String], b: &[String]) -> f64 {
        let wildcard = self.wildcard(field);
        let a = collapse(a.to_vec(), wildcard);
        let b = collapse(b.to_vec(), wildcard);

        if a.len() <= 1 && b.len() <= 1 {
            return if a == b { 1.0 } else { 0.0 };
        }

        jaccard(&a, &b)
    }

    /// Score two records on one field
    pub fn score_records(&self, field: IdentityField, a: &PolicyRecord, b: &PolicyRecord) -> f64 {
        self.score(field, &self.field_tokens(a, field), &self.field_tokens(b, field))
    }

    // ------------------------------------------------------------------------
    // DEDUPLICATION
    // ------------------------------------------------------------------------

    /// Partition records by exact identity signature
    pub fn dedupe(&self, records: &[PolicyRecord]) -> DedupeReport {
        let signatures: Vec<IdentitySignature> =
            records.iter().map(|r| self.compute_signature(r)).collect();

        let mut buckets: HashMap<&IdentitySignature, Vec<usize>> = HashMap::new();
        for (idx, sig) in signatures.iter().enumerate() {
            buckets.entry(sig).or_default().push(idx);
        }

        let mut unique: Vec<usize> = buckets.values().map(|members| members[0]).collect();
        unique.sort_unstable();

        let mut duplicate_groups: Vec<DuplicateGroup> = buckets
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(sig, members)| DuplicateGroup {
                signature: sig.clone(),
                members,
            })
            .collect();
        duplicate_groups.sort_by(|a, b| {
            a.signature
                .cmp(&b.signature)
                .then(a.members[0].cmp(&b.members[0]))
        });

        tracing::info!(
            records = records.len(),
            unique = unique.len(),
            duplicate_groups = duplicate_groups.len(),
            "deduplication complete"
        );

        DedupeReport {
            unique,
            duplicate_groups,
        }
    }

    /// Records that survive deduplication, first-seen order
    pub fn unique_records(&self, records: &[PolicyRecord]) -> Vec<PolicyRecord> {
        self.dedupe(records)
            .unique
            .into_iter()
            .map(|i| records[i].clone())
            .collect()
    }

    // ------------------------------------------------------------------------
    // SIMILARITY
    // ------------------------------------------------------------------------

    /// Disjoint groups of records differing in exactly one identity field
    pub fn find_similar(&self, records: &[PolicyRecord]) -> SimilarityReport {
        let signatures: Vec<IdentitySignature> =
            records.iter().map(|r| self.compute_signature(r)).collect();

        let mut candidates = Vec::new();
        for field in IdentityField::ALL {
            candidates.extend(self.candidates_for(field, records, &signatures));
        }

        // Best score first, then larger group, then origin tags
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.members.len().cmp(&a.members.len()))
                .then_with(|| a.origins.cmp(&b.origins))
                .then_with(|| signatures[a.members[0]].cmp(&signatures[b.members[0]]))
                .then_with(|| a.members[0].cmp(&b.members[0]))
                .then_with(|| a.field.cmp(&b.field))
        });

        let mut claimed: Vec<Option<IdentityField>> = vec![None; records.len()];
        let mut groups = Vec::new();
        let mut ambiguities = Vec::new();

        for candidate in candidates {
            let mut live = Vec::with_capacity(candidate.members.len());
            for &idx in &candidate.members {
                match claimed[idx] {
                    Some(chosen) => {
                        tracing::debug!(
                            record = %records[idx].id,
                            chosen = ?chosen,
                            rejected = ?candidate.field,
                            "record claimed by competing similarity groupings"
                        );
                        ambiguities.push(IdentityAmbiguity {
                            record: records[idx].id.clone(),
                            chosen,
                            rejected: candidate.field,
                        });
                    }
                    None => live.push(idx),
                }
            }

            let distinct: HashSet<&[String]> = live
                .iter()
                .map(|&i| signatures[i].value(candidate.field))
                .collect();
            if live.len() < 2 || distinct.len() < 2 {
                continue;
            }

            for &idx in &live {
                claimed[idx] = Some(candidate.field);
            }

            let score = if live.len() == candidate.members.len() {
                candidate.score
            } else {
                self.cohesion(candidate.field, &live, &signatures)
            };

            groups.push(SimilarityGroup {
                field: candidate.field,
                key: fingerprint_parts(
                    signatures[live[0]].key_without(candidate.field).into_iter(),
                ),
                members: live,
                score,
            });
        }

        groups.sort_by(|a, b| {
            signatures[a.members[0]]
                .cmp(&signatures[b.members[0]])
                .then(a.members[0].cmp(&b.members[0]))
        });

        tracing::info!(
            records = records.len(),
            groups = groups.len(),
            ambiguities = ambiguities.len(),
            "similarity analysis complete"
        );

        SimilarityReport {
            groups,
            ambiguities,
        }
    }

    fn candidates_for(
        &self,
        field: IdentityField,
        records: &[PolicyRecord],
        signatures: &[IdentitySignature],
    ) -> Vec<Candidate> {
        let mut buckets: HashMap<[&[String]; 4], Vec<usize>> = HashMap::new();
        for (idx, sig) in signatures.iter().enumerate() {
            buckets.entry(sig.key_without(field)).or_default().push(idx);
        }

        buckets
            .into_values()
            .filter(|members| members.len() > 1)
            .filter(|members| {
                let first = signatures[members[0]].value(field);
                members.iter().any(|&i| signatures[i].value(field) != first)
            })
            .map(|members| {
                let origins: BTreeSet<String> =
                    members.iter().map(|&i| records[i].origin.clone()).collect();
                Candidate {
                    field,
                    score: self.cohesion(field, &members, signatures),
                    origins: origins.into_iter().collect(),
                    members,
                }
            })
            .collect()
    }

    /// Mean pairwise score over the distinct values of `field`
    fn cohesion(&self, field: IdentityField, members: &[usize], signatures: &[IdentitySignature]) -> f64 {
        let mut values: Vec<&[String]> = members.iter().map(|&i| signatures[i].value(field)).collect();
        values.sort();
        values.dedup();

        let mut total = 0.0;
        let mut pairs = 0usize;
        for i in 0..values.len() {
            for j in (i + 1)..values.len() {
                total += self.score(field, values[i], values[j]);
                pairs += 1;
            }
        }

        if pairs == 0 {
            1.0
        } else {
            total / pairs as f64
        }
    }
}

// ============================================================================
// TOKEN HELPERS
// ============================================================================

fn dedup_first_seen(tokens: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// A dominant token swallows every other member of its field
pub fn collapse(tokens: Vec<String>, wildcard: Option<&str>) -> Vec<String> {
    match wildcard {
        Some(w) if tokens.iter().any(|t| t == w) => vec![w.to_string()],
        _ => tokens,
    }
}

/// |A∩B| / |A∪B|; two empty sets are identical
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<&String> = a.iter().collect();
    let b: HashSet<&String> = b.iter().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    intersection as f64 / union as f64
}

// ============================================================================
// TESTS
// ============================================================================
