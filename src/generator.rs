// 🛠️ Code Generator - resolved records → device configuration script
// Validates everything first and emits nothing when any check fails.
// Blocks come out in dependency order (objects before the policies that
// reference them) and every block states complete desired state.

use crate::catalog::{Catalog, CatalogEntry, ObjectKind, ObjectPayload};
use crate::config::EngineConfig;
use crate::error::{ValidationError, Violation, ViolationKind};
use crate::identity::{IdentityEngine, IdentityField};
use crate::normalizer::normalize_value;
use crate::record::{KnownField, PolicyRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::net::Ipv4Addr;

// ============================================================================
// OUTPUT
// ============================================================================

/// One `config ... end` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptBlock {
    /// None = policy block
    pub kind: Option<ObjectKind>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    /// Object kind, `policy` or `policy-id`
    pub kind: String,
    pub from: String,
    pub to: String,
}

impl fmt::Display for Rename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\" -> \"{}\"", self.kind, self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedScript {
    pub blocks: Vec<ScriptBlock>,
    /// Every name or id changed during emission, in emission order
    pub renames: Vec<Rename>,
    pub policy_count: usize,
    pub object_count: usize,
}

impl GeneratedScript {
    /// Comment preamble followed by every block; no timestamps so identical
    /// input renders byte-identical text
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Generated by policy-merge {}\n", crate::VERSION));
        out.push_str(&format!(
            "# policies: {}, objects: {}\n",
            self.policy_count, self.object_count
        ));
        for rename in &self.renames {
            out.push_str(&format!("# renamed {}\n", rename));
        }
        for block in &self.blocks {
            out.push('\n');
            out.push_str(&block.text);
        }
        out
    }
}

// ============================================================================
// NAME HELPERS
// ============================================================================

/// Target-safe object name: double quotes become single quotes, control
/// characters become spaces, whitespace is collapsed
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '"' => '\'',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    normalize_value(&cleaned)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// `base` if free, else `base-1`, `base-2`, ... all within `max` characters
fn unique_name(base: &str, taken: &HashSet<String>, max: Option<usize>) -> String {
    let limit = max.unwrap_or(usize::MAX);
    let first = truncate_chars(base, limit);
    if !taken.contains(&first) {
        return first;
    }

    let mut n = 1;
    loop {
        let suffix = format!("-{}", n);
        let room = limit.saturating_sub(suffix.chars().count());
        let candidate = format!("{}{}", truncate_chars(base, room), suffix);
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// First unused positive id above `after`, wrapping around to the gaps below it
fn next_free_id(used: &HashSet<u32>, after: u32) -> Option<u32> {
    let above = after.checked_add(1).map(|start| start..=u32::MAX);
    above
        .into_iter()
        .flatten()
        .chain(1..=after)
        .find(|id| !used.contains(id))
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "'"))
}

fn quoted_list(names: &[String]) -> String {
    names.iter().map(|n| quote(n)).collect::<Vec<_>>().join(" ")
}

// ============================================================================
// LITERAL CHECKS
// ============================================================================

/// `lo[-hi][:slo[-shi]]`, space separated, every port within 0..=65535
pub fn is_valid_port_range(value: &str) -> bool {
    fn range(part: &str) -> bool {
        let mut bounds = part.splitn(2, '-');
        let lo = bounds.next().and_then(|p| p.parse::<u16>().ok());
        match (lo, bounds.next()) {
            (Some(_), None) => true,
            (Some(lo), Some(hi)) => hi.parse::<u16>().map(|hi| lo <= hi).unwrap_or(false),
            _ => false,
        }
    }

    let items: Vec<&str> = value.split_whitespace().collect();
    !items.is_empty()
        && items.iter().all(|item| {
            let mut halves = item.splitn(2, ':');
            let dst = halves.next().map(range).unwrap_or(false);
            let src = halves.next().map(range).unwrap_or(true);
            dst && src
        })
}

/// `ip mask` (contiguous mask) or `ip/prefix`
pub fn is_valid_subnet(value: &str) -> bool {
    let parts: Vec<&str> = value.split_whitespace().collect();
    match parts.as_slice() {
        [ip, mask] => {
            ip.parse::<Ipv4Addr>().is_ok()
                && mask
                    .parse::<Ipv4Addr>()
                    .map(|m| {
                        let bits = u32::from(m);
                        bits.leading_ones() + bits.trailing_zeros() == 32
                    })
                    .unwrap_or(false)
        }
        [cidr] => match cidr.split_once('/') {
            Some((ip, prefix)) => {
                ip.parse::<Ipv4Addr>().is_ok()
                    && prefix.parse::<u8>().map(|p| p <= 32).unwrap_or(false)
            }
            None => false,
        },
        _ => false,
    }
}

/// Single address or `start-end` with start <= end
pub fn is_valid_ip_or_range(value: &str) -> bool {
    match value.split_once('-') {
        Some((start, end)) => match (start.trim().parse::<Ipv4Addr>(), end.trim().parse::<Ipv4Addr>()) {
            (Ok(s), Ok(e)) => s <= e,
            _ => false,
        },
        None => value.trim().parse::<Ipv4Addr>().is_ok(),
    }
}

/// (literal, valid, is_port) for every literal in an object's payload
fn payload_literals(payload: &ObjectPayload) -> Vec<(String, bool, bool)> {
    let mut out = Vec::new();
    match payload {
        ObjectPayload::Address {
            subnet,
            start_ip,
            end_ip,
            ..
        } => {
            if let Some(s) = subnet {
                out.push((s.clone(), is_valid_subnet(s), false));
            }
            match (start_ip, end_ip) {
                (Some(s), Some(e)) => {
                    let literal = format!("{}-{}", s, e);
                    let ok = is_valid_ip_or_range(&literal);
                    out.push((literal, ok, false));
                }
                (Some(ip), None) | (None, Some(ip)) => out.push((ip.clone(), false, false)),
                (None, None) => {}
            }
        }
        ObjectPayload::Service {
            tcp_portrange,
            udp_portrange,
            sctp_portrange,
            ..
        } => {
            for range in [tcp_portrange, udp_portrange, sctp_portrange].into_iter().flatten() {
                out.push((range.clone(), is_valid_port_range(range), true));
            }
        }
        ObjectPayload::NatTarget {
            extip,
            mappedip,
            extport,
            mappedport,
            ..
        } => {
            for ip in [extip, mappedip].into_iter().flatten() {
                out.push((ip.clone(), is_valid_ip_or_range(ip), false));
            }
            for port in [extport, mappedport].into_iter().flatten() {
                out.push((port.clone(), is_valid_port_range(port), true));
            }
        }
        ObjectPayload::IpPool { startip, endip, .. } => match (startip, endip) {
            (Some(s), Some(e)) => {
                let literal = format!("{}-{}", s, e);
                let ok = is_valid_ip_or_range(&literal);
                out.push((literal, ok, false));
            }
            (Some(ip), None) | (None, Some(ip)) => out.push((ip.clone(), false, false)),
            (None, None) => out.push((String::new(), false, false)),
        },
        ObjectPayload::Group { .. } => {}
    }
    out
}

// ============================================================================
// PLANNING TYPES
// ============================================================================

/// Tokenized identity fields of one policy
struct PolicyPlan<'r> {
    record: &'r PolicyRecord,
    label: String,
    name: String,
    id: u32,
    srcintf: Vec<String>,
    dstintf: Vec<String>,
    srcaddr: Vec<String>,
    dstaddr: Vec<String>,
    service: Vec<String>,
    poolname: Vec<String>,
}

impl PolicyPlan<'_> {
    /// Fields that reference catalog objects
    fn object_refs(&self) -> [(IdentityField, &Vec<String>); 3] {
        [
            (IdentityField::SrcAddr, &self.srcaddr),
            (IdentityField::DstAddr, &self.dstaddr),
            (IdentityField::Service, &self.service),
        ]
    }
}

struct EmittedObject {
    kind: ObjectKind,
    name: String,
    setters: Vec<String>,
}

// ============================================================================
// CODE GENERATOR
// ============================================================================

pub struct CodeGenerator<'a> {
    catalog: &'a Catalog,
    config: &'a EngineConfig,
    engine: IdentityEngine<'a>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(catalog: &'a Catalog, config: &'a EngineConfig) -> Self {
        CodeGenerator {
            catalog,
            config,
            engine: IdentityEngine::new(catalog, config),
        }
    }

    /// Validate and emit; any violation blocks the whole script
    pub fn generate(&self, records: &[PolicyRecord]) -> Result<GeneratedScript, ValidationError> {
        let mut violations = Vec::new();
        let mut plans: Vec<PolicyPlan> = records.iter().map(|r| self.plan_policy(r)).collect();

        for plan in &plans {
            self.check_references(plan, &mut violations);
        }

        let referenced = self.referenced_objects(&plans, &mut violations);

        for ((kind, name), policy) in &referenced {
            if let Some(entry) = self.catalog.get(*kind, name) {
                check_payload(entry, policy.clone(), &mut violations);
            }
        }

        if !violations.is_empty() {
            tracing::warn!(violations = violations.len(), "generation blocked by validation");
            return Err(ValidationError { violations });
        }

        let mut renames = Vec::new();
        let mut names = self.object_names(&referenced, &mut renames);
        self.name_policies(&mut plans, &mut renames);
        if let Err(violation) = self.number_policies(&mut plans, &mut renames) {
            tracing::warn!(%violation, "generation blocked by policy numbering");
            return Err(ValidationError {
                violations: vec![violation],
            });
        }

        let mut objects: Vec<EmittedObject> = referenced
            .keys()
            .filter_map(|(kind, name)| self.catalog.get(*kind, name))
            .map(|entry| self.emit_object(entry, &names))
            .collect();
        objects.extend(self.auto_groups(&mut plans, &mut names));

        let object_count = objects.len();
        let mut blocks = Vec::new();
        for kind in ObjectKind::EMISSION_ORDER {
            let mut of_kind: Vec<&EmittedObject> = objects.iter().filter(|o| o.kind == kind).collect();
            if of_kind.is_empty() {
                continue;
            }
            of_kind.sort_by(|a, b| a.name.cmp(&b.name));

            let mut lines = Vec::new();
            for object in of_kind {
                lines.push(format!("    edit {}", quote(&object.name)));
                lines.extend(object.setters.iter().map(|s| format!("        {}", s)));
                lines.push("    next".to_string());
            }
            blocks.push(ScriptBlock {
                kind: Some(kind),
                text: render_section(kind.section(), &lines),
            });
        }

        if !plans.is_empty() {
            let mut lines = Vec::new();
            for plan in &plans {
                lines.push(format!("    edit {}", plan.id));
                lines.extend(
                    self.policy_setters(plan, &names)
                        .into_iter()
                        .map(|s| format!("        {}", s)),
                );
                lines.push("    next".to_string());
            }
            blocks.push(ScriptBlock {
                kind: None,
                text: render_section("config firewall policy", &lines),
            });
        }

        tracing::info!(
            policies = plans.len(),
            objects = object_count,
            renames = renames.len(),
            "script generated"
        );

        Ok(GeneratedScript {
            blocks,
            renames,
            policy_count: plans.len(),
            object_count,
        })
    }

    // ------------------------------------------------------------------------
    // VALIDATION
    // ------------------------------------------------------------------------

    fn plan_policy<'r>(&self, record: &'r PolicyRecord) -> PolicyPlan<'r> {
        let tokens = |field: IdentityField| self.engine.field_tokens(record, field);
        PolicyPlan {
            record,
            label: record.policy_label(),
            name: String::new(),
            id: 0,
            srcintf: tokens(IdentityField::SrcIntf),
            dstintf: tokens(IdentityField::DstIntf),
            srcaddr: tokens(IdentityField::SrcAddr),
            dstaddr: tokens(IdentityField::DstAddr),
            service: tokens(IdentityField::Service),
            poolname: self
                .catalog
                .token_names(&ObjectKind::POOL_REFS, record.field(KnownField::PoolName)),
        }
    }

    fn check_references(&self, plan: &PolicyPlan, violations: &mut Vec<Violation>) {
        for pool in &plan.poolname {
            if !self.catalog.contains(ObjectKind::IpPool, pool) {
                violations.push(Violation {
                    policy: Some(plan.label.clone()),
                    reference: pool.clone(),
                    kind: ViolationKind::UnknownReference {
                        kind: ObjectKind::IpPool.as_str().to_string(),
                    },
                });
            }
        }

        for intf in plan.srcintf.iter().chain(&plan.dstintf) {
            if self.config.is_excluded_interface(intf) {
                violations.push(Violation {
                    policy: Some(plan.label.clone()),
                    reference: intf.clone(),
                    kind: ViolationKind::ExcludedInterface,
                });
            }
        }

        for (field, tokens) in plan.object_refs() {
            let label = if field == IdentityField::Service { "service" } else { "address" };
            for name in tokens {
                if Some(name.as_str()) != self.engine.wildcard(field)
                    && self.catalog.find(field.ref_kinds(), name).is_none()
                {
                    violations.push(Violation {
                        policy: Some(plan.label.clone()),
                        reference: name.clone(),
                        kind: ViolationKind::UnknownReference {
                            kind: label.to_string(),
                        },
                    });
                }
            }
        }
    }

    /// Objects to emit, each with the first policy that pulled it in;
    /// group members are followed transitively
    fn referenced_objects(
        &self,
        plans: &[PolicyPlan],
        violations: &mut Vec<Violation>,
    ) -> BTreeMap<(ObjectKind, String), Option<String>> {
        let mut referenced: BTreeMap<(ObjectKind, String), Option<String>> = BTreeMap::new();
        let mut queue: VecDeque<(ObjectKind, String, Option<String>)> = VecDeque::new();

        for plan in plans {
            for (field, tokens) in plan.object_refs() {
                for name in tokens {
                    if let Some(entry) = self.catalog.find(field.ref_kinds(), name) {
                        queue.push_back((entry.kind, entry.name.clone(), Some(plan.label.clone())));
                    }
                }
            }
            for pool in &plan.poolname {
                queue.push_back((ObjectKind::IpPool, pool.clone(), Some(plan.label.clone())));
            }
        }

        if self.config.emit_all_objects {
            for entry in self.catalog.entries() {
                queue.push_back((entry.kind, entry.name.clone(), None));
            }
        }

        while let Some((kind, name, policy)) = queue.pop_front() {
            if referenced.contains_key(&(kind, name.clone())) {
                continue;
            }
            let Some(entry) = self.catalog.get(kind, &name) else { continue };

            for member in entry.payload.members() {
                match self.catalog.find(kind.member_kinds(), member) {
                    Some(m) => queue.push_back((m.kind, m.name.clone(), policy.clone())),
                    None => violations.push(Violation {
                        policy: policy.clone(),
                        reference: member.clone(),
                        kind: ViolationKind::UnknownReference {
                            kind: kind.member_kinds().first().map(|k| k.as_str()).unwrap_or("object").to_string(),
                        },
                    }),
                }
            }
            referenced.insert((kind, name), policy);
        }

        referenced
    }

    // ------------------------------------------------------------------------
    // NAMING
    // ------------------------------------------------------------------------

    /// Emitted name per catalog object, unique per kind
    fn object_names(
        &self,
        referenced: &BTreeMap<(ObjectKind, String), Option<String>>,
        renames: &mut Vec<Rename>,
    ) -> HashMap<(ObjectKind, String), String> {
        let mut taken: HashMap<ObjectKind, HashSet<String>> = HashMap::new();
        let mut names = HashMap::new();

        for (kind, name) in referenced.keys() {
            let used = taken.entry(*kind).or_default();
            let emitted = unique_name(&sanitize_name(name), used, None);
            used.insert(emitted.clone());

            if &emitted != name {
                renames.push(Rename {
                    kind: kind.as_str().to_string(),
                    from: name.clone(),
                    to: emitted.clone(),
                });
            }
            names.insert((*kind, name.clone()), emitted);
        }
        names
    }

    fn name_policies(&self, plans: &mut [PolicyPlan], renames: &mut Vec<Rename>) {
        let max = self.config.policy_name_max;
        let mut taken = HashSet::new();

        for plan in plans.iter_mut() {
            let original = plan.record.name().to_string();
            let base = if original.is_empty() {
                format!("policy-{}", plan.record.field(KnownField::PolicyId))
            } else {
                sanitize_name(&original)
            };

            let emitted = unique_name(&base, &taken, Some(max));
            taken.insert(emitted.clone());

            if emitted != original {
                renames.push(Rename {
                    kind: "policy".to_string(),
                    from: original,
                    to: emitted.clone(),
                });
            }
            plan.name = emitted;
        }
    }

    /// Source id when numeric and unused, otherwise the next free id
    fn number_policies(&self, plans: &mut [PolicyPlan], renames: &mut Vec<Rename>) -> Result<(), Violation> {
        let mut used = HashSet::new();
        let mut claimed = vec![false; plans.len()];

        for (i, plan) in plans.iter_mut().enumerate() {
            if let Ok(id) = plan.record.field(KnownField::PolicyId).parse::<u32>() {
                if id > 0 && used.insert(id) {
                    plan.id = id;
                    claimed[i] = true;
                }
            }
        }

        let mut next = used.iter().copied().max().unwrap_or(0);
        for (i, plan) in plans.iter_mut().enumerate() {
            if claimed[i] {
                continue;
            }
            next = next_free_id(&used, next).ok_or_else(|| Violation {
                policy: Some(plan.label.clone()),
                reference: plan.record.field(KnownField::PolicyId).to_string(),
                kind: ViolationKind::PolicyIdExhausted,
            })?;
            used.insert(next);
            plan.id = next;
            renames.push(Rename {
                kind: "policy-id".to_string(),
                from: plan.label.clone(),
                to: next.to_string(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // EMISSION
    // ------------------------------------------------------------------------

    fn member_names(&self, kind: ObjectKind, members: &[String], names: &HashMap<(ObjectKind, String), String>) -> Vec<String> {
        let mut out: Vec<String> = members
            .iter()
            .map(|m| {
                self.catalog
                    .find(kind.member_kinds(), m)
                    .and_then(|e| names.get(&(e.kind, e.name.clone())))
                    .cloned()
                    .unwrap_or_else(|| sanitize_name(m))
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    fn group_setters(&self, members: Vec<String>, comment: Option<&String>) -> Vec<String> {
        let mut setters = Vec::new();
        if !members.is_empty() {
            let verb = if self.config.incremental_groups { "append" } else { "set" };
            setters.push(format!("{} member {}", verb, quoted_list(&members)));
        }
        if let Some(c) = comment {
            setters.push(format!("set comment {}", quote(c)));
        }
        setters
    }

    fn emit_object(&self, entry: &CatalogEntry, names: &HashMap<(ObjectKind, String), String>) -> EmittedObject {
        let mut setters = Vec::new();
        match &entry.payload {
            ObjectPayload::Address {
                subnet,
                start_ip,
                end_ip,
                fqdn,
                comment,
            } => {
                if let Some(s) = subnet {
                    setters.push(format!("set subnet {}", s));
                } else if let (Some(s), Some(e)) = (start_ip, end_ip) {
                    setters.push("set type iprange".to_string());
                    setters.push(format!("set start-ip {}", s));
                    setters.push(format!("set end-ip {}", e));
                } else if let Some(f) = fqdn {
                    setters.push("set type fqdn".to_string());
                    setters.push(format!("set fqdn {}", quote(f)));
                }
                if let Some(c) = comment {
                    setters.push(format!("set comment {}", quote(c)));
                }
            }
            ObjectPayload::Service {
                protocol,
                tcp_portrange,
                udp_portrange,
                sctp_portrange,
                comment,
            } => {
                if let Some(p) = protocol {
                    setters.push(format!("set protocol {}", p));
                }
                if let Some(r) = tcp_portrange {
                    setters.push(format!("set tcp-portrange {}", r));
                }
                if let Some(r) = udp_portrange {
                    setters.push(format!("set udp-portrange {}", r));
                }
                if let Some(r) = sctp_portrange {
                    setters.push(format!("set sctp-portrange {}", r));
                }
                if let Some(c) = comment {
                    setters.push(format!("set comment {}", quote(c)));
                }
            }
            ObjectPayload::NatTarget {
                extip,
                mappedip,
                extintf,
                portforward,
                extport,
                mappedport,
                comment,
            } => {
                if let Some(ip) = extip {
                    setters.push(format!("set extip {}", ip));
                }
                if let Some(ip) = mappedip {
                    setters.push(format!("set mappedip {}", quote(ip)));
                }
                if let Some(intf) = extintf {
                    setters.push(format!("set extintf {}", quote(intf)));
                }
                setters.push(format!(
                    "set portforward {}",
                    if *portforward { "enable" } else { "disable" }
                ));
                if *portforward {
                    if let Some(p) = extport {
                        setters.push(format!("set extport {}", p));
                    }
                    if let Some(p) = mappedport {
                        setters.push(format!("set mappedport {}", p));
                    }
                }
                if let Some(c) = comment {
                    setters.push(format!("set comment {}", quote(c)));
                }
            }
            ObjectPayload::IpPool {
                startip,
                endip,
                pool_type,
                comment,
            } => {
                if let Some(t) = pool_type {
                    setters.push(format!("set type {}", t));
                }
                if let Some(ip) = startip {
                    setters.push(format!("set startip {}", ip));
                }
                if let Some(ip) = endip {
                    setters.push(format!("set endip {}", ip));
                }
                if let Some(c) = comment {
                    setters.push(format!("set comment {}", quote(c)));
                }
            }
            ObjectPayload::Group { members, comment } => {
                let members = self.member_names(entry.kind, members, names);
                setters = self.group_setters(members, comment.as_ref());
            }
        }

        EmittedObject {
            kind: entry.kind,
            name: names
                .get(&(entry.kind, entry.name.clone()))
                .cloned()
                .unwrap_or_else(|| sanitize_name(&entry.name)),
            setters,
        }
    }

    /// Replace oversized multi-value fields with generated group objects
    fn auto_groups(
        &self,
        plans: &mut [PolicyPlan],
        names: &mut HashMap<(ObjectKind, String), String>,
    ) -> Vec<EmittedObject> {
        let threshold = self.config.group_threshold;
        let mut taken: HashMap<ObjectKind, HashSet<String>> = HashMap::new();
        for ((kind, _), emitted) in names.iter() {
            taken.entry(*kind).or_default().insert(emitted.clone());
        }

        let mut objects = Vec::new();
        for plan in plans.iter_mut() {
            let policy_name = plan.name.clone();
            let fields = [
                (&mut plan.srcaddr, IdentityField::SrcAddr, ObjectKind::AddressGroup, "src"),
                (&mut plan.dstaddr, IdentityField::DstAddr, ObjectKind::AddressGroup, "dst"),
                (&mut plan.service, IdentityField::Service, ObjectKind::ServiceGroup, "svc"),
            ];

            for (tokens, field, group_kind, tag) in fields {
                if tokens.len() <= threshold {
                    continue;
                }

                let mut members: Vec<String> = tokens
                    .iter()
                    .map(|t| {
                        self.catalog
                            .find(field.ref_kinds(), t)
                            .and_then(|e| names.get(&(e.kind, e.name.clone())))
                            .cloned()
                            .unwrap_or_else(|| sanitize_name(t))
                    })
                    .collect();
                members.sort();
                members.dedup();

                let used = taken.entry(group_kind).or_default();
                let group_name = unique_name(&format!("grp-{}-{}", policy_name, tag), used, None);
                used.insert(group_name.clone());
                names.insert((group_kind, group_name.clone()), group_name.clone());

                tracing::debug!(policy = %plan.label, group = %group_name, members = members.len(), "auto group");

                objects.push(EmittedObject {
                    kind: group_kind,
                    name: group_name.clone(),
                    setters: self.group_setters(members, None),
                });
                *tokens = vec![group_name];
            }
        }
        objects
    }

    fn policy_setters(&self, plan: &PolicyPlan, names: &HashMap<(ObjectKind, String), String>) -> Vec<String> {
        let record = plan.record;
        let emit = |tokens: &[String], kinds: &[ObjectKind], default: &str| -> String {
            if tokens.is_empty() {
                return quote(default);
            }
            let resolved: Vec<String> = tokens
                .iter()
                .map(|t| {
                    self.catalog
                        .find(kinds, t)
                        .and_then(|e| names.get(&(e.kind, e.name.clone())))
                        .cloned()
                        .unwrap_or_else(|| t.clone())
                })
                .collect();
            quoted_list(&resolved)
        };

        let or_default = |field: KnownField, default: &str| -> String {
            let value = record.field(field);
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };

        let flag = |field: KnownField, default: bool| {
            if record.flag(field).unwrap_or(default) {
                "enable"
            } else {
                "disable"
            }
        };

        let mut setters = vec![
            format!("set name {}", quote(&plan.name)),
            format!("set srcintf {}", emit(&plan.srcintf, &[], "any")),
            format!("set dstintf {}", emit(&plan.dstintf, &[], "any")),
            format!("set srcaddr {}", emit(&plan.srcaddr, IdentityField::SrcAddr.ref_kinds(), &self.config.wildcard_address)),
            format!("set dstaddr {}", emit(&plan.dstaddr, IdentityField::DstAddr.ref_kinds(), &self.config.wildcard_address)),
            format!("set service {}", emit(&plan.service, IdentityField::Service.ref_kinds(), &self.config.wildcard_service)),
            format!("set schedule {}", quote(&or_default(KnownField::Schedule, "always"))),
            format!("set action {}", or_default(KnownField::Action, "accept").to_lowercase()),
            format!("set status {}", flag(KnownField::Status, true)),
            format!("set nat {}", flag(KnownField::Nat, false)),
        ];

        if plan.poolname.is_empty() {
            setters.push("set ippool disable".to_string());
        } else {
            let pools: Vec<String> = plan
                .poolname
                .iter()
                .map(|p| {
                    names
                        .get(&(ObjectKind::IpPool, p.clone()))
                        .cloned()
                        .unwrap_or_else(|| sanitize_name(p))
                })
                .collect();
            setters.push("set ippool enable".to_string());
            setters.push(format!("set poolname {}", quoted_list(&pools)));
        }

        // Absent optional values are unset so re-applying clears stale state
        let logtraffic = record.field(KnownField::LogTraffic);
        if logtraffic.is_empty() {
            setters.push("unset logtraffic".to_string());
        } else {
            setters.push(format!("set logtraffic {}", logtraffic.to_lowercase()));
        }
        let comments = record.field(KnownField::Comments);
        if comments.is_empty() {
            setters.push("unset comments".to_string());
        } else {
            setters.push(format!("set comments {}", quote(comments)));
        }
        setters
    }
}

fn check_payload(entry: &CatalogEntry, policy: Option<String>, violations: &mut Vec<Violation>) {
    for (literal, ok, is_port) in payload_literals(&entry.payload) {
        if ok {
            continue;
        }
        let kind = if is_port {
            ViolationKind::MalformedPortRange {
                object: entry.name.clone(),
            }
        } else {
            ViolationKind::MalformedAddress {
                object: entry.name.clone(),
            }
        };
        violations.push(Violation {
            policy: policy.clone(),
            reference: literal,
            kind,
        });
    }
}

fn render_section(header: &str, lines: &[String]) -> String {
    let mut text = String::with_capacity(header.len() + lines.len() * 32);
    text.push_str(header);
    text.push('\n');
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text.push_str("end\n");
    text
}

/// Convenience wrapper around `CodeGenerator`
pub fn generate(
    records: &[PolicyRecord],
    catalog: &Catalog,
    config: &EngineConfig,
) -> Result<GeneratedScript, ValidationError> {
    CodeGenerator::new(catalog, config).generate(records)
}

// ============================================================================
// TESTS
// ============================================================================
