// 📚 Object Catalog - named addresses, services and NAT targets
// Built once per import from declarative config sources, immutable afterwards.
// Resolves multi-value cells with greedy longest-match tokenization so a
// multi-word object name is never split at its internal spaces.

use crate::config::TieBreak;
use crate::error::CatalogError;
use crate::normalizer::normalize_value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;

// ============================================================================
// OBJECT KINDS
// ============================================================================

/// Declared in emission (dependency) order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Address,
    AddressGroup,
    Service,
    ServiceGroup,
    NatTarget,
    NatGroup,
    IpPool,
}

impl ObjectKind {
    /// Objects must exist before they are referenced
    pub const EMISSION_ORDER: [ObjectKind; 7] = [
        ObjectKind::Address,
        ObjectKind::AddressGroup,
        ObjectKind::Service,
        ObjectKind::ServiceGroup,
        ObjectKind::NatTarget,
        ObjectKind::NatGroup,
        ObjectKind::IpPool,
    ];

    /// Kinds an address cell may reference
    pub const ADDRESS_REFS: [ObjectKind; 4] = [
        ObjectKind::Address,
        ObjectKind::AddressGroup,
        ObjectKind::NatTarget,
        ObjectKind::NatGroup,
    ];

    /// Kinds a service cell may reference
    pub const SERVICE_REFS: [ObjectKind; 2] = [ObjectKind::Service, ObjectKind::ServiceGroup];

    /// Kinds a pool-name cell may reference
    pub const POOL_REFS: [ObjectKind; 1] = [ObjectKind::IpPool];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Address => "address",
            ObjectKind::AddressGroup => "address-group",
            ObjectKind::Service => "service",
            ObjectKind::ServiceGroup => "service-group",
            ObjectKind::NatTarget => "nat-target",
            ObjectKind::NatGroup => "nat-group",
            ObjectKind::IpPool => "ip-pool",
        }
    }

    /// Config section header for this kind
    pub fn section(&self) -> &'static str {
        match self {
            ObjectKind::Address => "config firewall address",
            ObjectKind::AddressGroup => "config firewall addrgrp",
            ObjectKind::Service => "config firewall service custom",
            ObjectKind::ServiceGroup => "config firewall service group",
            ObjectKind::NatTarget => "config firewall vip",
            ObjectKind::NatGroup => "config firewall vipgrp",
            ObjectKind::IpPool => "config firewall ippool",
        }
    }

    pub fn from_section(header: &str) -> Option<ObjectKind> {
        ObjectKind::EMISSION_ORDER
            .iter()
            .copied()
            .find(|k| k.section() == header)
    }

    pub fn is_group(&self) -> bool {
        matches!(
            self,
            ObjectKind::AddressGroup | ObjectKind::ServiceGroup | ObjectKind::NatGroup
        )
    }

    /// Kinds a group of this kind may contain
    pub fn member_kinds(&self) -> &'static [ObjectKind] {
        match self {
            ObjectKind::AddressGroup => &[ObjectKind::Address, ObjectKind::AddressGroup],
            ObjectKind::ServiceGroup => &[ObjectKind::Service, ObjectKind::ServiceGroup],
            ObjectKind::NatGroup => &[ObjectKind::NatTarget],
            _ => &[],
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CATALOG ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectPayload {
    Address {
        subnet: Option<String>,
        start_ip: Option<String>,
        end_ip: Option<String>,
        fqdn: Option<String>,
        comment: Option<String>,
    },
    Service {
        protocol: Option<String>,
        tcp_portrange: Option<String>,
        udp_portrange: Option<String>,
        sctp_portrange: Option<String>,
        comment: Option<String>,
    },
    NatTarget {
        extip: Option<String>,
        mappedip: Option<String>,
        extintf: Option<String>,
        portforward: bool,
        extport: Option<String>,
        mappedport: Option<String>,
        comment: Option<String>,
    },
    IpPool {
        startip: Option<String>,
        endip: Option<String>,
        /// `overload`, `one-to-one`, ...
        pool_type: Option<String>,
        comment: Option<String>,
    },
    Group {
        members: Vec<String>,
        comment: Option<String>,
    },
}

impl ObjectPayload {
    fn empty_for(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Address => ObjectPayload::Address {
                subnet: None,
                start_ip: None,
                end_ip: None,
                fqdn: None,
                comment: None,
            },
            ObjectKind::Service => ObjectPayload::Service {
                protocol: None,
                tcp_portrange: None,
                udp_portrange: None,
                sctp_portrange: None,
                comment: None,
            },
            ObjectKind::NatTarget => ObjectPayload::NatTarget {
                extip: None,
                mappedip: None,
                extintf: None,
                portforward: false,
                extport: None,
                mappedport: None,
                comment: None,
            },
            ObjectKind::IpPool => ObjectPayload::IpPool {
                startip: None,
                endip: None,
                pool_type: None,
                comment: None,
            },
            ObjectKind::AddressGroup | ObjectKind::ServiceGroup | ObjectKind::NatGroup => {
                ObjectPayload::Group {
                    members: Vec::new(),
                    comment: None,
                }
            }
        }
    }

    /// Apply one `set <key> <value>` line; unknown keys are ignored
    fn apply(&mut self, key: &str, raw: &str) {
        let value = Some(strip_quotes(raw));
        match self {
            ObjectPayload::Address {
                subnet,
                start_ip,
                end_ip,
                fqdn,
                comment,
            } => match key {
                "subnet" => *subnet = Some(normalize_value(raw)),
                "start-ip" => *start_ip = value,
                "end-ip" => *end_ip = value,
                "fqdn" => *fqdn = value,
                "comment" => *comment = value,
                _ => {}
            },
            ObjectPayload::Service {
                protocol,
                tcp_portrange,
                udp_portrange,
                sctp_portrange,
                comment,
            } => match key {
                "protocol" => *protocol = value,
                "tcp-portrange" => *tcp_portrange = Some(normalize_value(&strip_quotes(raw))),
                "udp-portrange" => *udp_portrange = Some(normalize_value(&strip_quotes(raw))),
                "sctp-portrange" => *sctp_portrange = Some(normalize_value(&strip_quotes(raw))),
                "comment" => *comment = value,
                _ => {}
            },
            ObjectPayload::NatTarget {
                extip,
                mappedip,
                extintf,
                portforward,
                extport,
                mappedport,
                comment,
            } => match key {
                "extip" => *extip = value,
                "mappedip" => *mappedip = value,
                "extintf" => *extintf = value,
                "portforward" => *portforward = raw.trim().eq_ignore_ascii_case("enable"),
                "extport" => *extport = value,
                "mappedport" => *mappedport = value,
                "comment" => *comment = value,
                _ => {}
            },
            ObjectPayload::IpPool {
                startip,
                endip,
                pool_type,
                comment,
            } => match key {
                "startip" => *startip = value,
                "endip" => *endip = value,
                "type" => *pool_type = value,
                "comment" => *comment = value,
                _ => {}
            },
            ObjectPayload::Group { members, comment } => match key {
                "member" => *members = split_quoted(raw),
                "comment" => *comment = value,
                _ => {}
            },
        }
    }

    /// Apply one `append <key> <value>` line; only group members accumulate
    fn append(&mut self, key: &str, raw: &str) -> bool {
        match (self, key) {
            (ObjectPayload::Group { members, .. }, "member") => {
                for member in split_quoted(raw) {
                    if !members.contains(&member) {
                        members.push(member);
                    }
                }
                true
            }
            _ => false,
        }
    }

    pub fn members(&self) -> &[String] {
        match self {
            ObjectPayload::Group { members, .. } => members,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub kind: ObjectKind,

    /// Whitespace-collapsed name, unique within its kind
    pub name: String,

    pub payload: ObjectPayload,

    /// Index of the config source that defined it
    pub source: usize,
}

impl CatalogEntry {
    pub fn new(kind: ObjectKind, name: &str, payload: ObjectPayload) -> Self {
        CatalogEntry {
            kind,
            name: normalize_value(name),
            payload,
            source: 0,
        }
    }

    pub fn address(name: &str, subnet: &str) -> Self {
        let mut payload = ObjectPayload::empty_for(ObjectKind::Address);
        payload.apply("subnet", subnet);
        CatalogEntry::new(ObjectKind::Address, name, payload)
    }

    pub fn service(name: &str, tcp_portrange: &str) -> Self {
        let mut payload = ObjectPayload::empty_for(ObjectKind::Service);
        payload.apply("tcp-portrange", tcp_portrange);
        CatalogEntry::new(ObjectKind::Service, name, payload)
    }

    pub fn group(kind: ObjectKind, name: &str, members: &[&str]) -> Self {
        CatalogEntry::new(
            kind,
            name,
            ObjectPayload::Group {
                members: members.iter().map(|m| normalize_value(m)).collect(),
                comment: None,
            },
        )
    }

    fn token_len(&self) -> usize {
        self.name.split(' ').count()
    }
}

// ============================================================================
// CONFIG TEXT PARSING
// ============================================================================

fn edit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^edit\s+(?:"(?P<quoted>[^"]*)"|(?P<bare>\S+))\s*$"#)
            .expect("edit pattern is valid")
    })
}

fn set_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^set\s+(?P<key>\S+)\s+(?P<val>.+)$").expect("set pattern is valid")
    })
}

fn append_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^append\s+(?P<key>\S+)\s+(?P<val>.+)$").expect("append pattern is valid")
    })
}

fn strip_quotes(raw: &str) -> String {
    let s = raw.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Split `"a b" "c" d` into names, keeping quoted spaces
fn split_quoted(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in raw.chars() {
        match ch {
            '"' => {
                if in_quotes {
                    out.push(normalize_value(&current));
                    current.clear();
                }
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    out.push(normalize_value(&current));
                    current.clear();
                }
            }
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        out.push(normalize_value(&current));
    }

    out.retain(|m| !m.is_empty());
    out
}

/// Parse one config source into entries (duplicates resolved by the builder)
pub fn parse_config_source(
    text: &str,
    source_index: usize,
) -> Result<Vec<CatalogEntry>, CatalogError> {
    let syntax = |line: usize, reason: &str| CatalogError::Syntax {
        source_index,
        line: line + 1,
        reason: reason.to_string(),
    };

    let mut entries = Vec::new();
    let mut section: Option<(ObjectKind, usize)> = None;
    let mut current: Option<CatalogEntry> = None;
    let mut depth = 0usize;

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((kind, _)) = section else {
            if let Some(kind) = ObjectKind::from_section(&normalize_value(line)) {
                section = Some((kind, line_no));
                depth = 0;
            }
            continue;
        };

        // Nested config blocks inside an object are skipped wholesale
        if line.starts_with("config ") {
            depth += 1;
            continue;
        }
        if depth > 0 {
            if line == "end" {
                depth -= 1;
            }
            continue;
        }

        if line == "end" {
            if current.is_some() {
                return Err(syntax(line_no, "'end' before 'next'"));
            }
            section = None;
            continue;
        }

        if line == "next" {
            match current.take() {
                Some(entry) => entries.push(entry),
                None => return Err(syntax(line_no, "'next' without 'edit'")),
            }
            continue;
        }

        if let Some(caps) = edit_pattern().captures(line) {
            if current.is_some() {
                return Err(syntax(line_no, "'edit' before 'next'"));
            }
            let name = caps
                .name("quoted")
                .or_else(|| caps.name("bare"))
                .map(|m| m.as_str())
                .unwrap_or("");
            let name = normalize_value(name);
            if name.is_empty() {
                return Err(syntax(line_no, "empty object name"));
            }
            let mut entry = CatalogEntry::new(kind, &name, ObjectPayload::empty_for(kind));
            entry.source = source_index;
            current = Some(entry);
            continue;
        }

        if let Some(caps) = set_pattern().captures(line) {
            match current.as_mut() {
                Some(entry) => entry.payload.apply(&caps["key"], &caps["val"]),
                None => return Err(syntax(line_no, "'set' outside 'edit'")),
            }
            continue;
        }
        if let Some(caps) = append_pattern().captures(line) {
            match current.as_mut() {
                Some(entry) => {
                    if !entry.payload.append(&caps["key"], &caps["val"]) {
                        return Err(syntax(line_no, "'append' only extends group members"));
                    }
                }
                None => return Err(syntax(line_no, "'append' outside 'edit'")),
            }
            continue;
        }
        // Other statements (unset, ...) are not part of the object state
    }

    if let Some((_, start)) = section {
        return Err(syntax(start, "section is missing its 'end'"));
    }

    Ok(entries)
}

// ============================================================================
// RESOLUTION RESULTS
// ============================================================================

/// Longest catalog match at the head of a token run
#[derive(Debug, Clone, Copy)]
pub struct CatalogMatch<'a> {
    pub entry: &'a CatalogEntry,
    /// Number of whitespace tokens consumed
    pub consumed: usize,
}

/// One name out of a multi-value cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldToken {
    pub name: String,
    /// Kind of the matched catalog entry; None = literal pass-through
    pub kind: Option<ObjectKind>,
}

impl FieldToken {
    pub fn is_known(&self) -> bool {
        self.kind.is_some()
    }
}

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<(ObjectKind, String), CatalogEntry>,

    /// Longest name per kind, in tokens; bounds the greedy window
    max_tokens: HashMap<ObjectKind, usize>,

    tie_break: TieBreak,
}

impl Catalog {
    /// Catalog with no objects: every token resolves to itself
    pub fn empty() -> Self {
        Catalog::default()
    }

    /// Parse all sources in order and build the catalog
    pub fn build<S: AsRef<str>>(sources: &[S]) -> Result<Self, CatalogError> {
        Self::build_with(sources, TieBreak::default())
    }

    pub fn build_with<S: AsRef<str>>(
        sources: &[S],
        tie_break: TieBreak,
    ) -> Result<Self, CatalogError> {
        let mut builder = CatalogBuilder::new(tie_break);
        for source in sources {
            builder.add_source(source.as_ref())?;
        }
        Ok(builder.build())
    }

    pub fn get(&self, kind: ObjectKind, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(&(kind, name.to_string()))
    }

    /// First entry with this name among `kinds`, in the given order
    pub fn find(&self, kinds: &[ObjectKind], name: &str) -> Option<&CatalogEntry> {
        kinds.iter().find_map(|k| self.get(*k, name))
    }

    pub fn contains(&self, kind: ObjectKind, name: &str) -> bool {
        self.get(kind, name).is_some()
    }

    /// Entries sorted by (kind, name)
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    pub fn entries_of(&self, kind: ObjectKind) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values().filter(move |e| e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Greedy longest match of `kind` at the head of `tokens`
    pub fn resolve(&self, kind: ObjectKind, tokens: &[&str]) -> Option<CatalogMatch<'_>> {
        let window = self.max_tokens.get(&kind).copied()?.min(tokens.len());

        (1..=window).rev().find_map(|len| {
            let candidate = tokens[..len].join(" ");
            self.get(kind, &candidate).map(|entry| CatalogMatch {
                entry,
                consumed: len,
            })
        })
    }

    /// Longest match over several kinds; equal lengths go through the tie-break
    pub fn resolve_any(&self, kinds: &[ObjectKind], tokens: &[&str]) -> Option<CatalogMatch<'_>> {
        let mut best: Option<(usize, CatalogMatch<'_>)> = None;

        for (priority, kind) in kinds.iter().enumerate() {
            let Some(m) = self.resolve(*kind, tokens) else {
                continue;
            };

            best = match best {
                None => Some((priority, m)),
                Some((_, b)) if m.consumed > b.consumed => Some((priority, m)),
                Some((bp, b)) if m.consumed == b.consumed => {
                    tracing::debug!(
                        name = %m.entry.name,
                        first = %b.entry.kind,
                        second = %m.entry.kind,
                        "equal-length catalog match"
                    );
                    let replace = match self.tie_break {
                        TieBreak::LexicalFirst => {
                            (&m.entry.name, m.entry.kind) < (&b.entry.name, b.entry.kind)
                        }
                        TieBreak::KindPriority => priority < bp,
                    };
                    if replace {
                        Some((priority, m))
                    } else {
                        Some((bp, b))
                    }
                }
                keep => keep,
            };
        }

        best.map(|(_, m)| m)
    }

    /// Split a multi-value cell into names
    ///
    /// Longest catalog runs win; leftovers pass through as single literal
    /// tokens, except that a token ending in `:` absorbs the next one
    /// (`VLAN201: Office`).
    pub fn tokenize(&self, kinds: &[ObjectKind], cell: &str) -> Vec<FieldToken> {
        let tokens: Vec<&str> = cell.split_whitespace().collect();
        let mut out = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            if let Some(m) = self.resolve_any(kinds, &tokens[i..]) {
                out.push(FieldToken {
                    name: m.entry.name.clone(),
                    kind: Some(m.entry.kind),
                });
                i += m.consumed;
                continue;
            }

            let token = tokens[i];
            if token.ends_with(':') && i + 1 < tokens.len() {
                out.push(FieldToken {
                    name: format!("{} {}", token, tokens[i + 1]),
                    kind: None,
                });
                i += 2;
            } else {
                out.push(FieldToken {
                    name: token.to_string(),
                    kind: None,
                });
                i += 1;
            }
        }

        out
    }

    /// Names only, in cell order
    pub fn token_names(&self, kinds: &[ObjectKind], cell: &str) -> Vec<String> {
        self.tokenize(kinds, cell).into_iter().map(|t| t.name).collect()
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Accumulates sources; conflicting redefinitions abort construction
pub struct CatalogBuilder {
    entries: BTreeMap<(ObjectKind, String), CatalogEntry>,
    sources: usize,
    tie_break: TieBreak,
}

impl CatalogBuilder {
    pub fn new(tie_break: TieBreak) -> Self {
        CatalogBuilder {
            entries: BTreeMap::new(),
            sources: 0,
            tie_break,
        }
    }

    /// Parse and register every object of one config source
    pub fn add_source(&mut self, text: &str) -> Result<&mut Self, CatalogError> {
        let index = self.sources;
        let parsed = parse_config_source(text, index)?;
        self.sources += 1;

        for entry in parsed {
            self.register(entry)?;
        }
        Ok(self)
    }

    /// Add one entry; identical redefinitions are accepted silently
    pub fn register(&mut self, entry: CatalogEntry) -> Result<&mut Self, CatalogError> {
        let key = (entry.kind, entry.name.clone());

        if let Some(existing) = self.entries.get(&key) {
            if existing.payload != entry.payload {
                return Err(CatalogError::Conflict {
                    kind: entry.kind,
                    name: entry.name,
                    first_source: existing.source,
                    second_source: entry.source,
                });
            }
            return Ok(self);
        }

        self.entries.insert(key, entry);
        Ok(self)
    }

    pub fn build(self) -> Catalog {
        let mut max_tokens: HashMap<ObjectKind, usize> = HashMap::new();
        for entry in self.entries.values() {
            let slot = max_tokens.entry(entry.kind).or_insert(0);
            *slot = (*slot).max(entry.token_len());
        }

        tracing::info!(
            objects = self.entries.len(),
            sources = self.sources,
            "catalog built"
        );

        Catalog {
            entries: self.entries,
            max_tokens,
            tie_break: self.tie_break,
        }
    }
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new(TieBreak::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
config firewall address
    edit "HQ"
        set subnet 10.10.0.0 255.255.0.0
    next
    edit "Domain Controllers"
        set subnet 10.0.5.0 255.255.255.0
        set comment "AD servers"
    next
end
config firewall addrgrp
    edit "Sites"
        set member "HQ" "Domain Controllers"
    next
end
config firewall service custom
    edit "Web"
        set tcp-portrange 80-80 443-443
    next
end
config firewall service group
    edit "Common"
        set member "Web"
    next
end
config firewall vip
    edit "VIP1"
        set extip 1.2.3.4
        set mappedip "10.1.1.10"
        set portforward enable
    next
end
config firewall vipgrp
    edit "VIPS"
        set member "VIP1"
    next
end
"#;

    #[test]
    fn test_parse_minimal_objects() {
        let catalog = Catalog::build(&[MINIMAL]).unwrap();

        assert_eq!(catalog.len(), 7);
        assert!(catalog.contains(ObjectKind::Address, "HQ"));
        assert_eq!(
            catalog.get(ObjectKind::AddressGroup, "Sites").unwrap().payload.members(),
            &["HQ".to_string(), "Domain Controllers".to_string()]
        );

        match &catalog.get(ObjectKind::Service, "Web").unwrap().payload {
            ObjectPayload::Service { tcp_portrange, .. } => {
                assert_eq!(tcp_portrange.as_deref(), Some("80-80 443-443"));
            }
            other => panic!("unexpected payload {:?}", other),
        }

        match &catalog.get(ObjectKind::NatTarget, "VIP1").unwrap().payload {
            ObjectPayload::NatTarget {
                mappedip,
                portforward,
                ..
            } => {
                assert_eq!(mappedip.as_deref(), Some("10.1.1.10"));
                assert!(*portforward);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert!(catalog.contains(ObjectKind::NatGroup, "VIPS"));
    }

    #[test]
    fn test_greedy_longest_match_keeps_multiword_name() {
        let catalog = Catalog::build(&[MINIMAL]).unwrap();

        let tokens = catalog.tokenize(&ObjectKind::ADDRESS_REFS, "Domain Controllers Finance-Net");

        assert_eq!(
            tokens,
            vec![
                FieldToken {
                    name: "Domain Controllers".to_string(),
                    kind: Some(ObjectKind::Address),
                },
                FieldToken {
                    name: "Finance-Net".to_string(),
                    kind: None,
                },
            ]
        );
    }

    #[test]
    fn test_resolve_reports_consumed_tokens() {
        let catalog = Catalog::build(&[MINIMAL]).unwrap();

        let m = catalog
            .resolve(ObjectKind::Address, &["Domain", "Controllers", "HQ"])
            .unwrap();
        assert_eq!(m.entry.name, "Domain Controllers");
        assert_eq!(m.consumed, 2);

        assert!(catalog.resolve(ObjectKind::Address, &["Domain"]).is_none());
        assert!(catalog.resolve(ObjectKind::Service, &["HQ"]).is_none());
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let catalog = Catalog::build(&[MINIMAL]).unwrap();
        let tokens = catalog.tokenize(&ObjectKind::ADDRESS_REFS, "domain controllers");
        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(|t| !t.is_known()));
    }

    #[test]
    fn test_prefixed_tokens_stay_together_without_catalog() {
        let names = Catalog::empty().token_names(
            &ObjectKind::ADDRESS_REFS,
            "VLAN201: Office VLAN201: WIFI VLAN10: SRV",
        );
        assert_eq!(names, vec!["VLAN201: Office", "VLAN201: WIFI", "VLAN10: SRV"]);
    }

    #[test]
    fn test_conflicting_redefinition_fails() {
        let second = r#"
config firewall address
    edit "HQ"
        set subnet 10.99.0.0 255.255.0.0
    next
end
"#;
        let err = Catalog::build(&[MINIMAL, second]).unwrap_err();
        match err {
            CatalogError::Conflict {
                kind,
                name,
                first_source,
                second_source,
            } => {
                assert_eq!(kind, ObjectKind::Address);
                assert_eq!(name, "HQ");
                assert_eq!(first_source, 0);
                assert_eq!(second_source, 1);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_identical_redefinition_and_additions_are_accepted() {
        let second = r#"
config firewall address
    edit "HQ"
        set subnet 10.10.0.0 255.255.0.0
    next
    edit "Branch"
        set subnet 10.30.0.0 255.255.0.0
    next
end
"#;
        let catalog = Catalog::build(&[MINIMAL, second]).unwrap();
        assert_eq!(catalog.len(), 8);
        assert_eq!(catalog.get(ObjectKind::Address, "HQ").unwrap().source, 0);
    }

    #[test]
    fn test_same_name_in_other_kind_is_not_a_conflict() {
        let mut builder = CatalogBuilder::default();
        builder
            .register(CatalogEntry::address("DNS", "10.0.0.53 255.255.255.255"))
            .unwrap();
        builder
            .register(CatalogEntry::service("DNS", "53"))
            .unwrap();
        let catalog = builder.build();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_tie_break_between_kinds() {
        let mut builder = CatalogBuilder::new(TieBreak::KindPriority);
        builder
            .register(CatalogEntry::address("Shared", "10.0.0.1 255.255.255.255"))
            .unwrap();
        builder
            .register(CatalogEntry::group(ObjectKind::AddressGroup, "Shared", &["x"]))
            .unwrap();
        let catalog = builder.build();

        let m = catalog
            .resolve_any(&[ObjectKind::AddressGroup, ObjectKind::Address], &["Shared"])
            .unwrap();
        assert_eq!(m.entry.kind, ObjectKind::AddressGroup);

        let lexical = Catalog {
            tie_break: TieBreak::LexicalFirst,
            ..catalog
        };
        let m = lexical
            .resolve_any(&[ObjectKind::AddressGroup, ObjectKind::Address], &["Shared"])
            .unwrap();
        assert_eq!(m.entry.kind, ObjectKind::Address);
    }

    #[test]
    fn test_syntax_errors() {
        let set_outside = "config firewall address\n    set subnet 1.1.1.1 255.255.255.255\nend\n";
        assert!(matches!(
            Catalog::build(&[set_outside]),
            Err(CatalogError::Syntax { line: 2, .. })
        ));

        let unterminated = "config firewall address\n    edit \"A\"\n    next\n";
        assert!(matches!(
            Catalog::build(&[unterminated]),
            Err(CatalogError::Syntax { line: 1, .. })
        ));
    }

    #[test]
    fn test_nested_blocks_and_other_sections_are_skipped() {
        let text = r#"
config system interface
    edit "port1"
        set ip 192.0.2.1 255.255.255.0
    next
end
config firewall address
    edit "Tagged"
        set subnet 10.1.0.0 255.255.0.0
        config tagging
            edit "t1"
                set category "default"
            next
        end
    next
end
"#;
        let catalog = Catalog::build(&[text]).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains(ObjectKind::Address, "Tagged"));
    }

    #[test]
    fn test_append_member_extends_group() {
        let text = r#"
config firewall addrgrp
    edit "Sites"
        set member "HQ"
        append member "DC" "HQ"
    next
end
"#;
        let catalog = Catalog::build(&[text]).unwrap();
        assert_eq!(
            catalog.get(ObjectKind::AddressGroup, "Sites").unwrap().payload.members(),
            &["HQ".to_string(), "DC".to_string()]
        );

        let not_a_group = "config firewall address\n    edit \"A\"\n        append subnet 1.1.1.1\n    next\nend\n";
        assert!(matches!(
            Catalog::build(&[not_a_group]),
            Err(CatalogError::Syntax { line: 3, .. })
        ));
    }

    #[test]
    fn test_parse_ip_pool() {
        let text = r#"
config firewall ippool
    edit "SNAT-POOL"
        set type overload
        set startip 203.0.113.10
        set endip 203.0.113.20
        set comment "outbound"
    next
end
"#;
        let catalog = Catalog::build(&[text]).unwrap();
        match &catalog.get(ObjectKind::IpPool, "SNAT-POOL").unwrap().payload {
            ObjectPayload::IpPool {
                startip,
                endip,
                pool_type,
                comment,
            } => {
                assert_eq!(startip.as_deref(), Some("203.0.113.10"));
                assert_eq!(endip.as_deref(), Some("203.0.113.20"));
                assert_eq!(pool_type.as_deref(), Some("overload"));
                assert_eq!(comment.as_deref(), Some("outbound"));
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert!(catalog.find(&ObjectKind::POOL_REFS, "SNAT-POOL").is_some());
    }
}
