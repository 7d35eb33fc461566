// End-to-end checks across normalizer, catalog, identity engine, resolver and
// generator, plus property tests for the laws the pipeline relies on.

use policy_merge::{
    generate, read_export_from, write_records_to, Action, AuditAction, Catalog, EngineConfig,
    GroupKind, IdentityEngine, IdentityField, MergeResolver, ObjectKind, PolicyExport,
    PolicyRecord, RecordNormalizer, ViolationKind,
};
use proptest::prelude::*;

const CATALOG: &str = r#"
config firewall address
    edit "HQ-NET"
        set subnet 10.10.0.0 255.255.0.0
    next
    edit "DC-NET"
        set subnet 10.20.0.0/16
    next
    edit "Domain Controllers"
        set subnet 10.0.5.0 255.255.255.0
    next
    edit "Finance-Net"
        set subnet 10.30.0.0 255.255.0.0
    next
    edit "A"
        set subnet 10.0.1.0 255.255.255.0
    next
    edit "B"
        set subnet 10.0.2.0/24
    next
    edit "C"
        set subnet 10.0.3.0/24
    next
end
config firewall service custom
    edit "HTTP"
        set tcp-portrange 80
    next
    edit "HTTPS"
        set tcp-portrange 443
    next
    edit "SSH"
        set tcp-portrange 22
    next
end
"#;

const HEADER: &[&str] = &[
    "policyid", "name", "srcintf", "dstintf", "srcaddr", "dstaddr", "service", "action",
];

fn catalog() -> Catalog {
    Catalog::build(&[CATALOG]).unwrap()
}

fn create_test_export(origin: &str, rows: &[&[&str]]) -> PolicyExport {
    let mut all = vec![
        vec!["Firewall Policy".to_string()],
        HEADER.iter().map(|c| c.to_string()).collect(),
    ];
    all.extend(rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()));
    PolicyExport::new(origin, all)
}

fn load(exports: &[PolicyExport]) -> Vec<PolicyRecord> {
    RecordNormalizer::default()
        .normalize_all(exports)
        .unwrap()
        .into_iter()
        .flat_map(|e| e.records)
        .collect()
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_service_variants_merge_into_one_policy() {
    let catalog = catalog();
    let config = EngineConfig::default();
    let records = load(&[
        create_test_export(
            "FW-A",
            &[&["1", "Web", "port1", "port2", "HQ-NET", "DC-NET", "HTTP", "accept"]],
        ),
        create_test_export(
            "FW-B",
            &[&["1", "Web", "port1", "port2", "HQ-NET", "DC-NET", "HTTPS", "accept"]],
        ),
    ]);

    let mut resolver = MergeResolver::new(records, &catalog, &config);
    assert_eq!(resolver.groups().len(), 1);
    assert_eq!(
        resolver.groups()[0].kind,
        GroupKind::Similar {
            field: IdentityField::Service
        }
    );

    resolver
        .apply_decision(0, Action::MergeFields { name: None })
        .unwrap();
    let merged: Vec<PolicyRecord> = resolver.records().cloned().collect();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].get("service"), Some("HTTP HTTPS"));

    let script = generate(&merged, &catalog, &config).unwrap();
    assert!(script.render().contains("set service \"HTTP\" \"HTTPS\""));
}

#[test]
fn test_multiword_object_name_survives_tokenization() {
    let catalog = catalog();
    assert_eq!(
        catalog.token_names(&ObjectKind::ADDRESS_REFS, "Domain Controllers Finance-Net"),
        vec!["Domain Controllers", "Finance-Net"]
    );

    let config = EngineConfig::default();
    let records = load(&[create_test_export(
        "FW-A",
        &[&[
            "4",
            "AD",
            "port1",
            "port2",
            "Domain Controllers Finance-Net",
            "DC-NET",
            "SSH",
            "accept",
        ]],
    )]);

    let text = generate(&records, &catalog, &config).unwrap().render();
    assert!(text.contains("set srcaddr \"Domain Controllers\" \"Finance-Net\""));
    assert!(text.contains("edit \"Domain Controllers\""));
}

#[test]
fn test_duplicate_names_are_suffixed_and_audited() {
    let catalog = catalog();
    let config = EngineConfig::default();
    let records = load(&[
        create_test_export(
            "FW-A",
            &[&["3", "HQ-to-DC", "port1", "port2", "HQ-NET", "DC-NET", "HTTP", "accept"]],
        ),
        create_test_export(
            "FW-B",
            &[&["3", "HQ-to-DC", "port1", "port2", "A", "DC-NET", "SSH", "accept"]],
        ),
    ]);

    let mut resolver = MergeResolver::new(records, &catalog, &config);
    assert!(resolver.groups().is_empty());

    let renamed = resolver.finalize();
    assert_eq!(renamed.len(), 1);
    assert_eq!(renamed[0].0.as_str(), "FW-B#0");
    assert_eq!(renamed[0].2, "HQ-to-DC-1");

    let last = resolver.audit_log().last().unwrap();
    assert_eq!(last.action, AuditAction::UniquenessViolation);
    assert_eq!(last.actor, "system");
    assert_eq!(last.origins, vec!["FW-B"]);

    let merged: Vec<PolicyRecord> = resolver.records().cloned().collect();
    let text = generate(&merged, &catalog, &config).unwrap().render();
    assert!(text.contains("set name \"HQ-to-DC\""));
    assert!(text.contains("set name \"HQ-to-DC-1\""));
}

#[test]
fn test_unknown_service_names_object_and_policy() {
    let catalog = catalog();
    let config = EngineConfig::default();
    let records = load(&[create_test_export(
        "FW-C",
        &[&["12", "Files", "port1", "port2", "HQ-NET", "DC-NET", "SMB-EXT", "accept"]],
    )]);

    let err = generate(&records, &catalog, &config).unwrap_err();
    assert_eq!(err.violations.len(), 1);
    assert_eq!(err.violations[0].reference, "SMB-EXT");
    assert_eq!(err.violations[0].policy.as_deref(), Some("12@FW-C"));
    assert_eq!(
        err.violations[0].kind,
        ViolationKind::UnknownReference {
            kind: "service".to_string()
        }
    );
}

#[test]
fn test_unknown_columns_round_trip_through_csv() {
    let mut rows: Vec<Vec<String>> = vec![vec![
        "policyid".to_string(),
        "name".to_string(),
        "vendor_tag".to_string(),
    ]];
    rows.push(vec!["1".to_string(), "Web".to_string(), "legacy".to_string()]);
    let records = load(&[PolicyExport::new("FW-A", rows)]);

    let mut out = Vec::new();
    write_records_to(&mut out, &records).unwrap();
    let reread = load(&[read_export_from("FW-A", out.as_slice()).unwrap()]);

    assert_eq!(reread, records);
    assert_eq!(
        reread[0].unknown_fields().collect::<Vec<_>>(),
        vec![("vendor_tag", "legacy")]
    );
}

// ============================================================================
// PROPERTIES
// ============================================================================

fn cell(pool: &'static [&'static str]) -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(pool), 1..4).prop_map(|t| t.join(" "))
}

fn record_strategy() -> impl Strategy<Value = (String, String, String, String)> {
    (
        prop::sample::select(&["Web", "Mail", "HQ-to-DC", ""][..]),
        cell(&["A", "B", "C", "all"]),
        cell(&["HQ-NET", "DC-NET"]),
        cell(&["HTTP", "HTTPS", "SSH", "ALL"]),
    )
        .prop_map(|(n, s, d, v)| (n.to_string(), s, d, v))
}

fn build_records(specs: &[(String, String, String, String)]) -> Vec<PolicyRecord> {
    specs
        .iter()
        .enumerate()
        .map(|(i, (name, src, dst, svc))| {
            let origin = if i % 2 == 0 { "FW-A" } else { "FW-B" };
            PolicyRecord::new(
                origin,
                i / 2,
                i,
                vec![
                    ("policyid".to_string(), (i % 5).to_string()),
                    ("name".to_string(), name.clone()),
                    ("srcintf".to_string(), "port1".to_string()),
                    ("dstintf".to_string(), "port2".to_string()),
                    ("srcaddr".to_string(), src.clone()),
                    ("dstaddr".to_string(), dst.clone()),
                    ("service".to_string(), svc.clone()),
                ],
            )
        })
        .collect()
}

fn run_pipeline(records: Vec<PolicyRecord>, catalog: &Catalog, config: &EngineConfig) -> String {
    let mut resolver = MergeResolver::new(records, catalog, config);
    resolver.apply_defaults();
    resolver.finalize();
    let merged: Vec<PolicyRecord> = resolver.records().cloned().collect();
    generate(&merged, catalog, config).unwrap().render()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        .. ProptestConfig::default()
    })]

    /// Every record lands in exactly one signature class
    #[test]
    fn prop_dedupe_partitions_records(specs in prop::collection::vec(record_strategy(), 0..12)) {
        let catalog = catalog();
        let config = EngineConfig::default();
        let records = build_records(&specs);
        let engine = IdentityEngine::new(&catalog, &config);
        let report = engine.dedupe(&records);

        prop_assert_eq!(report.unique.len() + report.removed_count(), records.len());

        let mut seen = vec![0usize; records.len()];
        for &idx in &report.unique {
            seen[idx] += 1;
        }
        for group in &report.duplicate_groups {
            prop_assert!(group.members.len() >= 2);
            prop_assert!(report.unique.contains(&group.members[0]));
            for &idx in &group.members[1..] {
                seen[idx] += 1;
            }
            for &idx in &group.members {
                prop_assert_eq!(&engine.compute_signature(&records[idx]), &group.signature);
            }
        }
        prop_assert!(seen.iter().all(|&n| n == 1));
    }

    /// Identical input renders byte-identical scripts
    #[test]
    fn prop_pipeline_is_deterministic(specs in prop::collection::vec(record_strategy(), 1..10)) {
        let catalog = catalog();
        let config = EngineConfig::default();

        let first = run_pipeline(build_records(&specs), &catalog, &config);
        let second = run_pipeline(build_records(&specs), &catalog, &config);
        prop_assert_eq!(first, second);
    }

    /// Full-state emission never appends to groups
    #[test]
    fn prop_full_state_has_no_append(specs in prop::collection::vec(record_strategy(), 1..8)) {
        let catalog = catalog();
        let config = EngineConfig {
            group_threshold: 1,
            ..EngineConfig::default()
        };

        let text = run_pipeline(build_records(&specs), &catalog, &config);
        prop_assert!(!text.contains("append "));
    }

    /// The wildcard swallows every other token of its field
    #[test]
    fn prop_wildcard_dominates(tokens in prop::collection::vec(prop::sample::select(&["A", "B", "C"][..]), 0..4), at in 0usize..4) {
        let catalog = catalog();
        let config = EngineConfig::default();
        let engine = IdentityEngine::new(&catalog, &config);

        let mut tokens: Vec<&str> = tokens;
        tokens.insert(at.min(tokens.len()), "all");
        let record = PolicyRecord::new(
            "FW-A",
            0,
            0,
            vec![
                ("policyid".to_string(), "1".to_string()),
                ("srcaddr".to_string(), tokens.join(" ")),
            ],
        );

        prop_assert_eq!(engine.field_tokens(&record, IdentityField::SrcAddr), vec!["all".to_string()]);
    }
}
