//! Property-based tests using proptest
//!
//! These tests verify catalog shaping, version ordering and fragment
//! construction using randomized inputs.

use cloudschema::provider::resources::{compare_versions, group_sizes_by_region, sort_versions_desc};
use cloudschema::provider::{ProviderResources, SizeOffer, ALL_REGIONS};
use cloudschema::schema::build_fragment;
use proptest::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Generate a region slug like `nyc1`
fn arb_region() -> impl Strategy<Value = String> {
    "[a-z]{3}[0-9]"
}

/// Generate size offers drawn from a small slug pool so overlaps happen
fn arb_offers() -> impl Strategy<Value = Vec<SizeOffer>> {
    prop::collection::vec(
        (
            prop_oneof!["s-1vcpu-1gb", "s-2vcpu-2gb", "c-4", "m-8vcpu-64gb", "g-2"],
            prop::collection::vec(arb_region(), 1..5),
        )
            .prop_map(|(slug, regions)| SizeOffer {
                slug: slug.to_string(),
                regions,
            }),
        0..20,
    )
}

/// Generate versions like `1.30`, `16`, `8.0.1`
fn arb_version() -> impl Strategy<Value = String> {
    prop::collection::vec(0u32..40, 1..4).prop_map(|parts| {
        parts
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(".")
    })
}

fn arb_resources() -> impl Strategy<Value = ProviderResources> {
    (
        prop::collection::vec(arb_region(), 0..6),
        arb_offers(),
        prop::collection::btree_map(
            prop_oneof!["postgres", "mysql", "redis", "mongodb"],
            prop::collection::vec(arb_version(), 0..4),
            0..4,
        ),
        prop::option::of(prop::collection::vec(arb_version(), 0..4)),
    )
        .prop_map(|(regions, offers, databases, kubernetes)| ProviderResources {
            instance_types: group_sizes_by_region(&regions, &offers),
            regions,
            database_types: databases
                .into_iter()
                .map(|(engine, versions)| (engine.to_string(), versions))
                .collect::<BTreeMap<_, _>>(),
            kubernetes_versions: kubernetes,
            storage_types: None,
        })
}

proptest! {
    /// Every region list is sorted and only names sizes offered there
    #[test]
    fn test_grouping_respects_offers(
        regions in prop::collection::vec(arb_region(), 0..8),
        offers in arb_offers(),
    ) {
        let grouped = group_sizes_by_region(&regions, &offers);

        prop_assert!(grouped.contains_key(ALL_REGIONS));
        let everything = &grouped[ALL_REGIONS];

        for (region, slugs) in &grouped {
            let mut sorted = slugs.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(&sorted, slugs);
            prop_assert!(slugs.iter().all(|s| everything.contains(s)));

            if region != ALL_REGIONS {
                prop_assert!(!slugs.is_empty());
                for slug in slugs {
                    prop_assert!(offers
                        .iter()
                        .any(|o| &o.slug == slug && o.regions.contains(region)));
                }
            }
        }
    }

    /// Sorted versions are newest first, without duplicates, and stable
    #[test]
    fn test_version_sort_is_descending(versions in prop::collection::vec(arb_version(), 0..12)) {
        let sorted = sort_versions_desc(versions.clone());

        for pair in sorted.windows(2) {
            prop_assert_eq!(compare_versions(&pair[0], &pair[1]), Ordering::Greater);
        }
        prop_assert_eq!(sort_versions_desc(sorted.clone()), sorted.clone());
        prop_assert!(versions.iter().all(|v| sorted.contains(v)));
    }

    #[test]
    fn test_version_compare_is_antisymmetric(a in arb_version(), b in arb_version()) {
        prop_assert_eq!(compare_versions(&a, &b), compare_versions(&b, &a).reverse());
    }

    /// Equal catalogs yield byte-identical fragments
    #[test]
    fn test_fragment_is_deterministic(resources in arb_resources()) {
        let first = build_fragment("acme", &resources);
        let second = build_fragment("acme", &resources.clone());

        prop_assert_eq!(
            serde_json::to_string(&first.conditional).unwrap(),
            serde_json::to_string(&second.conditional).unwrap()
        );
        prop_assert_eq!(&first.definitions, &second.definitions);
        prop_assert_eq!(
            &first.conditional["if"]["properties"]["provider"]["const"],
            &serde_json::json!("acme")
        );
    }

    /// Only non-empty categories produce definitions
    #[test]
    fn test_fragment_omits_empty_categories(resources in arb_resources()) {
        let fragment = build_fragment("acme", &resources);

        prop_assert_eq!(
            fragment.definitions.contains_key("AcmeRegions"),
            !resources.regions.is_empty()
        );
        for (engine, versions) in &resources.database_types {
            let name = format!("Acme{}Versions", cloudschema::schema::definition_prefix(engine));
            prop_assert_eq!(fragment.definitions.contains_key(&name), !versions.is_empty());
        }
    }

    /// Catalogs survive the cache's JSON representation unchanged
    #[test]
    fn test_resources_json_roundtrip(resources in arb_resources()) {
        let restored = ProviderResources::from_value(resources.to_value()).unwrap();
        prop_assert_eq!(restored, resources);
    }
}
