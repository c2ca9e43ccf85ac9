//! Identity resolution
//!
//! Groups unresolved variants by (console family, normalized name), finds or
//! creates one canonical entity per group and links the variants to it.
//! Each group is committed on its own, so an interrupted run resumes cleanly:
//! only variants still lacking an owner are considered on the next pass.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::classify::detect_region;
use crate::models::{CanonicalEntity, NewEntity, RegionTag, Variant};
use crate::normalize::{console_family, create_slug, normalize_name, strip_region_markers};
use crate::storage::SharedRepository;

/// Product names containing this marker never merge with other variants
const DO_NOT_MERGE_MARKER: &str = "collector";

/// Slug used when both console family and title slugify to nothing
const FALLBACK_SLUG: &str = "untitled";

/// Counters for one resolver pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub groups: usize,
    pub entities_created: usize,
    pub entities_reused: usize,
    pub variants_linked: usize,
    /// Variants whose name normalizes to nothing
    pub variants_skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    family: String,
    match_key: String,
}

/// Batch job consolidating orphan variants into canonical entities
pub struct IdentityResolver {
    repo: SharedRepository,
}

impl IdentityResolver {
    pub fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }

    /// Run one resolution pass over every unresolved variant
    pub fn run(&self) -> Result<ResolveStats> {
        let orphans = self.repo.unresolved_variants()?;
        let mut stats = ResolveStats::default();

        if orphans.is_empty() {
            debug!("No unresolved variants");
            return Ok(stats);
        }

        let groups = partition(orphans, &mut stats);
        stats.groups = groups.len();

        for (key, variants) in groups {
            let (entity, created) = self.resolve_entity(&key, &variants)?;
            if created {
                stats.entities_created += 1;
            } else {
                stats.entities_reused += 1;
            }

            let links: Vec<(i64, RegionTag)> = variants
                .iter()
                .map(|v| (v.id, region_tag_for(v)))
                .collect();
            let linked = self.repo.link_variants(entity.id, &links)?;
            stats.variants_linked += linked;

            debug!(
                entity_id = entity.id,
                slug = %entity.slug,
                created = created,
                linked = linked,
                "Resolved variant group"
            );
        }

        info!(
            groups = stats.groups,
            created = stats.entities_created,
            reused = stats.entities_reused,
            linked = stats.variants_linked,
            skipped = stats.variants_skipped,
            "Identity resolution pass complete"
        );

        Ok(stats)
    }

    /// Find the entity owning this group's key or create it at the first
    /// free slug in the sequence `base`, `base-2`, `base-3`, ...
    fn resolve_entity(
        &self,
        key: &GroupKey,
        variants: &[Variant],
    ) -> Result<(CanonicalEntity, bool)> {
        let seed = seed_variant(variants);
        let title = display_title(&seed.product_name);
        let mut base = create_slug(&key.family, &title);
        if base.is_empty() {
            base = FALLBACK_SLUG.to_string();
        }

        let mut suffix = 1usize;
        loop {
            let slug = if suffix == 1 {
                base.clone()
            } else {
                format!("{base}-{suffix}")
            };

            match self.repo.find_entity_by_slug(&slug)? {
                Some(existing)
                    if existing.console_family == key.family
                        && existing.match_key == key.match_key =>
                {
                    return Ok((existing, false));
                }
                Some(_) => {
                    debug!(slug = %slug, "Slug taken by another title");
                    suffix += 1;
                }
                None => {
                    let entity = self.repo.create_entity(&NewEntity {
                        console_family: key.family.clone(),
                        title,
                        slug,
                        match_key: key.match_key.clone(),
                        metadata: seed.metadata.clone(),
                    })?;
                    return Ok((entity, true));
                }
            }
        }
    }
}

fn partition(orphans: Vec<Variant>, stats: &mut ResolveStats) -> BTreeMap<GroupKey, Vec<Variant>> {
    let mut groups: BTreeMap<GroupKey, Vec<Variant>> = BTreeMap::new();

    for variant in orphans {
        let name_key = normalize_name(&variant.product_name);
        if name_key.is_empty() {
            warn!(
                variant_id = variant.id,
                product = %variant.product_name,
                "Product name normalizes to nothing, skipping"
            );
            stats.variants_skipped += 1;
            continue;
        }

        let match_key = if name_key.contains(DO_NOT_MERGE_MARKER) {
            format!("{DO_NOT_MERGE_MARKER}:{}", variant.id)
        } else {
            name_key
        };

        let key = GroupKey {
            family: console_family(&variant.console_name),
            match_key,
        };
        groups.entry(key).or_default().push(variant);
    }

    groups
}

/// Earliest-released variant, else the first seen
fn seed_variant(variants: &[Variant]) -> &Variant {
    variants
        .iter()
        .filter(|v| v.metadata.release_date.is_some())
        .min_by_key(|v| (v.metadata.release_date, v.id))
        .or_else(|| variants.iter().min_by_key(|v| v.id))
        .unwrap_or(&variants[0])
}

fn display_title(product_name: &str) -> String {
    let stripped = strip_region_markers(product_name);
    if stripped.is_empty() {
        product_name.trim().to_string()
    } else {
        stripped
    }
}

fn region_tag_for(variant: &Variant) -> RegionTag {
    RegionTag::from(detect_region(
        &variant.console_name,
        Some(variant.product_name.as_str()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewVariant;
    use crate::storage::create_mock_repository;
    use chrono::NaiveDate;

    fn seed(repo: &SharedRepository, rows: &[(&str, &str)]) -> Vec<i64> {
        rows.iter()
            .map(|(product, console)| {
                repo.insert_variant(&NewVariant::new(*product, *console))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_end_to_end_regional_variants_merge() {
        let repo = create_mock_repository();
        let ids = seed(
            &repo,
            &[
                ("Super Mario 64", "Nintendo 64"),
                ("Super Mario 64 (PAL)", "PAL Nintendo 64"),
                ("Super Mario 64 JP", "JP Nintendo 64"),
            ],
        );

        let stats = IdentityResolver::new(repo.clone()).run().unwrap();
        assert_eq!(stats.entities_created, 1);
        assert_eq!(stats.variants_linked, 3);

        let entities = repo.list_entities().unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].slug, "nintendo-64-super-mario-64");
        assert_eq!(entities[0].title, "Super Mario 64");

        let tags: Vec<RegionTag> = ids
            .iter()
            .map(|id| repo.get_variant(*id).unwrap().unwrap().region_tag)
            .collect();
        assert_eq!(tags, vec![RegionTag::Standard, RegionTag::Pal, RegionTag::Jp]);
    }

    #[test]
    fn test_region_exclusive_family_stays_separate() {
        let repo = create_mock_repository();
        let ids = seed(
            &repo,
            &[
                ("Super Mario Bros", "Famicom"),
                ("Super Mario Bros", "NES"),
            ],
        );

        IdentityResolver::new(repo.clone()).run().unwrap();

        let famicom = repo.get_variant(ids[0]).unwrap().unwrap();
        let nes = repo.get_variant(ids[1]).unwrap().unwrap();
        assert_eq!(famicom.region_tag, RegionTag::Jp);
        assert_ne!(famicom.entity_id, nes.entity_id);
        assert!(repo
            .find_entity_by_slug("famicom-super-mario-bros")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let repo = create_mock_repository();
        seed(
            &repo,
            &[
                ("Super Mario 64", "Nintendo 64"),
                ("Super Mario 64 (PAL)", "PAL Nintendo 64"),
                ("Zelda Ocarina of Time", "Nintendo 64"),
            ],
        );

        let resolver = IdentityResolver::new(repo.clone());
        resolver.run().unwrap();
        let first_entities = repo.list_entities().unwrap();
        let first_links: Vec<Option<i64>> = (1..=3)
            .map(|id| repo.get_variant(id).unwrap().unwrap().entity_id)
            .collect();

        let second = resolver.run().unwrap();
        assert_eq!(second, ResolveStats::default());
        assert_eq!(repo.list_entities().unwrap(), first_entities);
        let second_links: Vec<Option<i64>> = (1..=3)
            .map(|id| repo.get_variant(id).unwrap().unwrap().entity_id)
            .collect();
        assert_eq!(first_links, second_links);
    }

    #[test]
    fn test_late_variant_joins_existing_entity() {
        let repo = create_mock_repository();
        seed(&repo, &[("Super Mario 64", "Nintendo 64")]);
        let resolver = IdentityResolver::new(repo.clone());
        resolver.run().unwrap();

        let late = seed(&repo, &[("Super Mario 64 [PAL]", "PAL Nintendo 64")]);
        let stats = resolver.run().unwrap();
        assert_eq!(stats.entities_created, 0);
        assert_eq!(stats.entities_reused, 1);

        let entities = repo.list_entities().unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(
            repo.get_variant(late[0]).unwrap().unwrap().entity_id,
            Some(entities[0].id)
        );
    }

    #[test]
    fn test_slug_collision_gets_suffix() {
        let repo = create_mock_repository();
        // Different grouping keys ("super mario 64" vs "supermario 64"),
        // same slug
        seed(
            &repo,
            &[
                ("Super Mario 64", "Nintendo 64"),
                ("Super-Mario 64", "Nintendo 64"),
            ],
        );

        IdentityResolver::new(repo.clone()).run().unwrap();

        let mut slugs: Vec<String> = repo
            .list_entities()
            .unwrap()
            .into_iter()
            .map(|e| e.slug)
            .collect();
        slugs.sort();
        assert_eq!(
            slugs,
            vec!["nintendo-64-super-mario-64", "nintendo-64-super-mario-64-2"]
        );
    }

    #[test]
    fn test_collector_editions_stay_distinct() {
        let repo = create_mock_repository();
        seed(
            &repo,
            &[
                ("Zelda Collector Edition", "GameCube"),
                ("Zelda Collector Edition (PAL)", "PAL GameCube"),
            ],
        );

        let stats = IdentityResolver::new(repo.clone()).run().unwrap();
        assert_eq!(stats.entities_created, 2);

        let slugs: Vec<String> = repo
            .list_entities()
            .unwrap()
            .into_iter()
            .map(|e| e.slug)
            .collect();
        assert!(slugs.contains(&"gamecube-zelda-collector-edition".to_string()));
        assert!(slugs.contains(&"gamecube-zelda-collector-edition-2".to_string()));
    }

    #[test]
    fn test_metadata_seeded_from_earliest_release() {
        let repo = create_mock_repository();
        let mut late = NewVariant::new("Super Mario 64", "Nintendo 64");
        late.metadata.publisher = Some("Late Publisher".into());
        late.metadata.release_date = NaiveDate::from_ymd_opt(1997, 3, 1);
        let mut early = NewVariant::new("Super Mario 64 JP", "JP Nintendo 64");
        early.metadata.publisher = Some("Nintendo".into());
        early.metadata.release_date = NaiveDate::from_ymd_opt(1996, 6, 23);
        repo.insert_variant(&late).unwrap();
        repo.insert_variant(&early).unwrap();

        IdentityResolver::new(repo.clone()).run().unwrap();

        let entity = &repo.list_entities().unwrap()[0];
        assert_eq!(entity.metadata.publisher.as_deref(), Some("Nintendo"));
    }

    #[test]
    fn test_blank_names_are_skipped() {
        let repo = create_mock_repository();
        seed(&repo, &[("PAL", "Nintendo 64"), ("Tetris", "Game Boy")]);

        let stats = IdentityResolver::new(repo.clone()).run().unwrap();
        assert_eq!(stats.variants_skipped, 1);
        assert_eq!(stats.entities_created, 1);
        assert_eq!(repo.unresolved_variants().unwrap().len(), 1);
    }
}
