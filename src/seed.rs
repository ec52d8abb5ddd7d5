//! Fixture generator
//!
//! Fills an empty directory with a full three-level taxonomy, buildings at
//! random coordinates and organizations housed in them. Activities go
//! through the same gated insert as the API; buildings and organizations are
//! written in batches of [`BATCH_SIZE`], one transaction per batch.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::db::{
    activities, buildings, organizations, CreateActivityInput, CreateBuildingInput,
    CreateOrganizationInput, DirectoryDb,
};
use crate::error::DirectoryError;

/// Rows written per transaction
pub const BATCH_SIZE: usize = 50;

/// Most activity tags given to one organization
pub const MAX_TAGS: usize = 5;

/// What to generate
#[derive(Debug, Clone)]
pub struct SeedPlan {
    pub buildings: usize,
    pub roots: usize,
    pub children: usize,
    pub grandchildren: usize,
    pub organizations: usize,
    pub max_phones: usize,
    pub rng_seed: u64,
}

impl Default for SeedPlan {
    fn default() -> Self {
        Self {
            buildings: 15,
            roots: 4,
            children: 3,
            grandchildren: 2,
            organizations: 200,
            max_phones: 2,
            rng_seed: 0,
        }
    }
}

/// What was generated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub activities: usize,
    pub buildings: usize,
    pub organizations: usize,
    pub phones: usize,
}

/// Populate an empty directory according to `plan`
pub fn seed(db: &DirectoryDb, plan: &SeedPlan) -> Result<SeedReport, DirectoryError> {
    let stats = db.stats()?;
    if stats.activity_count + stats.building_count + stats.organization_count > 0 {
        return Err(DirectoryError::Conflict(
            "refusing to seed a directory that already has data".into(),
        ));
    }
    if plan.organizations > 0 && plan.buildings == 0 {
        return Err(DirectoryError::Validation(
            "organizations need at least one building".into(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(plan.rng_seed);
    let mut report = SeedReport::default();

    let activity_ids = seed_activities(db, plan)?;
    report.activities = activity_ids.len();
    info!(count = report.activities, "Seeded activities");

    let building_ids = seed_buildings(db, plan, &mut rng)?;
    report.buildings = building_ids.len();
    info!(count = report.buildings, "Seeded buildings");

    let mut phone_counter = 0usize;
    let numbers: Vec<usize> = (1..=plan.organizations).collect();
    for batch in numbers.chunks(BATCH_SIZE) {
        let inputs: Vec<CreateOrganizationInput> = batch
            .iter()
            .map(|n| {
                let phone_count = if plan.max_phones == 0 {
                    0
                } else {
                    rng.gen_range(1..=plan.max_phones)
                };
                let phones = (0..phone_count)
                    .map(|_| {
                        phone_counter += 1;
                        format!("+79000{:06}", phone_counter)
                    })
                    .collect();

                let tag_limit = MAX_TAGS.min(activity_ids.len());
                let tags = if tag_limit == 0 {
                    Vec::new()
                } else {
                    let count = rng.gen_range(1..=tag_limit);
                    let mut ids: Vec<i64> =
                        activity_ids.choose_multiple(&mut rng, count).copied().collect();
                    ids.sort_unstable();
                    ids
                };

                CreateOrganizationInput {
                    name: format!("Organization {}", n),
                    building_id: building_ids.choose(&mut rng).copied().unwrap_or_default(),
                    phones,
                    activity_ids: tags,
                }
            })
            .collect();

        let phones_in_batch: usize = inputs.iter().map(|i| i.phones.len()).sum();
        db.with_write(|tx| {
            for input in &inputs {
                organizations::insert_organization(tx, input)?;
            }
            Ok(())
        })?;

        report.organizations += inputs.len();
        report.phones += phones_in_batch;
        debug!(inserted = report.organizations, "Seeded organization batch");
    }
    info!(
        count = report.organizations,
        phones = report.phones,
        "Seeded organizations"
    );

    Ok(report)
}

/// Roots, children and grandchildren, numbered in creation order
fn seed_activities(db: &DirectoryDb, plan: &SeedPlan) -> Result<Vec<i64>, DirectoryError> {
    db.with_write(|tx| {
        let mut ids = Vec::new();
        let mut create = |parent_id: Option<i64>| -> Result<i64, DirectoryError> {
            let input = CreateActivityInput {
                name: format!("Activity {}", ids.len() + 1),
                parent_id,
            };
            let id = activities::insert_activity(tx, &input)?.id;
            ids.push(id);
            Ok(id)
        };

        for _ in 0..plan.roots {
            let root = create(None)?;
            for _ in 0..plan.children {
                let child = create(Some(root))?;
                for _ in 0..plan.grandchildren {
                    create(Some(child))?;
                }
            }
        }

        Ok(ids)
    })
}

fn seed_buildings(
    db: &DirectoryDb,
    plan: &SeedPlan,
    rng: &mut StdRng,
) -> Result<Vec<i64>, DirectoryError> {
    let mut ids = Vec::with_capacity(plan.buildings);
    let numbers: Vec<usize> = (1..=plan.buildings).collect();

    for batch in numbers.chunks(BATCH_SIZE) {
        let inputs: Vec<CreateBuildingInput> = batch
            .iter()
            .map(|n| CreateBuildingInput {
                address: format!("Testcity, test St. {}", n),
                latitude: rng.gen_range(-90.0..=90.0),
                longitude: rng.gen_range(-180.0..=180.0),
            })
            .collect();

        let batch_ids = db.with_write(|tx| {
            inputs
                .iter()
                .map(|input| buildings::insert_building(tx, input).map(|row| row.id))
                .collect::<Result<Vec<_>, _>>()
        })?;
        ids.extend(batch_ids);
    }

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::ActivityForest;

    fn small_plan() -> SeedPlan {
        SeedPlan {
            buildings: 3,
            organizations: 60,
            ..SeedPlan::default()
        }
    }

    #[test]
    fn test_default_taxonomy_shape() {
        let db = DirectoryDb::open_in_memory().unwrap();
        let report = seed(&db, &small_plan()).unwrap();

        // 4 roots + 12 children + 24 grandchildren
        assert_eq!(report.activities, 40);
        assert_eq!(report.buildings, 3);
        assert_eq!(report.organizations, 60);

        let rows = db.with_snapshot(activities::all_activities).unwrap();
        let forest = ActivityForest::from_rows(rows);
        assert_eq!(forest.roots().len(), 4);
        assert_eq!(forest.max_depth().unwrap(), 2);
    }

    #[test]
    fn test_report_matches_store() {
        let db = DirectoryDb::open_in_memory().unwrap();
        let report = seed(&db, &small_plan()).unwrap();
        let stats = db.stats().unwrap();

        assert_eq!(stats.organization_count as usize, report.organizations);
        assert_eq!(stats.phone_count as usize, report.phones);
        assert!(report.phones >= report.organizations);
        assert!(report.phones <= report.organizations * 2);
    }

    #[test]
    fn test_same_seed_same_data() {
        let first = DirectoryDb::open_in_memory().unwrap();
        let second = DirectoryDb::open_in_memory().unwrap();
        let a = seed(&first, &small_plan()).unwrap();
        let b = seed(&second, &small_plan()).unwrap();
        assert_eq!(a, b);

        let coords = |db: &DirectoryDb| {
            db.with_snapshot(|conn| buildings::list_buildings(conn, 10, 0))
                .unwrap()
        };
        assert_eq!(coords(&first), coords(&second));
    }

    #[test]
    fn test_refuses_non_empty_store() {
        let db = DirectoryDb::open_in_memory().unwrap();
        seed(&db, &small_plan()).unwrap();
        assert!(matches!(seed(&db, &small_plan()), Err(DirectoryError::Conflict(_))));
    }
}
