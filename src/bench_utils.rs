use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{client::Client, errors::Result};

const MODELS: [&str; 6] = ["Tesla", "Ford", "Mazda", "Toyota", "Volvo", "Fiat"];

#[derive(Clone, Debug)]
pub struct UserSeed {
    pub name: String,
    pub age: i64,
}

#[derive(Clone, Debug)]
pub struct CarSeed {
    pub model: &'static str,
    pub registered_at: DateTime<Utc>,
    /// Index into [`FleetDataset::users`].
    pub owner: usize,
}

#[derive(Clone, Debug)]
pub struct GroupSeed {
    pub name: String,
    /// Indices into [`FleetDataset::users`], distinct.
    pub members: Vec<usize>,
}

/// Deterministic users/cars/groups fleet for the demo schema.
#[derive(Clone, Debug)]
pub struct FleetDataset {
    pub users: Vec<UserSeed>,
    pub cars: Vec<CarSeed>,
    pub groups: Vec<GroupSeed>,
}

/// Ids assigned when a dataset is loaded, parallel to the seed vectors.
#[derive(Clone, Debug, Default)]
pub struct FleetIds {
    pub users: Vec<i64>,
    pub cars: Vec<i64>,
    pub groups: Vec<i64>,
}

impl FleetDataset {
    pub fn edges(&self) -> usize {
        self.cars.len() + self.groups.iter().map(|g| g.members.len()).sum::<usize>()
    }

    /// Loads every seed through `client`, users first, then cars with their
    /// owner, then groups with their members.
    pub fn load(&self, client: &Client) -> Result<FleetIds> {
        let mut ids = FleetIds::default();
        for user in &self.users {
            let entity = client
                .create("User")
                .set("name", user.name.as_str())
                .set("age", user.age)
                .save()?;
            ids.users.push(entity.id);
        }
        for car in &self.cars {
            let entity = client
                .create("Car")
                .set("model", car.model)
                .set("registered_at", car.registered_at)
                .add_edge("owner", [ids.users[car.owner]])
                .save()?;
            ids.cars.push(entity.id);
        }
        for group in &self.groups {
            let members: Vec<i64> = group.members.iter().map(|idx| ids.users[*idx]).collect();
            let entity = client
                .create("Group")
                .set("name", group.name.as_str())
                .add_edge("users", members)
                .save()?;
            ids.groups.push(entity.id);
        }
        Ok(ids)
    }
}

/// Generates `users` users owning up to `max_cars` cars each, spread over
/// `groups` groups of random membership.
pub fn generate_fleet(users: usize, max_cars: usize, groups: usize, seed: u64) -> FleetDataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let epoch = DateTime::<Utc>::UNIX_EPOCH + Duration::days(18_000);
    let users_seed: Vec<UserSeed> = (0..users)
        .map(|idx| UserSeed {
            name: format!("user-{idx}"),
            age: rng.gen_range(18..80),
        })
        .collect();
    let mut cars = Vec::new();
    for owner in 0..users {
        for _ in 0..rng.gen_range(0..=max_cars) {
            cars.push(CarSeed {
                model: MODELS[rng.gen_range(0..MODELS.len())],
                registered_at: epoch + Duration::minutes(rng.gen_range(0..525_600)),
                owner,
            });
        }
    }
    let groups_seed = (0..groups)
        .map(|idx| {
            let mut members: Vec<usize> = (0..users).filter(|_| rng.gen_bool(0.3)).collect();
            if members.is_empty() && users > 0 {
                members.push(rng.gen_range(0..users));
            }
            GroupSeed {
                name: format!("group-{idx}"),
                members,
            }
        })
        .collect();
    FleetDataset {
        users: users_seed,
        cars,
        groups: groups_seed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_fleet_is_deterministic() {
        let a = generate_fleet(50, 3, 4, 7);
        let b = generate_fleet(50, 3, 4, 7);
        assert_eq!(a.cars.len(), b.cars.len());
        assert_eq!(a.edges(), b.edges());
        assert!(a.groups.iter().all(|g| !g.members.is_empty()));
        assert!(a.cars.iter().all(|c| c.owner < a.users.len()));
    }
}
